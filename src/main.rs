use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flickr_upload::{
    BrowserAuthenticator, Cli, Config, FlickrClient, ResponseFormat, TokenCache, run,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let request = Cli::parse().into_request();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flickr_upload=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let client = FlickrClient::builder(config.api_key, config.api_secret)
        .format(ResponseFormat::ParsedJson)
        .timeout(config.timeout)
        .build()?;
    let authenticator =
        BrowserAuthenticator::new(client.clone(), TokenCache::new(config.token_cache));

    run(&authenticator, &client, &request)
        .await
        .with_context(|| format!("uploading {}", request.file_path.display()))?;

    Ok(())
}
