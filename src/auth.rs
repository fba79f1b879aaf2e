//! Browser-based OAuth authorization.
//!
//! [`BrowserAuthenticator`] reuses a cached access token when Flickr still accepts it and
//! otherwise walks the user through the authorize page: it listens on a loopback port, sends the
//! browser to Flickr with that port as the OAuth callback, and waits for the redirect carrying
//! the verifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, info, warn};

use crate::{FlickrClient, FlickrError, OAuthToken, Permission, TokenCache};

const MAX_HEADER_LINES: usize = 100;
/// How long an accepted connection may stay silent before it is dropped.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

const DONE_PAGE: &str = "<html><head><title>Flickr authorization</title></head>\
<body><p>Authorization complete. You can close this window and return to the terminal.</p></body></html>";

/// Capability that yields an access token holding at least the requested permission.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, perms: Permission) -> Result<OAuthToken, FlickrError>;
}

type Opener = Box<dyn Fn(&Url) -> std::io::Result<()> + Send + Sync>;

/// Interactive authorization through the user's web browser.
///
/// This blocks until the browser is redirected back; there is no timeout.
pub struct BrowserAuthenticator {
    client: FlickrClient,
    cache: TokenCache,
    opener: Opener,
}

impl BrowserAuthenticator {
    pub fn new(client: FlickrClient, cache: TokenCache) -> Self {
        Self {
            client,
            cache,
            opener: Box::new(|url| webbrowser::open(url.as_str())),
        }
    }

    /// Replace the function used to show the authorize page.
    pub fn with_opener<F>(mut self, opener: F) -> Self
    where
        F: Fn(&Url) -> std::io::Result<()> + Send + Sync + 'static,
    {
        self.opener = Box::new(opener);
        self
    }

    /// Cached token for this API key if Flickr still accepts it with at least `perms`.
    ///
    /// An unreadable cache is treated as empty.
    async fn cached_token(&self, perms: Permission) -> Result<Option<OAuthToken>, FlickrError> {
        let api_key = self.client.api_key();
        let token = match self.cache.get(api_key) {
            Ok(Some(token)) => token,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %e, path = %self.cache.path().display(), "could not read token cache");
                return Ok(None);
            }
        };
        if !token.perms.satisfies(perms) {
            debug!(cached = %token.perms, requested = %perms, "cached token has too few permissions");
            return Ok(None);
        }

        match self.client.check_token(&token).await {
            Ok(info) if info.perms.satisfies(perms) => {
                info!(user = %info.username, perms = %info.perms, "using cached access token");
                Ok(Some(OAuthToken {
                    perms: info.perms,
                    ..token
                }))
            }
            Ok(info) => {
                debug!(granted = %info.perms, requested = %perms, "cached token was downgraded");
                Ok(None)
            }
            Err(FlickrError::Api { code, message }) => {
                warn!(code, %message, "cached access token rejected, authorizing again");
                if let Err(e) = self.cache.forget(api_key) {
                    warn!(error = %e, path = %self.cache.path().display(), "could not drop cached token");
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn authorize_in_browser(&self, perms: Permission) -> Result<OAuthToken, FlickrError> {
        let listener = CallbackListener::bind().await?;
        let request_token = self.client.request_token(&listener.callback_url()).await?;
        let url = self.client.authorize_url(&request_token, perms)?;

        info!(%perms, "opening browser for authorization");
        if let Err(e) = (self.opener)(&url) {
            warn!(error = %e, %url, "could not open a browser, open the url manually");
        }

        let verifier = listener.wait_for_verifier(&request_token.token).await?;
        self.client
            .access_token(&request_token, &verifier, perms)
            .await
    }
}

#[async_trait]
impl Authenticator for BrowserAuthenticator {
    async fn authenticate(&self, perms: Permission) -> Result<OAuthToken, FlickrError> {
        if let Some(token) = self.cached_token(perms).await? {
            return Ok(token);
        }

        let token = self.authorize_in_browser(perms).await?;
        if let Err(e) = self.cache.store(self.client.api_key(), &token) {
            warn!(error = %e, path = %self.cache.path().display(), "could not cache access token");
        }
        info!(user = %token.username, "authorized");
        Ok(token)
    }
}

/// One-shot HTTP listener for the OAuth redirect.
pub(crate) struct CallbackListener {
    listener: TcpListener,
    port: u16,
    read_timeout: Duration,
}

impl CallbackListener {
    pub(crate) async fn bind() -> Result<Self, FlickrError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        debug!(port, "listening for oauth callback");
        Ok(Self {
            listener,
            port,
            read_timeout: READ_TIMEOUT,
        })
    }

    pub(crate) fn callback_url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    #[cfg(test)]
    fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Accept connections until one carries `oauth_verifier` for `request_token`.
    ///
    /// Anything else (favicon requests, stray connections) is answered with `404` and ignored.
    /// Browsers open connections they never send on, so a silent one is dropped after
    /// `read_timeout`.
    pub(crate) async fn wait_for_verifier(&self, request_token: &str) -> Result<String, FlickrError> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            let target =
                match tokio::time::timeout(self.read_timeout, read_request_target(&mut stream)).await
                {
                    Ok(Ok(target)) => target,
                    Ok(Err(e)) => {
                        debug!(%peer, error = %e, "unreadable callback request");
                        continue;
                    }
                    Err(_) => {
                        debug!(%peer, "idle callback connection dropped");
                        continue;
                    }
                };

            match verifier_from_target(&target, request_token) {
                Some(verifier) => {
                    if let Err(e) = respond(&mut stream, "200 OK", DONE_PAGE).await {
                        debug!(error = %e, "could not answer the browser");
                    }
                    return Ok(verifier);
                }
                None => {
                    debug!(%target, "ignoring callback request");
                    let _ = respond(&mut stream, "404 Not Found", "").await;
                }
            }
        }
    }
}

async fn read_request_target(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain the headers so the browser sees a clean response.
    let mut line = String::new();
    for _ in 0..MAX_HEADER_LINES {
        line.clear();
        if reader.read_line(&mut line).await? == 0 || line.trim().is_empty() {
            break;
        }
    }

    request_line
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed request line"))
}

fn verifier_from_target(target: &str, request_token: &str) -> Option<String> {
    let url = Url::parse("http://127.0.0.1/").ok()?.join(target).ok()?;
    let mut token = None;
    let mut verifier = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "oauth_token" => token = Some(value.into_owned()),
            "oauth_verifier" => verifier = Some(value.into_owned()),
            _ => (),
        }
    }

    if token.as_deref() != Some(request_token) {
        return None;
    }
    verifier.filter(|v| !v.is_empty())
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
