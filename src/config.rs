use std::{env, path::PathBuf, time::Duration};

use tracing::debug;

use crate::{FlickrError, TokenCache};

const API_KEY: &str = "FLICKR_API_KEY";
const API_SECRET: &str = "FLICKR_API_SECRET";
const TOKEN_CACHE: &str = "FLICKR_TOKEN_CACHE";
const TIMEOUT_SECS: &str = "FLICKR_TIMEOUT_SECS";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Application credentials and tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: String,
    pub api_secret: String,
    pub token_cache: PathBuf,
    pub timeout: Duration,
}

impl Config {
    /// Read the configuration from the process environment, loading `.env` first if present.
    ///
    /// # Errors
    ///
    /// - [`FlickrError::MissingConfig`] if `FLICKR_API_KEY` or `FLICKR_API_SECRET` is unset or empty
    /// - [`FlickrError::InvalidConfig`] if `FLICKR_TIMEOUT_SECS` is not a whole number of seconds
    pub fn from_env() -> Result<Self, FlickrError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FlickrError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = get(API_KEY).ok_or(FlickrError::MissingConfig(API_KEY))?;
        let api_secret = get(API_SECRET).ok_or(FlickrError::MissingConfig(API_SECRET))?;

        let token_cache = get(TOKEN_CACHE)
            .map(PathBuf::from)
            .unwrap_or_else(TokenCache::default_path);

        let timeout = match get(TIMEOUT_SECS) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| FlickrError::InvalidConfig(format!("{TIMEOUT_SECS}={raw}: {e}")))?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_key,
            api_secret,
            token_cache,
            timeout,
        })
    }
}
