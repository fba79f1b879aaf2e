use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{FlickrError, OAuthToken};

const CACHE_DIR: &str = ".flickr";
const CACHE_FILE: &str = "oauth-tokens.json";

/// Access tokens persisted between runs, keyed by API key.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.flickr/oauth-tokens.json`, or `./.flickr/...` when there is no home directory.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CACHE_DIR)
            .join(CACHE_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached token for `api_key`, if any.
    pub fn get(&self, api_key: &str) -> Result<Option<OAuthToken>, FlickrError> {
        Ok(self.load()?.remove(api_key))
    }

    /// Store (or replace) the token for `api_key`.
    pub fn store(&self, api_key: &str, token: &OAuthToken) -> Result<(), FlickrError> {
        let mut tokens = self.load()?;
        tokens.insert(api_key.to_string(), token.clone());
        self.save(&tokens)?;
        debug!(path = %self.path.display(), user = %token.user_nsid, "stored access token");
        Ok(())
    }

    /// Drop the token for `api_key`. Missing entries are not an error.
    pub fn forget(&self, api_key: &str) -> Result<(), FlickrError> {
        let mut tokens = self.load()?;
        if tokens.remove(api_key).is_some() {
            self.save(&tokens)?;
        }
        Ok(())
    }

    fn load(&self) -> Result<BTreeMap<String, OAuthToken>, FlickrError> {
        match fs::read_to_string(&self.path) {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, tokens: &BTreeMap<String, OAuthToken>) -> Result<(), FlickrError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(tokens)?)?;
        Ok(())
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}
