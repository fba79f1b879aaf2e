//! OAuth 1.0a request signing (RFC 5849, HMAC-SHA1 only).
//!
//! Flickr accepts the protocol parameters either in the query string or in the request body,
//! so the signer produces a flat parameter list instead of an `Authorization` header. Callers
//! merge it into whatever they are sending.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, Url};
use sha1::Sha1;
use uuid::Uuid;

use crate::FlickrError;

/// Everything except the RFC 3986 unreserved characters gets encoded.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";

pub(crate) type Params = Vec<(String, String)>;

pub(crate) fn encode(value: &str) -> String {
    utf8_percent_encode(value, UNRESERVED).to_string()
}

/// Consumer credentials plus the (optional) token the request is made on behalf of.
#[derive(Debug, Clone)]
pub(crate) struct Signer {
    consumer_key: String,
    consumer_secret: String,
    token: Option<String>,
    token_secret: Option<String>,
}

impl Signer {
    pub(crate) fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: None,
            token_secret: None,
        }
    }

    pub(crate) fn with_token(mut self, token: impl Into<String>, secret: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self.token_secret = Some(secret.into());
        self
    }

    pub(crate) fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Sign `extra` for a request to `url` with a fresh nonce and the current time.
    ///
    /// Returns `extra` followed by the `oauth_*` parameters, `oauth_signature` last.
    pub(crate) fn sign(&self, method: &Method, url: &Url, extra: Params) -> Result<Params, FlickrError> {
        let nonce = Uuid::new_v4().simple().to_string();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.sign_with(method, url, extra, &nonce, timestamp)
    }

    pub(crate) fn sign_with(
        &self,
        method: &Method,
        url: &Url,
        mut params: Params,
        nonce: &str,
        timestamp: u64,
    ) -> Result<Params, FlickrError> {
        params.push(("oauth_consumer_key".into(), self.consumer_key.clone()));
        params.push(("oauth_nonce".into(), nonce.to_string()));
        params.push(("oauth_signature_method".into(), SIGNATURE_METHOD.into()));
        params.push(("oauth_timestamp".into(), timestamp.to_string()));
        if let Some(token) = &self.token {
            params.push(("oauth_token".into(), token.clone()));
        }
        params.push(("oauth_version".into(), OAUTH_VERSION.into()));

        let base = base_string(method, url, &params);
        let signature = hmac_sha1(&self.signing_key(), &base)?;
        params.push(("oauth_signature".into(), signature));
        Ok(params)
    }

    fn signing_key(&self) -> String {
        format!(
            "{}&{}",
            encode(&self.consumer_secret),
            encode(self.token_secret.as_deref().unwrap_or_default())
        )
    }
}

/// Signature base string: `METHOD&base-uri&normalized-params`.
///
/// Query parameters already present on `url` take part in the signature alongside `params`.
pub(crate) fn base_string(method: &Method, url: &Url, params: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (encode(&k), encode(&v)))
        .chain(params.iter().map(|(k, v)| (encode(k), encode(v))))
        .collect();
    pairs.sort();

    let normalized = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.as_str(),
        encode(&base_uri(url)),
        encode(&normalized)
    )
}

fn base_uri(url: &Url) -> String {
    // `Url::port` is `None` for the scheme's default port, which must be omitted.
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

fn hmac_sha1(key: &str, data: &str) -> Result<String, FlickrError> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|e| FlickrError::OAuth(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
