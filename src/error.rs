use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by this crate.
///
/// This type includes HTTP status classification (authentication vs other failures), failures
/// reported by the Flickr API inside an otherwise successful response, and underlying I/O / HTTP
/// client errors.
///
/// Notes:
/// - Network/transport failures (including timeouts) are returned as [`FlickrError::Http`].
/// - Flickr reports most API failures with HTTP 200 and `stat="fail"`; those are returned as
///   [`FlickrError::Api`].
#[derive(Debug, Error)]
pub enum FlickrError {
    /// An invalid URL was provided or returned.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The server returned `401 Unauthorized` or `403 Forbidden`.
    #[error("authentication failed with status {0}")]
    AuthenticationFailed(StatusCode),
    /// A request completed but returned a non-success HTTP status (other than `401`/`403`).
    #[error("request failed with status {0}")]
    RequestFailed(StatusCode),
    /// The OAuth endpoints rejected the exchange (`oauth_problem=...`) or broke the protocol.
    #[error("oauth error: {0}")]
    OAuth(String),
    /// The API answered with `stat="fail"`.
    #[error("flickr api error {code}: {message}")]
    Api { code: u32, message: String },
    /// A permission string other than `read`, `write` or `delete`.
    #[error("unknown permission {0:?}")]
    InvalidPermission(String),
    /// A required field was missing in an API response body.
    #[error("{0}")]
    MissingField(&'static str),
    /// An endpoint requiring an access token was called on a client without one.
    #[error("access token required for this request")]
    MissingToken,
    /// A required configuration value was not set.
    #[error("missing configuration: {0} is not set")]
    MissingConfig(&'static str),
    /// A configuration value was set but could not be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The endpoint cannot answer in the requested format.
    #[error("response format {0} is not supported here")]
    UnsupportedFormat(&'static str),
    /// The provided file path did not yield a valid UTF-8 file name.
    #[error("invalid file name")]
    InvalidFileName,
    /// An XML response body could not be parsed.
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// A JSON response body (or the token cache) could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A form-encoded response body could not be parsed.
    #[error("form decode error: {0}")]
    Form(#[from] serde_urlencoded::de::Error),
    /// An underlying I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// An underlying HTTP client operation failed.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
