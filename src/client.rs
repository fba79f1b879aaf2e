use std::time::Duration;

use reqwest::{Client, ClientBuilder, Url, multipart::Part};
use serde::Deserialize;
use tracing::{debug, info};

use crate::models::{
    AccessTokenResponse, CheckTokenResponse, RequestTokenResponse, check_json_status, check_rsp,
};
use crate::oauth::{Params, Signer};
use crate::transport::{Endpoints, Transport};
use crate::utils::default_user_agent;
use crate::xml::XmlElement;
use crate::{
    ApiResponse, FlickrError, OAuthToken, Permission, RequestToken, ResponseFormat, TokenInfo,
    UploadRequest,
};

const DEFAULT_REST_URL: &str = "https://api.flickr.com/services/rest/";
const DEFAULT_UPLOAD_URL: &str = "https://up.flickr.com/services/upload/";
const DEFAULT_OAUTH_URL: &str = "https://www.flickr.com/services/oauth/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Async HTTP client for the Flickr endpoints needed to authorize an application and upload a
/// photo.
///
/// Every request is signed with OAuth 1.0a (HMAC-SHA1) using the application's key and secret
/// and, once one is installed with [`FlickrClient::with_token`], the user's access token.
#[derive(Debug, Clone)]
pub struct FlickrClient {
    transport: Transport,
    format: ResponseFormat,
    token: Option<OAuthToken>,
}

/// Builder for [`FlickrClient`].
#[derive(Debug)]
pub struct FlickrClientBuilder {
    api_key: String,
    api_secret: String,
    format: ResponseFormat,
    rest_url: Option<Url>,
    upload_url: Option<Url>,
    oauth_url: Option<Url>,
    user_agent: Option<String>,
    timeout: Duration,
    token: Option<OAuthToken>,
    builder: ClientBuilder,
}

impl FlickrClient {
    /// Build a client against the public Flickr endpoints.
    ///
    /// `format` is the format used by [`FlickrClient::call`].
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        format: ResponseFormat,
    ) -> Result<Self, FlickrError> {
        FlickrClientBuilder::new(api_key, api_secret)
            .format(format)
            .build()
    }

    /// Start configuring a client with the crate's defaults.
    ///
    /// Defaults:
    /// - Endpoints: `api.flickr.com` (REST), `up.flickr.com` (upload), `www.flickr.com` (OAuth)
    /// - Format: [`ResponseFormat::ParsedJson`]
    /// - Timeout: 30 seconds
    pub fn builder(api_key: impl Into<String>, api_secret: impl Into<String>) -> FlickrClientBuilder {
        FlickrClientBuilder::new(api_key, api_secret)
    }

    /// Application (consumer) key.
    pub fn api_key(&self) -> &str {
        self.transport.signer.consumer_key()
    }

    /// Format used by [`FlickrClient::call`].
    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    /// Access token if one is installed.
    pub fn token(&self) -> Option<&OAuthToken> {
        self.token.as_ref()
    }

    /// Return this client with `token` installed; subsequent requests are made on behalf of its
    /// user.
    pub fn with_token(mut self, token: OAuthToken) -> Self {
        self.transport = self
            .transport
            .with_token(token.token.clone(), token.token_secret.clone());
        self.token = Some(token);
        self
    }

    /// Obtain a request token; `callback` is where Flickr redirects the browser after consent.
    ///
    /// # Errors
    ///
    /// - [`FlickrError::OAuth`] if Flickr reports an `oauth_problem` or does not confirm the callback
    /// - [`FlickrError::AuthenticationFailed`] / [`FlickrError::RequestFailed`] for other non-2xx statuses
    /// - [`FlickrError::Http`] for transport failures (including timeouts)
    pub async fn request_token(&self, callback: &str) -> Result<RequestToken, FlickrError> {
        let url = self.transport.oauth_url("request_token")?;
        let params = vec![("oauth_callback".to_string(), callback.to_string())];

        let response: RequestTokenResponse = self.transport.get_form(url, params).await?;
        RequestToken::try_from(response)
    }

    /// URL of the page where the user grants `perms` to the request token.
    pub fn authorize_url(
        &self,
        request_token: &RequestToken,
        perms: Permission,
    ) -> Result<Url, FlickrError> {
        let mut url = self.transport.oauth_url("authorize")?;
        url.query_pairs_mut()
            .append_pair("oauth_token", &request_token.token)
            .append_pair("perms", perms.as_str());
        Ok(url)
    }

    /// Exchange an authorized request token and its verifier for an access token.
    ///
    /// Flickr does not echo the granted permission, so the returned token carries `perms`, the
    /// level that was requested in [`FlickrClient::authorize_url`].
    ///
    /// # Errors
    ///
    /// - [`FlickrError::OAuth`] if Flickr reports an `oauth_problem` (e.g. `token_rejected`)
    /// - [`FlickrError::MissingField`] if the response omits the token, secret or user id
    /// - [`FlickrError::Http`] for transport failures (including timeouts)
    pub async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
        perms: Permission,
    ) -> Result<OAuthToken, FlickrError> {
        let url = self.transport.oauth_url("access_token")?;
        let params = vec![("oauth_verifier".to_string(), verifier.to_string())];

        let response: AccessTokenResponse = self
            .transport
            .clone()
            .with_token(request_token.token.clone(), request_token.secret.clone())
            .get_form(url, params)
            .await?;

        response.into_token(perms)
    }

    /// Ask Flickr which permission and user `token` belongs to (`flickr.auth.oauth.checkToken`).
    ///
    /// # Errors
    ///
    /// - [`FlickrError::Api`] if the token is unknown or revoked
    /// - [`FlickrError::MissingField`] if the response omits the `oauth` section
    /// - [`FlickrError::Http`] for transport failures (including timeouts)
    pub async fn check_token(&self, token: &OAuthToken) -> Result<TokenInfo, FlickrError> {
        let authed = self.clone().with_token(token.clone());
        let response = authed
            .call_with(
                "flickr.auth.oauth.checkToken",
                Vec::new(),
                ResponseFormat::ParsedJson,
            )
            .await?;

        let value = response
            .as_json()
            .ok_or(FlickrError::MissingField("check token response is not json"))?;
        let body = CheckTokenResponse::deserialize(value)?;
        TokenInfo::try_from(body)
    }

    /// Call a REST API method with `params`, answering in the client's configured format.
    ///
    /// The request is signed with the installed token if there is one.
    ///
    /// # Errors
    ///
    /// - [`FlickrError::Api`] if the response has `stat="fail"`
    /// - [`FlickrError::AuthenticationFailed`] / [`FlickrError::RequestFailed`] for non-2xx statuses
    /// - [`FlickrError::Json`] / [`FlickrError::Xml`] if the body cannot be parsed
    /// - [`FlickrError::Http`] for transport failures (including timeouts)
    pub async fn call(
        &self,
        method: &str,
        params: impl IntoIterator<Item = (String, String)>,
    ) -> Result<ApiResponse, FlickrError> {
        self.call_with(method, params.into_iter().collect(), self.format)
            .await
    }

    async fn call_with(
        &self,
        method: &str,
        mut params: Params,
        format: ResponseFormat,
    ) -> Result<ApiResponse, FlickrError> {
        params.insert(0, ("method".to_string(), method.to_string()));
        match format {
            ResponseFormat::ParsedJson => {
                params.push(("format".into(), "json".into()));
                params.push(("nojsoncallback".into(), "1".into()));
            }
            ResponseFormat::Etree | ResponseFormat::Rest => {
                params.push(("format".into(), "rest".into()));
            }
        }

        debug!(method, format = format.as_str(), "calling flickr api");
        let body = self.transport.get_rest(params).await?;
        parse_body(body, format)
    }

    /// Upload the file at `request.file_path` with its title, description and tags.
    ///
    /// Requires an access token with `write` permission. The upload endpoint only answers in
    /// XML, so `format` must be [`ResponseFormat::Etree`] or [`ResponseFormat::Rest`].
    ///
    /// Implementation notes:
    /// - The file is read fully into memory before uploading.
    /// - The MIME type is guessed from the file extension.
    ///
    /// # Errors
    ///
    /// - [`FlickrError::UnsupportedFormat`] for [`ResponseFormat::ParsedJson`]
    /// - [`FlickrError::MissingToken`] if the client has no installed token
    /// - [`FlickrError::InvalidFileName`] if `file_path` does not have a valid UTF-8 file name
    /// - [`FlickrError::Io`] if reading the file fails
    /// - [`FlickrError::Api`] if Flickr rejects the upload (`stat="fail"`)
    /// - [`FlickrError::Http`] for transport failures (including timeouts)
    pub async fn upload(
        &self,
        request: &UploadRequest,
        format: ResponseFormat,
    ) -> Result<ApiResponse, FlickrError> {
        if format == ResponseFormat::ParsedJson {
            return Err(FlickrError::UnsupportedFormat(format.as_str()));
        }
        if !self.transport.has_token() {
            return Err(FlickrError::MissingToken);
        }

        let file_path = request.file_path.as_path();
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(FlickrError::InvalidFileName)?
            .to_string();

        let mime = mime_guess::from_path(file_path)
            .first_raw()
            .unwrap_or("application/octet-stream");

        let data = tokio::fs::read(file_path).await?;
        info!(file = %file_path.display(), bytes = data.len(), mime, "uploading photo");

        let photo = Part::bytes(data).file_name(file_name).mime_str(mime)?;
        let fields = vec![
            ("title".to_string(), request.title.clone()),
            ("description".to_string(), request.description.clone()),
            ("tags".to_string(), request.tags.clone()),
        ];

        let body = self.transport.post_upload(fields, photo).await?;
        parse_body(body, format)
    }
}

impl FlickrClientBuilder {
    /// Create a new builder using the crate defaults.
    ///
    /// This is equivalent to [`FlickrClient::builder`].
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            format: ResponseFormat::default(),
            rest_url: None,
            upload_url: None,
            oauth_url: None,
            user_agent: None,
            timeout: DEFAULT_TIMEOUT,
            token: None,
            builder: Client::builder(),
        }
    }

    /// Format used by [`FlickrClient::call`].
    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Override the REST endpoint.
    pub fn rest_url(mut self, url: impl AsRef<str>) -> Result<Self, FlickrError> {
        self.rest_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Override the upload endpoint.
    pub fn upload_url(mut self, url: impl AsRef<str>) -> Result<Self, FlickrError> {
        self.upload_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Override the base of the OAuth endpoints (`request_token`, `authorize`, `access_token`
    /// are joined onto it, so a trailing slash is required).
    pub fn oauth_url(mut self, url: impl AsRef<str>) -> Result<Self, FlickrError> {
        self.oauth_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Set a custom user agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Configure the request timeout.
    ///
    /// Timeout failures surface as [`FlickrError::Http`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Install an access token up front.
    pub fn token(mut self, token: OAuthToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Build a [`FlickrClient`].
    pub fn build(self) -> Result<FlickrClient, FlickrError> {
        let endpoints = Endpoints {
            rest: or_default(self.rest_url, DEFAULT_REST_URL)?,
            upload: or_default(self.upload_url, DEFAULT_UPLOAD_URL)?,
            oauth: or_default(self.oauth_url, DEFAULT_OAUTH_URL)?,
        };

        let mut builder = self.builder.timeout(self.timeout);
        builder = builder.user_agent(self.user_agent.unwrap_or_else(default_user_agent));

        let client = builder.build()?;

        let client = FlickrClient {
            transport: Transport::new(
                client,
                endpoints,
                Signer::new(self.api_key, self.api_secret),
            ),
            format: self.format,
            token: None,
        };

        Ok(match self.token {
            Some(token) => client.with_token(token),
            None => client,
        })
    }
}

fn or_default(url: Option<Url>, default: &str) -> Result<Url, FlickrError> {
    match url {
        Some(url) => Ok(url),
        None => Ok(Url::parse(default)?),
    }
}

fn parse_body(body: String, format: ResponseFormat) -> Result<ApiResponse, FlickrError> {
    match format {
        ResponseFormat::ParsedJson => {
            let value: serde_json::Value = serde_json::from_str(&body)?;
            check_json_status(&value)?;
            Ok(ApiResponse::Json(value))
        }
        ResponseFormat::Etree => {
            let tree = XmlElement::parse(&body)?;
            check_rsp(&tree)?;
            Ok(ApiResponse::Etree(tree))
        }
        ResponseFormat::Rest => {
            check_rsp(&XmlElement::parse(&body)?)?;
            Ok(ApiResponse::Rest(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> OAuthToken {
        OAuthToken {
            token: "tok".into(),
            token_secret: "tok-secret".into(),
            perms: Permission::Write,
            user_nsid: "1@N00".into(),
            username: "someone".into(),
            fullname: String::new(),
        }
    }

    fn request(path: &str) -> UploadRequest {
        UploadRequest {
            file_path: path.into(),
            title: "Sunset".into(),
            description: "A sunset over the bay".into(),
            tags: "sunset,bay,evening".into(),
        }
    }

    #[test]
    fn builds_with_defaults() {
        let client = FlickrClient::builder("key", "secret").build().unwrap();
        assert_eq!(client.api_key(), "key");
        assert_eq!(client.format(), ResponseFormat::ParsedJson);
        assert!(client.token().is_none());
        assert_eq!(client.transport.endpoints.rest.as_str(), DEFAULT_REST_URL);
        assert_eq!(client.transport.endpoints.upload.as_str(), DEFAULT_UPLOAD_URL);
        assert_eq!(client.transport.endpoints.oauth.as_str(), DEFAULT_OAUTH_URL);
    }

    #[test]
    fn new_sets_format() {
        let client = FlickrClient::new("key", "secret", ResponseFormat::Etree).unwrap();
        assert_eq!(client.format(), ResponseFormat::Etree);
    }

    #[test]
    fn accepts_custom_endpoints() {
        let client = FlickrClient::builder("key", "secret")
            .rest_url("http://127.0.0.1:9/rest/")
            .unwrap()
            .upload_url("http://127.0.0.1:9/upload/")
            .unwrap()
            .oauth_url("http://127.0.0.1:9/oauth/")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(client.transport.endpoints.rest.as_str(), "http://127.0.0.1:9/rest/");
        assert_eq!(client.transport.endpoints.upload.as_str(), "http://127.0.0.1:9/upload/");
    }

    #[test]
    fn rejects_invalid_endpoint() {
        assert!(matches!(
            FlickrClient::builder("key", "secret").rest_url("not a url"),
            Err(FlickrError::InvalidUrl(_))
        ));
    }

    #[test]
    fn builder_token_is_installed() {
        let client = FlickrClient::builder("key", "secret")
            .token(token())
            .build()
            .unwrap();
        assert_eq!(client.token().unwrap().token, "tok");
        assert!(client.transport.has_token());
    }

    #[test]
    fn authorize_url_carries_token_and_perms() {
        let client = FlickrClient::builder("key", "secret").build().unwrap();
        let request_token = RequestToken {
            token: "72157626737672178-022bbd2f4c2f3432".into(),
            secret: "fccb68c4e6103197".into(),
        };
        let url = client
            .authorize_url(&request_token, Permission::Write)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.flickr.com/services/oauth/authorize?oauth_token=72157626737672178-022bbd2f4c2f3432&perms=write"
        );
    }

    #[tokio::test]
    async fn upload_rejects_parsed_json() {
        let client = FlickrClient::builder("key", "secret")
            .token(token())
            .build()
            .unwrap();
        let err = client
            .upload(&request("photo.jpg"), ResponseFormat::ParsedJson)
            .await
            .unwrap_err();
        assert!(matches!(err, FlickrError::UnsupportedFormat("parsed-json")));
    }

    #[tokio::test]
    async fn upload_requires_token() {
        let client = FlickrClient::builder("key", "secret").build().unwrap();
        let err = client
            .upload(&request("photo.jpg"), ResponseFormat::Etree)
            .await
            .unwrap_err();
        assert!(matches!(err, FlickrError::MissingToken));
    }

    #[tokio::test]
    async fn upload_missing_file_maps_io() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.jpg");
        let client = FlickrClient::builder("key", "secret")
            .token(token())
            .build()
            .unwrap();
        let err = client
            .upload(&request(missing.to_str().unwrap()), ResponseFormat::Etree)
            .await
            .unwrap_err();
        assert!(matches!(err, FlickrError::Io(_)));
    }

    #[tokio::test]
    async fn upload_without_file_name_maps_invalid_file_name() {
        let client = FlickrClient::builder("key", "secret")
            .token(token())
            .build()
            .unwrap();
        let err = client
            .upload(&request(".."), ResponseFormat::Etree)
            .await
            .unwrap_err();
        assert!(matches!(err, FlickrError::InvalidFileName));
    }

    #[test]
    fn parse_body_json_failure_maps_api() {
        let body = r#"{"stat":"fail","code":98,"message":"Invalid auth token"}"#.to_string();
        assert!(matches!(
            parse_body(body, ResponseFormat::ParsedJson),
            Err(FlickrError::Api { code: 98, .. })
        ));
    }

    #[test]
    fn parse_body_etree_success() {
        let body = r#"<rsp stat="ok"><photoid>1</photoid></rsp>"#.to_string();
        let response = parse_body(body, ResponseFormat::Etree).unwrap();
        assert_eq!(response.as_etree().unwrap().find("photoid").unwrap().text, "1");
    }

    #[test]
    fn parse_body_rest_keeps_raw_body() {
        let body = r#"<rsp stat="ok"><photoid>1</photoid></rsp>"#.to_string();
        assert_eq!(
            parse_body(body.clone(), ResponseFormat::Rest).unwrap(),
            ApiResponse::Rest(body)
        );
    }
}
