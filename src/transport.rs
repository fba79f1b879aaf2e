use reqwest::{
    Client, Method, RequestBuilder, StatusCode, Url,
    header::ACCEPT,
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::FlickrError;
use crate::oauth::{Params, Signer, encode};
use crate::utils::param;

/// Base URLs of the three Flickr surfaces this crate talks to.
#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    pub(crate) rest: Url,
    pub(crate) upload: Url,
    pub(crate) oauth: Url,
}

#[derive(Debug, Clone)]
pub(crate) struct Transport {
    pub(crate) client: Client,
    pub(crate) endpoints: Endpoints,
    pub(crate) signer: Signer,
    has_token: bool,
}

impl Transport {
    pub(crate) fn new(client: Client, endpoints: Endpoints, signer: Signer) -> Self {
        Self {
            client,
            endpoints,
            signer,
            has_token: false,
        }
    }

    pub(crate) fn with_token(mut self, token: impl Into<String>, secret: impl Into<String>) -> Self {
        self.signer = self.signer.with_token(token, secret);
        self.has_token = true;
        self
    }

    pub(crate) fn has_token(&self) -> bool {
        self.has_token
    }

    pub(crate) fn oauth_url(&self, path: &str) -> Result<Url, FlickrError> {
        Ok(self.endpoints.oauth.join(path)?)
    }

    /// Signed GET against an OAuth endpoint whose answer is `application/x-www-form-urlencoded`.
    ///
    /// Flickr reports OAuth failures as `401` with an `oauth_problem=...` body; that problem is
    /// surfaced as [`FlickrError::OAuth`] instead of a bare status.
    pub(crate) async fn get_form<T>(&self, url: Url, params: Params) -> Result<T, FlickrError>
    where
        T: DeserializeOwned,
    {
        let builder = self.build_request(Method::GET, url, params)?;
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let fields: Params = serde_urlencoded::from_str(&body).unwrap_or_default();
            if let Some(problem) = param(&fields, "oauth_problem") {
                return Err(FlickrError::OAuth(problem.to_string()));
            }
            Self::map_status(status)?;
        }

        Ok(serde_urlencoded::from_str(&body)?)
    }

    /// Signed GET against the REST endpoint, returning the raw body.
    ///
    /// The installed token, if any, is part of the signature; public methods work without one.
    pub(crate) async fn get_rest(&self, params: Params) -> Result<String, FlickrError> {
        let url = self.endpoints.rest.clone();
        let builder = self.build_request(Method::GET, url, params)?;
        self.send_text(builder).await
    }

    /// Signed multipart POST to the upload endpoint.
    ///
    /// Every text field (including the `oauth_*` ones) is covered by the signature; `photo` is not.
    pub(crate) async fn post_upload(&self, fields: Params, photo: Part) -> Result<String, FlickrError> {
        let builder = self.build_upload(fields, photo)?;
        self.send_text(builder).await
    }

    fn build_upload(&self, fields: Params, photo: Part) -> Result<RequestBuilder, FlickrError> {
        if !self.has_token {
            return Err(FlickrError::MissingToken);
        }

        let url = self.endpoints.upload.clone();
        let signed = self.signer.sign(&Method::POST, &url, fields)?;

        let form = signed
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value))
            .part("photo", photo);

        Ok(self.client.post(url).header(ACCEPT, "text/xml").multipart(form))
    }

    async fn send_text(&self, builder: RequestBuilder) -> Result<String, FlickrError> {
        let response = builder.send().await?;
        debug!(status = %response.status(), url = %response.url().path(), "flickr response");
        Self::map_status(response.status())?;
        Ok(response.text().await?)
    }

    fn build_request(
        &self,
        method: Method,
        mut url: Url,
        params: Params,
    ) -> Result<RequestBuilder, FlickrError> {
        let signed = self.signer.sign(&method, &url, params)?;
        append_query(&mut url, &signed);

        Ok(self.client.request(method, url))
    }

    fn map_status(status: StatusCode) -> Result<(), FlickrError> {
        if status.is_success() {
            return Ok(());
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(FlickrError::AuthenticationFailed(status))
        } else {
            Err(FlickrError::RequestFailed(status))
        }
    }
}

/// Append `params` to the query of `url`, encoded the same way the signature base string is.
fn append_query(url: &mut Url, params: &[(String, String)]) {
    let encoded = params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded,
    };
    url.set_query(Some(&query));
}
