use std::{fmt, path::PathBuf, str::FromStr};

use serde::de::{self, Visitor};
use serde::{Deserialize, Serialize};

use crate::{FlickrError, xml::XmlElement};

/// Permission level requested from (and granted by) the user.
///
/// Levels are cumulative: `delete` implies `write`, which implies `read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Delete,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Delete => "delete",
        }
    }

    /// Whether a token holding `self` may be used for a request needing `required`.
    pub fn satisfies(self, required: Permission) -> bool {
        self >= required
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = FlickrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "delete" => Ok(Permission::Delete),
            _ => Err(FlickrError::InvalidPermission(s.to_string())),
        }
    }
}

/// Format a response body is requested and returned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// `format=json&nojsoncallback=1`, parsed into a [`serde_json::Value`].
    #[default]
    ParsedJson,
    /// `format=rest`, parsed into an [`XmlElement`] tree.
    Etree,
    /// `format=rest`, returned as the raw body.
    Rest,
}

impl ResponseFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseFormat::ParsedJson => "parsed-json",
            ResponseFormat::Etree => "etree",
            ResponseFormat::Rest => "rest",
        }
    }
}

/// A response body in the shape selected by [`ResponseFormat`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(serde_json::Value),
    Etree(XmlElement),
    Rest(String),
}

impl ApiResponse {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ApiResponse::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_etree(&self) -> Option<&XmlElement> {
        match self {
            ApiResponse::Etree(tree) => Some(tree),
            _ => None,
        }
    }
}

/// File and metadata for a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file_path: PathBuf,
    pub title: String,
    pub description: String,
    /// Space- or comma-separated tags, passed to Flickr as given.
    pub tags: String,
}

/// Temporary credentials from `oauth/request_token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
}

/// Access token issued by `oauth/access_token`.
///
/// `perms` is not part of Flickr's response; it is the level requested when the token was
/// authorized (or the level reported by `flickr.auth.oauth.checkToken`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub token: String,
    pub token_secret: String,
    pub perms: Permission,
    pub user_nsid: String,
    pub username: String,
    #[serde(default)]
    pub fullname: String,
}

/// Result of `flickr.auth.oauth.checkToken`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub perms: Permission,
    pub user_nsid: String,
    pub username: String,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPhoto {
    pub photo_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RequestTokenResponse {
    pub(crate) oauth_callback_confirmed: Option<String>,
    pub(crate) oauth_token: Option<String>,
    pub(crate) oauth_token_secret: Option<String>,
    pub(crate) oauth_problem: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenResponse {
    pub(crate) oauth_token: Option<String>,
    pub(crate) oauth_token_secret: Option<String>,
    pub(crate) user_nsid: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) fullname: Option<String>,
    pub(crate) oauth_problem: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Content {
    #[serde(rename = "_content")]
    pub(crate) content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckTokenUser {
    pub(crate) nsid: String,
    pub(crate) username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckTokenOAuth {
    pub(crate) perms: Content,
    pub(crate) user: CheckTokenUser,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckTokenResponse {
    pub(crate) oauth: Option<CheckTokenOAuth>,
}

/// The `stat`/`code`/`message` envelope every JSON response carries.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonStatus {
    pub(crate) stat: Option<String>,
    #[serde(default, deserialize_with = "de_u32_or_string")]
    pub(crate) code: u32,
    pub(crate) message: Option<String>,
}

fn de_u32_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct U32OrString;

    impl<'de> Visitor<'de> for U32OrString {
        type Value = u32;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a u32 or numeric string")
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u32::try_from(v).map_err(E::custom)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u32::try_from(v).map_err(E::custom)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            v.parse::<u32>().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(U32OrString)
}

/// Fail on a JSON body with `stat != "ok"`.
pub(crate) fn check_json_status(body: &serde_json::Value) -> Result<(), FlickrError> {
    let status = JsonStatus::deserialize(body)?;
    match status.stat.as_deref() {
        Some("ok") => Ok(()),
        _ => Err(FlickrError::Api {
            code: status.code,
            message: status
                .message
                .unwrap_or_else(|| "request failed".to_string()),
        }),
    }
}

/// Fail on an `<rsp>` tree with `stat != "ok"`.
pub(crate) fn check_rsp(root: &XmlElement) -> Result<(), FlickrError> {
    if root.name != "rsp" {
        return Err(FlickrError::MissingField("response root is not <rsp>"));
    }
    if root.attr("stat") == Some("ok") {
        return Ok(());
    }

    let err = root.find("err");
    let code = err
        .and_then(|e| e.attr("code"))
        .and_then(|c| c.parse().ok())
        .unwrap_or_default();
    let message = err
        .and_then(|e| e.attr("msg"))
        .unwrap_or("request failed")
        .to_string();
    Err(FlickrError::Api { code, message })
}

impl TryFrom<RequestTokenResponse> for RequestToken {
    type Error = FlickrError;

    fn try_from(body: RequestTokenResponse) -> Result<Self, Self::Error> {
        if let Some(problem) = body.oauth_problem {
            return Err(FlickrError::OAuth(problem));
        }
        if body.oauth_callback_confirmed.as_deref() != Some("true") {
            return Err(FlickrError::OAuth("callback not confirmed".into()));
        }

        Ok(RequestToken {
            token: body.oauth_token.ok_or(FlickrError::MissingField(
                "request token response missing oauth_token",
            ))?,
            secret: body.oauth_token_secret.ok_or(FlickrError::MissingField(
                "request token response missing oauth_token_secret",
            ))?,
        })
    }
}

impl AccessTokenResponse {
    pub(crate) fn into_token(self, perms: Permission) -> Result<OAuthToken, FlickrError> {
        if let Some(problem) = self.oauth_problem {
            return Err(FlickrError::OAuth(problem));
        }

        Ok(OAuthToken {
            token: self.oauth_token.ok_or(FlickrError::MissingField(
                "access token response missing oauth_token",
            ))?,
            token_secret: self.oauth_token_secret.ok_or(FlickrError::MissingField(
                "access token response missing oauth_token_secret",
            ))?,
            perms,
            user_nsid: self.user_nsid.ok_or(FlickrError::MissingField(
                "access token response missing user_nsid",
            ))?,
            username: self.username.unwrap_or_default(),
            fullname: self.fullname.unwrap_or_default(),
        })
    }
}

impl TryFrom<CheckTokenResponse> for TokenInfo {
    type Error = FlickrError;

    fn try_from(body: CheckTokenResponse) -> Result<Self, Self::Error> {
        let oauth = body.oauth.ok_or(FlickrError::MissingField(
            "check token response missing oauth",
        ))?;

        Ok(TokenInfo {
            perms: oauth.perms.content.parse()?,
            user_nsid: oauth.user.nsid,
            username: oauth.user.username,
        })
    }
}

impl TryFrom<&XmlElement> for UploadedPhoto {
    type Error = FlickrError;

    fn try_from(root: &XmlElement) -> Result<Self, Self::Error> {
        check_rsp(root)?;
        let photo_id = root
            .find("photoid")
            .map(|el| el.text.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(FlickrError::MissingField("upload response missing photoid"))?;

        Ok(UploadedPhoto { photo_id })
    }
}

impl TryFrom<&ApiResponse> for UploadedPhoto {
    type Error = FlickrError;

    fn try_from(response: &ApiResponse) -> Result<Self, Self::Error> {
        match response {
            ApiResponse::Etree(tree) => UploadedPhoto::try_from(tree),
            ApiResponse::Rest(body) => UploadedPhoto::try_from(&XmlElement::parse(body)?),
            ApiResponse::Json(_) => Err(FlickrError::UnsupportedFormat("parsed-json")),
        }
    }
}
