//! Upload photos to Flickr.
//!
//! The crate provides:
//! - [`FlickrClient`]: an async client for the Flickr OAuth, REST and upload endpoints, signing
//!   every request with OAuth 1.0a (HMAC-SHA1)
//! - [`BrowserAuthenticator`]: obtains an access token through the user's browser and caches it
//!   on disk ([`TokenCache`])
//! - [`run`]: authorize with `write` permission and upload one photo
//!
//! ```no_run
//! use flickr_upload::{
//!     BrowserAuthenticator, FlickrClient, ResponseFormat, TokenCache, UploadRequest, run,
//! };
//!
//! # async fn demo() -> Result<(), flickr_upload::FlickrError> {
//! let client = FlickrClient::new("api-key", "api-secret", ResponseFormat::ParsedJson)?;
//! let auth = BrowserAuthenticator::new(client.clone(), TokenCache::default());
//! let request = UploadRequest {
//!     file_path: "photo.jpg".into(),
//!     title: "Sunset".into(),
//!     description: "A sunset over the bay".into(),
//!     tags: "sunset bay evening".into(),
//! };
//! run(&auth, &client, &request).await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod cli;
mod client;
mod config;
mod error;
mod models;
mod oauth;
mod token_cache;
mod transport;
mod uploader;
mod utils;
mod xml;

pub use auth::{Authenticator, BrowserAuthenticator};
pub use cli::Cli;
pub use client::{FlickrClient, FlickrClientBuilder};
pub use config::Config;
pub use error::FlickrError;
pub use models::{
    ApiResponse, OAuthToken, Permission, RequestToken, ResponseFormat, TokenInfo, UploadRequest,
    UploadedPhoto,
};
pub use token_cache::TokenCache;
pub use uploader::{PhotoUploader, run};
pub use xml::XmlElement;
