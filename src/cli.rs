use std::path::PathBuf;

use clap::Parser;

use crate::UploadRequest;

/// Upload a photo to Flickr.
///
/// Credentials are read from FLICKR_API_KEY and FLICKR_API_SECRET (a `.env` file is honoured).
/// The first run opens a browser to authorize the application.
#[derive(Debug, Parser)]
#[command(name = "flickr-upload", version, about)]
pub struct Cli {
    /// File to upload
    pub file_path: PathBuf,
    /// Photo title
    pub title: String,
    /// Photo description
    pub description: String,
    /// Tags, space separated; quote multi-word tags
    pub tags: String,
}

impl Cli {
    pub fn into_request(self) -> UploadRequest {
        UploadRequest {
            file_path: self.file_path,
            title: self.title,
            description: self.description,
            tags: self.tags,
        }
    }
}
