//! Upload client for the third-party file host used for oversized attachments.

use chanmirror_core::config::FileHostConfig;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

/// Why an upload produced no link. Always recovered by skipping the file.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed file host reply: {0}")]
    Malformed(String),

    #[error("file host reported failure: {0}")]
    Rejected(String),

    #[error("file host returned no URL")]
    NoUrl,

    #[error("connection error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    files: Vec<UploadedFile>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    url: Option<String>,
}

pub struct FileHost {
    http: reqwest::Client,
    upload_url: String,
    token: String,
    album_id: String,
}

impl FileHost {
    pub fn new(http: reqwest::Client, config: &FileHostConfig) -> Self {
        Self {
            http,
            upload_url: config.upload_url.clone(),
            token: config.token.clone(),
            album_id: config.album_id.clone(),
        }
    }

    /// Upload one file and return its public URL. Single attempt, no retry.
    pub async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<String, UploadError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("files[]", part);

        debug!(%filename, url = %self.upload_url, "uploading to file host");
        let resp = self
            .http
            .post(&self.upload_url)
            .header("albumid", &self.album_id)
            .header("token", &self.token)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let reply: UploadResponse =
            serde_json::from_str(&text).map_err(|e| UploadError::Malformed(e.to_string()))?;
        if !reply.success {
            return Err(UploadError::Rejected(
                reply.description.unwrap_or_else(|| text.clone()),
            ));
        }
        reply
            .files
            .into_iter()
            .next()
            .and_then(|f| f.url)
            .filter(|u| !u.is_empty())
            .ok_or(UploadError::NoUrl)
    }
}
