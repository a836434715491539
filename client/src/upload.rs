use std::path::Path;

use futures::StreamExt;
use mime_guess::mime;
use reqwest::{
    multipart::{Form, Part},
    Body,
};
use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::io::ReaderStream;
use tracing::info;
use url::Url;

use crate::{
    error::{ClientError, ClientResult},
    http::{decode, ensure_success},
};

/// Bytes handed to the transport so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.sent.min(self.total) * 100) / self.total) as u8
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Client for the image host used for profile pictures.
pub struct ImageUploader {
    http: reqwest::Client,
    url: Url,
    preset: String,
}

impl ImageUploader {
    pub fn new(http: reqwest::Client, url: Url, preset: impl Into<String>) -> Self {
        Self {
            http,
            url,
            preset: preset.into(),
        }
    }

    /// Stream an image file to the host, reporting progress on `progress`.
    /// Returns the public URL of the stored image.
    pub async fn upload_file(
        &self,
        path: &Path,
        progress: watch::Sender<UploadProgress>,
    ) -> ClientResult<String> {
        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        if content_type.type_() != mime::IMAGE {
            return Err(ClientError::validation("Only image files can be uploaded"));
        }
        let file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let _ = progress.send(UploadProgress { sent: 0, total });
        let mut sent = 0u64;
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                let _ = progress.send(UploadProgress { sent, total });
            }
            chunk
        });
        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(name)
            .mime_str(content_type.as_ref())?;
        let form = Form::new()
            .text("upload_preset", self.preset.clone())
            .part("file", part);

        let resp = self.http.post(self.url.clone()).multipart(form).send().await?;
        let body: UploadResponse = decode(ensure_success(resp).await?).await?;
        info!(url = %body.secure_url, bytes = total, "image uploaded");
        Ok(body.secure_url)
    }
}
