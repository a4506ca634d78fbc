//! File upload collaborator — pushes requested local files to cloud storage.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use reqwest::multipart;

/// Reported when the requested file does not exist locally. No network
/// attempt is made in that case.
const STATUS_NOT_FOUND: u16 = 404;
/// Reported when the upload never reached the storage backend at all.
const STATUS_UPLOAD_FAILED: u16 = 502;

/// Performs multipart uploads for `file-request` messages and reports the
/// outcome as a bare HTTP status code — failures are mapped, never thrown.
pub struct FileUploader {
    client: reqwest::Client,
    upload_dir: PathBuf,
}

impl FileUploader {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_dir: upload_dir.into(),
        }
    }

    /// Upload `filename` from the upload directory to `upload_url`. The
    /// request `headers` are pre-sign material and ride along as ordinary
    /// form fields, the way the storage endpoint expects them.
    pub async fn upload(
        &self,
        filename: &str,
        upload_url: &str,
        headers: &BTreeMap<String, String>,
    ) -> u16 {
        let Some(path) = self.resolve(filename) else {
            tracing::error!(filename, "rejecting file request outside upload dir");
            return STATUS_NOT_FOUND;
        };
        if !path.exists() {
            tracing::error!(path = %path.display(), "requested file does not exist");
            return STATUS_NOT_FOUND;
        }

        let data = match tokio::fs::read(&path).await {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to read requested file");
                return STATUS_NOT_FOUND;
            }
        };

        let part = multipart::Part::bytes(data).file_name(filename.to_string());
        let mut form = multipart::Form::new().part("file", part);
        for (key, value) in headers {
            form = form.text(key.clone(), value.clone());
        }

        match self.client.post(upload_url).multipart(form).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    tracing::info!(filename, status = status.as_u16(), "uploaded");
                } else {
                    tracing::error!(filename, status = status.as_u16(), "upload rejected by storage");
                }
                status.as_u16()
            }
            Err(e) => {
                tracing::error!(filename, error = %e, "upload failed");
                STATUS_UPLOAD_FAILED
            }
        }
    }

    /// Join `filename` under the upload dir, refusing absolute paths and
    /// traversal components.
    fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let relative = Path::new(filename);
        let traversal = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if traversal {
            return None;
        }
        Some(self.upload_dir.join(relative))
    }
}
