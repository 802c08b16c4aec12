use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::BrowserError;
use crate::qido::{build_http_client, join_url, normalize_base_url, status_text};

#[derive(Debug, Clone, Serialize)]
pub struct StoreReceipt {
    pub status: u16,
    pub files: usize,
    pub body: String,
}

pub trait StowClient: Send + Sync {
    /// Posts every file in one multipart request to `path`.
    fn store(&self, path: &str, files: &[Utf8PathBuf]) -> Result<StoreReceipt, BrowserError>;
}

#[derive(Clone)]
pub struct StowHttpClient {
    client: Client,
    base_url: String,
}

impl StowHttpClient {
    pub fn new(base_url: &str) -> Result<Self, BrowserError> {
        let client = build_http_client().map_err(|err| BrowserError::StowHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }

    fn form(files: &[Utf8PathBuf]) -> Result<Form, BrowserError> {
        let mut form = Form::new();
        for (index, file) in files.iter().enumerate() {
            let part = Part::file(file.as_std_path())
                .map_err(|err| BrowserError::Filesystem(format!("open {file}: {err}")))?
                .mime_str("application/dicom")
                .map_err(|err| BrowserError::StowHttp(err.to_string()))?;
            form = form.part(format!("file[{index}]"), part);
        }
        Ok(form)
    }
}

impl StowClient for StowHttpClient {
    fn store(&self, path: &str, files: &[Utf8PathBuf]) -> Result<StoreReceipt, BrowserError> {
        let url = join_url(&self.base_url, path);
        debug!(%url, files = files.len(), "stow.request");
        let response = self
            .client
            .post(&url)
            .multipart(Self::form(files)?)
            .send()
            .map_err(|err| BrowserError::StowHttp(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BrowserError::StowStatus {
                status: status.as_u16(),
                message: status_text(status),
            });
        }
        let body = response
            .text()
            .map_err(|err| BrowserError::StowHttp(err.to_string()))?;
        Ok(StoreReceipt {
            status: status.as_u16(),
            files: files.len(),
            body,
        })
    }
}

/// Files waiting to be sent to the archive in a single batch.
#[derive(Debug, Clone, Default)]
pub struct UploadQueue {
    files: Vec<Utf8PathBuf>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the file is already queued.
    pub fn add(&mut self, file: impl Into<Utf8PathBuf>) -> bool {
        let file = file.into();
        if self.files.contains(&file) {
            return false;
        }
        self.files.push(file);
        true
    }

    pub fn remove(&mut self, file: &Utf8Path) -> bool {
        let before = self.files.len();
        self.files.retain(|queued| queued != file);
        self.files.len() != before
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn files(&self) -> &[Utf8PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Snapshot of the queue for one store request.
    pub fn prepare_batch(&self) -> Result<Vec<Utf8PathBuf>, BrowserError> {
        if self.files.is_empty() {
            return Err(BrowserError::EmptyUpload);
        }
        Ok(self.files.clone())
    }

    /// Applies the archive's answer to a batch from `prepare_batch`. Sent files
    /// leave the queue only when the archive accepted them; files queued while
    /// the request ran stay.
    pub fn complete_batch(
        &mut self,
        sent: &[Utf8PathBuf],
        result: Result<StoreReceipt, BrowserError>,
    ) -> Result<StoreReceipt, BrowserError> {
        let receipt = result?;
        info!(files = receipt.files, status = receipt.status, "stow.stored");
        self.files.retain(|file| !sent.contains(file));
        Ok(receipt)
    }

    /// Uploads the whole queue to `path` on the current thread.
    pub fn process<S: StowClient>(
        &mut self,
        client: &S,
        path: &str,
    ) -> Result<StoreReceipt, BrowserError> {
        let batch = self.prepare_batch()?;
        let result = client.store(path, &batch);
        self.complete_batch(&batch, result)
    }
}
