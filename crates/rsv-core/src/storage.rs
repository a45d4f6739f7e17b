//! Object-storage upload of verified build archives.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::{debug, warn};
use url::Url;

use crate::archive::ARCHIVE_EXTENSION;
use crate::config::StorageConfig;
use crate::effects::ArchiveStore;
use crate::http::{build_http_client, send_with_retry};

/// Uploads archives with `PUT <base>/<hash>.barrel`.
///
/// Objects are keyed by content hash, so repeating an upload is harmless.
pub struct HttpArchiveStore {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpArchiveStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            base: config.url.clone(),
            token: config.token.clone(),
        })
    }

    fn object_url(&self, hash: &str) -> String {
        format!(
            "{}/{hash}.{ARCHIVE_EXTENSION}",
            self.base.as_str().trim_end_matches('/')
        )
    }
}

impl ArchiveStore for HttpArchiveStore {
    fn upload(&self, path: &Path, size: u64, hash: &str) -> Result<()> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        if bytes.len() as u64 != size {
            warn!(
                "{}: recorded size {size} differs from {} bytes on disk",
                path.display(),
                bytes.len()
            );
        }
        let url = self.object_url(hash);
        debug!("uploading {} to {url}", path.display());
        send_with_retry(&format!("upload of {hash}"), || {
            let request = self
                .client
                .put(&url)
                .header("Content-Type", "application/octet-stream")
                .header("X-Content-Sha256", hash)
                .body(bytes.clone());
            match &self.token {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        })?
        .error_for_status()
        .with_context(|| format!("upload failed for {hash}"))?;
        Ok(())
    }
}
