use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rsv_domain::Job;

use crate::config::Config;
use crate::github::{GithubClient, RepoMetadata};
use crate::storage::HttpArchiveStore;

/// Hosting-platform queries needed by collection and merging.
pub trait PlatformClient: Send + Sync {
    /// Every job of one attempt of a workflow run.
    fn list_jobs(&self, repo: &str, run_id: u64, attempt: u32) -> Result<Vec<Job>>;

    /// Current metadata for each id, in input order; `None` when the id is unknown.
    fn query_repo_data(&self, ids: &[String]) -> Result<Vec<Option<RepoMetadata>>>;
}

/// Long-term storage for verified build archives, keyed by content hash.
pub trait ArchiveStore: Send + Sync {
    fn upload(&self, path: &Path, size: u64, hash: &str) -> Result<()>;
}

pub trait Effects: Send + Sync {
    fn platform(&self) -> &dyn PlatformClient;
    /// `None` when no storage is configured.
    fn storage(&self) -> Option<&dyn ArchiveStore>;
}

pub struct SystemEffects {
    platform: Arc<GithubClient>,
    storage: Option<Arc<HttpArchiveStore>>,
}

impl SystemEffects {
    /// Wire the production GitHub client and, when configured, archive storage.
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let platform = Arc::new(GithubClient::new(config.github())?);
        let storage = match config.storage() {
            Some(storage) => Some(Arc::new(HttpArchiveStore::new(storage)?)),
            None => None,
        };
        Ok(Self { platform, storage })
    }
}

impl Effects for SystemEffects {
    fn platform(&self) -> &dyn PlatformClient {
        self.platform.as_ref()
    }

    fn storage(&self) -> Option<&dyn ArchiveStore> {
        self.storage
            .as_deref()
            .map(|storage| storage as &dyn ArchiveStore)
    }
}
