use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{bail, Result};
use rsv_domain::Job;

use crate::effects::{ArchiveStore, Effects, PlatformClient};
use crate::github::RepoMetadata;

#[derive(Default)]
pub(crate) struct FakePlatform {
    pub jobs: Vec<Job>,
    pub repos: HashMap<String, RepoMetadata>,
    pub queries: Mutex<Vec<Vec<String>>>,
}

impl FakePlatform {
    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        Self {
            jobs,
            ..Self::default()
        }
    }

    pub fn with_repos(repos: Vec<RepoMetadata>) -> Self {
        Self {
            repos: repos
                .into_iter()
                .map(|repo| (repo.id.clone(), repo))
                .collect(),
            ..Self::default()
        }
    }
}

impl PlatformClient for FakePlatform {
    fn list_jobs(&self, _repo: &str, _run_id: u64, _attempt: u32) -> Result<Vec<Job>> {
        Ok(self.jobs.clone())
    }

    fn query_repo_data(&self, ids: &[String]) -> Result<Vec<Option<RepoMetadata>>> {
        self.queries.lock().expect("queries lock").push(ids.to_vec());
        Ok(ids.iter().map(|id| self.repos.get(id).cloned()).collect())
    }
}

#[derive(Default)]
pub(crate) struct RecordingStore {
    pub uploads: Mutex<Vec<(u64, String)>>,
    pub fail: bool,
}

impl RecordingStore {
    pub fn uploads(&self) -> Vec<(u64, String)> {
        self.uploads.lock().expect("uploads lock").clone()
    }
}

impl ArchiveStore for RecordingStore {
    fn upload(&self, path: &Path, size: u64, hash: &str) -> Result<()> {
        assert!(path.is_file(), "uploading missing file {}", path.display());
        if self.fail {
            bail!("storage unavailable");
        }
        self.uploads
            .lock()
            .expect("uploads lock")
            .push((size, hash.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeEffects {
    pub platform: FakePlatform,
    pub storage: Option<RecordingStore>,
}

impl Effects for FakeEffects {
    fn platform(&self) -> &dyn PlatformClient {
        &self.platform
    }

    fn storage(&self) -> Option<&dyn ArchiveStore> {
        self.storage.as_ref().map(|store| store as &dyn ArchiveStore)
    }
}

pub(crate) fn repo(id: &str, owner: &str, name: &str) -> RepoMetadata {
    RepoMetadata {
        id: id.into(),
        owner: owner.into(),
        name: name.into(),
        full_name: format!("{owner}/{name}"),
        description: Some(format!("{name} from GitHub")),
        homepage: None,
        topics: vec!["lean4".into()],
        stars: 3,
        license: Some("MIT".into()),
        created_at: "2023-01-01T00:00:00Z".into(),
        updated_at: "2024-01-01T00:00:00Z".into(),
        url: format!("https://github.com/{owner}/{name}"),
        default_branch: Some("main".into()),
    }
}
