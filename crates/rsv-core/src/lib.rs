#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod archive;
pub mod collect;
pub mod config;
pub mod effects;
pub mod github;
mod http;
pub mod jobs;
pub mod merge;
pub mod save;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use archive::{
    archive_path, compute_sha256, validate_archive, verify_archive, ArchiveError,
    VerifiedArchive, ARCHIVE_EXTENSION,
};
pub use collect::{
    collect_entries, collect_testbed, format_bytes, CollectRequest, CollectStats, Collection,
    RESULT_FILE,
};
pub use config::{Config, GithubConfig, GlobalOptions, StorageConfig};
pub use effects::{ArchiveStore, Effects, PlatformClient, SystemEffects};
pub use github::{GithubClient, RepoMetadata};
pub use jobs::{job_leaf, job_url, resolve_entry, JobIndex};
pub use merge::{carry_forward, merge_results, overlay_result, seed_package, MergeReport};
pub use save::{run_save, save_collected_builds, BuildLogSummary, SaveRequest, SaveSummary};
pub use storage::HttpArchiveStore;
