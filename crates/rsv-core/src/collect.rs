//! Collection of per-package testbed results from a downloaded run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use rsv_domain::{
    default_matrix_path, load_matrix, BuildResult, MatrixEntry, PackageResult, TestbedResult,
};
use serde::Serialize;
use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, error, info, warn};

use crate::archive::{archive_path, verify_archive};
use crate::effects::{ArchiveStore, Effects};
use crate::jobs::{resolve_entry, JobIndex};

pub const RESULT_FILE: &str = "result.json";

#[derive(Debug, Clone)]
pub struct CollectRequest {
    /// Directory holding one artifact directory per matrix entry.
    pub results_dir: PathBuf,
    /// Matrix file; defaults to `<results>/matrix/matrix.json`.
    pub matrix: Option<PathBuf>,
    pub repo: String,
    pub run_id: u64,
    pub attempt: u32,
    pub workers: usize,
}

/// Counters reported at the end of a collection pass.
///
/// Only archives that pass hash validation count toward `archives` and
/// `total_archive_size`; rejected ones are tallied separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectStats {
    pub entries: usize,
    pub missing_jobs: usize,
    pub missing_results: usize,
    pub packages: usize,
    pub opt_outs: usize,
    pub builds: usize,
    pub archives: usize,
    pub rejected_archives: usize,
    pub uploads: usize,
    pub failed_uploads: usize,
    pub total_archive_size: u64,
}

impl CollectStats {
    fn absorb(&mut self, other: &CollectStats) {
        self.entries += other.entries;
        self.missing_jobs += other.missing_jobs;
        self.missing_results += other.missing_results;
        self.packages += other.packages;
        self.opt_outs += other.opt_outs;
        self.builds += other.builds;
        self.archives += other.archives;
        self.rejected_archives += other.rejected_archives;
        self.uploads += other.uploads;
        self.failed_uploads += other.failed_uploads;
        self.total_archive_size += other.total_archive_size;
    }

    /// Mean size of the counted archives, rounded to the nearest byte.
    #[must_use]
    pub fn average_archive_size(&self) -> u64 {
        let count = self.archives as u64;
        if count == 0 {
            0
        } else {
            (self.total_archive_size + count / 2) / count
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Testbed entries: {} ({} without a job, {} without a result)",
            self.entries, self.missing_jobs, self.missing_results
        );
        info!(
            "Package results: {} ({} opt-outs)",
            self.packages, self.opt_outs
        );
        info!(
            "Build results: {} ({} with archives, {} archives rejected)",
            self.builds, self.archives, self.rejected_archives
        );
        if self.uploads > 0 || self.failed_uploads > 0 {
            info!(
                "Archive uploads: {} ({} failed)",
                self.uploads, self.failed_uploads
            );
        }
        info!(
            "Total size of build archives: {} ({} bytes)",
            format_bytes(self.total_archive_size),
            self.total_archive_size
        );
        let average = self.average_archive_size();
        info!(
            "Average build archive size: {} ({average} bytes)",
            format_bytes(average)
        );
    }
}

#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub results: Vec<TestbedResult>,
    pub stats: CollectStats,
}

struct EntryOutcome {
    result: Option<TestbedResult>,
    stats: CollectStats,
}

/// Load the matrix, list the run's jobs, and collect every entry's result.
///
/// # Errors
/// Fails only when the matrix cannot be read, the jobs cannot be listed, or
/// the worker pool cannot start. Per-entry problems are logged and counted.
pub fn collect_testbed(effects: &dyn Effects, request: &CollectRequest) -> Result<Collection> {
    let storage = effects.storage();
    if storage.is_none() {
        warn!("No archive storage configured; build archives will not be retained");
    }

    let matrix_path = request
        .matrix
        .clone()
        .unwrap_or_else(|| default_matrix_path(&request.results_dir));
    let matrix = load_matrix(&matrix_path)?;
    let entries: Vec<MatrixEntry> = matrix.entries().cloned().collect();
    info!("Testbed entries: {}", entries.len());

    let jobs = effects
        .platform()
        .list_jobs(&request.repo, request.run_id, request.attempt)
        .with_context(|| {
            format!(
                "failed to list jobs of {} run {} (attempt {})",
                request.repo, request.run_id, request.attempt
            )
        })?;
    let jobs = JobIndex::new(&jobs);
    debug!("{} distinct job names in run {}", jobs.len(), request.run_id);

    let collection = collect_entries(&entries, &jobs, request, storage)?;
    collection.stats.log_summary();
    Ok(collection)
}

/// Process entries on a bounded pool; results come back in matrix order.
pub fn collect_entries(
    entries: &[MatrixEntry],
    jobs: &JobIndex,
    request: &CollectRequest,
    storage: Option<&dyn ArchiveStore>,
) -> Result<Collection> {
    let built_at = utc_timestamp()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(request.workers.max(1))
        .build()
        .context("failed to start collector workers")?;
    let outcomes: Vec<EntryOutcome> = pool.install(|| {
        entries
            .par_iter()
            .map(|entry| collect_entry(entry, jobs, request, storage, &built_at))
            .collect()
    });

    let mut collection = Collection::default();
    for outcome in outcomes {
        collection.stats.absorb(&outcome.stats);
        if let Some(result) = outcome.result {
            collection.results.push(result);
        }
    }
    Ok(collection)
}

fn collect_entry(
    entry: &MatrixEntry,
    jobs: &JobIndex,
    request: &CollectRequest,
    storage: Option<&dyn ArchiveStore>,
    built_at: &str,
) -> EntryOutcome {
    let mut stats = CollectStats {
        entries: 1,
        ..CollectStats::default()
    };
    let Some(testbed) = resolve_entry(jobs, &request.repo, request.run_id, entry) else {
        error!("Job ID not found for '{}'", entry.job_name);
        stats.missing_jobs = 1;
        return EntryOutcome {
            result: None,
            stats,
        };
    };

    let artifact_dir = request.results_dir.join(&entry.artifact);
    let Some(package) = read_package_result(&artifact_dir) else {
        stats.missing_results = 1;
        return EntryOutcome {
            result: None,
            stats,
        };
    };

    let mut result = TestbedResult::new(entry, package);
    stats.packages = 1;
    if !result.result.do_index {
        info!(
            "[{}] '{}' opted-out of the index",
            entry.job_name, entry.repo_id
        );
        stats.opt_outs = 1;
    }

    for build in &mut result.result.builds {
        build.url = Some(testbed.url.clone());
        if build.built_at.is_none() {
            build.built_at = Some(built_at.to_string());
        }
        stats.builds += 1;
        check_archive(build, &entry.job_name, &artifact_dir, storage, &mut stats);
    }

    EntryOutcome {
        result: Some(result),
        stats,
    }
}

fn check_archive(
    build: &mut BuildResult,
    job_name: &str,
    artifact_dir: &Path,
    storage: Option<&dyn ArchiveStore>,
    stats: &mut CollectStats,
) {
    let Some(hash) = build.archive_hash.clone() else {
        return;
    };
    let archive = match verify_archive(&archive_path(artifact_dir, &hash), &hash) {
        Ok(archive) => archive,
        Err(err) => {
            error!("[{job_name}] {err}");
            build.drop_archive();
            stats.rejected_archives += 1;
            return;
        }
    };

    let size = *build.archive_size.get_or_insert(archive.size);
    stats.archives += 1;
    stats.total_archive_size += size;

    let Some(storage) = storage else {
        return;
    };
    match storage.upload(&archive.path, size, &archive.hash) {
        Ok(()) => {
            debug!("[{job_name}] uploaded archive {hash}");
            stats.uploads += 1;
        }
        Err(err) => {
            error!("[{job_name}] failed to upload archive {hash}: {err:#}");
            stats.failed_uploads += 1;
        }
    }
}

/// A missing or unparsable result file means the job produced no result.
fn read_package_result(artifact_dir: &Path) -> Option<PackageResult> {
    let path = artifact_dir.join(RESULT_FILE);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!("{}: no result ({err})", path.display());
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(result) => Some(result),
        Err(err) => {
            debug!("{}: unusable result ({err})", path.display());
            None
        }
    }
}

fn utc_timestamp() -> Result<String> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
    Ok(OffsetDateTime::now_utc().format(format)?)
}

/// Human-readable size in binary units.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
