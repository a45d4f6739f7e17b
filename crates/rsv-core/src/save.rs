//! Saving a results manifest into the hierarchical index.

use std::path::{Path, PathBuf};

use anyhow::Result;
use indexmap::IndexMap;
use rsv_domain::{
    load_index, load_results_manifest, save_build_results, write_index, BuildResult, IndexLock,
    Package, TestbedResult,
};
use serde::Serialize;
use tracing::{error, info};

use crate::effects::Effects;
use crate::merge::merge_results;

#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub manifest: PathBuf,
    pub index_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub results: usize,
    pub packages: usize,
    pub missing: usize,
    pub opt_outs: usize,
    pub aliases: usize,
    pub relocated_build_logs: usize,
    pub new_builds: usize,
    pub skipped_build_logs: usize,
}

impl SaveSummary {
    pub fn log_summary(&self) {
        info!(
            "Results: {} ({} opt-outs, {} unknown repositories)",
            self.results, self.opt_outs, self.missing
        );
        info!(
            "Index: {} packages, {} aliases written",
            self.packages, self.aliases
        );
        if self.relocated_build_logs > 0 {
            info!("Build logs moved to renamed packages: {}", self.relocated_build_logs);
        }
        info!(
            "New build results: {} ({} packages skipped)",
            self.new_builds, self.skipped_build_logs
        );
    }
}

/// Merge a results manifest into the index and extend its build logs.
///
/// The read-merge-write cycle holds the index lock throughout.
pub fn run_save(effects: &dyn Effects, request: &SaveRequest) -> Result<SaveSummary> {
    let results = load_results_manifest(&request.manifest)?;
    info!("Loaded {} results from {}", results.len(), request.manifest.display());

    let _lock = IndexLock::acquire(&request.index_dir)?;
    let snapshot = load_index(&request.index_dir)?;
    info!(
        "Index holds {} packages and {} aliases",
        snapshot.packages.len(),
        snapshot.aliases.len()
    );

    let report = merge_results(effects.platform(), &results, &snapshot)?;
    let packages: Vec<Package> = report.packages.values().cloned().collect();
    let written = write_index(&request.index_dir, &packages, &snapshot.aliases)?;

    let mut summary = SaveSummary {
        results: results.len(),
        packages: written.packages,
        missing: report.missing.len(),
        opt_outs: report.opted_out.len(),
        aliases: written.aliases,
        relocated_build_logs: written.relocated_build_logs,
        ..SaveSummary::default()
    };
    for (id, pkg) in &report.packages {
        let Some(result) = results.get(id) else {
            continue;
        };
        match record_builds(&request.index_dir, &pkg.full_name, &result.builds) {
            Some(added) => summary.new_builds += added,
            None => summary.skipped_build_logs += 1,
        }
    }
    summary.log_summary();
    Ok(summary)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildLogSummary {
    pub packages: usize,
    pub new_builds: usize,
    pub skipped_build_logs: usize,
}

/// Record collected builds in the build logs of packages already indexed.
///
/// Packages are addressed by index name and must have a directory in the
/// index. Opted-out results are skipped. Holds the index lock throughout.
pub fn save_collected_builds(index_dir: &Path, results: &[TestbedResult]) -> Result<BuildLogSummary> {
    let _lock = IndexLock::acquire(index_dir)?;
    let mut grouped: IndexMap<&str, Vec<BuildResult>> = IndexMap::new();
    for testbed in results.iter().filter(|testbed| testbed.result.do_index) {
        grouped
            .entry(testbed.index_name.as_str())
            .or_default()
            .extend(testbed.result.builds.iter().cloned());
    }

    let mut summary = BuildLogSummary::default();
    for (full_name, builds) in &grouped {
        summary.packages += 1;
        match record_builds(index_dir, full_name, builds) {
            Some(added) => summary.new_builds += added,
            None => summary.skipped_build_logs += 1,
        }
    }
    info!(
        "New build results: {} across {} packages ({} skipped)",
        summary.new_builds, summary.packages, summary.skipped_build_logs
    );
    Ok(summary)
}

/// Number of builds added, or `None` when the package's log was skipped.
fn record_builds(index_dir: &Path, full_name: &str, builds: &[BuildResult]) -> Option<usize> {
    match save_build_results(index_dir, full_name, builds) {
        Ok(added) => Some(added),
        Err(err) => {
            error!("{err:#}");
            None
        }
    }
}
