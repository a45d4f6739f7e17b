//! Results manifest produced by collection and consumed by the index merge.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::model::{PackageResult, TestbedResult};

/// Results keyed by platform repository id, in manifest order.
pub type ResultsById = IndexMap<String, PackageResult>;

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestShape {
    List(Vec<TestbedResult>),
    ById(IndexMap<String, PackageResult>),
}

pub fn parse_results_manifest(contents: &str) -> Result<ResultsById> {
    let shape: ManifestShape =
        serde_json::from_str(contents).context("results manifest is not valid JSON")?;
    Ok(match shape {
        ManifestShape::List(results) => group_by_repo(results),
        ManifestShape::ById(results) => results,
    })
}

pub fn load_results_manifest(path: &Path) -> Result<ResultsById> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_results_manifest(&contents).with_context(|| format!("parsing {}", path.display()))
}

/// Key results by repository id.
///
/// A repository built by several matrix entries keeps the first entry's
/// metadata; builds of later entries are appended to it.
#[must_use]
pub fn group_by_repo(results: Vec<TestbedResult>) -> ResultsById {
    let mut grouped = ResultsById::new();
    for testbed in results {
        match grouped.get_mut(&testbed.repo_id) {
            Some(existing) => {
                debug!(
                    "{}: folding builds from an additional testbed entry",
                    testbed.repo_id
                );
                existing.builds.extend(testbed.result.builds);
            }
            None => {
                grouped.insert(testbed.repo_id, testbed.result);
            }
        }
    }
    grouped
}
