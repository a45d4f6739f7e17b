//! Records exchanged between the testbed, the collector, and the index.

use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// A CI job executed as part of a testbed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub name: String,
}

/// One scheduled build in the testbed matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixEntry {
    pub repo_id: String,
    pub index_name: String,
    pub job_name: String,
    /// Path of the job's output bundle, relative to the results directory.
    pub artifact: String,
}

/// A matrix entry whose CI job has been located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestbedEntry {
    pub entry: MatrixEntry,
    pub job_id: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub revision: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    /// Toolchain (or other build target) the package was built against.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_at: Option<String>,
}

/// Identity of a build inside a package's build log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildKey {
    pub target: String,
    pub discriminator: Option<String>,
}

impl BuildResult {
    /// `(target, archiveHash)`, falling back to `builtAt` when no archive was produced.
    #[must_use]
    pub fn key(&self) -> BuildKey {
        BuildKey {
            target: self.target.clone(),
            discriminator: self
                .archive_hash
                .clone()
                .or_else(|| self.built_at.clone()),
        }
    }

    /// Forget the archive linkage while keeping the rest of the build record.
    pub fn drop_archive(&mut self) {
        self.archive_hash = None;
        self.archive_size = None;
    }
}

/// Output of one testbed job for one package.
///
/// `None` in the descriptive fields means "unchanged from the index".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageResult {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    pub do_index: bool,
    pub head_version: Version,
    #[serde(default)]
    pub versions: Vec<Version>,
    #[serde(default)]
    pub builds: Vec<BuildResult>,
}

/// A [`PackageResult`] tagged with the matrix entry that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestbedResult {
    pub repo_id: String,
    pub index_name: String,
    #[serde(flatten)]
    pub result: PackageResult,
}

impl TestbedResult {
    #[must_use]
    pub fn new(entry: &MatrixEntry, result: PackageResult) -> Self {
        Self {
            repo_id: entry.repo_id.clone(),
            index_name: entry.index_name.clone(),
            result,
        }
    }
}

/// A prior full name under which a package was known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub id: String,
    pub full_name: String,
    pub repo_url: String,
    pub git_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

pub const GITHUB_HOST: &str = "github";

/// Index record for a tracked package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    pub updated_at: String,
    #[serde(default)]
    pub sources: Vec<PackageSource>,
    #[serde(default)]
    pub versions: Vec<Version>,
    #[serde(default)]
    pub renames: Vec<Alias>,
}

impl Package {
    /// Platform id of the package's GitHub source, or its own id.
    #[must_use]
    pub fn platform_id(&self) -> &str {
        self.sources
            .iter()
            .find(|source| source.host == GITHUB_HOST)
            .map_or(self.id.as_str(), |source| source.id.as_str())
    }

    /// Rename the package, keeping `fullName` as `owner/name`.
    pub fn set_name(&mut self, name: String) {
        self.full_name = full_name(&self.owner, &name);
        self.name = name;
    }

    /// Record `name` as a prior identity unless it is the current one or already known.
    pub fn record_rename(&mut self, name: &str) {
        if name == self.full_name || self.renames.iter().any(|alias| alias.name == name) {
            return;
        }
        self.renames.push(Alias {
            name: name.to_string(),
            target: self.full_name.clone(),
        });
    }

    /// Point every rename at the current full name.
    ///
    /// A rename equal to the current name is dropped: a package renamed back
    /// owns that name again, and the name it left becomes the alias.
    pub fn retarget_renames(&mut self) {
        let current = self.full_name.clone();
        self.renames.retain(|alias| alias.name != current);
        for alias in &mut self.renames {
            alias.target.clone_from(&current);
        }
    }
}

#[must_use]
pub fn full_name(owner: &str, name: &str) -> String {
    format!("{owner}/{name}")
}

/// The later of two RFC 3339 timestamps.
///
/// Falls back to lexical order when either side does not parse.
#[must_use]
pub fn latest_timestamp<'a>(left: &'a str, right: &'a str) -> &'a str {
    match (
        OffsetDateTime::parse(left, &Rfc3339),
        OffsetDateTime::parse(right, &Rfc3339),
    ) {
        (Ok(a), Ok(b)) => {
            if b > a {
                right
            } else {
                left
            }
        }
        _ => std::cmp::max(left, right),
    }
}
