//! On-disk hierarchical package index.
//!
//! Layout: one directory per full name under the index root, named by
//! [`package_dir_name`]. A package directory holds `metadata.json` (a
//! [`Package`]) and optionally `builds.json` (its build log). An alias
//! directory holds only `alias.json` (an [`Alias`]). Alias directories are
//! never removed. All files are pretty-printed JSON with a trailing newline.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs4::FileExt;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::model::{Alias, BuildKey, BuildResult, Package};

pub const METADATA_FILE: &str = "metadata.json";
pub const ALIAS_FILE: &str = "alias.json";
pub const BUILDS_FILE: &str = "builds.json";
const LOCK_FILE: &str = ".rsv-index.lock";

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("{full_name}: build save failed: {} does not exist", dir.display())]
    MissingPackageDir { full_name: String, dir: PathBuf },
    #[error("index entry {} is malformed: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

/// Packages and aliases read from an index directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub packages: Vec<Package>,
    pub aliases: Vec<Alias>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexWriteSummary {
    pub packages: usize,
    pub aliases: usize,
    pub relocated_build_logs: usize,
}

/// Filesystem-safe directory name for a full name.
///
/// Hyphens are doubled before `/` becomes a hyphen, so `a-b/c` (`a--b-c`)
/// and `a/b-c` (`a-b--c`) stay distinct.
#[must_use]
pub fn package_dir_name(full_name: &str) -> String {
    full_name.replace('-', "--").replace('/', "-")
}

#[must_use]
pub fn package_dir(root: &Path, full_name: &str) -> PathBuf {
    root.join(package_dir_name(full_name))
}

pub fn load_index(root: &Path) -> Result<IndexSnapshot> {
    let mut snapshot = IndexSnapshot::default();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("index {} does not exist yet", root.display());
            return Ok(snapshot);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading index {}", root.display()));
        }
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("reading index {}", root.display()))?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    for dir in dirs {
        let metadata = dir.join(METADATA_FILE);
        let alias = dir.join(ALIAS_FILE);
        if metadata.is_file() {
            snapshot.packages.push(read_entry(&metadata)?);
        } else if alias.is_file() {
            snapshot.aliases.push(read_entry(&alias)?);
        } else {
            debug!("ignoring {} (no index entry)", dir.display());
        }
    }
    Ok(snapshot)
}

/// Write package metadata and alias entries.
///
/// Aliases are the union of `aliases` and every package's renames. An alias
/// whose name is recorded as a rename is retargeted to that package; an
/// alias whose name is a live package is not written. When an alias replaces
/// a stale package directory, its build log moves to the target package if
/// the target has none yet.
pub fn write_index(root: &Path, packages: &[Package], aliases: &[Alias]) -> Result<IndexWriteSummary> {
    fs::create_dir_all(root).with_context(|| format!("creating index {}", root.display()))?;
    let mut summary = IndexWriteSummary::default();

    let live: HashSet<&str> = packages.iter().map(|pkg| pkg.full_name.as_str()).collect();
    for pkg in packages {
        let dir = package_dir(root, &pkg.full_name);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        remove_if_exists(&dir.join(ALIAS_FILE))?;
        write_json(&dir.join(METADATA_FILE), pkg)?;
        summary.packages += 1;
    }

    let mut retarget: HashMap<&str, &str> = HashMap::new();
    for pkg in packages {
        for rename in &pkg.renames {
            retarget.insert(rename.name.as_str(), pkg.full_name.as_str());
        }
    }

    let mut resolved: BTreeMap<&str, &str> = BTreeMap::new();
    for alias in aliases {
        let target = retarget
            .get(alias.name.as_str())
            .or_else(|| retarget.get(alias.target.as_str()))
            .copied()
            .unwrap_or(alias.target.as_str());
        resolved.insert(alias.name.as_str(), target);
    }
    for pkg in packages {
        for rename in &pkg.renames {
            resolved.insert(rename.name.as_str(), pkg.full_name.as_str());
        }
    }

    for (name, target) in resolved {
        if live.contains(name) || name == target {
            continue;
        }
        let dir = package_dir(root, name);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let stale = dir.join(METADATA_FILE);
        if stale.exists() {
            if relocate_build_log(&dir, &package_dir(root, target))? {
                summary.relocated_build_logs += 1;
            }
            fs::remove_file(&stale).with_context(|| format!("removing {}", stale.display()))?;
        }
        let alias = Alias {
            name: name.to_string(),
            target: target.to_string(),
        };
        write_json(&dir.join(ALIAS_FILE), &alias)?;
        summary.aliases += 1;
    }
    Ok(summary)
}

fn relocate_build_log(from_dir: &Path, to_dir: &Path) -> Result<bool> {
    let from = from_dir.join(BUILDS_FILE);
    let to = to_dir.join(BUILDS_FILE);
    if !from.exists() {
        return Ok(false);
    }
    if to.exists() || !to_dir.is_dir() {
        warn!(
            "leaving build log {} in place; {} already has one",
            from.display(),
            to_dir.display()
        );
        return Ok(false);
    }
    fs::rename(&from, &to)
        .with_context(|| format!("moving {} to {}", from.display(), to.display()))?;
    Ok(true)
}

/// Append builds whose identity is not yet in `existing`.
///
/// Existing entries are never replaced, and duplicates within `new` keep
/// their first occurrence. Applying the same `new` twice is a no-op.
#[must_use]
pub fn insert_build_results<I>(existing: Vec<BuildResult>, new: I) -> Vec<BuildResult>
where
    I: IntoIterator<Item = BuildResult>,
{
    let mut seen: HashSet<BuildKey> = existing.iter().map(BuildResult::key).collect();
    let mut merged = existing;
    for build in new {
        if seen.insert(build.key()) {
            merged.push(build);
        }
    }
    merged
}

/// Merge `builds` into the build log of the package named `full_name`.
///
/// Returns the number of newly recorded builds.
pub fn save_build_results(root: &Path, full_name: &str, builds: &[BuildResult]) -> Result<usize> {
    let dir = package_dir(root, full_name);
    if !dir.is_dir() {
        return Err(IndexError::MissingPackageDir {
            full_name: full_name.to_string(),
            dir,
        }
        .into());
    }
    let path = dir.join(BUILDS_FILE);
    let existing: Vec<BuildResult> = if path.exists() {
        read_entry(&path)?
    } else {
        Vec::new()
    };
    let before = existing.len();
    let merged = insert_build_results(existing, builds.iter().cloned());
    let added = merged.len() - before;
    if added > 0 || !path.exists() {
        write_json(&path, &merged)?;
    }
    Ok(added)
}

/// Exclusive advisory lock over an index directory, released on drop.
#[derive(Debug)]
pub struct IndexLock {
    _file: File,
}

impl IndexLock {
    pub fn acquire(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("creating index {}", root.display()))?;
        let path = root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("failed to lock {}", path.display()))?;
        Ok(Self { _file: file })
    }
}

/// Pretty JSON with a trailing newline, the format of every index file.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut rendered = serde_json::to_string_pretty(value)?;
    rendered.push('\n');
    Ok(rendered)
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, render_json(value)?).with_context(|| format!("writing {}", path.display()))
}

fn read_entry<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).map_err(|err| {
        IndexError::Malformed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
        .into()
    })
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
    }
}
