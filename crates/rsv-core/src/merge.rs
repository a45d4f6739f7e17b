//! Merge of testbed results into index package records.

use std::collections::HashSet;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use rsv_domain::{
    latest_timestamp, IndexSnapshot, Package, PackageResult, PackageSource,
    ResultsById, Version, GITHUB_HOST,
};
use tracing::{debug, error};

use crate::effects::PlatformClient;
use crate::github::RepoMetadata;

/// Packages produced by a merge, keyed by platform id in results order.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub packages: IndexMap<String, Package>,
    /// Result ids the platform no longer knows.
    pub missing: Vec<String>,
    /// Result ids whose owners declined indexing.
    pub opted_out: Vec<String>,
}

/// Fresh package record for a repository as the platform reports it.
#[must_use]
pub fn seed_package(repo: &RepoMetadata) -> Package {
    Package {
        id: repo.id.clone(),
        owner: repo.owner.clone(),
        name: repo.name.clone(),
        full_name: repo.full_name.clone(),
        description: repo.description.clone(),
        homepage: repo.homepage.clone(),
        keywords: repo.topics.clone(),
        license: repo.license.clone(),
        stars: repo.stars,
        created_at: Some(repo.created_at.clone()),
        updated_at: repo.updated_at.clone(),
        sources: vec![PackageSource {
            kind: "git".into(),
            host: GITHUB_HOST.into(),
            id: repo.id.clone(),
            full_name: repo.full_name.clone(),
            repo_url: repo.url.clone(),
            git_url: format!("{}.git", repo.url),
            default_branch: repo.default_branch.clone(),
        }],
        versions: Vec::new(),
        renames: Vec::new(),
    }
}

/// Carry an indexed record's identity history and versions onto `pkg`.
pub fn carry_forward(pkg: &mut Package, indexed: &Package) {
    pkg.record_rename(&indexed.full_name);
    for alias in &indexed.renames {
        pkg.record_rename(&alias.name);
    }
    pkg.versions = merge_versions(pkg.versions.clone(), indexed.versions.iter().cloned());
}

/// Overlay a result's fields. Absent fields keep the package's values.
pub fn overlay_result(pkg: &mut Package, result: &PackageResult) {
    let name = result.name.clone().unwrap_or_else(|| pkg.name.clone());
    pkg.set_name(name);
    if let Some(description) = &result.description {
        pkg.description = Some(description.clone());
    }
    if let Some(homepage) = &result.homepage {
        pkg.homepage = Some(homepage.clone());
    }
    if let Some(keywords) = &result.keywords {
        pkg.keywords.clone_from(keywords);
    }
    let updated_at = latest_timestamp(&pkg.updated_at, &result.head_version.date).to_string();
    pkg.updated_at = updated_at;

    let prior = std::mem::take(&mut pkg.versions);
    let fresh = std::iter::once(result.head_version.clone()).chain(result.versions.iter().cloned());
    pkg.versions = merge_versions(fresh.collect(), prior);
    pkg.retarget_renames();
}

/// Identity of a version entry. Tagged releases may share the head commit.
fn version_key(version: &Version) -> (String, Option<String>, Option<String>) {
    (
        version.revision.clone(),
        version.tag.clone(),
        version.version.clone(),
    )
}

/// `fresh` as given, followed by the `prior` versions it does not already list.
fn merge_versions<I>(fresh: Vec<Version>, prior: I) -> Vec<Version>
where
    I: IntoIterator<Item = Version>,
{
    let mut seen: HashSet<_> = fresh.iter().map(version_key).collect();
    let mut merged = fresh;
    merged.extend(prior.into_iter().filter(|version| seen.insert(version_key(version))));
    merged
}

/// Build the package records for every indexable result.
///
/// # Errors
/// Fails only if the metadata query itself fails. Unknown ids are logged
/// and reported in [`MergeReport::missing`].
pub fn merge_results(
    client: &dyn PlatformClient,
    results: &ResultsById,
    index: &IndexSnapshot,
) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    let mut ids = Vec::with_capacity(results.len());
    for (id, result) in results {
        if result.do_index {
            ids.push(id.clone());
        } else {
            debug!("{id}: opted out of the index; not merging");
            report.opted_out.push(id.clone());
        }
    }

    let repos = client
        .query_repo_data(&ids)
        .context("failed to query repository metadata")?;
    for (id, repo) in ids.iter().zip(repos) {
        match repo {
            Some(repo) => {
                report.packages.insert(id.clone(), seed_package(&repo));
            }
            None => {
                error!("Repository ID '{id}' not found on GitHub");
                report.missing.push(id.clone());
            }
        }
    }

    for indexed in &index.packages {
        let id = indexed.platform_id();
        if let Some(pkg) = report.packages.get_mut(id) {
            carry_forward(pkg, indexed);
        } else if report.missing.iter().any(|missing| missing == id) {
            error!(
                "{}: Repository ID '{id}' not found on GitHub",
                indexed.full_name
            );
        }
    }

    for (id, pkg) in &mut report.packages {
        if let Some(result) = results.get(id) {
            overlay_result(pkg, result);
            if !pkg.renames.is_empty() {
                debug!(
                    "{}: also known as {}",
                    pkg.full_name,
                    pkg.renames
                        .iter()
                        .map(|alias| alias.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{repo, FakePlatform};
    use rsv_domain::Alias;

    fn version(revision: &str, date: &str) -> Version {
        Version {
            version: None,
            revision: revision.into(),
            date: date.into(),
            tag: None,
            toolchain: None,
            license: None,
        }
    }

    fn result(name: Option<&str>, description: Option<&str>) -> PackageResult {
        PackageResult {
            name: name.map(ToString::to_string),
            description: description.map(ToString::to_string),
            homepage: None,
            keywords: None,
            do_index: true,
            head_version: version("head", "2024-06-01T00:00:00Z"),
            versions: vec![version("v1", "2024-05-01T00:00:00Z")],
            builds: Vec::new(),
        }
    }

    #[test]
    fn absent_fields_keep_existing_values() {
        let mut pkg = seed_package(&repo("R_1", "acme", "Foo"));
        pkg.description = Some("old".into());
        overlay_result(&mut pkg, &result(None, Some("new")));
        assert_eq!(pkg.name, "Foo");
        assert_eq!(pkg.full_name, "acme/Foo");
        assert_eq!(pkg.description.as_deref(), Some("new"));
        assert_eq!(pkg.keywords, vec!["lean4".to_string()]);
    }

    #[test]
    fn result_name_rederives_full_name_and_retargets() {
        let mut pkg = seed_package(&repo("R_1", "acme", "Foo"));
        pkg.record_rename("acme/older");
        overlay_result(&mut pkg, &result(Some("Bar"), None));
        assert_eq!(pkg.full_name, "acme/Bar");
        assert_eq!(
            pkg.renames,
            vec![Alias {
                name: "acme/older".into(),
                target: "acme/Bar".into()
            }]
        );
    }

    #[test]
    fn versions_put_head_first_and_keep_prior_revisions() {
        let mut pkg = seed_package(&repo("R_1", "acme", "Foo"));
        pkg.versions = vec![
            version("v1", "2024-05-01T00:00:00Z"),
            version("v0", "2024-01-01T00:00:00Z"),
        ];
        overlay_result(&mut pkg, &result(None, None));
        let revisions: Vec<&str> = pkg.versions.iter().map(|v| v.revision.as_str()).collect();
        assert_eq!(revisions, vec!["head", "v1", "v0"]);
        assert_eq!(pkg.updated_at, "2024-06-01T00:00:00Z");
    }

    #[test]
    fn tagged_versions_sharing_the_head_revision_are_kept() {
        let tagged = |tag: &str, release: &str, revision: &str| Version {
            version: Some(release.into()),
            tag: Some(tag.into()),
            ..version(revision, "2024-05-01T00:00:00Z")
        };
        let mut pkg = seed_package(&repo("R_1", "acme", "Foo"));
        pkg.versions = vec![
            tagged("v1.0.0", "1.0.0", "abc"),
            version("old", "2023-01-01T00:00:00Z"),
        ];
        let mut fresh = result(None, None);
        fresh.head_version = version("abc", "2024-06-01T00:00:00Z");
        fresh.versions = vec![
            tagged("v1.0.0", "1.0.0", "abc"),
            tagged("v1.0.0-rc1", "1.0.0-rc1", "abc"),
            tagged("v0.9.0", "0.9.0", "def"),
        ];
        overlay_result(&mut pkg, &fresh);

        let listed: Vec<(&str, Option<&str>)> = pkg
            .versions
            .iter()
            .map(|v| (v.revision.as_str(), v.tag.as_deref()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("abc", None),
                ("abc", Some("v1.0.0")),
                ("abc", Some("v1.0.0-rc1")),
                ("def", Some("v0.9.0")),
                ("old", None),
            ]
        );
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let mut pkg = seed_package(&repo("R_1", "acme", "Foo"));
        pkg.updated_at = "2025-01-01T00:00:00Z".into();
        overlay_result(&mut pkg, &result(None, None));
        assert_eq!(pkg.updated_at, "2025-01-01T00:00:00Z");
    }

    #[test]
    fn merge_carries_index_history_and_drops_unknown_ids() -> Result<()> {
        let client = FakePlatform::with_repos(vec![repo("R_1", "acme", "renamed")]);
        let mut indexed = seed_package(&repo("R_1", "acme", "Foo"));
        indexed.description = Some("old".into());
        indexed.renames.push(Alias {
            name: "acme/original".into(),
            target: "acme/Foo".into(),
        });
        indexed.versions = vec![version("v0", "2023-06-01T00:00:00Z")];
        let index = IndexSnapshot {
            packages: vec![indexed],
            aliases: Vec::new(),
        };

        let mut results = ResultsById::new();
        results.insert("R_1".into(), result(None, Some("new")));
        results.insert("R_gone".into(), result(None, None));
        let mut opted_out = result(None, None);
        opted_out.do_index = false;
        results.insert("R_opt".into(), opted_out);

        let report = merge_results(&client, &results, &index)?;
        assert_eq!(report.missing, vec!["R_gone".to_string()]);
        assert_eq!(report.opted_out, vec!["R_opt".to_string()]);
        assert_eq!(
            *client.queries.lock().expect("queries lock"),
            vec![vec!["R_1".to_string(), "R_gone".to_string()]]
        );

        let pkg = &report.packages["R_1"];
        assert_eq!(pkg.full_name, "acme/renamed");
        assert_eq!(pkg.description.as_deref(), Some("new"));
        let renames: Vec<&str> = pkg.renames.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(renames, vec!["acme/Foo", "acme/original"]);
        assert!(pkg.renames.iter().all(|alias| alias.target == "acme/renamed"));
        let revisions: Vec<&str> = pkg.versions.iter().map(|v| v.revision.as_str()).collect();
        assert_eq!(revisions, vec!["head", "v1", "v0"]);
        Ok(())
    }
}
