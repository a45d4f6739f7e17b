//! Resolution of matrix job names to CI job ids.

use std::collections::HashMap;

use rsv_domain::{Job, MatrixEntry, TestbedEntry};

/// Separator GitHub places between a workflow and its job names.
const WORKFLOW_SEPARATOR: &str = " / ";

/// Last component of a `<workflow> / <job>` name.
#[must_use]
pub fn job_leaf(name: &str) -> &str {
    name.rsplit(WORKFLOW_SEPARATOR).next().unwrap_or(name)
}

/// Lookup of job ids by leaf name. The first job with a given leaf wins.
#[derive(Debug, Clone, Default)]
pub struct JobIndex {
    by_leaf: HashMap<String, u64>,
}

impl JobIndex {
    #[must_use]
    pub fn new(jobs: &[Job]) -> Self {
        let mut by_leaf = HashMap::with_capacity(jobs.len());
        for job in jobs {
            by_leaf.entry(job_leaf(&job.name).to_string()).or_insert(job.id);
        }
        Self { by_leaf }
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<u64> {
        self.by_leaf.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_leaf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_leaf.is_empty()
    }
}

/// Page of a job's log, linked from every build it produced.
#[must_use]
pub fn job_url(repo: &str, run_id: u64, job_id: u64) -> String {
    format!("https://github.com/{repo}/actions/runs/{run_id}/job/{job_id}#step:4:1")
}

/// Attach the executed job to a matrix entry, if one ran.
#[must_use]
pub fn resolve_entry(
    jobs: &JobIndex,
    repo: &str,
    run_id: u64,
    entry: &MatrixEntry,
) -> Option<TestbedEntry> {
    let job_id = jobs.resolve(&entry.job_name)?;
    Some(TestbedEntry {
        entry: entry.clone(),
        job_id,
        url: job_url(repo, run_id, job_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: u64, name: &str) -> Job {
        Job {
            id,
            name: name.into(),
        }
    }

    #[test]
    fn resolves_on_leaf_name_only() {
        let index = JobIndex::new(&[
            job(1, "Testbed / Build acme-widgets"),
            job(2, "plain-job"),
            job(3, "outer / inner / deep"),
        ]);
        assert_eq!(index.resolve("Build acme-widgets"), Some(1));
        assert_eq!(index.resolve("plain-job"), Some(2));
        assert_eq!(index.resolve("deep"), Some(3));
        assert_eq!(index.resolve("Testbed / Build acme-widgets"), None);
        assert_eq!(index.resolve("missing"), None);
    }

    #[test]
    fn first_job_with_a_leaf_wins() {
        let index = JobIndex::new(&[job(10, "a / build"), job(11, "b / build")]);
        assert_eq!(index.resolve("build"), Some(10));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn resolved_entry_carries_job_url() {
        let index = JobIndex::new(&[job(42, "ci / build-r1")]);
        let entry = MatrixEntry {
            repo_id: "r1".into(),
            index_name: "r1".into(),
            job_name: "build-r1".into(),
            artifact: "a1".into(),
        };
        let resolved = resolve_entry(&index, "acme/testbed", 9, &entry).expect("job exists");
        assert_eq!(resolved.job_id, 42);
        assert_eq!(
            resolved.url,
            "https://github.com/acme/testbed/actions/runs/9/job/42#step:4:1"
        );

        let skipped = MatrixEntry {
            job_name: "build-r2".into(),
            ..entry
        };
        assert!(resolve_entry(&index, "acme/testbed", 9, &skipped).is_none());
    }
}
