use std::collections::HashMap;
use std::env;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TESTBED_REPO: &str = "leanprover/reservoir";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
}

impl GlobalOptions {
    /// Log level selected by the verbosity flags.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.trace {
            return "trace";
        }
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    /// Value of `key`, ignoring unset and blank variables.
    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.var(key))
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) github: GithubConfig,
    pub(crate) storage: Option<StorageConfig>,
    pub(crate) testbed_repo: String,
    pub(crate) workers: usize,
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: Url,
    pub token: Option<String>,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if a configured URL or worker count does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let storage = match snapshot.var("RSV_STORAGE_URL") {
            Some(raw) => Some(StorageConfig {
                url: Url::parse(raw).with_context(|| format!("invalid RSV_STORAGE_URL '{raw}'"))?,
                token: snapshot.var("RSV_STORAGE_TOKEN").map(ToOwned::to_owned),
            }),
            None => None,
        };
        let workers = match snapshot.var("RSV_WORKERS") {
            Some(raw) => parse_workers(raw)?,
            None => default_workers(),
        };
        Ok(Self {
            github: GithubConfig {
                api_url: snapshot
                    .var("RSV_GITHUB_API_URL")
                    .unwrap_or(DEFAULT_GITHUB_API_URL)
                    .trim_end_matches('/')
                    .to_string(),
                token: snapshot
                    .first_of(&["RSV_GITHUB_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"])
                    .map(ToOwned::to_owned),
            },
            storage,
            testbed_repo: snapshot
                .var("RSV_TESTBED_REPO")
                .unwrap_or(DEFAULT_TESTBED_REPO)
                .to_string(),
            workers,
        })
    }

    #[must_use]
    pub fn github(&self) -> &GithubConfig {
        &self.github
    }

    #[must_use]
    pub fn storage(&self) -> Option<&StorageConfig> {
        self.storage.as_ref()
    }

    #[must_use]
    pub fn testbed_repo(&self) -> &str {
        &self.testbed_repo
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply per-invocation overrides from the command line.
    #[must_use]
    pub fn with_overrides(mut self, repo: Option<&str>, workers: Option<usize>) -> Self {
        if let Some(repo) = repo {
            self.testbed_repo = repo.to_string();
        }
        if let Some(workers) = workers {
            self.workers = workers.max(1);
        }
        self
    }
}

fn parse_workers(raw: &str) -> Result<usize> {
    let workers: usize = raw
        .parse()
        .map_err(|_| anyhow!("RSV_WORKERS must be a positive integer (got '{raw}')"))?;
    Ok(workers.max(1))
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
