//! GitHub REST/GraphQL client for testbed jobs and repository metadata.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use rsv_domain::Job;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::GithubConfig;
use crate::effects::PlatformClient;
use crate::http::{build_http_client, send_with_retry};

const JOBS_PER_PAGE: usize = 100;
const NODES_PER_QUERY: usize = 100;
const TOPICS_PER_REPO: usize = 20;

/// Repository metadata as currently reported by GitHub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMetadata {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub topics: Vec<String>,
    pub stars: u64,
    pub license: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub url: String,
    pub default_branch: Option<String>,
}

pub struct GithubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn jobs_page(&self, repo: &str, run_id: u64, attempt: u32, page: usize) -> Result<JobsPage> {
        let url = format!(
            "{}/repos/{repo}/actions/runs/{run_id}/attempts/{attempt}/jobs",
            self.api_url
        );
        let label = format!("jobs of run {run_id} (page {page})");
        let response = send_with_retry(&label, || {
            self.authorize(self.client.get(&url)).query(&[
                ("per_page", JOBS_PER_PAGE.to_string()),
                ("page", page.to_string()),
            ])
        })?
        .error_for_status()
        .with_context(|| format!("unexpected response for {url}"))?;
        response
            .json()
            .with_context(|| format!("invalid jobs payload from {url}"))
    }

    fn query_nodes(&self, ids: &[String]) -> Result<Vec<Option<RepoMetadata>>> {
        let url = format!("{}/graphql", self.api_url);
        let body = json!({
            "query": REPO_NODES_QUERY,
            "variables": { "ids": ids },
        });
        let response = send_with_retry("repository metadata query", || {
            self.authorize(self.client.post(&url)).json(&body)
        })?
        .error_for_status()
        .with_context(|| format!("unexpected response for {url}"))?;
        let payload: GraphqlResponse = response
            .json()
            .with_context(|| format!("invalid GraphQL payload from {url}"))?;
        for error in &payload.errors {
            debug!("GraphQL: {}", error.message);
        }
        let nodes = payload
            .data
            .map(|data| data.nodes)
            .ok_or_else(|| match payload.errors.first() {
                Some(error) => anyhow!("repository metadata query failed: {}", error.message),
                None => anyhow!("repository metadata query returned no data"),
            })?;
        if nodes.len() != ids.len() {
            bail!(
                "repository metadata query returned {} nodes for {} ids",
                nodes.len(),
                ids.len()
            );
        }
        Ok(nodes.into_iter().map(repo_of_node).collect())
    }
}

impl PlatformClient for GithubClient {
    fn list_jobs(&self, repo: &str, run_id: u64, attempt: u32) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.jobs_page(repo, run_id, attempt, page)?;
            let received = batch.jobs.len();
            jobs.extend(batch.jobs);
            if received == 0 || jobs.len() >= batch.total_count {
                break;
            }
            page += 1;
        }
        debug!("run {run_id} attempt {attempt}: {} jobs", jobs.len());
        Ok(jobs)
    }

    fn query_repo_data(&self, ids: &[String]) -> Result<Vec<Option<RepoMetadata>>> {
        let mut repos = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(NODES_PER_QUERY) {
            repos.extend(self.query_nodes(chunk)?);
        }
        Ok(repos)
    }
}

#[derive(Deserialize)]
struct JobsPage {
    total_count: usize,
    jobs: Vec<Job>,
}

const REPO_NODES_QUERY: &str = concat!(
    "query($ids: [ID!]!) { nodes(ids: $ids) { ... on Repository { ",
    "id name nameWithOwner owner { login } description homepageUrl url ",
    "stargazerCount createdAt updatedAt licenseInfo { spdxId } ",
    "repositoryTopics(first: 20) { nodes { topic { name } } } ",
    "defaultBranchRef { name } } } }"
);

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<NodesData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct NodesData {
    nodes: Vec<Option<Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    id: String,
    name: String,
    name_with_owner: String,
    owner: Login,
    description: Option<String>,
    homepage_url: Option<String>,
    url: String,
    #[serde(default)]
    stargazer_count: u64,
    created_at: String,
    updated_at: String,
    license_info: Option<License>,
    repository_topics: Option<Topics>,
    default_branch_ref: Option<BranchRef>,
}

#[derive(Deserialize)]
struct Login {
    login: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct License {
    spdx_id: Option<String>,
}

#[derive(Deserialize)]
struct Topics {
    nodes: Vec<TopicNode>,
}

#[derive(Deserialize)]
struct TopicNode {
    topic: Topic,
}

#[derive(Deserialize)]
struct Topic {
    name: String,
}

#[derive(Deserialize)]
struct BranchRef {
    name: String,
}

fn repo_of_node(node: Option<Value>) -> Option<RepoMetadata> {
    let node: RepoNode = match serde_json::from_value(node?) {
        Ok(node) => node,
        Err(err) => {
            warn!("skipping non-repository node: {err}");
            return None;
        }
    };
    let topics = node
        .repository_topics
        .map(|topics| {
            topics
                .nodes
                .into_iter()
                .take(TOPICS_PER_REPO)
                .map(|node| node.topic.name)
                .collect()
        })
        .unwrap_or_default();
    Some(RepoMetadata {
        id: node.id,
        owner: node.owner.login,
        name: node.name,
        full_name: node.name_with_owner,
        description: node.description.filter(|text| !text.trim().is_empty()),
        homepage: node.homepage_url.filter(|url| !url.trim().is_empty()),
        topics,
        stars: node.stargazer_count,
        license: node.license_info.and_then(|license| license.spdx_id),
        created_at: node.created_at,
        updated_at: node.updated_at,
        url: node.url,
        default_branch: node.default_branch_ref.map(|branch| branch.name),
    })
}
