#![allow(dead_code)]

use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// `rsv` isolated from the caller's GitHub and storage settings.
pub fn rsv(api: &str) -> Command {
    let mut cmd = cargo_bin_cmd!("rsv");
    for var in [
        "RSV_GITHUB_TOKEN",
        "GITHUB_TOKEN",
        "GH_TOKEN",
        "RSV_STORAGE_URL",
        "RSV_STORAGE_TOKEN",
        "RSV_TESTBED_REPO",
        "RSV_WORKERS",
        "RSV_KEEP_PROXIES",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("RSV_GITHUB_API_URL", api);
    cmd
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, value.to_string()).expect("write json");
}

pub fn read_json(path: &Path) -> Value {
    let contents = fs::read_to_string(path).expect("read json");
    serde_json::from_str(&contents).expect("parse json")
}

pub fn entry(id: &str) -> Value {
    json!({
        "repoId": id,
        "indexName": id,
        "jobName": format!("build-{id}"),
        "artifact": format!("a-{id}")
    })
}

pub fn repo_node(id: &str, owner: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "nameWithOwner": format!("{owner}/{name}"),
        "owner": {"login": owner},
        "description": "From GitHub",
        "homepageUrl": null,
        "url": format!("https://github.com/{owner}/{name}"),
        "stargazerCount": 12,
        "createdAt": "2023-01-01T00:00:00Z",
        "updatedAt": "2024-01-01T00:00:00Z",
        "licenseInfo": {"spdxId": "Apache-2.0"},
        "repositoryTopics": {"nodes": []},
        "defaultBranchRef": {"name": "main"}
    })
}
