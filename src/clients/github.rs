#![allow(async_fn_in_trait)]

use std::fmt::Display;
use std::sync::LazyLock;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
#[cfg(test)]
use mockall::automock;
use regex::Regex;
use serde::Deserialize;
use tracing::instrument;

use super::github_curl::GithubCurlClient;
use crate::branch::CommitId;

/// GraphQL caps page sizes at 100.
const MAX_PAGE_SIZE: usize = 100;

const PULL_REQUESTS_QUERY: &str = r#"
query($owner: String!, $name: String!, $limit: Int!) {
  repository(owner: $owner, name: $name) {
    pullRequests(orderBy: {field: UPDATED_AT, direction: DESC}, first: $limit) {
      nodes {
        number
        baseRefName
        mergedAt
        mergeCommit {
          oid
        }
      }
    }
  }
}
"#;

static HTTPS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:[^@/]+@)?([^/]+)/([^/]+)/([^/]+?)(?:\.git)?/?$").unwrap()
});
static SSH_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:ssh://)?git@([^:/]+)[:/]([^/]+)/([^/]+?)(?:\.git)?/?$").unwrap()
});

// -----------------------------------------------------------------------------
// GithubOps trait

/// Operations for querying the hosting service.
#[cfg_attr(test, automock)]
pub trait GithubOps {
    /// The most recently updated pull requests of a repository, newest first.
    async fn recent_pull_requests(
        &self,
        repo: &Repository,
        limit: usize,
    ) -> Result<Vec<PullRequest>>;
}

// -----------------------------------------------------------------------------
// Types

/// A repository on a GitHub (or GitHub Enterprise) host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub domain: String,
    pub owner: String,
    pub name: String,
}

impl Repository {
    /// Public GitHub serves its API from `api.<domain>`; Enterprise hosts serve
    /// it under `/api` on the same host.
    pub fn graphql_endpoint(&self) -> String {
        if self.domain.matches('.').count() == 1 {
            format!("https://api.{}/graphql", self.domain)
        } else {
            format!("https://{}/api/graphql", self.domain)
        }
    }
}

impl Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.domain, self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub base_ref_name: String,
    /// RFC 3339 timestamp, absent unless merged.
    pub merged_at: Option<String>,
    /// Absent for open and closed-unmerged pull requests.
    pub merge_commit: Option<CommitId>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<RepositoryData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    pull_requests: PullRequestConnection,
}

#[derive(Debug, Deserialize)]
struct PullRequestConnection {
    nodes: Vec<PullRequestNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    number: u64,
    base_ref_name: String,
    merged_at: Option<String>,
    merge_commit: Option<CommitNode>,
}

#[derive(Debug, Deserialize)]
struct CommitNode {
    oid: String,
}

impl From<PullRequestNode> for PullRequest {
    fn from(node: PullRequestNode) -> Self {
        Self {
            number: node.number,
            base_ref_name: node.base_ref_name,
            merged_at: node.merged_at,
            merge_commit: node.merge_commit.map(|c| CommitId(c.oid)),
        }
    }
}

// -----------------------------------------------------------------------------
// GithubClient

/// Client for the GitHub GraphQL API.
pub struct GithubClient {
    http_client: GithubCurlClient,
}

impl GithubClient {
    pub fn new(token: String) -> Self {
        Self {
            http_client: GithubCurlClient::new(token),
        }
    }
}

impl GithubOps for GithubClient {
    #[instrument(skip_all)]
    async fn recent_pull_requests(
        &self,
        repo: &Repository,
        limit: usize,
    ) -> Result<Vec<PullRequest>> {
        let request = serde_json::json!({
            "query": PULL_REQUESTS_QUERY,
            "variables": {
                "owner": repo.owner,
                "name": repo.name,
                "limit": limit.clamp(1, MAX_PAGE_SIZE),
            },
        });

        let response = self
            .http_client
            .post(&repo.graphql_endpoint(), &serde_json::to_string(&request)?)
            .await
            .with_context(|| format!("Failed to query pull requests of {}", repo))?;
        parse_pull_requests(&response)
    }
}

fn parse_pull_requests(response: &str) -> Result<Vec<PullRequest>> {
    let response: GraphQlResponse =
        serde_json::from_str(response).context("Malformed GraphQL response")?;

    if let Some(errors) = response.errors
        && !errors.is_empty()
    {
        let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
        bail!("GraphQL query failed: {}", messages.join("; "));
    }

    let Some(repository) = response.data.and_then(|d| d.repository) else {
        bail!("Repository not found");
    };
    Ok(repository
        .pull_requests
        .nodes
        .into_iter()
        .map(PullRequest::from)
        .collect())
}

// -----------------------------------------------------------------------------
// Remote URLs

/// Parse a GitHub remote URL, e.g. `git@github.com:owner/repo.git` or
/// `https://github.com/owner/repo`.
pub fn parse_repo_url(url: &str) -> Option<Repository> {
    let url = url.trim();
    let captures = HTTPS_URL.captures(url).or_else(|| SSH_URL.captures(url))?;
    Some(Repository {
        domain: captures[1].to_string(),
        owner: captures[2].to_string(),
        name: captures[3].to_string(),
    })
}
