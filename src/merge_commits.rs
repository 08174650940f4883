//! Pull-request merge commits, used to recover branches whose upstream history
//! no longer fast-forwards (squash merges and the like).

use std::collections::BTreeMap;

use log::debug;
use log::warn;
use tracing::instrument;

use crate::branch::CommitId;
use crate::branch::PushTarget;
use crate::clients::git::GitOps;
use crate::clients::github::GithubOps;
use crate::clients::github::PullRequest;
use crate::clients::github::parse_repo_url;
use crate::config::Config;

// -----------------------------------------------------------------------------
// Types

/// Resolved merge commits keyed by `(remote, branch)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeRecords(BTreeMap<(String, String), CommitId>);

/// Outcome of querying the hosting service. A failed query still yields an
/// (empty) set of records, along with a warning for the report.
#[derive(Debug, Default)]
pub struct Resolution {
    pub records: MergeRecords,
    pub warning: Option<String>,
}

// -----------------------------------------------------------------------------
// MergeRecords impl

impl MergeRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, remote: &str, branch: &str, commit: CommitId) {
        self.0
            .insert((remote.to_string(), branch.to_string()), commit);
    }

    pub fn get(&self, remote: &str, branch: &str) -> Option<&CommitId> {
        self.0.get(&(remote.to_string(), branch.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

// -----------------------------------------------------------------------------
// Selection

/// Pick, for each base branch, the merge commit of the most recently merged
/// pull request. Equal merge times fall back to the higher PR number.
pub fn select_merge_commits(remote: &str, pull_requests: &[PullRequest]) -> MergeRecords {
    let mut newest: BTreeMap<&str, &PullRequest> = BTreeMap::new();
    for pr in pull_requests {
        if pr.merge_commit.is_none() {
            continue;
        }
        let replace = match newest.get(pr.base_ref_name.as_str()) {
            Some(current) => merge_order(pr) > merge_order(current),
            None => true,
        };
        if replace {
            newest.insert(&pr.base_ref_name, pr);
        }
    }

    let mut records = MergeRecords::new();
    for (branch, pr) in newest {
        if let Some(commit) = &pr.merge_commit {
            debug!("PR #{} resolves {} to {}", pr.number, branch, commit);
            records.insert(remote, branch, commit.clone());
        }
    }
    records
}

// GitHub timestamps are RFC 3339 in UTC, so they order lexicographically.
fn merge_order(pr: &PullRequest) -> (Option<&str>, u64) {
    (pr.merged_at.as_deref(), pr.number)
}

// -----------------------------------------------------------------------------
// Resolution

/// Query the push-default remote's recent pull requests and map them to
/// merge records. Never fails: problems degrade to empty records.
#[instrument(skip_all)]
pub async fn resolve_merge_commits<G: GitOps, H: GithubOps>(
    git: &G,
    gh: Option<&H>,
    push_target: Option<&PushTarget>,
    config: &Config,
) -> Resolution {
    let Some(PushTarget(remote)) = push_target else {
        debug!("No push-default remote; skipping merge commit resolution");
        return Resolution::default();
    };
    let Some(gh) = gh else {
        debug!("No GitHub token; skipping merge commit resolution");
        return Resolution::default();
    };

    match query_merge_commits(git, gh, remote, config).await {
        Ok(records) => Resolution {
            records,
            warning: None,
        },
        Err(e) => {
            let warning = format!("Could not resolve merge commits for {}: {:#}", remote, e);
            warn!("{}", warning);
            Resolution {
                records: MergeRecords::new(),
                warning: Some(warning),
            }
        }
    }
}

async fn query_merge_commits<G: GitOps, H: GithubOps>(
    git: &G,
    gh: &H,
    remote: &str,
    config: &Config,
) -> anyhow::Result<MergeRecords> {
    let url = git
        .remote_url(remote)
        .await?
        .ok_or_else(|| anyhow::anyhow!("remote {} has no URL", remote))?;
    let repo = parse_repo_url(&url)
        .ok_or_else(|| anyhow::anyhow!("unrecognised remote URL {}", url))?;

    let pull_requests = tokio::time::timeout(
        config.api_timeout,
        gh.recent_pull_requests(&repo, config.pull_request_limit),
    )
    .await
    .map_err(|_| {
        anyhow::anyhow!("request timed out after {:?}", config.api_timeout)
    })??;

    debug!(
        "Fetched {} pull requests from {}",
        pull_requests.len(),
        repo
    );
    Ok(select_merge_commits(remote, &pull_requests))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clients::git::MockGitOps;
    use crate::clients::github::MockGithubOps;
    use crate::clients::github::Repository;

    fn merged(number: u64, base: &str, merged_at: &str, commit: &str) -> PullRequest {
        PullRequest {
            number,
            base_ref_name: base.to_string(),
            merged_at: Some(merged_at.to_string()),
            merge_commit: Some(commit.into()),
        }
    }

    fn unmerged(number: u64, base: &str) -> PullRequest {
        PullRequest {
            number,
            base_ref_name: base.to_string(),
            merged_at: None,
            merge_commit: None,
        }
    }

    #[test]
    fn test_newest_merge_wins() {
        let prs = vec![
            merged(10, "feature", "2024-03-01T10:00:00Z", "A"),
            merged(12, "feature", "2024-03-02T10:00:00Z", "B"),
        ];
        let records = select_merge_commits("origin", &prs);
        assert_eq!(records.get("origin", "feature"), Some(&"B".into()));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_newest_merge_wins_regardless_of_input_order() {
        let prs = vec![
            merged(12, "feature", "2024-03-02T10:00:00Z", "B"),
            merged(10, "feature", "2024-03-01T10:00:00Z", "A"),
        ];
        let records = select_merge_commits("origin", &prs);
        assert_eq!(records.get("origin", "feature"), Some(&"B".into()));
    }

    #[test]
    fn test_tie_broken_by_higher_number() {
        let prs = vec![
            merged(7, "main", "2024-03-01T10:00:00Z", "X"),
            merged(9, "main", "2024-03-01T10:00:00Z", "Y"),
            merged(8, "main", "2024-03-01T10:00:00Z", "Z"),
        ];
        let records = select_merge_commits("origin", &prs);
        assert_eq!(records.get("origin", "main"), Some(&"Y".into()));
    }

    #[test]
    fn test_unmerged_pull_requests_ignored() {
        let prs = vec![
            merged(3, "main", "2024-03-01T10:00:00Z", "M"),
            unmerged(4, "main"),
            unmerged(5, "release"),
        ];
        let records = select_merge_commits("origin", &prs);
        assert_eq!(records.get("origin", "main"), Some(&"M".into()));
        assert_eq!(records.get("origin", "release"), None);
    }

    #[test]
    fn test_records_keyed_by_remote() {
        let prs = vec![merged(1, "main", "2024-03-01T10:00:00Z", "M")];
        let records = select_merge_commits("fork", &prs);
        assert_eq!(records.get("origin", "main"), None);
        assert_eq!(records.get("fork", "main"), Some(&"M".into()));
    }

    #[tokio::test]
    async fn test_resolve_without_push_target_is_empty() {
        let git = MockGitOps::new();
        let gh = MockGithubOps::new();
        let resolution =
            resolve_merge_commits(&git, Some(&gh), None, &Config::default_for_tests()).await;
        assert!(resolution.records.is_empty());
        assert!(resolution.warning.is_none());
    }

    #[tokio::test]
    async fn test_resolve_without_token_is_silent() {
        let git = MockGitOps::new();
        let target = PushTarget("origin".to_string());
        let resolution = resolve_merge_commits::<_, MockGithubOps>(
            &git,
            None,
            Some(&target),
            &Config::default_for_tests(),
        )
        .await;
        assert!(resolution.records.is_empty());
        assert!(resolution.warning.is_none());
    }

    #[tokio::test]
    async fn test_resolve_queries_push_remote() {
        let mut git = MockGitOps::new();
        git.expect_remote_url()
            .withf(|remote| remote == "origin")
            .returning(|_| Ok(Some("git@github.com:owner/repo.git".to_string())));
        let mut gh = MockGithubOps::new();
        gh.expect_recent_pull_requests()
            .withf(|repo, limit| {
                *repo
                    == Repository {
                        domain: "github.com".to_string(),
                        owner: "owner".to_string(),
                        name: "repo".to_string(),
                    }
                    && *limit == 50
            })
            .returning(|_, _| Ok(vec![merged(2, "main", "2024-03-01T10:00:00Z", "C9")]));

        let target = PushTarget("origin".to_string());
        let resolution =
            resolve_merge_commits(&git, Some(&gh), Some(&target), &Config::default_for_tests())
                .await;
        assert_eq!(resolution.records.get("origin", "main"), Some(&"C9".into()));
        assert!(resolution.warning.is_none());
    }

    #[tokio::test]
    async fn test_resolve_api_failure_degrades_to_warning() {
        let mut git = MockGitOps::new();
        git.expect_remote_url()
            .returning(|_| Ok(Some("https://github.com/owner/repo.git".to_string())));
        let mut gh = MockGithubOps::new();
        gh.expect_recent_pull_requests()
            .returning(|_, _| Err(anyhow::anyhow!("GitHub API error: Bad credentials")));

        let target = PushTarget("origin".to_string());
        let resolution =
            resolve_merge_commits(&git, Some(&gh), Some(&target), &Config::default_for_tests())
                .await;
        assert!(resolution.records.is_empty());
        let warning = resolution.warning.unwrap();
        assert!(warning.contains("Bad credentials"), "{}", warning);
    }

    #[tokio::test]
    async fn test_resolve_unparseable_url_degrades_to_warning() {
        let mut git = MockGitOps::new();
        git.expect_remote_url()
            .returning(|_| Ok(Some("/srv/git/repo".to_string())));
        let gh = MockGithubOps::new();

        let target = PushTarget("origin".to_string());
        let resolution =
            resolve_merge_commits(&git, Some(&gh), Some(&target), &Config::default_for_tests())
                .await;
        assert!(resolution.records.is_empty());
        assert!(resolution.warning.unwrap().contains("/srv/git/repo"));
    }

    /// Answers only after the caller has given up.
    struct UnresponsiveGithub;

    impl GithubOps for UnresponsiveGithub {
        async fn recent_pull_requests(
            &self,
            _repo: &Repository,
            _limit: usize,
        ) -> anyhow::Result<Vec<PullRequest>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(vec![merged(1, "main", "2024-01-01T00:00:00Z", "C1")])
        }
    }

    #[tokio::test]
    async fn test_resolve_timeout_degrades_to_warning() {
        let mut git = MockGitOps::new();
        git.expect_remote_url()
            .returning(|_| Ok(Some("https://github.com/owner/repo.git".to_string())));

        let target = PushTarget("origin".to_string());
        let mut config = Config::default_for_tests();
        config.api_timeout = Duration::from_millis(50);
        let resolution =
            resolve_merge_commits(&git, Some(&UnresponsiveGithub), Some(&target), &config).await;
        assert!(resolution.records.is_empty());
        let warning = resolution.warning.unwrap();
        assert_eq!(
            warning,
            "Could not resolve merge commits for origin: request timed out after 50ms"
        );
    }
}
