#![allow(async_fn_in_trait)]

use std::collections::HashMap;
use std::fmt::Display;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use log::debug;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::instrument;

use crate::branch::CommitId;
use crate::branch::HeadState;
use crate::branch::LocalBranch;
use crate::branch::LocalBranches;
use crate::branch::PushTarget;
use crate::branch::Upstream;
use crate::plan::FastForwardTarget;

// -----------------------------------------------------------------------------
// GitOps trait

/// Operations for reading and updating the local repository.
#[cfg_attr(test, automock)]
pub trait GitOps {
    async fn is_inside_work_tree(&self) -> Result<bool>;
    async fn head_state(&self) -> Result<HeadState>;

    /// `branch.<head>.pushRemote`, falling back to `remote.pushDefault`.
    async fn push_target(&self, head: &HeadState) -> Result<Option<PushTarget>>;

    /// Every local branch with its commit and remote upstream, if any.
    async fn local_branches(&self) -> Result<LocalBranches>;
    async fn remote_url(&self, remote: &str) -> Result<Option<String>>;

    async fn pull_all(&self) -> Result<()>;
    async fn fetch_all(&self) -> Result<()>;

    /// Move `branch` to `target` if, and only if, that is a fast-forward.
    /// Returns whether the branch moved; fails with [`Diverged`] otherwise.
    async fn fast_forward(&self, branch: &str, target: &FastForwardTarget) -> Result<bool>;
    async fn push(&self, remote: &str, branch: &str) -> Result<()>;
}

/// A fast-forward was refused because the branch has commits the target lacks.
#[derive(Debug)]
pub struct Diverged {
    pub branch: String,
    pub target: String,
}

impl Display for Diverged {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} has diverged from {}", self.branch, self.target)
    }
}

impl std::error::Error for Diverged {}

/// A merge commit that is not present in the local object database, e.g.
/// because the branch it landed on was never fetched.
#[derive(Debug)]
pub struct MissingCommit {
    pub commit: CommitId,
}

impl Display for MissingCommit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "commit {} is not available locally", self.commit)
    }
}

impl std::error::Error for MissingCommit {}

// -----------------------------------------------------------------------------
// GitClient

/// Git client that shells out to the git CLI.
pub struct GitClient {
    path: std::path::PathBuf,
}

impl GitClient {
    pub fn new(path: std::path::PathBuf) -> Self {
        Self { path }
    }

    async fn output(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!("Running git {}", args.join(" "));
        Command::new("git")
            .current_dir(&self.path)
            .args(args)
            .output()
            .await
            .context("Failed to execute git command")
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args).await?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    /// Run git, mapping a non-zero exit to `None`.
    async fn git_optional(&self, args: &[&str]) -> Result<Option<String>> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8(output.stdout)?.trim().to_string();
        Ok(Some(stdout).filter(|s| !s.is_empty()))
    }

    async fn config_value(&self, key: &str) -> Result<Option<String>> {
        self.git_optional(&["config", "--get", key]).await
    }

    async fn rev_parse(&self, rev: &str) -> Result<CommitId> {
        let commit = self
            .git(&["rev-parse", "--verify", "--quiet", &format!("{}^{{commit}}", rev)])
            .await
            .with_context(|| format!("Unknown commit {}", rev))?;
        Ok(CommitId(commit))
    }

    async fn is_ancestor(&self, commit: &CommitId, descendant: &CommitId) -> Result<bool> {
        let output = self
            .output(&["merge-base", "--is-ancestor", &commit.0, &descendant.0])
            .await?;

        // Exit code 0 means it is an ancestor, 1 means it's not
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => bail!(
                "git merge-base failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }

    async fn remote_tracking_commits(&self) -> Result<HashMap<String, CommitId>> {
        let output = self
            .git(&[
                "for-each-ref",
                "--format=%(refname) %(objectname)",
                "refs/remotes",
            ])
            .await?;

        Ok(output
            .lines()
            .filter_map(|line| line.split_once(' '))
            .map(|(refname, commit)| (refname.to_string(), CommitId(commit.to_string())))
            .collect())
    }
}

impl GitOps for GitClient {
    async fn is_inside_work_tree(&self) -> Result<bool> {
        let inside = self
            .git_optional(&["rev-parse", "--is-inside-work-tree"])
            .await?;
        Ok(inside.as_deref() == Some("true"))
    }

    async fn head_state(&self) -> Result<HeadState> {
        if let Some(branch) = self
            .git_optional(&["symbolic-ref", "-q", "--short", "HEAD"])
            .await?
        {
            return Ok(HeadState::OnBranch(branch));
        }
        Ok(HeadState::Detached(self.rev_parse("HEAD").await?))
    }

    async fn push_target(&self, head: &HeadState) -> Result<Option<PushTarget>> {
        if let HeadState::OnBranch(branch) = head
            && let Some(remote) = self
                .config_value(&format!("branch.{}.pushRemote", branch))
                .await?
        {
            return Ok(Some(PushTarget(remote)));
        }
        Ok(self
            .config_value("remote.pushDefault")
            .await?
            .map(PushTarget))
    }

    #[instrument(skip_all)]
    async fn local_branches(&self) -> Result<LocalBranches> {
        let tracking = self.remote_tracking_commits().await?;
        let output = self
            .git(&[
                "for-each-ref",
                "--format=%(refname) %(objectname) %(upstream) %(upstream:remotename)",
                "refs/heads",
            ])
            .await?;

        let mut branches = LocalBranches::new();
        for line in output.lines() {
            let mut fields = line.splitn(4, ' ');
            let (Some(refname), Some(commit)) = (fields.next(), fields.next()) else {
                bail!("Unexpected for-each-ref output: {}", line);
            };
            let Some(name) = refname.strip_prefix("refs/heads/") else {
                continue;
            };
            let upstream_ref = fields.next().unwrap_or_default();
            let remote = fields.next().unwrap_or_default();

            let mut branch = LocalBranch::new(name, commit);
            branch.upstream = parse_upstream(upstream_ref, remote).map(|mut upstream| {
                upstream.commit = tracking.get(upstream_ref).cloned();
                upstream
            });
            branches.insert(name.to_string(), branch);
        }
        Ok(branches)
    }

    async fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        self.config_value(&format!("remote.{}.url", remote)).await
    }

    #[instrument(skip_all)]
    async fn pull_all(&self) -> Result<()> {
        self.git(&["pull", "--all", "--ff-only"]).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn fetch_all(&self) -> Result<()> {
        self.git(&["fetch", "--all"]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fast_forward(&self, branch: &str, target: &FastForwardTarget) -> Result<bool> {
        let branch_ref = format!("refs/heads/{}", branch);
        let old = self.rev_parse(&branch_ref).await?;
        let new = match target {
            FastForwardTarget::Upstream(upstream) => self.rev_parse(&upstream.tracking_ref()).await?,
            FastForwardTarget::MergeCommit(commit) => {
                let rev = format!("{}^{{commit}}", commit);
                match self
                    .git_optional(&["rev-parse", "--verify", "--quiet", &rev])
                    .await?
                {
                    Some(found) => CommitId(found),
                    None => {
                        return Err(MissingCommit {
                            commit: commit.clone(),
                        }
                        .into());
                    }
                }
            }
        };

        if old == new {
            return Ok(false);
        }
        if !self.is_ancestor(&old, &new).await? {
            return Err(Diverged {
                branch: branch.to_string(),
                target: target.to_string(),
            }
            .into());
        }

        // A checked-out branch must move together with its working tree.
        if self.head_state().await? == HeadState::OnBranch(branch.to_string()) {
            self.git(&["merge", "--ff-only", "--quiet", &new.0]).await?;
        } else {
            self.git(&[
                "update-ref",
                "-m",
                &format!("git-sync: fast-forward to {}", target),
                &branch_ref,
                &new.0,
                &old.0,
            ])
            .await?;
        }
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn push(&self, remote: &str, branch: &str) -> Result<()> {
        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        self.git(&["push", remote, &refspec]).await?;
        Ok(())
    }
}

/// Build an [`Upstream`] from `%(upstream)` and `%(upstream:remotename)`.
/// Upstreams that are local branches are ignored.
fn parse_upstream(upstream_ref: &str, remote: &str) -> Option<Upstream> {
    let rest = upstream_ref.strip_prefix("refs/remotes/")?;
    let (remote, branch) = match rest.strip_prefix(remote).and_then(|r| r.strip_prefix('/')) {
        Some(branch) if !remote.is_empty() => (remote, branch),
        _ => rest.split_once('/')?,
    };
    Some(Upstream::new(remote, branch))
}
