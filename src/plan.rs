//! Branch reconciliation: turns a repository snapshot and resolved merge
//! commits into the ordered list of git operations to run.
//!
//! [`build_plan`] is pure. Whether a fast-forward is actually possible is left
//! to the executor, which refuses anything that would drop local commits.

use std::fmt::Display;

use crate::branch::BranchState;
use crate::branch::CommitId;
use crate::branch::Upstream;
use crate::merge_commits::MergeRecords;

// -----------------------------------------------------------------------------
// Types

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastForwardTarget {
    /// The branch's remote-tracking ref, as updated by the preceding fetch.
    Upstream(Upstream),
    /// A pull request merge commit resolved from the hosting service.
    MergeCommit(CommitId),
}

impl Display for FastForwardTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstream(upstream) => write!(f, "{}", upstream),
            Self::MergeCommit(commit) => write!(f, "{}", commit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Fetch every remote and fast-forward the checked-out branch.
    PullAll,
    /// Fetch every remote without touching any branch.
    FetchAll,
    FastForward {
        branch: String,
        target: FastForwardTarget,
    },
    Push {
        remote: String,
        branch: String,
    },
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PullAll => f.write_str("pull --all --ff-only"),
            Self::FetchAll => f.write_str("fetch --all"),
            Self::FastForward { branch, target } => {
                write!(f, "fast-forward {} to {}", branch, target)
            }
            Self::Push { remote, branch } => write!(f, "push {} {}", remote, branch),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub steps: Vec<Step>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Branches this plan fast-forwards, in plan order, deduplicated.
    pub fn fast_forwarded_branches(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for step in &self.steps {
            if let Step::FastForward { branch, .. } = step
                && !seen.contains(&branch.as_str())
            {
                seen.push(branch.as_str());
            }
        }
        seen
    }
}

// -----------------------------------------------------------------------------
// Planning

/// Compute the sync plan for a snapshot.
///
/// Order: one `PullAll` or `FetchAll`, then upstream fast-forwards, then
/// merge-commit fast-forwards, then a single `Push`. Branches are visited in
/// lexicographic order so the same input always yields the same plan.
pub fn build_plan(state: &BranchState, merge_records: &MergeRecords) -> SyncPlan {
    let mut steps = Vec::new();

    if state.known_remotes().is_empty() {
        return SyncPlan { steps };
    }

    // The checked-out branch is pulled directly when it tracks an upstream.
    let pulled = state
        .head
        .branch()
        .and_then(|name| state.branches.get(name))
        .filter(|branch| branch.upstream.is_some())
        .map(|branch| branch.name.as_str());

    steps.push(if pulled.is_some() {
        Step::PullAll
    } else {
        Step::FetchAll
    });

    for branch in state.branches.values() {
        if Some(branch.name.as_str()) == pulled {
            continue;
        }
        if let Some(upstream) = &branch.upstream {
            steps.push(Step::FastForward {
                branch: branch.name.clone(),
                target: FastForwardTarget::Upstream(upstream.clone()),
            });
        }
    }

    if let Some(target) = &state.push_target {
        for branch in state.branches.values() {
            if Some(branch.name.as_str()) == pulled {
                continue;
            }
            let Some(merge_commit) = merge_records.get(&target.0, &branch.name) else {
                continue;
            };
            if &branch.commit == merge_commit {
                continue;
            }
            // The upstream update already lands on the merge commit.
            let upstream_commit = branch.upstream.as_ref().and_then(|u| u.commit.as_ref());
            if upstream_commit == Some(merge_commit) {
                continue;
            }
            steps.push(Step::FastForward {
                branch: branch.name.clone(),
                target: FastForwardTarget::MergeCommit(merge_commit.clone()),
            });
        }
    }

    if let (Some(target), Some(head)) = (&state.push_target, state.head.branch())
        && state.branches.contains_key(head)
    {
        steps.push(Step::Push {
            remote: target.0.clone(),
            branch: head.to_string(),
        });
    }

    SyncPlan { steps }
}
