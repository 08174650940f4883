//! Runs a [`SyncPlan`] one step at a time. Steps are independent: a failure is
//! recorded and execution moves on to the next step.

use std::fmt::Display;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::clients::git::Diverged;
use crate::clients::git::GitOps;
use crate::clients::git::MissingCommit;
use crate::plan::Step;
use crate::plan::SyncPlan;

static DIVERGED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)not possible to fast-forward|diverging branches|have diverged").unwrap()
});
static REJECTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(remote )?rejected\]|non-fast-forward|failed to push some refs").unwrap()
});
static NETWORK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)could not resolve host|unable to access|could not read from remote|connection (refused|timed out|reset)|network is unreachable",
    )
    .unwrap()
});

// -----------------------------------------------------------------------------
// Types

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The local branch has commits its target lacks.
    Diverged,
    /// The remote refused the push.
    Rejected,
    Network,
    Other,
}

impl FailureReason {
    pub fn classify(error: &anyhow::Error) -> Self {
        if error.downcast_ref::<Diverged>().is_some() {
            return Self::Diverged;
        }
        let message = format!("{:#}", error);
        if REJECTED.is_match(&message) {
            Self::Rejected
        } else if DIVERGED.is_match(&message) {
            Self::Diverged
        } else if NETWORK.is_match(&message) {
            Self::Network
        } else {
            Self::Other
        }
    }
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Diverged => f.write_str("diverged"),
            Self::Rejected => f.write_str("rejected"),
            Self::Network => f.write_str("network"),
            Self::Other => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    /// A fast-forward whose branch already pointed at the target.
    Unchanged,
    /// A fast-forward that could not be attempted; not a failure.
    Skipped { why: &'static str },
    Failed {
        reason: FailureReason,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step: Step,
    pub status: StepStatus,
}

impl StepResult {
    pub fn failed(&self) -> bool {
        matches!(self.status, StepStatus::Failed { .. })
    }
}

// -----------------------------------------------------------------------------
// Execution

/// Execute every step in order, collecting one result per step.
#[instrument(skip_all)]
pub async fn execute_plan<G: GitOps>(git: &G, plan: &SyncPlan) -> Vec<StepResult> {
    let mut results = Vec::with_capacity(plan.steps.len());
    for step in &plan.steps {
        info!("{}", step);
        let status = match execute_step(git, step).await {
            Ok(true) => StepStatus::Succeeded,
            Ok(false) => StepStatus::Unchanged,
            Err(e) if e.downcast_ref::<MissingCommit>().is_some() => {
                info!("Skipping {}: {:#}", step, e);
                StepStatus::Skipped {
                    why: "merge commit not available locally",
                }
            }
            Err(e) => {
                warn!("{} failed: {:#}", step, e);
                StepStatus::Failed {
                    reason: FailureReason::classify(&e),
                    message: format!("{:#}", e),
                }
            }
        };
        results.push(StepResult {
            step: step.clone(),
            status,
        });
    }
    results
}

/// Run a single step. `Ok(false)` means nothing needed to change.
pub async fn execute_step<G: GitOps>(git: &G, step: &Step) -> Result<bool> {
    match step {
        Step::PullAll => git.pull_all().await.map(|()| true),
        Step::FetchAll => git.fetch_all().await.map(|()| true),
        Step::FastForward { branch, target } => git.fast_forward(branch, target).await,
        Step::Push { remote, branch } => git.push(remote, branch).await.map(|()| true),
    }
}
