use std::fmt::Display;

use colored::Colorize;

use crate::branch::BranchState;
use crate::branch::HeadState;
use crate::executor::FailureReason;
use crate::executor::StepResult;
use crate::executor::StepStatus;
use crate::plan::Step;

// -----------------------------------------------------------------------------
// Types

/// What happened to one local branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    Updated { to: String },
    UpToDate,
    Skipped { why: &'static str },
    Failed {
        reason: FailureReason,
        message: String,
    },
}

impl BranchOutcome {
    fn symbol(&self) -> colored::ColoredString {
        match self {
            Self::Updated { .. } => "✓".green(),
            Self::UpToDate => "=".normal(),
            Self::Skipped { .. } => "-".dimmed(),
            Self::Failed { .. } => "✗".red(),
        }
    }
}

impl Display for BranchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Updated { to } => write!(f, "updated to {}", to),
            Self::UpToDate => f.write_str("up to date"),
            Self::Skipped { why } => write!(f, "skipped ({})", why),
            Self::Failed { reason, message } => write!(f, "failed ({}): {}", reason, message),
        }
    }
}

/// One report line per local branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchReport {
    pub name: String,
    pub outcome: BranchOutcome,
    /// Failed steps the outcome does not already show, as `target: failed (reason): message`.
    pub other_failures: Vec<String>,
}

/// Summary of one invocation, rendered for the user.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub fetch: Option<StepResult>,
    pub branches: Vec<BranchReport>,
    pub push: Option<StepResult>,
    /// Explains a missing push step.
    pub push_skipped: Option<&'static str>,
    pub warnings: Vec<String>,
    pub failed_steps: usize,
}

// -----------------------------------------------------------------------------
// SyncReport impl

impl SyncReport {
    pub fn new(state: &BranchState, results: &[StepResult], warnings: Vec<String>) -> Self {
        let fetch = results
            .iter()
            .find(|r| matches!(r.step, Step::PullAll | Step::FetchAll))
            .cloned();
        let push = results
            .iter()
            .find(|r| matches!(r.step, Step::Push { .. }))
            .cloned();

        let branches = state
            .branches
            .values()
            .map(|branch| {
                let pulled = fetch
                    .as_ref()
                    .filter(|r| r.step == Step::PullAll)
                    .filter(|_| state.head.branch() == Some(branch.name.as_str()));
                let pull_target = branch.upstream.as_ref().map(|u| u.to_string());

                let mut updates: Vec<(String, &StepStatus)> = pulled
                    .into_iter()
                    .map(|r| (pull_target.clone().unwrap_or_default(), &r.status))
                    .collect();
                updates.extend(results.iter().filter_map(|r| match &r.step {
                    Step::FastForward { branch: name, target } if *name == branch.name => {
                        Some((target.to_string(), &r.status))
                    }
                    _ => None,
                }));
                let (outcome, other_failures) = branch_outcome(&updates, results.is_empty());
                BranchReport {
                    name: branch.name.clone(),
                    outcome,
                    other_failures,
                }
            })
            .collect();

        let push_skipped = match (&push, &state.head, &state.push_target) {
            (Some(_), _, _) => None,
            (None, HeadState::Detached(_), _) => Some("HEAD is detached"),
            (None, _, None) => Some("no push remote configured"),
            (None, _, Some(_)) => Some("nothing to push"),
        };

        Self {
            fetch,
            branches,
            push,
            push_skipped,
            warnings,
            failed_steps: results.iter().filter(|r| r.failed()).count(),
        }
    }

    /// Whether every executed step succeeded.
    pub fn succeeded(&self) -> bool {
        self.failed_steps == 0
    }

    pub fn write(&self, stdout: &mut impl std::io::Write) -> std::io::Result<()> {
        for warning in &self.warnings {
            writeln!(stdout, "{} {}", "!".yellow(), warning)?;
        }

        match &self.fetch {
            Some(result) => match &result.status {
                StepStatus::Failed { reason, message } => writeln!(
                    stdout,
                    "{} fetch failed ({}): {}",
                    "✗".red(),
                    reason,
                    message
                )?,
                _ => writeln!(stdout, "{} fetched all remotes", "✓".green())?,
            },
            None => writeln!(stdout, "{} no remotes to fetch", "-".dimmed())?,
        }

        for branch in &self.branches {
            let mut line = format!(
                "{} {}: {}",
                branch.outcome.symbol(),
                branch.name.bold(),
                branch.outcome
            );
            if !branch.other_failures.is_empty() {
                line.push_str(&format!(" ({})", branch.other_failures.join("; ")));
            }
            writeln!(stdout, "{}", line)?;
        }

        match self.push.as_ref().map(|r| (&r.step, &r.status)) {
            Some((Step::Push { remote, branch }, StepStatus::Failed { reason, message })) => {
                writeln!(
                    stdout,
                    "{} push {} to {} failed ({}): {}",
                    "✗".red(),
                    branch,
                    remote,
                    reason,
                    message
                )?
            }
            Some((Step::Push { remote, branch }, _)) => {
                writeln!(stdout, "{} pushed {} to {}", "✓".green(), branch, remote)?
            }
            _ => {
                let why = self.push_skipped.unwrap_or("nothing to push");
                writeln!(stdout, "{} not pushed ({})", "-".dimmed(), why)?
            }
        }
        Ok(())
    }
}

/// Fold a branch's update steps into one outcome: the last successful move
/// wins, otherwise the first failure, otherwise up to date. Failures the
/// outcome does not show are returned alongside it.
fn branch_outcome(
    updates: &[(String, &StepStatus)],
    nothing_ran: bool,
) -> (BranchOutcome, Vec<String>) {
    if updates.is_empty() {
        let why = if nothing_ran {
            "no remotes"
        } else {
            "no upstream or merge commit"
        };
        return (BranchOutcome::Skipped { why }, Vec::new());
    }

    let failures: Vec<(&str, FailureReason, &str)> = updates
        .iter()
        .filter_map(|(to, status)| match status {
            StepStatus::Failed { reason, message } => Some((to.as_str(), *reason, message.as_str())),
            _ => None,
        })
        .collect();

    if let Some((to, _)) = updates
        .iter()
        .rev()
        .find(|(_, status)| **status == StepStatus::Succeeded)
    {
        return (BranchOutcome::Updated { to: to.clone() }, describe_failures(&failures));
    }
    if let Some(((_, reason, message), rest)) = failures.split_first() {
        let outcome = BranchOutcome::Failed {
            reason: *reason,
            message: message.to_string(),
        };
        return (outcome, describe_failures(rest));
    }
    if updates
        .iter()
        .all(|(_, status)| matches!(status, StepStatus::Skipped { .. }))
        && let Some((_, StepStatus::Skipped { why })) = updates.first()
    {
        return (BranchOutcome::Skipped { why: *why }, Vec::new());
    }
    (BranchOutcome::UpToDate, Vec::new())
}

fn describe_failures(failures: &[(&str, FailureReason, &str)]) -> Vec<String> {
    failures
        .iter()
        .map(|(to, reason, message)| format!("{}: failed ({}): {}", to, reason, message))
        .collect()
}
