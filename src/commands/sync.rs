use anyhow::Result;
use anyhow::bail;
use futures_util::future::join;
use log::debug;
use tracing::instrument;

use crate::App;
use crate::branch::BranchState;
use crate::clients::git::GitOps;
use crate::clients::github::GithubOps;
use crate::executor::execute_plan;
use crate::merge_commits::resolve_merge_commits;
use crate::plan::build_plan;
use crate::report::SyncReport;

impl<G: GitOps, H: GithubOps> App<G, H> {
    /// Bring local branches up to date and push HEAD.
    ///
    /// Returns whether every step succeeded. Errors are reserved for
    /// preconditions (e.g. not being inside a repository); step failures are
    /// reported on `stdout` instead.
    #[instrument(skip_all)]
    pub async fn cmd_sync(&self, dry_run: bool, stdout: &mut impl std::io::Write) -> Result<bool> {
        if !self.git.is_inside_work_tree().await? {
            bail!("Not inside a git work tree");
        }

        let head = self.git.head_state().await?;
        let push_target = self.git.push_target(&head).await?;

        // The pull request query does not depend on the local branch list.
        let (branches, resolution) = join(
            self.git.local_branches(),
            resolve_merge_commits(
                &self.git,
                self.gh.as_ref(),
                push_target.as_ref(),
                &self.config,
            ),
        )
        .await;

        let state = BranchState {
            head,
            branches: branches?,
            push_target,
        };
        let plan = build_plan(&state, &resolution.records);
        debug!(
            "Planned {} steps, fast-forwarding {:?}",
            plan.steps.len(),
            plan.fast_forwarded_branches()
        );

        if dry_run {
            if let Some(warning) = &resolution.warning {
                writeln!(stdout, "! {}", warning)?;
            }
            if plan.is_empty() {
                writeln!(stdout, "Nothing to do")?;
            }
            for step in &plan.steps {
                writeln!(stdout, "would {}", step)?;
            }
            return Ok(true);
        }

        let results = execute_plan(&self.git, &plan).await;
        let report = SyncReport::new(&state, &results, resolution.warning.into_iter().collect());
        report.write(stdout)?;
        Ok(report.succeeded())
    }
}
