use std::collections::BTreeMap;
use std::fmt::Display;

// -----------------------------------------------------------------------------
// Types

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(pub String);

impl Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The remote-tracking ref a local branch follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub remote: String,
    /// Branch name on the remote, e.g. `main` for `refs/remotes/origin/main`.
    pub branch: String,
    /// Where the tracking ref pointed when the snapshot was taken.
    pub commit: Option<CommitId>,
}

impl Upstream {
    pub fn new(remote: &str, branch: &str) -> Self {
        Self {
            remote: remote.to_string(),
            branch: branch.to_string(),
            commit: None,
        }
    }

    pub fn with_commit(mut self, commit: impl Into<CommitId>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Full ref name, e.g. `refs/remotes/origin/main`.
    pub fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote, self.branch)
    }
}

impl Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.remote, self.branch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBranch {
    pub name: String,
    pub commit: CommitId,
    pub upstream: Option<Upstream>,
}

impl LocalBranch {
    pub fn new(name: &str, commit: impl Into<CommitId>) -> Self {
        Self {
            name: name.to_string(),
            commit: commit.into(),
            upstream: None,
        }
    }

    pub fn with_upstream(mut self, upstream: Upstream) -> Self {
        self.upstream = Some(upstream);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    OnBranch(String),
    Detached(CommitId),
}

impl HeadState {
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::OnBranch(name) => Some(name),
            Self::Detached(_) => None,
        }
    }
}

/// The remote the checked-out branch is pushed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget(pub String);

impl Display for PushTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local branches keyed by name. Ordered so iteration is lexicographic.
pub type LocalBranches = BTreeMap<String, LocalBranch>;

/// Snapshot of the repository taken once per invocation.
#[derive(Debug, Clone)]
pub struct BranchState {
    pub head: HeadState,
    pub branches: LocalBranches,
    pub push_target: Option<PushTarget>,
}

impl BranchState {
    /// Names of every remote the snapshot refers to.
    pub fn known_remotes(&self) -> Vec<&str> {
        let mut remotes: Vec<&str> = self
            .branches
            .values()
            .filter_map(|b| b.upstream.as_ref().map(|u| u.remote.as_str()))
            .chain(self.push_target.iter().map(|t| t.0.as_str()))
            .collect();
        remotes.sort_unstable();
        remotes.dedup();
        remotes
    }
}
