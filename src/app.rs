use crate::clients::git::GitOps;
use crate::clients::github::GithubOps;
use crate::config::Config;

pub struct App<G: GitOps, H: GithubOps> {
    pub config: Config,
    pub git: G,
    /// Absent when no token is available; merge commits are then not resolved.
    pub gh: Option<H>,
}

impl<G: GitOps, H: GithubOps> App<G, H> {
    pub fn new(config: Config, git: G, gh: Option<H>) -> Self {
        Self { config, git, gh }
    }
}
