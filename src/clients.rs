//! Clients for the external systems `git-sync` coordinates:
//!
//! - [`git`]: Reading branch state and applying fetches, fast-forwards and pushes
//! - [`github`]: Pull request history via the GitHub GraphQL API
//! - [`github_curl`]: Curl-based HTTP client for making GitHub API requests
//!
//! [`git::GitOps`] and [`github::GithubOps`] are the seams mocked in tests.

pub mod git;
pub mod github;
pub mod github_curl;
