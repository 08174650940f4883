use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;

/// Number of pull requests inspected when resolving merge commits.
pub const DEFAULT_PULL_REQUEST_LIMIT: usize = 50;

/// Upper bound on the pull request query.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variables checked, in order, for a GitHub token.
pub const TOKEN_VARIABLES: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Absent disables merge commit resolution.
    pub github_token: Option<String>,
    pub pull_request_limit: usize,
    pub api_timeout: Duration,
}

impl Config {
    /// Load config from the environment and the repository's git config
    /// (`gitsync.pullRequestLimit`, `gitsync.apiTimeout` in seconds).
    pub fn load(path: &Path) -> Result<Self> {
        let github_token = token_from(|name| std::env::var(name).ok());

        let pull_request_limit = match git_config(path, "gitsync.pullRequestLimit")? {
            Some(value) => value
                .parse()
                .with_context(|| format!("Invalid gitsync.pullRequestLimit: {}", value))?,
            None => DEFAULT_PULL_REQUEST_LIMIT,
        };
        let api_timeout = match git_config(path, "gitsync.apiTimeout")? {
            Some(value) => Duration::from_secs(
                value
                    .parse()
                    .with_context(|| format!("Invalid gitsync.apiTimeout: {}", value))?,
            ),
            None => DEFAULT_API_TIMEOUT,
        };

        Ok(Self {
            github_token,
            pull_request_limit,
            api_timeout,
        })
    }

    /// Default config for tests
    pub fn default_for_tests() -> Self {
        Self {
            github_token: None,
            pull_request_limit: DEFAULT_PULL_REQUEST_LIMIT,
            api_timeout: Duration::from_secs(5),
        }
    }
}

/// First non-empty token among [`TOKEN_VARIABLES`].
fn token_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    TOKEN_VARIABLES
        .iter()
        .filter_map(|&name| lookup(name))
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
}

fn git_config(path: &Path, key: &str) -> Result<Option<String>> {
    let output = std::process::Command::new("git")
        .current_dir(path)
        .args(["config", "--get", key])
        .output()
        .context("Failed to execute git command")?;

    // Exit code 1 means the key is unset
    if !output.status.success() {
        return Ok(None);
    }

    let value = String::from_utf8(output.stdout)?.trim().to_string();
    Ok(Some(value).filter(|v| !v.is_empty()))
}
