use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use serde::Deserialize;
use tokio::process::Command;

/// HTTP client using curl for making GitHub API requests
pub struct GithubCurlClient {
    token: String,
}

#[derive(Debug, Deserialize)]
struct GitHubError {
    message: String,
    #[serde(default)]
    #[allow(dead_code)]
    documentation_url: Option<String>,
}

impl GithubCurlClient {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    /// Make a POST request
    pub async fn post(&self, url: &str, json_data: &str) -> Result<String> {
        let output = Command::new("curl")
            .args([
                "-s",
                "-w",
                "\n%{http_code}",
                "-X",
                "POST",
                "-H",
                &format!("Authorization: Bearer {}", self.token),
                "-H",
                "Accept: application/vnd.github+json",
                "-H",
                "Content-Type: application/json",
                "-H",
                "User-Agent: git-sync",
                "-d",
                json_data,
                url,
            ])
            // Abandoned requests (timeouts) must not leave curl running.
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute curl command")?;

        if !output.status.success() {
            bail!(
                "curl command failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        parse_response(output.stdout)
    }
}

/// Parse curl response with status code appended
fn parse_response(stdout: Vec<u8>) -> Result<String> {
    let output_str = String::from_utf8(stdout)?;
    let (response, status_code) = match output_str.rsplit_once('\n') {
        Some((body, code)) => (body.to_string(), code.trim().parse::<u16>().unwrap_or(0)),
        None => (String::new(), output_str.trim().parse::<u16>().unwrap_or(0)),
    };

    if status_code >= 400 {
        // Try to parse error message from response
        if let Ok(error) = serde_json::from_str::<GitHubError>(&response) {
            bail!("GitHub API error: {}", error.message);
        }
        bail!(
            "GitHub API request failed with status {}: {}",
            status_code,
            response
        );
    }
    if status_code == 0 {
        bail!("GitHub API request returned no status");
    }

    Ok(response)
}
