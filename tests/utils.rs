use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer as _;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Runs git in `dir` and returns its trimmed stdout.
pub async fn git(dir: &Path, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await?;
    anyhow::ensure!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr).trim()
    );
    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// Sets the config needed for commits.
async fn configure_user(dir: &Path) -> anyhow::Result<()> {
    git(dir, &["config", "user.name", "Test User"]).await?;
    git(dir, &["config", "user.email", "test@example.com"]).await?;
    git(dir, &["config", "commit.gpgsign", "false"]).await?;
    Ok(())
}

/// Creates a git repository on `main` in the given directory.
///
/// The directory should already exist.
pub async fn create_git_repo(dir: &Path) -> anyhow::Result<()> {
    git(dir, &["init", "--quiet", "--initial-branch=main"]).await?;
    configure_user(dir).await
}

/// Creates a bare repository to act as a remote.
pub async fn create_bare_remote(dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    git(dir, &["init", "--quiet", "--bare", "--initial-branch=main"]).await?;
    Ok(())
}

/// Clones `remote` into `dir`.
pub async fn clone_repo(remote: &Path, dir: &Path) -> anyhow::Result<()> {
    let parent = dir.parent().unwrap_or(dir);
    let remote = remote.to_string_lossy();
    let dir_name = dir.to_string_lossy();
    git(parent, &["clone", "--quiet", &remote, &dir_name]).await?;
    configure_user(dir).await
}

/// Sets up a git remote origin for the repository.
pub async fn setup_git_remote(dir: &Path, remote_url: &str) -> anyhow::Result<()> {
    git(dir, &["remote", "add", "origin", remote_url]).await?;
    Ok(())
}

/// Writes a file and commits it on the current branch.
pub async fn create_commit(
    dir: &Path,
    message: &str,
    filename: &str,
    contents: &str,
) -> anyhow::Result<String> {
    tokio::fs::write(dir.join(filename), contents).await?;
    git(dir, &["add", filename]).await?;
    git(dir, &["commit", "--quiet", "-m", message]).await?;
    rev_parse(dir, "HEAD").await
}

pub async fn rev_parse(dir: &Path, rev: &str) -> anyhow::Result<String> {
    git(dir, &["rev-parse", rev]).await
}

pub fn setup_logging() -> anyhow::Result<()> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let format = tracing_subscriber::fmt::format().with_timer(timer);
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    let subscriber = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_test_writer()
        .with_filter(filter);
    tracing_subscriber::registry().with(subscriber).init();
    Ok(())
}

pub enum TestDir {
    Temp(tempfile::TempDir),
    Kept(std::path::PathBuf),
}

impl TestDir {
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;

        if std::env::var("DEBUG_TESTS").is_ok() {
            let path = temp_dir.keep();
            eprintln!("Test directory kept at: {}", path.display());
            Ok(TestDir::Kept(path))
        } else {
            Ok(TestDir::Temp(temp_dir))
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            TestDir::Temp(t) => t.path(),
            TestDir::Kept(p) => p.as_path(),
        }
    }
}
