use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use git_sync::App;
use git_sync::Config;
use git_sync::clients::git::GitClient;
use git_sync::clients::github::GithubClient;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "git-sync")]
#[command(version)]
#[command(about = "Sync local branches with their remotes, push HEAD, and fast-forward branches whose pull requests were merged", long_about = None)]
pub struct Cli {
    /// Print the planned steps without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', default_value = ".")]
    pub path: PathBuf,
}

fn setup_logging() -> Result<()> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let format = tracing_subscriber::fmt::format().with_timer(timer);
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env()?;
    tracing_subscriber::fmt()
        .event_format(format)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    setup_logging()?;
    let cli = Cli::parse();

    let config = Config::load(&cli.path)?;
    let gh = config.github_token.clone().map(GithubClient::new);
    let app = App::new(config, GitClient::new(cli.path), gh);

    let succeeded = app.cmd_sync(cli.dry_run, &mut std::io::stdout()).await?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
