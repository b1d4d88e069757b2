mod cmd;
mod config;
mod context;
mod domain;
mod error;
mod infra;
mod services;
mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cmd::changelog::{self as changelog_cmd, ChangelogCommandArgs};
use crate::cmd::config::{self as config_cmd, ConfigArgs};
use crate::cmd::history as history_cmd;
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::infra::git::GitCli;
use crate::infra::history::FileChangelogStore;
use crate::infra::llm::OpenAiClient;
use crate::workflow::changelog::{CancellationFlag, ChangelogRun};

/// Exit status used when the user interrupts a run.
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "diffwizard",
    author,
    version,
    about = "Generate changelog entries from git diffs with a language model"
)]
struct Cli {
    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the diff between two revisions into a changelog entry.
    Generate(GenerateArgs),
    /// Print the changelog history recorded in a repository.
    History(HistoryArgs),
    /// Manage CLI configuration.
    Config(ConfigArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Repository to diff. Defaults to the current directory.
    #[arg(short, long)]
    dir: Option<PathBuf>,
    /// Older revision of the range.
    #[arg(long, default_value = "HEAD~1")]
    from: String,
    /// Newer revision of the range.
    #[arg(long, default_value = "HEAD")]
    to: String,
    /// Override the configured maximum chunk length in bytes.
    #[arg(long)]
    max_chunk_length: Option<usize>,
    /// Do not write changelog.json or changelog.md.
    #[arg(long)]
    no_persist: bool,
    /// Render the markdown summary locally instead of asking the model.
    #[arg(long)]
    local_summary: bool,
}

#[derive(Args)]
struct HistoryArgs {
    /// Repository whose history to print. Defaults to the current directory.
    #[arg(short, long)]
    dir: Option<PathBuf>,
    /// Only print the most recent entries.
    #[arg(short = 'n', long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("Error: {error}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(quiet: bool) {
    let default_directive = if quiet { "diffwizard=warn" } else { "diffwizard=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> AppResult<i32> {
    match cli.command {
        Commands::Config(args) => {
            config_cmd::run(args.command)?;
            Ok(0)
        }
        Commands::History(args) => {
            let config = AppConfig::load(&workspace_root(args.dir)?)?;
            history_cmd::run(&config, args.limit)?;
            Ok(0)
        }
        Commands::Generate(args) => run_generate(args).await,
    }
}

fn workspace_root(dir: Option<PathBuf>) -> AppResult<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}

async fn run_generate(args: GenerateArgs) -> AppResult<i32> {
    let mut config = AppConfig::load(&workspace_root(args.dir)?)?;
    if let Some(max_chunk_length) = args.max_chunk_length {
        config.max_chunk_length = max_chunk_length;
    }

    if config.openai_api_key.is_none() {
        warn!("OpenAI API key not configured; set OPENAI_API_KEY or run `diffwizard config init`.");
    }

    let git = Arc::new(GitCli::new(config.workspace_root.clone()));
    let language_model = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        config.model.clone(),
    ));
    let store = Arc::new(FileChangelogStore::new(
        config.history_file.clone(),
        config.summary_file.clone(),
    ));
    let context = AppContext::new(config, git, language_model, store);

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling changelog generation");
            on_interrupt.cancel();
        }
    });

    let outcome = changelog_cmd::run(
        &context,
        ChangelogCommandArgs {
            from: args.from,
            to: args.to,
            persist: !args.no_persist,
            local_summary: args.local_summary,
        },
        &cancel,
    )
    .await?;

    print_run(&outcome)?;

    if outcome.cancelled {
        return Ok(EXIT_CANCELLED);
    }
    if !outcome.issues.is_empty() {
        warn!(
            skipped = outcome.issues.len(),
            chunks = outcome.chunk_count,
            "some chunks produced unusable or truncated output"
        );
    }
    info!(timestamp = %outcome.timestamp, "changelog generated");
    Ok(0)
}

fn print_run(run: &ChangelogRun) -> AppResult<()> {
    let json = serde_json::to_string_pretty(&run.record)
        .map_err(|err| AppError::Persistence(format!("failed to render changelog: {err}")))?;
    println!("{json}");
    println!();
    println!("{}", run.summary.trim_end());
    Ok(())
}
