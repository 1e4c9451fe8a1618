mod cli;

use clap::{Parser, Subcommand, builder::styling};
use eyre::Result;
use incremental_extractor::Job;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// Incremental extractor: pull only what changed since the last run, partition by partition
#[derive(Parser)]
#[command(name = "incrx", version, styles = STYLES)]
struct Cli {
    /// The dotenv-format job file to read properties from
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override a job property, e.g. --set job.workers=8
    #[arg(short, long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the work units the next run would execute
    Plan,

    /// Extract every pending work unit and commit checkpoints
    Run,

    /// Show the committed checkpoints
    Checkpoints,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    let props = cli::load_properties(cli.config.as_deref(), &cli.overrides)?;
    let job = Job::new(props);

    match cli.command {
        Commands::Plan => {
            log::info!("Planning job {}", job.name().cyan());
            let count = cli::plan(&job).await?;
            log::info!("{} work unit(s) pending", count.bright_black());
        }
        Commands::Run => {
            log::info!("Running job {}", job.name().cyan());
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted; cancelling job");
                    on_signal.cancel();
                }
            });

            let status = cli::run(&job, cancel).await?;
            if status.exit_code() != 0 {
                std::process::exit(status.exit_code());
            }
        }
        Commands::Checkpoints => {
            let count = cli::checkpoints(&job)?;
            log::info!("{} partition(s) checkpointed", count.bright_black());
        }
    }

    Ok(())
}
