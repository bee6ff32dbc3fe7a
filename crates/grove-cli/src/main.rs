//! Grove CLI - Moves a GitLab group tree and its projects between instances.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod settings;

use settings::Overrides;

/// Grove - GitLab organization migration
#[derive(Parser, Debug)]
#[command(name = "grove")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    /// Configuration file (default: ./grove.yaml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replicate the group tree and migrate every project
    Migrate {
        /// Replicate groups only, leave projects alone
        #[arg(long)]
        groups_only: bool,

        /// Target root group path
        #[arg(long)]
        target_root: Option<String>,

        /// Source namespace stripped from group paths
        #[arg(long)]
        source_root: Option<String>,

        /// Directory for temporary export archives
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// Write the final report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show what would be created without writing to the target
    Plan {
        /// Target root group path
        #[arg(long)]
        target_root: Option<String>,

        /// Source namespace stripped from group paths
        #[arg(long)]
        source_root: Option<String>,
    },

    /// Verify that both instances accept their tokens
    Check,

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable output
    Pretty,
    /// One JSON object per line
    Json,
}

fn init_logging(verbose: u8, format: LogFormat) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let registry = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("grove={log_level},grove_migrate={log_level}").into()),
    );

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Migrate {
            groups_only,
            target_root,
            source_root,
            archive_dir,
            report,
        } => {
            let overrides = Overrides {
                groups_only,
                target_root,
                source_root,
                archive_dir,
            };
            commands::migrate(config_path, &overrides, report.as_deref()).await
        }
        Commands::Plan {
            target_root,
            source_root,
        } => {
            let overrides = Overrides {
                target_root,
                source_root,
                ..Default::default()
            };
            commands::plan(config_path, &overrides).await
        }
        Commands::Check => commands::check(config_path).await,
        Commands::Version => {
            println!("grove {}", grove_migrate::VERSION);
            Ok(commands::Outcome::Success)
        }
    };

    match result {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
