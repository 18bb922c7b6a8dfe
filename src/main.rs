use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

mod cli;
mod config;
mod graph;
mod indexer;
mod oracle;
mod query;
mod store;

#[derive(Parser)]
#[command(name = "impactgraph")]
#[command(version)]
#[command(about = "Incremental Python code index with file-level change impact analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the project and bring the index up to date
    Refresh {
        /// Project directory to index
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Report files affected if the given files change
    Impact {
        /// Changed files (project-relative or absolute paths)
        #[arg(required = true)]
        files: Vec<String>,

        /// Maximum traversal depth
        #[arg(short, long)]
        max_depth: Option<usize>,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show index statistics
    Stats {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn init_logging(debug: bool, verbose: bool) {
    let level = if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.verbose);

    match cli.command {
        Commands::Refresh { project, format } => {
            cli::refresh::run_refresh(project, format)?;
        }

        Commands::Impact {
            files,
            max_depth,
            project,
            format,
        } => {
            cli::impact::run_impact(files, max_depth, project, format)?;
        }

        Commands::Stats { project, format } => {
            cli::stats::show_stats(project, format)?;
        }
    }

    Ok(())
}
