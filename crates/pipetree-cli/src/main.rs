//! Pipetree CLI - inspect saved containers and run declarative pipelines.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pipetree - name-addressed containers and step pipelines.
#[derive(Parser)]
#[command(name = "pipetree")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the shape of a saved container
    Describe {
        /// Directory written by a previous save
        dir: PathBuf,

        /// Emit JSON instead of an indented tree
        #[arg(long)]
        json: bool,
    },

    /// List node names in pre-order
    Names {
        /// Directory written by a previous save
        dir: PathBuf,
    },

    /// Print the header of a node as JSON
    Header {
        /// Directory written by a previous save
        dir: PathBuf,

        /// Node to inspect (defaults to the root)
        #[arg(short, long)]
        node: Option<String>,
    },

    /// Evaluate a pipeline definition against a saved container
    Run {
        /// Pipeline definition (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Saved container to process
        #[arg(short, long)]
        input: PathBuf,

        /// Where to save the resulting container
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("PIPETREE_LOG").unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = match cli.command {
        Commands::Describe { dir, json } => commands::inspect::describe(&dir, json)?,
        Commands::Names { dir } => commands::inspect::names(&dir)?,
        Commands::Header { dir, node } => commands::inspect::header(&dir, node.as_deref())?,
        Commands::Run {
            pipeline,
            input,
            output,
        } => commands::run::run(&pipeline, &input, &output)?,
    };
    print!("{}", output);
    Ok(())
}
