//! nativa CLI - incremental multi-architecture native builds.

mod build;
mod clean;
mod colors;
mod output;
mod stubs;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nativa")]
#[command(about = "Incremental multi-architecture native build orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, link and generate stubs
    Build {
        /// Path to the configuration file (default: nativa.json)
        #[arg(short, long)]
        config: Option<String>,

        /// Build with optimizations
        #[arg(long)]
        release: bool,

        /// Number of parallel compiler slots
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Regenerate Java stubs from existing class maps
    Stubs {
        /// Path to the configuration file (default: nativa.json)
        #[arg(short, long)]
        config: Option<String>,

        /// Use the release build directory
        #[arg(long)]
        release: bool,
    },

    /// Remove the build directory
    Clean {
        /// Path to the configuration file (default: nativa.json)
        #[arg(short, long)]
        config: Option<String>,

        /// Clean the release build directory
        #[arg(long)]
        release: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format nativa-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(nativa_err) = err.downcast_ref::<nativa_core::Error>() {
            anyhow::anyhow!("{}", nativa_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Build {
            config,
            release,
            jobs,
        } => build::execute(config.as_deref(), release, jobs).map_err(format_error)?,

        Commands::Stubs { config, release } => {
            stubs::execute(config.as_deref(), release).map_err(format_error)?;
        }

        Commands::Clean { config, release } => {
            clean::execute(config.as_deref(), release).map_err(format_error)?;
        }
    }

    Ok(())
}
