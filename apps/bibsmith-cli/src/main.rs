//! bibsmith - build, merge and publish BibTeX bibliographies
//!
//! `build` turns a folder of PDFs into a .bib file, `merge` combines .bib
//! files, and `render-web` writes a publication list into an HTML page.

mod commands;
mod logging;
mod prompt;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use bibsmith_core::{BibError, BibsmithConfig};
use clap::{Parser, Subcommand};

use commands::build::BuildArgs;
use commands::merge::MergeArgs;
use commands::render::RenderArgs;

#[derive(Parser, Debug)]
#[command(
    name = "bibsmith",
    about = "Build, merge and publish BibTeX bibliographies",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More console output; -v for progress, -vv for details
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// No console logging; the build log file still gets warnings
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file to read instead of the default location
    #[arg(long, global = true, env = "BIBSMITH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or update a .bib file from a folder of PDFs
    Build(BuildArgs),

    /// Write a bibliography into an HTML page
    RenderWeb(RenderArgs),

    /// Merge two or more .bib files
    Merge(MergeArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

/// 2 when the user chose to abort, 1 for every other failure
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<BibError>() {
        Some(BibError::Aborted { .. }) => 2,
        _ => 1,
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Build(args) = &cli.command {
        args.enter_working_dir()?;
    }

    let config = match &cli.config {
        Some(path) => BibsmithConfig::load(path)?,
        None => BibsmithConfig::load_default()?,
    };

    let log_file = match &cli.command {
        Commands::Build(args) => args.log_file(&config),
        _ => None,
    };
    logging::init(cli.verbose, cli.quiet, log_file.as_deref())?;

    match cli.command {
        Commands::Build(args) => commands::build::run(args, &config),
        Commands::RenderWeb(args) => commands::render::run(args, &config),
        Commands::Merge(args) => commands::merge::run(args, &config),
    }
}
