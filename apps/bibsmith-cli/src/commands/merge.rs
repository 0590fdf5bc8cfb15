//! `bibsmith merge`: combine several bibliographies into one file

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use bibsmith_core::merge::RescueFn;
use bibsmith_core::{merge, BibsmithConfig, Bibliography, ConflictMode, MergeOptions};
use clap::Args;

use crate::prompt::{self, Shared};

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// The .bib files to merge; entries of the first take precedence
    #[arg(required = true)]
    pub bib_files: Vec<PathBuf>,

    /// File to write [default: merged.bib]
    #[arg(short, long = "output-file")]
    pub output: Option<PathBuf>,

    /// A .bib file whose keys are left out of the result; may be repeated
    #[arg(short, long)]
    pub exclude: Vec<PathBuf>,

    /// How to resolve key collisions: ask, first, last, rename or error
    #[arg(short = 'x', long)]
    pub conflict_mode: Option<ConflictMode>,

    /// Ask before removing entries listed in an exclude file
    #[arg(short, long)]
    pub interactive_remove: bool,

    /// Overwrite the output file if it exists
    #[arg(short, long, conflicts_with = "no_clobber")]
    pub clobber: bool,

    /// Never overwrite an existing output file
    #[arg(short, long)]
    pub no_clobber: bool,

    /// Print the merge report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl MergeArgs {
    pub fn output(&self, config: &BibsmithConfig) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| config.merge.output.clone())
    }

    /// Whether an existing `output` may be replaced; asks when neither
    /// `--clobber` nor `--no-clobber` was given
    fn may_overwrite<R, W>(&self, output: &Path, prompt: Option<&Shared<R, W>>) -> Result<bool>
    where
        R: BufRead,
        W: Write,
    {
        if self.clobber {
            return Ok(true);
        }
        if self.no_clobber {
            return Ok(false);
        }
        match prompt {
            Some(prompt) => Ok(prompt
                .borrow_mut()
                .confirm(&format!("{} exists. Overwrite it?", output.display()))?),
            None => Ok(false),
        }
    }
}

fn load_all(paths: &[PathBuf]) -> Result<Vec<Bibliography>> {
    paths
        .iter()
        .map(|path| {
            Bibliography::load(path)
                .map(|loaded| loaded.bibliography)
                .with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect()
}

pub fn run(args: MergeArgs, config: &BibsmithConfig) -> Result<()> {
    let output = args.output(config);
    let prompt = prompt::terminal();

    if output.exists() && !args.may_overwrite(&output, prompt.as_ref())? {
        eprintln!("Output file {} exists, stopping", output.display());
        return Ok(());
    }

    let sources = load_all(&args.bib_files)?;
    let excludes = load_all(&args.exclude)?;

    let mode = args.conflict_mode.unwrap_or(config.merge.conflict_mode);
    let mut policy = super::collision_policy(mode, prompt.as_ref());
    let rescue_excluded = match (&prompt, args.interactive_remove) {
        (Some(prompt), true) => {
            Some(Box::new(prompt::rescue_excluded(Rc::clone(prompt))) as RescueFn)
        }
        (None, true) => {
            tracing::warn!("No terminal to ask on; excluded entries are removed");
            None
        }
        (_, false) => None,
    };
    let options = MergeOptions {
        rule: config.content_rule(),
        abort_on_reject: mode == ConflictMode::Error,
        rescue_excluded,
    };

    let outcome = merge(&sources, &excludes, &mut policy, options)
        .with_context(|| format!("{} was not written", output.display()))?;
    outcome.bibliography.save(&output)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else {
        eprintln!(
            "Merged {} files into {} ({} entries): {}",
            sources.len(),
            output.display(),
            outcome.bibliography.len(),
            outcome.report
        );
    }
    Ok(())
}
