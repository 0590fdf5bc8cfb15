//! `bibsmith build`: create or update a bibliography from a folder of PDFs

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bibsmith_core::options::{self, names};
use bibsmith_core::{
    BibError, BibTeXEntry, BibsmithConfig, BuildJob, BuildOptions, CollisionPolicy, ConflictMode,
    DoiLookup, IdentifierExtractor, OptionsRecord, PdfiumExtractor, Resolution,
};
use clap::Args;

use crate::logging;
use crate::prompt;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// BibTeX file to create or update
    #[arg(env = "BIBSMITH_BIB_FILE")]
    pub bib_file: PathBuf,

    /// Top directory searched for PDFs. Defaults to the directory recorded
    /// in the file, then BIBSMITH_PDF_DIR, then the current directory
    #[arg(long, visible_alias = "pdf-top-dir")]
    pub pdf_dir: Option<PathBuf>,

    /// Skip PDFs whose DOI is already in the bibliography
    #[arg(long)]
    pub no_duplicates: bool,

    /// Remove entries whose file no longer exists
    #[arg(long)]
    pub prune: bool,

    /// Do not copy the file to <file>.bak before changing it
    #[arg(long)]
    pub no_backup: bool,

    /// Only move `file` fields onto this machine's home directory
    #[arg(short = 'u', long)]
    pub update_home_dir: bool,

    /// Replace journal names with their standard abbreviations
    #[arg(long)]
    pub abbreviate_journals: bool,

    /// How to resolve key collisions: ask, first, last, rename or error
    #[arg(long)]
    pub conflict_mode: Option<ConflictMode>,

    /// Do not store the options of this run in the file
    #[arg(long)]
    pub no_options: bool,

    /// Do not append to <file stem>.log
    #[arg(long)]
    pub no_log_file: bool,

    /// Change into this directory first
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Pdfium library to load instead of the system one
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pub pdfium_path: Option<PathBuf>,
}

impl BuildArgs {
    pub fn enter_working_dir(&self) -> Result<()> {
        if let Some(dir) = &self.working_dir {
            std::env::set_current_dir(dir)
                .with_context(|| format!("Cannot change into {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn log_file(&self, config: &BibsmithConfig) -> Option<PathBuf> {
        (!self.no_log_file && config.build.log_file).then(|| logging::log_file_for(&self.bib_file))
    }

    /// Resolve this run's options
    ///
    /// Flags win over the record stored in the file, which wins over the
    /// `BIBSMITH_*` environment, which wins over the defaults.
    pub fn build_options(
        &self,
        record: &OptionsRecord,
        config: &BibsmithConfig,
        home: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<BuildOptions> {
        let as_dir = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| match home {
                Some(home) => PathBuf::from(options::rebase_home(value, home)),
                None => PathBuf::from(value),
            })
        };
        let pdf_dir = options::resolve_with_env(
            self.pdf_dir.clone(),
            record,
            names::PDF_DIR,
            &env,
            as_dir,
        )
        .unwrap_or_else(|| PathBuf::from("."));
        let no_duplicates = options::resolve_with_env(
            self.no_duplicates.then_some(true),
            record,
            names::NO_DUP,
            &env,
            options::parse_bool,
        )
        .unwrap_or(false);
        let abbreviate_journals = options::resolve_with_env(
            self.abbreviate_journals.then_some(true),
            record,
            names::ABBREVIATE_JOURNALS,
            &env,
            options::parse_bool,
        )
        .unwrap_or(config.build.abbreviate_journals);

        let mut options = BuildOptions::new(&self.bib_file, pdf_dir);
        options.no_duplicates = no_duplicates;
        options.abbreviate_journals = abbreviate_journals;
        options.prune = self.prune;
        options.backup = !self.no_backup && config.build.backup;
        options.remember_options = !self.no_options;
        if self.update_home_dir {
            let Some(home) = home else {
                bail!("Cannot determine the home directory for --update-home-dir");
            };
            options.rebase_home = Some(home.to_path_buf());
            options.scan_pdfs = false;
        }
        Ok(options)
    }
}

/// The options record at the top of `bib_file`; empty for a new file
fn read_record(bib_file: &Path) -> Result<OptionsRecord> {
    match fs::read_to_string(bib_file) {
        Ok(text) => Ok(OptionsRecord::from_header(&text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(OptionsRecord::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", bib_file.display())),
    }
}

pub fn run(args: BuildArgs, config: &BibsmithConfig) -> Result<()> {
    let record = read_record(&args.bib_file)?;
    let home = dirs::home_dir();
    let options = args.build_options(&record, config, home.as_deref(), |var| {
        std::env::var(var).ok()
    })?;
    tracing::info!(
        "Building {} from {}",
        options.bib_file.display(),
        options.pdf_dir.display()
    );

    let extractor: Box<dyn IdentifierExtractor> = if options.scan_pdfs {
        Box::new(match &args.pdfium_path {
            Some(path) => PdfiumExtractor::with_library(path)?,
            None => PdfiumExtractor::new()?,
        })
    } else {
        // Not consulted when only rebasing
        Box::new(|_: &Path| -> bibsmith_core::Result<Option<String>> { Ok(None) })
    };
    let lookup = DoiLookup::new(
        &config.build.user_agent,
        Duration::from_secs(config.build.timeout_seconds),
    )?
    .with_resolver(config.build.resolver.clone());

    let mode = args.conflict_mode.unwrap_or(ConflictMode::Ask);
    let mut policy = match mode {
        ConflictMode::Error => {
            CollisionPolicy::ask(|_: &BibTeXEntry, _: &BibTeXEntry| Resolution::Abort)
        }
        mode => super::collision_policy(mode, prompt::terminal().as_ref()),
    };

    let report = BuildJob::new(options)
        .run(extractor.as_ref(), &lookup, &mut policy)
        .map_err(|e| match e {
            BibError::Aborted { key } if mode == ConflictMode::Error => {
                BibError::KeyCollision { key }
            }
            other => other,
        })
        .with_context(|| format!("{} was not changed", args.bib_file.display()))?;

    eprintln!("{}: {}", args.bib_file.display(), report);
    for failure in &report.update.failures {
        match &failure.origin {
            Some(origin) => eprintln!("  {}: {}", origin.display(), failure.message),
            None => eprintln!("  {}", failure.message),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: BuildArgs,
    }

    fn parse(argv: &[&str]) -> BuildArgs {
        Wrapper::try_parse_from(std::iter::once("build").chain(argv.iter().copied()))
            .unwrap()
            .args
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_flags_win() {
        let args = parse(&["refs.bib", "--pdf-dir", "/flag", "--no-duplicates"]);
        let record = OptionsRecord::new()
            .with(names::PDF_DIR, "/record")
            .with(names::NO_DUP, false);
        let options = args
            .build_options(&record, &BibsmithConfig::default(), None, env(&[]))
            .unwrap();
        assert_eq!(options.pdf_dir, PathBuf::from("/flag"));
        assert!(options.no_duplicates);
    }

    #[test]
    fn test_record_wins_over_environment() {
        let args = parse(&["refs.bib"]);
        let record = OptionsRecord::new().with(names::PDF_DIR, "/home/alice/papers");
        let options = args
            .build_options(
                &record,
                &BibsmithConfig::default(),
                Some(Path::new("/home/bob")),
                env(&[("BIBSMITH_PDF_DIR", "/env"), ("BIBSMITH_NO_DUP", "true")]),
            )
            .unwrap();
        // Recorded paths follow the file onto this machine's home directory
        assert_eq!(options.pdf_dir, PathBuf::from("/home/bob/papers"));
        assert!(options.no_duplicates);
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["refs.bib", "--no-backup"]);
        let options = args
            .build_options(&OptionsRecord::new(), &BibsmithConfig::default(), None, env(&[]))
            .unwrap();
        assert_eq!(options.pdf_dir, PathBuf::from("."));
        assert!(!options.no_duplicates);
        assert!(!options.backup);
        assert!(options.scan_pdfs);
        assert!(options.remember_options);
    }

    #[test]
    fn test_update_home_dir_only_rebases() {
        let args = parse(&["refs.bib", "-u"]);
        let options = args
            .build_options(
                &OptionsRecord::new(),
                &BibsmithConfig::default(),
                Some(Path::new("/home/bob")),
                env(&[]),
            )
            .unwrap();
        assert_eq!(options.rebase_home, Some(PathBuf::from("/home/bob")));
        assert!(!options.scan_pdfs);

        assert!(args
            .build_options(&OptionsRecord::new(), &BibsmithConfig::default(), None, env(&[]))
            .is_err());
    }

    #[test]
    fn test_conflict_mode_parsing() {
        let args = parse(&["refs.bib", "--conflict-mode", "rename"]);
        assert_eq!(args.conflict_mode, Some(ConflictMode::Rename));
        assert!(Wrapper::try_parse_from(["build", "refs.bib", "--conflict-mode", "newest"]).is_err());
    }

    #[test]
    fn test_read_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refs.bib");
        assert!(read_record(&path).unwrap().is_empty());

        fs::write(&path, "%BIBSMITH_PDF_DIR=/papers\n\n@misc{a, title = {A}}\n").unwrap();
        assert_eq!(read_record(&path).unwrap().get(names::PDF_DIR), Some("/papers"));
    }
}
