//! `bibsmith render-web`: publish a bibliography into an HTML page

use std::path::PathBuf;

use anyhow::{Context, Result};
use bibsmith_core::config::RenderConfig;
use bibsmith_core::render::RenderOptions;
use bibsmith_core::{render_web_page, BibsmithConfig, YearHeader};
use clap::Args;

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// BibTeX file to read entries from
    pub bib_file: PathBuf,

    /// Page to insert the list into, between <!--START BIB--> and <!--END BIB-->
    pub html_file: PathBuf,

    /// Last name of an author to print in bold; may be repeated
    #[arg(short = 'a', long = "author-bold")]
    pub bold_authors: Vec<String>,

    /// Entry type to include, e.g. article; may be repeated. Default: all
    #[arg(short = 't', long = "entry-type")]
    pub entry_types: Vec<String>,

    /// List papers led by a bold author first within each year
    #[arg(long)]
    pub promote_bold_first: bool,

    /// Year headers: std, bootstrap, or a template where {} is the year
    #[arg(short = 'y', long)]
    pub year_header: Option<String>,

    /// Do not keep the previous page as <page>.bak
    #[arg(short = 'b', long)]
    pub no_backup: bool,
}

impl RenderArgs {
    /// Flags layered over the configured defaults
    pub fn render_options(&self, config: &RenderConfig) -> RenderOptions {
        let mut options = config.to_options();
        if !self.bold_authors.is_empty() {
            options.bold_authors = self.bold_authors.clone();
        }
        if !self.entry_types.is_empty() {
            options.entry_types = self.entry_types.clone();
        }
        options.promote_bold_first_author |= self.promote_bold_first;
        if let Some(header) = &self.year_header {
            options.year_header = YearHeader::parse(header);
        }
        options
    }
}

pub fn run(args: RenderArgs, config: &BibsmithConfig) -> Result<()> {
    let options = args.render_options(&config.render);
    let backup = !args.no_backup && config.render.backup;

    let report = render_web_page(&args.bib_file, &args.html_file, &options, backup)
        .with_context(|| {
            format!(
                "Failed to render {} into {}",
                args.bib_file.display(),
                args.html_file.display()
            )
        })?;

    eprintln!(
        "Rendered {} entries in {} years into {}",
        report.entries,
        report.years,
        args.html_file.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: RenderArgs,
    }

    fn parse(argv: &[&str]) -> RenderArgs {
        Wrapper::try_parse_from(std::iter::once("render-web").chain(argv.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "refs.bib",
            "index.html",
            "-a",
            "Laughner",
            "-a",
            "Cohen",
            "-t",
            "article",
            "-y",
            "bootstrap",
        ]);
        let config = RenderConfig {
            bold_authors: vec!["Someone".to_string()],
            promote_bold_first_author: true,
            ..RenderConfig::default()
        };

        let options = args.render_options(&config);
        assert_eq!(options.bold_authors, vec!["Laughner", "Cohen"]);
        assert_eq!(options.entry_types, vec!["article"]);
        assert_eq!(options.year_header, YearHeader::Bootstrap);
        assert!(options.promote_bold_first_author);
    }

    #[test]
    fn test_config_used_without_flags() {
        let args = parse(&["refs.bib", "index.html"]);
        let config = RenderConfig {
            bold_authors: vec!["Someone".to_string()],
            year_header: "<h2>{}</h2>".to_string(),
            ..RenderConfig::default()
        };

        let options = args.render_options(&config);
        assert_eq!(options.bold_authors, vec!["Someone"]);
        assert_eq!(options.year_header.render("2020"), "<h2>2020</h2>");
        assert!(!args.no_backup);
    }

    #[test]
    fn test_html_file_is_required() {
        assert!(Wrapper::try_parse_from(["render-web", "refs.bib"]).is_err());
    }
}
