//! Console and log-file output

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Console level from `-v` / `-q`
///
/// `-q` turns the console off; warnings still reach the log file.
pub fn console_level(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::OFF,
        (false, 0) => LevelFilter::WARN,
        (false, 1) => LevelFilter::INFO,
        (false, _) => LevelFilter::DEBUG,
    }
}

/// The log file kept next to a bibliography: `refs.bib` → `refs.log`
pub fn log_file_for(bib_file: &Path) -> std::path::PathBuf {
    bib_file.with_extension("log")
}

/// Install the global subscriber
///
/// `RUST_LOG` replaces the console level when set.
pub fn init(verbose: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let level = console_level(verbose, quiet);
    let console_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = match log_file {
        Some(path) => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            write_banner(&mut file, path)?;
            let file_level = std::cmp::max(level, LevelFilter::WARN);
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(file_level),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to install the logger")?;
    Ok(())
}

fn write_banner(file: &mut impl Write, path: &Path) -> Result<()> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let message = format!(
        "# bibsmith: operating on {} at {} #",
        name,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    let rule = "#".repeat(message.len());
    writeln!(file, "\n{rule}\n{message}\n{rule}\n")
        .with_context(|| format!("Failed to write to log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_level() {
        assert_eq!(console_level(0, false), LevelFilter::WARN);
        assert_eq!(console_level(1, false), LevelFilter::INFO);
        assert_eq!(console_level(3, false), LevelFilter::DEBUG);
        assert_eq!(console_level(2, true), LevelFilter::OFF);
    }

    #[test]
    fn test_log_file_for() {
        assert_eq!(
            log_file_for(Path::new("/papers/refs.bib")),
            Path::new("/papers/refs.log")
        );
    }

    #[test]
    fn test_banner() {
        let mut out = Vec::new();
        write_banner(&mut out, Path::new("refs.log")).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("# bibsmith: operating on refs at "));
        assert_eq!(lines[0].len(), lines[1].len());
    }
}
