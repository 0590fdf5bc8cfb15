//! Terminal questions for interactive runs
//!
//! The core library never reads from the terminal. Collision and exclusion
//! decisions are closures built here around one shared [`Prompt`], so the
//! merge engine and the build driver stay free of I/O.

use std::cell::RefCell;
use std::io::{self, BufRead, IsTerminal, Write};
use std::rc::Rc;

use bibsmith_bibtex::{format_entry, is_valid_key};
use bibsmith_core::{BibTeXEntry, Resolution};

/// Questions and answers over a reader and a writer
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

pub type Shared<R, W> = Rc<RefCell<Prompt<R, W>>>;

/// Stdin and stderr, when stdin is a terminal
pub fn terminal() -> Option<Shared<io::StdinLock<'static>, io::Stderr>> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return None;
    }
    Some(Rc::new(RefCell::new(Prompt::new(stdin.lock(), io::stderr()))))
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// One trimmed line; `None` at end of input
    fn line(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{question} ")?;
        self.output.flush()?;
        let mut answer = String::new();
        if self.input.read_line(&mut answer)? == 0 {
            return Ok(None);
        }
        Ok(Some(answer.trim().to_string()))
    }

    /// Index of the chosen option; asks again until the answer is valid
    pub fn choose(&mut self, question: &str, options: &[&str]) -> io::Result<Option<usize>> {
        writeln!(self.output, "{question}")?;
        for (i, option) in options.iter().enumerate() {
            writeln!(self.output, "  {}: {}", i + 1, option)?;
        }
        loop {
            let Some(answer) = self.line(&format!("Choice [1-{}]:", options.len()))? else {
                return Ok(None);
            };
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(Some(n - 1)),
                _ => writeln!(self.output, "Please enter a number from 1 to {}", options.len())?,
            }
        }
    }

    /// A citation key; asks again until it is one a .bib file can hold
    pub fn key(&mut self, question: &str) -> io::Result<Option<String>> {
        loop {
            match self.line(question)? {
                None => return Ok(None),
                Some(answer) if is_valid_key(&answer) => return Ok(Some(answer)),
                Some(answer) if answer.is_empty() => writeln!(self.output, "A key is required")?,
                Some(_) => writeln!(
                    self.output,
                    "Keys may only use letters, digits and _-:./+"
                )?,
            }
        }
    }

    /// Yes or no; anything but `y`/`yes` is no
    pub fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let answer = self.line(&format!("{question} [y/N]"))?;
        Ok(matches!(
            answer.as_deref().map(str::to_lowercase).as_deref(),
            Some("y" | "yes")
        ))
    }

    fn show(&mut self, heading: &str, entry: &BibTeXEntry) -> io::Result<()> {
        writeln!(self.output, "\n{heading}")?;
        writeln!(self.output, "{}", format_entry(entry))
    }
}

/// Collision resolver asking on the prompt
///
/// End of input or a broken terminal aborts the run.
pub fn collision_resolver<R, W>(
    prompt: Shared<R, W>,
) -> impl FnMut(&BibTeXEntry, &BibTeXEntry) -> Resolution + 'static
where
    R: BufRead + 'static,
    W: Write + 'static,
{
    move |existing, incoming| {
        ask_collision(&mut prompt.borrow_mut(), existing, incoming).unwrap_or_else(|e| {
            tracing::warn!("Could not read an answer: {}", e);
            Resolution::Abort
        })
    }
}

fn ask_collision<R: BufRead, W: Write>(
    prompt: &mut Prompt<R, W>,
    existing: &BibTeXEntry,
    incoming: &BibTeXEntry,
) -> io::Result<Resolution> {
    writeln!(prompt.output, "\nConflicting key \"{}\"", existing.cite_key)?;
    prompt.show("Entry already in the bibliography:", existing)?;
    prompt.show("Incoming entry:", incoming)?;

    let choice = prompt.choose(
        "What action to take?",
        &[
            "Keep the existing entry",
            "Keep the incoming entry",
            "Keep both but change the incoming key",
            "Abort",
        ],
    )?;
    Ok(match choice {
        Some(0) => Resolution::Reject,
        Some(1) => Resolution::Replace,
        Some(2) => match prompt.key("Enter a new key:")? {
            Some(key) => Resolution::RenameTo(key),
            None => Resolution::Abort,
        },
        _ => Resolution::Abort,
    })
}

/// Offer each excluded entry to be kept under another key
pub fn rescue_excluded<R, W>(
    prompt: Shared<R, W>,
) -> impl FnMut(&BibTeXEntry, &str) -> Option<String> + 'static
where
    R: BufRead + 'static,
    W: Write + 'static,
{
    move |entry, listed_in| {
        ask_rescue(&mut prompt.borrow_mut(), entry, listed_in).unwrap_or_else(|e| {
            tracing::warn!("Could not read an answer: {}", e);
            None
        })
    }
}

fn ask_rescue<R: BufRead, W: Write>(
    prompt: &mut Prompt<R, W>,
    entry: &BibTeXEntry,
    listed_in: &str,
) -> io::Result<Option<String>> {
    let heading = format!(
        "Entry with key \"{}\" is listed in {}",
        entry.cite_key, listed_in
    );
    prompt.show(&heading, entry)?;
    match prompt.choose("What action to take?", &["Remove entry", "Change entry key"])? {
        Some(1) => prompt.key("Enter a new key:"),
        _ => Ok(None),
    }
}
