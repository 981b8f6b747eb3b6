//! Console acknowledgment prompt.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use telestudy_runtime::{Acknowledger, Acknowledgment};
use telestudy_types::TeleopError;

/// Width used when `COLUMNS` is unset or unparsable.
const DEFAULT_WIDTH: usize = 80;

/// Prints prompts full-width and waits for a line of input.
///
/// An empty line or any other input continues; `q`, `quit`, `esc` or end of
/// input quits.  A line read after the shutdown flag was raised also quits.
pub struct ConsoleAcknowledger<R, W> {
    input: R,
    output: W,
    width: usize,
    shutdown: Option<Arc<AtomicBool>>,
}

impl ConsoleAcknowledger<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(DEFAULT_WIDTH);
        Self::new(io::stdin().lock(), io::stdout(), width)
    }
}

impl<R: BufRead, W: Write> ConsoleAcknowledger<R, W> {
    pub fn new(input: R, output: W, width: usize) -> Self {
        Self {
            input,
            output,
            width: width.max(20),
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn show(&mut self, text: &str) -> io::Result<()> {
        let rule = "═".repeat(self.width);
        writeln!(self.output)?;
        writeln!(self.output, "{}", rule.cyan())?;
        for line in wrap(text, self.width) {
            writeln!(self.output, "{}", line.bold().yellow())?;
        }
        writeln!(self.output, "{}", rule.cyan())?;
        write!(self.output, "{} ", "›".bold())?;
        self.output.flush()
    }
}

impl<R: BufRead, W: Write> Acknowledger for ConsoleAcknowledger<R, W> {
    fn acknowledge(&mut self, text: &str) -> Result<Acknowledgment, TeleopError> {
        let io_err = |e: io::Error| TeleopError::DeviceDisconnect(format!("console: {e}"));
        if self.shutdown_requested() {
            return Ok(Acknowledgment::Quit);
        }
        self.show(text).map_err(io_err)?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(io_err)?;
        if read == 0 || self.shutdown_requested() {
            return Ok(Acknowledgment::Quit);
        }
        Ok(parse_answer(&line))
    }
}

pub(crate) fn parse_answer(line: &str) -> Acknowledgment {
    match line.trim().to_ascii_lowercase().as_str() {
        "q" | "quit" | "esc" | "\u{1b}" => Acknowledgment::Quit,
        _ => Acknowledgment::Continue,
    }
}

/// Greedy word wrap to `width` columns.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
