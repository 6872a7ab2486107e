//! `classify`: run the signal classifier over a captured log.
//!
//! Useful for checking the patterns against a `stdout.log` from a trial
//! directory, or against output from a newer node release.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};

use serde::Serialize;

use crate::cli::args::{ClassifyArgs, OutputFormat};
use crate::error::MinebenchError;
use crate::signal::{LogSignal, classify};

/// A line that carried at least one signal.
#[derive(Debug, Clone, Serialize)]
pub struct LineMatch {
    /// One-based line number.
    pub line: u64,
    /// Signals found on the line.
    pub signals: Vec<LogSignal>,
}

/// Signal totals over a whole log.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ClassifyReport {
    /// Lines read.
    pub lines: u64,
    /// Lines with an attempt signal.
    pub attempts: u64,
    /// Lines with a thread-start confirmation.
    pub threads_started: u64,
    /// Lines with a mine effect.
    pub mine_effects: u64,
    /// Thread count of the last confirmation.
    pub last_threads: Option<u32>,
    /// Matching lines, in order.
    pub matches: Vec<LineMatch>,
}

impl ClassifyReport {
    /// Classifies every line of `reader`. Invalid UTF-8 is replaced.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading fails.
    pub fn from_reader<R: BufRead>(mut reader: R) -> std::io::Result<Self> {
        let mut report = Self::default();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&buf);
            report.record(text.trim_end_matches(['\n', '\r']));
        }
        Ok(report)
    }

    fn record(&mut self, line: &str) {
        self.lines += 1;
        let signals = classify(line);
        if signals.is_empty() {
            return;
        }
        if signals.has_attempt() {
            self.attempts += 1;
        }
        if let Some(threads) = signals.threads_started() {
            self.threads_started += 1;
            self.last_threads = Some(threads);
        }
        if signals.has_mine_effect() {
            self.mine_effects += 1;
        }
        self.matches.push(LineMatch {
            line: self.lines,
            signals: signals.iter().collect(),
        });
    }

    /// Renders the totals line.
    #[must_use]
    pub fn totals(&self) -> String {
        let mut out = format!(
            "lines={} attempts={} threads_started={} mine_effects={}",
            self.lines, self.attempts, self.threads_started, self.mine_effects
        );
        if let Some(threads) = self.last_threads {
            let _ = write!(out, " last_threads={threads}");
        }
        out
    }
}

/// Classifies the file (or stdin) and prints matches and totals.
///
/// # Errors
///
/// Returns an I/O error if the input cannot be read.
pub fn run(args: &ClassifyArgs) -> Result<(), MinebenchError> {
    let report = match &args.file {
        Some(path) => ClassifyReport::from_reader(BufReader::new(File::open(path)?))?,
        None => ClassifyReport::from_reader(std::io::stdin().lock())?,
    };

    match args.format {
        OutputFormat::Human => {
            if !args.summary {
                for m in &report.matches {
                    let signals: Vec<String> = m.signals.iter().map(ToString::to_string).collect();
                    println!("{:>6}: {}", m.line, signals.join(", "));
                }
            }
            println!("{}", report.totals());
        }
        OutputFormat::Json => {
            let mut report = report;
            if args.summary {
                report.matches.clear();
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
