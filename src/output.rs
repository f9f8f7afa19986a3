//! Progress and error text
//!
//! Everything the validator reports goes through `Output`, which writes plain
//! text (no colors) to any `Write` sink. The binary hands it stdout; tests hand
//! it a `Vec<u8>`.

use std::fmt::Display;
use std::io::{self, Write};

use crate::error::CheckError;

/// Lines listed under an error when not verbose
pub const DEFAULT_MAX_LISTED: usize = 10;

pub struct Output<W: Write> {
    sink: W,
    verbose: bool,
    max_listed: usize,
    started: bool,
}

impl<W: Write> Output<W> {
    pub fn new(sink: W, verbose: bool, max_listed: usize) -> Self {
        Self {
            sink,
            verbose,
            max_listed,
            started: false,
        }
    }

    /// Stage banner, e.g. `==== Parsing DSPL dataset....`
    pub fn header(&mut self, title: &str) -> io::Result<()> {
        if self.started {
            writeln!(self.sink)?;
        }
        self.started = true;
        writeln!(self.sink, "==== {}....", title)
    }

    pub fn line(&mut self, text: impl Display) -> io::Result<()> {
        self.started = true;
        writeln!(self.sink, "{}", text)
    }

    /// Indented listing, capped at `max_listed` unless verbose
    pub fn list<T: Display>(&mut self, items: &[T]) -> io::Result<()> {
        let shown = if self.verbose {
            items.len()
        } else {
            items.len().min(self.max_listed)
        };
        for item in &items[..shown] {
            writeln!(self.sink, "  {}", item)?;
        }
        if shown < items.len() {
            writeln!(
                self.sink,
                "  ... and {} more (use --verbose to list all)",
                items.len() - shown
            )?;
        }
        Ok(())
    }

    /// Error message followed by whatever details it carries
    pub fn error(&mut self, err: &CheckError) -> io::Result<()> {
        self.line(err)?;
        match err {
            CheckError::SchemaInvalid { errors, .. } => self.list(errors),
            _ => self.list(err.issues()),
        }
    }

    pub fn completed(&mut self) -> io::Result<()> {
        if self.started {
            writeln!(self.sink)?;
        }
        writeln!(self.sink, "Completed.")?;
        self.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
