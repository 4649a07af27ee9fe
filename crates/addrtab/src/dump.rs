//! Schema dump codec: one register per line.
//!
//! A dump line is the register name followed by the five store-record
//! fields, all pipe-delimited:
//!
//! ```text
//! GEM_AMC.TTC.CTRL.MODULE_RESET|66000000|w|80000000|single|1
//! ```
//!
//! Blank lines and lines starting with `#` are skipped on import, so a
//! dump survives hand annotation.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use regbus_core::{RecordError, RegisterDescriptor};

/// A malformed dump line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpLineError {
    /// The line held no `|` separating the name from the record fields.
    NoDelimiter,
    /// The name field was empty.
    EmptyName,
    /// The record fields after the name failed to parse.
    Record(RecordError),
}

impl fmt::Display for DumpLineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDelimiter => write!(f, "expected 'name|record' with pipe-delimited fields"),
            Self::EmptyName => write!(f, "empty register name"),
            Self::Record(err) => write!(f, "{err}"),
        }
    }
}

/// A failed dump file import.
#[derive(Debug)]
pub enum ImportError {
    /// The dump file could not be read.
    Io(io::Error),
    /// A line failed to parse; nothing was imported.
    Line {
        /// 1-indexed line number in the dump file.
        line: usize,
        /// The parse failure.
        source: DumpLineError,
    },
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read dump file: {err}"),
            Self::Line { line, source } => write!(f, "dump line {line}: {source}"),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<io::Error> for ImportError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Parses one dump line into a named descriptor.
///
/// # Errors
///
/// Returns a [`DumpLineError`] describing the first malformed field.
pub fn parse_dump_line(line: &str) -> Result<(String, RegisterDescriptor), DumpLineError> {
    let (name, record) = line.split_once('|').ok_or(DumpLineError::NoDelimiter)?;
    if name.is_empty() {
        return Err(DumpLineError::EmptyName);
    }
    let descriptor = RegisterDescriptor::from_record(record).map_err(DumpLineError::Record)?;
    Ok((name.to_owned(), descriptor))
}

/// Formats a named descriptor as one dump line.
#[must_use]
pub fn format_dump_line(name: &str, descriptor: &RegisterDescriptor) -> String {
    format!("{name}|{}", descriptor.to_record())
}

/// Reads a whole dump file, skipping blank and `#`-comment lines.
///
/// # Errors
///
/// Returns [`ImportError::Io`] when the file cannot be read, or
/// [`ImportError::Line`] naming the first malformed line.
pub fn read_dump(path: &Path) -> Result<Vec<(String, RegisterDescriptor)>, ImportError> {
    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let entry = parse_dump_line(trimmed).map_err(|source| ImportError::Line {
            line: index + 1,
            source,
        })?;
        entries.push(entry);
    }
    debug!(path = %path.display(), entries = entries.len(), "dump parsed");
    Ok(entries)
}
