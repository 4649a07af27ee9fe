//! Library behind the `regbus-at` binary: schema dump parsing and
//! tracing setup for the address table tool.

/// Schema dump line codec and file import.
pub mod dump;
/// Tracing subscriber setup for the CLI.
pub mod logging;

#[cfg(test)]
use tempfile as _;
