//! I/O utilities for traffic descriptions and simulation results.
//!
//! Provides reading and writing of traffic files, which list the paths to
//! simulate, and export of per-round fidelity samples as CSV.

/// Parser and writer for traffic files.
///
/// A traffic file holds one path per line as a sequence of `(row, col)`
/// coordinates separated by whitespace or `->`. Blank lines and `#` comments
/// are ignored.
pub mod parser;

/// CSV export of fidelity samples.
///
/// Writes one row per completed round with the columns
/// `path,round,time_ns,fidelity`.
pub mod writer;
