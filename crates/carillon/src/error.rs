//! Error types for Carillon operations.
//!
//! This module provides the main error type [`CarillonError`] which wraps
//! the failure domains of the crate: building, serialization, parsing, and
//! configuration handling.

use std::io;

use thiserror::Error;

use carillon_parser::error::ParseError;

use crate::builder::BuildError;
use crate::config::ConfigError;
use crate::serialize::SerializeError;

/// The main error type for Carillon operations.
///
/// # Diagnostic Variants
///
/// The `Parse` variant contains structured error information with source
/// code spans, alongside the source text it refers to, so callers can
/// produce rich error reports.
#[derive(Debug, Error)]
pub enum CarillonError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{err}")]
    Parse { err: ParseError, src: String },

    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("serialization error: {0}")]
    Serialize(#[from] SerializeError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CarillonError {
    /// Create a new `Parse` error with the associated source code.
    pub fn new_parse_error(err: ParseError, src: impl Into<String>) -> Self {
        Self::Parse {
            err,
            src: src.into(),
        }
    }
}
