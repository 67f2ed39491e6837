//! Carillon - a pulse-level control-sequence language.
//!
//! Programs over named elements and pulses are built through
//! [`builder::ProgramBuilder`], rendered to a canonical re-parseable text
//! with [`serialize_program`], and parsed back with [`parse_program`].
//! Hardware configurations are normalized and validated through
//! [`load_config`], with two interchangeable validation strategies.
//!
//! # Examples
//!
//! ```
//! use carillon::{ProgramBuilder, parse_program, serialize_program};
//! use carillon_core::expr::VariableKind;
//!
//! let mut builder = ProgramBuilder::new();
//! builder.declare("x", VariableKind::Int).unwrap();
//! builder.play("x90", "qubit", Default::default()).unwrap();
//! let program = builder.finish().unwrap();
//!
//! let text = serialize_program(&program).unwrap();
//! let reparsed = parse_program(&text).unwrap();
//! assert_eq!(program, reparsed);
//! ```

pub mod builder;
pub mod config;

mod error;
mod serialize;

pub use carillon_core::{chunk, expr, identifier, program, stmt};
pub use carillon_parser::{Span, Spanned, is_reserved_word, is_valid_identifier};

pub use builder::{BuildError, PlayOptions, ProgramBuilder};
pub use error::CarillonError;
pub use serialize::SerializeError;

use std::fs;
use std::path::Path;

use log::{debug, info};

use carillon_core::program::Program;

use config::{Config, ConfigError, Strategy};

/// Serialize a program to its canonical text.
///
/// # Errors
///
/// Returns `CarillonError` when the program references an undeclared
/// variable or stream, or nests deeper than the supported limit. Nothing is
/// emitted on failure.
pub fn serialize_program(program: &Program) -> Result<String, CarillonError> {
    info!("Serializing program");
    let text = serialize::serialize(program)?;
    debug!(bytes = text.len(); "Program serialized");
    Ok(text)
}

/// Parse canonical program text into a program tree.
///
/// # Errors
///
/// Returns `CarillonError` carrying the structured diagnostics and the
/// source text for syntax or reference errors.
pub fn parse_program(source: &str) -> Result<Program, CarillonError> {
    info!("Parsing program");
    let program = carillon_parser::parse(source)
        .map_err(|err| CarillonError::new_parse_error(err, source))?;
    debug!(statements = program.body.len(); "Program parsed");
    Ok(program)
}

/// Parse canonical program text from a file.
pub fn parse_program_file(path: impl AsRef<Path>) -> Result<Program, CarillonError> {
    let source = fs::read_to_string(path)?;
    parse_program(&source)
}

/// Build and validate a configuration from a raw mapping.
///
/// The returned model is fully normalized and identical whichever strategy
/// checked it.
pub fn load_config(raw: &serde_json::Value, strategy: Strategy) -> Result<Config, CarillonError> {
    info!("Loading configuration");
    let config = config::build_config(raw).map_err(ConfigError::from)?;
    config::validate(&config, strategy)?;
    debug!(elements = config.elements.len(), pulses = config.pulses.len(); "Configuration validated");
    Ok(config)
}
