//! # Carillon Parser
//!
//! Parser for the Carillon canonical program text. This crate provides the
//! parsing pipeline from source text to the semantic program model.
//!
//! ## Usage
//!
//! ```
//! # use carillon_parser::{parse, error::ParseError};
//!
//! fn main() -> Result<(), ParseError> {
//!     let source = r#"
//!         program {
//!             declare fixed scale = 0.5;
//!             play "x90" on "qubit" with (amp = scale);
//!         }
//!     "#;
//!
//!     let program = parse(source)?;
//!     assert_eq!(program.body.statements.len(), 2);
//!     Ok(())
//! }
//! ```

mod elaborate;
pub mod error;
mod lexer;
mod parser;
#[cfg(test)]
mod parser_tests;
mod parser_types;
mod span;
mod tokens;

pub use parser::{is_reserved_word, is_valid_identifier};
pub use span::{Span, Spanned};

use carillon_core::program::Program;
use log::debug;

use error::ParseError;

/// Parse canonical program text into a semantic [`Program`].
///
/// This is the main entry point. It orchestrates the complete pipeline:
///
/// 1. **Tokenize** - Convert source text to positioned tokens
/// 2. **Parse** - Build the spanned parse tree from tokens
/// 3. **Elaborate** - Resolve variable kinds and stream references,
///    producing the semantic model
///
/// # Returns
///
/// The parsed [`Program`] on success, or a [`ParseError`] carrying one or
/// more diagnostics with location information on failure.
///
/// # Example
///
/// ```
/// # use carillon_parser::{parse, error::ParseError};
///
/// fn main() -> Result<(), ParseError> {
///     let program = parse("program { wait 100 on \"resonator\"; }")?;
///     assert_eq!(program.body.statements.len(), 1);
///     Ok(())
/// }
/// ```
pub fn parse(source: &str) -> Result<Program, ParseError> {
    debug!(source_len = source.len(); "parsing program text");

    // Step 1: Tokenize
    let tokens = lexer::tokenize(source)?;

    // Step 2: Parse
    let script = parser::build_script(&tokens)?;

    // Step 3: Elaborate
    let program = elaborate::elaborate(&script)?;

    debug!(
        statements = program.body.statements.len(),
        streams = program.streams.len();
        "parsed program"
    );

    Ok(program)
}
