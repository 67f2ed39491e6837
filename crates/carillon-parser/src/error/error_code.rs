//! Error codes for the Carillon diagnostic system.
//!
//! Error codes are organized by phase:
//! - `E0xx` - Lexer errors
//! - `E1xx` - Parser errors
//! - `E2xx` - Elaboration (reference resolution) errors

use std::fmt;

/// Error codes for categorizing diagnostic errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // =========================================================================
    // Lexer Errors (E0xx)
    // =========================================================================
    /// Unterminated or malformed string literal.
    ///
    /// A string was opened with a quote but never closed, or contains an
    /// escape other than `\n`, `\t`, `\\`, `\"`.
    E001,

    /// Unexpected character.
    ///
    /// A character was encountered that starts no token of the language.
    E002,

    /// Invalid numeric literal.
    ///
    /// A numeric literal could not be represented (integer overflow or a
    /// malformed float).
    E003,

    // =========================================================================
    // Parser Errors (E1xx)
    // =========================================================================
    /// Unexpected token.
    ///
    /// The parser encountered a token it did not expect at this position.
    E100,

    /// Incomplete input.
    ///
    /// The input ended before a complete construct was parsed.
    E101,

    // =========================================================================
    // Elaboration Errors (E2xx)
    // =========================================================================
    /// Undefined variable.
    ///
    /// A variable was referenced that is not declared in any enclosing scope.
    E200,

    /// Duplicate variable declaration.
    ///
    /// A variable with this name has already been declared in the program.
    E201,

    /// Undefined stream.
    ///
    /// A `save`, `process`, or `adc` clause references a stream that was
    /// never declared.
    E202,

    /// Duplicate stream declaration.
    ///
    /// A stream with this name has already been declared.
    E203,

    /// Mismatched parallel iteration.
    ///
    /// A `for_each` has a different number of bindings and iterables, or
    /// iterables of unequal length.
    E204,

    /// Invalid indexing.
    ///
    /// An array was used as a scalar, or a scalar was indexed.
    E205,
}

impl ErrorCode {
    /// Returns the numeric code as a string (e.g., "E001").
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E001 => "E001",
            ErrorCode::E002 => "E002",
            ErrorCode::E003 => "E003",
            ErrorCode::E100 => "E100",
            ErrorCode::E101 => "E101",
            ErrorCode::E200 => "E200",
            ErrorCode::E201 => "E201",
            ErrorCode::E202 => "E202",
            ErrorCode::E203 => "E203",
            ErrorCode::E204 => "E204",
            ErrorCode::E205 => "E205",
        }
    }

    /// Returns a short description of what this error code means.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::E001 => "unterminated or malformed string literal",
            ErrorCode::E002 => "unexpected character",
            ErrorCode::E003 => "invalid numeric literal",
            ErrorCode::E100 => "unexpected token",
            ErrorCode::E101 => "incomplete input",
            ErrorCode::E200 => "undefined variable",
            ErrorCode::E201 => "duplicate variable declaration",
            ErrorCode::E202 => "undefined stream",
            ErrorCode::E203 => "duplicate stream declaration",
            ErrorCode::E204 => "mismatched parallel iteration",
            ErrorCode::E205 => "invalid indexing",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
