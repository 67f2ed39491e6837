//! Error and diagnostic system for the Carillon parser.
//!
//! The system is built around the [`Diagnostic`] type, which represents a
//! single error or warning with an optional error code, labeled source
//! spans, and help text. Multiple diagnostics are wrapped in [`ParseError`]
//! for returning from the parsing lifecycle (lexing, parsing, elaboration).
//!
//! # Example
//!
//! ```
//! # use carillon_parser::error::{Diagnostic, ErrorCode};
//! # use carillon_parser::Span;
//!
//! let span = Span::new(100..120);
//! let original_span = Span::new(50..70);
//!
//! let diag = Diagnostic::error("variable `x` is declared multiple times")
//!     .with_code(ErrorCode::E201)
//!     .with_label(span, "duplicate declaration")
//!     .with_secondary_label(original_span, "first declared here")
//!     .with_help("remove the duplicate or use a different name");
//! ```

mod collector;
mod diagnostic;
mod error_code;
mod label;
mod parse_error;
mod severity;

pub(crate) use collector::DiagnosticCollector;

pub use diagnostic::Diagnostic;
pub use error_code::ErrorCode;
pub use label::Label;
pub use parse_error::ParseError;
pub use severity::Severity;
