//! Carillon Core Types and Definitions
//!
//! This crate provides the foundational types for the Carillon pulse-control
//! DSL. It includes:
//!
//! - **Identifiers**: Efficient string-interned identifiers ([`identifier::Id`])
//! - **Expressions**: Typed expression nodes ([`expr`] module)
//! - **Statements**: Typed statement nodes and blocks ([`stmt`] module)
//! - **Programs**: The program tree with its stream table ([`program`] module)
//! - **Configuration**: The normalized hardware configuration model
//!   ([`config`] module)
//! - **Chunks**: Run-length grouping used by the serializer's list shorthand
//!   and by integration-weight normalization ([`chunk`] module)

pub mod chunk;
pub mod config;
pub mod expr;
pub mod identifier;
pub mod program;
pub mod stmt;
