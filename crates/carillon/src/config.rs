//! Configuration loading and validation.
//!
//! The raw mapping (a [`serde_json::Value`]) goes through
//! [`build_config`], which normalizes accepted shorthand and aggregates
//! structural problems, then through [`validate`] with one of two
//! interchangeable strategies. Both strategies accept and reject the same
//! inputs; the strategies differ only in cost profile.

use std::fmt;

use thiserror::Error;

mod build;
mod rules;
mod validate;
mod wire;

pub use build::build_config;
pub use validate::{Strategy, validate};

pub use carillon_core::config::{
    AnalogInput, AnalogOutput, Config, Controller, DigitalOutput, DigitalSample, DigitalWaveform,
    Element, ElementInput, IntegrationWeights, Loopback, Mixer, MixerCorrection, Octave,
    OctaveRfOutput, OperationKind, PortRef, Pulse, Sticky, Waveform, WeightEntry,
};

/// One finding against a configuration, carrying the key path it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub path: String,
    pub message: String,
}

impl Problem {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`: {}", self.path, self.message)
    }
}

/// The raw mapping has the wrong shape: unknown keys, missing required
/// fields, or values of the wrong type. Aggregated so one pass reports
/// every problem found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStructuralError {
    problems: Vec<Problem>,
}

impl ConfigStructuralError {
    pub(crate) fn new(problems: Vec<Problem>) -> Self {
        debug_assert!(!problems.is_empty());
        Self { problems }
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }
}

impl fmt::Display for ConfigStructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.problems.as_slice() {
            [] => write!(f, "invalid configuration structure"),
            [first] => write!(f, "{first}"),
            [first, rest @ ..] => write!(f, "{first} (+{} more)", rest.len()),
        }
    }
}

impl std::error::Error for ConfigStructuralError {}

/// A well-shaped configuration violates a semantic rule: a dangling
/// reference, a required-together field set, or a field bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSemanticError {
    violations: Vec<Problem>,
}

impl ConfigSemanticError {
    pub(crate) fn new(violations: Vec<Problem>) -> Self {
        debug_assert!(!violations.is_empty());
        Self { violations }
    }

    pub fn violations(&self) -> &[Problem] {
        &self.violations
    }
}

impl fmt::Display for ConfigSemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.violations.as_slice() {
            [] => write!(f, "invalid configuration"),
            [first] => write!(f, "{first}"),
            [first, rest @ ..] => write!(f, "{first} (+{} more)", rest.len()),
        }
    }
}

impl std::error::Error for ConfigSemanticError {}

/// A failure while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Structural(#[from] ConfigStructuralError),

    #[error("{0}")]
    Semantic(#[from] ConfigSemanticError),

    /// The wire strategy's encode/decode round trip failed; this indicates
    /// a bug in the schema, not in the caller's configuration.
    #[error("internal validation error: {0}")]
    Internal(String),
}
