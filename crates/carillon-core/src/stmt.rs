//! Typed statement nodes forming the program tree.
//!
//! A [`Block`] is an ordered sequence of [`Statement`]s; ordering is
//! execution order and must be preserved exactly through
//! build → serialize → parse.

use std::fmt;

use crate::expr::{Expression, Literal, VariableKind};
use crate::identifier::Id;

/// Units accepted for piecewise-linear frequency chirps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChirpUnit {
    HzPerNs,
    MilliHzPerNs,
    MicroHzPerNs,
    NanoHzPerNs,
    GHzPerSec,
    MHzPerSec,
    KHzPerSec,
    HzPerSec,
    MilliHzPerSec,
}

impl ChirpUnit {
    /// Unit string used in the canonical text.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChirpUnit::HzPerNs => "Hz/nsec",
            ChirpUnit::MilliHzPerNs => "mHz/nsec",
            ChirpUnit::MicroHzPerNs => "uHz/nsec",
            ChirpUnit::NanoHzPerNs => "nHz/nsec",
            ChirpUnit::GHzPerSec => "GHz/sec",
            ChirpUnit::MHzPerSec => "MHz/sec",
            ChirpUnit::KHzPerSec => "KHz/sec",
            ChirpUnit::HzPerSec => "Hz/sec",
            ChirpUnit::MilliHzPerSec => "mHz/sec",
        }
    }

    /// Look up a unit by its canonical string.
    pub fn from_str_exact(s: &str) -> Option<Self> {
        match s {
            "Hz/nsec" => Some(ChirpUnit::HzPerNs),
            "mHz/nsec" => Some(ChirpUnit::MilliHzPerNs),
            "uHz/nsec" => Some(ChirpUnit::MicroHzPerNs),
            "nHz/nsec" => Some(ChirpUnit::NanoHzPerNs),
            "GHz/sec" => Some(ChirpUnit::GHzPerSec),
            "MHz/sec" => Some(ChirpUnit::MHzPerSec),
            "KHz/sec" => Some(ChirpUnit::KHzPerSec),
            "Hz/sec" => Some(ChirpUnit::HzPerSec),
            "mHz/sec" => Some(ChirpUnit::MilliHzPerSec),
            _ => None,
        }
    }
}

impl fmt::Display for ChirpUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A piecewise-linear sweep of an element's intermediate frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct Chirp {
    pub rates: Vec<i64>,
    pub units: ChirpUnit,
}

/// A single demodulation callout inside a measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct DemodSpec {
    /// Name of the integration weights, as defined in the configuration.
    pub weights: String,
    /// Variable receiving the demodulated value.
    pub target: Id,
}

/// The declared type of a result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Int,
    Fixed,
    Bool,
    Adc,
}

impl StreamKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            StreamKind::Int => "int",
            StreamKind::Fixed => "fixed",
            StreamKind::Bool => "bool",
            StreamKind::Adc => "adc",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// One operator in a stream-processing pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOperator {
    /// Reshape the stream into fixed-size buffers, one dimension per entry.
    Buffer(Vec<u32>),
    /// Running average over the stream.
    Average,
    /// Software demodulation at the given frequency.
    Demod { frequency: f64 },
    /// Persist the latest value under the given tag.
    Save(String),
    /// Persist every value under the given tag.
    SaveAll(String),
}

/// Initial value attached to a variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialValue {
    Scalar(Literal),
    Array(Vec<Literal>),
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Variable(Id),
    ArrayCell { array: Id, index: Box<Expression> },
}

/// Plain assignment data, reused by `Assign` statements and `for` headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: AssignTarget,
    pub value: Expression,
}

/// A typed statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Declare {
        name: Id,
        kind: VariableKind,
        is_array: bool,
        init: Option<InitialValue>,
    },
    Assign(Assignment),
    Play {
        pulse: String,
        element: String,
        amplitude_scale: Option<Expression>,
        duration: Option<Expression>,
        condition: Option<Expression>,
        chirp: Option<Chirp>,
    },
    Measure {
        pulse: String,
        element: String,
        demods: Vec<DemodSpec>,
        adc_stream: Option<Id>,
    },
    Wait {
        duration: Expression,
        elements: Vec<String>,
    },
    Save {
        source: Expression,
        stream: Id,
    },
    StreamOp {
        stream: Id,
        pipeline: Vec<StreamOperator>,
    },
    If {
        condition: Expression,
        then_block: Block,
        elif_branches: Vec<(Expression, Block)>,
        else_block: Option<Block>,
    },
    For {
        init: Option<Assignment>,
        condition: Option<Expression>,
        update: Option<Assignment>,
        body: Block,
    },
    ForEach {
        bindings: Vec<(Id, Vec<Literal>)>,
        body: Block,
    },
    StrictTiming {
        body: Block,
    },
}

/// An ordered sequence of statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl From<Vec<Statement>> for Block {
    fn from(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}
