//! Parse-tree types produced by the [`parser`](super::parser).
//!
//! These mirror the semantic model in `carillon_core` but keep source spans
//! on every name so elaboration can attach precise labels to diagnostics.
//! Variable kinds are unknown at parse time; [`elaborate`](super::elaborate)
//! resolves them and converts the tree into a `carillon_core::Program`.

use carillon_core::{
    expr::{BinaryOperator, Literal, LibraryFunction, UnaryOperator, VariableKind},
    identifier::Id,
    stmt::{Chirp, StreamKind, StreamOperator},
};

use crate::span::Spanned;

/// An expression as parsed, with spanned variable references.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Literal),
    Variable(Spanned<Id>),
    ArrayAccess {
        array: Spanned<Id>,
        index: Box<Expr>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    LibraryCall {
        function: LibraryFunction,
        args: Vec<Expr>,
    },
}

/// Left-hand side of an assignment as parsed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    Variable(Spanned<Id>),
    ArrayCell { array: Spanned<Id>, index: Box<Expr> },
}

/// Plain assignment data, shared by assign statements and `for` headers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assign {
    pub target: Target,
    pub value: Expr,
}

/// Initial value on a declaration as parsed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Init {
    Scalar(Literal),
    Array(Vec<Literal>),
}

/// A demodulation callout inside a `measure`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Demod {
    pub weights: String,
    pub target: Spanned<Id>,
}

/// A statement as parsed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Declare {
        name: Spanned<Id>,
        kind: VariableKind,
        is_array: bool,
        init: Option<Init>,
    },
    StreamDecl {
        name: Spanned<Id>,
        kind: StreamKind,
    },
    Assign(Assign),
    Play {
        pulse: String,
        element: String,
        amplitude_scale: Option<Expr>,
        duration: Option<Expr>,
        condition: Option<Expr>,
        chirp: Option<Chirp>,
    },
    Measure {
        pulse: String,
        element: String,
        demods: Vec<Demod>,
        adc_stream: Option<Spanned<Id>>,
    },
    Wait {
        duration: Expr,
        elements: Vec<String>,
    },
    Save {
        source: Expr,
        stream: Spanned<Id>,
    },
    StreamOp {
        stream: Spanned<Id>,
        pipeline: Vec<StreamOperator>,
    },
    If {
        condition: Expr,
        then_block: Vec<Stmt>,
        elif_branches: Vec<(Expr, Vec<Stmt>)>,
        else_block: Option<Vec<Stmt>>,
    },
    For {
        init: Option<Assign>,
        condition: Option<Expr>,
        update: Option<Assign>,
        body: Vec<Stmt>,
    },
    ForEach {
        bindings: Vec<(Spanned<Id>, Vec<Literal>)>,
        body: Vec<Stmt>,
    },
    StrictTiming {
        body: Vec<Stmt>,
    },
}

/// A whole parsed script: the body of the `program { … }` block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Script {
    pub body: Vec<Stmt>,
}
