//! Typed expression nodes for the program model.
//!
//! [`Expression`] is a closed set of variants; the serializer and validators
//! match exhaustively over it, so adding a variant is a compile-time-checked,
//! single-point change.

use std::fmt;

use crate::identifier::Id;

/// A literal scalar value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    /// The variable kind this literal is compatible with.
    pub fn kind(&self) -> VariableKind {
        match self {
            Literal::Int(_) => VariableKind::Int,
            Literal::Float(_) => VariableKind::Fixed,
            Literal::Bool(_) => VariableKind::Bool,
        }
    }
}

/// The declared type of a program variable.
///
/// `Fixed` is the fixed-point real type of the target controller; its
/// literals are written as floats in the canonical text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Int,
    Fixed,
    Bool,
}

impl VariableKind {
    /// Keyword used in the canonical text.
    pub fn keyword(&self) -> &'static str {
        match self {
            VariableKind::Int => "int",
            VariableKind::Fixed => "fixed",
            VariableKind::Bool => "bool",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// Binary operators, in the operator set of the target controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOperator {
    /// Symbol used in the canonical text.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::And => "&",
            BinaryOperator::Or => "|",
            BinaryOperator::Xor => "^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::Eq => "==",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
        }
    }

    /// Binding strength for parenthesization; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::Xor => 2,
            BinaryOperator::And => 3,
            BinaryOperator::Eq => 4,
            BinaryOperator::Lt | BinaryOperator::Le | BinaryOperator::Gt | BinaryOperator::Ge => 5,
            BinaryOperator::Shl | BinaryOperator::Shr => 6,
            BinaryOperator::Add | BinaryOperator::Sub => 7,
            BinaryOperator::Mul | BinaryOperator::Div => 8,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Neg,
    Not,
}

impl UnaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperator::Neg => "-",
            UnaryOperator::Not => "!",
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// The closed set of library functions callable from expressions,
/// written `math.<name>(…)` in the canonical text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryFunction {
    Abs,
    Sin,
    Cos,
    Exp,
    Ln,
    Sqrt,
    Pow,
}

impl LibraryFunction {
    /// Name used in the canonical text after the `math.` prefix.
    pub fn name(&self) -> &'static str {
        match self {
            LibraryFunction::Abs => "abs",
            LibraryFunction::Sin => "sin",
            LibraryFunction::Cos => "cos",
            LibraryFunction::Exp => "exp",
            LibraryFunction::Ln => "ln",
            LibraryFunction::Sqrt => "sqrt",
            LibraryFunction::Pow => "pow",
        }
    }

    /// Look up a function by its canonical-text name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(LibraryFunction::Abs),
            "sin" => Some(LibraryFunction::Sin),
            "cos" => Some(LibraryFunction::Cos),
            "exp" => Some(LibraryFunction::Exp),
            "ln" => Some(LibraryFunction::Ln),
            "sqrt" => Some(LibraryFunction::Sqrt),
            "pow" => Some(LibraryFunction::Pow),
            _ => None,
        }
    }
}

impl fmt::Display for LibraryFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "math.{}", self.name())
    }
}

/// A typed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Variable { name: Id, kind: VariableKind },
    ArrayAccess { array: Id, index: Box<Expression> },
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    LibraryCall {
        function: LibraryFunction,
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn int(value: i64) -> Self {
        Expression::Literal(Literal::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Expression::Literal(Literal::Float(value))
    }

    pub fn bool(value: bool) -> Self {
        Expression::Literal(Literal::Bool(value))
    }

    pub fn var(name: impl Into<Id>, kind: VariableKind) -> Self {
        Expression::Variable {
            name: name.into(),
            kind,
        }
    }

    pub fn index(array: impl Into<Id>, index: Expression) -> Self {
        Expression::ArrayAccess {
            array: array.into(),
            index: Box::new(index),
        }
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Negation. Applied to a numeric literal this folds into a negative
    /// literal, matching the fold the parser performs on `-5`, so that
    /// round trips stay structurally equal.
    pub fn neg(operand: Expression) -> Self {
        match operand {
            Expression::Literal(Literal::Int(v)) => Expression::int(-v),
            Expression::Literal(Literal::Float(v)) => Expression::float(-v),
            other => Expression::Unary {
                op: UnaryOperator::Neg,
                operand: Box::new(other),
            },
        }
    }

    pub fn not(operand: Expression) -> Self {
        Expression::Unary {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        }
    }

    pub fn call(function: LibraryFunction, args: Vec<Expression>) -> Self {
        Expression::LibraryCall { function, args }
    }
}
