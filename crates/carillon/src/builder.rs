//! Scoped construction of program trees.
//!
//! [`ProgramBuilder`] owns the program under construction together with an
//! explicit stack of open blocks. Every leaf operation appends to the block
//! on top of the stack; control-flow operations push a new frame and
//! [`ProgramBuilder::close_scope`] pops it, appending the finished construct
//! to the parent block. Each build sequence owns its builder exclusively, so
//! independent builds never share state.

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;

use carillon_core::{
    expr::{Expression, Literal, VariableKind},
    identifier::Id,
    stmt::{
        AssignTarget, Assignment, Block, Chirp, DemodSpec, InitialValue, Statement, StreamKind,
        StreamOperator,
    },
    program::Program,
};
use carillon_parser::{is_reserved_word, is_valid_identifier};

/// Maximum control-flow nesting depth accepted by the builder and the
/// serializer. Deeper programs fail with a clear diagnostic instead of
/// exhausting the stack.
pub const MAX_NESTING_DEPTH: usize = 128;

/// A failure while constructing a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("variable `{0}` is already declared")]
    DuplicateDeclaration(String),

    #[error("stream `{0}` is already declared")]
    DuplicateStream(String),

    #[error("`{0}` is a reserved word and cannot be used as a name")]
    ReservedName(String),

    #[error("`{0}` is not a valid identifier")]
    InvalidName(String),

    #[error("elif opened without an open if at this depth")]
    ElifWithoutIf,

    #[error("else opened without an open if at this depth")]
    ElseWithoutIf,

    #[error("if chain already has an else branch")]
    DuplicateElse,

    #[error("no open scope to close")]
    NoOpenScope,

    #[error("{0} scope(s) still open")]
    UnclosedScope(usize),

    #[error("control flow nested deeper than {MAX_NESTING_DEPTH} levels")]
    NestingTooDeep,

    #[error("for_each needs at least one binding, all with iterables of equal length")]
    InvalidForEach,

    #[error("wait needs at least one element")]
    EmptyWait,
}

/// Optional modifiers of a `play` operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayOptions {
    pub amplitude_scale: Option<Expression>,
    pub duration: Option<Expression>,
    pub condition: Option<Expression>,
    pub chirp: Option<Chirp>,
}

/// An open control-flow scope awaiting its closing statement.
#[derive(Debug, Clone)]
enum Frame {
    If {
        condition: Expression,
    },
    Elif {
        condition: Expression,
    },
    Else,
    For {
        init: Option<Assignment>,
        condition: Option<Expression>,
        update: Option<Assignment>,
    },
    ForEach {
        bindings: Vec<(Id, Vec<Literal>)>,
    },
    StrictTiming,
}

/// Builder for program trees.
///
/// # Examples
///
/// ```
/// use carillon::builder::ProgramBuilder;
/// use carillon_core::expr::{BinaryOperator, Expression, VariableKind};
/// use carillon_core::stmt::{AssignTarget, Assignment};
///
/// let mut builder = ProgramBuilder::new();
/// builder.declare("x", VariableKind::Int).unwrap();
/// let x = || Expression::var("x", VariableKind::Int);
/// builder
///     .open_for(
///         Some(Assignment {
///             target: AssignTarget::Variable("x".into()),
///             value: Expression::int(0),
///         }),
///         Some(Expression::binary(BinaryOperator::Lt, x(), Expression::int(3))),
///         Some(Assignment {
///             target: AssignTarget::Variable("x".into()),
///             value: Expression::binary(BinaryOperator::Add, x(), Expression::int(1)),
///         }),
///     )
///     .unwrap();
/// builder.play("x90", "qubit", Default::default()).unwrap();
/// builder.close_scope().unwrap();
/// let program = builder.finish().unwrap();
/// assert_eq!(program.body.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    /// Block stack; index 0 is the program root.
    blocks: Vec<Block>,
    /// Open scopes, parallel to `blocks[1..]`.
    frames: Vec<Frame>,
    declared: HashSet<Id>,
    streams: IndexMap<Id, StreamKind>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::new()],
            frames: Vec::new(),
            declared: HashSet::new(),
            streams: IndexMap::new(),
        }
    }

    /// Number of currently open control-flow scopes.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn top(&mut self) -> &mut Block {
        self.blocks
            .last_mut()
            .unwrap_or_else(|| unreachable!("block stack always holds the root"))
    }

    fn checked_name(&self, name: &str) -> Result<Id, BuildError> {
        if is_reserved_word(name) {
            return Err(BuildError::ReservedName(name.to_string()));
        }
        if !is_valid_identifier(name) {
            return Err(BuildError::InvalidName(name.to_string()));
        }
        Ok(Id::new(name))
    }

    fn declare_name(&mut self, name: &str) -> Result<Id, BuildError> {
        let id = self.checked_name(name)?;
        if !self.declared.insert(id) {
            return Err(BuildError::DuplicateDeclaration(name.to_string()));
        }
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // Declarations
    // ---------------------------------------------------------------------

    /// Declare a scalar variable without an initial value.
    pub fn declare(&mut self, name: &str, kind: VariableKind) -> Result<&mut Self, BuildError> {
        let id = self.declare_name(name)?;
        self.top().push(Statement::Declare {
            name: id,
            kind,
            is_array: false,
            init: None,
        });
        Ok(self)
    }

    /// Declare a scalar variable with an initial value.
    pub fn declare_init(
        &mut self,
        name: &str,
        kind: VariableKind,
        value: Literal,
    ) -> Result<&mut Self, BuildError> {
        let id = self.declare_name(name)?;
        self.top().push(Statement::Declare {
            name: id,
            kind,
            is_array: false,
            init: Some(InitialValue::Scalar(value)),
        });
        Ok(self)
    }

    /// Declare an array variable initialized with the given values.
    pub fn declare_array(
        &mut self,
        name: &str,
        kind: VariableKind,
        values: Vec<Literal>,
    ) -> Result<&mut Self, BuildError> {
        let id = self.declare_name(name)?;
        self.top().push(Statement::Declare {
            name: id,
            kind,
            is_array: true,
            init: Some(InitialValue::Array(values)),
        });
        Ok(self)
    }

    /// Declare a result stream.
    pub fn declare_stream(
        &mut self,
        name: &str,
        kind: StreamKind,
    ) -> Result<&mut Self, BuildError> {
        let id = self.checked_name(name)?;
        if self.streams.contains_key(&id) {
            return Err(BuildError::DuplicateStream(name.to_string()));
        }
        self.streams.insert(id, kind);
        Ok(self)
    }

    // ---------------------------------------------------------------------
    // Leaf operations
    // ---------------------------------------------------------------------

    /// Assign an expression to a variable.
    pub fn assign(&mut self, name: &str, value: Expression) -> Result<&mut Self, BuildError> {
        let id = self.checked_name(name)?;
        self.top().push(Statement::Assign(Assignment {
            target: AssignTarget::Variable(id),
            value,
        }));
        Ok(self)
    }

    /// Assign an expression to one cell of an array variable.
    pub fn assign_index(
        &mut self,
        array: &str,
        index: Expression,
        value: Expression,
    ) -> Result<&mut Self, BuildError> {
        let id = self.checked_name(array)?;
        self.top().push(Statement::Assign(Assignment {
            target: AssignTarget::ArrayCell {
                array: id,
                index: Box::new(index),
            },
            value,
        }));
        Ok(self)
    }

    /// Play a pulse on an element, with optional modifiers.
    pub fn play(
        &mut self,
        pulse: &str,
        element: &str,
        options: PlayOptions,
    ) -> Result<&mut Self, BuildError> {
        self.top().push(Statement::Play {
            pulse: pulse.to_string(),
            element: element.to_string(),
            amplitude_scale: options.amplitude_scale,
            duration: options.duration,
            condition: options.condition,
            chirp: options.chirp,
        });
        Ok(self)
    }

    /// Measure a pulse on an element, demodulating into the given targets
    /// and optionally capturing the raw ADC trace into a stream.
    pub fn measure(
        &mut self,
        pulse: &str,
        element: &str,
        demods: Vec<DemodSpec>,
        adc_stream: Option<&str>,
    ) -> Result<&mut Self, BuildError> {
        let adc_stream = match adc_stream {
            Some(name) => Some(self.checked_name(name)?),
            None => None,
        };
        self.top().push(Statement::Measure {
            pulse: pulse.to_string(),
            element: element.to_string(),
            demods,
            adc_stream,
        });
        Ok(self)
    }

    /// Hold the listed elements idle for the given duration.
    pub fn wait(
        &mut self,
        duration: Expression,
        elements: &[&str],
    ) -> Result<&mut Self, BuildError> {
        if elements.is_empty() {
            return Err(BuildError::EmptyWait);
        }
        self.top().push(Statement::Wait {
            duration,
            elements: elements.iter().map(|e| e.to_string()).collect(),
        });
        Ok(self)
    }

    /// Save an expression's value to a declared stream.
    pub fn save(&mut self, source: Expression, stream: &str) -> Result<&mut Self, BuildError> {
        let id = self.checked_name(stream)?;
        self.top().push(Statement::Save { source, stream: id });
        Ok(self)
    }

    /// Attach a processing pipeline to a declared stream.
    pub fn stream_op(
        &mut self,
        stream: &str,
        pipeline: Vec<StreamOperator>,
    ) -> Result<&mut Self, BuildError> {
        let id = self.checked_name(stream)?;
        self.top().push(Statement::StreamOp {
            stream: id,
            pipeline,
        });
        Ok(self)
    }

    // ---------------------------------------------------------------------
    // Scopes
    // ---------------------------------------------------------------------

    fn push_frame(&mut self, frame: Frame) -> Result<&mut Self, BuildError> {
        if self.frames.len() >= MAX_NESTING_DEPTH {
            return Err(BuildError::NestingTooDeep);
        }
        self.frames.push(frame);
        self.blocks.push(Block::new());
        Ok(self)
    }

    /// True when the enclosing block ends with an if chain that can still
    /// accept an `elif` or `else` branch.
    fn chain_open(&mut self) -> bool {
        matches!(
            self.top().statements.last(),
            Some(Statement::If {
                else_block: None,
                ..
            })
        )
    }

    pub fn open_if(&mut self, condition: Expression) -> Result<&mut Self, BuildError> {
        self.push_frame(Frame::If { condition })
    }

    pub fn open_elif(&mut self, condition: Expression) -> Result<&mut Self, BuildError> {
        if !self.chain_open() {
            return Err(BuildError::ElifWithoutIf);
        }
        self.push_frame(Frame::Elif { condition })
    }

    pub fn open_else(&mut self) -> Result<&mut Self, BuildError> {
        match self.top().statements.last() {
            Some(Statement::If {
                else_block: None, ..
            }) => self.push_frame(Frame::Else),
            Some(Statement::If { .. }) => Err(BuildError::DuplicateElse),
            _ => Err(BuildError::ElseWithoutIf),
        }
    }

    pub fn open_for(
        &mut self,
        init: Option<Assignment>,
        condition: Option<Expression>,
        update: Option<Assignment>,
    ) -> Result<&mut Self, BuildError> {
        self.push_frame(Frame::For {
            init,
            condition,
            update,
        })
    }

    /// Open a loop iterating parallel bindings over equal-length literal
    /// iterables. Binding names are declarations and follow the same
    /// duplicate rules as `declare`.
    pub fn open_for_each(
        &mut self,
        bindings: Vec<(&str, Vec<Literal>)>,
    ) -> Result<&mut Self, BuildError> {
        let Some((_, first)) = bindings.first() else {
            return Err(BuildError::InvalidForEach);
        };
        if bindings.iter().any(|(_, values)| values.len() != first.len()) {
            return Err(BuildError::InvalidForEach);
        }
        let mut resolved = Vec::with_capacity(bindings.len());
        for (name, values) in bindings {
            resolved.push((self.declare_name(name)?, values));
        }
        self.push_frame(Frame::ForEach { bindings: resolved })
    }

    pub fn open_strict_timing(&mut self) -> Result<&mut Self, BuildError> {
        self.push_frame(Frame::StrictTiming)
    }

    /// Close the innermost open scope, appending the finished construct to
    /// its parent block.
    pub fn close_scope(&mut self) -> Result<&mut Self, BuildError> {
        let Some(frame) = self.frames.pop() else {
            return Err(BuildError::NoOpenScope);
        };
        let block = self
            .blocks
            .pop()
            .unwrap_or_else(|| unreachable!("one block per frame"));
        match frame {
            Frame::If { condition } => {
                self.top().push(Statement::If {
                    condition,
                    then_block: block,
                    elif_branches: Vec::new(),
                    else_block: None,
                });
            }
            Frame::Elif { condition } => {
                let Some(Statement::If { elif_branches, .. }) = self.top().statements.last_mut()
                else {
                    return Err(BuildError::ElifWithoutIf);
                };
                elif_branches.push((condition, block));
            }
            Frame::Else => {
                let Some(Statement::If { else_block, .. }) = self.top().statements.last_mut()
                else {
                    return Err(BuildError::ElseWithoutIf);
                };
                // An empty else is dropped; the canonical text never
                // renders one.
                if !block.is_empty() {
                    *else_block = Some(block);
                }
            }
            Frame::For {
                init,
                condition,
                update,
            } => {
                self.top().push(Statement::For {
                    init,
                    condition,
                    update,
                    body: block,
                });
            }
            Frame::ForEach { bindings } => {
                self.top().push(Statement::ForEach {
                    bindings,
                    body: block,
                });
            }
            Frame::StrictTiming => {
                self.top().push(Statement::StrictTiming { body: block });
            }
        }
        Ok(self)
    }

    /// Finish the build and return the program.
    ///
    /// Fails if any scope is still open.
    pub fn finish(mut self) -> Result<Program, BuildError> {
        if !self.frames.is_empty() {
            return Err(BuildError::UnclosedScope(self.frames.len()));
        }
        let body = self
            .blocks
            .pop()
            .unwrap_or_else(|| unreachable!("block stack always holds the root"));
        Ok(Program {
            body,
            streams: self.streams,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use carillon_core::expr::BinaryOperator;

    fn var(name: &str) -> Expression {
        Expression::var(name, VariableKind::Int)
    }

    #[test]
    fn test_empty_build() {
        let program = ProgramBuilder::new().finish().unwrap();
        assert!(program.body.is_empty());
        assert!(program.streams.is_empty());
    }

    #[test]
    fn test_leaf_statements_append_in_order() {
        let mut builder = ProgramBuilder::new();
        builder.declare("x", VariableKind::Int).unwrap();
        builder.assign("x", Expression::int(1)).unwrap();
        builder.wait(var("x"), &["qubit"]).unwrap();
        let program = builder.finish().unwrap();
        assert!(matches!(program.body.statements[0], Statement::Declare { .. }));
        assert!(matches!(program.body.statements[1], Statement::Assign(_)));
        assert!(matches!(program.body.statements[2], Statement::Wait { .. }));
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut builder = ProgramBuilder::new();
        builder.declare("x", VariableKind::Int).unwrap();
        assert_eq!(
            builder.declare("x", VariableKind::Fixed).unwrap_err(),
            BuildError::DuplicateDeclaration("x".to_string())
        );
    }

    #[test]
    fn test_duplicate_across_scopes_rejected() {
        let mut builder = ProgramBuilder::new();
        builder.declare("x", VariableKind::Int).unwrap();
        builder.open_if(Expression::bool(true)).unwrap();
        assert_eq!(
            builder.declare("x", VariableKind::Int).unwrap_err(),
            BuildError::DuplicateDeclaration("x".to_string())
        );
    }

    #[test]
    fn test_reserved_and_invalid_names_rejected() {
        let mut builder = ProgramBuilder::new();
        assert_eq!(
            builder.declare("wait", VariableKind::Int).unwrap_err(),
            BuildError::ReservedName("wait".to_string())
        );
        assert_eq!(
            builder.declare("1st", VariableKind::Int).unwrap_err(),
            BuildError::InvalidName("1st".to_string())
        );
    }

    #[test]
    fn test_duplicate_stream_rejected() {
        let mut builder = ProgramBuilder::new();
        builder.declare_stream("s", StreamKind::Int).unwrap();
        assert_eq!(
            builder.declare_stream("s", StreamKind::Fixed).unwrap_err(),
            BuildError::DuplicateStream("s".to_string())
        );
    }

    #[test]
    fn test_nested_scopes_close_in_order() {
        let mut builder = ProgramBuilder::new();
        builder.declare("x", VariableKind::Int).unwrap();
        builder.open_if(var("x")).unwrap();
        builder.open_strict_timing().unwrap();
        assert_eq!(builder.depth(), 2);
        builder.play("p", "e", PlayOptions::default()).unwrap();
        builder.close_scope().unwrap();
        builder.close_scope().unwrap();
        assert_eq!(builder.depth(), 0);

        let program = builder.finish().unwrap();
        let Statement::If { then_block, .. } = &program.body.statements[1] else {
            panic!("expected if");
        };
        let Statement::StrictTiming { body } = &then_block.statements[0] else {
            panic!("expected strict_timing");
        };
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_close_without_open_fails() {
        let mut builder = ProgramBuilder::new();
        assert_eq!(builder.close_scope().unwrap_err(), BuildError::NoOpenScope);
    }

    #[test]
    fn test_finish_with_open_scope_fails() {
        let mut builder = ProgramBuilder::new();
        builder.open_strict_timing().unwrap();
        assert_eq!(
            builder.finish().unwrap_err(),
            BuildError::UnclosedScope(1)
        );
    }

    #[test]
    fn test_elif_and_else_extend_the_chain() {
        let mut builder = ProgramBuilder::new();
        builder.declare("x", VariableKind::Int).unwrap();
        builder.open_if(var("x")).unwrap();
        builder.play("a", "e", PlayOptions::default()).unwrap();
        builder.close_scope().unwrap();
        builder.open_elif(var("x")).unwrap();
        builder.play("b", "e", PlayOptions::default()).unwrap();
        builder.close_scope().unwrap();
        builder.open_else().unwrap();
        builder.play("c", "e", PlayOptions::default()).unwrap();
        builder.close_scope().unwrap();

        let program = builder.finish().unwrap();
        assert_eq!(program.body.len(), 2);
        let Statement::If {
            elif_branches,
            else_block,
            ..
        } = &program.body.statements[1]
        else {
            panic!("expected a single if chain");
        };
        assert_eq!(elif_branches.len(), 1);
        assert!(else_block.is_some());
    }

    #[test]
    fn test_elif_without_if_fails() {
        let mut builder = ProgramBuilder::new();
        assert_eq!(
            builder.open_elif(Expression::bool(true)).unwrap_err(),
            BuildError::ElifWithoutIf
        );
    }

    #[test]
    fn test_else_without_if_fails() {
        let mut builder = ProgramBuilder::new();
        builder.declare("x", VariableKind::Int).unwrap();
        assert_eq!(builder.open_else().unwrap_err(), BuildError::ElseWithoutIf);
    }

    #[test]
    fn test_duplicate_else_fails() {
        let mut builder = ProgramBuilder::new();
        builder.open_if(Expression::bool(true)).unwrap();
        builder.play("a", "e", PlayOptions::default()).unwrap();
        builder.close_scope().unwrap();
        builder.open_else().unwrap();
        builder.play("b", "e", PlayOptions::default()).unwrap();
        builder.close_scope().unwrap();
        assert_eq!(builder.open_else().unwrap_err(), BuildError::DuplicateElse);
    }

    #[test]
    fn test_empty_else_is_dropped() {
        let mut builder = ProgramBuilder::new();
        builder.open_if(Expression::bool(true)).unwrap();
        builder.close_scope().unwrap();
        builder.open_else().unwrap();
        builder.close_scope().unwrap();
        let program = builder.finish().unwrap();
        let Statement::If { else_block, .. } = &program.body.statements[0] else {
            panic!("expected if");
        };
        assert!(else_block.is_none());
    }

    #[test]
    fn test_for_each_registers_bindings_as_declarations() {
        let mut builder = ProgramBuilder::new();
        builder
            .open_for_each(vec![("f", vec![Literal::Float(0.5), Literal::Float(0.25)])])
            .unwrap();
        builder.close_scope().unwrap();
        assert_eq!(
            builder.declare("f", VariableKind::Fixed).unwrap_err(),
            BuildError::DuplicateDeclaration("f".to_string())
        );
    }

    #[test]
    fn test_for_each_length_mismatch_fails() {
        let mut builder = ProgramBuilder::new();
        assert_eq!(
            builder
                .open_for_each(vec![
                    ("a", vec![Literal::Int(1), Literal::Int(2)]),
                    ("b", vec![Literal::Int(3)]),
                ])
                .unwrap_err(),
            BuildError::InvalidForEach
        );
    }

    #[test]
    fn test_for_each_no_bindings_fails() {
        let mut builder = ProgramBuilder::new();
        assert_eq!(
            builder.open_for_each(vec![]).unwrap_err(),
            BuildError::InvalidForEach
        );
    }

    #[test]
    fn test_empty_wait_fails() {
        let mut builder = ProgramBuilder::new();
        assert_eq!(
            builder.wait(Expression::int(4), &[]).unwrap_err(),
            BuildError::EmptyWait
        );
    }

    #[test]
    fn test_nesting_limit() {
        let mut builder = ProgramBuilder::new();
        for _ in 0..MAX_NESTING_DEPTH {
            builder.open_strict_timing().unwrap();
        }
        assert_eq!(
            builder.open_strict_timing().unwrap_err(),
            BuildError::NestingTooDeep
        );
    }

    #[test]
    fn test_concrete_for_loop_scenario() {
        let mut builder = ProgramBuilder::new();
        builder.declare("x", VariableKind::Int).unwrap();
        builder
            .open_for(
                Some(Assignment {
                    target: AssignTarget::Variable(Id::new("x")),
                    value: Expression::int(0),
                }),
                Some(Expression::binary(
                    BinaryOperator::Lt,
                    var("x"),
                    Expression::int(3),
                )),
                Some(Assignment {
                    target: AssignTarget::Variable(Id::new("x")),
                    value: Expression::binary(BinaryOperator::Add, var("x"), Expression::int(1)),
                }),
            )
            .unwrap();
        builder.play("p1", "e1", PlayOptions::default()).unwrap();
        builder.close_scope().unwrap();
        let program = builder.finish().unwrap();

        assert_eq!(program.body.len(), 2);
        let Statement::For { body, .. } = &program.body.statements[1] else {
            panic!("expected for");
        };
        assert_eq!(body.len(), 1);
        assert!(matches!(body.statements[0], Statement::Play { .. }));
    }
}
