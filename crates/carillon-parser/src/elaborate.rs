//! Elaboration: parse tree to semantic program.
//!
//! The parser cannot know variable kinds at the point of use; this pass
//! builds a scoped symbol table from declarations, resolves every variable
//! reference to its declared kind, checks stream references against the
//! stream table, and converts the spanned parse tree into a
//! `carillon_core::Program`.
//!
//! All reference errors are collected rather than failing fast, so a script
//! with several bad names reports all of them in one pass.

use std::collections::HashMap;

use indexmap::IndexMap;

use carillon_core::{
    expr::{Expression, Literal, VariableKind},
    identifier::Id,
    program::Program,
    stmt::{AssignTarget, Assignment, Block, DemodSpec, InitialValue, Statement, StreamKind},
};

use crate::{
    error::{Diagnostic, DiagnosticCollector, ErrorCode, ParseError},
    parser_types as types,
    span::{Span, Spanned},
};

/// What the symbol table knows about a declared variable.
#[derive(Debug, Clone, Copy)]
struct VarInfo {
    kind: VariableKind,
    is_array: bool,
}

/// Elaboration state: scope stack, stream table, collected diagnostics.
struct Elaborator {
    /// Innermost scope last. Lookups walk from the top down.
    scopes: Vec<HashMap<Id, VarInfo>>,
    /// Every name ever declared, for the program-wide duplicate check.
    declared: HashMap<Id, Span>,
    streams: IndexMap<Id, StreamKind>,
    stream_spans: HashMap<Id, Span>,
    diagnostics: DiagnosticCollector,
}

impl Elaborator {
    fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            declared: HashMap::new(),
            streams: IndexMap::new(),
            stream_spans: HashMap::new(),
            diagnostics: DiagnosticCollector::new(),
        }
    }

    fn declare_variable(&mut self, name: &Spanned<Id>, info: VarInfo) {
        if let Some(first) = self.declared.get(name.inner()) {
            self.diagnostics.emit(
                Diagnostic::error(format!(
                    "variable `{}` is declared multiple times",
                    name.inner()
                ))
                .with_code(ErrorCode::E201)
                .with_label(name.span(), "duplicate declaration")
                .with_secondary_label(*first, "first declared here")
                .with_help("variable names are unique across the whole program"),
            );
            return;
        }
        self.declared.insert(*name.inner(), name.span());
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(*name.inner(), info);
        }
    }

    fn declare_stream(&mut self, name: &Spanned<Id>, kind: StreamKind) {
        if let Some(first) = self.stream_spans.get(name.inner()) {
            self.diagnostics.emit(
                Diagnostic::error(format!(
                    "stream `{}` is declared multiple times",
                    name.inner()
                ))
                .with_code(ErrorCode::E203)
                .with_label(name.span(), "duplicate declaration")
                .with_secondary_label(*first, "first declared here"),
            );
            return;
        }
        self.stream_spans.insert(*name.inner(), name.span());
        self.streams.insert(*name.inner(), kind);
    }

    fn lookup(&self, name: Id) -> Option<VarInfo> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name).copied())
    }

    /// Resolve a variable use as a scalar; emits E200/E205 on failure and
    /// falls back to `Int` so elaboration can continue.
    fn resolve_scalar(&mut self, name: &Spanned<Id>) -> VariableKind {
        match self.lookup(*name.inner()) {
            Some(info) if !info.is_array => info.kind,
            Some(_) => {
                self.diagnostics.emit(
                    Diagnostic::error(format!("array `{}` used as a scalar", name.inner()))
                        .with_code(ErrorCode::E205)
                        .with_label(name.span(), "array variable")
                        .with_help("index into the array, e.g. `name[0]`"),
                );
                VariableKind::Int
            }
            None => {
                self.emit_undefined_variable(name);
                VariableKind::Int
            }
        }
    }

    /// Resolve an indexed use; the name must be a declared array.
    fn resolve_array(&mut self, name: &Spanned<Id>) {
        match self.lookup(*name.inner()) {
            Some(info) if info.is_array => {}
            Some(_) => {
                self.diagnostics.emit(
                    Diagnostic::error(format!("scalar `{}` cannot be indexed", name.inner()))
                        .with_code(ErrorCode::E205)
                        .with_label(name.span(), "scalar variable"),
                );
            }
            None => self.emit_undefined_variable(name),
        }
    }

    fn emit_undefined_variable(&mut self, name: &Spanned<Id>) {
        self.diagnostics.emit(
            Diagnostic::error(format!("undefined variable `{}`", name.inner()))
                .with_code(ErrorCode::E200)
                .with_label(name.span(), "not declared in any enclosing scope")
                .with_help("declare it first: `declare int name;`"),
        );
    }

    fn check_stream(&mut self, name: &Spanned<Id>) {
        if !self.streams.contains_key(name.inner()) {
            self.diagnostics.emit(
                Diagnostic::error(format!("undefined stream `{}`", name.inner()))
                    .with_code(ErrorCode::E202)
                    .with_label(name.span(), "not declared")
                    .with_help("declare it first: `stream name: int;`"),
            );
        }
    }

    fn expression(&mut self, expr: &types::Expr) -> Expression {
        match expr {
            types::Expr::Literal(lit) => Expression::Literal(*lit),
            types::Expr::Variable(name) => {
                let kind = self.resolve_scalar(name);
                Expression::Variable {
                    name: *name.inner(),
                    kind,
                }
            }
            types::Expr::ArrayAccess { array, index } => {
                self.resolve_array(array);
                let index = self.expression(index);
                Expression::ArrayAccess {
                    array: *array.inner(),
                    index: Box::new(index),
                }
            }
            types::Expr::Binary { op, left, right } => Expression::Binary {
                op: *op,
                left: Box::new(self.expression(left)),
                right: Box::new(self.expression(right)),
            },
            types::Expr::Unary { op, operand } => Expression::Unary {
                op: *op,
                operand: Box::new(self.expression(operand)),
            },
            types::Expr::LibraryCall { function, args } => Expression::LibraryCall {
                function: *function,
                args: args.iter().map(|arg| self.expression(arg)).collect(),
            },
        }
    }

    fn assignment(&mut self, assign: &types::Assign) -> Assignment {
        let target = match &assign.target {
            types::Target::Variable(name) => {
                self.resolve_scalar(name);
                AssignTarget::Variable(*name.inner())
            }
            types::Target::ArrayCell { array, index } => {
                self.resolve_array(array);
                AssignTarget::ArrayCell {
                    array: *array.inner(),
                    index: Box::new(self.expression(index)),
                }
            }
        };
        Assignment {
            target,
            value: self.expression(&assign.value),
        }
    }

    /// Elaborate a nested block in a fresh scope.
    fn block(&mut self, stmts: &[types::Stmt]) -> Block {
        self.scopes.push(HashMap::new());
        let block = self.block_in_current_scope(stmts);
        self.scopes.pop();
        block
    }

    fn block_in_current_scope(&mut self, stmts: &[types::Stmt]) -> Block {
        let mut statements = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            if let Some(statement) = self.statement(stmt) {
                statements.push(statement);
            }
        }
        Block { statements }
    }

    fn statement(&mut self, stmt: &types::Stmt) -> Option<Statement> {
        match stmt {
            types::Stmt::Declare {
                name,
                kind,
                is_array,
                init,
            } => {
                self.declare_variable(name, VarInfo {
                    kind: *kind,
                    is_array: *is_array,
                });
                let init = init.as_ref().map(|init| match init {
                    types::Init::Scalar(lit) => InitialValue::Scalar(*lit),
                    types::Init::Array(lits) => InitialValue::Array(lits.clone()),
                });
                Some(Statement::Declare {
                    name: *name.inner(),
                    kind: *kind,
                    is_array: *is_array,
                    init,
                })
            }
            types::Stmt::StreamDecl { name, kind } => {
                self.declare_stream(name, *kind);
                None
            }
            types::Stmt::Assign(assign) => Some(Statement::Assign(self.assignment(assign))),
            types::Stmt::Play {
                pulse,
                element,
                amplitude_scale,
                duration,
                condition,
                chirp,
            } => Some(Statement::Play {
                pulse: pulse.clone(),
                element: element.clone(),
                amplitude_scale: amplitude_scale.as_ref().map(|e| self.expression(e)),
                duration: duration.as_ref().map(|e| self.expression(e)),
                condition: condition.as_ref().map(|e| self.expression(e)),
                chirp: chirp.clone(),
            }),
            types::Stmt::Measure {
                pulse,
                element,
                demods,
                adc_stream,
            } => {
                let demods = demods
                    .iter()
                    .map(|demod| {
                        self.resolve_scalar(&demod.target);
                        DemodSpec {
                            weights: demod.weights.clone(),
                            target: *demod.target.inner(),
                        }
                    })
                    .collect();
                if let Some(stream) = adc_stream {
                    self.check_stream(stream);
                }
                Some(Statement::Measure {
                    pulse: pulse.clone(),
                    element: element.clone(),
                    demods,
                    adc_stream: adc_stream.as_ref().map(|s| *s.inner()),
                })
            }
            types::Stmt::Wait { duration, elements } => Some(Statement::Wait {
                duration: self.expression(duration),
                elements: elements.clone(),
            }),
            types::Stmt::Save { source, stream } => {
                self.check_stream(stream);
                Some(Statement::Save {
                    source: self.expression(source),
                    stream: *stream.inner(),
                })
            }
            types::Stmt::StreamOp { stream, pipeline } => {
                self.check_stream(stream);
                Some(Statement::StreamOp {
                    stream: *stream.inner(),
                    pipeline: pipeline.clone(),
                })
            }
            types::Stmt::If {
                condition,
                then_block,
                elif_branches,
                else_block,
            } => {
                let condition = self.expression(condition);
                let then_block = self.block(then_block);
                let elif_branches = elif_branches
                    .iter()
                    .map(|(cond, body)| (self.expression(cond), self.block(body)))
                    .collect();
                // The canonical text has no empty `else`; one written as
                // `else { pass; }` normalizes to no else branch at all.
                let else_block = else_block
                    .as_ref()
                    .map(|body| self.block(body))
                    .filter(|block| !block.is_empty());
                Some(Statement::If {
                    condition,
                    then_block,
                    elif_branches,
                    else_block,
                })
            }
            types::Stmt::For {
                init,
                condition,
                update,
                body,
            } => {
                let init = init.as_ref().map(|a| self.assignment(a));
                let condition = condition.as_ref().map(|e| self.expression(e));
                let update = update.as_ref().map(|a| self.assignment(a));
                let body = self.block(body);
                Some(Statement::For {
                    init,
                    condition,
                    update,
                    body,
                })
            }
            types::Stmt::ForEach { bindings, body } => {
                self.scopes.push(HashMap::new());

                let expected_len = bindings.first().map(|(_, values)| values.len());
                let mut elaborated = Vec::with_capacity(bindings.len());
                for (name, values) in bindings {
                    if let Some(expected) = expected_len {
                        if values.len() != expected {
                            self.diagnostics.emit(
                                Diagnostic::error(format!(
                                    "iterable for `{}` has {} values, expected {}",
                                    name.inner(),
                                    values.len(),
                                    expected
                                ))
                                .with_code(ErrorCode::E204)
                                .with_label(name.span(), "mismatched iterable length")
                                .with_help("parallel iterables must have equal lengths"),
                            );
                        }
                    }
                    let kind = values
                        .first()
                        .map(Literal::kind)
                        .unwrap_or(VariableKind::Int);
                    self.declare_variable(name, VarInfo {
                        kind,
                        is_array: false,
                    });
                    elaborated.push((*name.inner(), values.clone()));
                }

                let body = self.block_in_current_scope(body);
                self.scopes.pop();

                Some(Statement::ForEach {
                    bindings: elaborated,
                    body,
                })
            }
            types::Stmt::StrictTiming { body } => Some(Statement::StrictTiming {
                body: self.block(body),
            }),
        }
    }
}

/// Elaborate a parsed script into a semantic [`Program`].
pub(crate) fn elaborate(script: &types::Script) -> Result<Program, ParseError> {
    let mut elaborator = Elaborator::new();
    let body = elaborator.block_in_current_scope(&script.body);

    let Elaborator {
        streams,
        diagnostics,
        ..
    } = elaborator;
    diagnostics.finish()?;

    Ok(Program { body, streams })
}
