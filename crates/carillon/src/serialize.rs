//! Rendering of program trees to the canonical text.
//!
//! [`serialize`] is a pure recursive descent over the block tree: one
//! renderer per statement variant, 4-space indentation per nested block.
//! Rendering never emits partial output; any failure aborts the call. The
//! output re-parses to a program structurally equal to the input.

use std::collections::HashSet;

use thiserror::Error;

use carillon_core::{
    chunk::split_into_chunks,
    expr::{Expression, Literal},
    identifier::Id,
    stmt::{AssignTarget, Assignment, Block, Statement, StreamOperator},
    program::Program,
};

use crate::builder::MAX_NESTING_DEPTH;

/// A failure while rendering a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    #[error("variable `{0}` is not declared in any enclosing scope")]
    UnresolvedVariable(String),

    #[error("stream `{0}` is not declared")]
    UnresolvedStream(String),

    #[error("float literal `{0}` has no textual form")]
    NonFiniteLiteral(String),

    #[error("control flow nested deeper than {MAX_NESTING_DEPTH} levels")]
    NestingTooDeep,
}

/// Render a program to its canonical text.
pub fn serialize(program: &Program) -> Result<String, SerializeError> {
    let mut serializer = Serializer {
        program,
        out: String::new(),
        indent: 1,
        scopes: vec![HashSet::new()],
    };
    serializer.out.push_str("program {\n");
    for (name, kind) in &program.streams {
        serializer.line(&format!("stream {}: {kind};", name.resolve()));
    }
    serializer.block_body(&program.body)?;
    serializer.out.push_str("}\n");
    Ok(serializer.out)
}

/// Floats render with Rust's shortest decimal form, except that integral
/// values force a `.0` so the text re-parses as a float literal.
fn float_text(value: f64) -> Result<String, SerializeError> {
    if !value.is_finite() {
        return Err(SerializeError::NonFiniteLiteral(value.to_string()));
    }
    if value.fract() == 0.0 {
        Ok(format!("{value:.1}"))
    } else {
        Ok(format!("{value}"))
    }
}

fn literal_text(literal: &Literal) -> Result<String, SerializeError> {
    match literal {
        Literal::Int(v) => Ok(v.to_string()),
        Literal::Float(v) => float_text(*v),
        Literal::Bool(v) => Ok(v.to_string()),
    }
}

/// Render a literal sequence using the run-length shorthand: maximal runs of
/// two or more equal values become `[value] * count`, everything else renders
/// plainly, segments joined with ` + `. Expanding the shorthand reproduces
/// the sequence exactly.
fn array_text<T, F>(values: &[T], render: F) -> Result<String, SerializeError>
where
    T: PartialEq + Clone,
    F: Fn(&T) -> Result<String, SerializeError>,
{
    let mut segments = Vec::new();
    for chunk in split_into_chunks(values) {
        if chunk.is_empty() {
            continue;
        }
        if chunk.is_uniform() {
            segments.push(format!("[{}] * {}", render(chunk.first())?, chunk.len()));
        } else {
            let items = chunk
                .values()
                .iter()
                .map(&render)
                .collect::<Result<Vec<_>, _>>()?;
            segments.push(format!("[{}]", items.join(", ")));
        }
    }
    if segments.is_empty() {
        Ok("[]".to_string())
    } else {
        Ok(segments.join(" + "))
    }
}

struct Serializer<'p> {
    program: &'p Program,
    out: String,
    indent: usize,
    /// One set of declared names per enclosing block.
    scopes: Vec<HashSet<Id>>,
}

impl Serializer<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn resolve_variable(&self, name: Id) -> Result<(), SerializeError> {
        if self.scopes.iter().any(|scope| scope.contains(&name)) {
            Ok(())
        } else {
            Err(SerializeError::UnresolvedVariable(name.resolve()))
        }
    }

    fn resolve_stream(&self, name: Id) -> Result<(), SerializeError> {
        if self.program.streams.contains_key(&name) {
            Ok(())
        } else {
            Err(SerializeError::UnresolvedStream(name.resolve()))
        }
    }

    fn declare_name(&mut self, name: Id) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name);
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn expression(&self, expr: &Expression) -> Result<String, SerializeError> {
        match expr {
            Expression::Literal(literal) => literal_text(literal),
            Expression::Variable { name, .. } => {
                self.resolve_variable(*name)?;
                Ok(name.resolve())
            }
            Expression::ArrayAccess { array, index } => {
                self.resolve_variable(*array)?;
                Ok(format!("{}[{}]", array.resolve(), self.expression(index)?))
            }
            Expression::Binary { op, left, right } => {
                let left = self.operand(left, op.precedence(), false)?;
                let right = self.operand(right, op.precedence(), true)?;
                Ok(format!("{left} {op} {right}"))
            }
            Expression::Unary { op, operand } => {
                let rendered = self.expression(operand)?;
                if matches!(operand.as_ref(), Expression::Binary { .. }) {
                    Ok(format!("{op}({rendered})"))
                } else {
                    Ok(format!("{op}{rendered}"))
                }
            }
            Expression::LibraryCall { function, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.expression(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{function}({})", args.join(", ")))
            }
        }
    }

    /// Render one side of a binary operator, parenthesized when the child
    /// binds looser than the parent, or equally on the right-hand side
    /// (operators are left-associative).
    fn operand(
        &self,
        expr: &Expression,
        parent_precedence: u8,
        is_right: bool,
    ) -> Result<String, SerializeError> {
        let rendered = self.expression(expr)?;
        let needs_parens = match expr {
            Expression::Binary { op, .. } => {
                let precedence = op.precedence();
                precedence < parent_precedence || (precedence == parent_precedence && is_right)
            }
            _ => false,
        };
        if needs_parens {
            Ok(format!("({rendered})"))
        } else {
            Ok(rendered)
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn assignment_text(&self, assignment: &Assignment) -> Result<String, SerializeError> {
        let target = match &assignment.target {
            AssignTarget::Variable(name) => {
                self.resolve_variable(*name)?;
                name.resolve()
            }
            AssignTarget::ArrayCell { array, index } => {
                self.resolve_variable(*array)?;
                format!("{}[{}]", array.resolve(), self.expression(index)?)
            }
        };
        Ok(format!("{target} = {}", self.expression(&assignment.value)?))
    }

    /// Render a nested block between braces, emitting `pass;` when the body
    /// is empty so the construct stays re-parseable as written.
    fn nested_block(&mut self, header: &str, block: &Block) -> Result<(), SerializeError> {
        if self.scopes.len() > MAX_NESTING_DEPTH {
            return Err(SerializeError::NestingTooDeep);
        }
        self.line(&format!("{header} {{"));
        self.indent += 1;
        self.scopes.push(HashSet::new());
        if block.is_empty() {
            self.line("pass;");
        } else {
            self.block_body(block)?;
        }
        self.scopes.pop();
        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    fn block_body(&mut self, block: &Block) -> Result<(), SerializeError> {
        for statement in &block.statements {
            self.statement(statement)?;
        }
        Ok(())
    }

    fn statement(&mut self, statement: &Statement) -> Result<(), SerializeError> {
        match statement {
            Statement::Declare {
                name,
                kind,
                is_array,
                init,
            } => {
                let suffix = if *is_array { "[]" } else { "" };
                let init = match init {
                    None => String::new(),
                    Some(carillon_core::stmt::InitialValue::Scalar(literal)) => {
                        format!(" = {}", literal_text(literal)?)
                    }
                    Some(carillon_core::stmt::InitialValue::Array(values)) => {
                        format!(" = {}", array_text(values, literal_text)?)
                    }
                };
                self.line(&format!("declare {kind}{suffix} {}{init};", name.resolve()));
                self.declare_name(*name);
            }
            Statement::Assign(assignment) => {
                let text = self.assignment_text(assignment)?;
                self.line(&format!("{text};"));
            }
            Statement::Play {
                pulse,
                element,
                amplitude_scale,
                duration,
                condition,
                chirp,
            } => {
                let mut options = Vec::new();
                if let Some(amp) = amplitude_scale {
                    options.push(format!("amp = {}", self.expression(amp)?));
                }
                if let Some(duration) = duration {
                    options.push(format!("duration = {}", self.expression(duration)?));
                }
                if let Some(condition) = condition {
                    options.push(format!("condition = {}", self.expression(condition)?));
                }
                if let Some(chirp) = chirp {
                    let rates = array_text(&chirp.rates, |rate| Ok(rate.to_string()))?;
                    options.push(format!("chirp = ({rates}, \"{}\")", chirp.units));
                }
                let with = if options.is_empty() {
                    String::new()
                } else {
                    format!(" with ({})", options.join(", "))
                };
                self.line(&format!("play \"{pulse}\" on \"{element}\"{with};"));
            }
            Statement::Measure {
                pulse,
                element,
                demods,
                adc_stream,
            } => {
                let mut text = format!("measure \"{pulse}\" on \"{element}\"");
                if !demods.is_empty() {
                    let demods = demods
                        .iter()
                        .map(|demod| {
                            self.resolve_variable(demod.target)?;
                            Ok(format!(
                                "demod(\"{}\", {})",
                                demod.weights,
                                demod.target.resolve()
                            ))
                        })
                        .collect::<Result<Vec<_>, SerializeError>>()?;
                    text.push_str(&format!(" with ({})", demods.join(", ")));
                }
                if let Some(stream) = adc_stream {
                    self.resolve_stream(*stream)?;
                    text.push_str(&format!(" adc {}", stream.resolve()));
                }
                text.push(';');
                self.line(&text);
            }
            Statement::Wait { duration, elements } => {
                let elements = elements
                    .iter()
                    .map(|element| format!("\"{element}\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                let duration = self.expression(duration)?;
                self.line(&format!("wait {duration} on {elements};"));
            }
            Statement::Save { source, stream } => {
                self.resolve_stream(*stream)?;
                let source = self.expression(source)?;
                self.line(&format!("save {source} to {};", stream.resolve()));
            }
            Statement::StreamOp { stream, pipeline } => {
                self.resolve_stream(*stream)?;
                self.line(&format!("process {} {{", stream.resolve()));
                self.indent += 1;
                for operator in pipeline {
                    let text = match operator {
                        StreamOperator::Buffer(dims) => {
                            let dims = dims
                                .iter()
                                .map(|dim| dim.to_string())
                                .collect::<Vec<_>>()
                                .join(", ");
                            format!("buffer({dims});")
                        }
                        StreamOperator::Average => "average();".to_string(),
                        StreamOperator::Demod { frequency } => {
                            format!("demod({});", float_text(*frequency)?)
                        }
                        StreamOperator::Save(tag) => format!("save(\"{tag}\");"),
                        StreamOperator::SaveAll(tag) => format!("save_all(\"{tag}\");"),
                    };
                    self.line(&text);
                }
                self.indent -= 1;
                self.line("}");
            }
            Statement::If {
                condition,
                then_block,
                elif_branches,
                else_block,
            } => {
                let condition = self.expression(condition)?;
                self.nested_block(&format!("if {condition}"), then_block)?;
                for (condition, block) in elif_branches {
                    let condition = self.expression(condition)?;
                    self.nested_block(&format!("elif {condition}"), block)?;
                }
                // An empty else is omitted entirely; `pass` is not
                // supported in that position downstream.
                if let Some(block) = else_block {
                    if !block.is_empty() {
                        self.nested_block("else", block)?;
                    }
                }
            }
            Statement::For {
                init,
                condition,
                update,
                body,
            } => {
                let init = match init {
                    Some(assignment) => self.assignment_text(assignment)?,
                    None => String::new(),
                };
                let condition = match condition {
                    Some(expr) => self.expression(expr)?,
                    None => String::new(),
                };
                let update = match update {
                    Some(assignment) => self.assignment_text(assignment)?,
                    None => String::new(),
                };
                self.nested_block(&format!("for ({init}; {condition}; {update})"), body)?;
            }
            Statement::ForEach { bindings, body } => {
                let names = bindings
                    .iter()
                    .map(|(name, _)| name.resolve())
                    .collect::<Vec<_>>()
                    .join(", ");
                let iterables = bindings
                    .iter()
                    .map(|(_, values)| array_text(values, literal_text))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(", ");
                let header = format!("for_each ({names}) in ({iterables})");
                if self.scopes.len() > MAX_NESTING_DEPTH {
                    return Err(SerializeError::NestingTooDeep);
                }
                self.line(&format!("{header} {{"));
                self.indent += 1;
                self.scopes.push(HashSet::new());
                for (name, _) in bindings {
                    self.declare_name(*name);
                }
                if body.is_empty() {
                    self.line("pass;");
                } else {
                    self.block_body(body)?;
                }
                self.scopes.pop();
                self.indent -= 1;
                self.line("}");
            }
            Statement::StrictTiming { body } => {
                self.nested_block("strict_timing", body)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use carillon_core::expr::{BinaryOperator, VariableKind};
    use carillon_core::stmt::{Chirp, ChirpUnit, DemodSpec, InitialValue, StreamKind};

    fn var(name: &str) -> Expression {
        Expression::var(name, VariableKind::Int)
    }

    fn declare(name: &str) -> Statement {
        Statement::Declare {
            name: Id::new(name),
            kind: VariableKind::Int,
            is_array: false,
            init: None,
        }
    }

    #[test]
    fn test_empty_program() {
        let program = Program::new();
        assert_eq!(serialize(&program).unwrap(), "program {\n}\n");
    }

    #[test]
    fn test_declarations_and_assignment() {
        let mut program = Program::new();
        program.body.push(declare("x"));
        program.body.push(Statement::Assign(Assignment {
            target: AssignTarget::Variable(Id::new("x")),
            value: Expression::binary(BinaryOperator::Add, var("x"), Expression::int(1)),
        }));
        assert_eq!(
            serialize(&program).unwrap(),
            "program {\n    declare int x;\n    x = x + 1;\n}\n"
        );
    }

    #[test]
    fn test_array_declaration_uses_shorthand() {
        let mut program = Program::new();
        program.body.push(Statement::Declare {
            name: Id::new("xs"),
            kind: VariableKind::Int,
            is_array: true,
            init: Some(InitialValue::Array(vec![
                Literal::Int(0),
                Literal::Int(0),
                Literal::Int(0),
                Literal::Int(7),
            ])),
        });
        assert_eq!(
            serialize(&program).unwrap(),
            "program {\n    declare int[] xs = [0] * 3 + [7];\n}\n"
        );
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(float_text(0.5).unwrap(), "0.5");
        assert_eq!(float_text(2.0).unwrap(), "2.0");
        assert_eq!(float_text(-3.0).unwrap(), "-3.0");
        assert_eq!(float_text(25e6).unwrap(), "25000000.0");
        assert!(matches!(
            float_text(f64::NAN),
            Err(SerializeError::NonFiniteLiteral(_))
        ));
        assert!(matches!(
            float_text(f64::INFINITY),
            Err(SerializeError::NonFiniteLiteral(_))
        ));
    }

    #[test]
    fn test_precedence_parenthesization() {
        let mut program = Program::new();
        program.body.push(declare("a"));
        program.body.push(declare("b"));
        program.body.push(declare("c"));
        // (a + b) * c needs parens; a + b * c does not.
        program.body.push(Statement::Assign(Assignment {
            target: AssignTarget::Variable(Id::new("a")),
            value: Expression::binary(
                BinaryOperator::Mul,
                Expression::binary(BinaryOperator::Add, var("a"), var("b")),
                var("c"),
            ),
        }));
        // a - (b - c): right side at equal precedence keeps its parens.
        program.body.push(Statement::Assign(Assignment {
            target: AssignTarget::Variable(Id::new("a")),
            value: Expression::binary(
                BinaryOperator::Sub,
                var("a"),
                Expression::binary(BinaryOperator::Sub, var("b"), var("c")),
            ),
        }));
        let text = serialize(&program).unwrap();
        assert!(text.contains("a = (a + b) * c;"));
        assert!(text.contains("a = a - (b - c);"));
    }

    #[test]
    fn test_unary_over_binary_parenthesized() {
        let mut program = Program::new();
        program.body.push(declare("a"));
        program.body.push(Statement::Assign(Assignment {
            target: AssignTarget::Variable(Id::new("a")),
            value: Expression::neg(Expression::binary(
                BinaryOperator::Add,
                var("a"),
                Expression::int(1),
            )),
        }));
        assert!(serialize(&program).unwrap().contains("a = -(a + 1);"));
    }

    #[test]
    fn test_play_with_options() {
        let mut program = Program::new();
        program.body.push(Statement::Play {
            pulse: "sweep".to_string(),
            element: "qubit".to_string(),
            amplitude_scale: Some(Expression::float(0.5)),
            duration: None,
            condition: None,
            chirp: Some(Chirp {
                rates: vec![10, 10, 10],
                units: ChirpUnit::HzPerNs,
            }),
        });
        assert!(serialize(&program).unwrap().contains(
            "play \"sweep\" on \"qubit\" with (amp = 0.5, chirp = ([10] * 3, \"Hz/nsec\"));"
        ));
    }

    #[test]
    fn test_measure_with_demods_and_adc() {
        let mut program = Program::new();
        program.streams.insert(Id::new("raw"), StreamKind::Adc);
        program.body.push(Statement::Declare {
            name: Id::new("i_val"),
            kind: VariableKind::Fixed,
            is_array: false,
            init: None,
        });
        program.body.push(Statement::Measure {
            pulse: "readout".to_string(),
            element: "resonator".to_string(),
            demods: vec![DemodSpec {
                weights: "cos".to_string(),
                target: Id::new("i_val"),
            }],
            adc_stream: Some(Id::new("raw")),
        });
        let text = serialize(&program).unwrap();
        assert!(text.contains("stream raw: adc;"));
        assert!(
            text.contains("measure \"readout\" on \"resonator\" with (demod(\"cos\", i_val)) adc raw;")
        );
    }

    #[test]
    fn test_empty_if_body_emits_pass() {
        let mut program = Program::new();
        program.body.push(Statement::If {
            condition: Expression::bool(true),
            then_block: Block::new(),
            elif_branches: Vec::new(),
            else_block: None,
        });
        assert_eq!(
            serialize(&program).unwrap(),
            "program {\n    if true {\n        pass;\n    }\n}\n"
        );
    }

    #[test]
    fn test_empty_else_is_omitted() {
        let mut program = Program::new();
        program.body.push(Statement::If {
            condition: Expression::bool(true),
            then_block: Block::from(vec![Statement::Wait {
                duration: Expression::int(4),
                elements: vec!["qe".to_string()],
            }]),
            elif_branches: Vec::new(),
            else_block: Some(Block::new()),
        });
        let text = serialize(&program).unwrap();
        assert!(!text.contains("else"));
    }

    #[test]
    fn test_for_header_renders_all_parts() {
        let mut program = Program::new();
        program.body.push(declare("x"));
        program.body.push(Statement::For {
            init: Some(Assignment {
                target: AssignTarget::Variable(Id::new("x")),
                value: Expression::int(0),
            }),
            condition: Some(Expression::binary(
                BinaryOperator::Lt,
                var("x"),
                Expression::int(3),
            )),
            update: Some(Assignment {
                target: AssignTarget::Variable(Id::new("x")),
                value: Expression::binary(BinaryOperator::Add, var("x"), Expression::int(1)),
            }),
            body: Block::from(vec![Statement::Play {
                pulse: "p1".to_string(),
                element: "e1".to_string(),
                amplitude_scale: None,
                duration: None,
                condition: None,
                chirp: None,
            }]),
        });
        let text = serialize(&program).unwrap();
        assert!(text.contains("for (x = 0; x < 3; x = x + 1) {"));
        assert!(text.contains("play \"p1\" on \"e1\";"));
    }

    #[test]
    fn test_for_each_bindings_are_in_scope() {
        let mut program = Program::new();
        program.body.push(Statement::ForEach {
            bindings: vec![(Id::new("f"), vec![Literal::Float(0.5), Literal::Float(0.5)])],
            body: Block::from(vec![Statement::Wait {
                duration: Expression::var("f", VariableKind::Fixed),
                elements: vec!["qe".to_string()],
            }]),
        });
        let text = serialize(&program).unwrap();
        assert!(text.contains("for_each (f) in ([0.5] * 2) {"));
        assert!(text.contains("wait f on \"qe\";"));
    }

    #[test]
    fn test_unresolved_variable_fails() {
        let mut program = Program::new();
        program.body.push(Statement::Assign(Assignment {
            target: AssignTarget::Variable(Id::new("ghost")),
            value: Expression::int(1),
        }));
        assert_eq!(
            serialize(&program).unwrap_err(),
            SerializeError::UnresolvedVariable("ghost".to_string())
        );
    }

    #[test]
    fn test_variable_out_of_scope_after_block() {
        let mut program = Program::new();
        program.body.push(Statement::If {
            condition: Expression::bool(true),
            then_block: Block::from(vec![declare("inner")]),
            elif_branches: Vec::new(),
            else_block: None,
        });
        program.body.push(Statement::Assign(Assignment {
            target: AssignTarget::Variable(Id::new("inner")),
            value: Expression::int(1),
        }));
        assert_eq!(
            serialize(&program).unwrap_err(),
            SerializeError::UnresolvedVariable("inner".to_string())
        );
    }

    #[test]
    fn test_unresolved_stream_fails() {
        let mut program = Program::new();
        program.body.push(declare("x"));
        program.body.push(Statement::Save {
            source: var("x"),
            stream: Id::new("nowhere"),
        });
        assert_eq!(
            serialize(&program).unwrap_err(),
            SerializeError::UnresolvedStream("nowhere".to_string())
        );
    }

    #[test]
    fn test_nesting_limit() {
        let mut inner = Statement::StrictTiming { body: Block::new() };
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            inner = Statement::StrictTiming {
                body: Block::from(vec![inner]),
            };
        }
        let mut program = Program::new();
        program.body.push(inner);
        assert_eq!(
            serialize(&program).unwrap_err(),
            SerializeError::NestingTooDeep
        );
    }

    #[test]
    fn test_process_pipeline() {
        let mut program = Program::new();
        program.streams.insert(Id::new("s"), StreamKind::Fixed);
        program.body.push(Statement::StreamOp {
            stream: Id::new("s"),
            pipeline: vec![
                StreamOperator::Buffer(vec![10, 2]),
                StreamOperator::Average,
                StreamOperator::Demod { frequency: 25e6 },
                StreamOperator::Save("result".to_string()),
            ],
        });
        let text = serialize(&program).unwrap();
        assert!(text.contains("process s {"));
        assert!(text.contains("buffer(10, 2);"));
        assert!(text.contains("average();"));
        assert!(text.contains("demod(25000000.0);"));
        assert!(text.contains("save(\"result\");"));
    }
}
