//! Unit tests for the winnow parser implementation.
//!
//! These tests run the full pipeline (tokenize → parse → elaborate) and
//! verify that every language construct produces the expected program
//! structure, and that malformed input fails with useful diagnostics.

use carillon_core::{
    expr::{BinaryOperator, Expression, Literal, UnaryOperator, VariableKind},
    identifier::Id,
    stmt::{
        AssignTarget, ChirpUnit, InitialValue, Statement, StreamKind, StreamOperator,
    },
    program::Program,
};

use crate::error::ErrorCode;
use crate::parse;

fn parse_ok(source: &str) -> Program {
    parse(source).unwrap_or_else(|e| panic!("expected `{source}` to parse, got: {e}"))
}

fn assert_parse_fails(source: &str) {
    assert!(
        parse(source).is_err(),
        "expected parsing to fail for `{source}`"
    );
}

fn assert_fails_with(source: &str, code: ErrorCode) {
    let err = parse(source).expect_err("expected parsing to fail");
    assert_eq!(
        err.diagnostics()[0].code(),
        Some(code),
        "wrong error code for `{source}`: {err}"
    );
}

fn only_statement(program: &Program) -> &Statement {
    assert_eq!(program.body.statements.len(), 1);
    &program.body.statements[0]
}

// =========================================================================
// Program shell
// =========================================================================

#[test]
fn test_empty_program() {
    let program = parse_ok("program { }");
    assert!(program.body.is_empty());
    assert!(program.streams.is_empty());
}

#[test]
fn test_pass_only_program_is_empty() {
    let program = parse_ok("program { pass; }");
    assert!(program.body.is_empty());
}

#[test]
fn test_missing_program_keyword_fails() {
    assert_fails_with("{ }", ErrorCode::E100);
}

#[test]
fn test_trailing_tokens_fail() {
    assert_fails_with("program { } extra", ErrorCode::E100);
}

#[test]
fn test_unclosed_program_fails() {
    assert_parse_fails("program {");
}

#[test]
fn test_comments_anywhere() {
    let program = parse_ok(
        "# header comment\n\
         program {\n\
             declare int n; # trailing\n\
             # full line\n\
         }",
    );
    assert_eq!(program.body.statements.len(), 1);
}

// =========================================================================
// Declarations
// =========================================================================

#[test]
fn test_declare_scalar() {
    let program = parse_ok("program { declare int n; }");
    assert_eq!(only_statement(&program), &Statement::Declare {
        name: Id::new("n"),
        kind: VariableKind::Int,
        is_array: false,
        init: None,
    });
}

#[test]
fn test_declare_with_scalar_init() {
    let program = parse_ok("program { declare fixed scale = 0.5; }");
    assert_eq!(only_statement(&program), &Statement::Declare {
        name: Id::new("scale"),
        kind: VariableKind::Fixed,
        is_array: false,
        init: Some(InitialValue::Scalar(Literal::Float(0.5))),
    });
}

#[test]
fn test_declare_with_negative_init() {
    let program = parse_ok("program { declare int offset = -12; }");
    let Statement::Declare { init, .. } = only_statement(&program) else {
        panic!("expected declare");
    };
    assert_eq!(init, &Some(InitialValue::Scalar(Literal::Int(-12))));
}

#[test]
fn test_declare_bool() {
    let program = parse_ok("program { declare bool flag = true; }");
    let Statement::Declare { kind, init, .. } = only_statement(&program) else {
        panic!("expected declare");
    };
    assert_eq!(*kind, VariableKind::Bool);
    assert_eq!(init, &Some(InitialValue::Scalar(Literal::Bool(true))));
}

#[test]
fn test_declare_array_plain() {
    let program = parse_ok("program { declare int[] xs = [1, 2, 3]; }");
    let Statement::Declare { is_array, init, .. } = only_statement(&program) else {
        panic!("expected declare");
    };
    assert!(*is_array);
    assert_eq!(
        init,
        &Some(InitialValue::Array(vec![
            Literal::Int(1),
            Literal::Int(2),
            Literal::Int(3),
        ]))
    );
}

#[test]
fn test_declare_array_run_length_shorthand() {
    // `[0] * 4 + [7]` expands to 0,0,0,0,7
    let program = parse_ok("program { declare int[] xs = [0] * 4 + [7]; }");
    let Statement::Declare { init, .. } = only_statement(&program) else {
        panic!("expected declare");
    };
    assert_eq!(
        init,
        &Some(InitialValue::Array(vec![
            Literal::Int(0),
            Literal::Int(0),
            Literal::Int(0),
            Literal::Int(0),
            Literal::Int(7),
        ]))
    );
}

#[test]
fn test_declare_reserved_name_fails() {
    assert_parse_fails("program { declare int wait; }");
    assert_parse_fails("program { declare int program; }");
    // Play option keywords are reserved too.
    assert_parse_fails("program { declare fixed amp; }");
}

#[test]
fn test_declare_missing_kind_fails() {
    assert_parse_fails("program { declare n; }");
}

// =========================================================================
// Stream declarations
// =========================================================================

#[test]
fn test_stream_declarations() {
    let program = parse_ok(
        "program { stream s_int: int; stream s_fix: fixed; stream s_b: bool; stream raw: adc; }",
    );
    assert!(program.body.is_empty());
    assert_eq!(program.stream_kind(Id::new("s_int")), Some(StreamKind::Int));
    assert_eq!(program.stream_kind(Id::new("s_fix")), Some(StreamKind::Fixed));
    assert_eq!(program.stream_kind(Id::new("s_b")), Some(StreamKind::Bool));
    assert_eq!(program.stream_kind(Id::new("raw")), Some(StreamKind::Adc));
}

#[test]
fn test_stream_bad_kind_fails() {
    assert_parse_fails("program { stream s: float; }");
}

// =========================================================================
// Assignment
// =========================================================================

#[test]
fn test_assign_variable() {
    let program = parse_ok("program { declare int n; n = n + 1; }");
    let Statement::Assign(assign) = &program.body.statements[1] else {
        panic!("expected assignment");
    };
    assert_eq!(assign.target, AssignTarget::Variable(Id::new("n")));
    assert_eq!(
        assign.value,
        Expression::binary(
            BinaryOperator::Add,
            Expression::var("n", VariableKind::Int),
            Expression::int(1),
        )
    );
}

#[test]
fn test_assign_array_cell() {
    let program = parse_ok("program { declare int[] xs = [0] * 4; xs[2] = 9; }");
    let Statement::Assign(assign) = &program.body.statements[1] else {
        panic!("expected assignment");
    };
    assert_eq!(assign.target, AssignTarget::ArrayCell {
        array: Id::new("xs"),
        index: Box::new(Expression::int(2)),
    });
}

#[test]
fn test_assign_missing_semicolon_fails() {
    assert_parse_fails("program { declare int n; n = 1 }");
}

// =========================================================================
// Expressions
// =========================================================================

fn parse_value_of(expr_text: &str) -> Expression {
    let source = format!(
        "program {{ declare int a; declare int b; declare int c; declare int[] xs = [0] * 4; a = {expr_text}; }}"
    );
    let program = parse_ok(&source);
    let Statement::Assign(assign) = &program.body.statements[4] else {
        panic!("expected assignment");
    };
    assign.value.clone()
}

#[test]
fn test_precedence_mul_over_add() {
    assert_eq!(
        parse_value_of("a + b * c"),
        Expression::binary(
            BinaryOperator::Add,
            Expression::var("a", VariableKind::Int),
            Expression::binary(
                BinaryOperator::Mul,
                Expression::var("b", VariableKind::Int),
                Expression::var("c", VariableKind::Int),
            ),
        )
    );
}

#[test]
fn test_parentheses_override_precedence() {
    assert_eq!(
        parse_value_of("(a + b) * c"),
        Expression::binary(
            BinaryOperator::Mul,
            Expression::binary(
                BinaryOperator::Add,
                Expression::var("a", VariableKind::Int),
                Expression::var("b", VariableKind::Int),
            ),
            Expression::var("c", VariableKind::Int),
        )
    );
}

#[test]
fn test_left_associativity() {
    assert_eq!(
        parse_value_of("a - b - c"),
        Expression::binary(
            BinaryOperator::Sub,
            Expression::binary(
                BinaryOperator::Sub,
                Expression::var("a", VariableKind::Int),
                Expression::var("b", VariableKind::Int),
            ),
            Expression::var("c", VariableKind::Int),
        )
    );
}

#[test]
fn test_comparison_binds_looser_than_shift() {
    assert_eq!(
        parse_value_of("a << 2 < b"),
        Expression::binary(
            BinaryOperator::Lt,
            Expression::binary(
                BinaryOperator::Shl,
                Expression::var("a", VariableKind::Int),
                Expression::int(2),
            ),
            Expression::var("b", VariableKind::Int),
        )
    );
}

#[test]
fn test_bitwise_ladder() {
    // `a | b ^ c & a` parses as `a | (b ^ (c & a))`
    assert_eq!(
        parse_value_of("a | b ^ c & a"),
        Expression::binary(
            BinaryOperator::Or,
            Expression::var("a", VariableKind::Int),
            Expression::binary(
                BinaryOperator::Xor,
                Expression::var("b", VariableKind::Int),
                Expression::binary(
                    BinaryOperator::And,
                    Expression::var("c", VariableKind::Int),
                    Expression::var("a", VariableKind::Int),
                ),
            ),
        )
    );
}

#[test]
fn test_negative_literal_folds() {
    assert_eq!(parse_value_of("-5"), Expression::int(-5));
}

#[test]
fn test_negation_of_variable_stays_unary() {
    assert_eq!(
        parse_value_of("-a"),
        Expression::Unary {
            op: UnaryOperator::Neg,
            operand: Box::new(Expression::var("a", VariableKind::Int)),
        }
    );
}

#[test]
fn test_not_operator() {
    assert_eq!(
        parse_value_of("!(a == b)"),
        Expression::not(Expression::binary(
            BinaryOperator::Eq,
            Expression::var("a", VariableKind::Int),
            Expression::var("b", VariableKind::Int),
        ))
    );
}

#[test]
fn test_array_access_in_expression() {
    assert_eq!(
        parse_value_of("xs[a + 1]"),
        Expression::index(
            "xs",
            Expression::binary(
                BinaryOperator::Add,
                Expression::var("a", VariableKind::Int),
                Expression::int(1),
            )
        )
    );
}

#[test]
fn test_library_call() {
    use carillon_core::expr::LibraryFunction;
    assert_eq!(
        parse_value_of("math.abs(a - b)"),
        Expression::call(LibraryFunction::Abs, vec![Expression::binary(
            BinaryOperator::Sub,
            Expression::var("a", VariableKind::Int),
            Expression::var("b", VariableKind::Int),
        )])
    );
}

#[test]
fn test_library_call_two_args() {
    use carillon_core::expr::LibraryFunction;
    assert_eq!(
        parse_value_of("math.pow(a, 2)"),
        Expression::call(LibraryFunction::Pow, vec![
            Expression::var("a", VariableKind::Int),
            Expression::int(2),
        ])
    );
}

#[test]
fn test_unknown_library_function_fails() {
    assert_parse_fails("program { declare int a; a = math.tanh(a); }");
}

// =========================================================================
// Play
// =========================================================================

#[test]
fn test_play_minimal() {
    let program = parse_ok("program { play \"x90\" on \"qubit\"; }");
    assert_eq!(only_statement(&program), &Statement::Play {
        pulse: "x90".to_string(),
        element: "qubit".to_string(),
        amplitude_scale: None,
        duration: None,
        condition: None,
        chirp: None,
    });
}

#[test]
fn test_play_with_options() {
    let program = parse_ok(
        "program {\n\
         declare fixed a = 0.5;\n\
         declare int t = 100;\n\
         play \"x90\" on \"qubit\" with (amp = a, duration = t / 4);\n\
         }",
    );
    let Statement::Play {
        amplitude_scale,
        duration,
        condition,
        ..
    } = &program.body.statements[2]
    else {
        panic!("expected play");
    };
    assert_eq!(
        amplitude_scale,
        &Some(Expression::var("a", VariableKind::Fixed))
    );
    assert!(duration.is_some());
    assert!(condition.is_none());
}

#[test]
fn test_play_with_chirp() {
    let program = parse_ok(
        "program { play \"sweep\" on \"qubit\" with (chirp = ([10] * 3, \"Hz/nsec\")); }",
    );
    let Statement::Play { chirp, .. } = only_statement(&program) else {
        panic!("expected play");
    };
    let chirp = chirp.as_ref().expect("chirp should be present");
    assert_eq!(chirp.rates, vec![10, 10, 10]);
    assert_eq!(chirp.units, ChirpUnit::HzPerNs);
}

#[test]
fn test_play_bad_chirp_unit_fails() {
    assert_parse_fails(
        "program { play \"sweep\" on \"qubit\" with (chirp = ([10], \"THz/day\")); }",
    );
}

#[test]
fn test_play_missing_on_fails() {
    assert_parse_fails("program { play \"x90\" \"qubit\"; }");
}

// =========================================================================
// Measure
// =========================================================================

#[test]
fn test_measure_minimal() {
    let program = parse_ok("program { measure \"readout\" on \"resonator\"; }");
    let Statement::Measure {
        pulse,
        element,
        demods,
        adc_stream,
    } = only_statement(&program)
    else {
        panic!("expected measure");
    };
    assert_eq!(pulse, "readout");
    assert_eq!(element, "resonator");
    assert!(demods.is_empty());
    assert!(adc_stream.is_none());
}

#[test]
fn test_measure_with_demods_and_adc() {
    let program = parse_ok(
        "program {\n\
         declare fixed i_val;\n\
         declare fixed q_val;\n\
         stream raw: adc;\n\
         measure \"readout\" on \"resonator\" with (demod(\"cos\", i_val), demod(\"sin\", q_val)) adc raw;\n\
         }",
    );
    let Statement::Measure {
        demods, adc_stream, ..
    } = &program.body.statements[2]
    else {
        panic!("expected measure");
    };
    assert_eq!(demods.len(), 2);
    assert_eq!(demods[0].weights, "cos");
    assert_eq!(demods[0].target, Id::new("i_val"));
    assert_eq!(demods[1].weights, "sin");
    assert_eq!(*adc_stream, Some(Id::new("raw")));
}

// =========================================================================
// Wait / Save
// =========================================================================

#[test]
fn test_wait_single_element() {
    let program = parse_ok("program { wait 100 on \"qubit\"; }");
    assert_eq!(only_statement(&program), &Statement::Wait {
        duration: Expression::int(100),
        elements: vec!["qubit".to_string()],
    });
}

#[test]
fn test_wait_multiple_elements() {
    let program = parse_ok("program { wait 4 on \"qubit\", \"resonator\"; }");
    let Statement::Wait { elements, .. } = only_statement(&program) else {
        panic!("expected wait");
    };
    assert_eq!(elements, &["qubit".to_string(), "resonator".to_string()]);
}

#[test]
fn test_wait_without_elements_fails() {
    assert_parse_fails("program { wait 100 on; }");
}

#[test]
fn test_save_to_stream() {
    let program = parse_ok("program { declare int n; stream s_n: int; save n to s_n; }");
    let Statement::Save { source, stream } = &program.body.statements[1] else {
        panic!("expected save");
    };
    assert_eq!(*source, Expression::var("n", VariableKind::Int));
    assert_eq!(*stream, Id::new("s_n"));
}

// =========================================================================
// Process pipelines
// =========================================================================

#[test]
fn test_process_pipeline() {
    let program = parse_ok(
        "program {\n\
         stream s: fixed;\n\
         process s {\n\
             buffer(10, 2);\n\
             average();\n\
             demod(25000000.0);\n\
             save(\"result\");\n\
             save_all(\"raw_result\");\n\
         }\n\
         }",
    );
    let Statement::StreamOp { stream, pipeline } = &program.body.statements[0] else {
        panic!("expected process");
    };
    assert_eq!(*stream, Id::new("s"));
    assert_eq!(pipeline, &vec![
        StreamOperator::Buffer(vec![10, 2]),
        StreamOperator::Average,
        StreamOperator::Demod {
            frequency: 25_000_000.0
        },
        StreamOperator::Save("result".to_string()),
        StreamOperator::SaveAll("raw_result".to_string()),
    ]);
}

#[test]
fn test_process_empty_pipeline() {
    let program = parse_ok("program { stream s: int; process s { } }");
    let Statement::StreamOp { pipeline, .. } = &program.body.statements[0] else {
        panic!("expected process");
    };
    assert!(pipeline.is_empty());
}

#[test]
fn test_process_unknown_operator_fails() {
    assert_parse_fails("program { stream s: int; process s { histogram(); } }");
}

// =========================================================================
// Control flow
// =========================================================================

#[test]
fn test_if_only() {
    let program = parse_ok(
        "program { declare int n; if n == 0 { wait 4 on \"qe\"; } }",
    );
    let Statement::If {
        elif_branches,
        else_block,
        then_block,
        ..
    } = &program.body.statements[1]
    else {
        panic!("expected if");
    };
    assert_eq!(then_block.len(), 1);
    assert!(elif_branches.is_empty());
    assert!(else_block.is_none());
}

#[test]
fn test_if_elif_else_chain() {
    let program = parse_ok(
        "program {\n\
         declare int n;\n\
         if n == 0 { wait 4 on \"a\"; }\n\
         elif n == 1 { wait 8 on \"a\"; }\n\
         elif n == 2 { wait 12 on \"a\"; }\n\
         else { wait 16 on \"a\"; }\n\
         }",
    );
    let Statement::If {
        elif_branches,
        else_block,
        ..
    } = &program.body.statements[1]
    else {
        panic!("expected if");
    };
    assert_eq!(elif_branches.len(), 2);
    assert!(else_block.is_some());
}

#[test]
fn test_if_with_empty_pass_body() {
    let program = parse_ok("program { declare bool b; if b { pass; } }");
    let Statement::If { then_block, .. } = &program.body.statements[1] else {
        panic!("expected if");
    };
    assert!(then_block.is_empty());
}

#[test]
fn test_for_full_header() {
    let program = parse_ok(
        "program { declare int i; for (i = 0; i < 10; i = i + 1) { wait 4 on \"qe\"; } }",
    );
    let Statement::For {
        init,
        condition,
        update,
        body,
    } = &program.body.statements[1]
    else {
        panic!("expected for");
    };
    assert!(init.is_some());
    assert!(condition.is_some());
    assert!(update.is_some());
    assert_eq!(body.len(), 1);
}

#[test]
fn test_for_empty_header_is_infinite_loop() {
    let program = parse_ok("program { for (;;) { wait 4 on \"qe\"; } }");
    let Statement::For {
        init,
        condition,
        update,
        ..
    } = &program.body.statements[0]
    else {
        panic!("expected for");
    };
    assert!(init.is_none());
    assert!(condition.is_none());
    assert!(update.is_none());
}

#[test]
fn test_for_each_single_binding() {
    let program = parse_ok(
        "program { for_each (f) in ([0.5, 0.25, 0.125]) { wait 4 on \"qe\"; } }",
    );
    let Statement::ForEach { bindings, .. } = &program.body.statements[0] else {
        panic!("expected for_each");
    };
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].0, Id::new("f"));
    assert_eq!(bindings[0].1, vec![
        Literal::Float(0.5),
        Literal::Float(0.25),
        Literal::Float(0.125),
    ]);
}

#[test]
fn test_for_each_parallel_bindings() {
    let program = parse_ok(
        "program { for_each (a, b) in ([1, 2], [3, 4]) { wait a on \"qe\"; } }",
    );
    let Statement::ForEach { bindings, .. } = &program.body.statements[0] else {
        panic!("expected for_each");
    };
    assert_eq!(bindings.len(), 2);
}

#[test]
fn test_for_each_count_mismatch_fails() {
    assert_parse_fails("program { for_each (a, b) in ([1, 2]) { pass; } }");
}

#[test]
fn test_strict_timing_block() {
    let program = parse_ok(
        "program { strict_timing { play \"x90\" on \"q\"; play \"y90\" on \"q\"; } }",
    );
    let Statement::StrictTiming { body } = &program.body.statements[0] else {
        panic!("expected strict_timing");
    };
    assert_eq!(body.len(), 2);
}

#[test]
fn test_nested_control_flow() {
    let program = parse_ok(
        "program {\n\
         declare int i;\n\
         declare int j;\n\
         for (i = 0; i < 4; i = i + 1) {\n\
             for (j = 0; j < 4; j = j + 1) {\n\
                 if i == j { play \"x90\" on \"q\"; } else { pass; }\n\
             }\n\
         }\n\
         }",
    );
    let Statement::For { body, .. } = &program.body.statements[2] else {
        panic!("expected outer for");
    };
    let Statement::For { body: inner, .. } = &body.statements[0] else {
        panic!("expected inner for");
    };
    let Statement::If { else_block, .. } = &inner.statements[0] else {
        panic!("expected if");
    };
    // An `else { pass; }` normalizes to no else branch.
    assert!(else_block.is_none());
}

// =========================================================================
// Reserved words
// =========================================================================

#[test]
fn test_is_reserved_word() {
    use crate::{is_reserved_word, is_valid_identifier};

    assert!(is_reserved_word("program"));
    assert!(is_reserved_word("for_each"));
    assert!(is_reserved_word("math"));
    assert!(!is_reserved_word("qubit"));

    assert!(is_valid_identifier("qubit_1"));
    assert!(is_valid_identifier("_hidden"));
    assert!(!is_valid_identifier("1qubit"));
    assert!(!is_valid_identifier("wait"));
    assert!(!is_valid_identifier(""));
    assert!(!is_valid_identifier("has space"));
}
