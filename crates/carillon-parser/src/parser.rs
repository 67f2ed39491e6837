//! Parser for Carillon canonical program text.
//!
//! This module transforms a token stream from the [`lexer`](super::lexer)
//! into a parse tree defined in [`parser_types`](super::parser_types). The
//! public entry point is [`build_script`].
//!
//! Keywords are lexed as plain identifiers; the parser decides which
//! identifier positions are keywords, so user names and keywords never
//! collide at the token level.

use winnow::{
    Parser as _,
    combinator::{opt, preceded, repeat, separated},
    error::{ContextError, ErrMode},
    stream::{Stream, TokenSlice},
    token::any,
};

use carillon_core::{
    expr::{BinaryOperator, Literal, LibraryFunction, VariableKind},
    identifier::Id,
    stmt::{Chirp, ChirpUnit, StreamKind, StreamOperator},
};

use crate::{
    error::{Diagnostic, ErrorCode},
    parser_types as types,
    span::{Span, Spanned},
    tokens::{PositionedToken, Token},
};

/// Words with a fixed meaning in the canonical text.
///
/// The lexer emits these as ordinary identifiers; the parser gives them
/// their keyword meaning by position. They are still rejected as variable
/// and stream names so that serialized output always re-parses.
const RESERVED_WORDS: &[&str] = &[
    "program",
    "declare",
    "stream",
    "int",
    "fixed",
    "bool",
    "adc",
    "play",
    "measure",
    "wait",
    "save",
    "save_all",
    "to",
    "on",
    "with",
    "amp",
    "duration",
    "condition",
    "chirp",
    "demod",
    "buffer",
    "average",
    "process",
    "if",
    "elif",
    "else",
    "for",
    "for_each",
    "in",
    "strict_timing",
    "pass",
    "true",
    "false",
    "math",
];

/// Whether `name` is a reserved word of the canonical text.
pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Whether `name` is lexically a valid identifier: starts with an ASCII
/// letter or underscore, continues with ASCII alphanumerics or underscores,
/// and is not a reserved word.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !is_reserved_word(name)
}

/// Context type for parser errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Context {
    /// Description of what is currently being parsed
    Label(&'static str),
    /// Remaining token count (`eof_offset()`) at error start position
    ///
    /// Used to calculate start_offset as: `tokens.len() - start_offset_value`
    StartOffset(usize),
}

type Input<'src> = TokenSlice<'src, PositionedToken<'src>>;
type IResult<O> = std::result::Result<O, ErrMode<ContextError<Context>>>;

fn cut_err<'src, O, F>(input: &mut Input<'src>, f: F) -> IResult<O>
where
    F: FnOnce(&mut Input<'src>) -> IResult<O>,
{
    let start_remaining = input.eof_offset();

    match f(input) {
        Ok(o) => Ok(o),
        Err(ErrMode::Backtrack(mut e)) | Err(ErrMode::Cut(mut e)) => {
            e.push(Context::StartOffset(start_remaining));
            Err(ErrMode::Cut(e))
        }
        Err(e) => Err(e),
    }
}

/// Parser for a single punctuation or operator token, yielding its span.
fn symbol<'src>(expected: Token<'static>) -> impl FnMut(&mut Input<'src>) -> IResult<Span> {
    move |input: &mut Input<'src>| {
        any.verify(|token: &PositionedToken<'_>| token.token == expected)
            .map(|token: &PositionedToken<'_>| token.span)
            .parse_next(input)
    }
}

/// Parser for a specific keyword (an identifier token with a fixed name).
fn keyword<'src>(name: &'static str) -> impl FnMut(&mut Input<'src>) -> IResult<Span> {
    move |input: &mut Input<'src>| {
        any.verify(move |token: &PositionedToken<'_>| {
            matches!(token.token, Token::Identifier(s) if s == name)
        })
        .map(|token: &PositionedToken<'_>| token.span)
        .context(Context::Label(name))
        .parse_next(input)
    }
}

/// Parse a user identifier (non-reserved) into an interned [`Id`].
fn identifier<'src>(input: &mut Input<'src>) -> IResult<Spanned<Id>> {
    any.verify_map(|token: &PositionedToken<'_>| match token.token {
        Token::Identifier(name) if !is_reserved_word(name) => {
            Some(Spanned::new(Id::new(name), token.span))
        }
        _ => None,
    })
    .context(Context::Label("identifier"))
    .parse_next(input)
}

/// Parse a string literal token.
fn string_literal<'src>(input: &mut Input<'src>) -> IResult<String> {
    any.verify_map(|token: &PositionedToken<'_>| match &token.token {
        Token::StringLiteral(s) => Some(s.clone()),
        _ => None,
    })
    .context(Context::Label("string literal"))
    .parse_next(input)
}

/// Parse an integer literal, with an optional leading minus.
fn int_literal<'src>(input: &mut Input<'src>) -> IResult<i64> {
    let negative = opt(symbol(Token::Minus)).parse_next(input)?.is_some();
    let value = any
        .verify_map(|token: &PositionedToken<'_>| match token.token {
            Token::Int(n) => Some(n),
            _ => None,
        })
        .context(Context::Label("integer literal"))
        .parse_next(input)?;
    Ok(if negative { -value } else { value })
}

/// Parse a float literal, with an optional leading minus. An integer token
/// is accepted and widened.
fn float_literal<'src>(input: &mut Input<'src>) -> IResult<f64> {
    let negative = opt(symbol(Token::Minus)).parse_next(input)?.is_some();
    let value = any
        .verify_map(|token: &PositionedToken<'_>| match token.token {
            Token::Float(f) => Some(f),
            Token::Int(n) => Some(n as f64),
            _ => None,
        })
        .context(Context::Label("numeric literal"))
        .parse_next(input)?;
    Ok(if negative { -value } else { value })
}

/// Parse a scalar literal: int, float, or `true` / `false`, with an
/// optional leading minus on the numeric forms.
fn scalar_literal<'src>(input: &mut Input<'src>) -> IResult<Literal> {
    let negative = opt(symbol(Token::Minus)).parse_next(input)?.is_some();
    let literal = any
        .verify_map(|token: &PositionedToken<'_>| match token.token {
            Token::Int(n) => Some(Literal::Int(n)),
            Token::Float(f) => Some(Literal::Float(f)),
            Token::Identifier("true") => Some(Literal::Bool(true)),
            Token::Identifier("false") => Some(Literal::Bool(false)),
            _ => None,
        })
        .context(Context::Label("literal"))
        .parse_next(input)?;

    match (negative, literal) {
        (false, lit) => Ok(lit),
        (true, Literal::Int(n)) => Ok(Literal::Int(-n)),
        (true, Literal::Float(f)) => Ok(Literal::Float(-f)),
        (true, Literal::Bool(_)) => Err(ErrMode::Backtrack(ContextError::new())),
    }
}

/// Parse a literal array with run-length shorthand and expand it.
///
/// Syntax: `segment ("+" segment)*` where
/// `segment := "[" literal ("," literal)* "]" ("*" int)?`.
/// A `* n` multiplier repeats the segment's values `n` times.
fn literal_array<'src>(input: &mut Input<'src>) -> IResult<Vec<Literal>> {
    fn segment<'src>(input: &mut Input<'src>) -> IResult<Vec<Literal>> {
        symbol(Token::LBracket).parse_next(input)?;
        let values: Vec<Literal> =
            separated(0.., scalar_literal, symbol(Token::Comma)).parse_next(input)?;
        symbol(Token::RBracket)
            .context(Context::Label("closing bracket ']'"))
            .parse_next(input)?;

        let multiplier = opt(preceded(symbol(Token::Star), int_literal)).parse_next(input)?;
        match multiplier {
            Some(n) if n >= 0 => {
                let n = n as usize;
                let mut expanded = Vec::with_capacity(values.len() * n);
                for _ in 0..n {
                    expanded.extend(values.iter().copied());
                }
                Ok(expanded)
            }
            Some(_) => Err(ErrMode::Backtrack(ContextError::new())),
            None => Ok(values),
        }
    }

    let segments: Vec<Vec<Literal>> =
        separated(1.., segment, symbol(Token::Plus)).parse_next(input)?;
    Ok(segments.into_iter().flatten().collect())
}

/// Parse an integer-only literal array (chirp rates).
fn int_array<'src>(input: &mut Input<'src>) -> IResult<Vec<i64>> {
    let literals = literal_array.parse_next(input)?;
    literals
        .into_iter()
        .map(|lit| match lit {
            Literal::Int(n) => Ok(n),
            _ => Err(ErrMode::Backtrack(ContextError::new())),
        })
        .collect()
}

// =========================================================================
// Expressions
// =========================================================================

/// One left-associative precedence level.
fn binary_chain<'src>(
    input: &mut Input<'src>,
    mut next: impl FnMut(&mut Input<'src>) -> IResult<types::Expr>,
    op_for: fn(&Token<'_>) -> Option<BinaryOperator>,
) -> IResult<types::Expr> {
    let mut lhs = next(input)?;
    loop {
        let checkpoint = input.checkpoint();
        let op: IResult<BinaryOperator> = any
            .verify_map(|token: &PositionedToken<'_>| op_for(&token.token))
            .parse_next(input);
        let op = match op {
            Ok(op) => op,
            Err(_) => {
                input.reset(&checkpoint);
                break;
            }
        };
        let rhs = next(input)?;
        lhs = types::Expr::Binary {
            op,
            left: Box::new(lhs),
            right: Box::new(rhs),
        };
    }
    Ok(lhs)
}

/// Top of the expression grammar: `|` binds loosest.
pub(crate) fn expression<'src>(input: &mut Input<'src>) -> IResult<types::Expr> {
    binary_chain(input, xor_expr, |token| match token {
        Token::Pipe => Some(BinaryOperator::Or),
        _ => None,
    })
}

fn xor_expr<'src>(input: &mut Input<'src>) -> IResult<types::Expr> {
    binary_chain(input, and_expr, |token| match token {
        Token::Caret => Some(BinaryOperator::Xor),
        _ => None,
    })
}

fn and_expr<'src>(input: &mut Input<'src>) -> IResult<types::Expr> {
    binary_chain(input, equality_expr, |token| match token {
        Token::Amp => Some(BinaryOperator::And),
        _ => None,
    })
}

fn equality_expr<'src>(input: &mut Input<'src>) -> IResult<types::Expr> {
    binary_chain(input, comparison_expr, |token| match token {
        Token::EqEq => Some(BinaryOperator::Eq),
        _ => None,
    })
}

fn comparison_expr<'src>(input: &mut Input<'src>) -> IResult<types::Expr> {
    binary_chain(input, shift_expr, |token| match token {
        Token::Lt => Some(BinaryOperator::Lt),
        Token::Le => Some(BinaryOperator::Le),
        Token::Gt => Some(BinaryOperator::Gt),
        Token::Ge => Some(BinaryOperator::Ge),
        _ => None,
    })
}

fn shift_expr<'src>(input: &mut Input<'src>) -> IResult<types::Expr> {
    binary_chain(input, additive_expr, |token| match token {
        Token::Shl => Some(BinaryOperator::Shl),
        Token::Shr => Some(BinaryOperator::Shr),
        _ => None,
    })
}

fn additive_expr<'src>(input: &mut Input<'src>) -> IResult<types::Expr> {
    binary_chain(input, multiplicative_expr, |token| match token {
        Token::Plus => Some(BinaryOperator::Add),
        Token::Minus => Some(BinaryOperator::Sub),
        _ => None,
    })
}

fn multiplicative_expr<'src>(input: &mut Input<'src>) -> IResult<types::Expr> {
    binary_chain(input, unary_expr, |token| match token {
        Token::Star => Some(BinaryOperator::Mul),
        Token::Slash => Some(BinaryOperator::Div),
        _ => None,
    })
}

/// Unary `-` and `!`. Negation of a numeric literal folds into a negative
/// literal; the builder-side constructor performs the same fold so round
/// trips stay structurally equal.
fn unary_expr<'src>(input: &mut Input<'src>) -> IResult<types::Expr> {
    if opt(symbol(Token::Minus)).parse_next(input)?.is_some() {
        let operand = unary_expr(input)?;
        return Ok(match operand {
            types::Expr::Literal(Literal::Int(n)) => types::Expr::Literal(Literal::Int(-n)),
            types::Expr::Literal(Literal::Float(f)) => types::Expr::Literal(Literal::Float(-f)),
            other => types::Expr::Unary {
                op: carillon_core::expr::UnaryOperator::Neg,
                operand: Box::new(other),
            },
        });
    }

    if opt(symbol(Token::Bang)).parse_next(input)?.is_some() {
        let operand = unary_expr(input)?;
        return Ok(types::Expr::Unary {
            op: carillon_core::expr::UnaryOperator::Not,
            operand: Box::new(operand),
        });
    }

    primary_expr(input)
}

/// Atoms: parenthesized expressions, literals, `math.<fn>(…)` calls,
/// indexed and plain variable references.
fn primary_expr<'src>(input: &mut Input<'src>) -> IResult<types::Expr> {
    // Parenthesized expression
    let checkpoint = input.checkpoint();
    if symbol(Token::LParen).parse_next(input).is_ok() {
        let inner = expression(input)?;
        symbol(Token::RParen)
            .context(Context::Label("closing parenthesis ')'"))
            .parse_next(input)?;
        return Ok(inner);
    }
    input.reset(&checkpoint);

    // Literal (no leading minus here; unary_expr owns negation)
    let literal: IResult<types::Expr> = any
        .verify_map(|token: &PositionedToken<'_>| match token.token {
            Token::Int(n) => Some(types::Expr::Literal(Literal::Int(n))),
            Token::Float(f) => Some(types::Expr::Literal(Literal::Float(f))),
            Token::Identifier("true") => Some(types::Expr::Literal(Literal::Bool(true))),
            Token::Identifier("false") => Some(types::Expr::Literal(Literal::Bool(false))),
            _ => None,
        })
        .parse_next(input);
    if let Ok(expr) = literal {
        return Ok(expr);
    }
    input.reset(&checkpoint);

    // math.<fn>(args)
    if keyword("math").parse_next(input).is_ok() {
        return cut_err(input, |input| {
            symbol(Token::Dot)
                .context(Context::Label("'.' after math"))
                .parse_next(input)?;
            let function = any
                .verify_map(|token: &PositionedToken<'_>| match token.token {
                    Token::Identifier(name) => LibraryFunction::from_name(name),
                    _ => None,
                })
                .context(Context::Label("library function name"))
                .parse_next(input)?;
            symbol(Token::LParen)
                .context(Context::Label("opening parenthesis '('"))
                .parse_next(input)?;
            let args: Vec<types::Expr> =
                separated(0.., expression, symbol(Token::Comma)).parse_next(input)?;
            symbol(Token::RParen)
                .context(Context::Label("closing parenthesis ')'"))
                .parse_next(input)?;
            Ok(types::Expr::LibraryCall { function, args })
        });
    }
    input.reset(&checkpoint);

    // Variable reference, indexed or plain
    let name = identifier
        .context(Context::Label("expression"))
        .parse_next(input)?;
    if opt(symbol(Token::LBracket)).parse_next(input)?.is_some() {
        let index = expression(input)?;
        symbol(Token::RBracket)
            .context(Context::Label("closing bracket ']'"))
            .parse_next(input)?;
        return Ok(types::Expr::ArrayAccess {
            array: name,
            index: Box::new(index),
        });
    }
    Ok(types::Expr::Variable(name))
}

// =========================================================================
// Statements
// =========================================================================

fn semicolon<'src>(input: &mut Input<'src>) -> IResult<()> {
    symbol(Token::Semicolon)
        .void()
        .context(Context::Label("semicolon"))
        .parse_next(input)
}

/// Parse a variable kind keyword: `int`, `fixed`, or `bool`.
fn variable_kind<'src>(input: &mut Input<'src>) -> IResult<VariableKind> {
    any.verify_map(|token: &PositionedToken<'_>| match token.token {
        Token::Identifier("int") => Some(VariableKind::Int),
        Token::Identifier("fixed") => Some(VariableKind::Fixed),
        Token::Identifier("bool") => Some(VariableKind::Bool),
        _ => None,
    })
    .context(Context::Label("variable kind (int, fixed, or bool)"))
    .parse_next(input)
}

/// Parse a stream kind keyword: `int`, `fixed`, `bool`, or `adc`.
fn stream_kind<'src>(input: &mut Input<'src>) -> IResult<StreamKind> {
    any.verify_map(|token: &PositionedToken<'_>| match token.token {
        Token::Identifier("int") => Some(StreamKind::Int),
        Token::Identifier("fixed") => Some(StreamKind::Fixed),
        Token::Identifier("bool") => Some(StreamKind::Bool),
        Token::Identifier("adc") => Some(StreamKind::Adc),
        _ => None,
    })
    .context(Context::Label("stream kind (int, fixed, bool, or adc)"))
    .parse_next(input)
}

/// `declare kind ("[]")? name ("=" init)? ";"`
fn declare_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("declare").parse_next(input)?;

    cut_err(input, |input| {
        let kind = variable_kind(input)?;
        let is_array = opt((symbol(Token::LBracket), symbol(Token::RBracket)))
            .parse_next(input)?
            .is_some();
        let name = identifier
            .context(Context::Label("variable name"))
            .parse_next(input)?;

        let init = if opt(symbol(Token::Equals)).parse_next(input)?.is_some() {
            let init = if is_array {
                types::Init::Array(literal_array.parse_next(input)?)
            } else {
                types::Init::Scalar(scalar_literal.parse_next(input)?)
            };
            Some(init)
        } else {
            None
        };

        semicolon(input)?;

        Ok(Some(types::Stmt::Declare {
            name,
            kind,
            is_array,
            init,
        }))
    })
}

/// `stream name ":" kind ";"`
fn stream_decl_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("stream").parse_next(input)?;

    cut_err(input, |input| {
        let name = identifier
            .context(Context::Label("stream name"))
            .parse_next(input)?;
        symbol(Token::Colon)
            .context(Context::Label("':' after stream name"))
            .parse_next(input)?;
        let kind = stream_kind(input)?;
        semicolon(input)?;

        Ok(Some(types::Stmt::StreamDecl { name, kind }))
    })
}

/// Assignment without the trailing semicolon, shared with `for` headers.
fn assign_core<'src>(input: &mut Input<'src>) -> IResult<types::Assign> {
    let name = identifier.parse_next(input)?;

    let target = if opt(symbol(Token::LBracket)).parse_next(input)?.is_some() {
        let index = expression(input)?;
        symbol(Token::RBracket)
            .context(Context::Label("closing bracket ']'"))
            .parse_next(input)?;
        types::Target::ArrayCell {
            array: name,
            index: Box::new(index),
        }
    } else {
        types::Target::Variable(name)
    };

    symbol(Token::Equals)
        .context(Context::Label("'=' in assignment"))
        .parse_next(input)?;
    let value = expression(input)?;

    Ok(types::Assign { target, value })
}

/// `target "=" expr ";"`
fn assign_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    let assign = assign_core(input)?;
    // Committed once the `=` and value parsed; only the semicolon remains.
    cut_err(input, |input| {
        semicolon(input)?;
        Ok(Some(types::Stmt::Assign(assign)))
    })
}

/// One `with (…)` option of a `play` statement.
enum PlayOpt {
    Amp(types::Expr),
    Duration(types::Expr),
    Condition(types::Expr),
    Chirp(Chirp),
}

fn play_opt<'src>(input: &mut Input<'src>) -> IResult<PlayOpt> {
    let checkpoint = input.checkpoint();

    if keyword("amp").parse_next(input).is_ok() {
        symbol(Token::Equals)
            .context(Context::Label("'=' after amp"))
            .parse_next(input)?;
        return Ok(PlayOpt::Amp(expression(input)?));
    }
    input.reset(&checkpoint);

    if keyword("duration").parse_next(input).is_ok() {
        symbol(Token::Equals)
            .context(Context::Label("'=' after duration"))
            .parse_next(input)?;
        return Ok(PlayOpt::Duration(expression(input)?));
    }
    input.reset(&checkpoint);

    if keyword("condition").parse_next(input).is_ok() {
        symbol(Token::Equals)
            .context(Context::Label("'=' after condition"))
            .parse_next(input)?;
        return Ok(PlayOpt::Condition(expression(input)?));
    }
    input.reset(&checkpoint);

    keyword("chirp")
        .context(Context::Label("play option"))
        .parse_next(input)?;
    symbol(Token::Equals)
        .context(Context::Label("'=' after chirp"))
        .parse_next(input)?;
    symbol(Token::LParen)
        .context(Context::Label("opening parenthesis '('"))
        .parse_next(input)?;
    let rates = int_array(input)?;
    symbol(Token::Comma)
        .context(Context::Label("',' between chirp rates and units"))
        .parse_next(input)?;
    let units = any
        .verify_map(|token: &PositionedToken<'_>| match &token.token {
            Token::StringLiteral(s) => ChirpUnit::from_str_exact(s),
            _ => None,
        })
        .context(Context::Label("chirp unit string"))
        .parse_next(input)?;
    symbol(Token::RParen)
        .context(Context::Label("closing parenthesis ')'"))
        .parse_next(input)?;

    Ok(PlayOpt::Chirp(Chirp { rates, units }))
}

/// `play "pulse" on "element" ("with" "(" playopt,+ ")")? ";"`
fn play_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("play").parse_next(input)?;

    cut_err(input, |input| {
        let pulse = string_literal
            .context(Context::Label("pulse name string"))
            .parse_next(input)?;
        keyword("on")
            .context(Context::Label("'on' after pulse name"))
            .parse_next(input)?;
        let element = string_literal
            .context(Context::Label("element name string"))
            .parse_next(input)?;

        let mut amplitude_scale = None;
        let mut duration = None;
        let mut condition = None;
        let mut chirp = None;

        if opt(keyword("with")).parse_next(input)?.is_some() {
            symbol(Token::LParen)
                .context(Context::Label("opening parenthesis '('"))
                .parse_next(input)?;
            let options: Vec<PlayOpt> =
                separated(1.., play_opt, symbol(Token::Comma)).parse_next(input)?;
            symbol(Token::RParen)
                .context(Context::Label("closing parenthesis ')'"))
                .parse_next(input)?;

            for option in options {
                match option {
                    PlayOpt::Amp(e) => amplitude_scale = Some(e),
                    PlayOpt::Duration(e) => duration = Some(e),
                    PlayOpt::Condition(e) => condition = Some(e),
                    PlayOpt::Chirp(c) => chirp = Some(c),
                }
            }
        }

        semicolon(input)?;

        Ok(Some(types::Stmt::Play {
            pulse,
            element,
            amplitude_scale,
            duration,
            condition,
            chirp,
        }))
    })
}

/// `demod "(" "weights" "," target ")"`
fn demod_spec<'src>(input: &mut Input<'src>) -> IResult<types::Demod> {
    keyword("demod").parse_next(input)?;
    symbol(Token::LParen)
        .context(Context::Label("opening parenthesis '('"))
        .parse_next(input)?;
    let weights = string_literal
        .context(Context::Label("integration weights string"))
        .parse_next(input)?;
    symbol(Token::Comma)
        .context(Context::Label("',' between weights and target"))
        .parse_next(input)?;
    let target = identifier
        .context(Context::Label("demodulation target variable"))
        .parse_next(input)?;
    symbol(Token::RParen)
        .context(Context::Label("closing parenthesis ')'"))
        .parse_next(input)?;

    Ok(types::Demod { weights, target })
}

/// `measure "pulse" on "element" ("with" "(" demod,+ ")")? ("adc" stream)? ";"`
fn measure_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("measure").parse_next(input)?;

    cut_err(input, |input| {
        let pulse = string_literal
            .context(Context::Label("pulse name string"))
            .parse_next(input)?;
        keyword("on")
            .context(Context::Label("'on' after pulse name"))
            .parse_next(input)?;
        let element = string_literal
            .context(Context::Label("element name string"))
            .parse_next(input)?;

        let demods = if opt(keyword("with")).parse_next(input)?.is_some() {
            symbol(Token::LParen)
                .context(Context::Label("opening parenthesis '('"))
                .parse_next(input)?;
            let demods: Vec<types::Demod> =
                separated(1.., demod_spec, symbol(Token::Comma)).parse_next(input)?;
            symbol(Token::RParen)
                .context(Context::Label("closing parenthesis ')'"))
                .parse_next(input)?;
            demods
        } else {
            Vec::new()
        };

        let adc_stream = if opt(keyword("adc")).parse_next(input)?.is_some() {
            Some(
                identifier
                    .context(Context::Label("adc stream name"))
                    .parse_next(input)?,
            )
        } else {
            None
        };

        semicolon(input)?;

        Ok(Some(types::Stmt::Measure {
            pulse,
            element,
            demods,
            adc_stream,
        }))
    })
}

/// `wait expr on "element" ("," "element")* ";"`
fn wait_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("wait").parse_next(input)?;

    cut_err(input, |input| {
        let duration = expression(input)?;
        keyword("on")
            .context(Context::Label("'on' after wait duration"))
            .parse_next(input)?;
        let elements: Vec<String> = separated(
            1..,
            string_literal.context(Context::Label("element name string")),
            symbol(Token::Comma),
        )
        .parse_next(input)?;
        semicolon(input)?;

        Ok(Some(types::Stmt::Wait { duration, elements }))
    })
}

/// `save expr to stream ";"`
fn save_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("save").parse_next(input)?;

    cut_err(input, |input| {
        let source = expression(input)?;
        keyword("to")
            .context(Context::Label("'to' after saved value"))
            .parse_next(input)?;
        let stream = identifier
            .context(Context::Label("stream name"))
            .parse_next(input)?;
        semicolon(input)?;

        Ok(Some(types::Stmt::Save { source, stream }))
    })
}

/// One stream-pipeline operator with its trailing semicolon.
fn pipeline_op<'src>(input: &mut Input<'src>) -> IResult<StreamOperator> {
    let checkpoint = input.checkpoint();

    if keyword("buffer").parse_next(input).is_ok() {
        symbol(Token::LParen)
            .context(Context::Label("opening parenthesis '('"))
            .parse_next(input)?;
        let dims: Vec<i64> =
            separated(1.., int_literal, symbol(Token::Comma)).parse_next(input)?;
        symbol(Token::RParen)
            .context(Context::Label("closing parenthesis ')'"))
            .parse_next(input)?;
        semicolon(input)?;
        let dims = dims
            .into_iter()
            .map(|n| u32::try_from(n).map_err(|_| ErrMode::Backtrack(ContextError::new())))
            .collect::<Result<Vec<u32>, _>>()?;
        return Ok(StreamOperator::Buffer(dims));
    }
    input.reset(&checkpoint);

    if keyword("average").parse_next(input).is_ok() {
        symbol(Token::LParen)
            .context(Context::Label("opening parenthesis '('"))
            .parse_next(input)?;
        symbol(Token::RParen)
            .context(Context::Label("closing parenthesis ')'"))
            .parse_next(input)?;
        semicolon(input)?;
        return Ok(StreamOperator::Average);
    }
    input.reset(&checkpoint);

    if keyword("demod").parse_next(input).is_ok() {
        symbol(Token::LParen)
            .context(Context::Label("opening parenthesis '('"))
            .parse_next(input)?;
        let frequency = float_literal(input)?;
        symbol(Token::RParen)
            .context(Context::Label("closing parenthesis ')'"))
            .parse_next(input)?;
        semicolon(input)?;
        return Ok(StreamOperator::Demod { frequency });
    }
    input.reset(&checkpoint);

    if keyword("save").parse_next(input).is_ok() {
        symbol(Token::LParen)
            .context(Context::Label("opening parenthesis '('"))
            .parse_next(input)?;
        let tag = string_literal
            .context(Context::Label("save tag string"))
            .parse_next(input)?;
        symbol(Token::RParen)
            .context(Context::Label("closing parenthesis ')'"))
            .parse_next(input)?;
        semicolon(input)?;
        return Ok(StreamOperator::Save(tag));
    }
    input.reset(&checkpoint);

    keyword("save_all")
        .context(Context::Label("stream operator"))
        .parse_next(input)?;
    symbol(Token::LParen)
        .context(Context::Label("opening parenthesis '('"))
        .parse_next(input)?;
    let tag = string_literal
        .context(Context::Label("save tag string"))
        .parse_next(input)?;
    symbol(Token::RParen)
        .context(Context::Label("closing parenthesis ')'"))
        .parse_next(input)?;
    semicolon(input)?;
    Ok(StreamOperator::SaveAll(tag))
}

/// `process stream "{" pipeop* "}"`
fn process_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("process").parse_next(input)?;

    cut_err(input, |input| {
        let stream = identifier
            .context(Context::Label("stream name"))
            .parse_next(input)?;
        symbol(Token::LBrace)
            .context(Context::Label("opening brace '{'"))
            .parse_next(input)?;
        let pipeline: Vec<StreamOperator> = repeat(0.., pipeline_op).parse_next(input)?;
        symbol(Token::RBrace)
            .context(Context::Label("closing brace '}'"))
            .parse_next(input)?;

        Ok(Some(types::Stmt::StreamOp { stream, pipeline }))
    })
}

/// `if expr block ("elif" expr block)* ("else" block)?`
fn if_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("if").parse_next(input)?;

    cut_err(input, |input| {
        let condition = expression(input)?;
        let then_block = block(input)?;

        let mut elif_branches = Vec::new();
        while opt(keyword("elif")).parse_next(input)?.is_some() {
            let elif_condition = expression(input)?;
            let elif_block = block(input)?;
            elif_branches.push((elif_condition, elif_block));
        }

        let else_block = if opt(keyword("else")).parse_next(input)?.is_some() {
            Some(block(input)?)
        } else {
            None
        };

        Ok(Some(types::Stmt::If {
            condition,
            then_block,
            elif_branches,
            else_block,
        }))
    })
}

/// `for "(" assign? ";" expr? ";" assign? ")" block`
fn for_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("for").parse_next(input)?;

    cut_err(input, |input| {
        symbol(Token::LParen)
            .context(Context::Label("opening parenthesis '('"))
            .parse_next(input)?;
        let init = opt(assign_core).parse_next(input)?;
        semicolon(input)?;
        let condition = opt(expression).parse_next(input)?;
        semicolon(input)?;
        let update = opt(assign_core).parse_next(input)?;
        symbol(Token::RParen)
            .context(Context::Label("closing parenthesis ')'"))
            .parse_next(input)?;
        let body = block(input)?;

        Ok(Some(types::Stmt::For {
            init,
            condition,
            update,
            body,
        }))
    })
}

/// `for_each "(" ident,+ ")" in "(" array,+ ")" block`
fn for_each_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("for_each").parse_next(input)?;

    cut_err(input, |input| {
        symbol(Token::LParen)
            .context(Context::Label("opening parenthesis '('"))
            .parse_next(input)?;
        let names: Vec<Spanned<Id>> = separated(
            1..,
            identifier.context(Context::Label("loop variable")),
            symbol(Token::Comma),
        )
        .parse_next(input)?;
        symbol(Token::RParen)
            .context(Context::Label("closing parenthesis ')'"))
            .parse_next(input)?;

        keyword("in")
            .context(Context::Label("'in' after loop variables"))
            .parse_next(input)?;

        symbol(Token::LParen)
            .context(Context::Label("opening parenthesis '('"))
            .parse_next(input)?;
        let arrays: Vec<Vec<Literal>> =
            separated(1.., literal_array, symbol(Token::Comma)).parse_next(input)?;
        symbol(Token::RParen)
            .context(Context::Label("closing parenthesis ')'"))
            .parse_next(input)?;

        let body = block(input)?;

        // Binding/iterable count mismatch is a structural parse error here;
        // length mismatches between iterables are checked in elaboration.
        if names.len() != arrays.len() {
            let mut e = ContextError::new();
            e.push(Context::Label(
                "matching counts of loop variables and iterables",
            ));
            e.push(Context::StartOffset(input.eof_offset()));
            return Err(ErrMode::Cut(e));
        }

        let bindings = names.into_iter().zip(arrays).collect();

        Ok(Some(types::Stmt::ForEach { bindings, body }))
    })
}

/// `strict_timing block`
fn strict_timing_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("strict_timing").parse_next(input)?;

    cut_err(input, |input| {
        let body = block(input)?;
        Ok(Some(types::Stmt::StrictTiming { body }))
    })
}

/// `pass ";"` — contributes no statement; lets empty blocks round-trip.
fn pass_stmt<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    keyword("pass").parse_next(input)?;
    cut_err(input, |input| {
        semicolon(input)?;
        Ok(None)
    })
}

/// Dispatch on the leading keyword; falls back to assignment.
fn statement<'src>(input: &mut Input<'src>) -> IResult<Option<types::Stmt>> {
    let checkpoint = input.checkpoint();
    let leading = any::<_, ErrMode<ContextError<Context>>>
        .parse_next(input)
        .ok()
        .map(|t| t.token.clone());
    input.reset(&checkpoint);

    match leading {
        Some(Token::Identifier("declare")) => declare_stmt(input),
        Some(Token::Identifier("stream")) => stream_decl_stmt(input),
        Some(Token::Identifier("play")) => play_stmt(input),
        Some(Token::Identifier("measure")) => measure_stmt(input),
        Some(Token::Identifier("wait")) => wait_stmt(input),
        Some(Token::Identifier("save")) => save_stmt(input),
        Some(Token::Identifier("process")) => process_stmt(input),
        Some(Token::Identifier("if")) => if_stmt(input),
        Some(Token::Identifier("for")) => for_stmt(input),
        Some(Token::Identifier("for_each")) => for_each_stmt(input),
        Some(Token::Identifier("strict_timing")) => strict_timing_stmt(input),
        Some(Token::Identifier("pass")) => pass_stmt(input),
        _ => assign_stmt(input),
    }
}

/// `"{" stmt* "}"`, dropping `pass` contributions.
fn block<'src>(input: &mut Input<'src>) -> IResult<Vec<types::Stmt>> {
    symbol(Token::LBrace)
        .context(Context::Label("opening brace '{'"))
        .parse_next(input)?;

    let statements: Vec<Option<types::Stmt>> = repeat(0.., statement).parse_next(input)?;

    symbol(Token::RBrace)
        .context(Context::Label("closing brace '}'"))
        .parse_next(input)?;

    Ok(statements.into_iter().flatten().collect())
}

/// `"program" block`
fn script<'src>(input: &mut Input<'src>) -> IResult<types::Script> {
    keyword("program")
        .context(Context::Label("program keyword"))
        .parse_next(input)?;

    cut_err(input, |input| {
        let body = block(input)?;
        Ok(types::Script { body })
    })
}

/// Utility function to convert winnow errors to our diagnostic format.
///
/// Extracts position information from error context (StartOffset) and
/// calculates precise error spans using the token array.
fn convert_error(
    error: ErrMode<ContextError<Context>>,
    tokens: &[PositionedToken],
    current_remaining: usize,
) -> Diagnostic {
    let start_remaining = match &error {
        ErrMode::Backtrack(e) | ErrMode::Cut(e) => e.context().find_map(|ctx| match ctx {
            Context::StartOffset(n) => Some(*n),
            _ => None,
        }),
        _ => None,
    };

    let end_offset = tokens.len() - current_remaining;
    let start_offset = start_remaining.map(|r| tokens.len() - r).unwrap_or(0);

    match error {
        ErrMode::Backtrack(e) | ErrMode::Cut(e) => {
            let contexts: Vec<String> = e
                .context()
                .filter_map(|ctx| match ctx {
                    Context::Label(label) => Some(format!("expected {label}")),
                    _ => None,
                })
                .collect();

            let message = if contexts.is_empty() {
                "unexpected token or end of input".to_string()
            } else {
                contexts.join(", ")
            };

            let error_span = if tokens.is_empty() {
                Span::default()
            } else {
                let examine_range = if start_offset < end_offset {
                    start_offset..end_offset
                } else if end_offset < tokens.len() {
                    end_offset..end_offset + 1
                } else {
                    0..tokens.len()
                };
                let slice = &tokens[examine_range];
                slice[0].span.union(slice[slice.len() - 1].span)
            };

            Diagnostic::error(format!("unexpected token: {message}"))
                .with_code(ErrorCode::E100)
                .with_label(error_span, "unexpected token")
                .with_help("check syntax against the canonical grammar")
        }
        ErrMode::Incomplete(_) => {
            // Not reachable with complete input, kept for exhaustiveness.
            let error_span = tokens.last().map(|t| t.span).unwrap_or_default();

            Diagnostic::error("incomplete input, more tokens expected")
                .with_code(ErrorCode::E101)
                .with_label(error_span, "incomplete")
                .with_help("ensure input is complete")
        }
    }
}

/// Build a parsed script from tokens.
///
/// Fails with [`ErrorCode::E100`] on unexpected tokens, including trailing
/// tokens after the closing brace, and [`ErrorCode::E101`] when the input
/// ends mid-construct.
pub(crate) fn build_script<'src>(
    tokens: &'src [PositionedToken<'src>],
) -> Result<types::Script, Diagnostic> {
    let mut token_slice = TokenSlice::new(tokens);

    match script(&mut token_slice) {
        Ok(parsed) => {
            let remaining = token_slice.eof_offset();
            if remaining == 0 {
                Ok(parsed)
            } else {
                let trailing_span = tokens[tokens.len() - remaining].span;
                Err(Diagnostic::error("unexpected tokens after program body")
                    .with_code(ErrorCode::E100)
                    .with_label(trailing_span, "unexpected token")
                    .with_help("remove text after the closing brace"))
            }
        }
        Err(e) => {
            let current_remaining = token_slice.eof_offset();
            Err(convert_error(e, tokens, current_remaining))
        }
    }
}
