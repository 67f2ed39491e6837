//! Lexical analyzer for Carillon program text.
//!
//! The lexer converts source text into a stream of [`Token`]s for parsing.
//! Whitespace and `#` line comments are skipped rather than emitted, so the
//! parser only ever sees significant tokens.
//!
//! The public entry point is [`tokenize`], which performs error-recovering
//! lexical analysis and collects all diagnostics in a single pass.

use winnow::{
    Parser as _,
    combinator::{alt, cut_err, opt, preceded, repeat, terminated},
    error::{ContextError, ErrMode, ModalResult},
    stream::{LocatingSlice, Location, Stream},
    token::{literal, none_of, one_of, take_while},
};

use crate::{
    error::{Diagnostic, DiagnosticCollector, ErrorCode, ParseError},
    span::Span,
    tokens::{PositionedToken, Token},
};

/// Rich diagnostic information for lexer errors.
///
/// Attached to winnow errors via `.context()` to provide detailed error
/// messages with codes, help text, and precise span information.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LexerDiagnostic {
    pub code: ErrorCode,
    pub message: &'static str,
    pub help: Option<&'static str>,
    /// The error span covers from `start` to the error position.
    pub start: usize,
}

type Input<'a> = LocatingSlice<&'a str>;
type IResult<'a, O> = ModalResult<O, ContextError<LexerDiagnostic>>;

/// Parse an escape sequence in a string after the backslash.
///
/// Supported escapes: `\n`, `\t`, `\\`, `\"`.
fn string_escape_char<'a>(input: &mut Input<'a>) -> IResult<'a, char> {
    one_of(['n', 't', '\\', '"'])
        .map(|c| match c {
            'n' => '\n',
            't' => '\t',
            '\\' => '\\',
            '"' => '"',
            _ => unreachable!(),
        })
        .parse_next(input)
}

/// Parse an escape sequence in a string starting with backslash.
fn string_escape<'a>(input: &mut Input<'a>) -> IResult<'a, char> {
    let escape_start = input.current_token_start();

    '\\'.parse_next(input)?;

    cut_err(string_escape_char)
        .context(LexerDiagnostic {
            code: ErrorCode::E001,
            message: "invalid escape sequence",
            help: Some("valid escapes: `\\n`, `\\t`, `\\\\`, `\\\"`"),
            start: escape_start,
        })
        .parse_next(input)
}

/// Parse a complete string literal with double quotes.
///
/// Strings may not span lines; a newline before the closing quote is an
/// unterminated string error.
fn string_literal<'a>(input: &mut Input<'a>) -> IResult<'a, Token<'a>> {
    let string_char = none_of(['"', '\\', '\n', '\r']);

    let string_content = repeat(0.., alt((string_escape, string_char)))
        .fold(String::new, |mut acc: String, ch| {
            acc.push(ch);
            acc
        });

    let start_pos = input.current_token_start();

    '"'.parse_next(input)
        .map_err(|_: ErrMode<ContextError<LexerDiagnostic>>| {
            ErrMode::Backtrack(ContextError::new())
        })?;

    // Commit after the opening quote so a missing `"` reports E001
    // anchored at the string start.
    cut_err(terminated(string_content, '"'))
        .context(LexerDiagnostic {
            code: ErrorCode::E001,
            message: "unterminated string literal",
            help: Some("add closing `\"`"),
            start: start_pos,
        })
        .parse_next(input)
        .map(Token::StringLiteral)
}

/// Parse a numeric literal.
///
/// A literal with a fractional part or exponent becomes [`Token::Float`];
/// a bare digit run becomes [`Token::Int`]. The leading sign is never part
/// of the literal (negation is an expression-level operator).
fn number_literal<'a>(input: &mut Input<'a>) -> IResult<'a, Token<'a>> {
    let start_pos = input.current_token_start();

    let text = (
        take_while(1.., |c: char| c.is_ascii_digit()),
        opt(preceded('.', take_while(1.., |c: char| c.is_ascii_digit()))),
        opt((
            one_of(['e', 'E']),
            opt(one_of(['+', '-'])),
            take_while(1.., |c: char| c.is_ascii_digit()),
        )),
    )
        .take()
        .parse_next(input)?;

    let is_float = text.contains('.') || text.contains(['e', 'E']);
    let token = if is_float {
        text.parse::<f64>().ok().map(Token::Float)
    } else {
        text.parse::<i64>().ok().map(Token::Int)
    };

    token.ok_or_else(|| {
        let mut ctx = ContextError::new();
        ctx.push(LexerDiagnostic {
            code: ErrorCode::E003,
            message: "invalid numeric literal",
            help: Some("integer literals must fit in a signed 64-bit value"),
            start: start_pos,
        });
        ErrMode::Cut(ctx)
    })
}

/// Parse identifiers.
///
/// Keywords are lexed as identifiers; the parser decides which identifier
/// positions are keywords.
fn identifier<'a>(input: &mut Input<'a>) -> IResult<'a, Token<'a>> {
    take_while(1.., |c: char| {
        c.is_ascii_alphabetic() || c == '_' || c.is_ascii_digit()
    })
    .verify(|s: &str| {
        s.chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    })
    .map(Token::Identifier)
    .parse_next(input)
}

/// Parse multi-character operators (order matters - longest first)
fn multi_char_operator<'a>(input: &mut Input<'a>) -> IResult<'a, Token<'a>> {
    alt((
        literal("<<").value(Token::Shl),
        literal(">>").value(Token::Shr),
        literal("==").value(Token::EqEq),
        literal("<=").value(Token::Le),
        literal(">=").value(Token::Ge),
    ))
    .parse_next(input)
}

/// Parse single character tokens
fn single_char_token<'a>(input: &mut Input<'a>) -> IResult<'a, Token<'a>> {
    // Nested alts because winnow's alt tuples hold at most 9 parsers.
    alt((
        alt((
            '+'.value(Token::Plus),
            '-'.value(Token::Minus),
            '*'.value(Token::Star),
            '/'.value(Token::Slash),
            '|'.value(Token::Pipe),
            '&'.value(Token::Amp),
            '^'.value(Token::Caret),
        )),
        alt((
            '<'.value(Token::Lt),
            '>'.value(Token::Gt),
            '='.value(Token::Equals),
            '!'.value(Token::Bang),
            '('.value(Token::LParen),
            ')'.value(Token::RParen),
            '{'.value(Token::LBrace),
        )),
        alt((
            '}'.value(Token::RBrace),
            '['.value(Token::LBracket),
            ']'.value(Token::RBracket),
            ';'.value(Token::Semicolon),
            ':'.value(Token::Colon),
            ','.value(Token::Comma),
            '.'.value(Token::Dot),
        )),
    ))
    .parse_next(input)
}

/// Parse a single token with position tracking
fn positioned_token<'a>(input: &mut Input<'a>) -> IResult<'a, PositionedToken<'a>> {
    let start_pos = input.current_token_start();

    let token = alt((
        string_literal,      // Must come before any single char
        number_literal,      // Must come before `.` and identifier
        identifier,          // Must come before single chars
        multi_char_operator, // Must come before single char operators
        single_char_token,
    ))
    .parse_next(input)?;

    let end_pos = input.current_token_start();
    let span = Span::new(start_pos..end_pos);

    Ok(PositionedToken::new(token, span))
}

/// Skip whitespace and `#` line comments.
fn skip_trivia(input: &mut Input<'_>) {
    loop {
        let _: IResult<'_, &str> =
            take_while(0.., |c: char| c.is_whitespace()).parse_next(input);

        let comment: IResult<'_, &str> =
            preceded('#', take_while(0.., |c| c != '\n')).parse_next(input);
        if comment.is_err() {
            break;
        }
    }
}

/// Lexer that accumulates tokens and diagnostics during tokenization.
struct Lexer<'a> {
    tokens: Vec<PositionedToken<'a>>,
    diagnostics: DiagnosticCollector,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer.
    fn new() -> Self {
        Self {
            tokens: Vec::new(),
            diagnostics: DiagnosticCollector::new(),
        }
    }

    /// Tokenize the input, collecting tokens and errors.
    fn tokenize(&mut self, mut input: Input<'a>) {
        loop {
            skip_trivia(&mut input);
            if input.is_empty() {
                break;
            }
            match positioned_token(&mut input) {
                Ok(token) => {
                    self.tokens.push(token);
                }
                Err(e) => {
                    let error_pos = input.current_token_start();

                    let diagnostic = Self::convert_err_mode(e, error_pos);
                    self.diagnostics.emit(diagnostic);

                    // Skip one character and keep lexing so later errors are
                    // still reported.
                    if !input.is_empty() {
                        input.next_token();
                    }
                }
            }
        }
    }

    /// Finish lexing and return tokens or collected errors.
    fn finish(self) -> Result<Vec<PositionedToken<'a>>, ParseError> {
        self.diagnostics.finish().map(|()| self.tokens)
    }

    /// Convert an ErrMode and error position to a Diagnostic.
    ///
    /// Extracts `LexerDiagnostic` from the error context for rich error info
    /// with code, message, and help. Falls back to E002 (unexpected character)
    /// if no diagnostic context is found.
    fn convert_err_mode(
        err: ErrMode<ContextError<LexerDiagnostic>>,
        error_pos: usize,
    ) -> Diagnostic {
        let context_error = match err {
            ErrMode::Backtrack(ctx) | ErrMode::Cut(ctx) => ctx,
            ErrMode::Incomplete(_) => ContextError::new(),
        };

        if let Some(LexerDiagnostic {
            code,
            message,
            help,
            start,
        }) = context_error.context().next()
        {
            let span = Span::new(*start..error_pos);

            let mut diag = Diagnostic::error(*message)
                .with_code(*code)
                .with_label(span, code.description());
            if let Some(h) = help {
                diag = diag.with_help(*h);
            }
            return diag;
        }

        let span = Span::new(error_pos..error_pos.saturating_add(1));
        Diagnostic::error("unexpected character")
            .with_code(ErrorCode::E002)
            .with_label(span, ErrorCode::E002.description())
    }
}

/// Parse tokens from a string input, collecting multiple errors.
///
/// Attempts to recover from errors and continue tokenizing, collecting
/// all errors encountered. This reports multiple issues in a single pass
/// instead of stopping at the first one.
///
/// # Returns
///
/// - `Ok(tokens)` - All tokens successfully parsed
/// - `Err(ParseError)` - One or more errors occurred; contains all diagnostics
pub fn tokenize(input: &str) -> Result<Vec<PositionedToken<'_>>, ParseError> {
    let located_input = LocatingSlice::new(input);
    let mut lexer = Lexer::new();
    lexer.tokenize(located_input);
    lexer.finish()
}
