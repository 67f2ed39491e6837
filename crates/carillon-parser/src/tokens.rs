//! Token types for the canonical Carillon script text.

use std::fmt;

use winnow::stream::Location;

use crate::span::Span;

/// Token types for the Carillon script language.
///
/// Keywords are lexed as [`Token::Identifier`]; the parser matches them by
/// name, so the reserved-word list lives in one place
/// ([`crate::is_reserved_word`]).
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    // Literals
    Int(i64),
    Float(f64),
    Identifier(&'src str),
    StringLiteral(String),

    // Operators
    Plus,   // +
    Minus,  // -
    Star,   // *
    Slash,  // /
    Pipe,   // |
    Amp,    // &
    Caret,  // ^
    Shl,    // <<
    Shr,    // >>
    EqEq,   // ==
    Le,     // <=
    Ge,     // >=
    Lt,     // <
    Gt,     // >
    Equals, // =
    Bang,   // !

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Semicolon, // ;
    Colon,     // :
    Comma,     // ,
    Dot,       // .
}

/// A token with position information for winnow integration.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedToken<'src> {
    pub token: Token<'src>,
    pub span: Span,
}

impl<'src> PositionedToken<'src> {
    pub fn new(token: Token<'src>, span: Span) -> Self {
        Self { token, span }
    }
}

impl<'src> std::ops::Deref for PositionedToken<'src> {
    type Target = Token<'src>;

    fn deref(&self) -> &Self::Target {
        &self.token
    }
}

impl<'src> AsRef<Token<'src>> for PositionedToken<'src> {
    fn as_ref(&self) -> &Token<'src> {
        &self.token
    }
}

impl Location for PositionedToken<'_> {
    fn previous_token_end(&self) -> usize {
        self.span.start()
    }

    fn current_token_start(&self) -> usize {
        self.span.start()
    }
}

impl fmt::Display for PositionedToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.token.fmt(f)
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(v) => write!(f, "{v}"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Identifier(name) => write!(f, "{name}"),
            Token::StringLiteral(s) => write!(f, "\"{s}\""),

            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Pipe => write!(f, "|"),
            Token::Amp => write!(f, "&"),
            Token::Caret => write!(f, "^"),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::EqEq => write!(f, "=="),
            Token::Le => write!(f, "<="),
            Token::Ge => write!(f, ">="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Equals => write!(f, "="),
            Token::Bang => write!(f, "!"),

            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
        }
    }
}
