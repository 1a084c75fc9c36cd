//! Lexer for the template language using logos

use logos::Logos;

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Literal keywords
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Type kinds
    #[token("string")]
    KindString,
    #[token("int")]
    KindInt,
    #[token("float")]
    KindFloat,
    #[token("number")]
    KindNumber,
    #[token("bool")]
    KindBool,

    // Top value
    #[token("_")]
    Underscore,

    // Operators
    #[token("|")]
    Pipe,
    #[token("&")]
    Amp,
    #[token("*")]
    Star,
    #[token("?")]
    Question,
    #[token("-")]
    Minus,

    // Delimiters
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    /// Raw string body between the quotes; escapes and interpolations are
    /// decoded by the grammar
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    String(String),

    /// Decimal digits; the grammar applies the sign before narrowing
    #[regex(r"[0-9]+", |lex| lex.slice().to_string())]
    Int(String),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    // Comments (skip)
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,
}

/// Lex input string into tokens with spans
///
/// Unrecognised input is reported as syntax errors rather than silently
/// dropped.
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, Vec<ParseError>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (tok, span) in Token::lexer(input).spanned() {
        match tok {
            Ok(t) => tokens.push((t, span)),
            Err(()) => errors.push(ParseError::Syntax {
                message: format!("Unrecognised input '{}'", &input[span.clone()]),
                span,
                expected: vec![],
            }),
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}
