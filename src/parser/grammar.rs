//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::parser::ast::*;
use crate::parser::lexer::{lex, Token};

/// Parse one fragment of template source into an AST
///
/// `name` identifies the fragment (`-` for a template body, `context`,
/// `parameter`) and is carried on the resulting [`File`].
pub fn parse(name: &str, input: &str) -> Result<File, Vec<crate::ParseError>> {
    let len = input.len();
    let tokens = lex(input)?;

    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    file_parser()
        .parse(token_stream)
        .into_result()
        .map(|body| File {
            name: name.to_string(),
            body,
        })
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

/// Decode the raw body of a string literal
///
/// Handles JSON escapes (including surrogate pairs) and splits `\(a.b)`
/// interpolations into reference parts.
fn decode_string(raw: &str, span: Span) -> Result<Expr, String> {
    let mut parts = Vec::new();
    let mut buf = String::new();
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            buf.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => buf.push('"'),
            Some('\\') => buf.push('\\'),
            Some('/') => buf.push('/'),
            Some('n') => buf.push('\n'),
            Some('t') => buf.push('\t'),
            Some('r') => buf.push('\r'),
            Some('b') => buf.push('\u{8}'),
            Some('f') => buf.push('\u{c}'),
            Some('u') => {
                let high = read_hex4(&mut chars)?;
                let code = if (0xD800..0xDC00).contains(&high) {
                    if chars.next() != Some('\\') || chars.next() != Some('u') {
                        return Err("unpaired surrogate in unicode escape".to_string());
                    }
                    let low = read_hex4(&mut chars)?;
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err("invalid low surrogate in unicode escape".to_string());
                    }
                    0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                } else {
                    high
                };
                let ch = char::from_u32(code)
                    .ok_or_else(|| format!("invalid unicode escape \\u{:04x}", code))?;
                buf.push(ch);
            }
            Some('(') => {
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some(')') => break,
                        Some(c) => inner.push(c),
                        None => return Err("unterminated interpolation".to_string()),
                    }
                }
                let segments = interpolation_path(inner.trim(), &span)?;
                if !buf.is_empty() {
                    parts.push(StringPart::Literal(std::mem::take(&mut buf)));
                }
                parts.push(StringPart::Reference(segments));
            }
            Some(other) => return Err(format!("invalid escape sequence '\\{}'", other)),
            None => return Err("trailing backslash in string".to_string()),
        }
    }

    if parts.is_empty() {
        return Ok(Expr::String(buf));
    }
    if !buf.is_empty() {
        parts.push(StringPart::Literal(buf));
    }
    Ok(Expr::Interpolation(parts))
}

fn read_hex4(chars: &mut std::str::Chars<'_>) -> Result<u32, String> {
    let digits: String = chars.take(4).collect();
    if digits.len() != 4 {
        return Err("truncated unicode escape".to_string());
    }
    u32::from_str_radix(&digits, 16).map_err(|_| format!("invalid unicode escape \\u{}", digits))
}

/// Interpolations only accept dotted references: `\(context.name)`
fn interpolation_path(inner: &str, span: &Span) -> Result<Vec<Spanned<Identifier>>, String> {
    let is_ident = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    };

    let segments: Vec<&str> = inner.split('.').map(str::trim).collect();
    if segments.iter().any(|s| !is_ident(s)) || segments[0] == "_" {
        return Err(format!(
            "interpolation '\\({})' must be a dotted reference",
            inner
        ));
    }
    Ok(segments
        .into_iter()
        .map(|s| Spanned::new(Identifier::new(s), span.clone()))
        .collect())
}

/// Integer literal with its sign applied, widened to a float when it does not
/// fit in an i64
fn integer_literal(negative: bool, digits: &str) -> Option<Expr> {
    let text = if negative {
        format!("-{}", digits)
    } else {
        digits.to_string()
    };
    match text.parse::<i64>() {
        Ok(i) => Some(Expr::Int(i)),
        Err(_) => text.parse::<f64>().ok().map(Expr::Float),
    }
}

/// Fields of a struct body, separated by optional commas
///
/// Supports the nested shorthand `a: b: value`.
fn field_list<'a, I, L, X>(
    label: L,
    value: X,
) -> impl Parser<'a, I, Vec<Spanned<Field>>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
    L: Parser<'a, I, Spanned<Identifier>, extra::Err<Rich<'a, Token>>> + Clone + 'a,
    X: Parser<'a, I, Spanned<Expr>, extra::Err<Rich<'a, Token>>> + Clone + 'a,
{
    let field = recursive(|field| {
        label
            .then(just(Token::Question).or_not().map(|q| q.is_some()))
            .then_ignore(just(Token::Colon))
            .then(choice((
                // Nested shorthand must be tried first: `a: b: 1`
                field.map_with(|f: Spanned<Field>, e| {
                    Spanned::new(Expr::Struct(vec![f]), span_range(&e.span()))
                }),
                value,
            )))
            .map_with(|((label, optional), value), e| {
                Spanned::new(
                    Field {
                        label,
                        optional,
                        value,
                    },
                    span_range(&e.span()),
                )
            })
    });

    field
        .then_ignore(just(Token::Comma).or_not())
        .repeated()
        .collect::<Vec<_>>()
}

fn file_parser<'a, I>() -> impl Parser<'a, I, Spanned<Expr>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    // Keywords may still be used as field names
    let keyword_label = select! {
        Token::True => "true",
        Token::False => "false",
        Token::Null => "null",
        Token::KindString => "string",
        Token::KindInt => "int",
        Token::KindFloat => "float",
        Token::KindNumber => "number",
        Token::KindBool => "bool",
    }
    .map(str::to_string);

    let quoted_label = select! {
        Token::String(s) => s,
    }
    .try_map(|raw, span: SimpleSpan| match decode_string(&raw, span_range(&span)) {
        Ok(Expr::String(s)) => Ok(s),
        Ok(_) => Err(Rich::custom(span, "interpolation is not allowed in a label")),
        Err(message) => Err(Rich::custom(span, message)),
    });

    let label = choice((
        select! { Token::Ident(s) => s },
        keyword_label,
        quoted_label,
    ))
    .map_with(|s, e| Spanned::new(Identifier::new(s), span_range(&e.span())));

    let identifier = select! {
        Token::Ident(s) => Identifier::new(s),
    }
    .map_with(|id, e| Spanned::new(id, span_range(&e.span())));

    // Reference: identifier { "." label }
    let reference = identifier
        .then(
            just(Token::Dot)
                .ignore_then(label.clone())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(first, rest)| {
            let mut segments = vec![first];
            segments.extend(rest);
            Expr::Reference(segments)
        });

    // Numbers (including negative via Minus token)
    let sign = just(Token::Minus).or_not().map(|minus| minus.is_some());
    let integer = sign
        .clone()
        .then(select! { Token::Int(digits) => digits })
        .try_map(|(negative, digits), span: SimpleSpan| {
            integer_literal(negative, &digits)
                .ok_or_else(|| Rich::custom(span, format!("invalid number {}", digits)))
        });
    let float = sign
        .then(select! { Token::Float(f) => f })
        .map(|(negative, f)| Expr::Float(if negative { -f } else { f }));
    let number = choice((integer, float));

    let string = select! {
        Token::String(s) => s,
    }
    .try_map(|raw, span: SimpleSpan| {
        decode_string(&raw, span_range(&span)).map_err(|message| Rich::custom(span, message))
    });

    let literal = select! {
        Token::True => Expr::Bool(true),
        Token::False => Expr::Bool(false),
        Token::Null => Expr::Null,
        Token::Underscore => Expr::Top,
        Token::KindString => Expr::Kind(Kind::String),
        Token::KindInt => Expr::Kind(Kind::Int),
        Token::KindFloat => Expr::Kind(Kind::Float),
        Token::KindNumber => Expr::Kind(Kind::Number),
        Token::KindBool => Expr::Kind(Kind::Bool),
    };

    let expr = recursive(|expr| {
        let structure = field_list(label.clone(), expr.clone())
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
            .map(Expr::Struct);

        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::List);

        let primary = choice((
            literal.clone(),
            number.clone(),
            string.clone(),
            reference.clone(),
            structure,
            list,
        ))
        .map_with(|node, e| Spanned::new(node, span_range(&e.span())))
        .or(expr
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)));

        // `&` binds tighter than `|`
        let conjunction = primary
            .separated_by(just(Token::Amp))
            .at_least(1)
            .collect::<Vec<_>>()
            .map_with(|mut terms: Vec<Spanned<Expr>>, e| {
                if terms.len() == 1 {
                    terms.remove(0)
                } else {
                    Spanned::new(Expr::Unify(terms), span_range(&e.span()))
                }
            });

        let alternative = just(Token::Star)
            .or_not()
            .then(conjunction)
            .map(|(star, expr)| Alternative {
                default: star.is_some(),
                expr,
            });

        alternative
            .separated_by(just(Token::Pipe))
            .at_least(1)
            .collect::<Vec<_>>()
            .map_with(|mut alts: Vec<Alternative>, e| {
                if alts.len() == 1 && !alts[0].default {
                    alts.remove(0).expr
                } else {
                    Spanned::new(Expr::Disjunction(alts), span_range(&e.span()))
                }
            })
            .boxed()
    });

    // A fragment is a struct body without braces
    field_list(label, expr)
        .then_ignore(end())
        .map_with(|fields, e| Spanned::new(Expr::Struct(fields), span_range(&e.span())))
}
