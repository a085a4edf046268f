//! Lexer for code-block expressions using logos

use crate::error::{TokenError, TokenResult};
use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Lexeme<'src> {
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice())]
    Ident(&'src str),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        &s[1..s.len() - 1]
    })]
    String(&'src str),

    #[regex(r"'([^'\\]|\\.)*'", |lex| {
        let s = lex.slice();
        &s[1..s.len() - 1]
    })]
    SingleQuoteString(&'src str),

    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice())]
    Number(&'src str),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Lte,
    #[token(">")]
    Gt,
    #[token(">=")]
    Gte,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
}

/// Lex an expression into lexemes with byte spans
pub fn lex(source: &str) -> TokenResult<Vec<(Lexeme<'_>, Range<usize>)>> {
    Lexeme::lexer(source)
        .spanned()
        .map(|(result, span)| match result {
            Ok(lexeme) => Ok((lexeme, span)),
            Err(_) => Err(TokenError::invalid_expression(
                source,
                span.start,
                "Unexpected character",
            )),
        })
        .collect()
}

/// Resolve backslash escapes inside a string literal body
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_operators_and_paths() {
        let lexemes: Vec<_> = lex("db.users.age >= 18 && !x")
            .unwrap()
            .into_iter()
            .map(|(lexeme, _)| lexeme)
            .collect();

        assert_eq!(
            lexemes,
            vec![
                Lexeme::Ident("db"),
                Lexeme::Dot,
                Lexeme::Ident("users"),
                Lexeme::Dot,
                Lexeme::Ident("age"),
                Lexeme::Gte,
                Lexeme::Number("18"),
                Lexeme::And,
                Lexeme::Bang,
                Lexeme::Ident("x"),
            ]
        );
    }

    #[test]
    fn test_lex_strings() {
        let lexemes = lex(r#""a \"b\"" 'c'"#).unwrap();
        assert_eq!(lexemes[0].0, Lexeme::String(r#"a \"b\""#));
        assert_eq!(lexemes[1].0, Lexeme::SingleQuoteString("c"));
        assert_eq!(unescape(r#"a \"b\""#), r#"a "b""#);
    }

    #[test]
    fn test_lex_error_reports_position() {
        let err = lex("a # b").unwrap_err();
        assert!(matches!(err, TokenError::InvalidExpression { pos: 2, .. }));
    }
}
