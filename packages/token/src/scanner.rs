use crate::error::TokenResult;
use crate::expr::parse_expression;
use crate::path::Alternative;
use crate::token::{ArrayToken, CodeBlockToken, ObjectToken, Token, ValueKind};
use bindery_source::BindingPatterns;
use regex::Captures;

/// Compile binding text as plain text
pub fn compile(text: &str, patterns: &BindingPatterns) -> TokenResult<Token> {
    compile_as(text, patterns, ValueKind::Text)
}

/// Compile binding text, converting constants and mixed text to `kind`.
///
/// At each position the earliest match of either pattern wins; when both match at
/// the same offset the object form is taken.
pub fn compile_as(text: &str, patterns: &BindingPatterns, kind: ValueKind) -> TokenResult<Token> {
    let mut parts = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        let object = patterns.object.captures(rest).filter(non_empty);
        let code_block = patterns.code_block.captures(rest).filter(non_empty);

        let (captures, is_object) = match (object, code_block) {
            (Some(o), Some(c)) => {
                if c.get(0).map_or(0, |m| m.start()) < o.get(0).map_or(0, |m| m.start()) {
                    (c, false)
                } else {
                    (o, true)
                }
            }
            (Some(o), None) => (o, true),
            (None, Some(c)) => (c, false),
            (None, None) => break,
        };

        let Some(whole) = captures.get(0) else {
            break;
        };
        if whole.start() > 0 {
            parts.push(Token::Value(serde_json::Value::String(
                rest[..whole.start()].to_string(),
            )));
        }
        let body = captures.get(1).map_or("", |m| m.as_str());
        parts.push(if is_object {
            Token::Object(ObjectToken::new(whole.as_str(), Alternative::parse_all(body)?))
        } else {
            Token::CodeBlock(CodeBlockToken::new(whole.as_str(), parse_expression(body.trim())?))
        });
        pos += whole.end();
    }
    if pos < text.len() {
        parts.push(Token::Value(serde_json::Value::String(text[pos..].to_string())));
    }

    Ok(match parts.len() {
        0 => Token::Value(kind.parse("")),
        1 => match parts.remove(0) {
            Token::Value(value) => Token::Value(kind.parse(value.as_str().unwrap_or_default())),
            binding if kind == ValueKind::Text => binding,
            binding => Token::Array(ArrayToken::new(vec![binding], kind)),
        },
        _ => Token::Array(ArrayToken::new(parts, kind)),
    })
}

fn non_empty(captures: &Captures<'_>) -> bool {
    captures.get(0).is_some_and(|m| !m.is_empty())
}
