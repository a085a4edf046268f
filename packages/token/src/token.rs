use crate::error::TokenResult;
use crate::expr::{evaluate, Expr, SourceScope};
use crate::path::Alternative;
use bindery_source::{display_value, is_empty_value, Context, Source};
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::trace;

/// Target type a binding's text is converted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    #[default]
    Text,
    Integer,
}

impl ValueKind {
    /// Convert text to this kind; text that is not an integer reads as `null`
    pub fn parse(&self, text: &str) -> JsonValue {
        match self {
            ValueKind::Text => JsonValue::String(text.to_string()),
            ValueKind::Integer => text
                .trim()
                .parse::<i64>()
                .map_or(JsonValue::Null, JsonValue::from),
        }
    }
}

/// Compiled binding text
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Constant, already converted to its kind
    Value(JsonValue),
    Object(ObjectToken),
    CodeBlock(CodeBlockToken),
    /// Mixed literal text and bindings, concatenated as text
    Array(ArrayToken),
}

impl Token {
    /// Lowercased ids of every source this token reads, without evaluating it
    pub fn source_names(&self) -> BTreeSet<String> {
        match self {
            Token::Value(_) => BTreeSet::new(),
            Token::Object(object) => object.source_names(),
            Token::CodeBlock(block) => block.source_names(),
            Token::Array(array) => array
                .parts
                .iter()
                .flat_map(|part| part.source_names())
                .collect(),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Token::Value(_))
    }

    /// Evaluate against `context`.
    ///
    /// With `wait`, missing sources that are not reserved suspend the evaluation until
    /// they are set.
    pub fn get_value<'a>(
        &'a self,
        context: &'a Context,
        wait: bool,
    ) -> LocalBoxFuture<'a, TokenResult<JsonValue>> {
        async move {
            match self {
                Token::Value(value) => Ok(value.clone()),
                Token::Object(object) => object.get_value(context, wait).await,
                Token::CodeBlock(block) => block.get_value(context, wait).await,
                Token::Array(array) => array.get_value(context, wait).await,
            }
        }
        .boxed_local()
    }

    /// Evaluate and render the value as display text
    pub async fn get_string(&self, context: &Context, wait: bool) -> TokenResult<String> {
        Ok(display_value(&self.get_value(context, wait).await?))
    }
}

/// `[##path|fallback|(literal)##]`
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectToken {
    raw: String,
    alternatives: Vec<Alternative>,
}

impl ObjectToken {
    pub fn new(raw: impl Into<String>, alternatives: Vec<Alternative>) -> Self {
        Self {
            raw: raw.into(),
            alternatives,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }

    pub fn source_names(&self) -> BTreeSet<String> {
        self.alternatives
            .iter()
            .filter_map(|alternative| match alternative {
                Alternative::Path(path) => Some(path.source_id().to_string()),
                Alternative::Literal(_) => None,
            })
            .collect()
    }

    /// First alternative with a non-empty value wins; only the last one may wait
    pub async fn get_value(&self, context: &Context, wait: bool) -> TokenResult<JsonValue> {
        let last = self.alternatives.len().saturating_sub(1);
        for (index, alternative) in self.alternatives.iter().enumerate() {
            match alternative {
                Alternative::Literal(text) => {
                    if !text.is_empty() {
                        return Ok(JsonValue::String(text.clone()));
                    }
                }
                Alternative::Path(path) => {
                    let may_wait = wait && index == last;
                    let Some(source) = resolve_source(context, path.source_id(), may_wait).await?
                    else {
                        continue;
                    };
                    let value = path.extract(&source);
                    if !is_empty_value(&value) {
                        return Ok(value);
                    }
                }
            }
        }
        trace!(binding = %self.raw, "Object binding resolved to no value");
        Ok(JsonValue::Null)
    }
}

/// `{## expression ##}`
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlockToken {
    raw: String,
    expr: Expr,
    sources: BTreeSet<String>,
}

impl CodeBlockToken {
    pub fn new(raw: impl Into<String>, expr: Expr) -> Self {
        let sources = expr.source_ids();
        Self {
            raw: raw.into(),
            expr,
            sources,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn source_names(&self) -> BTreeSet<String> {
        self.sources.clone()
    }

    /// Capture every referenced source, then evaluate the expression over them
    pub async fn get_value(&self, context: &Context, wait: bool) -> TokenResult<JsonValue> {
        let mut scope = SourceScope::new();
        for id in &self.sources {
            if let Some(source) = resolve_source(context, id, wait).await? {
                scope.insert(source);
            }
        }
        Ok(evaluate(&self.expr, &scope))
    }
}

/// Literal text interleaved with bindings
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayToken {
    parts: Vec<Token>,
    kind: ValueKind,
}

impl ArrayToken {
    pub fn new(parts: Vec<Token>, kind: ValueKind) -> Self {
        Self { parts, kind }
    }

    pub fn parts(&self) -> &[Token] {
        &self.parts
    }

    pub async fn get_value(&self, context: &Context, wait: bool) -> TokenResult<JsonValue> {
        let mut text = String::new();
        for part in &self.parts {
            text.push_str(&part.get_string(context, wait).await?);
        }
        Ok(self.kind.parse(&text))
    }
}

async fn resolve_source(
    context: &Context,
    id: &str,
    wait: bool,
) -> TokenResult<Option<Rc<Source>>> {
    if let Some(source) = context.try_to_get_source(id) {
        return Ok(Some(source));
    }
    if !wait || context.is_reserved(id) {
        return Ok(None);
    }
    Ok(Some(context.wait_to_get_source(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::compile;
    use bindery_source::Options;
    use serde_json::json;

    fn context() -> Context {
        Context::new(Options::default()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_source_without_wait_is_empty() {
        let ctx = context();
        let token = compile("[##a.b.x##]", ctx.patterns()).unwrap();
        assert_eq!(token.get_string(&ctx, false).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_wait_resolves_after_set() {
        let ctx = context();
        let token = compile("[##a.b.x##]", ctx.patterns()).unwrap();

        let (value, _) = tokio::join!(token.get_string(&ctx, true), async {
            ctx.set_as_source("a.b", json!({"x": 5}));
        });
        assert_eq!(value.unwrap(), "5");
    }

    #[tokio::test]
    async fn test_fallbacks_and_literal() {
        let ctx = context();
        ctx.set_as_source("db.guests", json!({"name": "guest"}));
        ctx.set_as_source("db.users", json!({"name": ""}));

        let token = compile("[##db.users.name|db.guests.name##]", ctx.patterns()).unwrap();
        assert_eq!(token.get_string(&ctx, false).await.unwrap(), "guest");

        let token = compile("[##db.nobody.name|(anonymous)##]", ctx.patterns()).unwrap();
        assert_eq!(token.get_string(&ctx, true).await.unwrap(), "anonymous");
    }

    #[tokio::test]
    async fn test_missing_column_over_many_rows_falls_through() {
        let ctx = context();
        ctx.set_as_source("db.users", json!([{"name": "a"}, {"name": "b"}]));

        let token = compile("[##db.users.nick|(anon)##]", ctx.patterns()).unwrap();
        assert_eq!(token.get_string(&ctx, false).await.unwrap(), "anon");
    }

    #[tokio::test]
    async fn test_bracket_column() {
        let ctx = context();
        ctx.set_as_source("db.users", json!({"display name": "Ada"}));
        let token = compile("Hi [##db.users[display name]##]!", ctx.patterns()).unwrap();
        assert_eq!(token.get_string(&ctx, false).await.unwrap(), "Hi Ada!");
    }

    #[tokio::test]
    async fn test_reserved_namespace_never_waits() {
        let ctx = context();
        let token = compile("[##cms.page.title##]", ctx.patterns()).unwrap();
        assert_eq!(token.get_value(&ctx, true).await.unwrap(), JsonValue::Null);
    }

    #[tokio::test]
    async fn test_array_and_code_block() {
        let ctx = context();
        ctx.set_as_source("db.users", json!([{"name": "a"}, {"name": "b"}]));

        let token = compile(
            "Users: [##db.users.name##] ({## len(db.users.name) ##})",
            ctx.patterns(),
        )
        .unwrap();
        assert_eq!(token.source_names().len(), 1);
        assert_eq!(token.get_string(&ctx, false).await.unwrap(), "Users: a,b (2)");
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(ValueKind::Integer.parse(" 42 "), json!(42));
        assert_eq!(ValueKind::Integer.parse("x"), JsonValue::Null);
        assert_eq!(ValueKind::Integer.parse("1.5"), JsonValue::Null);
    }
}
