//! Object-path parsing and column extraction.
//!
//! The body of an object binding is a `|`-separated list of alternatives. Each
//! alternative is either a literal wrapped in parentheses, `(n/a)`, or a path:
//!
//! ```text
//! namespace.name              existence of the source
//! namespace.name.column       column of every row
//! namespace.name.a.b          nested field a.b, or the column literally named "a.b"
//! namespace.name[my column]   column whose name is not an identifier
//! ```

use crate::error::{TokenError, TokenResult};
use bindery_source::{Row, Source};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Alternative {
    Literal(String),
    Path(ObjectPath),
}

impl Alternative {
    pub fn parse(text: &str) -> TokenResult<Self> {
        let text = text.trim();
        if text.len() >= 2 && text.starts_with('(') && text.ends_with(')') {
            return Ok(Alternative::Literal(text[1..text.len() - 1].to_string()));
        }
        ObjectPath::parse(text).map(Alternative::Path)
    }

    /// Split an object binding body on `|`, ignoring separators inside literals
    pub fn parse_all(body: &str) -> TokenResult<Vec<Self>> {
        let mut alternatives = Vec::new();
        let mut depth = 0usize;
        let mut start = 0;
        for (index, c) in body.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                '|' if depth == 0 => {
                    alternatives.push(Self::parse(&body[start..index])?);
                    start = index + 1;
                }
                _ => {}
            }
        }
        alternatives.push(Self::parse(&body[start..])?);
        Ok(alternatives)
    }
}

/// `namespace.name` plus an optional column
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPath {
    source_id: String,
    column: Option<ColumnPath>,
}

impl ObjectPath {
    pub fn parse(text: &str) -> TokenResult<Self> {
        let text = text.trim();
        let (dotted, bracket) = match text.find('[') {
            Some(open) => {
                let Some(inner) = text[open + 1..].strip_suffix(']') else {
                    return Err(TokenError::malformed_path(text, "unterminated '['"));
                };
                let key = inner.trim().trim_matches(|c| c == '"' || c == '\'');
                if key.is_empty() {
                    return Err(TokenError::malformed_path(text, "empty column in '[...]'"));
                }
                (&text[..open], Some(key.to_string()))
            }
            None => (text, None),
        };

        let segments: Vec<&str> = dotted.split('.').map(str::trim).collect();
        if segments.len() < 2 {
            return Err(TokenError::malformed_path(
                text,
                "expected at least 'namespace.name'",
            ));
        }
        if let Some(segment) = segments.iter().find(|s| !is_identifier(s)) {
            return Err(TokenError::malformed_path(
                text,
                format!("'{}' is not a valid path segment", segment),
            ));
        }

        let source_id = format!("{}.{}", segments[0], segments[1]).to_lowercase();
        let mut column: Vec<String> = segments[2..].iter().map(|s| s.to_string()).collect();
        column.extend(bracket);
        Ok(Self {
            source_id,
            column: (!column.is_empty()).then(|| ColumnPath::from_segments(column)),
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn column(&self) -> Option<&ColumnPath> {
        self.column.as_ref()
    }

    /// Value of this path in `source`; existence paths yield `true`
    pub fn extract(&self, source: &Source) -> JsonValue {
        match &self.column {
            Some(column) => column.extract_from(source),
            None => JsonValue::Bool(true),
        }
    }
}

/// Column selector inside a row
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPath {
    segments: Vec<String>,
}

impl ColumnPath {
    pub fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Nested identifier access first, then the joined path as a single key
    pub fn extract_row(&self, row: &Row) -> Option<JsonValue> {
        let (first, rest) = self.segments.split_first()?;
        let nested = row.get(first).and_then(|value| {
            rest.iter()
                .try_fold(value, |current, segment| current.get(segment.as_str()))
        });
        match nested {
            Some(value) => Some(value.clone()),
            None if !rest.is_empty() => row.get(&self.segments.join(".")).cloned(),
            None => None,
        }
    }

    /// One row yields the value itself, several rows an array, none `null`
    pub fn extract_from(&self, source: &Source) -> JsonValue {
        match source.rows() {
            [] => JsonValue::Null,
            [row] => self.extract_row(row).unwrap_or(JsonValue::Null),
            rows => JsonValue::Array(
                rows.iter()
                    .map(|row| self.extract_row(row).unwrap_or(JsonValue::Null))
                    .collect(),
            ),
        }
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '-')
}
