use crate::template::take_template;
use bindery_dom::Node;
use bindery_runtime::{RuntimeError, RuntimeResult};
use bindery_source::{BindingPatterns, Context, Source};
use bindery_token::expr::is_truthy;
use bindery_token::{compile, evaluate, parse_expression, Expr, RowScope, SourceScope, Token};
use std::collections::{BTreeSet, HashSet};
use tracing::trace;

/// Parity of a matched row; the first matched row is odd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowType {
    Odd,
    Even,
}

impl RowType {
    pub fn parse(value: &str) -> RuntimeResult<Option<Self>> {
        match value.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "odd" => Ok(Some(RowType::Odd)),
            "even" => Ok(Some(RowType::Even)),
            other => Err(RuntimeError::InvalidMarkup(format!(
                "rowtype must be 'odd' or 'even', got '{}'",
                other
            ))),
        }
    }

    /// Parity of the row following `matched` earlier matches
    pub fn for_counter(matched: usize) -> Self {
        if matched % 2 == 0 {
            RowType::Odd
        } else {
            RowType::Even
        }
    }
}

/// A row template with its selection attributes, as declared in markup
#[derive(Debug)]
pub struct Face {
    index: usize,
    level: Option<Token>,
    row_type: Option<Token>,
    filter: Option<Filter>,
    template: Vec<Node>,
}

/// A constant filter is parsed once; a bound one is parsed after every resolve
#[derive(Debug)]
enum Filter {
    Parsed(Expr),
    Bound(Token),
}

impl Filter {
    fn from_token(token: Token) -> RuntimeResult<Option<Self>> {
        match token {
            Token::Value(value) => {
                let text = value.as_str().unwrap_or_default().trim();
                if text.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Filter::Parsed(parse_expression(text)?)))
            }
            bound => Ok(Some(Filter::Bound(bound))),
        }
    }

    fn source_names(&self) -> BTreeSet<String> {
        match self {
            Filter::Parsed(expr) => expr.source_ids(),
            Filter::Bound(token) => token.source_names(),
        }
    }
}

impl Face {
    /// Build from a `<face>` element, detaching its children as the template
    pub fn from_node(index: usize, node: &Node, patterns: &BindingPatterns) -> RuntimeResult<Self> {
        let token = |name: &str| -> RuntimeResult<Option<Token>> {
            node.attribute(name)
                .map(|value| compile(&value, patterns))
                .transpose()
                .map_err(RuntimeError::from)
        };
        Ok(Self {
            index,
            level: token("level")?,
            row_type: token("rowtype")?,
            filter: token("filter")?.map(Filter::from_token).transpose()?.flatten(),
            template: take_template(node),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn template(&self) -> &[Node] {
        &self.template
    }

    /// Sources the face attributes read
    pub fn source_names(&self) -> BTreeSet<String> {
        [&self.level, &self.row_type]
            .into_iter()
            .flatten()
            .flat_map(Token::source_names)
            .chain(self.filter.iter().flat_map(Filter::source_names))
            .collect()
    }

    /// Resolve the attributes for one render pass over `source`
    pub async fn compile(&self, context: &Context, source: &Source) -> RuntimeResult<CompiledFace<'_>> {
        let levels = match &self.level {
            Some(token) => parse_levels(&token.get_string(context, false).await?),
            None => None,
        };
        let row_type = match &self.row_type {
            Some(token) => RowType::parse(&token.get_string(context, false).await?)?,
            None => None,
        };
        let subset = match &self.filter {
            Some(Filter::Parsed(expr)) => Some(filter_rows(expr, context, source)),
            Some(Filter::Bound(token)) => {
                let text = token.get_string(context, false).await?;
                match text.trim() {
                    "" => None,
                    text => Some(filter_rows(&parse_expression(text)?, context, source)),
                }
            }
            None => None,
        };
        Ok(CompiledFace {
            face: self,
            levels,
            row_type,
            subset,
        })
    }
}

/// A face with its attributes resolved for the current pass
#[derive(Debug)]
pub struct CompiledFace<'a> {
    face: &'a Face,
    levels: Option<HashSet<String>>,
    row_type: Option<RowType>,
    subset: Option<HashSet<usize>>,
}

impl<'a> CompiledFace<'a> {
    pub fn face(&self) -> &'a Face {
        self.face
    }

    /// Filter membership, parity and level intersection must all hold
    pub fn matches(&self, index: usize, parity: RowType, levels: &[String]) -> bool {
        let in_subset = self.subset.as_ref().map_or(true, |rows| rows.contains(&index));
        let parity_ok = self.row_type.map_or(true, |row_type| row_type == parity);
        let level_ok = self.levels.as_ref().map_or(true, |declared| {
            levels
                .iter()
                .any(|level| declared.contains(&level.to_lowercase()))
        });
        in_subset && parity_ok && level_ok
    }
}

fn parse_levels(text: &str) -> Option<HashSet<String>> {
    let levels: HashSet<String> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(str::to_lowercase)
        .collect();
    (!levels.is_empty()).then_some(levels)
}

/// Indices of the rows for which the filter expression is truthy
fn filter_rows(expr: &Expr, context: &Context, source: &Source) -> HashSet<usize> {
    let mut scope = SourceScope::new();
    for id in expr.source_ids() {
        if let Some(source) = context.try_to_get_source(&id) {
            scope.insert(source);
        }
    }

    let subset: HashSet<usize> = source
        .rows()
        .iter()
        .enumerate()
        .filter(|&(_, row)| {
            is_truthy(&evaluate(
                expr,
                &RowScope {
                    row,
                    sources: Some(&scope),
                },
            ))
        })
        .map(|(index, _)| index)
        .collect();
    trace!(matched = subset.len(), rows = source.len(), "Face filter evaluated");
    subset
}
