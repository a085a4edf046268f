//! Face selection and the cross-pass render cache.
//!
//! Each pass selects, for every row, the first face whose predicates hold. The
//! rendered fragment is stored under `(group, row key, occurrence)`; the next pass
//! reuses it verbatim when the row version and selected face are unchanged.

use crate::face::{CompiledFace, RowType};
use crate::template::substitute;
use bindery_dom::Node;
use bindery_source::{RowKey, Source};
use regex::Regex;
use std::collections::HashMap;
use std::rc::Rc;

/// Cache slot of a rendered row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub group: String,
    pub key: RowKey,
    /// Disambiguates rows sharing a key within one group
    pub occurrence: usize,
}

/// A row rendered with one face
#[derive(Debug)]
pub struct FaceRenderResult {
    key: RowKey,
    version: u64,
    face_index: usize,
    nodes: Vec<Node>,
}

impl FaceRenderResult {
    pub fn key(&self) -> &RowKey {
        &self.key
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn face_index(&self) -> usize {
        self.face_index
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

pub type RenderCache = HashMap<CacheKey, Rc<FaceRenderResult>>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    pub rendered: usize,
    pub reused: usize,
    pub skipped: usize,
}

/// State of one render pass over a source
pub struct RenderPass<'a> {
    faces: Vec<CompiledFace<'a>>,
    row_pattern: &'a Regex,
    previous: RenderCache,
    next: RenderCache,
    occurrences: HashMap<(String, RowKey), usize>,
    matched: usize,
    stats: RenderStats,
}

impl<'a> RenderPass<'a> {
    pub fn new(faces: Vec<CompiledFace<'a>>, row_pattern: &'a Regex, previous: RenderCache) -> Self {
        Self {
            faces,
            row_pattern,
            previous,
            next: RenderCache::new(),
            occurrences: HashMap::new(),
            matched: 0,
            stats: RenderStats::default(),
        }
    }

    /// Index of the first face matching row `index` at the current parity
    pub fn select(&self, index: usize, levels: &[String]) -> Option<usize> {
        let parity = RowType::for_counter(self.matched);
        self.faces
            .iter()
            .position(|face| face.matches(index, parity, levels))
    }

    /// Render row `index` of `source`, or `None` when no face matches.
    ///
    /// A skipped row does not advance the parity counter.
    pub fn render_row(
        &mut self,
        group: &str,
        source: &Source,
        index: usize,
        levels: &[String],
    ) -> Option<Rc<FaceRenderResult>> {
        let (row, version, key) = (source.row(index)?, source.version(index)?, source.row_key(index)?);
        let Some(position) = self.select(index, levels) else {
            self.stats.skipped += 1;
            return None;
        };
        self.matched += 1;
        let face = self.faces[position].face();

        let occurrence = {
            let seen = self
                .occurrences
                .entry((group.to_string(), key.clone()))
                .or_default();
            *seen += 1;
            *seen - 1
        };
        let cache_key = CacheKey {
            group: group.to_string(),
            key: key.clone(),
            occurrence,
        };

        let result = match self.previous.remove(&cache_key) {
            Some(cached) if cached.version == version && cached.face_index == face.index() => {
                self.stats.reused += 1;
                cached
            }
            _ => {
                self.stats.rendered += 1;
                Rc::new(FaceRenderResult {
                    key,
                    version,
                    face_index: face.index(),
                    nodes: substitute(face.template(), row, self.row_pattern),
                })
            }
        };
        self.next.insert(cache_key, result.clone());
        Some(result)
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// The cache for the next pass; entries not touched in this pass are dropped
    pub fn finish(self) -> (RenderCache, RenderStats) {
        (self.next, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::Face;
    use bindery_source::{Context, MergeType, Options, Repository, SourceOptions};
    use serde_json::json;

    fn rows(value: serde_json::Value) -> Vec<bindery_source::Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn keyed(value: serde_json::Value) -> Source {
        Source::with_options(
            "db.items",
            rows(value),
            SourceOptions {
                merge_type: MergeType::Append,
                key_field_name: Some("id".into()),
                ..Default::default()
            },
        )
    }

    fn faces(ctx: &Context) -> Vec<Face> {
        let special = Node::element("face")
            .with_attr("filter", "kind == 'special'")
            .with_child(Node::element("b").with_child(Node::text("@name")));
        let odd = Node::element("face")
            .with_attr("rowtype", "odd")
            .with_child(Node::element("i").with_child(Node::text("@name")));
        let fallback = Node::element("face").with_child(Node::element("u").with_child(Node::text("@name")));
        vec![
            Face::from_node(0, &special, ctx.patterns()).unwrap(),
            Face::from_node(1, &odd, ctx.patterns()).unwrap(),
            Face::from_node(2, &fallback, ctx.patterns()).unwrap(),
        ]
    }

    async fn pass_over<'a>(
        ctx: &'a Context,
        faces: &'a [Face],
        source: &Source,
        previous: RenderCache,
    ) -> RenderPass<'a> {
        let mut compiled = Vec::new();
        for face in faces {
            compiled.push(face.compile(ctx, source).await.unwrap());
        }
        RenderPass::new(compiled, &ctx.patterns().row, previous)
    }

    #[tokio::test]
    async fn test_first_matching_face_wins() {
        let ctx = Context::new(Options::default()).unwrap();
        let faces = faces(&ctx);
        let source = keyed(json!([
            {"id": 1, "name": "a", "kind": "plain"},
            {"id": 2, "name": "b", "kind": "special"},
            {"id": 3, "name": "c", "kind": "plain"},
            {"id": 4, "name": "d", "kind": "plain"}
        ]));

        let mut pass = pass_over(&ctx, &faces, &source, RenderCache::new()).await;
        let selected: Vec<usize> = (0..source.len())
            .map(|index| pass.render_row("", &source, index, &[]).unwrap().face_index())
            .collect();

        // parity runs over matched rows: a=odd, b=even (special), c=odd, d=even
        assert_eq!(selected, vec![1, 0, 1, 2]);
    }

    #[tokio::test]
    async fn test_unchanged_rows_are_reused() {
        let ctx = Context::new(Options::default()).unwrap();
        let faces = faces(&ctx);
        let repository = Repository::new();
        let first = repository.set_source(keyed(json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])));

        let mut pass = pass_over(&ctx, &faces, &first, RenderCache::new()).await;
        let before: Vec<_> = (0..2).map(|i| pass.render_row("", &first, i, &[]).unwrap()).collect();
        let (cache, stats) = pass.finish();
        assert_eq!(stats.rendered, 2);

        // keyed append upserts row 2 in place, bumping only its version
        let second = repository.set_source(keyed(json!([{"id": 2, "name": "B"}])));
        assert_eq!(second.versions(), &[0, 1]);
        let mut pass = pass_over(&ctx, &faces, &second, cache).await;
        let after: Vec<_> = (0..2).map(|i| pass.render_row("", &second, i, &[]).unwrap()).collect();

        assert!(Rc::ptr_eq(&before[0], &after[0]));
        assert!(!Rc::ptr_eq(&before[1], &after[1]));
        assert_eq!(after[1].nodes()[0].inner_text(), "B");
        assert_eq!(pass.stats(), RenderStats { rendered: 1, reused: 1, skipped: 0 });
    }

    #[tokio::test]
    async fn test_unmatched_rows_are_skipped() {
        let ctx = Context::new(Options::default()).unwrap();
        let only_special = vec![Face::from_node(
            0,
            &Node::element("face").with_attr("filter", "kind == 'special'"),
            ctx.patterns(),
        )
        .unwrap()];
        let source = keyed(json!([{"id": 1, "kind": "plain"}]));

        let mut pass = pass_over(&ctx, &only_special, &source, RenderCache::new()).await;
        assert!(pass.render_row("", &source, 0, &[]).is_none());
        assert_eq!(pass.stats().skipped, 1);
    }
}
