use crate::error::{SourceError, SourceResult};
use crate::value::display_value;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

/// One record of a source
pub type Row = serde_json::Map<String, JsonValue>;

/// How an incoming source combines with a stored source of the same id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeType {
    /// Overwrite rows, bump versions of surviving positions
    #[default]
    Replace,
    /// Upsert by key and status, or plain append without a key field
    Append,
}

/// Per-row status flag read during keyed append merges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Added,
    Edited,
    Deleted,
}

impl RowStatus {
    pub fn parse(value: &JsonValue) -> Option<Self> {
        match display_value(value).to_ascii_lowercase().as_str() {
            "added" => Some(Self::Added),
            "edited" => Some(Self::Edited),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Merge and keying options carried by a source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOptions {
    #[serde(default)]
    pub merge_type: MergeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_field_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<JsonValue>,
}

/// Identity of a row for render caching
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    /// Value of the key field
    Field(String),
    /// Canonical JSON of the whole row (no key field configured)
    Content(String),
}

/// A named, versioned row-set
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    id: String,
    rows: Vec<Row>,
    versions: Vec<u64>,
    options: SourceOptions,
}

/// Wire shape exchanged with data providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSource {
    pub id: String,
    #[serde(default)]
    pub rows: Vec<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<SourceOptions>,
}

impl Source {
    /// New source with replace semantics; the id is lowercased
    pub fn new(id: impl AsRef<str>, rows: Vec<Row>) -> Self {
        Self::with_options(id, rows, SourceOptions::default())
    }

    pub fn with_options(id: impl AsRef<str>, rows: Vec<Row>, options: SourceOptions) -> Self {
        let versions = vec![0; rows.len()];
        Self {
            id: id.as_ref().to_lowercase(),
            rows,
            versions,
            options,
        }
    }

    /// Build a source from arbitrary JSON.
    ///
    /// An array of objects becomes the rows, a single object becomes one row and any
    /// other value is wrapped as `{ "value": .. }`.
    pub fn from_value(id: impl AsRef<str>, value: JsonValue) -> Self {
        let rows = match value {
            JsonValue::Array(items) => items.into_iter().map(into_row).collect(),
            JsonValue::Null => Vec::new(),
            other => vec![into_row(other)],
        };
        Self::new(id, rows)
    }

    /// Decode the provider wire shape
    pub fn from_wire(wire: WireSource) -> SourceResult<Self> {
        if wire.id.trim().is_empty() {
            return Err(SourceError::invalid_wire_source(&wire.id, "source id is empty"));
        }
        let mut rows = Vec::with_capacity(wire.rows.len());
        for (index, row) in wire.rows.into_iter().enumerate() {
            match row {
                JsonValue::Object(map) => rows.push(map),
                other => {
                    return Err(SourceError::invalid_wire_source(
                        &wire.id,
                        format!("row {} is not a record: {}", index, other),
                    ))
                }
            }
        }
        Ok(Self::with_options(&wire.id, rows, wire.options.unwrap_or_default()))
    }

    pub fn from_wire_json(json: &str) -> SourceResult<Self> {
        let wire: WireSource = serde_json::from_str(json)
            .map_err(|e| SourceError::invalid_wire_source("<unknown>", e.to_string()))?;
        Self::from_wire(wire)
    }

    pub fn to_wire(&self) -> WireSource {
        WireSource {
            id: self.id.clone(),
            rows: self.rows.iter().cloned().map(JsonValue::Object).collect(),
            options: Some(self.options.clone()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn versions(&self) -> &[u64] {
        &self.versions
    }

    pub fn options(&self) -> &SourceOptions {
        &self.options
    }

    pub fn merge_type(&self) -> MergeType {
        self.options.merge_type
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn version(&self, index: usize) -> Option<u64> {
        self.versions.get(index).copied()
    }

    /// Cache identity of the row at `index`
    pub fn row_key(&self, index: usize) -> Option<RowKey> {
        let row = self.rows.get(index)?;
        let keyed = self
            .options
            .key_field_name
            .as_deref()
            .and_then(|field| row.get(field))
            .map(|value| RowKey::Field(display_value(value)));
        Some(keyed.unwrap_or_else(|| RowKey::Content(JsonValue::Object(row.clone()).to_string())))
    }

    /// Merge an incoming source with the same id into this one
    pub(crate) fn merge(&mut self, incoming: Source) {
        debug_assert_eq!(self.id, incoming.id);

        if incoming.options.extra.is_some() {
            self.options.extra = incoming.options.extra.clone();
        }

        match incoming.options.merge_type {
            MergeType::Replace => {
                let versions = (0..incoming.rows.len())
                    .map(|i| self.versions.get(i).map_or(0, |v| v + 1))
                    .collect();
                self.rows = incoming.rows;
                self.versions = versions;
            }
            MergeType::Append => {
                let key_field = match (&self.options.key_field_name, &incoming.options.key_field_name) {
                    (Some(_), Some(incoming_key)) => Some(incoming_key.clone()),
                    _ => None,
                };

                match key_field {
                    Some(key_field) => {
                        let status_field = incoming
                            .options
                            .status_field_name
                            .clone()
                            .or_else(|| self.options.status_field_name.clone());
                        for row in incoming.rows {
                            self.upsert(row, &key_field, status_field.as_deref());
                        }
                    }
                    None => {
                        for row in incoming.rows {
                            self.rows.push(row);
                            self.versions.push(0);
                        }
                    }
                }
            }
        }

        debug_assert_eq!(self.rows.len(), self.versions.len());
    }

    fn position_of(&self, key_field: &str, key: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.get(key_field).map(display_value).as_deref() == Some(key))
    }

    fn upsert(&mut self, row: Row, key_field: &str, status_field: Option<&str>) {
        let status = status_field
            .and_then(|field| row.get(field))
            .and_then(RowStatus::parse);
        let position = row
            .get(key_field)
            .map(display_value)
            .and_then(|key| self.position_of(key_field, &key));

        match (status, position) {
            (Some(RowStatus::Deleted), Some(index)) => {
                self.rows.remove(index);
                self.versions.remove(index);
            }
            (Some(RowStatus::Deleted), None) => {
                debug!(source = %self.id, "Deleted row has no match, ignoring");
            }
            (Some(RowStatus::Added), _) | (Some(RowStatus::Edited) | None, None) => {
                self.rows.push(row);
                self.versions.push(0);
            }
            (Some(RowStatus::Edited) | None, Some(index)) => {
                self.rows[index] = row;
                self.versions[index] += 1;
            }
        }
    }
}

fn into_row(value: JsonValue) -> Row {
    match value {
        JsonValue::Object(map) => map,
        other => {
            let mut row = Row::new();
            row.insert("value".to_string(), other);
            row
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: JsonValue) -> Vec<Row> {
        match value {
            JsonValue::Array(items) => items.into_iter().map(into_row).collect(),
            other => vec![into_row(other)],
        }
    }

    fn keyed(id: &str, value: JsonValue) -> Source {
        Source::with_options(
            id,
            rows(value),
            SourceOptions {
                merge_type: MergeType::Append,
                key_field_name: Some("id".to_string()),
                status_field_name: Some("status".to_string()),
                extra: None,
            },
        )
    }

    #[test]
    fn test_id_is_lowercased() {
        let source = Source::new("Db.Users", vec![]);
        assert_eq!(source.id(), "db.users");
    }

    #[test]
    fn test_replace_bumps_versions() {
        let mut stored = Source::new("a.b", rows(json!([{"x": 1}, {"x": 2}])));
        stored.merge(Source::new("a.b", rows(json!([{"x": 3}, {"x": 4}, {"x": 5}]))));

        assert_eq!(stored.versions(), &[1, 1, 0]);
        assert_eq!(stored.rows().len(), 3);

        stored.merge(Source::new("a.b", rows(json!([{"x": 6}]))));
        assert_eq!(stored.versions(), &[2]);
        assert_eq!(stored.rows()[0]["x"], json!(6));
    }

    #[test]
    fn test_keyed_append_statuses() {
        let mut stored = keyed("db.t", json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]));

        stored.merge(keyed("db.t", json!([{"id": 3, "v": "c", "status": "added"}])));
        assert_eq!(stored.len(), 3);
        assert_eq!(stored.version(2), Some(0));

        stored.merge(keyed("db.t", json!([{"id": 1, "v": "z", "status": "edited"}])));
        assert_eq!(stored.len(), 3);
        assert_eq!(stored.row(0).unwrap()["v"], json!("z"));
        assert_eq!(stored.version(0), Some(1));

        stored.merge(keyed("db.t", json!([{"id": 2, "status": "deleted"}])));
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.rows().len(), stored.versions().len());
        assert_eq!(stored.row(1).unwrap()["id"], json!(3));
    }

    #[test]
    fn test_keyed_append_without_status_upserts() {
        let mut stored = keyed("db.t", json!([{"id": 1, "v": "a"}]));
        stored.merge(keyed("db.t", json!([{"id": 1, "v": "b"}, {"id": 2, "v": "c"}])));

        assert_eq!(stored.len(), 2);
        assert_eq!(stored.versions(), &[1, 0]);
    }

    #[test]
    fn test_unkeyed_append() {
        let mut stored = Source::new("a.b", rows(json!([{"x": 1}])));
        let incoming = Source::with_options(
            "a.b",
            rows(json!([{"x": 2}])),
            SourceOptions {
                merge_type: MergeType::Append,
                ..Default::default()
            },
        );
        stored.merge(incoming);
        assert_eq!(stored.versions(), &[0, 0]);
    }

    #[test]
    fn test_row_key() {
        let source = keyed("db.t", json!([{"id": 7, "v": "a"}, {"v": "b"}]));
        assert_eq!(source.row_key(0), Some(RowKey::Field("7".to_string())));
        assert_eq!(
            source.row_key(1),
            Some(RowKey::Content("{\"v\":\"b\"}".to_string()))
        );
        assert_eq!(source.row_key(2), None);
    }

    #[test]
    fn test_wire_round_trip() {
        let source = Source::from_wire_json(
            r#"{"id": "Db.Users", "rows": [{"name": "a"}], "options": {"mergeType": "append", "keyFieldName": "id"}}"#,
        )
        .unwrap();
        assert_eq!(source.id(), "db.users");
        assert_eq!(source.merge_type(), MergeType::Append);
        assert_eq!(source.options().key_field_name.as_deref(), Some("id"));

        let wire = source.to_wire();
        assert_eq!(wire.rows.len(), 1);
    }

    #[test]
    fn test_wire_rejects_non_record_rows() {
        let err = Source::from_wire_json(r#"{"id": "a.b", "rows": [1]}"#).unwrap_err();
        assert!(matches!(err, SourceError::InvalidWireSource { .. }));
    }

    #[test]
    fn test_from_value_shapes() {
        assert_eq!(Source::from_value("a.b", json!([{"x": 1}, {"x": 2}])).len(), 2);
        assert_eq!(Source::from_value("a.b", json!({"x": 1})).len(), 1);
        assert_eq!(Source::from_value("a.b", json!(5)).row(0).unwrap()["value"], json!(5));
        assert!(Source::from_value("a.b", json!(null)).is_empty());
    }
}
