// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use time::OffsetDateTime;

use crate::ids::{DatasetGeneration, QueryId};

pub const WAREHOUSE_KEY_FIELDS: [&str; 2] = ["WAREHOUSE_NAME", "warehouse_name"];
pub const USER_KEY_FIELDS: [&str; 3] = ["USER_NAME", "user_name", "username"];
pub const QUERY_ID_FIELDS: [&str; 2] = ["QUERY_ID", "query_id"];
pub const QUERY_IDS_FIELDS: [&str; 2] = ["query_ids", "QUERY_IDS"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Warehouse,
    User,
}

impl SourceKind {
    pub const ALL: [Self; 2] = [Self::Warehouse, Self::User];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warehouse => "warehouses",
            Self::User => "users",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Warehouse => "Warehouses",
            Self::User => "Users",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "warehouses" | "warehouse" => Some(Self::Warehouse),
            "users" | "user" => Some(Self::User),
            _ => None,
        }
    }

    pub const fn key_fields(self) -> &'static [&'static str] {
        match self {
            Self::Warehouse => &WAREHOUSE_KEY_FIELDS,
            Self::User => &USER_KEY_FIELDS,
        }
    }
}

/// Identity of a dataset: which endpoint produced it and with what context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DatasetSource {
    Warehouses,
    Users,
    WarehouseDrill { warehouse: String, dimension: String },
    UserQueries { user: String, dimension: String },
    QueryBatch { ids: Vec<QueryId> },
}

impl DatasetSource {
    pub const fn root(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Warehouse => Self::Warehouses,
            SourceKind::User => Self::Users,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warehouses => "warehouses",
            Self::Users => "users",
            Self::WarehouseDrill { .. } => "warehouse_drill",
            Self::UserQueries { .. } => "user_queries",
            Self::QueryBatch { .. } => "query_batch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn first_of(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .find(|value| !value.is_null())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn text(&self, key: &str) -> String {
        self.get(key).map(value_text).unwrap_or_default()
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(value_number)
    }

    pub fn key_for(&self, kind: SourceKind) -> Option<String> {
        self.first_of(kind.key_fields())
            .map(value_text)
            .filter(|key| !key.trim().is_empty())
    }

    pub fn query_id(&self) -> Option<QueryId> {
        self.first_of(&QUERY_ID_FIELDS)
            .map(value_text)
            .filter(|id| !id.trim().is_empty())
            .map(QueryId::new)
    }

    /// Ids attached to an aggregated row, either as a JSON array or as a
    /// JSON-encoded array string.
    pub fn query_ids(&self) -> Vec<QueryId> {
        let Some(value) = self.first_of(&QUERY_IDS_FIELDS) else {
            return Vec::new();
        };
        let decoded;
        let items = match value {
            Value::Array(items) => items,
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Array(items)) => {
                    decoded = items;
                    &decoded
                }
                _ => return Vec::new(),
            },
            _ => return Vec::new(),
        };
        items
            .iter()
            .filter(|item| !item.is_null())
            .map(value_text)
            .filter(|id| !id.is_empty())
            .map(QueryId::new)
            .collect()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// String form used by search and export.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn value_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|number| number.is_finite())
}

/// Missing or JSON null. Empty strings are values and sort like any other text.
pub fn is_null(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    source: DatasetSource,
    generation: DatasetGeneration,
    loaded_at: OffsetDateTime,
    records: Arc<[Record]>,
}

impl Dataset {
    pub fn new(source: DatasetSource, records: Vec<Record>) -> Self {
        Self {
            source,
            generation: DatasetGeneration::new(0),
            loaded_at: OffsetDateTime::now_utc(),
            records: records.into(),
        }
    }

    pub(crate) fn with_generation(mut self, generation: DatasetGeneration) -> Self {
        self.generation = generation;
        self
    }

    pub fn source(&self) -> &DatasetSource {
        &self.source
    }

    pub fn generation(&self) -> DatasetGeneration {
        self.generation
    }

    pub fn loaded_at(&self) -> OffsetDateTime {
        self.loaded_at
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Record, SourceKind, is_null, value_number, value_text};
    use crate::QueryId;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).expect("object literal")
    }

    #[test]
    fn record_preserves_field_order() {
        let row = record(json!({"zeta": 1, "alpha": 2, "mid": 3}));
        let keys: Vec<&str> = row.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn key_for_uses_first_present_field() {
        let row = record(json!({"user_name": null, "username": "alice"}));
        assert_eq!(row.key_for(SourceKind::User).as_deref(), Some("alice"));
        assert_eq!(row.key_for(SourceKind::Warehouse), None);
    }

    #[test]
    fn query_ids_accepts_arrays_and_encoded_strings() {
        let array = record(json!({"query_ids": ["q1", null, "q2"]}));
        assert_eq!(
            array.query_ids(),
            vec![QueryId::from("q1"), QueryId::from("q2")]
        );

        let encoded = record(json!({"QUERY_IDS": "[\"q3\"]"}));
        assert_eq!(encoded.query_ids(), vec![QueryId::from("q3")]);

        let garbage = record(json!({"query_ids": "not json"}));
        assert!(garbage.query_ids().is_empty());
    }

    #[test]
    fn value_helpers_cover_scalars() {
        assert_eq!(value_text(&json!(null)), "");
        assert_eq!(value_text(&json!(12)), "12");
        assert_eq!(value_text(&json!(true)), "true");
        assert_eq!(value_number(&json!(" 4.5 ")), Some(4.5));
        assert_eq!(value_number(&json!("abc")), None);
        assert!(is_null(None));
        assert!(is_null(Some(&json!(null))));
        assert!(!is_null(Some(&json!("  "))));
        assert!(!is_null(Some(&json!(0))));
    }

    #[test]
    fn source_kind_parses_singular_and_plural() {
        assert_eq!(SourceKind::parse("Users"), Some(SourceKind::User));
        assert_eq!(SourceKind::parse("warehouse"), Some(SourceKind::Warehouse));
        assert_eq!(SourceKind::parse("queries"), None);
    }
}
