// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::Value;
use std::fmt;

use crate::model::{Record, SourceKind, value_number, value_text};
use crate::nav::View;

pub const WAREHOUSE_KPI_COLUMNS: [&str; 24] = [
    "QUERIES_1_10_SEC",
    "QUERIES_10_20_SEC",
    "QUERIES_20_60_SEC",
    "QUERIES_1_3_MIN",
    "QUERIES_3_5_MIN",
    "QUERIES_5_PLUS_MIN",
    "QUEUED_1_2_MIN",
    "QUEUED_2_5_MIN",
    "QUEUED_5_10_MIN",
    "QUEUED_10_20_MIN",
    "QUEUED_20_PLUS_MIN",
    "QUERIES_SPILLED_LOCAL",
    "QUERIES_SPILLED_REMOTE",
    "FAILED_QUERIES",
    "SUCCESSFUL_QUERIES",
    "OVER_PROVISIONED_QUERIES",
    "PEAK_HOUR_LONG_RUNNING_QUERIES",
    "SELECT_STAR_QUERIES",
    "UNPARTITIONED_SCAN_QUERIES",
    "COMPLEX_JOIN_QUERIES",
    "FAILED_CANCELLED_QUERIES",
    "ZERO_RESULT_QUERIES",
    "HIGH_COMPILE_QUERIES",
    "SPILLED_QUERIES",
];

pub const USER_KPI_COLUMNS: [&str; 9] = [
    "SPILLED_QUERIES",
    "OVER_PROVISIONED_QUERIES",
    "PEAK_HOUR_LONG_RUNNING_QUERIES",
    "SELECT_STAR_QUERIES",
    "UNPARTITIONED_SCAN_QUERIES",
    "REPEATED_QUERIES",
    "COMPLEX_JOIN_QUERIES",
    "ZERO_RESULT_QUERIES",
    "HIGH_COMPILE_QUERIES",
];

/// Drill-down columns for each root list. The backend can publish its own
/// lists; the built-in ones apply when it does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KpiColumns {
    pub warehouse: Vec<String>,
    pub user: Vec<String>,
}

impl Default for KpiColumns {
    fn default() -> Self {
        Self {
            warehouse: WAREHOUSE_KPI_COLUMNS.map(str::to_owned).to_vec(),
            user: USER_KPI_COLUMNS.map(str::to_owned).to_vec(),
        }
    }
}

impl KpiColumns {
    pub fn for_kind(&self, kind: SourceKind) -> &[String] {
        match kind {
            SourceKind::Warehouse => &self.warehouse,
            SourceKind::User => &self.user,
        }
    }

    /// Only root lists drill down by cell.
    pub fn for_view(&self, view: &View) -> &[String] {
        match view {
            View::RootList(kind) => self.for_kind(*kind),
            _ => &[],
        }
    }
}

/// Bulky payload fields the list endpoints carry but never display.
pub const HIDDEN_FIELDS: [&str; 3] = ["QUERY_IDS", "sample_queries", "SAMPLE_QUERIES"];

pub const PREVIEW_CHARS: usize = 100;

pub type CellRenderer = fn(&Value, &Record) -> String;

#[derive(Clone)]
pub struct ColumnSpec {
    pub key: String,
    pub label: String,
    pub sortable: bool,
    pub clickable: bool,
    pub render: Option<CellRenderer>,
}

impl fmt::Debug for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("key", &self.key)
            .field("label", &self.label)
            .field("sortable", &self.sortable)
            .field("clickable", &self.clickable)
            .field("render", &self.render.is_some())
            .finish()
    }
}

impl ColumnSpec {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: humanize_key(&key),
            key,
            sortable: true,
            clickable: false,
            render: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn clickable(mut self) -> Self {
        self.clickable = true;
        self
    }

    pub fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    pub fn with_render(mut self, render: CellRenderer) -> Self {
        self.render = Some(render);
        self
    }

    pub fn display(&self, record: &Record) -> String {
        let Some(value) = record.get(&self.key) else {
            return String::new();
        };
        match self.render {
            Some(render) => render(value, record),
            None => default_display(value),
        }
    }

    /// A clickable column triggers only on a positive value; zero or empty
    /// cells are inert.
    pub fn triggers_on(&self, record: &Record) -> bool {
        self.clickable && is_positive(record.get(&self.key))
    }
}

pub fn is_positive(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(number @ Value::Number(_)) => value_number(number).is_some_and(|n| n > 0.0),
        Some(raw @ Value::String(text)) => match value_number(raw) {
            Some(number) => number > 0.0,
            None => !text.trim().is_empty(),
        },
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
    }
}

pub fn default_display(value: &Value) -> String {
    match value {
        Value::Array(items) => match items.len() {
            1 => "1 id".to_owned(),
            count => format!("{count} ids"),
        },
        _ => value_text(value),
    }
}

pub fn preview_text(value: &Value, _record: &Record) -> String {
    let text = value_text(value);
    if text.chars().count() <= PREVIEW_CHARS {
        return text;
    }
    let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

/// `QUERIES_1_10_SEC` becomes `Queries 1 10 Sec`.
pub fn humanize_key(key: &str) -> String {
    key.split(['_', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let lower = part.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_query_text(key: &str) -> bool {
    key.to_ascii_lowercase().contains("query_text")
}

/// Column specs for a view, in first-seen field order across the records.
pub fn columns_for(view: &View, records: &[Record], kpis: &KpiColumns) -> Vec<ColumnSpec> {
    let kpis = kpis.for_view(view);
    let mut keys: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !HIDDEN_FIELDS.contains(&key) && !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    keys.into_iter()
        .map(|key| {
            let mut spec = ColumnSpec::new(key);
            if kpis.iter().any(|kpi| kpi == key) {
                spec = spec.clickable();
            }
            if is_query_text(key) {
                spec = spec.with_render(preview_text);
            }
            spec
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ColumnSpec, KpiColumns, columns_for, humanize_key, is_positive, preview_text};
    use crate::{Record, SourceKind, View};
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).expect("object literal")
    }

    #[test]
    fn humanize_handles_upper_and_snake_case() {
        assert_eq!(humanize_key("QUERIES_1_10_SEC"), "Queries 1 10 Sec");
        assert_eq!(humanize_key("query_text_preview"), "Query Text Preview");
        assert_eq!(humanize_key("__x"), "X");
    }

    #[test]
    fn positive_values_trigger() {
        assert!(is_positive(Some(&json!(5))));
        assert!(is_positive(Some(&json!(0.5))));
        assert!(is_positive(Some(&json!("3"))));
        assert!(is_positive(Some(&json!(true))));
        assert!(!is_positive(Some(&json!(0))));
        assert!(!is_positive(Some(&json!("0"))));
        assert!(!is_positive(Some(&json!(-2))));
        assert!(!is_positive(Some(&json!(null))));
        assert!(!is_positive(Some(&json!(""))));
        assert!(!is_positive(None));
    }

    #[test]
    fn only_clickable_columns_trigger() {
        let row = record(json!({"WAREHOUSE_NAME": "WH1", "QUERIES_1_10_SEC": 5}));
        assert!(ColumnSpec::new("QUERIES_1_10_SEC").clickable().triggers_on(&row));
        assert!(!ColumnSpec::new("QUERIES_1_10_SEC").triggers_on(&row));
    }

    #[test]
    fn warehouse_list_marks_kpi_columns_and_hides_id_blobs() {
        let rows = vec![record(json!({
            "WAREHOUSE_NAME": "WH1",
            "QUERIES_1_10_SEC": 5,
            "QUERY_IDS": "{}",
            "TOTAL_QUERIES": 9,
        }))];
        let columns = columns_for(&View::RootList(SourceKind::Warehouse), &rows, &KpiColumns::default());
        let keys: Vec<&str> = columns.iter().map(|column| column.key.as_str()).collect();
        assert_eq!(keys, vec!["WAREHOUSE_NAME", "QUERIES_1_10_SEC", "TOTAL_QUERIES"]);
        assert!(!columns[0].clickable);
        assert!(columns[1].clickable);
        assert!(!columns[2].clickable);
    }

    #[test]
    fn user_list_uses_user_kpis() {
        let rows = vec![record(json!({"USER_NAME": "alice", "REPEATED_QUERIES": 2, "QUERIES_1_10_SEC": 1}))];
        let columns = columns_for(&View::RootList(SourceKind::User), &rows, &KpiColumns::default());
        assert!(columns[1].clickable);
        assert!(!columns[2].clickable);
    }

    #[test]
    fn published_kpi_lists_replace_the_built_in_ones() {
        let rows = vec![record(json!({"WAREHOUSE_NAME": "WH1", "QUERIES_1_10_SEC": 5, "NEW_KPI": 1}))];
        let kpis = KpiColumns {
            warehouse: vec!["NEW_KPI".to_owned()],
            user: Vec::new(),
        };
        let columns = columns_for(&View::RootList(SourceKind::Warehouse), &rows, &kpis);
        assert!(!columns[1].clickable);
        assert!(columns[2].clickable);
        assert_eq!(KpiColumns::default().for_view(&View::RootList(SourceKind::User)).len(), 9);
    }

    #[test]
    fn columns_union_keys_across_records() {
        let rows = vec![
            record(json!({"a": 1})),
            record(json!({"a": 2, "b": 3})),
        ];
        let columns = columns_for(&View::RootList(SourceKind::User), &rows, &KpiColumns::default());
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].key, "b");
    }

    #[test]
    fn query_text_is_previewed() {
        let long = "x".repeat(150);
        let row = record(json!({"QUERY_TEXT": long}));
        let columns = columns_for(&View::RootList(SourceKind::User), std::slice::from_ref(&row), &KpiColumns::default());
        let shown = columns[0].display(&row);
        assert_eq!(shown.len(), 103);
        assert!(shown.ends_with("..."));
        assert_eq!(preview_text(&json!("short"), &row), "short");
    }

    #[test]
    fn arrays_render_as_counts() {
        let row = record(json!({"query_ids": ["q1", "q2"]}));
        assert_eq!(ColumnSpec::new("query_ids").display(&row), "2 ids");
    }
}
