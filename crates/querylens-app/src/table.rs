// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Search, sort, pagination and export over any record shape.
//!
//! The pipeline is `filter -> sort -> paginate`. Every stage is a pure
//! function over borrowed records; [`TableState`] holds the per-view query and
//! resets it whenever the dataset generation underneath changes.

use anyhow::{Context, Result};
use serde_json::Value;
use std::cmp::Ordering;

use crate::columns::ColumnSpec;
use crate::ids::DatasetGeneration;
use crate::model::{Record, is_null, value_number, value_text};
use crate::nav::SavedQuery;

pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub const fn arrow(self) -> &'static str {
        match self {
            Self::Asc => "↑",
            Self::Desc => "↓",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub search: String,
    pub sort: Option<SortSpec>,
    pub page: usize,
}

impl Default for TableQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            sort: None,
            page: 1,
        }
    }
}

impl TableQuery {
    pub fn sort_direction(&self, key: &str) -> Option<SortDirection> {
        self.sort
            .as_ref()
            .filter(|sort| sort.key == key)
            .map(|sort| sort.direction)
    }
}

/// Rows whose string form of any field contains `term`, ignoring case. The
/// term is matched as typed; only an empty or all-whitespace term keeps every
/// row.
pub fn filter<'a>(records: &'a [Record], term: &str) -> Vec<&'a Record> {
    if term.trim().is_empty() {
        return records.iter().collect();
    }
    let needle = term.to_lowercase();
    records
        .iter()
        .filter(|record| {
            record
                .fields()
                .any(|(_, value)| value_text(value).to_lowercase().contains(&needle))
        })
        .collect()
}

/// How a column compares, decided once over every row so the ordering is
/// total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKind {
    Numeric,
    Text,
}

fn sort_kind(rows: &[&Record], key: &str) -> SortKind {
    let all_numeric = rows
        .iter()
        .filter_map(|row| row.get(key))
        .filter(|value| !value.is_null())
        .all(|value| value_number(value).is_some());
    if all_numeric {
        SortKind::Numeric
    } else {
        SortKind::Text
    }
}

/// Stable sort. A column compares numerically only when every non-null value
/// in it is a number; otherwise every value compares as lower-cased text.
/// Null and missing values go last in both directions.
pub fn sort_rows(rows: &mut [&Record], key: &str, direction: SortDirection) {
    let kind = sort_kind(rows, key);
    rows.sort_by(|left, right| compare_values(left.get(key), right.get(key), kind, direction));
}

fn compare_values(
    left: Option<&Value>,
    right: Option<&Value>,
    kind: SortKind,
    direction: SortDirection,
) -> Ordering {
    let (left, right) = match (present(left), present(right)) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(left), Some(right)) => (left, right),
    };
    let ordering = match kind {
        SortKind::Numeric => match (value_number(left), value_number(right)) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => Ordering::Equal,
        },
        SortKind::Text => value_text(left)
            .to_lowercase()
            .cmp(&value_text(right).to_lowercase()),
    };
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|value| !is_null(Some(*value)))
}

pub fn total_pages(rows: usize, page_size: usize) -> usize {
    rows.div_ceil(page_size.max(1))
}

pub fn clamp_page(page: usize, total_pages: usize) -> usize {
    page.clamp(1, total_pages.max(1))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageSlice<'a> {
    pub rows: Vec<&'a Record>,
    pub page: usize,
    pub total_pages: usize,
}

/// Slice one page out of `rows`. Out-of-range pages are clamped, never an
/// error.
pub fn paginate<'a>(rows: &[&'a Record], page: usize, page_size: usize) -> PageSlice<'a> {
    let page_size = page_size.max(1);
    let total_pages = total_pages(rows.len(), page_size);
    let page = clamp_page(page, total_pages);
    let start = (page - 1).saturating_mul(page_size).min(rows.len());
    let end = start.saturating_add(page_size).min(rows.len());
    PageSlice {
        rows: rows[start..end].to_vec(),
        page,
        total_pages,
    }
}

/// Filtered and sorted rows, before pagination.
pub fn matching_rows<'a>(records: &'a [Record], query: &TableQuery) -> Vec<&'a Record> {
    let mut rows = filter(records, &query.search);
    if let Some(sort) = &query.sort {
        sort_rows(&mut rows, &sort.key, sort.direction);
    }
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableCounts {
    pub total_in_source: usize,
    pub after_filter: usize,
    pub shown_on_page: usize,
}

impl TableCounts {
    pub fn summary(self) -> String {
        if self.after_filter == self.total_in_source {
            format!("{} of {}", self.shown_on_page, self.total_in_source)
        } else {
            format!(
                "{} of {} ({} total)",
                self.shown_on_page, self.after_filter, self.total_in_source
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableView<'a> {
    pub rows: Vec<&'a Record>,
    pub counts: TableCounts,
    pub page: usize,
    pub total_pages: usize,
}

impl TableView<'_> {
    pub fn is_empty_source(&self) -> bool {
        self.counts.total_in_source == 0
    }

    pub fn page_label(&self) -> String {
        format!("page {}/{}", self.page, self.total_pages.max(1))
    }
}

pub fn render<'a>(records: &'a [Record], query: &TableQuery, page_size: usize) -> TableView<'a> {
    let matched = matching_rows(records, query);
    let slice = paginate(&matched, query.page, page_size);
    TableView {
        counts: TableCounts {
            total_in_source: records.len(),
            after_filter: matched.len(),
            shown_on_page: slice.rows.len(),
        },
        rows: slice.rows,
        page: slice.page,
        total_pages: slice.total_pages,
    }
}

/// CSV with one header row of column labels. Cells carry the stored value,
/// not its rendered preview.
pub fn export_flat<'a, I>(rows: I, columns: &[ColumnSpec]) -> Result<String>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());
    writer
        .write_record(columns.iter().map(|column| column.label.as_str()))
        .context("write csv header")?;
    for record in rows {
        writer
            .write_record(columns.iter().map(|column| record.text(&column.key)))
            .context("write csv row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|error| anyhow::anyhow!("flush csv: {}", error.error()))?;
    String::from_utf8(bytes).context("csv output is not utf-8")
}

/// Whitespace runs become `_`; path separators become `-`.
pub fn export_file_name(title: &str) -> String {
    let stem = title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace(['/', '\\'], "-");
    let stem = if stem.is_empty() { "export".to_owned() } else { stem };
    format!("{stem}.csv")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableCommand {
    SetSearch(String),
    PushSearchChar(char),
    PopSearchChar,
    ClearSearch,
    ToggleSort(String),
    NextPage,
    PrevPage,
    GoToPage(usize),
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    SortAsc(String),
    SortDesc(String),
    SortCleared,
    SortUnavailable,
    Search(String),
    SearchCleared,
    Page(usize, usize),
    FirstPage,
    LastPage,
    Reset,
}

impl TableStatus {
    pub fn message(&self) -> String {
        match self {
            Self::SortAsc(column) => format!("sort {column} asc"),
            Self::SortDesc(column) => format!("sort {column} desc"),
            Self::SortCleared => "sort cleared".to_owned(),
            Self::SortUnavailable => "sort unavailable".to_owned(),
            Self::Search(term) => format!("search: {term}"),
            Self::SearchCleared => "search cleared".to_owned(),
            Self::Page(page, total) => format!("page {page}/{total}"),
            Self::FirstPage => "already on first page".to_owned(),
            Self::LastPage => "already on last page".to_owned(),
            Self::Reset => "table reset".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEvent {
    QueryChanged,
    Status(TableStatus),
}

/// Query state of the table currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    query: TableQuery,
    page_size: usize,
    generation: Option<DatasetGeneration>,
}

impl TableState {
    pub fn new(page_size: usize) -> Self {
        Self {
            query: TableQuery::default(),
            page_size: page_size.max(1),
            generation: None,
        }
    }

    pub fn query(&self) -> &TableQuery {
        &self.query
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn generation(&self) -> Option<DatasetGeneration> {
        self.generation
    }

    /// Bind to a dataset generation, resetting the query if it changed.
    pub fn sync(&mut self, generation: DatasetGeneration) -> bool {
        if self.generation == Some(generation) {
            return false;
        }
        self.generation = Some(generation);
        self.query = TableQuery::default();
        true
    }

    pub fn snapshot(&self) -> Option<SavedQuery> {
        self.generation.map(|generation| SavedQuery {
            generation,
            query: self.query.clone(),
        })
    }

    /// Restore a saved query if it was taken against `generation`; otherwise
    /// start fresh.
    pub fn restore(&mut self, saved: Option<&SavedQuery>, generation: DatasetGeneration) -> bool {
        self.generation = Some(generation);
        match saved {
            Some(saved) if saved.generation == generation => {
                self.query = saved.query.clone();
                true
            }
            _ => {
                self.query = TableQuery::default();
                false
            }
        }
    }

    pub fn detach(&mut self) {
        self.generation = None;
        self.query = TableQuery::default();
    }

    pub fn dispatch(&mut self, command: TableCommand, total_pages: usize) -> Vec<TableEvent> {
        match command {
            TableCommand::SetSearch(term) => self.set_search(term),
            TableCommand::PushSearchChar(ch) => {
                let mut term = self.query.search.clone();
                term.push(ch);
                self.set_search(term)
            }
            TableCommand::PopSearchChar => {
                let mut term = self.query.search.clone();
                if term.pop().is_none() {
                    return Vec::new();
                }
                self.set_search(term)
            }
            TableCommand::ClearSearch => {
                if self.query.search.is_empty() {
                    return Vec::new();
                }
                self.query.search.clear();
                self.query.page = 1;
                vec![
                    TableEvent::QueryChanged,
                    TableEvent::Status(TableStatus::SearchCleared),
                ]
            }
            TableCommand::ToggleSort(key) => vec![
                TableEvent::QueryChanged,
                TableEvent::Status(self.toggle_sort(key)),
            ],
            TableCommand::NextPage => {
                let last = total_pages.max(1);
                if self.query.page >= last {
                    self.query.page = last;
                    return vec![TableEvent::Status(TableStatus::LastPage)];
                }
                self.query.page += 1;
                self.page_changed(last)
            }
            TableCommand::PrevPage => {
                if self.query.page <= 1 {
                    self.query.page = 1;
                    return vec![TableEvent::Status(TableStatus::FirstPage)];
                }
                self.query.page = clamp_page(self.query.page - 1, total_pages);
                self.page_changed(total_pages.max(1))
            }
            TableCommand::GoToPage(page) => {
                self.query.page = clamp_page(page, total_pages);
                self.page_changed(total_pages.max(1))
            }
            TableCommand::Reset => {
                self.query = TableQuery::default();
                vec![
                    TableEvent::QueryChanged,
                    TableEvent::Status(TableStatus::Reset),
                ]
            }
        }
    }

    fn set_search(&mut self, term: String) -> Vec<TableEvent> {
        if term == self.query.search {
            return Vec::new();
        }
        self.query.search = term;
        self.query.page = 1;
        let status = if self.query.search.is_empty() {
            TableStatus::SearchCleared
        } else {
            TableStatus::Search(self.query.search.clone())
        };
        vec![TableEvent::QueryChanged, TableEvent::Status(status)]
    }

    fn toggle_sort(&mut self, key: String) -> TableStatus {
        if key.is_empty() {
            return TableStatus::SortUnavailable;
        }
        let next = match self.query.sort_direction(&key) {
            None => Some(SortDirection::Asc),
            Some(SortDirection::Asc) => Some(SortDirection::Desc),
            Some(SortDirection::Desc) => None,
        };
        self.query.page = 1;
        match next {
            Some(direction) => {
                self.query.sort = Some(SortSpec {
                    key: key.clone(),
                    direction,
                });
                match direction {
                    SortDirection::Asc => TableStatus::SortAsc(key),
                    SortDirection::Desc => TableStatus::SortDesc(key),
                }
            }
            None => {
                self.query.sort = None;
                TableStatus::SortCleared
            }
        }
    }

    fn page_changed(&self, total_pages: usize) -> Vec<TableEvent> {
        vec![
            TableEvent::QueryChanged,
            TableEvent::Status(TableStatus::Page(self.query.page, total_pages)),
        ]
    }
}
