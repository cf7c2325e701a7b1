// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::columns::humanize_key;
use crate::ids::{DatasetGeneration, QueryId};
use crate::model::{DatasetSource, SourceKind};
use crate::source::{DrillDownRequest, FetchRequest, unique_ids};
use crate::table::TableQuery;

/// Where a query list was opened from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    Root(SourceKind),
    DrillDown {
        kind: SourceKind,
        source_key: String,
        dimension: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuerySelection {
    /// Queries of one user flagged by a KPI column.
    Flag { user: String, dimension: String },
    /// Explicit id batch taken from an aggregated drill-down row.
    Ids { user: String, ids: Vec<QueryId> },
}

/// The current view together with every parameter needed to rebuild it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum View {
    RootList(SourceKind),
    DrillDown {
        kind: SourceKind,
        source_key: String,
        dimension: String,
    },
    QueryList {
        origin: Origin,
        selection: QuerySelection,
    },
}

impl View {
    pub const fn id(&self) -> &'static str {
        match self {
            Self::RootList(SourceKind::Warehouse) => "warehouse-list",
            Self::RootList(SourceKind::User) => "user-list",
            Self::DrillDown {
                kind: SourceKind::Warehouse,
                ..
            } => "warehouse-drill",
            Self::DrillDown {
                kind: SourceKind::User,
                ..
            } => "user-drill",
            Self::QueryList { .. } => "query-list",
        }
    }

    pub fn root_kind(&self) -> SourceKind {
        match self {
            Self::RootList(kind) | Self::DrillDown { kind, .. } => *kind,
            Self::QueryList { origin, .. } => match origin {
                Origin::Root(kind) | Origin::DrillDown { kind, .. } => *kind,
            },
        }
    }

    pub fn source(&self) -> DatasetSource {
        match self {
            Self::RootList(kind) => DatasetSource::root(*kind),
            Self::DrillDown {
                kind: SourceKind::Warehouse,
                source_key,
                dimension,
            } => DatasetSource::WarehouseDrill {
                warehouse: source_key.clone(),
                dimension: dimension.clone(),
            },
            Self::DrillDown {
                kind: SourceKind::User,
                source_key,
                dimension,
            } => DatasetSource::UserQueries {
                user: source_key.clone(),
                dimension: dimension.clone(),
            },
            Self::QueryList { selection, .. } => match selection {
                QuerySelection::Flag { user, dimension } => DatasetSource::UserQueries {
                    user: user.clone(),
                    dimension: dimension.clone(),
                },
                QuerySelection::Ids { ids, .. } => DatasetSource::QueryBatch {
                    ids: unique_ids(ids),
                },
            },
        }
    }

    /// The single request that reproduces this view's dataset.
    pub fn request(&self) -> FetchRequest {
        match self {
            Self::RootList(kind) => FetchRequest::List(*kind),
            Self::DrillDown {
                kind,
                source_key,
                dimension,
            } => FetchRequest::DrillDown(DrillDownRequest {
                source_kind: *kind,
                source_key: source_key.clone(),
                dimension: dimension.clone(),
            }),
            Self::QueryList { selection, .. } => match selection {
                QuerySelection::Flag { user, dimension } => {
                    FetchRequest::DrillDown(DrillDownRequest {
                        source_kind: SourceKind::User,
                        source_key: user.clone(),
                        dimension: dimension.clone(),
                    })
                }
                QuerySelection::Ids { ids, .. } => FetchRequest::QueriesByIds(unique_ids(ids)),
            },
        }
    }

    pub fn title(&self) -> String {
        match self {
            Self::RootList(kind) => kind.label().to_owned(),
            Self::DrillDown {
                source_key,
                dimension,
                ..
            } => format!("{source_key} / {}", humanize_key(dimension)),
            Self::QueryList { selection, .. } => match selection {
                QuerySelection::Flag { user, dimension } => {
                    format!("{user} / {}", humanize_key(dimension))
                }
                QuerySelection::Ids { user, ids } => {
                    let count = unique_ids(ids).len();
                    let noun = if count == 1 { "query" } else { "queries" };
                    format!("{user} / {count} {noun}")
                }
            },
        }
    }
}

/// Table position saved when leaving a view, restored on return if the
/// dataset underneath is still the same generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedQuery {
    pub generation: DatasetGeneration,
    pub query: TableQuery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreadcrumbEntry {
    pub title: String,
    pub view: View,
    pub saved: Option<SavedQuery>,
}

impl BreadcrumbEntry {
    pub fn new(view: View) -> Self {
        Self {
            title: view.title(),
            view,
            saved: None,
        }
    }
}

/// Ordered breadcrumb history. Never empty; the last entry is the current
/// view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationStack {
    entries: Vec<BreadcrumbEntry>,
}

impl NavigationStack {
    pub fn new(root: View) -> Self {
        Self {
            entries: vec![BreadcrumbEntry::new(root)],
        }
    }

    pub fn current(&self) -> &BreadcrumbEntry {
        // Invariant: entries is never empty.
        &self.entries[self.entries.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut BreadcrumbEntry {
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    pub fn current_view(&self) -> &View {
        &self.current().view
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[BreadcrumbEntry] {
        &self.entries
    }

    pub fn push(&mut self, entry: BreadcrumbEntry) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<BreadcrumbEntry> {
        if self.entries.len() <= 1 {
            return None;
        }
        self.entries.pop()
    }

    pub fn pop_to_root(&mut self) -> usize {
        let popped = self.entries.len().saturating_sub(1);
        self.entries.truncate(1);
        popped
    }

    pub fn reset(&mut self, root: View) {
        self.entries.clear();
        self.entries.push(BreadcrumbEntry::new(root));
    }

    pub fn trail(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.title.as_str())
            .collect::<Vec<_>>()
            .join(" > ")
    }
}
