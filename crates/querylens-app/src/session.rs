// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Drill-down orchestration.
//!
//! [`Session`] owns the breadcrumb stack, the record store, the table query
//! and the detail overlay. The front end feeds it [`Interaction`]s and fetch
//! results; it answers with [`SessionEvent`]s, including the fetches to run.
//! Every fetch is tagged with a [`RequestId`] and the view it was issued
//! from, so late responses are discarded instead of applied.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::columns::{ColumnSpec, KpiColumns, columns_for};
use crate::error::FetchError;
use crate::ids::{NoticeId, OverlaySessionId, QueryId, RequestId};
use crate::model::{Dataset, DatasetSource, Record, SourceKind};
use crate::nav::{BreadcrumbEntry, NavigationStack, Origin, QuerySelection, View};
use crate::overlay::{DetailOverlay, OverlayOutcome};
use crate::source::{FetchRequest, Payload, unique_ids};
use crate::store::RecordStore;
use crate::table::{
    TableCommand, TableEvent, TableState, TableStatus, TableView, export_file_name, export_flat,
    matching_rows, render, total_pages,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    SwitchRoot(SourceKind),
    /// `row` indexes the rows of the page currently shown.
    ActivateCell { row: usize, column: String },
    ViewQueries { row: usize },
    ViewDetails { row: usize },
    Back,
    Home,
    Refresh,
    Retry,
    CloseOverlay,
    DismissNotice,
    Table(TableCommand),
}

/// The control a request was issued from. Two requests with the same control
/// never run at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Control {
    RootLoad(SourceKind),
    Cell {
        view: View,
        row_key: String,
        column: String,
    },
    ViewQueries {
        view: View,
        row_key: String,
    },
    Restore(View),
    Detail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Root(SourceKind),
    Navigate { to: View },
    Restore { view: View },
    Overlay(OverlaySessionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: RequestId,
    pub control: Control,
    pub requested_from: View,
    pub target: Target,
    pub request: FetchRequest,
}

impl Ticket {
    fn is_navigation(&self) -> bool {
        matches!(self.target, Target::Navigate { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    RootLoad(SourceKind),
    Restore(View),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: NoticeId,
    pub message: String,
    pub suggestion: &'static str,
    pub retry: Option<RetryAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Fetch(Ticket),
    Navigated { title: String, depth: usize },
    Returned { title: String, depth: usize },
    DatasetLoaded { source: DatasetSource, rows: usize },
    OverlayOpened(QueryId),
    OverlayUpdated,
    OverlayClosed,
    NoticeRaised(Notice),
    NoticeCleared,
    Ignored(String),
    Busy(String),
    Discarded { id: RequestId, reason: &'static str },
    Status(String),
    Table(TableEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub file_name: String,
    pub contents: String,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct Session {
    stack: NavigationStack,
    store: RecordStore,
    table: TableState,
    overlay: DetailOverlay,
    pending: BTreeMap<RequestId, Ticket>,
    last_request: RequestId,
    latest_navigation: Option<RequestId>,
    notice: Option<Notice>,
    last_notice: NoticeId,
    kpis: KpiColumns,
}

impl Session {
    pub fn new(default_root: SourceKind, page_size: usize) -> Self {
        Self {
            stack: NavigationStack::new(View::RootList(default_root)),
            store: RecordStore::new(),
            table: TableState::new(page_size),
            overlay: DetailOverlay::new(),
            pending: BTreeMap::new(),
            last_request: RequestId::default(),
            latest_navigation: None,
            notice: None,
            last_notice: NoticeId::default(),
            kpis: KpiColumns::default(),
        }
    }

    /// Use the drill-down columns the backend publishes instead of the
    /// built-in lists.
    pub fn with_kpi_columns(mut self, kpis: KpiColumns) -> Self {
        self.kpis = kpis;
        self
    }

    pub fn kpi_columns(&self) -> &KpiColumns {
        &self.kpis
    }

    /// Initial load of the root list.
    pub fn start(&mut self) -> Vec<SessionEvent> {
        let kind = self.stack.current_view().root_kind();
        self.load_root(kind)
    }

    pub fn handle(&mut self, interaction: Interaction) -> Vec<SessionEvent> {
        match interaction {
            Interaction::SwitchRoot(kind) => self.switch_root(kind),
            Interaction::ActivateCell { row, column } => self.activate_cell(row, &column),
            Interaction::ViewQueries { row } => self.view_queries(row),
            Interaction::ViewDetails { row } => self.view_details(row),
            Interaction::Back => self.back(),
            Interaction::Home => self.home(),
            Interaction::Refresh => self.refresh(),
            Interaction::Retry => self.retry(),
            Interaction::CloseOverlay => self.close_overlay(),
            Interaction::DismissNotice => {
                if self.notice.take().is_some() {
                    vec![SessionEvent::NoticeCleared]
                } else {
                    Vec::new()
                }
            }
            Interaction::Table(command) => self.table_command(command),
        }
    }

    /// Apply the result of a fetch issued by an earlier [`SessionEvent::Fetch`].
    pub fn complete(
        &mut self,
        id: RequestId,
        outcome: Result<Payload, FetchError>,
    ) -> Vec<SessionEvent> {
        let Some(ticket) = self.pending.remove(&id) else {
            debug!(request = %id, "discarding response for superseded request");
            return vec![SessionEvent::Discarded {
                id,
                reason: "superseded",
            }];
        };
        match ticket.target.clone() {
            Target::Root(kind) => self.complete_root(ticket, kind, outcome),
            Target::Navigate { to } => self.complete_navigation(ticket, to, outcome),
            Target::Restore { view } => self.complete_restore(ticket, view, outcome),
            Target::Overlay(session) => self.complete_overlay(ticket, session, outcome),
        }
    }

    pub fn stack(&self) -> &NavigationStack {
        &self.stack
    }

    pub fn current_view(&self) -> &View {
        self.stack.current_view()
    }

    pub fn breadcrumbs(&self) -> String {
        self.stack.trail()
    }

    pub fn overlay(&self) -> &DetailOverlay {
        &self.overlay
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn table(&self) -> &TableState {
        &self.table
    }

    pub fn pending(&self) -> impl Iterator<Item = &Ticket> {
        self.pending.values()
    }

    pub fn is_busy(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_control_busy(&self, control: &Control) -> bool {
        self.pending.values().any(|ticket| &ticket.control == control)
    }

    /// Description of the newest outstanding request, for the busy indicator.
    pub fn busy_label(&self) -> Option<String> {
        self.pending
            .values()
            .next_back()
            .map(|ticket| ticket.request.describe())
    }

    pub fn current_dataset(&self) -> Option<&Dataset> {
        self.store
            .get(&self.current_view().source())
            .map(|dataset| dataset.as_ref())
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        let records = self.current_dataset().map(Dataset::records).unwrap_or(&[]);
        columns_for(self.current_view(), records, &self.kpis)
    }

    pub fn table_view(&self) -> Option<TableView<'_>> {
        let dataset = self.current_dataset()?;
        Some(render(
            dataset.records(),
            self.table.query(),
            self.table.page_size(),
        ))
    }

    pub fn row(&self, index: usize) -> Option<&Record> {
        self.table_view()?.rows.get(index).copied()
    }

    /// Every filtered and sorted row of the current view, not just the page.
    pub fn export(&self) -> Result<Export> {
        let Some(dataset) = self.current_dataset() else {
            anyhow::bail!("nothing to export: {} is not loaded", self.stack.current().title);
        };
        let rows = matching_rows(dataset.records(), self.table.query());
        let columns = self.columns();
        let contents = export_flat(rows.iter().copied(), &columns)?;
        Ok(Export {
            file_name: export_file_name(&self.stack.current().title),
            contents,
            rows: rows.len(),
        })
    }

    fn switch_root(&mut self, kind: SourceKind) -> Vec<SessionEvent> {
        let root = View::RootList(kind);
        if self.stack.depth() == 1 && self.current_view() == &root {
            return vec![SessionEvent::Ignored(format!("already on {}", kind.label()))];
        }
        self.drop_pending_navigation();
        self.stack.reset(root);
        self.prune_store();
        info!(root = kind.as_str(), "switched root list");

        let mut events = vec![SessionEvent::Returned {
            title: kind.label().to_owned(),
            depth: 1,
        }];
        events.extend(self.show_current());
        events
    }

    fn activate_cell(&mut self, row: usize, column: &str) -> Vec<SessionEvent> {
        let view = self.current_view().clone();
        let View::RootList(kind) = view else {
            return vec![SessionEvent::Ignored(
                "cells only drill down from a root list".to_owned(),
            )];
        };
        let Some(record) = self.row(row) else {
            return vec![SessionEvent::Ignored(format!("no row {row}"))];
        };
        let columns = self.columns();
        let Some(spec) = columns.iter().find(|spec| spec.key == column) else {
            return vec![SessionEvent::Ignored(format!("no column {column}"))];
        };
        if !spec.clickable {
            return vec![SessionEvent::Ignored(format!(
                "{} does not drill down",
                spec.label
            ))];
        }
        if !spec.triggers_on(record) {
            return vec![SessionEvent::Ignored(format!("{} is zero", spec.label))];
        }
        let Some(row_key) = record.key_for(kind) else {
            return vec![SessionEvent::Ignored(format!(
                "row has no {} name",
                kind.as_str().trim_end_matches('s')
            ))];
        };

        let to = match kind {
            SourceKind::Warehouse => View::DrillDown {
                kind,
                source_key: row_key.clone(),
                dimension: column.to_owned(),
            },
            SourceKind::User => View::QueryList {
                origin: Origin::Root(kind),
                selection: QuerySelection::Flag {
                    user: row_key.clone(),
                    dimension: column.to_owned(),
                },
            },
        };
        let control = Control::Cell {
            view: view.clone(),
            row_key,
            column: column.to_owned(),
        };
        self.navigate(control, to)
    }

    fn view_queries(&mut self, row: usize) -> Vec<SessionEvent> {
        let view = self.current_view().clone();
        let View::DrillDown {
            kind,
            source_key,
            dimension,
        } = &view
        else {
            return vec![SessionEvent::Ignored(
                "view queries needs a drill-down row".to_owned(),
            )];
        };
        let Some(record) = self.row(row) else {
            return vec![SessionEvent::Ignored(format!("no row {row}"))];
        };
        let ids = record.query_ids();
        if ids.is_empty() {
            return vec![SessionEvent::Ignored(
                "no query ids on this row".to_owned(),
            )];
        }
        let user = record
            .key_for(SourceKind::User)
            .unwrap_or_else(|| source_key.clone());

        let to = View::QueryList {
            origin: Origin::DrillDown {
                kind: *kind,
                source_key: source_key.clone(),
                dimension: dimension.clone(),
            },
            selection: QuerySelection::Ids {
                user: user.clone(),
                ids,
            },
        };
        let control = Control::ViewQueries {
            view: view.clone(),
            row_key: user,
        };
        self.navigate(control, to)
    }

    fn view_details(&mut self, row: usize) -> Vec<SessionEvent> {
        let Some(record) = self.row(row) else {
            return vec![SessionEvent::Ignored(format!("no row {row}"))];
        };
        let Some(query_id) = record.query_id() else {
            return vec![SessionEvent::Ignored("row has no query id".to_owned())];
        };

        self.pending
            .retain(|_, ticket| !matches!(ticket.target, Target::Overlay(_)));
        let session = self.overlay.open(query_id.clone());
        debug!(query = %query_id, session = %session, "opened detail overlay");
        let ticket = self.issue(
            Control::Detail,
            Target::Overlay(session),
            FetchRequest::QueryDetail(query_id.clone()),
        );
        vec![
            SessionEvent::OverlayOpened(query_id),
            SessionEvent::Fetch(ticket),
        ]
    }

    fn close_overlay(&mut self) -> Vec<SessionEvent> {
        self.pending
            .retain(|_, ticket| !matches!(ticket.target, Target::Overlay(_)));
        if self.overlay.close() {
            vec![SessionEvent::OverlayClosed]
        } else {
            vec![SessionEvent::Ignored("no detail open".to_owned())]
        }
    }

    fn back(&mut self) -> Vec<SessionEvent> {
        let Some(left) = self.stack.pop() else {
            return vec![SessionEvent::Ignored("already at the top level".to_owned())];
        };
        info!(from = %left.title, to = %self.stack.current().title, "navigated back");
        self.after_pop()
    }

    fn home(&mut self) -> Vec<SessionEvent> {
        if self.stack.pop_to_root() == 0 {
            return vec![SessionEvent::Ignored("already at the top level".to_owned())];
        }
        info!(to = %self.stack.current().title, "returned to root list");
        self.after_pop()
    }

    fn after_pop(&mut self) -> Vec<SessionEvent> {
        self.drop_pending_navigation();
        self.prune_store();
        let current = self.stack.current();
        let mut events = vec![SessionEvent::Returned {
            title: current.title.clone(),
            depth: self.stack.depth(),
        }];
        events.extend(self.show_current());
        events
    }

    /// Bind the table to the current view's dataset, or fetch it when it is
    /// no longer in the store.
    fn show_current(&mut self) -> Vec<SessionEvent> {
        let view = self.current_view().clone();
        let generation = self
            .store
            .get(&view.source())
            .map(|dataset| dataset.generation());
        if let Some(generation) = generation {
            let saved = self.stack.current().saved.clone();
            self.table.restore(saved.as_ref(), generation);
            return Vec::new();
        }
        self.table.detach();
        match view {
            View::RootList(kind) => self.load_root(kind),
            view => self.load_restore(view),
        }
    }

    /// A root list asks the backend to rebuild its cache first; deeper views
    /// refetch in place.
    fn refresh(&mut self) -> Vec<SessionEvent> {
        match self.current_view().clone() {
            View::RootList(kind) => self.request_root(kind, FetchRequest::Reload(kind)),
            view => self.load_restore(view),
        }
    }

    fn retry(&mut self) -> Vec<SessionEvent> {
        let Some(retry) = self.notice.as_ref().and_then(|notice| notice.retry.clone()) else {
            return vec![SessionEvent::Ignored("nothing to retry".to_owned())];
        };
        let mut events = Vec::new();
        match retry {
            RetryAction::RootLoad(kind) => {
                self.notice = None;
                events.push(SessionEvent::NoticeCleared);
                events.extend(self.load_root(kind));
            }
            RetryAction::Restore(view) => {
                if self.current_view() != &view {
                    return vec![SessionEvent::Ignored(
                        "the failed view is no longer shown".to_owned(),
                    )];
                }
                self.notice = None;
                events.push(SessionEvent::NoticeCleared);
                events.extend(self.load_restore(view));
            }
        }
        events
    }

    fn table_command(&mut self, command: TableCommand) -> Vec<SessionEvent> {
        let Some(dataset) = self.current_dataset() else {
            return vec![SessionEvent::Ignored("no data loaded".to_owned())];
        };
        if let TableCommand::ToggleSort(key) = &command {
            let sortable = self
                .columns()
                .iter()
                .any(|spec| &spec.key == key && spec.sortable);
            if !sortable {
                return vec![SessionEvent::Table(TableEvent::Status(
                    TableStatus::SortUnavailable,
                ))];
            }
        }
        let matched = matching_rows(dataset.records(), self.table.query()).len();
        let pages = total_pages(matched, self.table.page_size());
        self.table
            .dispatch(command, pages)
            .into_iter()
            .map(SessionEvent::Table)
            .collect()
    }

    fn navigate(&mut self, control: Control, to: View) -> Vec<SessionEvent> {
        if self.is_control_busy(&control) {
            return vec![SessionEvent::Busy(format!("{} is still loading", to.title()))];
        }
        self.drop_pending_navigation();

        let request = to.request();
        let ticket = self.issue(control, Target::Navigate { to: to.clone() }, request);
        self.latest_navigation = Some(ticket.id);
        vec![
            SessionEvent::Status(format!("loading {}", to.title())),
            SessionEvent::Fetch(ticket),
        ]
    }

    /// Forget outstanding navigation requests; their responses are discarded.
    fn drop_pending_navigation(&mut self) {
        self.latest_navigation = None;
        self.pending.retain(|id, ticket| {
            if ticket.is_navigation() {
                debug!(request = %id, "navigation request superseded");
                return false;
            }
            true
        });
    }

    fn load_root(&mut self, kind: SourceKind) -> Vec<SessionEvent> {
        self.request_root(kind, FetchRequest::List(kind))
    }

    fn request_root(&mut self, kind: SourceKind, request: FetchRequest) -> Vec<SessionEvent> {
        let control = Control::RootLoad(kind);
        if self.is_control_busy(&control) {
            return vec![SessionEvent::Busy(format!("{} is still loading", kind.label()))];
        }
        let ticket = self.issue(control, Target::Root(kind), request);
        vec![SessionEvent::Fetch(ticket)]
    }

    fn load_restore(&mut self, view: View) -> Vec<SessionEvent> {
        let control = Control::Restore(view.clone());
        if self.is_control_busy(&control) {
            return vec![SessionEvent::Busy(format!("{} is still loading", view.title()))];
        }
        let request = view.request();
        let ticket = self.issue(control, Target::Restore { view }, request);
        vec![SessionEvent::Fetch(ticket)]
    }

    fn issue(&mut self, control: Control, target: Target, request: FetchRequest) -> Ticket {
        self.last_request = self.last_request.next();
        let ticket = Ticket {
            id: self.last_request,
            control,
            requested_from: self.current_view().clone(),
            target,
            request,
        };
        debug!(request = %ticket.id, what = %ticket.request.describe(), "issuing fetch");
        self.pending.insert(ticket.id, ticket.clone());
        ticket
    }

    fn complete_root(
        &mut self,
        ticket: Ticket,
        kind: SourceKind,
        outcome: Result<Payload, FetchError>,
    ) -> Vec<SessionEvent> {
        let newer_pending = self
            .pending
            .values()
            .any(|other| other.target == Target::Root(kind) && other.id > ticket.id);
        if newer_pending {
            return vec![SessionEvent::Discarded {
                id: ticket.id,
                reason: "newer load pending",
            }];
        }
        match outcome.and_then(Payload::into_records) {
            Ok(records) => {
                let mut events = vec![self.store_dataset(DatasetSource::root(kind), records)];
                if self.current_view() == &View::RootList(kind) {
                    let generation = self
                        .store
                        .get(&DatasetSource::root(kind))
                        .map(|dataset| dataset.generation());
                    if let Some(generation) = generation {
                        self.table.sync(generation);
                    }
                }
                if self
                    .notice
                    .as_ref()
                    .is_some_and(|notice| notice.retry == Some(RetryAction::RootLoad(kind)))
                {
                    self.notice = None;
                    events.push(SessionEvent::NoticeCleared);
                }
                events
            }
            Err(error) => vec![self.raise_notice(
                &ticket,
                &error,
                Some(RetryAction::RootLoad(kind)),
            )],
        }
    }

    fn complete_navigation(
        &mut self,
        ticket: Ticket,
        to: View,
        outcome: Result<Payload, FetchError>,
    ) -> Vec<SessionEvent> {
        if self.latest_navigation != Some(ticket.id) {
            return vec![SessionEvent::Discarded {
                id: ticket.id,
                reason: "superseded",
            }];
        }
        self.latest_navigation = None;
        if self.current_view() != &ticket.requested_from {
            debug!(request = %ticket.id, "discarding navigation for a view no longer shown");
            return vec![SessionEvent::Discarded {
                id: ticket.id,
                reason: "view changed",
            }];
        }

        let records = match outcome.and_then(Payload::into_records) {
            Ok(records) => records,
            Err(error) => return vec![self.raise_notice(&ticket, &error, None)],
        };
        let found = records.len();
        let mut events = vec![self.store_dataset(to.source(), records)];

        self.stack.current_mut().saved = self.table.snapshot();
        self.stack.push(BreadcrumbEntry::new(to.clone()));
        let generation = self
            .store
            .get(&to.source())
            .map(|dataset| dataset.generation());
        if let Some(generation) = generation {
            self.table.sync(generation);
        }
        info!(to = %self.stack.current().title, depth = self.stack.depth(), "navigated");
        events.push(SessionEvent::Navigated {
            title: self.stack.current().title.clone(),
            depth: self.stack.depth(),
        });

        if let View::QueryList {
            selection: QuerySelection::Ids { ids, .. },
            ..
        } = &to
        {
            let requested = unique_ids(ids).len();
            if found < requested {
                events.push(SessionEvent::Status(format!(
                    "{found} of {requested} queries found"
                )));
            }
        }
        events
    }

    fn complete_restore(
        &mut self,
        ticket: Ticket,
        view: View,
        outcome: Result<Payload, FetchError>,
    ) -> Vec<SessionEvent> {
        if self.current_view() != &view {
            return vec![SessionEvent::Discarded {
                id: ticket.id,
                reason: "view changed",
            }];
        }
        match outcome.and_then(Payload::into_records) {
            Ok(records) => {
                let event = self.store_dataset(view.source(), records);
                let generation = self
                    .store
                    .get(&view.source())
                    .map(|dataset| dataset.generation());
                if let Some(generation) = generation {
                    self.table.sync(generation);
                }
                vec![event]
            }
            Err(error) => vec![self.raise_notice(
                &ticket,
                &error,
                Some(RetryAction::Restore(view)),
            )],
        }
    }

    fn complete_overlay(
        &mut self,
        ticket: Ticket,
        session: OverlaySessionId,
        outcome: Result<Payload, FetchError>,
    ) -> Vec<SessionEvent> {
        let result = outcome.and_then(Payload::into_record);
        if let Err(error) = &result {
            warn!(request = %ticket.id, error = %error, "detail load failed");
        }
        match self.overlay.complete(session, result) {
            OverlayOutcome::Applied => vec![SessionEvent::OverlayUpdated],
            OverlayOutcome::Stale => vec![SessionEvent::Discarded {
                id: ticket.id,
                reason: "overlay closed or replaced",
            }],
        }
    }

    fn store_dataset(&mut self, source: DatasetSource, records: Vec<Record>) -> SessionEvent {
        let dataset = self.store.insert(Dataset::new(source.clone(), records));
        debug!(
            source = source.as_str(),
            generation = %dataset.generation(),
            rows = dataset.len(),
            "stored dataset"
        );
        SessionEvent::DatasetLoaded {
            source,
            rows: dataset.len(),
        }
    }

    fn raise_notice(
        &mut self,
        ticket: &Ticket,
        error: &FetchError,
        retry: Option<RetryAction>,
    ) -> SessionEvent {
        warn!(
            request = %ticket.id,
            kind = error.kind(),
            error = %error,
            "{} failed",
            ticket.request.describe()
        );
        self.last_notice = self.last_notice.next();
        let notice = Notice {
            id: self.last_notice,
            message: format!("{} failed: {error}", ticket.request.describe()),
            suggestion: error.suggestion(),
            retry,
        };
        self.notice = Some(notice.clone());
        SessionEvent::NoticeRaised(notice)
    }

    /// Keep root lists and datasets the breadcrumb trail can return to.
    fn prune_store(&mut self) {
        let mut keep: BTreeSet<DatasetSource> = self
            .stack
            .entries()
            .iter()
            .map(|entry| entry.view.source())
            .collect();
        keep.extend(SourceKind::ALL.map(DatasetSource::root));
        let evicted = self.store.retain_sources(&keep);
        if evicted > 0 {
            debug!(evicted, "pruned datasets no longer reachable");
        }
    }
}
