// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::error::FetchError;
use crate::ids::{OverlaySessionId, QueryId};
use crate::model::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayOutcome {
    Applied,
    Stale,
}

/// Single-record detail panel. Each `open` starts a new session; results are
/// accepted only for the session that is still open.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetailOverlay {
    session: OverlaySessionId,
    is_open: bool,
    query_id: Option<QueryId>,
    record: Option<Record>,
    loading: bool,
    error: Option<FetchError>,
}

impl DetailOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or replace) the overlay for `query_id`.
    pub fn open(&mut self, query_id: QueryId) -> OverlaySessionId {
        self.session = self.session.next();
        self.is_open = true;
        self.query_id = Some(query_id);
        self.record = None;
        self.loading = true;
        self.error = None;
        self.session
    }

    pub fn complete(
        &mut self,
        session: OverlaySessionId,
        result: Result<Record, FetchError>,
    ) -> OverlayOutcome {
        if !self.is_open || session != self.session {
            return OverlayOutcome::Stale;
        }
        self.loading = false;
        match result {
            Ok(record) => {
                self.record = Some(record);
                self.error = None;
            }
            Err(error) => {
                self.record = None;
                self.error = Some(error);
            }
        }
        OverlayOutcome::Applied
    }

    /// Clear the overlay and invalidate its session so late results are
    /// dropped.
    pub fn close(&mut self) -> bool {
        let was_open = self.is_open;
        self.session = self.session.next();
        self.is_open = false;
        self.query_id = None;
        self.record = None;
        self.loading = false;
        self.error = None;
        was_open
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn query_id(&self) -> Option<&QueryId> {
        self.query_id.as_ref()
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{DetailOverlay, OverlayOutcome};
    use crate::{FetchError, QueryId, Record};
    use serde_json::json;

    fn detail(id: &str) -> Record {
        Record::from_value(json!({"QUERY_ID": id, "QUERY_TEXT": "select 1"}))
            .expect("object literal")
    }

    #[test]
    fn late_result_for_replaced_session_is_dropped() {
        let mut overlay = DetailOverlay::new();
        let first = overlay.open(QueryId::from("q1"));
        let second = overlay.open(QueryId::from("q2"));

        assert_eq!(overlay.complete(second, Ok(detail("q2"))), OverlayOutcome::Applied);
        assert_eq!(overlay.complete(first, Ok(detail("q1"))), OverlayOutcome::Stale);
        let shown = overlay.record().expect("q2 loaded");
        assert_eq!(shown.text("QUERY_ID"), "q2");
    }

    #[test]
    fn close_invalidates_pending_session() {
        let mut overlay = DetailOverlay::new();
        let session = overlay.open(QueryId::from("q1"));
        assert!(overlay.close());
        assert_eq!(overlay.complete(session, Ok(detail("q1"))), OverlayOutcome::Stale);
        assert!(!overlay.is_open());
        assert!(overlay.record().is_none());
        assert!(!overlay.close());
    }

    #[test]
    fn failure_is_shown_inside_overlay() {
        let mut overlay = DetailOverlay::new();
        let session = overlay.open(QueryId::from("q404"));
        assert!(overlay.is_loading());
        let error = FetchError::Status {
            status: 404,
            message: "query not found".to_owned(),
        };
        assert_eq!(overlay.complete(session, Err(error.clone())), OverlayOutcome::Applied);
        assert!(!overlay.is_loading());
        assert_eq!(overlay.error(), Some(&error));
        assert!(overlay.is_open());
    }
}
