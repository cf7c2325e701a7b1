// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::columns::KpiColumns;
use crate::error::FetchError;
use crate::ids::QueryId;
use crate::model::{Record, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DrillDownRequest {
    pub source_kind: SourceKind,
    pub source_key: String,
    pub dimension: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchRequest {
    List(SourceKind),
    /// Ask the backend to rebuild its cache, then load the list.
    Reload(SourceKind),
    DrillDown(DrillDownRequest),
    QueriesByIds(Vec<QueryId>),
    QueryDetail(QueryId),
}

impl FetchRequest {
    pub fn describe(&self) -> String {
        match self {
            Self::List(kind) => format!("load {}", kind.as_str()),
            Self::Reload(kind) => format!("refresh cache and load {}", kind.as_str()),
            Self::DrillDown(request) => format!(
                "drill {} {} by {}",
                request.source_kind.as_str(),
                request.source_key,
                request.dimension
            ),
            Self::QueriesByIds(ids) => format!("load {} queries", ids.len()),
            Self::QueryDetail(id) => format!("load query {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Records(Vec<Record>),
    Record(Record),
}

impl Payload {
    pub fn into_records(self) -> Result<Vec<Record>, FetchError> {
        match self {
            Self::Records(records) => Ok(records),
            Self::Record(_) => Err(FetchError::protocol("expected a list of records")),
        }
    }

    pub fn into_record(self) -> Result<Record, FetchError> {
        match self {
            Self::Record(record) => Ok(record),
            Self::Records(records) => records
                .into_iter()
                .next()
                .ok_or_else(|| FetchError::protocol("expected a single record")),
        }
    }
}

/// Request contract consumed by the drill-down orchestrator. Implementations
/// must be shareable with worker threads.
pub trait AnalyticsSource: Send + Sync {
    fn list_warehouses(&self) -> Result<Vec<Record>, FetchError>;
    fn list_users(&self) -> Result<Vec<Record>, FetchError>;
    fn warehouse_drill_down(
        &self,
        warehouse: &str,
        dimension: &str,
    ) -> Result<Vec<Record>, FetchError>;
    fn user_drill_down(&self, user: &str, dimension: &str) -> Result<Vec<Record>, FetchError>;
    fn queries_by_ids(&self, ids: &[QueryId]) -> Result<Vec<Record>, FetchError>;
    fn query_detail(&self, id: &QueryId) -> Result<Record, FetchError>;

    /// Rebuild whatever the backend caches. Sources without a cache have
    /// nothing to do.
    fn refresh_cache(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Drill-down columns per root list, as the backend defines them.
    fn kpi_columns(&self) -> Result<KpiColumns, FetchError> {
        Ok(KpiColumns::default())
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Payload, FetchError> {
        match request {
            FetchRequest::List(SourceKind::Warehouse) => {
                self.list_warehouses().map(Payload::Records)
            }
            FetchRequest::List(SourceKind::User) => self.list_users().map(Payload::Records),
            FetchRequest::Reload(kind) => {
                self.refresh_cache()?;
                self.fetch(&FetchRequest::List(*kind))
            }
            FetchRequest::DrillDown(drill) => match drill.source_kind {
                SourceKind::Warehouse => self
                    .warehouse_drill_down(&drill.source_key, &drill.dimension)
                    .map(Payload::Records),
                SourceKind::User => self
                    .user_drill_down(&drill.source_key, &drill.dimension)
                    .map(Payload::Records),
            },
            FetchRequest::QueriesByIds(ids) => self.queries_by_ids(ids).map(Payload::Records),
            FetchRequest::QueryDetail(id) => self.query_detail(id).map(Payload::Record),
        }
    }
}

/// Order-preserving de-duplication for outbound id batches.
pub fn unique_ids(ids: &[QueryId]) -> Vec<QueryId> {
    let mut seen = std::collections::BTreeSet::new();
    ids.iter()
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}
