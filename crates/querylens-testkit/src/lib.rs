// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Deterministic analytics fixtures and an in-memory [`AnalyticsSource`].

use querylens_app::{
    AnalyticsSource, FetchError, KpiColumns, QueryId, Record, USER_KPI_COLUMNS,
    WAREHOUSE_KPI_COLUMNS, unique_ids,
};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::macros::datetime;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

const WAREHOUSE_NAMES: [&str; 8] = [
    "COMPUTE_WH",
    "ANALYTICS_WH",
    "ETL_WH",
    "REPORTING_WH",
    "DATA_SCIENCE_WH",
    "ADHOC_WH",
    "LOADING_WH",
    "BI_WH",
];

const WAREHOUSE_SIZES: [&str; 5] = ["X-Small", "Small", "Medium", "Large", "X-Large"];

const FIRST_NAMES: [&str; 16] = [
    "AVERY", "JORDAN", "TAYLOR", "RILEY", "MORGAN", "CASEY", "ALEX", "QUINN", "PARKER", "DREW",
    "KAI", "ELLIOT", "ROBIN", "CAMERON", "HAYDEN", "ROWAN",
];
const LAST_NAMES: [&str; 12] = [
    "WALKER", "MARTIN", "HILL", "EVANS", "LOPEZ", "GRAY", "WARD", "YOUNG", "DIAZ", "REED",
    "TURNER", "FLORES",
];

const TABLES: [&str; 10] = [
    "ORDERS",
    "CUSTOMERS",
    "EVENTS",
    "SESSIONS",
    "INVOICES",
    "SHIPMENTS",
    "PAGE_VIEWS",
    "INVENTORY",
    "PAYMENTS",
    "CAMPAIGNS",
];

const QUERY_TYPES: [&str; 5] = ["SELECT", "INSERT", "MERGE", "CREATE_TABLE_AS_SELECT", "UPDATE"];

/// Flags that are not derived from timings or status.
const PATTERN_FLAGS: [&str; 9] = [
    "OVER_PROVISIONED_QUERIES",
    "PEAK_HOUR_LONG_RUNNING_QUERIES",
    "SELECT_STAR_QUERIES",
    "UNPARTITIONED_SCAN_QUERIES",
    "REPEATED_QUERIES",
    "COMPLEX_JOIN_QUERIES",
    "ZERO_RESULT_QUERIES",
    "HIGH_COMPILE_QUERIES",
    "FAILED_CANCELLED_QUERIES",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    /// True with probability `percent / 100`.
    fn chance(&mut self, percent: u64) -> bool {
        self.next_u64() % 100 < percent
    }
}

/// Raw query rows plus the warehouse and user rollups derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsFixture {
    pub warehouses: Vec<Record>,
    pub users: Vec<Record>,
    pub queries: Vec<Record>,
}

#[derive(Debug, Clone)]
pub struct AnalyticsFaker {
    rng: DeterministicRng,
    seed: u64,
}

impl AnalyticsFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn warehouse_names(&mut self, count: usize) -> Vec<String> {
        WAREHOUSE_NAMES
            .iter()
            .take(count.clamp(1, WAREHOUSE_NAMES.len()))
            .map(|name| (*name).to_owned())
            .collect()
    }

    pub fn user_names(&mut self, count: usize) -> Vec<String> {
        let mut names = BTreeSet::new();
        let limit = count.clamp(1, FIRST_NAMES.len() * LAST_NAMES.len());
        while names.len() < limit {
            names.insert(format!(
                "{}.{}",
                self.pick(&FIRST_NAMES),
                self.pick(&LAST_NAMES)
            ));
        }
        names.into_iter().collect()
    }

    /// One query row with every KPI flag set as a boolean.
    pub fn query(&mut self, index: usize, warehouse: &str, user: &str) -> Record {
        let execution_secs = self.execution_secs();
        let queued_secs = self.queued_secs();
        let failed = self.rng.chance(8);
        let spilled_local = execution_secs > 60 && self.rng.chance(30);
        let spilled_remote = spilled_local && self.rng.chance(30);
        let start = reference_now()
            - TimeDuration::minutes(i64::try_from(self.int_n(7 * 24 * 60)).unwrap_or(0));
        let table = self.pick(&TABLES);
        let text = self.query_text(table);

        let mut fields = Map::new();
        fields.insert("QUERY_ID".to_owned(), json!(self.query_id(index)));
        fields.insert("USER_NAME".to_owned(), json!(user));
        fields.insert("WAREHOUSE_NAME".to_owned(), json!(warehouse));
        fields.insert("QUERY_TYPE".to_owned(), json!(self.pick(&QUERY_TYPES)));
        fields.insert(
            "EXECUTION_STATUS".to_owned(),
            json!(if failed { "FAIL" } else { "SUCCESS" }),
        );
        fields.insert(
            "START_TIME".to_owned(),
            json!(start.format(&Rfc3339).unwrap_or_default()),
        );
        fields.insert("EXECUTION_TIME_SEC".to_owned(), json!(execution_secs));
        fields.insert("QUEUED_TIME_SEC".to_owned(), json!(queued_secs));
        fields.insert(
            "BYTES_SCANNED".to_owned(),
            json!(self.rng.next_u64() % 50_000_000_000),
        );
        fields.insert(
            "ROWS_PRODUCED".to_owned(),
            json!(self.rng.next_u64() % 2_000_000),
        );
        fields.insert("QUERY_TEXT".to_owned(), json!(text));

        let duration_bucket = duration_bucket(execution_secs);
        let queue_bucket = queue_bucket(queued_secs);
        for column in WAREHOUSE_KPI_COLUMNS.iter().chain(USER_KPI_COLUMNS.iter()) {
            if fields.contains_key(*column) {
                continue;
            }
            let flag = match *column {
                "FAILED_QUERIES" => failed,
                "SUCCESSFUL_QUERIES" => !failed,
                "QUERIES_SPILLED_LOCAL" => spilled_local,
                "QUERIES_SPILLED_REMOTE" => spilled_remote,
                "SPILLED_QUERIES" => spilled_local || spilled_remote,
                other if other.starts_with("QUERIES_") => duration_bucket == Some(other),
                other if other.starts_with("QUEUED_") => queue_bucket == Some(other),
                other if PATTERN_FLAGS.contains(&other) => self.rng.chance(15),
                _ => false,
            };
            fields.insert((*column).to_owned(), json!(flag));
        }
        Record::new(fields)
    }

    /// A consistent dataset: rollup counts always match the query rows.
    pub fn fixture(&mut self, warehouses: usize, users: usize, queries: usize) -> AnalyticsFixture {
        let warehouse_names = self.warehouse_names(warehouses);
        let user_names = self.user_names(users);
        let rows: Vec<Record> = (0..queries)
            .map(|index| {
                let warehouse = warehouse_names[self.int_n(warehouse_names.len())].clone();
                let user = user_names[self.int_n(user_names.len())].clone();
                self.query(index, &warehouse, &user)
            })
            .collect();

        let mut warehouse_rows: Vec<Record> = warehouse_names
            .iter()
            .map(|name| {
                let size = self.pick(&WAREHOUSE_SIZES);
                rollup(
                    &rows,
                    "WAREHOUSE_NAME",
                    name,
                    &WAREHOUSE_KPI_COLUMNS,
                    &[("WAREHOUSE_SIZE", json!(size))],
                )
            })
            .collect();
        sort_desc_by(&mut warehouse_rows, "TOTAL_QUERIES");

        let mut user_rows: Vec<Record> = user_names
            .iter()
            .map(|name| {
                let mut record = rollup(&rows, "USER_NAME", name, &USER_KPI_COLUMNS, &[]);
                let score: f64 = USER_KPI_COLUMNS
                    .iter()
                    .filter_map(|column| record.number(column))
                    .sum();
                let total = record.number("TOTAL_QUERIES").unwrap_or(0.0).max(1.0);
                let weighted = (score / total * 1000.0).round() / 10.0;
                record = with_field(record, "WEIGHTED_SCORE", json!(weighted));
                record
            })
            .collect();
        sort_desc_by(&mut user_rows, "WEIGHTED_SCORE");

        AnalyticsFixture {
            warehouses: warehouse_rows,
            users: user_rows,
            queries: rows,
        }
    }

    fn query_id(&mut self, index: usize) -> String {
        format!("01b{:05x}-{:04x}-{:06x}", self.seed & 0xF_FFFF, index, self.rng.next_u64() & 0xFF_FFFF)
    }

    fn query_text(&mut self, table: &str) -> String {
        let other = self.pick(&TABLES);
        match self.int_n(4) {
            0 => format!("SELECT * FROM ANALYTICS.PUBLIC.{table} WHERE LOADED_AT > DATEADD(day, -7, CURRENT_DATE())"),
            1 => format!(
                "SELECT t.ID, COUNT(*) AS N FROM ANALYTICS.PUBLIC.{table} t JOIN ANALYTICS.PUBLIC.{other} o ON o.{table}_ID = t.ID GROUP BY t.ID ORDER BY N DESC"
            ),
            2 => format!("INSERT INTO STAGING.{table} SELECT * FROM RAW.{table}_LANDING"),
            _ => format!("MERGE INTO ANALYTICS.PUBLIC.{table} USING STAGING.{table} s ON s.ID = {table}.ID WHEN MATCHED THEN UPDATE SET UPDATED_AT = s.UPDATED_AT"),
        }
    }

    fn execution_secs(&mut self) -> u64 {
        match self.int_n(10) {
            0..=2 => self.rng.next_u64() % 10,
            3..=5 => 10 + self.rng.next_u64() % 50,
            6 | 7 => 60 + self.rng.next_u64() % 240,
            _ => 300 + self.rng.next_u64() % 900,
        }
    }

    fn queued_secs(&mut self) -> u64 {
        if self.rng.chance(70) {
            return 0;
        }
        self.rng.next_u64() % 1_500
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

fn duration_bucket(secs: u64) -> Option<&'static str> {
    match secs {
        0 => None,
        1..=9 => Some("QUERIES_1_10_SEC"),
        10..=19 => Some("QUERIES_10_20_SEC"),
        20..=59 => Some("QUERIES_20_60_SEC"),
        60..=179 => Some("QUERIES_1_3_MIN"),
        180..=299 => Some("QUERIES_3_5_MIN"),
        _ => Some("QUERIES_5_PLUS_MIN"),
    }
}

fn queue_bucket(secs: u64) -> Option<&'static str> {
    match secs {
        0..=59 => None,
        60..=119 => Some("QUEUED_1_2_MIN"),
        120..=299 => Some("QUEUED_2_5_MIN"),
        300..=599 => Some("QUEUED_5_10_MIN"),
        600..=1199 => Some("QUEUED_10_20_MIN"),
        _ => Some("QUEUED_20_PLUS_MIN"),
    }
}

fn rollup(
    queries: &[Record],
    key_field: &str,
    key: &str,
    kpis: &[&str],
    extra: &[(&str, Value)],
) -> Record {
    let matching: Vec<&Record> = queries
        .iter()
        .filter(|query| query.text(key_field) == key)
        .collect();
    let mut fields = Map::new();
    fields.insert(key_field.to_owned(), json!(key));
    for (name, value) in extra {
        fields.insert((*name).to_owned(), value.clone());
    }
    fields.insert("TOTAL_QUERIES".to_owned(), json!(matching.len()));
    for kpi in kpis {
        let count = matching.iter().filter(|query| is_flagged(query, kpi)).count();
        fields.insert((*kpi).to_owned(), json!(count));
    }
    let ids: Vec<String> = matching
        .iter()
        .filter_map(|query| query.query_id())
        .map(|id| id.as_str().to_owned())
        .collect();
    fields.insert(
        "QUERY_IDS".to_owned(),
        json!(serde_json::to_string(&ids).unwrap_or_default()),
    );
    Record::new(fields)
}

fn with_field(record: Record, key: &str, value: Value) -> Record {
    let mut fields: Map<String, Value> = record
        .fields()
        .map(|(name, value)| (name.to_owned(), value.clone()))
        .collect();
    fields.insert(key.to_owned(), value);
    Record::new(fields)
}

fn sort_desc_by(rows: &mut [Record], key: &str) {
    rows.sort_by(|left, right| {
        let left = left.number(key).unwrap_or(f64::MIN);
        let right = right.number(key).unwrap_or(f64::MIN);
        right.total_cmp(&left)
    });
}

fn is_flagged(query: &Record, column: &str) -> bool {
    query.get(column) == Some(&Value::Bool(true))
}

fn is_known_kpi(column: &str) -> bool {
    WAREHOUSE_KPI_COLUMNS.contains(&column) || USER_KPI_COLUMNS.contains(&column)
}

fn reference_now() -> OffsetDateTime {
    datetime!(2026-01-15 09:00 UTC)
}

/// In-memory analytics backend with the same filtering and grouping rules as
/// the HTTP API.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    fixture: AnalyticsFixture,
    latency: Duration,
    failure: Option<FetchError>,
}

impl FixtureSource {
    pub fn new(fixture: AnalyticsFixture) -> Self {
        Self {
            fixture,
            latency: Duration::ZERO,
            failure: None,
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(AnalyticsFaker::new(seed).fixture(6, 12, 400))
    }

    /// Sleep this long before answering, to exercise busy states.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every request with `error`.
    pub fn failing(mut self, error: FetchError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn fixture(&self) -> &AnalyticsFixture {
        &self.fixture
    }

    fn begin(&self, what: &str) -> Result<(), FetchError> {
        debug!(what, "fixture request");
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn check_kpi(dimension: &str) -> Result<(), FetchError> {
        if is_known_kpi(dimension) {
            return Ok(());
        }
        Err(FetchError::Status {
            status: 400,
            message: format!("Invalid KPI column: {dimension}"),
        })
    }
}

impl AnalyticsSource for FixtureSource {
    fn list_warehouses(&self) -> Result<Vec<Record>, FetchError> {
        self.begin("warehouses")?;
        Ok(self.fixture.warehouses.clone())
    }

    fn list_users(&self) -> Result<Vec<Record>, FetchError> {
        self.begin("users")?;
        Ok(self.fixture.users.clone())
    }

    fn warehouse_drill_down(
        &self,
        warehouse: &str,
        dimension: &str,
    ) -> Result<Vec<Record>, FetchError> {
        self.begin("warehouse drill-down")?;
        Self::check_kpi(dimension)?;

        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for query in &self.fixture.queries {
            if query.text("WAREHOUSE_NAME") != warehouse || !is_flagged(query, dimension) {
                continue;
            }
            let user = query.text("USER_NAME");
            let id = query.text("QUERY_ID");
            match groups.iter_mut().find(|(name, _)| *name == user) {
                Some((_, ids)) => ids.push(id),
                None => groups.push((user, vec![id])),
            }
        }
        groups.sort_by(|left, right| right.1.len().cmp(&left.1.len()));

        Ok(groups
            .into_iter()
            .map(|(user, ids)| {
                let mut fields = Map::new();
                fields.insert("warehouse_name".to_owned(), json!(warehouse));
                fields.insert("selected_kpi_column".to_owned(), json!(dimension));
                fields.insert("username".to_owned(), json!(user));
                fields.insert("query_count".to_owned(), json!(ids.len()));
                fields.insert("query_ids".to_owned(), json!(ids));
                Record::new(fields)
            })
            .collect())
    }

    fn user_drill_down(&self, user: &str, dimension: &str) -> Result<Vec<Record>, FetchError> {
        self.begin("user drill-down")?;
        Self::check_kpi(dimension)?;
        Ok(self
            .fixture
            .queries
            .iter()
            .filter(|query| query.text("USER_NAME") == user && is_flagged(query, dimension))
            .cloned()
            .collect())
    }

    fn queries_by_ids(&self, ids: &[QueryId]) -> Result<Vec<Record>, FetchError> {
        self.begin("query batch")?;
        let wanted: BTreeSet<QueryId> = unique_ids(ids).into_iter().collect();
        if wanted.is_empty() {
            return Err(FetchError::Status {
                status: 400,
                message: "Empty parameter: query_ids array cannot be empty".to_owned(),
            });
        }
        Ok(self
            .fixture
            .queries
            .iter()
            .filter(|query| query.query_id().is_some_and(|id| wanted.contains(&id)))
            .cloned()
            .collect())
    }

    fn query_detail(&self, id: &QueryId) -> Result<Record, FetchError> {
        self.begin("query detail")?;
        self.fixture
            .queries
            .iter()
            .find(|query| query.query_id().as_ref() == Some(id))
            .cloned()
            .ok_or_else(|| FetchError::Status {
                status: 404,
                message: format!("Query not found: No query found with ID: {id}"),
            })
    }

    /// Fixtures are generated once, so there is nothing to rebuild.
    fn refresh_cache(&self) -> Result<(), FetchError> {
        self.begin("refresh cache")
    }

    fn kpi_columns(&self) -> Result<KpiColumns, FetchError> {
        self.begin("kpi columns")?;
        Ok(KpiColumns::default())
    }
}
