// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Blocking HTTP client for the analytics API.

use anyhow::{Context, Result, bail};
use querylens_app::{AnalyticsSource, FetchError, KpiColumns, QueryId, Record, unique_ids};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    timeout: Duration,
    http: HttpClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct CachedCounts {
    #[serde(default)]
    pub users: u64,
    #[serde(default)]
    pub warehouses: u64,
    #[serde(default)]
    pub queries: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Health {
    pub message: String,
    pub cached: Option<CachedCounts>,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let parsed =
            Url::parse(&base_url).with_context(|| format!("parse api.base_url {base_url:?}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {:?}",
                parsed.scheme()
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `GET /health`. Errors carry a remediation hint.
    pub fn health(&self) -> Result<Health> {
        let envelope = self
            .send(self.http.get(self.endpoint("/health")), "/health")
            .map_err(|error| anyhow::anyhow!("{error} -- {}", error.suggestion()))?;
        let cached = envelope
            .cached_data
            .map(serde_json::from_value::<CachedCounts>)
            .transpose()
            .context("decode cached_data")?;
        Ok(Health {
            message: envelope.message.unwrap_or_else(|| "ok".to_owned()),
            cached,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get_records(&self, path: &str) -> Result<Vec<Record>, FetchError> {
        let envelope = self.send(self.http.get(self.endpoint(path)), path)?;
        records_from(envelope.into_data()?)
    }

    fn post_records<B: Serialize>(&self, path: &str, body: &B) -> Result<Vec<Record>, FetchError> {
        let envelope = self.send(self.http.post(self.endpoint(path)).json(body), path)?;
        if let Some(missing) = envelope.missing_query_ids.as_ref()
            && !missing.is_empty()
        {
            debug!(path, missing = missing.len(), "batch reported missing query ids");
        }
        records_from(envelope.into_data()?)
    }

    fn send(&self, request: RequestBuilder, path: &str) -> Result<Envelope, FetchError> {
        debug!(path, "sending request");
        let response = request.send().map_err(|error| {
            warn!(path, %error, "request failed");
            connection_error(&self.base_url, &error)
        })?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            warn!(path, status = status.as_u16(), "server returned an error status");
            return Err(clean_error_response(status, &body));
        }

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|error| FetchError::protocol(format!("decode {path}: {error}")))?;
        match envelope.success {
            Some(true) => Ok(envelope),
            Some(false) => Err(FetchError::Rejected(envelope.reason())),
            None => Err(FetchError::protocol(format!(
                "{path}: response has no success field"
            ))),
        }
    }
}

impl AnalyticsSource for Client {
    fn list_warehouses(&self) -> Result<Vec<Record>, FetchError> {
        self.get_records("/warehouses")
    }

    fn list_users(&self) -> Result<Vec<Record>, FetchError> {
        self.get_records("/users")
    }

    fn warehouse_drill_down(
        &self,
        warehouse: &str,
        dimension: &str,
    ) -> Result<Vec<Record>, FetchError> {
        self.post_records(
            "/warehouses/drill-down",
            &WarehouseDrillBody {
                warehouse_name: warehouse,
                selected_kpi_column: dimension,
            },
        )
    }

    fn user_drill_down(&self, user: &str, dimension: &str) -> Result<Vec<Record>, FetchError> {
        self.post_records(
            "/users/drill-down",
            &UserDrillBody {
                username: user,
                selected_kpi_column: dimension,
            },
        )
    }

    fn queries_by_ids(&self, ids: &[QueryId]) -> Result<Vec<Record>, FetchError> {
        let ids = unique_ids(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.post_records("/queries/batch", &BatchBody { query_ids: &ids })
    }

    fn query_detail(&self, id: &QueryId) -> Result<Record, FetchError> {
        let path = format!("/query-details/{}", encode_segment(id.as_str()));
        let envelope = self.send(self.http.get(self.endpoint(&path)), &path)?;
        match envelope.into_data()? {
            Value::Object(fields) => Ok(Record::new(fields)),
            other => Err(FetchError::protocol(format!(
                "{path}: expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// `POST /refresh-cache`. The backend reloads everything it serves.
    fn refresh_cache(&self) -> Result<(), FetchError> {
        let path = "/refresh-cache";
        let envelope = self.send(self.http.post(self.endpoint(path)), path)?;
        let cached = envelope
            .cached_data
            .and_then(|counts| serde_json::from_value::<CachedCounts>(counts).ok())
            .unwrap_or_default();
        info!(
            users = cached.users,
            warehouses = cached.warehouses,
            queries = cached.queries,
            "backend cache refreshed"
        );
        Ok(())
    }

    fn kpi_columns(&self) -> Result<KpiColumns, FetchError> {
        let path = "/kpi-columns";
        let data = self.send(self.http.get(self.endpoint(path)), path)?.into_data()?;
        let body: KpiColumnsBody = serde_json::from_value(data)
            .map_err(|error| FetchError::protocol(format!("decode {path}: {error}")))?;
        Ok(KpiColumns {
            warehouse: body.warehouse_clickable_cols,
            user: body.user_clickable_cols,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: Option<bool>,
    #[serde(default)]
    data: Option<Value>,
    message: Option<String>,
    error: Option<String>,
    missing_query_ids: Option<Vec<Value>>,
    cached_data: Option<Value>,
}

impl Envelope {
    fn into_data(self) -> Result<Value, FetchError> {
        self.data
            .ok_or_else(|| FetchError::protocol("response has no data field"))
    }

    fn reason(&self) -> String {
        match (self.error.as_deref(), self.message.as_deref()) {
            (Some(error), Some(message)) if !message.is_empty() => format!("{error}: {message}"),
            (Some(error), _) => error.to_owned(),
            (None, Some(message)) => message.to_owned(),
            (None, None) => "no reason given".to_owned(),
        }
    }
}

#[derive(Deserialize)]
struct KpiColumnsBody {
    warehouse_clickable_cols: Vec<String>,
    user_clickable_cols: Vec<String>,
}

#[derive(Serialize)]
struct WarehouseDrillBody<'a> {
    warehouse_name: &'a str,
    selected_kpi_column: &'a str,
}

#[derive(Serialize)]
struct UserDrillBody<'a> {
    username: &'a str,
    selected_kpi_column: &'a str,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    query_ids: &'a [QueryId],
}

fn records_from(data: Value) -> Result<Vec<Record>, FetchError> {
    let Value::Array(items) = data else {
        return Err(FetchError::protocol(format!(
            "expected a list of records, got {}",
            json_kind(&data)
        )));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            Record::from_value(item)
                .ok_or_else(|| FetchError::protocol(format!("record {index} is not an object")))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn connection_error(base_url: &str, error: &reqwest::Error) -> FetchError {
    let message = if error.is_timeout() {
        "timed out".to_owned()
    } else {
        error.to_string()
    };
    FetchError::transport(base_url, message)
}

fn clean_error_response(status: StatusCode, body: &str) -> FetchError {
    let message = match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) if envelope.error.is_some() || envelope.message.is_some() => {
            envelope.reason()
        }
        _ if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() => {
            body.trim().to_owned()
        }
        _ => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned(),
    };
    FetchError::Status {
        status: status.as_u16(),
        message,
    }
}
