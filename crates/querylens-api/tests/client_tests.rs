// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use querylens_api::Client;
use querylens_app::{AnalyticsSource, FetchError, FetchRequest, Payload, QueryId, SourceKind};
use serde_json::{Value, json};
use std::io::Read;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Method, Response, Server};

struct Exchange {
    method: Method,
    url: String,
    body: Option<Value>,
}

/// Serve `responses` in order, returning what each request looked like.
fn serve(responses: Vec<(u16, String)>) -> Result<(String, JoinHandle<Vec<Exchange>>)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let mut request = server.recv().expect("request expected");
            let mut raw = String::new();
            request
                .as_reader()
                .read_to_string(&mut raw)
                .expect("request body should be readable");
            seen.push(Exchange {
                method: request.method().clone(),
                url: request.url().to_owned(),
                body: serde_json::from_str(&raw).ok(),
            });
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(
                    Header::from_bytes("Content-Type", "application/json")
                        .expect("valid content type header"),
                );
            request.respond(response).expect("response should succeed");
        }
        seen
    });
    Ok((addr, handle))
}

fn ok(data: Value) -> (u16, String) {
    (200, json!({"success": true, "data": data}).to_string())
}

#[test]
fn list_endpoints_decode_records_in_field_order() -> Result<()> {
    let (addr, handle) = serve(vec![
        ok(json!([{"WAREHOUSE_NAME": "WH1", "QUERIES_1_10_SEC": 5, "ACTIVE": true}])),
        ok(json!([{"USER_NAME": "alice", "SPILLED_QUERIES": 2}])),
    ])?;

    let client = Client::new(&addr, Duration::from_secs(2))?;
    let warehouses = client.list_warehouses()?;
    let users = client.list_users()?;

    assert_eq!(warehouses.len(), 1);
    let keys: Vec<&str> = warehouses[0].keys().collect();
    assert_eq!(keys, ["WAREHOUSE_NAME", "QUERIES_1_10_SEC", "ACTIVE"]);
    assert_eq!(users[0].text("USER_NAME"), "alice");

    let seen = handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    assert_eq!(seen[0].method, Method::Get);
    assert_eq!(seen[0].url, "/warehouses");
    assert_eq!(seen[1].url, "/users");
    Ok(())
}

#[test]
fn drill_downs_post_the_expected_bodies() -> Result<()> {
    let (addr, handle) = serve(vec![
        ok(json!([{"username": "alice", "query_count": 2, "query_ids": ["q1", "q2"]}])),
        ok(json!([{"QUERY_ID": "q7", "USER_NAME": "alice"}])),
    ])?;

    let client = Client::new(&addr, Duration::from_secs(2))?;
    let rows = client.warehouse_drill_down("WH1", "QUERIES_1_10_SEC")?;
    assert_eq!(rows[0].query_ids(), vec![QueryId::from("q1"), QueryId::from("q2")]);
    let queries = client.user_drill_down("alice", "SPILLED_QUERIES")?;
    assert_eq!(queries[0].query_id(), Some(QueryId::from("q7")));

    let seen = handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    assert_eq!(seen[0].method, Method::Post);
    assert_eq!(seen[0].url, "/warehouses/drill-down");
    assert_eq!(
        seen[0].body,
        Some(json!({"warehouse_name": "WH1", "selected_kpi_column": "QUERIES_1_10_SEC"}))
    );
    assert_eq!(seen[1].url, "/users/drill-down");
    assert_eq!(
        seen[1].body,
        Some(json!({"username": "alice", "selected_kpi_column": "SPILLED_QUERIES"}))
    );
    Ok(())
}

#[test]
fn batch_sends_each_id_once() -> Result<()> {
    let (addr, handle) = serve(vec![(
        200,
        json!({
            "success": true,
            "data": [{"QUERY_ID": "q1"}],
            "missing_query_ids": ["q2"],
        })
        .to_string(),
    )])?;

    let client = Client::new(&addr, Duration::from_secs(2))?;
    let ids = ["q1", "q2", "q1"].map(QueryId::from);
    let rows = client.queries_by_ids(&ids)?;
    assert_eq!(rows.len(), 1);

    let seen = handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    assert_eq!(seen[0].url, "/queries/batch");
    assert_eq!(seen[0].body, Some(json!({"query_ids": ["q1", "q2"]})));
    Ok(())
}

#[test]
fn empty_batch_skips_the_network() -> Result<()> {
    let client = Client::new("http://127.0.0.1:1", Duration::from_millis(50))?;
    assert!(client.queries_by_ids(&[])?.is_empty());
    Ok(())
}

#[test]
fn query_detail_returns_single_record() -> Result<()> {
    let (addr, handle) = serve(vec![ok(json!({"QUERY_ID": "q1", "QUERY_TEXT": "select 1"}))])?;

    let client = Client::new(&addr, Duration::from_secs(2))?;
    let record = client.query_detail(&QueryId::from("q1"))?;
    assert_eq!(record.text("QUERY_TEXT"), "select 1");

    let seen = handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    assert_eq!(seen[0].url, "/query-details/q1");
    Ok(())
}

#[test]
fn failures_map_to_the_error_taxonomy() -> Result<()> {
    let (addr, handle) = serve(vec![
        (
            404,
            json!({"success": false, "error": "Query not found", "message": "No query found with ID: q9"})
                .to_string(),
        ),
        (200, json!({"success": false, "message": "cache not loaded"}).to_string()),
        (200, "not json".to_owned()),
        (200, json!({"data": []}).to_string()),
        (200, json!({"success": true}).to_string()),
    ])?;

    let client = Client::new(&addr, Duration::from_secs(2))?;

    let error = client
        .query_detail(&QueryId::from("q9"))
        .expect_err("404 should fail");
    assert!(matches!(error, FetchError::Status { status: 404, .. }));

    let error = client.list_users().expect_err("success:false should fail");
    assert_eq!(error, FetchError::Rejected("cache not loaded".to_owned()));

    let error = client.list_users().expect_err("bad json should fail");
    assert!(matches!(error, FetchError::Protocol(_)));

    let error = client.list_users().expect_err("missing success should fail");
    assert!(matches!(error, FetchError::Protocol(_)));

    let error = client.list_users().expect_err("missing data should fail");
    assert!(matches!(error, FetchError::Protocol(_)));

    handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    Ok(())
}

#[test]
fn unreachable_server_is_a_transport_error() -> Result<()> {
    let client = Client::new("http://127.0.0.1:1", Duration::from_millis(200))?;
    let error = client.list_warehouses().expect_err("nothing listens on port 1");
    assert!(matches!(error, FetchError::Transport { .. }));
    assert!(error.suggestion().contains("base_url"));
    Ok(())
}

#[test]
fn health_reports_cached_counts() -> Result<()> {
    let (addr, handle) = serve(vec![(
        200,
        json!({
            "success": true,
            "message": "Analytics API is running",
            "cached_data": {"users": 3, "warehouses": 2, "queries": 40},
        })
        .to_string(),
    )])?;

    let client = Client::new(&addr, Duration::from_secs(2))?;
    let health = client.health()?;
    assert_eq!(health.message, "Analytics API is running");
    assert_eq!(health.cached.map(|counts| counts.queries), Some(40));

    let seen = handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    assert_eq!(seen[0].url, "/health");
    Ok(())
}

#[test]
fn root_reload_posts_refresh_cache_then_lists() -> Result<()> {
    let (addr, handle) = serve(vec![
        (
            200,
            json!({
                "success": true,
                "message": "Cache refreshed successfully",
                "cached_data": {"users": 3, "warehouses": 1, "queries": 40},
            })
            .to_string(),
        ),
        ok(json!([{"WAREHOUSE_NAME": "WH1"}])),
    ])?;

    let client = Client::new(&addr, Duration::from_secs(2))?;
    let payload = client.fetch(&FetchRequest::Reload(SourceKind::Warehouse))?;
    assert!(matches!(payload, Payload::Records(ref rows) if rows.len() == 1));

    let seen = handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    assert_eq!(seen[0].method, Method::Post);
    assert_eq!(seen[0].url, "/refresh-cache");
    assert_eq!(seen[1].method, Method::Get);
    assert_eq!(seen[1].url, "/warehouses");
    Ok(())
}

#[test]
fn failed_cache_refresh_is_rejected() -> Result<()> {
    let (addr, handle) = serve(vec![(
        500,
        json!({
            "success": false,
            "error": "Failed to refresh cache",
            "message": "warehouse unreachable",
        })
        .to_string(),
    )])?;

    let client = Client::new(&addr, Duration::from_secs(2))?;
    let error = client.refresh_cache().expect_err("server reports failure");
    assert_eq!(
        error,
        FetchError::Status {
            status: 500,
            message: "Failed to refresh cache: warehouse unreachable".to_owned(),
        }
    );
    handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    Ok(())
}

#[test]
fn kpi_columns_decode_both_lists() -> Result<()> {
    let (addr, handle) = serve(vec![
        ok(json!({
            "user_clickable_cols": ["SPILLED_QUERIES", "REPEATED_QUERIES"],
            "warehouse_clickable_cols": ["QUERIES_1_10_SEC"],
            "all_clickable_cols": ["SPILLED_QUERIES", "REPEATED_QUERIES", "QUERIES_1_10_SEC"],
        })),
        ok(json!(["QUERIES_1_10_SEC"])),
    ])?;

    let client = Client::new(&addr, Duration::from_secs(2))?;
    let kpis = client.kpi_columns()?;
    assert_eq!(kpis.warehouse, ["QUERIES_1_10_SEC"]);
    assert_eq!(kpis.user, ["SPILLED_QUERIES", "REPEATED_QUERIES"]);

    let error = client.kpi_columns().expect_err("a bare list is the wrong shape");
    assert!(matches!(error, FetchError::Protocol(ref message) if message.contains("/kpi-columns")));

    let seen = handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    assert!(seen.iter().all(|exchange| exchange.method == Method::Get));
    assert_eq!(seen[0].url, "/kpi-columns");
    Ok(())
}
