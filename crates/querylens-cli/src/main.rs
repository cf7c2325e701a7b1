// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use querylens_api::Client;
use querylens_app::{
    AnalyticsSource, Export, Interaction, KpiColumns, Session, SessionEvent, SourceKind,
    TableCommand,
};
use querylens_testkit::FixtureSource;
use runtime::WorkerRuntime;
use std::collections::VecDeque;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEMO_SEED: u64 = 42;
const DEMO_LATENCY: Duration = Duration::from_millis(250);

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `querylens --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;
    let log_path = logging::init(&config)?;
    info!(log = %log_path.display(), demo = options.demo, "querylens starting");

    let source: Arc<dyn AnalyticsSource> = if options.demo {
        Arc::new(FixtureSource::seeded(DEMO_SEED).with_latency(DEMO_LATENCY))
    } else {
        let client = Client::new(&config.api_base_url(), config.api_timeout()?).with_context(|| {
            format!(
                "invalid [api] config in {}; fix base_url/timeout or set QUERYLENS_API_URL",
                options.config_path.display()
            )
        })?;
        if options.check_only {
            println!("{}", check_health(&client)?);
            return Ok(());
        }
        Arc::new(client)
    };
    if options.check_only {
        println!("demo backend ready");
        return Ok(());
    }

    if let Some(kind) = options.export {
        let export = export_headless(
            source.as_ref(),
            kind,
            options.search.as_deref(),
            config.page_size(),
        )?;
        info!(rows = export.rows, file = %export.file_name, "headless export");
        print!("{}", export.contents);
        return Ok(());
    }

    let kpis = load_kpi_columns(source.as_ref());
    let mut session = Session::new(config.default_tab(), config.page_size()).with_kpi_columns(kpis);
    let mut runtime = WorkerRuntime::new(source, config.export_dir());
    querylens_tui::run_app(&mut session, &mut runtime)
}

fn check_health(client: &Client) -> Result<String> {
    let health = client.health()?;
    let mut line = format!("{} is up: {}", client.base_url(), health.message);
    if let Some(cached) = health.cached {
        line.push_str(&format!(
            " ({} warehouses, {} users, {} queries cached)",
            cached.warehouses, cached.users, cached.queries
        ));
    }
    Ok(line)
}

/// Drill-down columns as the backend publishes them; the built-in lists
/// when it cannot say.
fn load_kpi_columns(source: &dyn AnalyticsSource) -> KpiColumns {
    match source.kpi_columns() {
        Ok(kpis) => {
            info!(
                warehouse = kpis.warehouse.len(),
                user = kpis.user.len(),
                "loaded kpi columns"
            );
            kpis
        }
        Err(error) => {
            warn!(%error, "kpi columns unavailable; using built-in lists");
            KpiColumns::default()
        }
    }
}

/// Load one root list, apply the search, and export every matching row the
/// way the `e` key does in the terminal UI.
fn export_headless(
    source: &dyn AnalyticsSource,
    kind: SourceKind,
    search: Option<&str>,
    page_size: usize,
) -> Result<Export> {
    let mut session = Session::new(kind, page_size);
    let events = session.start();
    run_to_completion(&mut session, source, events);
    if let Some(notice) = session.notice() {
        bail!("{} -- {}", notice.message, notice.suggestion);
    }
    if let Some(term) = search {
        let events = session.handle(Interaction::Table(TableCommand::SetSearch(term.to_owned())));
        run_to_completion(&mut session, source, events);
    }
    session.export()
}

fn run_to_completion(session: &mut Session, source: &dyn AnalyticsSource, events: Vec<SessionEvent>) {
    let mut queue = VecDeque::from(events);
    while let Some(event) = queue.pop_front() {
        if let SessionEvent::Fetch(ticket) = event {
            let outcome = source.fetch(&ticket.request);
            queue.extend(session.complete(ticket.id, outcome));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    export: Option<SourceKind>,
    search: Option<String>,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        export: None,
        search: None,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--export" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--export requires warehouses or users"))?;
                let kind = SourceKind::parse(value.as_ref()).ok_or_else(|| {
                    anyhow!(
                        "--export expects warehouses or users, got {:?}",
                        value.as_ref()
                    )
                })?;
                options.export = Some(kind);
            }
            "--search" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--search requires a term"))?;
                options.search = Some(value.as_ref().to_owned());
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    if options.search.is_some() && options.export.is_none() {
        bail!("--search only applies to --export; add --export warehouses or --export users");
    }

    Ok(options)
}

fn print_help() {
    println!("querylens");
    println!("  --config <path>           Use a specific config path");
    println!("  --print-config-path       Print resolved config path");
    println!("  --print-example-config    Print a v1 config template");
    println!("  --demo                    Browse a seeded in-memory backend");
    println!("  --check                   Validate config and ping the API health endpoint");
    println!("  --export <warehouses|users>");
    println!("                            Write the root list as CSV to stdout");
    println!("  --search <term>           Filter rows before --export");
    println!("  --help                    Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, check_health, export_headless, load_kpi_columns, parse_cli_args};
    use anyhow::{Result, anyhow};
    use querylens_api::Client;
    use querylens_app::{KpiColumns, SourceKind};
    use querylens_testkit::FixtureSource;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;
    use tiny_http::{Header, Response, Server};

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/querylens-config.toml")
    }

    fn serve_once(body: &'static str) -> Result<(String, thread::JoinHandle<String>)> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let addr = format!("http://{}", server.server_addr());
        let handle = thread::spawn(move || {
            let request = server.recv().expect("request expected");
            let url = request.url().to_owned();
            let response = Response::from_string(body).with_header(
                Header::from_bytes("Content-Type", "application/json")
                    .expect("valid content type header"),
            );
            request.respond(response).expect("response should succeed");
            url
        });
        Ok((addr, handle))
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                print_config_path: false,
                demo: false,
                print_example: false,
                check_only: false,
                export: None,
                search: None,
                show_help: false,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_config_path_override() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/config.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_config_value() {
        let error = parse_cli_args(vec!["--config"], default_options_path())
            .expect_err("missing config value should fail");
        assert!(error.to_string().contains("--config requires a file path"));
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_argument() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown arg should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn parse_cli_args_sets_print_and_check_flags() -> Result<()> {
        let options = parse_cli_args(
            vec!["--print-config-path", "--print-example-config", "--check"],
            default_options_path(),
        )?;
        assert!(options.print_config_path);
        assert!(!options.demo);
        assert!(options.print_example);
        assert!(options.check_only);
        assert!(!options.show_help);
        Ok(())
    }

    #[test]
    fn parse_cli_args_reads_export_kind_and_search() -> Result<()> {
        let options = parse_cli_args(
            vec!["--demo", "--export", "users", "--search", "spill"],
            default_options_path(),
        )?;
        assert!(options.demo);
        assert_eq!(options.export, Some(SourceKind::User));
        assert_eq!(options.search.as_deref(), Some("spill"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_rejects_unknown_export_kind() {
        let error = parse_cli_args(vec!["--export", "queries"], default_options_path())
            .expect_err("unknown export kind should fail");
        assert!(error.to_string().contains("warehouses or users"));
    }

    #[test]
    fn parse_cli_args_rejects_search_without_export() {
        let error = parse_cli_args(vec!["--search", "wh"], default_options_path())
            .expect_err("search alone should fail");
        assert!(error.to_string().contains("--search only applies to --export"));
    }

    #[test]
    fn parse_cli_args_sets_help_flag_for_long_and_short_variants() -> Result<()> {
        let long = parse_cli_args(vec!["--help"], default_options_path())?;
        assert!(long.show_help);

        let short = parse_cli_args(vec!["-h"], default_options_path())?;
        assert!(short.show_help);
        Ok(())
    }

    #[test]
    fn headless_export_covers_every_row_not_just_one_page() -> Result<()> {
        let source = FixtureSource::seeded(4);
        let users = source.fixture().users.len();
        let export = export_headless(&source, SourceKind::User, None, 2)?;
        assert_eq!(export.rows, users);
        assert_eq!(export.file_name, "Users.csv");
        assert_eq!(export.contents.lines().count(), users + 1);
        Ok(())
    }

    #[test]
    fn headless_export_applies_search() -> Result<()> {
        let source = FixtureSource::seeded(4);
        let first = source
            .fixture()
            .warehouses
            .first()
            .map(|row| row.text("WAREHOUSE_NAME"))
            .ok_or_else(|| anyhow!("fixture has no warehouses"))?;
        let export = export_headless(&source, SourceKind::Warehouse, Some(&first), 50)?;
        assert!(export.rows >= 1);
        assert!(export.contents.contains(&first));
        Ok(())
    }

    #[test]
    fn headless_export_surfaces_backend_failure() -> Result<()> {
        let (addr, handle) = serve_once(r#"{"success": false, "error": "cache cold"}"#)?;
        let client = Client::new(&addr, Duration::from_secs(5))?;
        let error = export_headless(&client, SourceKind::Warehouse, None, 50)
            .expect_err("rejected load should fail the export");
        assert!(error.to_string().contains("cache cold"));
        assert_eq!(handle.join().map_err(|_| anyhow!("server panicked"))?, "/warehouses");
        Ok(())
    }

    #[test]
    fn check_reports_cached_counts() -> Result<()> {
        let (addr, handle) = serve_once(
            r#"{"success": true, "message": "API is running", "cached_data": {"users": 3, "warehouses": 2, "queries": 40}, "timestamp": "2026-10-15T09:00:00"}"#,
        )?;
        let client = Client::new(&addr, Duration::from_secs(5))?;
        let line = check_health(&client)?;
        assert!(line.contains("API is running"));
        assert!(line.contains("2 warehouses, 3 users, 40 queries cached"));
        assert_eq!(handle.join().map_err(|_| anyhow!("server panicked"))?, "/health");
        Ok(())
    }

    #[test]
    fn kpi_columns_come_from_the_backend() -> Result<()> {
        let (addr, handle) = serve_once(
            r#"{"success": true, "data": {"user_clickable_cols": ["SPILLED_QUERIES"], "warehouse_clickable_cols": ["FAILED_QUERIES"], "all_clickable_cols": ["SPILLED_QUERIES", "FAILED_QUERIES"]}}"#,
        )?;
        let client = Client::new(&addr, Duration::from_secs(5))?;
        let kpis = load_kpi_columns(&client);
        assert_eq!(kpis.warehouse, ["FAILED_QUERIES"]);
        assert_eq!(kpis.user, ["SPILLED_QUERIES"]);
        assert_eq!(handle.join().map_err(|_| anyhow!("server panicked"))?, "/kpi-columns");
        Ok(())
    }

    #[test]
    fn kpi_columns_fall_back_to_built_in_lists() -> Result<()> {
        let (addr, handle) = serve_once(r#"{"success": false, "error": "not found"}"#)?;
        let client = Client::new(&addr, Duration::from_secs(5))?;
        assert_eq!(load_kpi_columns(&client), KpiColumns::default());
        handle.join().map_err(|_| anyhow!("server panicked"))?;
        assert_eq!(load_kpi_columns(&FixtureSource::seeded(1)), KpiColumns::default());
        Ok(())
    }
}
