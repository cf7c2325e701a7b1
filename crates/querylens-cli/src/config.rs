// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use querylens_app::{DEFAULT_PAGE_SIZE, SourceKind};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "querylens";
pub const CONFIG_PATH_ENV: &str = "QUERYLENS_CONFIG_PATH";
pub const API_URL_ENV: &str = "QUERYLENS_API_URL";

const CONFIG_VERSION: i64 = 1;
const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_API_TIMEOUT: &str = "30s";
const DEFAULT_LOG_LEVEL: &str = "info";
const MAX_PAGE_SIZE: usize = 1_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            ui: Ui::default(),
            export: ExportSettings::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Some(DEFAULT_API_TIMEOUT.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ui {
    pub default_tab: Option<String>,
    pub page_size: Option<usize>,
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            default_tab: Some(SourceKind::Warehouse.as_str().to_owned()),
            page_size: Some(DEFAULT_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportSettings {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            file: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [api], [ui], [export] and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(base_url) = &self.api.base_url {
            let trimmed = base_url.trim();
            if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                bail!(
                    "api.base_url in {} must be an http:// or https:// URL, got {:?}",
                    path.display(),
                    base_url
                );
            }
        }

        if let Some(timeout) = &self.api.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "api.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(tab) = &self.ui.default_tab
            && SourceKind::parse(tab).is_none()
        {
            bail!(
                "ui.default_tab in {} must be \"warehouses\" or \"users\", got {:?}",
                path.display(),
                tab
            );
        }

        if let Some(page_size) = self.ui.page_size
            && !(1..=MAX_PAGE_SIZE).contains(&page_size)
        {
            bail!(
                "ui.page_size in {} must be between 1 and {MAX_PAGE_SIZE}, got {}",
                path.display(),
                page_size
            );
        }

        if let Some(level) = &self.log.level
            && level.trim().is_empty()
        {
            bail!(
                "log.level in {} must not be empty; use a filter such as \"info\"",
                path.display()
            );
        }

        Ok(())
    }

    /// `[api].base_url`, then `QUERYLENS_API_URL`, then the local default.
    pub fn api_base_url(&self) -> String {
        if let Some(url) = &self.api.base_url {
            return url.trim().to_owned();
        }
        match env::var(API_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => url.trim().to_owned(),
            _ => DEFAULT_API_BASE_URL.to_owned(),
        }
    }

    pub fn api_timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_API_TIMEOUT))
    }

    pub fn default_tab(&self) -> SourceKind {
        self.ui
            .default_tab
            .as_deref()
            .and_then(SourceKind::parse)
            .unwrap_or(SourceKind::Warehouse)
    }

    pub fn page_size(&self) -> usize {
        self.ui.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn export_dir(&self) -> PathBuf {
        match &self.export.dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(file) = &self.log.file {
            return Ok(PathBuf::from(file));
        }
        let data_root = dirs::data_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [log].file to an explicit path")
        })?;
        Ok(data_root.join(APP_NAME).join(format!("{APP_NAME}.log")))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# querylens config\n# Place this file at: {}\n\nversion = 1\n\n[api]\n# Falls back to {API_URL_ENV}, then {DEFAULT_API_BASE_URL}\n# base_url = \"{DEFAULT_API_BASE_URL}\"\ntimeout = \"{DEFAULT_API_TIMEOUT}\"\n\n[ui]\n# \"warehouses\" or \"users\"\ndefault_tab = \"warehouses\"\npage_size = {DEFAULT_PAGE_SIZE}\n\n[export]\n# Optional. Default is the platform downloads directory\n# dir = \"/absolute/path/to/exports\"\n\n[log]\n# Any tracing filter directive; QUERYLENS_LOG overrides it\nlevel = \"{DEFAULT_LOG_LEVEL}\"\n# Optional. Default is the platform data dir (for example ~/.local/share/querylens/querylens.log)\n# file = \"/absolute/path/to/querylens.log\"\n",
            path.display(),
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 30s)")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{API_URL_ENV, CONFIG_PATH_ENV, Config, parse_duration};
    use anyhow::Result;
    use querylens_app::SourceKind;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let _guard = env_lock();
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var(API_URL_ENV);
        }
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.default_tab(), SourceKind::Warehouse);
        assert_eq!(config.page_size(), 50);
        assert_eq!(config.api_base_url(), "http://localhost:5000");
        assert_eq!(config.api_timeout()?, Duration::from_secs(30));
        assert_eq!(config.log_level(), "info");
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[api]\nbase_url = \"http://localhost:5000\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[api], [ui], [export] and [log]"));
        Ok(())
    }

    #[test]
    fn v1_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[api]\nbase_url = \"https://analytics.internal:8443\"\ntimeout = \"5s\"\n[ui]\ndefault_tab = \"users\"\npage_size = 25\n[export]\ndir = \"/tmp/exports\"\n[log]\nlevel = \"querylens_app=debug\"\nfile = \"/tmp/querylens.log\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.api_base_url(), "https://analytics.internal:8443");
        assert_eq!(config.api_timeout()?, Duration::from_secs(5));
        assert_eq!(config.default_tab(), SourceKind::User);
        assert_eq!(config.page_size(), 25);
        assert_eq!(config.export_dir(), PathBuf::from("/tmp/exports"));
        assert_eq!(config.log_level(), "querylens_app=debug");
        assert_eq!(config.log_file()?, PathBuf::from("/tmp/querylens.log"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn unknown_default_tab_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[ui]\ndefault_tab = \"queries\"\n")?;
        let error = Config::load(&path).expect_err("unknown tab should fail");
        assert!(error.to_string().contains("\"warehouses\" or \"users\""));
        Ok(())
    }

    #[test]
    fn page_size_bounds_are_validated() -> Result<()> {
        for raw in ["0", "5000"] {
            let (_temp, path) = write_config(&format!("version = 1\n[ui]\npage_size = {raw}\n"))?;
            let error = Config::load(&path).expect_err("out-of-range page size should fail");
            assert!(error.to_string().contains("ui.page_size"), "{raw}");
        }
        Ok(())
    }

    #[test]
    fn non_http_base_url_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[api]\nbase_url = \"localhost:5000\"\n")?;
        let error = Config::load(&path).expect_err("scheme-less URL should fail");
        assert!(error.to_string().contains("http:// or https://"));
        Ok(())
    }

    #[test]
    fn zero_timeout_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[api]\ntimeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("must be positive"));
        Ok(())
    }

    #[test]
    fn base_url_prefers_config_over_env() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[api]\nbase_url = \"http://from-config:5000\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var(API_URL_ENV, "http://from-env:5000");
        }
        let config = Config::load(&path)?;
        let resolved = config.api_base_url();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var(API_URL_ENV);
        }
        assert_eq!(resolved, "http://from-config:5000");
        Ok(())
    }

    #[test]
    fn base_url_uses_env_when_config_is_silent() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var(API_URL_ENV, "http://from-env:5000");
        }
        let config = Config::load(&path)?;
        let resolved = config.api_base_url();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var(API_URL_ENV);
        }
        assert_eq!(resolved, "http://from-env:5000");
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn default_log_file_lives_in_the_data_dir() -> Result<()> {
        let config = Config::default();
        let path = config.log_file()?;
        assert!(path.ends_with("querylens/querylens.log"), "got {}", path.display());
        Ok(())
    }

    #[test]
    fn timeout_parses_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        Ok(())
    }

    #[test]
    fn timeout_rejects_invalid_duration() {
        let error = parse_duration("soon").expect_err("invalid duration should fail");
        assert!(error.to_string().contains("invalid"));
    }

    #[test]
    fn example_config_round_trips_through_load() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        for section in ["version = 1", "[api]", "[ui]", "[export]", "[log]"] {
            assert!(example.contains(section), "{section}");
        }
        std::fs::write(&path, example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.page_size(), 50);
        Ok(())
    }
}
