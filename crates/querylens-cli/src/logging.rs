// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use std::env;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

pub const LOG_ENV: &str = "QUERYLENS_LOG";

/// Install the global subscriber. The terminal belongs to the TUI, so
/// everything goes to the log file.
pub fn init(config: &Config) -> Result<PathBuf> {
    let path = config.log_file()?;
    let directive = filter_directive(config.log_level(), env::var(LOG_ENV).ok());
    let filter = EnvFilter::try_new(&directive).with_context(|| {
        format!("invalid log filter {directive:?}; set [log].level or {LOG_ENV} to something like \"info\" or \"querylens_api=debug\"")
    })?;
    let file = open_log_file(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))?;
    Ok(path)
}

fn filter_directive(configured: &str, from_env: Option<String>) -> String {
    match from_env {
        Some(directive) if !directive.trim().is_empty() => directive.trim().to_owned(),
        _ => configured.trim().to_owned(),
    }
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {} -- set [log].file to a writable path", path.display()))
}
