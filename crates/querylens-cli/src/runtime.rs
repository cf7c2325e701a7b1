// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use querylens_app::{AnalyticsSource, Ticket};
use querylens_tui::{InternalEvent, spawn_fetch_worker};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Sender;

/// Runs every fetch on its own worker thread against a shared source, the
/// HTTP client in normal use or the fixture backend under `--demo`.
pub struct WorkerRuntime {
    source: Arc<dyn AnalyticsSource>,
    export_dir: PathBuf,
}

impl WorkerRuntime {
    pub fn new(source: Arc<dyn AnalyticsSource>, export_dir: PathBuf) -> Self {
        Self { source, export_dir }
    }
}

impl querylens_tui::AppRuntime for WorkerRuntime {
    fn source(&self) -> Arc<dyn AnalyticsSource> {
        Arc::clone(&self.source)
    }

    fn export_dir(&self) -> PathBuf {
        self.export_dir.clone()
    }

    fn spawn_fetch(&mut self, ticket: &Ticket, tx: Sender<InternalEvent>) -> Result<()> {
        spawn_fetch_worker(Arc::clone(&self.source), ticket, tx)
    }
}
