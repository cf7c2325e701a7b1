// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::ids::DatasetGeneration;
use crate::model::{Dataset, DatasetSource};

/// Loaded datasets keyed by where they came from. A dataset is replaced
/// wholesale on reload and stamped with a fresh generation.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    datasets: BTreeMap<DatasetSource, Arc<Dataset>>,
    last_generation: DatasetGeneration,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dataset: Dataset) -> Arc<Dataset> {
        self.last_generation = self.last_generation.next();
        let dataset = Arc::new(dataset.with_generation(self.last_generation));
        self.datasets
            .insert(dataset.source().clone(), Arc::clone(&dataset));
        dataset
    }

    pub fn get(&self, source: &DatasetSource) -> Option<&Arc<Dataset>> {
        self.datasets.get(source)
    }

    /// Drop every dataset whose source is not in `keep`. Returns how many were
    /// evicted.
    pub fn retain_sources(&mut self, keep: &BTreeSet<DatasetSource>) -> usize {
        let before = self.datasets.len();
        self.datasets.retain(|source, _| keep.contains(source));
        before - self.datasets.len()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
