use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sitescope_common::{Cell, CellId, FeatureRow, ScanError};

use crate::scorer::ScoreRow;
use crate::selector::SelectionResult;

/// One row of the smoothed feature table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothedRow {
    pub cell: CellId,
    pub features: FeatureRow,
}

/// Read side of the external feature store. The core never writes here:
/// raw features and geometry are owned upstream.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// City slugs available in the store, in deterministic order.
    async fn cities(&self) -> Result<Vec<String>, ScanError>;

    /// All cells of one city, one row per cell id.
    async fn load_city(&self, city: &str) -> Result<Vec<Cell>, ScanError>;
}

/// Write side for derived tables. Each `replace_*` swaps a whole city's
/// table in one call — outputs are never patched incrementally, so a table
/// can never mix rows from different runs.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn replace_smoothed(&self, city: &str, rows: Vec<SmoothedRow>) -> Result<(), ScanError>;

    async fn replace_scores(&self, city: &str, rows: Vec<ScoreRow>) -> Result<(), ScanError>;

    async fn replace_selection(&self, city: &str, result: SelectionResult)
        -> Result<(), ScanError>;
}

/// In-memory feature store for tests and the JSON runner.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cells_by_city: BTreeMap<String, Vec<Cell>>,
}

impl MemoryStore {
    pub fn new(cells: Vec<Cell>) -> Self {
        let mut cells_by_city: BTreeMap<String, Vec<Cell>> = BTreeMap::new();
        for cell in cells {
            cells_by_city.entry(cell.city.clone()).or_default().push(cell);
        }
        Self { cells_by_city }
    }
}

#[async_trait]
impl FeatureStore for MemoryStore {
    async fn cities(&self) -> Result<Vec<String>, ScanError> {
        Ok(self.cells_by_city.keys().cloned().collect())
    }

    async fn load_city(&self, city: &str) -> Result<Vec<Cell>, ScanError> {
        self.cells_by_city
            .get(city)
            .cloned()
            .ok_or_else(|| ScanError::Store(format!("unknown city `{city}`")))
    }
}

/// In-memory output sink: holds the latest wholesale-replaced tables, for
/// tests and for serializing results after a run.
#[derive(Debug, Default)]
pub struct MemorySink {
    smoothed: Mutex<BTreeMap<String, Vec<SmoothedRow>>>,
    scores: Mutex<BTreeMap<String, Vec<ScoreRow>>>,
    selections: Mutex<BTreeMap<String, SelectionResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn smoothed(&self, city: &str) -> Option<Vec<SmoothedRow>> {
        self.smoothed.lock().unwrap().get(city).cloned()
    }

    pub fn scores(&self, city: &str) -> Option<Vec<ScoreRow>> {
        self.scores.lock().unwrap().get(city).cloned()
    }

    pub fn selection(&self, city: &str) -> Option<SelectionResult> {
        self.selections.lock().unwrap().get(city).cloned()
    }

    pub fn selections(&self) -> BTreeMap<String, SelectionResult> {
        self.selections.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn replace_smoothed(&self, city: &str, rows: Vec<SmoothedRow>) -> Result<(), ScanError> {
        self.smoothed.lock().unwrap().insert(city.to_string(), rows);
        Ok(())
    }

    async fn replace_scores(&self, city: &str, rows: Vec<ScoreRow>) -> Result<(), ScanError> {
        self.scores.lock().unwrap().insert(city.to_string(), rows);
        Ok(())
    }

    async fn replace_selection(
        &self,
        city: &str,
        result: SelectionResult,
    ) -> Result<(), ScanError> {
        self.selections
            .lock()
            .unwrap()
            .insert(city.to_string(), result);
        Ok(())
    }
}
