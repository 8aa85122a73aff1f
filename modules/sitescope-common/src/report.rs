use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on itemized samples kept per summary. Counts are exact;
/// samples are illustrative.
const MAX_ERROR_SAMPLES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageKind {
    /// A reference location did not resolve to any covered cell.
    ReferenceOutsideCoverage,
    /// A city lacks an optional auxiliary signal (veto class, vacancy).
    MissingSignal,
}

/// A recoverable coverage gap: excluded or skipped, itemized, run continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageIssue {
    pub kind: CoverageKind,
    pub city: String,
    pub detail: String,
}

/// Aggregate of per-cell data errors: exact count plus bounded samples.
/// Malformed values are treated as absent for that cell only; they are
/// never silently swallowed and never abort the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataErrorSummary {
    pub count: u64,
    pub samples: Vec<String>,
}

impl DataErrorSummary {
    pub fn record(&mut self, detail: impl Into<String>) {
        self.count += 1;
        if self.samples.len() < MAX_ERROR_SAMPLES {
            self.samples.push(detail.into());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Per-city outcome counts for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityReport {
    pub city: String,
    pub cells: usize,
    pub scored: usize,
    pub vetoed: usize,
    pub selected: usize,
    /// Why the shortlist is shorter than the target, when it is.
    pub shortfall: Option<String>,
    pub data_errors: DataErrorSummary,
}

/// Summary of a full scan run: per-city counts plus every recoverable
/// issue the run worked around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub coverage: Vec<CoverageIssue>,
    pub cities: Vec<CityReport>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            coverage: Vec::new(),
            cities: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn total_data_errors(&self) -> u64 {
        self.cities.iter().map(|c| c.data_errors.count).sum()
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
