use thiserror::Error;

/// Errors that abort a scan run.
///
/// Only configuration-level problems abort: they invalidate every downstream
/// result. Recoverable per-location and per-cell issues are not errors —
/// they are itemized in the run report (see `report::CoverageIssue` and
/// `report::DataErrorSummary`) and the run continues.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Empty reference set: {0}")]
    EmptyReferences(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
