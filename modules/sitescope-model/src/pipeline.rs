use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::info;

use sitescope_common::{
    Cell, CityReport, CoverageIssue, CoverageKind, DataErrorSummary, FeatureId,
    ReferenceLocation, RunReport, ScanConfig, ScanError,
};
use sitescope_grid::{HexGridIndex, SmoothingEngine};

use crate::profile::{resolve_references, ProfileLearner};
use crate::scorer::SimilarityScorer;
use crate::selector::{select_city, Candidate};
use crate::store::{FeatureStore, OutputSink, SmoothedRow};
use crate::transform::TransformStats;

/// The full scan: smooth every city, learn the ideal profile once from the
/// reference portfolio, score every cell, select a diversified shortlist
/// per city, and replace the output tables wholesale.
///
/// Hard ordering inside a city: smoothing completes before scoring, scoring
/// before selection. Independent cities share no mutable state and run
/// concurrently. A city persists either all of its outputs or none.
pub struct ScanPipeline {
    config: Arc<ScanConfig>,
    references: Arc<Vec<ReferenceLocation>>,
}

struct CitySnapshot {
    city: String,
    cells: Vec<Cell>,
    data_errors: DataErrorSummary,
}

impl ScanPipeline {
    /// Build a pipeline. Configuration problems abort here — before any
    /// computation — because they invalidate every downstream result.
    pub fn new(
        config: ScanConfig,
        references: Vec<ReferenceLocation>,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        if references.is_empty() {
            return Err(ScanError::EmptyReferences(
                "no reference locations supplied".to_string(),
            ));
        }
        Ok(Self {
            config: Arc::new(config),
            references: Arc::new(references),
        })
    }

    pub async fn run(
        &self,
        store: Arc<dyn FeatureStore>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<RunReport, ScanError> {
        let mut report = RunReport::new();
        info!(run_id = %report.run_id, "Scan run starting");

        // Stage 1: load, sanitize, and smooth each city concurrently.
        let cities = store.cities().await?;
        let mut prepare_tasks = Vec::with_capacity(cities.len());
        for city in cities {
            let store = store.clone();
            let config = self.config.clone();
            prepare_tasks.push(tokio::spawn(async move {
                prepare_city(&config, store.as_ref(), &city).await
            }));
        }

        let mut cells_by_city: BTreeMap<String, Vec<Cell>> = BTreeMap::new();
        let mut data_errors_by_city: BTreeMap<String, DataErrorSummary> = BTreeMap::new();
        for task in prepare_tasks {
            let snapshot = task
                .await
                .map_err(|e| ScanError::Store(format!("city preparation task failed: {e}")))??;
            data_errors_by_city.insert(snapshot.city.clone(), snapshot.data_errors);
            cells_by_city.insert(snapshot.city, snapshot.cells);
        }

        // Stage 2: one profile for the run. Scaling ranges span the full
        // candidate population so references and candidates share a scale.
        let stats = Arc::new(TransformStats::fit(
            &self.config,
            cells_by_city.values().flatten(),
        ));
        let resolution = resolve_references(
            &self.references,
            &cells_by_city,
            self.config.reference_snap_radius_m,
        );
        report.coverage.extend(resolution.excluded.clone());
        let profile = Arc::new(
            ProfileLearner::new(&self.config, &stats).learn(&resolution, &cells_by_city)?,
        );
        if profile.affluence_threshold.is_none() {
            report.coverage.push(CoverageIssue {
                kind: CoverageKind::MissingSignal,
                city: "*".to_string(),
                detail: format!(
                    "no resolved reference carries `{}`; affluence veto disabled",
                    self.config.affluence_feature
                ),
            });
        }

        // Stage 3: score, select, and persist each city concurrently.
        let scorer = Arc::new(SimilarityScorer::new(
            self.config.clone(),
            stats.clone(),
            profile.clone(),
            self.references.clone(),
        ));
        let mut finish_tasks = Vec::with_capacity(cells_by_city.len());
        for (city, cells) in cells_by_city {
            let scorer = scorer.clone();
            let sink = sink.clone();
            let config = self.config.clone();
            let data_errors = data_errors_by_city.remove(&city).unwrap_or_default();
            finish_tasks.push(tokio::spawn(async move {
                finish_city(city, cells, &config, &scorer, sink.as_ref(), data_errors).await
            }));
        }
        for task in finish_tasks {
            let (city_report, coverage) = task
                .await
                .map_err(|e| ScanError::Store(format!("city scoring task failed: {e}")))??;
            report.coverage.extend(coverage);
            report.cities.push(city_report);
        }

        report.finish();
        info!(
            run_id = %report.run_id,
            cities = report.cities.len(),
            coverage_issues = report.coverage.len(),
            data_errors = report.total_data_errors(),
            "Scan run complete"
        );
        Ok(report)
    }
}

/// Load one city and make its rows safe to compute on. Malformed values are
/// treated as absent for that cell only and itemized — never swallowed,
/// never fatal.
async fn prepare_city(
    config: &ScanConfig,
    store: &dyn FeatureStore,
    city: &str,
) -> Result<CitySnapshot, ScanError> {
    let mut cells = store.load_city(city).await?;
    let mut data_errors = DataErrorSummary::default();
    sanitize_cells(config, &mut cells, &mut data_errors);

    let index = HexGridIndex::build(&cells);
    SmoothingEngine::new(&config.catalog, &config.ring_weights).smooth_city(&mut cells, &index);

    info!(
        city,
        cells = cells.len(),
        data_errors = data_errors.count,
        "Prepared and smoothed city"
    );
    Ok(CitySnapshot {
        city: city.to_string(),
        cells,
        data_errors,
    })
}

fn sanitize_cells(config: &ScanConfig, cells: &mut Vec<Cell>, errors: &mut DataErrorSummary) {
    let mut seen: HashSet<_> = HashSet::new();
    cells.retain(|cell| {
        if seen.insert(cell.id.clone()) {
            true
        } else {
            errors.record(format!("duplicate cell id `{}`; keeping first", cell.id));
            false
        }
    });

    for cell in cells.iter_mut() {
        let entries: Vec<(FeatureId, f64)> = cell
            .raw
            .iter()
            .map(|(id, value)| (id.clone(), value))
            .collect();
        for (feature, value) in entries {
            if !config.catalog.contains(&feature) {
                errors.record(format!(
                    "cell `{}`: undeclared feature `{feature}` ignored",
                    cell.id
                ));
                cell.raw.clear(&feature);
            } else if !value.is_finite() || value < 0.0 {
                // All declared features are non-negative quantities
                errors.record(format!(
                    "cell `{}`: {feature} = {value} out of range, treated as absent",
                    cell.id
                ));
                cell.raw.clear(&feature);
            }
        }
    }
}

/// Score, select, and persist one fully-smoothed city. Everything is
/// computed before anything is persisted, so a failure can never leave a
/// city half-written as if complete.
async fn finish_city(
    city: String,
    cells: Vec<Cell>,
    config: &ScanConfig,
    scorer: &SimilarityScorer,
    sink: &dyn OutputSink,
    data_errors: DataErrorSummary,
) -> Result<(CityReport, Vec<CoverageIssue>), ScanError> {
    let rows = scorer.score_city(&cells);

    let candidates: Vec<Candidate> = cells
        .iter()
        .zip(rows.iter())
        .filter(|(_, row)| row.final_score > 0.0)
        .map(|(cell, row)| Candidate {
            cell: cell.id.clone(),
            point: cell.centroid,
            score: row.final_score,
        })
        .collect();
    let selection = select_city(
        &city,
        candidates,
        config.target_count_per_city,
        config.min_separation_m,
    );

    let coverage = missing_signal_issues(config, &city, &cells);

    let smoothed: Vec<SmoothedRow> = cells
        .iter()
        .map(|cell| SmoothedRow {
            cell: cell.id.clone(),
            features: cell.smoothed.clone(),
        })
        .collect();

    let city_report = CityReport {
        city: city.clone(),
        cells: cells.len(),
        scored: rows.iter().filter(|r| r.veto.is_none()).count(),
        vetoed: rows.iter().filter(|r| r.veto.is_some()).count(),
        selected: selection.rows.len(),
        shortfall: selection.shortfall.clone(),
        data_errors,
    };

    for row in selection.rows.iter().take(3) {
        info!(
            city = city.as_str(),
            rank = row.rank,
            cell = row.cell.as_str(),
            score = format!("{:.1}", row.score).as_str(),
            "Shortlist candidate"
        );
    }

    // All tables computed; persist the city wholesale.
    sink.replace_smoothed(&city, smoothed).await?;
    sink.replace_scores(&city, rows).await?;
    sink.replace_selection(&city, selection).await?;

    Ok((city_report, coverage))
}

/// Optional per-city signals that simply are not there: itemized and
/// skipped, never penalized.
fn missing_signal_issues(config: &ScanConfig, city: &str, cells: &[Cell]) -> Vec<CoverageIssue> {
    let mut issues = Vec::new();

    if config.declining_area_class.is_some() && cells.iter().all(|c| c.area_class.is_none()) {
        issues.push(CoverageIssue {
            kind: CoverageKind::MissingSignal,
            city: city.to_string(),
            detail: "no area classification in this city; declining-area veto skipped".to_string(),
        });
    }
    if let Some(feature) = &config.vacancy_feature {
        if cells.iter().all(|c| c.smoothed.get(feature).is_none()) {
            issues.push(CoverageIssue {
                kind: CoverageKind::MissingSignal,
                city: city.to_string(),
                detail: format!("no `{feature}` signal in this city; health modifier skipped"),
            });
        }
    }

    issues
}
