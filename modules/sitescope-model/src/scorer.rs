use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use sitescope_common::{haversine_m, Cell, CellId, ReferenceLocation, ScanConfig};

use crate::profile::IdealProfile;
use crate::transform::{weighted_vector, TransformStats};

/// Why a cell's final score is exactly zero. A veto is not an error and not
/// a low score — it is a hard business rule, and every zero carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VetoReason {
    /// The cell's feature vector is all-absent/zero; similarity is undefined.
    DegenerateVector,
    /// Affluence below the learned floor.
    Affluence,
    /// Within the cannibalization radius of a same-city reference site.
    Cannibalization,
    /// Structurally declining area classification.
    DecliningArea,
}

impl std::fmt::Display for VetoReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VetoReason::DegenerateVector => write!(f, "DEGENERATE_VECTOR"),
            VetoReason::Affluence => write!(f, "AFFLUENCE"),
            VetoReason::Cannibalization => write!(f, "CANNIBALIZATION"),
            VetoReason::DecliningArea => write!(f, "DECLINING_AREA"),
        }
    }
}

/// Per-cell scoring outcome: the raw similarity, the contrast-stretched
/// similarity, and the final post-veto score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRow {
    pub cell: CellId,
    pub city: String,
    /// Cosine similarity against the ideal profile, [0, 1].
    pub raw_similarity: f64,
    /// `raw^p * 100` — spreads the crowded top of the cosine range.
    pub stretched: f64,
    /// Post-veto, post-modifier score, [0, 100]. Exactly 0 iff vetoed.
    pub final_score: f64,
    pub veto: Option<VetoReason>,
}

/// Scores every cell of a city against the learned ideal profile.
///
/// Shares no mutable state; one scorer serves all concurrent city tasks.
pub struct SimilarityScorer {
    config: Arc<ScanConfig>,
    stats: Arc<TransformStats>,
    profile: Arc<IdealProfile>,
    references: Arc<Vec<ReferenceLocation>>,
}

impl SimilarityScorer {
    pub fn new(
        config: Arc<ScanConfig>,
        stats: Arc<TransformStats>,
        profile: Arc<IdealProfile>,
        references: Arc<Vec<ReferenceLocation>>,
    ) -> Self {
        Self {
            config,
            stats,
            profile,
            references,
        }
    }

    /// Score one city's cells. Pure: identical inputs yield identical rows,
    /// in input cell order.
    pub fn score_city(&self, cells: &[Cell]) -> Vec<ScoreRow> {
        let rows: Vec<ScoreRow> = cells.iter().map(|cell| self.score_cell(cell)).collect();
        let vetoed = rows.iter().filter(|r| r.veto.is_some()).count();
        debug!(
            cells = rows.len(),
            vetoed,
            "Scored city against ideal profile"
        );
        rows
    }

    fn score_cell(&self, cell: &Cell) -> ScoreRow {
        let vector = weighted_vector(&self.config, &self.stats, cell);

        // An all-absent/zero vector has undefined cosine similarity: an
        // explicit zero with a reason, never a NaN and never a crash.
        let norm: f64 = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            return self.vetoed(cell, 0.0, 0.0, VetoReason::DegenerateVector);
        }

        let raw = cosine_similarity(&vector, &self.profile.vector).clamp(0.0, 1.0);
        let stretched = raw.powf(self.config.contrast_exponent) * 100.0;

        if let Some(reason) = self.veto_for(cell) {
            return self.vetoed(cell, raw, stretched, reason);
        }

        let final_score = (stretched * self.vacancy_modifier(cell)).min(100.0);
        ScoreRow {
            cell: cell.id.clone(),
            city: cell.city.clone(),
            raw_similarity: raw,
            stretched,
            final_score,
            veto: None,
        }
    }

    fn vetoed(&self, cell: &Cell, raw: f64, stretched: f64, reason: VetoReason) -> ScoreRow {
        ScoreRow {
            cell: cell.id.clone(),
            city: cell.city.clone(),
            raw_similarity: raw,
            stretched,
            final_score: 0.0,
            veto: Some(reason),
        }
    }

    /// Hard vetoes, checked in order: affluence floor, cannibalization,
    /// declining-area classification.
    fn veto_for(&self, cell: &Cell) -> Option<VetoReason> {
        if let Some(threshold) = self.profile.affluence_threshold {
            // A cell that cannot be certified above the floor is out —
            // including cells where the signal never materialized.
            match cell.smoothed.get(&self.config.affluence_feature) {
                Some(value) if value >= threshold => {}
                _ => return Some(VetoReason::Affluence),
            }
        }

        for reference in self.references.iter() {
            if reference.city != cell.city {
                continue;
            }
            let distance = haversine_m(cell.centroid, reference.point());
            if distance < self.config.cannibalization_radius_m {
                return Some(VetoReason::Cannibalization);
            }
        }

        // Only where the classification exists for this cell; absence of
        // the signal never penalizes.
        if let (Some(veto_class), Some(area_class)) =
            (&self.config.declining_area_class, &cell.area_class)
        {
            if veto_class == area_class {
                return Some(VetoReason::DecliningArea);
            }
        }

        None
    }

    /// Bounded multiplicative adjustment from the optional commercial-health
    /// signal: low vacancy nudges up, high vacancy nudges down, never more
    /// than `vacancy_modifier_scale` either way. Cities without the signal
    /// are untouched.
    fn vacancy_modifier(&self, cell: &Cell) -> f64 {
        let Some(feature) = &self.config.vacancy_feature else {
            return 1.0;
        };
        let Some(vacancy) = cell.smoothed.get(feature) else {
            return 1.0;
        };
        let scale = self.config.vacancy_modifier_scale;
        (1.0 + scale * (1.0 - 2.0 * vacancy.clamp(0.0, 1.0))).clamp(1.0 - scale, 1.0 + scale)
    }
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Contrast stretching in isolation: `raw^p * 100`. Strictly monotonic for
/// p > 0, so ordering by raw similarity is preserved.
pub fn contrast_stretch(raw: f64, exponent: f64) -> f64 {
    raw.powf(exponent) * 100.0
}
