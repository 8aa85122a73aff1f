use std::collections::BTreeMap;

use tracing::{info, warn};

use sitescope_common::{
    haversine_m, Cell, CellId, CoverageIssue, CoverageKind, FeatureId, ReferenceLocation,
    ScanConfig, ScanError,
};

use crate::transform::{weighted_vector, TransformStats};

/// A reference location pinned to the cell that contains it.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub reference: ReferenceLocation,
    pub cell: CellId,
}

/// Outcome of resolving the reference portfolio against the covered cells:
/// every input location is either resolved to exactly one cell or excluded
/// with a recorded reason. Nothing is silently dropped.
#[derive(Debug, Clone, Default)]
pub struct ReferenceResolution {
    pub resolved: Vec<ResolvedReference>,
    pub excluded: Vec<CoverageIssue>,
}

/// Resolve each reference to the nearest cell centroid of its city, within
/// the configured snap radius.
pub fn resolve_references(
    references: &[ReferenceLocation],
    cells_by_city: &BTreeMap<String, Vec<Cell>>,
    snap_radius_m: f64,
) -> ReferenceResolution {
    let mut resolution = ReferenceResolution::default();

    for reference in references {
        let Some(cells) = cells_by_city.get(&reference.city) else {
            warn!(
                reference = reference.name.as_str(),
                city = reference.city.as_str(),
                "Reference city not covered; excluding"
            );
            resolution.excluded.push(CoverageIssue {
                kind: CoverageKind::ReferenceOutsideCoverage,
                city: reference.city.clone(),
                detail: format!("reference `{}`: city not covered", reference.name),
            });
            continue;
        };

        // Nearest centroid; ties broken by ascending cell id so resolution
        // is deterministic.
        let nearest = cells
            .iter()
            .map(|cell| (haversine_m(reference.point(), cell.centroid), &cell.id))
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(b.1)));

        match nearest {
            Some((distance, cell)) if distance <= snap_radius_m => {
                info!(
                    reference = reference.name.as_str(),
                    cell = cell.as_str(),
                    distance_m = distance,
                    "Resolved reference to cell"
                );
                resolution.resolved.push(ResolvedReference {
                    reference: reference.clone(),
                    cell: cell.clone(),
                });
            }
            Some((distance, _)) => {
                warn!(
                    reference = reference.name.as_str(),
                    distance_m = distance,
                    "Reference outside covered grid; excluding"
                );
                resolution.excluded.push(CoverageIssue {
                    kind: CoverageKind::ReferenceOutsideCoverage,
                    city: reference.city.clone(),
                    detail: format!(
                        "reference `{}`: nearest cell is {distance:.0}m away, beyond the {snap_radius_m:.0}m snap radius",
                        reference.name
                    ),
                });
            }
            None => {
                resolution.excluded.push(CoverageIssue {
                    kind: CoverageKind::ReferenceOutsideCoverage,
                    city: reference.city.clone(),
                    detail: format!("reference `{}`: city has no cells", reference.name),
                });
            }
        }
    }

    resolution
}

/// The learned ideal location profile: the weighted, normalized mean vector
/// of the reference cells, plus the affluence floor used for vetoing.
///
/// Fully recomputed whenever references or weights change — never mutated
/// incrementally.
#[derive(Debug, Clone)]
pub struct IdealProfile {
    /// Dimension order of `vector` (= `ScanConfig::vector_features`).
    pub features: Vec<FeatureId>,
    pub vector: Vec<f64>,
    /// Minimum observed affluence among references × safety margin, in raw
    /// units of the affluence feature. None when no reference carries the
    /// signal.
    pub affluence_threshold: Option<f64>,
    pub reference_cells: Vec<CellId>,
}

/// Derives the ideal profile from resolved reference cells.
pub struct ProfileLearner<'a> {
    config: &'a ScanConfig,
    stats: &'a TransformStats,
}

impl<'a> ProfileLearner<'a> {
    pub fn new(config: &'a ScanConfig, stats: &'a TransformStats) -> Self {
        Self { config, stats }
    }

    /// Learn the profile from resolved references. An empty set — supplied
    /// empty or emptied by exclusions — is a hard failure: there is nothing
    /// to learn from, and every downstream score would be meaningless.
    pub fn learn(
        &self,
        resolution: &ReferenceResolution,
        cells_by_city: &BTreeMap<String, Vec<Cell>>,
    ) -> Result<IdealProfile, ScanError> {
        if resolution.resolved.is_empty() {
            return Err(ScanError::EmptyReferences(format!(
                "no reference location resolved to a covered cell ({} excluded)",
                resolution.excluded.len()
            )));
        }

        let features = self.config.vector_features();
        let mut mean = vec![0.0; features.len()];
        let mut reference_cells = Vec::with_capacity(resolution.resolved.len());
        let mut min_affluence: Option<f64> = None;

        for resolved in &resolution.resolved {
            let cell = cells_by_city
                .get(&resolved.reference.city)
                .and_then(|cells| cells.iter().find(|c| c.id == resolved.cell))
                .ok_or_else(|| {
                    ScanError::Store(format!(
                        "resolved reference cell `{}` missing from city `{}`",
                        resolved.cell, resolved.reference.city
                    ))
                })?;

            let vector = weighted_vector(self.config, self.stats, cell);
            for (acc, component) in mean.iter_mut().zip(vector.iter()) {
                *acc += component;
            }

            if let Some(value) = cell.smoothed.get(&self.config.affluence_feature) {
                min_affluence = Some(match min_affluence {
                    Some(current) => current.min(value),
                    None => value,
                });
            }

            reference_cells.push(resolved.cell.clone());
        }

        let n = resolution.resolved.len() as f64;
        for component in mean.iter_mut() {
            *component /= n;
        }

        let affluence_threshold = min_affluence.map(|min| min * self.config.affluence_margin);
        info!(
            references = resolution.resolved.len(),
            excluded = resolution.excluded.len(),
            affluence_threshold = ?affluence_threshold,
            "Learned ideal profile"
        );

        Ok(IdealProfile {
            features,
            vector: mean,
            affluence_threshold,
            reference_cells,
        })
    }
}
