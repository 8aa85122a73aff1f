use std::collections::BTreeMap;

use sitescope_common::{Cell, FeatureId, ScanConfig, TransformKind};

/// Apply a feature's declared transform to an observed value.
pub fn apply_transform(kind: TransformKind, raw: f64) -> f64 {
    let raw = raw.max(0.0);
    match kind {
        // ln(1 + x): damps extremes so one outlier cell cannot dominate
        TransformKind::LogDamp => raw.ln_1p(),
        // 1 / (ln(1 + x) + 1): nearer is larger, far distances flatten
        TransformKind::InverseDistance => 1.0 / (raw.ln_1p() + 1.0),
    }
}

/// Per-feature min/max of transformed values over the full candidate
/// population — not just the references, so reference cells land inside
/// the same [0, 1] scale as every candidate they are compared against.
#[derive(Debug, Clone, Default)]
pub struct TransformStats {
    ranges: BTreeMap<FeatureId, (f64, f64)>,
}

impl TransformStats {
    /// Fit ranges for every weighted feature over all cells of the run.
    /// Reads the smoothed table; absent values stay out of the fit.
    pub fn fit<'a>(config: &ScanConfig, cells: impl Iterator<Item = &'a Cell>) -> Self {
        let features = config.vector_features();
        let mut ranges: BTreeMap<FeatureId, (f64, f64)> = BTreeMap::new();

        for cell in cells {
            for feature in &features {
                let Some(raw) = cell.smoothed.get(feature) else {
                    continue;
                };
                let spec = config
                    .catalog
                    .get(feature)
                    .expect("vector features are validated against the catalog");
                let transformed = apply_transform(spec.transform, raw);
                ranges
                    .entry(feature.clone())
                    .and_modify(|(min, max)| {
                        *min = min.min(transformed);
                        *max = max.max(transformed);
                    })
                    .or_insert((transformed, transformed));
            }
        }

        Self { ranges }
    }

    /// Rescale a transformed value into [0, 1] against the fitted range.
    /// A constant column flattens to 0; values are clamped so a cell can
    /// never leave the unit interval.
    pub fn rescale(&self, feature: &FeatureId, transformed: f64) -> f64 {
        let Some(&(min, max)) = self.ranges.get(feature) else {
            return 0.0;
        };
        let span = max - min;
        if span <= 0.0 {
            return 0.0;
        }
        ((transformed - min) / span).clamp(0.0, 1.0)
    }
}

/// Build a cell's weighted similarity vector, dimension order =
/// `config.vector_features()`. An absent feature contributes 0.0 — absence
/// stays distinguishable everywhere upstream, and flattens only here, at
/// the edge of the vector space.
pub fn weighted_vector(config: &ScanConfig, stats: &TransformStats, cell: &Cell) -> Vec<f64> {
    config
        .vector_features()
        .iter()
        .map(|feature| {
            let Some(raw) = cell.smoothed.get(feature) else {
                return 0.0;
            };
            let spec = config
                .catalog
                .get(feature)
                .expect("vector features are validated against the catalog");
            let weight = config.weights.get(feature).copied().unwrap_or(0.0);
            weight * stats.rescale(feature, apply_transform(spec.transform, raw))
        })
        .collect()
}
