use std::collections::HashMap;

use tracing::debug;

use sitescope_common::{AggregationPolicy, Cell, CellId, FeatureCatalog, FeatureRow};

use crate::adjacency::RingIndex;

/// The spatial smoothing engine: expands localized, noisy per-cell signals
/// into neighborhood-aware ones via weighted multi-ring aggregation.
///
/// A single hexagon is too small a sample for demand estimation; what
/// matters is the area a shopper actually walks. Volume features sum over
/// the neighborhood (more around you is better), quality features average
/// over the neighbors that carry the signal (the level of the area).
///
/// Pure: identical inputs always produce identical outputs.
pub struct SmoothingEngine<'a> {
    catalog: &'a FeatureCatalog,
    /// Weight per ring, index = hop distance. Validated non-increasing at
    /// configuration load.
    ring_weights: &'a [f64],
}

impl<'a> SmoothingEngine<'a> {
    pub fn new(catalog: &'a FeatureCatalog, ring_weights: &'a [f64]) -> Self {
        Self {
            catalog,
            ring_weights,
        }
    }

    /// Smooth every cell of one city in place.
    ///
    /// Features declared `smoothed` aggregate per their policy; the rest
    /// pass through unchanged so the smoothed table is self-contained.
    pub fn smooth_city(&self, cells: &mut [Cell], index: &dyn RingIndex) {
        // Snapshot raw rows: neighbors are read from the pre-smoothing state.
        let raw: HashMap<CellId, FeatureRow> = cells
            .iter()
            .map(|c| (c.id.clone(), c.raw.clone()))
            .collect();

        for cell in cells.iter_mut() {
            let mut out = FeatureRow::new();

            for (feature, spec) in self.catalog.iter() {
                if !spec.smoothed {
                    if let Some(value) = cell.raw.get(feature) {
                        out.set(feature.clone(), value);
                    }
                    continue;
                }

                match spec.policy {
                    AggregationPolicy::Volume => {
                        // Weighted sum across all rings. Absent is a valid 0
                        // contribution here: an empty neighbor adds nothing.
                        let mut acc = 0.0;
                        for (k, &weight) in self.ring_weights.iter().enumerate() {
                            if weight == 0.0 {
                                continue;
                            }
                            for neighbor in index.ring(&cell.id, k as u32) {
                                if let Some(row) = raw.get(&neighbor) {
                                    acc += weight * row.get(feature).unwrap_or(0.0);
                                }
                            }
                        }
                        out.set(feature.clone(), acc);
                    }
                    AggregationPolicy::Quality => {
                        // Weighted average over neighbors that carry a
                        // positive value. Absent and non-positive values stay
                        // out of both numerator and denominator; if nobody
                        // carries the signal, the result is absent, not 0.
                        let mut numerator = 0.0;
                        let mut denominator = 0.0;
                        for (k, &weight) in self.ring_weights.iter().enumerate() {
                            if weight == 0.0 {
                                continue;
                            }
                            for neighbor in index.ring(&cell.id, k as u32) {
                                let Some(value) =
                                    raw.get(&neighbor).and_then(|row| row.get(feature))
                                else {
                                    continue;
                                };
                                if value > 0.0 {
                                    numerator += weight * value;
                                    denominator += weight;
                                }
                            }
                        }
                        if denominator > 0.0 {
                            out.set(feature.clone(), numerator / denominator);
                        }
                    }
                }
            }

            cell.smoothed = out;
        }

        debug!(cells = cells.len(), "Smoothed city grid");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sitescope_common::{
        FeatureCatalog, FeatureId, FeatureSpec, GeoPoint, HexCoord, TransformKind,
    };

    use super::*;
    use crate::adjacency::HexGridIndex;

    fn catalog() -> FeatureCatalog {
        let mut specs = BTreeMap::new();
        specs.insert(
            FeatureId::from("target_pop"),
            FeatureSpec {
                policy: AggregationPolicy::Volume,
                transform: TransformKind::LogDamp,
                smoothed: true,
            },
        );
        specs.insert(
            FeatureId::from("avg_income"),
            FeatureSpec {
                policy: AggregationPolicy::Quality,
                transform: TransformKind::LogDamp,
                smoothed: true,
            },
        );
        specs.insert(
            FeatureId::from("transit_distance"),
            FeatureSpec {
                policy: AggregationPolicy::Quality,
                transform: TransformKind::InverseDistance,
                smoothed: false,
            },
        );
        FeatureCatalog::new(specs)
    }

    fn cell(id: &str, coord: HexCoord) -> Cell {
        Cell {
            id: CellId::from(id),
            city: "testville".to_string(),
            centroid: GeoPoint { lat: 0.0, lng: 0.0 },
            boundary: Vec::new(),
            grid: Some(coord),
            area_class: None,
            raw: FeatureRow::new(),
            smoothed: FeatureRow::new(),
        }
    }

    #[test]
    fn volume_sums_and_quality_averages_over_first_ring() {
        let center = HexCoord::new(0, 0);
        let mut cells = vec![cell("c", center)];
        for (i, coord) in center.ring(1).into_iter().enumerate() {
            cells.push(cell(&format!("n{i}"), coord));
        }

        let pop = FeatureId::from("target_pop");
        let income = FeatureId::from("avg_income");
        for c in cells.iter_mut() {
            c.raw.set(pop.clone(), 100.0);
            c.raw.set(income.clone(), 30_000.0);
        }

        let index = HexGridIndex::build(&cells);
        let weights = [1.0, 0.5];
        SmoothingEngine::new(&catalog(), &weights).smooth_city(&mut cells, &index);

        let c = &cells[0];
        // Volume: own 100 + six neighbors at half weight
        assert!((c.smoothed.get(&pop).unwrap() - 400.0).abs() < 1e-9);
        // Quality: uniform field averages to itself
        assert!((c.smoothed.get(&income).unwrap() - 30_000.0).abs() < 1e-9);
    }

    #[test]
    fn quality_excludes_absent_and_non_positive_neighbors() {
        let center = HexCoord::new(0, 0);
        let mut cells = vec![cell("c", center)];
        for (i, coord) in center.ring(1).into_iter().enumerate() {
            cells.push(cell(&format!("n{i}"), coord));
        }

        let income = FeatureId::from("avg_income");
        // Only two neighbors carry income; one cell reports 0 (closed data)
        cells[1].raw.set(income.clone(), 40_000.0);
        cells[2].raw.set(income.clone(), 20_000.0);
        cells[3].raw.set(income.clone(), 0.0);

        let index = HexGridIndex::build(&cells);
        let weights = [1.0, 1.0];
        SmoothingEngine::new(&catalog(), &weights).smooth_city(&mut cells, &index);

        // Equal weights: (40k + 20k) / 2, the zero and the absents excluded
        let got = cells[0].smoothed.get(&income).unwrap();
        assert!((got - 30_000.0).abs() < 1e-9, "got {got}");
    }

    #[test]
    fn unsmoothed_features_pass_through() {
        let mut cells = vec![cell("c", HexCoord::new(0, 0))];
        let transit = FeatureId::from("transit_distance");
        cells[0].raw.set(transit.clone(), 240.0);

        let index = HexGridIndex::build(&cells);
        let weights = [1.0, 0.6, 0.3];
        SmoothingEngine::new(&catalog(), &weights).smooth_city(&mut cells, &index);

        assert_eq!(cells[0].smoothed.get(&transit), Some(240.0));
    }

    #[test]
    fn cell_without_adjacency_smooths_over_itself_only() {
        let mut lone = cell("lone", HexCoord::new(0, 0));
        lone.grid = None;
        let pop = FeatureId::from("target_pop");
        lone.raw.set(pop.clone(), 70.0);
        let mut cells = vec![lone];

        let index = HexGridIndex::build(&cells);
        let weights = [1.0, 0.6, 0.3];
        SmoothingEngine::new(&catalog(), &weights).smooth_city(&mut cells, &index);

        assert_eq!(cells[0].smoothed.get(&pop), Some(70.0));
    }
}
