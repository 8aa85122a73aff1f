use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::features::{AggregationPolicy, FeatureCatalog, FeatureId, FeatureSpec, TransformKind};
use crate::types::ReferenceLocation;

/// Immutable configuration for one scan run.
///
/// Constructed once, passed by reference into every component, never mutated
/// — multiple cities and weight sets can run concurrently without
/// interference. The defaults are the empirically tuned values of the
/// production deployment; all of them are re-tunable via TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// The closed set of declared features.
    pub catalog: FeatureCatalog,
    /// Business weight per feature. Only weighted features enter the
    /// similarity vector.
    pub weights: BTreeMap<FeatureId, f64>,
    /// Weight per ring, index = hop distance. Must be non-increasing.
    pub ring_weights: Vec<f64>,
    /// Exponent for contrast stretching of cosine similarity.
    pub contrast_exponent: f64,
    /// Candidates within this distance of a same-city reference are vetoed.
    pub cannibalization_radius_m: f64,
    /// Minimum pairwise distance between selected candidates.
    pub min_separation_m: f64,
    /// The learned affluence floor is the minimum reference value times this.
    pub affluence_margin: f64,
    /// Shortlist size per city.
    pub target_count_per_city: usize,
    /// The quality feature the affluence veto reads (e.g. "avg_income").
    pub affluence_feature: FeatureId,
    /// References farther than this from any cell centroid are excluded.
    pub reference_snap_radius_m: f64,
    /// Cells whose `area_class` equals this value are vetoed. None disables
    /// the veto; cells without the signal are never penalized.
    pub declining_area_class: Option<String>,
    /// Optional commercial-health signal for the soft score modifier.
    pub vacancy_feature: Option<FeatureId>,
    /// Bound of the vacancy modifier: final multiplier stays within
    /// `1.0 ± vacancy_modifier_scale`.
    pub vacancy_modifier_scale: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let mut specs = BTreeMap::new();
        let mut declare = |name: &str, policy, transform, smoothed| {
            specs.insert(
                FeatureId::from(name),
                FeatureSpec {
                    policy,
                    transform,
                    smoothed,
                },
            );
        };

        use AggregationPolicy::{Quality, Volume};
        use TransformKind::{InverseDistance, LogDamp};

        declare("target_pop", Volume, LogDamp, true);
        declare("avg_income", Quality, LogDamp, true);
        declare("gravity_score", Volume, LogDamp, true);
        declare("hipster_score", Volume, LogDamp, false);
        declare("retail_score", Volume, LogDamp, false);
        declare("health_score", Volume, LogDamp, false);
        declare("nightlife_score", Volume, LogDamp, false);
        declare("transit_distance", Quality, InverseDistance, false);
        declare("vacancy_rate", Quality, LogDamp, false);

        let weights = BTreeMap::from([
            (FeatureId::from("avg_income"), 6.0),
            (FeatureId::from("target_pop"), 3.0),
            (FeatureId::from("hipster_score"), 4.0),
            (FeatureId::from("retail_score"), 3.0),
            (FeatureId::from("health_score"), 2.0),
            (FeatureId::from("nightlife_score"), 1.0),
            (FeatureId::from("transit_distance"), 1.5),
        ]);

        Self {
            catalog: FeatureCatalog::new(specs),
            weights,
            ring_weights: vec![1.0, 0.6, 0.3],
            contrast_exponent: 20.0,
            cannibalization_radius_m: 1_500.0,
            min_separation_m: 1_000.0,
            affluence_margin: 0.85,
            target_count_per_city: 10,
            affluence_feature: FeatureId::from("avg_income"),
            reference_snap_radius_m: 250.0,
            declining_area_class: None,
            vacancy_feature: Some(FeatureId::from("vacancy_rate")),
            vacancy_modifier_scale: 0.05,
        }
    }
}

impl ScanConfig {
    /// Validate the configuration. Called at load; every violation here
    /// would invalidate all downstream results, so the run aborts.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.ring_weights.is_empty() {
            return Err(ScanError::Config(
                "ring_weights must declare at least ring 0".to_string(),
            ));
        }
        for (k, &w) in self.ring_weights.iter().enumerate() {
            if !w.is_finite() || w < 0.0 {
                return Err(ScanError::Config(format!(
                    "ring_weights[{k}] = {w} must be a non-negative number"
                )));
            }
            if k > 0 && w > self.ring_weights[k - 1] {
                return Err(ScanError::Config(format!(
                    "ring_weights must be non-increasing: ring {k} weight {w} exceeds ring {} weight {}",
                    k - 1,
                    self.ring_weights[k - 1]
                )));
            }
        }

        if self.weights.is_empty() {
            return Err(ScanError::Config(
                "weights must declare at least one feature".to_string(),
            ));
        }
        let mut any_positive = false;
        for (id, &w) in &self.weights {
            if !self.catalog.contains(id) {
                return Err(ScanError::Config(format!(
                    "weighted feature `{id}` has no declared aggregation policy"
                )));
            }
            if !w.is_finite() || w < 0.0 {
                return Err(ScanError::Config(format!(
                    "weight for `{id}` must be non-negative, got {w}"
                )));
            }
            any_positive |= w > 0.0;
        }
        if !any_positive {
            return Err(ScanError::Config(
                "all feature weights are zero; the similarity vector would be empty".to_string(),
            ));
        }

        if !self.contrast_exponent.is_finite() || self.contrast_exponent <= 0.0 {
            return Err(ScanError::Config(format!(
                "contrast_exponent must be positive, got {}",
                self.contrast_exponent
            )));
        }
        for (name, value) in [
            ("cannibalization_radius_m", self.cannibalization_radius_m),
            ("min_separation_m", self.min_separation_m),
            ("reference_snap_radius_m", self.reference_snap_radius_m),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ScanError::Config(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        if !self.affluence_margin.is_finite()
            || self.affluence_margin <= 0.0
            || self.affluence_margin > 1.0
        {
            return Err(ScanError::Config(format!(
                "affluence_margin must be in (0, 1], got {}",
                self.affluence_margin
            )));
        }
        if self.target_count_per_city == 0 {
            return Err(ScanError::Config(
                "target_count_per_city must be at least 1".to_string(),
            ));
        }

        match self.catalog.get(&self.affluence_feature) {
            None => {
                return Err(ScanError::Config(format!(
                    "affluence_feature `{}` is not declared in the catalog",
                    self.affluence_feature
                )));
            }
            Some(spec) if spec.policy != AggregationPolicy::Quality => {
                return Err(ScanError::Config(format!(
                    "affluence_feature `{}` must be a quality feature",
                    self.affluence_feature
                )));
            }
            Some(_) => {}
        }

        if let Some(id) = &self.vacancy_feature {
            if !self.catalog.contains(id) {
                return Err(ScanError::Config(format!(
                    "vacancy_feature `{id}` is not declared in the catalog"
                )));
            }
        }
        if !self.vacancy_modifier_scale.is_finite()
            || self.vacancy_modifier_scale < 0.0
            || self.vacancy_modifier_scale >= 1.0
        {
            return Err(ScanError::Config(format!(
                "vacancy_modifier_scale must be in [0, 1), got {}",
                self.vacancy_modifier_scale
            )));
        }

        Ok(())
    }

    /// Weighted features in deterministic order — the dimensions of the
    /// similarity vector.
    pub fn vector_features(&self) -> Vec<FeatureId> {
        self.weights.keys().cloned().collect()
    }

    /// Largest ring index with a non-zero weight.
    pub fn max_ring(&self) -> u32 {
        self.ring_weights
            .iter()
            .rposition(|&w| w > 0.0)
            .unwrap_or(0) as u32
    }
}

/// A full scan document: configuration plus the reference portfolio.
///
/// This is the shape of the TOML file the runner loads. References are
/// external read-only input, never derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanDocument {
    #[serde(default)]
    pub config: ScanConfig,
    #[serde(default, rename = "reference")]
    pub references: Vec<ReferenceLocation>,
}

impl ScanDocument {
    /// Parse and validate a scan document. An empty reference set aborts
    /// here — nothing downstream can produce a valid result without one.
    pub fn from_toml_str(raw: &str) -> Result<Self, ScanError> {
        let doc: ScanDocument = toml::from_str(raw)
            .map_err(|e| ScanError::Config(format!("invalid scan document: {e}")))?;
        doc.config.validate()?;
        if doc.references.is_empty() {
            return Err(ScanError::EmptyReferences(
                "scan document declares no [[reference]] entries".to_string(),
            ));
        }
        Ok(doc)
    }
}
