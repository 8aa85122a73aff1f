use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of a feature in the catalog (e.g. "avg_income", "gravity_score").
///
/// Feature names are only meaningful against a [`FeatureCatalog`]; any name
/// that is not declared there is rejected at configuration load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a feature aggregates across a cell's neighborhood during smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Weighted sum over all rings. Absent neighbors contribute 0 — more
    /// around you is strictly better (population, footfall, gravity).
    Volume,
    /// Weighted average over neighbors that carry a positive value. If no
    /// neighbor carries the feature, the smoothed value is absent, not 0
    /// (income, occupancy — the level of the area, not its mass).
    Quality,
}

/// The per-feature transform applied before rescaling and weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// `ln(1 + x)` — damps extreme values so one outlier hexagon cannot
    /// dominate the profile.
    LogDamp,
    /// `1 / (ln(1 + x) + 1)` — for distance-type features: nearer is
    /// larger, and large distances flatten instead of diverging.
    InverseDistance,
}

/// Declared behavior of one feature: how it smooths and how it transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub policy: AggregationPolicy,
    pub transform: TransformKind,
    /// Whether this feature goes through neighborhood smoothing. Features
    /// with `smoothed = false` pass through to the smoothed table unchanged.
    #[serde(default)]
    pub smoothed: bool,
}

/// The closed set of features this run understands.
///
/// Every feature that appears in weights, inputs, or veto configuration must
/// be declared here; anything else is a configuration error, not a silent
/// skip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureCatalog {
    specs: BTreeMap<FeatureId, FeatureSpec>,
}

impl FeatureCatalog {
    pub fn new(specs: BTreeMap<FeatureId, FeatureSpec>) -> Self {
        Self { specs }
    }

    pub fn get(&self, id: &FeatureId) -> Option<&FeatureSpec> {
        self.specs.get(id)
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.specs.contains_key(id)
    }

    /// Declared features in deterministic (lexicographic) order.
    pub fn iter(&self) -> impl Iterator<Item = (&FeatureId, &FeatureSpec)> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// A named set of feature values for one cell.
///
/// A feature is either present with a number or absent — a missing entry is
/// absent, and absence is never conflated with an observed zero. Backed by a
/// BTreeMap so iteration order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRow {
    values: BTreeMap<FeatureId, f64>,
}

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of a feature, or None if it is absent for this cell.
    pub fn get(&self, id: &FeatureId) -> Option<f64> {
        self.values.get(id).copied()
    }

    pub fn set(&mut self, id: FeatureId, value: f64) {
        self.values.insert(id, value);
    }

    /// Mark a feature explicitly absent for this cell.
    pub fn clear(&mut self, id: &FeatureId) {
        self.values.remove(id);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FeatureId, f64)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(FeatureId, f64)> for FeatureRow {
    fn from_iter<T: IntoIterator<Item = (FeatureId, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
