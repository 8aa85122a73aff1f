//! End-to-end pipeline scenarios on a small synthetic tessellation:
//! smoothing → profile → scoring with vetoes → diversified selection.

use std::sync::Arc;

use sitescope_common::{
    haversine_m, Cell, CellId, FeatureId, FeatureRow, GeoPoint, HexCoord, ReferenceLocation,
    ScanConfig,
};
use sitescope_model::{MemorySink, MemoryStore, ScanPipeline, VetoReason};

/// Latitude a given number of meters north of the 40° parallel
/// (one degree of latitude is ~111.195 km at R = 6371 km).
fn lat_at(meters: f64) -> f64 {
    40.0 + meters / 111_194.93
}

fn cell(id: &str, city: &str, north_m: f64, coord: HexCoord, income: f64) -> Cell {
    let mut raw = FeatureRow::new();
    raw.set(FeatureId::from("avg_income"), income);
    Cell {
        id: CellId::from(id),
        city: city.to_string(),
        centroid: GeoPoint {
            lat: lat_at(north_m),
            lng: -3.7020,
        },
        boundary: Vec::new(),
        grid: Some(coord),
        area_class: None,
        raw,
        smoothed: FeatureRow::new(),
    }
}

/// Seven madrid hexagons on a line. H0 carries the reference (income 80k);
/// H1 and H2 sit inside the 1500m cannibalization radius; H5 is 1600m out.
fn madrid_cells() -> Vec<Cell> {
    vec![
        cell("H0", "madrid", 0.0, HexCoord::new(0, 0), 80_000.0),
        cell("H1", "madrid", 600.0, HexCoord::new(1, 0), 60_000.0),
        cell("H2", "madrid", 1_200.0, HexCoord::new(2, 0), 55_000.0),
        cell("H3", "madrid", 2_800.0, HexCoord::new(3, 0), 70_000.0),
        cell("H4", "madrid", 4_000.0, HexCoord::new(4, 0), 68_000.0),
        cell("H5", "madrid", 1_600.0, HexCoord::new(5, 0), 66_000.0),
        cell("H6", "madrid", 5_200.0, HexCoord::new(6, 0), 45_000.0),
    ]
}

/// Valencia cells at coordinates numerically close to madrid's vetoed zone.
fn valencia_cells() -> Vec<Cell> {
    vec![
        cell("V0", "valencia", 0.0, HexCoord::new(0, 0), 72_000.0),
        cell("V1", "valencia", 600.0, HexCoord::new(1, 0), 70_000.0),
        cell("V2", "valencia", 1_200.0, HexCoord::new(2, 0), 71_000.0),
    ]
}

fn scenario_config() -> ScanConfig {
    let mut config = ScanConfig::default();
    config.target_count_per_city = 3;
    // cannibalization_radius_m 1500, min_separation_m 1000, margin 0.85,
    // ring weights {1.0, 0.6, 0.3} are the defaults under test
    config
}

fn references() -> Vec<ReferenceLocation> {
    vec![ReferenceLocation {
        city: "madrid".to_string(),
        name: "Fuencarral".to_string(),
        lat: lat_at(0.0),
        lon: -3.7020,
    }]
}

async fn run_scenario() -> (MemorySink, sitescope_common::RunReport) {
    let mut cells = madrid_cells();
    cells.extend(valencia_cells());
    let store = Arc::new(MemoryStore::new(cells));
    let sink = Arc::new(MemorySink::new());

    let pipeline = ScanPipeline::new(scenario_config(), references()).expect("valid pipeline");
    let report = pipeline
        .run(store, sink.clone())
        .await
        .expect("scenario run should succeed");

    let sink = Arc::try_unwrap(sink).expect("sink has no other owners after the run");
    (sink, report)
}

#[tokio::test]
async fn cannibalization_zone_is_vetoed_and_h5_is_eligible() {
    let (sink, _) = run_scenario().await;
    let scores = sink.scores("madrid").expect("madrid score table written");

    let row = |id: &str| {
        scores
            .iter()
            .find(|r| r.cell.as_str() == id)
            .unwrap_or_else(|| panic!("missing score row for {id}"))
    };

    // Every hexagon within 1500m of the reference is a hard zero with an
    // explicit reason — H0 itself included.
    for id in ["H0", "H1", "H2"] {
        let r = row(id);
        assert_eq!(r.final_score, 0.0, "{id} must score exactly 0");
        assert_eq!(r.veto, Some(VetoReason::Cannibalization), "{id} veto");
    }

    // 1600m out: beyond the radius, eligible.
    let h5 = row("H5");
    assert_eq!(h5.veto, None);
    assert!(h5.final_score > 0.0);
}

#[tokio::test]
async fn top_three_respects_minimum_separation() {
    let (sink, _) = run_scenario().await;
    let selection = sink.selection("madrid").expect("madrid selection written");
    assert_eq!(selection.rows.len(), 3);
    assert!(selection.shortfall.is_none());

    // Ranks are 1..=3 in score order
    let ranks: Vec<u32> = selection.rows.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);

    let cells = madrid_cells();
    let point_of = |id: &CellId| {
        cells
            .iter()
            .find(|c| &c.id == id)
            .map(|c| c.centroid)
            .expect("selected cell exists")
    };
    for (i, a) in selection.rows.iter().enumerate() {
        for b in selection.rows.iter().skip(i + 1) {
            let d = haversine_m(point_of(&a.cell), point_of(&b.cell));
            assert!(
                d >= 1_000.0,
                "{} and {} are only {d:.0}m apart",
                a.cell,
                b.cell
            );
        }
    }
}

#[tokio::test]
async fn selection_in_one_city_never_touches_another() {
    let (sink, report) = run_scenario().await;

    // Valencia sits at coordinates numerically close to madrid's vetoed and
    // suppressed zone, but has no reference of its own: its candidates are
    // untouched by madrid's veto radius and madrid's selections.
    let scores = sink.scores("valencia").expect("valencia score table");
    for row in &scores {
        assert_ne!(
            row.veto,
            Some(VetoReason::Cannibalization),
            "{} must not inherit madrid's cannibalization",
            row.cell
        );
    }

    let selection = sink.selection("valencia").expect("valencia selection");
    let picked: Vec<&str> = selection.rows.iter().map(|r| r.cell.as_str()).collect();
    // V1 is 600m from V0 and suppressed within valencia; V2 survives.
    assert_eq!(picked, vec!["V0", "V2"]);

    // Short of the target of 3 — with a recorded reason, never silently.
    let reason = selection.shortfall.as_deref().expect("shortfall recorded");
    assert!(reason.contains("only 2 of 3"), "got: {reason}");
    let valencia_report = report
        .cities
        .iter()
        .find(|c| c.city == "valencia")
        .expect("valencia city report");
    assert_eq!(valencia_report.selected, 2);
    assert!(valencia_report.shortfall.is_some());
}

#[tokio::test]
async fn pipeline_is_deterministic() {
    let (first_sink, _) = run_scenario().await;
    let (second_sink, _) = run_scenario().await;

    for city in ["madrid", "valencia"] {
        let a = serde_json::to_string(&first_sink.scores(city)).expect("serialize scores");
        let b = serde_json::to_string(&second_sink.scores(city)).expect("serialize scores");
        assert_eq!(a, b, "score tables must match for {city}");

        let a = serde_json::to_string(&first_sink.selection(city)).expect("serialize selection");
        let b = serde_json::to_string(&second_sink.selection(city)).expect("serialize selection");
        assert_eq!(a, b, "selection tables must match for {city}");

        let a = serde_json::to_string(&first_sink.smoothed(city)).expect("serialize smoothed");
        let b = serde_json::to_string(&second_sink.smoothed(city)).expect("serialize smoothed");
        assert_eq!(a, b, "smoothed tables must match for {city}");
    }
}

#[tokio::test]
async fn malformed_values_are_itemized_not_fatal() {
    let mut cells = madrid_cells();
    cells.extend(valencia_cells());
    // A negative income and an undeclared feature on one cell
    cells[3]
        .raw
        .set(FeatureId::from("avg_income"), -4.0);
    cells[4].raw.set(FeatureId::from("unicorn_index"), 9.0);

    let store = Arc::new(MemoryStore::new(cells));
    let sink = Arc::new(MemorySink::new());
    let pipeline = ScanPipeline::new(scenario_config(), references()).expect("valid pipeline");
    let report = pipeline.run(store, sink).await.expect("run continues");

    let madrid = report
        .cities
        .iter()
        .find(|c| c.city == "madrid")
        .expect("madrid report");
    assert_eq!(madrid.data_errors.count, 2);
    assert!(madrid
        .data_errors
        .samples
        .iter()
        .any(|s| s.contains("unicorn_index")));
}

#[tokio::test]
async fn unresolved_references_abort_when_nothing_remains() {
    let store = Arc::new(MemoryStore::new(madrid_cells()));
    let sink = Arc::new(MemorySink::new());

    // The only reference points far outside the covered grid
    let refs = vec![ReferenceLocation {
        city: "madrid".to_string(),
        name: "Ghost".to_string(),
        lat: 41.9,
        lon: -8.0,
    }];
    let pipeline = ScanPipeline::new(scenario_config(), refs).expect("valid pipeline");
    let err = pipeline.run(store, sink).await.unwrap_err();
    assert!(
        matches!(err, sitescope_common::ScanError::EmptyReferences(_)),
        "got: {err}"
    );
}
