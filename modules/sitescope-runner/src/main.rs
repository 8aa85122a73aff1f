use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sitescope_common::{Cell, ScanDocument};
use sitescope_model::{MemorySink, MemoryStore, ScanPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sitescope=info".parse()?))
        .init();

    info!("SiteScope scan starting...");

    let scan_path = env_or("SITESCOPE_SCAN", "scan.toml");
    let cells_path = env_or("SITESCOPE_CELLS", "cells.json");
    let out_dir = PathBuf::from(env_or("SITESCOPE_OUT", "out"));

    // Scan document: configuration + reference portfolio
    let raw = fs::read_to_string(&scan_path)
        .with_context(|| format!("reading scan document `{scan_path}`"))?;
    let document = ScanDocument::from_toml_str(&raw)?;
    info!(
        references = document.references.len(),
        features = document.config.catalog.len(),
        "Loaded scan document"
    );

    // Cell dump: one row per cell, exported by the upstream feature store
    let raw = fs::read_to_string(&cells_path)
        .with_context(|| format!("reading cell dump `{cells_path}`"))?;
    let cells: Vec<Cell> =
        serde_json::from_str(&raw).with_context(|| format!("parsing cell dump `{cells_path}`"))?;
    info!(cells = cells.len(), "Loaded cell dump");

    let store = Arc::new(MemoryStore::new(cells));
    let sink = Arc::new(MemorySink::new());
    let pipeline = ScanPipeline::new(document.config, document.references)?;
    let report = pipeline.run(store, sink.clone()).await?;

    // Dump the derived tables, one directory per city, replaced wholesale
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    for city_report in &report.cities {
        let city = &city_report.city;
        let city_dir = out_dir.join(city);
        fs::create_dir_all(&city_dir)
            .with_context(|| format!("creating output directory {}", city_dir.display()))?;

        write_json(&city_dir.join("smoothed.json"), &sink.smoothed(city))?;
        write_json(&city_dir.join("scores.json"), &sink.scores(city))?;
        write_json(&city_dir.join("selection.json"), &sink.selection(city))?;
    }
    write_json(&out_dir.join("report.json"), &report)?;

    let selected: usize = report.cities.iter().map(|c| c.selected).sum();
    info!(
        run_id = %report.run_id,
        cities = report.cities.len(),
        selected,
        out = %out_dir.display(),
        "Scan complete"
    );
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn write_json<T: serde::Serialize>(path: &std::path::Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}
