//! Phase cache and time-series export.
//!
//! The cache holds what a later phase needs to resume: the state arrays, the
//! recorded series and the phase that produced them. Parameters and the cluster
//! are rebuilt from configuration on load.

use crate::simulation::RunKind;
use crate::state::SimState;
use anyhow::{Context, Result};
use bioelectric_common::{OutputConfig, TimeSeries};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct CacheRef<'a> {
    kind: RunKind,
    state: &'a SimState,
    series: &'a TimeSeries,
}

/// A finished phase read back from the cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CachedRun {
    pub kind: RunKind,
    pub state: SimState,
    pub series: TimeSeries,
}

pub fn cache_path(cache_dir: &Path, kind: RunKind) -> PathBuf {
    cache_dir.join(kind.cache_file())
}

/// Writes a finished phase to `cache_dir`, creating the directory if needed.
pub fn save_cache(cache_dir: &Path, kind: RunKind, state: &SimState, series: &TimeSeries) -> Result<PathBuf> {
    fs::create_dir_all(cache_dir)
        .with_context(|| format!("Failed to create cache directory '{}'", cache_dir.display()))?;
    let path = cache_path(cache_dir, kind);
    let file = File::create(&path).with_context(|| format!("Failed to create cache file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, &CacheRef { kind, state, series })
        .with_context(|| format!("Failed to write cache file '{}'", path.display()))?;
    writer.flush()?;
    info!("Saved {} phase to {}", kind, path.display());
    Ok(path)
}

pub fn load_cache(cache_dir: &Path, kind: RunKind) -> Result<CachedRun> {
    let path = cache_path(cache_dir, kind);
    let file = File::open(&path).with_context(|| {
        format!("Failed to open cache file '{}'; run the {} phase first", path.display(), kind)
    })?;
    let run: CachedRun = bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("Failed to read cache file '{}'", path.display()))?;
    info!("Loaded {} phase from {} ({} samples).", run.kind, path.display(), run.series.len());
    Ok(run)
}

/// Serialization used for exported time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Bincode,
    MessagePack,
}

impl ExportFormat {
    /// Resolves `[output].format`. Unknown names fall back to JSON.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.unwrap_or("json") {
            "json" => ExportFormat::Json,
            "bincode" => ExportFormat::Bincode,
            "messagepack" => ExportFormat::MessagePack,
            other => {
                warn!("Unknown output format: {}. Using JSON instead.", other);
                ExportFormat::Json
            }
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Bincode => "bin",
            ExportFormat::MessagePack => "msgpack",
        }
    }
}

/// Writes the series of one phase to `out_dir/{base}_{phase}_series.{ext}`.
pub fn export_series(series: &TimeSeries, output: &OutputConfig, out_dir: &Path, kind: RunKind) -> Result<PathBuf> {
    let format = ExportFormat::from_name(output.format.as_deref());
    fs::create_dir_all(out_dir).with_context(|| format!("Failed to create output directory '{}'", out_dir.display()))?;
    let path = out_dir.join(format!("{}_{}_series.{}", output.base_filename, kind, format.extension()));
    let file = File::create(&path).with_context(|| format!("Failed to create output file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    match format {
        ExportFormat::Json => serde_json::to_writer(&mut writer, series)
            .with_context(|| format!("Failed to serialize series to JSON '{}'", path.display()))?,
        ExportFormat::Bincode => bincode::serialize_into(&mut writer, series)
            .with_context(|| format!("Failed to serialize series to bincode '{}'", path.display()))?,
        ExportFormat::MessagePack => rmp_serde::encode::write(&mut writer, series)
            .with_context(|| format!("Failed to serialize series to MessagePack '{}'", path.display()))?,
    }
    writer.flush()?;
    info!("{} samples saved to {} ({:?} format)", series.len(), path.display(), format);
    Ok(path)
}

/// One row per sample: time, then Vmem of every site.
pub fn export_vm_csv(series: &TimeSeries, path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create CSV file '{}'", path.display()))?;
    let n_sites = series.vm_time().first().map_or(0, |vm| vm.len());
    let mut header = vec!["time".to_string()];
    header.extend((0..n_sites).map(|s| format!("site_{}", s)));
    writer.write_record(&header)?;
    for (t, vm) in series.time().iter().zip(series.vm_time()) {
        let mut row = vec![format!("{:.6}", t)];
        row.extend(vm.iter().map(|v| format!("{:.6e}", v)));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    info!("Vmem time series saved to {}", path.display());
    Ok(())
}
