//! JSON export of profiles and analysis results

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::pipeline::{FeatureProfile, FeatureSubset, HicsConfig, Relevancy, SliceEvidence};

/// Metadata about the run that produced an export
#[derive(Serialize)]
pub struct ExportMetadata {
    /// Timestamp of the run (ISO 8601 format)
    pub timestamp: String,
    pub fexum_version: String,
    pub input_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
}

impl ExportMetadata {
    pub fn new(input_file: &Path, target_column: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            fexum_version: env!("CARGO_PKG_VERSION").to_string(),
            input_file: input_file.display().to_string(),
            target_column: target_column.map(str::to_string),
        }
    }
}

/// A feature profile with its downsampled value sequence
#[derive(Serialize)]
pub struct ProfileExportEntry {
    #[serde(flatten)]
    pub profile: FeatureProfile,
    pub downsampled: Vec<f64>,
}

#[derive(Serialize)]
pub struct ProfileExport {
    pub metadata: ExportMetadata,
    pub rows: usize,
    pub features: Vec<ProfileExportEntry>,
}

#[derive(Serialize)]
pub struct RedundancyExportEntry {
    pub first_feature: String,
    pub second_feature: String,
    pub redundancy: f64,
    pub weight: f64,
}

#[derive(Serialize)]
pub struct SliceExportEntry {
    pub subset: FeatureSubset,
    #[serde(flatten)]
    pub slice: SliceEvidence,
}

/// Accumulated evidence of one result set
#[derive(Serialize)]
pub struct AnalysisExport {
    pub metadata: ExportMetadata,
    pub config: HicsConfig,
    pub mode: String,
    pub iterations_completed: u32,
    pub relevancies: Vec<Relevancy>,
    pub redundancies: Vec<RedundancyExportEntry>,
    pub slices: Vec<SliceExportEntry>,
}

/// Serialize any export as pretty JSON to `output_path`
pub fn write_json<T: Serialize>(value: &T, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize export")?;
    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write export file: {}", output_path.display()))?;
    Ok(())
}
