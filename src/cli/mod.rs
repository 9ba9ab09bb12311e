//! CLI module - argument parsing, interactive prompts and subcommands

pub mod analyze;
mod args;
pub mod distribution;
pub mod profile;
mod prompts;

pub use args::{AnalysisKind, AnalyzeArgs, Cli, Commands, DistributionArgs, ProfileArgs};
pub use prompts::*;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::pipeline::{ColumnarTable, DatasetCache, FileMapSource, LoadOptions};
use crate::utils::{create_spinner, finish_with_success};

/// Load the input through a dataset cache keyed by the file stem
pub(crate) fn load_input(input: &Path, options: LoadOptions) -> Result<Arc<ColumnarTable>> {
    let dataset_id = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset")
        .to_string();
    let cache = DatasetCache::with_options(FileMapSource::new().with_file(&dataset_id, input), options);

    let spinner = create_spinner("Loading dataset...");
    let table = cache
        .acquire(&dataset_id)
        .with_context(|| format!("Failed to load dataset: {}", input.display()))?;
    finish_with_success(
        &spinner,
        &format!(
            "Loaded {} rows x {} columns ({:.2} MB)",
            table.height(),
            table.width(),
            table.estimated_size() as f64 / (1024.0 * 1024.0)
        ),
    );
    Ok(table)
}
