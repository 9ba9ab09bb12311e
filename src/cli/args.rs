//! Command-line argument definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::pipeline::{FeatureConstraint, LoadOptions};

/// Fexum - Estimate feature relevance and redundancy with randomized slicing
#[derive(Parser, Debug)]
#[command(name = "fexum")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Field separator for delimited input files
    #[arg(long, global = true, default_value = ",", value_parser = parse_separator)]
    pub separator: u8,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan (very slow for large files).
    #[arg(long, global = true, default_value = "10000")]
    pub infer_schema_length: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute per-feature statistics and histograms
    Profile(ProfileArgs),

    /// Estimate relevancies (and optionally redundancies) for a target
    Analyze(AnalyzeArgs),

    /// Show the target distribution inside feature constraints
    Distribution(DistributionArgs),
}

#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Input file path (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Number of histogram buckets for continuous features
    #[arg(long, default_value = "50", value_parser = parse_positive)]
    pub bins: usize,

    /// Length of the downsampled value sequence per feature
    #[arg(long, default_value = "100", value_parser = parse_positive)]
    pub downsample: usize,

    /// Export the full profile as JSON to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    /// Every feature on its own
    Bivariate,
    /// Random subsets of all features
    Multivariate,
    /// Exactly the subset given with --features
    Subset,
    /// Random supersets of the subset given with --features
    Superset,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Input file path (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Target column name.
    /// If not provided, will be selected interactively from available columns.
    #[arg(short, long)]
    pub target: Option<String>,

    /// Analysis mode
    #[arg(long, value_enum, default_value = "bivariate")]
    pub mode: AnalysisKind,

    /// Feature subset for subset and superset modes (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub features: Vec<String>,

    /// Also estimate pairwise redundancies (bivariate mode only)
    #[arg(long, default_value = "false")]
    pub redundancies: bool,

    /// Number of engine invocations to chain
    #[arg(long, default_value = "10", value_parser = parse_positive_u32)]
    pub iterations: u32,

    /// JSON result store. Defaults to '<input stem>_hics.json' beside the input.
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Engine configuration file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Random seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fraction of rows a slice should capture, in (0, 1]
    #[arg(long, value_parser = parse_alpha)]
    pub alpha: Option<f64>,

    /// Slices drawn per contrast evaluation
    #[arg(long, value_parser = parse_positive)]
    pub slice_iterations: Option<usize>,

    /// Export relevancies, redundancies and best slices as JSON to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of rows shown in the result tables
    #[arg(long, default_value = "20")]
    pub top: usize,

    /// Skip interactive prompts
    #[arg(long, default_value = "false")]
    pub no_confirm: bool,
}

#[derive(Args, Debug)]
pub struct DistributionArgs {
    /// Input file path (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Target column name
    #[arg(short, long)]
    pub target: String,

    /// Range constraint as feature:from:to (repeatable)
    #[arg(long = "range", value_parser = parse_range)]
    pub ranges: Vec<FeatureConstraint>,

    /// Category constraint as feature:c1,c2,... (repeatable)
    #[arg(long = "categories", value_parser = parse_categories)]
    pub categories: Vec<FeatureConstraint>,

    /// Also return up to about this many matching rows
    #[arg(long, value_parser = parse_positive)]
    pub max_samples: Option<usize>,
}

impl Cli {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            separator: self.separator,
            infer_schema_length: self.infer_schema_length,
        }
    }
}

impl AnalyzeArgs {
    /// Result store path, deriving from the input if not explicitly provided.
    pub fn store_path(&self) -> PathBuf {
        self.store.clone().unwrap_or_else(|| {
            let parent = self.input.parent().unwrap_or_else(|| Path::new("."));
            let stem = self
                .input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("dataset");
            parent.join(format!("{}_hics.json", stem))
        })
    }
}

impl DistributionArgs {
    pub fn constraints(&self) -> Vec<FeatureConstraint> {
        self.ranges
            .iter()
            .chain(&self.categories)
            .cloned()
            .collect()
    }
}

fn parse_separator(s: &str) -> Result<u8, String> {
    match s {
        "\\t" | "tab" => Ok(b'\t'),
        _ if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        _ => Err(format!("separator must be a single ASCII character, got '{}'", s)),
    }
}

fn parse_positive(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid count", s))?;
    if value == 0 {
        Err("value must be at least 1".to_string())
    } else {
        Ok(value)
    }
}

fn parse_positive_u32(s: &str) -> Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid count", s))?;
    if value == 0 {
        Err("value must be at least 1".to_string())
    } else {
        Ok(value)
    }
}

/// Validator for the alpha parameter
fn parse_alpha(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(format!("alpha must be in (0, 1], got {}", value))
    }
}

fn parse_number(s: &str) -> Result<f64, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))
}

/// Feature names may contain ':', so the bounds are taken from the right
fn parse_range(s: &str) -> Result<FeatureConstraint, String> {
    let mut parts = s.rsplitn(3, ':');
    let (Some(to), Some(from), Some(feature)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected feature:from:to, got '{}'", s));
    };
    let from_value = parse_number(from)?;
    let to_value = parse_number(to)?;
    if from_value > to_value {
        return Err(format!("range '{}' has from > to", s));
    }
    Ok(FeatureConstraint::Range {
        feature: feature.to_string(),
        from_value,
        to_value,
    })
}

fn parse_categories(s: &str) -> Result<FeatureConstraint, String> {
    let (feature, values) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected feature:c1,c2,..., got '{}'", s))?;
    let categories = values
        .split(',')
        .map(parse_number)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FeatureConstraint::Categories {
        feature: feature.to_string(),
        categories,
    })
}
