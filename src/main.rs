//! Fexum: Feature Relevance CLI Tool
//!
//! A command-line tool for profiling datasets and accumulating relevance
//! and redundancy estimates for a target column.

use anyhow::Result;
use clap::Parser;

use fexum::cli::{analyze, distribution, profile, Cli, Commands};
use fexum::utils::init_logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let options = cli.load_options();

    match &cli.command {
        Commands::Profile(args) => profile::run_profile(args, options),
        Commands::Analyze(args) => analyze::run_analyze(args, options),
        Commands::Distribution(args) => distribution::run_distribution(args, options),
    }
}
