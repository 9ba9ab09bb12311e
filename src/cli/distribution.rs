//! The `distribution` subcommand

use anyhow::{Context, Result};

use super::args::DistributionArgs;
use super::load_input;
use crate::pipeline::{conditional_distribution, LoadOptions};
use crate::report::print_distribution;

pub fn run_distribution(args: &DistributionArgs, options: LoadOptions) -> Result<()> {
    let table = load_input(&args.input, options)?;
    let constraints = args.constraints();
    let distribution =
        conditional_distribution(&table, &args.target, &constraints, args.max_samples)
            .with_context(|| format!("Failed to compute distribution of '{}'", args.target))?;

    print_distribution(&distribution);

    if let Some(samples) = &distribution.samples {
        println!();
        println!("{}", serde_json::to_string_pretty(samples)?);
    }
    Ok(())
}
