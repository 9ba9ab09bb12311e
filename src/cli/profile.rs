//! The `profile` subcommand: statistics, histograms and downsampled values

use anyhow::Result;

use super::args::ProfileArgs;
use super::load_input;
use crate::pipeline::{downsample, profile_dataset, LoadOptions};
use crate::report::{print_profile_table, write_json, ExportMetadata, ProfileExport, ProfileExportEntry};
use crate::utils::{create_spinner, finish_with_success, print_banner, print_success};

pub fn run_profile(args: &ProfileArgs, options: LoadOptions) -> Result<()> {
    print_banner(env!("CARGO_PKG_VERSION"));
    let table = load_input(&args.input, options)?;

    let spinner = create_spinner("Profiling features...");
    let profiles = profile_dataset(&table, args.bins)?;
    finish_with_success(&spinner, &format!("Profiled {} feature(s)", profiles.len()));

    print_profile_table(&profiles);

    if let Some(output) = &args.output {
        let features = profiles
            .into_iter()
            .map(|profile| -> Result<ProfileExportEntry> {
                let downsampled = downsample(&table, &profile.name, args.downsample)?;
                Ok(ProfileExportEntry {
                    profile,
                    downsampled,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let export = ProfileExport {
            metadata: ExportMetadata::new(&args.input, None),
            rows: table.height(),
            features,
        };
        write_json(&export, output)?;
        print_success(&format!("Exported profile to {}", output.display()));
    }
    Ok(())
}
