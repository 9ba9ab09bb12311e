//! The `analyze` subcommand: chained engine invocations against a JSON store

use std::time::Instant;

use anyhow::{Context, Result};
use console::style;
use tracing::debug;

use super::args::{AnalysisKind, AnalyzeArgs};
use super::{confirm_analysis, load_input, select_target};
use crate::pipeline::{
    categorical_columns, run_calculation, FeatureCatalog, HicsConfig, HicsRequest,
    InvocationStatus, JsonFileStorage, LoadOptions, ResultStorage,
};
use crate::report::{
    print_redundancy_table, print_relevancy_table, write_json, AnalysisExport, AnalysisSummary,
    ExportMetadata, RedundancyExportEntry, SliceExportEntry,
};
use crate::utils::{
    create_invocation_bar, finish_with_success, finish_with_warning, print_banner,
    print_completion, print_config, print_info, print_step_header, print_step_time,
    print_success, RunCard,
};

/// Engine request for the selected mode
pub fn build_request(args: &AnalyzeArgs) -> HicsRequest {
    HicsRequest {
        features: args.features.clone(),
        bivariate: args.mode == AnalysisKind::Bivariate,
        calculate_supersets: args.mode == AnalysisKind::Superset,
        calculate_redundancies: args.redundancies,
    }
}

/// Engine parameters: config file or defaults, then CLI overrides
pub fn build_config(args: &AnalyzeArgs) -> Result<HicsConfig> {
    let mut config = match &args.config {
        Some(path) => HicsConfig::from_json_file(path)
            .with_context(|| format!("Failed to read engine config: {}", path.display()))?,
        None => HicsConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(iterations) = args.slice_iterations {
        config.iterations = iterations;
    }
    config.validate()?;
    Ok(config)
}

pub fn run_analyze(args: &AnalyzeArgs, options: LoadOptions) -> Result<()> {
    let request = build_request(args);
    let mode = request.mode()?;
    let config = build_config(args)?;

    print_banner(env!("CARGO_PKG_VERSION"));

    let step_start = Instant::now();
    let table = load_input(&args.input, options)?;

    let target = match &args.target {
        Some(target) => target.clone(),
        None if args.no_confirm => anyhow::bail!(
            "Target column is required when using --no-confirm. Use -t/--target to specify."
        ),
        None => select_target(table.column_names())?,
    };
    if table.column_index(&target).is_none() {
        anyhow::bail!(
            "Target column '{}' not found in dataset. Available columns: {:?}",
            target,
            table.column_names()
        );
    }

    let store_path = args.store_path();
    let storage = JsonFileStorage::open(&store_path, FeatureCatalog::from_table(&table))
        .with_context(|| format!("Failed to open result store: {}", store_path.display()))?;

    let mode_label = mode.to_string();
    print_config(&RunCard {
        input: &args.input,
        target: &target,
        store: &store_path,
        mode: &mode_label,
        invocations: args.iterations,
        alpha: config.alpha,
        slice_iterations: config.iterations,
    });

    if !args.no_confirm && !confirm_analysis(&target, table.width() - 1, args.iterations)? {
        println!("Cancelled by user.");
        return Ok(());
    }
    print_step_time(step_start.elapsed());

    print_step_header(1, "Accumulate Evidence");
    let step_start = Instant::now();
    let result_set = storage.find_or_create_result_set(&target)?;
    let calculation = storage.create_calculation(result_set, request, args.iterations)?;
    let categorical = categorical_columns(&table);
    debug!(
        calculation = calculation.id,
        result_set,
        categorical = categorical.len(),
        "Starting chained invocations"
    );

    let mut summary = AnalysisSummary::new(&target, &mode_label);
    let bar = create_invocation_bar(u64::from(args.iterations));
    loop {
        let outcome = run_calculation(&table, &categorical, &storage, calculation.id, &config)?;
        summary.invocations += 1;
        summary.runs += outcome.runs;
        summary.slices_sampled += outcome.slices_sampled;
        bar.set_position(u64::from(outcome.calculation.current_iteration));

        if outcome.status == InvocationStatus::AlreadyComplete {
            summary.skipped_invocations += 1;
            finish_with_warning(&bar, "Calculation was already complete");
            break;
        }
        if outcome.calculation.is_done() {
            finish_with_success(&bar, "Evidence accumulated");
            break;
        }
    }
    summary.elapsed = step_start.elapsed();
    print_step_time(summary.elapsed);

    print_step_header(2, "Results");
    let relevancies = storage.get_relevancies(result_set)?;
    print_relevancy_table(&relevancies, args.top);

    let features: Vec<String> = table
        .column_names()
        .iter()
        .filter(|name| **name != target)
        .cloned()
        .collect();
    let redundancies = storage.get_redundancies(result_set, &features)?;
    if args.redundancies {
        print_redundancy_table(&redundancies, args.top);
    }

    if let Some(output) = &args.output {
        let mut slices: Vec<SliceExportEntry> = storage
            .get_slices(result_set)?
            .into_iter()
            .map(|(subset, slice)| SliceExportEntry { subset, slice })
            .collect();
        slices.sort_by(|a, b| a.subset.cmp(&b.subset));

        let export = AnalysisExport {
            metadata: ExportMetadata::new(&args.input, Some(&target)),
            config: config.clone(),
            mode: mode_label.clone(),
            iterations_completed: storage.load_calculation(calculation.id)?.current_iteration,
            relevancies,
            redundancies: redundancies
                .pairs()
                .into_iter()
                .map(|(a, b, redundancy, weight)| RedundancyExportEntry {
                    first_feature: a.to_string(),
                    second_feature: b.to_string(),
                    redundancy,
                    weight,
                })
                .collect(),
            slices,
        };
        write_json(&export, output)?;
        print_success(&format!("Exported analysis to {}", output.display()));
    }

    summary.display();
    print_info(&format!(
        "Results stored in {}",
        style(store_path.display()).dim()
    ));
    print_completion();
    Ok(())
}
