//! Terminal summaries of profiles and analysis results

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;
use std::time::Duration;

use crate::pipeline::{ConditionalDistribution, FeatureProfile, RedundancyMatrix, Relevancy};

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    table
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

fn print_section(icon: &str, title: &str) {
    println!();
    println!(
        "    {} {}",
        style(icon).cyan(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
    println!();
}

fn score_color(score: f64) -> Color {
    if score >= 0.3 {
        Color::Green
    } else if score >= 0.1 {
        Color::Yellow
    } else {
        Color::White
    }
}

fn format_number(value: f64) -> String {
    if value.is_nan() {
        "-".to_string()
    } else {
        format!("{:.4}", value)
    }
}

/// Counters of one chained analysis run
#[derive(Debug, Default)]
pub struct AnalysisSummary {
    pub target: String,
    pub mode: String,
    pub invocations: u32,
    pub skipped_invocations: u32,
    pub runs: usize,
    pub slices_sampled: usize,
    pub elapsed: Duration,
}

impl AnalysisSummary {
    pub fn new(target: &str, mode: &str) -> Self {
        Self {
            target: target.to_string(),
            mode: mode.to_string(),
            ..Default::default()
        }
    }

    pub fn display(&self) {
        print_section("📋", "ANALYSIS SUMMARY");

        let mut table = new_table(&["Metric", "Value"]);
        table.add_row(vec![Cell::new("🎯 Target"), Cell::new(&self.target)]);
        table.add_row(vec![Cell::new("🧭 Mode"), Cell::new(&self.mode)]);
        table.add_row(vec![
            Cell::new("🔁 Invocations"),
            Cell::new(self.invocations),
        ]);
        if self.skipped_invocations > 0 {
            table.add_row(vec![
                Cell::new("⏭️  Already complete"),
                Cell::new(self.skipped_invocations).fg(Color::Yellow),
            ]);
        }
        table.add_row(vec![Cell::new("🎲 Contrast runs"), Cell::new(self.runs)]);
        table.add_row(vec![
            Cell::new("🔪 Slices sampled"),
            Cell::new(self.slices_sampled),
        ]);
        table.add_row(vec![
            Cell::new("⏱️  Elapsed"),
            Cell::new(format!("{:.2}s", self.elapsed.as_secs_f64()))
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
        ]);
        print_indented(&table);
    }
}

/// Relevancies sorted by score, strongest first
pub fn print_relevancy_table(relevancies: &[Relevancy], limit: usize) {
    print_section("📈", "RELEVANCIES");
    if relevancies.is_empty() {
        println!("      {}", style("No relevancies stored yet").dim());
        return;
    }

    let mut sorted: Vec<&Relevancy> = relevancies.iter().collect();
    sorted.sort_by(|a, b| b.relevancy.total_cmp(&a.relevancy));

    let mut table = new_table(&["#", "Subset", "Relevancy", "Iterations"]);
    for (rank, r) in sorted.iter().take(limit).enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(r.subset.to_string()),
            Cell::new(format_number(r.relevancy))
                .fg(score_color(r.relevancy))
                .set_alignment(CellAlignment::Right),
            Cell::new(r.iteration).set_alignment(CellAlignment::Right),
        ]);
    }
    print_indented(&table);

    if sorted.len() > limit {
        println!(
            "      {}",
            style(format!("... and {} more", sorted.len() - limit)).dim()
        );
    }
}

/// Evaluated redundancy pairs, most redundant first
pub fn print_redundancy_table(matrix: &RedundancyMatrix, limit: usize) {
    print_section("🔗", "REDUNDANCIES");
    let mut pairs = matrix.pairs();
    if pairs.is_empty() {
        println!("      {}", style("No redundancies stored yet").dim());
        return;
    }
    pairs.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut table = new_table(&["Feature A", "Feature B", "Redundancy", "Weight"]);
    for (a, b, score, weight) in pairs.iter().take(limit) {
        table.add_row(vec![
            Cell::new(a),
            Cell::new(b),
            Cell::new(format_number(*score))
                .fg(score_color(*score))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.0}", weight)).set_alignment(CellAlignment::Right),
        ]);
    }
    print_indented(&table);
}

pub fn print_profile_table(profiles: &[FeatureProfile]) {
    print_section("📊", "FEATURE PROFILE");

    let mut table = new_table(&["Feature", "Type", "Min", "Max", "Mean", "Variance"]);
    for p in profiles {
        let kind = match &p.stats.categories {
            Some(categories) => Cell::new(format!("categorical ({})", categories.len()))
                .fg(Color::Magenta),
            None => Cell::new("continuous"),
        };
        table.add_row(vec![
            Cell::new(&p.name),
            kind,
            Cell::new(format_number(p.stats.min)).set_alignment(CellAlignment::Right),
            Cell::new(format_number(p.stats.max)).set_alignment(CellAlignment::Right),
            Cell::new(format_number(p.stats.mean)).set_alignment(CellAlignment::Right),
            Cell::new(format_number(p.stats.variance)).set_alignment(CellAlignment::Right),
        ]);
    }
    print_indented(&table);
}

pub fn print_distribution(distribution: &ConditionalDistribution) {
    print_section("🎯", "CONDITIONAL DISTRIBUTION");
    println!(
        "      Matching rows: {}",
        style(distribution.matching_rows).yellow().bold()
    );
    println!();

    let mut table = new_table(&["Value", "Probability"]);
    for point in &distribution.distribution {
        table.add_row(vec![
            Cell::new(format_number(point.value)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}%", point.probability * 100.0))
                .set_alignment(CellAlignment::Right),
        ]);
    }
    print_indented(&table);
}
