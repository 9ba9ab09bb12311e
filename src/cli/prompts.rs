//! Interactive prompts using dialoguer

use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, Select};

/// Prompt user to confirm proceeding with an action
pub fn confirm_step(message: &str) -> Result<bool> {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(message)
        .default(true)
        .interact()?;
    Ok(confirmed)
}

/// Prompt user to pick the target among the dataset columns
pub fn select_target(columns: &[String]) -> Result<String> {
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the target column")
        .items(columns)
        .default(columns.len().saturating_sub(1))
        .interact()?;
    Ok(columns[selection].clone())
}

/// Prompt user to confirm a long analysis run
pub fn confirm_analysis(target: &str, features: usize, invocations: u32) -> Result<bool> {
    let message = format!(
        "Analyze {} feature(s) against '{}' over {} invocation(s)?",
        features, target, invocations
    );
    confirm_step(&message)
}
