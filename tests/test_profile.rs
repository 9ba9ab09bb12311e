//! Tests for feature profiling and conditional distributions

use fexum::pipeline::{
    class_densities, conditional_distribution, downsample, histogram, profile, profile_dataset,
    FeatureConstraint, HicsError,
};

#[path = "common/mod.rs"]
mod common;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

#[test]
fn test_scenario_profile() {
    let table = common::scenario_table();

    let col3 = profile(&table, "Col3").unwrap();
    assert!(col3.is_categorical);
    assert_eq!(col3.categories, Some(vec![0.0, 1.0, 2.0]));
    assert_eq!(col3.min, 0.0);
    assert_eq!(col3.max, 2.0);
    assert_close(col3.mean, 1.2);
    assert_close(col3.variance, 0.56);

    let col1 = profile(&table, "Col1").unwrap();
    assert!(!col1.is_categorical);
    assert!(col1.categories.is_none());
    assert_eq!(col1.min, 0.1);
    assert_eq!(col1.max, 9.5);
}

#[test]
fn test_histograms() {
    let table = common::scenario_table();

    let categorical = histogram(&table, "Col3", 50).unwrap();
    let counts: Vec<usize> = categorical.iter().map(|b| b.count).collect();
    assert_eq!(counts, vec![2, 4, 4], "One bucket per category");
    assert_eq!(categorical[1].from_value, 1.0);
    assert_eq!(categorical[1].to_value, 1.0);

    let continuous = histogram(&table, "Col1", 3).unwrap();
    assert_eq!(continuous.len(), 3);
    assert_eq!(continuous[0].from_value, 0.1);
    assert_eq!(continuous[2].to_value, 9.5);
    let counts: Vec<usize> = continuous.iter().map(|b| b.count).collect();
    assert_eq!(counts, vec![3, 4, 3]);
}

#[test]
fn test_downsample_returns_group_medians() {
    let table = common::scenario_table();

    let medians = downsample(&table, "Col1", 5).unwrap();
    assert_eq!(medians.len(), 5);
    for (actual, expected) in medians.iter().zip([1.2, 2.95, 4.55, 6.75, 9.2]) {
        assert_close(*actual, expected);
    }

    let all = downsample(&table, "Col1", 20).unwrap();
    assert_eq!(all, table.column("Col1").unwrap());

    assert!(matches!(
        downsample(&table, "Col1", 0),
        Err(HicsError::InvalidParameter(_))
    ));
}

#[test]
fn test_class_densities() {
    let table = common::scenario_table();

    let densities = class_densities(&table, "Col3", "Col1").unwrap();
    assert_eq!(densities.len(), 3);
    let classes: Vec<f64> = densities.iter().map(|d| d.target_class).collect();
    assert_eq!(classes, vec![0.0, 1.0, 2.0]);
    for density in &densities {
        assert_eq!(density.density_values.len(), 100);
        assert!(density.density_values.iter().all(|v| *v >= 0.0));
    }

    // Class 0 lives at the low end of Col1, class 2 at the high end
    let first = densities[0].density_values[0];
    let last = densities[2].density_values[0];
    assert!(first > last);

    assert!(matches!(
        class_densities(&table, "Col1", "Col2"),
        Err(HicsError::InvalidParameter(_))
    ));
}

#[test]
fn test_profile_dataset_covers_every_column() {
    let table = common::signal_table(60);
    let profiles = profile_dataset(&table, 10).unwrap();

    let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["signal", "shadow", "noise", "target"]);
    for p in &profiles {
        let total: usize = p.histogram.iter().map(|b| b.count).sum();
        assert_eq!(total, 60);
    }
    assert!(profiles[3].stats.is_categorical);
}

#[test]
fn test_conditional_distribution_in_range() {
    let table = common::scenario_table();
    let constraints = vec![FeatureConstraint::Range {
        feature: "Col1".to_string(),
        from_value: 0.0,
        to_value: 4.5,
    }];

    let result = conditional_distribution(&table, "Col3", &constraints, Some(2)).unwrap();

    assert_eq!(result.matching_rows, 5);
    let points: Vec<(f64, f64)> = result
        .distribution
        .iter()
        .map(|p| (p.value, p.probability))
        .collect();
    assert_eq!(points, vec![(0.0, 0.4), (1.0, 0.6)]);

    let samples = result.samples.unwrap();
    assert_eq!(samples["Col1"], vec![0.1, 4.2]);
    assert_eq!(samples["Col3"], vec![0.0, 1.0]);
}

#[test]
fn test_conditional_distribution_with_categories() {
    let table = common::scenario_table();
    let constraints = vec![
        FeatureConstraint::Categories {
            feature: "Col3".to_string(),
            categories: vec![2.0],
        },
        FeatureConstraint::Range {
            feature: "Col2".to_string(),
            from_value: 5.0,
            to_value: 10.0,
        },
    ];

    let result = conditional_distribution(&table, "Col1", &constraints, None).unwrap();

    // Rows with Col3 == 2 and Col2 in [5, 10]: Col1 = 7.4, 8.9, 9.5
    assert_eq!(result.matching_rows, 3);
    let values: Vec<f64> = result.distribution.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![7.4, 8.9, 9.5]);
    assert!(result.samples.is_none());
}
