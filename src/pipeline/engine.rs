//! Incremental relevance and redundancy estimation
//!
//! Each invocation draws a fresh batch of contrast evaluations, merges them
//! with what is already stored for the result set and writes the merged
//! estimates back. Scores are weighted means, so the order in which batches
//! arrive does not change the result.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::calculation::{AnalysisMode, Calculation, CalculationId, ResultSetId};
use super::config::HicsConfig;
use super::error::{HicsError, Result};
use super::sampler::{ContrastResult, SliceEvidence, SliceIndex, SliceSampler};
use super::storage::{FeatureSubset, RedundancyMatrix, Relevancy, ResultStorage};
use super::table::ColumnarTable;

/// A mean score together with the weight of the observations behind it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedScore {
    pub score: f64,
    pub weight: f64,
}

impl WeightedScore {
    pub const EMPTY: WeightedScore = WeightedScore {
        score: 0.0,
        weight: 0.0,
    };

    pub fn new(score: f64, weight: f64) -> Self {
        Self { score, weight }
    }

    /// Weighted mean of both scores
    pub fn merge(self, other: WeightedScore) -> WeightedScore {
        let weight = self.weight + other.weight;
        if weight <= 0.0 {
            return WeightedScore::EMPTY;
        }
        WeightedScore {
            score: (self.score * self.weight + other.score * other.weight) / weight,
            weight,
        }
    }
}

/// Merge two relevancy estimates of the same subset, weighting by iteration count
pub fn merge_relevancy(stored: &Relevancy, update: &Relevancy) -> Relevancy {
    let merged = WeightedScore::new(stored.relevancy, stored.iteration as f64)
        .merge(WeightedScore::new(update.relevancy, update.iteration as f64));
    Relevancy {
        subset: stored.subset.clone(),
        relevancy: merged.score,
        iteration: stored.iteration + update.iteration,
    }
}

/// Fold every evaluated pair of `update` into `stored`, weighting by pair weight
pub fn merge_redundancies(stored: &mut RedundancyMatrix, update: &RedundancyMatrix) -> Result<()> {
    for (a, b, score, weight) in update.pairs() {
        let (old_score, old_weight) = stored.get(a, b)?;
        let merged = WeightedScore::new(old_score, old_weight).merge(WeightedScore::new(score, weight));
        stored.set(a, b, merged.score, merged.weight)?;
    }
    Ok(())
}

/// Evidence gathered by one invocation, not yet merged with stored results
#[derive(Debug, Default)]
pub struct Evidence {
    pub relevancies: HashMap<FeatureSubset, Relevancy>,
    /// Strongest slice seen per subset
    pub slices: HashMap<FeatureSubset, SliceEvidence>,
    pub redundancies: Option<RedundancyMatrix>,
    /// Contrast evaluations performed
    pub runs: usize,
    pub slices_sampled: usize,
}

impl Evidence {
    /// Slices that captured no rows carry no evidence and are never kept.
    fn keep_best_slice(&mut self, subset: &FeatureSubset, slice: SliceEvidence) {
        if slice.frequency == 0.0 {
            return;
        }
        match self.slices.get(subset) {
            Some(best) if best.deviation >= slice.deviation => {}
            _ => {
                self.slices.insert(subset.clone(), slice);
            }
        }
    }

    fn record_run(&mut self, subset: FeatureSubset, contrast: ContrastResult) {
        let run = Relevancy {
            subset: subset.clone(),
            relevancy: contrast.score,
            iteration: 1,
        };
        let merged = match self.relevancies.get(&subset) {
            Some(existing) => merge_relevancy(existing, &run),
            None => run,
        };
        self.relevancies.insert(subset.clone(), merged);
        self.keep_best_slice(&subset, contrast.best);
        self.runs += 1;
        self.slices_sampled += contrast.slices;
    }

    /// Combine with evidence gathered independently
    pub fn absorb(&mut self, other: Evidence) -> Result<()> {
        for (subset, relevancy) in other.relevancies {
            let merged = match self.relevancies.get(&subset) {
                Some(existing) => merge_relevancy(existing, &relevancy),
                None => relevancy,
            };
            self.relevancies.insert(subset, merged);
        }
        for (subset, slice) in other.slices {
            self.keep_best_slice(&subset, slice);
        }
        if let Some(update) = other.redundancies {
            if let Some(stored) = self.redundancies.as_mut() {
                merge_redundancies(stored, &update)?;
            } else {
                self.redundancies = Some(update);
            }
        }
        self.runs += other.runs;
        self.slices_sampled += other.slices_sampled;
        Ok(())
    }
}

fn combine(parts: Vec<Evidence>) -> Result<Evidence> {
    let mut total = Evidence::default();
    for part in parts {
        total.absorb(part)?;
    }
    Ok(total)
}

/// What one commit wrote to storage
#[derive(Debug, Clone, Serialize)]
pub struct CommitSummary {
    /// Merged relevancies of the subsets evaluated in this invocation
    pub relevancies: Vec<Relevancy>,
    pub redundancy_pairs: usize,
    pub slices_updated: usize,
}

/// Estimates relevance of feature subsets for one result set's target and
/// redundancy between features.
pub struct IncrementalCorrelation<'a> {
    index: SliceIndex<'a>,
    storage: &'a dyn ResultStorage,
    result_set: ResultSetId,
    target: String,
    features: Vec<String>,
    config: HicsConfig,
    rng: StdRng,
}

impl<'a> IncrementalCorrelation<'a> {
    pub fn new(
        table: &'a ColumnarTable,
        categorical: &HashSet<String>,
        storage: &'a dyn ResultStorage,
        result_set: ResultSetId,
        config: HicsConfig,
    ) -> Result<Self> {
        config.validate()?;
        let target = storage.load_result_set(result_set)?.target;
        if table.column_index(&target).is_none() {
            return Err(HicsError::ColumnNotFound(target));
        }
        let features: Vec<String> = table
            .column_names()
            .iter()
            .filter(|name| **name != target)
            .cloned()
            .collect();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            index: SliceIndex::new(table, categorical),
            storage,
            result_set,
            target,
            features,
            config,
            rng,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Every column except the target
    pub fn features(&self) -> &[String] {
        &self.features
    }

    fn seeds(&mut self, n: usize) -> Vec<u64> {
        (0..n).map(|_| self.rng.gen()).collect()
    }

    /// Check that every name is a feature of the table other than the target
    pub fn validate_subset(&self, subset: &FeatureSubset) -> Result<()> {
        for name in subset.names() {
            if *name == self.target {
                return Err(HicsError::InvalidSubsetRequest(format!(
                    "subset contains the target '{}'",
                    name
                )));
            }
            if !self.features.contains(name) {
                return Err(HicsError::UnknownFeature(name.clone()));
            }
        }
        Ok(())
    }

    fn target_sampler(&self) -> Result<SliceSampler<'_>> {
        self.index.sampler(&self.target, self.config.alpha)
    }

    /// Evaluate every feature on its own, `runs` times each
    pub fn evaluate_bivariate(&mut self, runs: usize) -> Result<Evidence> {
        let seeds = self.seeds(self.features.len());
        let sampler = self.target_sampler()?;
        let iterations = self.config.iterations;

        let parts: Vec<Evidence> = self
            .features
            .par_iter()
            .zip(seeds)
            .map(|(feature, seed)| {
                let mut rng = StdRng::seed_from_u64(seed);
                let names = [feature.clone()];
                let subset = FeatureSubset::new(names.iter().cloned());
                let mut evidence = Evidence::default();
                for _ in 0..runs {
                    let contrast = sampler.contrast(&names, iterations, &mut rng)?;
                    evidence.record_run(subset.clone(), contrast);
                }
                Ok(evidence)
            })
            .collect::<Result<_>>()?;

        combine(parts)
    }

    /// Evaluate `runs` random subsets of `size` features that all contain `seed`.
    ///
    /// `size` is capped at the feature count. When it equals the seed size
    /// every run evaluates the seed itself.
    pub fn evaluate_subsets(
        &mut self,
        seed: &FeatureSubset,
        size: usize,
        runs: usize,
    ) -> Result<Evidence> {
        self.validate_subset(seed)?;
        let size = size.min(self.features.len());
        if size == 0 {
            return Err(HicsError::InvalidSubsetRequest(
                "the dataset has no features besides the target".to_string(),
            ));
        }
        let extra = size.saturating_sub(seed.len());
        let free: Vec<String> = self
            .features
            .iter()
            .filter(|name| !seed.contains(name))
            .cloned()
            .collect();
        if extra > 0 && free.is_empty() {
            warn!(subset = %seed, "No features left to extend the subset with");
        }

        let draws: Vec<(Vec<String>, u64)> = (0..runs)
            .map(|_| {
                let mut names = seed.names().to_vec();
                names.extend(free.choose_multiple(&mut self.rng, extra).cloned());
                (names, self.rng.gen())
            })
            .collect();

        let sampler = self.target_sampler()?;
        let iterations = self.config.iterations;
        let parts: Vec<Evidence> = draws
            .into_par_iter()
            .map(|(names, rng_seed)| {
                let mut rng = StdRng::seed_from_u64(rng_seed);
                let contrast = sampler.contrast(&names, iterations, &mut rng)?;
                let mut evidence = Evidence::default();
                evidence.record_run(FeatureSubset::new(names), contrast);
                Ok(evidence)
            })
            .collect::<Result<_>>()?;

        combine(parts)
    }

    /// Estimate pairwise redundancy inside `runs` random groups of `k` features.
    ///
    /// The redundancy of a pair is the mean of the contrast of each feature
    /// taken as target while slicing the other.
    pub fn evaluate_redundancies(&mut self, k: usize, runs: usize) -> Result<Evidence> {
        let n = self.features.len();
        let mut matrix = RedundancyMatrix::new(self.features.clone());
        if n < 2 {
            debug!(features = n, "Too few features for redundancy estimation");
            return Ok(Evidence {
                redundancies: Some(matrix),
                ..Default::default()
            });
        }
        let k = k.clamp(2, n);

        let draws: Vec<(Vec<usize>, u64)> = (0..runs)
            .map(|_| {
                let mut group = rand::seq::index::sample(&mut self.rng, n, k).into_vec();
                group.sort_unstable();
                (group, self.rng.gen())
            })
            .collect();

        let samplers: Vec<SliceSampler<'_>> = self
            .features
            .iter()
            .map(|feature| self.index.sampler(feature, self.config.alpha))
            .collect::<Result<_>>()?;
        let iterations = self.config.iterations;
        let features = &self.features;

        let evaluations: Vec<Vec<(usize, usize, f64)>> = draws
            .into_par_iter()
            .map(|(group, seed)| {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut scores = Vec::new();
                for (pos, &i) in group.iter().enumerate() {
                    for &j in &group[pos + 1..] {
                        let a_given_b =
                            samplers[i].contrast(&[features[j].clone()], iterations, &mut rng)?;
                        let b_given_a =
                            samplers[j].contrast(&[features[i].clone()], iterations, &mut rng)?;
                        scores.push((i, j, (a_given_b.score + b_given_a.score) / 2.0));
                    }
                }
                Ok(scores)
            })
            .collect::<Result<_>>()?;

        let weight = iterations as f64;
        let mut evaluated = 0usize;
        for (i, j, score) in evaluations.into_iter().flatten() {
            let (old_score, old_weight) = matrix.at(i, j);
            let merged =
                WeightedScore::new(old_score, old_weight).merge(WeightedScore::new(score, weight));
            matrix.set_at(i, j, merged.score, merged.weight);
            evaluated += 1;
        }

        Ok(Evidence {
            redundancies: Some(matrix),
            slices_sampled: evaluated * 2 * iterations,
            ..Default::default()
        })
    }

    /// Gather the evidence one invocation of `mode` contributes
    pub fn evaluate(&mut self, mode: &AnalysisMode) -> Result<Evidence> {
        match mode {
            AnalysisMode::Bivariate { redundancies } => {
                let mut evidence = self.evaluate_bivariate(self.config.bivariate_runs)?;
                if *redundancies {
                    let pairs = self
                        .evaluate_redundancies(self.config.redundancy_k, self.config.redundancy_runs)?;
                    evidence.absorb(pairs)?;
                }
                Ok(evidence)
            }
            AnalysisMode::Multivariate => self.evaluate_subsets(
                &FeatureSubset::new(Vec::<String>::new()),
                self.config.multivariate_k,
                self.config.multivariate_runs,
            ),
            AnalysisMode::FixedSubset(subset) => {
                self.evaluate_subsets(subset, subset.len(), self.config.subset_runs)
            }
            AnalysisMode::Superset(seed) => {
                let size = self.config.superset_k.max(seed.len() + 1);
                self.evaluate_subsets(seed, size, self.config.superset_runs)
            }
        }
    }

    /// Merge evidence with the stored results and persist the merged values.
    ///
    /// Everything is merged and checked before the first write.
    pub fn commit(&self, evidence: Evidence) -> Result<CommitSummary> {
        let stored: HashMap<FeatureSubset, Relevancy> = self
            .storage
            .get_relevancies(self.result_set)?
            .into_iter()
            .map(|r| (r.subset.clone(), r))
            .collect();

        let mut relevancies: Vec<Relevancy> = evidence
            .relevancies
            .into_values()
            .map(|update| match stored.get(&update.subset) {
                Some(existing) => merge_relevancy(existing, &update),
                None => update,
            })
            .collect();
        relevancies.sort_by(|a, b| a.subset.cmp(&b.subset));
        for r in &relevancies {
            HicsError::check_finite(|| format!("relevancy of [{}]", r.subset), r.relevancy)?;
        }

        let redundancies = match evidence.redundancies {
            Some(update) => {
                let mut matrix = self
                    .storage
                    .get_redundancies(self.result_set, &self.features)?;
                merge_redundancies(&mut matrix, &update)?;
                for (a, b, score, _) in matrix.pairs() {
                    HicsError::check_finite(|| format!("redundancy of ({}, {})", a, b), score)?;
                }
                Some(matrix)
            }
            None => None,
        };

        let stored_slices = self.storage.get_slices(self.result_set)?;
        let slices: HashMap<FeatureSubset, SliceEvidence> = evidence
            .slices
            .into_iter()
            .filter(|(subset, slice)| {
                stored_slices
                    .get(subset)
                    .map_or(true, |old| slice.deviation > old.deviation)
            })
            .collect();

        self.storage
            .update_relevancies(self.result_set, &relevancies)?;
        let redundancy_pairs = match &redundancies {
            Some(matrix) => {
                self.storage.update_redundancies(self.result_set, matrix)?;
                matrix.pairs().len()
            }
            None => 0,
        };
        self.storage.update_slices(self.result_set, &slices)?;

        Ok(CommitSummary {
            relevancies,
            redundancy_pairs,
            slices_updated: slices.len(),
        })
    }

    /// Evaluate and commit `runs` bivariate runs per feature
    pub fn update_bivariate_relevancies(&mut self, runs: usize) -> Result<CommitSummary> {
        let evidence = self.evaluate_bivariate(runs)?;
        self.commit(evidence)
    }

    /// Evaluate and commit `runs` subsets of `k` features containing `fixed`
    pub fn update_multivariate_relevancies(
        &mut self,
        fixed: &[String],
        k: usize,
        runs: usize,
    ) -> Result<CommitSummary> {
        let seed = FeatureSubset::new(fixed.iter().cloned());
        if seed.len() != fixed.len() {
            return Err(HicsError::InvalidSubsetRequest(format!(
                "feature subset contains duplicates: {:?}",
                fixed
            )));
        }
        let evidence = self.evaluate_subsets(&seed, k, runs)?;
        self.commit(evidence)
    }

    pub fn update_redundancies(&mut self, k: usize, runs: usize) -> Result<CommitSummary> {
        let evidence = self.evaluate_redundancies(k, runs)?;
        self.commit(evidence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvocationStatus {
    /// New evidence was computed and merged
    Computed,
    /// The calculation was already done; stored results were re-emitted unchanged
    AlreadyComplete,
}

/// Result of one granular engine invocation
#[derive(Debug, Clone, Serialize)]
pub struct InvocationOutcome {
    pub calculation: Calculation,
    pub status: InvocationStatus,
    pub runs: usize,
    pub slices_sampled: usize,
    pub relevancies: Vec<Relevancy>,
    pub redundancy_pairs: usize,
}

/// Per-invocation seed so chained invocations draw different slices
fn invocation_seed(seed: u64, iteration: u32) -> u64 {
    seed.wrapping_add((iteration as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Run one invocation of a stored calculation and advance its progress.
///
/// A calculation that already reached `max_iteration` is not recomputed: the
/// stored results are written back unchanged and the progress stays as is.
pub fn run_calculation(
    table: &ColumnarTable,
    categorical: &HashSet<String>,
    storage: &dyn ResultStorage,
    calculation_id: CalculationId,
    config: &HicsConfig,
) -> Result<InvocationOutcome> {
    let started = Instant::now();
    let mut calculation = storage.load_calculation(calculation_id)?;
    let mode = calculation.request.mode()?;
    let result_set = calculation.result_set;

    if calculation.is_done() {
        warn!(
            calculation = calculation.id,
            iteration = calculation.current_iteration,
            "Calculation already complete, re-emitting stored results"
        );
        let relevancies = storage.get_relevancies(result_set)?;
        storage.update_relevancies(result_set, &relevancies)?;

        let mut redundancy_pairs = 0;
        if let AnalysisMode::Bivariate { redundancies: true } = mode {
            let target = storage.load_result_set(result_set)?.target;
            let features: Vec<String> = table
                .column_names()
                .iter()
                .filter(|name| **name != target)
                .cloned()
                .collect();
            let matrix = storage.get_redundancies(result_set, &features)?;
            storage.update_redundancies(result_set, &matrix)?;
            redundancy_pairs = matrix.pairs().len();
        }

        let slices = storage.get_slices(result_set)?;
        storage.update_slices(result_set, &slices)?;
        storage.save_calculation(&calculation)?;

        return Ok(InvocationOutcome {
            calculation,
            status: InvocationStatus::AlreadyComplete,
            runs: 0,
            slices_sampled: 0,
            relevancies,
            redundancy_pairs,
        });
    }

    let invocation_config = HicsConfig {
        seed: config
            .seed
            .map(|seed| invocation_seed(seed, calculation.current_iteration)),
        ..config.clone()
    };
    let mut engine =
        IncrementalCorrelation::new(table, categorical, storage, result_set, invocation_config)?;
    debug!(
        calculation = calculation.id,
        mode = %mode,
        column = engine.target(),
        "Evaluating contrast"
    );
    let evidence = engine.evaluate(&mode)?;
    let runs = evidence.runs;
    let slices_sampled = evidence.slices_sampled;
    let summary = engine.commit(evidence)?;

    calculation.current_iteration += 1;
    storage.save_calculation(&calculation)?;

    info!(
        calculation = calculation.id,
        mode = %mode,
        iteration = calculation.current_iteration,
        max_iteration = calculation.max_iteration,
        runs,
        slices = slices_sampled,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Calculation step complete"
    );

    Ok(InvocationOutcome {
        calculation,
        status: InvocationStatus::Computed,
        runs,
        slices_sampled,
        relevancies: summary.relevancies,
        redundancy_pairs: summary.redundancy_pairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    #[test]
    fn test_weighted_merge_matches_pooled_mean() {
        let a = WeightedScore::new(0.2, 5.0);
        let b = WeightedScore::new(0.8, 15.0);
        let merged = a.merge(b);
        assert_eq!(merged.weight, 20.0);
        assert!((merged.score - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let a = WeightedScore::new(0.3, 4.0);
        assert_eq!(a.merge(WeightedScore::EMPTY), a);
        assert_eq!(WeightedScore::EMPTY.merge(WeightedScore::EMPTY), WeightedScore::EMPTY);
    }

    #[test]
    fn test_merge_is_associative_and_commutative() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let mut scores: Vec<WeightedScore> = (0..3)
                .map(|_| WeightedScore::new(rng.gen::<f64>(), rng.gen_range(1..50) as f64))
                .collect();
            let left = scores[0].merge(scores[1]).merge(scores[2]);
            let right = scores[0].merge(scores[1].merge(scores[2]));
            scores.shuffle(&mut rng);
            let shuffled = scores[0].merge(scores[1]).merge(scores[2]);

            assert!((left.score - right.score).abs() < 1e-12);
            assert!((left.score - shuffled.score).abs() < 1e-12);
            assert_eq!(left.weight, right.weight);
            assert_eq!(left.weight, shuffled.weight);
        }
    }

    #[test]
    fn test_merge_relevancy_sums_iterations() {
        let subset = FeatureSubset::new(["a"]);
        let stored = Relevancy {
            subset: subset.clone(),
            relevancy: 0.5,
            iteration: 5,
        };
        let update = Relevancy {
            subset,
            relevancy: 0.1,
            iteration: 5,
        };
        let merged = merge_relevancy(&stored, &update);
        assert_eq!(merged.iteration, 10);
        assert!((merged.relevancy - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_merge_redundancies_by_weight() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut stored = RedundancyMatrix::new(names.clone());
        stored.set("a", "b", 0.2, 10.0).unwrap();
        let mut update = RedundancyMatrix::new(names);
        update.set("a", "b", 0.4, 30.0).unwrap();
        update.set("b", "c", 0.9, 10.0).unwrap();

        merge_redundancies(&mut stored, &update).unwrap();
        let (score, weight) = stored.get("b", "a").unwrap();
        assert!((score - 0.35).abs() < 1e-12);
        assert_eq!(weight, 40.0);
        assert_eq!(stored.get("c", "b").unwrap(), (0.9, 10.0));
        assert_eq!(stored.get("a", "c").unwrap(), (0.0, 0.0));
    }

    #[test]
    fn test_empty_slice_is_not_kept() {
        let subset = FeatureSubset::new(["a"]);
        let slice = |deviation: f64, frequency: f64| SliceEvidence {
            definition: Vec::new(),
            marginal: Vec::new(),
            conditional: Vec::new(),
            deviation,
            frequency,
        };
        let mut evidence = Evidence::default();

        evidence.keep_best_slice(&subset, slice(0.0, 0.0));
        assert!(evidence.slices.is_empty());

        evidence.keep_best_slice(&subset, slice(0.2, 0.1));
        evidence.keep_best_slice(&subset, slice(0.9, 0.0));
        assert_eq!(evidence.slices[&subset].deviation, 0.2);
    }

    #[test]
    fn test_invocation_seed_varies_by_iteration() {
        assert_ne!(invocation_seed(7, 0), invocation_seed(7, 1));
        assert_eq!(invocation_seed(7, 3), invocation_seed(7, 3));
    }
}
