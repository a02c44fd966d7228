//! TPOT-style engine: seeded evolutionary search.
//!
//! Candidates are scored on a validation slice of the training rows. Each
//! generation keeps the fitter half of the population and adds one mutated
//! child per survivor. The fittest pipelines are then refit on the full
//! training partition and scored on the test rows.

use std::collections::HashSet;

use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::dataset::TaskKind;
use crate::error::EngineError;

use super::models::{Model, Problem};
use super::search;
use super::{EngineAdapter, EngineKind, EngineResult, TrainingContext};

/// Fraction of training rows used to score candidates during evolution.
const VALIDATION_FRACTION: f64 = 0.2;

/// Number of evolved pipelines refit for the final leaderboard.
const FINALISTS: usize = 5;

#[derive(Debug, Clone)]
pub struct TpotEngine {
    pub generations: usize,
    pub population_size: usize,
    pub seed: u64,
}

impl Default for TpotEngine {
    fn default() -> Self {
        Self {
            generations: 2,
            population_size: 10,
            seed: 42,
        }
    }
}

struct Individual {
    model: Model,
    fitness: f64,
}

impl TpotEngine {
    fn random_model(rng: &mut ChaCha8Rng, task: TaskKind) -> Model {
        let families = if task == TaskKind::Classification { 3 } else { 2 };
        match rng.random_range(0..families) {
            0 => Model::KNeighbors {
                k: rng.random_range(1..=25),
                distance_weighted: rng.random_range(0..2) == 1,
            },
            1 => Model::Ridge {
                alpha: round_alpha(10f64.powf(rng.random_range(-3.0..2.0))),
            },
            _ => Model::NearestCentroid,
        }
    }

    fn mutate(model: &Model, rng: &mut ChaCha8Rng, task: TaskKind) -> Model {
        match model {
            Model::KNeighbors {
                k,
                distance_weighted,
            } => {
                let step: i64 = rng.random_range(-3..=3);
                Model::KNeighbors {
                    k: (*k as i64 + step).clamp(1, 40) as usize,
                    distance_weighted: if rng.random_range(0..10) < 3 {
                        !distance_weighted
                    } else {
                        *distance_weighted
                    },
                }
            }
            Model::Ridge { alpha } => {
                let factor = if rng.random_range(0..2) == 0 { 1.0 / 3.0 } else { 3.0 };
                Model::Ridge {
                    alpha: round_alpha(alpha * factor),
                }
            }
            Model::NearestCentroid | Model::Baseline => Self::random_model(rng, task),
        }
    }

    fn fitness(model: &Model, validation: &Problem) -> f64 {
        match search::evaluate(model.id(), model, validation) {
            Ok(e) => e.primary,
            Err(err) => {
                warn!(model = %model.id(), error = %err, "TPOT pipeline failed");
                f64::NEG_INFINITY
            }
        }
    }
}

fn round_alpha(alpha: f64) -> f64 {
    ((alpha * 10_000.0).round() / 10_000.0).max(1e-4)
}

impl EngineAdapter for TpotEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Tpot
    }

    fn run(&self, ctx: &TrainingContext<'_>) -> Result<EngineResult, EngineError> {
        if let Some(skipped) = ctx.below_row_floor(self.kind()) {
            return Ok(skipped);
        }

        let problem = Problem::from_split(ctx.split);
        let validation = problem
            .holdout(VALIDATION_FRACTION)
            .unwrap_or_else(|| problem.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut seen = HashSet::new();
        let mut population: Vec<Individual> = Vec::new();

        let mut initial = Vec::new();
        for _ in 0..self.population_size.max(1) * 5 {
            if initial.len() == self.population_size.max(1) {
                break;
            }
            let model = Self::random_model(&mut rng, problem.task);
            if seen.insert(model.id()) {
                initial.push(model);
            }
        }

        let mut pending = initial;
        for generation in 0..self.generations.max(1) {
            for model in pending.drain(..) {
                ctx.check_cancelled()?;
                if !population.is_empty() && ctx.budget_spent() {
                    break;
                }
                let fitness = Self::fitness(&model, &validation);
                population.push(Individual { model, fitness });
            }
            if ctx.budget_spent() || generation + 1 == self.generations.max(1) {
                break;
            }

            // Survivors are the fitter half; ties keep evaluation order.
            let mut order: Vec<usize> = (0..population.len()).collect();
            order.sort_by(|&a, &b| population[b].fitness.total_cmp(&population[a].fitness));
            let survivors = order.len().div_ceil(2);
            for &idx in order.iter().take(survivors) {
                let child = Self::mutate(&population[idx].model, &mut rng, problem.task);
                if seen.insert(child.id()) {
                    pending.push(child);
                }
            }
            debug!(generation, children = pending.len(), "TPOT generation complete");
        }

        let mut order: Vec<usize> = (0..population.len()).collect();
        order.sort_by(|&a, &b| population[b].fitness.total_cmp(&population[a].fitness));

        let mut finalists = Vec::new();
        for idx in order.into_iter().take(FINALISTS) {
            ctx.check_cancelled()?;
            let model = &population[idx].model;
            match search::evaluate(model.id(), model, &problem) {
                Ok(e) => finalists.push(e),
                Err(err) => warn!(model = %model.id(), error = %err, "TPOT refit failed"),
            }
        }

        search::finish(self.kind(), &search::rank(finalists))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_tpot_is_deterministic() {
        let split = fixtures::blobs(150, 11);
        let cancel = AtomicBool::new(false);
        let engine = TpotEngine::default();
        let first = engine.run(&fixtures::context(&split, &cancel)).unwrap();
        let second = engine.run(&fixtures::context(&split, &cancel)).unwrap();
        assert_eq!(first, second);
        assert!(first.leaderboard.len() <= FINALISTS);
        assert!(first.metrics["accuracy"] >= 0.9);
    }

    #[test]
    fn test_tpot_regression() {
        let split = fixtures::linear(120, 5);
        let cancel = AtomicBool::new(false);
        let result = TpotEngine::default()
            .run(&fixtures::context(&split, &cancel))
            .unwrap();
        assert!(result.metrics.contains_key("rmse"));
        assert!(result
            .leaderboard
            .iter()
            .all(|m| m.model_id != "nearest_centroid"));
    }

    #[test]
    fn test_mutation_keeps_family() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let knn = Model::KNeighbors {
            k: 1,
            distance_weighted: false,
        };
        for _ in 0..20 {
            match TpotEngine::mutate(&knn, &mut rng, TaskKind::Classification) {
                Model::KNeighbors { k, .. } => assert!((1..=40).contains(&k)),
                other => panic!("unexpected {other:?}"),
            }
        }
        let ridge = TpotEngine::mutate(&Model::Ridge { alpha: 1.0 }, &mut rng, TaskKind::Regression);
        assert!(matches!(ridge, Model::Ridge { .. }));
    }

    #[test]
    fn test_round_alpha_floor() {
        assert_eq!(round_alpha(0.0), 1e-4);
        assert_eq!(round_alpha(0.123456), 0.1235);
    }
}
