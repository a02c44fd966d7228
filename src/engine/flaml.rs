//! FLAML-style engine: cheapest learners first, stop when the budget is spent.

use tracing::debug;

use crate::dataset::TaskKind;
use crate::error::EngineError;

use super::models::{Model, Problem};
use super::search;
use super::{EngineAdapter, EngineKind, EngineResult, TrainingContext};

#[derive(Debug, Clone, Copy, Default)]
pub struct FlamlEngine;

impl FlamlEngine {
    /// Candidates in increasing order of training cost.
    fn candidates(task: TaskKind) -> Vec<(String, Model)> {
        let mut models = vec![Model::Baseline];
        if task == TaskKind::Classification {
            models.push(Model::NearestCentroid);
        }
        models.extend([
            Model::Ridge { alpha: 1.0 },
            Model::Ridge { alpha: 0.1 },
            Model::Ridge { alpha: 10.0 },
            Model::KNeighbors {
                k: 5,
                distance_weighted: false,
            },
            Model::KNeighbors {
                k: 5,
                distance_weighted: true,
            },
            Model::KNeighbors {
                k: 11,
                distance_weighted: true,
            },
            Model::KNeighbors {
                k: 21,
                distance_weighted: false,
            },
        ]);
        models.into_iter().map(|m| (m.id(), m)).collect()
    }
}

impl EngineAdapter for FlamlEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Flaml
    }

    fn run(&self, ctx: &TrainingContext<'_>) -> Result<EngineResult, EngineError> {
        if let Some(skipped) = ctx.below_row_floor(self.kind()) {
            return Ok(skipped);
        }

        let problem = Problem::from_split(ctx.split);
        let evaluated = search::sweep(self.kind(), &Self::candidates(problem.task), &problem, ctx)?;
        let ranked = search::rank(evaluated);
        debug!(candidates = ranked.len(), "FLAML search finished");
        search::finish(self.kind(), &ranked)
    }
}
