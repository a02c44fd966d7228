//! AutoGluon-style engine: a fixed model zoo and a weighted ensemble of the
//! three strongest members.

use tracing::debug;

use crate::dataset::TaskKind;
use crate::error::EngineError;

use super::models::{Model, Problem};
use super::search;
use super::{EngineAdapter, EngineKind, EngineResult, TrainingContext};

const ENSEMBLE_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct AutoGluonEngine;

impl AutoGluonEngine {
    fn zoo(task: TaskKind) -> Vec<(String, Model)> {
        let mut zoo = vec![
            (
                "KNeighborsUnif",
                Model::KNeighbors {
                    k: 10,
                    distance_weighted: false,
                },
            ),
            (
                "KNeighborsDist",
                Model::KNeighbors {
                    k: 10,
                    distance_weighted: true,
                },
            ),
            ("LinearModel", Model::Ridge { alpha: 1.0 }),
        ];
        if task == TaskKind::Classification {
            zoo.push(("NearestCentroid", Model::NearestCentroid));
        }
        zoo.push(("DummyModel", Model::Baseline));
        zoo.into_iter().map(|(n, m)| (n.to_string(), m)).collect()
    }
}

impl EngineAdapter for AutoGluonEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::AutoGluon
    }

    fn run(&self, ctx: &TrainingContext<'_>) -> Result<EngineResult, EngineError> {
        if let Some(skipped) = ctx.below_row_floor(self.kind()) {
            return Ok(skipped);
        }

        let problem = Problem::from_split(ctx.split);
        let ranked = search::rank(search::sweep(self.kind(), &Self::zoo(problem.task), &problem, ctx)?);
        ctx.check_cancelled()?;

        let mut leaderboard = ranked.clone();
        if ranked.len() >= 2 {
            let members: Vec<_> = ranked.iter().take(ENSEMBLE_SIZE).collect();
            let weights: Vec<f64> = members.iter().map(|m| m.primary.max(0.0)).collect();
            let ensemble = search::blend("WeightedEnsemble_L2", &members, &weights, &problem)?;
            debug!(members = members.len(), score = ensemble.primary, "AutoGluon ensemble built");
            leaderboard.push(ensemble);
        }

        search::finish(self.kind(), &search::rank(leaderboard))
    }
}
