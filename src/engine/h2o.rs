//! H2O-style engine: a fixed grid per model family plus stacked ensembles.

use tracing::debug;

use crate::dataset::TaskKind;
use crate::error::EngineError;

use super::models::{Model, Problem};
use super::search::{self, Evaluated};
use super::{EngineAdapter, EngineKind, EngineResult, TrainingContext};

const RUN_TAG: &str = "AutoML_1";

#[derive(Debug, Clone, Copy, Default)]
pub struct H2oEngine;

impl H2oEngine {
    fn grid(task: TaskKind) -> Vec<(String, Model)> {
        let mut grid = vec![
            ("GLM", Model::Ridge { alpha: 1.0 }),
            ("GLM", Model::Ridge { alpha: 0.01 }),
            (
                "KNN",
                Model::KNeighbors {
                    k: 5,
                    distance_weighted: false,
                },
            ),
            (
                "KNN",
                Model::KNeighbors {
                    k: 15,
                    distance_weighted: true,
                },
            ),
        ];
        if task == TaskKind::Classification {
            grid.push(("NearestCentroid", Model::NearestCentroid));
        }

        let mut counters = std::collections::HashMap::new();
        grid.into_iter()
            .map(|(family, model)| {
                let n = counters.entry(family).or_insert(0);
                *n += 1;
                (format!("{family}_{n}_{RUN_TAG}"), model)
            })
            .collect()
    }

    fn family(model_id: &str) -> &str {
        model_id.split('_').next().unwrap_or(model_id)
    }

    /// Equal-weight ensemble of every base model and of the best per family.
    fn ensembles(base: &[Evaluated], problem: &Problem) -> Result<Vec<Evaluated>, EngineError> {
        let mut out = Vec::new();
        if base.len() < 2 {
            return Ok(out);
        }

        let all: Vec<&Evaluated> = base.iter().collect();
        out.push(search::blend(
            format!("StackedEnsemble_AllModels_{RUN_TAG}"),
            &all,
            &vec![1.0; all.len()],
            problem,
        )?);

        let mut best_of_family: Vec<&Evaluated> = Vec::new();
        for candidate in search::rank(base.to_vec()).iter() {
            let family = Self::family(&candidate.model_id);
            if !best_of_family
                .iter()
                .any(|b| Self::family(&b.model_id) == family)
            {
                if let Some(original) = base.iter().find(|b| b.model_id == candidate.model_id) {
                    best_of_family.push(original);
                }
            }
        }
        if best_of_family.len() >= 2 {
            out.push(search::blend(
                format!("StackedEnsemble_BestOfFamily_{RUN_TAG}"),
                &best_of_family,
                &vec![1.0; best_of_family.len()],
                problem,
            )?);
        }
        Ok(out)
    }
}

impl EngineAdapter for H2oEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::H2o
    }

    fn run(&self, ctx: &TrainingContext<'_>) -> Result<EngineResult, EngineError> {
        if let Some(skipped) = ctx.below_row_floor(self.kind()) {
            return Ok(skipped);
        }

        let problem = Problem::from_split(ctx.split);
        let mut evaluated = search::sweep(self.kind(), &Self::grid(problem.task), &problem, ctx)?;
        ctx.check_cancelled()?;
        let stacked = Self::ensembles(&evaluated, &problem)?;
        debug!(base = evaluated.len(), stacked = stacked.len(), "H2O grid finished");
        evaluated.extend(stacked);

        search::finish(self.kind(), &search::rank(evaluated))
    }
}
