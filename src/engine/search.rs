//! Candidate evaluation shared by the built-in engines.

use tracing::{debug, warn};

use crate::dataset::Labels;
use crate::error::EngineError;

use super::models::{argmax, Model, Problem};
use super::scoring::{primary_metric, score, MetricMap};
use super::{EngineKind, EngineResult, ModelScore, TrainingContext};

/// A fitted candidate with its predictions on the problem's test rows.
#[derive(Debug, Clone)]
pub struct Evaluated {
    pub model_id: String,
    pub predictions: Labels,
    pub metrics: MetricMap,
    /// Value of the ranking metric.
    pub primary: f64,
}

/// Fits `model` and scores it on the problem's test rows.
pub fn evaluate(model_id: impl Into<String>, model: &Model, problem: &Problem) -> Result<Evaluated, EngineError> {
    let predictions = model.fit_predict(problem)?;
    scored(model_id.into(), predictions, problem)
}

fn scored(model_id: String, predictions: Labels, problem: &Problem) -> Result<Evaluated, EngineError> {
    let metrics = score(&problem.test_y, &predictions)?;
    let primary = metrics
        .get(primary_metric(problem.task))
        .copied()
        .unwrap_or(f64::NEG_INFINITY);
    Ok(Evaluated {
        model_id,
        predictions,
        metrics,
        primary,
    })
}

/// Evaluates candidates in order until the list or the time budget runs out.
///
/// The first candidate is always evaluated. A candidate that fails to fit is
/// logged and left off the leaderboard.
pub fn sweep(
    engine: EngineKind,
    candidates: &[(String, Model)],
    problem: &Problem,
    ctx: &TrainingContext<'_>,
) -> Result<Vec<Evaluated>, EngineError> {
    let mut out = Vec::with_capacity(candidates.len());
    for (i, (id, model)) in candidates.iter().enumerate() {
        ctx.check_cancelled()?;
        if i > 0 && ctx.budget_spent() {
            debug!(engine = %engine, evaluated = i, "Time budget spent, stopping search");
            break;
        }
        if !model.supports(problem.task) {
            continue;
        }
        match evaluate(id.clone(), model, problem) {
            Ok(e) => {
                debug!(engine = %engine, model = %e.model_id, score = e.primary, "Candidate evaluated");
                out.push(e);
            }
            Err(err) => warn!(engine = %engine, model = %id, error = %err, "Candidate failed"),
        }
    }
    Ok(out)
}

/// Orders candidates best first; ties keep evaluation order.
pub fn rank(mut evaluated: Vec<Evaluated>) -> Vec<Evaluated> {
    evaluated.sort_by(|a, b| b.primary.total_cmp(&a.primary));
    evaluated
}

/// Turns a ranked candidate list into a completed result.
pub fn finish(engine: EngineKind, ranked: &[Evaluated]) -> Result<EngineResult, EngineError> {
    let leaderboard = ranked
        .iter()
        .map(|e| ModelScore {
            model_id: e.model_id.clone(),
            metrics: e.metrics.clone(),
        })
        .collect();
    EngineResult::completed(engine, leaderboard)
}

/// Combines member predictions into an ensemble candidate.
///
/// Classification uses a weighted vote (lowest class index wins ties);
/// regression a weighted mean. Non-positive weights fall back to equal
/// weighting.
pub fn blend(
    model_id: impl Into<String>,
    members: &[&Evaluated],
    weights: &[f64],
    problem: &Problem,
) -> Result<Evaluated, EngineError> {
    if members.is_empty() || members.len() != weights.len() {
        return Err(EngineError::InvalidData(
            "ensemble needs one weight per member".to_string(),
        ));
    }
    let total: f64 = weights.iter().sum();
    let weights: Vec<f64> = if total > 0.0 && weights.iter().all(|w| *w >= 0.0) {
        weights.iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / members.len() as f64; members.len()]
    };

    let n = problem.test_y.len();
    let predictions = match &problem.test_y {
        Labels::Classes(_) => {
            let mut out = Vec::with_capacity(n);
            for row in 0..n {
                let mut votes = vec![0.0; problem.n_classes.max(1)];
                for (member, w) in members.iter().zip(&weights) {
                    if let Labels::Classes(p) = &member.predictions {
                        votes[p[row]] += w;
                    }
                }
                out.push(argmax(&votes));
            }
            Labels::Classes(out)
        }
        Labels::Values(_) => {
            let mut out = vec![0.0; n];
            for (member, w) in members.iter().zip(&weights) {
                if let Labels::Values(p) = &member.predictions {
                    for (acc, v) in out.iter_mut().zip(p) {
                        *acc += w * v;
                    }
                }
            }
            Labels::Values(out)
        }
    };

    scored(model_id.into(), predictions, problem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TaskKind;
    use ndarray::array;

    fn problem() -> Problem {
        Problem {
            task: TaskKind::Classification,
            n_classes: 2,
            train_x: array![[0.0], [0.1], [1.0], [1.1]],
            train_y: Labels::Classes(vec![0, 0, 1, 1]),
            test_x: array![[0.05], [1.05], [0.9]],
            test_y: Labels::Classes(vec![0, 1, 1]),
        }
    }

    fn fake(id: &str, predictions: Vec<usize>, primary: f64) -> Evaluated {
        Evaluated {
            model_id: id.to_string(),
            predictions: Labels::Classes(predictions),
            metrics: MetricMap::new(),
            primary,
        }
    }

    #[test]
    fn test_rank_is_stable() {
        let ranked = rank(vec![
            fake("a", vec![], 0.5),
            fake("b", vec![], 0.9),
            fake("c", vec![], 0.9),
        ]);
        let ids: Vec<_> = ranked.iter().map(|e| e.model_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_finish_builds_result() {
        let p = problem();
        let e = evaluate("centroid", &Model::NearestCentroid, &p).unwrap();
        assert_eq!(e.primary, 1.0);
        let result = finish(EngineKind::H2o, &[e]).unwrap();
        assert_eq!(result.best_model.as_deref(), Some("centroid"));
        assert!(finish(EngineKind::H2o, &[]).is_err());
    }

    #[test]
    fn test_blend_weighted_vote() {
        let p = problem();
        let a = fake("a", vec![0, 0, 0], 0.0);
        let b = fake("b", vec![0, 1, 1], 0.0);
        let c = fake("c", vec![1, 1, 1], 0.0);
        let blended = blend("ens", &[&a, &b, &c], &[1.0, 3.0, 1.0], &p).unwrap();
        assert_eq!(blended.predictions, Labels::Classes(vec![0, 1, 1]));
        assert_eq!(blended.metrics["accuracy"], 1.0);

        // Negative weights fall back to equal weighting.
        let equal = blend("ens", &[&a, &b, &c], &[-1.0, 1.0, 1.0], &p).unwrap();
        assert_eq!(equal.predictions, Labels::Classes(vec![0, 1, 1]));
        assert!(blend("ens", &[&a], &[], &p).is_err());
    }
}
