//! Test-set metrics.

use std::collections::BTreeMap;

use crate::dataset::{Labels, TaskKind};
use crate::error::EngineError;

/// Metric name to value, rounded to four decimals.
pub type MetricMap = BTreeMap<String, f64>;

/// Metric used to rank a leaderboard; higher is better.
pub fn primary_metric(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Classification => "accuracy",
        TaskKind::Regression => "r2",
    }
}

/// Scores predictions against the ground truth.
pub fn score(truth: &Labels, predicted: &Labels) -> Result<MetricMap, EngineError> {
    if truth.len() != predicted.len() {
        return Err(EngineError::InvalidData(format!(
            "prediction length {} does not match truth length {}",
            predicted.len(),
            truth.len()
        )));
    }
    if truth.is_empty() {
        return Err(EngineError::InvalidData("no rows to score".to_string()));
    }

    match (truth, predicted) {
        (Labels::Classes(t), Labels::Classes(p)) => Ok(classification_metrics(t, p)),
        (Labels::Values(t), Labels::Values(p)) => Ok(regression_metrics(t, p)),
        _ => Err(EngineError::InvalidData(
            "prediction kind does not match task".to_string(),
        )),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn classification_metrics(truth: &[usize], predicted: &[usize]) -> MetricMap {
    let n = truth.len() as f64;
    let n_labels = truth
        .iter()
        .chain(predicted)
        .max()
        .map(|m| m + 1)
        .unwrap_or(0);

    let mut tp = vec![0.0; n_labels];
    let mut fp = vec![0.0; n_labels];
    let mut fn_ = vec![0.0; n_labels];
    let mut support = vec![0.0; n_labels];
    for (&t, &p) in truth.iter().zip(predicted) {
        support[t] += 1.0;
        if t == p {
            tp[t] += 1.0;
        } else {
            fp[p] += 1.0;
            fn_[t] += 1.0;
        }
    }

    // Support-weighted averages; classes absent from the truth weigh nothing.
    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for c in 0..n_labels {
        let weight = support[c] / n;
        let p = ratio(tp[c], tp[c] + fp[c]);
        let r = ratio(tp[c], tp[c] + fn_[c]);
        precision += weight * p;
        recall += weight * r;
        f1 += weight * ratio(2.0 * p * r, p + r);
    }
    let accuracy = tp.iter().sum::<f64>() / n;

    BTreeMap::from([
        ("accuracy".to_string(), round4(accuracy)),
        ("precision_weighted".to_string(), round4(precision)),
        ("recall_weighted".to_string(), round4(recall)),
        ("f1_weighted".to_string(), round4(f1)),
    ])
}

fn regression_metrics(truth: &[f64], predicted: &[f64]) -> MetricMap {
    let n = truth.len() as f64;
    let mean = truth.iter().sum::<f64>() / n;
    let mut ss_res = 0.0;
    let mut abs_err = 0.0;
    let mut ss_tot = 0.0;
    for (&t, &p) in truth.iter().zip(predicted) {
        ss_res += (t - p) * (t - p);
        abs_err += (t - p).abs();
        ss_tot += (t - mean) * (t - mean);
    }

    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };

    BTreeMap::from([
        ("rmse".to_string(), round4((ss_res / n).sqrt())),
        ("mae".to_string(), round4(abs_err / n)),
        ("r2".to_string(), round4(r2)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_classification() {
        let truth = Labels::Classes(vec![0, 1, 2, 1]);
        let metrics = score(&truth, &truth).unwrap();
        for name in ["accuracy", "precision_weighted", "recall_weighted", "f1_weighted"] {
            assert_eq!(metrics[name], 1.0, "{name}");
        }
    }

    #[test]
    fn test_weighted_classification_metrics() {
        // class 0: tp=2 fn=1; class 1: tp=1 fp=1
        let truth = Labels::Classes(vec![0, 0, 0, 1]);
        let pred = Labels::Classes(vec![0, 0, 1, 1]);
        let m = score(&truth, &pred).unwrap();
        assert_eq!(m["accuracy"], 0.75);
        // precision: 0.75 * 1.0 + 0.25 * 0.5
        assert_eq!(m["precision_weighted"], 0.875);
        assert_eq!(m["recall_weighted"], 0.75);
        // f1: 0.75 * 0.8 + 0.25 * 0.6667
        assert_eq!(m["f1_weighted"], 0.7667);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let truth = Labels::Classes(vec![0, 0]);
        let pred = Labels::Classes(vec![1, 1]);
        let m = score(&truth, &pred).unwrap();
        assert_eq!(m["accuracy"], 0.0);
        assert_eq!(m["precision_weighted"], 0.0);
        assert_eq!(m["f1_weighted"], 0.0);
    }

    #[test]
    fn test_regression_metrics() {
        let truth = Labels::Values(vec![1.0, 2.0, 3.0, 4.0]);
        let pred = Labels::Values(vec![1.0, 2.0, 3.0, 6.0]);
        let m = score(&truth, &pred).unwrap();
        assert_eq!(m["rmse"], 1.0);
        assert_eq!(m["mae"], 0.5);
        // 1 - 4 / 5
        assert_eq!(m["r2"], 0.2);
    }

    #[test]
    fn test_constant_truth_r2() {
        let truth = Labels::Values(vec![2.0, 2.0]);
        assert_eq!(score(&truth, &truth).unwrap()["r2"], 1.0);
        let pred = Labels::Values(vec![1.0, 3.0]);
        assert_eq!(score(&truth, &pred).unwrap()["r2"], 0.0);
    }

    #[test]
    fn test_mismatched_inputs() {
        let truth = Labels::Classes(vec![0, 1]);
        assert!(score(&truth, &Labels::Classes(vec![0])).is_err());
        assert!(score(&truth, &Labels::Values(vec![0.0, 1.0])).is_err());
        assert_eq!(primary_metric(TaskKind::Regression), "r2");
    }
}
