//! Native learners shared by the built-in engines.
//!
//! Every engine searches over the same small family of models; what differs
//! between engines is the search strategy, not the learners.

use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::dataset::{Labels, SplitBundle, TaskKind};
use crate::error::EngineError;

/// A trainable model configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    /// Majority class or mean target.
    Baseline,
    /// Closest class centroid; classification only.
    NearestCentroid,
    /// Brute-force k-nearest neighbours.
    KNeighbors { k: usize, distance_weighted: bool },
    /// L2-regularized least squares; one-vs-rest for classification.
    Ridge { alpha: f64 },
}

impl Model {
    /// Canonical identifier of this configuration.
    pub fn id(&self) -> String {
        match self {
            Model::Baseline => "baseline".to_string(),
            Model::NearestCentroid => "nearest_centroid".to_string(),
            Model::KNeighbors {
                k,
                distance_weighted,
            } => format!(
                "knn_k{}_{}",
                k,
                if *distance_weighted { "distance" } else { "uniform" }
            ),
            Model::Ridge { alpha } => format!("ridge_a{}", alpha),
        }
    }

    pub fn supports(&self, task: TaskKind) -> bool {
        !matches!((self, task), (Model::NearestCentroid, TaskKind::Regression))
    }

    /// Trains on `problem`'s training partition and predicts its test rows.
    pub fn fit_predict(&self, problem: &Problem) -> Result<Labels, EngineError> {
        if problem.train_y.is_empty() {
            return Err(EngineError::InvalidData("no training rows".to_string()));
        }
        match (self, &problem.train_y) {
            (Model::Baseline, Labels::Classes(y)) => {
                let counts = count_classes(y, problem.n_classes);
                let majority = argmax(&counts);
                Ok(Labels::Classes(vec![majority; problem.test_x.nrows()]))
            }
            (Model::Baseline, Labels::Values(y)) => {
                let mean = y.iter().sum::<f64>() / y.len() as f64;
                Ok(Labels::Values(vec![mean; problem.test_x.nrows()]))
            }
            (Model::NearestCentroid, Labels::Classes(y)) => Ok(nearest_centroid(problem, y)),
            (Model::NearestCentroid, Labels::Values(_)) => Err(EngineError::InvalidData(
                "nearest centroid requires class labels".to_string(),
            )),
            (
                Model::KNeighbors {
                    k,
                    distance_weighted,
                },
                _,
            ) => Ok(k_neighbors(problem, *k, *distance_weighted)),
            (Model::Ridge { alpha }, _) => ridge(problem, *alpha),
        }
    }
}

/// Standardized train/test matrices with the training labels.
#[derive(Debug, Clone)]
pub struct Problem {
    pub task: TaskKind,
    pub n_classes: usize,
    pub train_x: Array2<f64>,
    pub train_y: Labels,
    pub test_x: Array2<f64>,
    /// Ground truth for the test rows.
    pub test_y: Labels,
}

impl Problem {
    /// Builds a standardized problem from a split.
    ///
    /// Scaling parameters come from the training rows only.
    pub fn from_split(split: &SplitBundle) -> Self {
        let (train_x, test_x) = standardize(&split.train_x, &split.test_x);
        Self {
            task: split.task,
            n_classes: split.classes.len(),
            train_x,
            train_y: split.train_y.clone(),
            test_x,
            test_y: split.test_y.clone(),
        }
    }

    /// Carves a validation problem out of the training rows.
    ///
    /// The last `fraction` of training rows become the validation set. Returns
    /// `None` when either side would be empty.
    pub fn holdout(&self, fraction: f64) -> Option<Self> {
        let n = self.train_x.nrows();
        let n_val = ((n as f64) * fraction).round() as usize;
        if n_val == 0 || n_val >= n {
            return None;
        }
        let cut = n - n_val;
        let fit_rows: Vec<usize> = (0..cut).collect();
        let val_rows: Vec<usize> = (cut..n).collect();
        Some(Self {
            task: self.task,
            n_classes: self.n_classes,
            train_x: self.train_x.select(Axis(0), &fit_rows),
            train_y: take_labels(&self.train_y, &fit_rows),
            test_x: self.train_x.select(Axis(0), &val_rows),
            test_y: take_labels(&self.train_y, &val_rows),
        })
    }
}

fn take_labels(labels: &Labels, rows: &[usize]) -> Labels {
    match labels {
        Labels::Classes(v) => Labels::Classes(rows.iter().map(|&r| v[r]).collect()),
        Labels::Values(v) => Labels::Values(rows.iter().map(|&r| v[r]).collect()),
    }
}

fn standardize(train: &Array2<f64>, test: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    if train.nrows() == 0 {
        return (train.clone(), test.clone());
    }
    let mean = train.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(train.ncols()));
    let std = train.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
    let scale = |m: &Array2<f64>| (m - &mean) / &std;
    (scale(train), scale(test))
}

fn count_classes(labels: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes.max(1)];
    for &l in labels {
        if l < counts.len() {
            counts[l] += 1.0;
        }
    }
    counts
}

/// Index of the largest value; lowest index wins ties.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest_centroid(problem: &Problem, y: &[usize]) -> Labels {
    let d = problem.train_x.ncols();
    let n_classes = problem.n_classes.max(1);
    let mut sums = Array2::<f64>::zeros((n_classes, d));
    let mut counts = vec![0usize; n_classes];
    for (row, &label) in problem.train_x.rows().into_iter().zip(y) {
        let mut target = sums.row_mut(label);
        target += &row;
        counts[label] += 1;
    }

    let centroids: Vec<(usize, Array1<f64>)> = counts
        .iter()
        .enumerate()
        .filter(|(_, &c)| c > 0)
        .map(|(class, &c)| (class, sums.row(class).mapv(|v| v / c as f64)))
        .collect();

    let predictions = problem
        .test_x
        .rows()
        .into_iter()
        .map(|row| {
            centroids
                .iter()
                .map(|(class, centroid)| (*class, squared_distance(row, centroid.view())))
                .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
                .0
        })
        .collect();
    Labels::Classes(predictions)
}

fn k_neighbors(problem: &Problem, k: usize, distance_weighted: bool) -> Labels {
    let n_train = problem.train_x.nrows();
    let k = k.clamp(1, n_train);

    let neighbours = |row: ArrayView1<f64>| -> Vec<(usize, f64)> {
        let mut dists: Vec<(usize, f64)> = problem
            .train_x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, train_row)| (i, squared_distance(row, train_row).sqrt()))
            .collect();
        dists.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        dists.truncate(k);
        dists
    };
    let weight = |dist: f64| {
        if distance_weighted {
            1.0 / (dist + 1e-9)
        } else {
            1.0
        }
    };

    match &problem.train_y {
        Labels::Classes(y) => Labels::Classes(
            problem
                .test_x
                .rows()
                .into_iter()
                .map(|row| {
                    let mut votes = vec![0.0; problem.n_classes.max(1)];
                    for (i, dist) in neighbours(row) {
                        votes[y[i]] += weight(dist);
                    }
                    argmax(&votes)
                })
                .collect(),
        ),
        Labels::Values(y) => Labels::Values(
            problem
                .test_x
                .rows()
                .into_iter()
                .map(|row| {
                    let (mut num, mut den) = (0.0, 0.0);
                    for (i, dist) in neighbours(row) {
                        let w = weight(dist);
                        num += w * y[i];
                        den += w;
                    }
                    num / den
                })
                .collect(),
        ),
    }
}

fn ridge(problem: &Problem, alpha: f64) -> Result<Labels, EngineError> {
    let x = &problem.train_x;
    let (n, d) = x.dim();

    // Targets: one column for regression, one +/-1 column per class otherwise.
    let targets = match &problem.train_y {
        Labels::Values(y) => Array2::from_shape_fn((n, 1), |(i, _)| y[i]),
        Labels::Classes(y) => Array2::from_shape_fn((n, problem.n_classes.max(1)), |(i, c)| {
            if y[i] == c {
                1.0
            } else {
                -1.0
            }
        }),
    };
    let intercept = targets
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(targets.ncols()));
    let centered = &targets - &intercept;

    let mut gram = x.t().dot(x);
    for i in 0..d {
        gram[[i, i]] += alpha.max(1e-8);
    }
    let rhs = x.t().dot(&centered);
    let weights = solve(gram, rhs).ok_or_else(|| EngineError::TrainingFailed {
        engine: "ridge".to_string(),
        message: "singular system".to_string(),
    })?;

    let scores = problem.test_x.dot(&weights) + &intercept;
    Ok(match &problem.train_y {
        Labels::Values(_) => Labels::Values(scores.column(0).to_vec()),
        Labels::Classes(_) => Labels::Classes(
            scores
                .rows()
                .into_iter()
                .map(|row| argmax(&row.to_vec()))
                .collect(),
        ),
    })
}

/// Solves `a * x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for j in 0..n {
                a.swap([col, j], [pivot, j]);
            }
            for j in 0..b.ncols() {
                b.swap([col, j], [pivot, j]);
            }
        }
        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                a[[row, j]] -= factor * a[[col, j]];
            }
            for j in 0..b.ncols() {
                b[[row, j]] -= factor * b[[col, j]];
            }
        }
    }

    let mut x = Array2::<f64>::zeros(b.dim());
    for j in 0..b.ncols() {
        for row in (0..n).rev() {
            let mut acc = b[[row, j]];
            for k in (row + 1)..n {
                acc -= a[[row, k]] * x[[k, j]];
            }
            x[[row, j]] = acc / a[[row, row]];
        }
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn classification_problem() -> Problem {
        // Two well separated clusters.
        let train_x = array![[0.0, 0.0], [0.1, 0.2], [0.2, 0.1], [5.0, 5.0], [5.1, 4.9], [4.9, 5.2]];
        let test_x = array![[0.05, 0.1], [5.0, 5.1]];
        Problem {
            task: TaskKind::Classification,
            n_classes: 2,
            train_x,
            train_y: Labels::Classes(vec![0, 0, 0, 1, 1, 1]),
            test_x,
            test_y: Labels::Classes(vec![0, 1]),
        }
    }

    fn regression_problem() -> Problem {
        // y = 2x + 1
        let train_x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let test_x = array![[5.0], [1.5]];
        Problem {
            task: TaskKind::Regression,
            n_classes: 0,
            train_x,
            train_y: Labels::Values(vec![1.0, 3.0, 5.0, 7.0, 9.0]),
            test_x,
            test_y: Labels::Values(vec![11.0, 4.0]),
        }
    }

    #[test]
    fn test_model_ids() {
        assert_eq!(Model::Baseline.id(), "baseline");
        assert_eq!(
            Model::KNeighbors {
                k: 5,
                distance_weighted: true
            }
            .id(),
            "knn_k5_distance"
        );
        assert_eq!(Model::Ridge { alpha: 0.5 }.id(), "ridge_a0.5");
        assert!(!Model::NearestCentroid.supports(TaskKind::Regression));
    }

    #[test]
    fn test_classifiers_separate_clusters() {
        let problem = classification_problem();
        for model in [
            Model::NearestCentroid,
            Model::KNeighbors {
                k: 3,
                distance_weighted: false,
            },
            Model::Ridge { alpha: 0.1 },
        ] {
            let pred = model.fit_predict(&problem).unwrap();
            assert_eq!(pred, Labels::Classes(vec![0, 1]), "model {}", model.id());
        }
    }

    #[test]
    fn test_baseline_majority_and_mean() {
        let mut problem = classification_problem();
        problem.train_y = Labels::Classes(vec![1, 1, 0, 1, 0, 1]);
        assert_eq!(
            Model::Baseline.fit_predict(&problem).unwrap(),
            Labels::Classes(vec![1, 1])
        );

        let problem = regression_problem();
        assert_eq!(
            Model::Baseline.fit_predict(&problem).unwrap(),
            Labels::Values(vec![5.0, 5.0])
        );
    }

    #[test]
    fn test_ridge_recovers_linear_relation() {
        let problem = regression_problem();
        let pred = Model::Ridge { alpha: 1e-6 }.fit_predict(&problem).unwrap();
        let Labels::Values(values) = pred else {
            panic!("expected values");
        };
        assert!((values[0] - 11.0).abs() < 1e-3);
        assert!((values[1] - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_knn_regression_weighted_mean() {
        let problem = regression_problem();
        let pred = Model::KNeighbors {
            k: 2,
            distance_weighted: false,
        }
        .fit_predict(&problem)
        .unwrap();
        assert_eq!(pred, Labels::Values(vec![8.0, 4.0]));
    }

    #[test]
    fn test_nearest_centroid_rejects_regression() {
        let problem = regression_problem();
        assert!(Model::NearestCentroid.fit_predict(&problem).is_err());
    }

    #[test]
    fn test_holdout_partitions_training_rows() {
        let problem = classification_problem();
        let holdout = problem.holdout(0.5).unwrap();
        assert_eq!(holdout.train_x.nrows(), 3);
        assert_eq!(holdout.test_x.nrows(), 3);
        assert_eq!(holdout.test_y, Labels::Classes(vec![1, 1, 1]));
        assert!(problem.holdout(0.0).is_none());
    }

    #[test]
    fn test_solve_identity() {
        let a = array![[2.0, 0.0], [0.0, 4.0]];
        let b = array![[2.0], [8.0]];
        let x = solve(a, b).unwrap();
        assert_eq!(x, array![[1.0], [2.0]]);
    }
}
