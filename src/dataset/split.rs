//! Train/test splitting with leakage-column removal and conditional
//! stratification.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::DatasetError;

use super::frame::{Column, ColumnData, DataFrame};
use super::task::TaskKind;

/// Column names that identify rows rather than describe them.
static IDENTIFIER_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^(id|index|uid|uuid|row_?id|row_?num(ber)?|unnamed:\s*0)$").ok()
});

/// Encoded labels for one partition.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    /// Class indices into [`SplitBundle::classes`].
    Classes(Vec<usize>),
    /// Continuous targets.
    Values(Vec<f64>),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Classes(v) => v.len(),
            Labels::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The train/test partition owned by a single run.
#[derive(Debug, Clone)]
pub struct SplitBundle {
    pub target: String,
    pub task: TaskKind,
    pub feature_names: Vec<String>,
    pub dropped_columns: Vec<String>,
    /// Sorted class names; empty for regression.
    pub classes: Vec<String>,
    pub train_x: Array2<f64>,
    pub test_x: Array2<f64>,
    pub train_y: Labels,
    pub test_y: Labels,
    pub stratified: bool,
}

impl SplitBundle {
    pub fn n_train(&self) -> usize {
        self.train_x.nrows()
    }

    pub fn n_test(&self) -> usize {
        self.test_x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.train_x.ncols()
    }
}

/// Options controlling the split.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub test_fraction: f64,
    pub seed: u64,
    /// Stratify only when the label has at most this many classes.
    pub stratify_max_classes: usize,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            stratify_max_classes: 20,
        }
    }
}

/// Splits frames into [`SplitBundle`]s.
#[derive(Debug, Clone, Default)]
pub struct Splitter {
    options: SplitOptions,
}

impl Splitter {
    pub fn new(options: SplitOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SplitOptions {
        &self.options
    }

    /// Splits `frame` into train and test partitions for `target`.
    ///
    /// Identifier-like columns are dropped first and rows with a missing
    /// target are ignored. Classification splits are stratified when every
    /// class has at least two rows and both partitions can hold one row per
    /// class; otherwise the split falls back to a plain shuffled split.
    pub fn split(
        &self,
        frame: &DataFrame,
        target: &str,
        task: TaskKind,
    ) -> Result<SplitBundle, DatasetError> {
        let target_col = frame
            .column(target)
            .ok_or_else(|| DatasetError::TargetNotFound(target.to_string()))?;

        let dropped = leakage_columns(frame, target);
        if !dropped.is_empty() {
            warn!(columns = ?dropped, "Dropped leakage columns");
        }

        let mut excluded = dropped.clone();
        excluded.push(target.to_string());
        let features = frame.without_columns(&excluded);
        if features.n_cols() == 0 {
            return Err(DatasetError::NoFeatures(target.to_string()));
        }

        let labelled: Vec<usize> = (0..frame.n_rows())
            .filter(|&row| !target_col.is_missing(row))
            .collect();
        let n = labelled.len();
        if n < 2 {
            return Err(DatasetError::InsufficientRows(n));
        }

        let (classes, encoded) = encode_target(target_col, &labelled, task)?;

        let n_test = ((n as f64 * self.options.test_fraction - 1e-9).ceil() as usize)
            .clamp(1, n - 1);
        let n_train = n - n_test;

        let stratify = match &encoded {
            Labels::Classes(idx) => {
                let counts = class_counts(idx, classes.len());
                let ok = classes.len() <= self.options.stratify_max_classes
                    && counts.iter().all(|&c| c >= 2)
                    && n_test >= classes.len()
                    && n_train >= classes.len();
                if !ok {
                    warn!(
                        classes = classes.len(),
                        "Stratified split not possible, falling back to random split"
                    );
                }
                ok
            }
            Labels::Values(_) => false,
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.options.seed);
        let (train_pos, test_pos) = match (&encoded, stratify) {
            (Labels::Classes(idx), true) => {
                stratified_positions(idx, classes.len(), n_test, &mut rng)
            }
            _ => {
                let mut order: Vec<usize> = (0..n).collect();
                order.shuffle(&mut rng);
                let test = order[..n_test].to_vec();
                let train = order[n_test..].to_vec();
                (train, test)
            }
        };

        let train_rows: Vec<usize> = train_pos.iter().map(|&p| labelled[p]).collect();
        let test_rows: Vec<usize> = test_pos.iter().map(|&p| labelled[p]).collect();

        let encoders: Vec<FeatureEncoder> = features
            .columns()
            .iter()
            .map(|c| FeatureEncoder::fit(c, &train_rows))
            .collect();

        let train_x = encode_matrix(features.columns(), &encoders, &train_rows)?;
        let test_x = encode_matrix(features.columns(), &encoders, &test_rows)?;

        let (train_y, test_y) = match &encoded {
            Labels::Classes(idx) => (
                Labels::Classes(train_pos.iter().map(|&p| idx[p]).collect()),
                Labels::Classes(test_pos.iter().map(|&p| idx[p]).collect()),
            ),
            Labels::Values(v) => (
                Labels::Values(train_pos.iter().map(|&p| v[p]).collect()),
                Labels::Values(test_pos.iter().map(|&p| v[p]).collect()),
            ),
        };

        debug!(
            train = train_rows.len(),
            test = test_rows.len(),
            features = features.n_cols(),
            stratified = stratify,
            "Split complete"
        );

        Ok(SplitBundle {
            target: target.to_string(),
            task,
            feature_names: features.column_names().iter().map(|s| s.to_string()).collect(),
            dropped_columns: dropped,
            classes,
            train_x,
            test_x,
            train_y,
            test_y,
            stratified: stratify,
        })
    }
}

/// Returns the columns that look like row identifiers or unique keys.
///
/// A column is dropped when its name is identifier-like, when it is a text
/// column with a distinct value in every row, or when it is an integer
/// column counting rows (all distinct and consecutive). The target is never
/// dropped.
pub fn leakage_columns(frame: &DataFrame, target: &str) -> Vec<String> {
    let n = frame.n_rows();
    frame
        .columns()
        .iter()
        .filter(|c| c.name != target)
        .filter(|c| {
            let by_name = IDENTIFIER_NAME
                .as_ref()
                .is_some_and(|re| re.is_match(c.name.trim()));
            by_name || (n > 1 && is_unique_key(c, n))
        })
        .map(|c| c.name.clone())
        .collect()
}

fn is_unique_key(column: &Column, n_rows: usize) -> bool {
    match &column.data {
        ColumnData::Text(values) => {
            values.iter().all(Option::is_some) && column.distinct_count() == n_rows
        }
        ColumnData::Numeric(values) => {
            let present: Vec<f64> = values.iter().flatten().copied().collect();
            if present.len() != n_rows || present.iter().any(|x| x.fract() != 0.0) {
                return false;
            }
            if column.distinct_count() != n_rows {
                return false;
            }
            let min = present.iter().copied().fold(f64::INFINITY, f64::min);
            let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (max - min) as usize == n_rows - 1
        }
    }
}

fn encode_target(
    column: &Column,
    rows: &[usize],
    task: TaskKind,
) -> Result<(Vec<String>, Labels), DatasetError> {
    match task {
        TaskKind::Classification => {
            let labels: Vec<String> = rows
                .iter()
                .map(|&r| column.label_at(r).unwrap_or_default())
                .collect();
            let classes: Vec<String> = labels
                .iter()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let index: HashMap<&str, usize> = classes
                .iter()
                .enumerate()
                .map(|(i, c)| (c.as_str(), i))
                .collect();
            let encoded = labels
                .iter()
                .map(|l| index.get(l.as_str()).copied().unwrap_or(0))
                .collect();
            Ok((classes, Labels::Classes(encoded)))
        }
        TaskKind::Regression => match &column.data {
            ColumnData::Numeric(values) => Ok((
                Vec::new(),
                Labels::Values(rows.iter().map(|&r| values[r].unwrap_or(0.0)).collect()),
            )),
            ColumnData::Text(_) => Err(DatasetError::Parse {
                name: column.name.clone(),
                message: "regression target must be numeric".to_string(),
            }),
        },
    }
}

fn class_counts(labels: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &l in labels {
        counts[l] += 1;
    }
    counts
}

/// Picks test positions per class so each class keeps its proportion.
///
/// Per-class test counts use largest-remainder rounding, bounded so that
/// every class has at least one row on each side.
fn stratified_positions(
    labels: &[usize],
    n_classes: usize,
    n_test: usize,
    rng: &mut ChaCha8Rng,
) -> (Vec<usize>, Vec<usize>) {
    let n = labels.len();
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (pos, &label) in labels.iter().enumerate() {
        groups[label].push(pos);
    }

    let mut quota: Vec<usize> = Vec::with_capacity(n_classes);
    let mut remainders: Vec<(f64, usize)> = Vec::with_capacity(n_classes);
    for (class, group) in groups.iter().enumerate() {
        let exact = group.len() as f64 * n_test as f64 / n as f64;
        let base = (exact.floor() as usize).clamp(1, group.len() - 1);
        quota.push(base);
        remainders.push((exact - base as f64, class));
    }

    // Largest remainder first when adding, smallest first when removing.
    remainders.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    let mut assigned: usize = quota.iter().sum();
    while assigned < n_test {
        let Some(&(_, class)) = remainders
            .iter()
            .find(|(_, c)| quota[*c] < groups[*c].len() - 1)
        else {
            break;
        };
        quota[class] += 1;
        assigned += 1;
    }
    while assigned > n_test {
        let Some(&(_, class)) = remainders.iter().rev().find(|(_, c)| quota[*c] > 1) else {
            break;
        };
        quota[class] -= 1;
        assigned -= 1;
    }

    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (class, group) in groups.iter_mut().enumerate() {
        group.shuffle(rng);
        test.extend_from_slice(&group[..quota[class]]);
        train.extend_from_slice(&group[quota[class]..]);
    }
    train.shuffle(rng);
    test.shuffle(rng);
    (train, test)
}

/// Per-column encoding fitted on training rows.
#[derive(Debug, Clone)]
enum FeatureEncoder {
    /// Missing values take the training mean.
    Numeric { fill: f64 },
    /// Categories map to their sorted position; unseen or missing values
    /// map past the last known category.
    Ordinal { codes: BTreeMap<String, usize> },
}

impl FeatureEncoder {
    fn fit(column: &Column, train_rows: &[usize]) -> Self {
        match &column.data {
            ColumnData::Numeric(values) => {
                let present: Vec<f64> = train_rows.iter().filter_map(|&r| values[r]).collect();
                let fill = if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                };
                FeatureEncoder::Numeric { fill }
            }
            ColumnData::Text(values) => {
                let categories: BTreeSet<&String> =
                    train_rows.iter().filter_map(|&r| values[r].as_ref()).collect();
                let codes = categories
                    .into_iter()
                    .enumerate()
                    .map(|(i, c)| (c.clone(), i))
                    .collect();
                FeatureEncoder::Ordinal { codes }
            }
        }
    }

    fn encode(&self, column: &Column, row: usize) -> f64 {
        match (self, &column.data) {
            (FeatureEncoder::Numeric { fill }, ColumnData::Numeric(values)) => {
                values[row].unwrap_or(*fill)
            }
            (FeatureEncoder::Ordinal { codes }, ColumnData::Text(values)) => values[row]
                .as_ref()
                .and_then(|v| codes.get(v))
                .copied()
                .unwrap_or(codes.len()) as f64,
            _ => 0.0,
        }
    }
}

fn encode_matrix(
    columns: &[Column],
    encoders: &[FeatureEncoder],
    rows: &[usize],
) -> Result<Array2<f64>, DatasetError> {
    let mut data = Vec::with_capacity(rows.len() * columns.len());
    for &row in rows {
        for (column, encoder) in columns.iter().zip(encoders) {
            data.push(encoder.encode(column, row));
        }
    }
    Array2::from_shape_vec((rows.len(), columns.len()), data).map_err(|e| DatasetError::Parse {
        name: "features".to_string(),
        message: e.to_string(),
    })
}
