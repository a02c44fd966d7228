//! Synthetic splits for engine tests.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::dataset::{Column, DataFrame, SplitBundle, Splitter, TaskKind};

use super::{TrainingContext, MIN_TRAINING_ROWS};

/// Three well separated clusters labelled `a`, `b` and `c`.
pub(crate) fn blobs(n: usize, seed: u64) -> SplitBundle {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let centers = [(0.0, 0.0), (6.0, 0.0), (0.0, 6.0)];
    let names = ["a", "b", "c"];
    let (mut x1, mut x2, mut label) = (Vec::new(), Vec::new(), Vec::new());
    for i in 0..n {
        let (cx, cy) = centers[i % 3];
        x1.push(Some(cx + rng.random_range(-1.0..1.0)));
        x2.push(Some(cy + rng.random_range(-1.0..1.0)));
        label.push(Some(names[i % 3].to_string()));
    }
    let frame = DataFrame::new(vec![
        Column::numeric("x1", x1),
        Column::numeric("x2", x2),
        Column::text("label", label),
    ])
    .unwrap();
    Splitter::default()
        .split(&frame, "label", TaskKind::Classification)
        .unwrap()
}

/// `y = 3 * x1 - 2 * x2` with a little noise.
pub(crate) fn linear(n: usize, seed: u64) -> SplitBundle {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (mut x1, mut x2, mut y) = (Vec::new(), Vec::new(), Vec::new());
    for _ in 0..n {
        let a: f64 = rng.random_range(0.0..10.0);
        let b: f64 = rng.random_range(0.0..10.0);
        x1.push(Some(a));
        x2.push(Some(b));
        y.push(Some(3.0 * a - 2.0 * b + rng.random_range(-0.1..0.1)));
    }
    let frame = DataFrame::new(vec![
        Column::numeric("x1", x1),
        Column::numeric("x2", x2),
        Column::numeric("y", y),
    ])
    .unwrap();
    Splitter::default()
        .split(&frame, "y", TaskKind::Regression)
        .unwrap()
}

pub(crate) fn context<'a>(split: &'a SplitBundle, cancel: &'a AtomicBool) -> TrainingContext<'a> {
    TrainingContext::new(split, Duration::from_secs(60), MIN_TRAINING_ROWS, cancel)
}
