//! Classification metrics — pure functions over (truth, prediction) pairs.
//!
//! Rows with no true label are ignored. A missing prediction counts as wrong.
//! Per-class scores are weighted by each class's support in the truth.

use crate::artifact::ClassificationMetricArtifact;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weighted scores plus plain accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
    pub accuracy: f64,
    /// Rows that had a true label.
    pub support: usize,
}

impl ClassificationMetrics {
    pub fn compute(truth: &[Option<String>], predicted: &[Option<String>]) -> Self {
        let pairs: Vec<(&str, Option<&str>)> = truth
            .iter()
            .zip(predicted)
            .filter_map(|(t, p)| Some((t.as_deref()?, p.as_deref())))
            .collect();

        Self {
            f1_score: weighted_f1(&pairs),
            precision_score: weighted_precision(&pairs),
            recall_score: weighted_recall(&pairs),
            accuracy: accuracy(&pairs),
            support: pairs.len(),
        }
    }

    pub fn to_artifact(&self) -> ClassificationMetricArtifact {
        ClassificationMetricArtifact {
            f1_score: self.f1_score,
            precision_score: self.precision_score,
            recall_score: self.recall_score,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
struct ClassCounts {
    tp: usize,
    fp: usize,
    fn_: usize,
}

impl ClassCounts {
    fn support(&self) -> usize {
        self.tp + self.fn_
    }

    fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn class_counts<'a>(pairs: &[(&'a str, Option<&'a str>)]) -> BTreeMap<&'a str, ClassCounts> {
    let mut counts: BTreeMap<&str, ClassCounts> = BTreeMap::new();
    for &(truth, predicted) in pairs {
        match predicted {
            Some(p) if p == truth => counts.entry(truth).or_default().tp += 1,
            Some(p) => {
                counts.entry(truth).or_default().fn_ += 1;
                counts.entry(p).or_default().fp += 1;
            }
            None => counts.entry(truth).or_default().fn_ += 1,
        }
    }
    counts
}

/// Support-weighted mean of a per-class score. Classes that only ever appear
/// as predictions have zero weight.
fn weighted(pairs: &[(&str, Option<&str>)], score: impl Fn(&ClassCounts) -> f64) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let total = pairs.len() as f64;
    class_counts(pairs)
        .values()
        .map(|c| score(c) * c.support() as f64 / total)
        .sum()
}

pub fn weighted_precision(pairs: &[(&str, Option<&str>)]) -> f64 {
    weighted(pairs, ClassCounts::precision)
}

pub fn weighted_recall(pairs: &[(&str, Option<&str>)]) -> f64 {
    weighted(pairs, ClassCounts::recall)
}

pub fn weighted_f1(pairs: &[(&str, Option<&str>)]) -> f64 {
    weighted(pairs, ClassCounts::f1)
}

pub fn accuracy(pairs: &[(&str, Option<&str>)]) -> f64 {
    let hits = pairs.iter().filter(|(t, p)| *p == Some(*t)).count();
    ratio(hits, pairs.len())
}
