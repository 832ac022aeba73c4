//! Scoring topic clusters against hand-clustered examples.
//!
//! Hand-labeled sets are small, so these numbers are a rough signal at best.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::document::Document;
use crate::error::{Result, TopicError};
use crate::inference::InferenceEngine;
use crate::model::TopicModel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub n_topics: usize,
    pub purity: f64,
    pub adjusted_rand_index: f64,
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n_topics={} purity={:.3} adjusted_rand_index={:.3}",
            self.n_topics, self.purity, self.adjusted_rand_index
        )
    }
}

/// Train `model` on `documents` and compare its clusters with `labels`.
pub fn evaluate<E: InferenceEngine, D: Document>(
    model: &TopicModel<E>,
    documents: &[D],
    labels: &[usize],
) -> Result<Evaluation> {
    if documents.len() != labels.len() {
        return Err(TopicError::CorpusMismatch {
            expected: labels.len(),
            actual: documents.len(),
        });
    }
    let snapshot = model.train(documents)?;
    let predicted = model.assignments()?;

    Ok(Evaluation {
        n_topics: snapshot.n_topics(),
        purity: purity(&predicted, labels),
        adjusted_rand_index: adjusted_rand_index(&predicted, labels),
    })
}

fn contingency(predicted: &[usize], truth: &[usize]) -> HashMap<(usize, usize), usize> {
    let mut table = HashMap::new();
    for pair in predicted.iter().copied().zip(truth.iter().copied()) {
        *table.entry(pair).or_insert(0) += 1;
    }
    table
}

/// Fraction of documents that belong to the majority true label of their cluster.
pub fn purity(predicted: &[usize], truth: &[usize]) -> f64 {
    if predicted.is_empty() {
        return 0.0;
    }
    let mut majority: HashMap<usize, usize> = HashMap::new();
    for ((cluster, _), count) in contingency(predicted, truth) {
        let best = majority.entry(cluster).or_insert(0);
        *best = (*best).max(count);
    }
    majority.values().sum::<usize>() as f64 / predicted.len() as f64
}

fn pairs(n: usize) -> f64 {
    (n * n.saturating_sub(1)) as f64 / 2.0
}

/// Rand index adjusted for chance: 1 for identical partitions, about 0 for
/// random ones.
pub fn adjusted_rand_index(predicted: &[usize], truth: &[usize]) -> f64 {
    let table = contingency(predicted, truth);
    let mut cluster_sizes: HashMap<usize, usize> = HashMap::new();
    let mut label_sizes: HashMap<usize, usize> = HashMap::new();
    for (&(cluster, label), &count) in &table {
        *cluster_sizes.entry(cluster).or_insert(0) += count;
        *label_sizes.entry(label).or_insert(0) += count;
    }

    let index: f64 = table.values().map(|&n| pairs(n)).sum();
    let cluster_pairs: f64 = cluster_sizes.values().map(|&n| pairs(n)).sum();
    let label_pairs: f64 = label_sizes.values().map(|&n| pairs(n)).sum();
    let total_pairs = pairs(predicted.len());
    if total_pairs == 0.0 {
        return 1.0;
    }

    let expected = cluster_pairs * label_pairs / total_pairs;
    let max_index = (cluster_pairs + label_pairs) / 2.0;
    if max_index == expected {
        return 1.0;
    }
    (index - expected) / (max_index - expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_partitions() {
        let labels = [0, 0, 1, 1, 2];
        assert_eq!(purity(&labels, &labels), 1.0);
        assert!((adjusted_rand_index(&labels, &labels) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_relabeled_partitions_score_the_same() {
        let truth = [0, 0, 1, 1];
        let predicted = [1, 1, 0, 0];
        assert_eq!(purity(&predicted, &truth), 1.0);
        assert!((adjusted_rand_index(&predicted, &truth) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_cluster() {
        let truth = [0, 0, 1, 1];
        let predicted = [0, 0, 0, 0];
        assert_eq!(purity(&predicted, &truth), 0.5);
        assert_eq!(adjusted_rand_index(&predicted, &truth), 0.0);
    }

    #[test]
    fn test_known_adjusted_rand_index() {
        // Reference value for this pair of labelings is 0.24242...
        let truth = [0, 0, 0, 1, 1, 1];
        let predicted = [0, 0, 1, 1, 2, 2];
        assert!((adjusted_rand_index(&predicted, &truth) - 0.242_424_242).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(purity(&[], &[]), 0.0);
        assert_eq!(adjusted_rand_index(&[], &[]), 1.0);
    }
}
