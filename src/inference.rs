//! Topic inference: the engine contract and a collapsed Gibbs sampler for LDA.

use std::fmt;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::SamplerConfig;
use crate::error::{Result, TopicError};
use crate::vectorizer::DocumentTermMatrix;

/// Allowed drift of a probability row's sum from one.
const SIMPLEX_TOLERANCE: f64 = 1e-6;

/// Result of fitting a topic model to a document-term matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTopics {
    /// Documents x topics, each row a probability distribution
    pub doc_topic: Vec<Vec<f64>>,
    /// Topics x terms, each row a probability distribution
    pub topic_word: Vec<Vec<f64>>,
    pub log_likelihood: f64,
}

impl FittedTopics {
    pub fn n_topics(&self) -> usize {
        self.topic_word.len()
    }

    pub fn n_docs(&self) -> usize {
        self.doc_topic.len()
    }

    /// Check that both matrices agree on the topic count and vocabulary size.
    pub fn check_shape(&self, n_terms: usize) -> std::result::Result<(), String> {
        let k = self.n_topics();
        if k == 0 {
            return Err("no topics".to_string());
        }
        if let Some(row) = self.doc_topic.iter().find(|row| row.len() != k) {
            return Err(format!(
                "doc_topic row has {} columns, expected {}",
                row.len(),
                k
            ));
        }
        if let Some(row) = self.topic_word.iter().find(|row| row.len() != n_terms) {
            return Err(format!(
                "topic_word row has {} columns, expected {}",
                row.len(),
                n_terms
            ));
        }
        Ok(())
    }

    /// Check that every row of both matrices is a probability distribution.
    pub fn check_simplices(&self) -> std::result::Result<(), String> {
        check_rows("doc_topic", &self.doc_topic)?;
        check_rows("topic_word", &self.topic_word)
    }

    /// Indices of the `n` highest-weighted terms of `topic`, descending by
    /// weight with ties in vocabulary order.
    pub fn top_term_indices(&self, topic: usize, n: usize) -> Vec<usize> {
        let weights = &self.topic_word[topic];
        let mut order: Vec<usize> = (0..weights.len()).collect();
        // Stable sort keeps vocabulary order among equal weights.
        order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]));
        order.truncate(n);
        order
    }
}

fn check_rows(matrix: &str, rows: &[Vec<f64>]) -> std::result::Result<(), String> {
    for (i, row) in rows.iter().enumerate() {
        let sum: f64 = row.iter().sum();
        let in_range = row.iter().all(|p| (0.0..=1.0).contains(p));
        if !in_range || (sum - 1.0).abs() > SIMPLEX_TOLERANCE {
            return Err(format!(
                "{} row {} is not a probability distribution (sum {})",
                matrix, i, sum
            ));
        }
    }
    Ok(())
}

/// Top words of one topic, as printed in diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic: usize,
    pub words: Vec<(String, f64)>,
}

impl fmt::Display for TopicSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<&str> = self.words.iter().map(|(word, _)| word.as_str()).collect();
        write!(f, "Topic: {}: {}", self.topic, words.join(" | "))
    }
}

/// Top `n` words with their weights for every topic of `fitted`.
pub fn summarize_topics(fitted: &FittedTopics, vocabulary: &[String], n: usize) -> Vec<TopicSummary> {
    (0..fitted.n_topics())
        .map(|topic| TopicSummary {
            topic,
            words: fitted
                .top_term_indices(topic, n)
                .into_iter()
                .map(|term| (vocabulary[term].clone(), fitted.topic_word[topic][term]))
                .collect(),
        })
        .collect()
}

/// Index of the largest entry. Ties resolve to the lowest index; NaN never wins.
pub fn argmax(row: &[f64]) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &value) in row.iter().enumerate() {
        if value > best_value {
            best = i;
            best_value = value;
        }
    }
    best
}

/// The statistical engine behind a topic model.
pub trait InferenceEngine: Send + Sync {
    /// Fit `k` topics to `dtm`. The same seed and inputs must give the same result.
    fn fit(
        &self,
        dtm: &DocumentTermMatrix,
        k: usize,
        seed: u64,
        iterations: usize,
    ) -> Result<FittedTopics>;

    /// Topic distribution of one document (sparse term counts) under a fitted model.
    fn transform(&self, fitted: &FittedTopics, row: &[(usize, usize)]) -> Vec<f64>;
}

/// Latent Dirichlet Allocation fitted by collapsed Gibbs sampling.
#[derive(Debug, Clone)]
pub struct GibbsSampler {
    config: SamplerConfig,
}

impl Default for GibbsSampler {
    fn default() -> Self {
        GibbsSampler::new(SamplerConfig::default())
    }
}

impl GibbsSampler {
    pub fn new(config: SamplerConfig) -> Self {
        GibbsSampler { config }
    }

    fn failure(k: usize, reason: impl Into<String>) -> TopicError {
        TopicError::Inference {
            k,
            reason: reason.into(),
        }
    }

    fn expand_tokens(row: &[(usize, usize)]) -> Vec<usize> {
        row.iter()
            .flat_map(|&(word_id, count)| std::iter::repeat(word_id).take(count))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn sample_topic(
        &self,
        rng: &mut StdRng,
        weights: &mut [f64],
        word_id: usize,
        doc_topics: &[usize],
        word_topic_counts: &[Vec<usize>],
        topic_counts: &[usize],
        vocab_beta: f64,
    ) -> Result<usize> {
        for (topic, weight) in weights.iter_mut().enumerate() {
            let word_prob = (word_topic_counts[word_id][topic] as f64 + self.config.beta)
                / (topic_counts[topic] as f64 + vocab_beta);
            let doc_prob = doc_topics[topic] as f64 + self.config.alpha;
            *weight = word_prob * doc_prob;
        }

        let dist = WeightedIndex::new(&*weights).map_err(|e| {
            Self::failure(weights.len(), format!("degenerate sampling weights: {}", e))
        })?;
        Ok(dist.sample(rng))
    }

    fn normalize_topic_word_matrix(
        &self,
        word_topic_counts: &[Vec<usize>],
        topic_counts: &[usize],
    ) -> Vec<Vec<f64>> {
        let vocab_size = word_topic_counts.len();
        let vocab_beta = vocab_size as f64 * self.config.beta;
        topic_counts
            .iter()
            .enumerate()
            .map(|(topic, &total)| {
                let denom = total as f64 + vocab_beta;
                word_topic_counts
                    .iter()
                    .map(|counts| (counts[topic] as f64 + self.config.beta) / denom)
                    .collect()
            })
            .collect()
    }

    fn normalize_doc_topic_matrix(&self, doc_topic_counts: &[Vec<usize>]) -> Vec<Vec<f64>> {
        doc_topic_counts
            .iter()
            .map(|counts| {
                let num_topics = counts.len() as f64;
                let total: usize = counts.iter().sum();
                let denom = total as f64 + num_topics * self.config.alpha;
                counts
                    .iter()
                    .map(|&count| (count as f64 + self.config.alpha) / denom)
                    .collect()
            })
            .collect()
    }

    /// Joint log-likelihood log p(w, z) of a sampler state.
    fn log_likelihood(
        &self,
        word_topic_counts: &[Vec<usize>],
        doc_topic_counts: &[Vec<usize>],
        topic_counts: &[usize],
    ) -> f64 {
        let alpha = self.config.alpha;
        let beta = self.config.beta;
        let num_topics = topic_counts.len() as f64;
        let vocab_size = word_topic_counts.len() as f64;
        let lgamma_alpha = libm::lgamma(alpha);
        let lgamma_beta = libm::lgamma(beta);

        // log p(w | z)
        let mut ll = num_topics * libm::lgamma(beta * vocab_size);
        for (topic, &total) in topic_counts.iter().enumerate() {
            ll -= libm::lgamma(beta * vocab_size + total as f64);
            for counts in word_topic_counts {
                let count = counts[topic];
                if count > 0 {
                    ll += libm::lgamma(beta + count as f64) - lgamma_beta;
                }
            }
        }

        // log p(z)
        for counts in doc_topic_counts {
            let doc_len: usize = counts.iter().sum();
            ll += libm::lgamma(alpha * num_topics) - libm::lgamma(alpha * num_topics + doc_len as f64);
            for &count in counts {
                if count > 0 {
                    ll += libm::lgamma(alpha + count as f64) - lgamma_alpha;
                }
            }
        }
        ll
    }
}

impl InferenceEngine for GibbsSampler {
    fn fit(
        &self,
        dtm: &DocumentTermMatrix,
        num_topics: usize,
        seed: u64,
        iterations: usize,
    ) -> Result<FittedTopics> {
        if num_topics == 0 {
            return Err(Self::failure(num_topics, "topic count must be positive"));
        }
        let vocab_size = dtm.n_terms();
        if vocab_size == 0 {
            return Err(Self::failure(num_topics, "empty vocabulary"));
        }
        let word_docs: Vec<Vec<usize>> = dtm.rows().iter().map(|row| Self::expand_tokens(row)).collect();
        if word_docs.iter().all(|doc| doc.is_empty()) {
            return Err(Self::failure(num_topics, "corpus has no tokens"));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let vocab_beta = vocab_size as f64 * self.config.beta;

        let mut word_topic_counts = vec![vec![0usize; num_topics]; vocab_size];
        let mut doc_topic_counts = vec![vec![0usize; num_topics]; word_docs.len()];
        let mut topic_counts = vec![0usize; num_topics];

        // Random initialization
        let mut doc_word_topics: Vec<Vec<usize>> = Vec::with_capacity(word_docs.len());
        for (doc_id, doc) in word_docs.iter().enumerate() {
            let mut word_topics = Vec::with_capacity(doc.len());
            for &word_id in doc {
                let topic = rng.gen_range(0..num_topics);
                word_topic_counts[word_id][topic] += 1;
                doc_topic_counts[doc_id][topic] += 1;
                topic_counts[topic] += 1;
                word_topics.push(topic);
            }
            doc_word_topics.push(word_topics);
        }

        let mut weights = vec![0.0f64; num_topics];
        for iteration in 0..iterations {
            for (doc_id, doc) in word_docs.iter().enumerate() {
                for (word_pos, &word_id) in doc.iter().enumerate() {
                    let old_topic = doc_word_topics[doc_id][word_pos];

                    word_topic_counts[word_id][old_topic] -= 1;
                    doc_topic_counts[doc_id][old_topic] -= 1;
                    topic_counts[old_topic] -= 1;

                    let new_topic = self.sample_topic(
                        &mut rng,
                        &mut weights,
                        word_id,
                        &doc_topic_counts[doc_id],
                        &word_topic_counts,
                        &topic_counts,
                        vocab_beta,
                    )?;

                    word_topic_counts[word_id][new_topic] += 1;
                    doc_topic_counts[doc_id][new_topic] += 1;
                    topic_counts[new_topic] += 1;
                    doc_word_topics[doc_id][word_pos] = new_topic;
                }
            }

            if (iteration + 1) % 500 == 0 {
                trace!(
                    k = num_topics,
                    iteration = iteration + 1,
                    iterations,
                    "Gibbs sweep"
                );
            }
        }

        let log_likelihood =
            self.log_likelihood(&word_topic_counts, &doc_topic_counts, &topic_counts);
        if !log_likelihood.is_finite() {
            return Err(Self::failure(
                num_topics,
                format!("log-likelihood is not finite ({})", log_likelihood),
            ));
        }

        Ok(FittedTopics {
            doc_topic: self.normalize_doc_topic_matrix(&doc_topic_counts),
            topic_word: self.normalize_topic_word_matrix(&word_topic_counts, &topic_counts),
            log_likelihood,
        })
    }

    /// Iterates each token's topic responsibilities against the fitted
    /// topic-word weights until they settle, then averages them.
    fn transform(&self, fitted: &FittedTopics, row: &[(usize, usize)]) -> Vec<f64> {
        let num_topics = fitted.n_topics();
        let vocab_size = fitted.topic_word.first().map_or(0, |w| w.len());
        let tokens: Vec<usize> = Self::expand_tokens(row)
            .into_iter()
            .filter(|&word_id| word_id < vocab_size)
            .collect();
        if tokens.is_empty() {
            return vec![1.0 / num_topics as f64; num_topics];
        }

        let mut responsibilities = vec![vec![0.0f64; num_topics]; tokens.len()];
        let mut totals = vec![0.0f64; num_topics];
        for _ in 0..=self.config.transform_iterations {
            let mut next = Vec::with_capacity(tokens.len());
            let mut delta = 0.0;
            for (pos, &word_id) in tokens.iter().enumerate() {
                let mut weights: Vec<f64> = (0..num_topics)
                    .map(|topic| {
                        fitted.topic_word[topic][word_id]
                            * (totals[topic] - responsibilities[pos][topic] + self.config.alpha)
                    })
                    .collect();
                let sum: f64 = weights.iter().sum();
                if sum > 0.0 {
                    weights.iter_mut().for_each(|w| *w /= sum);
                } else {
                    weights.iter_mut().for_each(|w| *w = 1.0 / num_topics as f64);
                }
                delta += weights
                    .iter()
                    .zip(&responsibilities[pos])
                    .map(|(new, old)| (new - old).abs())
                    .sum::<f64>();
                next.push(weights);
            }
            responsibilities = next;
            totals = (0..num_topics)
                .map(|topic| responsibilities.iter().map(|r| r[topic]).sum())
                .collect();
            if delta < self.config.transform_tolerance {
                break;
            }
        }

        let total: f64 = totals.iter().sum();
        totals.iter().map(|t| t / total).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_group_matrix() -> DocumentTermMatrix {
        // Terms 0-2 belong to the first group, 3-5 to the second.
        DocumentTermMatrix::from_rows(
            vec![
                vec![(0, 3), (1, 2), (2, 2)],
                vec![(0, 2), (1, 3), (2, 1)],
                vec![(0, 2), (2, 3)],
                vec![(3, 3), (4, 2), (5, 2)],
                vec![(3, 2), (4, 3), (5, 1)],
                vec![(4, 2), (5, 3)],
            ],
            6,
        )
    }

    fn assert_simplex(rows: &[Vec<f64>]) {
        for row in rows {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "row sums to {}", sum);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[f64::NAN, 0.3]), 1);
    }

    #[test]
    fn test_fit_produces_simplex_rows() {
        let sampler = GibbsSampler::default();
        let fitted = sampler.fit(&two_group_matrix(), 3, 1, 200).unwrap();
        assert_eq!(fitted.n_topics(), 3);
        assert_eq!(fitted.n_docs(), 6);
        assert!(fitted.check_shape(6).is_ok());
        assert!(fitted.check_simplices().is_ok());
        assert_simplex(&fitted.doc_topic);
        assert_simplex(&fitted.topic_word);
        assert!(fitted.log_likelihood.is_finite());
        assert!(fitted.log_likelihood < 0.0);
    }

    #[test]
    fn test_summaries_list_top_words_per_topic() {
        let fitted = FittedTopics {
            doc_topic: vec![vec![1.0, 0.0]],
            topic_word: vec![vec![0.2, 0.5, 0.3], vec![0.6, 0.1, 0.3]],
            log_likelihood: -1.0,
        };
        let vocabulary = ["ale", "bread", "cider"].map(String::from);
        let summaries = summarize_topics(&fitted, &vocabulary, 2);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].to_string(), "Topic: 0: bread | cider");
        assert_eq!(summaries[1].words, vec![("ale".to_string(), 0.6), ("cider".to_string(), 0.3)]);
    }

    #[test]
    fn test_rows_off_the_simplex_are_reported() {
        let mut fitted = FittedTopics {
            doc_topic: vec![vec![0.5, 0.5], vec![0.9, 0.3]],
            topic_word: vec![vec![1.0], vec![1.0]],
            log_likelihood: -1.0,
        };
        let err = fitted.check_simplices().unwrap_err();
        assert!(err.starts_with("doc_topic row 1"), "{}", err);

        fitted.doc_topic[1] = vec![0.4, 0.6 + 1e-9];
        assert!(fitted.check_simplices().is_ok());

        fitted.topic_word[0] = vec![f64::NAN];
        assert!(fitted.check_simplices().unwrap_err().starts_with("topic_word row 0"));
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let sampler = GibbsSampler::default();
        let a = sampler.fit(&two_group_matrix(), 2, 7, 100).unwrap();
        let b = sampler.fit(&two_group_matrix(), 2, 7, 100).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_separates_disjoint_groups() {
        let sampler = GibbsSampler::default();
        let fitted = sampler.fit(&two_group_matrix(), 2, 1, 500).unwrap();
        let first = argmax(&fitted.doc_topic[0]);
        let second = argmax(&fitted.doc_topic[3]);
        assert_ne!(first, second);
        for doc in 0..3 {
            assert_eq!(argmax(&fitted.doc_topic[doc]), first);
        }
        for doc in 3..6 {
            assert_eq!(argmax(&fitted.doc_topic[doc]), second);
        }
    }

    #[test]
    fn test_fit_failures() {
        let sampler = GibbsSampler::default();
        assert!(matches!(
            sampler.fit(&two_group_matrix(), 0, 1, 10),
            Err(TopicError::Inference { k: 0, .. })
        ));

        let empty = DocumentTermMatrix::from_rows(vec![vec![], vec![]], 3);
        assert!(matches!(
            sampler.fit(&empty, 2, 1, 10),
            Err(TopicError::Inference { k: 2, .. })
        ));

        let no_terms = DocumentTermMatrix::from_rows(vec![vec![]], 0);
        assert!(sampler.fit(&no_terms, 2, 1, 10).is_err());
    }

    #[test]
    fn test_transform_follows_topic_words() {
        let fitted = FittedTopics {
            doc_topic: vec![],
            topic_word: vec![vec![0.45, 0.45, 0.05, 0.05], vec![0.05, 0.05, 0.45, 0.45]],
            log_likelihood: -1.0,
        };
        let sampler = GibbsSampler::default();

        let theta = sampler.transform(&fitted, &[(2, 2), (3, 1)]);
        assert_eq!(theta.len(), 2);
        assert!((theta.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(argmax(&theta), 1);

        let theta = sampler.transform(&fitted, &[(0, 4)]);
        assert_eq!(argmax(&theta), 0);
    }

    #[test]
    fn test_transform_without_known_tokens_is_uniform() {
        let fitted = FittedTopics {
            doc_topic: vec![],
            topic_word: vec![vec![0.5, 0.5], vec![0.5, 0.5], vec![0.5, 0.5], vec![0.5, 0.5]],
            log_likelihood: -1.0,
        };
        let theta = GibbsSampler::default().transform(&fitted, &[]);
        assert_eq!(theta, vec![0.25; 4]);
    }

    #[test]
    fn test_top_term_indices_orders_by_weight_then_index() {
        let fitted = FittedTopics {
            doc_topic: vec![],
            topic_word: vec![vec![0.1, 0.3, 0.2, 0.3, 0.1]],
            log_likelihood: 0.0,
        };
        assert_eq!(fitted.top_term_indices(0, 3), vec![1, 3, 2]);
        assert_eq!(fitted.top_term_indices(0, 10), vec![1, 3, 2, 0, 4]);
    }
}
