//! Choosing a topic count by log-likelihood over a candidate range.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::SelectionConfig;
use crate::error::{Result, TopicError};
use crate::inference::{summarize_topics, FittedTopics, InferenceEngine};
use crate::vectorizer::DocumentTermMatrix;

/// Top words per topic in verbose diagnostics.
pub(crate) const SUMMARY_WORDS: usize = 8;

/// Finite, strictly ascending, non-empty list of positive topic counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRange {
    values: Vec<usize>,
}

impl CandidateRange {
    /// `start, start + step, ...` below `end`.
    pub fn new(start: usize, end: usize, step: usize) -> Result<Self> {
        if start == 0 || step == 0 || end <= start {
            return Err(TopicError::Configuration(format!(
                "invalid topic range start={} end={} step={}",
                start, end, step
            )));
        }
        Ok(CandidateRange {
            values: (start..end).step_by(step).collect(),
        })
    }

    pub fn from_list(values: Vec<usize>) -> Result<Self> {
        if values.is_empty() {
            return Err(TopicError::Configuration(
                "topic candidate list is empty".to_string(),
            ));
        }
        if values.contains(&0) {
            return Err(TopicError::Configuration(
                "topic candidates must be positive".to_string(),
            ));
        }
        if values.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(TopicError::Configuration(format!(
                "topic candidates must be strictly ascending: {:?}",
                values
            )));
        }
        Ok(CandidateRange { values })
    }

    pub fn from_config(config: &SelectionConfig) -> Result<Self> {
        match &config.candidates {
            Some(values) => Self::from_list(values.clone()),
            None => Self::new(config.range_start, config.range_end, config.range_step),
        }
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for CandidateRange {
    fn default() -> Self {
        CandidateRange {
            values: (5..20).step_by(2).collect(),
        }
    }
}

/// Outcome of one candidate. `None` when the fit failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub k: usize,
    pub log_likelihood: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub k: usize,
    pub fitted: FittedTopics,
    /// Every candidate in ascending order
    pub scores: Vec<CandidateScore>,
}

/// Fits every candidate topic count and keeps the one with the greatest
/// log-likelihood. Exact ties go to the smaller count.
pub struct ModelSelector<'a> {
    engine: &'a dyn InferenceEngine,
    candidates: CandidateRange,
    seed: u64,
    iterations: usize,
    parallel: bool,
    progress: bool,
    vocabulary: Option<&'a [String]>,
}

impl<'a> ModelSelector<'a> {
    pub fn new(engine: &'a dyn InferenceEngine, config: &SelectionConfig) -> Result<Self> {
        Ok(ModelSelector {
            engine,
            candidates: CandidateRange::from_config(config)?,
            seed: config.seed,
            iterations: config.iterations,
            parallel: config.parallel,
            progress: config.progress,
            vocabulary: None,
        })
    }

    pub fn with_candidates(mut self, candidates: CandidateRange) -> Self {
        self.candidates = candidates;
        self
    }

    /// Log each candidate's top words against `vocabulary`.
    pub fn verbose(mut self, vocabulary: &'a [String]) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn select(&self, dtm: &DocumentTermMatrix) -> Result<Selection> {
        let pb = if self.progress {
            let pb = ProgressBar::new(self.candidates.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  LDA [{bar:30}] {pos}/{len} topic counts ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let run = |&k: &usize| {
            let outcome = self.fit_candidate(dtm, k);
            pb.inc(1);
            (k, outcome)
        };
        let outcomes: Vec<(usize, Result<FittedTopics>)> = if self.parallel {
            self.candidates.as_slice().par_iter().map(run).collect()
        } else {
            self.candidates.as_slice().iter().map(run).collect()
        };
        pb.finish_and_clear();

        let mut best: Option<(usize, FittedTopics)> = None;
        let mut scores = Vec::with_capacity(outcomes.len());
        for (k, outcome) in outcomes {
            match outcome {
                Ok(fitted) => {
                    scores.push(CandidateScore {
                        k,
                        log_likelihood: Some(fitted.log_likelihood),
                    });
                    let improves = best
                        .as_ref()
                        .map_or(true, |(_, current)| fitted.log_likelihood > current.log_likelihood);
                    if improves {
                        best = Some((k, fitted));
                    }
                }
                Err(e) => {
                    warn!(k, error = %e, "Candidate topic count failed, excluding it");
                    scores.push(CandidateScore {
                        k,
                        log_likelihood: None,
                    });
                }
            }
        }

        let (k, fitted) = best.ok_or(TopicError::NoViableModel {
            attempted: self.candidates.len(),
        })?;
        info!(
            n_topics = k,
            log_likelihood = fitted.log_likelihood,
            "Selected n_topics={}",
            k
        );

        Ok(Selection { k, fitted, scores })
    }

    fn fit_candidate(&self, dtm: &DocumentTermMatrix, k: usize) -> Result<FittedTopics> {
        let fitted = self.engine.fit(dtm, k, self.seed, self.iterations)?;
        check_fit(k, dtm, &fitted)?;
        if let Some(vocabulary) = self.vocabulary {
            for summary in summarize_topics(&fitted, vocabulary, SUMMARY_WORDS) {
                info!(k, "{}", summary);
            }
        }
        Ok(fitted)
    }
}

/// Reject engine output that breaks the shape or score contract for `k` topics.
pub(crate) fn check_fit(k: usize, dtm: &DocumentTermMatrix, fitted: &FittedTopics) -> Result<()> {
    if !fitted.log_likelihood.is_finite() {
        return Err(TopicError::Inference {
            k,
            reason: format!("log-likelihood is not finite ({})", fitted.log_likelihood),
        });
    }
    if fitted.n_topics() != k || fitted.n_docs() != dtm.n_docs() {
        return Err(TopicError::Inference {
            k,
            reason: format!(
                "engine returned {} topics for {} documents",
                fitted.n_topics(),
                fitted.n_docs()
            ),
        });
    }
    fitted
        .check_shape(dtm.n_terms())
        .and_then(|()| fitted.check_simplices())
        .map_err(|reason| TopicError::Inference { k, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Returns canned log-likelihoods per topic count; `None` fails the fit.
    struct ScriptedEngine {
        scores: HashMap<usize, Option<f64>>,
    }

    impl ScriptedEngine {
        fn new(scores: &[(usize, Option<f64>)]) -> Self {
            ScriptedEngine {
                scores: scores.iter().cloned().collect(),
            }
        }
    }

    impl InferenceEngine for ScriptedEngine {
        fn fit(
            &self,
            dtm: &DocumentTermMatrix,
            k: usize,
            _seed: u64,
            _iterations: usize,
        ) -> Result<FittedTopics> {
            match self.scores.get(&k).copied().flatten() {
                Some(log_likelihood) => Ok(FittedTopics {
                    doc_topic: vec![vec![1.0 / k as f64; k]; dtm.n_docs()],
                    topic_word: vec![vec![1.0 / dtm.n_terms() as f64; dtm.n_terms()]; k],
                    log_likelihood,
                }),
                None => Err(TopicError::Inference {
                    k,
                    reason: "did not converge".to_string(),
                }),
            }
        }

        fn transform(&self, fitted: &FittedTopics, _row: &[(usize, usize)]) -> Vec<f64> {
            vec![1.0 / fitted.n_topics() as f64; fitted.n_topics()]
        }
    }

    fn matrix() -> DocumentTermMatrix {
        DocumentTermMatrix::from_rows(vec![vec![(0, 1), (1, 2)], vec![(1, 1)]], 2)
    }

    fn config_for(candidates: &[usize]) -> SelectionConfig {
        SelectionConfig {
            candidates: Some(candidates.to_vec()),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_range() {
        let range = CandidateRange::default();
        assert_eq!(range.as_slice(), [5, 7, 9, 11, 13, 15, 17, 19]);
        assert_eq!(
            CandidateRange::from_config(&SelectionConfig::default()).unwrap(),
            range
        );
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(CandidateRange::new(0, 10, 1).is_err());
        assert!(CandidateRange::new(5, 5, 1).is_err());
        assert!(CandidateRange::new(5, 20, 0).is_err());
        assert!(CandidateRange::from_list(vec![]).is_err());
        assert!(CandidateRange::from_list(vec![3, 0]).is_err());
        assert!(CandidateRange::from_list(vec![4, 4]).is_err());
        assert!(CandidateRange::from_list(vec![6, 3]).is_err());
        assert_eq!(CandidateRange::from_list(vec![2]).unwrap().len(), 1);
    }

    #[test]
    fn test_picks_highest_log_likelihood() {
        let engine = ScriptedEngine::new(&[(2, Some(-50.0)), (3, Some(-20.0)), (4, Some(-30.0))]);
        let selection = ModelSelector::new(&engine, &config_for(&[2, 3, 4]))
            .unwrap()
            .select(&matrix())
            .unwrap();
        assert_eq!(selection.k, 3);
        assert_eq!(selection.fitted.log_likelihood, -20.0);
        assert_eq!(selection.fitted.n_topics(), 3);
        assert_eq!(selection.scores.len(), 3);
    }

    #[test]
    fn test_tie_goes_to_smaller_topic_count() {
        let engine = ScriptedEngine::new(&[(2, Some(-40.0)), (5, Some(-10.0)), (7, Some(-10.0))]);
        let selection = ModelSelector::new(&engine, &config_for(&[2, 5, 7]))
            .unwrap()
            .select(&matrix())
            .unwrap();
        assert_eq!(selection.k, 5);
    }

    #[test]
    fn test_failed_candidates_are_excluded() {
        let engine = ScriptedEngine::new(&[(2, Some(-40.0)), (3, None), (4, Some(f64::NAN))]);
        let selection = ModelSelector::new(&engine, &config_for(&[2, 3, 4]))
            .unwrap()
            .select(&matrix())
            .unwrap();
        assert_eq!(selection.k, 2);
        assert_eq!(
            selection.scores,
            vec![
                CandidateScore { k: 2, log_likelihood: Some(-40.0) },
                CandidateScore { k: 3, log_likelihood: None },
                CandidateScore { k: 4, log_likelihood: None },
            ]
        );
    }

    #[test]
    fn test_all_candidates_failing() {
        let engine = ScriptedEngine::new(&[]);
        let result = ModelSelector::new(&engine, &config_for(&[2, 3]))
            .unwrap()
            .select(&matrix());
        assert!(matches!(result, Err(TopicError::NoViableModel { attempted: 2 })));
    }

    #[test]
    fn test_parallel_search_matches_sequential() {
        let engine = ScriptedEngine::new(&[
            (2, Some(-9.0)),
            (3, Some(-4.0)),
            (4, Some(-4.0)),
            (5, Some(-7.0)),
        ]);
        let mut config = config_for(&[2, 3, 4, 5]);
        let sequential = ModelSelector::new(&engine, &config).unwrap().select(&matrix()).unwrap();
        config.parallel = true;
        let parallel = ModelSelector::new(&engine, &config).unwrap().select(&matrix()).unwrap();
        assert_eq!(sequential.k, 3);
        assert_eq!(parallel.k, sequential.k);
        assert_eq!(parallel.scores, sequential.scores);
    }
}
