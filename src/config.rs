//! Model configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopicError};

/// Master configuration for a topic model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Fixed topic count. `None` searches the candidate range on every train.
    #[serde(default)]
    pub n_topics: Option<usize>,

    /// Log per-topic top words after each fit
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub vectorizer: VectorizerConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub selection: SelectionConfig,
}

impl ModelConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: ModelConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_topics(mut self, n_topics: usize) -> Self {
        self.n_topics = Some(n_topics);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_topics == Some(0) {
            return Err(TopicError::Configuration(
                "n_topics must be positive".to_string(),
            ));
        }
        self.vectorizer.validate()?;
        self.sampler.validate()?;
        self.selection.validate()
    }
}

/// Which stop word list to filter out of the vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopWords {
    #[default]
    English,
    None,
    List(Vec<String>),
}

/// Vocabulary construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizerConfig {
    #[serde(default)]
    pub stop_words: StopWords,

    /// Filtered in addition to `stop_words`
    #[serde(default)]
    pub extra_stop_words: Vec<String>,

    /// Inclusive (min, max) n-gram lengths
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),

    /// Minimum number of documents a term must appear in
    #[serde(default = "default_min_df")]
    pub min_df: usize,

    /// Keep only the most frequent terms across the corpus
    #[serde(default)]
    pub max_features: Option<usize>,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            stop_words: StopWords::default(),
            extra_stop_words: Vec::new(),
            ngram_range: default_ngram_range(),
            min_df: default_min_df(),
            max_features: None,
        }
    }
}

impl VectorizerConfig {
    pub fn validate(&self) -> Result<()> {
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || max_n < min_n {
            return Err(TopicError::Configuration(format!(
                "invalid ngram_range ({}, {})",
                min_n, max_n
            )));
        }
        if self.min_df == 0 {
            return Err(TopicError::Configuration(
                "min_df must be at least 1".to_string(),
            ));
        }
        if self.max_features == Some(0) {
            return Err(TopicError::Configuration(
                "max_features must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}
fn default_min_df() -> usize {
    1
}

/// Dirichlet priors and transform settings for the Gibbs sampler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Document-topic concentration
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Topic-word concentration
    #[serde(default = "default_beta")]
    pub beta: f64,

    /// Fixed-point iterations when labeling unseen documents
    #[serde(default = "default_transform_iterations")]
    pub transform_iterations: usize,

    #[serde(default = "default_transform_tolerance")]
    pub transform_tolerance: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            beta: default_beta(),
            transform_iterations: default_transform_iterations(),
            transform_tolerance: default_transform_tolerance(),
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.alpha.is_nan() || self.beta.is_nan() || self.alpha <= 0.0 || self.beta <= 0.0 {
            return Err(TopicError::Configuration(format!(
                "priors must be positive (alpha={}, beta={})",
                self.alpha, self.beta
            )));
        }
        Ok(())
    }
}

fn default_alpha() -> f64 {
    0.1
}
fn default_beta() -> f64 {
    0.01
}
fn default_transform_iterations() -> usize {
    20
}
fn default_transform_tolerance() -> f64 {
    1e-16
}

/// Topic count search settings. `seed` and `iterations` also apply to a
/// direct fit at a fixed topic count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// First candidate topic count
    #[serde(default = "default_range_start")]
    pub range_start: usize,

    /// Exclusive upper bound of the candidate range
    #[serde(default = "default_range_end")]
    pub range_end: usize,

    #[serde(default = "default_range_step")]
    pub range_step: usize,

    /// Explicit candidates, used instead of start/end/step when set
    #[serde(default)]
    pub candidates: Option<Vec<usize>>,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Gibbs sweeps per fit
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Fit candidates on the rayon thread pool
    #[serde(default)]
    pub parallel: bool,

    /// Draw a terminal progress bar during the search
    #[serde(default)]
    pub progress: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            range_start: default_range_start(),
            range_end: default_range_end(),
            range_step: default_range_step(),
            candidates: None,
            seed: default_seed(),
            iterations: default_iterations(),
            parallel: false,
            progress: false,
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(TopicError::Configuration(
                "iterations must be positive".to_string(),
            ));
        }
        crate::selection::CandidateRange::from_config(self).map(|_| ())
    }
}

fn default_range_start() -> usize {
    5
}
fn default_range_end() -> usize {
    20
}
fn default_range_step() -> usize {
    2
}
fn default_seed() -> u64 {
    1
}
fn default_iterations() -> usize {
    2000
}
