//! Error types for vectorizing, fitting and querying topic models.

use thiserror::Error;

/// Errors that can occur while building or querying a topic model.
#[derive(Debug, Error)]
pub enum TopicError {
    /// Invalid candidate range, vectorizer settings or topic count
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// `transform` called on a vectorizer that was never fitted
    #[error("Vectorizer has not been fitted")]
    NotFitted,

    /// Query made before any successful `train`
    #[error("Topic model has not been trained")]
    UntrainedModel,

    /// The inference engine failed for one topic count
    #[error("Inference failed for {k} topics: {reason}")]
    Inference { k: usize, reason: String },

    /// Every candidate topic count failed
    #[error("No viable model: all {attempted} candidate topic counts failed")]
    NoViableModel { attempted: usize },

    #[error("Topic {topic} out of range for a model with {n_topics} topics")]
    TopicOutOfRange { topic: usize, n_topics: usize },

    /// `cluster` received a corpus that is not the training corpus
    #[error("Corpus has {actual} documents but the model was trained on {expected}")]
    CorpusMismatch { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mbox error: {0}")]
    Mbox(String),
}

pub type Result<T> = std::result::Result<T, TopicError>;
