//! Topic discovery and clustering for short documents such as comment threads.
//!
//! Documents are vectorized into term counts, an LDA model is fitted (searching
//! a range of topic counts when none is given), and each document is assigned
//! to its most probable topic.
//!
//! ```no_run
//! use topic_clusters::{ModelConfig, TopicModel};
//!
//! let comments = vec!["first comment".to_string(), "second comment".to_string()];
//! let model = TopicModel::new(ModelConfig::default())?;
//! for (topic, members) in model.cluster(&comments)?.iter().enumerate() {
//!     println!("{}: {:?} {}", topic, model.top_words(topic, 5)?, members.len());
//! }
//! # Ok::<(), topic_clusters::TopicError>(())
//! ```

pub mod config;
pub mod corpus;
pub mod document;
pub mod error;
pub mod evaluate;
pub mod inference;
pub mod model;
pub mod selection;
pub mod tokenizer;
pub mod vectorizer;

pub use config::{ModelConfig, SamplerConfig, SelectionConfig, StopWords, VectorizerConfig};
pub use document::{Comment, Document};
pub use error::{Result, TopicError};
pub use inference::{FittedTopics, GibbsSampler, InferenceEngine, TopicSummary};
pub use model::{Label, Snapshot, TopicModel};
pub use selection::{CandidateRange, CandidateScore, ModelSelector, Selection};
pub use tokenizer::{RegexTokenizer, Tokenizer};
pub use vectorizer::{CountVectorizer, DocumentTermMatrix};
