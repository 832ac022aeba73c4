//! The fitted topic model: training, labeling, clustering and topic summaries.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ModelConfig, VectorizerConfig};
use crate::document::Document;
use crate::error::{Result, TopicError};
use crate::inference::{argmax, summarize_topics, FittedTopics, GibbsSampler, InferenceEngine, TopicSummary};
use crate::selection::{check_fit, ModelSelector, SUMMARY_WORDS};
use crate::tokenizer::{RegexTokenizer, Tokenizer};
use crate::vectorizer::CountVectorizer;

/// A document paired with its most likely topic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Label<'a, D> {
    pub document: &'a D,
    pub topic: usize,
    pub probability: f64,
}

/// Immutable result of one successful `train`.
#[derive(Debug)]
pub struct Snapshot {
    vectorizer: CountVectorizer,
    fitted: FittedTopics,
    trained_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn n_topics(&self) -> usize {
        self.fitted.n_topics()
    }

    pub fn vocabulary(&self) -> &[String] {
        self.vectorizer.vocabulary()
    }

    pub fn fitted(&self) -> &FittedTopics {
        &self.fitted
    }

    pub fn log_likelihood(&self) -> f64 {
        self.fitted.log_likelihood
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }
}

/// On-disk form of a trained model.
#[derive(Debug, Serialize, Deserialize)]
struct SavedModel {
    vectorizer: VectorizerConfig,
    vocabulary: Vec<String>,
    n_topics: usize,
    fitted: FittedTopics,
    trained_at: DateTime<Utc>,
}

/// LDA topic model over a corpus of short documents.
///
/// Starts untrained. Each successful `train` publishes a new [`Snapshot`];
/// queries work on the snapshot current when they start, so a concurrent
/// retrain never shows them a half-updated model.
pub struct TopicModel<E: InferenceEngine = GibbsSampler> {
    config: ModelConfig,
    engine: E,
    tokenizer: Arc<dyn Tokenizer>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl TopicModel<GibbsSampler> {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let engine = GibbsSampler::new(config.sampler.clone());
        Self::with_engine(config, engine)
    }

    /// Load a model written by [`TopicModel::save`]. The saved vectorizer
    /// settings replace those in `config`.
    pub fn load(path: impl AsRef<Path>, config: ModelConfig) -> Result<Self> {
        let engine = GibbsSampler::new(config.sampler.clone());
        Self::load_with_engine(path, config, engine)
    }
}

impl<E: InferenceEngine> TopicModel<E> {
    pub fn with_engine(config: ModelConfig, engine: E) -> Result<Self> {
        config.validate()?;
        Ok(TopicModel {
            config,
            engine,
            tokenizer: Arc::new(RegexTokenizer::default()),
            snapshot: RwLock::new(None),
        })
    }

    pub fn load_with_engine(path: impl AsRef<Path>, mut config: ModelConfig, engine: E) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let saved: SavedModel = serde_json::from_reader(reader)?;

        if saved.fitted.n_topics() != saved.n_topics {
            return Err(TopicError::Configuration(format!(
                "saved model declares {} topics but stores {}",
                saved.n_topics,
                saved.fitted.n_topics()
            )));
        }
        saved
            .fitted
            .check_shape(saved.vocabulary.len())
            .and_then(|()| saved.fitted.check_simplices())
            .map_err(TopicError::Configuration)?;

        config.vectorizer = saved.vectorizer.clone();
        let model = Self::with_engine(config, engine)?;
        let vectorizer = CountVectorizer::with_vocabulary(
            saved.vectorizer,
            Arc::clone(&model.tokenizer),
            saved.vocabulary,
        )?;
        *model.snapshot.write() = Some(Arc::new(Snapshot {
            vectorizer,
            fitted: saved.fitted,
            trained_at: saved.trained_at,
        }));
        info!(path = %path.as_ref().display(), n_topics = saved.n_topics, "Loaded topic model");
        Ok(model)
    }

    /// Use `tokenizer` for every later `train`.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// The current snapshot, if trained.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().clone()
    }

    pub fn n_topics(&self) -> Option<usize> {
        self.snapshot().map(|s| s.n_topics())
    }

    pub fn log_likelihood(&self) -> Option<f64> {
        self.snapshot().map(|s| s.log_likelihood())
    }

    fn current(&self) -> Result<Arc<Snapshot>> {
        self.snapshot().ok_or(TopicError::UntrainedModel)
    }

    /// Fit a fresh vocabulary and topic model to `documents`, replacing any
    /// previous one. Searches the candidate range unless `n_topics` is fixed.
    /// On error the previous model stays in place.
    pub fn train<D: Document>(&self, documents: &[D]) -> Result<Arc<Snapshot>> {
        let mut vectorizer =
            CountVectorizer::with_tokenizer(self.config.vectorizer.clone(), Arc::clone(&self.tokenizer))?;
        let dtm = vectorizer.fit_transform(documents)?;
        let selection = &self.config.selection;

        let fitted = match self.config.n_topics {
            Some(k) => {
                let fitted = self.engine.fit(&dtm, k, selection.seed, selection.iterations)?;
                check_fit(k, &dtm, &fitted)?;
                if self.config.verbose {
                    for summary in summarize_topics(&fitted, vectorizer.vocabulary(), SUMMARY_WORDS) {
                        info!(k, "{}", summary);
                    }
                }
                fitted
            }
            None => {
                let mut selector = ModelSelector::new(&self.engine, selection)?;
                if self.config.verbose {
                    selector = selector.verbose(vectorizer.vocabulary());
                }
                selector.select(&dtm)?.fitted
            }
        };

        let snapshot = Arc::new(Snapshot {
            vectorizer,
            fitted,
            trained_at: Utc::now(),
        });
        *self.snapshot.write() = Some(Arc::clone(&snapshot));

        info!(
            documents = documents.len(),
            vocabulary = snapshot.vocabulary().len(),
            n_topics = snapshot.n_topics(),
            log_likelihood = snapshot.log_likelihood(),
            "Trained topic model"
        );
        Ok(snapshot)
    }

    /// Label each document with its most probable topic under the trained
    /// model. Documents are vectorized and transformed lazily, one per item.
    pub fn identify<'a, D: Document>(
        &'a self,
        documents: &'a [D],
    ) -> Result<impl Iterator<Item = Label<'a, D>> + 'a> {
        let snapshot = self.current()?;
        Ok(documents.iter().map(move |document| {
            // Snapshot vectorizers are always fitted.
            let row = snapshot
                .vectorizer
                .transform_one(document.body())
                .unwrap_or_default();
            let distribution = self.engine.transform(&snapshot.fitted, &row);
            let topic = argmax(&distribution);
            Label {
                document,
                topic,
                probability: distribution.get(topic).copied().unwrap_or(0.0),
            }
        }))
    }

    /// Most probable topic of each training document at training time.
    pub fn assignments(&self) -> Result<Vec<usize>> {
        let snapshot = self.current()?;
        Ok(snapshot.fitted.doc_topic.iter().map(|row| argmax(row)).collect())
    }

    /// Group the training documents by their most probable topic at training
    /// time. Trains on `documents` first if the model is untrained.
    ///
    /// Returns one group per topic in topic order; groups may be empty.
    pub fn cluster<'a, D: Document>(&self, documents: &'a [D]) -> Result<Vec<Vec<&'a D>>> {
        if !self.is_trained() {
            debug!(documents = documents.len(), "Model untrained, training on cluster corpus");
            self.train(documents)?;
        }
        let snapshot = self.current()?;
        let n_docs = snapshot.fitted.n_docs();
        if documents.len() != n_docs {
            return Err(TopicError::CorpusMismatch {
                expected: n_docs,
                actual: documents.len(),
            });
        }

        let mut clusters: Vec<Vec<&'a D>> = vec![Vec::new(); snapshot.n_topics()];
        for (document, row) in documents.iter().zip(&snapshot.fitted.doc_topic) {
            clusters[argmax(row)].push(document);
        }
        Ok(clusters)
    }

    /// The `n` most probable terms of `topic`, most probable first.
    pub fn top_words(&self, topic: usize, n: usize) -> Result<Vec<String>> {
        let snapshot = self.current()?;
        if topic >= snapshot.n_topics() {
            return Err(TopicError::TopicOutOfRange {
                topic,
                n_topics: snapshot.n_topics(),
            });
        }
        let vocabulary = snapshot.vocabulary();
        Ok(snapshot
            .fitted
            .top_term_indices(topic, n)
            .into_iter()
            .map(|term| vocabulary[term].clone())
            .collect())
    }

    pub fn topic_summaries(&self, n: usize) -> Result<Vec<TopicSummary>> {
        let snapshot = self.current()?;
        Ok(summarize_topics(&snapshot.fitted, snapshot.vocabulary(), n))
    }

    /// Write the trained model as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.current()?;
        let saved = SavedModel {
            vectorizer: snapshot.vectorizer.config().clone(),
            vocabulary: snapshot.vocabulary().to_vec(),
            n_topics: snapshot.n_topics(),
            fitted: snapshot.fitted.clone(),
            trained_at: snapshot.trained_at,
        };
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(writer, &saved)?;
        info!(path = %path.as_ref().display(), "Saved topic model");
        Ok(())
    }
}
