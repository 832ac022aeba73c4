//! Bag-of-words vectorization over a fixed vocabulary.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use counter::Counter;
use tracing::debug;

use crate::config::{StopWords, VectorizerConfig};
use crate::document::Document;
use crate::error::{Result, TopicError};
use crate::tokenizer::{RegexTokenizer, Tokenizer};

/// `(term index, count)` pairs for one document, ascending by term index.
pub type SparseRow = Vec<(usize, usize)>;

/// Sparse document-term counts. Rows follow input document order and columns
/// follow the vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTermMatrix {
    rows: Vec<SparseRow>,
    n_terms: usize,
}

impl DocumentTermMatrix {
    /// Build a matrix from raw rows. Zero counts are dropped and each row is
    /// sorted by term index.
    pub fn from_rows(rows: Vec<SparseRow>, n_terms: usize) -> Self {
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.retain(|&(_, count)| count > 0);
                row.sort_unstable_by_key(|&(term, _)| term);
                row
            })
            .collect();
        DocumentTermMatrix { rows, n_terms }
    }

    pub fn n_docs(&self) -> usize {
        self.rows.len()
    }

    pub fn n_terms(&self) -> usize {
        self.n_terms
    }

    pub fn row(&self, doc: usize) -> &[(usize, usize)] {
        &self.rows[doc]
    }

    pub fn rows(&self) -> &[SparseRow] {
        &self.rows
    }

    /// Count of term `term` in document `doc`.
    pub fn get(&self, doc: usize, term: usize) -> usize {
        self.rows[doc]
            .binary_search_by_key(&term, |&(t, _)| t)
            .map(|i| self.rows[doc][i].1)
            .unwrap_or(0)
    }

    /// Total number of tokens in the corpus.
    pub fn total_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter().map(|&(_, count)| count))
            .sum()
    }
}

#[derive(Debug, Clone)]
struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
}

/// Counts terms over a vocabulary learned by `fit_transform`.
#[derive(Clone)]
pub struct CountVectorizer {
    config: VectorizerConfig,
    tokenizer: Arc<dyn Tokenizer>,
    stop_words: HashSet<String>,
    vocabulary: Option<Vocabulary>,
}

impl std::fmt::Debug for CountVectorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountVectorizer")
            .field("config", &self.config)
            .field("vocabulary_size", &self.len())
            .finish()
    }
}

impl CountVectorizer {
    pub fn new(config: VectorizerConfig) -> Result<Self> {
        Self::with_tokenizer(config, Arc::new(RegexTokenizer::default()))
    }

    pub fn with_tokenizer(config: VectorizerConfig, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        config.validate()?;

        let mut stop_words: HashSet<String> = match &config.stop_words {
            StopWords::English => stop_words::get(stop_words::LANGUAGE::English)
                .into_iter()
                .collect(),
            StopWords::None => HashSet::new(),
            StopWords::List(words) => words.iter().map(|w| w.to_lowercase()).collect(),
        };
        stop_words.extend(config.extra_stop_words.iter().map(|w| w.to_lowercase()));

        Ok(CountVectorizer {
            config,
            tokenizer,
            stop_words,
            vocabulary: None,
        })
    }

    /// Rebuild a fitted vectorizer from a saved vocabulary.
    pub(crate) fn with_vocabulary(
        config: VectorizerConfig,
        tokenizer: Arc<dyn Tokenizer>,
        terms: Vec<String>,
    ) -> Result<Self> {
        let mut vectorizer = Self::with_tokenizer(config, tokenizer)?;
        vectorizer.vocabulary = Some(Vocabulary::new(terms));
        Ok(vectorizer)
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.vocabulary.is_some()
    }

    /// Vocabulary terms in column order. Empty before fitting.
    pub fn vocabulary(&self) -> &[String] {
        self.vocabulary
            .as_ref()
            .map(|v| v.terms.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.vocabulary().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary().is_empty()
    }

    /// Learn the vocabulary from `documents` and return their term counts.
    /// Replaces any previously learned vocabulary.
    pub fn fit_transform<D: Document>(&mut self, documents: &[D]) -> Result<DocumentTermMatrix> {
        let analyzed: Vec<Counter<String>> = documents
            .iter()
            .map(|doc| self.analyze(doc.body()))
            .collect();

        let mut doc_freq: Counter<String> = Counter::new();
        let mut total_freq: Counter<String> = Counter::new();
        for counts in &analyzed {
            doc_freq.update(counts.keys().cloned());
            for (term, &count) in counts.iter() {
                total_freq[term] += count;
            }
        }

        let mut terms: Vec<String> = total_freq
            .most_common_ordered()
            .into_iter()
            .filter(|(term, _)| doc_freq[term] >= self.config.min_df)
            .map(|(term, _)| term)
            .collect();
        if let Some(max_features) = self.config.max_features {
            terms.truncate(max_features);
        }

        if terms.is_empty() {
            return Err(TopicError::Configuration(format!(
                "empty vocabulary: {} documents contain no terms after stop word filtering",
                documents.len()
            )));
        }

        terms.sort();
        let vocabulary = Vocabulary::new(terms);
        let rows = analyzed
            .iter()
            .map(|counts| vocabulary.count_row(counts).0)
            .collect();
        let n_terms = vocabulary.terms.len();

        debug!(
            documents = documents.len(),
            vocabulary = n_terms,
            "Fitted vectorizer"
        );
        self.vocabulary = Some(vocabulary);

        Ok(DocumentTermMatrix::from_rows(rows, n_terms))
    }

    /// Term counts for `documents` over the fitted vocabulary. Unseen terms
    /// contribute nothing.
    pub fn transform<D: Document>(&self, documents: &[D]) -> Result<DocumentTermMatrix> {
        let rows = documents
            .iter()
            .map(|doc| self.transform_one(doc.body()))
            .collect::<Result<Vec<_>>>()?;
        Ok(DocumentTermMatrix::from_rows(rows, self.len()))
    }

    /// Term counts for a single body over the fitted vocabulary.
    pub fn transform_one(&self, body: &str) -> Result<SparseRow> {
        let vocabulary = self.vocabulary.as_ref().ok_or(TopicError::NotFitted)?;
        let (row, unseen) = vocabulary.count_row(&self.analyze(body));
        if unseen > 0 {
            debug!(unseen, "Dropped terms outside the fitted vocabulary");
        }
        Ok(row)
    }

    fn analyze(&self, body: &str) -> Counter<String> {
        let tokens: Vec<String> = self
            .tokenizer
            .tokenize(body)
            .filter(|token| !self.stop_words.contains(token))
            .collect();

        let (min_n, max_n) = self.config.ngram_range;
        let mut counts: Counter<String> = Counter::new();
        for n in min_n..=max_n {
            if n == 1 {
                counts.update(tokens.iter().cloned());
            } else {
                counts.update(tokens.windows(n).map(|gram| gram.join(" ")));
            }
        }
        counts
    }
}

impl Vocabulary {
    fn new(terms: Vec<String>) -> Self {
        let index = terms
            .iter()
            .enumerate()
            .map(|(i, term)| (term.clone(), i))
            .collect();
        Vocabulary { terms, index }
    }

    /// Sorted row for `counts` and the number of unseen term occurrences.
    fn count_row(&self, counts: &Counter<String>) -> (SparseRow, usize) {
        let mut unseen = 0;
        let mut row: SparseRow = Vec::with_capacity(counts.len());
        for (term, &count) in counts.iter() {
            match self.index.get(term) {
                Some(&i) => row.push((i, count)),
                None => unseen += count,
            }
        }
        row.sort_unstable_by_key(|&(i, _)| i);
        (row, unseen)
    }
}
