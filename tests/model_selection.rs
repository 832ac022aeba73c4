// Topic count search over the real sampler and over scripted engines.

use topic_clusters::vectorizer::DocumentTermMatrix;
use topic_clusters::{
    CandidateRange, Comment, CountVectorizer, FittedTopics, GibbsSampler, InferenceEngine,
    ModelConfig, ModelSelector, SelectionConfig, TopicError, TopicModel, VectorizerConfig,
};

fn corpus() -> Vec<Comment> {
    [
        "senate budget vote senate deficit",
        "budget deficit taxes senate vote",
        "taxes budget senate deficit vote",
        "playoff goalie hockey overtime playoff",
        "hockey goalie overtime playoff rink",
        "rink hockey goalie playoff overtime",
        "sourdough flour oven starter sourdough",
        "starter flour sourdough oven crust",
    ]
    .iter()
    .enumerate()
    .map(|(id, body)| Comment::new(id, *body))
    .collect()
}

fn matrix() -> DocumentTermMatrix {
    let mut vectorizer = CountVectorizer::new(VectorizerConfig::default()).unwrap();
    vectorizer.fit_transform(&corpus()).unwrap()
}

/// Fails every fit.
struct BrokenEngine;

impl InferenceEngine for BrokenEngine {
    fn fit(&self, _: &DocumentTermMatrix, k: usize, _: u64, _: usize) -> topic_clusters::Result<FittedTopics> {
        Err(TopicError::Inference {
            k,
            reason: "sampler diverged".to_string(),
        })
    }

    fn transform(&self, fitted: &FittedTopics, _: &[(usize, usize)]) -> Vec<f64> {
        vec![1.0; fitted.n_topics()]
    }
}

#[test]
fn default_search_is_deterministic() {
    let sampler = GibbsSampler::default();
    let config = SelectionConfig::default();
    let dtm = matrix();

    let first = ModelSelector::new(&sampler, &config).unwrap().select(&dtm).unwrap();
    let second = ModelSelector::new(&sampler, &config).unwrap().select(&dtm).unwrap();

    assert_eq!(first.scores.len(), 8);
    assert_eq!(
        first.scores.iter().map(|s| s.k).collect::<Vec<_>>(),
        vec![5, 7, 9, 11, 13, 15, 17, 19]
    );
    assert!(first.scores.iter().all(|s| s.log_likelihood.is_some()));
    assert_eq!(first.k, second.k);
    assert_eq!(first.fitted.log_likelihood, second.fitted.log_likelihood);
    assert_eq!(first.scores, second.scores);
}

#[test]
fn selected_candidate_has_the_best_score() {
    let sampler = GibbsSampler::default();
    let config = SelectionConfig {
        iterations: 300,
        ..Default::default()
    };
    let selection = ModelSelector::new(&sampler, &config)
        .unwrap()
        .with_candidates(CandidateRange::from_list(vec![2, 3, 4]).unwrap())
        .select(&matrix())
        .unwrap();

    let best = selection
        .scores
        .iter()
        .filter_map(|s| s.log_likelihood)
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(selection.fitted.log_likelihood, best);
    assert_eq!(selection.fitted.n_topics(), selection.k);
    let winner = selection.scores.iter().find(|s| s.k == selection.k).unwrap();
    assert_eq!(winner.log_likelihood, Some(best));
}

#[test]
fn parallel_search_matches_sequential_search() {
    let sampler = GibbsSampler::default();
    let mut config = SelectionConfig {
        candidates: Some(vec![2, 3, 5]),
        iterations: 300,
        ..Default::default()
    };
    let dtm = matrix();
    let sequential = ModelSelector::new(&sampler, &config).unwrap().select(&dtm).unwrap();
    config.parallel = true;
    let parallel = ModelSelector::new(&sampler, &config).unwrap().select(&dtm).unwrap();

    assert_eq!(sequential.k, parallel.k);
    assert_eq!(sequential.scores, parallel.scores);
    assert_eq!(sequential.fitted, parallel.fitted);
}

#[test]
fn model_without_topic_count_searches_the_range() {
    let mut config = ModelConfig::default();
    config.selection.candidates = Some(vec![2, 3]);
    config.selection.iterations = 300;
    let model = TopicModel::new(config).unwrap();

    let snapshot = model.train(&corpus()).unwrap();
    assert!([2, 3].contains(&snapshot.n_topics()));
    assert_eq!(model.cluster(&corpus()).unwrap().len(), snapshot.n_topics());
}

#[test]
fn every_candidate_failing_leaves_the_model_untrained() {
    let mut config = ModelConfig::default();
    config.selection.candidates = Some(vec![2, 3, 4]);
    let model = TopicModel::with_engine(config, BrokenEngine).unwrap();

    let result = model.train(&corpus());
    assert!(matches!(result, Err(TopicError::NoViableModel { attempted: 3 })));
    assert!(!model.is_trained());
    assert!(matches!(model.cluster(&corpus()), Err(TopicError::NoViableModel { .. })));
}

#[test]
fn fixed_topic_count_surfaces_inference_failure() {
    let model = TopicModel::with_engine(ModelConfig::default().with_topics(3), BrokenEngine).unwrap();
    assert!(matches!(
        model.train(&corpus()),
        Err(TopicError::Inference { k: 3, .. })
    ));
}

#[test]
fn invalid_search_configuration_is_rejected_up_front() {
    let mut config = ModelConfig::default();
    config.selection.candidates = Some(vec![9, 4]);
    assert!(matches!(
        TopicModel::new(config),
        Err(TopicError::Configuration(_))
    ));
}
