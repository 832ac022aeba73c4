use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use topic_clusters::corpus::{self, CorpusFormat};
use topic_clusters::evaluate::evaluate;
use topic_clusters::{Comment, ModelConfig, TopicModel};

/// Discover topics in a comment corpus and cluster comments by topic.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
    #[clap(short, long, global = true, help = "Corpus format: text, json or mbox. Defaults to the file extension.")]
    format: Option<CorpusFormat>,
    #[clap(short = 'k', long, global = true, help = "Fixed number of topics. If not specified, a range is searched for the best log-likelihood.")]
    topics: Option<usize>,
    #[clap(short, long, global = true, help = "JSON model configuration file")]
    config: Option<PathBuf>,
    #[clap(short, long, global = true, help = "Print top words for every fitted candidate")]
    verbose: bool,
    #[clap(long, global = true, help = "Fit candidate topic counts in parallel")]
    parallel: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model on a corpus and save it
    Train {
        path: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
    },
    /// Train on a corpus and print its topic clusters
    Cluster {
        path: PathBuf,
        #[clap(short = 'n', long, default_value_t = 8, help = "Top words shown per topic")]
        words: usize,
    },
    /// Label each document of a corpus with a saved model's most likely topic
    Identify { model: PathBuf, path: PathBuf },
    /// Print the top words of a saved model's topics
    Topics {
        model: PathBuf,
        #[clap(short = 'n', long, default_value_t = 8)]
        words: usize,
    },
    /// Score clustering against hand-clustered examples (JSON array of clusters)
    Eval { path: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("topic_clusters=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let format = args.format;

    match &args.command {
        Command::Train { path, output } => {
            let comments = load_corpus(path, format)?;
            let model = TopicModel::new(config)?;
            let snapshot = model.train(&comments)?;
            model.save(output)?;
            println!(
                "✅ Trained {} topics on {} documents (log-likelihood {:.1})",
                snapshot.n_topics(),
                comments.len(),
                snapshot.log_likelihood()
            );
            println!("Model file: {}", output.display());
        }
        Command::Cluster { path, words } => {
            let comments = load_corpus(path, format)?;
            let model = TopicModel::new(config)?;
            let clusters = model.cluster(&comments)?;
            for (topic, members) in clusters.iter().enumerate() {
                println!("📊 Topic {} ({} documents)", topic, members.len());
                println!("   {}", model.top_words(topic, *words)?.join(" | "));
                for comment in members {
                    println!("   - {}", preview(&comment.body, 100));
                }
                println!();
            }
        }
        Command::Identify { model, path } => {
            let model = TopicModel::load(model, config)
                .with_context(|| format!("loading model {}", model.display()))?;
            let comments = load_corpus(path, format)?;
            for label in model.identify(&comments)? {
                println!(
                    "{}\t{:.3}\t{}",
                    label.topic,
                    label.probability,
                    preview(&label.document.body, 80)
                );
            }
        }
        Command::Topics { model, words } => {
            let model = TopicModel::load(model, config)
                .with_context(|| format!("loading model {}", model.display()))?;
            if let Some(snapshot) = model.snapshot() {
                println!(
                    "{} topics over {} terms, trained {}",
                    snapshot.n_topics(),
                    snapshot.vocabulary().len(),
                    snapshot.trained_at().format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            for summary in model.topic_summaries(*words)? {
                println!("{}", summary);
            }
        }
        Command::Eval { path } => {
            let (comments, labels) = corpus::load_labeled(path)
                .with_context(|| format!("loading labeled examples {}", path.display()))?;
            let model = TopicModel::new(config)?;
            println!("{}", evaluate(&model, &comments, &labels)?);
        }
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<ModelConfig> {
    let mut config = match &args.config {
        Some(path) => ModelConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ModelConfig::default(),
    };
    if let Some(topics) = args.topics {
        config.n_topics = Some(topics);
    }
    config.verbose |= args.verbose;
    config.selection.parallel |= args.parallel;
    config.selection.progress = true;
    config.validate()?;
    Ok(config)
}

fn load_corpus(path: &Path, format: Option<CorpusFormat>) -> Result<Vec<Comment>> {
    let format = format.unwrap_or_else(|| CorpusFormat::from_path(path));
    let comments = corpus::load(path, format)
        .with_context(|| format!("loading corpus {}", path.display()))?;
    if comments.is_empty() {
        anyhow::bail!("No documents found in {}", path.display());
    }
    Ok(comments)
}

/// First line of `body`, cut to `max` characters.
fn preview(body: &str, max: usize) -> String {
    let line = body.lines().next().unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}
