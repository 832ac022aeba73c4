//! Loading comment corpora from disk.

use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::document::Comment;
use crate::error::{Result, TopicError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusFormat {
    /// Documents separated by runs of four or more blank lines
    Text,
    /// A JSON array of strings or of `{"body": ...}` objects
    Json,
    /// An mbox archive; each message's text body is one document
    Mbox,
}

impl CorpusFormat {
    /// Guess the format from a file extension, defaulting to plain text.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => CorpusFormat::Json,
            Some("mbox") => CorpusFormat::Mbox,
            _ => CorpusFormat::Text,
        }
    }
}

impl FromStr for CorpusFormat {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(CorpusFormat::Text),
            "json" => Ok(CorpusFormat::Json),
            "mbox" => Ok(CorpusFormat::Mbox),
            other => Err(TopicError::Configuration(format!(
                "unknown corpus format '{}'",
                other
            ))),
        }
    }
}

pub fn load(path: impl AsRef<Path>, format: CorpusFormat) -> Result<Vec<Comment>> {
    let path = path.as_ref();
    let comments = match format {
        CorpusFormat::Text => parse_text(&std::fs::read_to_string(path)?),
        CorpusFormat::Json => parse_json(&std::fs::read_to_string(path)?)?,
        CorpusFormat::Mbox => load_mbox(path)?,
    };
    info!(path = %path.display(), documents = comments.len(), "Loaded corpus");
    Ok(comments)
}

/// Split on runs of at least four blank lines. Shorter gaps are paragraph
/// breaks inside one document.
pub fn parse_text(raw: &str) -> Vec<Comment> {
    let separator = Regex::new(r"\n([ \t\r]*\n){4,}").expect("separator pattern is valid");
    separator
        .split(raw)
        .map(str::trim)
        .filter(|body| !body.is_empty())
        .enumerate()
        .map(|(id, body)| Comment::new(id, body))
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonEntry {
    Plain(String),
    Record { body: String },
}

pub fn parse_json(raw: &str) -> Result<Vec<Comment>> {
    let entries: Vec<JsonEntry> = serde_json::from_str(raw)?;
    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(id, entry)| match entry {
            JsonEntry::Plain(body) | JsonEntry::Record { body } => Comment::new(id, body),
        })
        .collect())
}

/// Hand-clustered examples: a JSON array of clusters, each an array of
/// document bodies. Returns the documents and their cluster indices.
pub fn load_labeled(path: impl AsRef<Path>) -> Result<(Vec<Comment>, Vec<usize>)> {
    parse_labeled(&std::fs::read_to_string(path)?)
}

pub fn parse_labeled(raw: &str) -> Result<(Vec<Comment>, Vec<usize>)> {
    let clusters: Vec<Vec<String>> = serde_json::from_str(raw)?;
    let mut comments = Vec::new();
    let mut labels = Vec::new();
    for (label, cluster) in clusters.into_iter().enumerate() {
        for body in cluster {
            comments.push(Comment::new(comments.len(), body));
            labels.push(label);
        }
    }
    Ok((comments, labels))
}

fn load_mbox(path: &Path) -> Result<Vec<Comment>> {
    let mbox = mbox_reader::MboxFile::from_file(path).map_err(|e| TopicError::Mbox(e.to_string()))?;
    let parser = mail_parser::MessageParser::new();
    let mut comments = Vec::new();

    for (i, entry) in mbox.iter().enumerate() {
        if i % 100 == 0 {
            debug!(message = i, "Processing mbox message");
        }

        let Some(message_bytes) = entry.message() else {
            warn!(start = entry.start().as_str(), "No message");
            continue;
        };

        let Some(message) = parser.parse(message_bytes) else {
            warn!(start = entry.start().as_str(), "Failed to parse message");
            continue;
        };

        let Some(body) = message.body_text(0) else {
            debug!(start = entry.start().as_str(), "Message has no text body");
            continue;
        };

        let body = body.trim();
        if !body.is_empty() {
            comments.push(Comment::new(comments.len(), body));
        }
    }

    Ok(comments)
}
