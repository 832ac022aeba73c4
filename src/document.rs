use serde::{Deserialize, Serialize};

/// Anything with a text body can be modeled.
pub trait Document {
    fn body(&self) -> &str;
}

impl Document for String {
    fn body(&self) -> &str {
        self
    }
}

impl Document for &str {
    fn body(&self) -> &str {
        self
    }
}

impl<D: Document + ?Sized> Document for Box<D> {
    fn body(&self) -> &str {
        (**self).body()
    }
}

/// A single comment or message loaded from a corpus file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub id: usize,
    pub body: String,
}

impl Comment {
    pub fn new(id: usize, body: impl Into<String>) -> Self {
        Comment {
            id,
            body: body.into(),
        }
    }
}

impl Document for Comment {
    fn body(&self) -> &str {
        &self.body
    }
}
