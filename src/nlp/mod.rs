//! Named-entity recognition.
//!
//! [`EntityRecognizer`] is the seam the field extractor depends on; the
//! production implementation is [`bert_ner::BertNer`], a BERT
//! token-classification model run with candle.

pub mod bert_ner;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NerError {
    #[error("model download failed: {0}")]
    Download(String),

    #[error("failed to load model: {0}")]
    Load(String),

    #[error("tokenization failed: {0}")]
    Tokenize(String),

    #[error("inference failed: {0}")]
    Inference(#[from] candle_core::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityLabel {
    Person,
    Organization,
    Location,
    Misc,
}

impl EntityLabel {
    /// Maps the entity part of a BIO tag (`PER`, `ORG`, ...) to a label.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "PER" | "PERSON" => Some(EntityLabel::Person),
            "ORG" => Some(EntityLabel::Organization),
            "LOC" | "GPE" => Some(EntityLabel::Location),
            "MISC" => Some(EntityLabel::Misc),
            _ => None,
        }
    }
}

/// A recognized span; `start`/`end` are byte offsets into the analysed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub label: EntityLabel,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Finds named entities in text, returned in order of appearance.
pub trait EntityRecognizer: Send + Sync {
    fn entities(&self, text: &str) -> Result<Vec<Entity>, NerError>;

    /// First entity with `label` in order of appearance.
    fn first_entity(&self, text: &str, label: EntityLabel) -> Result<Option<Entity>, NerError> {
        Ok(self.entities(text)?.into_iter().find(|e| e.label == label))
    }

    /// Identifier of the underlying model, reported by the health endpoint.
    fn model_id(&self) -> &str;
}
