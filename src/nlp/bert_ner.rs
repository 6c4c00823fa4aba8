//! BERT token-classification NER via candle.
//!
//! Weights, config and vocabulary come from the Hugging Face Hub and are
//! cached locally by `hf-hub`, so only the first start downloads anything.
//! Long inputs are classified in windows of [`MAX_WINDOW_TOKENS`] word pieces;
//! tags are aggregated over the whole document so an entity split across a
//! window edge is still reported once.

use candle_core::{Device, Tensor, D};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::{Entity, EntityLabel, EntityRecognizer, NerError};

pub const DEFAULT_MODEL_ID: &str = "dslim/bert-base-NER";
pub const DEFAULT_REVISION: &str = "main";

/// Word pieces per forward pass, leaving room for `[CLS]` and `[SEP]`.
const MAX_WINDOW_TOKENS: usize = 510;

/// Local paths of the files making up a model.
struct ModelFiles {
    config: PathBuf,
    weights: PathBuf,
    tokenizer: TokenizerSource,
}

enum TokenizerSource {
    Json(PathBuf),
    Vocab { vocab: PathBuf, lowercase: bool },
}

pub struct BertNer {
    model: BertModel,
    classifier: Linear,
    tokenizer: Tokenizer,
    id2label: Vec<String>,
    cls_id: u32,
    sep_id: u32,
    device: Device,
    model_id: String,
}

impl BertNer {
    /// Ensures the model is in the local cache (downloading it if absent) and
    /// loads it on the CPU.
    pub fn load(model_id: &str, revision: &str) -> Result<Self, NerError> {
        let files = download(model_id, revision)?;
        let ner = Self::from_files(model_id, &files)?;
        info!(model = model_id, labels = ner.id2label.len(), "NER model loaded");
        Ok(ner)
    }

    fn from_files(model_id: &str, files: &ModelFiles) -> Result<Self, NerError> {
        let device = Device::Cpu;

        let config_str = std::fs::read_to_string(&files.config)
            .map_err(|e| NerError::Load(format!("failed to read config: {}", e)))?;
        let config: Config = serde_json::from_str(&config_str)
            .map_err(|e| NerError::Load(format!("failed to parse config: {}", e)))?;
        let id2label = parse_id2label(&config_str)?;

        let tokenizer = match &files.tokenizer {
            TokenizerSource::Json(path) => {
                let mut tokenizer = Tokenizer::from_file(path)
                    .map_err(|e| NerError::Load(format!("failed to load tokenizer: {}", e)))?;
                tokenizer.with_padding(None);
                tokenizer
                    .with_truncation(None)
                    .map_err(|e| NerError::Load(format!("failed to disable truncation: {}", e)))?;
                tokenizer
            }
            TokenizerSource::Vocab { vocab, lowercase } => wordpiece_tokenizer(vocab, *lowercase)?,
        };
        let cls_id = special_token_id(&tokenizer, "[CLS]")?;
        let sep_id = special_token_id(&tokenizer, "[SEP]")?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DTYPE, &device)
                .map_err(|e| NerError::Load(format!("failed to load weights: {}", e)))?
        };
        let model = BertModel::load(vb.pp("bert"), &config)
            .map_err(|e| NerError::Load(format!("failed to build encoder: {}", e)))?;
        let classifier = candle_nn::linear(config.hidden_size, id2label.len(), vb.pp("classifier"))
            .map_err(|e| NerError::Load(format!("failed to build classifier head: {}", e)))?;

        Ok(Self {
            model,
            classifier,
            tokenizer,
            id2label,
            cls_id,
            sep_id,
            device,
            model_id: model_id.to_string(),
        })
    }

    /// Classifies one window of word-piece ids and returns a label index per
    /// id.
    fn classify_window(&self, window: &[u32]) -> Result<Vec<usize>, NerError> {
        let mut ids = Vec::with_capacity(window.len() + 2);
        ids.push(self.cls_id);
        ids.extend_from_slice(window);
        ids.push(self.sep_id);

        let input_ids = Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, None)?;
        let logits = self.classifier.forward(&hidden)?;
        let predicted: Vec<u32> = logits.squeeze(0)?.argmax(D::Minus1)?.to_vec1()?;

        Ok(predicted[1..predicted.len() - 1]
            .iter()
            .map(|&p| p as usize)
            .collect())
    }

    /// Runs the model window by window; see [`scan_windows`].
    fn scan<F>(&self, text: &str, stop: F) -> Result<Vec<Entity>, NerError>
    where
        F: FnMut(&[Entity], &[TokenSpan]) -> bool,
    {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| NerError::Tokenize(e.to_string()))?;
        let pieces = Pieces {
            ids: encoding.get_ids(),
            offsets: encoding.get_offsets(),
            word_ids: encoding.get_word_ids(),
        };
        scan_windows(
            text,
            &pieces,
            &self.id2label,
            |window| self.classify_window(window),
            stop,
        )
    }
}

impl EntityRecognizer for BertNer {
    fn entities(&self, text: &str) -> Result<Vec<Entity>, NerError> {
        self.scan(text, |_, _| false)
    }

    fn first_entity(&self, text: &str, label: EntityLabel) -> Result<Option<Entity>, NerError> {
        let entities = self.scan(text, |entities, tokens| settled(label, entities, tokens))?;
        Ok(entities.into_iter().find(|e| e.label == label))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// A tokenized document as parallel per-piece slices.
pub(crate) struct Pieces<'a> {
    pub ids: &'a [u32],
    pub offsets: &'a [(usize, usize)],
    pub word_ids: &'a [Option<u32>],
}

/// Classifies `pieces` in windows of [`MAX_WINDOW_TOKENS`] and aggregates the
/// tags seen so far after each window. `classify` returns a label index per
/// id of its window. `stop` is consulted after every window with the
/// entities and the classified tokens; returning true ends the scan early.
pub(crate) fn scan_windows<C, F>(
    text: &str,
    pieces: &Pieces<'_>,
    id2label: &[String],
    mut classify: C,
    mut stop: F,
) -> Result<Vec<Entity>, NerError>
where
    C: FnMut(&[u32]) -> Result<Vec<usize>, NerError>,
    F: FnMut(&[Entity], &[TokenSpan]) -> bool,
{
    let mut tokens: Vec<TokenSpan> = Vec::with_capacity(pieces.ids.len());
    let mut entities = Vec::new();

    for (window_idx, window) in pieces.ids.chunks(MAX_WINDOW_TOKENS).enumerate() {
        let base = window_idx * MAX_WINDOW_TOKENS;
        let labels = classify(window)?;
        for (i, label) in labels.into_iter().take(window.len()).enumerate() {
            let idx = base + i;
            let (start, end) = pieces.offsets[idx];
            tokens.push(TokenSpan {
                start,
                end,
                word: pieces.word_ids.get(idx).copied().flatten(),
                tag: id2label
                    .get(label)
                    .map(String::as_str)
                    .unwrap_or("O")
                    .to_string(),
            });
        }
        debug!(window = window_idx, tokens = tokens.len(), "NER window classified");

        entities = aggregate_entities(text, &tokens);
        if stop(&entities, &tokens) {
            break;
        }
    }

    Ok(entities)
}

/// True once an entity with `label` ends before the last classified token,
/// so the next window can no longer extend it.
fn settled(label: EntityLabel, entities: &[Entity], tokens: &[TokenSpan]) -> bool {
    let edge = tokens.last().map(|t| t.end).unwrap_or(0);
    entities.iter().any(|e| e.label == label && e.end < edge)
}

/// One classified word piece.
#[derive(Debug, Clone)]
pub(crate) struct TokenSpan {
    pub start: usize,
    pub end: usize,
    pub word: Option<u32>,
    pub tag: String,
}

/// Merges BIO-tagged word pieces into entities.
///
/// A word takes the tag of its first piece. `B-X` opens an entity, `I-X`
/// continues an open `X` entity (or opens one), anything else closes it.
pub(crate) fn aggregate_entities(text: &str, tokens: &[TokenSpan]) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut current: Option<(EntityLabel, usize, usize)> = None;

    let mut i = 0;
    while i < tokens.len() {
        let first = &tokens[i];
        let mut last = first;
        let mut j = i + 1;
        if first.word.is_some() {
            while j < tokens.len() && tokens[j].word == first.word {
                last = &tokens[j];
                j += 1;
            }
        }

        let (begins, label) = parse_tag(&first.tag);
        match label {
            Some(label) => {
                let continues =
                    !begins && matches!(current, Some((open, _, _)) if open == label);
                if continues {
                    if let Some((_, _, end)) = current.as_mut() {
                        *end = last.end;
                    }
                } else {
                    close(text, current.take(), &mut entities);
                    current = Some((label, first.start, last.end));
                }
            }
            None => close(text, current.take(), &mut entities),
        }

        i = j;
    }
    close(text, current.take(), &mut entities);

    entities
}

fn close(text: &str, span: Option<(EntityLabel, usize, usize)>, out: &mut Vec<Entity>) {
    if let Some((label, start, end)) = span {
        if let Some(slice) = text.get(start..end) {
            out.push(Entity {
                label,
                text: slice.to_string(),
                start,
                end,
            });
        }
    }
}

/// Splits `B-PER` into (begins, Person). `O` and unknown types yield no label.
fn parse_tag(tag: &str) -> (bool, Option<EntityLabel>) {
    match tag.split_once('-') {
        Some(("B", kind)) => (true, EntityLabel::from_tag(kind)),
        Some(("I", kind)) => (false, EntityLabel::from_tag(kind)),
        _ => (false, None),
    }
}

fn parse_id2label(config_json: &str) -> Result<Vec<String>, NerError> {
    let value: serde_json::Value = serde_json::from_str(config_json)
        .map_err(|e| NerError::Load(format!("failed to parse config: {}", e)))?;
    let map = value
        .get("id2label")
        .and_then(|m| m.as_object())
        .ok_or_else(|| NerError::Load("config has no id2label map".to_string()))?;

    let mut pairs = Vec::with_capacity(map.len());
    for (key, label) in map {
        let idx: usize = key
            .parse()
            .map_err(|_| NerError::Load(format!("invalid id2label key: {}", key)))?;
        let label = label
            .as_str()
            .ok_or_else(|| NerError::Load(format!("invalid id2label value for {}", key)))?;
        pairs.push((idx, label.to_string()));
    }
    pairs.sort_by_key(|(idx, _)| *idx);

    if pairs.iter().enumerate().any(|(pos, (idx, _))| pos != *idx) {
        return Err(NerError::Load("id2label keys are not contiguous".to_string()));
    }
    Ok(pairs.into_iter().map(|(_, label)| label).collect())
}

fn wordpiece_tokenizer(vocab: &Path, lowercase: bool) -> Result<Tokenizer, NerError> {
    let wordpiece = WordPiece::from_file(&vocab.to_string_lossy())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| NerError::Load(format!("failed to load vocabulary: {}", e)))?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(Some(BertNormalizer::new(
        true,
        true,
        Some(lowercase),
        lowercase,
    )));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
    Ok(tokenizer)
}

fn special_token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32, NerError> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| NerError::Load(format!("tokenizer has no {} token", token)))
}

fn download(model_id: &str, revision: &str) -> Result<ModelFiles, NerError> {
    let api = Api::new().map_err(|e| NerError::Download(format!("failed to create HF API: {}", e)))?;
    let repo = api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let config = repo
        .get("config.json")
        .map_err(|e| NerError::Download(format!("config.json: {}", e)))?;
    let weights = repo
        .get("model.safetensors")
        .map_err(|e| NerError::Download(format!("model.safetensors: {}", e)))?;

    // Many NER checkpoints ship only a WordPiece vocabulary.
    let tokenizer = match repo.get("tokenizer.json") {
        Ok(path) => TokenizerSource::Json(path),
        Err(_) => {
            let vocab = repo
                .get("vocab.txt")
                .map_err(|e| NerError::Download(format!("vocab.txt: {}", e)))?;
            let lowercase = repo
                .get("tokenizer_config.json")
                .ok()
                .and_then(|p| std::fs::read_to_string(p).ok())
                .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
                .and_then(|v| v.get("do_lower_case").and_then(|b| b.as_bool()))
                .unwrap_or(false);
            TokenizerSource::Vocab { vocab, lowercase }
        }
    };

    Ok(ModelFiles {
        config,
        weights,
        tokenizer,
    })
}
