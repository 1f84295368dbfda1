//! BERT sentence embedder on Candle.
//!
//! Texts are tokenized together, padded to the longest sequence in the
//! batch (capped at [`MAX_SEQ_LENGTH`]), run through the encoder and
//! mean-pooled over the non-padding tokens.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use crate::cache::{get_or_download_model, ModelCache};
use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Tokens per input; longer chunks are truncated.
pub const MAX_SEQ_LENGTH: usize = 256;

pub struct CandleEmbedder {
    encoder: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    info: ModelInfo,
}

impl CandleEmbedder {
    /// Load `cache.repo_id`, downloading the model files on first use.
    pub fn load(cache: &ModelCache) -> Result<Self, EmbeddingError> {
        let files = get_or_download_model(cache)?;
        Self::load_from_paths(&cache.repo_id, &files.config, &files.tokenizer, &files.weights)
    }

    pub fn load_from_paths(
        name: &str,
        config_path: &Path,
        tokenizer_path: &Path,
        weights_path: &Path,
    ) -> Result<Self, EmbeddingError> {
        let device = Device::Cpu;

        let raw_config = std::fs::read_to_string(config_path)?;
        let bert_config: BertConfig = serde_json::from_str(&raw_config).map_err(|e| {
            EmbeddingError::ModelNotFound(format!("{}: bad config.json: {}", name, e))
        })?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        // SAFETY: the cache owns the weights file and never rewrites it in place
        let weights = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)?
        };
        let encoder = BertModel::load(weights, &bert_config)?;

        let info = ModelInfo {
            name: name.to_string(),
            dimension: bert_config.hidden_size,
            max_sequence_length: MAX_SEQ_LENGTH,
        };
        info!(model = name, dimension = info.dimension, "Embedding model ready");

        Ok(Self {
            encoder,
            tokenizer,
            device,
            info,
        })
    }
}

/// Token ids and attention mask for a batch, row-major, padded with zeros.
#[derive(Debug, PartialEq, Eq)]
struct PaddedBatch {
    rows: usize,
    width: usize,
    ids: Vec<u32>,
    mask: Vec<u32>,
}

fn pad_batch<'a>(
    sequences: impl ExactSizeIterator<Item = (&'a [u32], &'a [u32])> + Clone,
    cap: usize,
) -> PaddedBatch {
    let rows = sequences.len();
    let width = sequences
        .clone()
        .map(|(ids, _)| ids.len())
        .max()
        .unwrap_or(0)
        .min(cap);

    let mut ids = Vec::with_capacity(rows * width);
    let mut mask = Vec::with_capacity(rows * width);
    for (row_ids, row_mask) in sequences {
        let n = row_ids.len().min(width);
        ids.extend_from_slice(&row_ids[..n]);
        ids.resize(ids.len() + width - n, 0);
        mask.extend_from_slice(&row_mask[..n]);
        mask.resize(mask.len() + width - n, 0);
    }

    PaddedBatch {
        rows,
        width,
        ids,
        mask,
    }
}

/// Average of `hidden` (batch, seq, dim) over positions where `mask` is 1.
fn masked_mean(hidden: &Tensor, mask: &Tensor) -> Result<Tensor, EmbeddingError> {
    let weights = mask
        .to_dtype(DType::F32)?
        .unsqueeze(2)?
        .broadcast_as(hidden.shape())?;
    let summed = hidden.broadcast_mul(&weights)?.sum(1)?;
    let counts = weights.sum(1)?.clamp(1e-9, f64::MAX)?;
    Ok(summed.broadcast_div(&counts)?)
}

impl EmbeddingModel for CandleEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut out = self.embed_batch(&[text])?;
        out.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings: Vec<Encoding> = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let batch = pad_batch(
            encodings
                .iter()
                .map(|e| (e.get_ids(), e.get_attention_mask())),
            MAX_SEQ_LENGTH,
        );
        debug!(texts = batch.rows, tokens = batch.width, "Encoding batch");

        let shape = (batch.rows, batch.width);
        let ids = Tensor::from_vec(batch.ids, shape, &self.device)?;
        let mask = Tensor::from_vec(batch.mask, shape, &self.device)?;
        let token_types = ids.zeros_like()?;

        let hidden = self.encoder.forward(&ids, &token_types, Some(&mask))?;
        let rows: Vec<Vec<f32>> = masked_mean(&hidden, &mask)?.to_vec2()?;

        if rows.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: rows.len(),
            });
        }
        Ok(rows.into_iter().map(Embedding::new).collect())
    }
}
