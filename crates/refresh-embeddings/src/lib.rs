//! # refresh-embeddings
//!
//! Local chunk embeddings with Candle. Any BERT-family sentence-transformers
//! checkpoint on the Hugging Face Hub works; all-MiniLM-L6-v2 (384
//! dimensions) is the default. Model files are cached on disk after the
//! first download.

pub mod cache;
pub mod candle;
pub mod error;
pub mod model;

pub use crate::candle::CandleEmbedder;
pub use cache::{get_or_download_model, ModelCache, ModelPaths, DEFAULT_MODEL_REPO, MODEL_FILES};
pub use error::EmbeddingError;
pub use model::{Embedding, EmbeddingModel, ModelInfo};
