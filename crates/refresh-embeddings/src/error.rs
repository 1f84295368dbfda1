use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("model inference failed: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("tokenization failed: {0}")]
    Tokenizer(String),

    #[error("model unavailable: {0}")]
    ModelNotFound(String),

    #[error("model download failed: {0}")]
    Download(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The model produced a different number of vectors than it was given texts.
    #[error("expected {expected} embeddings, model returned {actual}")]
    CountMismatch { expected: usize, actual: usize },
}
