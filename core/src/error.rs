/// Errors raised by index construction, loading and ranking.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("cannot fit an index on an empty corpus")]
    EmptyCorpus,

    #[error("duplicate record id in corpus: {0}")]
    DuplicateRecordId(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("k must be a positive integer, got {0}")]
    InvalidK(i64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corpus source error: {0:?}")]
    Source(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
