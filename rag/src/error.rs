use thiserror::Error;

/// Everything the pipeline can fail with.
#[derive(Debug, Error)]
pub enum RagError {
    /// Upload whose extension is neither `.pdf` nor `.txt`.
    #[error("unsupported format for {filename}: only PDF and TXT files can be ingested")]
    UnsupportedFormat { filename: String },

    /// Bad or missing configuration. Fatal at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("could not read PDF {filename}: {message}")]
    Pdf { filename: String, message: String },

    #[error("vector store error: {0}")]
    Store(String),

    /// Another handle (possibly another process) owns the store directory.
    #[error("vector store at {0} is in use by another DocBuddy instance")]
    StoreLocked(String),

    /// A vector whose length differs from the vectors already in the store,
    /// usually after switching embedding model or provider.
    #[error("embedding has {actual} dimensions but the store holds {expected}-dimensional vectors; reset the store or restore the previous embedding settings")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector store database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;
