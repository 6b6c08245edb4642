//! Error types for the assay resolution engine.

use thiserror::Error;

/// Main error type for assay operations.
#[derive(Error, Debug)]
pub enum AssayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Taxonomy error: {0}")]
    Taxonomy(#[from] TaxonomyError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Batch run error: {0}")]
    Run(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Taxonomy loading and indexing errors.
#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Taxonomy is empty: no valid concepts were loaded")]
    Empty,

    #[error("Unknown concept id: {0}")]
    UnknownConcept(String),
}

/// Embedding-provider errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Rate limited by embedding API")]
    RateLimited,

    #[error("Batch size {0} exceeds provider maximum {1}")]
    BatchTooLarge(usize, usize),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Storage/repository errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Invalid partition: offset {offset} + limit {limit} out of range for {total} mentions")]
    InvalidPartition {
        offset: usize,
        limit: usize,
        total: usize,
    },

    #[error("Write failed: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for assay operations.
pub type Result<T> = std::result::Result<T, AssayError>;
