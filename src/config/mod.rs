//! Configuration for the assay resolution engine.

mod settings;

pub use settings::{
    ApiEmbeddingConfig, Config, EmbeddingConfig, EmbeddingProviderKind, MatchingConfig,
    StorageConfig,
};
