#![warn(missing_docs)]
//! Batch indexer that pulls gallery catalog records from a relational source,
//! enriches each with an image embedding from a remote vision service, and
//! bulk-loads the result into a remote vector search index, rebuilding the
//! index wholesale per run.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod source;
pub mod vision;

pub use config::Cli;
pub use error::{
    BatchWriteError, ConfigError, PipelineError, ProvisionError, SourceError, VectorizeError,
};
pub use models::{ArtDocument, ImageEmbedding, RunSummary, SourceRecord};
pub use pipeline::Pipeline;
pub use search::{BatchSummary, IndexSchema, IndexStore, SearchIndexClient};
pub use source::{PostgresSource, RecordSource};
pub use vision::{ImageVectorizer, VisionClient};
