//! Error taxonomy for the indexing run.
//!
//! Only [`ProvisionError`] and [`SourceError`] abort a run (via
//! [`PipelineError`]); [`VectorizeError`] and [`BatchWriteError`] are caught
//! inside the pipeline loop and downgraded to logged skips.

use reqwest::StatusCode;
use thiserror::Error;

/// Semantic configuration problems caught before any index or record work.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value parsed but is unusable (bad endpoint scheme, zero-sized knob).
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure readying the target index. Fatal to the run.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The existence probe returned an unexpected status.
    #[error("index '{name}' existence probe failed ({status}): {body}")]
    Probe {
        /// Index name.
        name: String,
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// Deleting the existing index failed.
    #[error("index '{name}' delete failed ({status}): {body}")]
    Delete {
        /// Index name.
        name: String,
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// Creating the index failed.
    #[error("index '{name}' create failed ({status}): {body}")]
    Create {
        /// Index name.
        name: String,
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The store could not be reached at all.
    #[error("index store transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failure fetching the record set. Fatal to the run, never retried.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Connecting to the source database failed.
    #[error("source connection failed: {0}")]
    Connect(#[source] tokio_postgres::Error),
    /// The catalog query or row mapping failed.
    #[error("source query failed: {0}")]
    Query(#[source] tokio_postgres::Error),
}

/// Failure of one vectorize call after the retry budget is spent (or
/// immediately, for non-retryable responses). Recovered per record.
#[derive(Error, Debug)]
pub enum VectorizeError {
    /// The service answered with a non-success status.
    #[error("vectorize request failed ({status}) after {attempts} attempt(s): {body}")]
    Status {
        /// Final HTTP status.
        status: StatusCode,
        /// Attempts spent, including the failing one.
        attempts: usize,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The service could not be reached.
    #[error("vectorize transport failure after {attempts} attempt(s): {source}")]
    Transport {
        /// Attempts spent, including the failing one.
        attempts: usize,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// A success response carried an unparseable body. Not retried.
    #[error("vectorize response could not be parsed: {0}")]
    Malformed(#[source] reqwest::Error),
}

/// Failure of one chunk's batch write. Recovered per chunk; the chunk is
/// dropped and the run continues.
#[derive(Error, Debug)]
pub enum BatchWriteError {
    /// The store rejected the batch call.
    #[error("batch upsert rejected ({status}): {body}")]
    Rejected {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The store could not be reached.
    #[error("batch upsert transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Fatal pipeline outcomes. Everything else is absorbed as a logged skip.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The index could not be readied; enrichment never started.
    #[error("index provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
    /// The record set could not be fetched.
    #[error("record fetch failed: {0}")]
    Source(#[from] SourceError),
}
