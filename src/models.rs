//! Shared data model passed between pipeline stages.

use serde::Serialize;

/// Fixed IIIF sizing/format suffix appended to every image template before
/// the vectorize call.
pub const IIIF_IMAGE_SUFFIX: &str = "/full/!600,600/0/default.jpg";

/// One catalog entry pulled from the relational open data source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Stable catalog identifier.
    pub object_id: i64,
    /// Display title of the object.
    pub title: String,
    /// IIIF image URL template, when the object has a published image.
    pub iiif_url: Option<String>,
}

impl SourceRecord {
    /// Concrete image URL submitted to the vectorize service, or `None` when
    /// the record carries no usable IIIF template.
    pub fn image_url(&self) -> Option<String> {
        self.iiif_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| format!("{}{}", url.trim_end_matches('/'), IIIF_IMAGE_SUFFIX))
    }
}

/// Result of one vectorize call.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEmbedding {
    /// Fixed-width embedding vector.
    pub vector: Vec<f32>,
    /// Version tag of the model that produced the vector.
    pub model_version: String,
}

/// A source record enriched with its image embedding, in the index store's
/// wire shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtDocument {
    /// Catalog identifier, stringified for the store's key field.
    pub object_id: String,
    /// Display title.
    pub title: String,
    /// IIIF image URL template the vector was derived from.
    pub iiif_url: String,
    /// Version tag of the embedding model.
    pub model_version: String,
    /// Image embedding vector.
    pub image_vector: Vec<f32>,
}

impl ArtDocument {
    /// Builds the index document for an enriched record.
    pub fn new(record: &SourceRecord, embedding: ImageEmbedding) -> Self {
        Self {
            object_id: record.object_id.to_string(),
            title: record.title.clone(),
            iiif_url: record.iiif_url.clone().unwrap_or_default(),
            model_version: embedding.model_version,
            image_vector: embedding.vector,
        }
    }
}

/// Counters accumulated over one pipeline run. A lossy run still completes;
/// these counts are the only run-level outcome signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records fetched from the source.
    pub records_total: usize,
    /// Records enriched with an embedding.
    pub records_enriched: usize,
    /// Records skipped because they carry no image template.
    pub skipped_no_image: usize,
    /// Records skipped because the vectorize call failed.
    pub skipped_vectorize: usize,
    /// Chunks derived from the record set.
    pub chunks_total: usize,
    /// Chunks whose batch write succeeded.
    pub chunks_committed: usize,
    /// Chunks dropped after a failed batch write.
    pub chunks_lost: usize,
    /// Documents accepted by the index store.
    pub documents_indexed: usize,
}

impl RunSummary {
    /// True when every record was enriched and every chunk committed.
    pub fn is_lossless(&self) -> bool {
        self.skipped_no_image == 0 && self.skipped_vectorize == 0 && self.chunks_lost == 0
    }
}
