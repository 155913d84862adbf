//! Index store gateway: index lifecycle and batched document writes.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{BatchWriteError, ProvisionError};
use crate::models::ArtDocument;

const API_VERSION: &str = "2023-11-01";

/// Name of the vector-search profile bound to the image vector field.
pub const VECTOR_PROFILE_NAME: &str = "image-vector-profile";
/// Name of the HNSW algorithm configuration backing the profile.
pub const HNSW_CONFIG_NAME: &str = "image-vector-hnsw";

/// Target index lifecycle and writes. Seam for pipeline tests.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Readies the index: optionally drops an existing one, then creates it
    /// from `schema`. Skips creation when the index exists and
    /// `replace_existing` is false (existing schema is not diffed).
    async fn ensure_index(
        &self,
        schema: &IndexSchema,
        replace_existing: bool,
    ) -> Result<(), ProvisionError>;

    /// Submits all documents as one bulk upload. Coarse contract: the whole
    /// batch either lands or the chunk is lost. Empty input is a no-op.
    async fn upsert_batch(
        &self,
        documents: &[ArtDocument],
    ) -> Result<BatchSummary, BatchWriteError>;
}

/// Caller-visible outcome of one batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Documents carried by the accepted batch call.
    pub submitted: usize,
}

/// Target index definition: fields plus the vector-search configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Field definitions.
    pub fields: Vec<FieldDefinition>,
    /// Vector-search profiles and their algorithm configurations.
    pub vector_search: VectorSearch,
}

impl IndexSchema {
    /// Schema matching [`ArtDocument`]'s wire shape, with one HNSW-backed
    /// vector profile over the image vector field.
    pub fn for_art_documents(name: &str, dimensions: usize) -> Self {
        Self {
            name: name.to_string(),
            fields: vec![
                FieldDefinition::key("objectId"),
                FieldDefinition::searchable("title"),
                FieldDefinition::plain("iiifUrl"),
                FieldDefinition::plain("modelVersion"),
                FieldDefinition::vector("imageVector", dimensions, VECTOR_PROFILE_NAME),
            ],
            vector_search: VectorSearch {
                profiles: vec![VectorSearchProfile {
                    name: VECTOR_PROFILE_NAME.to_string(),
                    algorithm: HNSW_CONFIG_NAME.to_string(),
                }],
                algorithms: vec![HnswAlgorithm {
                    name: HNSW_CONFIG_NAME.to_string(),
                    kind: "hnsw".to_string(),
                    hnsw_parameters: HnswParameters::default(),
                }],
            },
        }
    }
}

/// One field of the index schema.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Field name as stored.
    pub name: String,
    /// Store-side type tag.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Marks the document key field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<bool>,
    /// Enables full-text search over the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searchable: Option<bool>,
    /// Vector width, for vector fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    /// Vector-search profile bound to the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_search_profile: Option<String>,
}

impl FieldDefinition {
    fn key(name: &str) -> Self {
        Self {
            key: Some(true),
            ..Self::plain(name)
        }
    }

    fn searchable(name: &str) -> Self {
        Self {
            searchable: Some(true),
            ..Self::plain(name)
        }
    }

    fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: "Edm.String".to_string(),
            key: None,
            searchable: None,
            dimensions: None,
            vector_search_profile: None,
        }
    }

    fn vector(name: &str, dimensions: usize, profile: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: "Collection(Edm.Single)".to_string(),
            key: None,
            searchable: Some(true),
            dimensions: Some(dimensions),
            vector_search_profile: Some(profile.to_string()),
        }
    }
}

/// Vector-search section of the schema.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearch {
    /// Named profiles binding fields to algorithm configurations.
    pub profiles: Vec<VectorSearchProfile>,
    /// Algorithm configurations referenced by the profiles.
    pub algorithms: Vec<HnswAlgorithm>,
}

/// Binds a profile name to an algorithm configuration.
#[derive(Debug, Clone, Serialize)]
pub struct VectorSearchProfile {
    /// Profile name referenced by vector fields.
    pub name: String,
    /// Algorithm configuration name.
    pub algorithm: String,
}

/// One approximate-nearest-neighbor graph configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HnswAlgorithm {
    /// Configuration name.
    pub name: String,
    /// Algorithm kind tag (`hnsw`).
    pub kind: String,
    /// Graph connectivity and construction parameters.
    pub hnsw_parameters: HnswParameters,
}

/// HNSW graph tuning knobs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HnswParameters {
    /// Bi-directional links per node.
    pub m: usize,
    /// Candidate list size during graph construction.
    pub ef_construction: usize,
    /// Candidate list size during search.
    pub ef_search: usize,
    /// Distance metric.
    pub metric: String,
}

impl Default for HnswParameters {
    fn default() -> Self {
        Self {
            m: 4,
            ef_construction: 400,
            ef_search: 500,
            metric: "cosine".to_string(),
        }
    }
}

/// REST client for the remote search index service.
pub struct SearchIndexClient {
    client: Client,
    endpoint: String,
    index_name: String,
}

impl SearchIndexClient {
    /// Builds a new index store client for one configured index name.
    pub fn new(
        api_key: String,
        endpoint: String,
        index_name: String,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing search API key");
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "search endpoint must be an http(s) URL"
        );
        anyhow::ensure!(!index_name.trim().is_empty(), "missing index name");
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid search API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build search HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index_name,
        })
    }

    fn index_url(&self) -> String {
        format!(
            "{}/indexes/{}?api-version={}",
            self.endpoint, self.index_name, API_VERSION
        )
    }

    fn create_url(&self) -> String {
        format!("{}/indexes?api-version={}", self.endpoint, API_VERSION)
    }

    fn docs_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/index?api-version={}",
            self.endpoint, self.index_name, API_VERSION
        )
    }

    async fn index_exists(&self) -> Result<bool, ProvisionError> {
        let resp = self.client.get(self.index_url()).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(ProvisionError::Probe {
            name: self.index_name.clone(),
            status,
            body,
        })
    }

    async fn delete_index(&self) -> Result<(), ProvisionError> {
        let resp = self.client.delete(self.index_url()).send().await?;
        let status = resp.status();
        // A concurrent drop is fine; the goal is "index gone".
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(ProvisionError::Delete {
            name: self.index_name.clone(),
            status,
            body,
        })
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<(), ProvisionError> {
        let resp = self.client.post(self.create_url()).json(schema).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(ProvisionError::Create {
            name: self.index_name.clone(),
            status,
            body,
        })
    }
}

#[async_trait]
impl IndexStore for SearchIndexClient {
    async fn ensure_index(
        &self,
        schema: &IndexSchema,
        replace_existing: bool,
    ) -> Result<(), ProvisionError> {
        let exists = self.index_exists().await?;
        if exists && !replace_existing {
            debug!(index = %self.index_name, "index already exists; leaving it in place");
            return Ok(());
        }
        if exists {
            info!(index = %self.index_name, "dropping existing index");
            self.delete_index().await?;
        }
        self.create_index(schema).await?;
        info!(index = %self.index_name, "index created");
        Ok(())
    }

    async fn upsert_batch(
        &self,
        documents: &[ArtDocument],
    ) -> Result<BatchSummary, BatchWriteError> {
        if documents.is_empty() {
            return Ok(BatchSummary { submitted: 0 });
        }
        let request = BatchRequest {
            value: documents
                .iter()
                .map(|document| UploadAction {
                    action: "upload",
                    document,
                })
                .collect(),
        };
        let resp = self.client.post(self.docs_url()).json(&request).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(BatchSummary {
                submitted: documents.len(),
            });
        }
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(BatchWriteError::Rejected { status, body })
    }
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    value: Vec<UploadAction<'a>>,
}

#[derive(Serialize)]
struct UploadAction<'a> {
    #[serde(rename = "@search.action")]
    action: &'static str,
    #[serde(flatten)]
    document: &'a ArtDocument,
}
