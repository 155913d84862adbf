//! Relational record source gateway.

use async_trait::async_trait;
use tokio_postgres::NoTls;
use tracing::error;

use crate::error::SourceError;
use crate::models::SourceRecord;

/// Yields the full record set for one run. Seam for pipeline tests.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetches every catalog record. Failure here is fatal to the run and is
    /// never retried.
    async fn fetch_all(&self) -> Result<Vec<SourceRecord>, SourceError>;
}

// Ordered by object id so chunk derivation is deterministic across runs.
const RECORD_QUERY: &str = "\
    SELECT o.objectid::bigint AS objectid, o.title, i.iiifurl \
    FROM objects o \
    LEFT JOIN published_images i ON i.depictstmsobjectid = o.objectid \
    ORDER BY o.objectid";

/// Catalog source backed by the open data Postgres database.
pub struct PostgresSource {
    database_url: String,
}

impl PostgresSource {
    /// Builds a source over the given connection string.
    pub fn new(database_url: String) -> Self {
        Self { database_url }
    }
}

#[async_trait]
impl RecordSource for PostgresSource {
    async fn fetch_all(&self) -> Result<Vec<SourceRecord>, SourceError> {
        let (client, connection) = tokio_postgres::connect(&self.database_url, NoTls)
            .await
            .map_err(SourceError::Connect)?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(%err, "postgres connection error");
            }
        });

        let rows = client
            .query(RECORD_QUERY, &[])
            .await
            .map_err(SourceError::Query)?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let object_id: i64 = row.try_get("objectid").map_err(SourceError::Query)?;
            let title: Option<String> = row.try_get("title").map_err(SourceError::Query)?;
            let iiif_url: Option<String> = row.try_get("iiifurl").map_err(SourceError::Query)?;
            records.push(SourceRecord {
                object_id,
                title: title.unwrap_or_default(),
                iiif_url,
            });
        }
        Ok(records)
    }
}
