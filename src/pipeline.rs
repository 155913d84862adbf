//! Enrichment pipeline: chunked per-record vectorization and per-chunk bulk
//! loading with failure isolation at both granularities.

use anyhow::Result;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::{ArtDocument, RunSummary};
use crate::search::{IndexSchema, IndexStore};
use crate::source::RecordSource;
use crate::vision::ImageVectorizer;

/// Drives one full enrichment-and-load run.
///
/// Chunks and records are processed strictly sequentially. A failed vectorize
/// call skips that record; a failed batch write drops that chunk; both leave
/// the rest of the run untouched. Only index provisioning and the record
/// fetch are fatal.
pub struct Pipeline<'a> {
    source: &'a dyn RecordSource,
    vectorizer: &'a dyn ImageVectorizer,
    store: &'a dyn IndexStore,
    chunk_size: usize,
}

impl<'a> Pipeline<'a> {
    /// Builds a pipeline over the three gateways.
    pub fn new(
        source: &'a dyn RecordSource,
        vectorizer: &'a dyn ImageVectorizer,
        store: &'a dyn IndexStore,
        chunk_size: usize,
    ) -> Result<Self> {
        anyhow::ensure!(chunk_size >= 1, "chunk size must be at least 1");
        Ok(Self {
            source,
            vectorizer,
            store,
            chunk_size,
        })
    }

    /// Runs the pipeline to completion. A lossy run (skipped records, lost
    /// chunks) still returns `Ok`; the summary carries the loss counts.
    pub async fn run(
        &self,
        schema: &IndexSchema,
        replace_existing: bool,
    ) -> Result<RunSummary, PipelineError> {
        self.store.ensure_index(schema, replace_existing).await?;
        info!(index = %schema.name, "index ready; fetching records");

        let records = self.source.fetch_all().await?;
        let mut summary = RunSummary {
            records_total: records.len(),
            ..RunSummary::default()
        };
        if records.is_empty() {
            info!("no records to index");
            return Ok(summary);
        }

        let chunks: Vec<_> = records.chunks(self.chunk_size).collect();
        summary.chunks_total = chunks.len();
        info!(
            records = records.len(),
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            "records retrieved; enriching with embeddings"
        );

        for (position, chunk) in chunks.iter().enumerate() {
            let current = position + 1;
            let mut documents = Vec::with_capacity(chunk.len());
            for record in *chunk {
                let Some(image_url) = record.image_url() else {
                    warn!(
                        id = record.object_id,
                        title = %record.title,
                        "no IIIF url; skipping record"
                    );
                    summary.skipped_no_image += 1;
                    continue;
                };
                match self.vectorizer.vectorize(&image_url).await {
                    Ok(embedding) => {
                        documents.push(ArtDocument::new(record, embedding));
                        summary.records_enriched += 1;
                    }
                    Err(err) => {
                        warn!(
                            id = record.object_id,
                            title = %record.title,
                            url = %image_url,
                            error = %err,
                            "vectorize failed; skipping record"
                        );
                        summary.skipped_vectorize += 1;
                    }
                }
            }

            info!(
                "[{} of {}] chunk enriched; upserting {} document(s)",
                current,
                summary.chunks_total,
                documents.len()
            );
            match self.store.upsert_batch(&documents).await {
                Ok(batch) => {
                    summary.chunks_committed += 1;
                    summary.documents_indexed += batch.submitted;
                }
                Err(err) => {
                    warn!(
                        chunk = current,
                        error = %err,
                        "chunk could not be written; continuing"
                    );
                    summary.chunks_lost += 1;
                }
            }
        }

        info!(
            chunks = summary.chunks_total,
            committed = summary.chunks_committed,
            lost = summary.chunks_lost,
            indexed = summary.documents_indexed,
            "all chunks processed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::*;
    use crate::error::{BatchWriteError, SourceError, VectorizeError};
    use crate::models::{ImageEmbedding, SourceRecord};
    use crate::search::BatchSummary;

    struct StaticSource(Vec<SourceRecord>);

    #[async_trait]
    impl RecordSource for StaticSource {
        async fn fetch_all(&self) -> Result<Vec<SourceRecord>, SourceError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct StubVectorizer {
        calls: Mutex<Vec<String>>,
        fail_on_substring: Option<String>,
    }

    #[async_trait]
    impl ImageVectorizer for StubVectorizer {
        async fn vectorize(&self, image_url: &str) -> Result<ImageEmbedding, VectorizeError> {
            self.calls.lock().unwrap().push(image_url.to_string());
            if let Some(needle) = &self.fail_on_substring {
                if image_url.contains(needle.as_str()) {
                    return Err(VectorizeError::Status {
                        status: StatusCode::SERVICE_UNAVAILABLE,
                        attempts: 6,
                        body: "unavailable".to_string(),
                    });
                }
            }
            Ok(ImageEmbedding {
                vector: vec![0.5, -0.5],
                model_version: "2023-04-15".to_string(),
            })
        }
    }

    /// Records every batch (as object ids) and optionally rejects one
    /// 1-based batch position.
    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Vec<String>>>,
        fail_on_batch: Option<usize>,
        ensure_calls: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl IndexStore for RecordingStore {
        async fn ensure_index(
            &self,
            _schema: &IndexSchema,
            replace_existing: bool,
        ) -> Result<(), crate::error::ProvisionError> {
            self.ensure_calls.lock().unwrap().push(replace_existing);
            Ok(())
        }

        async fn upsert_batch(
            &self,
            documents: &[ArtDocument],
        ) -> Result<BatchSummary, BatchWriteError> {
            let mut batches = self.batches.lock().unwrap();
            let position = batches.len() + 1;
            batches.push(documents.iter().map(|d| d.object_id.clone()).collect());
            if self.fail_on_batch == Some(position) {
                return Err(BatchWriteError::Rejected {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "store down".to_string(),
                });
            }
            Ok(BatchSummary {
                submitted: documents.len(),
            })
        }
    }

    fn record(object_id: i64, with_image: bool) -> SourceRecord {
        SourceRecord {
            object_id,
            title: format!("Object {object_id}"),
            iiif_url: with_image
                .then(|| format!("https://media.example.org/iiif/{object_id}")),
        }
    }

    fn records(count: i64) -> Vec<SourceRecord> {
        (1..=count).map(|id| record(id, true)).collect()
    }

    fn schema() -> IndexSchema {
        IndexSchema::for_art_documents("gallerydata", 2)
    }

    #[tokio::test]
    async fn chunks_cover_the_record_set_in_order() {
        let source = StaticSource(records(2500));
        let vectorizer = StubVectorizer::default();
        let store = RecordingStore::default();
        let pipeline = Pipeline::new(&source, &vectorizer, &store, 1000).unwrap();

        let summary = pipeline.run(&schema(), true).await.expect("run completes");

        let batches = store.batches.lock().unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(batches[0].first().map(String::as_str), Some("1"));
        assert_eq!(batches[1].first().map(String::as_str), Some("1001"));
        assert_eq!(batches[2].last().map(String::as_str), Some("2500"));
        assert_eq!(summary.chunks_total, 3);
        assert_eq!(summary.chunks_committed, 3);
        assert_eq!(summary.documents_indexed, 2500);
        assert!(summary.is_lossless());
        assert_eq!(store.ensure_calls.lock().unwrap().as_slice(), &[true]);
    }

    #[tokio::test]
    async fn record_without_image_never_reaches_the_vectorizer() {
        let source = StaticSource(vec![record(1, true), record(2, false), record(3, true)]);
        let vectorizer = StubVectorizer::default();
        let store = RecordingStore::default();
        let pipeline = Pipeline::new(&source, &vectorizer, &store, 1000).unwrap();

        let summary = pipeline.run(&schema(), true).await.expect("run completes");

        let calls = vectorizer.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|url| !url.contains("/iiif/2/")));
        let batches = store.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec!["1".to_string(), "3".to_string()]);
        assert_eq!(summary.skipped_no_image, 1);
        assert_eq!(summary.records_enriched, 2);
    }

    #[tokio::test]
    async fn failed_vectorize_skips_only_that_record() {
        let source = StaticSource(records(3));
        let vectorizer = StubVectorizer {
            fail_on_substring: Some("/iiif/2/".to_string()),
            ..StubVectorizer::default()
        };
        let store = RecordingStore::default();
        let pipeline = Pipeline::new(&source, &vectorizer, &store, 1000).unwrap();

        let summary = pipeline.run(&schema(), true).await.expect("run completes");

        assert_eq!(vectorizer.calls.lock().unwrap().len(), 3);
        let batches = store.batches.lock().unwrap();
        assert_eq!(batches[0], vec!["1".to_string(), "3".to_string()]);
        assert_eq!(summary.skipped_vectorize, 1);
        assert_eq!(summary.records_enriched, 2);
        assert!(!summary.is_lossless());
    }

    #[tokio::test]
    async fn lost_chunk_does_not_abort_or_resubmit() {
        let source = StaticSource(records(25));
        let vectorizer = StubVectorizer::default();
        let store = RecordingStore {
            fail_on_batch: Some(2),
            ..RecordingStore::default()
        };
        let pipeline = Pipeline::new(&source, &vectorizer, &store, 10).unwrap();

        let summary = pipeline.run(&schema(), true).await.expect("run completes");

        let batches = store.batches.lock().unwrap();
        assert_eq!(batches.len(), 3);
        let lost: &[String] = &batches[1];
        assert!(lost.iter().all(|id| !batches[0].contains(id) && !batches[2].contains(id)));
        assert_eq!(summary.chunks_committed, 2);
        assert_eq!(summary.chunks_lost, 1);
        assert_eq!(summary.documents_indexed, 15);
    }

    #[tokio::test]
    async fn empty_record_set_completes_without_upserts() {
        let source = StaticSource(Vec::new());
        let vectorizer = StubVectorizer::default();
        let store = RecordingStore::default();
        let pipeline = Pipeline::new(&source, &vectorizer, &store, 1000).unwrap();

        let summary = pipeline.run(&schema(), true).await.expect("run completes");

        assert_eq!(summary.chunks_total, 0);
        assert!(store.batches.lock().unwrap().is_empty());
        assert_eq!(store.ensure_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn provisioning_failure_aborts_before_enrichment() {
        struct BrokenStore;

        #[async_trait]
        impl IndexStore for BrokenStore {
            async fn ensure_index(
                &self,
                schema: &IndexSchema,
                _replace_existing: bool,
            ) -> Result<(), crate::error::ProvisionError> {
                Err(crate::error::ProvisionError::Create {
                    name: schema.name.clone(),
                    status: StatusCode::FORBIDDEN,
                    body: "denied".to_string(),
                })
            }

            async fn upsert_batch(
                &self,
                _documents: &[ArtDocument],
            ) -> Result<BatchSummary, BatchWriteError> {
                panic!("must not be reached when provisioning fails");
            }
        }

        let source = StaticSource(records(3));
        let vectorizer = StubVectorizer::default();
        let store = BrokenStore;
        let pipeline = Pipeline::new(&source, &vectorizer, &store, 1000).unwrap();

        let err = pipeline
            .run(&schema(), true)
            .await
            .expect_err("provisioning failure is fatal");
        assert!(matches!(err, PipelineError::Provision(_)));
        assert!(vectorizer.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let source = StaticSource(Vec::new());
        let vectorizer = StubVectorizer::default();
        let store = RecordingStore::default();
        assert!(Pipeline::new(&source, &vectorizer, &store, 0).is_err());
    }
}
