//! End-to-end document ingestion: parse, chunk, embed, index, finalize.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use concierge_core::domain::document::{Fragment, KnowledgeDocument};
use concierge_db::repositories::{DocumentRepository, RepositoryError};

use crate::chunker::{chunk_text, Chunk, ChunkerSettings};
use crate::embedder::{EmbedError, EmbeddingPort};
use crate::parser::{parse_document, RawPage};
use crate::vector::{VectorError, VectorIndex};

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("document produced no indexable text")]
    Empty,
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),
    #[error("vector index failed: {0}")]
    Index(#[from] VectorError),
    #[error("repository failed: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestionReport {
    pub page_count: i64,
    pub chunk_count: i64,
}

pub struct DocumentIngestionPipeline {
    documents: Arc<dyn DocumentRepository>,
    embedder: Arc<dyn EmbeddingPort>,
    index: Arc<dyn VectorIndex>,
    settings: ChunkerSettings,
}

impl DocumentIngestionPipeline {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        embedder: Arc<dyn EmbeddingPort>,
        index: Arc<dyn VectorIndex>,
        settings: ChunkerSettings,
    ) -> Self {
        Self { documents, embedder, index, settings }
    }

    /// Ingest an already-registered document. On failure the document is
    /// marked `error` and any fragments written for it are rolled back.
    pub async fn ingest(
        &self,
        document: &KnowledgeDocument,
        pages: &[RawPage],
    ) -> Result<IngestionReport, IngestionError> {
        match self.run(document, pages).await {
            Ok(report) => {
                self.documents
                    .mark_ready(&document.id, report.page_count, report.chunk_count)
                    .await?;
                tracing::info!(
                    event_name = "rag.ingest.ready",
                    document_id = %document.id,
                    page_count = report.page_count,
                    chunk_count = report.chunk_count,
                );
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(
                    event_name = "rag.ingest.failed",
                    document_id = %document.id,
                    error = %err,
                );
                // Roll back fragments first so a ready retry starts clean.
                if let Err(rollback) =
                    self.index.delete_by_document(document.agent_id, &document.id).await
                {
                    tracing::error!(
                        event_name = "rag.ingest.rollback_failed",
                        document_id = %document.id,
                        error = %rollback,
                    );
                }
                self.documents.mark_error(&document.id, &err.to_string()).await?;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        document: &KnowledgeDocument,
        pages: &[RawPage],
    ) -> Result<IngestionReport, IngestionError> {
        let parsed = parse_document(pages);

        let mut chunks: Vec<Chunk> = Vec::new();
        for section in &parsed.sections {
            chunks.extend(chunk_text(&section.content, &section.title, section.page, &self.settings));
        }
        if chunks.is_empty() {
            return Err(IngestionError::Empty);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let fragments: Vec<Fragment> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| Fragment {
                id: Uuid::new_v4(),
                document_id: document.id,
                text: chunk.text,
                section: chunk.section,
                page: chunk.page,
                chunk_index: chunk.chunk_index,
                embedding,
            })
            .collect();

        self.index.upsert(document.agent_id, &document.filename, &fragments).await?;

        Ok(IngestionReport {
            page_count: parsed.page_count,
            chunk_count: fragments.len() as i64,
        })
    }

    /// Delete a document and exactly its fragments.
    pub async fn delete_document(
        &self,
        document: &KnowledgeDocument,
    ) -> Result<(), IngestionError> {
        self.index.delete_by_document(document.agent_id, &document.id).await?;
        self.documents.delete(&document.id).await?;
        tracing::info!(event_name = "rag.ingest.document_deleted", document_id = %document.id);
        Ok(())
    }
}
