//! Retrieval pipeline: document parsing, chunking, embeddings and the
//! per-agent vector index.

pub mod chunker;
pub mod embedder;
pub mod ingestion;
pub mod parser;
pub mod vector;

pub use chunker::{chunk_text, Chunk, ChunkerSettings};
pub use embedder::{EmbedError, EmbeddingClient, EmbeddingPort};
pub use ingestion::{DocumentIngestionPipeline, IngestionError, IngestionReport};
pub use parser::{pages_from_text, parse_document, ParsedDocument, ParsedSection, RawLine, RawPage};
pub use vector::{InMemoryVectorIndex, QdrantIndex, ScoredFragment, VectorError, VectorIndex};
