//! Retrieval-augmented generation support: document chunking, embeddings,
//! and the in-memory similarity index built once at startup.

pub mod chunker;
pub mod embeddings;
pub mod index;

pub use embeddings::{EmbeddingProvider, NoopEmbedding, OpenAiEmbedding};
pub use index::{DocumentChunk, RetrievalIndex, ScoredChunk, render_passages};
