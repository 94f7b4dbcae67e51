//! In-memory nearest-neighbour index over chunked text documents.
//!
//! Built once per process start from the documents present in the source
//! directory; read-only afterwards, so it is safe to share behind an `Arc`
//! across concurrent request handlers. Nothing is persisted across restarts.

use super::chunker::split_with_overlap;
use super::embeddings::EmbeddingProvider;
use anyhow::Context;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How many chunks are embedded per upstream call during the build.
const EMBED_BATCH_SIZE: usize = 64;

/// One indexed slice of a source document.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    /// File name the chunk came from.
    pub source: String,
    /// Position of the chunk within its document (0-based).
    pub ordinal: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A search hit with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub source: String,
    pub text: String,
    pub score: f32,
}

pub struct RetrievalIndex {
    chunks: Vec<DocumentChunk>,
}

impl RetrievalIndex {
    /// Build the index from every `*.txt` file under `docs_dir`.
    ///
    /// Files are visited in sorted path order so the build is deterministic
    /// for a given document set. A missing or empty directory produces an
    /// empty index rather than an error.
    pub async fn build(
        docs_dir: &Path,
        chunk_size: usize,
        chunk_overlap: usize,
        embedder: &dyn EmbeddingProvider,
    ) -> anyhow::Result<Self> {
        let mut chunks = Vec::new();

        for path in collect_text_files(docs_dir) {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("read document {}", path.display()))?;
            let source = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            for (ordinal, piece) in split_with_overlap(&text, chunk_size, chunk_overlap)
                .into_iter()
                .enumerate()
            {
                chunks.push(DocumentChunk {
                    source: source.clone(),
                    ordinal,
                    text: piece,
                    embedding: Vec::new(),
                });
            }
        }

        if embedder.dimensions() > 0 {
            for batch in chunks.chunks_mut(EMBED_BATCH_SIZE) {
                let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
                let vectors = embedder
                    .embed(&texts)
                    .await
                    .context("embed document chunks")?;
                anyhow::ensure!(
                    vectors.len() == batch.len(),
                    "embedding batch size mismatch: sent {}, got {}",
                    batch.len(),
                    vectors.len()
                );
                for (chunk, vector) in batch.iter_mut().zip(vectors) {
                    chunk.embedding = vector;
                }
            }
        }

        Ok(Self { chunks })
    }

    /// Construct an index directly from pre-built chunks (test seam).
    pub fn from_chunks(chunks: Vec<DocumentChunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Return the `k` chunks whose embeddings are nearest to the query's.
    pub async fn search(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
        k: usize,
    ) -> anyhow::Result<Vec<ScoredChunk>> {
        if self.chunks.is_empty() || k == 0 || embedder.dimensions() == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = embedder.embed_one(query).await.context("embed query")?;

        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                source: chunk.source.clone(),
                text: chunk.text.clone(),
                score: cosine_similarity(&query_embedding, &chunk.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Concatenate search hits with a 1-based positional label for presentation.
pub fn render_passages(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[{}] {}", i + 1, hit.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collect_text_files(docs_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(docs_dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();
    files
}

/// Cosine similarity between two vectors, clamped to `0.0..=1.0`.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() || denom < f64::EPSILON {
        return 0.0;
    }

    let raw = dot / denom;
    if !raw.is_finite() {
        return 0.0;
    }

    #[allow(clippy::cast_possible_truncation)]
    let sim = raw.clamp(0.0, 1.0) as f32;
    sim
}
