//! In-memory exact nearest-neighbor index
//!
//! Holds one document's windows and their embeddings. The index is built
//! once from a complete set of vectors and never updated afterwards; a new
//! document gets a new index.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use pdfqa_core::{DistanceMetric, DocumentChunk, PdfQaError, Result, RetrievedChunk};

/// Flat index over a document's window embeddings
#[derive(Debug, Clone)]
pub struct VectorIndex {
    metric: DistanceMetric,
    /// One row per chunk
    vectors: Array2<f32>,
    /// Row norms, used by the cosine metric
    norms: Array1<f32>,
    chunks: Vec<DocumentChunk>,
}

impl VectorIndex {
    /// Build an index from chunks and their embeddings (same order)
    pub fn build(
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(PdfQaError::Index(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some((i, v)) = embeddings
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != dimension)
        {
            return Err(PdfQaError::Index(format!(
                "embedding {i} has dimension {}, expected {dimension}",
                v.len()
            )));
        }
        if dimension == 0 && !embeddings.is_empty() {
            return Err(PdfQaError::Index("embeddings are empty vectors".to_string()));
        }

        let rows = embeddings.len();
        let flat: Vec<f32> = embeddings.into_iter().flatten().collect();
        let vectors = Array2::from_shape_vec((rows, dimension), flat)
            .map_err(|e| PdfQaError::Index(format!("invalid embedding matrix: {e}")))?;
        let norms = vectors.map_axis(Axis(1), |row| row.dot(&row).sqrt());

        Ok(Self {
            metric,
            vectors,
            norms,
            chunks,
        })
    }

    /// Number of stored windows
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Vector dimension (0 for an empty index)
    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Stored windows in insertion order
    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    /// Return the `k` stored windows closest to `query`, best first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension() {
            return Err(PdfQaError::Index(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dimension()
            )));
        }

        let query = ArrayView1::from(query);
        let query_norm = query.dot(&query).sqrt();

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .outer_iter()
            .enumerate()
            .map(|(i, row)| (i, self.score(row, query, self.norms[i], query_norm)))
            .collect();

        // Stable sort keeps document order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, (i, score))| RetrievedChunk {
                chunk: self.chunks[i].clone(),
                rank: rank + 1,
                score,
            })
            .collect())
    }

    /// Similarity in which higher is better
    fn score(
        &self,
        row: ArrayView1<f32>,
        query: ArrayView1<f32>,
        row_norm: f32,
        query_norm: f32,
    ) -> f32 {
        match self.metric {
            DistanceMetric::L2 => {
                let diff = &row - &query;
                let distance = diff.dot(&diff).sqrt();
                1.0 / (1.0 + distance)
            }
            DistanceMetric::Cosine => {
                if row_norm == 0.0 || query_norm == 0.0 {
                    0.0
                } else {
                    row.dot(&query) / (row_norm * query_norm)
                }
            }
        }
    }
}
