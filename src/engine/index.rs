//! Dense topic-space index with cosine similarity search.
//!
//! Holds one vector per training document in document order; the position
//! of a vector is its document id.

use rayon::prelude::*;

use crate::engine::artifact::{ArtifactError, ByteReader, ByteWriter};
use crate::engine::topic_model::{TopicModel, TopicModelError};
use crate::engine::vocabulary::DocumentVector;

/// Search result from the similarity index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Position of the document in the training batch
    pub id: u64,
    /// Cosine similarity score (-1.0 to 1.0)
    pub score: f32,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Projection(#[from] TopicModelError),
}

/// Unit-normalized document vectors in topic space.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityIndex {
    dimensions: usize,
    /// `len × dimensions`, row-major. Zero rows stand for documents
    /// without any in-vocabulary token.
    vectors: Vec<f32>,
}

impl SimilarityIndex {
    /// Project every document through `model` and store the results in input order.
    pub fn build(model: &TopicModel, corpus: &[DocumentVector]) -> Result<Self, IndexError> {
        let dimensions = model.dimensions();
        let projected = model.project_all(corpus)?;

        let mut vectors = Vec::with_capacity(projected.len() * dimensions);
        for vector in projected {
            vectors.extend(Self::unit(&vector));
        }

        Ok(Self {
            dimensions,
            vectors,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.vectors.len() / self.dimensions
        }
    }

    /// Score `query` against every stored vector.
    ///
    /// Returns all documents, highest score first, ties by ascending id.
    /// A zero query scores 0 against everything.
    pub fn query(&self, query: &[f64]) -> Result<Vec<SearchResult>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query = Self::unit(query);

        let mut results: Vec<SearchResult> = self
            .vectors
            .par_chunks(self.dimensions.max(1))
            .enumerate()
            .map(|(id, target)| SearchResult {
                id: id as u64,
                score: Self::score(&query, target),
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));

        Ok(results)
    }

    /// Scale to unit length in f64, then narrow. Zero vectors stay zero.
    fn unit(v: &[f64]) -> Vec<f32> {
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < f64::EPSILON {
            return vec![0.0; v.len()];
        }
        v.iter().map(|x| (x / norm) as f32).collect()
    }

    /// Cosine of two unit (or zero) vectors, clamped, with -0.0 folded into 0.0
    /// so `total_cmp` orders zero scores by id.
    fn score(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        if dot == 0.0 {
            0.0
        } else {
            dot.clamp(-1.0, 1.0)
        }
    }

    pub(crate) fn write_payload(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.dimensions as u32);
        writer.put_u64(self.len() as u64);
        for value in &self.vectors {
            writer.put_f32(*value);
        }
    }

    pub(crate) fn read_payload(reader: &mut ByteReader<'_>) -> Result<Self, ArtifactError> {
        let dimensions = reader.get_u32()? as usize;
        let count = reader.get_u64()? as usize;

        if dimensions == 0 && count > 0 {
            return Err(ArtifactError::InvalidFormat(
                "index holds documents but has no dimensions".to_string(),
            ));
        }

        let cells = count.saturating_mul(dimensions);
        reader.expect_at_least(cells, 4)?;
        let vectors = (0..cells)
            .map(|_| reader.get_f32())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            dimensions,
            vectors,
        })
    }
}
