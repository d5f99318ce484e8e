//! Latent semantic topic model (truncated SVD of the document-term matrix).
//!
//! Given the document-term count matrix `A` (documents × terms), the model
//! keeps the top `k` right singular vectors of `A = U Σ Vᵀ`. A bag-of-words
//! vector `x` is projected into topic space as `Vₖᵀ x`.
//!
//! `A` is never materialized. The Gram matrix of the smaller side is
//! accumulated from the sparse document vectors and eigen-decomposed:
//! - documents ≤ terms: `A Aᵀ = U Σ² Uᵀ`, then `vᵢ = Aᵀ uᵢ / σᵢ`
//! - otherwise: `Aᵀ A = V Σ² Vᵀ` gives the term vectors directly
//!
//! Conventions (fixed so results are reproducible):
//! - singular triplets are ordered by descending singular value, ties by
//!   ascending position in the decomposition output
//! - each kept term-topic vector is flipped so its largest-magnitude
//!   component (lowest index on ties) is positive
//! - `k = min(topic_count, rank)`, where rank counts eigenvalues `σ²` above
//!   `σ²_max · max(m, n)² · ε`

use nalgebra::{DMatrix, SymmetricEigen};
use rayon::prelude::*;

use crate::engine::artifact::{ArtifactError, ByteReader, ByteWriter};
use crate::engine::vocabulary::{DocumentVector, Vocabulary};

#[derive(Debug, thiserror::Error)]
pub enum TopicModelError {
    #[error("cannot fit a topic model on an empty corpus")]
    EmptyCorpus,

    #[error("cannot fit a topic model with an empty vocabulary")]
    EmptyVocabulary,

    #[error("topic count must be positive")]
    InvalidTopicCount,

    #[error("corpus has no non-zero term counts")]
    DegenerateCorpus,

    #[error("eigen decomposition did not converge")]
    NoConvergence,

    #[error("term id {id} is outside the model vocabulary of {vocabulary_size} terms")]
    ForeignVector { id: u32, vocabulary_size: usize },
}

/// Immutable linear projection from term space into topic space.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicModel {
    topic_count: usize,
    vocabulary_size: usize,
    vocabulary_fingerprint: u32,
    singular_values: Vec<f64>,
    /// `rank × vocabulary_size`, row-major.
    term_topics: Vec<f64>,
}

impl TopicModel {
    /// Fit the model on `corpus`, encoded against `vocabulary`.
    pub fn fit(
        corpus: &[DocumentVector],
        vocabulary: &Vocabulary,
        topic_count: usize,
    ) -> Result<Self, TopicModelError> {
        if corpus.is_empty() {
            return Err(TopicModelError::EmptyCorpus);
        }
        if vocabulary.is_empty() {
            return Err(TopicModelError::EmptyVocabulary);
        }
        if topic_count == 0 {
            return Err(TopicModelError::InvalidTopicCount);
        }

        let rows = corpus.len();
        let cols = vocabulary.len();

        for document in corpus {
            if let Some(&(id, _)) = document.entries().iter().find(|(id, _)| *id as usize >= cols) {
                return Err(TopicModelError::ForeignVector {
                    id,
                    vocabulary_size: cols,
                });
            }
        }

        let by_documents = rows <= cols;
        let gram = if by_documents {
            document_gram(corpus, cols)
        } else {
            term_gram(corpus, cols)
        };

        let eigen =
            SymmetricEigen::try_new(gram, f64::EPSILON, 0).ok_or(TopicModelError::NoConvergence)?;
        let lambda = &eigen.eigenvalues;

        let mut order: Vec<usize> = (0..lambda.len()).collect();
        order.sort_by(|&a, &b| lambda[b].total_cmp(&lambda[a]).then(a.cmp(&b)));

        let lambda_max = order.first().map(|&i| lambda[i]).unwrap_or(0.0);
        if lambda_max <= 0.0 {
            return Err(TopicModelError::DegenerateCorpus);
        }

        let scale = rows.max(cols) as f64;
        let tolerance = lambda_max * scale * scale * f64::EPSILON;
        let rank = order.iter().filter(|&&i| lambda[i] > tolerance).count();
        let kept = rank.min(topic_count);

        let mut singular_values = Vec::with_capacity(kept);
        let mut term_topics = Vec::with_capacity(kept * cols);
        for &i in order.iter().take(kept) {
            let sigma = lambda[i].sqrt();
            let basis = eigen.eigenvectors.column(i);

            let mut row = if by_documents {
                // vᵢ = Aᵀ uᵢ / σᵢ
                let mut row = vec![0.0; cols];
                for (document, weight) in corpus.iter().zip(basis.iter()) {
                    for &(id, count) in document.entries() {
                        row[id as usize] += count as f64 * weight;
                    }
                }
                row.iter_mut().for_each(|value| *value /= sigma);
                row
            } else {
                basis.iter().copied().collect::<Vec<f64>>()
            };

            let norm = row.iter().map(|value| value * value).sum::<f64>().sqrt();
            if norm > 0.0 {
                row.iter_mut().for_each(|value| *value /= norm);
            }

            let mut pivot = 0;
            for (j, value) in row.iter().enumerate() {
                if value.abs() > row[pivot].abs() {
                    pivot = j;
                }
            }
            if row[pivot] < 0.0 {
                row.iter_mut().for_each(|value| *value = -*value);
            }

            singular_values.push(sigma);
            term_topics.extend(row);
        }

        log::debug!(
            "fitted topic model: documents={rows} terms={cols} rank={rank} kept={kept}"
        );

        Ok(Self {
            topic_count,
            vocabulary_size: cols,
            vocabulary_fingerprint: vocabulary.fingerprint(),
            singular_values,
            term_topics,
        })
    }

    /// Actual topic-space dimension (`min(topic_count, rank)`).
    pub fn dimensions(&self) -> usize {
        self.singular_values.len()
    }

    /// Check that this model was fitted against `vocabulary`.
    pub fn is_fitted_on(&self, vocabulary: &Vocabulary) -> bool {
        self.vocabulary_size == vocabulary.len()
            && self.vocabulary_fingerprint == vocabulary.fingerprint()
    }

    /// Project a sparse term vector into topic space.
    pub fn project(&self, vector: &DocumentVector) -> Result<Vec<f64>, TopicModelError> {
        let mut out = vec![0.0; self.dimensions()];
        for &(id, count) in vector.entries() {
            let column = id as usize;
            if column >= self.vocabulary_size {
                return Err(TopicModelError::ForeignVector {
                    id,
                    vocabulary_size: self.vocabulary_size,
                });
            }
            let count = count as f64;
            for (topic, value) in out.iter_mut().enumerate() {
                *value += count * self.term_topics[topic * self.vocabulary_size + column];
            }
        }
        Ok(out)
    }

    /// Project every document, preserving order.
    pub fn project_all(&self, corpus: &[DocumentVector]) -> Result<Vec<Vec<f64>>, TopicModelError> {
        corpus
            .par_iter()
            .map(|document| self.project(document))
            .collect()
    }

    pub(crate) fn write_payload(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.topic_count as u32);
        writer.put_u32(self.vocabulary_size as u32);
        writer.put_u32(self.vocabulary_fingerprint);
        writer.put_u32(self.singular_values.len() as u32);
        for value in &self.singular_values {
            writer.put_f64(*value);
        }
        for value in &self.term_topics {
            writer.put_f64(*value);
        }
    }

    pub(crate) fn read_payload(reader: &mut ByteReader<'_>) -> Result<Self, ArtifactError> {
        let topic_count = reader.get_u32()? as usize;
        let vocabulary_size = reader.get_u32()? as usize;
        let vocabulary_fingerprint = reader.get_u32()?;
        let dimensions = reader.get_u32()? as usize;

        if topic_count == 0 || dimensions > topic_count {
            return Err(ArtifactError::InvalidFormat(format!(
                "topic model has {dimensions} dimensions for topic count {topic_count}"
            )));
        }

        reader.expect_at_least(dimensions, 8)?;
        let singular_values = (0..dimensions)
            .map(|_| reader.get_f64())
            .collect::<Result<Vec<_>, _>>()?;

        let cells = dimensions.saturating_mul(vocabulary_size);
        reader.expect_at_least(cells, 8)?;
        let term_topics = (0..cells)
            .map(|_| reader.get_f64())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            topic_count,
            vocabulary_size,
            vocabulary_fingerprint,
            singular_values,
            term_topics,
        })
    }
}

/// `A Aᵀ` (documents × documents). Rows are computed in parallel against a
/// dense scratch copy of one document.
fn document_gram(corpus: &[DocumentVector], terms: usize) -> DMatrix<f64> {
    let rows = corpus.len();

    let upper: Vec<Vec<f64>> = corpus
        .par_iter()
        .enumerate()
        .map_init(
            || vec![0.0; terms],
            |dense, (i, document)| {
                for &(id, count) in document.entries() {
                    dense[id as usize] = count as f64;
                }
                let row: Vec<f64> = corpus[i..]
                    .iter()
                    .map(|other| {
                        other
                            .entries()
                            .iter()
                            .map(|&(id, count)| dense[id as usize] * count as f64)
                            .sum::<f64>()
                    })
                    .collect();
                for &(id, _) in document.entries() {
                    dense[id as usize] = 0.0;
                }
                row
            },
        )
        .collect();

    let mut gram = DMatrix::<f64>::zeros(rows, rows);
    for (i, row) in upper.iter().enumerate() {
        for (offset, &value) in row.iter().enumerate() {
            gram[(i, i + offset)] = value;
            gram[(i + offset, i)] = value;
        }
    }
    gram
}

/// `Aᵀ A` (terms × terms).
fn term_gram(corpus: &[DocumentVector], terms: usize) -> DMatrix<f64> {
    let mut gram = DMatrix::<f64>::zeros(terms, terms);
    for document in corpus {
        let entries = document.entries();
        for &(a, count_a) in entries {
            for &(b, count_b) in entries {
                gram[(a as usize, b as usize)] += count_a as f64 * count_b as f64;
            }
        }
    }
    gram
}

#[cfg(test)]
impl TopicModel {
    fn topic_count(&self) -> usize {
        self.topic_count
    }

    fn singular_values(&self) -> &[f64] {
        &self.singular_values
    }

    fn topic(&self, topic: usize) -> Option<&[f64]> {
        let start = topic.checked_mul(self.vocabulary_size)?;
        self.term_topics.get(start..start + self.vocabulary_size)
    }
}
