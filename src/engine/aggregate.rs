//! Score fusion across analyzers that share one document ordering.
//!
//! Each participating analyzer contributes its cosine score per document;
//! the fused score is the mean over participating analyzers, so it stays in
//! [-1, 1] no matter how many fields or languages a query touched.
//! Analyzers skipped for a query (no usable payload field, not ready) are
//! left out of both the sum and the divisor.

use std::collections::HashMap;

use serde::Serialize;

use crate::engine::index::SearchResult;

/// One entry of a fused ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateHit {
    pub document_id: u64,
    pub similarity_score: f32,
}

/// Average `rankings` per document, sort by descending score (ties by
/// ascending document id) and keep the first `top_n`.
pub fn aggregate(rankings: &[Vec<SearchResult>], top_n: usize) -> Vec<AggregateHit> {
    if rankings.is_empty() || top_n == 0 {
        return Vec::new();
    }

    let mut sums: HashMap<u64, f64> = HashMap::new();
    for ranking in rankings {
        for result in ranking {
            *sums.entry(result.id).or_default() += result.score as f64;
        }
    }

    let participants = rankings.len() as f64;
    let mut hits: Vec<AggregateHit> = sums
        .into_iter()
        .map(|(document_id, sum)| AggregateHit {
            document_id,
            similarity_score: (sum / participants) as f32,
        })
        .collect();

    hits.sort_by(|a, b| {
        b.similarity_score
            .total_cmp(&a.similarity_score)
            .then(a.document_id.cmp(&b.document_id))
    });
    hits.truncate(top_n);

    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(pairs: &[(u64, f32)]) -> Vec<SearchResult> {
        pairs
            .iter()
            .map(|&(id, score)| SearchResult { id, score })
            .collect()
    }

    #[test]
    fn test_empty_inputs() {
        assert!(aggregate(&[], 10).is_empty());
        assert!(aggregate(&[ranking(&[(0, 0.5)])], 0).is_empty());
    }

    #[test]
    fn test_skipped_analyzer_not_counted() {
        // The second analyzer had no usable field and never ran, so only
        // two rankings take part.
        let participating = vec![
            ranking(&[(0, 0.9), (1, 0.4)]),
            ranking(&[(0, 0.6), (1, 0.2)]),
        ];
        let hits = aggregate(&participating, 10);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, 0);
        assert!((hits[0].similarity_score - 0.75).abs() < 1e-6);
        assert_eq!(hits[1].document_id, 1);
        assert!((hits[1].similarity_score - 0.3).abs() < 1e-6);

        let top = aggregate(&participating, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].document_id, 0);
    }

    #[test]
    fn test_single_ranking_passes_through() {
        let hits = aggregate(&[ranking(&[(2, 0.8), (0, 0.1), (1, -0.3)])], 10);
        let ids: Vec<u64> = hits.iter().map(|h| h.document_id).collect();
        assert_eq!(ids, vec![2, 0, 1]);
        assert!((hits[2].similarity_score + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_ties_broken_by_document_id() {
        let hits = aggregate(
            &[ranking(&[(3, 0.5), (1, 0.5), (2, 0.5)]), ranking(&[(1, 0.5), (2, 0.5), (3, 0.5)])],
            10,
        );
        let ids: Vec<u64> = hits.iter().map(|h| h.document_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_scores_stay_bounded() {
        let rankings = vec![
            ranking(&[(0, 1.0), (1, -1.0)]),
            ranking(&[(0, 1.0), (1, -1.0)]),
            ranking(&[(0, 1.0), (1, -1.0)]),
        ];
        let hits = aggregate(&rankings, 10);
        assert!(hits.iter().all(|h| (-1.0..=1.0).contains(&h.similarity_score)));
        assert_eq!(hits[0].similarity_score, 1.0);
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let hit = AggregateHit {
            document_id: 4,
            similarity_score: 0.5,
        };
        let json = serde_json::to_value(hit).unwrap();
        assert_eq!(json, serde_json::json!({"document_id": 4, "similarity_score": 0.5}));
    }
}
