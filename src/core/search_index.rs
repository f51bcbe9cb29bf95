//! Exact nearest-neighbor structure over the stored vectors.

use serde::Serialize;

use super::state::IndexState;
use crate::error::{AppError, Result};

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub file_id: String,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Flat L2 index: vectors packed row-major next to their chunk texts.
///
/// Built once from a complete set of vectors and never mutated afterwards;
/// a new index is built and published in place of the old one.
#[derive(Debug)]
pub struct SearchIndex {
    dimension: usize,
    data: Vec<f32>,
    chunks: Vec<String>,
    owners: Vec<String>,
    embedding_model: Option<String>,
}

impl SearchIndex {
    /// Build from parallel lists. Returns `Ok(None)` when there is nothing
    /// to search.
    pub fn build(
        chunks: Vec<String>,
        owners: Vec<String>,
        vectors: &[Vec<f32>],
    ) -> Result<Option<Self>> {
        if chunks.len() != vectors.len() || owners.len() != vectors.len() {
            return Err(AppError::Corrupt(format!(
                "search structure needs parallel lists: {} chunks, {} owners, {} vectors",
                chunks.len(),
                owners.len(),
                vectors.len()
            )));
        }
        let Some(dimension) = vectors.first().map(Vec::len) else {
            return Ok(None);
        };
        if dimension == 0 {
            return Err(AppError::Corrupt("zero-length embedding vector".into()));
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for vector in vectors {
            if vector.len() != dimension {
                return Err(AppError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        Ok(Some(Self {
            dimension,
            data,
            chunks,
            owners,
            embedding_model: None,
        }))
    }

    /// Record the model that produced the vectors
    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.embedding_model = model;
        self
    }

    pub fn from_state(state: &IndexState) -> Result<Option<Self>> {
        let index = Self::build(
            state.chunks().to_vec(),
            state.owners().to_vec(),
            state.vectors(),
        )?;
        Ok(index.map(|index| index.with_model(state.embedding_model().map(String::from))))
    }

    #[must_use]
    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Vectors held; always equal to [`Self::len`]
    #[must_use]
    pub fn vector_count(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// The `k` chunks closest to `query`, closest first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .map(|row| squared_l2(row, query))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, distance)| SearchHit {
                text: self.chunks[i].clone(),
                file_id: self.owners[i].clone(),
                distance,
            })
            .collect())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> SearchIndex {
        SearchIndex::build(
            vec!["origin".into(), "far".into(), "near".into()],
            vec!["a".into(), "b".into(), "a".into()],
            &[vec![0.0, 0.0], vec![10.0, 10.0], vec![1.0, 0.0]],
        )
        .unwrap()
        .unwrap()
    }

    #[test]
    fn test_results_ordered_by_distance() {
        let hits = index().search(&[0.9, 0.0], 3).unwrap();
        let texts: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["near", "origin", "far"]);
        assert!(hits[0].distance <= hits[1].distance);
        assert_eq!(hits[0].file_id, "a");
    }

    #[test]
    fn test_k_limits_results() {
        assert_eq!(index().search(&[0.0, 0.0], 2).unwrap().len(), 2);
        assert!(index().search(&[0.0, 0.0], 0).unwrap().is_empty());
        assert_eq!(index().search(&[0.0, 0.0], 50).unwrap().len(), 3);
    }

    #[test]
    fn test_empty_input_builds_nothing() {
        assert!(SearchIndex::build(vec![], vec![], &[]).unwrap().is_none());
    }

    #[test]
    fn test_query_dimension_checked() {
        assert!(matches!(
            index().search(&[1.0, 2.0, 3.0], 1),
            Err(AppError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_length_vectors_rejected() {
        let result = SearchIndex::build(vec!["x".into()], vec!["a".into()], &[vec![]]);
        assert!(matches!(result, Err(AppError::Corrupt(_))));
    }

    #[test]
    fn test_ragged_lists_rejected() {
        let result = SearchIndex::build(vec!["x".into()], vec![], &[vec![1.0]]);
        assert!(matches!(result, Err(AppError::Corrupt(_))));
    }
}
