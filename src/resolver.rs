use ndarray::ArrayView1;
use std::cmp::Ordering;

use crate::embedding::EmbeddingTable;

/// Number of neighbours listed by the diagnostic ranking.
pub const DIAGNOSTIC_TOP_K: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    EmptyTable,
    DimensionMismatch { expected: usize, got: usize },
}

impl std::fmt::Display for ResolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverError::EmptyTable => write!(f, "Cannot resolve against an empty table"),
            ResolverError::DimensionMismatch { expected, got } => write!(
                f,
                "Query vector has length {}, table vectors have length {}",
                got, expected
            ),
        }
    }
}

impl std::error::Error for ResolverError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestWord<'a> {
    pub word: &'a str,
    pub distance: f32,
    /// Times the running best improved during the scan.
    pub improvements: usize,
}

/// Top-k neighbours by two metrics, for inspecting predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighbourRanking {
    pub euclidean: Vec<(String, f32)>,
    pub cosine: Vec<(String, f32)>,
}

pub fn euclidean_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// `1 - cos(a, b)`; 1.0 when either vector has zero norm.
pub fn cosine_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - a.dot(&b) / (norm_a * norm_b)
}

/// Maps arbitrary vectors back to the closest table word.
///
/// Linear scan in table order with strict L2 distance; on ties the earliest
/// row wins.
#[derive(Debug, Clone, Copy)]
pub struct NearestWordResolver<'a> {
    table: &'a EmbeddingTable,
}

impl<'a> NearestWordResolver<'a> {
    pub fn new(table: &'a EmbeddingTable) -> Self {
        Self { table }
    }

    fn check(&self, vector: &ArrayView1<f32>) -> Result<(), ResolverError> {
        if self.table.is_empty() {
            return Err(ResolverError::EmptyTable);
        }
        if vector.len() != self.table.vector_len() {
            return Err(ResolverError::DimensionMismatch {
                expected: self.table.vector_len(),
                got: vector.len(),
            });
        }
        Ok(())
    }

    pub fn resolve(&self, vector: ArrayView1<f32>) -> Result<NearestWord<'a>, ResolverError> {
        self.check(&vector)?;

        let mut best_row = 0usize;
        let mut best_distance = f32::INFINITY;
        let mut improvements = 0usize;
        for (row, candidate) in self.table.vectors().outer_iter().enumerate() {
            let distance = euclidean_distance(vector, candidate);
            if distance < best_distance {
                best_distance = distance;
                best_row = row;
                improvements += 1;
            }
        }

        let word = self.table.word_at(best_row).ok_or(ResolverError::EmptyTable)?;
        Ok(NearestWord {
            word,
            distance: best_distance,
            improvements,
        })
    }

    /// Ranks every table word by Euclidean and by cosine distance.
    pub fn rank(&self, vector: ArrayView1<f32>, k: usize) -> Result<NeighbourRanking, ResolverError> {
        self.check(&vector)?;

        let mut euclidean = Vec::with_capacity(self.table.len());
        let mut cosine = Vec::with_capacity(self.table.len());
        for (word, candidate) in self.table.words().iter().zip(self.table.vectors().outer_iter()) {
            euclidean.push((word.clone(), euclidean_distance(vector, candidate)));
            cosine.push((word.clone(), cosine_distance(vector, candidate)));
        }
        // Stable sort keeps table order among equal distances.
        let by_distance = |a: &(String, f32), b: &(String, f32)| {
            a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal)
        };
        euclidean.sort_by(by_distance);
        cosine.sort_by(by_distance);
        euclidean.truncate(k);
        cosine.truncate(k);
        Ok(NeighbourRanking { euclidean, cosine })
    }

    /// Resolves and, at debug level, logs the scan and the top neighbours.
    pub fn resolve_verbose(&self, vector: ArrayView1<f32>) -> Result<NearestWord<'a>, ResolverError> {
        let nearest = self.resolve(vector)?;
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "--> {}: {} (match improved {} times)",
                nearest.word,
                nearest.distance,
                nearest.improvements
            );
            let ranking = self.rank(vector, DIAGNOSTIC_TOP_K)?;
            for (e, c) in ranking.euclidean.iter().zip(ranking.cosine.iter()) {
                log::debug!("{}  {}", e.1, e.0);
                log::debug!("{}  {}", c.1, c.0);
                log::debug!("---");
            }
        }
        Ok(nearest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, Array1};
    use proptest::prelude::*;

    fn two_word_table() -> EmbeddingTable {
        EmbeddingTable::from_vectors(vec![("a", vec![0.0, 0.0]), ("b", vec![1.0, 1.0])], 2)
            .expect("valid table")
    }

    #[test]
    fn test_resolve_picks_closest_word() -> Result<(), ResolverError> {
        let table = two_word_table();
        let resolver = NearestWordResolver::new(&table);
        let nearest = resolver.resolve(arr1(&[0.9, 0.9]).view())?;
        assert_eq!(nearest.word, "b");
        assert_abs_diff_eq!(nearest.distance, (0.02f32).sqrt(), epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_exact_vector_has_zero_distance() -> Result<(), ResolverError> {
        let table = two_word_table();
        let resolver = NearestWordResolver::new(&table);
        let nearest = resolver.resolve(arr1(&[1.0, 1.0]).view())?;
        assert_eq!(nearest.word, "b");
        assert_eq!(nearest.distance, 0.0);
        Ok(())
    }

    #[test]
    fn test_ties_go_to_first_inserted() -> Result<(), ResolverError> {
        let table = EmbeddingTable::from_vectors(
            vec![("zeta", vec![1.0, 0.0]), ("alpha", vec![-1.0, 0.0])],
            2,
        )
        .expect("valid table");
        let resolver = NearestWordResolver::new(&table);
        assert_eq!(resolver.resolve(arr1(&[0.0, 0.0]).view())?.word, "zeta");
        Ok(())
    }

    #[test]
    fn test_dimension_mismatch() {
        let table = two_word_table();
        let resolver = NearestWordResolver::new(&table);
        assert_eq!(
            resolver.resolve(arr1(&[0.0, 0.0, 0.0]).view()),
            Err(ResolverError::DimensionMismatch { expected: 2, got: 3 })
        );
    }

    #[test]
    fn test_empty_table() {
        let table = EmbeddingTable::from_vectors(Vec::<(String, Vec<f32>)>::new(), 2)
            .expect("empty table builds");
        let resolver = NearestWordResolver::new(&table);
        assert_eq!(resolver.resolve(arr1(&[0.0, 0.0]).view()), Err(ResolverError::EmptyTable));
    }

    #[test]
    fn test_rank_orders_by_both_metrics() -> Result<(), ResolverError> {
        let table = EmbeddingTable::from_vectors(
            vec![
                ("near", vec![1.0, 0.1]),
                ("same_direction_far", vec![10.0, 0.0]),
                ("opposite", vec![-1.0, 0.0]),
            ],
            2,
        )
        .expect("valid table");
        let resolver = NearestWordResolver::new(&table);
        let ranking = resolver.rank(arr1(&[1.0, 0.0]).view(), 2)?;

        assert_eq!(ranking.euclidean.len(), 2);
        assert_eq!(ranking.euclidean[0].0, "near");
        assert_eq!(ranking.cosine[0].0, "same_direction_far");
        assert_abs_diff_eq!(ranking.cosine[0].1, 0.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_cosine_distance_zero_vector() {
        let zero = Array1::<f32>::zeros(2);
        assert_eq!(cosine_distance(zero.view(), arr1(&[1.0, 0.0]).view()), 1.0);
    }

    proptest! {
        #[test]
        fn prop_resolve_returns_table_word(query in prop::collection::vec(-2.0f32..2.0, 2)) {
            let table = EmbeddingTable::from_vectors(
                vec![("a", vec![0.0, 0.0]), ("b", vec![1.0, 1.0]), ("c", vec![-1.0, 0.5])],
                2,
            ).expect("valid table");
            let resolver = NearestWordResolver::new(&table);
            let query = Array1::from(query);
            let nearest = resolver.resolve(query.view()).expect("valid query");
            prop_assert!(table.contains(nearest.word));
            for candidate in table.vectors().outer_iter() {
                prop_assert!(nearest.distance <= euclidean_distance(query.view(), candidate));
            }
        }
    }
}
