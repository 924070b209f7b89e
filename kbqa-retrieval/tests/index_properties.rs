//! Property tests for exhaustive L2 search and index persistence.

use kbqa_retrieval::{DocumentChunk, SimilarityIndex, source_digest};
use proptest::prelude::*;

const DIM: usize = 8;

fn arb_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-10.0f32..10.0f32, dim)
}

fn arb_vectors() -> impl Strategy<Value = Vec<Vec<f32>>> {
    proptest::collection::vec(arb_vector(DIM), 1..40)
}

fn chunks_for(count: usize) -> Vec<DocumentChunk> {
    (0..count)
        .map(|i| DocumentChunk::with_source(format!("chunk {i}"), "doc.txt"))
        .collect()
}

fn brute_force(vectors: &[Vec<f32>], query: &[f32]) -> Vec<(usize, f32)> {
    let mut all: Vec<(usize, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i, v.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum()))
        .collect();
    all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    all
}

/// Search results are sorted by ascending distance, hold `min(k, n)`
/// entries and agree with a brute-force scan.
mod prop_search {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn ordered_bounded_and_exact(
            vectors in arb_vectors(),
            query in arb_vector(DIM),
            k in 1usize..50,
        ) {
            let n = vectors.len();
            let index = SimilarityIndex::build(vectors.clone(), chunks_for(n), DIM).unwrap();

            let results = index.search(&query, k).unwrap();

            prop_assert_eq!(results.len(), k.min(n));
            for pair in results.windows(2) {
                prop_assert!(pair[0].distance <= pair[1].distance);
            }
            let expected = brute_force(&vectors, &query);
            for (got, (_, distance)) in results.iter().zip(expected) {
                prop_assert!((got.distance - distance).abs() <= 1e-3 * distance.max(1.0));
                let stored = &vectors[got.position];
                let recomputed: f32 =
                    stored.iter().zip(&query).map(|(a, b)| (a - b) * (a - b)).sum();
                prop_assert!((recomputed - got.distance).abs() <= 1e-3 * recomputed.max(1.0));
            }
        }

        #[test]
        fn search_is_deterministic(
            vectors in arb_vectors(),
            query in arb_vector(DIM),
            k in 1usize..50,
        ) {
            let n = vectors.len();
            let index = SimilarityIndex::build(vectors, chunks_for(n), DIM).unwrap();
            prop_assert_eq!(index.search(&query, k).unwrap(), index.search(&query, k).unwrap());
        }

        #[test]
        fn stored_vector_is_its_own_nearest(
            vectors in arb_vectors(),
            pick in any::<prop::sample::Index>(),
        ) {
            let n = vectors.len();
            let target = pick.index(n);
            let index = SimilarityIndex::build(vectors.clone(), chunks_for(n), DIM).unwrap();

            let results = index.search(&vectors[target], 1).unwrap();

            prop_assert_eq!(results[0].distance, 0.0);
        }
    }
}

/// A persisted index loads back with the same chunks, digest and answers.
mod prop_persistence {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn persisted_index_answers_identically(
            vectors in arb_vectors(),
            query in arb_vector(DIM),
            texts in proptest::collection::vec("\\PC{0,40}", 40),
        ) {
            let n = vectors.len();
            let chunks: Vec<DocumentChunk> = texts
                .into_iter()
                .take(n)
                .enumerate()
                .map(|(i, t)| {
                    DocumentChunk::with_source(t, "doc.txt").with_metadata("chunk_index", i.to_string())
                })
                .collect();
            let digest = source_digest("trigram/4096", &chunks);
            let index = SimilarityIndex::build(vectors, chunks.clone(), DIM)
                .unwrap()
                .with_source_digest(digest);

            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("index.bin");
            index.persist(&path).unwrap();
            let loaded = SimilarityIndex::load(&path).unwrap();

            prop_assert_eq!(loaded.dimension(), DIM);
            prop_assert_eq!(loaded.chunks(), chunks.as_slice());
            prop_assert_eq!(loaded.source_digest(), &digest);
            prop_assert_eq!(loaded.search(&query, n).unwrap(), index.search(&query, n).unwrap());
        }
    }
}
