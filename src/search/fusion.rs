//! Reciprocal Rank Fusion of the BM25 and vector result lists, plus the
//! post-fusion same-file diversity penalty.
//!
//! RRF: `score(c) = 1/(K + r_bm25) + 1/(K + r_vector)` with 1-indexed ranks
//! and an absent list contributing nothing. Chunk identity is
//! `(fileId, chunkIndex)`. K = 60 per Cormack, Clarke & Buettcher
//! (SIGIR 2009).

use std::collections::HashMap;

use crate::models::{RetrievalResult, RetrievalSource};

/// Standard RRF constant from the original paper.
pub const RRF_K: f64 = 60.0;

/// Score multiplier applied per already-emitted result from the same file.
const DIVERSITY_DECAY: f64 = 0.9;

/// Fuse two ranked lists into a single hybrid ranking.
///
/// Merged entries carry both originating scores, the contributing source
/// labels, and a 1-indexed `fusion_rank` assigned after sorting by
/// descending RRF score (ties broken by file name, then chunk index).
pub fn reciprocal_rank_fusion(
    bm25: &[RetrievalResult],
    vector: &[RetrievalResult],
    k: f64,
) -> Vec<RetrievalResult> {
    type Key = (String, usize);
    let mut merged: HashMap<Key, RetrievalResult> = HashMap::new();

    for (rank, hit) in bm25.iter().enumerate() {
        let rrf = 1.0 / (k + (rank + 1) as f64);
        let key = (hit.file_id.clone(), hit.chunk_index);
        let entry = merged.entry(key).or_insert_with(|| RetrievalResult {
            file_id: hit.file_id.clone(),
            file_name: hit.file_name.clone(),
            chunk_index: hit.chunk_index,
            text: hit.text.clone(),
            score: 0.0,
            source: RetrievalSource::Hybrid,
            rrf_score: Some(0.0),
            vector_score: None,
            bm25_score: None,
            fusion_rank: None,
            sources: Some(Vec::new()),
        });
        entry.bm25_score = Some(hit.score);
        add_rrf(entry, rrf, "bm25");
    }

    for (rank, hit) in vector.iter().enumerate() {
        let rrf = 1.0 / (k + (rank + 1) as f64);
        let key = (hit.file_id.clone(), hit.chunk_index);
        let entry = merged.entry(key).or_insert_with(|| RetrievalResult {
            file_id: hit.file_id.clone(),
            file_name: hit.file_name.clone(),
            chunk_index: hit.chunk_index,
            text: hit.text.clone(),
            score: 0.0,
            source: RetrievalSource::Hybrid,
            rrf_score: Some(0.0),
            vector_score: None,
            bm25_score: None,
            fusion_rank: None,
            sources: Some(Vec::new()),
        });
        entry.vector_score = Some(hit.score);
        add_rrf(entry, rrf, "vector");
    }

    let mut results: Vec<RetrievalResult> = merged.into_values().collect();
    results.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file_name.cmp(&b.file_name))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    for (i, result) in results.iter_mut().enumerate() {
        result.fusion_rank = Some(i + 1);
    }
    results
}

fn add_rrf(entry: &mut RetrievalResult, rrf: f64, label: &str) {
    let total = entry.rrf_score.unwrap_or(0.0) + rrf;
    entry.rrf_score = Some(total);
    entry.score = total;
    if let Some(sources) = entry.sources.as_mut() {
        sources.push(label.to_string());
    }
}

/// Down-weight repeated hits from the same file, then re-sort stably.
///
/// Walking the fused list in order, each result's RRF score is multiplied
/// by `0.9^n` where `n` counts already-emitted results sharing its
/// `fileId`. Strong same-file follow-ups survive; the top-K leans toward
/// distinct source files.
pub fn apply_diversity_penalty(results: &mut Vec<RetrievalResult>) {
    let mut seen: HashMap<String, u32> = HashMap::new();
    for result in results.iter_mut() {
        let prior = seen.entry(result.file_id.clone()).or_insert(0);
        let adjusted = result.rrf_score.unwrap_or(result.score) * DIVERSITY_DECAY.powi(*prior as i32);
        result.rrf_score = Some(adjusted);
        result.score = adjusted;
        *prior += 1;
    }
    // Stable sort keeps the pre-penalty order among equal scores.
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(file_id: &str, chunk_index: usize, score: f64, source: RetrievalSource) -> RetrievalResult {
        RetrievalResult {
            file_id: file_id.to_string(),
            file_name: format!("{file_id}.txt"),
            chunk_index,
            text: format!("chunk {chunk_index} of {file_id}"),
            score,
            source,
            rrf_score: None,
            vector_score: None,
            bm25_score: None,
            fusion_rank: None,
            sources: None,
        }
    }

    fn bm25_hit(file_id: &str, chunk_index: usize, score: f64) -> RetrievalResult {
        hit(file_id, chunk_index, score, RetrievalSource::Bm25)
    }

    fn vector_hit(file_id: &str, chunk_index: usize, score: f64) -> RetrievalResult {
        hit(file_id, chunk_index, score, RetrievalSource::Vector)
    }

    #[test]
    fn test_rrf_math_both_lists() {
        // BM25: [A@1, B@2, C@3], Vector: [B@1, D@2, A@3], K = 60.
        // A = 1/61 + 1/63, B = 1/62 + 1/61, C = 1/63, D = 1/62.
        let bm25 = vec![bm25_hit("A", 0, 3.0), bm25_hit("B", 0, 2.0), bm25_hit("C", 0, 1.0)];
        let vector = vec![vector_hit("B", 0, 0.9), vector_hit("D", 0, 0.8), vector_hit("A", 0, 0.7)];

        let fused = reciprocal_rank_fusion(&bm25, &vector, RRF_K);
        assert_eq!(fused.len(), 4);

        let score_of = |id: &str| {
            fused
                .iter()
                .find(|r| r.file_id == id)
                .and_then(|r| r.rrf_score)
                .unwrap()
        };
        assert!((score_of("A") - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-12);
        assert!((score_of("B") - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((score_of("C") - 1.0 / 63.0).abs() < 1e-12);
        assert!((score_of("D") - 1.0 / 62.0).abs() < 1e-12);

        // Top-2 before diversity: B then A.
        assert_eq!(fused[0].file_id, "B");
        assert_eq!(fused[1].file_id, "A");
        assert_eq!(fused[0].fusion_rank, Some(1));
        assert_eq!(fused[1].fusion_rank, Some(2));
    }

    #[test]
    fn test_rrf_monotonicity() {
        // A chunk ranked strictly higher in both lists beats one ranked
        // strictly lower in both.
        let bm25 = vec![bm25_hit("X", 0, 5.0), bm25_hit("Y", 0, 4.0)];
        let vector = vec![vector_hit("X", 0, 0.9), vector_hit("Y", 0, 0.8)];

        let fused = reciprocal_rank_fusion(&bm25, &vector, RRF_K);
        let x = fused.iter().find(|r| r.file_id == "X").unwrap();
        let y = fused.iter().find(|r| r.file_id == "Y").unwrap();
        assert!(x.rrf_score.unwrap() > y.rrf_score.unwrap());
    }

    #[test]
    fn test_merged_entry_carries_both_scores_and_sources() {
        let bm25 = vec![bm25_hit("A", 0, 7.5)];
        let vector = vec![vector_hit("A", 0, 0.88)];

        let fused = reciprocal_rank_fusion(&bm25, &vector, RRF_K);
        assert_eq!(fused.len(), 1);
        let merged = &fused[0];
        assert_eq!(merged.source, RetrievalSource::Hybrid);
        assert_eq!(merged.bm25_score, Some(7.5));
        assert_eq!(merged.vector_score, Some(0.88));
        assert_eq!(
            merged.sources.as_deref(),
            Some(&["bm25".to_string(), "vector".to_string()][..])
        );
    }

    #[test]
    fn test_single_list_preserves_order() {
        let bm25 = vec![bm25_hit("A", 0, 3.0), bm25_hit("B", 0, 2.0), bm25_hit("C", 0, 1.0)];
        let fused = reciprocal_rank_fusion(&bm25, &[], RRF_K);
        let ids: Vec<&str> = fused.iter().map(|r| r.file_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(reciprocal_rank_fusion(&[], &[], RRF_K).is_empty());
    }

    #[test]
    fn test_ties_break_by_file_name() {
        // Symmetric ranks produce identical RRF scores; names decide.
        let bm25 = vec![bm25_hit("zeta", 0, 2.0), bm25_hit("alpha", 0, 1.0)];
        let vector = vec![vector_hit("alpha", 0, 0.9), vector_hit("zeta", 0, 0.8)];

        let fused = reciprocal_rank_fusion(&bm25, &vector, RRF_K);
        assert_eq!(fused[0].file_id, "alpha");
        assert_eq!(fused[1].file_id, "zeta");
    }

    #[test]
    fn test_diversity_penalty_reorders_same_file_runs() {
        // Fused: [(f1,0) 0.030, (f1,1) 0.028, (f2,0) 0.027, (f1,2) 0.026]
        // After 0.9^n: [0.030, 0.0252, 0.027, 0.02106]
        // Re-sorted: [(f1,0), (f2,0), (f1,1), (f1,2)]
        let mut results = vec![
            with_rrf(hit("f1", 0, 0.030, RetrievalSource::Hybrid), 0.030, 1),
            with_rrf(hit("f1", 1, 0.028, RetrievalSource::Hybrid), 0.028, 2),
            with_rrf(hit("f2", 0, 0.027, RetrievalSource::Hybrid), 0.027, 3),
            with_rrf(hit("f1", 2, 0.026, RetrievalSource::Hybrid), 0.026, 4),
        ];

        apply_diversity_penalty(&mut results);

        let order: Vec<(String, usize)> = results
            .iter()
            .map(|r| (r.file_id.clone(), r.chunk_index))
            .collect();
        assert_eq!(
            order,
            vec![
                ("f1".to_string(), 0),
                ("f2".to_string(), 0),
                ("f1".to_string(), 1),
                ("f1".to_string(), 2),
            ]
        );

        assert!((results[0].score - 0.030).abs() < 1e-12);
        assert!((results[1].score - 0.027).abs() < 1e-12);
        assert!((results[2].score - 0.028 * 0.9).abs() < 1e-12);
        assert!((results[3].score - 0.026 * 0.9 * 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_diversity_keeps_distinct_files_in_top_k() {
        // Two files, four results: the top-2 must span both files.
        let mut results = vec![
            with_rrf(hit("f1", 0, 0.030, RetrievalSource::Hybrid), 0.030, 1),
            with_rrf(hit("f1", 1, 0.0299, RetrievalSource::Hybrid), 0.0299, 2),
            with_rrf(hit("f1", 2, 0.0298, RetrievalSource::Hybrid), 0.0298, 3),
            with_rrf(hit("f2", 0, 0.0297, RetrievalSource::Hybrid), 0.0297, 4),
        ];

        apply_diversity_penalty(&mut results);

        let top2_files: std::collections::HashSet<&str> =
            results.iter().take(2).map(|r| r.file_id.as_str()).collect();
        assert_eq!(top2_files.len(), 2);
    }

    fn with_rrf(mut r: RetrievalResult, rrf: f64, rank: usize) -> RetrievalResult {
        r.rrf_score = Some(rrf);
        r.score = rrf;
        r.fusion_rank = Some(rank);
        r
    }
}
