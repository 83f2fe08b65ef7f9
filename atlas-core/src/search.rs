//! Query-mode selection and the hybrid fusion rule.
//!
//! The fetch/hydrate machinery (calling the coordinator, embedding the
//! query) lives in the app crate's `SearchEngine`; this module holds the
//! one piece that's pure enough to unit-test in isolation: the fusion rule
//! for combining a semantic result set and a keyword result set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Semantic,
    Keyword,
    Hybrid,
}

/// Which backend produced a hit. Scores are not comparable across origins:
/// a semantic cosine score and a keyword BM25-ish score live on different
/// scales, so callers must not sort or threshold across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Semantic,
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
    pub origin: Origin,
}

/// Priority concatenation: semantic results first, in their own order, then
/// keyword results not already present by id, stopping at `limit`.
///
/// This is deliberately *not* reciprocal-rank fusion or a weighted score
/// blend — the semantic vector is the primary signal and keyword hits are a
/// complement, never re-ranked against it.
pub fn fuse_hybrid(
    semantic: Vec<SearchResultItem>,
    keyword: Vec<SearchResultItem>,
    limit: usize,
) -> Vec<SearchResultItem> {
    let mut seen: std::collections::HashSet<String> =
        semantic.iter().map(|h| h.id.clone()).collect();
    let mut out = Vec::with_capacity(limit.min(semantic.len() + keyword.len()));

    for hit in semantic {
        if out.len() >= limit {
            break;
        }
        out.push(hit);
    }
    for hit in keyword {
        if out.len() >= limit {
            break;
        }
        if seen.insert(hit.id.clone()) {
            out.push(hit);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(id: &str, score: f32, origin: Origin) -> SearchResultItem {
        SearchResultItem {
            id: id.to_string(),
            score,
            payload: json!({}),
            origin,
        }
    }

    #[test]
    fn semantic_results_come_first() {
        let semantic = vec![hit("a", 0.9, Origin::Semantic), hit("b", 0.8, Origin::Semantic)];
        let keyword = vec![hit("c", 99.0, Origin::Keyword)];
        let fused = fuse_hybrid(semantic, keyword, 10);
        assert_eq!(fused.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn keyword_duplicates_of_semantic_ids_are_dropped() {
        let semantic = vec![hit("a", 0.9, Origin::Semantic)];
        let keyword = vec![hit("a", 50.0, Origin::Keyword), hit("b", 40.0, Origin::Keyword)];
        let fused = fuse_hybrid(semantic, keyword, 10);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].id, "a");
        assert_eq!(fused[0].origin, Origin::Semantic);
        assert_eq!(fused[1].id, "b");
    }

    #[test]
    fn stops_at_limit() {
        let semantic = vec![hit("a", 0.9, Origin::Semantic), hit("b", 0.8, Origin::Semantic)];
        let keyword = vec![hit("c", 1.0, Origin::Keyword)];
        let fused = fuse_hybrid(semantic, keyword, 1);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].id, "a");
    }

    #[test]
    fn never_fuses_scores_into_one_number() {
        let semantic = vec![hit("a", 0.9, Origin::Semantic)];
        let keyword = vec![hit("b", 500.0, Origin::Keyword)];
        let fused = fuse_hybrid(semantic, keyword, 10);
        assert_eq!(fused[0].score, 0.9);
        assert_eq!(fused[1].score, 500.0);
    }
}
