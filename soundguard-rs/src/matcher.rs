//! Top-K cosine matching of a query embedding against the catalog.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::catalog::{Catalog, CategoryEntry};
use crate::normalize::{dot, Embedding};

/// One scored catalog entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult<'a> {
    pub entry: &'a CategoryEntry,
    pub score: f32,
}

/// Owned, serializable form of a [`MatchResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMatch {
    pub id: String,
    pub label: String,
    pub score: f32,
}

impl From<MatchResult<'_>> for CategoryMatch {
    fn from(m: MatchResult<'_>) -> Self {
        Self {
            id: m.entry.id.clone(),
            label: m.entry.label.clone(),
            score: m.score,
        }
    }
}

/// Rank `catalog` against `query` by dot product and keep the best `k`.
///
/// Both sides are assumed unit-normalized, so the score is cosine
/// similarity. An entry whose width differs from the query scores 0.
/// Equal scores keep catalog order.
pub fn top_matches<'a>(
    query: &Embedding,
    catalog: &'a [CategoryEntry],
    k: usize,
) -> Vec<MatchResult<'a>> {
    if catalog.is_empty() {
        warn!("category catalog is empty, no matches");
        return Vec::new();
    }

    let q = query.as_slice();
    let mut scored: Vec<MatchResult<'a>> = catalog
        .iter()
        .map(|entry| {
            let reference = entry.embedding.as_slice();
            let score = if reference.len() == q.len() {
                dot(q, reference)
            } else {
                warn!(
                    id = %entry.id,
                    query = q.len(),
                    reference = reference.len(),
                    "embedding dimension mismatch"
                );
                0.0
            };
            MatchResult { entry, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

/// Catalog handle shared across concurrent requests.
#[derive(Debug, Clone)]
pub struct CategoryMatcher {
    catalog: Arc<Catalog>,
}

impl CategoryMatcher {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn find_top_matches(&self, query: &Embedding, k: usize) -> Vec<MatchResult<'_>> {
        top_matches(query, self.catalog.entries(), k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, values: Vec<f32>) -> CategoryEntry {
        CategoryEntry {
            id: id.to_string(),
            label: id.to_uppercase(),
            description: String::new(),
            text_embedded: String::new(),
            embedding: Embedding::prenormalized(values),
        }
    }

    /// Unit vector whose dot with `[1, 0]` is `score`.
    fn at_score(id: &str, score: f32) -> CategoryEntry {
        entry(id, vec![score, (1.0 - score * score).sqrt()])
    }

    fn query() -> Embedding {
        Embedding::prenormalized(vec![1.0, 0.0])
    }

    #[test]
    fn ranks_descending_and_truncates() {
        let catalog = vec![at_score("first", 0.9), at_score("second", 0.95), at_score("third", 0.2)];
        let matches = top_matches(&query(), &catalog, 2);
        let ids: Vec<&str> = matches.iter().map(|m| m.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["second", "first"]);
        assert!((matches[0].score - 0.95).abs() < 1e-6);
        assert!((matches[1].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn k_larger_than_catalog_returns_everything() {
        let catalog = vec![at_score("a", 0.1), at_score("b", 0.3)];
        assert_eq!(top_matches(&query(), &catalog, 10).len(), 2);
    }

    #[test]
    fn empty_catalog_yields_no_matches() {
        assert!(top_matches(&query(), &[], 3).is_empty());
    }

    #[test]
    fn ties_keep_catalog_order() {
        let catalog = vec![at_score("x", 0.5), at_score("y", 0.7), at_score("z", 0.5)];
        let matches = top_matches(&query(), &catalog, 3);
        let ids: Vec<&str> = matches.iter().map(|m| m.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "x", "z"]);
    }

    #[test]
    fn dimension_mismatch_scores_zero_without_aborting() {
        let catalog = vec![
            entry("wide", vec![1.0, 0.0, 0.0]),
            at_score("ok", 0.4),
            at_score("neg", -0.3),
        ];
        let matches = top_matches(&query(), &catalog, 3);
        let ids: Vec<&str> = matches.iter().map(|m| m.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "wide", "neg"]);
        assert_eq!(matches[1].score, 0.0);
    }

    #[test]
    fn matcher_converts_to_owned_matches() {
        let matcher = CategoryMatcher::new(Arc::new(Catalog::from_entries(vec![at_score("dog", 0.8)])));
        let owned: Vec<CategoryMatch> = matcher
            .find_top_matches(&query(), 1)
            .into_iter()
            .map(CategoryMatch::from)
            .collect();
        assert_eq!(owned[0].id, "dog");
        assert_eq!(owned[0].label, "DOG");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn results_are_sorted_and_bounded(
                scores in proptest::collection::vec(-1.0f32..1.0, 0..20),
                k in 1usize..8,
            ) {
                let catalog: Vec<CategoryEntry> = scores
                    .iter()
                    .enumerate()
                    .map(|(i, s)| at_score(&format!("c{i}"), *s))
                    .collect();
                let matches = top_matches(&query(), &catalog, k);
                prop_assert_eq!(matches.len(), k.min(catalog.len()));
                for pair in matches.windows(2) {
                    prop_assert!(pair[0].score >= pair[1].score);
                }
            }
        }
    }
}
