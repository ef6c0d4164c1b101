//! Inverted index with BM25 scoring.
//!
//! Documents store their full token sequence; term frequencies are derived at
//! query time by counting, never cached per document, so remove/re-add always
//! restores identical scores. Scoring is commutative in document order.

use crate::tokenize::tokenize;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

pub const K1: f64 = 1.5;
pub const B: f64 = 0.75;

#[derive(Debug, Clone)]
struct Document {
    tokens: Vec<String>,
}

/// BM25 index keyed by caller-supplied document ids (file paths or symbol
/// ids). Owns its documents, inverted lists, and document-frequency table.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    docs: HashMap<String, Document>,
    /// term -> document ids. Ordered so candidate iteration is deterministic.
    postings: HashMap<String, BTreeSet<String>>,
    doc_frequency: HashMap<String, usize>,
    total_tokens: usize,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    /// Average document length in tokens, clamped below by 1 to avoid
    /// division anomalies on degenerate corpora.
    pub fn avg_doc_len(&self) -> f64 {
        if self.docs.is_empty() {
            return 1.0;
        }
        (self.total_tokens as f64 / self.docs.len() as f64).max(1.0)
    }

    /// Tokenize and index a document. Re-adding an existing id replaces it.
    pub fn add_document(&mut self, id: &str, text: &str) {
        if self.docs.contains_key(id) {
            self.remove_document(id);
        }
        let tokens = tokenize(text);
        self.total_tokens += tokens.len();
        for term in distinct(&tokens) {
            self.postings.entry(term.to_string()).or_default().insert(id.to_string());
            *self.doc_frequency.entry(term.to_string()).or_insert(0) += 1;
        }
        self.docs.insert(id.to_string(), Document { tokens });
    }

    /// Remove a document and purge emptied postings and frequency entries.
    pub fn remove_document(&mut self, id: &str) -> bool {
        let Some(doc) = self.docs.remove(id) else {
            return false;
        };
        self.total_tokens -= doc.tokens.len();
        for term in distinct(&doc.tokens) {
            if let Some(ids) = self.postings.get_mut(term) {
                ids.remove(id);
                if ids.is_empty() {
                    self.postings.remove(term);
                }
            }
            if let Some(df) = self.doc_frequency.get_mut(term) {
                *df -= 1;
                if *df == 0 {
                    self.doc_frequency.remove(term);
                }
            }
        }
        true
    }

    /// Non-negative IDF: `ln((N - df + 0.5) / (df + 0.5) + 1)`.
    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.doc_frequency.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Score the corpus against a query. Results are sorted by score
    /// descending, ties broken by document id ascending, truncated to
    /// `limit`. Zero-scoring documents are omitted.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f64)> {
        if self.docs.is_empty() || limit == 0 {
            return Vec::new();
        }

        let query_tokens = tokenize(query);
        let terms: Vec<&str> = distinct(&query_tokens);
        if terms.is_empty() {
            return Vec::new();
        }

        let avg_len = self.avg_doc_len();

        // Candidates: union of the query terms' posting lists.
        let mut candidates: BTreeSet<&str> = BTreeSet::new();
        for term in &terms {
            if let Some(ids) = self.postings.get(*term) {
                candidates.extend(ids.iter().map(|s| s.as_str()));
            }
        }

        let mut scored: Vec<(String, f64)> = candidates
            .into_iter()
            .filter_map(|id| {
                let doc = &self.docs[id];
                let len = doc.tokens.len() as f64;
                let mut score = 0.0;
                for term in &terms {
                    let tf = doc.tokens.iter().filter(|t| t == term).count() as f64;
                    if tf == 0.0 {
                        continue;
                    }
                    let norm = tf + K1 * (1.0 - B + B * len / avg_len);
                    score += self.idf(term) * (tf * (K1 + 1.0)) / norm;
                }
                (score > 0.0).then(|| (id.to_string(), score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        debug!(terms = terms.len(), hits = scored.len(), "bm25 query");
        scored
    }
}

/// Distinct terms of a token sequence, first-occurrence order.
fn distinct(tokens: &[String]) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    tokens.iter().filter(|t| seen.insert(t.as_str())).map(|t| t.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Bm25Index {
        let mut index = Bm25Index::new();
        index.add_document("d1", "user login handler");
        index.add_document("d2", "user profile handler handler");
        index.add_document("d3", "billing invoice");
        index
    }

    #[test]
    fn ranks_by_term_frequency_and_omits_zero_scores() {
        let results = corpus().search("user handler", 10);
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["d2", "d1"], "d2 has handler twice, d3 matches nothing");
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn empty_corpus_returns_empty() {
        let index = Bm25Index::new();
        assert!(index.search("anything", 10).is_empty());
    }

    #[test]
    fn scores_are_commutative_in_insertion_order() {
        let mut forward = Bm25Index::new();
        forward.add_document("a", "alpha beta gamma");
        forward.add_document("b", "beta delta");
        forward.add_document("c", "gamma gamma epsilon");

        let mut reverse = Bm25Index::new();
        reverse.add_document("c", "gamma gamma epsilon");
        reverse.add_document("b", "beta delta");
        reverse.add_document("a", "alpha beta gamma");

        for query in ["beta", "gamma epsilon", "alpha delta"] {
            assert_eq!(forward.search(query, 10), reverse.search(query, 10), "query {query:?}");
        }
    }

    #[test]
    fn remove_then_readd_restores_scores() {
        let mut index = corpus();
        let before = index.search("user handler", 10);
        assert!(index.remove_document("d2"));
        index.add_document("d2", "user profile handler handler");
        let after = index.search("user handler", 10);
        assert_eq!(before, after);
    }

    #[test]
    fn remove_purges_frequency_entries() {
        let mut index = Bm25Index::new();
        index.add_document("only", "unique token stream");
        assert!(index.remove_document("only"));
        assert!(index.is_empty());
        assert!(index.doc_frequency.is_empty());
        assert!(index.postings.is_empty());
        assert_eq!(index.total_tokens, 0);
    }

    #[test]
    fn readding_same_id_replaces_document() {
        let mut index = corpus();
        index.add_document("d3", "user handler everywhere");
        let results = index.search("billing", 10);
        assert!(results.is_empty(), "old d3 content must be gone: {results:?}");
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn ties_break_by_document_id() {
        let mut index = Bm25Index::new();
        index.add_document("zeta", "shared token");
        index.add_document("alpha", "shared token");
        let results = index.search("shared", 10);
        assert_eq!(results[0].0, "alpha");
        assert_eq!(results[1].0, "zeta");
        assert_eq!(results[0].1, results[1].1);
    }

    #[test]
    fn idf_is_non_negative_for_ubiquitous_terms() {
        let index = corpus();
        assert!(index.idf("user") >= 0.0);
        assert!(index.idf("handler") >= 0.0);
    }
}
