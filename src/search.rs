//! Search coordinator: two BM25 indices (file contents keyed by path,
//! symbols keyed by id) with graph-boosted re-ranking for code search and
//! cached first-lines snippets.
//!
//! The boost multiplies a code hit's score by `1 + 0.1*ln(1 + in-degree)` so
//! central files win ties. Symbol search is straight BM25; the boost is
//! deliberately not applied there.

use crate::bm25::Bm25Index;
use crate::graph::DependencyGraph;
use crate::types::{SearchResult, Symbol};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Lines of context returned as a snippet for code hits.
const SNIPPET_LINES: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct SearchCoordinator {
    root: PathBuf,
    code: Bm25Index,
    symbols: Bm25Index,
    symbol_meta: HashMap<String, Symbol>,
    symbols_by_file: HashMap<String, Vec<String>>,
    /// node id -> in-degree, rebuilt from the graph on demand.
    dependent_counts: HashMap<String, usize>,
    /// Owned outright so cloning the coordinator copies the cache; a clone
    /// built for copy-then-swap must not write through to the live state.
    snippets: DashMap<String, Arc<str>>,
}

impl SearchCoordinator {
    pub fn new(root: PathBuf) -> Self {
        SearchCoordinator { root, ..Default::default() }
    }

    pub fn code_document_count(&self) -> usize {
        self.code.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbol_meta.len()
    }

    // -----------------------------------------------------------------------
    // Index maintenance
    // -----------------------------------------------------------------------

    /// Index (or re-index) a file's contents under its path.
    pub fn index_file(&mut self, path: &str, content: &str) {
        self.code.add_document(path, content);
        self.snippets.remove(path);
    }

    /// Index symbols; each document is `name kind filePath` under the stable
    /// symbol id.
    pub fn index_symbols(&mut self, symbols: &[Symbol]) {
        for symbol in symbols {
            self.symbols.add_document(
                &symbol.id,
                &format!("{} {} {}", symbol.name, symbol.kind, symbol.file_path),
            );
            self.symbols_by_file
                .entry(symbol.file_path.clone())
                .or_default()
                .push(symbol.id.clone());
            self.symbol_meta.insert(symbol.id.clone(), symbol.clone());
        }
    }

    /// Replace everything known about a path in one step: the old document
    /// and its symbols go, the new content and symbols come in. Average-
    /// length statistics stay consistent because removal is exact.
    pub fn update_file(&mut self, path: &str, content: Option<&str>, symbols: &[Symbol]) {
        self.remove_file(path);
        if let Some(content) = content {
            self.index_file(path, content);
        }
        self.index_symbols(symbols);
    }

    /// Drop a file's document and every symbol it owns.
    pub fn remove_file(&mut self, path: &str) {
        self.code.remove_document(path);
        self.snippets.remove(path);
        if let Some(ids) = self.symbols_by_file.remove(path) {
            for id in ids {
                self.symbols.remove_document(&id);
                self.symbol_meta.remove(&id);
            }
        }
    }

    /// Pre-fill the snippet cache for content that has no on-disk backing
    /// (virtual files recovered from source maps).
    pub fn prime_snippet(&mut self, path: &str, content: &str) {
        let snippet: String = content.lines().take(SNIPPET_LINES).collect::<Vec<_>>().join("\n");
        self.snippets.insert(path.to_string(), Arc::from(snippet.as_str()));
    }

    /// Recompute the in-degree table from the dependency graph.
    pub fn rebuild_dependent_counts(&mut self, graph: &DependencyGraph) {
        self.dependent_counts = graph
            .node_ids()
            .map(|id| (id.to_string(), graph.in_degree(id)))
            .collect();
        debug!(nodes = self.dependent_counts.len(), "dependent counts rebuilt");
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn graph_boost(&self, path: &str) -> f64 {
        let dependents = self.dependent_counts.get(path).copied().unwrap_or(0);
        1.0 + 0.1 * (1.0 + dependents as f64).ln()
    }

    /// Full-text code search with graph-boosted re-ranking: the raw BM25
    /// top 2*limit is rescored by centrality, re-sorted, and cut to `limit`.
    pub fn search_code(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let mut hits: Vec<(String, f64)> = self
            .code
            .search(query, limit.saturating_mul(2))
            .into_iter()
            .map(|(path, score)| {
                let boosted = score * self.graph_boost(&path);
                (path, boosted)
            })
            .collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(limit);

        hits.into_iter()
            .map(|(path, score)| SearchResult {
                snippet: self.snippet(&path),
                file_path: path,
                symbol_name: None,
                symbol_kind: None,
                score,
                line: None,
            })
            .collect()
    }

    /// Symbol search over `name kind filePath` text; straight BM25.
    pub fn search_symbols(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        self.symbols
            .search(query, limit)
            .into_iter()
            .filter_map(|(id, score)| {
                let meta = self.symbol_meta.get(&id)?;
                Some(SearchResult {
                    file_path: meta.file_path.clone(),
                    symbol_name: Some(meta.name.clone()),
                    symbol_kind: Some(meta.kind.clone()),
                    score,
                    snippet: None,
                    line: Some(meta.start_line),
                })
            })
            .collect()
    }

    /// First lines of the file, cached. Unreadable files yield no snippet.
    fn snippet(&self, path: &str) -> Option<String> {
        if let Some(cached) = self.snippets.get(path) {
            return Some(cached.to_string());
        }
        let content = std::fs::read_to_string(self.root.join(path)).ok()?;
        let snippet: String =
            content.lines().take(SNIPPET_LINES).collect::<Vec<_>>().join("\n");
        self.snippets.insert(path.to_string(), Arc::from(snippet.as_str()));
        Some(snippet)
    }
}
