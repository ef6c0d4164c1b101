//! The per-repository engine: owns the file index, the dependency graph, and
//! the search coordinator, and orchestrates scan -> diff -> apply.
//!
//! Writes go through `&mut self`, queries through `&self`, so the
//! single-writer / multi-reader discipline is enforced by the borrow checker
//! (hosts wanting concurrency wrap the engine in an `RwLock`). A re-scan
//! builds the complete post state on a copy and swaps it in at the end;
//! queries never observe a half-applied update, and a failed re-scan leaves
//! the previous state intact.

use crate::config::{IndexerConfig, INDEX_FILE, STATE_DIR};
use crate::diff::diff_scans;
use crate::error::{IndexError, Result};
use crate::graph::{DependencyGraph, EdgeKind};
use crate::index::FileIndex;
use crate::scan::{content_hash, scan_with_cancel};
use crate::search::SearchCoordinator;
use crate::types::{
    ChangeKind, DiffResult, FileEntry, Language, ScanResult, SearchResult, Symbol, VirtualFile,
};
use crate::validate::{validate, ArchitectureModel, Rule, RuleViolation, ValidationContext};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
struct EngineState {
    scan: ScanResult,
    files: FileIndex,
    graph: DependencyGraph,
    search: SearchCoordinator,
}

pub struct RepoIndex {
    root: PathBuf,
    config: IndexerConfig,
    cancel: Arc<AtomicBool>,
    state: Option<EngineState>,
}

impl RepoIndex {
    pub fn new(root: &Path, mut config: IndexerConfig) -> RepoIndex {
        // The engine's own state directory is never part of the corpus.
        let state_exclude = format!("**/{STATE_DIR}/**");
        if !config.exclude_patterns.contains(&state_exclude) {
            config.exclude_patterns.push(state_exclude);
        }
        RepoIndex {
            root: root.to_path_buf(),
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            state: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Cooperative cancellation flag shared with long operations.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_indexed(&self) -> bool {
        self.state.is_some()
    }

    fn state(&self) -> Result<&EngineState> {
        self.state.as_ref().ok_or(IndexError::NotIndexed)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    // -----------------------------------------------------------------------
    // Indexing
    // -----------------------------------------------------------------------

    /// Full scan and index build. Replaces any previous state wholesale.
    pub fn scan(&mut self) -> Result<&ScanResult> {
        let scan = scan_with_cancel(&self.root, &self.config, Some(&self.cancel))?;
        let files = FileIndex::from_scan(&scan);

        let mut graph = DependencyGraph::new();
        let mut search = SearchCoordinator::new(self.root.clone());
        for entry in &scan.files {
            graph.add_node(&entry.path);
            if let Ok(content) = std::fs::read_to_string(self.root.join(&entry.path)) {
                search.index_file(&entry.path, &content);
            }
        }
        search.rebuild_dependent_counts(&graph);

        debug!(files = scan.total_files, "initial index built");
        self.state = Some(EngineState { scan, files, graph, search });
        self.last_scan()
    }

    /// Re-scan and apply the change set incrementally. The visible state
    /// transitions atomically from pre to post.
    pub fn rescan(&mut self) -> Result<DiffResult> {
        let previous = self.state()?;
        let new_scan = scan_with_cancel(&self.root, &self.config, Some(&self.cancel))?;
        let diff = diff_scans(&previous.scan, &new_scan, self.config.detect_renames);

        let mut next = previous.clone();
        let new_by_path: std::collections::HashMap<&str, &FileEntry> =
            new_scan.files.iter().map(|f| (f.path.as_str(), f)).collect();

        for change in &diff.changes {
            match change.kind {
                ChangeKind::Added | ChangeKind::Modified => {
                    if let Some(entry) = new_by_path.get(change.path.as_str()) {
                        next.files.add((*entry).clone());
                    }
                    next.graph.add_node(&change.path);
                    // Symbols owned by the old content are dropped here; the
                    // external parser re-feeds them via add_symbols.
                    let content = std::fs::read_to_string(self.root.join(&change.path)).ok();
                    next.search.update_file(&change.path, content.as_deref(), &[]);
                }
                ChangeKind::Deleted => {
                    next.files.remove(&change.path);
                    next.graph.remove_node(&change.path);
                    next.search.remove_file(&change.path);
                }
                ChangeKind::Renamed => {
                    let old_path = change.old_path.as_deref().unwrap_or_default();
                    next.files.remove(old_path);
                    // Edges named the old path; the external parser re-feeds
                    // them after a rename.
                    next.graph.remove_node(old_path);
                    next.search.remove_file(old_path);

                    if let Some(entry) = new_by_path.get(change.path.as_str()) {
                        next.files.add((*entry).clone());
                    }
                    next.graph.add_node(&change.path);
                    let content = std::fs::read_to_string(self.root.join(&change.path)).ok();
                    next.search.update_file(&change.path, content.as_deref(), &[]);
                }
            }
        }

        next.scan = new_scan;
        next.search.rebuild_dependent_counts(&next.graph);
        self.state = Some(next);
        Ok(diff)
    }

    /// Feed typed edges from the external parser. Endpoints must be indexed
    /// paths; an edge into the void is refused.
    pub fn add_edges(&mut self, edges: &[(String, String, EdgeKind)]) -> Result<()> {
        let state = self.state.as_mut().ok_or(IndexError::NotIndexed)?;
        for (from, to, kind) in edges {
            state.graph.add_edge(from, to, *kind)?;
        }
        state.search.rebuild_dependent_counts(&state.graph);
        Ok(())
    }

    /// Feed symbols from the external parser into the symbol index.
    pub fn add_symbols(&mut self, symbols: &[Symbol]) -> Result<()> {
        let state = self.state.as_mut().ok_or(IndexError::NotIndexed)?;
        state.search.index_symbols(symbols);
        Ok(())
    }

    /// Merge virtual files recovered from source maps into the index, as if
    /// the scanner had produced them.
    pub fn index_virtual_files(&mut self, files: &[VirtualFile]) -> Result<()> {
        let state = self.state.as_mut().ok_or(IndexError::NotIndexed)?;
        for vf in files {
            if state.files.contains(&vf.path) {
                warn!(path = %vf.path, "virtual file shadowed by a real file, skipping");
                continue;
            }
            state.files.add(FileEntry {
                path: vf.path.clone(),
                content_hash: content_hash(vf.content.as_bytes()),
                size: vf.content.len() as u64,
                mtime: 0,
                language: Language::from_path(&vf.path),
                is_indexed: false,
            });
            state.graph.add_node(&vf.path);
            state.search.index_file(&vf.path, &vf.content);
            state.search.prime_snippet(&vf.path, &vf.content);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn search_code(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        Ok(self.state()?.search.search_code(query, limit))
    }

    pub fn search_symbols(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        Ok(self.state()?.search.search_symbols(query, limit))
    }

    pub fn graph(&self) -> Result<&DependencyGraph> {
        Ok(&self.state()?.graph)
    }

    pub fn file_index(&self) -> Result<&FileIndex> {
        Ok(&self.state()?.files)
    }

    pub fn last_scan(&self) -> Result<&ScanResult> {
        Ok(&self.state()?.scan)
    }

    pub fn merkle_hash(&self) -> Result<u64> {
        Ok(self.state()?.files.merkle_hash())
    }

    /// Run architecture rules against the current graph.
    pub fn validate_architecture(
        &self,
        model: &ArchitectureModel,
        rules: &[Rule],
    ) -> Result<Vec<RuleViolation>> {
        let state = self.state()?;
        let ctx = ValidationContext { graph: &state.graph, model };
        Ok(validate(&ctx, rules))
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Persist the file index blob under the state directory.
    pub fn save(&self) -> Result<()> {
        let state = self.state()?;
        state.files.save(&self.state_dir().join(INDEX_FILE))
    }

    /// Warm-start from a persisted blob: entries and hashes come from the
    /// blob, file contents are re-read from disk for the text index. The
    /// dependency graph starts with nodes only; edges are the parser's job.
    pub fn load(&mut self) -> Result<()> {
        let mut files = FileIndex::new();
        files.load(&self.state_dir().join(INDEX_FILE))?;

        let mut graph = DependencyGraph::new();
        let mut search = SearchCoordinator::new(self.root.clone());
        let mut scan = ScanResult::default();
        for entry in files.get_all() {
            graph.add_node(&entry.path);
            if let Ok(content) = std::fs::read_to_string(self.root.join(&entry.path)) {
                search.index_file(&entry.path, &content);
            }
            scan.files.push(entry.clone());
            scan.total_size += entry.size;
        }
        scan.total_files = scan.files.len();
        search.rebuild_dependent_counts(&graph);

        self.state = Some(EngineState { scan, files, graph, search });
        Ok(())
    }

    pub fn load_architecture(&self) -> Result<ArchitectureModel> {
        ArchitectureModel::load(&self.state_dir())
    }
}
