//! Filesystem scanner: walks a root honoring include/exclude globs and emits
//! `FileEntry` records with content hashes plus Merkle-hashed `DirEntry`
//! fingerprints. Per-file I/O errors are logged and skipped; a broken root
//! aborts the scan. Output is stable-sorted by path so two scans of an
//! unchanged tree are byte-identical.

use crate::config::IndexerConfig;
use crate::error::{IndexError, Result};
use crate::glob::GlobFilter;
use crate::types::{DirEntry, FileEntry, Language, ScanResult};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, warn};
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

/// 64-bit content fingerprint of a byte slice.
pub fn content_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// Combine an unordered set of child hashes into a directory Merkle hash:
/// the children are sorted, then hashed as a little-endian byte stream.
pub fn merkle_combine(child_hashes: &mut Vec<u64>) -> u64 {
    child_hashes.sort_unstable();
    let mut hasher = Xxh3::new();
    for h in child_hashes.iter() {
        hasher.update(&h.to_le_bytes());
    }
    hasher.digest()
}

// ---------------------------------------------------------------------------
// Walking
// ---------------------------------------------------------------------------

fn posix_rel(root: &Path, abs: &Path) -> String {
    abs.strip_prefix(root).unwrap_or(abs).to_string_lossy().replace('\\', "/")
}

/// Walk the tree and return (candidate files, walked directories). Exclude
/// subtrees are pruned where the pattern shape allows it; everything else is
/// filtered per entry.
fn collect_entries(
    root: &Path,
    config: &IndexerConfig,
    filter: &GlobFilter,
    cancel: Option<&AtomicBool>,
) -> Result<(Vec<(PathBuf, String)>, Vec<String>)> {
    let mut candidates: Vec<(PathBuf, String)> = Vec::new();
    let mut dirs: Vec<String> = Vec::new();

    // Prune excluded subtrees during the walk; only `.../**`-shaped excludes
    // can prune, the rest is filtered per file below.
    let prune_root = root.to_path_buf();
    let prune_filter = filter.clone();
    let walk = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .follow_links(config.follow_symlinks)
        .filter_entry(move |entry| {
            if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                let rel = posix_rel(&prune_root, entry.path());
                return !prune_filter.prunes_dir(&rel);
            }
            true
        })
        .build();

    for entry in walk {
        if cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false) {
            return Err(IndexError::Cancelled);
        }

        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "walk error, skipping entry");
                continue;
            }
        };

        let rel = posix_rel(root, entry.path());

        if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
            dirs.push(rel);
            continue;
        }

        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        if !filter.accepts(&rel) {
            continue;
        }
        candidates.push((entry.path().to_path_buf(), rel));
    }

    Ok((candidates, dirs))
}

// ---------------------------------------------------------------------------
// Per-file processing
// ---------------------------------------------------------------------------

fn process_file(
    abs: &Path,
    rel: &str,
    config: &IndexerConfig,
    skipped: &AtomicUsize,
) -> Option<FileEntry> {
    let meta = match std::fs::metadata(abs) {
        Ok(m) => m,
        Err(e) => {
            warn!(path = rel, error = %e, "stat failed, skipping");
            skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
    };

    let size = meta.len();
    if size > config.max_file_size {
        debug!(path = rel, size, "over max_file_size, skipping");
        return None;
    }

    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let hash = if config.compute_content_hash {
        match std::fs::read(abs) {
            Ok(bytes) => content_hash(&bytes),
            Err(e) => {
                warn!(path = rel, error = %e, "read failed, skipping");
                skipped.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
    } else {
        0
    };

    Some(FileEntry {
        path: rel.to_string(),
        content_hash: hash,
        size,
        mtime,
        language: Language::from_path(rel),
        is_indexed: false,
    })
}

// ---------------------------------------------------------------------------
// Merkle directory fingerprints
// ---------------------------------------------------------------------------

fn parent_of(rel: &str) -> Option<&str> {
    if rel.is_empty() {
        return None;
    }
    Some(rel.rsplit_once('/').map(|(p, _)| p).unwrap_or(""))
}

/// Build `DirEntry` records bottom-up from the accepted files and the walked
/// directory list. A directory's hash covers its direct children: file
/// content hashes and subdirectory Merkle hashes.
fn build_dir_entries(files: &[FileEntry], mut dirs: Vec<String>) -> Vec<DirEntry> {
    dirs.sort_unstable();
    dirs.dedup();

    let mut file_children: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    let mut file_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for f in files {
        if let Some(parent) = parent_of(&f.path) {
            file_children.entry(parent).or_default().push(f.content_hash);
            *file_counts.entry(parent).or_insert(0) += 1;
        }
    }

    let mut dir_children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for d in &dirs {
        if let Some(parent) = parent_of(d) {
            dir_children.entry(parent).or_default().push(d);
        }
    }

    // Deepest directories first so child Merkle hashes exist before parents.
    let mut by_depth: Vec<&str> = dirs.iter().map(|s| s.as_str()).collect();
    by_depth.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count() + usize::from(!d.is_empty())));

    let mut merkle: BTreeMap<&str, u64> = BTreeMap::new();
    for dir in by_depth {
        let mut hashes: Vec<u64> = file_children.get(dir).cloned().unwrap_or_default();
        if let Some(subdirs) = dir_children.get(dir) {
            for sub in subdirs {
                hashes.push(merkle.get(*sub).copied().unwrap_or(0));
            }
        }
        merkle.insert(dir, merkle_combine(&mut hashes));
    }

    dirs.iter()
        .map(|d| DirEntry {
            path: d.clone(),
            merkle_hash: merkle.get(d.as_str()).copied().unwrap_or(0),
            file_count: file_counts.get(d.as_str()).copied().unwrap_or(0),
            dir_count: dir_children.get(d.as_str()).map(|v| v.len()).unwrap_or(0),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Scan a tree with the given configuration.
pub fn scan(root: &Path, config: &IndexerConfig) -> Result<ScanResult> {
    scan_with_cancel(root, config, None)
}

/// Scan with a cooperative cancellation flag, checked at directory-entry
/// boundaries. A cancelled scan discards partial results.
pub fn scan_with_cancel(
    root: &Path,
    config: &IndexerConfig,
    cancel: Option<&AtomicBool>,
) -> Result<ScanResult> {
    let start = Instant::now();

    if let Err(e) = std::fs::metadata(root) {
        return Err(IndexError::RootUnavailable { path: root.to_path_buf(), source: e });
    }

    let filter = GlobFilter::new(&config.include_patterns, &config.exclude_patterns)?;
    let (candidates, dirs) = collect_entries(root, config, &filter, cancel)?;

    let skipped = AtomicUsize::new(0);
    let hash_files = || -> Vec<FileEntry> {
        candidates
            .par_iter()
            .filter_map(|(abs, rel)| process_file(abs, rel, config, &skipped))
            .collect()
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallel_workers.max(1))
        .build();
    let mut files = match &pool {
        Ok(p) => p.install(hash_files),
        Err(e) => {
            warn!(error = %e, "worker pool unavailable, using shared pool");
            hash_files()
        }
    };

    if cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false) {
        return Err(IndexError::Cancelled);
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    let directories = build_dir_entries(&files, dirs);

    let result = ScanResult {
        total_size: files.iter().map(|f| f.size).sum(),
        total_files: files.len(),
        total_dirs: directories.len(),
        scan_time_ms: start.elapsed().as_millis() as u64,
        skipped_files: skipped.load(Ordering::Relaxed),
        error: None,
        files,
        directories,
    };

    debug!(
        files = result.total_files,
        dirs = result.total_dirs,
        skipped = result.skipped_files,
        time_ms = result.scan_time_ms,
        "scan complete"
    );
    Ok(result)
}
