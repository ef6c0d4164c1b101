//! The `FileIndex`: path-keyed store of scanned file entries with a flat
//! Merkle hash and single-blob persistence. The index exclusively owns its
//! entries; `load` replaces the whole in-memory state atomically and a failed
//! load leaves prior state untouched.

use crate::error::{IndexError, Result};
use crate::scan::merkle_combine;
use crate::types::{FileEntry, Language, ScanResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Version stamp written into every persisted blob. A blob with a different
/// version is refused; unknown *fields* inside a matching version are
/// ignored so newer writers stay readable.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexBlob {
    format_version: u32,
    files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    entries: BTreeMap<String, FileEntry>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a completed scan.
    pub fn from_scan(scan: &ScanResult) -> Self {
        let mut index = FileIndex::new();
        for entry in &scan.files {
            index.add(entry.clone());
        }
        index
    }

    /// Insert or replace the entry under its path.
    pub fn add(&mut self, entry: FileEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        self.entries.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// All entries, sorted by path.
    pub fn get_all(&self) -> Vec<&FileEntry> {
        self.entries.values().collect()
    }

    pub fn by_language(&self, language: Language) -> Vec<&FileEntry> {
        self.entries.values().filter(|e| e.language == language).collect()
    }

    /// Per-language file counts for summary reporting.
    pub fn language_counts(&self) -> BTreeMap<Language, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.language).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Flat Merkle hash over the sorted content hashes of all entries.
    /// Directory structure is not involved; two indexes with the same file
    /// contents hash equal regardless of layout.
    pub fn merkle_hash(&self) -> u64 {
        let mut hashes: Vec<u64> = self.entries.values().map(|e| e.content_hash).collect();
        merkle_combine(&mut hashes)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Serialize the whole index as one blob. Written to a sibling temp file
    /// and renamed so readers only ever see a full write.
    pub fn save(&self, path: &Path) -> Result<()> {
        let blob = IndexBlob {
            format_version: FORMAT_VERSION,
            files: self.entries.values().cloned().collect(),
        };
        let json = serde_json::to_string(&blob)
            .map_err(|e| IndexError::MalformedIndex(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IndexError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| IndexError::Io { path: tmp.clone(), source: e })?;
        std::fs::rename(&tmp, path)
            .map_err(|e| IndexError::Io { path: path.to_path_buf(), source: e })?;

        debug!(files = self.entries.len(), path = %path.display(), "index saved");
        Ok(())
    }

    /// Load a blob, replacing the current state only after a full successful
    /// parse. A malformed blob or version mismatch leaves `self` unchanged.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| IndexError::Io { path: path.to_path_buf(), source: e })?;
        let blob: IndexBlob = serde_json::from_str(&json)
            .map_err(|e| IndexError::MalformedIndex(e.to_string()))?;
        if blob.format_version != FORMAT_VERSION {
            return Err(IndexError::MalformedIndex(format!(
                "unsupported format version {} (expected {})",
                blob.format_version, FORMAT_VERSION
            )));
        }

        let mut entries = BTreeMap::new();
        for entry in blob.files {
            entries.insert(entry.path.clone(), entry);
        }
        self.entries = entries;
        debug!(files = self.entries.len(), "index loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, hash: u64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            content_hash: hash,
            size: 10,
            mtime: 1700000000000,
            language: Language::from_path(path),
            is_indexed: false,
        }
    }

    #[test]
    fn add_get_remove_round_trip() {
        let mut index = FileIndex::new();
        index.add(entry("src/a.rs", 1));
        index.add(entry("src/b.py", 2));
        assert!(index.contains("src/a.rs"));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("src/b.py").unwrap().content_hash, 2);
        assert_eq!(index.by_language(Language::Python).len(), 1);
        assert!(index.remove("src/a.rs").is_some());
        assert!(!index.contains("src/a.rs"));
    }

    #[test]
    fn merkle_ignores_layout_but_not_content() {
        let mut a = FileIndex::new();
        a.add(entry("x/file1.rs", 11));
        a.add(entry("x/file2.rs", 22));

        let mut b = FileIndex::new();
        b.add(entry("renamed/elsewhere.rs", 22));
        b.add(entry("another/place.rs", 11));
        assert_eq!(a.merkle_hash(), b.merkle_hash(), "same hashes, any layout");

        b.add(entry("third.rs", 33));
        assert_ne!(a.merkle_hash(), b.merkle_hash());
    }

    #[test]
    fn persist_then_load_reproduces_state() {
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("index.json");

        let mut index = FileIndex::new();
        index.add(entry("src/a.rs", 1));
        index.add(entry("src/b.rs", 2));
        index.save(&blob_path).unwrap();

        let mut loaded = FileIndex::new();
        loaded.load(&blob_path).unwrap();
        assert_eq!(
            index.get_all().into_iter().cloned().collect::<Vec<_>>(),
            loaded.get_all().into_iter().cloned().collect::<Vec<_>>()
        );
        assert_eq!(index.merkle_hash(), loaded.merkle_hash());
    }

    #[test]
    fn load_replaces_prior_state_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("index.json");

        let mut on_disk = FileIndex::new();
        on_disk.add(entry("persisted.rs", 9));
        on_disk.save(&blob_path).unwrap();

        let mut index = FileIndex::new();
        index.add(entry("stale.rs", 1));
        index.load(&blob_path).unwrap();
        assert!(!index.contains("stale.rs"));
        assert!(index.contains("persisted.rs"));
    }

    #[test]
    fn malformed_blob_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("index.json");
        std::fs::write(&blob_path, "{ not json").unwrap();

        let mut index = FileIndex::new();
        index.add(entry("keep.rs", 5));
        let err = index.load(&blob_path).unwrap_err();
        assert!(matches!(err, IndexError::MalformedIndex(_)));
        assert!(index.contains("keep.rs"));
    }

    #[test]
    fn version_mismatch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("index.json");
        std::fs::write(&blob_path, r#"{"formatVersion": 99, "files": []}"#).unwrap();

        let mut index = FileIndex::new();
        assert!(matches!(index.load(&blob_path), Err(IndexError::MalformedIndex(_))));
    }

    #[test]
    fn unknown_blob_fields_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("index.json");
        std::fs::write(
            &blob_path,
            r#"{"formatVersion": 1, "files": [], "futureSection": {"x": 1}}"#,
        )
        .unwrap();

        let mut index = FileIndex::new();
        index.load(&blob_path).unwrap();
        assert!(index.is_empty());
    }
}
