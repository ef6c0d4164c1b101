//! Scan comparison: added/modified/deleted/renamed change lists with
//! content-hash rename detection. A rename is a deleted path and an added
//! path sharing a non-zero hash; pairing is greedy in scan order and each
//! side is consumed at most once. Hashless entries (`content_hash == 0`)
//! never rename-pair and are compared by presence only.

use crate::types::{ChangeKind, DiffResult, FileChange, FileEntry, ScanResult};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::debug;

/// Compare two scans and produce the change list that turns `old` into `new`.
pub fn diff_scans(old: &ScanResult, new: &ScanResult, detect_renames: bool) -> DiffResult {
    let start = Instant::now();

    let old_by_path: HashMap<&str, &FileEntry> =
        old.files.iter().map(|f| (f.path.as_str(), f)).collect();
    let new_by_path: HashMap<&str, &FileEntry> =
        new.files.iter().map(|f| (f.path.as_str(), f)).collect();

    let mut changes: Vec<FileChange> = Vec::new();
    let mut renamed_old: HashSet<&str> = HashSet::new();
    let mut renamed_new: HashSet<&str> = HashSet::new();

    if detect_renames {
        pair_renames(
            old,
            new,
            &old_by_path,
            &new_by_path,
            &mut changes,
            &mut renamed_old,
            &mut renamed_new,
        );
    }

    // Added and modified, in new-scan order.
    for entry in &new.files {
        if renamed_new.contains(entry.path.as_str()) {
            continue;
        }
        match old_by_path.get(entry.path.as_str()) {
            None => changes.push(FileChange {
                kind: ChangeKind::Added,
                path: entry.path.clone(),
                old_path: None,
                old_hash: 0,
                new_hash: entry.content_hash,
            }),
            Some(prev) => {
                let both_hashed = prev.content_hash != 0 && entry.content_hash != 0;
                if both_hashed && prev.content_hash != entry.content_hash {
                    changes.push(FileChange {
                        kind: ChangeKind::Modified,
                        path: entry.path.clone(),
                        old_path: None,
                        old_hash: prev.content_hash,
                        new_hash: entry.content_hash,
                    });
                }
            }
        }
    }

    // Deleted, in old-scan order.
    for entry in &old.files {
        if renamed_old.contains(entry.path.as_str()) {
            continue;
        }
        if !new_by_path.contains_key(entry.path.as_str()) {
            changes.push(FileChange {
                kind: ChangeKind::Deleted,
                path: entry.path.clone(),
                old_path: None,
                old_hash: entry.content_hash,
                new_hash: 0,
            });
        }
    }

    let count = |kind: ChangeKind| changes.iter().filter(|c| c.kind == kind).count();
    let result = DiffResult {
        added: count(ChangeKind::Added),
        modified: count(ChangeKind::Modified),
        deleted: count(ChangeKind::Deleted),
        renamed: count(ChangeKind::Renamed),
        diff_time_ms: start.elapsed().as_millis() as u64,
        changes,
    };
    debug!(
        added = result.added,
        modified = result.modified,
        deleted = result.deleted,
        renamed = result.renamed,
        "diff complete"
    );
    result
}

/// Group both scans by non-zero content hash, then greedily pair each
/// vanished old path with a fresh new path sharing its hash, in listed order.
#[allow(clippy::too_many_arguments)]
fn pair_renames<'a>(
    old: &'a ScanResult,
    new: &'a ScanResult,
    old_by_path: &HashMap<&str, &FileEntry>,
    new_by_path: &HashMap<&str, &FileEntry>,
    changes: &mut Vec<FileChange>,
    renamed_old: &mut HashSet<&'a str>,
    renamed_new: &mut HashSet<&'a str>,
) {
    let mut old_by_hash: HashMap<u64, Vec<&'a FileEntry>> = HashMap::new();
    let mut hash_order: Vec<u64> = Vec::new();
    for entry in &old.files {
        if entry.content_hash != 0 {
            let group = old_by_hash.entry(entry.content_hash).or_default();
            if group.is_empty() {
                hash_order.push(entry.content_hash);
            }
            group.push(entry);
        }
    }
    let mut new_by_hash: HashMap<u64, Vec<&'a FileEntry>> = HashMap::new();
    for entry in &new.files {
        if entry.content_hash != 0 {
            new_by_hash.entry(entry.content_hash).or_default().push(entry);
        }
    }

    // Hashes in old-scan first-occurrence order so pairing is deterministic.
    for hash in hash_order {
        let Some(new_group) = new_by_hash.get(&hash) else {
            continue;
        };

        // Old candidates whose paths vanished; each hash group is visited
        // once, so a candidate can be claimed at most once.
        let old_candidates = old_by_hash[&hash]
            .iter()
            .filter(|f| !new_by_path.contains_key(f.path.as_str()));
        // New candidates whose paths are fresh.
        let mut new_candidates =
            new_group.iter().filter(|f| !old_by_path.contains_key(f.path.as_str()));

        for old_entry in old_candidates {
            let Some(new_entry) = new_candidates.next() else {
                break;
            };
            renamed_old.insert(old_entry.path.as_str());
            renamed_new.insert(new_entry.path.as_str());
            changes.push(FileChange {
                kind: ChangeKind::Renamed,
                path: new_entry.path.clone(),
                old_path: Some(old_entry.path.clone()),
                old_hash: old_entry.content_hash,
                new_hash: new_entry.content_hash,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Language;

    fn entry(path: &str, hash: u64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            content_hash: hash,
            size: 1,
            mtime: 0,
            language: Language::from_path(path),
            is_indexed: false,
        }
    }

    fn scan_of(entries: Vec<FileEntry>) -> ScanResult {
        ScanResult {
            total_files: entries.len(),
            files: entries,
            ..Default::default()
        }
    }

    #[test]
    fn pure_rename_yields_a_single_change() {
        let old = scan_of(vec![entry("src/a.ts", 0xAB)]);
        let new = scan_of(vec![entry("src/b.ts", 0xAB)]);
        let diff = diff_scans(&old, &new, true);

        assert_eq!(diff.changes.len(), 1);
        let change = &diff.changes[0];
        assert_eq!(change.kind, ChangeKind::Renamed);
        assert_eq!(change.path, "src/b.ts");
        assert_eq!(change.old_path.as_deref(), Some("src/a.ts"));
        assert_eq!(change.old_hash, 0xAB);
        assert_eq!(change.new_hash, 0xAB);
        assert_eq!((diff.added, diff.modified, diff.deleted, diff.renamed), (0, 0, 0, 1));
    }

    #[test]
    fn add_modify_delete_counts() {
        let old = scan_of(vec![entry("x.ts", 1), entry("y.ts", 2)]);
        let new = scan_of(vec![entry("x.ts", 10), entry("z.ts", 3)]);
        let diff = diff_scans(&old, &new, true);

        assert_eq!((diff.added, diff.modified, diff.deleted, diff.renamed), (1, 1, 1, 0));
        let modified = diff.changes.iter().find(|c| c.kind == ChangeKind::Modified).unwrap();
        assert_eq!(modified.path, "x.ts");
        assert_eq!((modified.old_hash, modified.new_hash), (1, 10));
        let deleted = diff.changes.iter().find(|c| c.kind == ChangeKind::Deleted).unwrap();
        assert_eq!((deleted.path.as_str(), deleted.new_hash), ("y.ts", 0));
        let added = diff.changes.iter().find(|c| c.kind == ChangeKind::Added).unwrap();
        assert_eq!((added.path.as_str(), added.old_hash), ("z.ts", 0));
    }

    #[test]
    fn rename_detection_can_be_disabled() {
        let old = scan_of(vec![entry("src/a.ts", 0xAB)]);
        let new = scan_of(vec![entry("src/b.ts", 0xAB)]);
        let diff = diff_scans(&old, &new, false);
        assert_eq!((diff.added, diff.deleted, diff.renamed), (1, 1, 0));
    }

    #[test]
    fn zero_hash_entries_never_rename_pair() {
        let old = scan_of(vec![entry("a.txt", 0)]);
        let new = scan_of(vec![entry("b.txt", 0)]);
        let diff = diff_scans(&old, &new, true);
        assert_eq!((diff.added, diff.deleted, diff.renamed), (1, 1, 0));
    }

    #[test]
    fn unchanged_zero_hash_entries_are_not_modified() {
        let old = scan_of(vec![entry("a.txt", 0)]);
        let new = scan_of(vec![entry("a.txt", 0)]);
        let diff = diff_scans(&old, &new, true);
        assert!(diff.changes.is_empty());
    }

    #[test]
    fn duplicate_hash_pairing_is_greedy_in_scan_order() {
        // Two identical files move; pairing follows listed order.
        let old = scan_of(vec![entry("dir/one.rs", 7), entry("dir/two.rs", 7)]);
        let new = scan_of(vec![entry("moved/one.rs", 7), entry("moved/two.rs", 7)]);
        let diff = diff_scans(&old, &new, true);

        assert_eq!(diff.renamed, 2);
        assert_eq!(diff.changes[0].old_path.as_deref(), Some("dir/one.rs"));
        assert_eq!(diff.changes[0].path, "moved/one.rs");
        assert_eq!(diff.changes[1].old_path.as_deref(), Some("dir/two.rs"));
        assert_eq!(diff.changes[1].path, "moved/two.rs");
    }

    #[test]
    fn copy_keeps_original_and_adds_the_copy() {
        // Original stays put, so the new duplicate is an add, not a rename.
        let old = scan_of(vec![entry("orig.rs", 5)]);
        let new = scan_of(vec![entry("orig.rs", 5), entry("copy.rs", 5)]);
        let diff = diff_scans(&old, &new, true);
        assert_eq!((diff.added, diff.renamed), (1, 0));
        assert_eq!(diff.changes[0].path, "copy.rs");
    }

    #[test]
    fn diff_closure_reconstructs_the_new_file_set() {
        let old = scan_of(vec![
            entry("a.rs", 1),
            entry("b.rs", 2),
            entry("c.rs", 3),
            entry("d.rs", 4),
        ]);
        let new = scan_of(vec![
            entry("a.rs", 1),
            entry("b2.rs", 2),
            entry("c.rs", 30),
            entry("e.rs", 5),
        ]);
        let diff = diff_scans(&old, &new, true);

        // Apply the changes to old's file set.
        let mut files: std::collections::BTreeMap<String, u64> =
            old.files.iter().map(|f| (f.path.clone(), f.content_hash)).collect();
        for change in &diff.changes {
            match change.kind {
                ChangeKind::Added | ChangeKind::Modified => {
                    files.insert(change.path.clone(), change.new_hash);
                }
                ChangeKind::Deleted => {
                    files.remove(&change.path);
                }
                ChangeKind::Renamed => {
                    files.remove(change.old_path.as_ref().unwrap());
                    files.insert(change.path.clone(), change.new_hash);
                }
            }
        }
        let expected: std::collections::BTreeMap<String, u64> =
            new.files.iter().map(|f| (f.path.clone(), f.content_hash)).collect();
        assert_eq!(files, expected);
    }
}
