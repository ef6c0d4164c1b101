//! End-to-end scenarios across scan, diff, search, graph, source maps, and
//! persistence, driving the engine the way a host process would.

use archscope::engine::RepoIndex;
use archscope::graph::EdgeKind;
use archscope::scan::scan;
use archscope::sourcemap::extract_virtual_files;
use archscope::types::{ChangeKind, Symbol};
use archscope::IndexerConfig;
use std::fs;
use std::path::Path;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn rename_scenario_emits_exactly_one_change() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/a.ts", "export const answer = 42;");

    let config = IndexerConfig::default();
    let before = scan(dir.path(), &config).unwrap();
    let hash = before.files[0].content_hash;

    fs::rename(dir.path().join("src/a.ts"), dir.path().join("src/b.ts")).unwrap();
    let after = scan(dir.path(), &config).unwrap();

    let diff = archscope::diff::diff_scans(&before, &after, true);
    assert_eq!(diff.changes.len(), 1);
    let change = &diff.changes[0];
    assert_eq!(change.kind, ChangeKind::Renamed);
    assert_eq!(change.path, "src/b.ts");
    assert_eq!(change.old_path.as_deref(), Some("src/a.ts"));
    assert_eq!(change.old_hash, hash);
    assert_eq!(change.new_hash, hash);
}

#[test]
fn scanner_is_deterministic_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/one.rs", "fn one() {}");
    write(dir.path(), "src/two.rs", "fn two() {}");
    write(dir.path(), "docs/notes.md", "notes");

    let config = IndexerConfig::default();
    let a = scan(dir.path(), &config).unwrap();
    let b = scan(dir.path(), &config).unwrap();
    assert_eq!(a.files, b.files);
    assert_eq!(a.directories, b.directories);
    assert_eq!(a.root_merkle().unwrap(), b.root_merkle().unwrap());
}

#[test]
fn excluded_only_tree_scans_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "node_modules/pkg/index.js", "x");
    write(dir.path(), "dist/out.js", "y");

    let result = scan(dir.path(), &IndexerConfig::default()).unwrap();
    assert!(result.files.is_empty());
    assert_eq!(result.total_size, 0);
}

#[test]
fn graph_scenario_cycles_impact_dependents() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["A.rs", "B.rs", "C.rs", "D.rs"] {
        write(dir.path(), name, "contents");
    }

    let mut repo = RepoIndex::new(dir.path(), IndexerConfig::default());
    repo.scan().unwrap();
    repo.add_edges(&[
        ("A.rs".to_string(), "B.rs".to_string(), EdgeKind::Imports),
        ("B.rs".to_string(), "C.rs".to_string(), EdgeKind::Imports),
        ("C.rs".to_string(), "A.rs".to_string(), EdgeKind::Imports),
        ("D.rs".to_string(), "A.rs".to_string(), EdgeKind::Imports),
    ])
    .unwrap();

    let graph = repo.graph().unwrap();
    let cycles = graph.find_cycles();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0], vec!["A.rs", "B.rs", "C.rs"]);

    let impact: Vec<String> =
        graph.impact_of("A.rs", 5).into_iter().map(|n| n.path).collect();
    assert_eq!(impact, vec!["B.rs", "C.rs"]);

    assert_eq!(graph.dependents_of("A.rs"), vec!["C.rs".to_string(), "D.rs".to_string()]);

    let stats = graph.stats();
    assert_eq!(stats.node_count, 4);
    assert_eq!(stats.edge_count, 4);
    assert_eq!(stats.cycle_count, 1);
}

#[test]
fn code_search_prefers_central_files_and_symbols_resolve() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "core/session.rs", "session handling utilities shared state");
    write(dir.path(), "misc/scratch.rs", "session handling utilities shared state");
    for i in 0..4 {
        write(dir.path(), &format!("dep{i}.rs"), "fn depends() {}");
    }

    let mut repo = RepoIndex::new(dir.path(), IndexerConfig::default());
    repo.scan().unwrap();
    let edges: Vec<(String, String, EdgeKind)> = (0..4)
        .map(|i| (format!("dep{i}.rs"), "core/session.rs".to_string(), EdgeKind::Imports))
        .collect();
    repo.add_edges(&edges).unwrap();

    let hits = repo.search_code("session handling", 5).unwrap();
    assert_eq!(hits[0].file_path, "core/session.rs", "in-degree boost breaks the tie");
    let snippet = hits[0].snippet.as_deref().unwrap();
    assert!(snippet.contains("session handling"));

    repo.add_symbols(&[Symbol {
        id: "core::open_session".to_string(),
        name: "openSession".to_string(),
        kind: "function".to_string(),
        file_path: "core/session.rs".to_string(),
        start_line: 12,
    }])
    .unwrap();
    let sym_hits = repo.search_symbols("open session", 5).unwrap();
    assert_eq!(sym_hits[0].symbol_name.as_deref(), Some("openSession"));
    assert_eq!(sym_hits[0].line, Some(12));
}

#[test]
fn source_map_scenario_recovers_one_virtual_file() {
    let dir = tempfile::tempdir().unwrap();
    let map = serde_json::json!({
        "version": 3,
        "file": "bundle.js",
        "sources": ["webpack://app/./src/foo.ts?a1b2", "node_modules/lib/x.js"],
        "sourcesContent": ["export function fooFeature() {}", "void 0;"],
        "names": [],
        "mappings": "AAAA"
    });
    write(dir.path(), "dist-maps/bundle.js.map", &map.to_string());

    let extraction = extract_virtual_files(dir.path()).unwrap();
    assert_eq!(extraction.files.len(), 1);
    assert_eq!(extraction.files[0].path, "src/foo.ts");

    let mut repo = RepoIndex::new(dir.path(), IndexerConfig::default());
    repo.scan().unwrap();
    repo.index_virtual_files(&extraction.files).unwrap();
    let hits = repo.search_code("foo feature", 5).unwrap();
    assert_eq!(hits[0].file_path, "src/foo.ts");
}

#[test]
fn full_lifecycle_scan_mutate_rescan_persist() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/x.ts", "const x = 1;");
    write(dir.path(), "src/y.ts", "const y = 2;");

    let mut repo = RepoIndex::new(dir.path(), IndexerConfig::default());
    repo.scan().unwrap();
    let merkle_before = repo.merkle_hash().unwrap();

    // Modify x, delete y, add z.
    write(dir.path(), "src/x.ts", "const x = 100;");
    fs::remove_file(dir.path().join("src/y.ts")).unwrap();
    write(dir.path(), "src/z.ts", "const z = 3;");

    let diff = repo.rescan().unwrap();
    assert_eq!((diff.added, diff.modified, diff.deleted, diff.renamed), (1, 1, 1, 0));
    assert_ne!(repo.merkle_hash().unwrap(), merkle_before);

    repo.save().unwrap();
    let mut restored = RepoIndex::new(dir.path(), IndexerConfig::default());
    restored.load().unwrap();
    assert_eq!(restored.merkle_hash().unwrap(), repo.merkle_hash().unwrap());
    let all: Vec<String> =
        restored.file_index().unwrap().get_all().iter().map(|f| f.path.clone()).collect();
    assert_eq!(all, vec!["src/x.ts".to_string(), "src/z.ts".to_string()]);
}

#[test]
fn diff_closure_holds_for_arbitrary_edits() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.rs", "alpha");
    write(dir.path(), "b.rs", "beta");
    write(dir.path(), "c.rs", "gamma");

    let config = IndexerConfig::default();
    let before = scan(dir.path(), &config).unwrap();

    fs::rename(dir.path().join("b.rs"), dir.path().join("moved_b.rs")).unwrap();
    write(dir.path(), "c.rs", "gamma prime");
    write(dir.path(), "d.rs", "delta");
    fs::remove_file(dir.path().join("a.rs")).unwrap();

    let after = scan(dir.path(), &config).unwrap();
    let diff = archscope::diff::diff_scans(&before, &after, true);

    let mut set: std::collections::BTreeMap<String, u64> =
        before.files.iter().map(|f| (f.path.clone(), f.content_hash)).collect();
    for change in &diff.changes {
        match change.kind {
            ChangeKind::Added | ChangeKind::Modified => {
                set.insert(change.path.clone(), change.new_hash);
            }
            ChangeKind::Deleted => {
                set.remove(&change.path);
            }
            ChangeKind::Renamed => {
                set.remove(change.old_path.as_ref().unwrap());
                set.insert(change.path.clone(), change.new_hash);
            }
        }
    }
    let expected: std::collections::BTreeMap<String, u64> =
        after.files.iter().map(|f| (f.path.clone(), f.content_hash)).collect();
    assert_eq!(set, expected);
}
