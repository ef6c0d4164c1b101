//! Source-map extraction: recovers original source files embedded in
//! compiler metadata (`*.js.map`, v3 shape) so bundled trees can be indexed.
//!
//! Discovery is bounded to depth 5 and skips `node_modules` and dot
//! directories. Each map contributes one virtual file per non-null
//! `sourcesContent` entry whose normalized path survives the bundler-noise
//! filter; across maps the first path wins.

use crate::error::{IndexError, Result};
use crate::types::{Language, VirtualFile};
use ignore::WalkBuilder;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Maximum directory depth searched for map files.
const MAX_DISCOVERY_DEPTH: usize = 5;

/// Substrings that mark a source as bundler noise rather than project code.
const REJECT_MARKERS: &[&str] = &[
    "node_modules/",
    "webpack/runtime",
    "webpack/bootstrap",
    "(webpack)",
    "__webpack",
    "ignored|",
    "/external ",
    "polyfill",
    ".css",
];

/// The v3 metadata shape. Only `sources` and `sourcesContent` are required;
/// everything else is tolerated and ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceMapFile {
    sources: Vec<String>,
    #[serde(default)]
    sources_content: Vec<Option<String>>,
    #[serde(default)]
    source_root: Option<String>,
}

#[derive(Debug, Default)]
pub struct ExtractionResult {
    pub files: Vec<VirtualFile>,
    /// Maps successfully parsed.
    pub maps_parsed: usize,
    /// Virtual paths dropped because an earlier map already produced them.
    pub skipped_files: usize,
}

// ---------------------------------------------------------------------------
// Path normalization
// ---------------------------------------------------------------------------

/// Normalize a raw `sources[]` entry into a repo-relative POSIX path.
/// Idempotent: applying it twice changes nothing.
pub fn normalize_source_path(raw: &str, source_root: Option<&str>) -> String {
    let mut path = raw.to_string();

    // webpack://<name>/rest -> rest
    if let Some(stripped) = path.strip_prefix("webpack://") {
        path = stripped.split_once('/').map(|(_, rest)| rest).unwrap_or(stripped).to_string();
    }

    if let Some(stripped) = path.strip_prefix("./") {
        path = stripped.to_string();
    }

    if let Some(root) = source_root {
        let root = root.trim_end_matches('/');
        if !root.is_empty() && !path.starts_with(root) {
            path = format!("{root}/{path}");
        }
    }

    // Trailing ?<hex> cache-buster.
    if let Some(pos) = path.rfind('?') {
        let suffix = &path[pos + 1..];
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
            path.truncate(pos);
        }
    }

    path.replace('\\', "/")
}

/// Whether a normalized source path is worth keeping: no bundler noise and a
/// recognized source-file extension.
fn accepts_source(path: &str) -> bool {
    if REJECT_MARKERS.iter().any(|m| path.contains(m)) {
        return false;
    }
    Language::from_path(path) != Language::Unknown
}

// ---------------------------------------------------------------------------
// Discovery and extraction
// ---------------------------------------------------------------------------

fn discover_maps(root: &Path) -> Result<Vec<std::path::PathBuf>> {
    if let Err(e) = std::fs::metadata(root) {
        return Err(IndexError::RootUnavailable { path: root.to_path_buf(), source: e });
    }

    let mut maps = Vec::new();
    let walk = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .max_depth(Some(MAX_DISCOVERY_DEPTH))
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                let name = entry.file_name().to_string_lossy();
                return !name.starts_with('.') && name != "node_modules";
            }
            true
        })
        .build();

    for entry in walk {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "walk error during map discovery");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        if entry.path().to_string_lossy().ends_with(".js.map") {
            maps.push(entry.path().to_path_buf());
        }
    }

    // Deterministic first-wins dedup downstream.
    maps.sort();
    Ok(maps)
}

/// Extract virtual files from every `*.js.map` under `root`. Malformed maps
/// are logged and skipped; they never poison the rest of the extraction.
pub fn extract_virtual_files(root: &Path) -> Result<ExtractionResult> {
    let mut result = ExtractionResult::default();
    let mut seen_paths: HashSet<String> = HashSet::new();

    for map_path in discover_maps(root)? {
        let rel_map = map_path
            .strip_prefix(root)
            .unwrap_or(&map_path)
            .to_string_lossy()
            .replace('\\', "/");

        let map = match parse_map(&map_path) {
            Ok(m) => m,
            Err(e) => {
                warn!(map = %rel_map, error = %e, "skipping malformed source map");
                continue;
            }
        };
        result.maps_parsed += 1;

        for (i, source) in map.sources.iter().enumerate() {
            let Some(Some(content)) = map.sources_content.get(i) else {
                continue;
            };
            let path = normalize_source_path(source, map.source_root.as_deref());
            if !accepts_source(&path) {
                continue;
            }
            if !seen_paths.insert(path.clone()) {
                result.skipped_files += 1;
                continue;
            }
            result.files.push(VirtualFile {
                path,
                content: content.clone(),
                source_map_path: rel_map.clone(),
            });
        }
    }

    debug!(
        maps = result.maps_parsed,
        files = result.files.len(),
        skipped = result.skipped_files,
        "source-map extraction complete"
    );
    Ok(result)
}

fn parse_map(path: &Path) -> Result<SourceMapFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| IndexError::Io { path: path.to_path_buf(), source: e })?;
    serde_json::from_str(&raw).map_err(|e| IndexError::MalformedSourceMap {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
