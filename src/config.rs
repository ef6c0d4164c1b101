//! Scanner and watcher configuration with sensible defaults, plus loading
//! from an `.archscope.toml` at the repository root. Unknown keys are ignored
//! so older binaries keep reading newer config files.

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Directory (relative to the repo root) holding persisted engine state:
/// the serialized file index and the architecture model.
pub const STATE_DIR: &str = ".aiarhitector";

/// File name of the persisted index blob inside [`STATE_DIR`].
pub const INDEX_FILE: &str = "index.json";

/// File name of the architecture model inside [`STATE_DIR`].
pub const ARCHITECTURE_FILE: &str = "architecture.json";

fn default_excludes() -> Vec<String> {
    [
        "**/node_modules/**",
        "**/.git/**",
        "**/dist/**",
        "**/build/**",
        "**/__pycache__/**",
        "**/*.min.js",
        "**/*.min.css",
        "**/vendor/**",
        "**/.venv/**",
        "**/target/**",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_parallel_workers() -> usize {
    4
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_batch_delay_ms() -> u64 {
    1000
}

// ---------------------------------------------------------------------------
// Indexer configuration
// ---------------------------------------------------------------------------

/// Runtime configuration for scanning and diffing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexerConfig {
    /// Include globs; empty means accept everything.
    pub include_patterns: Vec<String>,
    /// Exclude globs, tested before includes.
    pub exclude_patterns: Vec<String>,
    pub follow_symlinks: bool,
    pub compute_content_hash: bool,
    pub detect_renames: bool,
    /// Files strictly larger than this are skipped.
    pub max_file_size: u64,
    pub parallel_workers: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: default_excludes(),
            follow_symlinks: false,
            compute_content_hash: true,
            detect_renames: true,
            max_file_size: default_max_file_size(),
            parallel_workers: default_parallel_workers(),
        }
    }
}

// ---------------------------------------------------------------------------
// Watcher configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchConfig {
    /// Per-path quiet window before an event is emitted.
    pub debounce_ms: u64,
    /// Quiet window after the last debounced event before a batch fires.
    pub batch_delay_ms: u64,
    /// Extensions (without dot) to watch; empty means all.
    pub watch_extensions: Vec<String>,
    /// Extra ignore patterns on top of `.gitignore`.
    pub ignore_patterns: Vec<String>,
    pub recursive: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            watch_extensions: Vec::new(),
            ignore_patterns: Vec::new(),
            recursive: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Shape of `.archscope.toml`. Both tables are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub indexer: IndexerConfig,
    pub watch: WatchConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file. A missing file yields defaults;
    /// a present-but-broken file is a hard error so typos don't silently
    /// fall back to scanning everything.
    pub fn load(path: &Path) -> Result<ConfigFile> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ConfigFile::default())
            }
            Err(e) => return Err(IndexError::Io { path: path.to_path_buf(), source: e }),
        };
        toml::from_str(&content).map_err(|e| IndexError::Config(e.to_string()))
    }
}
