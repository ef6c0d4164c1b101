use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Language detection
// ---------------------------------------------------------------------------

/// Language detected from a file extension. `Unknown` files are still scanned
/// and hashed; they just carry no language tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Unknown,
    Javascript,
    Typescript,
    Python,
    Rust,
    Go,
    Java,
    Cpp,
    C,
    Csharp,
    Ruby,
    Php,
    Swift,
    Kotlin,
}

impl Language {
    /// Map a lowercase file extension (without the dot) to a language.
    pub fn from_extension(ext: &str) -> Language {
        match ext {
            "js" | "mjs" | "cjs" | "jsx" => Language::Javascript,
            "ts" | "tsx" | "mts" => Language::Typescript,
            "py" | "pyw" => Language::Python,
            "rs" => Language::Rust,
            "go" => Language::Go,
            "java" => Language::Java,
            "cpp" | "cc" | "cxx" | "hpp" | "h" => Language::Cpp,
            "c" => Language::C,
            "cs" => Language::Csharp,
            "rb" => Language::Ruby,
            "php" => Language::Php,
            "swift" => Language::Swift,
            "kt" | "kts" => Language::Kotlin,
            _ => Language::Unknown,
        }
    }

    /// Detect the language from a relative path.
    pub fn from_path(rel_path: &str) -> Language {
        rel_path
            .rsplit_once('.')
            .map(|(_, ext)| Language::from_extension(&ext.to_ascii_lowercase()))
            .unwrap_or(Language::Unknown)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Language::Unknown => "unknown",
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Csharp => "csharp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
        }
    }
}

// ---------------------------------------------------------------------------
// Scan output
// ---------------------------------------------------------------------------

/// A single file discovered by a scan. Unique by `path`; immutable once
/// produced; a re-scan replaces the whole entry under the same path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Repo-relative, POSIX-normalized path.
    pub path: String,
    /// 64-bit content fingerprint; `0` when hashing is disabled.
    pub content_hash: u64,
    pub size: u64,
    /// Modification time in milliseconds since the epoch.
    pub mtime: u64,
    pub language: Language,
    /// Reserved. Always written as `false`; kept for blob compatibility.
    pub is_indexed: bool,
}

/// A directory fingerprint. `merkle_hash` covers the sorted hashes of the
/// direct children (file content hashes, subdirectory Merkle hashes), so
/// equal hashes mean identical recursive contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    /// Repo-relative path; the scan root itself is the empty string.
    pub path: String,
    pub merkle_hash: u64,
    /// Direct file children.
    pub file_count: usize,
    /// Direct subdirectory children.
    pub dir_count: usize,
}

/// The result of one full tree scan. `files` and `directories` are stable-
/// sorted by path so derived Merkle hashes are deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub files: Vec<FileEntry>,
    pub directories: Vec<DirEntry>,
    pub total_size: u64,
    pub total_files: usize,
    pub total_dirs: usize,
    pub scan_time_ms: u64,
    /// Files skipped due to per-file read errors.
    pub skipped_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanResult {
    /// Merkle hash of the scan root directory, if present.
    pub fn root_merkle(&self) -> Option<u64> {
        self.directories.iter().find(|d| d.path.is_empty()).map(|d| d.merkle_hash)
    }
}

// ---------------------------------------------------------------------------
// Diff output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One change between two scans.
///
/// Invariants: `added` has `old_hash == 0`; `deleted` has `new_hash == 0`;
/// `renamed` has `old_hash == new_hash != 0` and `old_path != path`;
/// `modified` has differing non-zero hashes under the same path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub old_hash: u64,
    pub new_hash: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub changes: Vec<FileChange>,
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub renamed: usize,
    pub diff_time_ms: u64,
}

// ---------------------------------------------------------------------------
// Symbols (supplied by the external parser)
// ---------------------------------------------------------------------------

/// A symbol produced by the external parser. `id` is stable across runs; the
/// symbol is owned by `file_path` and dies with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub file_path: String,
    pub start_line: u32,
}

// ---------------------------------------------------------------------------
// Search output
// ---------------------------------------------------------------------------

/// One ranked hit from code or symbol search.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_kind: Option<String>,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

// ---------------------------------------------------------------------------
// Virtual files (source-map extraction)
// ---------------------------------------------------------------------------

/// A source file reconstructed from compiler metadata; not present on disk
/// at the reconstructed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualFile {
    pub path: String,
    pub content: String,
    /// The `.js.map` file this content was recovered from.
    pub source_map_path: String,
}
