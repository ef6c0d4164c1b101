//! Compiled include/exclude pattern sets.
//!
//! Semantics: `*` and `?` never cross `/`, `**` crosses everything, matching
//! is case-insensitive, and a pattern must cover the whole relative path.
//! Excludes are tested before includes; an empty include list accepts all.

use crate::error::{IndexError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

#[derive(Clone, Debug)]
pub struct GlobFilter {
    includes: GlobSet,
    include_all: bool,
    excludes: GlobSet,
    /// Directory-level prune set: exclude patterns ending in `/**`, with the
    /// suffix stripped, so whole subtrees can be skipped during the walk.
    dir_excludes: GlobSet,
}

fn compile(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .case_insensitive(true)
            .build()
            .map_err(|e| IndexError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| IndexError::InvalidPattern {
        pattern: String::new(),
        message: e.to_string(),
    })
}

impl GlobFilter {
    pub fn new(include_patterns: &[String], exclude_patterns: &[String]) -> Result<GlobFilter> {
        let dir_patterns: Vec<String> = exclude_patterns
            .iter()
            .filter_map(|p| p.strip_suffix("/**").map(|s| s.to_string()))
            .collect();
        Ok(GlobFilter {
            includes: compile(include_patterns)?,
            include_all: include_patterns.is_empty(),
            excludes: compile(exclude_patterns)?,
            dir_excludes: compile(&dir_patterns)?,
        })
    }

    /// Whether a file at this relative POSIX path should be scanned.
    pub fn accepts(&self, rel_path: &str) -> bool {
        if self.excludes.is_match(rel_path) {
            return false;
        }
        self.include_all || self.includes.is_match(rel_path)
    }

    /// Whether the subtree rooted at this directory can be pruned entirely.
    /// Conservative: only exclude patterns shaped like `.../**` prune.
    pub fn prunes_dir(&self, rel_path: &str) -> bool {
        !rel_path.is_empty() && self.dir_excludes.is_match(rel_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(includes: &[&str], excludes: &[&str]) -> GlobFilter {
        let inc: Vec<String> = includes.iter().map(|s| s.to_string()).collect();
        let exc: Vec<String> = excludes.iter().map(|s| s.to_string()).collect();
        GlobFilter::new(&inc, &exc).unwrap()
    }

    #[test]
    fn star_does_not_cross_separator() {
        let f = filter(&["src/*.rs"], &[]);
        assert!(f.accepts("src/main.rs"));
        assert!(!f.accepts("src/nested/mod.rs"));
    }

    #[test]
    fn double_star_crosses_separators() {
        let f = filter(&["src/**/*.rs"], &[]);
        assert!(f.accepts("src/nested/deep/mod.rs"));
        assert!(!f.accepts("lib/mod.rs"));
    }

    #[test]
    fn question_mark_is_single_non_separator() {
        let f = filter(&["a?c.txt"], &[]);
        assert!(f.accepts("abc.txt"));
        assert!(!f.accepts("a/c.txt"));
        assert!(!f.accepts("abbc.txt"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let f = filter(&["**/*.RS"], &[]);
        assert!(f.accepts("src/main.rs"));
    }

    #[test]
    fn excludes_win_over_includes() {
        let f = filter(&["**/*.js"], &["**/node_modules/**"]);
        assert!(f.accepts("src/app.js"));
        assert!(!f.accepts("pkg/node_modules/lib/index.js"));
    }

    #[test]
    fn empty_include_list_accepts_all() {
        let f = filter(&[], &["**/*.min.js"]);
        assert!(f.accepts("README.md"));
        assert!(!f.accepts("dist/app.min.js"));
    }

    #[test]
    fn dir_pruning_from_subtree_excludes() {
        let f = filter(&[], &["**/node_modules/**", "**/*.min.js"]);
        assert!(f.prunes_dir("pkg/node_modules"));
        assert!(!f.prunes_dir("src"));
        // Non-subtree patterns never prune.
        assert!(!f.prunes_dir("dist"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = GlobFilter::new(&["a[".to_string()], &[]).unwrap_err();
        assert!(matches!(err, IndexError::InvalidPattern { .. }));
    }
}
