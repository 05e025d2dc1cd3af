//! Mirroring the source tree into the target tree.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, IoContext, Result};

/// Hidden files and directories are never copied.
pub const DEFAULT_IGNORE: &str = r"^\.";

/// Entries left out of a copy: file names matching any pattern, and whole
/// subtrees rooted at an excluded path.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<Regex>,
    excluded: Vec<PathBuf>,
}

impl IgnoreSet {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|source| Error::IgnorePattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            excluded: Vec::new(),
        })
    }

    pub fn exclude(&mut self, path: impl Into<PathBuf>) {
        self.excluded.push(path.into());
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.excluded.iter().any(|excluded| path.starts_with(excluded)) || self.matches_name(path)
    }

    /// Checks only the file name patterns.
    pub fn matches_name(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        self.patterns.iter().any(|pattern| pattern.is_match(name))
    }
}

/// Copies everything below `from` into `to`, overwriting existing files.
/// Returns the number of files copied.
pub fn copy_tree(from: &Path, to: &Path, ignore: &IgnoreSet) -> Result<usize> {
    let mut files = 0;
    fs::create_dir_all(to).at(to)?;

    let walker = WalkDir::new(from)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !skip(entry, ignore));

    for entry in walker {
        let entry = entry?;
        let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).at(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).at(parent)?;
            }
            fs::copy(entry.path(), &dest).at(entry.path())?;
            tracing::debug!(from = %entry.path().display(), to = %dest.display(), "copied");
            files += 1;
        }
    }
    Ok(files)
}

fn skip(entry: &DirEntry, ignore: &IgnoreSet) -> bool {
    let ignored = ignore.is_ignored(entry.path());
    if ignored {
        tracing::debug!(path = %entry.path().display(), "ignored");
    }
    ignored
}
