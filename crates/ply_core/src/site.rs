//! One build: copy the sources, discover pages and layouts, render, clean up.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::{DirEntry, WalkDir};

use crate::config::BuildConfig;
use crate::copy::{IgnoreSet, copy_tree};
use crate::error::{Error, IoContext, Result};
use crate::index::SiteIndex;
use crate::layout::{LAYOUT_FILE_NAME, Layout, LayoutRegistry};
use crate::page::Page;
use crate::path::{MARKDOWN_EXT, normalize_lexically};

/// Overlaid onto the target root after the filtered copy.
pub const LOCAL_DIR_NAME: &str = "ply.local";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub copied: usize,
    pub pages: usize,
    pub layouts: usize,
    pub template_files: usize,
    pub removed: usize,
}

#[derive(Debug)]
pub struct Site {
    source_root: PathBuf,
    target_root: PathBuf,
    config: BuildConfig,
    ignore: IgnoreSet,
    index: Arc<SiteIndex>,
    layouts: LayoutRegistry,
}

impl Site {
    pub fn new(source: &Path, target: &Path, config: BuildConfig) -> Result<Self> {
        let source_root = absolute_root(source)?;
        let target_root = absolute_root(target)?;
        if source_root != target_root {
            if target_root.starts_with(&source_root) {
                return Err(Error::Configuration(format!(
                    "target {} is inside source {}",
                    target_root.display(),
                    source_root.display()
                )));
            }
            if source_root.starts_with(&target_root) {
                return Err(Error::Configuration(format!(
                    "source {} is inside target {}",
                    source_root.display(),
                    target_root.display()
                )));
            }
        }

        let mut ignore = IgnoreSet::new(config.ignore_patterns())?;
        ignore.exclude(target_root.clone());
        ignore.exclude(source_root.join(LOCAL_DIR_NAME));

        let index = Arc::new(SiteIndex::new(
            &target_root,
            config.page_options(),
            config.allow_template_writes,
        ));
        let layouts = LayoutRegistry::new(&target_root);

        Ok(Self {
            source_root,
            target_root,
            config,
            ignore,
            index,
            layouts,
        })
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    pub fn index(&self) -> &Arc<SiteIndex> {
        &self.index
    }

    /// Builds in place when source and target are the same directory.
    pub fn in_place(&self) -> bool {
        self.source_root == self.target_root
    }

    pub fn build(&mut self) -> Result<BuildSummary> {
        let mut summary = BuildSummary::default();
        if self.in_place() {
            tracing::debug!(root = %self.target_root.display(), "building in place");
        } else {
            summary.copied = self.stage()?;
        }

        self.discover()?;
        if self.layouts.is_empty() {
            tracing::debug!("no layouts found, pages are written as rendered markdown");
        }
        summary.layouts = self.layouts.len();
        summary.pages = self.render()?;
        summary.template_files = self.index.written().len();

        if !self.in_place() {
            summary.removed = self.clean()?;
        }
        Ok(summary)
    }

    fn stage(&self) -> Result<usize> {
        let mut copied = copy_tree(&self.source_root, &self.target_root, &self.ignore)?;
        let local = self.source_root.join(LOCAL_DIR_NAME);
        if local.is_dir() {
            tracing::debug!(dir = %local.display(), "applying local overrides");
            copied += copy_tree(&local, &self.target_root, &IgnoreSet::default())?;
        }
        Ok(copied)
    }

    fn discover(&mut self) -> Result<()> {
        let mut targets: HashMap<PathBuf, PathBuf> = HashMap::new();
        let local = self.target_root.join(LOCAL_DIR_NAME);
        let ignore = &self.ignore;
        let walker = WalkDir::new(&self.target_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !skip_in_target(entry, &local, ignore));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.file_name().and_then(|name| name.to_str()) == Some(LAYOUT_FILE_NAME) {
                self.layouts.register(Layout::compile(&self.index, path)?)?;
            } else if path.extension().and_then(|ext| ext.to_str()) == Some(MARKDOWN_EXT) {
                let page = Page::new(&self.index, path)?;
                let target = page.path().abs.clone();
                if let Some(first) = targets.insert(target.clone(), path.to_path_buf()) {
                    return Err(Error::DuplicateTarget {
                        target,
                        first,
                        second: path.to_path_buf(),
                    });
                }
                tracing::debug!(source = %path.display(), url = %page.path().url(), "page");
                self.index.insert(Arc::new(page));
            }
        }
        Ok(())
    }

    fn render(&self) -> Result<usize> {
        let pages = self.index.pages();
        for page in &pages {
            let html = page.resolve(&self.layouts)?;
            let target = &page.path().abs;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).at(parent)?;
            }
            fs::write(target, html).at(target)?;
            tracing::info!(path = %target.display(), "Created");
        }
        Ok(pages.len())
    }

    /// Removes markup sources and layout definitions from the output unless
    /// they were asked for.
    fn clean(&self) -> Result<usize> {
        let mut doomed = Vec::new();
        for entry in WalkDir::new(&self.target_root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_layout =
                path.file_name().and_then(|name| name.to_str()) == Some(LAYOUT_FILE_NAME);
            let is_markdown = path.extension().and_then(|ext| ext.to_str()) == Some(MARKDOWN_EXT);
            if (is_layout && !self.config.include_layouts)
                || (is_markdown && !self.config.include_markdown)
            {
                doomed.push(path.to_path_buf());
            }
        }

        for path in &doomed {
            fs::remove_file(path).at(path)?;
            tracing::info!(path = %path.display(), "Removed");
        }
        Ok(doomed.len())
    }
}

/// Local overrides and ignored names are never pages or layouts.
fn skip_in_target(entry: &DirEntry, local: &Path, ignore: &IgnoreSet) -> bool {
    entry.path() == local || ignore.matches_name(entry.path())
}

fn absolute_root(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).at(path)?;
    Ok(normalize_lexically(&absolute))
}
