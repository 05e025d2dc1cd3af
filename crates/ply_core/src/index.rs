//! Site-wide state that templates can query while pages render.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::functions::RegexCache;
use crate::page::{Page, PageOptions};

#[derive(Debug)]
pub struct SiteIndex {
    target_root: PathBuf,
    options: PageOptions,
    allow_template_writes: bool,
    pages: RwLock<Vec<Arc<Page>>>,
    tags: RwLock<BTreeMap<String, Vec<Arc<Page>>>>,
    regex_cache: RegexCache,
    written: Mutex<Vec<PathBuf>>,
}

impl SiteIndex {
    pub fn new(target_root: &Path, options: PageOptions, allow_template_writes: bool) -> Self {
        Self {
            target_root: target_root.to_path_buf(),
            options,
            allow_template_writes,
            pages: RwLock::new(Vec::new()),
            tags: RwLock::new(BTreeMap::new()),
            regex_cache: RegexCache::default(),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    pub fn options(&self) -> PageOptions {
        self.options
    }

    pub fn allow_template_writes(&self) -> bool {
        self.allow_template_writes
    }

    pub fn regex_cache(&self) -> &RegexCache {
        &self.regex_cache
    }

    /// Appends a page in discovery order and files it under its tags.
    pub fn insert(&self, page: Arc<Page>) {
        {
            let mut tags = self.tags.write().expect("tag index lock");
            for tag in page.tags() {
                tags.entry(tag.clone()).or_default().push(Arc::clone(&page));
            }
        }
        self.pages.write().expect("page list lock").push(page);
    }

    pub fn pages(&self) -> Vec<Arc<Page>> {
        self.pages.read().expect("page list lock").clone()
    }

    pub fn page_count(&self) -> usize {
        self.pages.read().expect("page list lock").len()
    }

    pub fn tagged(&self, tag: &str) -> Vec<Arc<Page>> {
        self.tags
            .read()
            .expect("tag index lock")
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.read().expect("tag index lock").keys().cloned().collect()
    }

    pub fn has_page(&self, url: &str) -> bool {
        self.pages
            .read()
            .expect("page list lock")
            .iter()
            .any(|page| page.path().url() == url)
    }

    pub fn record_written(&self, path: PathBuf) {
        self.written.lock().expect("written files lock").push(path);
    }

    pub fn written(&self) -> Vec<PathBuf> {
        self.written.lock().expect("written files lock").clone()
    }
}
