//! Directory-scoped layouts and the innermost-first lookup chain.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use minijinja::value::Value;
use minijinja::{AutoEscape, Environment, context};

use crate::error::{Error, IoContext, Result};
use crate::functions::{TemplateScope, register_functions};
use crate::index::SiteIndex;
use crate::page::Page;
use crate::path::{is_current_dir, relative_path};

pub const LAYOUT_FILE_NAME: &str = "ply.template";

/// Sub-templates registered at render time, by name.
pub type ImportTable = Arc<Mutex<BTreeMap<String, String>>>;

#[derive(Debug)]
pub struct Layout {
    path: PathBuf,
    env: Environment<'static>,
    render_lock: Mutex<()>,
}

impl Layout {
    /// Reads and compiles the layout definition at `path`, binding the
    /// template functions to its directory.
    pub fn compile(site: &Arc<SiteIndex>, path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path).at(path)?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| site.target_root().to_path_buf());
        let imports: ImportTable = Arc::default();

        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        let loader_imports = Arc::clone(&imports);
        env.set_loader(move |name| {
            Ok(loader_imports
                .lock()
                .expect("template import lock")
                .get(name)
                .cloned())
        });
        register_functions(
            &mut env,
            Arc::new(TemplateScope::new(Arc::clone(site), dir, imports)),
        );
        env.add_template_owned(LAYOUT_FILE_NAME, source)
            .map_err(|source| Error::TemplateCompile {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            env,
            render_lock: Mutex::new(()),
        })
    }

    /// Renders the layout with `page` in context. Imports triggered by the
    /// template happen under the same lock as the render.
    pub fn apply(&self, page: &Arc<Page>) -> Result<String> {
        let _guard = self.render_lock.lock().expect("layout render lock");
        let execution_error = |source| Error::TemplateExecution {
            template: self.path.clone(),
            page: page.path().abs_src.clone(),
            source,
        };
        let template = self
            .env
            .get_template(LAYOUT_FILE_NAME)
            .map_err(execution_error)?;
        template
            .render(context! { page => Value::from_dyn_object(Arc::clone(page)) })
            .map_err(execution_error)
    }
}

#[derive(Debug)]
pub struct LayoutRegistry {
    target_root: PathBuf,
    layouts: BTreeMap<PathBuf, Layout>,
}

impl LayoutRegistry {
    pub fn new(target_root: &Path) -> Self {
        Self {
            target_root: target_root.to_path_buf(),
            layouts: BTreeMap::new(),
        }
    }

    /// Registers a layout under its directory, replacing nothing: a second
    /// layout for the same directory is a configuration error.
    pub fn register(&mut self, layout: Layout) -> Result<()> {
        let dir = layout
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.target_root.clone());
        if let Some(existing) = self.layouts.get(&dir) {
            return Err(Error::Configuration(format!(
                "{} already has a layout at {}",
                dir.display(),
                existing.path.display()
            )));
        }
        tracing::debug!(layout = %layout.path.display(), "registered layout");
        self.layouts.insert(dir, layout);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Layouts that apply to a page living in `start`, closest first.
    pub fn chain(&self, start: &Path) -> Vec<&Layout> {
        ancestor_dirs(start, &self.target_root)
            .iter()
            .filter_map(|dir| self.layouts.get(dir))
            .collect()
    }
}

/// Directories from `start` up to and including `root`.
///
/// Stops early if the walk leaves `root`, so a start outside the tree
/// yields nothing.
pub fn ancestor_dirs(start: &Path, root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut current = start.to_path_buf();
    loop {
        if !current.starts_with(root) {
            break;
        }
        dirs.push(current.clone());
        if reached_root(&current, root) {
            break;
        }
        if !current.pop() {
            break;
        }
    }
    dirs
}

fn reached_root(dir: &Path, root: &Path) -> bool {
    relative_path(root, dir)
        .map(|rel| is_current_dir(&rel))
        .unwrap_or(true)
}
