//! Mapping from a source document to its place in the target tree.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

pub const MARKDOWN_EXT: &str = "md";
const INDEX_SOURCE: &str = "index.md";
const INDEX_TARGET: &str = "index.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePath {
    pub abs_src: PathBuf,
    pub abs: PathBuf,
    pub rel: PathBuf,
    pub abs_dir: PathBuf,
    pub rel_dir: PathBuf,
    /// Every ancestor directory of the page, relative to the target root,
    /// mapped to its last segment.
    pub dir_parts: BTreeMap<PathBuf, String>,
    pub rel_to_root: PathBuf,
}

impl PagePath {
    pub fn new(target_root: &Path, pretty_urls: bool, abs_src: &Path) -> Result<Self> {
        if !abs_src.is_absolute() {
            return Err(Error::InvalidPath(abs_src.to_path_buf()));
        }
        let abs = target_path(abs_src, pretty_urls);
        Self::with_target(target_root, abs_src, abs)
    }

    /// Builds a path whose target is taken verbatim, for outputs that have
    /// no markup source.
    pub fn for_target(target_root: &Path, abs_target: &Path) -> Result<Self> {
        if !abs_target.is_absolute() {
            return Err(Error::InvalidPath(abs_target.to_path_buf()));
        }
        Self::with_target(target_root, abs_target, abs_target.to_path_buf())
    }

    fn with_target(target_root: &Path, abs_src: &Path, abs: PathBuf) -> Result<Self> {
        let rel = relative_path(target_root, &abs)?;
        let abs_dir = abs
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| target_root.to_path_buf());
        let rel_dir = relative_path(target_root, &abs_dir)?;

        let mut dir_parts = BTreeMap::new();
        let mut prefix = PathBuf::new();
        for component in rel_dir.components() {
            if let Component::Normal(segment) = component {
                prefix.push(segment);
                dir_parts.insert(prefix.clone(), segment.to_string_lossy().into_owned());
            }
        }

        let rel_to_root = relative_path(&abs_dir, target_root)?;

        Ok(Self {
            abs_src: abs_src.to_path_buf(),
            abs,
            rel,
            abs_dir,
            rel_dir,
            dir_parts,
            rel_to_root,
        })
    }

    pub fn url(&self) -> String {
        path_to_url(&self.rel)
    }

    pub fn dir_url(&self) -> String {
        path_to_url(&self.rel_dir)
    }

    pub fn url_dir_parts(&self) -> BTreeMap<String, String> {
        self.dir_parts
            .iter()
            .map(|(path, name)| (path_to_url(path), name.clone()))
            .collect()
    }

    pub fn url_to_root(&self) -> String {
        path_to_url(&self.rel_to_root)
    }

    /// Path from this page's directory to `other`, given relative to the
    /// target root.
    pub fn rel_to(&self, other: &str) -> Result<PathBuf> {
        let destination =
            normalize_lexically(&self.abs_dir.join(&self.rel_to_root).join(other));
        relative_path(&self.abs_dir, &destination)
    }

    pub fn url_rel_to(&self, other: &str) -> Result<String> {
        self.rel_to(other).map(|path| path_to_url(&path))
    }
}

/// Applies the output naming rules to a markup source path.
pub fn target_path(abs_src: &Path, pretty_urls: bool) -> PathBuf {
    let file_name = abs_src
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = abs_src.parent().unwrap_or_else(|| Path::new(""));
    let stem = file_name
        .strip_suffix(".md")
        .unwrap_or(file_name.as_str())
        .to_string();

    if file_name == INDEX_SOURCE {
        parent.join(INDEX_TARGET)
    } else if file_name.ends_with(".html.md") {
        parent.join(stem)
    } else if pretty_urls {
        parent.join(stem).join(INDEX_TARGET)
    } else {
        parent.join(format!("{stem}.html"))
    }
}

/// True when the pretty-URL rule produced this target, i.e. the page lives
/// in a directory named after it.
pub fn is_pretty_target(abs_src: &Path, abs_target: &Path) -> bool {
    let src_name = abs_src.file_name().and_then(|name| name.to_str());
    let target_name = abs_target.file_name().and_then(|name| name.to_str());
    target_name == Some(INDEX_TARGET)
        && src_name != Some(INDEX_SOURCE)
        && abs_src.parent() != abs_target.parent()
}

pub fn path_to_url(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        raw.into_owned()
    } else {
        raw.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Resolves `.` and `..` without touching the file system.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => true,
                    _ => false,
                };
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Computes the path that leads from directory `from` to `to`.
///
/// Both paths must share the same root; `..` segments are resolved
/// lexically first.
pub fn relative_path(from: &Path, to: &Path) -> Result<PathBuf> {
    let from_norm = normalize_lexically(from);
    let to_norm = normalize_lexically(to);
    let no_relation = || Error::NoRelativePath {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    };

    if from_norm.is_absolute() != to_norm.is_absolute() || root_of(&from_norm) != root_of(&to_norm)
    {
        return Err(no_relation());
    }

    let from_parts: Vec<Component<'_>> = from_norm.components().collect();
    let to_parts: Vec<Component<'_>> = to_norm.components().collect();
    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if from_parts[common..]
        .iter()
        .any(|part| matches!(part, Component::ParentDir))
    {
        return Err(no_relation());
    }

    let mut rel = PathBuf::new();
    for _ in common..from_parts.len() {
        rel.push("..");
    }
    for part in &to_parts[common..] {
        rel.push(part.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    Ok(rel)
}

fn root_of(path: &Path) -> Option<Component<'_>> {
    match path.components().next() {
        Some(component @ Component::Prefix(_)) => Some(component),
        Some(Component::RootDir) => Some(Component::RootDir),
        _ => None,
    }
}

/// True for the `.`/empty marker that means "the root itself".
pub fn is_current_dir(rel: &Path) -> bool {
    rel.as_os_str().is_empty() || rel == Path::new(".")
}

/// Resolves `path` against `base` and refuses anything that lands outside
/// `root`.
pub fn resolve_within(root: &Path, base: &Path, path: &str) -> Result<PathBuf> {
    let candidate = Path::new(path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };
    let resolved = normalize_lexically(&joined);
    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(Error::OutOfRoot {
            path: resolved,
            root: root.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_parent_segments() {
        assert_eq!(
            normalize_lexically(Path::new("/site/blog/../img/./a.png")),
            PathBuf::from("/site/img/a.png")
        );
        assert_eq!(
            normalize_lexically(Path::new("/../etc")),
            PathBuf::from("/etc")
        );
        assert_eq!(
            normalize_lexically(Path::new("../a/b")),
            PathBuf::from("../a/b")
        );
    }

    #[test]
    fn relative_path_walks_up_and_down() {
        let rel = relative_path(Path::new("/site/blog/2024"), Path::new("/site/img/a.png"))
            .expect("relative");
        assert_eq!(rel, PathBuf::from("../../img/a.png"));

        let same = relative_path(Path::new("/site"), Path::new("/site")).expect("relative");
        assert_eq!(same, PathBuf::from("."));
    }

    #[test]
    fn relative_path_needs_a_shared_root() {
        let err = relative_path(Path::new("/site"), Path::new("site/a")).expect_err("no relation");
        assert!(matches!(err, Error::NoRelativePath { .. }));
    }

    #[test]
    fn resolve_within_rejects_escapes() {
        let root = Path::new("/site/out");
        let ok = resolve_within(root, Path::new("/site/out/blog"), "../img/a.png").expect("inside");
        assert_eq!(ok, PathBuf::from("/site/out/img/a.png"));

        let err = resolve_within(root, root, "../../etc/passwd").expect_err("outside");
        assert!(matches!(err, Error::OutOfRoot { .. }));

        let sibling = resolve_within(root, root, "../out-other/x").expect_err("sibling prefix");
        assert!(matches!(sibling, Error::OutOfRoot { .. }));
    }

    #[test]
    fn current_dir_marker() {
        assert!(is_current_dir(Path::new("")));
        assert!(is_current_dir(Path::new(".")));
        assert!(!is_current_dir(Path::new("blog")));
    }

    #[test]
    fn target_naming_rules() {
        let src = |name: &str| PathBuf::from("/s").join(name);
        assert_eq!(target_path(&src("index.md"), false), src("index.html"));
        assert_eq!(target_path(&src("index.md"), true), src("index.html"));
        assert_eq!(target_path(&src("foo.html.md"), true), src("foo.html"));
        assert_eq!(target_path(&src("foo.md"), true), src("foo/index.html"));
        assert_eq!(target_path(&src("foo.md"), false), src("foo.html"));
    }

    #[test]
    fn nested_pages_list_every_ancestor() {
        let path = PagePath::new(Path::new("/out"), false, Path::new("/out/blog/2024/post.md"))
            .expect("page path");
        assert_eq!(path.url(), "blog/2024/post.html");
        assert_eq!(path.dir_url(), "blog/2024");
        assert_eq!(path.url_to_root(), "../..");
        assert_eq!(
            path.url_dir_parts(),
            BTreeMap::from([
                ("blog".to_string(), "blog".to_string()),
                ("blog/2024".to_string(), "2024".to_string()),
            ])
        );
        assert_eq!(path.url_rel_to("index.html").expect("rel"), "../../index.html");
    }

    #[test]
    fn root_pages_have_no_dir_parts() {
        let path = PagePath::new(Path::new("/out"), false, Path::new("/out/index.md"))
            .expect("page path");
        assert_eq!(path.url(), "index.html");
        assert_eq!(path.url_to_root(), ".");
        assert!(path.dir_parts.is_empty());
        assert!(path.url_dir_parts().is_empty());
    }
}
