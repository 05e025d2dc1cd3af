//! Pages: one rendered output per markup source.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};

use minijinja::value::{Enumerator, Object, Value, from_args};
use minijinja::{ErrorKind, State};

use crate::error::{IoContext, Result};
use crate::front_matter::{Metadata, first_heading, split_front_matter};
use crate::index::SiteIndex;
use crate::layout::LayoutRegistry;
use crate::path::{PagePath, is_pretty_target};
use crate::render::{render_markdown_to_html, rewrite_markdown_links};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOptions {
    pub pretty_urls: bool,
    pub keep_links: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Source,
    /// Synthetic output produced by a template; has no markup of its own.
    DataOnly,
}

#[derive(Debug)]
pub struct Page {
    site: Weak<SiteIndex>,
    kind: PageKind,
    path: PagePath,
    name: String,
    title: String,
    meta: Metadata,
    tags: Vec<String>,
    data: Option<Value>,
    options: PageOptions,
    content: Mutex<Option<String>>,
}

impl Page {
    pub fn new(site: &Arc<SiteIndex>, abs_src: &Path) -> Result<Self> {
        let options = site.options();
        let path = PagePath::new(site.target_root(), options.pretty_urls, abs_src)?;
        let name = page_name(&path);

        let raw = read_lossy(abs_src)?;
        let (meta, body) = split_front_matter(&raw, abs_src)?;

        let title = match meta.expect_str("title", abs_src)? {
            Some(title) => title.to_string(),
            None => {
                let heading = first_heading(body);
                if heading.is_empty() {
                    name.clone()
                } else {
                    heading
                }
            }
        };
        let tags = meta.expect_string_list("tags", abs_src)?.unwrap_or_default();

        Ok(Self {
            site: Arc::downgrade(site),
            kind: PageKind::Source,
            path,
            name,
            title,
            meta,
            tags,
            data: None,
            options,
            content: Mutex::new(None),
        })
    }

    /// A page that only carries `data`, used as the context for files a
    /// template writes. It is never part of the sitemap.
    pub fn data_only(site: &Arc<SiteIndex>, abs_target: &Path, data: Value) -> Result<Self> {
        let path = PagePath::for_target(site.target_root(), abs_target)?;
        let name = page_name(&path);
        let title = data
            .get_attr("title")
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| name.clone());
        Ok(Self {
            site: Arc::downgrade(site),
            kind: PageKind::DataOnly,
            path,
            name,
            title,
            meta: Metadata::default(),
            tags: Vec::new(),
            data: Some(data),
            options: site.options(),
            content: Mutex::new(None),
        })
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn path(&self) -> &PagePath {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Rendered markup. While the page is being resolved this is the output
    /// of the previous layout; otherwise the source is rendered afresh.
    pub fn content(&self) -> Result<String> {
        if self.kind == PageKind::DataOnly {
            return Ok(String::new());
        }
        if let Some(working) = self.content.lock().expect("page content lock").as_ref() {
            return Ok(working.clone());
        }
        self.render_content()
    }

    fn render_content(&self) -> Result<String> {
        let src = &self.path.abs_src;
        let raw = read_lossy(src)?;
        let (_, body) = split_front_matter(&raw, src)?;
        let html = render_markdown_to_html(body);
        if self.options.keep_links {
            Ok(html)
        } else {
            Ok(rewrite_markdown_links(&html, self.options.pretty_urls))
        }
    }

    fn set_content(&self, content: String) {
        *self.content.lock().expect("page content lock") = Some(content);
    }

    fn clear_content(&self) {
        *self.content.lock().expect("page content lock") = None;
    }

    /// Wraps the rendered content in every layout from the page's directory
    /// up to the target root, innermost first.
    pub fn resolve(self: &Arc<Self>, layouts: &LayoutRegistry) -> Result<String> {
        let result = self.compose(layouts);
        self.clear_content();
        result
    }

    fn compose(self: &Arc<Self>, layouts: &LayoutRegistry) -> Result<String> {
        let mut working = self.content()?;
        for layout in layouts.chain(&self.path.abs_dir) {
            self.set_content(working);
            working = layout.apply(self)?;
        }
        Ok(working)
    }

    fn sitemap(&self) -> Vec<Arc<Page>> {
        self.site
            .upgrade()
            .map(|site| site.pages())
            .unwrap_or_default()
    }
}

/// Invalid UTF-8 sequences become U+FFFD instead of failing the build.
fn read_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path).at(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn page_name(path: &PagePath) -> String {
    let from_stem = |p: &Path| {
        p.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    if is_pretty_target(&path.abs_src, &path.abs) {
        path.abs_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| from_stem(&path.abs))
    } else {
        from_stem(&path.abs)
    }
}

fn page_values(pages: Vec<Arc<Page>>) -> Value {
    Value::from(
        pages
            .into_iter()
            .map(Value::from_dyn_object)
            .collect::<Vec<Value>>(),
    )
}

impl Object for Page {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let value = match key.as_str()? {
            "title" => Value::from(self.title.clone()),
            "name" => Value::from(self.name.clone()),
            "path" | "url" => Value::from(self.path.url()),
            "dir" => Value::from(self.path.dir_url()),
            "dir_parts" => Value::from_serialize(self.path.url_dir_parts()),
            "root" => Value::from(self.path.url_to_root()),
            "source" => Value::from(self.path.abs_src.to_string_lossy().into_owned()),
            "meta" => Value::from_serialize(&self.meta),
            "tags" => Value::from_serialize(&self.tags),
            "data" => self.data.clone()?,
            "content" => match self.content() {
                Ok(content) => Value::from(content),
                Err(err) => {
                    tracing::warn!(
                        page = %self.path.abs_src.display(),
                        error = %err,
                        "content unavailable"
                    );
                    return None;
                }
            },
            _ => return None,
        };
        Some(value)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&[
            "title", "name", "path", "url", "dir", "dir_parts", "root", "source", "meta", "tags",
            "data", "content",
        ])
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, minijinja::Error> {
        match method {
            "sitemap" => {
                from_args::<()>(args)?;
                Ok(page_values(self.sitemap()))
            }
            "sitemap_reversed" => {
                from_args::<()>(args)?;
                let mut pages = self.sitemap();
                pages.reverse();
                Ok(page_values(pages))
            }
            "rel" => {
                let (other,): (&str,) = from_args(args)?;
                Ok(Value::from(self.path.url_rel_to(other)?))
            }
            "tagged" => {
                let (tag,): (&str,) = from_args(args)?;
                let pages = self
                    .site
                    .upgrade()
                    .map(|site| site.tagged(tag))
                    .unwrap_or_default();
                Ok(page_values(pages))
            }
            "tag_names" => {
                from_args::<()>(args)?;
                let names = self
                    .site
                    .upgrade()
                    .map(|site| site.tag_names())
                    .unwrap_or_default();
                Ok(Value::from(names))
            }
            _ => Err(minijinja::Error::new(
                ErrorKind::UnknownMethod,
                format!("page has no method named {method}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::index::SiteIndex;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn site(root: &Path, options: PageOptions) -> Arc<SiteIndex> {
        Arc::new(SiteIndex::new(root, options, false))
    }

    fn write(path: &Path, contents: &str) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
        path.to_path_buf()
    }

    #[test]
    fn title_prefers_front_matter() {
        let temp = TempDir::new().expect("tempdir");
        let index = site(temp.path(), PageOptions::default());
        let src = write(&temp.path().join("index.md"), "---\ntitle: Home\n---\n# Heading\n");
        let page = Page::new(&index, &src).expect("page");
        assert_eq!(page.title(), "Home");
        assert_eq!(page.name(), "index");
        assert_eq!(page.path().url(), "index.html");
    }

    #[test]
    fn title_falls_back_to_heading_then_name() {
        let temp = TempDir::new().expect("tempdir");
        let index = site(temp.path(), PageOptions::default());
        let post = write(&temp.path().join("blog/post.md"), "# My Post\n\ntext");
        let plain = write(&temp.path().join("blog/notes.md"), "no heading here");
        assert_eq!(Page::new(&index, &post).unwrap().title(), "My Post");
        assert_eq!(Page::new(&index, &plain).unwrap().title(), "notes");
    }

    #[test]
    fn pretty_pages_are_named_after_their_directory() {
        let temp = TempDir::new().expect("tempdir");
        let options = PageOptions {
            pretty_urls: true,
            keep_links: false,
        };
        let index = site(temp.path(), options);
        let src = write(&temp.path().join("about.md"), "text");
        let page = Page::new(&index, &src).expect("page");
        assert_eq!(page.name(), "about");
        assert_eq!(page.path().url(), "about/index.html");
    }

    #[test]
    fn tags_must_be_strings() {
        let temp = TempDir::new().expect("tempdir");
        let index = site(temp.path(), PageOptions::default());
        let src = write(&temp.path().join("a.md"), "---\ntags: \"a\"\n---\nbody");
        let err = Page::new(&index, &src).expect_err("bad tags");
        assert!(matches!(err, Error::MetadataType { .. }));
    }

    #[test]
    fn non_string_title_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let index = site(temp.path(), PageOptions::default());
        let src = write(&temp.path().join("a.md"), "---\ntitle: [x]\n---\nbody");
        let err = Page::new(&index, &src).expect_err("bad title");
        assert!(matches!(err, Error::MetadataType { .. }));
    }

    #[test]
    fn relative_source_path_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let index = site(temp.path(), PageOptions::default());
        let err = Page::new(&index, Path::new("blog/post.md")).expect_err("relative");
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn content_renders_and_rewrites_links() {
        let temp = TempDir::new().expect("tempdir");
        let index = site(temp.path(), PageOptions::default());
        let src = write(
            &temp.path().join("a.md"),
            "---\ntitle: A\n---\nSee [b](b.md) and [ext](https://example.com/c.md).",
        );
        let page = Page::new(&index, &src).expect("page");
        let content = page.content().expect("content");
        assert!(content.contains(r#"href="b.html""#));
        assert!(content.contains(r#"href="https://example.com/c.md""#));
        assert!(!content.contains("title: A"));
    }

    #[test]
    fn content_outside_resolve_is_not_kept() {
        let temp = TempDir::new().expect("tempdir");
        let index = site(temp.path(), PageOptions::default());
        let src = write(&temp.path().join("a.md"), "first");
        let page = Page::new(&index, &src).expect("page");
        assert!(page.content().unwrap().contains("first"));
        assert!(page.content.lock().unwrap().is_none());

        write(&src, "second");
        assert!(page.content().unwrap().contains("second"));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let temp = TempDir::new().expect("tempdir");
        let index = site(temp.path(), PageOptions::default());
        let src = temp.path().join("latin1.md");
        fs::write(&src, b"# Caf\xe9\n\nna\xefve\n").unwrap();
        let page = Page::new(&index, &src).expect("page");
        assert_eq!(page.title(), "Caf\u{fffd}");
        assert!(page.content().unwrap().contains("na\u{fffd}ve"));
    }

    #[test]
    fn kept_links_stay_markdown() {
        let temp = TempDir::new().expect("tempdir");
        let options = PageOptions {
            pretty_urls: false,
            keep_links: true,
        };
        let index = site(temp.path(), options);
        let src = write(&temp.path().join("a.md"), "[b](b.md)");
        let page = Page::new(&index, &src).expect("page");
        assert!(page.content().unwrap().contains(r#"href="b.md""#));
    }

    #[test]
    fn data_only_pages_have_no_content() {
        let temp = TempDir::new().expect("tempdir");
        let index = site(temp.path(), PageOptions::default());
        let yaml: serde_yaml::Value = serde_yaml::from_str("title: Tag").unwrap();
        let data = Value::from_serialize(yaml);
        let page = Page::data_only(&index, &temp.path().join("tags/rust.html"), data)
            .expect("data page");
        assert_eq!(page.kind(), PageKind::DataOnly);
        assert_eq!(page.title(), "Tag");
        assert_eq!(page.name(), "rust");
        assert_eq!(page.content().unwrap(), "");
        assert_eq!(index.page_count(), 0);
    }
}
