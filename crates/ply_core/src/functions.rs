//! Functions available inside layouts.
//!
//! Every path argument is resolved against the directory that holds the
//! layout definition and must stay inside the target root.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use minijinja::value::{Rest, Value};
use minijinja::{Environment, ErrorKind, State, context};
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{Error, IoContext, Result};
use crate::index::SiteIndex;
use crate::layout::{ImportTable, LAYOUT_FILE_NAME};
use crate::page::Page;
use crate::path::{path_to_url, relative_path, resolve_within};

/// Compiled patterns shared by every layout of a site.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: Mutex<HashMap<String, Regex>>,
}

impl RegexCache {
    pub fn get(&self, pattern: &str) -> Result<Regex, regex::Error> {
        let mut compiled = self.compiled.lock().expect("regex cache lock");
        if let Some(regex) = compiled.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)?;
        compiled.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// What a layout's functions can see: the site and the layout's own
/// directory.
#[derive(Debug)]
pub struct TemplateScope {
    site: Arc<SiteIndex>,
    dir: PathBuf,
    imports: ImportTable,
}

impl TemplateScope {
    pub fn new(site: Arc<SiteIndex>, dir: PathBuf, imports: ImportTable) -> Self {
        Self { site, dir, imports }
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        resolve_within(self.site.target_root(), &self.dir, path)
    }

    /// Entries below `path` keyed by their `/`-separated path relative to
    /// it. Markup, rendered pages and layout definitions are skipped.
    pub fn list(
        &self,
        path: &str,
        kind: EntryKind,
        recursive: bool,
    ) -> Result<BTreeMap<String, String>> {
        let base = self.resolve(path)?;
        let mut walker = WalkDir::new(&base).min_depth(1).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut entries = BTreeMap::new();
        for entry in walker {
            let entry = entry?;
            let is_dir = entry.file_type().is_dir();
            if is_dir != (kind == EntryKind::Dir) {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if file_name == LAYOUT_FILE_NAME {
                continue;
            }
            let ext = entry.path().extension().and_then(|ext| ext.to_str());
            if !is_dir && matches!(ext, Some("md") | Some("html")) {
                continue;
            }
            let rel = entry.path().strip_prefix(&base).unwrap_or(entry.path());
            entries.insert(path_to_url(rel), file_name.into_owned());
        }
        Ok(entries)
    }

    pub fn has_page(&self, url: &str) -> bool {
        self.site.has_page(url)
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.resolve(path)
            .map(|abs| fs::metadata(abs).is_ok())
            .unwrap_or(false)
    }

    pub fn include(&self, path: &str) -> Result<String> {
        let abs = self.resolve(path)?;
        fs::read_to_string(&abs).at(abs)
    }

    /// Reads `path` and makes it available to this layout as `name`. The
    /// first import of a name is the one that sticks.
    pub fn import(&self, env: &Environment<'_>, path: &str, name: &str) -> Result<()> {
        let abs = self.resolve(path)?;
        let source = fs::read_to_string(&abs).at(&abs)?;
        self.imports
            .lock()
            .expect("template import lock")
            .entry(name.to_string())
            .or_insert(source);
        if let Err(source) = env.get_template(name) {
            self.imports
                .lock()
                .expect("template import lock")
                .remove(name);
            return Err(Error::TemplateCompile { path: abs, source });
        }
        Ok(())
    }

    /// Renders the sub-template `name` for a data-only page at `path` and
    /// writes the result there.
    pub fn write_template(
        &self,
        env: &Environment<'_>,
        name: &str,
        path: &str,
        data: Value,
    ) -> Result<PathBuf> {
        let abs = self.resolve(path)?;
        if !self.site.allow_template_writes() {
            return Err(Error::TemplateWriteDisabled(abs));
        }
        let page = Arc::new(Page::data_only(&self.site, &abs, data)?);
        let template = env
            .get_template(name)
            .map_err(|source| Error::TemplateCompile {
                path: PathBuf::from(name),
                source,
            })?;
        let rendered = template
            .render(context! { page => Value::from_dyn_object(page) })
            .map_err(|source| Error::TemplateExecution {
                template: PathBuf::from(name),
                page: abs.clone(),
                source,
            })?;

        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        fs::write(&abs, rendered).at(&abs)?;
        tracing::info!(template = name, path = %abs.display(), "File from template");
        self.site.record_written(abs.clone());
        Ok(abs)
    }

    pub fn yaml_read(&self, path: &str) -> Result<serde_yaml::Value> {
        let abs = self.resolve(path)?;
        let raw = fs::read_to_string(&abs).at(&abs)?;
        serde_yaml::from_str(&raw).map_err(|source| Error::YamlDecode { path: abs, source })
    }

    pub fn yaml_write(&self, path: &str, data: &Value) -> Result<PathBuf> {
        let abs = self.resolve(path)?;
        if !self.site.allow_template_writes() {
            return Err(Error::TemplateWriteDisabled(abs));
        }
        let encoded = serde_yaml::to_string(data).map_err(|source| Error::YamlEncode {
            path: abs.clone(),
            source,
        })?;
        fs::write(&abs, encoded).at(&abs)?;
        self.site.record_written(abs.clone());
        Ok(abs)
    }

    pub fn regex(&self, pattern: &str) -> Result<Regex, minijinja::Error> {
        self.site.regex_cache().get(pattern).map_err(|err| {
            minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("invalid regex {pattern}"),
            )
            .with_source(err)
        })
    }
}

pub fn register_functions(env: &mut Environment<'static>, scope: Arc<TemplateScope>) {
    let s = Arc::clone(&scope);
    env.add_function(
        "list_files",
        move |path: String, recursive: Option<bool>| -> Result<Value, minijinja::Error> {
            let entries = s.list(&path, EntryKind::File, recursive.unwrap_or(false))?;
            Ok(Value::from_serialize(entries))
        },
    );
    let s = Arc::clone(&scope);
    env.add_function(
        "list_dirs",
        move |path: String, recursive: Option<bool>| -> Result<Value, minijinja::Error> {
            let entries = s.list(&path, EntryKind::Dir, recursive.unwrap_or(false))?;
            Ok(Value::from_serialize(entries))
        },
    );
    let s = Arc::clone(&scope);
    env.add_function("has_page", move |url: String| s.has_page(&url));
    let s = Arc::clone(&scope);
    env.add_function("has_file", move |path: String| s.has_file(&path));
    let s = Arc::clone(&scope);
    env.add_function("has_file_or_page", move |path: String| {
        s.has_file(&path) || s.has_page(&path)
    });
    let s = Arc::clone(&scope);
    env.add_function(
        "include",
        move |path: String| -> Result<String, minijinja::Error> { Ok(s.include(&path)?) },
    );
    env.add_function("template_import", template_import_fn(Arc::clone(&scope)));
    env.add_function("template_write", template_write_fn(Arc::clone(&scope)));
    let s = Arc::clone(&scope);
    env.add_function(
        "yaml_read",
        move |path: String| -> Result<Value, minijinja::Error> {
            Ok(Value::from_serialize(s.yaml_read(&path)?))
        },
    );
    let s = Arc::clone(&scope);
    env.add_function(
        "yaml_write",
        move |path: String, data: Value| -> Result<String, minijinja::Error> {
            s.yaml_write(&path, &data)?;
            Ok(String::new())
        },
    );

    let s = Arc::clone(&scope);
    env.add_function(
        "regex_match",
        move |pattern: String, subject: String| -> Result<bool, minijinja::Error> {
            Ok(s.regex(&pattern)?.is_match(&subject))
        },
    );
    let s = Arc::clone(&scope);
    env.add_function(
        "regex_replace_all",
        move |pattern: String,
              subject: String,
              replacement: String|
              -> Result<String, minijinja::Error> {
            Ok(s
                .regex(&pattern)?
                .replace_all(&subject, replacement.as_str())
                .into_owned())
        },
    );
    let s = Arc::clone(&scope);
    env.add_function(
        "regex_find",
        move |pattern: String, subject: String| -> Result<String, minijinja::Error> {
            Ok(s
                .regex(&pattern)?
                .find(&subject)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default())
        },
    );
    let s = Arc::clone(&scope);
    env.add_function(
        "regex_find_submatch",
        move |pattern: String, subject: String| -> Result<Value, minijinja::Error> {
            Ok(Value::from(find_submatch(&s.regex(&pattern)?, &subject)))
        },
    );

    env.add_function("strings_join", strings_join);
    env.add_function("strings_split", |subject: String, sep: String| {
        Value::from(
            subject
                .split(sep.as_str())
                .map(str::to_string)
                .collect::<Vec<_>>(),
        )
    });
    env.add_function("array", |items: Rest<Value>| Value::from(items.0));

    env.add_function("path_base", |path: String| path_base(&path));
    env.add_function("path_dir", |path: String| path_dir(&path));
    env.add_function(
        "path_rel",
        |base: String, target: String| -> Result<String, minijinja::Error> {
            let rel = relative_path(Path::new(&base), Path::new(&target))?;
            Ok(path_to_url(&rel))
        },
    );
    env.add_function(
        "path_match",
        |pattern: String, name: String| -> Result<bool, minijinja::Error> {
            let pattern = glob::Pattern::new(&pattern).map_err(|err| {
                minijinja::Error::new(ErrorKind::InvalidOperation, err.to_string())
            })?;
            Ok(pattern.matches(&name))
        },
    );

    env.add_function("time_now", time_now);
    env.add_function("time_format", time_format);
    env.add_function("time_parse", time_parse);
}

fn template_import_fn(
    scope: Arc<TemplateScope>,
) -> impl Fn(&State, String, String) -> Result<String, minijinja::Error> + Send + Sync + 'static {
    move |state: &State, path: String, name: String| {
        scope.import(state.env(), &path, &name)?;
        Ok(String::new())
    }
}

fn template_write_fn(
    scope: Arc<TemplateScope>,
) -> impl Fn(&State, String, String, Option<Value>) -> Result<String, minijinja::Error>
+ Send
+ Sync
+ 'static {
    move |state: &State, name: String, path: String, data: Option<Value>| {
        scope.write_template(state.env(), &name, &path, data.unwrap_or_default())?;
        Ok(String::new())
    }
}

fn find_submatch(regex: &Regex, subject: &str) -> Vec<String> {
    regex
        .captures(subject)
        .map(|caps| {
            caps.iter()
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

fn strings_join(items: Value, sep: String) -> Result<String, minijinja::Error> {
    let parts = items
        .try_iter()?
        .map(|item| match item.as_str() {
            Some(text) => text.to_string(),
            None => item.to_string(),
        })
        .collect::<Vec<_>>();
    Ok(parts.join(&sep))
}

fn path_base(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string())
}

fn path_dir(path: &str) -> String {
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => path_to_url(parent),
        Some(_) => ".".to_string(),
        None => path.to_string(),
    }
}

fn time_now() -> String {
    Utc::now().to_rfc3339()
}

fn check_format(format: &str) -> Result<(), minijinja::Error> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid time format {format:?}"),
        ));
    }
    Ok(())
}

/// Formats an RFC 3339 timestamp with a strftime format.
fn time_format(value: String, format: String) -> Result<String, minijinja::Error> {
    check_format(&format)?;
    let time = DateTime::parse_from_rfc3339(&value).map_err(|err| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("not an RFC 3339 time: {value}"),
        )
        .with_source(err)
    })?;
    Ok(time.format(&format).to_string())
}

/// Parses `value` with a strftime format into an RFC 3339 timestamp.
/// Formats without an offset are read as UTC.
fn time_parse(format: String, value: String) -> Result<String, minijinja::Error> {
    check_format(&format)?;
    if let Ok(time) = DateTime::parse_from_str(&value, &format) {
        return Ok(time.to_rfc3339());
    }
    if let Ok(time) = NaiveDateTime::parse_from_str(&value, &format) {
        return Ok(time.and_utc().to_rfc3339());
    }
    NaiveDate::parse_from_str(&value, &format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|time| time.and_utc().to_rfc3339())
        .ok_or_else(|| {
            minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot parse {value:?} with format {format:?}"),
            )
        })
}
