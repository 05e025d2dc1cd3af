//! Front matter block parsing

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_yaml::Value as YamlValue;

use crate::error::{Error, Result};

static FRONT_MATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A-{3,}\s*(.*?)-{3,}\s*(.*)\z").expect("front matter pattern")
});

static FIRST_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*#{1,6}\s*(.+)|\s*(.+)\s*\n\s*[-=]+\s*").expect("heading pattern")
});

/// Arbitrary key/value data from a document's front matter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, YamlValue>);

impl Metadata {
    pub fn get(&self, key: &str) -> Option<&YamlValue> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads a string field; `null` and missing keys are `None`.
    pub fn expect_str(&self, key: &str, path: &Path) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(YamlValue::String(value)) => Ok(Some(value)),
            Some(other) => Err(type_error(path, key, "a string", other)),
        }
    }

    /// Reads a sequence of strings, checking every element.
    pub fn expect_string_list(&self, key: &str, path: &Path) -> Result<Option<Vec<String>>> {
        let items = match self.get(key) {
            None => return Ok(None),
            Some(YamlValue::Sequence(items)) => items,
            Some(other) => return Err(type_error(path, key, "a sequence of strings", other)),
        };
        items
            .iter()
            .map(|item| match item {
                YamlValue::String(value) => Ok(value.clone()),
                other => Err(type_error(path, key, "a sequence of strings", other)),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

fn type_error(path: &Path, key: &str, expected: &'static str, found: &YamlValue) -> Error {
    Error::MetadataType {
        path: path.to_path_buf(),
        key: key.to_string(),
        expected,
        found: yaml_type_name(found),
    }
}

pub fn yaml_type_name(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "a bool",
        YamlValue::Number(_) => "a number",
        YamlValue::String(_) => "a string",
        YamlValue::Sequence(_) => "a sequence",
        YamlValue::Mapping(_) => "a mapping",
        YamlValue::Tagged(_) => "a tagged value",
    }
}

/// Splits a document into its front matter and markup body.
///
/// Documents without a leading dash fence come back untouched with empty
/// metadata. `path` only labels decode errors.
pub fn split_front_matter<'a>(raw: &'a str, path: &Path) -> Result<(Metadata, &'a str)> {
    let Some(captures) = FRONT_MATTER.captures(raw) else {
        return Ok((Metadata::default(), raw));
    };
    let block = captures.get(1).map_or("", |m| m.as_str());
    let body = captures.get(2).map_or("", |m| m.as_str());
    let meta = decode_block(block, path)?;
    Ok((meta, body))
}

fn decode_block(block: &str, path: &Path) -> Result<Metadata> {
    if block.trim().is_empty() {
        return Ok(Metadata::default());
    }
    let decode_error = |source| Error::MetadataDecode {
        path: path.to_path_buf(),
        source,
    };
    let value: YamlValue = serde_yaml::from_str(block).map_err(decode_error)?;
    if value.is_null() {
        return Ok(Metadata::default());
    }
    let map: BTreeMap<String, YamlValue> = serde_yaml::from_value(value).map_err(decode_error)?;
    Ok(Metadata(map))
}

/// Finds the first ATX or setext heading in raw markup, or an empty string.
pub fn first_heading(body: &str) -> String {
    FIRST_HEADING
        .captures(body)
        .and_then(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path() -> &'static Path {
        Path::new("/site/page.md")
    }

    #[test]
    fn splits_title_and_tags() {
        let raw = "---\ntitle: Home\ntags: [a, b]\n---\n# Body\n";
        let (meta, body) = split_front_matter(raw, path()).expect("split");
        assert_eq!(meta.expect_str("title", path()).unwrap(), Some("Home"));
        assert_eq!(
            meta.expect_string_list("tags", path()).unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn no_fence_leaves_body_untouched() {
        for raw in ["# Title\n\ntext", "", "  ---\nnot: fm\n---\n", "--\na: b\n--\n"] {
            let (meta, body) = split_front_matter(raw, path()).expect("split");
            assert!(meta.is_empty());
            assert_eq!(body, raw);
        }
    }

    #[test]
    fn empty_and_null_blocks_are_empty_metadata() {
        let (meta, body) = split_front_matter("---\n---\nbody", path()).expect("split");
        assert!(meta.is_empty());
        assert_eq!(body, "body");

        let (meta, _) = split_front_matter("---\n~\n---\nbody", path()).expect("split");
        assert!(meta.is_empty());
    }

    #[test]
    fn long_fences_are_accepted() {
        let (meta, body) =
            split_front_matter("-----\ntitle: x\n-----\n\ntext", path()).expect("split");
        assert_eq!(meta.expect_str("title", path()).unwrap(), Some("x"));
        assert_eq!(body, "text");
    }

    #[test]
    fn malformed_block_reports_path() {
        let err = split_front_matter("---\ntitle: [unclosed\n---\nbody", path())
            .expect_err("decode error");
        assert!(matches!(err, Error::MetadataDecode { .. }));
        assert!(err.to_string().contains("/site/page.md"));
    }

    #[test]
    fn scalar_block_is_a_decode_error() {
        let err = split_front_matter("---\njust text\n---\nbody", path()).expect_err("not a map");
        assert!(matches!(err, Error::MetadataDecode { .. }));
    }

    #[test]
    fn reencoded_metadata_round_trips() {
        let raw = "---\ntitle: Post\ncount: 3\nnested:\n  key: value\n---\nbody";
        let (meta, body) = split_front_matter(raw, path()).expect("split");
        let encoded = serde_yaml::to_string(&meta).expect("encode");
        let rebuilt = format!("---\n{encoded}---\n{body}");
        let (again, again_body) = split_front_matter(&rebuilt, path()).expect("split");
        assert_eq!(again, meta);
        assert_eq!(again_body, body);
    }

    #[test]
    fn tags_must_be_a_sequence_of_strings() {
        let (meta, _) = split_front_matter("---\ntags: a\n---\n", path()).expect("split");
        let err = meta.expect_string_list("tags", path()).expect_err("string");
        assert!(matches!(err, Error::MetadataType { found: "a string", .. }));

        let (meta, _) = split_front_matter("---\ntags: [a, 2]\n---\n", path()).expect("split");
        let err = meta.expect_string_list("tags", path()).expect_err("number");
        assert!(matches!(err, Error::MetadataType { found: "a number", .. }));
    }

    #[test]
    fn finds_atx_heading() {
        assert_eq!(first_heading("# My Post\n\ntext"), "My Post");
        assert_eq!(first_heading("intro\n\n### Third level\n"), "Third level");
    }

    #[test]
    fn finds_setext_heading() {
        assert_eq!(first_heading("My Title\n========\n\ntext"), "My Title");
        assert_eq!(first_heading("Other\n---\n"), "Other");
    }

    #[test]
    fn missing_heading_is_empty() {
        assert_eq!(first_heading("just a paragraph"), "");
    }
}
