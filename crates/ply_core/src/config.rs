use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::copy::DEFAULT_IGNORE;
use crate::error::{Error, IoContext, Result};
use crate::page::PageOptions;

/// Options fixed for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Keep source markup files in the output.
    pub include_markdown: bool,
    /// Keep layout definitions in the output.
    pub include_layouts: bool,
    pub pretty_urls: bool,
    /// Leave links to `.md` files as written.
    pub keep_links: bool,
    pub allow_template_writes: bool,
    /// File name patterns left out of the copy. Empty means dotfiles.
    pub ignore: Vec<String>,
}

impl BuildConfig {
    pub fn page_options(&self) -> PageOptions {
        PageOptions {
            pretty_urls: self.pretty_urls,
            keep_links: self.keep_links,
        }
    }

    pub fn ignore_patterns(&self) -> Vec<String> {
        if self.ignore.is_empty() {
            vec![DEFAULT_IGNORE.to_string()]
        } else {
            self.ignore.clone()
        }
    }
}

pub fn load_build_config(path: &Path) -> Result<BuildConfig> {
    let raw = fs::read_to_string(path).at(path)?;
    parse_build_config(&raw, path)
}

fn parse_build_config(raw: &str, path: &Path) -> Result<BuildConfig> {
    if raw.trim().is_empty() {
        return Ok(BuildConfig::default());
    }
    serde_yaml::from_str(raw).map_err(|err| {
        Error::Configuration(format!("failed to parse {}: {err}", path.display()))
    })
}
