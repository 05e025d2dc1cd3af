use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} must be an absolute path")]
    InvalidPath(PathBuf),
    #[error("no relative path from {from} to {to}")]
    NoRelativePath { from: PathBuf, to: PathBuf },
    #[error("failed to decode front matter in {path}")]
    MetadataDecode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to decode YAML data in {path}")]
    YamlDecode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to encode YAML data for {path}")]
    YamlEncode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path}: metadata \"{key}\" must be {expected}, but was {found}")]
    MetadataType {
        path: PathBuf,
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{path} is not inside {root}")]
    OutOfRoot { path: PathBuf, root: PathBuf },
    #[error("failed to compile template {path}")]
    TemplateCompile {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },
    #[error("template {template} failed while rendering {page}")]
    TemplateExecution {
        template: PathBuf,
        page: PathBuf,
        #[source]
        source: minijinja::Error,
    },
    #[error("template writes are disabled, refusing to write {0}")]
    TemplateWriteDisabled(PathBuf),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("{first} and {second} both render to {target}")]
    DuplicateTarget {
        target: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("invalid ignore pattern {pattern}")]
    IgnorePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("io error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Attaches the offending path to an io error.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}

impl From<Error> for minijinja::Error {
    fn from(err: Error) -> Self {
        minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, err.to_string())
            .with_source(err)
    }
}
