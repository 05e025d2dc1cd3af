pub mod config;
pub mod copy;
pub mod error;
pub mod front_matter;
pub mod functions;
pub mod index;
pub mod layout;
pub mod page;
pub mod path;
pub mod render;
pub mod site;

pub use crate::config::{BuildConfig, load_build_config};
pub use crate::error::{Error, Result};
pub use crate::site::{BuildSummary, Site};
