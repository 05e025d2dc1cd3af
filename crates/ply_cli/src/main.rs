use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ply_core::{BuildConfig, Site, load_build_config};
use tracing_subscriber::EnvFilter;

/// Render a tree of markdown documents through directory-scoped layouts.
#[derive(Debug, Parser)]
#[command(name = "ply", version, about)]
struct Cli {
    /// Directory holding the sources.
    source: PathBuf,
    /// Directory receiving the rendered site. May equal the source.
    target: PathBuf,
    /// Keep `.md` sources in the output.
    #[arg(long)]
    include_markdown: bool,
    /// Keep layout definitions in the output.
    #[arg(long)]
    include_layouts: bool,
    /// Render `x.md` as `x/index.html`.
    #[arg(long)]
    pretty_urls: bool,
    /// Leave links to `.md` files untouched.
    #[arg(long)]
    keep_links: bool,
    /// File name pattern to leave out of the copy; replaces the default.
    #[arg(long, value_name = "REGEX")]
    ignore: Vec<String>,
    /// Let layouts write additional files.
    #[arg(long)]
    allow_writes: bool,
    /// YAML file with build options.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = build_config(&cli)?;
    let mut site = Site::new(&cli.source, &cli.target, config).with_context(|| {
        format!(
            "failed to set up build from {} to {}",
            cli.source.display(),
            cli.target.display()
        )
    })?;
    let summary = site
        .build()
        .with_context(|| format!("failed to build {}", site.target_root().display()))?;

    tracing::info!(
        source = %site.source_root().display(),
        target = %site.target_root().display(),
        pages = summary.pages,
        layouts = summary.layouts,
        copied = summary.copied,
        template_files = summary.template_files,
        removed = summary.removed,
        "build finished"
    );
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new("info"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Options from `--config`, with command line flags switched on top.
fn build_config(cli: &Cli) -> Result<BuildConfig> {
    let mut config = match &cli.config {
        Some(path) => load_build_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => BuildConfig::default(),
    };
    config.include_markdown |= cli.include_markdown;
    config.include_layouts |= cli.include_layouts;
    config.pretty_urls |= cli.pretty_urls;
    config.keep_links |= cli.keep_links;
    config.allow_template_writes |= cli.allow_writes;
    if !cli.ignore.is_empty() {
        config.ignore = cli.ignore.clone();
    }
    Ok(config)
}
