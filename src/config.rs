//! Book configuration module.
//!
//! Handles loading and validating the book's `config.json` and resolving the
//! file locations every other stage works with.
//!
//! ## Config File Location
//!
//! The config file lives in the source root and defaults to
//! `{source}/config.json`. `--config` overrides the name; a relative override
//! is still resolved against the source root.
//!
//! ```text
//! book/
//! ├── config.json
//! ├── layouts/
//! │   ├── index.html
//! │   └── page.html
//! ├── css/style.css
//! ├── intro.md
//! └── chapters/
//!     └── one.md
//! ```
//!
//! ## Configuration Options
//!
//! ```json
//! {
//!   "output_directory": "out",
//!   "default_output_format": "html",
//!   "table_of_contents": [
//!     { "file": "intro.md" },
//!     "chapters/one.md"
//!   ],
//!   "layouts": {
//!     "html": { "index": "layouts/index.html", "page": "layouts/page.html" }
//!   },
//!   "indexes": {
//!     "chapters": [
//!       { "file": "intro.html", "title": "Introduction" },
//!       { "file": "chapters/one.html", "title": "Chapter One" }
//!     ]
//!   },
//!   "assets": ["css/style.css"]
//! }
//! ```
//!
//! Only `output_directory` is required. Table-of-contents entries may be bare
//! strings or `{ "file": ... }` objects. Unknown keys are rejected to catch
//! typos early.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file name used when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// The layout kind (and the only output format) this generator writes.
pub const LAYOUT_KIND: &str = "html";

/// Polling interval of watch mode when `--interval` is not given.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Book configuration loaded from `config.json`.
///
/// Read fresh at the start of every watch tick and treated as immutable for
/// the rest of that tick.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BookConfig {
    /// Where generated pages and copied assets are written. Relative paths
    /// are resolved against the source root.
    pub output_directory: String,
    #[serde(default = "default_output_format")]
    pub default_output_format: String,
    /// Pages in reading order.
    #[serde(default)]
    pub table_of_contents: Vec<PageRef>,
    /// Layout kind (`"html"`) to its index/page templates.
    #[serde(default)]
    pub layouts: IndexMap<String, Layout>,
    /// Named navigation data handed to every layout, in file order.
    #[serde(default)]
    pub indexes: IndexMap<String, Vec<IndexEntry>>,
    /// Files copied verbatim into the output directory (base name only).
    #[serde(default)]
    pub assets: Vec<String>,
}

fn default_output_format() -> String {
    LAYOUT_KIND.to_string()
}

/// A table-of-contents entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PageRefRepr")]
pub struct PageRef {
    /// Markdown source, relative to the source root.
    pub file: String,
}

impl PageRef {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageRefRepr {
    Bare(String),
    Entry { file: String },
}

impl From<PageRefRepr> for PageRef {
    fn from(repr: PageRefRepr) -> Self {
        match repr {
            PageRefRepr::Bare(file) | PageRefRepr::Entry { file } => Self { file },
        }
    }
}

/// Template pair for one layout kind. Paths are relative to the source root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Layout {
    #[serde(alias = "Index")]
    pub index: Option<String>,
    #[serde(alias = "Page")]
    pub page: Option<String>,
}

impl Layout {
    /// Index template path, treating an empty string as unset.
    pub fn index_path(&self) -> Option<&str> {
        self.index.as_deref().filter(|p| !p.is_empty())
    }

    /// Page template path, treating an empty string as unset.
    pub fn page_path(&self) -> Option<&str> {
        self.page.as_deref().filter(|p| !p.is_empty())
    }
}

/// One navigation entry of an index. Layouts see the fields as `File` and
/// `Title`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexEntry {
    pub file: String,
    #[serde(default)]
    pub title: String,
}

impl BookConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse and validate config text. `path` is only used in error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants serde can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_directory.trim().is_empty() {
            return Err(ConfigError::Validation(
                "output_directory must not be empty".into(),
            ));
        }
        if self.default_output_format != LAYOUT_KIND {
            return Err(ConfigError::Validation(format!(
                "unsupported default_output_format {:?} (only \"{LAYOUT_KIND}\" is supported)",
                self.default_output_format
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for page in &self.table_of_contents {
            if page.file.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "table_of_contents entries must name a file".into(),
                ));
            }
            if !seen.insert(page.file.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate table_of_contents entry: {}",
                    page.file
                )));
            }
        }

        if self.index_layout_path().is_some()
            && let Some(page) = self
                .table_of_contents
                .iter()
                .find(|p| crate::render::output_path(&p.file) == Path::new("index.html"))
        {
            return Err(ConfigError::Validation(format!(
                "{} would overwrite the index page rendered from the index layout",
                page.file
            )));
        }
        Ok(())
    }

    /// The HTML layout, if one is configured.
    pub fn layout(&self) -> Option<&Layout> {
        self.layouts.get(LAYOUT_KIND)
    }

    pub fn page_layout_path(&self) -> Option<&str> {
        self.layout().and_then(Layout::page_path)
    }

    pub fn index_layout_path(&self) -> Option<&str> {
        self.layout().and_then(Layout::index_path)
    }
}

/// Options derived once from the command line and passed to every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Root that pages, layouts and assets are read relative to.
    pub source: PathBuf,
    /// Config file override, relative to `source` unless absolute.
    pub config: Option<PathBuf>,
    /// Sleep between watch ticks.
    pub interval: Duration,
}

impl BuildOptions {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            config: None,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Location of the config file: `{source}/config.json` unless overridden.
    pub fn config_path(&self) -> PathBuf {
        match &self.config {
            Some(config) => self.source.join(config),
            None => self.source.join(DEFAULT_CONFIG_FILE),
        }
    }

    pub fn load_config(&self) -> Result<BookConfig, ConfigError> {
        BookConfig::load(&self.config_path())
    }
}

/// Every file location one generation pass touches, derived from the options
/// and the config read for that pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookPaths {
    pub source: PathBuf,
    pub config: PathBuf,
    pub output: PathBuf,
    pub page_layout: Option<PathBuf>,
    pub index_layout: Option<PathBuf>,
}

impl BookPaths {
    pub fn resolve(options: &BuildOptions, config: &BookConfig) -> Self {
        let source = options.source.clone();
        Self {
            config: options.config_path(),
            output: source.join(&config.output_directory),
            page_layout: config.page_layout_path().map(|p| source.join(p)),
            index_layout: config.index_layout_path().map(|p| source.join(p)),
            source,
        }
    }

    /// Path of a file named relative to the source root.
    pub fn source_file(&self, relative: &str) -> PathBuf {
        self.source.join(relative)
    }
}
