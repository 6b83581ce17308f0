//! Shared test utilities for the gutenberg test suite.
//!
//! [`BookFixture`] lays out a throwaway book (config, pages, layouts,
//! assets) in a temp directory; the returned [`FixtureBook`] keeps the
//! directory alive and offers lookups into the generated output.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let book = BookFixture::new()
//!     .page("intro.md", "# Intro\n")
//!     .page_layout("<main>{{.Page}}</main>")
//!     .toc(&["intro.md"])
//!     .write();
//!
//! generate_book(&book.options(), &markdown()).unwrap();
//! assert_eq!(book.read_output("intro.html"), "<main><h1>Intro</h1>\n</main>");
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde_json::{Map, Value, json};
use tempfile::TempDir;

use crate::config::BuildOptions;
use crate::generate::Book;
use crate::highlight::NoHighlight;
use crate::markdown::BookMarkdown;

pub const OUTPUT_DIR: &str = "out";
pub const PAGE_LAYOUT: &str = "layouts/page.html";
pub const INDEX_LAYOUT: &str = "layouts/index.html";

/// Markdown without a highlighter, so tests never depend on
/// `source-highlight` being installed.
pub fn markdown() -> BookMarkdown<NoHighlight> {
    BookMarkdown::new(NoHighlight)
}

// =========================================================================
// Fixture setup
// =========================================================================

/// Builder for a book on disk.
#[derive(Default)]
pub struct BookFixture {
    files: Vec<(String, String)>,
    toc: Vec<String>,
    assets: Vec<String>,
    indexes: Map<String, Value>,
    page_layout: Option<String>,
    index_layout: Option<String>,
}

impl BookFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A markdown page (not added to the table of contents).
    pub fn page(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }

    pub fn toc(mut self, files: &[&str]) -> Self {
        self.toc = files.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Write an asset file and list it in the config.
    pub fn asset(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self.assets.push(path.to_string());
        self
    }

    /// List assets in the config without creating them.
    pub fn assets(mut self, paths: &[&str]) -> Self {
        self.assets.extend(paths.iter().map(|p| p.to_string()));
        self
    }

    pub fn index(mut self, name: &str, entries: &[(&str, &str)]) -> Self {
        let entries = entries
            .iter()
            .map(|(file, title)| json!({ "file": file, "title": title }))
            .collect();
        self.indexes.insert(name.to_string(), Value::Array(entries));
        self
    }

    /// Write `layouts/page.html` and configure it as the page layout.
    pub fn page_layout(mut self, content: &str) -> Self {
        self.files.push((PAGE_LAYOUT.to_string(), content.to_string()));
        self.page_layout = Some(PAGE_LAYOUT.to_string());
        self
    }

    /// Write `layouts/index.html` and configure it as the index layout.
    pub fn index_layout(mut self, content: &str) -> Self {
        self.files.push((INDEX_LAYOUT.to_string(), content.to_string()));
        self.index_layout = Some(INDEX_LAYOUT.to_string());
        self
    }

    /// Configure layout paths without writing any file.
    pub fn layout_paths(mut self, index: Option<&str>, page: Option<&str>) -> Self {
        self.index_layout = index.map(str::to_string);
        self.page_layout = page.map(str::to_string);
        self
    }

    pub fn config_json(&self) -> Value {
        let mut config = json!({
            "output_directory": OUTPUT_DIR,
            "table_of_contents": self.toc,
            "indexes": self.indexes,
            "assets": self.assets,
        });
        if self.page_layout.is_some() || self.index_layout.is_some() {
            config["layouts"] = json!({
                "html": { "index": self.index_layout, "page": self.page_layout }
            });
        }
        config
    }

    pub fn write(self) -> FixtureBook {
        let tmp = TempDir::new().unwrap();
        let book = FixtureBook { tmp };
        for (path, content) in &self.files {
            book.write_source(path, content);
        }
        book.write_source(
            "config.json",
            &serde_json::to_string_pretty(&self.config_json()).unwrap(),
        );
        book
    }
}

/// A book written to a temp directory.
pub struct FixtureBook {
    tmp: TempDir,
}

impl FixtureBook {
    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn options(&self) -> BuildOptions {
        BuildOptions::new(self.root())
    }

    pub fn load(&self) -> Book {
        Book::load(&self.options()).unwrap()
    }

    pub fn source(&self, path: &str) -> PathBuf {
        self.root().join(path)
    }

    pub fn output(&self, path: &str) -> PathBuf {
        self.root().join(OUTPUT_DIR).join(path)
    }

    /// Write a file under the source root, creating directories.
    pub fn write_source(&self, path: &str, content: &str) {
        let path = self.source(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn remove_source(&self, path: &str) {
        fs::remove_file(self.source(path)).unwrap();
    }

    /// Set a source file's modification time to `secs` after the epoch.
    pub fn set_mtime(&self, path: &str, secs: u64) {
        touch(&self.source(path), secs);
    }

    pub fn read_output(&self, path: &str) -> String {
        fs::read_to_string(self.output(path))
            .unwrap_or_else(|e| panic!("output {path} not readable: {e}"))
    }

    pub fn output_mtime(&self, path: &str) -> SystemTime {
        fs::metadata(self.output(path)).unwrap().modified().unwrap()
    }

    /// Every file under the output directory, relative, `/`-separated and
    /// sorted.
    pub fn output_files(&self) -> Vec<String> {
        let root = self.root().join(OUTPUT_DIR);
        let mut files = Vec::new();
        collect_files(&root, &root, &mut files);
        files.sort();
        files
    }
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_files(root, &path, files);
        } else {
            let relative = path.strip_prefix(root).unwrap();
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}

/// Set a file's modification time to `secs` after the epoch.
pub fn touch(path: &Path, secs: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}
