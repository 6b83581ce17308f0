//! Book generation passes.
//!
//! A pass turns the current [`Book`] (config + resolved paths) into files in
//! the output directory. There are two kinds, chosen by the regeneration loop
//! in [`crate::watch`]:
//!
//! - **Full rebuild** ([`full_rebuild`]): copies every asset, renders every
//!   table-of-contents page and the index page, then records the timestamps
//!   of the structural inputs. The first error aborts the pass.
//! - **Incremental pass** ([`incremental_pass`]): touches only the assets and
//!   pages whose modification time changed. An entry that fails to read is
//!   logged and skipped; the rest of the pass continues.
//!
//! In both kinds a fatal error ([`GenerateError::is_fatal`]) stops the pass
//! immediately: a layout that fails to expand would corrupt every page, and
//! assets are mandatory.
//!
//! ## Output Structure
//!
//! ```text
//! out/
//! ├── index.html          # Index layout (only when configured)
//! ├── intro.html          # intro.md
//! ├── chapters/
//! │   └── one.html        # chapters/one.md
//! └── style.css           # css/style.css (base name only)
//! ```

use crate::assets::{self, AssetOutcome};
use crate::config::{BookConfig, BookPaths, BuildOptions, ConfigError};
use crate::markdown::MarkdownTransformer;
use crate::render::{self, PageRenderer};
use crate::template::{LayoutTemplate, TemplateError};
use crate::tracker::{Tracked, WatchState, modified_time};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    #[error("could not locate asset {}: {source}", path.display())]
    MissingAsset { path: PathBuf, source: io::Error },
    #[error("failed to expand layout {}: {source}", path.display())]
    Template {
        path: PathBuf,
        source: TemplateError,
    },
}

impl GenerateError {
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Errors that end the process instead of just the current entry or pass.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingAsset { .. } | Self::Template { .. })
    }
}

/// The config and file locations for one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub config: BookConfig,
    pub paths: BookPaths,
    /// Modification time of the config file, taken before it was read.
    pub config_stamp: Option<SystemTime>,
}

impl Book {
    /// Read the config fresh from disk and resolve every path.
    pub fn load(options: &BuildOptions) -> Result<Self, ConfigError> {
        // An edit landing after the read then still counts as a change.
        let config_stamp = modified_time(&options.config_path());
        let config = options.load_config()?;
        let paths = BookPaths::resolve(options, &config);
        Ok(Self {
            config,
            paths,
            config_stamp,
        })
    }
}

/// Why a full rebuild runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    /// Nothing has been generated yet.
    Initial,
    ConfigChanged,
    PageLayoutChanged,
    IndexLayoutChanged,
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RebuildReason::Initial => "initial build",
            RebuildReason::ConfigChanged => "configuration changed",
            RebuildReason::PageLayoutChanged => "page layout changed",
            RebuildReason::IndexLayoutChanged => "index layout changed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Full(RebuildReason),
    Incremental,
}

/// A page written during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOutput {
    pub source: String,
    pub output: PathBuf,
}

/// An asset copied during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetCopy {
    pub source: String,
    pub output: PathBuf,
}

/// An entry an incremental pass gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub source: String,
    pub reason: String,
}

/// What a pass did, in the order it did it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub kind: PassKind,
    pub assets: Vec<AssetCopy>,
    pub pages: Vec<PageOutput>,
    pub index: Option<PathBuf>,
    pub skipped: Vec<Skipped>,
}

impl PassReport {
    fn new(kind: PassKind) -> Self {
        Self {
            kind,
            assets: Vec::new(),
            pages: Vec::new(),
            index: None,
            skipped: Vec::new(),
        }
    }

    /// True when the pass wrote nothing and skipped nothing.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
            && self.pages.is_empty()
            && self.index.is_none()
            && self.skipped.is_empty()
    }
}

/// Build the whole book once: the non-watch mode.
pub fn generate_book<M>(options: &BuildOptions, markdown: &M) -> Result<PassReport, GenerateError>
where
    M: MarkdownTransformer + ?Sized,
{
    let book = Book::load(options)?;
    let mut state = WatchState::new();
    full_rebuild(&book, &mut state, markdown, RebuildReason::Initial)
}

/// Regenerate everything and record every timestamp.
pub fn full_rebuild<M>(
    book: &Book,
    state: &mut WatchState,
    markdown: &M,
    reason: RebuildReason,
) -> Result<PassReport, GenerateError>
where
    M: MarkdownTransformer + ?Sized,
{
    let Book {
        config,
        paths,
        config_stamp,
    } = book;
    log::info!("Generating book ({reason})");
    let mut report = PassReport::new(PassKind::Full(reason));

    // Layouts are stamped before they are read, like the config in
    // `Book::load`, so an edit made during this pass shows up next tick.
    let page_layout_stamp = paths.page_layout.as_deref().and_then(modified_time);
    let index_layout_stamp = paths.index_layout.as_deref().and_then(modified_time);

    create_output_dir(&paths.output)?;
    let page_layout = render::load_layout(paths.page_layout.as_deref());

    for asset in &config.assets {
        if let AssetOutcome::Copied(output) = assets::sync_asset(asset, paths, state, true)? {
            report.assets.push(AssetCopy {
                source: asset.clone(),
                output,
            });
        }
    }

    let renderer = PageRenderer::new(config, paths, page_layout.as_ref(), markdown);
    for page in &config.table_of_contents {
        let stamp = modified_time(&paths.source_file(&page.file));
        let output = renderer.render(page)?;
        if let Some(stamp) = stamp {
            state.record(Tracked::Page(&page.file), stamp);
        }
        report.pages.push(PageOutput {
            source: page.file.clone(),
            output,
        });
    }

    if let Some(index_layout) = render::load_layout(paths.index_layout.as_deref())
        && let Some(layout_path) = paths.index_layout.as_deref()
    {
        report.index = Some(render::render_index(config, paths, &index_layout, layout_path)?);
    }

    if let Some(stamp) = *config_stamp {
        state.record(Tracked::Config, stamp);
    }
    if let Some(stamp) = page_layout_stamp {
        state.record(Tracked::PageLayout, stamp);
    }
    if let Some(stamp) = index_layout_stamp {
        state.record(Tracked::IndexLayout, stamp);
    }
    Ok(report)
}

/// Regenerate only what changed since the timestamps in `state`.
pub fn incremental_pass<M>(
    book: &Book,
    state: &mut WatchState,
    markdown: &M,
) -> Result<PassReport, GenerateError>
where
    M: MarkdownTransformer + ?Sized,
{
    let Book { config, paths, .. } = book;
    let mut report = PassReport::new(PassKind::Incremental);
    create_output_dir(&paths.output)?;

    for asset in &config.assets {
        match assets::sync_asset(asset, paths, state, false) {
            Ok(AssetOutcome::Copied(output)) => report.assets.push(AssetCopy {
                source: asset.clone(),
                output,
            }),
            Ok(AssetOutcome::Unchanged) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => skip(&mut report, asset, e),
        }
    }

    // The layout is only read once some page actually needs rendering.
    let mut page_layout: Option<Option<LayoutTemplate>> = None;
    for page in &config.table_of_contents {
        let stamp = modified_time(&paths.source_file(&page.file));
        if !state.has_changed(Tracked::Page(&page.file), stamp) {
            continue;
        }
        log::info!("Generate page {}", page.file);

        let layout = page_layout
            .get_or_insert_with(|| render::load_layout(paths.page_layout.as_deref()))
            .as_ref();
        let renderer = PageRenderer::new(config, paths, layout, markdown);
        match renderer.render(page) {
            Ok(output) => {
                if let Some(stamp) = stamp {
                    state.record(Tracked::Page(&page.file), stamp);
                }
                report.pages.push(PageOutput {
                    source: page.file.clone(),
                    output,
                });
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => skip(&mut report, &page.file, e),
        }
    }
    Ok(report)
}

fn skip(report: &mut PassReport, source: &str, error: GenerateError) {
    log::debug!("skipping {source}: {error}");
    report.skipped.push(Skipped {
        source: source.to_string(),
        reason: error.to_string(),
    });
}

/// Create the output directory; an existing one is fine.
fn create_output_dir(output: &Path) -> Result<(), GenerateError> {
    fs::create_dir_all(output).map_err(|e| GenerateError::io("create output directory", output, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn generate_book_writes_exactly_the_toc_pages() {
        let book = BookFixture::new()
            .page("a.md", "# A\n")
            .page("b.md", "Some *b* text\n")
            .toc(&["a.md", "b.md"])
            .write();

        let report = generate_book(&book.options(), &markdown()).unwrap();

        assert_eq!(report.kind, PassKind::Full(RebuildReason::Initial));
        assert_eq!(book.output_files(), vec!["a.html", "b.html"]);
        assert_eq!(book.read_output("a.html"), markdown().transform("# A\n"));
        assert_eq!(book.read_output("b.html"), "<p>Some <em>b</em> text</p>\n");
    }

    #[test]
    fn full_rebuild_records_every_timestamp() {
        let book = BookFixture::new()
            .page("intro.md", "hi")
            .page_layout("<main>{{.Page}}</main>")
            .asset("css/style.css", "body {}")
            .toc(&["intro.md"])
            .write();

        let mut state = WatchState::new();
        let loaded = book.load();
        full_rebuild(&loaded, &mut state, &markdown(), RebuildReason::Initial).unwrap();

        assert!(state.recorded(Tracked::Config).is_some());
        assert!(state.recorded(Tracked::PageLayout).is_some());
        assert!(state.recorded(Tracked::IndexLayout).is_none());
        assert!(state.recorded(Tracked::Page("intro.md")).is_some());
        assert!(state.recorded(Tracked::Asset("css/style.css")).is_some());
    }

    #[test]
    fn config_edited_after_load_stays_stale() {
        let book = BookFixture::new()
            .page("a.md", "a")
            .page("b.md", "b")
            .toc(&["a.md"])
            .write();
        let loaded = book.load();

        // The config changes between reading it and finishing the pass.
        let config = BookFixture::new().toc(&["a.md", "b.md"]).config_json();
        book.write_source("config.json", &config.to_string());
        book.set_mtime("config.json", 5_000_000);
        let mut state = WatchState::new();
        full_rebuild(&loaded, &mut state, &markdown(), RebuildReason::Initial).unwrap();

        assert_eq!(state.recorded(Tracked::Config), loaded.config_stamp);
        assert!(state.has_changed(Tracked::Config, modified_time(&loaded.paths.config)));
    }

    #[test]
    fn unreadable_page_aborts_full_build_before_later_pages() {
        let book = BookFixture::new()
            .page("a.md", "a")
            .page("c.md", "c")
            .toc(&["a.md", "missing.md", "c.md"])
            .write();

        let err = generate_book(&book.options(), &markdown()).unwrap_err();

        assert!(matches!(err, GenerateError::Io { .. }), "{err}");
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("missing.md"));
        assert_eq!(book.output_files(), vec!["a.html"]);
    }

    #[test]
    fn non_utf8_page_does_not_stop_the_build() {
        let book = BookFixture::new()
            .page("b.md", "b")
            .toc(&["a.md", "b.md"])
            .write();
        fs::write(book.source("a.md"), b"caf\xe9\n").unwrap();

        let report = generate_book(&book.options(), &markdown()).unwrap();

        assert_eq!(report.pages.len(), 2);
        assert_eq!(book.read_output("a.html"), "<p>caf\u{FFFD}</p>\n");
        assert_eq!(book.read_output("b.html"), "<p>b</p>\n");
    }

    #[test]
    fn missing_asset_is_fatal() {
        let book = BookFixture::new()
            .page("a.md", "a")
            .toc(&["a.md"])
            .assets(&["img/logo.png"])
            .write();

        let err = generate_book(&book.options(), &markdown()).unwrap_err();
        assert!(matches!(err, GenerateError::MissingAsset { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_config_is_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = generate_book(&BuildOptions::new(tmp.path()), &markdown()).unwrap_err();
        assert!(matches!(err, GenerateError::Config(ConfigError::Io { .. })));
    }

    #[test]
    fn layout_wraps_pages_with_indexes() {
        let book = BookFixture::new()
            .page("intro.md", "# Intro\n")
            .page_layout("<nav>{{range .Chapters}}{{.Title}};{{end}}</nav>{{.Page}}")
            .index("chapters", &[("intro.html", "Intro"), ("two.html", "Two")])
            .toc(&["intro.md"])
            .write();

        generate_book(&book.options(), &markdown()).unwrap();

        assert_eq!(book.read_output("intro.html"), "<nav>Intro;Two;</nav><h1>Intro</h1>\n");
    }

    #[test]
    fn unreadable_layout_falls_back_to_bare_pages() {
        let book = BookFixture::new()
            .page("a.md", "# A\n")
            .toc(&["a.md"])
            .layout_paths(None, Some("layouts/missing.html"))
            .write();

        generate_book(&book.options(), &markdown()).unwrap();
        assert_eq!(book.read_output("a.html"), "<h1>A</h1>\n");
    }

    #[test]
    fn failing_layout_expansion_is_fatal() {
        // `{{> nav}}` names a partial that is never registered.
        let book = BookFixture::new()
            .page("a.md", "a")
            .page_layout("{{> nav}}{{.Page}}")
            .toc(&["a.md"])
            .write();

        let err = generate_book(&book.options(), &markdown()).unwrap_err();
        assert!(matches!(err, GenerateError::Template { .. }), "{err}");
        assert!(err.is_fatal());
    }

    #[test]
    fn index_layout_renders_index_page() {
        let book = BookFixture::new()
            .page("intro.md", "hi")
            .page("chapters/one.md", "one")
            .index_layout("{{range .Pages}}<a href=\"{{.Href}}\">{{.File}}</a>{{end}}")
            .toc(&["intro.md", "chapters/one.md"])
            .write();

        let report = generate_book(&book.options(), &markdown()).unwrap();

        assert!(report.index.is_some());
        assert_eq!(
            book.read_output("index.html"),
            "<a href=\"intro.html\">intro.md</a><a href=\"chapters/one.html\">chapters/one.md</a>"
        );
        assert_eq!(book.read_output("chapters/one.html"), "<p>one</p>\n");
    }

    #[test]
    fn incremental_pass_renders_only_stale_pages() {
        let book = BookFixture::new()
            .page("a.md", "a")
            .page("b.md", "b")
            .toc(&["a.md", "b.md"])
            .write();
        let loaded = book.load();
        let mut state = WatchState::new();
        full_rebuild(&loaded, &mut state, &markdown(), RebuildReason::Initial).unwrap();

        let report = incremental_pass(&loaded, &mut state, &markdown()).unwrap();
        assert!(report.is_empty());

        book.write_source("b.md", "b2");
        book.set_mtime("b.md", 2_000_000);
        let report = incremental_pass(&loaded, &mut state, &markdown()).unwrap();

        let sources: Vec<&str> = report.pages.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, vec!["b.md"]);
        assert_eq!(book.read_output("b.html"), "<p>b2</p>\n");
    }

    #[test]
    fn incremental_pass_skips_unreadable_pages() {
        let book = BookFixture::new()
            .page("a.md", "a")
            .page("b.md", "b")
            .toc(&["a.md", "b.md"])
            .write();
        let loaded = book.load();
        let mut state = WatchState::new();
        full_rebuild(&loaded, &mut state, &markdown(), RebuildReason::Initial).unwrap();

        book.remove_source("a.md");
        book.write_source("b.md", "b2");
        book.set_mtime("b.md", 2_000_000);
        let report = incremental_pass(&loaded, &mut state, &markdown()).unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].source, "a.md");
        assert_eq!(report.pages.len(), 1);
        assert_eq!(book.read_output("b.html"), "<p>b2</p>\n");
    }

    #[test]
    fn rendering_twice_is_byte_identical() {
        let book = BookFixture::new()
            .page("a.md", "# A\n\n| x | y |\n|---|---|\n| 1 | 2 |\n")
            .page_layout("<html>{{range .Toc}}{{.File}}{{end}}{{.Page}}</html>")
            .index("toc", &[("a.html", "A"), ("b.html", "B")])
            .toc(&["a.md"])
            .write();

        generate_book(&book.options(), &markdown()).unwrap();
        let first = book.read_output("a.html");
        generate_book(&book.options(), &markdown()).unwrap();
        assert_eq!(book.read_output("a.html"), first);
    }
}
