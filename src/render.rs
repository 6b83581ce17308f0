//! Rendering a single page (and the index page) to disk.
//!
//! ```text
//! {source}/chapters/one.md
//!     → markdown → HTML fragment
//!     → page layout (if loaded) with GenerationContext::for_page
//!     → {output}/chapters/one.html
//! ```
//!
//! The renderer itself keeps no state between pages. Whether a page needs
//! rendering at all is decided by the caller.

use crate::config::{BookConfig, BookPaths, PageRef};
use crate::generate::GenerateError;
use crate::markdown::MarkdownTransformer;
use crate::template::{GenerationContext, LayoutTemplate};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Name of the page rendered from the index layout.
pub const INDEX_PAGE: &str = "index.html";

/// Output location of a page, relative to the output directory.
///
/// The extension is replaced with `.html` (or added when there is none) and
/// subdirectories are kept. Root, prefix and `..` components are dropped so
/// a page can never be written outside the output directory.
pub fn output_path(file: &str) -> PathBuf {
    let relative: PathBuf = Path::new(file)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    relative.with_extension("html")
}

/// Read and parse a layout file.
///
/// A layout that can't be read or parsed is logged and treated as absent:
/// pages are then written without any wrapping.
pub fn load_layout(path: Option<&Path>) -> Option<LayoutTemplate> {
    let path = path?;
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            log::warn!("layout {} unreadable, rendering without it: {e}", path.display());
            return None;
        }
    };
    match LayoutTemplate::parse(&source) {
        Ok(layout) => Some(layout),
        Err(e) => {
            log::warn!("layout {} invalid, rendering without it: {e}", path.display());
            None
        }
    }
}

/// Renders table-of-contents pages for one pass.
pub struct PageRenderer<'a, M: ?Sized> {
    config: &'a BookConfig,
    paths: &'a BookPaths,
    layout: Option<&'a LayoutTemplate>,
    markdown: &'a M,
}

impl<'a, M> PageRenderer<'a, M>
where
    M: MarkdownTransformer + ?Sized,
{
    pub fn new(
        config: &'a BookConfig,
        paths: &'a BookPaths,
        layout: Option<&'a LayoutTemplate>,
        markdown: &'a M,
    ) -> Self {
        Self {
            config,
            paths,
            layout,
            markdown,
        }
    }

    /// The final HTML of a page, without writing it.
    pub fn render_html(&self, page: &PageRef) -> Result<String, GenerateError> {
        let source_path = self.paths.source_file(&page.file);
        let bytes =
            fs::read(&source_path).map_err(|e| GenerateError::io("read page", &source_path, e))?;
        let content = String::from_utf8(bytes).unwrap_or_else(|e| {
            log::warn!("{} is not valid UTF-8, replacing bad bytes", source_path.display());
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        });
        let html = self.markdown.transform(&content);

        let Some(layout) = self.layout else {
            return Ok(html);
        };
        let context = GenerationContext::for_page(&html, self.config);
        layout
            .expand(&context)
            .map_err(|source| GenerateError::Template {
                path: self.paths.page_layout.clone().unwrap_or_default(),
                source,
            })
    }

    /// Render a page and write it into the output directory. Returns the
    /// path written.
    pub fn render(&self, page: &PageRef) -> Result<PathBuf, GenerateError> {
        let html = self.render_html(page)?;
        let output = self.paths.output.join(output_path(&page.file));
        write_page(&output, &html)?;
        Ok(output)
    }
}

/// Render `{output}/index.html` from the index layout.
pub fn render_index(
    config: &BookConfig,
    paths: &BookPaths,
    layout: &LayoutTemplate,
    layout_path: &Path,
) -> Result<PathBuf, GenerateError> {
    let context = GenerationContext::for_index(config);
    let html = layout
        .expand(&context)
        .map_err(|source| GenerateError::Template {
            path: layout_path.to_path_buf(),
            source,
        })?;
    let output = paths.output.join(INDEX_PAGE);
    write_page(&output, &html)?;
    Ok(output)
}

fn write_page(output: &Path, html: &str) -> Result<(), GenerateError> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| GenerateError::io("create directory", parent, e))?;
    }
    fs::write(output, html).map_err(|e| GenerateError::io("write page", output, e))
}
