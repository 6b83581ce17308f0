//! CLI output formatting for generation passes.
//!
//! Log lines (`env_logger`, stderr) narrate what is happening; this module
//! prints the summary of a finished pass to stdout. Every entry is shown as
//! its source name first, with the written file as context after the arrow.
//! Written paths are relative to the source root when possible.
//!
//! # Output Format
//!
//! ## Full Rebuild
//!
//! ```text
//! Full rebuild (initial build)
//! Assets
//!     css/style.css → out/style.css
//! Pages
//!     001 intro.md → out/intro.html
//!     002 chapters/one.md → out/chapters/one.html
//! Index → out/index.html
//! Generated 2 pages, 1 asset
//! ```
//!
//! ## Incremental Pass
//!
//! ```text
//! Updated
//! Pages
//!     001 intro.md → out/intro.html
//! Skipped
//!     chapters/one.md: failed to read page chapters/one.md: No such file
//! Generated 1 page, 0 assets, 1 skipped
//! ```
//!
//! An incremental pass with nothing to report prints nothing.
//!
//! # Architecture
//!
//! `format_*` functions return `Vec<String>` and do no I/O; `print_*`
//! wrappers write them to stdout.

use crate::generate::{PassKind, PassReport};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Path relative to `root` with `/` separators, or as is when outside it.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Format a pass summary. Paths are shown relative to `root`.
pub fn format_pass_report(report: &PassReport, root: &Path) -> Vec<String> {
    if report.kind == PassKind::Incremental && report.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    lines.push(match report.kind {
        PassKind::Full(reason) => format!("Full rebuild ({reason})"),
        PassKind::Incremental => "Updated".to_string(),
    });

    if !report.assets.is_empty() {
        lines.push("Assets".to_string());
        for asset in &report.assets {
            lines.push(format!(
                "    {} \u{2192} {}",
                asset.source,
                display_path(&asset.output, root)
            ));
        }
    }

    if !report.pages.is_empty() {
        lines.push("Pages".to_string());
        for (i, page) in report.pages.iter().enumerate() {
            lines.push(format!(
                "    {} {} \u{2192} {}",
                format_index(i + 1),
                page.source,
                display_path(&page.output, root)
            ));
        }
    }

    if let Some(index) = &report.index {
        lines.push(format!("Index \u{2192} {}", display_path(index, root)));
    }

    if !report.skipped.is_empty() {
        lines.push("Skipped".to_string());
        for skipped in &report.skipped {
            lines.push(format!("    {}: {}", skipped.source, skipped.reason));
        }
    }

    let mut summary = format!(
        "Generated {}, {}",
        plural(report.pages.len(), "page"),
        plural(report.assets.len(), "asset")
    );
    if !report.skipped.is_empty() {
        summary.push_str(&format!(", {} skipped", report.skipped.len()));
    }
    lines.push(summary);
    lines
}

/// Print a pass summary to stdout.
pub fn print_pass_report(report: &PassReport, root: &Path) {
    for line in format_pass_report(report, root) {
        println!("{}", line);
    }
}

/// Format the line announcing the dev server.
pub fn format_serving(address: &str, output: &Path) -> String {
    format!("Serving {} at http://{}/", output.display(), address)
}

// ============================================================================
// Tests
// ============================================================================
