//! # Gutenberg
//!
//! A static book generator. A JSON config names the chapters (markdown
//! files), the layouts that wrap them, navigation indexes and static
//! assets; the generator writes one HTML file per chapter. In watch mode it
//! polls the inputs and regenerates only what changed.
//!
//! # Architecture: Full Rebuild vs Incremental Pass
//!
//! Every watch tick classifies the change before touching the output:
//!
//! ```text
//! config.json / page layout / index layout changed?
//!     yes → full rebuild      (every asset, every page, index page)
//!     no  → incremental pass  (only pages and assets with a new mtime)
//! ```
//!
//! The structural inputs feed every page, so a change to one of them makes
//! the whole output stale. A chapter edit only makes its own HTML stale.
//! Change detection compares modification times for equality against the
//! last time recorded in [`tracker::WatchState`]; content is never hashed.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `config.json` loading, validation, and path resolution |
//! | [`tracker`] | Last-seen modification time per input |
//! | [`markdown`] | Markdown → HTML with highlighted code blocks |
//! | [`highlight`] | `source-highlight` subprocess wrapper |
//! | [`template`] | Layouts (Go-style or handlebars) and their context |
//! | [`render`] | One page (or the index page) from source to output file |
//! | [`assets`] | Copying assets by base name |
//! | [`generate`] | Full and incremental generation passes |
//! | [`watch`] | The polling regeneration loop and its stop signal |
//! | [`serve`] | Development HTTP server over the output directory |
//! | [`output`] | CLI output formatting of pass summaries |
//!
//! # Design Decisions
//!
//! ## Polling Over File System Events
//!
//! Watch mode stats a known, small set of files once per interval instead
//! of subscribing to OS notifications. The config already lists every input,
//! so there is nothing to discover, and polling behaves the same on every
//! platform and network filesystem.
//!
//! ## Tolerant Watch, Strict First Build
//!
//! The first build fails loudly: a broken config or missing chapter is an
//! error the user must fix. Once output exists, a half-saved file in an
//! editor must not kill the watcher, so most errors are logged and the
//! next tick tries again. Missing assets and layouts that fail to expand
//! stay fatal (see [`generate::GenerateError::is_fatal`]).
//!
//! ## Go-Style Layout Actions
//!
//! Layouts are rendered with handlebars, but the common Go `text/template`
//! actions such as `{{.Page}}` and `{{range .Chapters}}…{{end}}` are
//! rewritten first. Go variables and `{{else if}}` chains are rejected, and
//! whitespace around standalone block lines follows handlebars rules (see
//! [`template`]).

pub mod assets;
pub mod config;
pub mod generate;
pub mod highlight;
pub mod markdown;
pub mod output;
pub mod render;
pub mod serve;
pub mod template;
pub mod tracker;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
