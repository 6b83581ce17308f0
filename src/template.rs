//! Layout templates and the context they are expanded with.
//!
//! Layouts are handlebars templates rendered with HTML escaping turned off:
//! the page body is already HTML. The common Go `text/template` actions are
//! rewritten before registration:
//!
//! | Go action | handlebars |
//! |-----------|------------|
//! | `{{.Page}}` | `{{Page}}` |
//! | `{{.}}` | `{{this}}` |
//! | `{{$.Title}}` | `{{@root.Title}}` |
//! | `{{range .Chapters}}` … `{{end}}` | `{{#each Chapters}}` … `{{/each}}` |
//! | `{{if .X}}` / `{{with .X}}` … `{{end}}` | `{{#if X}}` / `{{#with X}}` … |
//! | `{{else}}` | `{{else}}` |
//! | `{{/* note */}}` | `{{!-- note --}}` |
//!
//! Anything else, including native handlebars syntax, passes through as is.
//!
//! Go layouts that stick to these actions render the same content, with two
//! differences:
//!
//! - Handlebars drops the line break after a block tag that stands alone on
//!   its line (`{{range .X}}⏎`); Go keeps it. Output whitespace can differ.
//! - Variables (`{{$x := .A}}`, `{{range $i, $e := .X}}`) and else-chains
//!   (`{{else if .B}}`) have no translation and are rejected as syntax
//!   errors. Pipelines and Go functions such as `printf` are left as they
//!   are and fail when the layout is expanded.
//!
//! ## Context
//!
//! [`GenerationContext`] is built fresh for every render. Page layouts get
//! the rendered page under `Page`; both layouts get every configured index
//! under its name with the first letter capitalized (`chapters` →
//! `Chapters`), entries exposing `File` and `Title`.

use crate::config::{BookConfig, IndexEntry};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

const LAYOUT_NAME: &str = "layout";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template syntax error: {0}")]
    Syntax(String),
    #[error("template parse error: {0}")]
    Parse(#[from] handlebars::TemplateError),
    #[error("template render error: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// A parsed layout, ready to expand.
pub struct LayoutTemplate {
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for LayoutTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutTemplate").finish_non_exhaustive()
    }
}

impl LayoutTemplate {
    /// Parse a layout written in Go-style or handlebars syntax.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let translated = translate_go_actions(source)?;
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_template_string(LAYOUT_NAME, translated)?;
        Ok(Self { registry })
    }

    /// Expand the layout with `context`.
    pub fn expand(&self, context: &GenerationContext) -> Result<String, TemplateError> {
        Ok(self.registry.render(LAYOUT_NAME, context)?)
    }
}

/// The variables a layout is expanded with.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GenerationContext(Map<String, Value>);

impl GenerationContext {
    /// Key holding the rendered page HTML.
    pub const PAGE_KEY: &'static str = "Page";
    /// Key holding the table of contents in the index page context.
    pub const PAGES_KEY: &'static str = "Pages";

    /// Context for a page layout: the page HTML plus every index.
    pub fn for_page(page_html: &str, config: &BookConfig) -> Self {
        let mut context = Map::new();
        context.insert(Self::PAGE_KEY.to_string(), Value::String(page_html.to_string()));
        let mut context = Self(context);
        context.insert_indexes(config);
        context
    }

    /// Context for the index layout: every index plus the table of contents
    /// as `{File, Href}` entries.
    pub fn for_index(config: &BookConfig) -> Self {
        let pages: Vec<Value> = config
            .table_of_contents
            .iter()
            .map(|page| {
                let href = crate::render::output_path(&page.file);
                json!({
                    "File": page.file,
                    "Href": href.to_string_lossy().replace('\\', "/"),
                })
            })
            .collect();
        let mut context = Map::new();
        context.insert(Self::PAGES_KEY.to_string(), Value::Array(pages));
        let mut context = Self(context);
        context.insert_indexes(config);
        context
    }

    fn insert_indexes(&mut self, config: &BookConfig) {
        for (name, entries) in &config.indexes {
            let key = capitalize(name);
            if key.is_empty() {
                continue;
            }
            if key == Self::PAGE_KEY || key == Self::PAGES_KEY {
                log::warn!("index {name:?} shadows the built-in {key} variable, skipping it");
                continue;
            }
            let entries = entries.iter().map(entry_value).collect();
            if self.0.insert(key.clone(), Value::Array(entries)).is_some() {
                log::warn!("index {name:?} replaces another index also named {key}");
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Variable names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

fn entry_value(entry: &IndexEntry) -> Value {
    json!({ "File": entry.file, "Title": entry.title })
}

/// Upper-case the first character: `chapters` → `Chapters`.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Block kinds opened by Go-style actions, closed by `{{end}}`.
#[derive(Debug, Clone, Copy)]
enum Block {
    Each,
    If,
    With,
}

impl Block {
    fn name(self) -> &'static str {
        match self {
            Block::Each => "each",
            Block::If => "if",
            Block::With => "with",
        }
    }
}

/// Rewrite Go `text/template` actions into handlebars syntax.
pub fn translate_go_actions(source: &str) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(source.len());
    let mut blocks: Vec<Block> = Vec::new();
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let action = &rest[start..];

        // Triple-stash and raw blocks are handlebars-only; copy them through.
        let close = if action.starts_with("{{{") { "}}}" } else { "}}" };
        let Some(end) = action.find(close) else {
            return Err(TemplateError::Syntax(format!(
                "unclosed action starting at {:?}",
                action.chars().take(20).collect::<String>()
            )));
        };
        let whole = &action[..end + close.len()];
        rest = &action[end + close.len()..];

        if close == "}}}" {
            out.push_str(whole);
            continue;
        }

        let mut inner = &whole[2..whole.len() - 2];
        let trim_left = inner.starts_with("- ");
        if trim_left {
            inner = &inner[2..];
        }
        let trim_right = inner.ends_with(" -");
        if trim_right {
            inner = &inner[..inner.len() - 2];
        }

        match translate_action(inner.trim(), &mut blocks)? {
            Some(translated) => {
                out.push_str(if trim_left { "{{~" } else { "{{" });
                out.push_str(&translated);
                out.push_str(if trim_right { "~}}" } else { "}}" });
            }
            None => out.push_str(whole),
        }
    }
    out.push_str(rest);

    if let Some(open) = blocks.last() {
        return Err(TemplateError::Syntax(format!(
            "{} block is never closed with {{{{end}}}}",
            open.name()
        )));
    }
    Ok(out)
}

/// Translate one action body. `None` means "leave the action untouched".
fn translate_action(
    action: &str,
    blocks: &mut Vec<Block>,
) -> Result<Option<String>, TemplateError> {
    if action == "end" {
        let block = blocks
            .pop()
            .ok_or_else(|| TemplateError::Syntax("{{end}} without an open block".into()))?;
        return Ok(Some(format!("/{}", block.name())));
    }
    if action == "else" {
        return Ok(Some("else".into()));
    }
    if let Some(comment) = action
        .strip_prefix("/*")
        .and_then(|c| c.strip_suffix("*/"))
    {
        return Ok(Some(format!("!--{comment}--")));
    }
    if action
        .strip_prefix("else")
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
    {
        return Err(TemplateError::Syntax(format!(
            "{{{{{action}}}}} is not supported, nest the block inside {{{{else}}}} instead"
        )));
    }
    if action.contains(":=") {
        return Err(TemplateError::Syntax(format!(
            "template variables are not supported: {{{{{action}}}}}"
        )));
    }

    for (keyword, block) in [("range", Block::Each), ("if", Block::If), ("with", Block::With)] {
        if let Some(arg) = action.strip_prefix(keyword)
            && arg.starts_with(char::is_whitespace)
        {
            blocks.push(block);
            return Ok(Some(format!("#{} {}", block.name(), translate_path(arg.trim()))));
        }
    }

    if action.starts_with('.') || action.starts_with('$') {
        return Ok(Some(translate_path(action)));
    }
    Ok(None)
}

/// `.` → `this`, `.A.B` → `A.B`, `$` → `@root`, `$.A` → `@root.A`.
fn translate_path(path: &str) -> String {
    if path == "." {
        "this".into()
    } else if path == "$" {
        "@root".into()
    } else if let Some(rest) = path.strip_prefix("$.") {
        format!("@root.{rest}")
    } else if let Some(rest) = path.strip_prefix('.') {
        rest.to_string()
    } else {
        path.to_string()
    }
}
