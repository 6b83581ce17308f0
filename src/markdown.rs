//! Markdown to HTML conversion.
//!
//! [`BookMarkdown`] runs pulldown-cmark's stock HTML writer and overrides one
//! thing only: code blocks. Every other element goes through the default
//! renderer untouched.
//!
//! ## Code Blocks
//!
//! ```text
//! ```rust .numbered        →  <pre><code class="rust numbered">…</code></pre>
//! ```console               →  body escaped verbatim, never highlighted
//! ```  (no language)       →  body escaped verbatim
//! ```
//!
//! Words of the info string become the `class` attribute (a leading `.` is
//! dropped). For any other language the body is whatever the
//! [`Highlighter`] returns for the full info string; when highlighting fails
//! the body is left empty and a warning is logged.

use crate::highlight::{Highlighter, SourceHighlight};
use maud::html;
use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html as md_html};

/// Converts a markdown document to an HTML fragment.
pub trait MarkdownTransformer {
    fn transform(&self, markdown: &str) -> String;
}

/// The book's markdown dialect: tables, strikethrough, footnotes, smart
/// punctuation, and highlighted code blocks.
#[derive(Debug, Clone)]
pub struct BookMarkdown<H = SourceHighlight> {
    highlighter: H,
    options: Options,
}

impl<H: Highlighter> BookMarkdown<H> {
    pub fn new(highlighter: H) -> Self {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_SMART_PUNCTUATION;
        Self {
            highlighter,
            options,
        }
    }

    fn code_block(&self, info: &str, code: &str) -> String {
        let classes: Vec<&str> = info
            .split_whitespace()
            .map(|word| word.strip_prefix('.').unwrap_or(word))
            .filter(|word| !word.is_empty())
            .collect();

        let mut out = if classes.is_empty() {
            String::from("<pre><code>")
        } else {
            format!("<pre><code class=\"{}\">", escape(&classes.join(" ")))
        };

        let language = info.trim();
        if language.is_empty() || language == "console" {
            out.push_str(&escape(code));
        } else {
            match self.highlighter.highlight(language, code) {
                Ok(highlighted) => out.push_str(&highlighted),
                Err(e) => log::warn!("code block ({language}) left empty: {e}"),
            }
        }

        out.push_str("</code></pre>\n");
        out
    }
}

impl<H: Highlighter> MarkdownTransformer for BookMarkdown<H> {
    fn transform(&self, markdown: &str) -> String {
        let mut events = Vec::new();
        let mut code: Option<(String, String)> = None;

        for event in Parser::new_ext(markdown, self.options) {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let info = match kind {
                        CodeBlockKind::Fenced(info) => info.to_string(),
                        CodeBlockKind::Indented => String::new(),
                    };
                    code = Some((info, String::new()));
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, body)) = code.as_mut() {
                        body.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((info, body)) = code.take() {
                        events.push(Event::Html(CowStr::from(self.code_block(&info, &body))));
                    }
                }
                other => events.push(other),
            }
        }

        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        md_html::push_html(&mut out, events.into_iter());
        out
    }
}

fn escape(text: &str) -> String {
    html! { (text) }.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::{HighlightError, NoHighlight};

    /// Wraps the source in a marker so tests can see the highlighter ran.
    struct Bracket;

    impl Highlighter for Bracket {
        fn highlight(&self, language: &str, source: &str) -> Result<String, HighlightError> {
            Ok(format!("[{language}:{source}]"))
        }
    }

    #[test]
    fn renders_plain_markdown() {
        let md = BookMarkdown::new(NoHighlight);
        assert_eq!(
            md.transform("# Title\n\nHello *world*\n"),
            "<h1>Title</h1>\n<p>Hello <em>world</em></p>\n"
        );
    }

    #[test]
    fn renders_tables_and_strikethrough() {
        let md = BookMarkdown::new(NoHighlight);
        let html = md.transform("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn smart_punctuation_enabled() {
        let md = BookMarkdown::new(NoHighlight);
        let html = md.transform("\"quoted\" -- dash\n");
        assert!(html.contains('\u{201c}'), "{html}");
        assert!(html.contains('\u{2013}'), "{html}");
    }

    #[test]
    fn fenced_code_goes_through_highlighter() {
        let md = BookMarkdown::new(Bracket);
        let html = md.transform("```rust\nfn main() {}\n```\n");
        assert_eq!(
            html,
            "<pre><code class=\"rust\">[rust:fn main() {}\n]</code></pre>\n"
        );
    }

    #[test]
    fn info_words_become_classes_without_dots() {
        let md = BookMarkdown::new(Bracket);
        let html = md.transform("```.js .numbered\nx\n```\n");
        assert!(html.starts_with("<pre><code class=\"js numbered\">"), "{html}");
    }

    #[test]
    fn console_blocks_are_escaped_not_highlighted() {
        let md = BookMarkdown::new(Bracket);
        let html = md.transform("```console\n$ echo \"<hi>\" && exit\n```\n");
        assert_eq!(
            html,
            "<pre><code class=\"console\">$ echo &quot;&lt;hi&gt;&quot; &amp;&amp; exit\n</code></pre>\n"
        );
    }

    #[test]
    fn indented_code_is_escaped() {
        let md = BookMarkdown::new(Bracket);
        let html = md.transform("para\n\n    a < b\n");
        assert!(html.contains("<pre><code>a &lt; b\n</code></pre>"), "{html}");
    }

    #[test]
    fn failed_highlight_leaves_block_empty() {
        let md = BookMarkdown::new(NoHighlight);
        let html = md.transform("before\n\n```go\npackage main\n```\n\nafter\n");
        assert!(html.contains("<pre><code class=\"go\"></code></pre>"), "{html}");
        assert!(html.contains("<p>before</p>"));
        assert!(html.contains("<p>after</p>"));
    }

    #[test]
    fn transform_is_deterministic() {
        let md = BookMarkdown::new(Bracket);
        let src = "# A\n\n```c\nint x;\n```\n\n| x |\n|---|\n| 1 |\n";
        assert_eq!(md.transform(src), md.transform(src));
    }
}
