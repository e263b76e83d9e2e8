//! Markdown → Pango markup for the inline subset the drafting screen shows.
//!
//! Emphasis markers stay visible in the output, wrapped in the tags they
//! introduce, so `**bold**` renders as `**bold**` in bold. Paragraphs that
//! are block constructs (comment headers and the like) are shown literally.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

/// The cursor glyph appended to the tail paragraph's markup.
pub const CURSOR: &str = r#"<span alpha="50%">_</span>"#;

/// Escapes text for inclusion in Pango markup.
pub fn escape_for_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Converts one paragraph of Markdown into Pango markup.
pub fn make_markup(markdown: &str) -> String {
    let mut events = Parser::new(markdown).into_offset_iter().peekable();
    // anything that is not a plain paragraph (comment headers, lists, …)
    // renders literally
    match events.peek() {
        Some((Event::Start(Tag::Paragraph), _)) => {}
        _ => return escape_for_markup(markdown),
    }

    let mut out = String::with_capacity(markdown.len());
    for (event, range) in events {
        match event {
            Event::Start(Tag::Paragraph) | Event::End(TagEnd::Paragraph) => {}
            Event::Start(Tag::Emphasis) => {
                out.push_str(&escape_for_markup(&markdown[range.start..range.start + 1]));
                out.push_str("<i>");
            }
            Event::End(TagEnd::Emphasis) => {
                out.push_str("</i>");
                out.push_str(&escape_for_markup(&markdown[range.end - 1..range.end]));
            }
            Event::Start(Tag::Strong) => {
                out.push_str(&escape_for_markup(&markdown[range.start..range.start + 2]));
                out.push_str("<b>");
            }
            Event::End(TagEnd::Strong) => {
                out.push_str("</b>");
                out.push_str(&escape_for_markup(&markdown[range.end - 2..range.end]));
            }
            Event::Code(code) => {
                out.push_str("<tt>");
                out.push_str(&escape_for_markup(&code));
                out.push_str("</tt>");
            }
            Event::Text(text) => out.push_str(&escape_for_markup(&text)),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            // the inline subset ends here; show anything else as it was typed
            _ => out.push_str(&escape_for_markup(&markdown[range])),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_escaped() {
        assert_eq!(make_markup("a < b & c"), "a &lt; b &amp; c");
    }

    #[test]
    fn emphasis_keeps_markers_visible() {
        assert_eq!(make_markup("an *italic* word"), "an *<i>italic</i>* word");
        assert_eq!(make_markup("a **bold** word"), "a **<b>bold</b>** word");
    }

    #[test]
    fn nested_emphasis() {
        assert_eq!(
            make_markup("***both***"),
            "*<i>**<b>both</b>**</i>*"
        );
    }

    #[test]
    fn comment_headers_render_literally() {
        assert_eq!(
            make_markup("# Started 15m sprint at 10:30."),
            "# Started 15m sprint at 10:30."
        );
    }

    #[test]
    fn underscore_markers_survive() {
        assert_eq!(make_markup("an _italic_ word"), "an _<i>italic</i>_ word");
    }
}
