//! Word counting over Markdown paragraphs.
//!
//! The Markdown is flattened to plain text first (heading contents are
//! dropped entirely, since `#` paragraphs are session commentary), then
//! scanned with a Unicode-aware word pattern.

use std::sync::LazyLock;

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;

static WORD_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+(?:['’\-]\w+)*").expect("word pattern compiles"));

/// Converts Markdown to plain text, stripping all inline markup and the
/// contents of headings.
pub fn make_plain_text(markdown: &str) -> String {
    let mut result = String::new();
    let mut in_heading = false;
    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { .. }) => in_heading = true,
            Event::End(TagEnd::Heading(_)) => in_heading = false,
            _ if in_heading => {}
            Event::Text(text) | Event::Code(text) => result.push_str(&text),
            Event::SoftBreak | Event::HardBreak => result.push('\n'),
            Event::End(TagEnd::Paragraph) => result.push_str("\n\n"),
            _ => {}
        }
    }
    result.trim_end_matches('\n').to_string()
}

/// Counts words in already-plain text.
pub fn count_plain_text(text: &str) -> usize {
    WORD_CHARS.find_iter(text).count()
}

/// Counts words in a sequence of Markdown paragraph bodies.
pub fn count_markdown<'a>(paragraphs: impl IntoIterator<Item = &'a str>) -> usize {
    let joined = paragraphs.into_iter().collect::<Vec<_>>().join("\n\n");
    count_plain_text(&make_plain_text(&joined))
}

/// `1 word`, `2 words`, …
pub fn format_wordcount(count: usize) -> String {
    if count == 1 {
        "1 word".to_string()
    } else {
        format!("{count} words")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_simple_text() {
        assert_eq!(count_plain_text("the quick brown fox"), 4);
        assert_eq!(count_plain_text(""), 0);
    }

    #[test]
    fn contractions_and_hyphens_are_one_word() {
        assert_eq!(count_plain_text("it's"), 1);
        assert_eq!(count_plain_text("merry-go-round"), 1);
        assert_eq!(count_plain_text("don’t stop"), 2);
    }

    #[test]
    fn inline_markup_is_stripped() {
        assert_eq!(make_plain_text("some *emphasized* and **bold** text"),
            "some emphasized and bold text");
        assert_eq!(count_markdown(["some *emphasized* and **bold** text"]), 5);
    }

    #[test]
    fn heading_paragraphs_do_not_count() {
        assert_eq!(count_markdown(["# Started 15m sprint at 10:30.", "actual words here"]), 3);
    }

    #[test]
    fn unicode_words_count() {
        assert_eq!(count_plain_text("целую руки"), 2);
        assert_eq!(count_plain_text("días soleados"), 2);
    }

    #[test]
    fn formats_wordcount() {
        assert_eq!(format_wordcount(0), "0 words");
        assert_eq!(format_wordcount(1), "1 word");
        assert_eq!(format_wordcount(250), "250 words");
    }
}
