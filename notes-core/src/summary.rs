//! Derived fields: display summary and url fragment.
//!
//! Both functions are pure; identical input always yields identical output.

use regex::Regex;
use std::sync::LazyLock;

use crate::html;
use crate::types::{Note, NoteSummary};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<h1>?.*?</h1>").unwrap());

static STRONG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<strong>?.*?</strong>").unwrap());

static NON_SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9 ]").unwrap());

static SEPARATOR_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s-]+").unwrap());

const ELLIPSIS: &str = "...";

/// Plain-text excerpt of note content.
///
/// Headings and bold runs are dropped with their text, remaining tags are
/// stripped and entities decoded. Text longer than `max_summary_chars - 3`
/// characters is cut to that length and suffixed with `...`.
pub fn derive_summary(content: &str, max_summary_chars: usize) -> String {
    let without_headings = HEADING_RE.replace_all(content, "");
    let without_strong = STRONG_RE.replace_all(&without_headings, "");
    let text = html::unescape(&html::strip_tags(&without_strong));

    let budget = max_summary_chars.saturating_sub(ELLIPSIS.len());
    if text.chars().count() > budget {
        let mut truncated: String = text.chars().take(budget).collect();
        truncated.push_str(ELLIPSIS);
        return truncated.trim().to_string();
    }
    text
}

/// Fresh summary record for the current state of `note`.
pub fn compute_summary(note: &Note, max_summary_chars: usize) -> NoteSummary {
    NoteSummary {
        id: note.id.clone(),
        author_id: note.author_id.clone(),
        title: note.title.clone(),
        subtitle: note.subtitle.clone(),
        summary: derive_summary(&note.content, max_summary_chars),
        url_fragment: note.url_fragment.clone(),
        last_updated: note.last_updated,
        published_on: note.published_on,
    }
}

/// `slugify(title) + "-" + lowercase(note_id)`.
pub fn generate_url_fragment(title: &str, note_id: &str) -> String {
    let lower = title.to_lowercase();
    let simple = NON_SLUG_RE.replace_all(&lower, "");
    let hyphenated = SEPARATOR_RUN_RE.replace_all(&simple, "-");
    format!("{}-{}", hyphenated, note_id.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NoteId;
    use chrono::Utc;

    const MAX: usize = 300;

    #[test]
    fn headings_and_bold_are_dropped_with_their_text() {
        assert_eq!(
            derive_summary("<h1>t</h1><p>abc</p><strong>Q</strong>", MAX),
            "abc"
        );
    }

    #[test]
    fn blocks_spanning_lines_are_dropped() {
        let content = "<h1>multi\nline</h1><p>keep</p><strong>a\nb</strong><p> me</p>";
        assert_eq!(derive_summary(content, MAX), "keep me");
    }

    #[test]
    fn removal_is_non_greedy() {
        let content = "<strong>a</strong>middle<strong>b</strong>";
        assert_eq!(derive_summary(content, MAX), "middle");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(derive_summary("<p>Fish &amp; chips</p>", MAX), "Fish & chips");
    }

    #[test]
    fn accented_currency_and_bare_legacy_entities_are_decoded() {
        assert_eq!(
            derive_summary("<p>Caf&eacute; costs 5&euro; &amp co</p>", MAX),
            "Caf\u{e9} costs 5\u{20ac} & co"
        );
        assert_eq!(
            derive_summary("<p>&Uuml;ber &copy 2024 &mdash; &frac12;</p>", MAX),
            "\u{dc}ber \u{a9} 2024 \u{2014} \u{bd}"
        );
    }

    #[test]
    fn short_text_is_returned_unmodified() {
        let text = "x".repeat(297);
        assert_eq!(derive_summary(&text, MAX), text);
    }

    #[test]
    fn long_text_is_truncated_with_ellipsis() {
        let text = "y".repeat(400);
        let summary = derive_summary(&format!("<p>{text}</p>"), MAX);
        assert_eq!(summary.chars().count(), 300);
        assert!(summary.ends_with("..."));
        assert!(summary.starts_with(&"y".repeat(297)));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "é".repeat(298);
        let summary = derive_summary(&text, MAX);
        assert_eq!(summary.chars().count(), 300);
    }

    #[test]
    fn plain_text_is_a_fixed_point() {
        for input in ["abc", "<p>Hello <em>there</em></p>", "<h1>x</h1>tail & co"] {
            let once = derive_summary(input, MAX);
            assert_eq!(derive_summary(&once, MAX), once, "{input}");
        }
    }

    #[test]
    fn url_fragment_from_title_and_id() {
        assert_eq!(
            generate_url_fragment("Sample Title", "abc123efg"),
            "sample-title-abc123efg"
        );
    }

    #[test]
    fn url_fragment_strips_symbols_and_collapses_spaces() {
        assert_eq!(
            generate_url_fragment("Hello,   World! - Part 2", "ID42"),
            "hello-world-part-2-id42"
        );
    }

    #[test]
    fn summary_copies_note_fields() {
        let mut note = Note::new_draft(NoteId::new("n1"), "u1", Utc::now());
        note.title = "T".into();
        note.subtitle = "S".into();
        note.url_fragment = "t-n1".into();
        note.content = "<p>body</p>".into();
        note.published_on = Some(Utc::now());

        let summary = compute_summary(&note, MAX);
        assert_eq!(summary.id, note.id);
        assert_eq!(summary.summary, "body");
        assert_eq!(summary.published_on, note.published_on);
        assert_eq!(summary.last_updated, note.last_updated);
        assert_eq!(summary.url_fragment, "t-n1");
    }
}
