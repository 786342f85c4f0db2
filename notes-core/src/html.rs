//! HTML helpers: the content cleaner seam, tag stripping and entity decoding.

use regex::Regex;
use std::sync::LazyLock;

/// Sanitizes author-supplied HTML before it is stored.
pub trait HtmlCleaner: Send + Sync {
    fn clean(&self, html: &str) -> String;
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// Allow-list sanitizer built on `ammonia`. The input is parsed the way a
/// browser parses it, so `javascript:` URLs are dropped however they are
/// quoted or encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmmoniaCleaner;

impl HtmlCleaner for AmmoniaCleaner {
    fn clean(&self, html: &str) -> String {
        ammonia::clean(html)
    }
}

/// Removes every tag, keeping the text between them.
pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").into_owned()
}

/// Decodes character references using the full HTML5 entity table, including
/// the legacy names that may omit the trailing semicolon.
pub fn unescape(text: &str) -> String {
    htmlize::unescape(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaner_removes_scripts_and_handlers() {
        let dirty = concat!(
            r#"<p onclick="steal()">Hi</p><script>alert(1)</script>"#,
            r#"<a href="javascript:x()">l</a>"#,
        );
        let clean = AmmoniaCleaner.clean(dirty);
        assert!(clean.starts_with("<p>Hi</p>"), "{clean}");
        assert!(!clean.contains("onclick"), "{clean}");
        assert!(!clean.contains("script"), "{clean}");
        assert!(!clean.contains("javascript"), "{clean}");
        assert!(clean.contains(">l</a>"), "{clean}");
    }

    #[test]
    fn cleaner_drops_unquoted_and_entity_encoded_script_urls() {
        let dirty = concat!(
            "<a href=javascript:alert(1)>x</a>",
            r#"<a href="&#106;avascript:alert(1)">y</a>"#,
            r#"<img src="JaVaScRiPt:alert(1)">"#,
        );
        let clean = AmmoniaCleaner.clean(dirty);
        let lowered = clean.to_lowercase();
        assert!(!lowered.contains("javascript"), "{clean}");
        assert!(!lowered.contains("&#106;"), "{clean}");
        assert!(!lowered.contains("alert"), "{clean}");
        assert!(clean.contains(">x</a>") && clean.contains(">y</a>"), "{clean}");
    }

    #[test]
    fn cleaner_keeps_safe_markup_and_links() {
        let html = "<h1>Title</h1><p>Body <strong>bold</strong></p>";
        assert_eq!(AmmoniaCleaner.clean(html), html);

        let linked = AmmoniaCleaner.clean(r#"<a href="https://example.com/a">ok</a>"#);
        assert!(linked.contains(r#"href="https://example.com/a""#), "{linked}");
    }

    #[test]
    fn strip_tags_keeps_text() {
        assert_eq!(strip_tags("<p>a <em>b</em></p>\n<br/>c"), "a b\nc");
    }

    #[test]
    fn unescape_named_and_numeric() {
        assert_eq!(unescape("a &amp; b &lt;3 &#39;q&#x27;"), "a & b <3 'q'");
        assert_eq!(unescape("&hellip;&nbsp;"), "\u{2026}\u{a0}");
        assert_eq!(unescape("&eacute;t&eacute; &euro;5"), "\u{e9}t\u{e9} \u{20ac}5");
        assert_eq!(unescape("fish &amp chips"), "fish & chips");
        assert_eq!(unescape("&unknown; stays"), "&unknown; stays");
        assert_eq!(unescape("no entities"), "no entities");
    }
}
