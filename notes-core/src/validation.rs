//! Field validation for notes and summaries.
//!
//! Non-strict checks run on every save; strict checks run only when a note
//! is about to become publicly visible.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::NoteLimits;
use crate::error::NoteError;
use crate::types::{Note, NoteSummary};

type Result<T> = std::result::Result<T, NoteError>;

/// Words of `a-zA-Z0-9(&!,'":?.)-` separated by single spaces.
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[a-zA-Z0-9(&!,'":?.)\-]+( [a-zA-Z0-9(&!,'":?.)\-]+)*$"#).unwrap()
});

/// Lowercase alphanumeric words joined by single hyphens.
static URL_FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap());

pub fn require_valid_title(title: &str, strict: bool, limits: &NoteLimits) -> Result<()> {
    if title.chars().count() > limits.max_title_chars {
        return Err(NoteError::validation(format!(
            "Note title should at most have {} chars, received: {}",
            limits.max_title_chars, title
        )));
    }

    if strict {
        if title.is_empty() {
            return Err(NoteError::validation("Title should not be empty"));
        }
        if !TITLE_RE.is_match(title) {
            return Err(NoteError::validation(format!(
                "Title field contains invalid characters. Only words \
                 (a-zA-Z0-9('!)) separated by spaces, hyphens (-), comma (,), \
                 ampersand (&) and colon (:) are allowed. Received {title}"
            )));
        }
    }
    Ok(())
}

pub fn require_valid_url_fragment(url_fragment: &str, limits: &NoteLimits) -> Result<()> {
    if url_fragment.is_empty() {
        return Err(NoteError::validation(
            "Note URL Fragment field should not be empty.",
        ));
    }

    let max = limits.max_url_fragment_chars();
    if url_fragment.chars().count() > max {
        return Err(NoteError::validation(format!(
            "Note URL Fragment field should not exceed {max} characters."
        )));
    }

    if !URL_FRAGMENT_RE.is_match(url_fragment) {
        return Err(NoteError::validation(format!(
            "Note URL Fragment field contains invalid characters. Only lowercase \
             words, numbers separated by hyphens are allowed. Received {url_fragment}."
        )));
    }
    Ok(())
}

pub fn require_valid_note_id(note_id: &str, limits: &NoteLimits) -> Result<()> {
    if note_id.chars().count() != limits.id_length {
        return Err(NoteError::validation(format!(
            "Note ID {note_id} is invalid"
        )));
    }
    Ok(())
}

pub fn validate_note(note: &Note, strict: bool, limits: &NoteLimits) -> Result<()> {
    require_valid_title(&note.title, strict, limits)?;

    if strict {
        require_valid_url_fragment(&note.url_fragment, limits)?;
        if note.content.is_empty() {
            return Err(NoteError::validation("Content can not be empty"));
        }
    }
    Ok(())
}

pub fn validate_summary(summary: &NoteSummary, strict: bool, limits: &NoteLimits) -> Result<()> {
    require_valid_title(&summary.title, strict, limits)?;

    if strict {
        require_valid_url_fragment(&summary.url_fragment, limits)?;
        if summary.summary.is_empty() {
            return Err(NoteError::validation("Summary can not be empty"));
        }
    }
    Ok(())
}
