use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Identifiers ──────────────────────────────────────────────

/// Opaque fixed-length note identifier, shared by all three records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NoteId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for NoteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ─── Records ──────────────────────────────────────────────────

/// Full content record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub author_id: String,
    pub title: String,
    pub subtitle: String,
    /// Sanitized HTML.
    pub content: String,
    pub url_fragment: String,
    pub last_updated: Option<DateTime<Utc>>,
    /// `None` means draft.
    pub published_on: Option<DateTime<Utc>>,
}

impl Note {
    /// Empty draft as inserted by `create`.
    pub fn new_draft(id: NoteId, author_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            author_id: author_id.into(),
            title: String::new(),
            subtitle: String::new(),
            content: String::new(),
            url_fragment: String::new(),
            last_updated: Some(now),
            published_on: None,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.published_on.is_none()
    }
}

/// Denormalized projection of a [`Note`], regenerated on every content change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSummary {
    pub id: NoteId,
    pub author_id: String,
    pub title: String,
    pub subtitle: String,
    /// Truncated plain-text excerpt of the content.
    pub summary: String,
    pub url_fragment: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub published_on: Option<DateTime<Utc>>,
}

/// Visibility and ownership record. Authoritative for the publish flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRights {
    pub id: NoteId,
    /// Insertion-ordered, duplicate-free. The author is always present.
    pub editor_ids: Vec<String>,
    pub is_published: bool,
}

impl NoteRights {
    pub fn new(id: NoteId, author_id: impl Into<String>) -> Self {
        Self {
            id,
            editor_ids: vec![author_id.into()],
            is_published: false,
        }
    }

    pub fn is_editor(&self, user_id: &str) -> bool {
        self.editor_ids.iter().any(|e| e == user_id)
    }

    /// Returns false when the user already was an editor.
    pub fn add_editor(&mut self, user_id: &str) -> bool {
        if self.is_editor(user_id) {
            return false;
        }
        self.editor_ids.push(user_id.to_string());
        true
    }

    /// Returns false when the user was not an editor.
    pub fn remove_editor(&mut self, user_id: &str) -> bool {
        let before = self.editor_ids.len();
        self.editor_ids.retain(|e| e != user_id);
        self.editor_ids.len() != before
    }
}

// ─── Mutations ────────────────────────────────────────────────

/// Partial edit applied by `apply_change` / `update`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl NoteChange {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.subtitle.is_none() && self.content.is_none()
    }
}

// ─── Search ───────────────────────────────────────────────────

/// Document pushed to the search index on publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: NoteId,
    pub title: String,
    /// Publish timestamp in whole milliseconds; higher ranks first.
    pub rank: i64,
}

impl SearchDocument {
    pub fn from_summary(summary: &NoteSummary) -> Self {
        Self {
            id: summary.id.clone(),
            title: summary.title.clone(),
            rank: summary
                .published_on
                .map(|t| t.timestamp_millis())
                .unwrap_or(0),
        }
    }
}

/// One page of search results plus the cursor for the next page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub ids: Vec<NoteId>,
    pub next_offset: Option<usize>,
}

// ─── Export ───────────────────────────────────────────────────

/// Exported view of an authored note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteExport {
    pub title: String,
    pub subtitle: String,
    pub content: String,
    pub url_fragment: String,
    pub published_on_ms: Option<i64>,
}

/// Everything stored about a single user across the note records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNotesExport {
    pub notes: std::collections::BTreeMap<String, NoteExport>,
    pub editable_note_ids: Vec<String>,
}

/// Publish/draft totals for dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteCounts {
    pub published: usize,
    pub drafts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rights_seed_author_as_sole_editor() {
        let rights = NoteRights::new(NoteId::new("abc"), "author");
        assert_eq!(rights.editor_ids, vec!["author"]);
        assert!(!rights.is_published);
        assert!(rights.is_editor("author"));
        assert!(!rights.is_editor("other"));
    }

    #[test]
    fn add_editor_keeps_insertion_order_without_duplicates() {
        let mut rights = NoteRights::new(NoteId::new("abc"), "a");
        assert!(rights.add_editor("b"));
        assert!(rights.add_editor("c"));
        assert!(!rights.add_editor("b"));
        assert_eq!(rights.editor_ids, vec!["a", "b", "c"]);
        assert!(rights.remove_editor("b"));
        assert!(!rights.remove_editor("b"));
        assert_eq!(rights.editor_ids, vec!["a", "c"]);
    }

    #[test]
    fn new_draft_is_empty() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let note = Note::new_draft(NoteId::new("n1"), "u1", now);
        assert!(note.is_draft());
        assert!(note.title.is_empty());
        assert!(note.url_fragment.is_empty());
        assert_eq!(note.last_updated, Some(now));
    }

    #[test]
    fn search_document_rank_is_publish_millis() {
        let published = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let summary = NoteSummary {
            id: NoteId::new("n1"),
            author_id: "u1".into(),
            title: "Title".into(),
            subtitle: String::new(),
            summary: "text".into(),
            url_fragment: "title-n1".into(),
            last_updated: None,
            published_on: Some(published),
        };
        let doc = SearchDocument::from_summary(&summary);
        assert_eq!(doc.rank, 1_700_000_000_123);
        assert_eq!(doc.title, "Title");
    }

    #[test]
    fn change_builder() {
        let change = NoteChange::default().title("T").content("<p>x</p>");
        assert_eq!(change.title.as_deref(), Some("T"));
        assert!(change.subtitle.is_none());
        assert!(!change.is_empty());
        assert!(NoteChange::default().is_empty());
    }
}
