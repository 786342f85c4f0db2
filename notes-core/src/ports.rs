//! Storage and search port traits.
//! Implemented by the memory adapters and, behind the `postgres` feature, by
//! `PgContentStore`; the services depend only on these traits.

use async_trait::async_trait;

use crate::error::NoteError;
use crate::types::*;

pub type Result<T> = std::result::Result<T, NoteError>;

/// Durable key-value storage for the three note records, keyed by note id.
///
/// Writes are atomic per record only. Nothing here spans records except
/// [`ContentStore::put_publish_bundle`], whose default is three ordinary writes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    // ── Notes ──────────────────────────────────────────────────

    async fn get_note(&self, id: &NoteId) -> Result<Option<Note>>;

    /// Insert a new note. `Conflict` if the id is taken.
    async fn insert_note(&self, note: &Note) -> Result<()>;

    async fn put_note(&self, note: &Note) -> Result<()>;

    /// Returns whether a record was removed.
    async fn delete_note(&self, id: &NoteId) -> Result<bool>;

    async fn find_note_by_url_fragment(&self, url_fragment: &str) -> Result<Option<Note>>;

    async fn find_notes_by_title(&self, title: &str) -> Result<Vec<Note>>;

    async fn list_notes_by_author(&self, author_id: &str) -> Result<Vec<Note>>;

    // ── Summaries ──────────────────────────────────────────────

    async fn get_summary(&self, id: &NoteId) -> Result<Option<NoteSummary>>;

    /// Positional: `result[i]` is the summary for `ids[i]`, if any.
    async fn get_summaries(&self, ids: &[NoteId]) -> Result<Vec<Option<NoteSummary>>>;

    async fn put_summary(&self, summary: &NoteSummary) -> Result<()>;

    async fn delete_summary(&self, id: &NoteId) -> Result<bool>;

    async fn find_summaries_by_title(&self, title: &str) -> Result<Vec<NoteSummary>>;

    /// Summaries with a publish timestamp, newest first, optionally for one
    /// author only.
    async fn list_published_summaries(
        &self,
        author_id: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<NoteSummary>>;

    // ── Rights ─────────────────────────────────────────────────

    async fn get_rights(&self, id: &NoteId) -> Result<Option<NoteRights>>;

    /// Insert a new rights record. `Conflict` if the id is taken.
    async fn insert_rights(&self, rights: &NoteRights) -> Result<()>;

    async fn put_rights(&self, rights: &NoteRights) -> Result<()>;

    async fn delete_rights(&self, id: &NoteId) -> Result<bool>;

    /// Rights records listing `user_id` as an editor, optionally filtered by
    /// publish flag.
    async fn list_rights_by_editor(
        &self,
        user_id: &str,
        is_published: Option<bool>,
    ) -> Result<Vec<NoteRights>>;

    async fn count_rights(&self, is_published: bool) -> Result<usize>;

    // ── Publish bundle ─────────────────────────────────────────

    /// Write rights, then summary, then note.
    ///
    /// A failure part-way leaves the earlier records written; rights stay the
    /// authoritative publish flag. Backends with multi-record transactions may
    /// override this to make the three writes atomic.
    async fn put_publish_bundle(
        &self,
        rights: &NoteRights,
        summary: &NoteSummary,
        note: &Note,
    ) -> Result<()> {
        self.put_rights(rights).await?;
        self.put_summary(summary).await?;
        self.put_note(note).await
    }
}

/// Black-box keyword index over published notes.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or replace documents.
    async fn index_documents(&self, docs: &[SearchDocument]) -> Result<()>;

    /// Remove a document. Removing an absent id is not an error.
    async fn delete_document(&self, id: &NoteId) -> Result<()>;

    /// Up to `size` matching ids starting at `offset`, plus the offset of the
    /// next page (`None` when exhausted).
    async fn search(&self, query: &str, size: usize, offset: Option<usize>) -> Result<SearchPage>;
}
