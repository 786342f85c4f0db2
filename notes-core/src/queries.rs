//! Read side: lookups, listings, existence checks and search.
//!
//! Reads go straight to the stores and never repair anything; anomalies seen
//! on read (stale search hits) are logged.

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::NotesConfig;
use crate::error::NoteError;
use crate::ports::{ContentStore, Result, SearchIndex};
use crate::types::*;

pub struct NoteQueries {
    store: Arc<dyn ContentStore>,
    index: Arc<dyn SearchIndex>,
    config: NotesConfig,
}

impl NoteQueries {
    pub fn new(
        store: Arc<dyn ContentStore>,
        index: Arc<dyn SearchIndex>,
        config: NotesConfig,
    ) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    // ── Lookups ───────────────────────────────────────────────

    pub async fn get_note(&self, note_id: &NoteId) -> Result<Option<Note>> {
        self.store.get_note(note_id).await
    }

    pub async fn get_note_strict(&self, note_id: &NoteId) -> Result<Note> {
        self.get_note(note_id)
            .await?
            .ok_or_else(|| {
                NoteError::NotFound(format!("The note with id {note_id} does not exist"))
            })
    }

    pub async fn get_note_by_url_fragment(&self, url_fragment: &str) -> Result<Option<Note>> {
        self.store.find_note_by_url_fragment(url_fragment).await
    }

    pub async fn get_summary(&self, note_id: &NoteId) -> Result<Option<NoteSummary>> {
        self.store.get_summary(note_id).await
    }

    pub async fn get_summary_strict(&self, note_id: &NoteId) -> Result<NoteSummary> {
        self.get_summary(note_id).await?.ok_or_else(|| {
            NoteError::NotFound(format!("The note summary with id {note_id} does not exist"))
        })
    }

    /// Summaries for `ids` in request order, skipping missing ones.
    pub async fn get_summaries_by_ids(&self, ids: &[NoteId]) -> Result<Vec<NoteSummary>> {
        Ok(self
            .store
            .get_summaries(ids)
            .await?
            .into_iter()
            .flatten()
            .collect())
    }

    pub async fn get_rights(&self, note_id: &NoteId) -> Result<Option<NoteRights>> {
        self.store.get_rights(note_id).await
    }

    pub async fn get_rights_strict(&self, note_id: &NoteId) -> Result<NoteRights> {
        self.get_rights(note_id).await?.ok_or_else(|| {
            NoteError::NotFound(format!("The note rights with id {note_id} do not exist"))
        })
    }

    pub async fn get_summary_by_title(&self, title: &str) -> Result<Option<NoteSummary>> {
        Ok(self
            .store
            .find_summaries_by_title(title)
            .await?
            .into_iter()
            .next())
    }

    // ── Listings ──────────────────────────────────────────────

    /// Summaries of notes `user_id` can edit with the given status, most
    /// recently updated first. Missing timestamps sort last.
    pub async fn get_by_author_and_status(
        &self,
        user_id: &str,
        is_published: bool,
    ) -> Result<Vec<NoteSummary>> {
        let ids: Vec<NoteId> = self
            .store
            .list_rights_by_editor(user_id, Some(is_published))
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let mut summaries = self.get_summaries_by_ids(&ids).await?;
        summaries.sort_by_key(|s| {
            Reverse(s.last_updated.map(|t| t.timestamp_micros()).unwrap_or(0))
        });
        Ok(summaries)
    }

    /// Published summaries, newest first. A missing or zero `limit` means the
    /// homepage page size.
    pub async fn get_published(
        &self,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<NoteSummary>> {
        let limit = limit
            .filter(|&n| n > 0)
            .unwrap_or(self.config.homepage_page_size);
        self.store.list_published_summaries(None, offset, limit).await
    }

    /// Published summaries by one author, newest first. `limit` defaults to
    /// the author page size; an explicit zero returns nothing.
    pub async fn get_published_by_author(
        &self,
        author_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<NoteSummary>> {
        let limit = limit.unwrap_or(self.config.author_page_size);
        self.store
            .list_published_summaries(Some(author_id), offset, limit)
            .await
    }

    // ── Existence checks ──────────────────────────────────────

    pub async fn exists_by_url_fragment(&self, url_fragment: &str) -> Result<bool> {
        Ok(self
            .store
            .find_note_by_url_fragment(url_fragment)
            .await?
            .is_some())
    }

    /// Whether a note other than `excluding_id` already uses `title`.
    pub async fn exists_by_title(&self, title: &str, excluding_id: &NoteId) -> Result<bool> {
        let matches = self.store.find_notes_by_title(title).await?;
        Ok(match matches.as_slice() {
            [] => false,
            [only] => &only.id != excluding_id,
            _ => true,
        })
    }

    // ── Counts ────────────────────────────────────────────────

    pub async fn counts(&self) -> Result<NoteCounts> {
        Ok(NoteCounts {
            published: self.store.count_rights(true).await?,
            drafts: self.store.count_rights(false).await?,
        })
    }

    pub async fn counts_for_editor(&self, user_id: &str) -> Result<NoteCounts> {
        Ok(NoteCounts {
            published: self
                .store
                .list_rights_by_editor(user_id, Some(true))
                .await?
                .len(),
            drafts: self
                .store
                .list_rights_by_editor(user_id, Some(false))
                .await?
                .len(),
        })
    }

    // ── Search ────────────────────────────────────────────────

    /// Up to `size` ids matching `query` whose summaries still exist.
    ///
    /// Index hits without a stored summary are stale: they are logged and
    /// skipped, and the index is re-queried from its next offset to backfill.
    /// At most `search_max_iterations` queries are made; a short result is
    /// returned as-is.
    pub async fn search_matching_ids(
        &self,
        query: &str,
        size: usize,
        offset: Option<usize>,
    ) -> Result<SearchPage> {
        if size == 0 {
            return Ok(SearchPage {
                ids: Vec::new(),
                next_offset: offset,
            });
        }

        let mut valid: Vec<NoteId> = Vec::with_capacity(size);
        let mut cursor = offset;

        for _ in 0..self.config.search_max_iterations {
            let remaining = size - valid.len();
            let page = self.index.search(query, remaining, cursor).await?;
            let summaries = self.store.get_summaries(&page.ids).await?;

            let mut stale = Vec::new();
            for (id, summary) in page.ids.into_iter().zip(summaries) {
                if summary.is_some() {
                    valid.push(id);
                } else {
                    stale.push(id);
                }
            }
            if !stale.is_empty() {
                error!(query, stale_ids = ?stale, "Search index returned stale note ids");
            }

            cursor = page.next_offset;
            if valid.len() >= size || cursor.is_none() {
                break;
            }
        }

        if valid.len() < size && cursor.is_some() {
            error!(
                query,
                found = valid.len(),
                wanted = size,
                "Search backfill budget exhausted before filling the page"
            );
        }
        valid.truncate(size);

        Ok(SearchPage {
            ids: valid,
            next_offset: cursor,
        })
    }

    /// Matching summaries plus the offset of the next page.
    pub async fn search_summaries(
        &self,
        query: &str,
        size: usize,
        offset: Option<usize>,
    ) -> Result<(Vec<NoteSummary>, Option<usize>)> {
        let page = self.search_matching_ids(query, size, offset).await?;
        let summaries = self.get_summaries_by_ids(&page.ids).await?;
        if summaries.len() >= self.config.default_query_limit {
            warn!(
                query,
                count = summaries.len(),
                "Search results reached the default query limit"
            );
        }
        debug!(query, count = summaries.len(), "Search complete");
        Ok((summaries, page.next_offset))
    }

    // ── Export ────────────────────────────────────────────────

    /// Everything the note records hold about `user_id`.
    pub async fn export_user_data(&self, user_id: &str) -> Result<UserNotesExport> {
        let notes = self
            .store
            .list_notes_by_author(user_id)
            .await?
            .into_iter()
            .map(|note| {
                (
                    note.id.to_string(),
                    NoteExport {
                        title: note.title,
                        subtitle: note.subtitle,
                        content: note.content,
                        url_fragment: note.url_fragment,
                        published_on_ms: note.published_on.map(|t| t.timestamp_millis()),
                    },
                )
            })
            .collect();

        let editable_note_ids = self
            .store
            .list_rights_by_editor(user_id, None)
            .await?
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();

        Ok(UserNotesExport {
            notes,
            editable_note_ids,
        })
    }
}
