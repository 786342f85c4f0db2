//! NoteService: the write side of the note lifecycle.
//!
//! Every operation spans up to three records (note, summary, rights) plus the
//! search index. Storage is atomic per record only, so each operation writes
//! in a fixed order and documents the state a crash part-way leaves behind.
//! Rights are the authoritative publish flag; note and summary timestamps are
//! eventually consistent with them.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, SubsecRound, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::access::{AccessControl, Principal};
use crate::config::NotesConfig;
use crate::error::NoteError;
use crate::html::{AmmoniaCleaner, HtmlCleaner};
use crate::ports::{ContentStore, Result, SearchIndex};
use crate::summary::{compute_summary, generate_url_fragment};
use crate::types::*;
use crate::validation::{require_valid_title, validate_note, validate_summary};

// ── Id generation ─────────────────────────────────────────────

/// Source of candidate note ids. Uniqueness is checked by the service.
pub trait NoteIdGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Random alphanumeric ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl NoteIdGenerator for RandomIdGenerator {
    fn generate(&self, length: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }
}

/// Current time at the microsecond precision Postgres `TIMESTAMPTZ` keeps,
/// so a stamped record reads back equal from every store.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// ── NoteService ───────────────────────────────────────────────

pub struct NoteService {
    store: Arc<dyn ContentStore>,
    index: Arc<dyn SearchIndex>,
    cleaner: Arc<dyn HtmlCleaner>,
    access: Arc<dyn AccessControl>,
    ids: Arc<dyn NoteIdGenerator>,
    config: NotesConfig,
}

impl NoteService {
    /// Service with the ammonia HTML cleaner, random ids and the role table
    /// from `config` as access control.
    pub fn new(
        store: Arc<dyn ContentStore>,
        index: Arc<dyn SearchIndex>,
        config: NotesConfig,
    ) -> Self {
        Self {
            store,
            index,
            cleaner: Arc::new(AmmoniaCleaner),
            access: Arc::new(config.roles.clone()),
            ids: Arc::new(RandomIdGenerator),
            config,
        }
    }

    pub fn with_cleaner(mut self, cleaner: Arc<dyn HtmlCleaner>) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn with_access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn NoteIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    async fn new_note_id(&self) -> Result<NoteId> {
        let attempts = self.config.max_id_attempts;
        for _ in 0..attempts {
            let candidate = NoteId::new(self.ids.generate(self.config.limits.id_length));
            if self.store.get_note(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            debug!(note_id = %candidate, "Note id collision, retrying");
        }
        Err(NoteError::TooManyCollisions(attempts))
    }

    async fn load_rights(&self, note_id: &NoteId) -> Result<NoteRights> {
        self.store
            .get_rights(note_id)
            .await?
            .ok_or_else(|| NoteError::PostNotFound(note_id.to_string()))
    }

    async fn load_note(&self, note_id: &NoteId) -> Result<Note> {
        self.store
            .get_note(note_id)
            .await?
            .ok_or_else(|| {
                NoteError::NotFound(format!("The note with id {note_id} does not exist"))
            })
    }

    async fn load_summary(&self, note_id: &NoteId) -> Result<NoteSummary> {
        self.store.get_summary(note_id).await?.ok_or_else(|| {
            NoteError::NotFound(format!("The note summary with id {note_id} does not exist"))
        })
    }

    /// Index a published summary. Failures are logged, never returned.
    async fn index_quietly(&self, summary: &NoteSummary) {
        let doc = SearchDocument::from_summary(summary);
        if let Err(e) = self.index.index_documents(&[doc]).await {
            warn!(note_id = %summary.id, error = %e, "Failed to index published note");
        }
    }

    /// Remove an index entry. Failures are logged, never returned.
    async fn unindex_quietly(&self, note_id: &NoteId) {
        if let Err(e) = self.index.delete_document(note_id).await {
            warn!(note_id = %note_id, error = %e, "Failed to remove note from search index");
        }
    }

    // ── Create / edit ─────────────────────────────────────────

    /// Insert an empty draft with its summary and rights.
    ///
    /// Order: note, rights, summary. No validation runs here.
    pub async fn create(&self, author_id: &str) -> Result<Note> {
        let id = self.new_note_id().await?;
        let note = Note::new_draft(id, author_id, now());

        self.store.insert_note(&note).await?;
        self.store
            .insert_rights(&NoteRights::new(note.id.clone(), author_id))
            .await?;
        let summary = compute_summary(&note, self.config.limits.max_summary_chars);
        self.store.put_summary(&summary).await?;

        info!(note_id = %note.id, author_id, "Created draft note");
        Ok(note)
    }

    /// Apply `change` to the stored note without persisting it.
    pub async fn apply_change(&self, note_id: &NoteId, change: &NoteChange) -> Result<Note> {
        let mut note = self.load_note(note_id).await?;

        if let Some(title) = &change.title {
            let title = title.trim();
            require_valid_title(title, false, &self.config.limits)?;
            note.title = title.to_string();
            note.url_fragment = generate_url_fragment(title, note.id.as_str());
        }
        if let Some(subtitle) = &change.subtitle {
            note.subtitle = subtitle.clone();
        }
        if let Some(content) = &change.content {
            note.content = self.cleaner.clean(content);
        }
        Ok(note)
    }

    /// Apply and persist `change`, then regenerate the summary.
    ///
    /// Rights and the search index are left untouched, even for a published
    /// note; the index picks up new titles on the next publish or reindex.
    pub async fn update(&self, note_id: &NoteId, change: &NoteChange) -> Result<Note> {
        let mut note = self.apply_change(note_id, change).await?;
        note.last_updated = Some(now());
        validate_note(&note, false, &self.config.limits)?;

        let summary = compute_summary(&note, self.config.limits.max_summary_chars);
        validate_summary(&summary, false, &self.config.limits)?;

        self.store.put_note(&note).await?;
        self.store.put_summary(&summary).await?;

        debug!(note_id = %note.id, "Updated note");
        Ok(note)
    }

    // ── Publish / unpublish / delete ──────────────────────────

    /// Make a note publicly visible.
    ///
    /// Both records are validated strictly before anything is written. An
    /// already-published note keeps its original timestamp. Writes rights,
    /// then summary, then note, then the index entry; a crash after the
    /// rights write leaves `rights.is_published = true` with a draft note.
    pub async fn publish(&self, note_id: &NoteId) -> Result<Note> {
        let mut rights = self.load_rights(note_id).await?;
        let mut note = self.load_note(note_id).await?;
        let mut summary = self.load_summary(note_id).await?;

        validate_note(&note, true, &self.config.limits)?;
        validate_summary(&summary, true, &self.config.limits)?;

        if !rights.is_published {
            let stamped = now();
            note.published_on = Some(stamped);
            note.last_updated = Some(stamped);
            summary.published_on = Some(stamped);
            summary.last_updated = Some(stamped);
            rights.is_published = true;
        }

        self.store
            .put_publish_bundle(&rights, &summary, &note)
            .await?;
        self.index_quietly(&summary).await;

        info!(note_id = %note_id, published_on = ?note.published_on, "Published note");
        Ok(note)
    }

    /// Return a note to draft.
    ///
    /// Writes note, summary and rights unconditionally, even when the note
    /// already is a draft, then drops the index entry.
    pub async fn unpublish(&self, note_id: &NoteId) -> Result<()> {
        let mut rights = self.load_rights(note_id).await?;
        let mut note = self.load_note(note_id).await?;
        let mut summary = self.load_summary(note_id).await?;

        let stamped = now();
        note.published_on = None;
        note.last_updated = Some(stamped);
        self.store.put_note(&note).await?;

        summary.published_on = None;
        summary.last_updated = Some(stamped);
        self.store.put_summary(&summary).await?;

        rights.is_published = false;
        self.store.put_rights(&rights).await?;

        self.unindex_quietly(note_id).await;

        info!(note_id = %note_id, "Unpublished note");
        Ok(())
    }

    /// Remove all three records and the index entry. Not idempotent.
    ///
    /// Records are removed note, summary, rights; the first missing one stops
    /// the sequence with `NotFound`, leaving any later records in place.
    pub async fn delete(&self, note_id: &NoteId) -> Result<()> {
        if !self.store.delete_note(note_id).await? {
            return Err(NoteError::NotFound(format!(
                "The note with id {note_id} does not exist"
            )));
        }
        if !self.store.delete_summary(note_id).await? {
            return Err(NoteError::NotFound(format!(
                "The note summary with id {note_id} does not exist"
            )));
        }
        if !self.store.delete_rights(note_id).await? {
            return Err(NoteError::NotFound(format!(
                "The note rights with id {note_id} do not exist"
            )));
        }
        self.unindex_quietly(note_id).await;

        info!(note_id = %note_id, "Deleted note");
        Ok(())
    }

    /// Update, then publish or unpublish in one editor action.
    ///
    /// With `publish == false` a published note goes back to draft; a draft
    /// stays a draft.
    pub async fn save_and_set_status(
        &self,
        note_id: &NoteId,
        change: &NoteChange,
        publish: bool,
    ) -> Result<Note> {
        let note = self.update(note_id, change).await?;
        if publish {
            return self.publish(note_id).await;
        }
        let rights = self.load_rights(note_id).await?;
        if rights.is_published {
            self.unpublish(note_id).await?;
            return self.load_note(note_id).await;
        }
        Ok(note)
    }

    // ── Access ────────────────────────────────────────────────

    /// Whether `principal` may edit the note the rights belong to.
    pub fn check_can_edit(&self, principal: &Principal, rights: Option<&NoteRights>) -> bool {
        let Some(rights) = rights else {
            return false;
        };
        if self.access.has_global_edit_capability(principal) {
            return true;
        }
        rights.is_editor(&principal.actor_id)
    }

    // ── Rights administration ─────────────────────────────────

    /// Grant `user_id` edit rights. Adding an existing editor is a no-op.
    pub async fn add_editor(
        &self,
        principal: &Principal,
        note_id: &NoteId,
        user_id: &str,
    ) -> Result<NoteRights> {
        principal.require_rights_mutator()?;
        let mut rights = self.load_rights(note_id).await?;
        if rights.add_editor(user_id) {
            self.store.put_rights(&rights).await?;
            info!(note_id = %note_id, user_id, actor = %principal.actor_id, "Added note editor");
        }
        Ok(rights)
    }

    /// Revoke edit rights. The author always stays an editor.
    pub async fn remove_editor(
        &self,
        principal: &Principal,
        note_id: &NoteId,
        user_id: &str,
    ) -> Result<NoteRights> {
        principal.require_rights_mutator()?;
        let mut rights = self.load_rights(note_id).await?;
        let note = self.load_note(note_id).await?;
        if note.author_id == user_id {
            return Err(NoteError::validation(format!(
                "The author {user_id} can not be removed from the editors of note {note_id}"
            )));
        }
        if rights.remove_editor(user_id) {
            self.store.put_rights(&rights).await?;
            info!(note_id = %note_id, user_id, actor = %principal.actor_id, "Removed note editor");
        }
        Ok(rights)
    }

    /// Remove `user_id` from every note they edit but did not author.
    /// Returns the number of rights records changed.
    pub async fn deassign_user_from_all_notes(
        &self,
        principal: &Principal,
        user_id: &str,
    ) -> Result<usize> {
        principal.require_rights_mutator()?;
        let mut changed = 0;
        for mut rights in self.store.list_rights_by_editor(user_id, None).await? {
            let authored = match self.store.get_note(&rights.id).await? {
                Some(note) => note.author_id == user_id,
                None => false,
            };
            if authored {
                debug!(note_id = %rights.id, user_id, "Keeping author as editor");
                continue;
            }
            if rights.remove_editor(user_id) {
                self.store.put_rights(&rights).await?;
                changed += 1;
            }
        }
        info!(user_id, changed, "Deassigned user from notes");
        Ok(changed)
    }

    /// Move a note to another author with a backdated publish date.
    ///
    /// The note ends up published at midnight UTC of `published_date`, with
    /// the new author added to its editors.
    pub async fn reassign_author(
        &self,
        principal: &Principal,
        note_id: &NoteId,
        author_id: &str,
        published_date: NaiveDate,
    ) -> Result<Note> {
        principal.require_admin()?;
        let mut rights = self.load_rights(note_id).await?;
        let mut note = self.load_note(note_id).await?;

        note.author_id = author_id.to_string();
        note.published_on = Some(published_date.and_time(NaiveTime::MIN).and_utc());
        note.last_updated = Some(now());
        validate_note(&note, true, &self.config.limits)?;

        let summary = compute_summary(&note, self.config.limits.max_summary_chars);
        validate_summary(&summary, true, &self.config.limits)?;

        rights.add_editor(author_id);
        rights.is_published = true;

        self.store
            .put_publish_bundle(&rights, &summary, &note)
            .await?;
        self.index_quietly(&summary).await;

        info!(note_id = %note_id, author_id, %published_date, "Reassigned note author");
        Ok(note)
    }

    // ── Index maintenance ─────────────────────────────────────

    /// Index the summaries for `ids` that exist. Missing ids are skipped;
    /// index errors are returned.
    pub async fn index_summaries_given_ids(&self, ids: &[NoteId]) -> Result<usize> {
        let docs: Vec<SearchDocument> = self
            .store
            .get_summaries(ids)
            .await?
            .iter()
            .flatten()
            .map(SearchDocument::from_summary)
            .collect();
        if !docs.is_empty() {
            self.index.index_documents(&docs).await?;
        }
        Ok(docs.len())
    }

    /// Push every published summary into the index.
    pub async fn reindex_published(&self) -> Result<usize> {
        let batch = self.config.default_query_limit.max(1);
        let mut offset = 0;
        loop {
            let page = self
                .store
                .list_published_summaries(None, offset, batch)
                .await?;
            let docs: Vec<SearchDocument> =
                page.iter().map(SearchDocument::from_summary).collect();
            if !docs.is_empty() {
                self.index.index_documents(&docs).await?;
            }
            offset += page.len();
            if page.len() < batch {
                break;
            }
        }
        info!(indexed = offset, "Rebuilt search index from published notes");
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{RoleActionTable, ROLE_ADMIN, ROLE_EDITOR};
    use crate::memory::{MemoryContentStore, MemorySearchIndex};

    fn service() -> NoteService {
        NoteService::new(
            Arc::new(MemoryContentStore::new()),
            Arc::new(MemorySearchIndex::new()),
            NotesConfig::default(),
        )
    }

    struct FixedIds(&'static str);

    impl NoteIdGenerator for FixedIds {
        fn generate(&self, _length: usize) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn random_ids_have_configured_length() {
        let id = RandomIdGenerator.generate(12);
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn create_gives_up_after_repeated_collisions() {
        let svc = service().with_id_generator(Arc::new(FixedIds("abcdefghijkl")));
        svc.create("u1").await.unwrap();
        let err = svc.create("u1").await.unwrap_err();
        assert!(matches!(err, NoteError::TooManyCollisions(10)));
    }

    #[test]
    fn check_can_edit_rules() {
        let svc = service();
        let rights = NoteRights::new(NoteId::new("n1"), "author");
        let author = Principal::new("author", vec![ROLE_EDITOR.into()]);
        let stranger = Principal::new("other", vec![ROLE_EDITOR.into()]);
        let admin = Principal::new("root", vec![ROLE_ADMIN.into()]);

        assert!(svc.check_can_edit(&author, Some(&rights)));
        assert!(!svc.check_can_edit(&stranger, Some(&rights)));
        assert!(svc.check_can_edit(&admin, Some(&rights)));
        assert!(!svc.check_can_edit(&admin, None));
    }

    #[test]
    fn injected_access_table_is_used() {
        let svc = service().with_access(Arc::new(RoleActionTable::new(Default::default())));
        let admin = Principal::new("root", vec![ROLE_ADMIN.into()]);
        let rights = NoteRights::new(NoteId::new("n1"), "author");
        assert!(!svc.check_can_edit(&admin, Some(&rights)));
    }

    #[tokio::test]
    async fn apply_change_trims_title_and_does_not_persist() {
        let svc = service().with_id_generator(Arc::new(FixedIds("ABC123efg456")));
        let note = svc.create("u1").await.unwrap();
        let change = NoteChange::default()
            .title("  Sample Title ")
            .subtitle("Sub")
            .content("<p onclick=\"x()\">Hi</p>");

        let applied = svc.apply_change(&note.id, &change).await.unwrap();
        assert_eq!(applied.title, "Sample Title");
        assert_eq!(applied.url_fragment, "sample-title-abc123efg456");
        assert_eq!(applied.subtitle, "Sub");
        assert_eq!(applied.content, "<p>Hi</p>");

        let stored = svc.store.get_note(&note.id).await.unwrap().unwrap();
        assert!(stored.title.is_empty());
    }

    struct Shouting;

    impl HtmlCleaner for Shouting {
        fn clean(&self, html: &str) -> String {
            html.to_uppercase()
        }
    }

    #[tokio::test]
    async fn injected_cleaner_sanitizes_content() {
        let svc = service().with_cleaner(Arc::new(Shouting));
        let note = svc.create("u1").await.unwrap();
        let change = NoteChange::default().content("<p>quiet</p>");
        let updated = svc.update(&note.id, &change).await.unwrap();
        assert_eq!(updated.content, "<P>QUIET</P>");
    }

    #[tokio::test]
    async fn apply_change_rejects_overlong_title() {
        let svc = service();
        let note = svc.create("u1").await.unwrap();
        let change = NoteChange::default().title("x".repeat(66));
        let err = svc.apply_change(&note.id, &change).await.unwrap_err();
        assert!(matches!(err, NoteError::Validation(_)));
    }
}
