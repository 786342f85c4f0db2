//! In-memory adapters for tests, demos and single-process use.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::error::NoteError;
use crate::ports::{ContentStore, Result, SearchIndex};
use crate::types::*;

fn lock_err(e: impl std::fmt::Display) -> NoteError {
    NoteError::Internal(anyhow!("Lock: {}", e))
}

// ── MemoryContentStore ──

/// `HashMap`-backed content store, one lock per record kind so that each
/// write is atomic on its own and nothing more.
pub struct MemoryContentStore {
    notes: RwLock<HashMap<NoteId, Note>>,
    summaries: RwLock<HashMap<NoteId, NoteSummary>>,
    rights: RwLock<HashMap<NoteId, NoteRights>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self {
            notes: RwLock::new(HashMap::new()),
            summaries: RwLock::new(HashMap::new()),
            rights: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get_note(&self, id: &NoteId) -> Result<Option<Note>> {
        let notes = self.notes.read().map_err(lock_err)?;
        Ok(notes.get(id).cloned())
    }

    async fn insert_note(&self, note: &Note) -> Result<()> {
        let mut notes = self.notes.write().map_err(lock_err)?;
        if notes.contains_key(&note.id) {
            return Err(NoteError::Conflict(format!(
                "A note with id {} exists already",
                note.id
            )));
        }
        notes.insert(note.id.clone(), note.clone());
        Ok(())
    }

    async fn put_note(&self, note: &Note) -> Result<()> {
        let mut notes = self.notes.write().map_err(lock_err)?;
        notes.insert(note.id.clone(), note.clone());
        Ok(())
    }

    async fn delete_note(&self, id: &NoteId) -> Result<bool> {
        let mut notes = self.notes.write().map_err(lock_err)?;
        Ok(notes.remove(id).is_some())
    }

    async fn find_note_by_url_fragment(&self, url_fragment: &str) -> Result<Option<Note>> {
        let notes = self.notes.read().map_err(lock_err)?;
        Ok(notes
            .values()
            .find(|n| n.url_fragment == url_fragment)
            .cloned())
    }

    async fn find_notes_by_title(&self, title: &str) -> Result<Vec<Note>> {
        let notes = self.notes.read().map_err(lock_err)?;
        let mut found: Vec<Note> = notes.values().filter(|n| n.title == title).cloned().collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn list_notes_by_author(&self, author_id: &str) -> Result<Vec<Note>> {
        let notes = self.notes.read().map_err(lock_err)?;
        let mut found: Vec<Note> = notes
            .values()
            .filter(|n| n.author_id == author_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn get_summary(&self, id: &NoteId) -> Result<Option<NoteSummary>> {
        let summaries = self.summaries.read().map_err(lock_err)?;
        Ok(summaries.get(id).cloned())
    }

    async fn get_summaries(&self, ids: &[NoteId]) -> Result<Vec<Option<NoteSummary>>> {
        let summaries = self.summaries.read().map_err(lock_err)?;
        Ok(ids.iter().map(|id| summaries.get(id).cloned()).collect())
    }

    async fn put_summary(&self, summary: &NoteSummary) -> Result<()> {
        let mut summaries = self.summaries.write().map_err(lock_err)?;
        summaries.insert(summary.id.clone(), summary.clone());
        Ok(())
    }

    async fn delete_summary(&self, id: &NoteId) -> Result<bool> {
        let mut summaries = self.summaries.write().map_err(lock_err)?;
        Ok(summaries.remove(id).is_some())
    }

    async fn find_summaries_by_title(&self, title: &str) -> Result<Vec<NoteSummary>> {
        let summaries = self.summaries.read().map_err(lock_err)?;
        let mut found: Vec<NoteSummary> = summaries
            .values()
            .filter(|s| s.title == title)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn list_published_summaries(
        &self,
        author_id: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<NoteSummary>> {
        let summaries = self.summaries.read().map_err(lock_err)?;
        let mut published: Vec<&NoteSummary> = summaries
            .values()
            .filter(|s| s.published_on.is_some())
            .filter(|s| author_id.map_or(true, |a| s.author_id == a))
            .collect();
        published.sort_by(|a, b| {
            b.published_on
                .cmp(&a.published_on)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(published
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_rights(&self, id: &NoteId) -> Result<Option<NoteRights>> {
        let rights = self.rights.read().map_err(lock_err)?;
        Ok(rights.get(id).cloned())
    }

    async fn insert_rights(&self, rights: &NoteRights) -> Result<()> {
        let mut all = self.rights.write().map_err(lock_err)?;
        if all.contains_key(&rights.id) {
            return Err(NoteError::Conflict(format!(
                "Note id conflict on creating rights for {}",
                rights.id
            )));
        }
        all.insert(rights.id.clone(), rights.clone());
        Ok(())
    }

    async fn put_rights(&self, rights: &NoteRights) -> Result<()> {
        let mut all = self.rights.write().map_err(lock_err)?;
        all.insert(rights.id.clone(), rights.clone());
        Ok(())
    }

    async fn delete_rights(&self, id: &NoteId) -> Result<bool> {
        let mut all = self.rights.write().map_err(lock_err)?;
        Ok(all.remove(id).is_some())
    }

    async fn list_rights_by_editor(
        &self,
        user_id: &str,
        is_published: Option<bool>,
    ) -> Result<Vec<NoteRights>> {
        let all = self.rights.read().map_err(lock_err)?;
        let mut found: Vec<NoteRights> = all
            .values()
            .filter(|r| r.is_editor(user_id))
            .filter(|r| is_published.map_or(true, |flag| r.is_published == flag))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn count_rights(&self, is_published: bool) -> Result<usize> {
        let all = self.rights.read().map_err(lock_err)?;
        Ok(all.values().filter(|r| r.is_published == is_published).count())
    }
}

// ── MemorySearchIndex ──

/// Keyword index over document titles.
///
/// Every query term must prefix-match some word of the title
/// (case-insensitive); an empty query matches everything. Results are ordered
/// by rank descending, then id.
pub struct MemorySearchIndex {
    docs: RwLock<BTreeMap<NoteId, SearchDocument>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.docs.read().map_err(lock_err)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, id: &NoteId) -> Result<bool> {
        Ok(self.docs.read().map_err(lock_err)?.contains_key(id))
    }
}

impl Default for MemorySearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn title_words(title: &str) -> Vec<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn matches(terms: &[String], title: &str) -> bool {
    let words = title_words(title);
    terms
        .iter()
        .all(|term| words.iter().any(|w| w.starts_with(term.as_str())))
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn index_documents(&self, docs: &[SearchDocument]) -> Result<()> {
        let mut all = self.docs.write().map_err(lock_err)?;
        for doc in docs {
            all.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn delete_document(&self, id: &NoteId) -> Result<()> {
        let mut all = self.docs.write().map_err(lock_err)?;
        all.remove(id);
        Ok(())
    }

    async fn search(&self, query: &str, size: usize, offset: Option<usize>) -> Result<SearchPage> {
        let all = self.docs.read().map_err(lock_err)?;
        let terms = title_words(query);

        let mut hits: Vec<&SearchDocument> = all
            .values()
            .filter(|doc| matches(&terms, &doc.title))
            .collect();
        hits.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.id.cmp(&b.id)));

        let start = offset.unwrap_or(0);
        let ids: Vec<NoteId> = hits
            .iter()
            .skip(start)
            .take(size)
            .map(|doc| doc.id.clone())
            .collect();
        let end = start + ids.len();
        let next_offset = (end < hits.len()).then_some(end);

        Ok(SearchPage { ids, next_offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn summary(id: &str, author: &str, published_secs: Option<i64>) -> NoteSummary {
        NoteSummary {
            id: NoteId::new(id),
            author_id: author.into(),
            title: format!("Title {id}"),
            subtitle: String::new(),
            summary: "s".into(),
            url_fragment: format!("title-{id}"),
            last_updated: None,
            published_on: published_secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        }
    }

    fn doc(id: &str, title: &str, rank: i64) -> SearchDocument {
        SearchDocument {
            id: NoteId::new(id),
            title: title.into(),
            rank,
        }
    }

    #[tokio::test]
    async fn insert_conflicts_on_existing_id() {
        let store = MemoryContentStore::new();
        let note = Note::new_draft(NoteId::new("n1"), "u1", Utc::now());
        store.insert_note(&note).await.unwrap();
        let err = store.insert_note(&note).await.unwrap_err();
        assert!(matches!(err, NoteError::Conflict(_)));

        let rights = NoteRights::new(NoteId::new("n1"), "u1");
        store.insert_rights(&rights).await.unwrap();
        assert!(matches!(
            store.insert_rights(&rights).await.unwrap_err(),
            NoteError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn delete_reports_whether_record_existed() {
        let store = MemoryContentStore::new();
        let note = Note::new_draft(NoteId::new("n1"), "u1", Utc::now());
        store.put_note(&note).await.unwrap();
        assert!(store.delete_note(&note.id).await.unwrap());
        assert!(!store.delete_note(&note.id).await.unwrap());
        assert!(store.get_note(&note.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_summaries_is_positional() {
        let store = MemoryContentStore::new();
        store.put_summary(&summary("a", "u", None)).await.unwrap();
        store.put_summary(&summary("c", "u", None)).await.unwrap();
        let ids = [NoteId::new("a"), NoteId::new("b"), NoteId::new("c")];
        let got = store.get_summaries(&ids).await.unwrap();
        assert_eq!(got.len(), 3);
        assert!(got[0].is_some());
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap().id.as_str(), "c");
    }

    #[tokio::test]
    async fn published_summaries_newest_first_and_paged() {
        let store = MemoryContentStore::new();
        store.put_summary(&summary("a", "u1", Some(100))).await.unwrap();
        store.put_summary(&summary("b", "u2", Some(300))).await.unwrap();
        store.put_summary(&summary("c", "u1", Some(200))).await.unwrap();
        store.put_summary(&summary("d", "u1", None)).await.unwrap();

        let all = store.list_published_summaries(None, 0, 10).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let page = store.list_published_summaries(None, 1, 1).await.unwrap();
        assert_eq!(page[0].id.as_str(), "c");

        let by_u1 = store.list_published_summaries(Some("u1"), 0, 10).await.unwrap();
        let ids: Vec<&str> = by_u1.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn rights_by_editor_and_counts() {
        let store = MemoryContentStore::new();
        let mut r1 = NoteRights::new(NoteId::new("a"), "u1");
        r1.is_published = true;
        let mut r2 = NoteRights::new(NoteId::new("b"), "u2");
        r2.add_editor("u1");
        store.put_rights(&r1).await.unwrap();
        store.put_rights(&r2).await.unwrap();

        assert_eq!(store.list_rights_by_editor("u1", None).await.unwrap().len(), 2);
        let drafts = store.list_rights_by_editor("u1", Some(false)).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id.as_str(), "b");
        assert_eq!(store.count_rights(true).await.unwrap(), 1);
        assert_eq!(store.count_rights(false).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn default_bundle_writes_all_three() {
        let store = MemoryContentStore::new();
        let now = Utc::now();
        let mut note = Note::new_draft(NoteId::new("n1"), "u1", now);
        note.published_on = Some(now + Duration::seconds(1));
        let summary = crate::summary::compute_summary(&note, 300);
        let mut rights = NoteRights::new(note.id.clone(), "u1");
        rights.is_published = true;

        store.put_publish_bundle(&rights, &summary, &note).await.unwrap();
        assert!(store.get_rights(&note.id).await.unwrap().unwrap().is_published);
        assert_eq!(
            store.get_summary(&note.id).await.unwrap().unwrap().published_on,
            note.published_on
        );
        assert_eq!(store.get_note(&note.id).await.unwrap().unwrap(), note);
    }

    #[tokio::test]
    async fn search_orders_by_rank_and_pages() {
        let index = MemorySearchIndex::new();
        index
            .index_documents(&[
                doc("a", "Rust ownership", 10),
                doc("b", "Rusty nails", 30),
                doc("c", "Gardening", 20),
                doc("d", "Async Rust", 20),
            ])
            .await
            .unwrap();

        let page = index.search("rust", 2, None).await.unwrap();
        let ids: Vec<&str> = page.ids.iter().map(NoteId::as_str).collect();
        assert_eq!(ids, vec!["b", "d"]);
        assert_eq!(page.next_offset, Some(2));

        let next = index.search("rust", 2, page.next_offset).await.unwrap();
        let ids: Vec<&str> = next.ids.iter().map(NoteId::as_str).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(next.next_offset, None);
    }

    #[tokio::test]
    async fn empty_query_matches_all_and_delete_is_idempotent() {
        let index = MemorySearchIndex::new();
        index
            .index_documents(&[doc("a", "One", 1), doc("b", "Two", 2)])
            .await
            .unwrap();
        assert_eq!(index.search("", 10, None).await.unwrap().ids.len(), 2);

        index.delete_document(&NoteId::new("a")).await.unwrap();
        index.delete_document(&NoteId::new("a")).await.unwrap();
        assert_eq!(index.len().unwrap(), 1);
        assert!(!index.contains(&NoteId::new("a")).unwrap());
    }

    #[tokio::test]
    async fn poisoned_index_lock_is_an_error() {
        let index = MemorySearchIndex::new();
        index.index_documents(&[doc("a", "One", 1)]).await.unwrap();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = index.docs.write().unwrap();
            panic!("writer died holding the lock");
        }));

        assert!(matches!(index.len(), Err(NoteError::Internal(_))));
        assert!(matches!(index.is_empty(), Err(NoteError::Internal(_))));
        assert!(matches!(
            index.contains(&NoteId::new("a")),
            Err(NoteError::Internal(_))
        ));
        assert!(index.search("one", 10, None).await.is_err());
    }

    #[tokio::test]
    async fn reindexing_replaces_document() {
        let index = MemorySearchIndex::new();
        index.index_documents(&[doc("a", "Old", 1)]).await.unwrap();
        index.index_documents(&[doc("a", "New", 1)]).await.unwrap();
        assert!(index.search("old", 10, None).await.unwrap().ids.is_empty());
        assert_eq!(index.search("new", 10, None).await.unwrap().ids.len(), 1);
    }
}
