//! Postgres content store.
//!
//! All SQL is runtime-checked (`sqlx::query_as`, not `sqlx::query!`) so the
//! crate builds without a database. The publish bundle runs in one
//! transaction; every other write is a single statement.

use std::collections::HashMap;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::NoteError;
use crate::ports::{ContentStore, Result};
use crate::types::*;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS notes (
    id            TEXT PRIMARY KEY,
    author_id     TEXT NOT NULL,
    title         TEXT NOT NULL DEFAULT '',
    subtitle      TEXT NOT NULL DEFAULT '',
    content       TEXT NOT NULL DEFAULT '',
    url_fragment  TEXT NOT NULL DEFAULT '',
    last_updated  TIMESTAMPTZ,
    published_on  TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_notes_author ON notes(author_id);
CREATE INDEX IF NOT EXISTS idx_notes_title ON notes(title);
CREATE INDEX IF NOT EXISTS idx_notes_url_fragment ON notes(url_fragment);

CREATE TABLE IF NOT EXISTS note_summaries (
    id            TEXT PRIMARY KEY,
    author_id     TEXT NOT NULL,
    title         TEXT NOT NULL DEFAULT '',
    subtitle      TEXT NOT NULL DEFAULT '',
    summary       TEXT NOT NULL DEFAULT '',
    url_fragment  TEXT NOT NULL DEFAULT '',
    last_updated  TIMESTAMPTZ,
    published_on  TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_note_summaries_published
    ON note_summaries(published_on DESC) WHERE published_on IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_note_summaries_title ON note_summaries(title);

CREATE TABLE IF NOT EXISTS note_rights (
    id            TEXT PRIMARY KEY,
    editor_ids    TEXT[] NOT NULL,
    is_published  BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_note_rights_editors ON note_rights USING GIN (editor_ids);
"#;

// ── Row types ─────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct NoteRow {
    id: String,
    author_id: String,
    title: String,
    subtitle: String,
    content: String,
    url_fragment: String,
    last_updated: Option<DateTime<Utc>>,
    published_on: Option<DateTime<Utc>>,
}

impl From<NoteRow> for Note {
    fn from(r: NoteRow) -> Self {
        Note {
            id: NoteId::new(r.id),
            author_id: r.author_id,
            title: r.title,
            subtitle: r.subtitle,
            content: r.content,
            url_fragment: r.url_fragment,
            last_updated: r.last_updated,
            published_on: r.published_on,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    id: String,
    author_id: String,
    title: String,
    subtitle: String,
    summary: String,
    url_fragment: String,
    last_updated: Option<DateTime<Utc>>,
    published_on: Option<DateTime<Utc>>,
}

impl From<SummaryRow> for NoteSummary {
    fn from(r: SummaryRow) -> Self {
        NoteSummary {
            id: NoteId::new(r.id),
            author_id: r.author_id,
            title: r.title,
            subtitle: r.subtitle,
            summary: r.summary,
            url_fragment: r.url_fragment,
            last_updated: r.last_updated,
            published_on: r.published_on,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RightsRow {
    id: String,
    editor_ids: Vec<String>,
    is_published: bool,
}

impl From<RightsRow> for NoteRights {
    fn from(r: RightsRow) -> Self {
        NoteRights {
            id: NoteId::new(r.id),
            editor_ids: r.editor_ids,
            is_published: r.is_published,
        }
    }
}

const NOTE_COLUMNS: &str =
    "id, author_id, title, subtitle, content, url_fragment, last_updated, published_on";
const SUMMARY_COLUMNS: &str =
    "id, author_id, title, subtitle, summary, url_fragment, last_updated, published_on";

const UPSERT_NOTE: &str = r#"
    INSERT INTO notes
        (id, author_id, title, subtitle, content, url_fragment, last_updated, published_on)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (id) DO UPDATE SET
        author_id = EXCLUDED.author_id,
        title = EXCLUDED.title,
        subtitle = EXCLUDED.subtitle,
        content = EXCLUDED.content,
        url_fragment = EXCLUDED.url_fragment,
        last_updated = EXCLUDED.last_updated,
        published_on = EXCLUDED.published_on
"#;

const UPSERT_SUMMARY: &str = r#"
    INSERT INTO note_summaries
        (id, author_id, title, subtitle, summary, url_fragment, last_updated, published_on)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (id) DO UPDATE SET
        author_id = EXCLUDED.author_id,
        title = EXCLUDED.title,
        subtitle = EXCLUDED.subtitle,
        summary = EXCLUDED.summary,
        url_fragment = EXCLUDED.url_fragment,
        last_updated = EXCLUDED.last_updated,
        published_on = EXCLUDED.published_on
"#;

const UPSERT_RIGHTS: &str = r#"
    INSERT INTO note_rights (id, editor_ids, is_published)
    VALUES ($1, $2, $3)
    ON CONFLICT (id) DO UPDATE SET
        editor_ids = EXCLUDED.editor_ids,
        is_published = EXCLUDED.is_published
"#;

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// ── PgContentStore ────────────────────────────────────────────

pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to the notes database")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the note tables if they don't exist.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to initialize note storage schema")?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn get_note(&self, id: &NoteId) -> Result<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(Note::from))
    }

    async fn insert_note(&self, note: &Note) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO notes
                (id, author_id, title, subtitle, content, url_fragment, last_updated, published_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(note.id.as_str())
        .bind(&note.author_id)
        .bind(&note.title)
        .bind(&note.subtitle)
        .bind(&note.content)
        .bind(&note.url_fragment)
        .bind(note.last_updated)
        .bind(note.published_on)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        if result.rows_affected() == 0 {
            return Err(NoteError::Conflict(format!(
                "A note with id {} exists already",
                note.id
            )));
        }
        Ok(())
    }

    async fn put_note(&self, note: &Note) -> Result<()> {
        sqlx::query(UPSERT_NOTE)
            .bind(note.id.as_str())
            .bind(&note.author_id)
            .bind(&note.title)
            .bind(&note.subtitle)
            .bind(&note.content)
            .bind(&note.url_fragment)
            .bind(note.last_updated)
            .bind(note.published_on)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn delete_note(&self, id: &NoteId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_note_by_url_fragment(&self, url_fragment: &str) -> Result<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE url_fragment = $1 ORDER BY id LIMIT 1"
        ))
        .bind(url_fragment)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(Note::from))
    }

    async fn find_notes_by_title(&self, title: &str) -> Result<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE title = $1 ORDER BY id"
        ))
        .bind(title)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Note::from).collect())
    }

    async fn list_notes_by_author(&self, author_id: &str) -> Result<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE author_id = $1 ORDER BY id"
        ))
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Note::from).collect())
    }

    async fn get_summary(&self, id: &NoteId) -> Result<Option<NoteSummary>> {
        let row = sqlx::query_as::<_, SummaryRow>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM note_summaries WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(NoteSummary::from))
    }

    async fn get_summaries(&self, ids: &[NoteId]) -> Result<Vec<Option<NoteSummary>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(NoteId::to_string).collect();
        let rows = sqlx::query_as::<_, SummaryRow>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM note_summaries WHERE id = ANY($1)"
        ))
        .bind(&keys)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        let by_id: HashMap<String, NoteSummary> = rows
            .into_iter()
            .map(|r| (r.id.clone(), NoteSummary::from(r)))
            .collect();
        Ok(keys.iter().map(|k| by_id.get(k).cloned()).collect())
    }

    async fn put_summary(&self, summary: &NoteSummary) -> Result<()> {
        sqlx::query(UPSERT_SUMMARY)
            .bind(summary.id.as_str())
            .bind(&summary.author_id)
            .bind(&summary.title)
            .bind(&summary.subtitle)
            .bind(&summary.summary)
            .bind(&summary.url_fragment)
            .bind(summary.last_updated)
            .bind(summary.published_on)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn delete_summary(&self, id: &NoteId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM note_summaries WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_summaries_by_title(&self, title: &str) -> Result<Vec<NoteSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM note_summaries WHERE title = $1 ORDER BY id"
        ))
        .bind(title)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(NoteSummary::from).collect())
    }

    async fn list_published_summaries(
        &self,
        author_id: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<NoteSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS} FROM note_summaries
            WHERE published_on IS NOT NULL
              AND ($1::text IS NULL OR author_id = $1)
            ORDER BY published_on DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(author_id)
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(NoteSummary::from).collect())
    }

    async fn get_rights(&self, id: &NoteId) -> Result<Option<NoteRights>> {
        let row = sqlx::query_as::<_, RightsRow>(
            "SELECT id, editor_ids, is_published FROM note_rights WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(NoteRights::from))
    }

    async fn insert_rights(&self, rights: &NoteRights) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO note_rights (id, editor_ids, is_published)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(rights.id.as_str())
        .bind(&rights.editor_ids)
        .bind(rights.is_published)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        if result.rows_affected() == 0 {
            return Err(NoteError::Conflict(format!(
                "Note id conflict on creating rights for {}",
                rights.id
            )));
        }
        Ok(())
    }

    async fn put_rights(&self, rights: &NoteRights) -> Result<()> {
        sqlx::query(UPSERT_RIGHTS)
            .bind(rights.id.as_str())
            .bind(&rights.editor_ids)
            .bind(rights.is_published)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn delete_rights(&self, id: &NoteId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM note_rights WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_rights_by_editor(
        &self,
        user_id: &str,
        is_published: Option<bool>,
    ) -> Result<Vec<NoteRights>> {
        let rows = sqlx::query_as::<_, RightsRow>(
            r#"
            SELECT id, editor_ids, is_published FROM note_rights
            WHERE $1 = ANY(editor_ids)
              AND ($2::boolean IS NULL OR is_published = $2)
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .bind(is_published)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(NoteRights::from).collect())
    }

    async fn count_rights(&self, is_published: bool) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM note_rights WHERE is_published = $1")
                .bind(is_published)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Rights, summary and note in one transaction.
    async fn put_publish_bundle(
        &self,
        rights: &NoteRights,
        summary: &NoteSummary,
        note: &Note,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        sqlx::query(UPSERT_RIGHTS)
            .bind(rights.id.as_str())
            .bind(&rights.editor_ids)
            .bind(rights.is_published)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;

        sqlx::query(UPSERT_SUMMARY)
            .bind(summary.id.as_str())
            .bind(&summary.author_id)
            .bind(&summary.title)
            .bind(&summary.subtitle)
            .bind(&summary.summary)
            .bind(&summary.url_fragment)
            .bind(summary.last_updated)
            .bind(summary.published_on)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;

        sqlx::query(UPSERT_NOTE)
            .bind(note.id.as_str())
            .bind(&note.author_id)
            .bind(&note.title)
            .bind(&note.subtitle)
            .bind(&note.content)
            .bind(&note.url_fragment)
            .bind(note.last_updated)
            .bind(note.published_on)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;

        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> PgContentStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgContentStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn unique_id(tag: &str) -> NoteId {
        NoteId::new(format!("{tag}{}", Utc::now().timestamp_nanos_opt().unwrap_or(0)))
    }

    #[tokio::test]
    #[ignore]
    async fn note_roundtrip_and_conflict() {
        let store = store().await;
        let note = Note::new_draft(unique_id("pgnote"), "pg-author", Utc::now());

        store.insert_note(&note).await.unwrap();
        assert!(matches!(
            store.insert_note(&note).await.unwrap_err(),
            NoteError::Conflict(_)
        ));
        let loaded = store.get_note(&note.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, note.id);
        assert!(store.delete_note(&note.id).await.unwrap());
        assert!(!store.delete_note(&note.id).await.unwrap());
    }

    #[tokio::test]
    #[ignore]
    async fn publish_bundle_is_written_together() {
        let store = store().await;
        let now = Utc::now();
        let mut note = Note::new_draft(unique_id("pgpub"), "pg-author", now);
        note.title = "Bundle".into();
        note.published_on = Some(now);
        let summary = crate::summary::compute_summary(&note, 300);
        let mut rights = NoteRights::new(note.id.clone(), "pg-author");
        rights.is_published = true;

        store.put_publish_bundle(&rights, &summary, &note).await.unwrap();

        assert!(store.get_rights(&note.id).await.unwrap().unwrap().is_published);
        let got = store.get_summaries(&[note.id.clone(), NoteId::new("missing")]).await.unwrap();
        assert!(got[0].is_some());
        assert!(got[1].is_none());
        let editable = store.list_rights_by_editor("pg-author", Some(true)).await.unwrap();
        assert!(editable.iter().any(|r| r.id == note.id));

        store.delete_note(&note.id).await.unwrap();
        store.delete_summary(&note.id).await.unwrap();
        store.delete_rights(&note.id).await.unwrap();
    }
}
