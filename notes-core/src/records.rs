//! Serializable record forms of the three note entities.
//!
//! Timestamps travel as naive UTC strings (`MM/DD/YYYY, HH:MM:SS:fffffffff`)
//! so the records can be handed to a JSON layer unchanged. Conversions are
//! lossless in both directions.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NoteError;
use crate::types::{Note, NoteId, NoteRights, NoteSummary};

pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y, %H:%M:%S:%f";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, NoteError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| NoteError::validation(format!("Invalid timestamp {raw:?}: {e}")))
}

fn parse_optional(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, NoteError> {
    raw.map(parse_timestamp).transpose()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub subtitle: String,
    pub content: String,
    pub url_fragment: String,
    pub last_updated: Option<String>,
    pub published_on: Option<String>,
}

impl From<&Note> for NoteRecord {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.to_string(),
            author_id: note.author_id.clone(),
            title: note.title.clone(),
            subtitle: note.subtitle.clone(),
            content: note.content.clone(),
            url_fragment: note.url_fragment.clone(),
            last_updated: note.last_updated.as_ref().map(format_timestamp),
            published_on: note.published_on.as_ref().map(format_timestamp),
        }
    }
}

impl TryFrom<NoteRecord> for Note {
    type Error = NoteError;

    fn try_from(record: NoteRecord) -> Result<Self, Self::Error> {
        Ok(Note {
            last_updated: parse_optional(record.last_updated.as_deref())?,
            published_on: parse_optional(record.published_on.as_deref())?,
            id: NoteId::new(record.id),
            author_id: record.author_id,
            title: record.title,
            subtitle: record.subtitle,
            content: record.content,
            url_fragment: record.url_fragment,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSummaryRecord {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub subtitle: String,
    pub summary: String,
    pub url_fragment: String,
    pub last_updated: Option<String>,
    pub published_on: Option<String>,
}

impl From<&NoteSummary> for NoteSummaryRecord {
    fn from(summary: &NoteSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            author_id: summary.author_id.clone(),
            title: summary.title.clone(),
            subtitle: summary.subtitle.clone(),
            summary: summary.summary.clone(),
            url_fragment: summary.url_fragment.clone(),
            last_updated: summary.last_updated.as_ref().map(format_timestamp),
            published_on: summary.published_on.as_ref().map(format_timestamp),
        }
    }
}

impl TryFrom<NoteSummaryRecord> for NoteSummary {
    type Error = NoteError;

    fn try_from(record: NoteSummaryRecord) -> Result<Self, Self::Error> {
        Ok(NoteSummary {
            last_updated: parse_optional(record.last_updated.as_deref())?,
            published_on: parse_optional(record.published_on.as_deref())?,
            id: NoteId::new(record.id),
            author_id: record.author_id,
            title: record.title,
            subtitle: record.subtitle,
            summary: record.summary,
            url_fragment: record.url_fragment,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRightsRecord {
    pub note_id: String,
    pub editor_ids: Vec<String>,
    pub note_is_published: bool,
}

impl From<&NoteRights> for NoteRightsRecord {
    fn from(rights: &NoteRights) -> Self {
        Self {
            note_id: rights.id.to_string(),
            editor_ids: rights.editor_ids.clone(),
            note_is_published: rights.is_published,
        }
    }
}

impl From<NoteRightsRecord> for NoteRights {
    fn from(record: NoteRightsRecord) -> Self {
        NoteRights {
            id: NoteId::new(record.note_id),
            editor_ids: record.editor_ids,
            is_published: record.note_is_published,
        }
    }
}
