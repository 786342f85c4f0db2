//! Note publishing core.
//!
//! A note lives in three records keyed by the same id:
//! - `Note`: the full content
//! - `NoteSummary`: a derived projection for listings
//! - `NoteRights`: editors and the authoritative publish flag
//!
//! [`lifecycle::NoteService`] owns every write across them and the search
//! index; [`queries::NoteQueries`] serves reads straight from the stores.
//! Storage and search sit behind the traits in [`ports`], with in-memory
//! adapters in [`memory`] and a Postgres store behind the `postgres` feature.

pub mod access;
pub mod config;
pub mod error;
pub mod html;
pub mod lifecycle;
pub mod memory;
pub mod ports;
pub mod queries;
pub mod records;
pub mod summary;
pub mod types;
pub mod validation;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use access::{AccessControl, NoteAction, Principal, RoleActionTable};
pub use config::{NoteLimits, NotesConfig};
pub use error::NoteError;
pub use lifecycle::NoteService;
pub use ports::{ContentStore, SearchIndex};
pub use queries::NoteQueries;
pub use types::*;
