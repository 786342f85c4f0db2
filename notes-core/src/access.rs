//! Who may do what to a note.
//!
//! Role → action tables are plain configuration handed to the services; there
//! is no process-wide registry.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::NoteError;

pub const ROLE_EDITOR: &str = "editor";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteAction {
    AccessNotesPage,
    EditOwnedNote,
    DeleteOwnedNote,
    EditAnyNote,
    DeleteAnyNote,
    ManageNoteEditors,
    AccessNoteAdminPage,
}

/// The acting user. Built explicitly by the caller; nothing is read from
/// ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub actor_id: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(actor_id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    /// Only note editors and admins may change rights records.
    pub fn require_rights_mutator(&self) -> Result<(), NoteError> {
        if self.has_role(ROLE_EDITOR) || self.has_role(ROLE_ADMIN) {
            Ok(())
        } else {
            Err(NoteError::Unauthorized(format!(
                "{} may not change note rights",
                self.actor_id
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), NoteError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(NoteError::Unauthorized(format!(
                "{} is not a note admin",
                self.actor_id
            )))
        }
    }
}

/// Role/access collaborator consumed by `check_can_edit`.
pub trait AccessControl: Send + Sync {
    fn actions_for(&self, principal: &Principal) -> BTreeSet<NoteAction>;

    fn has_global_edit_capability(&self, principal: &Principal) -> bool {
        self.actions_for(principal)
            .contains(&NoteAction::EditAnyNote)
    }
}

/// Read-only role → actions table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleActionTable(BTreeMap<String, Vec<NoteAction>>);

impl RoleActionTable {
    pub fn new(table: BTreeMap<String, Vec<NoteAction>>) -> Self {
        Self(table)
    }

    pub fn actions_for_role(&self, role: &str) -> &[NoteAction] {
        self.0.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RoleActionTable {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            ROLE_EDITOR.to_string(),
            vec![
                NoteAction::AccessNotesPage,
                NoteAction::EditOwnedNote,
                NoteAction::DeleteOwnedNote,
            ],
        );
        table.insert(
            ROLE_ADMIN.to_string(),
            vec![
                NoteAction::AccessNotesPage,
                NoteAction::EditOwnedNote,
                NoteAction::DeleteOwnedNote,
                NoteAction::EditAnyNote,
                NoteAction::DeleteAnyNote,
                NoteAction::ManageNoteEditors,
                NoteAction::AccessNoteAdminPage,
            ],
        );
        Self(table)
    }
}

impl AccessControl for RoleActionTable {
    fn actions_for(&self, principal: &Principal) -> BTreeSet<NoteAction> {
        principal
            .roles
            .iter()
            .flat_map(|role| self.actions_for_role(role).iter().copied())
            .collect()
    }
}
