use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoteError {
    /// User-correctable shape problem (title, url fragment, content).
    #[error("validation error: {0}")]
    Validation(String),

    /// A note, summary or rights record is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The rights record is missing, so the note was deleted or never created.
    #[error("the given note does not exist: {0}")]
    PostNotFound(String),

    #[error("new note id generator is producing too many collisions ({0} attempts)")]
    TooManyCollisions(usize),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Storage and search collaborator failures, surfaced as-is.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl NoteError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) | Self::PostNotFound(_) => 404,
            Self::TooManyCollisions(_) => 500,
            Self::Conflict(_) => 409,
            Self::Unauthorized(_) => 403,
            Self::Internal(_) => 500,
        }
    }

    /// Both missing-record variants belong to the same "does not exist" class.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::PostNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_covers_every_variant() {
        assert_eq!(NoteError::validation("x").http_status(), 400);
        assert_eq!(NoteError::NotFound("x".into()).http_status(), 404);
        assert_eq!(NoteError::PostNotFound("x".into()).http_status(), 404);
        assert_eq!(NoteError::TooManyCollisions(10).http_status(), 500);
        assert_eq!(NoteError::Conflict("x".into()).http_status(), 409);
        assert_eq!(NoteError::Unauthorized("x".into()).http_status(), 403);
        assert_eq!(
            NoteError::Internal(anyhow::anyhow!("boom")).http_status(),
            500
        );
    }

    #[test]
    fn not_found_class() {
        assert!(NoteError::NotFound("n".into()).is_not_found());
        assert!(NoteError::PostNotFound("n".into()).is_not_found());
        assert!(!NoteError::validation("v").is_not_found());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            NoteError::validation("Title should not be empty").to_string(),
            "validation error: Title should not be empty"
        );
        assert_eq!(
            NoteError::PostNotFound("abc".into()).to_string(),
            "the given note does not exist: abc"
        );
        assert_eq!(
            NoteError::TooManyCollisions(3).to_string(),
            "new note id generator is producing too many collisions (3 attempts)"
        );
    }

    #[test]
    fn internal_is_transparent() {
        let err: NoteError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.to_string(), "connection reset");
    }
}
