//! Free-text notes attached to areas, reservoirs and crop batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, find_by_id};
use crate::error::{DomainError, DomainResult};
use crate::id::NoteId;

/// A note owned by an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Note {
    type Id = NoteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Validate note content: trimmed and non-empty.
pub fn validate_note(content: &str) -> DomainResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("note cannot be empty"));
    }
    Ok(trimmed.to_string())
}

/// Fails with `NotFound` when `id` is not among `notes`.
pub fn ensure_note_exists(notes: &[Note], id: NoteId) -> DomainResult<()> {
    find_by_id(notes, &id)
        .map(|_| ())
        .ok_or_else(DomainError::not_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_notes_are_rejected() {
        assert!(validate_note("  \n").is_err());
        assert_eq!(validate_note(" water early ").unwrap(), "water early");
    }

    #[test]
    fn missing_note_is_not_found() {
        let note = Note {
            id: NoteId::new(),
            content: "mulch".into(),
            created_at: Utc::now(),
        };
        assert!(ensure_note_exists(std::slice::from_ref(&note), note.id).is_ok());
        assert_eq!(
            ensure_note_exists(&[note], NoteId::new()),
            Err(DomainError::NotFound)
        );
    }
}
