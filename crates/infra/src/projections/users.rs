//! Users projection for account read models.
//!
//! Credential digests never reach the read side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tania_core::AggregateType;
use tania_events::{EventRecord, ProjectionError, Projector, RowChange};
use tania_user::{UserEvent, UserId};

use super::{decode, missing_row};

/// User read model for queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: UserId,
    pub username: String,
    pub registered_at: DateTime<Utc>,
    pub password_changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UserProjector;

impl Projector<UserRow> for UserProjector {
    fn sources(&self) -> &[AggregateType] {
        &[AggregateType::User]
    }

    fn project(
        &self,
        current: Option<&UserRow>,
        record: &EventRecord,
    ) -> Result<RowChange<UserRow>, ProjectionError> {
        match decode::<UserEvent>(record)? {
            UserEvent::Registered(e) => Ok(RowChange::Upsert(UserRow {
                user_id: e.user_id,
                username: e.username,
                registered_at: e.occurred_at,
                password_changed_at: None,
            })),
            UserEvent::PasswordChanged(e) => {
                let mut row = current.cloned().ok_or_else(|| missing_row(record))?;
                row.password_changed_at = Some(e.occurred_at);
                Ok(RowChange::Upsert(row))
            }
        }
    }
}
