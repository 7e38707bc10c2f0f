use chrono::{DateTime, Utc};
use tracing::info;

use tania_core::AggregateType;
use tania_user::{ChangePassword, RegisterUser, User, UserCommand, UserEvent, UserId};

use super::{CommandError, committed_row};
use crate::projections::UserRow;
use crate::read_model::ReadStore;
use crate::repository::Repository;

/// Account registration and credential rotation.
#[derive(Debug, Clone)]
pub struct UserService {
    repository: Repository,
    users: ReadStore<UserRow>,
}

impl UserService {
    pub fn new(repository: Repository, users: ReadStore<UserRow>) -> Self {
        Self { repository, users }
    }

    pub fn register_user(
        &self,
        username: &str,
        credential_digest: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<UserRow, CommandError> {
        let cmd = RegisterUser {
            username: username.to_string(),
            credential_digest: credential_digest.to_string(),
            username_taken: self.username_taken(username.trim())?,
            occurred_at,
        };
        let id = UserId::generate().aggregate_id();
        let done = self.repository.create::<User>(id, &UserCommand::Register(cmd))?;
        committed_row(&self.users, id, &done.report)
    }

    pub fn change_password(&self, user_id: UserId, cmd: ChangePassword) -> Result<UserRow, CommandError> {
        let id = user_id.aggregate_id();
        let done = self
            .repository
            .execute::<User>(id, &UserCommand::ChangePassword(cmd))?;
        committed_row(&self.users, id, &done.report)
    }

    /// Register the startup account unless a user already holds its name; `None`
    /// when nothing was registered. Safe to call on every start.
    pub fn ensure_default_user(
        &self,
        username: &str,
        credential_digest: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<UserRow>, CommandError> {
        let username = username.trim();
        if self.username_taken(username)? {
            info!(username, "default user already registered");
            return Ok(None);
        }
        let row = self.register_user(username, credential_digest, occurred_at)?;
        info!(username, user_id = %row.user_id, "registered default user");
        Ok(Some(row))
    }

    /// Checked against the user log, never the view.
    fn username_taken(&self, username: &str) -> Result<bool, CommandError> {
        let records = self
            .repository
            .store()
            .all_events(AggregateType::User)
            .map_err(|e| CommandError::Storage(e.to_string()))?;

        for record in &records {
            let event: UserEvent = record
                .decode()
                .map_err(|e| CommandError::Corrupt(e.to_string()))?;
            match event {
                UserEvent::Registered(registered) if registered.username == username => {
                    return Ok(true);
                }
                _ => {}
            }
        }
        Ok(false)
    }

    pub fn user(&self, user_id: UserId) -> Result<UserRow, CommandError> {
        Ok(self.users.find(user_id.aggregate_id())?)
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<UserRow>, CommandError> {
        Ok(self
            .users
            .find_by(|u| u.username == username)?
            .into_iter()
            .next())
    }
}
