use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tania_core::{
    Aggregate, AggregateId, AggregateRoot, AggregateType, DomainError, typed_aggregate_id,
};
use tania_events::impl_domain_event;

typed_aggregate_id!(
    /// User identifier.
    UserId
);

pub const USER_REGISTERED: &str = "user.user.registered";
pub const USER_PASSWORD_CHANGED: &str = "user.user.password_changed";

/// Usernames are 3 to 32 characters of `[A-Za-z0-9_.-]`.
pub fn validate_username(username: &str) -> Result<String, DomainError> {
    let username = username.trim();
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(DomainError::validation(
            "username must be between 3 and 32 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(DomainError::validation(
            "username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(username.to_string())
}

fn validate_digest(digest: &str) -> Result<(), DomainError> {
    if digest.trim().is_empty() {
        return Err(DomainError::validation("credential digest cannot be empty"));
    }
    Ok(())
}

/// Aggregate root: User.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    username: String,
    credential_digest: String,
    registered_at: Option<DateTime<Utc>>,
    password_changed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl User {
    pub fn id_typed(&self) -> UserId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn password_changed_at(&self) -> Option<DateTime<Utc>> {
        self.password_changed_at
    }

    /// Compare against a digest computed by the authentication layer.
    pub fn credential_matches(&self, digest: &str) -> bool {
        self.created && self.credential_digest == digest
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterUser.
///
/// `username_taken` is decided by the caller from the replayed user log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUser {
    pub username: String,
    pub credential_digest: String,
    pub username_taken: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePassword {
    pub current_digest: String,
    pub new_digest: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCommand {
    Register(RegisterUser),
    ChangePassword(ChangePassword),
}

/// Event: UserRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub user_id: UserId,
    pub username: String,
    pub credential_digest: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChanged {
    pub credential_digest: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    Registered(UserRegistered),
    PasswordChanged(PasswordChanged),
}

impl_domain_event!(UserEvent {
    Registered(UserRegistered) => USER_REGISTERED,
    PasswordChanged(PasswordChanged) => USER_PASSWORD_CHANGED,
});

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    const TYPE: AggregateType = AggregateType::User;

    fn initial(id: AggregateId) -> Self {
        Self {
            id: UserId::new(id),
            username: String::new(),
            credential_digest: String::new(),
            registered_at: None,
            password_changed_at: None,
            version: 0,
            created: false,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Registered(e) => {
                self.id = e.user_id;
                self.username = e.username.clone();
                self.credential_digest = e.credential_digest.clone();
                self.registered_at = Some(e.occurred_at);
                self.created = true;
            }
            UserEvent::PasswordChanged(e) => {
                self.credential_digest = e.credential_digest.clone();
                self.password_changed_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Register(cmd) => self.handle_register(cmd),
            UserCommand::ChangePassword(cmd) => self.handle_change_password(cmd),
        }
    }
}

impl User {
    fn handle_register(&self, cmd: &RegisterUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        let username = validate_username(&cmd.username)?;
        if cmd.username_taken {
            return Err(DomainError::validation(format!(
                "username '{username}' is already taken"
            )));
        }
        validate_digest(&cmd.credential_digest)?;

        Ok(vec![UserEvent::Registered(UserRegistered {
            user_id: self.id,
            username,
            credential_digest: cmd.credential_digest.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_password(
        &self,
        cmd: &ChangePassword,
    ) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.credential_matches(&cmd.current_digest) {
            return Err(DomainError::validation("current password does not match"));
        }
        validate_digest(&cmd.new_digest)?;
        if cmd.new_digest == self.credential_digest {
            return Err(DomainError::validation(
                "new password must differ from the current one",
            ));
        }

        Ok(vec![UserEvent::PasswordChanged(PasswordChanged {
            credential_digest: cmd.new_digest.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn register_cmd(username: &str) -> RegisterUser {
        RegisterUser {
            username: username.into(),
            credential_digest: "sha256:aaaa".into(),
            username_taken: false,
            occurred_at: test_time(),
        }
    }

    fn registered_user() -> User {
        let mut user = User::initial(AggregateId::new());
        let events = user
            .handle(&UserCommand::Register(register_cmd("farmer.joe")))
            .unwrap();
        user.apply(&events[0]);
        user
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
        assert!(validate_username("joe smith").is_err());
        assert_eq!(validate_username(" farmer_joe-1.2 ").unwrap(), "farmer_joe-1.2");
    }

    #[test]
    fn register_rejects_taken_username() {
        let user = User::initial(AggregateId::new());
        let mut cmd = register_cmd("farmer.joe");
        cmd.username_taken = true;
        let err = user.handle(&UserCommand::Register(cmd)).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("already taken") => {}
            _ => panic!("Expected Validation error for taken username"),
        }
    }

    #[test]
    fn change_password_requires_current_digest() {
        let user = registered_user();
        let err = user
            .handle(&UserCommand::ChangePassword(ChangePassword {
                current_digest: "sha256:wrong".into(),
                new_digest: "sha256:bbbb".into(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn change_password_rotates_digest() {
        let mut user = registered_user();
        let events = user
            .handle(&UserCommand::ChangePassword(ChangePassword {
                current_digest: "sha256:aaaa".into(),
                new_digest: "sha256:bbbb".into(),
                occurred_at: test_time(),
            }))
            .unwrap();
        user.apply(&events[0]);

        assert!(user.credential_matches("sha256:bbbb"));
        assert!(!user.credential_matches("sha256:aaaa"));
        assert_eq!(user.version(), 2);
        assert_eq!(user.password_changed_at(), Some(test_time()));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: every name drawn from the allowed alphabet and length is accepted.
            #[test]
            fn allowed_usernames_are_accepted(name in "[A-Za-z0-9_.-]{3,32}") {
                prop_assert_eq!(validate_username(&name).unwrap(), name);
            }
        }
    }
}
