//! User domain module (event-sourced).
//!
//! Account registration and credential rotation. Credentials are opaque digests
//! produced by the authentication layer; this crate never sees a plain password.

pub mod user;

pub use user::{
    ChangePassword, PasswordChanged, RegisterUser, User, UserCommand, UserEvent, UserId,
    UserRegistered, validate_username,
};
