//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `Session`, `Role`, `CredentialPair`: who is logged in and with what
//! - `SessionStore`: login/signup/logout lifecycle and access-token renewal
//!
//! The store moves between two states, `LoggedOut` and `LoggedIn`. Only a
//! successful login or signup leaves `LoggedOut`; logout or a rejected
//! refresh token returns to it.

pub mod session;
pub mod store;

pub use session::{CredentialPair, Feature, Role, Session, SessionStatus};
pub use store::{AccessGrant, SessionStore};
