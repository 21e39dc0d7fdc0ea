//! `huachuca-core`: identifiers and the error taxonomy shared by every crate.
//!
//! This crate has no infrastructure concerns.

pub mod error;
pub mod id;

pub use error::{AuthError, AuthResult};
pub use id::{OrganizationId, SessionId, UserId};
