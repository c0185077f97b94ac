//! Hoard - self-hosted multi-user file storage.
//!
//! Files move over HTTP in fixed-size chunks: uploads are staged per
//! session and merged on completion, downloads are served slice by slice.
//! Every path a user names is confined to that user's storage root.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod upload;
pub mod web;

pub use auth::{bootstrap_admin, hash_password, verify_password, PasswordError};
pub use config::Config;
pub use db::{Database, NewUser, Role, User, UserRepository};
pub use error::{HoardError, Result};
