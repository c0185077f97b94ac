//! Account credentials for Hoard.

mod bootstrap;
mod password;

pub use bootstrap::bootstrap_admin;
pub use password::{
    hash_password, validate_password, verify_password, PasswordError, MAX_PASSWORD_LENGTH,
    MIN_PASSWORD_LENGTH,
};
