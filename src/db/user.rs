//! User model for Hoard.
//!
//! Users are consumed by the storage core only for their id and their
//! storage root.

use std::fmt;
use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Role {
    /// Regular user.
    #[default]
    User = 0,
    /// Administrator.
    Admin = 1,
}

impl Role {
    /// Convert role to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Login username (unique).
    pub username: String,
    /// Password hash (Argon2).
    pub password: String,
    /// User role.
    pub role: Role,
    /// Storage directory, relative to `<storage root>/users`.
    pub storage_path: String,
    /// Account creation timestamp.
    pub created_at: String,
}

impl User {
    /// Check if this user is an administrator.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password: row.try_get("password")?,
            role: role.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: "role".to_string(),
                source: e.into(),
            })?,
            storage_path: row.try_get("storage_path")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Data for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login username.
    pub username: String,
    /// Password hash (should be pre-hashed with Argon2).
    pub password: String,
    /// User role (defaults to User).
    pub role: Role,
    /// Storage directory. Defaults to the username.
    pub storage_path: String,
}

impl NewUser {
    /// Create a new user whose storage directory is named after the username.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            storage_path: username.clone(),
            username,
            password: password.into(),
            role: Role::User,
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Set the storage directory.
    pub fn with_storage_path(mut self, storage_path: impl Into<String>) -> Self {
        self.storage_path = storage_path.into();
        self
    }
}
