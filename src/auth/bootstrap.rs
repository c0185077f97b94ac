//! First administrator account.

use tracing::info;

use super::{hash_password, validate_password};
use crate::db::{Database, NewUser, Role, User, UserRepository};
use crate::{HoardError, Result};

/// Create the administrator account if the database has no users yet.
///
/// Returns the created user, or `None` when users already exist or no
/// password is configured.
pub async fn bootstrap_admin(db: &Database, username: &str, password: &str) -> Result<Option<User>> {
    if password.is_empty() {
        return Ok(None);
    }

    let repo = UserRepository::new(db.pool());
    if repo.count().await? > 0 {
        return Ok(None);
    }

    validate_password(password).map_err(|e| HoardError::Config(format!("admin password: {e}")))?;
    let hash = hash_password(password).map_err(|e| HoardError::Auth(e.to_string()))?;

    let user = repo
        .create(&NewUser::new(username, hash).with_role(Role::Admin))
        .await?;
    info!(user_id = user.id, username = %user.username, "Created administrator account");
    Ok(Some(user))
}
