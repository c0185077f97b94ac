//! SQLite-backed session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::session::{MarkOutcome, NewUploadSession, UploadSession};
use super::store::SessionStore;
use crate::db::DbPool;
use crate::{HoardError, Result};

const SESSION_COLUMNS: &str = "id, user_id, filename, total_size, total_chunks, uploaded_chunks,
     temp_path, target_path, created_at";

#[derive(FromRow)]
struct SessionRow {
    id: String,
    user_id: i64,
    filename: String,
    total_size: i64,
    total_chunks: i64,
    uploaded_chunks: i64,
    temp_path: String,
    target_path: String,
    created_at: i64,
}

impl TryFrom<SessionRow> for UploadSession {
    type Error = HoardError;

    fn try_from(row: SessionRow) -> Result<Self> {
        let created_at = DateTime::from_timestamp(row.created_at, 0).ok_or_else(|| {
            HoardError::Database(format!("invalid created_at for session {}", row.id))
        })?;
        Ok(Self {
            owner_id: row.user_id,
            filename: row.filename,
            total_size: to_unsigned(row.total_size, "total_size")?,
            total_chunks: to_unsigned(row.total_chunks, "total_chunks")?,
            uploaded_chunks: to_unsigned(row.uploaded_chunks, "uploaded_chunks")?,
            temp_path: row.temp_path.into(),
            target_path: row.target_path.into(),
            created_at,
            id: row.id,
        })
    }
}

fn to_unsigned<T: TryFrom<i64>>(value: i64, column: &str) -> Result<T> {
    T::try_from(value).map_err(|_| HoardError::Database(format!("{column} out of range: {value}")))
}

fn to_signed(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| HoardError::Validation(format!("{field} too large")))
}

/// Session store persisted in the `upload_sessions` and `upload_chunks`
/// tables.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: DbPool,
}

impl SqliteSessionStore {
    /// Create a store over the given pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: &NewUploadSession) -> Result<UploadSession> {
        sqlx::query(
            "INSERT INTO upload_sessions
                (id, user_id, filename, total_size, total_chunks, uploaded_chunks,
                 temp_path, target_path, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(session.owner_id)
        .bind(&session.filename)
        .bind(to_signed(session.total_size, "totalSize")?)
        .bind(i64::from(session.total_chunks))
        .bind(session.temp_path.to_string_lossy().into_owned())
        .bind(session.target_path.to_string_lossy().into_owned())
        .bind(session.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                HoardError::Conflict(format!("upload session {}", session.id))
            }
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                HoardError::NotFound(format!("user {}", session.owner_id))
            }
            e => HoardError::Database(e.to_string()),
        })?;

        Ok(UploadSession::from(session.clone()))
    }

    async fn get(&self, id: &str) -> Result<Option<UploadSession>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM upload_sessions WHERE id = ?");
        let row = sqlx::query_as::<_, SessionRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UploadSession::try_from).transpose()
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<UploadSession>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM upload_sessions
             WHERE user_id = ? ORDER BY created_at DESC, id"
        );
        let rows = sqlx::query_as::<_, SessionRow>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(UploadSession::try_from).collect()
    }

    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadSession>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM upload_sessions
             WHERE created_at <= ? ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, SessionRow>(&query)
            .bind(cutoff.timestamp())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(UploadSession::try_from).collect()
    }

    async fn mark_received(&self, id: &str, index: u32) -> Result<MarkOutcome> {
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction takes the write lock up front.
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO upload_chunks (session_id, chunk_index, received_at)
             SELECT id, ?, ? FROM upload_sessions WHERE id = ? AND ? < total_chunks",
        )
        .bind(i64::from(index))
        .bind(Utc::now().timestamp())
        .bind(id)
        .bind(i64::from(index))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let total: Option<i64> =
                sqlx::query_scalar("SELECT total_chunks FROM upload_sessions WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            match total {
                None => return Err(HoardError::NotFound("upload session".to_string())),
                Some(total) if i64::from(index) >= total => {
                    return Err(HoardError::OutOfRange {
                        index: u64::from(index),
                        total: total as u64,
                    })
                }
                Some(_) => {}
            }
        }

        let uploaded: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM upload_chunks WHERE session_id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query("UPDATE upload_sessions SET uploaded_chunks = ? WHERE id = ?")
            .bind(uploaded)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(MarkOutcome {
            newly_received: inserted == 1,
            uploaded: to_unsigned(uploaded, "uploaded_chunks")?,
        })
    }

    async fn received_indices(&self, id: &str) -> Result<Vec<u32>> {
        let indices: Vec<i64> = sqlx::query_scalar(
            "SELECT chunk_index FROM upload_chunks WHERE session_id = ? ORDER BY chunk_index",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        indices
            .into_iter()
            .map(|i| to_unsigned(i, "chunk_index"))
            .collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM upload_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
