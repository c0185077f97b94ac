//! Database schema and migrations for Hoard.
//!
//! Migrations are applied in order; the schema_version table records how
//! many have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: users
    r#"
CREATE TABLE users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE,
    password      TEXT NOT NULL,           -- Argon2 hash
    role          TEXT NOT NULL DEFAULT 'user' CHECK(role IN ('admin', 'user')),
    storage_path  TEXT NOT NULL,           -- relative to <storage root>/users
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_users_username ON users(username);
"#,
    // v2: upload sessions and the per-session set of received chunk indices
    r#"
CREATE TABLE upload_sessions (
    id               TEXT PRIMARY KEY,
    user_id          INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    filename         TEXT NOT NULL,
    total_size       INTEGER NOT NULL,
    total_chunks     INTEGER NOT NULL,
    uploaded_chunks  INTEGER NOT NULL DEFAULT 0,
    temp_path        TEXT NOT NULL,
    target_path      TEXT NOT NULL,
    created_at       INTEGER NOT NULL   -- unix seconds
);

CREATE INDEX idx_upload_sessions_user ON upload_sessions(user_id);
CREATE INDEX idx_upload_sessions_created_at ON upload_sessions(created_at);

CREATE TABLE upload_chunks (
    session_id   TEXT NOT NULL REFERENCES upload_sessions(id) ON DELETE CASCADE,
    chunk_index  INTEGER NOT NULL,
    received_at  INTEGER NOT NULL,
    PRIMARY KEY (session_id, chunk_index)
);
"#,
];
