//! Chunked uploads for Hoard.
//!
//! This module provides:
//! - Upload session records and their storage seam
//! - SQLite and in-memory session stores
//! - The session registry (create, destroy, garbage collection)
//! - The coordinator that drives init, chunk, complete and cancel

mod coordinator;
mod memory;
mod registry;
mod repository;
mod session;
mod store;

pub use coordinator::{
    ChunkProgress, CompletedUpload, InitUpload, UploadCoordinator, UploadStatus, UserScope,
};
pub use memory::MemorySessionStore;
pub use registry::{SessionDraft, UploadSessionRegistry};
pub use repository::SqliteSessionStore;
pub use session::{missing_indices, MarkOutcome, NewUploadSession, UploadSession};
pub use store::SessionStore;
