//! File storage for Hoard.
//!
//! This module provides the filesystem side of the service:
//! - Path confinement to a user's storage root
//! - Filename sanitization
//! - Staging area for chunked uploads
//! - Chunk planning and streaming for downloads
//! - Directory listing and manipulation
//!
//! On-disk layout:
//! ```text
//! {storage_root}/
//! ├── .temp/          staging, one directory per upload session
//! └── users/
//!     └── {storage_path}/   one sandboxed tree per user
//! ```

pub mod browse;
mod sandbox;
mod sanitize;
mod slicer;
mod staging;

pub use browse::EntryInfo;
pub use sandbox::{normalize, PathSandbox, ResolvedPath};
pub use sanitize::sanitize_filename;
pub use slicer::{ChunkPlan, ChunkSlice, DownloadSlicer, SliceStream};
pub use staging::{ChunkStore, StagingEntry};

use std::path::{Path, PathBuf};

use crate::Result;

/// Name of the staging directory under the storage root.
pub const STAGING_DIR_NAME: &str = ".temp";

/// Name of the directory holding user trees under the storage root.
pub const USERS_DIR_NAME: &str = "users";

/// Maximum filename length in bytes.
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Locations under the storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    users: PathSandbox,
}

impl StorageLayout {
    /// Describe the layout under `root`. Nothing is created on disk.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let base = PathSandbox::new(root)?;
        let users = PathSandbox::new(base.root().join(USERS_DIR_NAME))?;
        Ok(Self {
            root: base.root().to_path_buf(),
            users,
        })
    }

    /// Absolute storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Staging area for upload sessions.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }

    /// Sandbox for a user's storage path.
    ///
    /// The storage path itself is confined to the users directory, so a
    /// misconfigured account cannot be rooted at the staging area or
    /// another user's parent.
    pub fn user_sandbox(&self, storage_path: &str) -> Result<PathSandbox> {
        let resolved = self.users.resolve(storage_path)?;
        if resolved.relative.is_empty() {
            return Err(crate::HoardError::Validation(
                "storage path must name a directory below the users root".to_string(),
            ));
        }
        PathSandbox::new(resolved.absolute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HoardError;

    #[test]
    fn test_layout_paths() {
        let layout = StorageLayout::new("/srv/hoard").unwrap();
        assert_eq!(layout.staging_dir(), PathBuf::from("/srv/hoard/.temp"));

        let alice = layout.user_sandbox("alice").unwrap();
        assert_eq!(alice.root(), Path::new("/srv/hoard/users/alice"));
    }

    #[test]
    fn test_user_root_is_confined() {
        let layout = StorageLayout::new("/srv/hoard").unwrap();
        assert!(matches!(
            layout.user_sandbox("../.temp"),
            Err(HoardError::SandboxViolation(_))
        ));
        assert!(matches!(
            layout.user_sandbox(""),
            Err(HoardError::Validation(_))
        ));
    }
}
