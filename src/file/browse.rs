//! Directory operations inside a user's storage root.
//!
//! Every path goes through the caller's [`PathSandbox`], including the
//! parents of newly created entries.

use std::io::ErrorKind;

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::info;

use super::sandbox::{PathSandbox, ResolvedPath};
use super::sanitize::sanitize_filename;
use crate::{HoardError, Result};

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Entry name.
    pub name: String,
    /// Path relative to the storage root.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, when the platform reports one.
    pub modified: Option<DateTime<Utc>>,
}

/// List a directory: directories first, then files, each sorted by name.
///
/// In-progress merge outputs are hidden.
pub async fn list_dir(sandbox: &PathSandbox, requested: &str) -> Result<Vec<EntryInfo>> {
    let dir = resolve_checked(sandbox, requested).await?;

    let metadata = fs::metadata(&dir.absolute)
        .await
        .map_err(|e| not_found_or_io(e, &dir))?;
    if !metadata.is_dir() {
        return Err(HoardError::Validation(format!(
            "{} is not a directory",
            dir.relative
        )));
    }

    let mut reader = fs::read_dir(&dir.absolute).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_merge_partial(&name) {
            continue;
        }
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            // Removed between read_dir and stat.
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        let is_directory = metadata.is_dir();
        entries.push(EntryInfo {
            path: join_relative(&dir.relative, &name),
            name,
            is_directory,
            size: if is_directory { 0 } else { metadata.len() },
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(entries)
}

/// Create directory `name` under `parent`, creating missing parents.
pub async fn make_dir(sandbox: &PathSandbox, parent: &str, name: &str) -> Result<ResolvedPath> {
    let name = sanitize_filename(name)?;
    let dir = resolve_checked(sandbox, &join_relative(parent, &name)).await?;

    if fs::symlink_metadata(&dir.absolute).await.is_ok() {
        return Err(HoardError::Conflict(dir.relative));
    }

    fs::create_dir_all(&dir.absolute).await?;
    info!(path = %dir.relative, "Created directory");
    Ok(dir)
}

/// Delete a file, or a directory with everything below it.
///
/// The storage root itself cannot be deleted.
pub async fn delete_path(sandbox: &PathSandbox, requested: &str) -> Result<()> {
    let target = resolve_checked(sandbox, requested).await?;
    if target.relative.is_empty() {
        return Err(HoardError::Forbidden(
            "cannot delete the storage root".to_string(),
        ));
    }

    let metadata = fs::symlink_metadata(&target.absolute)
        .await
        .map_err(|e| not_found_or_io(e, &target))?;
    if metadata.is_dir() {
        fs::remove_dir_all(&target.absolute).await?;
    } else {
        fs::remove_file(&target.absolute).await?;
    }

    info!(path = %target.relative, "Deleted");
    Ok(())
}

/// Rename an entry in place. `new_name` is a bare name, not a path.
pub async fn rename_path(
    sandbox: &PathSandbox,
    requested: &str,
    new_name: &str,
) -> Result<ResolvedPath> {
    let source = resolve_checked(sandbox, requested).await?;
    if source.relative.is_empty() {
        return Err(HoardError::Forbidden(
            "cannot rename the storage root".to_string(),
        ));
    }

    let new_name = sanitize_filename(new_name)?;
    let parent = source
        .relative
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .unwrap_or("");
    let target = resolve_checked(sandbox, &join_relative(parent, &new_name)).await?;

    fs::symlink_metadata(&source.absolute)
        .await
        .map_err(|e| not_found_or_io(e, &source))?;
    if fs::symlink_metadata(&target.absolute).await.is_ok() {
        return Err(HoardError::Conflict(target.relative));
    }

    fs::rename(&source.absolute, &target.absolute).await?;
    info!(from = %source.relative, to = %target.relative, "Renamed");
    Ok(target)
}

async fn resolve_checked(sandbox: &PathSandbox, requested: &str) -> Result<ResolvedPath> {
    let resolved = sandbox.resolve(requested)?;
    sandbox.verify_links(&resolved.absolute).await?;
    Ok(resolved)
}

fn join_relative(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn is_merge_partial(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".partial")
}

fn not_found_or_io(e: std::io::Error, path: &ResolvedPath) -> HoardError {
    if e.kind() == ErrorKind::NotFound {
        HoardError::NotFound(format!("path /{}", path.relative))
    } else {
        e.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathSandbox) {
        let temp = TempDir::new().unwrap();
        let sandbox = PathSandbox::new(temp.path()).unwrap();
        (temp, sandbox)
    }

    #[tokio::test]
    async fn test_list_orders_directories_first() {
        let (temp, sandbox) = setup();
        std::fs::write(temp.path().join("b.txt"), b"12345").unwrap();
        std::fs::write(temp.path().join("a.txt"), b"1").unwrap();
        std::fs::create_dir(temp.path().join("zdir")).unwrap();
        std::fs::write(temp.path().join(".c.txt.abc.partial"), b"").unwrap();

        let entries = list_dir(&sandbox, "/").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zdir", "a.txt", "b.txt"]);
        assert!(entries[0].is_directory);
        assert_eq!(entries[2].size, 5);
        assert_eq!(entries[2].path, "b.txt");
    }

    #[tokio::test]
    async fn test_list_missing_and_file() {
        let (temp, sandbox) = setup();
        std::fs::write(temp.path().join("f"), b"").unwrap();

        assert!(matches!(
            list_dir(&sandbox, "nope").await,
            Err(HoardError::NotFound(_))
        ));
        assert!(matches!(
            list_dir(&sandbox, "f").await,
            Err(HoardError::Validation(_))
        ));
        assert!(matches!(
            list_dir(&sandbox, "../").await,
            Err(HoardError::SandboxViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_make_dir() {
        let (temp, sandbox) = setup();
        let created = make_dir(&sandbox, "docs", "2024").await.unwrap();
        assert_eq!(created.relative, "docs/2024");
        assert!(temp.path().join("docs/2024").is_dir());

        assert!(matches!(
            make_dir(&sandbox, "docs", "2024").await,
            Err(HoardError::Conflict(_))
        ));
        // The name cannot smuggle a path.
        let created = make_dir(&sandbox, "", "../escape").await.unwrap();
        assert_eq!(created.relative, "escape");
        assert!(matches!(
            make_dir(&sandbox, "..", "x").await,
            Err(HoardError::SandboxViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let (temp, sandbox) = setup();
        std::fs::create_dir_all(temp.path().join("d/e")).unwrap();
        std::fs::write(temp.path().join("d/e/f.txt"), b"x").unwrap();
        std::fs::write(temp.path().join("g.txt"), b"x").unwrap();

        delete_path(&sandbox, "g.txt").await.unwrap();
        delete_path(&sandbox, "d").await.unwrap();
        assert!(!temp.path().join("g.txt").exists());
        assert!(!temp.path().join("d").exists());

        assert!(matches!(
            delete_path(&sandbox, "g.txt").await,
            Err(HoardError::NotFound(_))
        ));
        assert!(matches!(
            delete_path(&sandbox, "/").await,
            Err(HoardError::Forbidden(_))
        ));
        assert!(temp.path().exists());
    }

    #[tokio::test]
    async fn test_rename() {
        let (temp, sandbox) = setup();
        std::fs::create_dir(temp.path().join("d")).unwrap();
        std::fs::write(temp.path().join("d/old.txt"), b"x").unwrap();
        std::fs::write(temp.path().join("d/taken.txt"), b"y").unwrap();

        let renamed = rename_path(&sandbox, "d/old.txt", "new.txt").await.unwrap();
        assert_eq!(renamed.relative, "d/new.txt");
        assert!(temp.path().join("d/new.txt").exists());

        assert!(matches!(
            rename_path(&sandbox, "d/new.txt", "taken.txt").await,
            Err(HoardError::Conflict(_))
        ));
        assert!(matches!(
            rename_path(&sandbox, "d/missing", "x").await,
            Err(HoardError::NotFound(_))
        ));
        // Separators in the new name are stripped, keeping it in place.
        let renamed = rename_path(&sandbox, "d/new.txt", "../../out.txt")
            .await
            .unwrap();
        assert_eq!(renamed.relative, "d/out.txt");
    }
}
