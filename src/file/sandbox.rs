//! Path confinement for user storage roots.
//!
//! Every filesystem-touching operation resolves user input through a
//! [`PathSandbox`] first. Resolution is lexical (`.` and `..` are collapsed
//! without touching the disk); [`PathSandbox::verify_links`] adds the
//! on-disk check that no existing ancestor is a symlink leading out of the
//! root.

use std::env;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::{HoardError, Result};

/// A path resolved inside a sandbox root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Absolute path on disk.
    pub absolute: PathBuf,
    /// Path relative to the root, `/`-separated. Empty for the root itself.
    pub relative: String,
}

/// Confines paths to a single root directory.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// Create a sandbox rooted at `root`.
    ///
    /// Relative roots are made absolute against the current directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            env::current_dir()?.join(root)
        };
        Ok(Self {
            root: normalize(&absolute),
        })
    }

    /// The absolute, normalized root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a user-supplied path against the root.
    ///
    /// Leading separators are ignored, so `/docs` and `docs` name the same
    /// directory. Any `..` that climbs above the root is a
    /// [`HoardError::SandboxViolation`].
    pub fn resolve(&self, requested: &str) -> Result<ResolvedPath> {
        if requested.contains('\0') {
            return Err(HoardError::Validation("path contains a null byte".to_string()));
        }

        let mut parts: Vec<&str> = Vec::new();
        for component in Path::new(requested).components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(self.violation(requested));
                    }
                }
                Component::Normal(part) => match part.to_str() {
                    Some(part) => parts.push(part),
                    None => {
                        return Err(HoardError::Validation("path is not valid UTF-8".to_string()))
                    }
                },
            }
        }

        let mut absolute = self.root.clone();
        absolute.extend(parts.iter());

        if !self.contains(&absolute) {
            return Err(self.violation(requested));
        }

        Ok(ResolvedPath {
            absolute,
            relative: parts.join("/"),
        })
    }

    /// Lexical containment: `path` equals the root or lies below it.
    ///
    /// Comparison is per component, so a root of `/data/alice` does not
    /// contain `/data/alice-evil`.
    pub fn contains(&self, path: &Path) -> bool {
        normalize(path).starts_with(&self.root)
    }

    /// Check that the deepest existing ancestor of `path` still resolves,
    /// through any symlinks, to a location inside the root.
    ///
    /// Paths whose root does not exist yet trivially pass.
    pub async fn verify_links(&self, path: &Path) -> Result<()> {
        if !self.contains(path) {
            return Err(self.violation(&path.to_string_lossy()));
        }

        let canonical_root = match tokio::fs::canonicalize(&self.root).await {
            Ok(root) => root,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut candidate = normalize(path);
        loop {
            match tokio::fs::canonicalize(&candidate).await {
                Ok(resolved) => {
                    if resolved.starts_with(&canonical_root) {
                        return Ok(());
                    }
                    return Err(self.violation(&path.to_string_lossy()));
                }
                Err(_) if candidate != self.root => {
                    if !candidate.pop() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn violation(&self, requested: &str) -> HoardError {
        warn!(root = %self.root.display(), path = requested, "Path escapes storage root");
        HoardError::SandboxViolation(requested.to_string())
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
///
/// `..` at the top of an absolute path stays at the root, matching how the
/// kernel resolves `/..`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.is_absolute() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
