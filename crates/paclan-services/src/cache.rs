//! Package cache lookups.
//!
//! The cache directory is pacman's own download cache, /var/cache/pacman/pkg
//! by default. This daemon never writes to it; pacman fills it as a side
//! effect of normal upgrades, and whatever is present gets served to peers
//! as-is. Request paths are resolved strictly inside the root so a peer
//! cannot name anything outside the cache.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::File;

/// Read-only view of the local package directory.
#[derive(Clone)]
pub struct PackageCache {
    root: PathBuf,
}

impl PackageCache {
    /// Create a cache view rooted at the given directory.
    ///
    /// The directory is not created. A missing root means every lookup
    /// misses, which is exactly what a host that never downloaded a
    /// package looks like.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path to a location under the root.
    ///
    /// Leading slashes are stripped and `.` components skipped. Anything
    /// that would step outside the root (`..`, absolute components) makes
    /// the whole path unresolvable.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(request_path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if resolved == self.root {
            return None;
        }
        Some(resolved)
    }

    /// Whether the request path names a cached file.
    pub fn exists(&self, request_path: &str) -> bool {
        self.resolve(request_path)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Open a cached file for streaming, returning it with its length.
    ///
    /// `Ok(None)` is a miss. An error means the file is there but could
    /// not be read, which callers surface instead of masking as a miss.
    pub async fn open(&self, request_path: &str) -> Result<Option<(File, u64)>> {
        let Some(path) = self.resolve(request_path) else {
            return Ok(None);
        };
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                return Ok(None)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to open {}", path.display()))
            }
        };
        let meta = file
            .metadata()
            .await
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if !meta.is_file() {
            return Ok(None);
        }
        Ok(Some((file, meta.len())))
    }
}
