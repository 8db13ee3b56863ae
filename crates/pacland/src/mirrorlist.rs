//! mirrorlist — points pacman at the local paclan proxy.
//!
//! Prepends `Server = http://localhost:<port>` to the mirrorlist so pacman
//! tries the shared cache before any real mirror. Running it again is a
//! no-op once the line is present.

use std::path::Path;

use anyhow::{Context, Result};

fn preferred_line(port: u16) -> String {
    format!("Server = http://localhost:{port}")
}

/// Ensures the mirrorlist starts with the local proxy entry. Returns
/// whether the file was changed.
pub fn ensure_preferred(path: &Path, port: u16) -> Result<bool> {
    let current = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read mirrorlist {}", path.display()))?;

    let line = preferred_line(port);
    // TODO: tolerate whitespace variants ("Server=http://...") when checking.
    if current.lines().any(|l| l == line) {
        return Ok(false);
    }

    let today = chrono::Local::now().format("%Y-%m-%d");
    let mut updated = format!("# added by paclan on {today}\n{line}\n");
    updated.push_str(&current);
    std::fs::write(path, updated)
        .with_context(|| format!("failed to write mirrorlist {}", path.display()))?;
    Ok(true)
}

// ── Tests ──────────────────────────────────────────────────────────────
