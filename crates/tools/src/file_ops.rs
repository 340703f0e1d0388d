//! File operation tools — safe file I/O constrained to a sandbox root.
//!
//! Every function takes the root as a parameter; requested paths must be
//! relative, must not contain `..` components, and must resolve inside
//! the root after canonicalization.
//!
//! All functions return `Result<Value, String>`; the error string goes
//! straight back to the model.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct FileReadRequest {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileWriteRequest {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileListRequest {
    #[serde(default = "default_dot")]
    pub path: String,
}

fn default_dot() -> String {
    ".".into()
}

#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub modified: String,
    pub is_dir: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolve a requested path against the tools root.
///
/// Only plain relative paths are accepted — no leading `/`, no drive
/// prefix, no `..` — so the lexical join can never leave the root on its
/// own. What the join cannot rule out is a symlink already inside the
/// tree pointing elsewhere; the deepest existing ancestor of the target
/// is therefore resolved through the filesystem and must land inside the
/// resolved root before the not-yet-existing remainder is re-attached.
pub fn resolve_in_root(root: &Path, requested: &str) -> Result<PathBuf, String> {
    let rel = Path::new(requested);
    let plain = rel
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        return Err(format!(
            "'{requested}' is not allowed: paths must be relative to the tools root and free of '..'"
        ));
    }

    let root = root
        .canonicalize()
        .map_err(|e| format!("tools root '{}' is not usable: {e}", root.display()))?;
    let target = root.join(rel);

    let anchor = target
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or(root.as_path());
    let resolved_anchor = anchor
        .canonicalize()
        .map_err(|e| format!("cannot resolve '{requested}': {e}"))?;
    if !resolved_anchor.starts_with(&root) {
        return Err(format!("'{requested}' points outside the tools root"));
    }

    let remainder = target.strip_prefix(anchor).unwrap_or(Path::new(""));
    Ok(resolved_anchor.join(remainder))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool implementations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn file_read(root: &Path, req: FileReadRequest) -> Result<Value, String> {
    let path = resolve_in_root(root, &req.path)?;

    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| format!("failed to read '{}': {e}", req.path))?;

    Ok(serde_json::json!({
        "path": req.path,
        "content": content,
    }))
}

pub async fn file_write(root: &Path, req: FileWriteRequest) -> Result<Value, String> {
    let path = resolve_in_root(root, &req.path)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("failed to create parent directory: {e}"))?;
    }

    fs::write(&path, req.content.as_bytes())
        .await
        .map_err(|e| format!("failed to write '{}': {e}", req.path))?;

    Ok(serde_json::json!({
        "path": req.path,
        "bytes_written": req.content.len(),
        "success": true,
    }))
}

pub async fn file_list(root: &Path, req: FileListRequest) -> Result<Value, String> {
    let path = resolve_in_root(root, &req.path)?;

    let mut read_dir = fs::read_dir(&path)
        .await
        .map_err(|e| format!("failed to read directory '{}': {e}", req.path))?;

    let mut entries: Vec<DirEntry> = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| format!("failed to read directory entry: {e}"))?
    {
        let metadata = entry
            .metadata()
            .await
            .map_err(|e| format!("failed to read metadata: {e}"))?;

        let modified = metadata
            .modified()
            .ok()
            .map(|t| {
                let dt: DateTime<Utc> = t.into();
                dt.to_rfc3339()
            })
            .unwrap_or_default();

        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            size: metadata.len(),
            modified,
            is_dir: metadata.is_dir(),
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(serde_json::json!({
        "path": req.path,
        "entries": entries,
        "count": entries.len(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn traversal_and_absolute_paths_are_refused() {
        let root = TempDir::new().unwrap();
        for bad in ["../etc/passwd", "a/../../b", "/etc/passwd"] {
            let err = resolve_in_root(root.path(), bad).unwrap_err();
            assert!(err.contains("not allowed"), "{bad}: {err}");
        }
    }

    #[test]
    fn missing_tail_resolves_under_existing_ancestor() {
        let root = TempDir::new().unwrap();
        let resolved = resolve_in_root(root.path(), "deep/nested/new.txt").unwrap();
        assert!(resolved.starts_with(root.path().canonicalize().unwrap()));
        assert!(resolved.ends_with("deep/nested/new.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_refused() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("exit")).unwrap();

        let err = resolve_in_root(root.path(), "exit/secret.txt").unwrap_err();
        assert!(err.contains("outside the tools root"), "{err}");
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let root = TempDir::new().unwrap();

        file_write(
            root.path(),
            FileWriteRequest { path: "notes/todo.txt".into(), content: "ship it".into() },
        )
        .await
        .unwrap();

        let result = file_read(root.path(), FileReadRequest { path: "notes/todo.txt".into() })
            .await
            .unwrap();
        assert_eq!(result["content"], "ship it");
    }

    #[tokio::test]
    async fn list_returns_sorted_entries() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("b.txt"), "b").unwrap();
        std::fs::write(root.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(root.path().join("dir")).unwrap();

        let result = file_list(root.path(), FileListRequest { path: ".".into() })
            .await
            .unwrap();
        assert_eq!(result["count"], 3);
        let names: Vec<&str> = result["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "dir"]);
    }

    #[tokio::test]
    async fn read_missing_file_errors_in_band() {
        let root = TempDir::new().unwrap();
        let err = file_read(root.path(), FileReadRequest { path: "ghost.txt".into() })
            .await
            .unwrap_err();
        assert!(err.contains("failed to read"));
    }
}
