//! Stored-recording bookkeeping.
//!
//! Uploads are persisted as `<uuid>_<sanitized-name>` under a storage
//! directory injected at construction; the uuid half is the public
//! identifier handed back to clients.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recording present in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecording {
    pub file_id: String,
    pub file_name: String,
    pub size: u64,
    pub last_modified: String,
}

/// Filesystem-backed store mapping opaque identifiers to recording files
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist an upload and return its identifier and path.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> io::Result<(String, PathBuf)> {
        let file_id = Uuid::new_v4().to_string();
        let saved_name = format!("{}_{}", file_id, sanitize_filename(original_name));
        let path = self.root.join(saved_name);
        tokio::fs::write(&path, bytes).await?;
        Ok((file_id, path))
    }

    /// Map an identifier to its stored file, or None if no match exists.
    pub fn resolve(&self, file_id: &str) -> Option<PathBuf> {
        if file_id.is_empty() || !file_id.chars().all(|c| c.is_alphanumeric() || c == '-') {
            return None;
        }

        let pattern = self.root.join(format!("{}_*", file_id));
        glob::glob(pattern.to_str()?)
            .ok()?
            .filter_map(|entry| entry.ok())
            .find(|path| path.is_file())
    }

    /// Remove a stored file, e.g. after a failed open-validation.
    pub async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    /// List every stored recording, newest first.
    pub fn list(&self) -> io::Result<Vec<StoredRecording>> {
        let mut recordings = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let stored_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            let (file_id, file_name) = match stored_name.split_once('_') {
                Some(parts) => parts,
                None => continue,
            };

            let metadata = entry.metadata()?;
            let last_modified = metadata
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
                .unwrap_or_else(|| Utc::now().to_rfc3339());

            recordings.push(StoredRecording {
                file_id: file_id.to_string(),
                file_name: file_name.to_string(),
                size: metadata.len(),
                last_modified,
            });
        }

        recordings.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(recordings)
    }
}

fn sanitize_filename(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
        .take(100)
        .collect();
    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_resolve() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();

        let (file_id, path) = store.save("rest.edf", b"data").await.unwrap();
        assert!(path.exists());
        assert_eq!(store.resolve(&file_id), Some(path));
    }

    #[tokio::test]
    async fn test_resolve_unknown_id() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.resolve("no-such-id"), None);
    }

    #[tokio::test]
    async fn test_resolve_rejects_traversal_tokens() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.resolve("../etc/passwd"), None);
        assert_eq!(store.resolve(""), None);
        assert_eq!(store.resolve("a/b"), None);
    }

    #[tokio::test]
    async fn test_filename_sanitized() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();

        let (file_id, path) = store.save("../../evil name!.edf", b"data").await.unwrap();
        let stored = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(stored, format!("{}_....evilname.edf", file_id));
        assert!(store.resolve(&file_id).is_some());
    }

    #[tokio::test]
    async fn test_list() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();

        store.save("a.edf", b"aa").await.unwrap();
        store.save("b.csv", b"bbb").await.unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        let names: Vec<_> = listed.iter().map(|r| r.file_name.as_str()).collect();
        assert!(names.contains(&"a.edf"));
        assert!(names.contains(&"b.csv"));
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();

        let (file_id, path) = store.save("gone.edf", b"x").await.unwrap();
        store.remove(&path).await.unwrap();
        assert_eq!(store.resolve(&file_id), None);
    }
}
