// Filesystem implementation of the blob and row store contracts, for the CLI
// and for offline work: binaries under `<root>/blobs/`, metadata rows in one
// JSON file. Signed URLs degrade to `file://` URLs of the blob paths.

use crate::error::LabError;
use crate::photo_store::{BlobStore, NewPhotoRow, PhotoAsset, PhotoQuery, PhotoRowStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

const ROWS_FILE: &str = "test_photos.json";
const BLOBS_DIR: &str = "blobs";

pub struct LocalEvidenceBackend {
    root: PathBuf,
    rows: Mutex<Vec<PhotoAsset>>,
}

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl LocalEvidenceBackend {
    /// Open (or initialize) a backend rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, LabError> {
        fs::create_dir_all(root.join(BLOBS_DIR))?;
        let rows_path = root.join(ROWS_FILE);
        let rows = if rows_path.exists() {
            let text = fs::read_to_string(&rows_path)?;
            serde_json::from_str(&text)?
        } else {
            Vec::new()
        };
        Ok(Self {
            root: root.to_path_buf(),
            rows: Mutex::new(rows),
        })
    }

    fn blob_path(&self, storage_path: &str) -> PathBuf {
        self.root.join(BLOBS_DIR).join(storage_path)
    }

    fn persist_rows(&self, rows: &[PhotoAsset]) -> Result<(), LabError> {
        let text = serde_json::to_string_pretty(rows)?;
        fs::write(self.root.join(ROWS_FILE), text)?;
        Ok(())
    }

    fn lock_rows(&self) -> Result<std::sync::MutexGuard<'_, Vec<PhotoAsset>>, LabError> {
        self.rows
            .lock()
            .map_err(|_| LabError::internal("local store row lock poisoned"))
    }
}

impl BlobStore for LocalEvidenceBackend {
    fn upload(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<(), LabError> {
        let target = self.blob_path(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, bytes)?;
        Ok(())
    }

    fn remove(&self, paths: &[String]) -> Result<(), LabError> {
        for path in paths {
            let target = self.blob_path(path);
            if target.exists() {
                fs::remove_file(target)?;
            }
        }
        Ok(())
    }

    fn create_signed_url(&self, path: &str, _ttl_seconds: u64) -> Result<String, LabError> {
        let target = self.blob_path(path);
        if !target.exists() {
            return Err(LabError::not_found(format!("no blob at '{path}'")));
        }
        Ok(format!("file://{}", target.display()))
    }
}

impl PhotoRowStore for LocalEvidenceBackend {
    fn list(&self, query: &PhotoQuery) -> Result<Vec<PhotoAsset>, LabError> {
        let rows = self.lock_rows()?;
        Ok(rows
            .iter()
            .filter(|r| r.test_id == query.test_id)
            .filter(|r| query.day.is_none_or(|d| r.day == d))
            .filter(|r| query.kind.is_none_or(|k| r.kind == k))
            .cloned()
            .collect())
    }

    fn insert_batch(&self, new_rows: &[NewPhotoRow]) -> Result<Vec<PhotoAsset>, LabError> {
        let mut rows = self.lock_rows()?;
        let created_at = now_unix_ms();
        let inserted: Vec<PhotoAsset> = new_rows
            .iter()
            .map(|row| PhotoAsset {
                id: Uuid::new_v4().to_string(),
                test_id: row.test_id.clone(),
                day: row.day,
                kind: row.kind,
                photo_index: row.photo_index,
                storage_path: row.storage_path.clone(),
                created_at_unix_ms: created_at,
            })
            .collect();
        rows.extend(inserted.iter().cloned());
        self.persist_rows(&rows)?;
        Ok(inserted)
    }

    fn delete_by_ids(&self, ids: &[String]) -> Result<(), LabError> {
        let mut rows = self.lock_rows()?;
        rows.retain(|r| !ids.contains(&r.id));
        self.persist_rows(&rows)?;
        Ok(())
    }
}
