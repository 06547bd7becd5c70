// Durable persistence of evidence photos: blob binaries plus one metadata
// row per photo. The relational and blob stores themselves are external
// collaborators, consumed through the two narrow traits below and injected
// into the store (no ambient global client).

use crate::error::LabError;
use crate::signed_url_cache::{DEFAULT_TTL_SECONDS, SignedUrlCache};
use crate::storage_path::{assert_valid_test_photo_path, build_test_photo_path, day_prefix, is_uuid};
use crate::test_record::Day;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoKind {
    /// One of the per-day captures (raw or annotated).
    Single,
    /// Secondary mosaic composite consumed by the media browsing surface.
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoAsset {
    pub id: String,
    pub test_id: String,
    pub day: Day,
    pub kind: PhotoKind,
    pub photo_index: Option<u32>,
    pub storage_path: String,
    pub created_at_unix_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPhotoRow {
    pub test_id: String,
    pub day: Day,
    pub kind: PhotoKind,
    pub photo_index: Option<u32>,
    pub storage_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct PhotoQuery {
    pub test_id: String,
    pub day: Option<Day>,
    pub kind: Option<PhotoKind>,
}

/// Blob store contract: upload/remove by path plus signed retrieval URLs.
pub trait BlobStore: Send + Sync {
    fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), LabError>;
    fn remove(&self, paths: &[String]) -> Result<(), LabError>;
    fn create_signed_url(&self, path: &str, ttl_seconds: u64) -> Result<String, LabError>;
}

/// Relational store contract for photo metadata rows.
pub trait PhotoRowStore: Send + Sync {
    fn list(&self, query: &PhotoQuery) -> Result<Vec<PhotoAsset>, LabError>;
    fn insert_batch(&self, rows: &[NewPhotoRow]) -> Result<Vec<PhotoAsset>, LabError>;
    fn delete_by_ids(&self, ids: &[String]) -> Result<(), LabError>;
}

/// A photo handed to `replace_day_photos`: either freshly captured bytes or
/// a reference to an already stored asset. A day's set must be wholly new to
/// be replaced; mixing the two shapes is rejected.
#[derive(Debug, Clone)]
pub enum DayPhoto {
    Captured(Vec<u8>),
    Stored { storage_path: String },
}

impl DayPhoto {
    fn is_captured(&self) -> bool {
        matches!(self, DayPhoto::Captured(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceOutcome {
    pub uploaded: usize,
}

/// Newest merged mosaic per checkpoint day for one test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergedMedia {
    pub day7: Option<PhotoAsset>,
    pub day14: Option<PhotoAsset>,
}

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct EvidenceStore {
    blobs: Arc<dyn BlobStore>,
    rows: Arc<dyn PhotoRowStore>,
    cache: SignedUrlCache,
    owner_id: String,
}

impl EvidenceStore {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        rows: Arc<dyn PhotoRowStore>,
        owner_id: &str,
    ) -> Result<Self, LabError> {
        if !is_uuid(owner_id) {
            return Err(LabError::invalid_input(
                "EvidenceStore: ownerId is not a UUID",
            ));
        }
        Ok(Self {
            blobs,
            rows,
            cache: SignedUrlCache::new(),
            owner_id: owner_id.trim().to_string(),
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn cache(&self) -> &SignedUrlCache {
        &self.cache
    }

    /// All `single` captures of a test, both days, in capture order.
    pub fn test_photos(&self, test_id: &str) -> Result<Vec<PhotoAsset>, LabError> {
        let mut photos = self.rows.list(&PhotoQuery {
            test_id: test_id.to_string(),
            day: None,
            kind: Some(PhotoKind::Single),
        })?;
        photos.sort_by_key(|p| (p.day, p.photo_index.unwrap_or(u32::MAX), p.created_at_unix_ms));
        Ok(photos)
    }

    /// One day's active `single` set, ordered by photo index with creation
    /// time as tie-breaker (older rows predate photo_index).
    pub fn single_photos_for_day(&self, test_id: &str, day: Day) -> Result<Vec<PhotoAsset>, LabError> {
        let mut photos = self.rows.list(&PhotoQuery {
            test_id: test_id.to_string(),
            day: Some(day),
            kind: Some(PhotoKind::Single),
        })?;
        photos.sort_by_key(|p| (p.photo_index.unwrap_or(u32::MAX), p.created_at_unix_ms));
        Ok(photos)
    }

    /// Replace one day's photo set with freshly captured rasters.
    ///
    /// The ordering is the correctness argument for never losing evidence:
    /// upload all new binaries, commit all new rows in one batch, and only
    /// then delete the old rows and binaries. A failure before the commit
    /// cleans up its own uploads and leaves the previous set fully intact; a
    /// failure after the commit is logged and swallowed (stale orphans are
    /// acceptable, data loss is not).
    pub fn replace_day_photos(
        &self,
        test_id: &str,
        day: Day,
        photos: &[DayPhoto],
    ) -> Result<ReplaceOutcome, LabError> {
        let test_id = test_id.trim();
        if !is_uuid(test_id) {
            return Err(LabError::invalid_input(
                "replace_day_photos: testId is not a UUID",
            ));
        }

        let captured_count = photos.iter().filter(|p| p.is_captured()).count();
        if captured_count == 0 {
            // Nothing freshly captured; leave the stored set untouched.
            return Ok(ReplaceOutcome { uploaded: 0 });
        }
        if captured_count != photos.len() {
            return Err(LabError::invalid_input(
                "replace_day_photos: mixed stored and freshly captured photos; recapture the whole day to replace it",
            ));
        }

        // Candidates for deletion, read up front but not touched until the
        // new batch is fully committed.
        let old_rows = self.rows.list(&PhotoQuery {
            test_id: test_id.to_string(),
            day: Some(day),
            kind: Some(PhotoKind::Single),
        })?;

        let mut uploaded_paths: Vec<String> = Vec::with_capacity(photos.len());
        let result = self.upload_and_commit(test_id, day, photos, &mut uploaded_paths);

        let inserted = match result {
            Ok(rows) => rows,
            Err(err) => {
                // Roll back our own uploads; the old set is still intact.
                if !uploaded_paths.is_empty() {
                    if let Err(cleanup_err) = self.blobs.remove(&uploaded_paths) {
                        warn!(
                            error = %cleanup_err,
                            "replace_day_photos: cleanup of partial uploads failed"
                        );
                    }
                }
                return Err(err);
            }
        };

        // Point of no return passed: the new batch is committed. Deletion of
        // the old assets is best effort.
        if !old_rows.is_empty() {
            let old_ids: Vec<String> = old_rows.iter().map(|r| r.id.clone()).collect();
            if let Err(err) = self.rows.delete_by_ids(&old_ids) {
                warn!(error = %err, "replace_day_photos: stale metadata rows left behind");
            }
            // An old path can collide with a new one when two batches land in
            // the same millisecond; never remove a blob we just wrote.
            let old_paths: Vec<String> = old_rows
                .iter()
                .map(|r| r.storage_path.clone())
                .filter(|p| !p.is_empty() && !uploaded_paths.contains(p))
                .collect();
            if !old_paths.is_empty() {
                if let Err(err) = self.blobs.remove(&old_paths) {
                    warn!(error = %err, "replace_day_photos: stale blobs left behind");
                }
            }
        }

        self.cache
            .clear(Some(&day_prefix(&self.owner_id, test_id, day)));

        Ok(ReplaceOutcome {
            uploaded: inserted.len(),
        })
    }

    fn upload_and_commit(
        &self,
        test_id: &str,
        day: Day,
        photos: &[DayPhoto],
        uploaded_paths: &mut Vec<String>,
    ) -> Result<Vec<PhotoAsset>, LabError> {
        let timestamp_ms = now_unix_ms();
        for (i, photo) in photos.iter().enumerate() {
            let DayPhoto::Captured(bytes) = photo else {
                return Err(LabError::internal("replace_day_photos: non-captured photo after mix check"));
            };
            let path = build_test_photo_path(
                &self.owner_id,
                test_id,
                day,
                (i + 1) as u32,
                None,
                timestamp_ms,
            )?;
            assert_valid_test_photo_path(&path, &self.owner_id, Some(test_id))?;
            self.blobs.upload(&path, bytes, "image/jpeg")?;
            uploaded_paths.push(path);
        }

        let new_rows: Vec<NewPhotoRow> = uploaded_paths
            .iter()
            .enumerate()
            .map(|(i, path)| NewPhotoRow {
                test_id: test_id.to_string(),
                day,
                kind: PhotoKind::Single,
                photo_index: Some((i + 1) as u32),
                storage_path: path.clone(),
            })
            .collect();
        self.rows.insert_batch(&new_rows)
    }

    /// Signed URLs for a list of paths, cache first, aligned with the input.
    /// A failed URL creation is "no URL available", never fatal.
    pub fn signed_urls_for_paths(
        &self,
        paths: &[String],
        ttl_seconds: Option<u64>,
    ) -> Vec<Option<String>> {
        let ttl = ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);

        let mut resolved: HashMap<&str, Option<String>> = HashMap::new();
        for path in paths.iter().filter(|p| !p.is_empty()).unique() {
            let url = match self.cache.get(path) {
                Some(url) => Some(url),
                None => match self.blobs.create_signed_url(path, ttl) {
                    Ok(url) => {
                        self.cache.set(path, &url, ttl);
                        Some(url)
                    }
                    Err(err) => {
                        warn!(path = %path, error = %err, "createSignedUrl failed");
                        None
                    }
                },
            };
            resolved.insert(path.as_str(), url);
        }

        paths
            .iter()
            .map(|p| resolved.get(p.as_str()).cloned().flatten())
            .collect()
    }

    /// Newest `merged` mosaic per `(test, day)` for a set of tests.
    pub fn latest_merged(
        &self,
        test_ids: &[String],
    ) -> Result<HashMap<String, MergedMedia>, LabError> {
        let mut out: HashMap<String, MergedMedia> = HashMap::new();
        for test_id in test_ids.iter().unique() {
            let photos = self.rows.list(&PhotoQuery {
                test_id: test_id.clone(),
                day: None,
                kind: Some(PhotoKind::Merged),
            })?;
            let media = out.entry(test_id.clone()).or_default();
            for photo in photos {
                let slot = match photo.day {
                    Day::Seven => &mut media.day7,
                    Day::Fourteen => &mut media.day14,
                };
                let newer = slot
                    .as_ref()
                    .is_none_or(|held| photo.created_at_unix_ms > held.created_at_unix_ms);
                if newer {
                    *slot = Some(photo);
                }
            }
        }
        Ok(out)
    }
}
