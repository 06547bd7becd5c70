// Namespaced blob paths for evidence photos:
// `<ownerId>/<testId>/day{7|14}_photo{n}_{timestampMs}.{ext}`.
//
// The owner and test segments are the only access-isolation guarantee at the
// storage layer, so every path is validated on write and before any
// externally supplied path is trusted.

use crate::error::LabError;
use crate::test_record::Day;
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_PHOTO_EXT: &str = "jpg";
pub const PHOTO_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
            .unwrap_or_else(|e| panic!("invalid uuid regex: {e}"))
    })
}

fn file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^day(7|14)_photo\d+_\d+\.(jpg|jpeg|png|webp)$")
            .unwrap_or_else(|e| panic!("invalid filename regex: {e}"))
    })
}

pub fn is_uuid(value: &str) -> bool {
    uuid_re().is_match(value.trim())
}

/// Build a validated storage path for one photo of a checkpoint day.
/// `index` is 1-based within the day's batch.
pub fn build_test_photo_path(
    owner_id: &str,
    test_id: &str,
    day: Day,
    index: u32,
    ext: Option<&str>,
    timestamp_ms: u64,
) -> Result<String, LabError> {
    let owner_id = owner_id.trim();
    let test_id = test_id.trim();

    if !is_uuid(owner_id) {
        return Err(LabError::invalid_input(
            "build_test_photo_path: ownerId is not a UUID",
        ));
    }
    if !is_uuid(test_id) {
        return Err(LabError::invalid_input(
            "build_test_photo_path: testId is not a UUID",
        ));
    }
    if index < 1 {
        return Err(LabError::invalid_input(
            "build_test_photo_path: index must be >= 1",
        ));
    }
    let ext = ext.unwrap_or(DEFAULT_PHOTO_EXT).to_ascii_lowercase();
    if !PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        return Err(LabError::invalid_input(format!(
            "build_test_photo_path: unsupported extension '{ext}'"
        )));
    }
    if timestamp_ms == 0 {
        return Err(LabError::invalid_input(
            "build_test_photo_path: timestamp must be positive",
        ));
    }

    let file_name = format!("day{day}_photo{index}_{timestamp_ms}.{ext}");
    let path = format!("{owner_id}/{test_id}/{file_name}");

    // The generated path must itself survive validation.
    assert_valid_test_photo_path(&path, owner_id, Some(test_id))?;
    Ok(path)
}

/// Validate a storage path against the caller's identity and, optionally, the
/// target test. Segment comparison is case-insensitive.
pub fn assert_valid_test_photo_path(
    path: &str,
    owner_id: &str,
    test_id: Option<&str>,
) -> Result<(), LabError> {
    let path = path.trim();
    let owner_id = owner_id.trim();

    if path.is_empty() {
        return Err(LabError::invalid_input("storage_path is empty"));
    }
    if path.starts_with('/') {
        return Err(LabError::invalid_input(
            "storage_path must not start with '/'",
        ));
    }
    if path.contains("..") {
        return Err(LabError::invalid_input(
            "storage_path must not contain '..'",
        ));
    }

    let parts: Vec<&str> = path.split('/').collect();
    let &[owner_segment, test_segment, file_name] = parts.as_slice() else {
        return Err(LabError::invalid_input(
            "storage_path must have 3 segments: <ownerId>/<testId>/<file>",
        ));
    };

    if !is_uuid(owner_segment) {
        return Err(LabError::invalid_input(
            "storage_path: owner segment is not a UUID",
        ));
    }
    if !is_uuid(test_segment) {
        return Err(LabError::invalid_input(
            "storage_path: test segment is not a UUID",
        ));
    }
    if !is_uuid(owner_id) {
        return Err(LabError::invalid_input(
            "assert_valid_test_photo_path: ownerId is not a UUID",
        ));
    }
    if !owner_segment.eq_ignore_ascii_case(owner_id) {
        return Err(LabError::invalid_input(
            "storage_path does not belong to the current owner",
        ));
    }

    if let Some(test_id) = test_id {
        let test_id = test_id.trim();
        if !is_uuid(test_id) {
            return Err(LabError::invalid_input(
                "assert_valid_test_photo_path: testId is not a UUID",
            ));
        }
        if !test_segment.eq_ignore_ascii_case(test_id) {
            return Err(LabError::invalid_input(
                "storage_path does not belong to the target test",
            ));
        }
    }

    if !file_re().is_match(file_name) {
        return Err(LabError::invalid_input(
            "storage_path filename does not match day{7|14}_photo{n}_{timestamp}.{ext}",
        ));
    }
    Ok(())
}

/// Cache-invalidation prefix covering one day's photos of one test.
pub fn day_prefix(owner_id: &str, test_id: &str, day: Day) -> String {
    format!("{owner_id}/{test_id}/day{day}_")
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "11111111-2222-3333-4444-555555555555";
    const TEST: &str = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";

    #[test]
    fn test_build_produces_valid_path() {
        let path = build_test_photo_path(OWNER, TEST, Day::Seven, 1, None, 1_700_000_000_000)
            .unwrap();
        assert_eq!(
            path,
            format!("{OWNER}/{TEST}/day7_photo1_1700000000000.jpg")
        );
        assert_valid_test_photo_path(&path, OWNER, Some(TEST)).unwrap();
    }

    #[test]
    fn test_build_rejects_bad_inputs() {
        assert!(build_test_photo_path("nope", TEST, Day::Seven, 1, None, 1).is_err());
        assert!(build_test_photo_path(OWNER, "nope", Day::Seven, 1, None, 1).is_err());
        assert!(build_test_photo_path(OWNER, TEST, Day::Seven, 0, None, 1).is_err());
        assert!(build_test_photo_path(OWNER, TEST, Day::Seven, 1, Some("gif"), 1).is_err());
        assert!(build_test_photo_path(OWNER, TEST, Day::Seven, 1, None, 0).is_err());
    }

    #[test]
    fn test_owner_and_test_compare_case_insensitively() {
        let path = format!(
            "{}/{}/day14_photo2_99.webp",
            OWNER.to_uppercase(),
            TEST.to_uppercase()
        );
        assert_valid_test_photo_path(&path, OWNER, Some(TEST)).unwrap();
    }

    #[test]
    fn test_foreign_owner_is_rejected() {
        let path = format!("{TEST}/{TEST}/day7_photo1_5.jpg");
        assert!(assert_valid_test_photo_path(&path, OWNER, None).is_err());
    }

    #[test]
    fn test_traversal_and_shape_attacks_are_rejected() {
        assert!(assert_valid_test_photo_path("", OWNER, None).is_err());
        assert!(assert_valid_test_photo_path("/abs/path/x.jpg", OWNER, None).is_err());
        assert!(
            assert_valid_test_photo_path(
                &format!("{OWNER}/{TEST}/../day7_photo1_5.jpg"),
                OWNER,
                Some(TEST)
            )
            .is_err()
        );
        assert!(
            assert_valid_test_photo_path(&format!("{OWNER}/day7_photo1_5.jpg"), OWNER, None)
                .is_err()
        );
        assert!(
            assert_valid_test_photo_path(
                &format!("{OWNER}/{TEST}/day9_photo1_5.jpg"),
                OWNER,
                Some(TEST)
            )
            .is_err()
        );
        assert!(
            assert_valid_test_photo_path(
                &format!("{OWNER}/{TEST}/day7_photo1_5.tiff"),
                OWNER,
                Some(TEST)
            )
            .is_err()
        );
    }

    #[test]
    fn test_day_prefix_scopes_one_day() {
        let prefix = day_prefix(OWNER, TEST, Day::Seven);
        let path = build_test_photo_path(OWNER, TEST, Day::Seven, 3, None, 77).unwrap();
        assert!(path.starts_with(&prefix));
        let other_day = build_test_photo_path(OWNER, TEST, Day::Fourteen, 3, None, 77).unwrap();
        assert!(!other_day.starts_with(&prefix));
    }
}
