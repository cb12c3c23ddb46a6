//! Relative layout helpers for a store root.
//!
//! This module centralizes all *relative* path conventions:
//! - library namespace directory and its marker file (`<library>/_library.json`)
//! - per-key directory (`<library>/<encoded key>/`)
//! - transaction log directory / commit file naming (`_series_log/`)
//! - segment data directory (`data/`)
//!
//! Key-level helpers return paths relative to a *key root*; library-level
//! helpers return paths relative to the *store root*. Callers join them with a
//! [`crate::storage::StorageLocation`] before doing IO.

use std::path::PathBuf;

// ====================
// Library layout
// ====================

/// Name of the marker file written at the root of every library.
pub const LIBRARY_MARKER_FILE_NAME: &str = "_library.json";

/// Relative path: `<library>/`
pub fn library_rel_dir(library: &str) -> PathBuf {
    PathBuf::from(library)
}

/// Relative path: `<library>/_library.json`
pub fn library_marker_rel_path(library: &str) -> PathBuf {
    library_rel_dir(library).join(LIBRARY_MARKER_FILE_NAME)
}

/// Relative path: `<library>/<encoded key>/`
pub fn key_rel_dir(library: &str, key: &str) -> PathBuf {
    library_rel_dir(library).join(encode_key(key))
}

// ====================
// Data layout
// ====================

/// Directory (under a key root) where segment files are stored.
pub const DATA_DIR_NAME: &str = "data";

/// Relative path: `data/`
pub fn data_rel_dir() -> PathBuf {
    PathBuf::from(DATA_DIR_NAME)
}

/// Relative path: `data/<segment_id>.parquet`
pub fn segment_rel_path(segment_id: &str) -> PathBuf {
    data_rel_dir().join(format!("{segment_id}.parquet"))
}

// ====================
// Transaction log layout
// ====================

/// Name of the subdirectory containing the commit log.
pub const LOG_DIR_NAME: &str = "_series_log";

/// Name of the file that stores the current version pointer.
pub const CURRENT_FILE_NAME: &str = "CURRENT";

/// Number of digits used in zero-padded commit file names.
pub const COMMIT_FILENAME_DIGITS: usize = 10;

/// Relative path: `_series_log/`
pub fn log_rel_dir() -> PathBuf {
    PathBuf::from(LOG_DIR_NAME)
}

/// Relative path: `_series_log/CURRENT`
pub fn current_rel_path() -> PathBuf {
    log_rel_dir().join(CURRENT_FILE_NAME)
}

/// Relative path: `_series_log/<zero-padded>.json`
pub fn commit_rel_path(version: u64) -> PathBuf {
    let file_name = format!("{:0width$}.json", version, width = COMMIT_FILENAME_DIGITS);
    log_rel_dir().join(file_name)
}

// ====================
// Key encoding
// ====================

fn is_plain_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'-'
}

/// Encode an arbitrary key into a single path component.
///
/// ASCII alphanumerics, `.` and `-` are kept; every other byte (including `_`)
/// becomes `_XX` with uppercase hex. A leading `.` is escaped as well so no
/// key maps to `.`/`..` or a hidden entry.
pub fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, b) in key.bytes().enumerate() {
        if is_plain_key_byte(b) && !(i == 0 && b == b'.') {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{b:02X}"));
        }
    }
    out
}

/// Inverse of [`encode_key`]. Returns `None` for names that no key encodes
/// to (for example, stray directories created by other tools).
pub fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'_' {
            let hex = encoded.get(i + 1..i + 3)?;
            // Only the canonical uppercase form round-trips.
            if !hex.bytes().all(|c| c.is_ascii_digit() || (b'A'..=b'F').contains(&c)) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else if is_plain_key_byte(b) && !(i == 0 && b == b'.') {
            out.push(b);
            i += 1;
        } else {
            return None;
        }
    }
    if out.is_empty() {
        return None;
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn commit_paths_are_zero_padded() {
        assert_eq!(
            commit_rel_path(3),
            Path::new("_series_log").join("0000000003.json")
        );
        assert_eq!(current_rel_path(), Path::new("_series_log/CURRENT"));
    }

    #[test]
    fn key_and_segment_paths() {
        assert_eq!(
            key_rel_dir("research", "prod.fx.ebs.tick.EURUSD"),
            Path::new("research/prod.fx.ebs.tick.EURUSD")
        );
        assert_eq!(
            segment_rel_path("seg-ab12"),
            Path::new("data/seg-ab12.parquet")
        );
        assert_eq!(
            library_marker_rel_path("research"),
            Path::new("research/_library.json")
        );
    }

    #[test]
    fn encode_escapes_unsafe_bytes() {
        assert_eq!(encode_key("a.b-C9"), "a.b-C9");
        assert_eq!(encode_key("a/b"), "a_2Fb");
        assert_eq!(encode_key("under_score"), "under_5Fscore");
        assert_eq!(encode_key(".hidden"), "_2Ehidden");
        assert_eq!(encode_key(".."), "_2E.");
        assert_eq!(encode_key("é"), "_C3_A9");
    }

    #[test]
    fn decode_inverts_encode() {
        for key in [
            "prod.fx.ebs.tick.EURUSD",
            "a/b c",
            "_leading",
            ".",
            "..",
            "日本/株",
            "x%y?z=1&w",
        ] {
            assert_eq!(decode_key(&encode_key(key)).as_deref(), Some(key));
        }
    }

    #[test]
    fn decode_rejects_foreign_names() {
        assert_eq!(decode_key(""), None);
        assert_eq!(decode_key(".git"), None);
        assert_eq!(decode_key("a_Z1"), None);
        assert_eq!(decode_key("a_4"), None);
        assert_eq!(decode_key("a b"), None);
    }
}
