//! Library marker written at `<library>/_library.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current on-disk format version of a library.
pub const LIBRARY_FORMAT_VERSION: u32 = 1;

/// Contents of the library marker file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryMeta {
    /// Library (namespace) name.
    pub name: String,
    /// When the library was (re)created.
    pub created_at: DateTime<Utc>,
    /// Layout version the library was created with.
    pub format_version: u32,
}

impl LibraryMeta {
    /// Marker for a library created now.
    pub fn new(name: impl Into<String>) -> Self {
        LibraryMeta {
            name: name.into(),
            created_at: Utc::now(),
            format_version: LIBRARY_FORMAT_VERSION,
        }
    }
}
