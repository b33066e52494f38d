//! File and directory records.
//!
//! Both the structured API and the scrape fallback normalize into
//! [`FileRecord`], so everything downstream of the source layer is agnostic to
//! where a listing came from.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Kind of a repository entry.
///
/// The wire boundary is case-insensitive (`"dir"`, `"Dir"`, `"directory"` all
/// parse as [`EntryKind::Dir`]); anything unrecognized parses as a file, which
/// matches how the sources report plain blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    /// Parse a source-provided type string, normalizing case.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "dir" | "directory" => EntryKind::Dir,
            _ => EntryKind::File,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "dir",
        }
    }
}

impl Serialize for EntryKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntryKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EntryKind::parse(&raw))
    }
}

/// A single file or directory entry in a repository listing.
///
/// Invariant: directories carry an empty `url`; files carry the raw-content
/// URL whenever the source provided one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    /// Repository-relative path, slash-separated, no leading slash.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Raw-content URL; empty for directories.
    #[serde(default)]
    pub url: String,
    /// Size in bytes, 0 if the source did not report one.
    #[serde(default)]
    pub size: u64,
    /// Content hash when the API provided one, empty when scraped.
    #[serde(default)]
    pub sha: String,
}

impl FileRecord {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// File extension, empty for directories and extensionless names.
    pub fn extension(&self) -> &str {
        if self.is_dir() {
            return "";
        }
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            _ => "",
        }
    }
}

/// Sort a listing into the contract order: directories before files, then
/// case-insensitive alphabetical within each group.
///
/// Downstream index-based selection depends on this order being stable across
/// repeated calls, so both producers apply it before returning.
pub fn sort_listing(records: &mut [FileRecord]) {
    records.sort_by(|a, b| {
        let rank = |r: &FileRecord| if r.is_dir() { 0u8 } else { 1u8 };
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}
