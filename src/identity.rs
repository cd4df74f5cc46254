// FILE: src/identity.rs
//! Identity: stable file fingerprints and extension-based classification.
//!
//! Both functions are pure. The indexer calls `identify` on discovery, and
//! again on deletion where only the path survives, so the two must agree.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Component, Path};

/// Hex characters kept from the SHA-256 digest (64 bits).
pub const ID_LEN: usize = 16;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg", ".ico"];

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".avi", ".mkv", ".flv", ".wmv"];

const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".json", ".xml", ".csv", ".log",
    // Source files render as text previews
    ".js", ".ts", ".jsx", ".tsx", ".py", ".html", ".css",
];

/// Deterministic identifier derived from an absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Coarse content class, decided by extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Text,
    #[default]
    Binary,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Text => "text",
            FileType::Binary => "binary",
        }
    }
}

/// SHA-256 of the path, truncated to `ID_LEN` hex characters.
pub fn identify(absolute_path: &Path) -> FileId {
    identify_str(&absolute_path.to_string_lossy())
}

pub fn identify_str(absolute_path: &str) -> FileId {
    let digest = Sha256::digest(absolute_path.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(ID_LEN);
    FileId(id)
}

/// Classify an extension such as `.PNG`, `png` or `.txt`.
pub fn classify(extension: &str) -> FileType {
    let lower = extension.to_lowercase();
    let ext = if lower.starts_with('.') { lower } else { format!(".{}", lower) };

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        FileType::Image
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        FileType::Video
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        FileType::Text
    } else {
        FileType::Binary
    }
}

/// Lower-cased extension including the leading dot, or "" when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// True when any segment below `root` starts with a dot.
/// Paths outside `root` are checked segment by segment in full.
pub fn is_hidden(path: &Path, root: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[test]
    fn test_identify_is_deterministic() {
        let path = Path::new("/srv/media/holiday/beach.png");
        assert_eq!(identify(path), identify(path));
        assert_eq!(identify(path).as_str().len(), ID_LEN);
    }

    #[test]
    fn test_identify_matches_reference_digest() {
        let id = identify_str("/tmp/a.txt");
        let full = hex::encode(Sha256::digest(b"/tmp/a.txt"));
        assert_eq!(id.as_str(), &full[..ID_LEN]);
    }

    #[test]
    fn test_identify_distinct_paths_do_not_collide() {
        let mut seen = HashSet::new();
        for dir in 0..50 {
            for file in 0..200 {
                let path = PathBuf::from(format!("/data/dir{}/file{}.bin", dir, file));
                assert!(seen.insert(identify(&path)), "collision at {}", path.display());
            }
        }
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn test_classify_tables() {
        for ext in IMAGE_EXTENSIONS {
            assert_eq!(classify(ext), FileType::Image, "{}", ext);
        }
        for ext in VIDEO_EXTENSIONS {
            assert_eq!(classify(ext), FileType::Video, "{}", ext);
        }
        for ext in TEXT_EXTENSIONS {
            assert_eq!(classify(ext), FileType::Text, "{}", ext);
        }
    }

    #[test]
    fn test_classify_unknown_is_binary() {
        assert_eq!(classify(".xyz123"), FileType::Binary);
        assert_eq!(classify(""), FileType::Binary);
        assert_eq!(classify(".exe"), FileType::Binary);
    }

    #[test]
    fn test_classify_is_case_and_dot_insensitive() {
        assert_eq!(classify(".PNG"), FileType::Image);
        assert_eq!(classify("mp4"), FileType::Video);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("/a/b/Photo.JPG")), ".jpg");
        assert_eq!(extension_of(Path::new("/a/b/Makefile")), "");
        assert_eq!(extension_of(Path::new("/a/b/archive.tar.gz")), ".gz");
    }

    #[test]
    fn test_is_hidden() {
        let root = Path::new("/root/dir");
        assert!(is_hidden(Path::new("/root/dir/.git/config"), root));
        assert!(is_hidden(Path::new("/root/dir/src/.env"), root));
        assert!(!is_hidden(Path::new("/root/dir/src/main.rs"), root));
        // A dotted root itself is not a hidden segment
        assert!(!is_hidden(Path::new("/home/.cache/x/a.txt"), Path::new("/home/.cache")));
    }
}
