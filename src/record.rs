// FILE: src/record.rs
use crate::error::{CloudError, Result};
use crate::identity::{classify, extension_of, identify, FileId, FileType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::Path;

/// A point in scene space. Serialized as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn length(&self) -> f64 {
        self.distance_to(&Self::ORIGIN)
    }
}

impl From<[f64; 3]> for Position {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Position> for [f64; 3] {
    fn from(p: Position) -> Self {
        [p.x, p.y, p.z]
    }
}

/// One indexed file, as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: FileId,
    pub name: String,
    pub absolute_path: String,
    pub size: u64,
    pub extension: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl FileRecord {
    /// Stat `path` and build an unpositioned record. Contents are never read.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(CloudError::InvalidPath(format!("not a regular file: {}", path.display())));
        }
        Ok(Self::from_metadata(path, &metadata))
    }

    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let extension = extension_of(path);
        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Self {
            id: identify(path),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            absolute_path: path.to_string_lossy().into_owned(),
            size: metadata.len(),
            file_type: classify(&extension),
            extension,
            created_at,
            position: None,
        }
    }
}

impl std::fmt::Display for FileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (id: {}, size: {})", self.absolute_path, self.id, self.size)
    }
}

#[cfg(test)]
pub(crate) fn test_record(path: &str, size: u64) -> FileRecord {
    let path = Path::new(path);
    let extension = extension_of(path);
    FileRecord {
        id: identify(path),
        name: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        absolute_path: path.to_string_lossy().into_owned(),
        size,
        file_type: classify(&extension),
        extension,
        created_at: Utc::now(),
        position: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Notes.TXT");
        std::fs::write(&path, vec![b'a'; 500]).unwrap();

        let record = FileRecord::from_path(&path).unwrap();
        assert_eq!(record.name, "Notes.TXT");
        assert_eq!(record.extension, ".txt");
        assert_eq!(record.file_type, FileType::Text);
        assert_eq!(record.size, 500);
        assert_eq!(record.id, identify(&path));
        assert!(record.position.is_none());
    }

    #[test]
    fn test_from_path_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(FileRecord::from_path(dir.path()), Err(CloudError::InvalidPath(_))));
    }

    #[test]
    fn test_from_path_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.bin");
        assert!(matches!(FileRecord::from_path(&missing), Err(CloudError::Io(_))));
    }

    #[test]
    fn test_serialized_shape() {
        let mut record = test_record("/data/b.png", 2_000_000);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["absolutePath"], "/data/b.png");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("position").is_none());

        record.position = Some(Position::new(1.0, 2.0, 3.0));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["position"], serde_json::json!([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_distance() {
        let a = Position::new(1.0, 2.0, 2.0);
        assert_eq!(a.length(), 3.0);
        assert_eq!(a.distance_to(&a), 0.0);
    }
}
