// FILE: src/thumbnail.rs
//! Thumbnail collaborator: `generate(path, type) -> image bytes`.
//!
//! Rasterizing previews belongs to an external service. The server only
//! depends on the `ThumbnailGenerator` trait; `FileThumbnailer` is the
//! built-in fallback that needs no image codecs.

use crate::error::{CloudError, Result};
use crate::identity::{extension_of, FileType};
use async_trait::async_trait;
use std::path::Path;

pub const THUMBNAIL_SIZE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    async fn generate(&self, path: &Path, file_type: FileType) -> Result<Thumbnail>;
}

/// Serves images as-is and draws a tinted SVG tile for everything else.
#[derive(Debug, Clone, Default)]
pub struct FileThumbnailer {
    /// Images larger than this get the placeholder instead of their bytes.
    pub max_passthrough_bytes: Option<u64>,
}

impl FileThumbnailer {
    pub fn new() -> Self {
        Self { max_passthrough_bytes: Some(16 * 1024 * 1024) }
    }

    async fn image_bytes(&self, path: &Path) -> Result<Thumbnail> {
        let content_type = image_mime(&extension_of(path))
            .ok_or_else(|| CloudError::Thumbnail(format!("unsupported image type: {}", path.display())))?;

        if let Some(limit) = self.max_passthrough_bytes {
            let size = tokio::fs::metadata(path).await?.len();
            if size > limit {
                return Err(CloudError::Thumbnail(format!("{} is {} bytes, over the {} byte limit", path.display(), size, limit)));
            }
        }

        let bytes = tokio::fs::read(path).await?;
        Ok(Thumbnail { bytes, content_type })
    }
}

#[async_trait]
impl ThumbnailGenerator for FileThumbnailer {
    async fn generate(&self, path: &Path, file_type: FileType) -> Result<Thumbnail> {
        if file_type == FileType::Image {
            match self.image_bytes(path).await {
                Ok(thumb) => return Ok(thumb),
                Err(e) => {
                    tracing::debug!("[Thumbnail] Falling back to placeholder for {}: {}", path.display(), e);
                }
            }
        }
        Ok(placeholder(file_type))
    }
}

fn image_mime(extension: &str) -> Option<&'static str> {
    let mime = match extension {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".bmp" => "image/bmp",
        ".svg" => "image/svg+xml",
        ".ico" => "image/x-icon",
        _ => return None,
    };
    Some(mime)
}

fn tint(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Image => "#3a6ea5",
        FileType::Video => "#a53a5e",
        FileType::Text => "#4f8a3a",
        FileType::Binary => "#282828",
    }
}

/// Square SVG tile labelled with the file type.
pub fn placeholder(file_type: FileType) -> Thumbnail {
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"#,
            r#"<rect width="100%" height="100%" fill="{fill}"/>"#,
            r##"<text x="50%" y="50%" fill="#ffffff" font-family="sans-serif" font-size="32" text-anchor="middle" dominant-baseline="middle">{label}</text>"##,
            "</svg>"
        ),
        size = THUMBNAIL_SIZE,
        fill = tint(file_type),
        label = file_type.as_str(),
    );
    Thumbnail { bytes: svg.into_bytes(), content_type: "image/svg+xml" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_image_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, b"\x89PNG fake").unwrap();

        let thumb = FileThumbnailer::new().generate(&path, FileType::Image).await.unwrap();
        assert_eq!(thumb.content_type, "image/png");
        assert_eq!(thumb.bytes, b"\x89PNG fake");
    }

    #[tokio::test]
    async fn test_missing_image_falls_back_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.jpg");

        let thumb = FileThumbnailer::new().generate(&path, FileType::Image).await.unwrap();
        assert_eq!(thumb.content_type, "image/svg+xml");
    }

    #[tokio::test]
    async fn test_oversized_image_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.gif");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let thumbnailer = FileThumbnailer { max_passthrough_bytes: Some(10) };
        let thumb = thumbnailer.generate(&path, FileType::Image).await.unwrap();
        assert_eq!(thumb.content_type, "image/svg+xml");
    }

    #[tokio::test]
    async fn test_non_images_get_placeholder() {
        let thumb = FileThumbnailer::new()
            .generate(Path::new("/does/not/matter.txt"), FileType::Text)
            .await
            .unwrap();
        let svg = String::from_utf8(thumb.bytes).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(">text<"));
        assert!(svg.contains("#4f8a3a"));
    }
}
