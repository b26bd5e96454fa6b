//! Types for the format catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A file format, identified by its normalized extension.
///
/// Normalization trims whitespace, strips leading dots and lowercases, so
/// `".MP4"`, `"mp4"` and `" .mp4"` all name the same format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Format(String);

impl Format {
    /// Creates a format from an extension-like string.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize(raw.as_ref()))
    }

    /// Derives the format of a file from its extension.
    ///
    /// Returns `None` when the path has no (UTF-8) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::new)
            .filter(|f| !f.is_empty())
    }

    /// Returns the normalized extension.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether normalization left nothing behind.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Format {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Format {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.0
    }
}

impl AsRef<str> for Format {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Format {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Format {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// A broad family of formats sharing one responsible engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Video,
    Audio,
    Image,
    Document,
    Ebook,
    Archive,
}

impl Category {
    /// All categories in catalog order.
    pub const ALL: [Category; 6] = [
        Category::Video,
        Category::Audio,
        Category::Image,
        Category::Document,
        Category::Ebook,
        Category::Archive,
    ];

    /// Returns the lowercase name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Document => "document",
            Self::Ebook => "ebook",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of engine responsible for conversions within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Audio/video transcoder (ffmpeg).
    Transcode,
    /// Raster image converter (ImageMagick).
    Raster,
    /// Document and ebook converter (pandoc, LibreOffice).
    Document,
    /// Archive repacker. No built-in adapter.
    Archive,
}

impl EngineKind {
    /// Returns the lowercase name of this engine kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcode => "transcode",
            Self::Raster => "raster",
            Self::Document => "document",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_normalization() {
        assert_eq!(Format::new(".MP4"), Format::new("mp4"));
        assert_eq!(Format::new("  .Docx "), "docx");
        assert_eq!(Format::new("..tar").as_str(), "tar");
    }

    #[test]
    fn test_format_from_path() {
        let format = Format::from_path(Path::new("/videos/Holiday.MKV")).unwrap();
        assert_eq!(format, "mkv");
        assert!(Format::from_path(Path::new("/videos/README")).is_none());
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&Category::Ebook).unwrap();
        assert_eq!(json, "\"ebook\"");
        let json = serde_json::to_string(&EngineKind::Transcode).unwrap();
        assert_eq!(json, "\"transcode\"");
    }

    #[test]
    fn test_format_deserialization_normalizes() {
        let format: Format = serde_json::from_str("\".PNG\"").unwrap();
        assert_eq!(format, "png");
        assert_eq!(serde_json::to_string(&format).unwrap(), "\"png\"");
    }
}
