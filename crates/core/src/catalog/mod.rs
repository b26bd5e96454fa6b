//! Format catalog - the static registry of known formats.
//!
//! Every format belongs to at most one [`Category`], and every category has
//! exactly one [`EngineKind`] responsible for conversions inside it. The
//! [`BridgeTable`] describes how a file can leave its category.

mod bridges;
mod types;

pub use bridges::{Bridge, BridgeError, BridgeTable};
pub use types::{Category, EngineKind, Format};

const VIDEO_FORMATS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "vob", "ogv", "3gp", "m4v", "mpg", "mpeg",
    "m2ts", "asf", "divx", "rmvb",
];

const AUDIO_FORMATS: &[&str] = &[
    "mp3", "wav", "aac", "flac", "ogg", "m4a", "opus", "wma", "aiff", "alac", "pcm", "aif", "amr",
];

const IMAGE_FORMATS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "tiff", "bmp", "ico", "gif", "svg", "heic", "heif", "avif",
    "raw", "cr2", "nef", "arw", "psd", "ai", "eps", "tga", "dds",
];

const DOCUMENT_FORMATS: &[&str] = &[
    "docx", "doc", "odt", "rtf", "txt", "pdf", "html", "htm", "pptx", "ppt", "odp", "xlsx", "xls",
    "ods", "csv", "xml", "md",
];

const EBOOK_FORMATS: &[&str] = &["epub", "mobi", "azw3", "fb2", "cbz", "lit", "lrf"];

const ARCHIVE_FORMATS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "iso"];

/// Returns the member formats of a category, in catalog order.
pub fn formats_in(category: Category) -> &'static [&'static str] {
    match category {
        Category::Video => VIDEO_FORMATS,
        Category::Audio => AUDIO_FORMATS,
        Category::Image => IMAGE_FORMATS,
        Category::Document => DOCUMENT_FORMATS,
        Category::Ebook => EBOOK_FORMATS,
        Category::Archive => ARCHIVE_FORMATS,
    }
}

/// Resolves the category of a format, ignoring case and leading dots.
pub fn category_of(format: impl AsRef<str>) -> Option<Category> {
    let format = Format::new(format.as_ref());
    Category::ALL
        .into_iter()
        .find(|category| formats_in(*category).contains(&format.as_str()))
}

/// Returns the engine responsible for direct conversions within a category.
pub fn engine_for(category: Category) -> EngineKind {
    match category {
        Category::Video | Category::Audio => EngineKind::Transcode,
        Category::Image => EngineKind::Raster,
        Category::Document | Category::Ebook => EngineKind::Document,
        Category::Archive => EngineKind::Archive,
    }
}

/// Whether the format is known to the catalog.
pub fn is_known(format: impl AsRef<str>) -> bool {
    category_of(format).is_some()
}
