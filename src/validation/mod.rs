//! File acceptance policy: category detection and per-category size limits.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::core::{FileCategory, SourceFile};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Cannot determine file type of {name}")]
    UnknownCategory {
        name: String,
    },

    #[error("{category} files are not accepted")]
    CategoryNotAccepted {
        category: FileCategory,
    },

    #[error("{name} is {size} bytes, exceeds the {category} limit of {limit} bytes")]
    TooLarge {
        name: String,
        category: FileCategory,
        size: u64,
        limit: u64,
    },

    #[error("{name} is empty")]
    Empty {
        name: String,
    },
}

/// 各类别的大小上限
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationPolicy {
    pub image_max_bytes: u64,
    pub video_max_bytes: u64,
    pub audio_max_bytes: u64,
    pub document_max_bytes: u64,
    pub archive_max_bytes: u64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        const MB: u64 = 1024 * 1024;
        Self {
            image_max_bytes: 20 * MB,
            video_max_bytes: 2048 * MB,
            audio_max_bytes: 200 * MB,
            document_max_bytes: 50 * MB,
            archive_max_bytes: 1024 * MB,
        }
    }
}

impl ValidationPolicy {
    pub fn max_size(&self, category: FileCategory) -> u64 {
        match category {
            FileCategory::Image => self.image_max_bytes,
            FileCategory::Video => self.video_max_bytes,
            FileCategory::Audio => self.audio_max_bytes,
            FileCategory::Document => self.document_max_bytes,
            FileCategory::Archive => self.archive_max_bytes,
        }
    }
}

const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/rtf",
    "application/json",
];

const ARCHIVE_MIME_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-tar",
    "application/gzip",
    "application/x-7z-compressed",
    "application/x-rar-compressed",
    "application/vnd.rar",
];

/// 扩展名 -> (MIME, 类别)
const EXTENSIONS: &[(&str, &str, FileCategory)] = &[
    ("jpg", "image/jpeg", FileCategory::Image),
    ("jpeg", "image/jpeg", FileCategory::Image),
    ("png", "image/png", FileCategory::Image),
    ("gif", "image/gif", FileCategory::Image),
    ("webp", "image/webp", FileCategory::Image),
    ("bmp", "image/bmp", FileCategory::Image),
    ("svg", "image/svg+xml", FileCategory::Image),
    ("mp4", "video/mp4", FileCategory::Video),
    ("m4v", "video/x-m4v", FileCategory::Video),
    ("mov", "video/quicktime", FileCategory::Video),
    ("webm", "video/webm", FileCategory::Video),
    ("mkv", "video/x-matroska", FileCategory::Video),
    ("avi", "video/x-msvideo", FileCategory::Video),
    ("mp3", "audio/mpeg", FileCategory::Audio),
    ("wav", "audio/wav", FileCategory::Audio),
    ("ogg", "audio/ogg", FileCategory::Audio),
    ("flac", "audio/flac", FileCategory::Audio),
    ("m4a", "audio/mp4", FileCategory::Audio),
    ("pdf", "application/pdf", FileCategory::Document),
    ("doc", "application/msword", FileCategory::Document),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        FileCategory::Document,
    ),
    ("xls", "application/vnd.ms-excel", FileCategory::Document),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        FileCategory::Document,
    ),
    ("ppt", "application/vnd.ms-powerpoint", FileCategory::Document),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        FileCategory::Document,
    ),
    ("txt", "text/plain", FileCategory::Document),
    ("csv", "text/csv", FileCategory::Document),
    ("md", "text/markdown", FileCategory::Document),
    ("json", "application/json", FileCategory::Document),
    ("zip", "application/zip", FileCategory::Archive),
    ("tar", "application/x-tar", FileCategory::Archive),
    ("gz", "application/gzip", FileCategory::Archive),
    ("7z", "application/x-7z-compressed", FileCategory::Archive),
    ("rar", "application/vnd.rar", FileCategory::Archive),
];

pub fn category_from_mime(mime_type: &str) -> Option<FileCategory> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence.starts_with("image/") {
        Some(FileCategory::Image)
    } else if essence.starts_with("video/") {
        Some(FileCategory::Video)
    } else if essence.starts_with("audio/") {
        Some(FileCategory::Audio)
    } else if essence.starts_with("text/") || DOCUMENT_MIME_TYPES.contains(&essence.as_str()) {
        Some(FileCategory::Document)
    } else if ARCHIVE_MIME_TYPES.contains(&essence.as_str()) {
        Some(FileCategory::Archive)
    } else {
        None
    }
}

pub fn category_from_extension(extension: &str) -> Option<FileCategory> {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(ext, _, _)| *ext == extension)
        .map(|(_, _, category)| *category)
}

pub fn guess_mime_type(extension: &str) -> Option<&'static str> {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(ext, _, _)| *ext == extension)
        .map(|(_, mime, _)| *mime)
}

/// 文件校验器
#[derive(Debug, Clone, Default)]
pub struct FileValidator {
    policy: ValidationPolicy,
}

impl FileValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// MIME 优先，缺失或无法识别时按扩展名判断
    pub fn detect_category(&self, file: &SourceFile) -> Option<FileCategory> {
        file.mime_type()
            .filter(|mime| !mime.trim().is_empty())
            .and_then(category_from_mime)
            .or_else(|| category_from_extension(&file.extension()))
    }

    /// Accepts or rejects `file`. An empty `accepted` list accepts every known category.
    pub fn validate(
        &self,
        file: &SourceFile,
        accepted: &[FileCategory],
    ) -> Result<FileCategory, ValidationError> {
        let category = self
            .detect_category(file)
            .ok_or_else(|| ValidationError::UnknownCategory { name: file.name().to_string() })?;

        if !accepted.is_empty() && !accepted.contains(&category) {
            return Err(ValidationError::CategoryNotAccepted { category });
        }

        if file.size_bytes() == 0 {
            return Err(ValidationError::Empty { name: file.name().to_string() });
        }

        let limit = self.policy.max_size(category);
        if file.size_bytes() > limit {
            return Err(ValidationError::TooLarge {
                name: file.name().to_string(),
                category,
                size: file.size_bytes(),
                limit,
            });
        }

        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, mime: Option<&str>, size: usize) -> SourceFile {
        SourceFile::from_bytes(name, mime, vec![0u8; size])
    }

    #[test]
    fn test_category_from_mime() {
        assert_eq!(category_from_mime("image/png"), Some(FileCategory::Image));
        assert_eq!(category_from_mime("video/mp4; codecs=avc1"), Some(FileCategory::Video));
        assert_eq!(category_from_mime("text/plain"), Some(FileCategory::Document));
        assert_eq!(category_from_mime("application/zip"), Some(FileCategory::Archive));
        assert_eq!(category_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn test_extension_fallback() {
        let validator = FileValidator::default();

        let no_mime = file("holiday.JPG", None, 10);
        assert_eq!(validator.validate(&no_mime, &[]), Ok(FileCategory::Image));

        let unknown_mime = file("clip.mov", Some("application/octet-stream"), 10);
        assert_eq!(
            validator.validate(&unknown_mime, &[FileCategory::Video]),
            Ok(FileCategory::Video)
        );

        assert_eq!(guess_mime_type("mov"), Some("video/quicktime"));
        assert_eq!(guess_mime_type(".PDF"), Some("application/pdf"));
    }

    #[test]
    fn test_rejections() {
        let validator = FileValidator::default();

        let unknown = file("blob.bin", None, 10);
        assert!(matches!(
            validator.validate(&unknown, &[]),
            Err(ValidationError::UnknownCategory { .. })
        ));

        let audio = file("song.mp3", Some("audio/mpeg"), 10);
        assert_eq!(
            validator.validate(&audio, &[FileCategory::Image, FileCategory::Video]),
            Err(ValidationError::CategoryNotAccepted { category: FileCategory::Audio })
        );

        let empty = file("empty.png", Some("image/png"), 0);
        assert!(matches!(validator.validate(&empty, &[]), Err(ValidationError::Empty { .. })));
    }

    #[test]
    fn test_size_limit() {
        let policy = ValidationPolicy {
            image_max_bytes: 100,
            ..Default::default()
        };
        let validator = FileValidator::new(policy);

        assert!(validator.validate(&file("a.png", Some("image/png"), 100), &[]).is_ok());
        assert_eq!(
            validator.validate(&file("b.png", Some("image/png"), 101), &[]),
            Err(ValidationError::TooLarge {
                name: "b.png".to_string(),
                category: FileCategory::Image,
                size: 101,
                limit: 100,
            })
        );
    }
}
