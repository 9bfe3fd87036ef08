// ABOUTME: Upload validation for food images: size limit, MIME type and extension allow lists
// ABOUTME: Also generates the unguessable storage name recorded for each upload
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Thermitrack Contributors

//! # Upload Security
//!
//! Checks run in order: size first (413), then type (415). A file passes the
//! type check only when both its declared MIME type and its extension are on
//! the allow lists.

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::errors::{AppError, AppResult};

/// One uploaded file as received from the multipart body
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Client-supplied filename
    pub filename: String,
    /// Client-supplied MIME type
    pub content_type: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Validates and renames uploaded images
#[derive(Debug, Clone)]
pub struct ImageValidator {
    config: UploadConfig,
}

impl ImageValidator {
    /// Validator enforcing `config`
    #[must_use]
    pub const fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    /// Largest accepted file in bytes
    #[must_use]
    pub const fn max_file_bytes(&self) -> usize {
        self.config.max_file_bytes
    }

    /// `true` when the image fits the size limit
    #[must_use]
    pub fn validate_size(&self, image: &UploadedImage) -> bool {
        debug!(bytes = image.bytes.len(), "Image size");
        image.bytes.len() <= self.config.max_file_bytes
    }

    /// `true` when both MIME type and extension are allowed
    #[must_use]
    pub fn validate_type(&self, image: &UploadedImage) -> bool {
        let content_type = image.content_type.as_deref().unwrap_or_default();
        if !self.config.allowed_mime_types.iter().any(|t| t == content_type) {
            warn!(content_type, "Unsupported MIME type");
            return false;
        }

        let filename = image.filename.to_lowercase();
        let extension = file_extension(&filename);
        if !self.config.allowed_extensions.iter().any(|e| *e == extension) {
            warn!(extension = %extension, "Unsupported file extension");
            return false;
        }
        true
    }

    /// Run all checks
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` (413) or `UnsupportedMediaType` (415)
    pub fn validate(&self, image: &UploadedImage) -> AppResult<()> {
        if !self.validate_size(image) {
            error!(filename = %image.filename, "Image too large");
            return Err(AppError::payload_too_large("Payload Too Large."));
        }
        if !self.validate_type(image) {
            error!(filename = %image.filename, "Unsupported image type");
            return Err(AppError::unsupported_media_type("Unsupported Media Type."));
        }
        Ok(())
    }

    /// Random storage name keeping the lowercased extension
    #[must_use]
    pub fn rename_image(&self, image: &UploadedImage) -> String {
        let new_name = format!(
            "{}{}",
            Uuid::new_v4().simple(),
            file_extension(&image.filename).to_lowercase()
        );
        debug!(original = %image.filename, renamed = %new_name, "Renamed image");
        new_name
    }
}

/// Extension including the dot, or empty; leading dots of the base name do not
/// start an extension
fn file_extension(filename: &str) -> &str {
    let base = filename.rsplit(&['/', '\\'][..]).next().unwrap_or(filename);
    let stem_start = base.len() - base.trim_start_matches('.').len();
    base[stem_start..]
        .rfind('.')
        .map_or("", |dot| &base[stem_start + dot..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(filename: &str, content_type: &str, size: usize) -> UploadedImage {
        UploadedImage {
            filename: filename.to_owned(),
            content_type: Some(content_type.to_owned()),
            bytes: vec![0; size],
        }
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("pizza.JPG"), ".JPG");
        assert_eq!(file_extension("dir/archive.tar.png"), ".png");
        assert_eq!(file_extension(".hidden"), "");
        assert_eq!(file_extension("noext"), "");
    }

    #[test]
    fn test_validate_accepts_allowed_image() {
        let validator = ImageValidator::new(UploadConfig::default());
        assert!(validator.validate(&image("Pizza.PNG", "image/png", 10)).is_ok());
    }

    #[test]
    fn test_validate_size_before_type() {
        let config = UploadConfig {
            max_file_bytes: 4,
            ..UploadConfig::default()
        };
        let validator = ImageValidator::new(config);
        let err = validator.validate(&image("a.gif", "image/gif", 5)).unwrap_err();
        assert_eq!(err.http_status(), 413);
    }

    #[test]
    fn test_validate_rejects_mime_or_extension() {
        let validator = ImageValidator::new(UploadConfig::default());
        let err = validator.validate(&image("a.png", "text/plain", 1)).unwrap_err();
        assert_eq!(err.http_status(), 415);
        let err = validator.validate(&image("a.gif", "image/png", 1)).unwrap_err();
        assert_eq!(err.http_status(), 415);
    }

    #[test]
    fn test_rename_keeps_lowercased_extension() {
        let validator = ImageValidator::new(UploadConfig::default());
        let renamed = validator.rename_image(&image("Burger.JPEG", "image/jpeg", 1));
        assert!(renamed.ends_with(".jpeg"));
        assert_eq!(renamed.len(), 32 + ".jpeg".len());
    }
}
