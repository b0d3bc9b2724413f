//! Input validation for untrusted classification payloads.
//!
//! Everything here is a pure function of the payload and the configured
//! [`Limits`]: no I/O, no shared state. A successful validation yields a
//! normalized value that the classifiers accept as-is.
//!
//! Image checks run cheapest first: declared type, then declared size, then
//! content inspection.

use std::io::Cursor;

use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Limits;

/// Kinds of validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// Nothing left to classify after trimming.
    EmptyInput,
    /// Payload exceeds the configured byte or pixel cap.
    TooLarge,
    /// Declared or detected type is not an allowed image type.
    UnsupportedType,
    /// Text exceeds the configured character limit.
    TooLong,
    /// Text contains control sequences or markup, or the file is disguised.
    UnsafeContent,
}

/// A rejected payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// What went wrong.
    pub kind: ValidationErrorKind,
    /// Human-readable detail, safe to return to the caller.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result type for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Image types accepted by the image endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMime {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
}

impl ImageMime {
    /// Returns every supported image type.
    pub fn all() -> &'static [ImageMime] {
        &[
            ImageMime::Jpeg,
            ImageMime::Png,
            ImageMime::Gif,
            ImageMime::Bmp,
            ImageMime::Webp,
        ]
    }

    /// Canonical MIME type string.
    pub fn as_mime(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Gif => "image/gif",
            ImageMime::Bmp => "image/bmp",
            ImageMime::Webp => "image/webp",
        }
    }

    /// Short format name ("jpeg", "png", ...).
    pub fn short_name(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "jpeg",
            ImageMime::Png => "png",
            ImageMime::Gif => "gif",
            ImageMime::Bmp => "bmp",
            ImageMime::Webp => "webp",
        }
    }

    /// Parses a declared MIME type, ignoring case, whitespace, and parameters.
    pub fn from_declared(declared: &str) -> Option<Self> {
        let essence = declared.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageMime::Jpeg),
            "image/png" => Some(ImageMime::Png),
            "image/gif" => Some(ImageMime::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(ImageMime::Bmp),
            "image/webp" => Some(ImageMime::Webp),
            _ => None,
        }
    }

    /// Maps a filename extension to an image type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageMime::Jpeg),
            "png" => Some(ImageMime::Png),
            "gif" => Some(ImageMime::Gif),
            "bmp" => Some(ImageMime::Bmp),
            "webp" => Some(ImageMime::Webp),
            _ => None,
        }
    }

    /// Detects the image type from magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageMime::Jpeg);
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ImageMime::Png);
        }

        // GIF: GIF87a or GIF89a
        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(ImageMime::Gif);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(ImageMime::Webp);
        }

        // BMP: BM
        if data.starts_with(b"BM") {
            return Some(ImageMime::Bmp);
        }

        None
    }

    /// The decoder format for this type.
    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            ImageMime::Jpeg => image::ImageFormat::Jpeg,
            ImageMime::Png => image::ImageFormat::Png,
            ImageMime::Gif => image::ImageFormat::Gif,
            ImageMime::Bmp => image::ImageFormat::Bmp,
            ImageMime::Webp => image::ImageFormat::WebP,
        }
    }
}

impl std::fmt::Display for ImageMime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// Text that passed validation: trimmed, non-empty, bounded, and free of markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText(String);

impl NormalizedText {
    /// The normalized text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Returns at most `max_chars` characters, with "..." appended when cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.0.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }

    /// Consumes the wrapper.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An image that passed validation.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    bytes: Bytes,
    mime: ImageMime,
    width: u32,
    height: u32,
}

impl NormalizedImage {
    /// Raw image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Verified image type.
    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total pixel count.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Markup and script patterns rejected in text input.
static UNSAFE_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)<\s*/?\s*[a-z][a-z0-9-]*(\s[^>]*)?/?\s*>",
        r"(?i)<\s*(script|iframe|object|embed|svg|style|img|link|meta)\b",
        r"(?i)\b(javascript|vbscript)\s*:",
        r"(?i)\bdata\s*:\s*text/html",
        r"(?i)\bon(load|unload|error|abort|click|dblclick|focus|blur|change|submit|input|toggle|begin|end|mouse[a-z]*|key[a-z]*|pointer[a-z]*|animation[a-z]*)\s*=",
    ])
    .expect("Invalid unsafe content patterns")
});

fn is_disallowed_char(c: char) -> bool {
    let bidi_control = matches!(c, '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}');
    (c.is_control() && !matches!(c, '\t' | '\n' | '\r')) || bidi_control
}

/// Validates a free-text description.
pub fn validate_text(raw: &str, limits: &Limits) -> Result<NormalizedText> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::new(
            ValidationErrorKind::EmptyInput,
            "text is empty",
        ));
    }

    let len = trimmed.chars().count();
    if len > limits.max_text_chars {
        return Err(ValidationError::new(
            ValidationErrorKind::TooLong,
            format!(
                "text is {} characters; maximum is {}",
                len, limits.max_text_chars
            ),
        ));
    }

    if trimmed.chars().any(is_disallowed_char) {
        return Err(ValidationError::new(
            ValidationErrorKind::UnsafeContent,
            "text contains control characters",
        ));
    }

    if UNSAFE_PATTERNS.is_match(trimmed) {
        return Err(ValidationError::new(
            ValidationErrorKind::UnsafeContent,
            "text contains markup or script content",
        ));
    }

    Ok(NormalizedText(trimmed.to_string()))
}

/// Validates an uploaded image.
///
/// `size` is the upload size reported by the transport; it is checked before
/// the content is looked at, so an oversized file is rejected whether or not
/// it is a readable image.
pub fn validate_image(
    bytes: impl Into<Bytes>,
    declared_type: &str,
    size: usize,
    limits: &Limits,
) -> Result<NormalizedImage> {
    let mime = ImageMime::from_declared(declared_type)
        .filter(|m| limits.allowed_image_types.contains(m))
        .ok_or_else(|| {
            ValidationError::new(
                ValidationErrorKind::UnsupportedType,
                format!(
                    "file type '{}' not allowed; allowed types: {}",
                    declared_type.trim(),
                    limits.allowed_types_display()
                ),
            )
        })?;

    if size > limits.max_file_bytes {
        return Err(ValidationError::new(
            ValidationErrorKind::TooLarge,
            format!(
                "file is {} bytes; maximum is {} bytes",
                size, limits.max_file_bytes
            ),
        ));
    }

    let bytes: Bytes = bytes.into();
    if size == 0 || bytes.is_empty() {
        return Err(ValidationError::new(
            ValidationErrorKind::EmptyInput,
            "file is empty",
        ));
    }

    let sniffed = ImageMime::sniff(&bytes).ok_or_else(|| {
        ValidationError::new(
            ValidationErrorKind::UnsupportedType,
            "file content is not a recognized image",
        )
    })?;

    if sniffed != mime {
        return Err(ValidationError::new(
            ValidationErrorKind::UnsafeContent,
            format!(
                "file declared as {} but content is {}",
                mime.as_mime(),
                sniffed.as_mime()
            ),
        ));
    }

    let (width, height) =
        image::ImageReader::with_format(Cursor::new(&bytes[..]), mime.image_format())
            .into_dimensions()
            .map_err(|_| {
                ValidationError::new(ValidationErrorKind::UnsupportedType, "invalid image file")
            })?;

    let pixels = u64::from(width) * u64::from(height);
    if width == 0 || height == 0 {
        return Err(ValidationError::new(
            ValidationErrorKind::UnsupportedType,
            "invalid image file",
        ));
    }
    if pixels > limits.max_image_pixels {
        return Err(ValidationError::new(
            ValidationErrorKind::TooLarge,
            format!("image dimensions too large: {}x{}", width, height),
        ));
    }

    Ok(NormalizedImage {
        bytes,
        mime,
        width,
        height,
    })
}

/// Builds a [`NormalizedImage`] without validation, for classifier tests.
#[cfg(test)]
pub(crate) fn normalized_image_for_test(
    bytes: Vec<u8>,
    mime: ImageMime,
    width: u32,
    height: u32,
) -> NormalizedImage {
    NormalizedImage {
        bytes: Bytes::from(bytes),
        mime,
        width,
        height,
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{ImageFormat, Rgb, RgbImage};

    /// Encodes a solid-color image in the given format.
    pub fn solid(width: u32, height: u32, color: [u8; 3], format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    pub fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        solid(width, height, color, ImageFormat::Png)
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::{png, solid};
    use super::*;

    fn limits() -> Limits {
        Limits::default()
    }

    // ==================== Text Tests ====================

    #[test]
    fn text_is_trimmed() {
        let text = validate_text("  plastic bottle \n", &limits()).unwrap();
        assert_eq!(text.as_str(), "plastic bottle");
    }

    #[test]
    fn empty_text_rejected() {
        for raw in ["", "   ", "\n\t  \r\n"] {
            let err = validate_text(raw, &limits()).unwrap_err();
            assert_eq!(err.kind, ValidationErrorKind::EmptyInput, "input: {:?}", raw);
        }
    }

    #[test]
    fn text_at_limit_accepted() {
        let raw = "a".repeat(1000);
        assert!(validate_text(&raw, &limits()).is_ok());
    }

    #[test]
    fn text_over_limit_rejected() {
        let raw = "a".repeat(1001);
        let err = validate_text(&raw, &limits()).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TooLong);
    }

    #[test]
    fn text_limit_counts_characters_not_bytes() {
        // 1000 two-byte characters is 2000 bytes but within the limit.
        let raw = "é".repeat(1000);
        assert!(validate_text(&raw, &limits()).is_ok());
    }

    #[test]
    fn surrounding_whitespace_does_not_count_toward_limit() {
        let raw = format!("   {}   ", "a".repeat(1000));
        assert!(validate_text(&raw, &limits()).is_ok());
    }

    #[test]
    fn script_tag_rejected() {
        let err = validate_text("<script>alert(1)</script>", &limits()).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnsafeContent);
    }

    #[test]
    fn markup_variants_rejected() {
        let inputs = [
            "<SCRIPT src=x>",
            "<img src=x onerror=alert(1)>",
            "click javascript:alert(1)",
            "<b>bold bottle</b>",
            "data:text/html;base64,AAAA",
            "<iframe",
            "bottle onload=steal()",
        ];
        for raw in inputs {
            let err = validate_text(raw, &limits()).unwrap_err();
            assert_eq!(err.kind, ValidationErrorKind::UnsafeContent, "input: {}", raw);
        }
    }

    #[test]
    fn control_characters_rejected() {
        for raw in ["bottle\u{0000}", "can\u{001b}[31m", "jar\u{202E}gpj"] {
            let err = validate_text(raw, &limits()).unwrap_err();
            assert_eq!(err.kind, ValidationErrorKind::UnsafeContent);
        }
    }

    #[test]
    fn ordinary_punctuation_accepted() {
        let inputs = [
            "a bottle < 5cm tall",
            "banana peel & apple core",
            "1 + 1 = 2 cans",
            "one = two",
            "multi\nline\tdescription",
        ];
        for raw in inputs {
            assert!(validate_text(raw, &limits()).is_ok(), "input: {}", raw);
        }
    }

    #[test]
    fn emptiness_checked_before_length() {
        let raw = " ".repeat(5000);
        let err = validate_text(&raw, &limits()).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::EmptyInput);
    }

    #[test]
    fn preview_truncates() {
        let text = validate_text(&"x".repeat(150), &limits()).unwrap();
        let preview = text.preview(100);
        assert_eq!(preview.len(), 103);
        assert!(preview.ends_with("..."));

        let short = validate_text("glass jar", &limits()).unwrap();
        assert_eq!(short.preview(100), "glass jar");
    }

    // ==================== Image Tests ====================

    #[test]
    fn valid_png_accepted() {
        let data = png(40, 20, [10, 200, 10]);
        let size = data.len();
        let img = validate_image(data, "image/png", size, &limits()).unwrap();
        assert_eq!(img.mime(), ImageMime::Png);
        assert_eq!((img.width(), img.height()), (40, 20));
        assert_eq!(img.pixel_count(), 800);
    }

    #[test]
    fn declared_type_is_case_insensitive() {
        let data = png(4, 4, [0, 0, 0]);
        let size = data.len();
        assert!(validate_image(data, "IMAGE/PNG; charset=binary", size, &limits()).is_ok());
    }

    #[test]
    fn other_allowed_formats_accepted() {
        for (format, declared) in [
            (image::ImageFormat::Jpeg, "image/jpeg"),
            (image::ImageFormat::Gif, "image/gif"),
            (image::ImageFormat::Bmp, "image/bmp"),
        ] {
            let data = solid(8, 8, [120, 120, 120], format);
            let size = data.len();
            assert!(
                validate_image(data, declared, size, &limits()).is_ok(),
                "format: {}",
                declared
            );
        }
    }

    #[test]
    fn pdf_rejected_regardless_of_size() {
        for size in [10, 1024, 100 * 1024 * 1024] {
            let err = validate_image(b"%PDF-1.7".to_vec(), "application/pdf", size, &limits())
                .unwrap_err();
            assert_eq!(err.kind, ValidationErrorKind::UnsupportedType);
        }
    }

    #[test]
    fn oversized_rejected_even_if_unreadable() {
        let junk = vec![0u8; 64];
        let size = limits().max_file_bytes + 1;
        let err = validate_image(junk, "image/jpeg", size, &limits()).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TooLarge);
    }

    #[test]
    fn oversized_valid_image_rejected() {
        let small = Limits {
            max_file_bytes: 16,
            ..Limits::default()
        };
        let data = png(8, 8, [0, 0, 0]);
        let size = data.len();
        let err = validate_image(data, "image/png", size, &small).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TooLarge);
    }

    #[test]
    fn empty_file_rejected() {
        let err = validate_image(Vec::new(), "image/png", 0, &limits()).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::EmptyInput);
    }

    #[test]
    fn non_image_content_rejected() {
        let data = b"just some text, not an image".to_vec();
        let size = data.len();
        let err = validate_image(data, "image/png", size, &limits()).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnsupportedType);
    }

    #[test]
    fn mismatched_content_rejected() {
        let data = png(4, 4, [0, 0, 0]);
        let size = data.len();
        let err = validate_image(data, "image/gif", size, &limits()).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnsafeContent);
    }

    #[test]
    fn truncated_header_rejected() {
        let mut data = png(4, 4, [0, 0, 0]);
        data.truncate(12);
        let size = data.len();
        let err = validate_image(data, "image/png", size, &limits()).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnsupportedType);
    }

    #[test]
    fn pixel_cap_enforced() {
        let tight = Limits {
            max_image_pixels: 100,
            ..Limits::default()
        };
        let data = png(20, 20, [0, 0, 0]);
        let size = data.len();
        let err = validate_image(data, "image/png", size, &tight).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TooLarge);
    }

    #[test]
    fn type_restricted_by_allow_list() {
        let png_only = Limits {
            allowed_image_types: vec![ImageMime::Png],
            ..Limits::default()
        };
        let data = solid(4, 4, [0, 0, 0], image::ImageFormat::Gif);
        let size = data.len();
        let err = validate_image(data, "image/gif", size, &png_only).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnsupportedType);
    }

    #[test]
    fn type_checked_before_size() {
        let err = validate_image(Vec::new(), "text/plain", usize::MAX, &limits()).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnsupportedType);
    }

    #[test]
    fn mime_parsing() {
        assert_eq!(ImageMime::from_declared("image/jpg"), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::from_declared(" image/WEBP "), Some(ImageMime::Webp));
        assert_eq!(ImageMime::from_declared("image/svg+xml"), None);
        assert_eq!(ImageMime::from_extension("JPG"), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::from_extension("pdf"), None);
    }

    #[test]
    fn sniff_magic_bytes() {
        assert_eq!(ImageMime::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::sniff(b"GIF89a.."), Some(ImageMime::Gif));
        assert_eq!(ImageMime::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageMime::Webp));
        assert_eq!(ImageMime::sniff(b"BM\0\0\0\0"), Some(ImageMime::Bmp));
        assert_eq!(ImageMime::sniff(b"%PDF"), None);
        assert_eq!(ImageMime::sniff(b"BM"), None);
    }
}
