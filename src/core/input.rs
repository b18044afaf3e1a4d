//! Scan request input and image validation.
//!
//! A [`ScanRequest`] carries the raw label photo plus the caller's identity.
//! [`validate_image`] sniffs the file signature before any remote call is made.

use crate::core::error::ScanError;

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Supported label photo formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// JPEG (`FF D8 FF`).
    Jpeg,
    /// PNG (`89 50 4E 47`).
    Png,
    /// GIF (`47 49 46`).
    Gif,
    /// WebP (`RIFF....WEBP`).
    WebP,
}

impl ImageFormat {
    /// Detects the format from the leading bytes, if supported.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, 0x50, 0x4E, 0x47, ..] => Some(Self::Png),
            [0x47, 0x49, 0x46, ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::WebP),
            _ => None,
        }
    }

    /// Returns the MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Returns the file extension used when uploading.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Checks that `data` is a non-empty, size-bounded image of a supported format.
pub fn validate_image(data: &[u8], max_size: usize) -> Result<ImageFormat, ScanError> {
    if data.is_empty() {
        return Err(ScanError::invalid_image("image buffer is empty"));
    }
    if data.len() > max_size {
        return Err(ScanError::invalid_image(format!(
            "image is {} bytes, maximum is {} bytes",
            data.len(),
            max_size
        )));
    }
    ImageFormat::sniff(data).ok_or_else(|| {
        ScanError::invalid_image("unsupported image format, expected JPEG, PNG, GIF or WebP")
    })
}

/// A request to scan one label photo.
///
/// # Examples
///
/// ```rust
/// use nutriscan::core::ScanRequest;
///
/// let request = ScanRequest::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "user-1")
///     .with_product_name("Granola Bar");
/// assert_eq!(request.user_id(), "user-1");
/// ```
#[derive(Clone)]
pub struct ScanRequest {
    image: Arc<[u8]>,
    user_id: String,
    product_name: Option<String>,
    correlation_id: String,
}

impl ScanRequest {
    /// Creates a request with a generated correlation id.
    pub fn new(image: impl Into<Vec<u8>>, user_id: impl Into<String>) -> Self {
        Self {
            image: Arc::from(image.into()),
            user_id: user_id.into(),
            product_name: None,
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Sets the user-supplied product name.
    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.product_name = if name.trim().is_empty() { None } else { Some(name) };
        self
    }

    /// Overrides the correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Returns the image bytes.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Returns a shared handle to the image bytes.
    pub fn shared_image(&self) -> Arc<[u8]> {
        Arc::clone(&self.image)
    }

    /// Returns the requesting user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the user-supplied product name, if any.
    pub fn product_name(&self) -> Option<&str> {
        self.product_name.as_deref()
    }

    /// Returns the correlation id.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRequest")
            .field("image_len", &self.image.len())
            .field("user_id", &self.user_id)
            .field("product_name", &self.product_name)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_formats() {
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(&[0x89, 0x50, 0x4E, 0x47, 0x0D]), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(b"GIF89a"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"RIFF\x10\0\0\0WEBPVP8 "), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::sniff(b"RIFF\x10\0\0\0WAVE"), None);
        assert_eq!(ImageFormat::sniff(b"%PDF-1.7"), None);
    }

    #[test]
    fn test_validate_rejects_empty_and_oversize() {
        assert!(matches!(
            validate_image(&[], 1024),
            Err(ScanError::InvalidImage { .. })
        ));

        let big = vec![0xFF, 0xD8, 0xFF, 0x00, 0x00];
        assert!(matches!(
            validate_image(&big, 4),
            Err(ScanError::InvalidImage { .. })
        ));
        assert_eq!(validate_image(&big, 5).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_request_builder() {
        let request = ScanRequest::new(vec![1, 2, 3], "u1")
            .with_product_name("  ")
            .with_correlation_id("corr-1");
        assert_eq!(request.product_name(), None);
        assert_eq!(request.correlation_id(), "corr-1");
        assert_eq!(request.image().len(), 3);
        assert!(format!("{:?}", request).contains("image_len"));
    }
}
