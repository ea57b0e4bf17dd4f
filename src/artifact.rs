//! Image artifacts passed between pipeline stages
//!
//! An [`ImageArtifact`] is an immutable encoded payload plus optional
//! metadata. Stages never mutate an artifact in place: they pass it through
//! or build a new one.

use bytes::Bytes;

use crate::format::ImageFormat;

/// Encoded image bytes with their MIME type and format tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    content: Bytes,
    mime_type: Option<String>,
    format: Option<ImageFormat>,
    url: Option<String>,
}

impl ImageArtifact {
    /// Create an artifact with explicit metadata
    pub fn new(
        content: impl Into<Bytes>,
        mime_type: Option<String>,
        format: Option<ImageFormat>,
    ) -> Self {
        Self {
            content: content.into(),
            mime_type,
            format,
            url: None,
        }
    }

    /// Create an artifact whose metadata is derived from the payload
    pub fn from_bytes(content: impl Into<Bytes>) -> Self {
        Self::new(content, None, None)
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// MIME type, falling back to the one implied by the format or the payload
    pub fn mime_type(&self) -> Option<String> {
        if let Some(mime) = &self.mime_type {
            return Some(mime.clone());
        }
        self.format().map(|format| format.content_type().to_string())
    }

    /// Format tag, falling back to the declared MIME type and then the payload
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
            .or_else(|| self.mime_type.as_deref().and_then(ImageFormat::from_mime))
            .or_else(|| ImageFormat::detect(&self.content))
    }

    /// Public URL baked in by the store that persisted this artifact
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Same payload and metadata, with the store's URL attached
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Same metadata, new payload
    ///
    /// Used by post-processors that rewrite bytes without changing the format.
    pub fn with_content(&self, content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            mime_type: self.mime_type.clone(),
            format: self.format,
            url: None,
        }
    }

    pub fn into_content(self) -> Bytes {
        self.content
    }
}

/// Guesses a MIME type from encoded bytes
pub trait MimeTypeGuesser: Send + Sync {
    fn guess(&self, content: &[u8]) -> Option<String>;
}

/// Recognises the image formats the pipeline writes by their signatures
#[derive(Debug, Default, Clone, Copy)]
pub struct MagicBytesGuesser;

impl MimeTypeGuesser for MagicBytesGuesser {
    fn guess(&self, content: &[u8]) -> Option<String> {
        ImageFormat::detect(content).map(|format| format.content_type().to_string())
    }
}
