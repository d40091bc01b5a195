//! Vision model seam: images in, raw reply text out.
//!
//! [`VisionModel`] is the only place the pipeline leaves the process for
//! extraction. The service bounds every call with its own timeout, so
//! implementations need not.

pub mod openai;

#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

pub use openai::OpenAiVision;

use crate::error::{ErrorCode, ServiceError};

/// Failure of a vision model call.
#[derive(Debug, Clone, Error)]
pub enum VisionError {
    /// The provider or transport timed out.
    #[error("vision request timed out")]
    Timeout,

    /// The provider rate limited the call.
    #[error("vision provider rate limited the request")]
    RateLimited {
        /// Seconds the provider asked to wait, if given.
        retry_after_secs: Option<u64>,
    },

    /// The provider answered with a non-success status.
    #[error("vision provider returned {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The provider could not be reached.
    #[error("vision transport error: {0}")]
    Transport(String),

    /// The provider answered without any text.
    #[error("vision provider returned an empty reply")]
    EmptyReply,

    /// The provider answer could not be decoded.
    #[error("malformed vision response: {0}")]
    Malformed(String),
}

impl VisionError {
    /// Failure category reported on results and metrics.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout => ErrorCode::UpstreamTimeout,
            Self::RateLimited { .. } => ErrorCode::UpstreamRateLimited,
            Self::Http { .. } | Self::Transport(_) | Self::EmptyReply | Self::Malformed(_) => {
                ErrorCode::UpstreamError
            }
        }
    }
}

impl From<reqwest::Error> for VisionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// A decoded, type-checked image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    bytes: Vec<u8>,
    mime_type: String,
}

impl ImageInput {
    /// Decodes base64 image data. A `data:<mime>;base64,` prefix is
    /// accepted. The MIME type is sniffed from the bytes; `declared_mime`
    /// is only used when sniffing fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidImage`] when the data is not valid
    /// base64, is empty, exceeds `max_bytes`, or is not an image.
    pub fn from_base64(
        data: &str,
        declared_mime: Option<&str>,
        max_bytes: usize,
    ) -> Result<Self, ServiceError> {
        let (uri_mime, encoded) = match data.trim().strip_prefix("data:") {
            Some(rest) => {
                let Some((header, payload)) = rest.split_once(',') else {
                    return Err(ServiceError::InvalidImage("malformed data URI".to_string()));
                };
                (header.strip_suffix(";base64"), payload)
            }
            None => (None, data.trim()),
        };
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ServiceError::InvalidImage(format!("invalid base64: {e}")))?;
        Self::from_bytes(bytes, declared_mime.or(uri_mime), max_bytes)
    }

    /// Wraps raw image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidImage`] when the bytes are empty,
    /// exceed `max_bytes`, or are not an image.
    pub fn from_bytes(
        bytes: Vec<u8>,
        declared_mime: Option<&str>,
        max_bytes: usize,
    ) -> Result<Self, ServiceError> {
        if bytes.is_empty() {
            return Err(ServiceError::InvalidImage("image is empty".to_string()));
        }
        if bytes.len() > max_bytes {
            return Err(ServiceError::InvalidImage(format!(
                "image is {} bytes (max {max_bytes})",
                bytes.len()
            )));
        }
        let mime_type = match infer::get(&bytes) {
            Some(kind) if kind.matcher_type() == infer::MatcherType::Image => kind.mime_type().to_string(),
            Some(kind) => {
                return Err(ServiceError::InvalidImage(format!(
                    "expected an image, got {}",
                    kind.mime_type()
                )));
            }
            None => match declared_mime {
                Some(mime) if mime.starts_with("image/") => mime.to_string(),
                _ => {
                    return Err(ServiceError::InvalidImage(
                        "unrecognized image format".to_string(),
                    ));
                }
            },
        };
        Ok(Self { bytes, mime_type })
    }

    /// Image bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Detected MIME type.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`: empty images are rejected on construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:` URI form for providers that take inline images.
    #[must_use]
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// A model that reads an image under a prompt and replies with text.
#[async_trait]
pub trait VisionModel: Send + Sync + std::fmt::Debug {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Sends the prompt and image; returns the raw reply text.
    async fn extract(&self, prompt: &str, image: &ImageInput) -> Result<String, VisionError>;
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn sniffs_png_and_ignores_declared_type() {
        let mut bytes = PNG_HEADER.to_vec();
        bytes.extend_from_slice(&[0; 16]);
        let encoded = STANDARD.encode(&bytes);
        let Ok(image) = ImageInput::from_base64(&encoded, Some("image/jpeg"), 1024) else {
            panic!("png expected");
        };
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.len(), 24);
        assert!(image.to_data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn accepts_data_uri() {
        let mut bytes = PNG_HEADER.to_vec();
        bytes.push(1);
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(&bytes));
        assert!(ImageInput::from_base64(&uri, None, 1024).is_ok());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            ImageInput::from_base64("%%%", None, 1024),
            Err(ServiceError::InvalidImage(_))
        ));
        assert!(ImageInput::from_base64("", None, 1024).is_err());
        let pdf = STANDARD.encode(b"%PDF-1.7 rest of file");
        assert!(ImageInput::from_base64(&pdf, Some("image/png"), 1024).is_err());
        let unknown = STANDARD.encode(b"plain bytes");
        assert!(ImageInput::from_base64(&unknown, None, 1024).is_err());
        assert!(ImageInput::from_base64(&unknown, Some("image/heic"), 1024).is_ok());

        let big = STANDARD.encode([0_u8; 64]);
        assert!(ImageInput::from_base64(&big, Some("image/png"), 32).is_err());
    }

    #[test]
    fn error_codes() {
        assert_eq!(VisionError::Timeout.code(), ErrorCode::UpstreamTimeout);
        assert_eq!(
            VisionError::RateLimited {
                retry_after_secs: Some(3)
            }
            .code(),
            ErrorCode::UpstreamRateLimited
        );
        assert_eq!(VisionError::EmptyReply.code(), ErrorCode::UpstreamError);
    }
}
