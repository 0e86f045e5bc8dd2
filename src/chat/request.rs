//! Query requests and image input resolution

use crate::api::ClientError;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::Path;

/// Default number of products requested per query
pub const DEFAULT_LIMIT: NonZeroU32 = match NonZeroU32::new(10) {
    Some(limit) => limit,
    None => panic!("default limit must be non-zero"),
};

/// Content type assumed when an image carries no type information
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Accepts padded and unpadded standard base64
const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The kind of input a query carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Image,
    TextImage,
    Similarity,
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::TextImage => "text+image",
            Modality::Similarity => "similarity",
        };
        write!(f, "{}", name)
    }
}

/// Raw image as handed over by the caller
///
/// All three encodings resolve to the same [`ImagePayload`] through
/// [`ImageInput::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Binary content, e.g. a file read from disk
    RawBytes {
        bytes: Vec<u8>,
        file_name: Option<String>,
        mime_type: Option<String>,
    },
    /// `data:image/png;base64,...`
    DataUri(String),
    /// Bare base64 without any prefix
    Base64(String),
}

/// Image ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl ImageInput {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ImageInput::RawBytes {
            bytes,
            file_name: None,
            mime_type: None,
        }
    }

    /// Classify a textual image: data URI when prefixed with `data:`,
    /// bare base64 otherwise
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.starts_with("data:") {
            ImageInput::DataUri(trimmed.to_string())
        } else {
            ImageInput::Base64(trimmed.to_string())
        }
    }

    /// Read an image file; the content type follows the extension
    pub fn from_path(path: &Path) -> Result<Self, ClientError> {
        let bytes = std::fs::read(path).map_err(|e| {
            ClientError::Query(format!("Failed to read image {}: {}", path.display(), e))
        })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        let mime_type = path
            .extension()
            .and_then(|ext| mime_for_extension(&ext.to_string_lossy()))
            .map(str::to_string);

        Ok(ImageInput::RawBytes {
            bytes,
            file_name,
            mime_type,
        })
    }

    /// Normalize to binary content plus content type
    ///
    /// Base64 is decoded exactly once. Failures surface as
    /// `ClientError::Query`.
    pub fn resolve(&self) -> Result<ImagePayload, ClientError> {
        let (bytes, mime_type, file_name) = match self {
            ImageInput::RawBytes {
                bytes,
                file_name,
                mime_type,
            } => (bytes.clone(), mime_type.clone(), file_name.clone()),
            ImageInput::DataUri(uri) => {
                let (mime, data) = split_data_uri(uri)?;
                (decode_base64(data)?, mime, None)
            }
            ImageInput::Base64(data) => (decode_base64(data)?, None, None),
        };

        if bytes.is_empty() {
            return Err(ClientError::Query("Image payload is empty".to_string()));
        }

        let mime_type = mime_type.unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
        let file_name =
            file_name.unwrap_or_else(|| format!("upload.{}", extension_for_mime(&mime_type)));

        Ok(ImagePayload {
            bytes,
            mime_type,
            file_name,
        })
    }
}

/// Split `data:<mime>;base64,<payload>` into its MIME type and payload
fn split_data_uri(uri: &str) -> Result<(Option<String>, &str), ClientError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ClientError::Query("Not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ClientError::Query("Malformed data URI: missing ','".to_string()))?;

    let mut params = header.split(';');
    let mime = params
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_ascii_lowercase);

    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(ClientError::Query(
            "Unsupported data URI: only base64 encoded images are accepted".to_string(),
        ));
    }

    Ok((mime, payload))
}

fn decode_base64(data: &str) -> Result<Vec<u8>, ClientError> {
    // Pasted payloads often carry line breaks
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64_LENIENT
        .decode(compact.as_bytes())
        .map_err(|e| ClientError::Query(format!("Invalid base64 image data: {}", e)))
}

pub(crate) fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

/// One product query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub modality: Modality,
    pub query: Option<String>,
    pub image: Option<ImageInput>,
    pub category: Option<String>,
    pub limit: NonZeroU32,
}

impl QueryRequest {
    fn new(modality: Modality) -> Self {
        Self {
            modality,
            query: None,
            image: None,
            category: None,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn text(query: impl Into<String>) -> Self {
        Self::new(Modality::Text).with_query(query)
    }

    pub fn image(image: ImageInput) -> Self {
        Self::new(Modality::Image).with_image(image)
    }

    pub fn text_image(query: impl Into<String>, image: ImageInput) -> Self {
        Self::new(Modality::TextImage)
            .with_query(query)
            .with_image(image)
    }

    pub fn similarity(description: impl Into<String>) -> Self {
        Self::new(Modality::Similarity).with_query(description)
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the result-count limit; zero is rejected
    pub fn with_limit(mut self, limit: u32) -> Result<Self, ClientError> {
        self.limit = NonZeroU32::new(limit)
            .ok_or_else(|| ClientError::Query("limit must be greater than zero".to_string()))?;
        Ok(self)
    }

    /// Non-blank query text
    pub fn query_text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Non-blank category filter
    pub fn category_filter(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}
