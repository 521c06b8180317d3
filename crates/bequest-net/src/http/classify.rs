//! Response content classification.
//!
//! A response is classified from its `Content-Type` header first. When the
//! header is missing or names something we cannot decode, the leading bytes
//! of the body are checked against known image signatures. Anything else is
//! treated as raw bytes.

use http::HeaderMap;
use http::header::CONTENT_TYPE;
use mime::Mime;

/// Maximum number of body bytes inspected when sniffing.
pub const SNIFF_LEN: usize = 16;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF87_SIGNATURE: &[u8] = b"GIF87a";
const GIF89_SIGNATURE: &[u8] = b"GIF89a";

/// The decoding strategy selected for a response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// A JSON document.
    Json,
    /// A PNG image.
    Png,
    /// A JPEG image.
    Jpeg,
    /// A GIF image.
    Gif,
    /// Anything else; the body is handed over untouched.
    Raw,
}

impl ContentType {
    /// Returns `true` for the image family.
    pub fn is_image(self) -> bool {
        matches!(self, Self::Png | Self::Jpeg | Self::Gif)
    }

    /// Classify a `Content-Type` header value.
    ///
    /// Returns `None` when the value does not parse or is not a type this
    /// crate decodes.
    pub fn from_mime(value: &str) -> Option<Self> {
        let mime: Mime = value.trim().parse().ok()?;

        if mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON) {
            return Some(Self::Json);
        }
        if mime.type_() != mime::IMAGE {
            return None;
        }

        let subtype = mime.subtype();
        if subtype == mime::PNG {
            Some(Self::Png)
        } else if subtype == mime::JPEG || subtype == "jpg" || subtype == "pjpeg" {
            Some(Self::Jpeg)
        } else if subtype == mime::GIF {
            Some(Self::Gif)
        } else {
            None
        }
    }

    /// Classify a body by its leading bytes. Only the first [`SNIFF_LEN`]
    /// bytes are looked at.
    pub fn sniff(prefix: &[u8]) -> Option<Self> {
        let prefix = &prefix[..prefix.len().min(SNIFF_LEN)];

        if prefix.starts_with(PNG_SIGNATURE) {
            Some(Self::Png)
        } else if prefix.starts_with(JPEG_SIGNATURE) {
            Some(Self::Jpeg)
        } else if prefix.starts_with(GIF87_SIGNATURE) || prefix.starts_with(GIF89_SIGNATURE) {
            Some(Self::Gif)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "JSON"),
            Self::Png => write!(f, "PNG"),
            Self::Jpeg => write!(f, "JPEG"),
            Self::Gif => write!(f, "GIF"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

/// Pick a decoding strategy from response headers and a body prefix.
pub fn classify(headers: &HeaderMap, body_prefix: &[u8]) -> ContentType {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(ContentType::from_mime)
        .or_else(|| ContentType::sniff(body_prefix))
        .unwrap_or(ContentType::Raw)
}
