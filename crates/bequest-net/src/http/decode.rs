//! Response body decoding.
//!
//! [`decode`] turns a fully received body into the object its
//! [`ContentType`] promises. It never touches the network or shared state,
//! so the client runs it on a blocking worker once the transfer is done.

use bytes::Bytes;
use image::ImageFormat;

use super::classify::ContentType;
use crate::error::DecodeError;

/// A decoded bitmap with 8-bit RGBA pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    format: ContentType,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl DecodedImage {
    /// The image format the bitmap was decoded from.
    pub fn format(&self) -> ContentType {
        self.format
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA pixel data, row-major, four bytes per pixel.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Consume the image, returning its pixel buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// A decoded response body. The variant always matches the content type it
/// was decoded for: JSON types give `Json`, image types give `Image`, and
/// `Raw` gives `Bytes`.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedObject {
    /// A parsed JSON document.
    Json(serde_json::Value),
    /// A decoded bitmap.
    Image(DecodedImage),
    /// The body exactly as received.
    Bytes(Bytes),
}

impl DecodedObject {
    /// Returns the JSON value, if this is one.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the image, if this is one.
    pub fn as_image(&self) -> Option<&DecodedImage> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Returns the raw bytes, if this is an undecoded body.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Decode `body` according to `content_type`.
pub fn decode(content_type: ContentType, body: &Bytes) -> Result<DecodedObject, DecodeError> {
    match content_type {
        ContentType::Json => serde_json::from_slice(body)
            .map(DecodedObject::Json)
            .map_err(|err| DecodeError::malformed(content_type, err)),
        ContentType::Png => decode_image(content_type, ImageFormat::Png, body),
        ContentType::Jpeg => decode_image(content_type, ImageFormat::Jpeg, body),
        ContentType::Gif => decode_image(content_type, ImageFormat::Gif, body),
        ContentType::Raw => Ok(DecodedObject::Bytes(body.clone())),
    }
}

fn decode_image(
    content_type: ContentType,
    format: ImageFormat,
    body: &[u8],
) -> Result<DecodedObject, DecodeError> {
    let img = image::load_from_memory_with_format(body, format)
        .map_err(|err| DecodeError::malformed(content_type, err))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedObject::Image(DecodedImage {
        format: content_type,
        width,
        height,
        pixels: rgba.into_raw(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_json_object() {
        let body = Bytes::from_static(br#"{"one":"two","key":"value"}"#);
        let decoded = decode(ContentType::Json, &body).unwrap();
        let map = decoded.as_json().and_then(|v| v.as_object()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["one"], "two");
        assert_eq!(map["key"], "value");
    }

    #[test]
    fn test_json_key_order_is_irrelevant() {
        let a = decode(ContentType::Json, &Bytes::from_static(br#"{"one":"two","key":"value"}"#));
        let b = decode(ContentType::Json, &Bytes::from_static(br#"{"key":"value","one":"two"}"#));
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn test_json_array_and_scalars() {
        let body = Bytes::from_static(br#"[1, 2.5, "x", true, null, {"nested": []}]"#);
        let value = decode(ContentType::Json, &body).unwrap();
        let items = value.as_json().and_then(|v| v.as_array()).unwrap();
        assert_eq!(items.len(), 6);
        assert!(items[4].is_null());
    }

    #[test]
    fn test_malformed_json() {
        let err = decode(ContentType::Json, &Bytes::from_static(b"{\"one\": ")).unwrap_err();
        assert_eq!(err.content_type(), ContentType::Json);
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_png() {
        let body = Bytes::from(png_fixture(3, 2));
        let decoded = decode(ContentType::Png, &body).unwrap();
        let image = decoded.as_image().unwrap();
        assert_eq!(image.format(), ContentType::Png);
        assert_eq!((image.width(), image.height()), (3, 2));
        assert_eq!(image.pixels().len(), 3 * 2 * 4);
        assert_eq!(&image.pixels()[..4], &[200, 40, 40, 255]);
    }

    #[test]
    fn test_truncated_png() {
        let mut bytes = png_fixture(8, 8);
        bytes.truncate(24);
        let err = decode(ContentType::Png, &Bytes::from(bytes)).unwrap_err();
        assert_eq!(err.content_type(), ContentType::Png);
    }

    #[test]
    fn test_raw_is_untouched() {
        let body = Bytes::from_static(b"\x00\x01not decoded");
        let decoded = decode(ContentType::Raw, &body).unwrap();
        assert_eq!(decoded.as_bytes(), Some(&body));
    }
}
