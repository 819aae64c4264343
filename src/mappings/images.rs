//! sensor_msgs/Image and sensor_msgs/CompressedImage → pixel buffers → JPEG

use std::fmt;
use std::io::Cursor as IoCursor;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, RgbImage, RgbaImage};

use crate::error::{DecodeError, ImageDecodeError};
use crate::wire::{Cursor, Header};

/// Pixel layouts the decoder knows about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PixelEncoding {
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Mono8,
    Mono16,
    /// Any `bayer_*` pattern; stored as grayscale, never demosaiced
    Bayer(String),
    Unknown(String),
}

impl PixelEncoding {
    pub fn from_ros(encoding: &str) -> Self {
        match encoding {
            "rgb8" => PixelEncoding::Rgb8,
            "bgr8" => PixelEncoding::Bgr8,
            "rgba8" => PixelEncoding::Rgba8,
            "bgra8" => PixelEncoding::Bgra8,
            "mono8" => PixelEncoding::Mono8,
            "mono16" => PixelEncoding::Mono16,
            other if other.starts_with("bayer_") => PixelEncoding::Bayer(other.to_string()),
            other => PixelEncoding::Unknown(other.to_string()),
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            PixelEncoding::Rgb8 | PixelEncoding::Bgr8 => 3,
            PixelEncoding::Rgba8 | PixelEncoding::Bgra8 => 4,
            PixelEncoding::Mono8
            | PixelEncoding::Mono16
            | PixelEncoding::Bayer(_)
            | PixelEncoding::Unknown(_) => 1,
        }
    }

    pub fn bit_depth(&self) -> usize {
        match self {
            PixelEncoding::Mono16 => 16,
            _ => 8,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.channels() * self.bit_depth() / 8
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelEncoding::Rgb8 => f.write_str("rgb8"),
            PixelEncoding::Bgr8 => f.write_str("bgr8"),
            PixelEncoding::Rgba8 => f.write_str("rgba8"),
            PixelEncoding::Bgra8 => f.write_str("bgra8"),
            PixelEncoding::Mono8 => f.write_str("mono8"),
            PixelEncoding::Mono16 => f.write_str("mono16"),
            PixelEncoding::Bayer(s) | PixelEncoding::Unknown(s) => f.write_str(s),
        }
    }
}

/// A parsed `sensor_msgs/Image`, borrowing its pixel data from the payload.
#[derive(Debug, Clone)]
pub struct ImageMsg<'a> {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: bool,
    pub step: u32,
    pub data: &'a [u8],
}

/// A parsed `sensor_msgs/CompressedImage`.
#[derive(Debug, Clone)]
pub struct CompressedImageMsg<'a> {
    pub header: Header,
    pub format: String,
    pub data: &'a [u8],
}

/// Image content as held between decoding and writing.
#[derive(Debug, Clone)]
pub enum ImagePayload {
    /// Decoded pixels, ready for the JPEG encoder
    Pixels(DynamicImage),
    /// Already-compressed bytes stored as-is
    Encoded {
        extension: &'static str,
        bytes: Vec<u8>,
    },
    /// Undecodable data written verbatim
    Raw(Vec<u8>),
}

/// Bytes ready to be written, with the extension they should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
    /// Bytes are not a valid file of `extension`
    pub raw: bool,
}

pub const JPEG_EXTENSION: &str = "jpg";

pub fn parse_ros_image(payload: &[u8]) -> Result<ImageMsg<'_>, DecodeError> {
    let mut cursor = Cursor::new(payload);
    let header = cursor.read_header()?;
    let height = cursor.read_u32_le("height")?;
    let width = cursor.read_u32_le("width")?;
    let encoding = cursor.read_string("encoding")?;
    let is_bigendian = cursor.read_bool("is_bigendian")?;
    let step = cursor.read_u32_le("step")?;
    let data = cursor.read_byte_array("data")?;

    tracing::trace!(
        "parsed image: {}x{} {}, data size: {}",
        width,
        height,
        encoding,
        data.len()
    );
    Ok(ImageMsg {
        header,
        height,
        width,
        encoding,
        is_bigendian,
        step,
        data,
    })
}

pub fn parse_ros_compressed(payload: &[u8]) -> Result<CompressedImageMsg<'_>, DecodeError> {
    let mut cursor = Cursor::new(payload);
    let header = cursor.read_header()?;
    let format = cursor.read_string("format")?;
    let data = cursor.read_byte_array("data")?;
    Ok(CompressedImageMsg {
        header,
        format,
        data,
    })
}

/// Decode raw pixel bytes into a canonical buffer.
///
/// Rows padded beyond `width * bytes_per_pixel` (a larger `step`) are
/// unpadded; surplus bytes at the end of the buffer are ignored.
pub fn decode_pixels(
    width: u32,
    height: u32,
    encoding: &PixelEncoding,
    data: &[u8],
    is_bigendian: bool,
    step: u32,
) -> Result<DynamicImage, ImageDecodeError> {
    if width == 0 || height == 0 || data.is_empty() {
        return Err(ImageDecodeError::InvalidParameters {
            width,
            height,
            data_len: data.len(),
        });
    }

    let overflow = || ImageDecodeError::DimensionOverflow { width, height };
    let row_bytes = (width as usize)
        .checked_mul(encoding.bytes_per_pixel())
        .ok_or_else(overflow)?;
    let expected = row_bytes.checked_mul(height as usize).ok_or_else(overflow)?;
    let step = step as usize;

    let pixels: Vec<u8> = if step > row_bytes
        && step
            .checked_mul(height as usize)
            .is_some_and(|padded| data.len() >= padded)
    {
        data.chunks_exact(step)
            .take(height as usize)
            .flat_map(|row| &row[..row_bytes])
            .copied()
            .collect()
    } else if data.len() < expected {
        return Err(ImageDecodeError::BufferTooShort {
            encoding: encoding.to_string(),
            expected,
            actual: data.len(),
        });
    } else {
        data[..expected].to_vec()
    };

    let too_short = |actual: usize| ImageDecodeError::BufferTooShort {
        encoding: encoding.to_string(),
        expected,
        actual,
    };

    let img = match encoding {
        PixelEncoding::Rgb8 => {
            let len = pixels.len();
            DynamicImage::ImageRgb8(
                RgbImage::from_raw(width, height, pixels).ok_or_else(|| too_short(len))?,
            )
        }
        PixelEncoding::Bgr8 => {
            let mut buf = pixels;
            for px in buf.chunks_exact_mut(3) {
                px.swap(0, 2);
            } // BGR→RGB
            let len = buf.len();
            DynamicImage::ImageRgb8(
                RgbImage::from_raw(width, height, buf).ok_or_else(|| too_short(len))?,
            )
        }
        PixelEncoding::Rgba8 => {
            let len = pixels.len();
            DynamicImage::ImageRgba8(
                RgbaImage::from_raw(width, height, pixels).ok_or_else(|| too_short(len))?,
            )
        }
        PixelEncoding::Bgra8 => {
            let mut buf = pixels;
            for px in buf.chunks_exact_mut(4) {
                px.swap(0, 2);
            } // BGRA→RGBA
            let len = buf.len();
            DynamicImage::ImageRgba8(
                RgbaImage::from_raw(width, height, buf).ok_or_else(|| too_short(len))?,
            )
        }
        PixelEncoding::Mono16 => {
            let samples: Vec<u16> = pixels
                .chunks_exact(2)
                .map(|c| {
                    if is_bigendian {
                        u16::from_be_bytes([c[0], c[1]])
                    } else {
                        u16::from_le_bytes([c[0], c[1]])
                    }
                })
                .collect();
            let len = samples.len() * 2;
            let buf: ImageBuffer<Luma<u16>, Vec<u16>> =
                ImageBuffer::from_raw(width, height, samples).ok_or_else(|| too_short(len))?;
            DynamicImage::ImageLuma16(buf)
        }
        PixelEncoding::Mono8 | PixelEncoding::Bayer(_) | PixelEncoding::Unknown(_) => {
            if let PixelEncoding::Unknown(other) = encoding {
                tracing::warn!(encoding = %other, "unknown image encoding; treating as mono8");
            }
            let len = pixels.len();
            DynamicImage::ImageLuma8(
                GrayImage::from_raw(width, height, pixels).ok_or_else(|| too_short(len))?,
            )
        }
    };

    Ok(img)
}

/// Decode an image message, degrading to raw bytes when the layout is wrong.
///
/// Only [`ImageDecodeError::InvalidParameters`] is returned; every other
/// failure becomes [`ImagePayload::Raw`].
pub fn decode_image(msg: &ImageMsg<'_>) -> Result<ImagePayload, ImageDecodeError> {
    let encoding = PixelEncoding::from_ros(&msg.encoding);
    match decode_pixels(
        msg.width,
        msg.height,
        &encoding,
        msg.data,
        msg.is_bigendian,
        msg.step,
    ) {
        Ok(img) => Ok(ImagePayload::Pixels(img)),
        Err(e) if e.allows_raw_fallback() => {
            tracing::debug!("image decode failed ({e}); keeping raw bytes");
            Ok(ImagePayload::Raw(msg.data.to_vec()))
        }
        Err(e) => Err(e),
    }
}

pub fn decode_compressed(msg: &CompressedImageMsg<'_>) -> Result<ImagePayload, ImageDecodeError> {
    if msg.data.is_empty() {
        return Err(ImageDecodeError::InvalidParameters {
            width: 0,
            height: 0,
            data_len: 0,
        });
    }
    Ok(ImagePayload::Encoded {
        extension: compressed_extension(&msg.format),
        bytes: msg.data.to_vec(),
    })
}

/// File extension for a CompressedImage `format` string.
pub fn compressed_extension(format: &str) -> &'static str {
    let fmt_lc = format.to_ascii_lowercase();
    if fmt_lc.contains("png") {
        "png"
    } else if fmt_lc.contains("jpg") || fmt_lc.contains("jpeg") {
        JPEG_EXTENSION
    } else {
        "bin"
    }
}

/// JPEG-encode a pixel buffer.
///
/// JPEG has no alpha or 16-bit samples: RGBA is flattened to RGB and 16-bit
/// grayscale is scaled down to 8 bits first.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let converted;
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img,
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            converted = DynamicImage::ImageLuma8(img.to_luma8());
            &converted
        }
        _ => {
            converted = DynamicImage::ImageRgb8(img.to_rgb8());
            &converted
        }
    };
    let mut buf = IoCursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg)
        .context("encode jpeg")?;
    Ok(buf.into_inner())
}

impl ImagePayload {
    /// Bytes to write for this image. Never fails: an encoder error falls
    /// back to the decoded sample bytes (canonical RGB/RGBA/gray order,
    /// row padding removed), flagged as raw.
    pub fn encode(&self) -> EncodedImage {
        match self {
            ImagePayload::Pixels(img) => match encode_jpeg(img) {
                Ok(bytes) => EncodedImage {
                    extension: JPEG_EXTENSION,
                    bytes,
                    raw: false,
                },
                Err(e) => {
                    tracing::warn!("{e:#}; writing raw pixel bytes");
                    EncodedImage {
                        extension: JPEG_EXTENSION,
                        bytes: img.as_bytes().to_vec(),
                        raw: true,
                    }
                }
            },
            ImagePayload::Encoded { extension, bytes } => EncodedImage {
                extension,
                bytes: bytes.clone(),
                raw: false,
            },
            // The raw fallback keeps the path a decoded image would have had.
            ImagePayload::Raw(bytes) => EncodedImage {
                extension: JPEG_EXTENSION,
                bytes: bytes.clone(),
                raw: true,
            },
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, ImagePayload::Raw(_))
    }
}
