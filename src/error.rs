//! Error types shared by the decoders and the log readers.
//!
//! Decoding errors never cross the per-message boundary in [`crate::convert`]:
//! they are turned into a skip and counted. Only [`LogOpenError`] aborts a log.

use thiserror::Error;

/// Failure to decode one ROS message payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload ended before `field` could be read
    #[error("payload too short for {field} (need {needed} bytes at offset {offset}, have {len})")]
    Truncated {
        field: &'static str,
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// A point cloud with data but a zero `point_step`
    #[error("point_step is 0 but data holds {data_len} bytes")]
    ZeroPointStep { data_len: usize },

    #[error(transparent)]
    Image(#[from] ImageDecodeError),
}

/// Failure to turn an image message into a pixel buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageDecodeError {
    /// Zero width/height or empty data. The message is skipped.
    #[error("invalid image parameters: width={width}, height={height}, data_len={data_len}")]
    InvalidParameters {
        width: u32,
        height: u32,
        data_len: usize,
    },

    /// Fewer bytes than `width * height * bytes_per_pixel`
    #[error("image buffer too short for {encoding}: expected {expected} bytes, got {actual}")]
    BufferTooShort {
        encoding: String,
        expected: usize,
        actual: usize,
    },

    /// Dimensions overflow the addressable buffer size
    #[error("image dimensions {width}x{height} overflow")]
    DimensionOverflow { width: u32, height: u32 },
}

impl ImageDecodeError {
    /// Whether the raw bytes should still be written out as a fallback.
    pub fn allows_raw_fallback(&self) -> bool {
        !matches!(self, ImageDecodeError::InvalidParameters { .. })
    }
}

/// Failure to open a log file as one of the supported container formats.
#[derive(Debug, Error)]
pub enum LogOpenError {
    /// The opener does not recognize the file; the next opener is tried
    #[error("{format}: not a recognized log ({reason})")]
    UnrecognizedFormat { format: &'static str, reason: String },

    /// The opener recognized the file but could not read it
    #[error("{format}: failed to open {path}: {source}")]
    Open {
        format: &'static str,
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// Every opener rejected the file
    #[error("no supported log format for {path}: {}", attempts.join("; "))]
    NoSupportedFormat { path: String, attempts: Vec<String> },
}
