//! Message-type classification and typed decoding of the supported sensor messages.

pub mod images;
pub mod imu;
pub mod laserscan;
pub mod pointcloud;

use crate::error::DecodeError;
use images::{CompressedImageMsg, ImageMsg, ImagePayload};
use pointcloud::{PointCloudMsg, PointRecord};

pub const POINTCLOUD_TYPES: &[&str] = &["sensor_msgs/PointCloud2", "sensor_msgs/msg/PointCloud2"];
pub const IMAGE_TYPES: &[&str] = &["sensor_msgs/Image", "sensor_msgs/msg/Image"];
pub const IMU_TYPES: &[&str] = &["sensor_msgs/Imu", "sensor_msgs/msg/Imu"];
pub const LASERSCAN_TYPES: &[&str] = &["sensor_msgs/LaserScan", "sensor_msgs/msg/LaserScan"];
pub const COMPRESSED_IMAGE_TYPES: &[&str] = &[
    "sensor_msgs/CompressedImage",
    "sensor_msgs/msg/CompressedImage",
];

/// The message shapes the pipeline decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    PointCloud,
    Image,
    CompressedImage,
}

impl StreamKind {
    /// Category of a message type tag, `None` for types outside synchronization.
    pub fn classify(msg_type: &str) -> Option<Self> {
        if POINTCLOUD_TYPES.contains(&msg_type) {
            Some(StreamKind::PointCloud)
        } else if IMAGE_TYPES.contains(&msg_type) {
            Some(StreamKind::Image)
        } else if COMPRESSED_IMAGE_TYPES.contains(&msg_type) {
            Some(StreamKind::CompressedImage)
        } else {
            None
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, StreamKind::Image | StreamKind::CompressedImage)
    }
}

#[derive(Debug, Clone)]
pub enum SensorMessage<'a> {
    PointCloud(PointCloudMsg<'a>),
    Image(ImageMsg<'a>),
    CompressedImage(CompressedImageMsg<'a>),
}

#[derive(Debug, Clone)]
pub enum DecodedPayload {
    Points(Vec<PointRecord>),
    Image(ImagePayload),
}

impl<'a> SensorMessage<'a> {
    pub fn parse(kind: StreamKind, payload: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(match kind {
            StreamKind::PointCloud => SensorMessage::PointCloud(pointcloud::parse_pointcloud2(payload)?),
            StreamKind::Image => SensorMessage::Image(images::parse_ros_image(payload)?),
            StreamKind::CompressedImage => {
                SensorMessage::CompressedImage(images::parse_ros_compressed(payload)?)
            }
        })
    }

    pub fn decode(&self) -> Result<DecodedPayload, DecodeError> {
        Ok(match self {
            SensorMessage::PointCloud(msg) => DecodedPayload::Points(msg.points()?),
            SensorMessage::Image(msg) => DecodedPayload::Image(images::decode_image(msg)?),
            SensorMessage::CompressedImage(msg) => {
                DecodedPayload::Image(images::decode_compressed(msg)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(StreamKind::classify("sensor_msgs/PointCloud2"), Some(StreamKind::PointCloud));
        assert_eq!(StreamKind::classify("sensor_msgs/msg/Image"), Some(StreamKind::Image));
        assert_eq!(
            StreamKind::classify("sensor_msgs/CompressedImage"),
            Some(StreamKind::CompressedImage)
        );
        assert_eq!(StreamKind::classify("sensor_msgs/Imu"), None);
        assert!(!StreamKind::PointCloud.is_image());
    }

    #[test]
    fn test_parse_garbage_is_decode_error() {
        for kind in [StreamKind::PointCloud, StreamKind::Image, StreamKind::CompressedImage] {
            assert!(SensorMessage::parse(kind, &[1, 2, 3]).is_err());
        }
    }
}
