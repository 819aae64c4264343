//! sensor_msgs/LaserScan parsing for topic extraction

use crate::error::DecodeError;
use crate::wire::{Cursor, Header};

#[derive(Debug, Clone, PartialEq)]
pub struct LaserScanMsg {
    pub header: Header,
    pub angle_min: f32,
    pub angle_max: f32,
    pub angle_increment: f32,
    pub time_increment: f32,
    pub scan_time: f32,
    pub range_min: f32,
    pub range_max: f32,
    pub ranges: Vec<f32>,
    pub intensities: Vec<f32>,
}

impl LaserScanMsg {
    /// Smallest and largest finite range, `None` when there is none.
    pub fn range_extent(&self) -> Option<(f32, f32)> {
        self.ranges
            .iter()
            .copied()
            .filter(|r| r.is_finite())
            .fold(None, |acc, r| match acc {
                None => Some((r, r)),
                Some((lo, hi)) => Some((lo.min(r), hi.max(r))),
            })
    }
}

pub fn parse_laserscan(payload: &[u8]) -> Result<LaserScanMsg, DecodeError> {
    let mut cursor = Cursor::new(payload);
    Ok(LaserScanMsg {
        header: cursor.read_header()?,
        angle_min: cursor.read_f32_le("angle_min")?,
        angle_max: cursor.read_f32_le("angle_max")?,
        angle_increment: cursor.read_f32_le("angle_increment")?,
        time_increment: cursor.read_f32_le("time_increment")?,
        scan_time: cursor.read_f32_le("scan_time")?,
        range_min: cursor.read_f32_le("range_min")?,
        range_max: cursor.read_f32_le("range_max")?,
        ranges: cursor.read_f32_array("ranges")?,
        intensities: cursor.read_f32_array("intensities")?,
    })
}
