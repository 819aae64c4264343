//! sensor_msgs/Imu parsing for topic extraction

use crate::error::DecodeError;
use crate::wire::{Cursor, Header};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImuMsg {
    pub header: Header,
    pub orientation: Quaternion,
    pub angular_velocity: Vector3,
    pub linear_acceleration: Vector3,
}

// 3x3 float64 covariance
const COVARIANCE_BYTES: usize = 9 * 8;

fn read_vector3(cursor: &mut Cursor<'_>, field: &'static str) -> Result<Vector3, DecodeError> {
    Ok(Vector3 {
        x: cursor.read_f64_le(field)?,
        y: cursor.read_f64_le(field)?,
        z: cursor.read_f64_le(field)?,
    })
}

pub fn parse_ros_imu(payload: &[u8]) -> Result<ImuMsg, DecodeError> {
    let mut cursor = Cursor::new(payload);
    let header = cursor.read_header()?;
    let orientation = Quaternion {
        x: cursor.read_f64_le("orientation")?,
        y: cursor.read_f64_le("orientation")?,
        z: cursor.read_f64_le("orientation")?,
        w: cursor.read_f64_le("orientation")?,
    };
    cursor.skip(COVARIANCE_BYTES, "orientation_covariance")?;
    let angular_velocity = read_vector3(&mut cursor, "angular_velocity")?;
    cursor.skip(COVARIANCE_BYTES, "angular_velocity_covariance")?;
    let linear_acceleration = read_vector3(&mut cursor, "linear_acceleration")?;

    Ok(ImuMsg {
        header,
        orientation,
        angular_velocity,
        linear_acceleration,
    })
}
