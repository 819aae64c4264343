//! PointCloud2 → flat XYZ point records

use anyhow::{anyhow, Result};
use nalgebra::{Rotation3, Vector3};

use crate::error::DecodeError;
use crate::wire::{f32_le_at, Cursor, Header};

/// One decoded point: `[x, y, z]`.
pub type PointRecord = [f32; 3];

/// Offsets used when a cloud does not name its x/y/z fields.
pub const DEFAULT_X_OFFSET: usize = 0;
pub const DEFAULT_Y_OFFSET: usize = 4;
pub const DEFAULT_Z_OFFSET: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointField {
    pub name: String,
    pub offset: u32,
    pub datatype: u8,
    pub count: u32,
}

/// Where named scalar fields sit inside one point record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldLayout {
    fields: Vec<PointField>,
}

impl FieldLayout {
    pub fn new(fields: Vec<PointField>) -> Self {
        Self { fields }
    }

    /// Layout naming only x/y/z at the given offsets.
    pub fn xyz(x: u32, y: u32, z: u32) -> Self {
        let field = |name: &str, offset| PointField {
            name: name.to_string(),
            offset,
            datatype: 7, // FLOAT32
            count: 1,
        };
        Self::new(vec![field("x", x), field("y", y), field("z", z)])
    }

    pub fn fields(&self) -> &[PointField] {
        &self.fields
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.offset as usize)
    }

    /// x/y/z offsets, falling back to 0/4/8 for unnamed fields.
    pub fn xyz_offsets(&self) -> (usize, usize, usize) {
        (
            self.offset_of("x").unwrap_or(DEFAULT_X_OFFSET),
            self.offset_of("y").unwrap_or(DEFAULT_Y_OFFSET),
            self.offset_of("z").unwrap_or(DEFAULT_Z_OFFSET),
        )
    }
}

/// A parsed `sensor_msgs/PointCloud2`, borrowing its data from the payload.
#[derive(Debug, Clone)]
pub struct PointCloudMsg<'a> {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub layout: FieldLayout,
    pub is_bigendian: bool,
    pub point_step: u32,
    pub row_step: u32,
    pub data: &'a [u8],
    pub is_dense: bool,
}

impl PointCloudMsg<'_> {
    pub fn points(&self) -> Result<Vec<PointRecord>, DecodeError> {
        if self.is_bigendian {
            tracing::debug!("big-endian PointCloud2 flag set; decoding as little-endian");
        }
        decode_points(self.point_step as usize, self.data, &self.layout)
    }
}

pub fn parse_pointcloud2(payload: &[u8]) -> Result<PointCloudMsg<'_>, DecodeError> {
    let mut cursor = Cursor::new(payload);
    let header = cursor.read_header()?;
    let height = cursor.read_u32_le("height")?;
    let width = cursor.read_u32_le("width")?;
    let layout = parse_fields(&mut cursor)?;
    let is_bigendian = cursor.read_bool("is_bigendian")?;
    let point_step = cursor.read_u32_le("point_step")?;
    let row_step = cursor.read_u32_le("row_step")?;
    let data = cursor.read_byte_array("data")?;
    // Some writers drop the trailing flag; treat a missing one as dense.
    let is_dense = if cursor.remaining() > 0 {
        cursor.read_bool("is_dense")?
    } else {
        true
    };

    Ok(PointCloudMsg {
        header,
        height,
        width,
        layout,
        is_bigendian,
        point_step,
        row_step,
        data,
        is_dense,
    })
}

fn parse_fields(cursor: &mut Cursor<'_>) -> Result<FieldLayout, DecodeError> {
    let len = cursor.read_u32_le("fields.len")? as usize;
    // Each PointField needs at least 13 bytes; don't trust `len` for the allocation.
    let mut fields = Vec::with_capacity(len.min(cursor.remaining() / 13));
    for _ in 0..len {
        let name = cursor.read_string("fields.name")?;
        let offset = cursor.read_u32_le("fields.offset")?;
        let datatype = cursor.read_u8("fields.datatype")?;
        let count = cursor.read_u32_le("fields.count")?;
        fields.push(PointField {
            name,
            offset,
            datatype,
            count,
        });
    }
    Ok(FieldLayout::new(fields))
}

/// Decode `data` as a run of `point_step`-sized records.
///
/// Yields `data.len() / point_step` points; a trailing partial record is
/// ignored and decoding stops at the first record whose x/y/z would read past
/// the end of `data`. Empty data is an empty cloud, not an error.
pub fn decode_points(
    point_step: usize,
    data: &[u8],
    layout: &FieldLayout,
) -> Result<Vec<PointRecord>, DecodeError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if point_step == 0 {
        return Err(DecodeError::ZeroPointStep {
            data_len: data.len(),
        });
    }

    let (x_off, y_off, z_off) = layout.xyz_offsets();
    let num_points = data.len() / point_step;
    let mut points = Vec::with_capacity(num_points);

    for i in 0..num_points {
        let base = i * point_step;
        let (Some(x), Some(y), Some(z)) = (
            f32_le_at(data, base + x_off),
            f32_le_at(data, base + y_off),
            f32_le_at(data, base + z_off),
        ) else {
            break;
        };
        points.push([x, y, z]);
    }

    Ok(points)
}

/// Rigid rotation applied to every decoded point before it is written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRotation {
    rotation: Rotation3<f32>,
}

impl PointRotation {
    /// Parse `"roll,pitch,yaw"` in degrees.
    pub fn parse(rotation_str: &str) -> Result<Self> {
        let parts: Vec<&str> = rotation_str.split(',').collect();
        if parts.len() != 3 {
            return Err(anyhow!(
                "The rotation must contain exactly 3 values separated by commas (roll,pitch,yaw)"
            ));
        }

        let parse = |name: &str, s: &str| {
            s.trim()
                .parse::<f32>()
                .map_err(|_| anyhow!("Failed to parse {}: '{}'", name, s))
        };
        let roll = parse("roll", parts[0])?;
        let pitch = parse("pitch", parts[1])?;
        let yaw = parse("yaw", parts[2])?;

        Ok(Self::from_degrees(roll, pitch, yaw))
    }

    pub fn from_degrees(roll: f32, pitch: f32, yaw: f32) -> Self {
        Self {
            rotation: Rotation3::from_euler_angles(
                roll.to_radians(),
                pitch.to_radians(),
                yaw.to_radians(),
            ),
        }
    }

    pub fn apply(&self, points: &mut [PointRecord]) {
        for p in points.iter_mut() {
            let v = self.rotation * Vector3::new(p[0], p[1], p[2]);
            *p = [v.x, v.y, v.z];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::testutil::*;

    fn xyz_record(x: f32, y: f32, z: f32, pad: usize) -> Vec<u8> {
        let mut rec = Vec::new();
        rec.extend_from_slice(&x.to_le_bytes());
        rec.extend_from_slice(&y.to_le_bytes());
        rec.extend_from_slice(&z.to_le_bytes());
        rec.extend(std::iter::repeat_n(0u8, pad));
        rec
    }

    #[test]
    fn test_parse_pointcloud2() {
        // Create a synthetic PC2 buffer with x,y,z,intensity fields
        let mut data = Vec::new();
        put_header(&mut data, 1, 0, "lidar");
        put_u32(&mut data, 1); // height
        put_u32(&mut data, 4); // width
        let fields = [("x", 0u32), ("y", 4), ("z", 8), ("intensity", 12)];
        put_u32(&mut data, fields.len() as u32);
        for (name, offset) in fields {
            put_string(&mut data, name);
            put_u32(&mut data, offset);
            data.push(7); // FLOAT32
            put_u32(&mut data, 1);
        }
        data.push(0); // is_bigendian
        put_u32(&mut data, 16); // point_step
        put_u32(&mut data, 64); // row_step
        put_u32(&mut data, 64); // data len
        for i in 0..4 {
            data.extend(xyz_record(i as f32, (i + 1) as f32, (i + 2) as f32, 4));
        }
        data.push(1); // is_dense

        let msg = parse_pointcloud2(&data).unwrap();
        assert_eq!(msg.header.stamp_ns, 1_000_000_000);
        assert_eq!(msg.point_step, 16);
        assert_eq!(msg.layout.fields().len(), 4);
        assert!(msg.is_dense);

        let points = msg.points().unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], [0.0, 1.0, 2.0]);
        assert_eq!(points[3], [3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_parse_truncated_data_is_error() {
        let mut data = Vec::new();
        put_header(&mut data, 0, 0, "");
        put_u32(&mut data, 1);
        put_u32(&mut data, 1);
        put_u32(&mut data, 0); // no fields
        data.push(0);
        put_u32(&mut data, 12);
        put_u32(&mut data, 12);
        put_u32(&mut data, 12); // claims 12 bytes
        data.extend_from_slice(&[0u8; 5]);

        let err = parse_pointcloud2(&data).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { field: "data", .. }));
    }

    #[test]
    fn test_count_ignores_trailing_partial_record() {
        let layout = FieldLayout::default();
        for k in 0..5usize {
            for r in 0..12usize {
                let mut data = Vec::new();
                for i in 0..k {
                    data.extend(xyz_record(i as f32, 0.0, 0.0, 0));
                }
                data.extend(std::iter::repeat_n(0xAAu8, r));
                let points = decode_points(12, &data, &layout).unwrap();
                assert_eq!(points.len(), k, "k={k} r={r}");
            }
        }
    }

    #[test]
    fn test_eleven_bytes_is_zero_points() {
        let points = decode_points(12, &[0u8; 11], &FieldLayout::default()).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_empty_buffer_is_empty_cloud() {
        assert!(decode_points(16, &[], &FieldLayout::default()).unwrap().is_empty());
        // Even a zero step is fine when there is nothing to read
        assert!(decode_points(0, &[], &FieldLayout::default()).unwrap().is_empty());
    }

    #[test]
    fn test_zero_point_step_with_data_is_error() {
        let err = decode_points(0, &[0u8; 12], &FieldLayout::default()).unwrap_err();
        assert_eq!(err, DecodeError::ZeroPointStep { data_len: 12 });
    }

    #[test]
    fn test_default_offsets_when_fields_unnamed() {
        let layout = FieldLayout::new(vec![PointField {
            name: "intensity".to_string(),
            offset: 12,
            datatype: 7,
            count: 1,
        }]);
        assert_eq!(layout.xyz_offsets(), (0, 4, 8));

        let data = xyz_record(1.0, 2.0, 3.0, 4);
        let points = decode_points(16, &data, &layout).unwrap();
        assert_eq!(points, vec![[1.0, 2.0, 3.0]]);
    }

    #[test]
    fn test_named_offsets_are_honored() {
        // z, y, x order inside the record
        let layout = FieldLayout::xyz(8, 4, 0);
        let data = xyz_record(3.0, 2.0, 1.0, 0);
        let points = decode_points(12, &data, &layout).unwrap();
        assert_eq!(points, vec![[1.0, 2.0, 3.0]]);
    }

    #[test]
    fn test_offset_past_record_stops_at_buffer_end() {
        // z sits beyond point_step, so the last record would read past the end
        let layout = FieldLayout::xyz(0, 4, 12);
        let mut data = Vec::new();
        for i in 0..3 {
            data.extend(xyz_record(i as f32, 0.0, 0.0, 0));
        }
        let points = decode_points(12, &data, &layout).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_non_finite_points_are_kept() {
        let data = xyz_record(f32::NAN, 1.0, f32::INFINITY, 0);
        let points = decode_points(12, &data, &FieldLayout::default()).unwrap();
        assert_eq!(points.len(), 1);
        assert!(points[0][0].is_nan());
    }

    #[test]
    fn test_rotation_about_x_by_180_negates_y_and_z() {
        let rotation = PointRotation::parse("180, 0, 0").unwrap();
        let mut points = vec![[1.0, 2.0, 3.0]];
        rotation.apply(&mut points);
        assert!((points[0][0] - 1.0).abs() < 1e-5);
        assert!((points[0][1] + 2.0).abs() < 1e-5);
        assert!((points[0][2] + 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_rotation_parse_errors() {
        assert!(PointRotation::parse("1,2").is_err());
        assert!(PointRotation::parse("a,0,0").is_err());
    }
}
