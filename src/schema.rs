//! Schema command - Print the message types a conversion consumes

use anyhow::Result;

use crate::mappings::{StreamKind, COMPRESSED_IMAGE_TYPES, IMAGE_TYPES, POINTCLOUD_TYPES};
use crate::scene::{CAMERA_DIR, IMAGE_DIR, LIDAR_DIR};

/// Role and output location of each recognized type.
pub fn schema_rows() -> Vec<(&'static str, &'static str, String)> {
    let lidar = format!("{LIDAR_DIR}/NNNNNN.pcd");
    let camera = format!("{CAMERA_DIR}/{IMAGE_DIR}/NNNNNN.jpg");
    let compressed = format!("{CAMERA_DIR}/{IMAGE_DIR}/NNNNNN.<format>");

    let mut rows = Vec::new();
    for (types, kind) in [
        (POINTCLOUD_TYPES, StreamKind::PointCloud),
        (IMAGE_TYPES, StreamKind::Image),
        (COMPRESSED_IMAGE_TYPES, StreamKind::CompressedImage),
    ] {
        let (role, output) = match kind {
            StreamKind::PointCloud => ("reference", &lidar),
            StreamKind::Image => ("auxiliary", &camera),
            StreamKind::CompressedImage => ("auxiliary", &compressed),
        };
        for ros_type in types {
            rows.push((*ros_type, role, output.clone()));
        }
    }
    rows
}

/// Print every supported message type with its role in synchronization
pub fn print_schema() -> Result<()> {
    println!("Supported ROS message types:");
    println!("---------------------------------------------------------------");
    for (ros_type, role, output) in schema_rows() {
        println!("{:<34} {:<10} → {}", ros_type, role, output);
    }
    println!("Other types are counted and skipped.");
    Ok(())
}
