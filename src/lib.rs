//! bag2scene - Convert ROS bag files into synchronized lidar/camera scenes
//!
//! Every point cloud of the reference topic becomes one frame; each camera
//! topic contributes the image closest in time to it. A scene directory
//! looks like:
//!
//! ```text
//! <out_dir>/<YYYY-MM-DD-HH-MM-SS>_<bag stem>/
//!   lidar/000000.pcd ...
//!   camera/image/000000.jpg ...   (camera/image/<topic>/ with several cameras)
//!   label/
//!   desc.json
//! ```
//!
//! Messages are buffered in bounded batches, so memory stays flat on long
//! logs while frame indices stay contiguous across the whole log.
//!
//! # Example
//!
//! ```rust,no_run
//! use bag2scene::{convert_bag, ConvertOptions};
//! use std::path::{Path, PathBuf};
//!
//! let options = ConvertOptions {
//!     output_dir: PathBuf::from("data"),
//!     batch_size: 500,
//!     reference_topic: Some("/velodyne_points".to_string()),
//!     include_topics: vec![],
//!     exclude_topics: vec![],
//!     pointcloud_rotation: None,
//!     show_progress: true,
//!     jobs: 1,
//! };
//!
//! let report = convert_bag(Path::new("input.bag"), &options)?;
//! println!("{} frames", report.manifest.synchronized_frames);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod buffer;
pub mod cli;
pub mod convert;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod mappings;
pub mod pcd;
pub mod rosbags_io;
pub mod scene;
pub mod schema;
pub mod sync;
pub mod validate;
pub mod wire;

// Re-export main types for convenience
pub use convert::{convert_bag, convert_dir, ConvertOptions, ConvertReport};
pub use manifest::SceneManifest;
pub use rosbags_io::{open_log, LogReader};
