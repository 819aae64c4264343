use clap::{ArgAction, Args, Parser, Subcommand};

use crate::convert::DEFAULT_BATCH_SIZE;

#[derive(Parser, Debug)]
#[command(
    name = "bag2scene",
    about = "Convert ROS bag files into synchronized lidar/camera scene directories",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by `convert` and `batch`
#[derive(Args, Debug, Clone)]
pub struct SceneArgs {
    /// Messages buffered per side before a synchronization pass
    #[arg(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Point-cloud topic defining the frame cadence (default: every PointCloud2 topic)
    #[arg(long = "reference-topic")]
    pub reference_topic: Option<String>,
    /// Include only these topics (can be repeated)
    #[arg(long = "include", action = ArgAction::Append)]
    pub include: Vec<String>,
    /// Exclude these topics (can be repeated)
    #[arg(long = "exclude", action = ArgAction::Append)]
    pub exclude: Vec<String>,
    /// Rotate point clouds by "roll,pitch,yaw" in degrees
    #[arg(long = "pointcloud-rotation", allow_hyphen_values = true)]
    pub pointcloud_rotation: Option<String>,
    /// Disable the progress bar
    #[arg(long = "no-progress", action = ArgAction::SetTrue)]
    pub no_progress: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List topics, types, message counts and time span of a bag
    Inspect {
        /// Path to the .bag file
        bag: String,
    },

    /// Convert one bag into a scene directory under <OUT_DIR>
    Convert {
        /// Path to the .bag file
        bag: String,
        /// Directory receiving the scene
        out_dir: String,
        #[command(flatten)]
        scene: SceneArgs,
    },

    /// Convert every .bag file of a directory
    Batch {
        /// Directory containing .bag files
        bags_dir: String,
        /// Directory receiving one scene per bag
        out_dir: String,
        #[command(flatten)]
        scene: SceneArgs,
        /// Bags converted in parallel
        #[arg(long = "jobs", short = 'j', default_value_t = 1)]
        jobs: usize,
    },

    /// Dump per-topic metadata and raw image payloads of a bag
    ///
    /// Given a directory, every topic of every .bag in it is extracted into
    /// <OUTPUT_DIR>/<bag stem>/.
    Extract {
        /// Path to the .bag file or a directory of .bag files
        input: String,
        /// Topic to extract (can be repeated, default: every topic)
        #[arg(long = "topic", action = ArgAction::Append)]
        topics: Vec<String>,
        /// Directory receiving the extracted files
        #[arg(long = "output-dir", default_value = "data/pool")]
        output_dir: String,
    },

    /// Show supported message types and where they are written
    Schema {},

    /// Validate a scene directory
    Validate { scene_dir: String },
}
