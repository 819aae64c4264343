//! Scene manifest (`desc.json`)

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const MANIFEST_FILE: &str = "desc.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneManifest {
    pub scene_name: String,
    pub bag_file: String,
    pub processed_date: String,
    pub lidar_count: u64,
    pub camera_topics: Vec<String>,
    pub synchronized_frames: u64,
}

/// Counters accumulated while a log is processed.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    scene_name: String,
    bag_file: String,
    processed_at: DateTime<Local>,
    lidar_count: u64,
    camera_topics: Vec<String>,
}

impl ManifestBuilder {
    pub fn new(scene_name: &str, bag_file: &str, processed_at: DateTime<Local>) -> Self {
        Self {
            scene_name: scene_name.to_string(),
            bag_file: bag_file.to_string(),
            processed_at,
            lidar_count: 0,
            camera_topics: Vec::new(),
        }
    }

    pub fn add_reference_items(&mut self, n: u64) {
        self.lidar_count += n;
    }

    /// Record an auxiliary stream; repeated ids keep their first position.
    pub fn add_camera_topic(&mut self, topic: &str) {
        if !self.camera_topics.iter().any(|t| t == topic) {
            self.camera_topics.push(topic.to_string());
        }
    }

    pub fn lidar_count(&self) -> u64 {
        self.lidar_count
    }

    pub fn finalize(&self, synchronized_frames: u64) -> SceneManifest {
        SceneManifest {
            scene_name: self.scene_name.clone(),
            bag_file: self.bag_file.clone(),
            processed_date: self
                .processed_at
                .to_rfc3339_opts(chrono::SecondsFormat::Micros, false),
            lidar_count: self.lidar_count,
            camera_topics: self.camera_topics.clone(),
            synchronized_frames,
        }
    }
}

impl SceneManifest {
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("write manifest {}", path.display()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("read manifest {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parse manifest {}", path.display()))
    }
}

/// `<YYYY-MM-DD-HH-MM-SS>_<bag stem>`
pub fn scene_name(processed_at: &DateTime<Local>, bag_path: &Path) -> String {
    let stem = bag_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scene");
    format!("{}_{}", processed_at.format("%Y-%m-%d-%H-%M-%S"), stem)
}
