//! Scene directory tree: `lidar/`, `camera/image/`, `label/` and `desc.json`.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::manifest::{SceneManifest, MANIFEST_FILE};
use crate::mappings::images::{EncodedImage, ImagePayload};
use crate::mappings::pointcloud::PointRecord;
use crate::pcd::{write_pcd_file, PCD_EXTENSION};
use crate::sync::Frame;

pub const LIDAR_DIR: &str = "lidar";
pub const CAMERA_DIR: &str = "camera";
pub const IMAGE_DIR: &str = "image";
pub const LABEL_DIR: &str = "label";

/// A synchronized frame as produced by the conversion pipeline.
pub type SceneFrame = Frame<Vec<PointRecord>, ImagePayload>;

/// `000042`
pub fn frame_file_stem(index: u64) -> String {
    format!("{index:06}")
}

/// Directory name for an image topic when a scene has several of them.
pub fn topic_dir_name(topic: &str) -> String {
    let name = topic.trim_start_matches('/').replace('/', "_");
    if name.is_empty() {
        "root".to_string()
    } else {
        name
    }
}

/// Assigns every topic a distinct file-system name.
///
/// `/cam/a` and `/cam_a` flatten to the same [`topic_dir_name`]; the topic
/// assigned second gets a `_2` suffix (then `_3`, ...).
#[derive(Debug, Default)]
pub struct TopicNames {
    assigned: HashMap<String, String>,
    used: HashSet<String>,
}

impl TopicNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, topic: &str) -> Option<&str> {
        self.assigned.get(topic).map(String::as_str)
    }

    /// Name for `topic`, assigning one on first use.
    pub fn assign(&mut self, topic: &str) -> &str {
        if !self.assigned.contains_key(topic) {
            let base = topic_dir_name(topic);
            let mut name = base.clone();
            let mut n = 2;
            while self.used.contains(&name) {
                name = format!("{base}_{n}");
                n += 1;
            }
            if name != base {
                tracing::warn!(topic = %topic, dir = %name, "topic name collides with another topic");
            }
            self.used.insert(name.clone());
            self.assigned.insert(topic.to_string(), name);
        }
        &self.assigned[topic]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub pointclouds: u64,
    pub images: u64,
    /// Images written as undecoded bytes
    pub raw_images: u64,
}

pub struct SceneWriter {
    root: PathBuf,
    lidar_dir: PathBuf,
    image_dir: PathBuf,
    per_topic_dirs: bool,
    topic_dirs: TopicNames,
    // Last encoded image per topic; consecutive frames often share one.
    last_encoded: HashMap<String, (u64, EncodedImage)>,
    stats: WriteStats,
}

impl SceneWriter {
    /// Create `<out_dir>/<scene_name>/` and its fixed subdirectories.
    ///
    /// With more than one image topic every topic gets its own directory
    /// under `camera/image/`.
    pub fn create(out_dir: &Path, scene_name: &str, image_topics: &[String]) -> Result<Self> {
        let root = out_dir.join(scene_name);
        let lidar_dir = root.join(LIDAR_DIR);
        let image_dir = root.join(CAMERA_DIR).join(IMAGE_DIR);
        let label_dir = root.join(LABEL_DIR);
        let per_topic_dirs = image_topics.len() > 1;

        let mut topic_dirs = TopicNames::new();
        let mut dirs = vec![lidar_dir.clone(), image_dir.clone(), label_dir];
        if per_topic_dirs {
            for topic in image_topics {
                dirs.push(image_dir.join(topic_dirs.assign(topic)));
            }
        }
        for dir in &dirs {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }

        Ok(Self {
            root,
            lidar_dir,
            image_dir,
            per_topic_dirs,
            topic_dirs,
            last_encoded: HashMap::new(),
            stats: WriteStats::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    pub fn pointcloud_path(&self, index: u64) -> PathBuf {
        self.lidar_dir
            .join(format!("{}.{}", frame_file_stem(index), PCD_EXTENSION))
    }

    /// Output path of `topic`'s image for frame `index`. With per-topic
    /// directories, topics unknown to the writer map to [`topic_dir_name`].
    pub fn image_path(&self, topic: &str, index: u64, extension: &str) -> PathBuf {
        let dir = if self.per_topic_dirs {
            match self.topic_dirs.get(topic) {
                Some(name) => self.image_dir.join(name),
                None => self.image_dir.join(topic_dir_name(topic)),
            }
        } else {
            self.image_dir.clone()
        };
        dir.join(format!("{}.{}", frame_file_stem(index), extension))
    }

    pub fn write_frame(&mut self, frame: &SceneFrame) -> Result<()> {
        write_pcd_file(&self.pointcloud_path(frame.index), &frame.reference)?;
        self.stats.pointclouds += 1;

        for (topic, matched) in &frame.aux {
            if self.per_topic_dirs && self.topic_dirs.get(topic).is_none() {
                // Topic first seen after the scene was created
                let dir = self.image_dir.join(self.topic_dirs.assign(topic));
                fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
            }

            let cached = self
                .last_encoded
                .get(topic)
                .filter(|(ts, _)| *ts == matched.timestamp)
                .map(|(_, encoded)| encoded);
            let encoded = match cached {
                Some(encoded) => encoded.clone(),
                None => {
                    let encoded = matched.payload.encode();
                    self.last_encoded
                        .insert(topic.clone(), (matched.timestamp, encoded.clone()));
                    encoded
                }
            };

            let path = self.image_path(topic, frame.index, encoded.extension);
            fs::write(&path, &encoded.bytes)
                .with_context(|| format!("write {}", path.display()))?;
            self.stats.images += 1;
            if encoded.raw {
                self.stats.raw_images += 1;
            }
        }
        Ok(())
    }

    pub fn write_manifest(&self, manifest: &SceneManifest) -> Result<PathBuf> {
        let path = self.root.join(MANIFEST_FILE);
        manifest.write(&path)?;
        Ok(path)
    }
}
