//! Per-topic extraction: a metadata text file for each topic and the raw
//! payload of every image message.
//!
//! ```text
//! <out>/<topic>.txt                       one entry per message
//! <out>/camera/image/image_000000.bin     sensor_msgs/Image data, undecoded
//! <out>/camera/image/image_000000.png     sensor_msgs/CompressedImage data
//! ```
//!
//! With several image topics each one writes under `camera/image/<topic>/`.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::convert::find_bags;
use crate::error::DecodeError;
use crate::mappings::images::{compressed_extension, parse_ros_compressed, parse_ros_image};
use crate::mappings::imu::parse_ros_imu;
use crate::mappings::laserscan::parse_laserscan;
use crate::mappings::pointcloud::parse_pointcloud2;
use crate::mappings::{IMU_TYPES, LASERSCAN_TYPES, StreamKind};
use crate::rosbags_io::{default_openers, open_log, LogReader, RawMessage};
use crate::scene::{frame_file_stem, TopicNames, CAMERA_DIR, IMAGE_DIR};

const SEPARATOR: &str = "--------------------------------------------------";
const RAW_IMAGE_EXTENSION: &str = "bin";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicExtractStats {
    pub messages: u64,
    /// Messages whose payload could not be parsed
    pub errors: u64,
    /// Image files written
    pub files: u64,
}

#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub output_dir: PathBuf,
    pub topics: BTreeMap<String, TopicExtractStats>,
    /// Metadata file of every extracted topic
    pub metadata_files: BTreeMap<String, PathBuf>,
}

struct TopicExtractor {
    msg_type: String,
    kind: Option<StreamKind>,
    metadata: BufWriter<File>,
    metadata_path: PathBuf,
    image_dir: Option<PathBuf>,
    stats: TopicExtractStats,
}

impl TopicExtractor {
    fn record(&mut self, msg: RawMessage<'_>) -> Result<()> {
        let index = self.stats.messages;
        self.stats.messages += 1;
        let out = &mut self.metadata;
        writeln!(out, "timestamp: {}", msg.timestamp_ns)?;
        writeln!(out, "type: {}", self.msg_type)?;

        match describe(self.kind, &self.msg_type, msg.data) {
            Ok(lines) => {
                for line in lines {
                    writeln!(out, "{line}")?;
                }
                if let (Some(dir), Some(image)) = (&self.image_dir, image_bytes(self.kind, msg.data))
                {
                    let name = format!("image_{}.{}", frame_file_stem(index), image.0);
                    let path = dir.join(&name);
                    fs::write(&path, image.1).with_context(|| format!("write {}", path.display()))?;
                    self.stats.files += 1;
                    writeln!(out, "file: {name}")?;
                }
            }
            Err(e) => {
                self.stats.errors += 1;
                writeln!(out, "error: {e}")?;
                writeln!(out, "raw size: {} bytes", msg.data.len())?;
            }
        }
        writeln!(out, "{SEPARATOR}")?;
        Ok(())
    }
}

/// Extension and bytes to dump for an image message.
fn image_bytes(kind: Option<StreamKind>, payload: &[u8]) -> Option<(&'static str, &[u8])> {
    match kind? {
        StreamKind::Image => parse_ros_image(payload)
            .ok()
            .map(|m| (RAW_IMAGE_EXTENSION, m.data)),
        StreamKind::CompressedImage => parse_ros_compressed(payload)
            .ok()
            .map(|m| (compressed_extension(&m.format), m.data)),
        StreamKind::PointCloud => None,
    }
}

/// Human-readable summary lines for one message.
fn describe(
    kind: Option<StreamKind>,
    msg_type: &str,
    payload: &[u8],
) -> Result<Vec<String>, DecodeError> {
    let lines = match kind {
        Some(StreamKind::Image) => {
            let m = parse_ros_image(payload)?;
            vec![
                format!("width: {}", m.width),
                format!("height: {}", m.height),
                format!("encoding: {}", m.encoding),
                format!("step: {}", m.step),
                format!("data size: {} bytes", m.data.len()),
            ]
        }
        Some(StreamKind::CompressedImage) => {
            let m = parse_ros_compressed(payload)?;
            vec![
                format!("format: {}", m.format),
                format!("data size: {} bytes", m.data.len()),
            ]
        }
        Some(StreamKind::PointCloud) => {
            let m = parse_pointcloud2(payload)?;
            let fields: Vec<&str> = m.layout.fields().iter().map(|f| f.name.as_str()).collect();
            vec![
                format!("width: {}", m.width),
                format!("height: {}", m.height),
                format!("fields: {}", fields.join(",")),
                format!("point_step: {}", m.point_step),
                format!("points: {}", m.points()?.len()),
            ]
        }
        None if IMU_TYPES.contains(&msg_type) => {
            let m = parse_ros_imu(payload)?;
            let (q, w, a) = (m.orientation, m.angular_velocity, m.linear_acceleration);
            vec![
                format!("orientation: x={}, y={}, z={}, w={}", q.x, q.y, q.z, q.w),
                format!("angular_velocity: x={}, y={}, z={}", w.x, w.y, w.z),
                format!("linear_acceleration: x={}, y={}, z={}", a.x, a.y, a.z),
            ]
        }
        None if LASERSCAN_TYPES.contains(&msg_type) => {
            let m = parse_laserscan(payload)?;
            let mut lines = vec![
                format!("angle_min: {}", m.angle_min),
                format!("angle_max: {}", m.angle_max),
                format!("angle_increment: {}", m.angle_increment),
                format!("ranges: {} points", m.ranges.len()),
            ];
            if let Some((lo, hi)) = m.range_extent() {
                lines.push(format!("min range: {lo:.3}"));
                lines.push(format!("max range: {hi:.3}"));
            }
            lines
        }
        None => vec![format!("data size: {} bytes", payload.len())],
    };
    Ok(lines)
}

/// Extract `topics` (every topic of the log when empty) into `output_dir`
/// in a single pass over the log.
pub fn extract_topics(
    reader: &mut dyn LogReader,
    topics: &[String],
    output_dir: &Path,
) -> Result<ExtractReport> {
    let available: BTreeMap<String, String> = reader
        .connections()
        .iter()
        .map(|c| (c.topic.clone(), c.msg_type.clone()))
        .collect();
    let selected: BTreeSet<String> = if topics.is_empty() {
        available.keys().cloned().collect()
    } else {
        for topic in topics {
            if !available.contains_key(topic) {
                bail!("topic '{}' not found in {}", topic, reader.path().display());
            }
        }
        topics.iter().cloned().collect()
    };

    fs::create_dir_all(output_dir).with_context(|| format!("create {}", output_dir.display()))?;
    let image_root = output_dir.join(CAMERA_DIR).join(IMAGE_DIR);
    let image_topics: Vec<&String> = selected
        .iter()
        .filter(|t| StreamKind::classify(&available[*t]).is_some_and(StreamKind::is_image))
        .collect();
    let per_topic_dirs = image_topics.len() > 1;

    let mut file_names = TopicNames::new();
    let mut dir_names = TopicNames::new();
    let mut extractors: HashMap<String, TopicExtractor> = HashMap::new();
    for topic in &selected {
        let msg_type = available[topic].as_str();
        let kind = StreamKind::classify(msg_type);
        let image_dir = match kind {
            Some(k) if k.is_image() => {
                let dir = if per_topic_dirs {
                    image_root.join(dir_names.assign(topic))
                } else {
                    image_root.clone()
                };
                fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
                Some(dir)
            }
            _ => None,
        };

        let metadata_path = output_dir.join(format!("{}.txt", file_names.assign(topic)));
        let file = File::create(&metadata_path)
            .with_context(|| format!("create {}", metadata_path.display()))?;
        let mut metadata = BufWriter::new(file);
        if image_dir.is_some() {
            writeln!(metadata, "image topic: {topic}")?;
            writeln!(metadata, "{}", "=".repeat(SEPARATOR.len()))?;
        }
        extractors.insert(
            topic.clone(),
            TopicExtractor {
                msg_type: msg_type.to_string(),
                kind,
                metadata,
                metadata_path,
                image_dir,
                stats: TopicExtractStats::default(),
            },
        );
    }

    reader.for_each_message(&mut |msg: RawMessage<'_>| match extractors.get_mut(msg.topic) {
        Some(extractor) => extractor.record(msg),
        None => Ok(()),
    })?;

    let mut report = ExtractReport {
        output_dir: output_dir.to_path_buf(),
        topics: BTreeMap::new(),
        metadata_files: BTreeMap::new(),
    };
    for (topic, mut extractor) in extractors {
        extractor
            .metadata
            .flush()
            .with_context(|| format!("write {}", extractor.metadata_path.display()))?;
        tracing::info!(
            topic = %topic,
            messages = extractor.stats.messages,
            errors = extractor.stats.errors,
            files = extractor.stats.files,
            "extracted to {}",
            extractor.metadata_path.display()
        );
        report.topics.insert(topic.clone(), extractor.stats);
        report.metadata_files.insert(topic, extractor.metadata_path);
    }
    Ok(report)
}

pub fn extract_bag(bag_path: &Path, topics: &[String], output_dir: &Path) -> Result<ExtractReport> {
    let mut reader = open_log(bag_path, &default_openers())?;
    extract_topics(reader.as_mut(), topics, output_dir)
}

/// Extract every topic of every `.bag` in `bags_dir` into
/// `<output_dir>/<bag stem>/`. A log that fails is reported and skipped.
pub fn extract_dir(
    bags_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<(PathBuf, Result<ExtractReport>)>> {
    let bags = find_bags(bags_dir)?;
    if bags.is_empty() {
        tracing::warn!("no .bag files found in {}", bags_dir.display());
    }
    let results = bags
        .into_iter()
        .map(|bag| {
            let stem = bag
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "bag".to_string());
            let result = extract_bag(&bag, &[], &output_dir.join(stem));
            if let Err(e) = &result {
                tracing::error!(bag = %bag.display(), "extraction failed: {e:#}");
            }
            (bag, result)
        })
        .collect();
    Ok(results)
}
