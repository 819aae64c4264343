use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::buffer::StreamBuffer;
use crate::error::DecodeError;
use crate::manifest::{scene_name, ManifestBuilder, SceneManifest};
use crate::mappings::images::ImagePayload;
use crate::mappings::pointcloud::{PointRecord, PointRotation};
use crate::mappings::{DecodedPayload, SensorMessage, StreamKind};
use crate::rosbags_io::{default_openers, open_log, LogReader, RawMessage};
use crate::scene::{SceneWriter, WriteStats};
use crate::sync::{FrameSynchronizer, SyncStats};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Options for converting ROS logs into synchronized scenes
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Directory receiving one scene directory per log
    pub output_dir: PathBuf,
    /// Messages buffered per side (reference / all auxiliary streams) before a flush
    pub batch_size: usize,
    /// Point-cloud topic defining the frame cadence; all point-cloud topics when unset
    pub reference_topic: Option<String>,
    /// Include only these topics (empty means include all)
    pub include_topics: Vec<String>,
    /// Exclude these topics
    pub exclude_topics: Vec<String>,
    /// Rotation applied to every point before writing
    pub pointcloud_rotation: Option<PointRotation>,
    /// Show progress bar
    pub show_progress: bool,
    /// Logs converted in parallel by [`convert_dir`]
    pub jobs: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            batch_size: DEFAULT_BATCH_SIZE,
            reference_topic: None,
            include_topics: vec![],
            exclude_topics: vec![],
            pointcloud_rotation: None,
            show_progress: true,
            jobs: 1,
        }
    }
}

impl ConvertOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch-size must be > 0");
        }
        if self.jobs == 0 {
            anyhow::bail!("jobs must be >= 1");
        }
        Ok(())
    }
}

/// Per-topic message accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub received: u64,
    pub buffered: u64,
    /// Messages that failed to parse or decode
    pub skipped: u64,
    /// Point clouds without any point
    pub empty: u64,
}

#[derive(Debug, Clone)]
pub struct ConvertReport {
    pub bag_path: PathBuf,
    pub scene_dir: PathBuf,
    pub manifest: SceneManifest,
    pub total_msgs: u64,
    pub filtered_out: u64,
    pub skipped_type: u64,
    /// Buffered messages replaced by a later one with the same timestamp
    pub overwritten: u64,
    pub streams: BTreeMap<String, StreamStats>,
    pub sync: SyncStats,
    pub writes: WriteStats,
}

impl ConvertReport {
    pub fn skipped_total(&self) -> u64 {
        self.streams.values().map(|s| s.skipped).sum()
    }
}

/// Convert one log into `<output_dir>/<scene_name>/`.
pub fn convert_bag(bag_path: &Path, options: &ConvertOptions) -> Result<ConvertReport> {
    options.validate()?;
    let progress = options
        .show_progress
        .then(|| ProgressBar::no_length().with_style(progress_style()));
    convert_bag_with_progress(bag_path, options, progress)
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>24} [{bar:30}] {pos}/{len} msgs ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn convert_bag_with_progress(
    bag_path: &Path,
    options: &ConvertOptions,
    progress: Option<ProgressBar>,
) -> Result<ConvertReport> {
    let mut reader = open_log(bag_path, &default_openers())?;
    convert_log(reader.as_mut(), options, Local::now(), progress)
}

/// Run the extraction/synchronization pipeline over an opened log.
pub fn convert_log(
    reader: &mut dyn LogReader,
    options: &ConvertOptions,
    processed_at: DateTime<Local>,
    progress: Option<ProgressBar>,
) -> Result<ConvertReport> {
    let bag_path = reader.path().to_path_buf();
    let bag_file = bag_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| bag_path.display().to_string());
    let scene = scene_name(&processed_at, &bag_path);

    let filter = TopicFilter::new(options);
    let image_topics: Vec<String> = reader
        .connections()
        .iter()
        .filter(|c| filter.accepts(&c.topic))
        .filter(|c| StreamKind::classify(&c.msg_type).is_some_and(StreamKind::is_image))
        .map(|c| c.topic.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    if let Some(reference) = &options.reference_topic
        && !reader.connections().iter().any(|c| &c.topic == reference)
    {
        tracing::warn!(topic = %reference, "reference topic not found in {}", bag_file);
    }

    std::fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("create {}", options.output_dir.display()))?;
    let writer = SceneWriter::create(&options.output_dir, &scene, &image_topics)?;

    if let Some(pb) = &progress {
        if let Some(n) = reader.message_count() {
            pb.set_length(n);
        }
        pb.set_prefix(bag_file.clone());
    }

    tracing::info!(bag = %bag_file, scene = %scene, format = reader.format(), "converting");
    let mut converter = SceneConverter {
        filter,
        rotation: options.pointcloud_rotation,
        buffer: StreamBuffer::new(options.batch_size),
        sync: FrameSynchronizer::new(),
        writer,
        manifest: ManifestBuilder::new(&scene, &bag_file, processed_at),
        streams: BTreeMap::new(),
        total_msgs: 0,
        filtered_out: 0,
        skipped_type: 0,
        log_every: std::env::var("BAG2SCENE_LOG_EVERY")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|v| *v > 0),
        started: Instant::now(),
        progress,
    };

    reader.for_each_message(&mut |msg| converter.handle(msg))?;
    converter.finish(bag_path)
}

struct TopicFilter {
    include: Option<HashSet<String>>,
    exclude: HashSet<String>,
    reference_topic: Option<String>,
}

impl TopicFilter {
    fn new(options: &ConvertOptions) -> Self {
        Self {
            include: (!options.include_topics.is_empty())
                .then(|| options.include_topics.iter().cloned().collect()),
            exclude: options.exclude_topics.iter().cloned().collect(),
            reference_topic: options.reference_topic.clone(),
        }
    }

    fn accepts(&self, topic: &str) -> bool {
        if let Some(inc) = &self.include
            && !inc.contains(topic)
        {
            return false;
        }
        !self.exclude.contains(topic)
    }

    fn is_reference(&self, topic: &str) -> bool {
        self.reference_topic.as_deref().is_none_or(|r| r == topic)
    }
}

/// Parse and decode one message payload.
fn decode_message(kind: StreamKind, data: &[u8]) -> Result<DecodedPayload, DecodeError> {
    SensorMessage::parse(kind, data)?.decode()
}

struct SceneConverter {
    filter: TopicFilter,
    rotation: Option<PointRotation>,
    buffer: StreamBuffer<Vec<PointRecord>, ImagePayload>,
    sync: FrameSynchronizer,
    writer: SceneWriter,
    manifest: ManifestBuilder,
    streams: BTreeMap<String, StreamStats>,
    total_msgs: u64,
    filtered_out: u64,
    skipped_type: u64,
    log_every: Option<u64>,
    started: Instant,
    progress: Option<ProgressBar>,
}

impl SceneConverter {
    fn handle(&mut self, msg: RawMessage<'_>) -> Result<()> {
        self.total_msgs += 1;
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
        if let Some(n) = self.log_every
            && self.total_msgs.is_multiple_of(n)
        {
            self.log_progress();
        }

        if !self.filter.accepts(msg.topic) {
            self.filtered_out += 1;
            return Ok(());
        }
        let Some(kind) = StreamKind::classify(msg.msg_type) else {
            self.skipped_type += 1;
            return Ok(());
        };
        if kind == StreamKind::PointCloud && !self.filter.is_reference(msg.topic) {
            self.filtered_out += 1;
            return Ok(());
        }

        let stats = self.streams.entry(msg.topic.to_string()).or_default();
        stats.received += 1;

        match decode_message(kind, msg.data) {
            Err(e) => {
                stats.skipped += 1;
                tracing::debug!(topic = msg.topic, t = msg.timestamp_ns, "skipping message: {e}");
            }
            Ok(DecodedPayload::Points(mut points)) => {
                if points.is_empty() {
                    stats.empty += 1;
                } else {
                    if let Some(rotation) = &self.rotation {
                        rotation.apply(&mut points);
                    }
                    stats.buffered += 1;
                    self.buffer.push_reference(msg.timestamp_ns, points);
                }
            }
            Ok(DecodedPayload::Image(image)) => {
                stats.buffered += 1;
                self.manifest.add_camera_topic(msg.topic);
                self.buffer.push_aux(msg.topic, msg.timestamp_ns, image);
            }
        }

        if self.buffer.should_flush() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let batch = self.buffer.drain_batch();
        let reference_items = batch.reference.len() as u64;
        let aux_items = batch.aux_len();
        self.manifest.add_reference_items(reference_items);

        let frames = self.sync.synchronize(batch);
        for frame in &frames {
            self.writer.write_frame(frame)?;
        }
        tracing::debug!(
            reference = reference_items,
            aux = aux_items,
            frames = frames.len(),
            next_index = self.sync.next_index(),
            "flushed batch"
        );
        Ok(())
    }

    fn log_progress(&self) {
        tracing::info!(
            "[progress] msgs={} frames={} lidar={} filtered={} skipped_type={} elapsed={:?}",
            self.total_msgs,
            self.sync.next_index(),
            self.manifest.lidar_count(),
            self.filtered_out,
            self.skipped_type,
            self.started.elapsed()
        );
    }

    fn finish(mut self, bag_path: PathBuf) -> Result<ConvertReport> {
        if !self.buffer.is_empty() {
            self.flush()?;
        }
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        let manifest = self.manifest.finalize(self.sync.next_index());
        let manifest_path = self.writer.write_manifest(&manifest)?;

        let report = ConvertReport {
            bag_path,
            scene_dir: self.writer.root().to_path_buf(),
            manifest,
            total_msgs: self.total_msgs,
            filtered_out: self.filtered_out,
            skipped_type: self.skipped_type,
            overwritten: self.buffer.overwritten(),
            streams: self.streams,
            sync: self.sync.stats(),
            writes: self.writer.stats(),
        };

        for (topic, st) in &report.streams {
            if st.skipped > 0 || st.empty > 0 {
                tracing::warn!(topic = %topic, skipped = st.skipped, empty = st.empty, "messages not converted");
            }
        }
        if report.sync.dropped_aux > 0 {
            tracing::warn!(
                dropped = report.sync.dropped_aux,
                batches = report.sync.empty_reference_batches,
                "image messages dropped: their batch had no point cloud"
            );
        }
        tracing::info!(
            "[stats] frames={} lidar={} camera_topics={} images={} raw_images={} skipped={} skipped_types={} filtered_out={} total_msgs={} elapsed={:?}",
            report.manifest.synchronized_frames,
            report.manifest.lidar_count,
            report.manifest.camera_topics.len(),
            report.writes.images,
            report.writes.raw_images,
            report.skipped_total(),
            report.skipped_type,
            report.filtered_out,
            report.total_msgs,
            self.started.elapsed()
        );
        tracing::info!("scene description saved: {}", manifest_path.display());

        Ok(report)
    }
}

/// Outcome of converting every log in a directory.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub converted: Vec<ConvertReport>,
    pub failed: Vec<(PathBuf, String)>,
}

/// `.bag` files directly inside `dir`, sorted by name.
pub fn find_bags(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut bags: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "bag"))
        .collect();
    bags.sort();
    Ok(bags)
}

/// Convert every `.bag` in `bags_dir`. A log that fails is reported and
/// does not stop the others.
pub fn convert_dir(bags_dir: &Path, options: &ConvertOptions) -> Result<BatchReport> {
    options.validate()?;
    let bags = find_bags(bags_dir)?;
    if bags.is_empty() {
        tracing::warn!("no .bag files found in {}", bags_dir.display());
        return Ok(BatchReport::default());
    }
    tracing::info!(count = bags.len(), jobs = options.jobs, "converting bag files");

    let multi = options.show_progress.then(MultiProgress::new);
    let style = progress_style();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .build()
        .context("build worker pool")?;
    let results: Vec<(PathBuf, Result<ConvertReport>)> = pool.install(|| {
        bags.par_iter()
            .map(|bag| {
                let progress = multi
                    .as_ref()
                    .map(|m| m.add(ProgressBar::no_length().with_style(style.clone())));
                (bag.clone(), convert_bag_with_progress(bag, options, progress))
            })
            .collect()
    });

    let mut report = BatchReport::default();
    for (bag, result) in results {
        match result {
            Ok(r) => report.converted.push(r),
            Err(e) => {
                tracing::error!(bag = %bag.display(), "conversion failed: {e:#}");
                report.failed.push((bag, format!("{e:#}")));
            }
        }
    }
    tracing::info!(
        converted = report.converted.len(),
        failed = report.failed.len(),
        "all bag files processed, results saved in {}",
        options.output_dir.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MANIFEST_FILE;
    use crate::pcd::read_pcd_file;
    use crate::rosbags_io::testutil::MemoryLog;
    use crate::wire::testutil::*;
    use chrono::TimeZone;

    const LIDAR: &str = "/velodyne_points";
    const CAM: &str = "/camera/image_raw";

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn cloud(points: &[[f32; 3]]) -> Vec<u8> {
        let mut buf = Vec::new();
        put_header(&mut buf, 0, 0, "lidar");
        put_u32(&mut buf, 1);
        put_u32(&mut buf, points.len() as u32);
        put_u32(&mut buf, 3);
        for (name, offset) in [("x", 0u32), ("y", 4), ("z", 8)] {
            put_string(&mut buf, name);
            put_u32(&mut buf, offset);
            buf.push(7);
            put_u32(&mut buf, 1);
        }
        buf.push(0);
        put_u32(&mut buf, 12);
        put_u32(&mut buf, 12 * points.len() as u32);
        put_u32(&mut buf, 12 * points.len() as u32);
        for p in points {
            for v in p {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        buf.push(1);
        buf
    }

    fn image(width: u32, height: u32, encoding: &str, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        put_header(&mut buf, 0, 0, "camera");
        put_u32(&mut buf, height);
        put_u32(&mut buf, width);
        put_string(&mut buf, encoding);
        buf.push(0);
        put_u32(&mut buf, width * 3);
        put_u32(&mut buf, data.len() as u32);
        buf.extend_from_slice(data);
        buf
    }

    fn options(out: &Path, batch_size: usize) -> ConvertOptions {
        ConvertOptions {
            output_dir: out.to_path_buf(),
            batch_size,
            show_progress: false,
            ..ConvertOptions::default()
        }
    }

    fn sample_log() -> MemoryLog {
        let mut log = MemoryLog::new(
            "/bags/drive.bag",
            &[
                (LIDAR, "sensor_msgs/PointCloud2"),
                (CAM, "sensor_msgs/Image"),
                ("/imu", "sensor_msgs/Imu"),
            ],
        );
        log.push(CAM, 90, image(2, 2, "rgb8", &[10; 12]));
        log.push(LIDAR, 100, cloud(&[[1.0, 2.0, 3.0]]));
        log.push("/imu", 150, vec![0; 8]);
        log.push(LIDAR, 200, cloud(&[[4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]));
        log.push(CAM, 250, image(2, 2, "bgr8", &[20; 12]));
        log.push(LIDAR, 300, cloud(&[[0.5, 0.5, 0.5]]));
        log
    }

    #[test]
    fn test_convert_log_writes_scene() {
        let out = tempfile::tempdir().unwrap();
        let mut log = sample_log();
        let report = convert_log(&mut log, &options(out.path(), 100), fixed_time(), None).unwrap();

        let scene = out.path().join("2024-05-01-08-00-00_drive");
        assert_eq!(report.scene_dir, scene);
        assert_eq!(report.total_msgs, 6);
        assert_eq!(report.skipped_type, 1);
        assert_eq!(report.manifest.synchronized_frames, 3);
        assert_eq!(report.manifest.lidar_count, 3);
        assert_eq!(report.manifest.camera_topics, vec![CAM.to_string()]);
        assert_eq!(report.manifest.bag_file, "drive.bag");

        let second = read_pcd_file(&scene.join("lidar/000001.pcd")).unwrap();
        assert_eq!(second.points, vec![[4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        for i in 0..3 {
            assert!(scene.join(format!("camera/image/{i:06}.jpg")).is_file());
        }
        assert!(scene.join("label").is_dir());
        let manifest = SceneManifest::read(&scene.join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest, report.manifest);
    }

    #[test]
    fn test_small_batches_keep_indices_contiguous() {
        let out = tempfile::tempdir().unwrap();
        let mut log = MemoryLog::new(
            "/bags/long.bag",
            &[(LIDAR, "sensor_msgs/PointCloud2"), (CAM, "sensor_msgs/Image")],
        );
        for i in 0..10u64 {
            log.push(LIDAR, i * 100, cloud(&[[i as f32, 0.0, 0.0]]));
            log.push(CAM, i * 100 + 10, image(1, 1, "mono8", &[i as u8]));
        }
        let report = convert_log(&mut log, &options(out.path(), 3), fixed_time(), None).unwrap();
        assert_eq!(report.manifest.synchronized_frames, 10);
        assert!(report.sync.batches > 1);

        let lidar_dir = report.scene_dir.join("lidar");
        for i in 0..10u64 {
            let cloud = read_pcd_file(&lidar_dir.join(format!("{i:06}.pcd"))).unwrap();
            assert_eq!(cloud.points, vec![[i as f32, 0.0, 0.0]]);
        }
        assert!(!lidar_dir.join("000010.pcd").exists());
    }

    #[test]
    fn test_malformed_messages_are_skipped_and_counted() {
        let out = tempfile::tempdir().unwrap();
        let mut log = MemoryLog::new(
            "/bags/broken.bag",
            &[(LIDAR, "sensor_msgs/PointCloud2"), (CAM, "sensor_msgs/Image")],
        );
        log.push(LIDAR, 100, vec![1, 2, 3]);
        log.push(LIDAR, 200, cloud(&[]));
        log.push(LIDAR, 300, cloud(&[[1.0, 1.0, 1.0]]));
        log.push(CAM, 290, image(0, 4, "rgb8", &[1; 12]));
        // Too short for 4x4 rgb8: written raw
        log.push(CAM, 310, image(4, 4, "rgb8", &[9; 5]));

        let report = convert_log(&mut log, &options(out.path(), 100), fixed_time(), None).unwrap();
        assert_eq!(report.streams[LIDAR].skipped, 1);
        assert_eq!(report.streams[LIDAR].empty, 1);
        assert_eq!(report.streams[CAM].skipped, 1);
        assert_eq!(report.skipped_total(), 2);
        assert_eq!(report.manifest.synchronized_frames, 1);
        assert_eq!(report.writes.raw_images, 1);
        let raw = std::fs::read(report.scene_dir.join("camera/image/000000.jpg")).unwrap();
        assert_eq!(raw, vec![9; 5]);
    }

    #[test]
    fn test_compressed_images_are_stored_as_is() {
        let out = tempfile::tempdir().unwrap();
        let mut log = MemoryLog::new(
            "/bags/compressed.bag",
            &[
                (LIDAR, "sensor_msgs/PointCloud2"),
                ("/camera/compressed", "sensor_msgs/CompressedImage"),
            ],
        );
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let mut payload = Vec::new();
        put_header(&mut payload, 0, 0, "camera");
        put_string(&mut payload, "png");
        put_u32(&mut payload, png.len() as u32);
        payload.extend_from_slice(&png);
        log.push("/camera/compressed", 95, payload);
        log.push(LIDAR, 100, cloud(&[[1.0, 1.0, 1.0]]));

        let report = convert_log(&mut log, &options(out.path(), 10), fixed_time(), None).unwrap();
        let image_dir = report.scene_dir.join("camera/image");
        assert_eq!(std::fs::read(image_dir.join("000000.png")).unwrap(), png.to_vec());
        assert!(!image_dir.join("000000.jpg").exists());
        assert_eq!(report.manifest.camera_topics, vec!["/camera/compressed".to_string()]);
        assert_eq!(report.writes.raw_images, 0);
    }

    #[test]
    fn test_images_only_batch_is_dropped() {
        let out = tempfile::tempdir().unwrap();
        let mut log = MemoryLog::new(
            "/bags/cams.bag",
            &[(LIDAR, "sensor_msgs/PointCloud2"), (CAM, "sensor_msgs/Image")],
        );
        for i in 0..4u64 {
            log.push(CAM, i, image(1, 1, "mono8", &[0]));
        }
        log.push(LIDAR, 100, cloud(&[[1.0, 1.0, 1.0]]));

        let report = convert_log(&mut log, &options(out.path(), 2), fixed_time(), None).unwrap();
        assert_eq!(report.sync.dropped_aux, 4);
        assert_eq!(report.manifest.synchronized_frames, 1);
        // The lone point cloud has no image in its own batch
        assert!(!report.scene_dir.join("camera/image/000000.jpg").exists());
    }

    #[test]
    fn test_reference_topic_and_filters() {
        let out = tempfile::tempdir().unwrap();
        let mut log = MemoryLog::new(
            "/bags/two_lidars.bag",
            &[
                ("/lidar_top", "sensor_msgs/PointCloud2"),
                ("/lidar_side", "sensor_msgs/PointCloud2"),
                (CAM, "sensor_msgs/Image"),
            ],
        );
        log.push("/lidar_top", 100, cloud(&[[1.0, 0.0, 0.0]]));
        log.push("/lidar_side", 110, cloud(&[[2.0, 0.0, 0.0]]));
        log.push(CAM, 105, image(1, 1, "mono8", &[0]));

        let opts = ConvertOptions {
            reference_topic: Some("/lidar_top".to_string()),
            exclude_topics: vec![CAM.to_string()],
            ..options(out.path(), 10)
        };
        let report = convert_log(&mut log, &opts, fixed_time(), None).unwrap();
        assert_eq!(report.manifest.synchronized_frames, 1);
        assert_eq!(report.filtered_out, 2);
        assert!(report.manifest.camera_topics.is_empty());
    }

    #[test]
    fn test_rotation_is_applied() {
        let out = tempfile::tempdir().unwrap();
        let mut log = MemoryLog::new("/bags/rot.bag", &[(LIDAR, "sensor_msgs/PointCloud2")]);
        log.push(LIDAR, 1, cloud(&[[1.0, 2.0, 3.0]]));
        let opts = ConvertOptions {
            pointcloud_rotation: Some(PointRotation::from_degrees(180.0, 0.0, 0.0)),
            ..options(out.path(), 10)
        };
        let report = convert_log(&mut log, &opts, fixed_time(), None).unwrap();
        let cloud = read_pcd_file(&report.scene_dir.join("lidar/000000.pcd")).unwrap();
        let p = cloud.points[0];
        assert!((p[0] - 1.0).abs() < 1e-5 && (p[1] + 2.0).abs() < 1e-5 && (p[2] + 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_convert_dir_isolates_failures() {
        let bags = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(bags.path().join("corrupt.bag"), b"not a bag").unwrap();
        std::fs::write(bags.path().join("notes.txt"), b"ignored").unwrap();

        let report = convert_dir(bags.path(), &options(out.path(), 10)).unwrap();
        assert!(report.converted.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("corrupt.bag"));
    }

    #[test]
    fn test_validate_options() {
        let opts = ConvertOptions {
            batch_size: 0,
            ..ConvertOptions::default()
        };
        assert!(opts.validate().is_err());
        let opts = ConvertOptions {
            jobs: 0,
            ..ConvertOptions::default()
        };
        assert!(opts.validate().is_err());
        assert!(ConvertOptions::default().validate().is_ok());
    }
}
