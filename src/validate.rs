//! Validate command - Check a scene directory for structure and consistency

use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::manifest::{SceneManifest, MANIFEST_FILE};
use crate::pcd::{read_pcd_file, PCD_EXTENSION};
use crate::scene::{CAMERA_DIR, IMAGE_DIR, LABEL_DIR, LIDAR_DIR};

/// Findings of one validation run.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub frames: u64,
    pub pointclouds: usize,
    pub images: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Frame index of a `NNNNNN.<ext>` file name.
fn frame_index(path: &Path, extension: &str) -> Option<u64> {
    if path.extension()? != extension {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.len() < 6 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Run every check against `scene_dir` without printing.
///
/// - `desc.json` parses and its counters agree with each other
/// - `lidar/` holds exactly the indices `0..synchronized_frames`
/// - every PCD declares as many points as it has data lines
/// - image files carry indices of existing frames
pub fn check_scene(scene_dir: &Path) -> Result<ValidationReport> {
    if !scene_dir.is_dir() {
        return Err(anyhow!("{} is not a directory", scene_dir.display()));
    }
    let mut report = ValidationReport::default();

    let manifest = match SceneManifest::read(&scene_dir.join(MANIFEST_FILE)) {
        Ok(m) => Some(m),
        Err(e) => {
            report.errors.push(format!("{e:#}"));
            None
        }
    };
    for dir in [LIDAR_DIR, LABEL_DIR] {
        if !scene_dir.join(dir).is_dir() {
            report.errors.push(format!("missing directory {dir}/"));
        }
    }

    let lidar_dir = scene_dir.join(LIDAR_DIR);
    let mut indices = BTreeSet::new();
    if lidar_dir.is_dir() {
        for entry in fs::read_dir(&lidar_dir)? {
            let path = entry?.path();
            let Some(index) = frame_index(&path, PCD_EXTENSION) else {
                report
                    .warnings
                    .push(format!("unexpected file {}", path.display()));
                continue;
            };
            indices.insert(index);
            match read_pcd_file(&path) {
                Ok(cloud) => {
                    if cloud.declared_points != cloud.points.len() {
                        report.errors.push(format!(
                            "{}: POINTS {} but {} data lines",
                            path.display(),
                            cloud.declared_points,
                            cloud.points.len()
                        ));
                    }
                    if cloud.width * cloud.height != cloud.declared_points {
                        report.errors.push(format!(
                            "{}: WIDTH x HEIGHT does not match POINTS",
                            path.display()
                        ));
                    }
                }
                Err(e) => report.errors.push(format!("{e:#}")),
            }
        }
    }
    report.pointclouds = indices.len();

    if let Some(manifest) = &manifest {
        report.frames = manifest.synchronized_frames;
        if manifest.lidar_count < manifest.synchronized_frames {
            report.errors.push(format!(
                "lidar_count {} is below synchronized_frames {}",
                manifest.lidar_count, manifest.synchronized_frames
            ));
        }
        let expected: BTreeSet<u64> = (0..manifest.synchronized_frames).collect();
        if indices != expected {
            let missing = expected.difference(&indices).count();
            let extra = indices.difference(&expected).count();
            report.errors.push(format!(
                "lidar indices are not 0..{}: {} missing, {} unexpected",
                manifest.synchronized_frames, missing, extra
            ));
        }
    }

    let image_dir = scene_dir.join(CAMERA_DIR).join(IMAGE_DIR);
    if image_dir.is_dir() {
        let mut pending = vec![image_dir];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                report.images += 1;
                let index = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u64>().ok());
                match index {
                    Some(i) if i < report.frames => {}
                    _ => report
                        .errors
                        .push(format!("image {} has no matching frame", path.display())),
                }
            }
        }
    }

    Ok(report)
}

/// Validate a scene directory and print the result
pub fn validate_scene(scene_path: &str) -> Result<()> {
    let report = check_scene(Path::new(scene_path))?;
    if report.passed() {
        println!("Validation of {}: PASSED", scene_path);
    } else {
        println!("Validation of {}: FAILED", scene_path);
    }
    for error in &report.errors {
        println!("[ERROR] {}", error);
    }
    for warning in &report.warnings {
        println!("[WARN] {}", warning);
    }
    println!(
        "Frames: {}, point clouds: {}, images: {}",
        report.frames, report.pointclouds, report.images
    );

    if report.passed() {
        Ok(())
    } else {
        Err(anyhow!("Validation failed"))
    }
}
