//! PCD v0.7 ASCII point-cloud files (x y z only)

use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::mappings::pointcloud::PointRecord;

pub const PCD_EXTENSION: &str = "pcd";

pub fn write_pcd<W: Write>(mut out: W, points: &[PointRecord]) -> std::io::Result<()> {
    let n = points.len();
    writeln!(out, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(out, "VERSION 0.7")?;
    writeln!(out, "FIELDS x y z")?;
    writeln!(out, "SIZE 4 4 4")?;
    writeln!(out, "TYPE F F F")?;
    writeln!(out, "COUNT 1 1 1")?;
    writeln!(out, "WIDTH {n}")?;
    writeln!(out, "HEIGHT 1")?;
    writeln!(out, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(out, "POINTS {n}")?;
    writeln!(out, "DATA ascii")?;
    for [x, y, z] in points {
        writeln!(out, "{x:.6} {y:.6} {z:.6}")?;
    }
    out.flush()
}

pub fn write_pcd_file(path: &Path, points: &[PointRecord]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_pcd(BufWriter::new(file), points).with_context(|| format!("write {}", path.display()))
}

/// Contents of a parsed PCD file.
#[derive(Debug, Clone, PartialEq)]
pub struct PcdCloud {
    pub width: usize,
    pub height: usize,
    /// Value of the `POINTS` header line
    pub declared_points: usize,
    pub points: Vec<PointRecord>,
}

/// Parse an ASCII PCD whose first three fields are x y z.
pub fn read_pcd<R: BufRead>(input: R) -> Result<PcdCloud> {
    let mut width = None;
    let mut height = None;
    let mut declared_points = None;
    let mut lines = input.lines();

    let mut data_seen = false;
    for line in lines.by_ref() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let key = parts.next().unwrap_or_default();
        let value = parts.collect::<Vec<_>>().join(" ");
        match key {
            "FIELDS" => {
                if !value.starts_with("x y z") {
                    bail!("unsupported PCD fields: {value}");
                }
            }
            "WIDTH" => width = Some(parse_count("WIDTH", &value)?),
            "HEIGHT" => height = Some(parse_count("HEIGHT", &value)?),
            "POINTS" => declared_points = Some(parse_count("POINTS", &value)?),
            "DATA" => {
                if value != "ascii" {
                    bail!("unsupported PCD data encoding: {value}");
                }
                data_seen = true;
                break;
            }
            _ => {}
        }
    }
    if !data_seen {
        bail!("PCD header has no DATA line");
    }

    let mut points = Vec::with_capacity(declared_points.unwrap_or(0));
    for (i, line) in lines.enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut values = line.split_whitespace().map(str::parse::<f32>);
        match (values.next(), values.next(), values.next()) {
            (Some(Ok(x)), Some(Ok(y)), Some(Ok(z))) => points.push([x, y, z]),
            _ => bail!("invalid PCD point on data line {}: '{}'", i + 1, line),
        }
    }

    Ok(PcdCloud {
        width: width.ok_or_else(|| anyhow!("PCD header has no WIDTH"))?,
        height: height.unwrap_or(1),
        declared_points: declared_points.ok_or_else(|| anyhow!("PCD header has no POINTS"))?,
        points,
    })
}

pub fn read_pcd_file(path: &Path) -> Result<PcdCloud> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_pcd(BufReader::new(file)).with_context(|| format!("parse {}", path.display()))
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid {key} value: '{value}'"))
}
