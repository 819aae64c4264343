//! Log readers: the `LogReader` abstraction, the ROS1 bag implementation,
//! container-format fallback and `inspect`.

use anyhow::{Context, Result};
use prettytable::{format, row, Table};
use rosbag::{ChunkRecord, MessageRecord, RosBag};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::LogOpenError;

/// A topic declared in a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: u32,
    pub topic: String,
    pub msg_type: String,
}

/// One serialized message, borrowed from the reader.
#[derive(Debug, Clone, Copy)]
pub struct RawMessage<'a> {
    pub topic: &'a str,
    pub msg_type: &'a str,
    pub timestamp_ns: u64,
    pub data: &'a [u8],
}

/// Single-pass access to the messages of one recorded log.
///
/// Dropping the reader closes the log.
pub trait LogReader {
    fn path(&self) -> &Path;

    /// Short name of the container format, e.g. `"ros1"`
    fn format(&self) -> &'static str;

    fn connections(&self) -> &[Connection];

    /// Total message count when the container knows it up front.
    fn message_count(&self) -> Option<u64> {
        None
    }

    /// Feed every message, in log order, to `visit`. An error from `visit`
    /// stops the iteration and is returned.
    fn for_each_message(
        &mut self,
        visit: &mut dyn FnMut(RawMessage<'_>) -> Result<()>,
    ) -> Result<()>;
}

/// Recognizes and opens one container format.
pub trait LogOpener: Send + Sync {
    fn format(&self) -> &'static str;

    fn open(&self, path: &Path) -> Result<Box<dyn LogReader>, LogOpenError>;
}

/// Try each opener in turn; the first one that accepts the file wins.
///
/// Only [`LogOpenError::UnrecognizedFormat`] moves on to the next opener. An
/// opener that recognized the file but failed to read it ends the search with
/// its own error.
pub fn open_log(
    path: &Path,
    openers: &[Box<dyn LogOpener>],
) -> Result<Box<dyn LogReader>, LogOpenError> {
    let mut attempts = Vec::with_capacity(openers.len());
    for opener in openers {
        match opener.open(path) {
            Ok(reader) => {
                tracing::debug!(format = opener.format(), path = %path.display(), "opened log");
                return Ok(reader);
            }
            Err(e @ LogOpenError::UnrecognizedFormat { .. }) => {
                tracing::debug!("{e}; trying next format");
                attempts.push(e.to_string());
            }
            Err(e) => return Err(e),
        }
    }
    Err(LogOpenError::NoSupportedFormat {
        path: path.display().to_string(),
        attempts,
    })
}

/// Openers for every format this build can read.
pub fn default_openers() -> Vec<Box<dyn LogOpener>> {
    vec![Box::new(Ros1Opener)]
}

pub struct Ros1Opener;

impl LogOpener for Ros1Opener {
    fn format(&self) -> &'static str {
        Ros1BagReader::FORMAT
    }

    fn open(&self, path: &Path) -> Result<Box<dyn LogReader>, LogOpenError> {
        Ok(Box::new(Ros1BagReader::open(path)?))
    }
}

/// ROS1 `.bag` reader backed by the `rosbag` crate.
pub struct Ros1BagReader {
    path: PathBuf,
    bag: RosBag,
    connections: Vec<Connection>,
    by_id: HashMap<u32, usize>,
    message_count: u64,
}

impl Ros1BagReader {
    pub const FORMAT: &'static str = "ros1";

    pub fn open(path: &Path) -> Result<Self, LogOpenError> {
        let bag = RosBag::new(path).map_err(|e| LogOpenError::UnrecognizedFormat {
            format: Self::FORMAT,
            reason: e.to_string(),
        })?;

        let (connections, message_count) =
            scan_connections(&bag).map_err(|source| LogOpenError::Open {
                format: Self::FORMAT,
                path: path.display().to_string(),
                source,
            })?;
        let by_id = connections
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            bag,
            connections,
            by_id,
            message_count,
        })
    }
}

// Connections first, since the message pass needs topic/type for each conn_id.
fn scan_connections(bag: &RosBag) -> Result<(Vec<Connection>, u64)> {
    let mut connections = BTreeMap::new();
    let mut count = 0u64;
    for record in bag.chunk_records() {
        if let ChunkRecord::Chunk(chunk) = record? {
            for msg in chunk.messages() {
                let msg = msg?;
                if let MessageRecord::Connection(conn) = msg {
                    connections.entry(conn.id).or_insert_with(|| Connection {
                        id: conn.id,
                        topic: conn.topic.to_string(),
                        msg_type: conn.tp.to_string(),
                    });
                } else if let MessageRecord::MessageData(_) = msg {
                    count += 1;
                }
            }
        }
    }
    Ok((connections.into_values().collect(), count))
}

impl LogReader for Ros1BagReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> &'static str {
        Self::FORMAT
    }

    fn connections(&self) -> &[Connection] {
        &self.connections
    }

    fn message_count(&self) -> Option<u64> {
        Some(self.message_count)
    }

    fn for_each_message(
        &mut self,
        visit: &mut dyn FnMut(RawMessage<'_>) -> Result<()>,
    ) -> Result<()> {
        for record in self.bag.chunk_records() {
            let record = record.with_context(|| format!("read chunk in {}", self.path.display()))?;
            if let ChunkRecord::Chunk(chunk) = record {
                for msg in chunk.messages() {
                    if let MessageRecord::MessageData(msg_data) = msg? {
                        let Some(&i) = self.by_id.get(&msg_data.conn_id) else {
                            continue;
                        };
                        let conn = &self.connections[i];
                        visit(RawMessage {
                            topic: &conn.topic,
                            msg_type: &conn.msg_type,
                            timestamp_ns: msg_data.time,
                            data: msg_data.data,
                        })?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Per-topic statistics of a log.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicStat {
    pub msg_type: String,
    pub count: u64,
    /// Seconds relative to the first message of the log
    pub first: f64,
    pub last: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogSummary {
    pub start_ns: Option<u64>,
    pub end_ns: Option<u64>,
    pub total: u64,
    pub topics: BTreeMap<String, TopicStat>,
}

impl LogSummary {
    pub fn duration_secs(&self) -> f64 {
        match (self.start_ns, self.end_ns) {
            (Some(s), Some(e)) => (e - s) as f64 / 1e9,
            _ => 0.0,
        }
    }
}

pub fn summarize_log(reader: &mut dyn LogReader) -> Result<LogSummary> {
    #[derive(Default)]
    struct Acc {
        ty: String,
        count: u64,
        first: u64,
        last: u64,
    }
    let mut stats: BTreeMap<String, Acc> = BTreeMap::new();
    let mut start: Option<u64> = None;
    let mut end: Option<u64> = None;
    let mut total = 0u64;

    reader.for_each_message(&mut |msg| {
        let ts = msg.timestamp_ns;
        start = Some(start.map_or(ts, |s| s.min(ts)));
        end = Some(end.map_or(ts, |e| e.max(ts)));
        total += 1;
        let entry = stats.entry(msg.topic.to_string()).or_insert_with(|| Acc {
            ty: msg.msg_type.to_string(),
            count: 0,
            first: ts,
            last: ts,
        });
        entry.count += 1;
        entry.first = entry.first.min(ts);
        entry.last = entry.last.max(ts);
        Ok(())
    })?;

    let base = start.unwrap_or(0);
    let rel = |ns: u64| (ns - base) as f64 / 1e9;
    let topics = stats
        .into_iter()
        .map(|(topic, acc)| {
            (
                topic,
                TopicStat {
                    msg_type: acc.ty,
                    count: acc.count,
                    first: rel(acc.first),
                    last: rel(acc.last),
                },
            )
        })
        .collect();

    Ok(LogSummary {
        start_ns: start,
        end_ns: end,
        total,
        topics,
    })
}

pub fn inspect_bag(path: &str) -> Result<()> {
    let mut reader = open_log(Path::new(path), &default_openers())?;
    let summary = summarize_log(reader.as_mut())?;

    println!("Bag: {} ({})", path, reader.format());
    println!(
        "Duration (s): {:.6}, Total messages: {}\n",
        summary.duration_secs(),
        summary.total
    );

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["Topic", "Type", "Count", "Start(s)", "End(s)", "Category"]);
    for (topic, st) in &summary.topics {
        let category = match crate::mappings::StreamKind::classify(&st.msg_type) {
            Some(kind) if kind.is_image() => "camera",
            Some(_) => "lidar",
            None => "-",
        };
        table.add_row(row![
            topic,
            st.msg_type,
            st.count,
            format!("{:.6}", st.first),
            format!("{:.6}", st.last),
            category
        ]);
    }
    table.printstd();

    Ok(())
}

#[cfg(test)]
pub(crate) mod testutil {
    //! In-memory `LogReader` for pipeline tests.

    use super::*;

    pub struct MemoryLog {
        pub path: PathBuf,
        pub connections: Vec<Connection>,
        /// (connection index, timestamp, payload)
        pub messages: Vec<(usize, u64, Vec<u8>)>,
    }

    impl MemoryLog {
        pub fn new(path: &str, topics: &[(&str, &str)]) -> Self {
            Self {
                path: PathBuf::from(path),
                connections: topics
                    .iter()
                    .enumerate()
                    .map(|(i, (topic, ty))| Connection {
                        id: i as u32,
                        topic: topic.to_string(),
                        msg_type: ty.to_string(),
                    })
                    .collect(),
                messages: Vec::new(),
            }
        }

        pub fn push(&mut self, topic: &str, ts: u64, data: Vec<u8>) {
            let i = self
                .connections
                .iter()
                .position(|c| c.topic == topic)
                .expect("unknown topic");
            self.messages.push((i, ts, data));
        }
    }

    impl LogReader for MemoryLog {
        fn path(&self) -> &Path {
            &self.path
        }

        fn format(&self) -> &'static str {
            "memory"
        }

        fn connections(&self) -> &[Connection] {
            &self.connections
        }

        fn message_count(&self) -> Option<u64> {
            Some(self.messages.len() as u64)
        }

        fn for_each_message(
            &mut self,
            visit: &mut dyn FnMut(RawMessage<'_>) -> Result<()>,
        ) -> Result<()> {
            for (i, ts, data) in &self.messages {
                let conn = &self.connections[*i];
                visit(RawMessage {
                    topic: &conn.topic,
                    msg_type: &conn.msg_type,
                    timestamp_ns: *ts,
                    data,
                })?;
            }
            Ok(())
        }
    }
}
