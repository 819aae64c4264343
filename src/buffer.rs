//! Bounded per-stream accumulation of decoded messages, keyed by timestamp.
//!
//! One reference stream and any number of named auxiliary streams are held in
//! sorted maps. Once either side reaches `batch_size` entries the owner is
//! expected to [`StreamBuffer::drain_batch`], which moves every entry out and
//! leaves the buffer empty.

use std::collections::BTreeMap;
use std::mem;

/// Every message buffered since the previous drain, sorted by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<R, A> {
    pub reference: Vec<(u64, R)>,
    pub aux: BTreeMap<String, Vec<(u64, A)>>,
}

impl<R, A> Batch<R, A> {
    pub fn is_empty(&self) -> bool {
        self.reference.is_empty() && self.aux.values().all(Vec::is_empty)
    }

    pub fn aux_len(&self) -> usize {
        self.aux.values().map(Vec::len).sum()
    }
}

impl<R, A> Default for Batch<R, A> {
    fn default() -> Self {
        Self {
            reference: Vec::new(),
            aux: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct StreamBuffer<R, A> {
    batch_size: usize,
    reference: BTreeMap<u64, R>,
    aux: BTreeMap<String, BTreeMap<u64, A>>,
    aux_len: usize,
    overwritten: u64,
}

impl<R, A> StreamBuffer<R, A> {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            reference: BTreeMap::new(),
            aux: BTreeMap::new(),
            aux_len: 0,
            overwritten: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert a reference message; a message already held at `ts` is replaced and returned.
    pub fn push_reference(&mut self, ts: u64, payload: R) -> Option<R> {
        let old = self.reference.insert(ts, payload);
        if old.is_some() {
            self.overwritten += 1;
        }
        old
    }

    /// Insert an auxiliary message; a message already held at `ts` on `stream` is replaced and returned.
    pub fn push_aux(&mut self, stream: &str, ts: u64, payload: A) -> Option<A> {
        let old = self
            .aux
            .entry(stream.to_string())
            .or_default()
            .insert(ts, payload);
        if old.is_some() {
            self.overwritten += 1;
        } else {
            self.aux_len += 1;
        }
        old
    }

    pub fn reference_len(&self) -> usize {
        self.reference.len()
    }

    /// Entries across all auxiliary streams.
    pub fn aux_len(&self) -> usize {
        self.aux_len
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty() && self.aux_len == 0
    }

    /// Messages replaced by a later one with the same stream and timestamp.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// True once the reference stream, or all auxiliary streams together,
    /// hold `batch_size` entries.
    pub fn should_flush(&self) -> bool {
        self.reference.len() >= self.batch_size || self.aux_len >= self.batch_size
    }

    /// Move everything out, leaving the buffer empty.
    pub fn drain_batch(&mut self) -> Batch<R, A> {
        let reference = mem::take(&mut self.reference).into_iter().collect();
        let aux = mem::take(&mut self.aux)
            .into_iter()
            .map(|(stream, entries)| (stream, entries.into_iter().collect()))
            .collect();
        self.aux_len = 0;
        Batch { reference, aux }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_on_reference_count() {
        let mut buf: StreamBuffer<u32, u32> = StreamBuffer::new(3);
        buf.push_reference(1, 0);
        buf.push_reference(2, 0);
        assert!(!buf.should_flush());
        buf.push_reference(3, 0);
        assert!(buf.should_flush());
    }

    #[test]
    fn test_flush_on_combined_aux_count() {
        let mut buf: StreamBuffer<u32, u32> = StreamBuffer::new(4);
        buf.push_aux("/cam_a", 1, 0);
        buf.push_aux("/cam_b", 1, 0);
        buf.push_aux("/cam_a", 2, 0);
        assert!(!buf.should_flush());
        buf.push_aux("/cam_c", 5, 0);
        assert!(buf.should_flush());
        assert_eq!(buf.reference_len(), 0);
    }

    #[test]
    fn test_duplicate_timestamp_last_write_wins() {
        let mut buf: StreamBuffer<&str, &str> = StreamBuffer::new(10);
        assert_eq!(buf.push_reference(5, "first"), None);
        assert_eq!(buf.push_reference(5, "second"), Some("first"));
        buf.push_aux("/cam", 7, "a");
        buf.push_aux("/cam", 7, "b");
        assert_eq!(buf.reference_len(), 1);
        assert_eq!(buf.aux_len(), 1);
        assert_eq!(buf.overwritten(), 2);

        let batch = buf.drain_batch();
        assert_eq!(batch.reference, vec![(5, "second")]);
        assert_eq!(batch.aux["/cam"], vec![(7, "b")]);
    }

    #[test]
    fn test_drain_sorts_and_empties() {
        let mut buf: StreamBuffer<u32, u32> = StreamBuffer::new(100);
        for ts in [30, 10, 20] {
            buf.push_reference(ts, ts as u32);
            buf.push_aux("/cam", ts + 1, 0);
        }
        let batch = buf.drain_batch();
        let ts: Vec<u64> = batch.reference.iter().map(|(t, _)| *t).collect();
        assert_eq!(ts, vec![10, 20, 30]);
        assert_eq!(batch.aux_len(), 3);
        assert!(buf.is_empty());
        assert_eq!(buf.aux_len(), 0);
        assert!(buf.drain_batch().is_empty());
    }

    #[test]
    fn test_no_message_lost_or_repeated_across_batches() {
        let mut buf: StreamBuffer<u64, u64> = StreamBuffer::new(4);
        let mut seen = Vec::new();
        for ts in 0..23u64 {
            buf.push_reference(ts, ts);
            if buf.should_flush() {
                seen.extend(buf.drain_batch().reference.into_iter().map(|(t, _)| t));
            }
        }
        seen.extend(buf.drain_batch().reference.into_iter().map(|(t, _)| t));
        assert_eq!(seen, (0..23).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let buf: StreamBuffer<u32, u32> = StreamBuffer::new(0);
        assert_eq!(buf.batch_size(), 1);
    }
}
