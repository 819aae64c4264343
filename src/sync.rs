//! Nearest-timestamp frame synchronization.
//!
//! Every reference message becomes one frame. For each auxiliary stream the
//! frame takes the message closest in time; when two candidates are equally
//! close the earlier one wins. Frame indices keep counting across batches so
//! the whole log shares one contiguous `0..N` index space.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::buffer::Batch;

/// The auxiliary message chosen for a frame.
///
/// Payloads are shared: one image may be the nearest match for several frames.
#[derive(Debug)]
pub struct AuxMatch<A> {
    pub timestamp: u64,
    pub payload: Arc<A>,
}

impl<A> Clone for AuxMatch<A> {
    fn clone(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            payload: Arc::clone(&self.payload),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame<R, A> {
    pub index: u64,
    pub timestamp: u64,
    pub reference: R,
    /// Keyed by auxiliary stream id; streams with no messages in the batch are absent
    pub aux: BTreeMap<String, AuxMatch<A>>,
}

/// Index of the timestamp in `sorted` closest to `t`, earliest on ties.
pub fn nearest_index(sorted: &[u64], t: u64) -> Option<usize> {
    if sorted.is_empty() {
        return None;
    }
    let after = sorted.partition_point(|&s| s < t);
    if after == 0 {
        return Some(0);
    }
    if after == sorted.len() {
        return Some(after - 1);
    }
    let before = after - 1;
    if t - sorted[before] <= sorted[after] - t {
        Some(before)
    } else {
        Some(after)
    }
}

/// Outcome counters for one [`FrameSynchronizer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub batches: u64,
    /// Batches that had auxiliary messages but no reference message
    pub empty_reference_batches: u64,
    /// Auxiliary messages discarded because their batch produced no frame
    pub dropped_aux: u64,
}

#[derive(Debug, Default)]
pub struct FrameSynchronizer {
    next_index: u64,
    stats: SyncStats,
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next produced frame will get; equals the number of frames so far.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Align one drained batch, continuing the global frame numbering.
    pub fn synchronize<R, A>(&mut self, batch: Batch<R, A>) -> Vec<Frame<R, A>> {
        self.stats.batches += 1;
        if batch.reference.is_empty() {
            let aux = batch.aux_len() as u64;
            if aux > 0 {
                tracing::debug!(dropped = aux, "batch has no reference messages; dropping auxiliary messages");
                self.stats.empty_reference_batches += 1;
                self.stats.dropped_aux += aux;
            }
            return Vec::new();
        }
        let frames = synchronize_batch(self.next_index, batch);
        self.next_index += frames.len() as u64;
        frames
    }
}

/// Align one batch, numbering frames from `start_index`.
pub fn synchronize_batch<R, A>(start_index: u64, batch: Batch<R, A>) -> Vec<Frame<R, A>> {
    let streams: Vec<(String, Vec<u64>, Vec<Arc<A>>)> = batch
        .aux
        .into_iter()
        .filter(|(_, entries)| !entries.is_empty())
        .map(|(stream, entries)| {
            let (timestamps, payloads): (Vec<u64>, Vec<Arc<A>>) =
                entries.into_iter().map(|(ts, p)| (ts, Arc::new(p))).unzip();
            (stream, timestamps, payloads)
        })
        .collect();

    batch
        .reference
        .into_iter()
        .enumerate()
        .map(|(i, (t, reference))| {
            let aux = streams
                .iter()
                .filter_map(|(stream, timestamps, payloads)| {
                    let j = nearest_index(timestamps, t)?;
                    Some((
                        stream.clone(),
                        AuxMatch {
                            timestamp: timestamps[j],
                            payload: Arc::clone(&payloads[j]),
                        },
                    ))
                })
                .collect();
            Frame {
                index: start_index + i as u64,
                timestamp: t,
                reference,
                aux,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::StreamBuffer;

    fn nearest_naive(sorted: &[u64], t: u64) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (i, &s) in sorted.iter().enumerate() {
            let d = s.abs_diff(t);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        best.map(|(i, _)| i)
    }

    fn batch(reference: &[u64], aux: &[(&str, &[u64])]) -> Batch<u64, u64> {
        Batch {
            reference: reference.iter().map(|&t| (t, t)).collect(),
            aux: aux
                .iter()
                .map(|(s, ts)| (s.to_string(), ts.iter().map(|&t| (t, t)).collect()))
                .collect(),
        }
    }

    fn matched(frames: &[Frame<u64, u64>], stream: &str) -> Vec<Option<u64>> {
        frames
            .iter()
            .map(|f| f.aux.get(stream).map(|m| m.timestamp))
            .collect()
    }

    #[test]
    fn test_reference_scenario() {
        let frames = synchronize_batch(0, batch(&[100, 200, 300], &[("/cam", &[90, 250])]));
        assert_eq!(frames.len(), 3);
        assert_eq!(matched(&frames, "/cam"), vec![Some(90), Some(250), Some(250)]);
        assert_eq!(*frames[2].aux["/cam"].payload, 250);
        let indices: Vec<u64> = frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_tie_prefers_earlier() {
        assert_eq!(nearest_index(&[90, 110], 100), Some(0));
        let frames = synchronize_batch(0, batch(&[100], &[("/cam", &[90, 110])]));
        assert_eq!(matched(&frames, "/cam"), vec![Some(90)]);
    }

    #[test]
    fn test_binary_search_matches_naive_scan() {
        let aux: Vec<u64> = (0..40).map(|i| i * i * 7 + (i % 3) * 5).collect();
        for t in 0..12_000u64 {
            assert_eq!(nearest_index(&aux, t), nearest_naive(&aux, t), "t={t}");
        }
        assert_eq!(nearest_index(&[], 5), None);
        assert_eq!(nearest_index(&[7], 0), Some(0));
        assert_eq!(nearest_index(&[7], u64::MAX), Some(0));
    }

    #[test]
    fn test_empty_aux_stream_contributes_nothing() {
        let frames = synchronize_batch(0, batch(&[1, 2, 3], &[("/empty", &[]), ("/cam", &[2])]));
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| !f.aux.contains_key("/empty")));
        assert!(frames.iter().all(|f| f.aux.contains_key("/cam")));

        let frames = synchronize_batch(0, batch(&[1, 2, 3], &[]));
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.aux.is_empty()));
    }

    #[test]
    fn test_empty_reference_drops_batch() {
        let mut sync = FrameSynchronizer::new();
        let frames = sync.synchronize(batch(&[], &[("/cam", &[1, 2, 3])]));
        assert!(frames.is_empty());
        assert_eq!(sync.next_index(), 0);
        assert_eq!(sync.stats().dropped_aux, 3);
        assert_eq!(sync.stats().empty_reference_batches, 1);
    }

    #[test]
    fn test_indices_contiguous_across_batches() {
        let mut sync = FrameSynchronizer::new();
        let sizes = [3usize, 0, 5, 1, 7];
        let mut indices = Vec::new();
        let mut t = 0u64;
        for n in sizes {
            let reference: Vec<u64> = (0..n).map(|_| { t += 10; t }).collect();
            let frames = sync.synchronize(batch(&reference, &[("/cam", &[t])]));
            indices.extend(frames.iter().map(|f| f.index));
        }
        let total: usize = sizes.iter().sum();
        assert_eq!(indices, (0..total as u64).collect::<Vec<_>>());
        assert_eq!(sync.next_index(), total as u64);
    }

    #[test]
    fn test_deterministic_output() {
        let run = || {
            let mut buf: StreamBuffer<u64, u64> = StreamBuffer::new(1000);
            // Insertion order differs from time order
            for t in [500u64, 100, 300, 200, 400] {
                buf.push_reference(t, t);
            }
            for t in [450u64, 50, 250, 150] {
                buf.push_aux("/a", t, t);
                buf.push_aux("/b", t + 1, t + 1);
            }
            let frames = synchronize_batch(0, buf.drain_batch());
            frames
                .iter()
                .map(|f| {
                    let m: Vec<(String, u64)> =
                        f.aux.iter().map(|(s, m)| (s.clone(), m.timestamp)).collect();
                    (f.index, f.timestamp, m)
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
        let first = run();
        assert_eq!(first[0].1, 100);
        assert_eq!(first[0].2, vec![("/a".to_string(), 50), ("/b".to_string(), 51)]);
    }
}
