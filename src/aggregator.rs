// pea: message aggregator / partial buffer (C2, §4.2, A4)

// ACCEPTABLE: both .expect() calls below recover a key/entry inserted a few
// lines earlier in the same method; their absence would be a logic bug.
#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::time::Instant;

use crate::message::Envelope;

struct PendingSet<R> {
    parts: Vec<Envelope>,
    requests: Vec<R>,
    first_seen: Instant,
}

/// Buffers partial messages per `request_id` until `expect_parts` have
/// arrived. A single-part message never touches this structure (§4.2:
/// "single-part messages bypass buffering entirely").
pub struct PartialBuffer<R> {
    pending: HashMap<String, PendingSet<R>>,
}

/// What a sweep evicted: the request id and how many parts had arrived
/// before the branch was abandoned (§3, §8 scenario 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedRequest {
    pub request_id: String,
    pub parts_collected: usize,
}

impl<R> Default for PartialBuffer<R> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<R: Clone> PartialBuffer<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one arrival. Returns `(complete, envelopes, requests)`: when
    /// `complete` the key has already been removed and the slices are the
    /// full collected set in arrival order (§4.2).
    pub fn collect(
        &mut self,
        expect_parts: usize,
        envelope: Envelope,
        request: R,
    ) -> (bool, Vec<Envelope>, Vec<R>) {
        let entry = self
            .pending
            .entry(envelope.request_id.clone())
            .or_insert_with(|| PendingSet {
                parts: Vec::new(),
                requests: Vec::new(),
                first_seen: Instant::now(),
            });
        entry.parts.push(envelope.clone());
        entry.requests.push(request);

        if entry.parts.len() >= expect_parts {
            let completed = self
                .pending
                .remove(&envelope.request_id)
                .expect("entry was just inserted or updated above");
            (true, completed.parts, completed.requests)
        } else {
            (false, entry.parts.clone(), entry.requests.clone())
        }
    }

    /// Number of parts currently buffered for a request id, 0 if none.
    pub fn pending_count(&self, request_id: &str) -> usize {
        self.pending.get(request_id).map(|p| p.parts.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Evict entries whose first arrival is at least `max_idle_time` seconds
    /// old and report what was dropped (§3, §9, §10.4 open-question
    /// resolution). Deliberately `>=`, not `clock.rs`'s strict `>`: a
    /// `max_idle_time` of 0 is a valid "never buffer incomplete parts"
    /// config and must evict on the very next sweep, not wait a full second
    /// past it.
    pub fn sweep(&mut self, max_idle_time_secs: u64) -> Vec<OrphanedRequest> {
        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, set)| set.first_seen.elapsed().as_secs() >= max_idle_time_secs)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .map(|id| {
                let set = self.pending.remove(&id).expect("key came from this map");
                OrphanedRequest {
                    request_id: id,
                    parts_collected: set.parts.len(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(id: &str) -> Envelope {
        Envelope::new(id, "search")
    }

    #[test]
    fn single_part_completes_immediately() {
        let mut buf: PartialBuffer<u32> = PartialBuffer::new();
        let (complete, parts, _) = buf.collect(1, env("r1"), 1);
        assert!(complete);
        assert_eq!(parts.len(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn multi_part_buffers_until_complete() {
        let mut buf: PartialBuffer<u32> = PartialBuffer::new();
        let (c1, p1, _) = buf.collect(3, env("r1"), 1);
        assert!(!c1);
        assert_eq!(p1.len(), 1);
        assert_eq!(buf.pending_count("r1"), 1);

        let (c2, p2, _) = buf.collect(3, env("r1"), 2);
        assert!(!c2);
        assert_eq!(p2.len(), 2);

        let (c3, p3, reqs) = buf.collect(3, env("r1"), 3);
        assert!(c3);
        assert_eq!(p3.len(), 3);
        assert_eq!(reqs, vec![1, 2, 3]);
        assert!(buf.is_empty(), "key must be removed atomically on completion");
    }

    #[test]
    fn distinct_request_ids_do_not_interfere() {
        let mut buf: PartialBuffer<u32> = PartialBuffer::new();
        buf.collect(2, env("r1"), 1);
        buf.collect(2, env("r2"), 10);
        assert_eq!(buf.pending_count("r1"), 1);
        assert_eq!(buf.pending_count("r2"), 1);
    }

    #[test]
    fn sweep_leaves_fresh_entries_alone() {
        let mut buf: PartialBuffer<u32> = PartialBuffer::new();
        buf.collect(3, env("r1"), 1);
        let orphans = buf.sweep(60);
        assert!(orphans.is_empty());
        assert_eq!(buf.pending_count("r1"), 1);
    }

    #[test]
    fn sweep_evicts_stale_entries_and_reports_them() {
        let mut buf: PartialBuffer<u32> = PartialBuffer::new();
        buf.collect(3, env("r1"), 1);
        let orphans = buf.sweep(0);
        assert_eq!(
            orphans,
            vec![OrphanedRequest {
                request_id: "r1".to_string(),
                parts_collected: 1,
            }]
        );
        assert!(buf.is_empty());
    }
}
