use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use flowvisor::message::{FlowStats, PortStats, TableStats};
use flowvisor::ofp_header::Xid;
use flowvisor::slice::SliceId;
use flowvisor::topology::DatapathId;

/// A fan-out is given this long to collect its replies before the sweeper
/// flushes whatever has accumulated.
pub const XID_TIMEOUT: Duration = Duration::from_secs(180);

/// Cadence of the sweeper task.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Merged state of one fan-out. The variant is fixed when the record is
/// allocated; replies of another kind do not merge.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Flows(Vec<FlowStats>),
    Aggregate {
        packet_count: u64,
        byte_count: u64,
        flow_count: u32,
    },
    /// The proxy exposes exactly one virtual table; the record is seeded
    /// with its synthetic entry and switch replies are discarded.
    Tables(Vec<TableStats>),
    Ports(Vec<PortStats>),
}

/// One tracked fan-out: which controller request it answers, which
/// switches still owe a reply, and what has been merged so far.
#[derive(Debug, Clone)]
pub struct XidRecord {
    pub src_slice: SliceId,
    pub src_xid: Xid,
    pub pending: HashSet<DatapathId>,
    pub created_at: Instant,
    pub accumulator: Accumulator,
}

/// A fan-out that finished (all replies in, or forced).
#[derive(Debug, Clone)]
pub struct CompletedXid {
    pub src_slice: SliceId,
    pub src_xid: Xid,
    pub accumulator: Accumulator,
}

#[derive(Debug)]
pub enum ReplyStatus {
    Complete(CompletedXid),
    Partial,
    Unknown,
}

/// Correlates fan-out requests with their fan-in replies. Controllers see
/// only their own xids; switch-facing requests get fresh ones from here.
pub struct XidTracker {
    next_xid: Xid,
    records: HashMap<Xid, XidRecord>,
}

impl XidTracker {
    pub fn new() -> XidTracker {
        XidTracker {
            next_xid: 1,
            records: HashMap::new(),
        }
    }

    /// A fresh switch-facing xid with no reply tracking, for one-way
    /// traffic like flow-mods.
    pub fn fresh(&mut self) -> Xid {
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        xid
    }

    /// Track a fan-out towards `pending` switches on behalf of a
    /// controller request.
    pub fn allocate(
        &mut self,
        src_slice: SliceId,
        src_xid: Xid,
        pending: HashSet<DatapathId>,
        accumulator: Accumulator,
        now: Instant,
    ) -> Xid {
        debug_assert!(!pending.is_empty());
        let xid = self.fresh();
        self.records.insert(
            xid,
            XidRecord {
                src_slice,
                src_xid,
                pending,
                created_at: now,
                accumulator,
            },
        );
        xid
    }

    /// Merge one reply chunk. `more` keeps the sender in the pending set
    /// (chunked flow and port replies); the final chunk retires it.
    pub fn record_reply(
        &mut self,
        xid: Xid,
        dpid: DatapathId,
        chunk: Accumulator,
        more: bool,
    ) -> ReplyStatus {
        let complete = match self.records.get_mut(&xid) {
            None => return ReplyStatus::Unknown,
            Some(record) => {
                XidTracker::merge(&mut record.accumulator, chunk);
                if !more {
                    record.pending.remove(&dpid);
                }
                record.pending.is_empty()
            }
        };
        if complete {
            let record = self.records.remove(&xid).unwrap();
            ReplyStatus::Complete(CompletedXid {
                src_slice: record.src_slice,
                src_xid: record.src_xid,
                accumulator: record.accumulator,
            })
        } else {
            ReplyStatus::Partial
        }
    }

    fn merge(acc: &mut Accumulator, chunk: Accumulator) {
        match (acc, chunk) {
            (&mut Accumulator::Flows(ref mut all), Accumulator::Flows(mut more)) => {
                all.append(&mut more)
            }
            (
                &mut Accumulator::Aggregate {
                    ref mut packet_count,
                    ref mut byte_count,
                    ref mut flow_count,
                },
                Accumulator::Aggregate {
                    packet_count: p,
                    byte_count: b,
                    flow_count: f,
                },
            ) => {
                *packet_count += p;
                *byte_count += b;
                *flow_count += f;
            }
            // one virtual table; per-switch table stats are dropped
            (&mut Accumulator::Tables(_), Accumulator::Tables(_)) => {}
            (&mut Accumulator::Ports(ref mut all), Accumulator::Ports(mut more)) => {
                all.append(&mut more)
            }
            (acc, chunk) => {
                warn!(
                    "stats reply kind {:?} does not match accumulator {:?}, dropped",
                    chunk, acc
                );
            }
        }
    }

    /// A switch died: nothing further will arrive from it. Records that
    /// were only waiting on it complete with what they have.
    pub fn drop_switch(&mut self, dpid: DatapathId) -> Vec<CompletedXid> {
        let mut done = vec![];
        for (&xid, record) in &mut self.records {
            record.pending.remove(&dpid);
            if record.pending.is_empty() {
                done.push(xid);
            }
        }
        done.sort();
        done.into_iter()
            .filter_map(|xid| self.records.remove(&xid))
            .map(|record| CompletedXid {
                src_slice: record.src_slice,
                src_xid: record.src_xid,
                accumulator: record.accumulator,
            })
            .collect()
    }

    /// A controller session closed: its pending fan-outs have nowhere to
    /// deliver. Returns how many were discarded.
    pub fn drop_slice(&mut self, slice: SliceId) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.src_slice != slice);
        before - self.records.len()
    }

    /// Flush every record older than the timeout, delivering whatever has
    /// accumulated.
    pub fn sweep(&mut self, now: Instant) -> Vec<CompletedXid> {
        let mut expired: Vec<Xid> = self
            .records
            .iter()
            .filter(|&(_, r)| now.duration_since(r.created_at) > XID_TIMEOUT)
            .map(|(&xid, _)| xid)
            .collect();
        expired.sort();
        expired
            .into_iter()
            .filter_map(|xid| self.records.remove(&xid))
            .map(|record| CompletedXid {
                src_slice: record.src_slice,
                src_xid: record.src_xid,
                accumulator: record.accumulator,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(dpids: &[DatapathId]) -> HashSet<DatapathId> {
        dpids.iter().cloned().collect()
    }

    fn aggregate(p: u64, b: u64, f: u32) -> Accumulator {
        Accumulator::Aggregate {
            packet_count: p,
            byte_count: b,
            flow_count: f,
        }
    }

    #[test]
    fn aggregate_fan_in_sums_in_any_order() {
        let mut tracker = XidTracker::new();
        let now = Instant::now();
        let xid = tracker.allocate(SliceId(1), 77, set(&[1, 2, 3]), aggregate(0, 0, 0), now);

        match tracker.record_reply(xid, 2, aggregate(1, 100, 1), false) {
            ReplyStatus::Partial => {}
            other => panic!("expected Partial, got {:?}", other),
        }
        match tracker.record_reply(xid, 3, aggregate(0, 0, 0), false) {
            ReplyStatus::Partial => {}
            other => panic!("expected Partial, got {:?}", other),
        }
        match tracker.record_reply(xid, 1, aggregate(5, 500, 2), false) {
            ReplyStatus::Complete(done) => {
                assert_eq!(done.src_xid, 77);
                assert_eq!(done.src_slice, SliceId(1));
                assert_eq!(done.accumulator, aggregate(6, 600, 3));
            }
            other => panic!("expected Complete, got {:?}", other),
        }
        assert!(tracker.is_empty());
    }

    #[test]
    fn chunked_replies_hold_the_switch_pending() {
        let mut tracker = XidTracker::new();
        let now = Instant::now();
        let xid = tracker.allocate(SliceId(1), 5, set(&[1]), Accumulator::Flows(vec![]), now);

        match tracker.record_reply(xid, 1, Accumulator::Flows(vec![]), true) {
            ReplyStatus::Partial => {}
            other => panic!("expected Partial, got {:?}", other),
        }
        match tracker.record_reply(xid, 1, Accumulator::Flows(vec![]), false) {
            ReplyStatus::Complete(_) => {}
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn unknown_xid_is_reported() {
        let mut tracker = XidTracker::new();
        match tracker.record_reply(99, 1, aggregate(0, 0, 0), false) {
            ReplyStatus::Unknown => {}
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn sweep_flushes_only_expired_records() {
        let mut tracker = XidTracker::new();
        let t0 = Instant::now();
        tracker.allocate(SliceId(1), 1, set(&[1]), aggregate(0, 0, 0), t0);
        tracker.allocate(SliceId(1), 2, set(&[1]), aggregate(0, 0, 0), t0 + XID_TIMEOUT);

        let flushed = tracker.sweep(t0 + XID_TIMEOUT + Duration::from_secs(1));
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].src_xid, 1);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn switch_loss_completes_waiting_records() {
        let mut tracker = XidTracker::new();
        let now = Instant::now();
        let xid = tracker.allocate(SliceId(1), 9, set(&[1, 2]), aggregate(0, 0, 0), now);
        tracker.record_reply(xid, 1, aggregate(4, 40, 1), false);

        let done = tracker.drop_switch(2);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].src_xid, 9);
        assert_eq!(done[0].accumulator, aggregate(4, 40, 1));
    }

    #[test]
    fn slice_loss_discards_its_records() {
        let mut tracker = XidTracker::new();
        let now = Instant::now();
        tracker.allocate(SliceId(1), 1, set(&[1]), aggregate(0, 0, 0), now);
        tracker.allocate(SliceId(2), 2, set(&[1]), aggregate(0, 0, 0), now);
        assert_eq!(tracker.drop_slice(SliceId(1)), 1);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn table_replies_are_discarded() {
        let mut tracker = XidTracker::new();
        let now = Instant::now();
        let seeded = Accumulator::Tables(vec![]);
        let xid = tracker.allocate(SliceId(1), 3, set(&[1]), seeded.clone(), now);
        match tracker.record_reply(xid, 1, Accumulator::Tables(vec![]), false) {
            ReplyStatus::Complete(done) => assert_eq!(done.accumulator, seeded),
            other => panic!("expected Complete, got {:?}", other),
        }
    }
}
