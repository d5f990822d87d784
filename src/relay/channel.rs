//! Shared request state between a caller and its worker thread
//!
//! A [`RequestChannel`] is pure data plus primitives: the request behind a
//! mutex, the atomic status, the two rendezvous signals and the counters.
//! All behavior lives in the worker, the producer and the coordinator.

use super::signal::Signal;
use super::types::{AtomicStatus, FieldValue, RequestFlags, RequestStatus, ResultCode};
use crate::fields::Field;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Units kept free at the end of a buffer for the host terminator
pub const TERMINATOR_UNITS: usize = 1;

/// Bounded UTF-16 output region
///
/// Content grows from the front up to `capacity - TERMINATOR_UNITS`; the
/// comparator consumes from the front with [`FieldBuffer::drain_front`],
/// which compacts the remainder.
#[derive(Debug)]
pub struct FieldBuffer {
    units: Vec<u16>,
    capacity: usize,
}

impl FieldBuffer {
    /// Allocate a buffer of `capacity` units
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            units: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Wrap a caller-lent vector; its allocated capacity becomes the bound
    pub fn lend(mut units: Vec<u16>) -> Self {
        units.clear();
        let capacity = units.capacity();
        Self { units, capacity }
    }

    /// Give the storage back, content cleared
    pub fn into_inner(mut self) -> Vec<u16> {
        self.units.clear();
        self.units
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write position
    pub fn cursor(&self) -> usize {
        self.units.len()
    }

    pub fn content(&self) -> &[u16] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units that can still be written before the terminator reserve
    pub fn writable(&self) -> usize {
        self.capacity
            .saturating_sub(TERMINATOR_UNITS)
            .saturating_sub(self.units.len())
    }

    /// Only room for the terminator is left
    pub fn is_full(&self) -> bool {
        self.writable() == 0
    }

    /// Append as much of `units` as fits; returns the count written
    pub fn append(&mut self, units: &[u16]) -> usize {
        let n = units.len().min(self.writable());
        self.units.extend_from_slice(&units[..n]);
        n
    }

    pub fn truncate(&mut self, len: usize) {
        self.units.truncate(len);
    }

    /// Drop the first `n` units and shift the rest to the front
    pub fn drain_front(&mut self, n: usize) {
        let n = n.min(self.units.len());
        self.units.drain(..n);
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }
}

/// One in-flight or last-completed extraction
#[derive(Debug)]
pub struct Request {
    pub field: Option<Field>,
    /// `0` start, `>0` continue, `-1` stop; the unit choice for page sizes
    pub unit_index: i32,
    pub buffer: Option<FieldBuffer>,
    /// Buffer was allocated here rather than lent by the caller
    pub owned: bool,
    pub result: ResultCode,
    /// Last single-shot value
    pub value: Option<FieldValue>,
    /// Inner rendezvous deadline used by the producer
    pub timeout: Duration,
    pub source: Option<PathBuf>,
    pub flags: RequestFlags,
    /// Set by the caller when a new extraction step should run
    pub armed: bool,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            field: None,
            unit_index: 0,
            buffer: None,
            owned: false,
            result: ResultCode::Empty,
            value: None,
            timeout: Duration::ZERO,
            source: None,
            flags: RequestFlags::default(),
            armed: false,
        }
    }
}

/// Lifetime counters of one channel
#[derive(Debug, Default)]
pub struct ChannelStats {
    pub opens: AtomicU64,
    pub open_failures: AtomicU64,
    pub closes: AtomicU64,
    pub idle_reclaims: AtomicU64,
    pub steps: AtomicU64,
    pub chunks: AtomicU64,
    pub rendezvous_timeouts: AtomicU64,
    pub buffers_allocated: AtomicU64,
    pub buffers_released: AtomicU64,
}

impl ChannelStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            opens: self.opens.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
            idle_reclaims: self.idle_reclaims.load(Ordering::Relaxed),
            steps: self.steps.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            rendezvous_timeouts: self.rendezvous_timeouts.load(Ordering::Relaxed),
            buffers_allocated: self.buffers_allocated.load(Ordering::Relaxed),
            buffers_released: self.buffers_released.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`ChannelStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub opens: u64,
    pub open_failures: u64,
    pub closes: u64,
    pub idle_reclaims: u64,
    pub steps: u64,
    pub chunks: u64,
    pub rendezvous_timeouts: u64,
    pub buffers_allocated: u64,
    pub buffers_released: u64,
}

impl StatsSnapshot {
    /// Internally allocated buffers not yet released
    pub fn buffers_live(&self) -> u64 {
        self.buffers_allocated.saturating_sub(self.buffers_released)
    }
}

/// Request plus synchronization primitives, shared by `Arc`
#[derive(Debug)]
pub struct RequestChannel {
    pub id: usize,
    pub request: Mutex<Request>,
    pub status: AtomicStatus,
    /// Caller -> worker: work requested / acknowledged
    pub to_worker: Signal,
    /// Worker -> caller: data ready / step finished
    pub to_caller: Signal,
    pub worker_running: AtomicBool,
    pub stats: ChannelStats,
}

impl RequestChannel {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            request: Mutex::new(Request::default()),
            status: AtomicStatus::new(RequestStatus::Closed),
            to_worker: Signal::new(),
            to_caller: Signal::new(),
            worker_running: AtomicBool::new(false),
            stats: ChannelStats::default(),
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.status.load()
    }

    pub fn is_running(&self) -> bool {
        self.worker_running.load(Ordering::SeqCst)
    }

    /// Move a finished status to `Closed` when the document goes away
    ///
    /// `Active` is left alone: the caller has re-armed the request and the
    /// worker reopens the document on the next step.
    pub fn settle_closed(&self) -> bool {
        self.status
            .transition(RequestStatus::Complete, RequestStatus::Closed)
            || self
                .status
                .transition(RequestStatus::Canceled, RequestStatus::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn test_buffer_bounds_and_reserve() {
        let mut buffer = FieldBuffer::with_capacity(6);
        assert_eq!(buffer.append(&units("abcdefgh")), 5);
        assert!(buffer.is_full());
        assert_eq!(buffer.cursor(), 5);
        assert!(buffer.cursor() <= buffer.capacity());
        assert_eq!(buffer.append(&units("x")), 0);
    }

    #[test]
    fn test_drain_front_compacts() {
        let mut buffer = FieldBuffer::with_capacity(16);
        buffer.append(&units("hello world"));
        buffer.drain_front(6);
        assert_eq!(buffer.content(), units("world").as_slice());
        assert_eq!(buffer.writable(), 16 - 1 - 5);
        buffer.drain_front(100);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_lent_buffer_keeps_storage() {
        let lent = Vec::with_capacity(32);
        let mut buffer = FieldBuffer::lend(lent);
        assert!(buffer.capacity() >= 32);
        buffer.append(&units("abc"));
        let back = buffer.into_inner();
        assert!(back.is_empty());
        assert!(back.capacity() >= 32);
    }

    #[test]
    fn test_settle_closed() {
        let channel = RequestChannel::new(0);
        for status in [RequestStatus::Complete, RequestStatus::Canceled] {
            channel.status.store(status);
            assert!(channel.settle_closed());
            assert_eq!(channel.status(), RequestStatus::Closed);
        }

        assert!(!channel.settle_closed());

        channel.status.store(RequestStatus::Active);
        assert!(!channel.settle_closed());
        assert_eq!(channel.status(), RequestStatus::Active);
    }
}
