//! Two-pipeline content comparison
//!
//! [`DualStreamComparator`] drives two extraction pipelines in lock step,
//! one per source, and compares their output as it arrives. Content is
//! compared binary first; a round that differs is retried with compare
//! delimiters stripped and the context's collation applied. Consumed units
//! are drained from the front of both buffers, so a side that is ahead
//! keeps its remainder for the next round.

use super::channel::{ChannelStats, FieldBuffer, RequestChannel};
use super::coordinator::RequestCoordinator;
use super::signal::{wait_both, WaitOutcome};
use super::types::{CompareResult, RequestFlags, RequestStatus, ResultCode};
use crate::backend::Backend;
use crate::config::RelayConfig;
use crate::text::TextContext;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Answer of a progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressControl {
    Continue,
    Abort,
}

/// Counters of the last comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareSummary {
    pub rounds: u64,
    /// Units consumed from the first source
    pub units_compared: u64,
    /// Units of those that only matched in text mode
    pub text_units: u64,
    pub text_passes: u64,
    pub elapsed: Duration,
    pub result: CompareResult,
}

impl Default for CompareSummary {
    fn default() -> Self {
        Self {
            rounds: 0,
            units_compared: 0,
            text_units: 0,
            text_passes: 0,
            elapsed: Duration::ZERO,
            result: CompareResult::Next,
        }
    }
}

/// Verdict of one pass over the buffered content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundOutcome {
    /// Need more data
    Continue,
    Mismatch,
    Equal,
}

/// Two request pipelines sharing one backend
pub struct DualStreamComparator {
    primary: RequestCoordinator,
    secondary: Option<RequestCoordinator>,
    backend: Arc<dyn Backend>,
    context: Arc<TextContext>,
    config: Arc<RelayConfig>,
    summary: CompareSummary,
}

impl DualStreamComparator {
    pub fn new(backend: Arc<dyn Backend>, context: Arc<TextContext>, config: Arc<RelayConfig>) -> Self {
        let primary = RequestCoordinator::with_id(
            0,
            Arc::clone(&backend),
            Arc::clone(&context),
            Arc::clone(&config),
        );
        Self {
            primary,
            secondary: None,
            backend,
            context,
            config,
            summary: CompareSummary::default(),
        }
    }

    /// The first pipeline, also used for plain field requests
    pub fn coordinator(&mut self) -> &mut RequestCoordinator {
        &mut self.primary
    }

    /// Counters of the last `compare` call
    pub fn last_summary(&self) -> CompareSummary {
        self.summary
    }

    /// Compare the content of `compare_index` in two sources
    ///
    /// `progress` is called with the number of units consumed since the
    /// previous call, at most once per progress interval.
    pub fn compare(
        &mut self,
        source_a: &Path,
        source_b: &Path,
        compare_index: i32,
        mut progress: Option<&mut dyn FnMut(u64) -> ProgressControl>,
    ) -> CompareResult {
        let started = Instant::now();
        let catalog = self.config.catalog;

        let field = match catalog.supported_field(compare_index) {
            Some(info) if info.compare => catalog.compare_field(compare_index),
            _ => None,
        };
        let Some(field) = field else {
            debug!(compare_index, "Not a compare field");
            return CompareResult::Next;
        };

        if self.secondary.is_none() {
            self.secondary = Some(RequestCoordinator::with_id(
                1,
                Arc::clone(&self.backend),
                Arc::clone(&self.context),
                Arc::clone(&self.config),
            ));
        }
        let Some(secondary) = self.secondary.as_mut() else {
            return CompareResult::Error;
        };
        let primary = &mut self.primary;

        let timeout = self.config.response_timeout;
        let flags = RequestFlags::default();
        if !primary.prepare(source_a, field, 0, None, flags, timeout)
            || !secondary.prepare(source_b, field, 0, None, flags, timeout)
        {
            debug!(field = ?field, "Comparison request rejected");
            return CompareResult::Next;
        }

        primary.arm();
        secondary.arm();

        if let Err(e) = primary.ensure_worker().and_then(|_| secondary.ensure_worker()) {
            warn!(error = %e, "Comparison worker could not be started");
            primary.finish();
            secondary.finish();
            return CompareResult::Error;
        }

        let mut run = CompareRun {
            a: Arc::clone(primary.channel()),
            b: Arc::clone(secondary.channel()),
            context: &self.context,
            timeout,
            summary: CompareSummary::default(),
            eq_text: false,
        };
        let result = run.drive(self.config.progress_interval, &mut progress);

        primary.finish();
        secondary.finish();

        self.summary = CompareSummary {
            elapsed: started.elapsed(),
            result,
            ..run.summary
        };
        debug!(
            field = ?field,
            result = ?result,
            rounds = self.summary.rounds,
            units = self.summary.units_compared,
            text_passes = self.summary.text_passes,
            "Comparison finished"
        );
        result
    }

    /// Stop both pipelines and join their workers
    pub fn teardown(&mut self) {
        self.primary.teardown();
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.teardown();
        }
    }
}

/// State of one `compare` call
struct CompareRun<'a> {
    a: Arc<RequestChannel>,
    b: Arc<RequestChannel>,
    context: &'a TextContext,
    timeout: Duration,
    summary: CompareSummary,
    eq_text: bool,
}

impl CompareRun<'_> {
    fn drive(
        &mut self,
        progress_interval: Duration,
        progress: &mut Option<&mut dyn FnMut(u64) -> ProgressControl>,
    ) -> CompareResult {
        let mut last_report = Instant::now();
        let mut unreported = 0u64;
        // the first round starts both steps whatever the status
        let mut first = true;

        loop {
            let live_a = first || self.a.status() == RequestStatus::Active;
            let live_b = first || self.b.status() == RequestStatus::Active;
            first = false;

            if (live_a || live_b) && !self.round(live_a, live_b) {
                return CompareResult::Abort;
            }

            if self.a.status() == RequestStatus::Canceled
                || self.b.status() == RequestStatus::Canceled
            {
                return CompareResult::Abort;
            }

            let failed_a = self.a.request.lock().result == ResultCode::IoError;
            let failed_b = self.b.request.lock().result == ResultCode::IoError;
            match (failed_a, failed_b) {
                (true, true) => return CompareResult::Error,
                (true, false) | (false, true) => return CompareResult::NotEq,
                (false, false) => {}
            }

            let before = self.summary.units_compared;
            let outcome = self.compare_buffers();
            unreported += self.summary.units_compared - before;

            match outcome {
                RoundOutcome::Mismatch => return CompareResult::NotEq,
                RoundOutcome::Equal if self.eq_text => return CompareResult::EqText,
                RoundOutcome::Equal => return CompareResult::Eq,
                RoundOutcome::Continue => {}
            }

            if let Some(callback) = progress.as_mut() {
                if last_report.elapsed() >= progress_interval {
                    last_report = Instant::now();
                    let units = std::mem::take(&mut unreported);
                    if callback(units) == ProgressControl::Abort {
                        debug!("Comparison aborted by progress callback");
                        return CompareResult::Abort;
                    }
                }
            }
        }
    }

    /// Let the live sides produce their next chunk; false on timeout
    fn round(&mut self, live_a: bool, live_b: bool) -> bool {
        self.summary.rounds += 1;

        for (channel, live) in [(&self.a, live_a), (&self.b, live_b)] {
            if live {
                channel.request.lock().result = ResultCode::Empty;
                channel.to_caller.clear();
            }
        }
        for (channel, live) in [(&self.a, live_a), (&self.b, live_b)] {
            if live {
                channel.to_worker.raise();
            }
        }

        let outcome = match (live_a, live_b) {
            (true, true) => wait_both(&self.a.to_caller, &self.b.to_caller, self.timeout),
            (true, false) => self.a.to_caller.wait(self.timeout),
            _ => self.b.to_caller.wait(self.timeout),
        };

        if outcome == WaitOutcome::Signaled {
            trace!(round = self.summary.rounds, "Comparison round received");
            return true;
        }

        for channel in [&self.a, &self.b] {
            if channel
                .status
                .transition(RequestStatus::Active, RequestStatus::Canceled)
            {
                ChannelStats::bump(&channel.stats.rendezvous_timeouts);
            }
        }
        debug!(
            outcome = ?outcome,
            timeout_ms = self.timeout.as_millis() as u64,
            "Comparison round timed out"
        );
        false
    }

    /// Consume everything comparable from both buffers
    fn compare_buffers(&mut self) -> RoundOutcome {
        let (channel_a, channel_b) = (Arc::clone(&self.a), Arc::clone(&self.b));
        let done_a = channel_a.status() != RequestStatus::Active;
        let done_b = channel_b.status() != RequestStatus::Active;

        let mut request_a = channel_a.request.lock();
        let mut request_b = channel_b.request.lock();
        let (Some(a), Some(b)) = (request_a.buffer.as_mut(), request_b.buffer.as_mut()) else {
            return RoundOutcome::Mismatch;
        };

        loop {
            let len = a.cursor().min(b.cursor());
            if len == 0 {
                return self.settle_tail(a, b, done_a, done_b);
            }

            if a.content()[..len] == b.content()[..len] {
                a.drain_front(len);
                b.drain_front(len);
                self.summary.units_compared += len as u64;
                continue;
            }

            self.summary.text_passes += 1;
            let stripped_a = self.context.strip_delimiters(a.content());
            let stripped_b = self.context.strip_delimiters(b.content());
            let text_len = stripped_a.len().min(stripped_b.len());

            if text_len == 0 {
                // one side holds only delimiters
                if stripped_a.is_empty() {
                    let n = a.cursor();
                    self.drain_text(a, n);
                }
                if stripped_b.is_empty() {
                    b.clear();
                }
                continue;
            }

            if !self
                .context
                .collation
                .equal(&stripped_a[..text_len], &stripped_b[..text_len])
            {
                return RoundOutcome::Mismatch;
            }

            let raw_a = self.raw_prefix_len(a.content(), text_len);
            let raw_b = self.raw_prefix_len(b.content(), text_len);
            self.drain_text(a, raw_a);
            b.drain_front(raw_b);
        }
    }

    /// At least one buffer is empty; decide whether the other can still match
    fn settle_tail(
        &mut self,
        a: &mut FieldBuffer,
        b: &mut FieldBuffer,
        done_a: bool,
        done_b: bool,
    ) -> RoundOutcome {
        if a.is_empty() && b.is_empty() {
            return if done_a && done_b {
                RoundOutcome::Equal
            } else {
                RoundOutcome::Continue
            };
        }

        let (empty_done, rest, rest_done) = if a.is_empty() {
            (done_a, &mut *b, done_b)
        } else {
            (done_b, &mut *a, done_a)
        };
        if !empty_done {
            return RoundOutcome::Continue;
        }

        if !self.context.strip_delimiters(rest.content()).is_empty() {
            return RoundOutcome::Mismatch;
        }
        rest.clear();
        self.eq_text = true;
        self.summary.text_passes += 1;
        if rest_done {
            RoundOutcome::Equal
        } else {
            RoundOutcome::Continue
        }
    }

    /// Drain `n` units of the first buffer that matched as text
    fn drain_text(&mut self, a: &mut FieldBuffer, n: usize) {
        a.drain_front(n);
        self.summary.units_compared += n as u64;
        self.summary.text_units += n as u64;
        self.eq_text = true;
    }

    /// Raw length of the shortest prefix holding `count` non-delimiter units
    fn raw_prefix_len(&self, units: &[u16], count: usize) -> usize {
        let mut seen = 0;
        for (i, unit) in units.iter().enumerate() {
            if seen == count {
                return i;
            }
            if !self.context.compare_delimiters.contains(unit) {
                seen += 1;
            }
        }
        units.len()
    }
}

impl Drop for DualStreamComparator {
    fn drop(&mut self) {
        self.teardown();
    }
}
