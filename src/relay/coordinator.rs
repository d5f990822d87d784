//! Caller-facing request coordinator
//!
//! The coordinator is responsible for:
//! - Rejecting requests that conflict with the current status
//! - Handing buffers between caller and pipeline
//! - Starting the worker thread on first use
//! - The outer rendezvous with the worker, bounded by the response timeout
//! - Cancel, finish and teardown

use super::channel::{ChannelStats, FieldBuffer, RequestChannel, StatsSnapshot};
use super::signal::WaitOutcome;
use super::types::{FieldValue, RequestFlags, RequestStatus, ResultCode};
use super::worker::ExtractionWorker;
use crate::backend::Backend;
use crate::config::RelayConfig;
use crate::error::WorkerError;
use crate::fields::Field;
use crate::text::{units_to_string, TextContext};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// One pipeline: coordinator, channel and worker
pub struct RequestCoordinator {
    channel: Arc<RequestChannel>,
    worker: Option<ExtractionWorker>,
    backend: Arc<dyn Backend>,
    context: Arc<TextContext>,
    config: Arc<RelayConfig>,
    /// Lent buffers displaced from the request, waiting for the caller
    reclaimed: Vec<Vec<u16>>,
    torn_down: bool,
}

impl RequestCoordinator {
    pub fn new(backend: Arc<dyn Backend>, context: Arc<TextContext>, config: Arc<RelayConfig>) -> Self {
        Self::with_id(0, backend, context, config)
    }

    /// Coordinator whose worker thread is named `relay-<id>`
    pub fn with_id(
        id: usize,
        backend: Arc<dyn Backend>,
        context: Arc<TextContext>,
        config: Arc<RelayConfig>,
    ) -> Self {
        Self {
            channel: Arc::new(RequestChannel::new(id)),
            worker: None,
            backend,
            context,
            config,
            reclaimed: Vec::new(),
            torn_down: false,
        }
    }

    /// Request one step of `field_index` from `source`
    ///
    /// `unit_index` is `0` to start, `>0` for the next chunk of a streaming
    /// field, `-1` to stop a stream, or the unit choice for page sizes. A
    /// lent `buffer` receives the output and can be taken back with
    /// [`RequestCoordinator::reclaim_buffer`].
    pub fn submit(
        &mut self,
        source: &Path,
        field_index: i32,
        unit_index: i32,
        buffer: Option<Vec<u16>>,
        flags: RequestFlags,
    ) -> ResultCode {
        let field = match Field::from_index(field_index) {
            Some(field) if self.config.catalog.supported_field(field_index).is_some() => field,
            _ => {
                debug!(field_index, "No such field");
                self.reclaimed.extend(buffer);
                self.stop();
                return ResultCode::NoSuchField;
            }
        };

        if flags.delay_if_slow {
            self.reclaimed.extend(buffer);
            return ResultCode::Delayed;
        }

        if !self.prepare(source, field, unit_index, buffer, flags, self.config.chunk_timeout) {
            return ResultCode::Empty;
        }

        if field.is_streaming() && unit_index == -1 {
            self.stop();
            return ResultCode::Empty;
        }

        self.arm();
        if field.is_streaming() && unit_index > 0 {
            return self.rendezvous();
        }

        if let Err(e) = self.ensure_worker() {
            warn!(error = %e, "Worker could not be started");
            self.channel
                .status
                .transition(RequestStatus::Active, RequestStatus::Complete);
            return ResultCode::IoError;
        }
        self.rendezvous()
    }

    /// Validate the request against the status and install it
    ///
    /// Returns false when the request is rejected.
    pub(crate) fn prepare(
        &mut self,
        source: &Path,
        field: Field,
        unit_index: i32,
        buffer: Option<Vec<u16>>,
        flags: RequestFlags,
        timeout: Duration,
    ) -> bool {
        let status = self.channel.status();
        let streaming = field.is_streaming();

        let rejected = status == RequestStatus::Canceled
            || (status == RequestStatus::Active && unit_index == 0)
            || (streaming
                && unit_index > 0
                && matches!(status, RequestStatus::Closed | RequestStatus::Complete));

        if rejected {
            trace!(
                channel = self.channel.id,
                status = %status,
                field = ?field,
                unit_index,
                "Request rejected"
            );
            if let Some(lent) = buffer {
                self.reclaimed.push(lent);
            }
            return false;
        }

        let mut request = self.channel.request.lock();
        let stats = &self.channel.stats;

        match buffer {
            None => {
                if !request.owned || request.buffer.is_none() {
                    if let Some(lent) = request.buffer.take() {
                        self.reclaimed.push(lent.into_inner());
                    }
                    request.buffer = Some(FieldBuffer::with_capacity(self.config.default_buffer_units));
                    request.owned = true;
                    ChannelStats::bump(&stats.buffers_allocated);
                }
            }
            Some(lent) => {
                if let Some(previous) = request.buffer.take() {
                    if request.owned {
                        drop(previous);
                        ChannelStats::bump(&stats.buffers_released);
                    } else {
                        self.reclaimed.push(previous.into_inner());
                    }
                }
                request.buffer = Some(FieldBuffer::lend(lent));
                request.owned = false;
            }
        }

        if let Some(buffer) = request.buffer.as_mut() {
            buffer.clear();
        }
        request.source = Some(source.to_path_buf());
        request.field = Some(field);
        request.unit_index = unit_index;
        request.flags = flags;
        request.result = ResultCode::Empty;
        request.value = None;
        request.timeout = timeout;
        request.armed = !(streaming && unit_index != 0);
        true
    }

    /// Move an accepted request to `Active` before the worker is woken
    ///
    /// The worker may settle `Complete -> Closed` between the two attempts;
    /// only the caller moves the status out of `Closed`.
    pub(crate) fn arm(&self) {
        let status = &self.channel.status;
        if !status.transition(RequestStatus::Complete, RequestStatus::Active) {
            status.transition(RequestStatus::Closed, RequestStatus::Active);
        }
    }

    /// Start the worker thread unless one is already serving this channel
    pub(crate) fn ensure_worker(&mut self) -> Result<(), WorkerError> {
        if let Some(worker) = &self.worker {
            if !worker.is_finished() && self.channel.is_running() {
                return Ok(());
            }
        }

        if let Some(stale) = self.worker.take() {
            if let Err(e) = stale.join(self.config.join_timeout) {
                warn!(error = %e, "Previous worker ended abnormally");
            }
        }

        let worker = ExtractionWorker::spawn(
            Arc::clone(&self.channel),
            Arc::clone(&self.backend),
            Arc::clone(&self.context),
            self.config.idle_timeout,
        )?;
        debug!(worker = worker.id(), "Worker started");
        self.worker = Some(worker);
        self.torn_down = false;
        Ok(())
    }

    /// Wake the worker and wait for its answer
    fn rendezvous(&self) -> ResultCode {
        let channel = &self.channel;
        channel.to_caller.clear();

        match channel
            .to_worker
            .signal_and_wait(&channel.to_caller, self.config.response_timeout)
        {
            WaitOutcome::Signaled => channel.request.lock().result,
            WaitOutcome::TimedOut => {
                channel
                    .status
                    .transition(RequestStatus::Active, RequestStatus::Canceled);
                ChannelStats::bump(&channel.stats.rendezvous_timeouts);
                debug!(
                    channel = channel.id,
                    timeout_ms = self.config.response_timeout.as_millis() as u64,
                    "Worker did not answer in time"
                );
                ResultCode::Empty
            }
            WaitOutcome::Disconnected => {
                channel
                    .status
                    .transition(RequestStatus::Active, RequestStatus::Canceled);
                ResultCode::IoError
            }
        }
    }

    /// Raise `to_worker` and wait, bounded, for the worker to acknowledge
    fn nudge_worker(&self) {
        if !self.channel.is_running() {
            return;
        }
        self.channel.to_caller.clear();
        self.channel
            .to_worker
            .signal_and_wait(&self.channel.to_caller, self.config.response_timeout);
    }

    /// Cancel the active extraction; the worker closes the document
    ///
    /// Does nothing when no extraction is active.
    pub fn stop(&mut self) {
        if self
            .channel
            .status
            .transition(RequestStatus::Active, RequestStatus::Canceled)
        {
            self.channel.request.lock().source = None;
            debug!(channel = self.channel.id, "Extraction stopped");
            self.nudge_worker();
        }
    }

    /// End the active extraction step but keep the document open
    pub fn finish(&mut self) {
        if self
            .channel
            .status
            .transition(RequestStatus::Active, RequestStatus::Complete)
        {
            self.nudge_worker();
        }
    }

    /// Stop the worker thread and release everything this pipeline owns
    ///
    /// Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.channel.worker_running.store(false, Ordering::SeqCst);
        self.channel
            .status
            .transition(RequestStatus::Active, RequestStatus::Canceled);
        self.channel.request.lock().source = None;
        self.channel.to_worker.raise();

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.join(self.config.join_timeout) {
                warn!(error = %e, "Worker failed to join cleanly");
            }
        }

        let mut request = self.channel.request.lock();
        if let Some(buffer) = request.buffer.take() {
            if request.owned {
                drop(buffer);
                ChannelStats::bump(&self.channel.stats.buffers_released);
            } else {
                self.reclaimed.push(buffer.into_inner());
            }
        }
        request.owned = false;
        debug!(channel = self.channel.id, "Pipeline torn down");
    }

    /// Output of the last step as text
    pub fn text(&self) -> String {
        let request = self.channel.request.lock();
        request
            .buffer
            .as_ref()
            .map(|b| units_to_string(b.content()))
            .unwrap_or_default()
    }

    /// Value of the last single-shot step
    pub fn value(&self) -> Option<FieldValue> {
        self.channel.request.lock().value.clone()
    }

    pub fn status(&self) -> RequestStatus {
        self.channel.status()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.channel.stats.snapshot()
    }

    /// Take back a buffer lent with `submit`
    ///
    /// Returns displaced buffers first, most recent first; then the one
    /// still installed, unless the worker may be writing to it.
    pub fn reclaim_buffer(&mut self) -> Option<Vec<u16>> {
        if let Some(buffer) = self.reclaimed.pop() {
            return Some(buffer);
        }
        if self.channel.status() == RequestStatus::Active {
            return None;
        }

        let mut request = self.channel.request.lock();
        if request.owned {
            return None;
        }
        request.buffer.take().map(FieldBuffer::into_inner)
    }

    pub(crate) fn channel(&self) -> &Arc<RequestChannel> {
        &self.channel
    }
}

impl Drop for RequestCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}
