//! Extraction worker thread
//!
//! Each worker:
//! - Owns the open backend document for its channel
//! - Waits for the caller on `to_worker`, runs one extraction step, and
//!   answers on `to_caller`
//! - Closes the document after `idle_timeout` without a request
//! - Exits once `worker_running` is cleared and it is woken up

use super::channel::{ChannelStats, RequestChannel};
use super::producer::ChunkedProducer;
use super::signal::WaitOutcome;
use super::types::{FieldValue, RequestStatus, ResultCode};
use crate::backend::{Backend, Document};
use crate::error::{BackendError, WorkerError};
use crate::fields::{Field, FieldKind, SizeUnit};
use crate::text::TextContext;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Poll interval while joining with a deadline
const JOIN_POLL: Duration = Duration::from_millis(1);

/// Outcome of one extraction step, for logging
#[derive(Debug)]
enum StepOutcome {
    /// Data or a value reached the request
    Delivered { field: Field },
    /// The step ran but produced nothing
    Empty { field: Option<Field> },
    /// The document could not be opened or traversed
    Failed { error: BackendError },
    /// The request was canceled before or during the step
    Canceled,
}

/// Handle to a running worker thread
pub struct ExtractionWorker {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

impl ExtractionWorker {
    /// Spawn the worker thread for `channel`
    pub fn spawn(
        channel: Arc<RequestChannel>,
        backend: Arc<dyn Backend>,
        context: Arc<TextContext>,
        idle_timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let id = channel.id;
        channel.worker_running.store(true, Ordering::SeqCst);

        let thread_channel = Arc::clone(&channel);
        let spawned = thread::Builder::new()
            .name(format!("relay-{}", id))
            .spawn(move || {
                WorkerLoop {
                    channel: thread_channel,
                    backend,
                    context,
                    idle_timeout,
                    document: None,
                }
                .run()
            });

        match spawned {
            Ok(handle) => Ok(Self {
                id,
                handle: Some(handle),
            }),
            Err(e) => {
                channel.worker_running.store(false, Ordering::SeqCst);
                Err(WorkerError::SpawnFailed {
                    id,
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether the thread has ended (exited or panicked)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait up to `timeout` for the thread to end
    ///
    /// On timeout the thread is detached and left to exit on its own.
    pub fn join(mut self, timeout: Duration) -> Result<(), WorkerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return Err(WorkerError::JoinTimeout {
                    id: self.id,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            thread::sleep(JOIN_POLL);
        }

        handle.join().map_err(|payload| WorkerError::Panicked {
            id: self.id,
            message: panic_message(payload.as_ref()),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Worker thread panicked".into()
    }
}

/// Document held open between steps
struct OpenDocument {
    path: PathBuf,
    document: Box<dyn Document>,
}

/// State owned by the worker thread
struct WorkerLoop {
    channel: Arc<RequestChannel>,
    backend: Arc<dyn Backend>,
    context: Arc<TextContext>,
    idle_timeout: Duration,
    document: Option<OpenDocument>,
}

impl WorkerLoop {
    fn run(mut self) {
        let id = self.channel.id;
        debug!(worker = id, backend = self.backend.name(), "Worker starting");

        loop {
            match self.channel.to_worker.wait(self.idle_timeout) {
                WaitOutcome::Signaled => {
                    if !self.channel.is_running() {
                        break;
                    }
                    self.handle_signal();
                }
                WaitOutcome::TimedOut => {
                    if !self.channel.is_running() {
                        break;
                    }
                    if self.document.is_some() {
                        ChannelStats::bump(&self.channel.stats.idle_reclaims);
                        self.close_document("idle");
                    }
                }
                WaitOutcome::Disconnected => break,
            }
        }

        self.close_document("exit");
        self.channel.worker_running.store(false, Ordering::SeqCst);
        debug!(worker = id, "Worker exiting");
    }

    fn handle_signal(&mut self) {
        let (armed, source, field, unit_index) = {
            let mut request = self.channel.request.lock();
            (
                std::mem::take(&mut request.armed),
                request.source.clone(),
                request.field,
                request.unit_index,
            )
        };

        if armed && self.channel.status() != RequestStatus::Canceled {
            ChannelStats::bump(&self.channel.stats.steps);
            let outcome = self.run_step(source.as_deref(), field, unit_index);
            self.channel
                .status
                .transition(RequestStatus::Active, RequestStatus::Complete);
            self.log_outcome(&outcome);
        }

        let status = self.channel.status();
        self.channel.to_caller.raise();

        if status == RequestStatus::Canceled {
            self.close_document("canceled");
        }
    }

    fn run_step(&mut self, source: Option<&Path>, field: Option<Field>, unit_index: i32) -> StepOutcome {
        let Some(source) = source else {
            self.close_document("no source");
            return StepOutcome::Empty { field };
        };

        if let Err(error) = self.ensure_document(source) {
            self.channel.request.lock().result = ResultCode::IoError;
            return StepOutcome::Failed { error };
        }

        // canceled while the document was opening
        if self.channel.status() != RequestStatus::Active {
            return StepOutcome::Canceled;
        }

        let Some(field) = field else {
            return StepOutcome::Empty { field };
        };

        match field.kind() {
            FieldKind::Single => self.query_field(field, unit_index),
            FieldKind::Bounded | FieldKind::Line | FieldKind::Streaming => {
                self.traverse_field(field)
            }
        }
    }

    /// Open `source` unless it is already the open document
    fn ensure_document(&mut self, source: &Path) -> Result<(), BackendError> {
        if let Some(open) = &self.document {
            if open.path == source {
                return Ok(());
            }
            trace!(worker = self.channel.id, from = %open.path.display(), to = %source.display(), "Switching document");
            self.release_document();
        }

        let document = self.backend.open(source).and_then(|document| {
            if document.is_valid() {
                Ok(document)
            } else {
                Err(BackendError::InvalidDocument {
                    path: source.to_path_buf(),
                    reason: "backend reported an invalid document".into(),
                })
            }
        });

        match document {
            Ok(document) => {
                ChannelStats::bump(&self.channel.stats.opens);
                debug!(
                    worker = self.channel.id,
                    source = %source.display(),
                    pages = document.page_count(),
                    "Document opened"
                );
                self.document = Some(OpenDocument {
                    path: source.to_path_buf(),
                    document,
                });
                Ok(())
            }
            Err(e) => {
                ChannelStats::bump(&self.channel.stats.open_failures);
                Err(e)
            }
        }
    }

    fn query_field(&mut self, field: Field, unit_index: i32) -> StepOutcome {
        let Some(open) = &self.document else {
            return StepOutcome::Empty { field: Some(field) };
        };
        let document = open.document.as_ref();

        let value = match field {
            Field::Attributes => Some(FieldValue::Text(document.attributes())),
            Field::PageWidth | Field::PageHeight => match field.query().and_then(|q| document.query(q)) {
                Some(FieldValue::Float(points)) => Some(FieldValue::Float(SizeUnit::convert_points(
                    SizeUnit::from_unit_index(unit_index),
                    points,
                ))),
                other => other,
            },
            _ => field.query().and_then(|q| document.query(q)),
        };

        let mut request = self.channel.request.lock();
        match value {
            Some(value) => {
                if let Some(buffer) = request.buffer.as_mut() {
                    buffer.clear();
                    let units: Vec<u16> = value.to_string().encode_utf16().collect();
                    buffer.append(&units);
                }
                request.value = Some(value);
                request.result = ResultCode::Success(field.value_type());
                StepOutcome::Delivered { field }
            }
            None => {
                request.value = None;
                StepOutcome::Empty { field: Some(field) }
            }
        }
    }

    fn traverse_field(&mut self, field: Field) -> StepOutcome {
        let Some(open) = self.document.as_mut() else {
            return StepOutcome::Empty { field: Some(field) };
        };

        let mut producer = ChunkedProducer::new(Arc::clone(&self.channel), field, &self.context);
        let traversed = open.document.traverse(&mut producer);

        match traversed {
            Err(error) => {
                self.channel.request.lock().result = ResultCode::IoError;
                StepOutcome::Failed { error }
            }
            Ok(()) if self.channel.status() == RequestStatus::Canceled => StepOutcome::Canceled,
            Ok(()) if producer.produced() => StepOutcome::Delivered { field },
            Ok(()) => StepOutcome::Empty { field: Some(field) },
        }
    }

    fn log_outcome(&self, outcome: &StepOutcome) {
        let id = self.channel.id;
        match outcome {
            StepOutcome::Delivered { field } => {
                trace!(worker = id, field = ?field, "Step delivered");
            }
            StepOutcome::Empty { field } => {
                trace!(worker = id, field = ?field, "Step produced nothing");
            }
            StepOutcome::Failed { error } => {
                warn!(worker = id, source = %error.path().display(), error = %error, "Extraction failed");
            }
            StepOutcome::Canceled => {
                debug!(worker = id, "Step canceled");
            }
        }
    }

    /// Drop the open document without touching the status
    fn release_document(&mut self) {
        if let Some(open) = self.document.take() {
            drop(open.document);
            ChannelStats::bump(&self.channel.stats.closes);
        }
    }

    fn close_document(&mut self, reason: &'static str) {
        if let Some(open) = &self.document {
            info!(worker = self.channel.id, source = %open.path.display(), reason, "Closing document");
        }
        self.release_document();
        self.channel.settle_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryDocument};
    use crate::relay::channel::FieldBuffer;
    use crate::text::TextEncoding;

    fn setup() -> (Arc<RequestChannel>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new(TextEncoding::Utf16Be));
        backend.insert(
            "/doc",
            MemoryDocument::text("hello").with_info("Title", "Greeting"),
        );
        (Arc::new(RequestChannel::new(7)), backend)
    }

    fn arm(channel: &RequestChannel, field: Field, unit_index: i32) {
        let mut request = channel.request.lock();
        request.source = Some(PathBuf::from("/doc"));
        request.field = Some(field);
        request.unit_index = unit_index;
        request.buffer = Some(FieldBuffer::with_capacity(64));
        request.result = ResultCode::Empty;
        request.timeout = Duration::from_millis(100);
        request.armed = true;
        drop(request);
        assert!(
            channel.status.transition(RequestStatus::Closed, RequestStatus::Active)
                || channel.status.transition(RequestStatus::Complete, RequestStatus::Active)
        );
    }

    fn stop(channel: &RequestChannel, worker: ExtractionWorker) {
        channel.worker_running.store(false, Ordering::SeqCst);
        channel.to_worker.raise();
        worker.join(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_single_field_step() {
        let (channel, backend) = setup();
        let worker = ExtractionWorker::spawn(
            Arc::clone(&channel),
            backend.clone(),
            TextContext::default().shared(),
            Duration::from_secs(5),
        )
        .unwrap();

        arm(&channel, Field::Title, 0);
        assert_eq!(
            channel
                .to_worker
                .signal_and_wait(&channel.to_caller, Duration::from_secs(2)),
            WaitOutcome::Signaled
        );
        assert_eq!(channel.status(), RequestStatus::Complete);
        assert_eq!(
            channel.request.lock().value,
            Some(FieldValue::Text("Greeting".into()))
        );

        stop(&channel, worker);
        assert_eq!(channel.status(), RequestStatus::Closed);
        assert_eq!(backend.stats().open_now(), 0);
        assert!(!channel.is_running());
    }

    #[test]
    fn test_idle_timeout_closes_document() {
        let (channel, backend) = setup();
        let worker = ExtractionWorker::spawn(
            Arc::clone(&channel),
            backend.clone(),
            TextContext::default().shared(),
            Duration::from_millis(20),
        )
        .unwrap();

        arm(&channel, Field::NumberOfPages, 0);
        channel
            .to_worker
            .signal_and_wait(&channel.to_caller, Duration::from_secs(2));
        assert_eq!(channel.request.lock().value, Some(FieldValue::Int(1)));

        let deadline = Instant::now() + Duration::from_secs(2);
        while backend.stats().open_now() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(backend.stats().open_now(), 0);
        assert_eq!(channel.status(), RequestStatus::Closed);
        assert!(channel.stats.snapshot().idle_reclaims >= 1);

        stop(&channel, worker);
    }

    #[test]
    fn test_unarmed_signal_runs_no_step() {
        let (channel, backend) = setup();
        let worker = ExtractionWorker::spawn(
            Arc::clone(&channel),
            backend.clone(),
            TextContext::default().shared(),
            Duration::from_secs(5),
        )
        .unwrap();

        channel
            .to_worker
            .signal_and_wait(&channel.to_caller, Duration::from_secs(2));
        assert_eq!(backend.stats().opens(), 0);
        assert_eq!(channel.stats.snapshot().steps, 0);

        stop(&channel, worker);
    }

    #[test]
    fn test_canceled_status_runs_no_query() {
        let (channel, backend) = setup();
        let worker = ExtractionWorker::spawn(
            Arc::clone(&channel),
            backend.clone(),
            TextContext::default().shared(),
            Duration::from_secs(5),
        )
        .unwrap();

        arm(&channel, Field::Title, 0);
        channel
            .status
            .transition(RequestStatus::Active, RequestStatus::Canceled);
        channel
            .to_worker
            .signal_and_wait(&channel.to_caller, Duration::from_secs(2));

        assert_eq!(channel.request.lock().value, None);
        assert_eq!(channel.stats.snapshot().steps, 0);
        stop(&channel, worker);
        assert_eq!(channel.status(), RequestStatus::Closed);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
