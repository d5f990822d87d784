//! Chunk sink that turns a push-style traversal into a bounded stream
//!
//! The backend calls [`ChunkedProducer::on_chunk`] with raw byte spans from
//! inside `Document::traverse`, which cannot be paused. The producer
//! decodes each span into the request buffer and, once the buffer is full,
//! either completes the step (bounded fields) or hands the buffer to the
//! caller and blocks until it comes back for more (streaming fields).

use super::channel::{ChannelStats, RequestChannel};
use super::signal::WaitOutcome;
use super::types::{RequestStatus, ResultCode, ValueType};
use crate::backend::{ChunkSink, Flow};
use crate::fields::{Field, FieldKind};
use crate::text::{ChunkDecoder, TextContext, CONTROL_DELIMITERS, LINE_TERMINATORS};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Backend sink for one chunked extraction step
pub struct ChunkedProducer {
    channel: Arc<RequestChannel>,
    kind: FieldKind,
    result: ResultCode,
    decoder: ChunkDecoder,
    timeout: Duration,
    /// Decoded units of the current span
    pending: Vec<u16>,
    produced: bool,
}

impl ChunkedProducer {
    pub fn new(channel: Arc<RequestChannel>, field: Field, context: &TextContext) -> Self {
        let timeout = channel.request.lock().timeout;
        let value_type = match field.kind() {
            FieldKind::Streaming => ValueType::FullTextW,
            _ => ValueType::StringW,
        };

        Self {
            channel,
            kind: field.kind(),
            result: ResultCode::Success(value_type),
            decoder: context.decoder(),
            timeout,
            pending: Vec::new(),
            produced: false,
        }
    }

    /// Whether any unit reached the buffer during this step
    pub fn produced(&self) -> bool {
        self.produced
    }

    fn is_active(&self) -> bool {
        self.channel.status() == RequestStatus::Active
    }

    /// Hand a full buffer to the caller and wait for the acknowledgment
    fn rendezvous(&self) -> Flow {
        match self
            .channel
            .to_caller
            .signal_and_wait(&self.channel.to_worker, self.timeout)
        {
            WaitOutcome::Signaled if self.is_active() => Flow::Continue,
            WaitOutcome::Signaled => Flow::Abort,
            outcome => {
                self.channel
                    .status
                    .transition(RequestStatus::Active, RequestStatus::Canceled);
                ChannelStats::bump(&self.channel.stats.rendezvous_timeouts);
                debug!(
                    channel = self.channel.id,
                    outcome = ?outcome,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Caller did not acknowledge chunk, canceling"
                );
                Flow::Abort
            }
        }
    }
}

impl ChunkSink for ChunkedProducer {
    fn on_chunk(&mut self, bytes: &[u8]) -> Flow {
        if bytes.is_empty() || !self.is_active() {
            return Flow::Continue;
        }
        ChannelStats::bump(&self.channel.stats.chunks);

        self.pending.clear();
        self.decoder.decode(bytes, &mut self.pending);
        self.pending.retain(|u| !CONTROL_DELIMITERS.contains(u));

        let mut offset = 0;
        loop {
            let (line_done, full) = {
                let mut request = self.channel.request.lock();
                let Some(buffer) = request.buffer.as_mut() else {
                    return Flow::Abort;
                };

                let start = buffer.cursor();
                offset += buffer.append(&self.pending[offset..]);

                let mut line_done = false;
                if self.kind == FieldKind::Line {
                    if let Some(pos) = buffer.content()[start..]
                        .iter()
                        .position(|u| LINE_TERMINATORS.contains(u))
                    {
                        buffer.truncate(start + pos);
                        line_done = true;
                    }
                }

                let full = buffer.is_full();
                if !buffer.is_empty() {
                    request.result = self.result;
                    self.produced = true;
                }
                (line_done, full)
            };

            if line_done {
                trace!(channel = self.channel.id, "Line terminator found");
                self.channel
                    .status
                    .transition(RequestStatus::Active, RequestStatus::Complete);
                return Flow::Abort;
            }

            if !full {
                return Flow::Continue;
            }

            match self.kind {
                FieldKind::Streaming => {
                    if self.rendezvous() == Flow::Abort {
                        return Flow::Abort;
                    }
                    if offset >= self.pending.len() {
                        return Flow::Continue;
                    }
                }
                _ => {
                    self.channel
                        .status
                        .transition(RequestStatus::Active, RequestStatus::Complete);
                    return Flow::Abort;
                }
            }
        }
    }

    fn should_abort(&self) -> bool {
        !self.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::channel::FieldBuffer;
    use crate::text::{units_to_string, TextEncoding};
    use std::thread;

    fn channel_for(field: Field, capacity: usize, timeout: Duration) -> Arc<RequestChannel> {
        let channel = Arc::new(RequestChannel::new(0));
        {
            let mut request = channel.request.lock();
            request.field = Some(field);
            request.buffer = Some(FieldBuffer::with_capacity(capacity));
            request.timeout = timeout;
        }
        channel.status.store(RequestStatus::Active);
        channel
    }

    fn utf8() -> TextContext {
        TextContext {
            encoding: TextEncoding::Utf8,
            ..TextContext::default()
        }
    }

    fn content(channel: &RequestChannel) -> String {
        let request = channel.request.lock();
        units_to_string(request.buffer.as_ref().unwrap().content())
    }

    #[test]
    fn test_first_row_truncates_at_eol() {
        let channel = channel_for(Field::FirstRow, 64, Duration::from_millis(50));
        let mut producer = ChunkedProducer::new(Arc::clone(&channel), Field::FirstRow, &utf8());

        assert_eq!(producer.on_chunk(b"first \x0cline"), Flow::Continue);
        assert_eq!(producer.on_chunk(b" ends\r\nsecond"), Flow::Abort);
        assert_eq!(content(&channel), "first line ends");
        assert_eq!(channel.status(), RequestStatus::Complete);
        assert!(producer.should_abort());
    }

    #[test]
    fn test_document_start_bounded_to_capacity() {
        let channel = channel_for(Field::DocumentStart, 8, Duration::from_millis(50));
        let mut producer =
            ChunkedProducer::new(Arc::clone(&channel), Field::DocumentStart, &utf8());

        assert_eq!(producer.on_chunk(b"abcd"), Flow::Continue);
        assert_eq!(producer.on_chunk(b"efghijk"), Flow::Abort);
        assert_eq!(content(&channel), "abcdefg");
        assert_eq!(channel.status(), RequestStatus::Complete);
        assert_eq!(
            channel.request.lock().result,
            ResultCode::Success(ValueType::StringW)
        );
    }

    #[test]
    fn test_ignored_when_not_active() {
        let channel = channel_for(Field::Text, 8, Duration::from_millis(50));
        channel.status.store(RequestStatus::Canceled);
        let mut producer = ChunkedProducer::new(Arc::clone(&channel), Field::Text, &utf8());

        assert_eq!(producer.on_chunk(b"data"), Flow::Continue);
        assert!(producer.should_abort());
        assert!(!producer.produced());
        assert_eq!(content(&channel), "");
    }

    #[test]
    fn test_streaming_timeout_cancels() {
        let channel = channel_for(Field::Text, 4, Duration::from_millis(20));
        let mut producer = ChunkedProducer::new(Arc::clone(&channel), Field::Text, &utf8());

        assert_eq!(producer.on_chunk(b"abcdef"), Flow::Abort);
        assert_eq!(channel.status(), RequestStatus::Canceled);
        assert!(channel.to_caller.is_raised());
        assert_eq!(channel.stats.snapshot().rendezvous_timeouts, 1);
    }

    #[test]
    fn test_streaming_carries_overflow_after_ack() {
        let channel = channel_for(Field::Text, 4, Duration::from_secs(2));
        let mut producer = ChunkedProducer::new(Arc::clone(&channel), Field::Text, &utf8());

        let caller = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..2 {
                    assert_eq!(
                        channel.to_caller.wait(Duration::from_secs(2)),
                        WaitOutcome::Signaled
                    );
                    let mut request = channel.request.lock();
                    let buffer = request.buffer.as_mut().unwrap();
                    seen.push(units_to_string(buffer.content()));
                    buffer.clear();
                    drop(request);
                    channel.to_worker.raise();
                }
                seen
            })
        };

        assert_eq!(producer.on_chunk(b"abcdefg"), Flow::Continue);
        assert_eq!(caller.join().unwrap(), vec!["abc", "def"]);
        assert_eq!(content(&channel), "g");
        assert_eq!(
            channel.request.lock().result,
            ResultCode::Success(ValueType::FullTextW)
        );
    }
}
