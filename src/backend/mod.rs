//! Document backend collaborator interface
//!
//! The relay never parses documents itself. It drives a [`Backend`] from
//! the worker thread: open a document, answer single-shot queries, and run
//! a push-style traversal that hands raw byte spans to a [`ChunkSink`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   open(source)   ┌────────────────────┐
//! │   ExtractionWorker   │ ───────────────▶ │      Backend       │
//! │  (relay-N thread)    │                  │  TextFileBackend   │
//! └──────────┬───────────┘                  │  MemoryBackend     │
//!            │ traverse(sink)               └────────────────────┘
//!            ▼
//! ┌──────────────────────┐  on_chunk(bytes) / should_abort()
//! │   Box<dyn Document>  │ ─────────────────────────────────▶ ChunkedProducer
//! └──────────────────────┘
//! ```
//!
//! Two backends ship with the crate:
//! - [`TextFileBackend`]: plain text files, pages separated by form feed
//! - [`MemoryBackend`]: scripted in-memory documents for tests and hosts

pub mod memory;
pub mod text_file;

pub use memory::{MemoryBackend, MemoryDocument, MemoryStats};
pub use text_file::TextFileBackend;

use crate::error::BackendResult;
use crate::relay::types::FieldValue;
use std::path::Path;

/// Instruction returned from a sink to the traversal loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Abort,
}

/// Receiver of traversal output
///
/// `should_abort` may be called from inside the same call stack as
/// `on_chunk`; implementations must not hold locks across either call.
pub trait ChunkSink {
    /// Accept one span of raw bytes
    fn on_chunk(&mut self, bytes: &[u8]) -> Flow;

    /// Polled between pages and chunks
    fn should_abort(&self) -> bool;
}

/// Read-only single-shot queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentQuery {
    /// Document info dictionary string, by key
    Info(&'static str),
    /// Document info date, by key
    Date(&'static str),
    PageCount,
    Version,
    PageWidthPoints,
    PageHeightPoints,
    CanCopy,
    CanPrint,
    CanAddNotes,
    CanChange,
    Encrypted,
    Tagged,
    Linearized,
    Incremental,
    HasSignature,
    Id,
}

/// An open document
pub trait Document: Send {
    fn is_valid(&self) -> bool;

    fn page_count(&self) -> usize;

    /// Push the document content to `sink`, page by page
    ///
    /// Returns early, without error, once the sink asks to abort.
    fn traverse(&mut self, sink: &mut dyn ChunkSink) -> BackendResult<()>;

    fn query(&self, query: DocumentQuery) -> Option<FieldValue>;

    /// Compact permission/structure string: `PCMNITLES` with `-` for unset
    fn attributes(&self) -> String {
        const FLAGS: [(DocumentQuery, char); 9] = [
            (DocumentQuery::CanPrint, 'P'),
            (DocumentQuery::CanCopy, 'C'),
            (DocumentQuery::CanChange, 'M'),
            (DocumentQuery::CanAddNotes, 'N'),
            (DocumentQuery::Incremental, 'I'),
            (DocumentQuery::Tagged, 'T'),
            (DocumentQuery::Linearized, 'L'),
            (DocumentQuery::Encrypted, 'E'),
            (DocumentQuery::HasSignature, 'S'),
        ];

        FLAGS
            .iter()
            .map(|(query, mark)| match self.query(*query) {
                Some(FieldValue::Bool(true)) => *mark,
                _ => '-',
            })
            .collect()
    }
}

/// Factory for documents
pub trait Backend: Send + Sync {
    fn open(&self, source: &Path) -> BackendResult<Box<dyn Document>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Push `pages` through `sink` in spans of at most `chunk_bytes`
///
/// The shared traversal loop of the bundled backends. Checks
/// `should_abort` before every page and every span.
pub(crate) fn push_pages<'a, I>(pages: I, chunk_bytes: usize, sink: &mut dyn ChunkSink)
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let chunk_bytes = chunk_bytes.max(2);
    for page in pages {
        if sink.should_abort() {
            return;
        }
        for span in page.chunks(chunk_bytes) {
            if sink.should_abort() {
                return;
            }
            if sink.on_chunk(span) == Flow::Abort {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collect {
        bytes: Vec<u8>,
        limit: usize,
    }

    impl ChunkSink for Collect {
        fn on_chunk(&mut self, bytes: &[u8]) -> Flow {
            self.bytes.extend_from_slice(bytes);
            if self.bytes.len() >= self.limit {
                Flow::Abort
            } else {
                Flow::Continue
            }
        }

        fn should_abort(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_push_pages_stops_on_abort() {
        let pages = vec![&b"abcdef"[..], &b"ghijkl"[..]];
        let mut sink = Collect {
            bytes: Vec::new(),
            limit: 8,
        };
        push_pages(pages, 4, &mut sink);
        assert_eq!(sink.bytes, b"abcdefghij");
    }
}
