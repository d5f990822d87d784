//! In-memory backend
//!
//! Documents are registered up front under a path and scripted: page text,
//! info entries, open and per-page delay, and open failure. Open and close counts
//! are tracked so callers can verify that every opened document was
//! released.

use super::{push_pages, Backend, ChunkSink, Document, DocumentQuery};
use crate::error::{BackendError, BackendResult};
use crate::relay::types::FieldValue;
use crate::text::TextEncoding;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// Slice used while sleeping through a page delay
const DELAY_POLL: Duration = Duration::from_millis(2);

/// Scripted document content
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    pages: Vec<String>,
    info: HashMap<&'static str, FieldValue>,
    version: f64,
    page_size: (f64, f64),
    permissions: bool,
    encrypted: bool,
    id: Option<String>,
    open_delay: Duration,
    page_delay: Duration,
    /// Page delay ignores abort requests
    stall: bool,
    chunk_bytes: usize,
    fail_open: bool,
}

impl MemoryDocument {
    pub fn new<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
            info: HashMap::new(),
            version: 1.7,
            page_size: (595.0, 842.0),
            permissions: true,
            encrypted: false,
            id: None,
            open_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            stall: false,
            chunk_bytes: 64,
            fail_open: false,
        }
    }

    /// Document with a single page of `text`
    pub fn text(text: impl Into<String>) -> Self {
        Self::new([text.into()])
    }

    /// Set a document info string (`Title`, `Author`, `Creator`, ...)
    pub fn with_info(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.info.insert(key, FieldValue::Text(value.into()));
        self
    }

    /// Set a document date (`CreationDate`, `ModDate`), seconds since the epoch
    pub fn with_date(mut self, key: &'static str, seconds: i64) -> Self {
        self.info.insert(key, FieldValue::DateTime(seconds));
        self
    }

    pub fn with_version(mut self, version: f64) -> Self {
        self.version = version;
        self
    }

    /// First page size, in points
    pub fn with_page_size(mut self, width: f64, height: f64) -> Self {
        self.page_size = (width, height);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Deny every permission and mark the document encrypted
    pub fn locked(mut self) -> Self {
        self.permissions = false;
        self.encrypted = true;
        self
    }

    /// Block in `open` for this long, like a slow file system
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Sleep this long before pushing each page
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Sleep through the page delay without polling for abort, like a
    /// backend stuck in a blocking read
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }

    /// Make every open of this document fail
    pub fn failing(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

/// Open/close accounting shared by a backend and its documents
#[derive(Debug, Default)]
pub struct MemoryStats {
    opens: AtomicU64,
    closes: AtomicU64,
    failed_opens: AtomicU64,
}

impl MemoryStats {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn failed_opens(&self) -> u64 {
        self.failed_opens.load(Ordering::SeqCst)
    }

    /// Documents currently open
    pub fn open_now(&self) -> u64 {
        self.opens().saturating_sub(self.closes())
    }
}

/// Backend serving registered [`MemoryDocument`]s
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: RwLock<HashMap<PathBuf, Arc<MemoryDocument>>>,
    encoding: TextEncoding,
    stats: Arc<MemoryStats>,
}

impl MemoryBackend {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            encoding,
            stats: Arc::new(MemoryStats::default()),
        }
    }

    /// Register (or replace) the document served for `path`
    pub fn insert(&self, path: impl Into<PathBuf>, document: MemoryDocument) {
        self.documents.write().insert(path.into(), Arc::new(document));
    }

    pub fn stats(&self) -> Arc<MemoryStats> {
        Arc::clone(&self.stats)
    }
}

impl Backend for MemoryBackend {
    fn open(&self, source: &Path) -> BackendResult<Box<dyn Document>> {
        let document = self.documents.read().get(source).cloned();

        let document = match document {
            Some(doc) if !doc.fail_open => doc,
            Some(_) => {
                self.stats.failed_opens.fetch_add(1, Ordering::SeqCst);
                return Err(BackendError::InvalidDocument {
                    path: source.to_path_buf(),
                    reason: "scripted open failure".into(),
                });
            }
            None => {
                self.stats.failed_opens.fetch_add(1, Ordering::SeqCst);
                return Err(BackendError::OpenFailed {
                    path: source.to_path_buf(),
                    reason: "no such document".into(),
                });
            }
        };

        if !document.open_delay.is_zero() {
            thread::sleep(document.open_delay);
        }

        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(OpenMemoryDocument {
            path: source.to_path_buf(),
            document,
            encoding: self.encoding,
            stats: Arc::clone(&self.stats),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// An open handle; counts a close when dropped
struct OpenMemoryDocument {
    path: PathBuf,
    document: Arc<MemoryDocument>,
    encoding: TextEncoding,
    stats: Arc<MemoryStats>,
}

impl OpenMemoryDocument {
    /// Sleep through the page delay; false if the sink asked to abort
    fn wait_page_delay(&self, sink: &dyn ChunkSink) -> bool {
        if self.document.stall {
            thread::sleep(self.document.page_delay);
            return !sink.should_abort();
        }

        let deadline = Instant::now() + self.document.page_delay;
        loop {
            if sink.should_abort() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(DELAY_POLL.min(deadline - now));
        }
    }
}

impl Drop for OpenMemoryDocument {
    fn drop(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Document for OpenMemoryDocument {
    fn is_valid(&self) -> bool {
        true
    }

    fn page_count(&self) -> usize {
        self.document.pages.len()
    }

    fn traverse(&mut self, sink: &mut dyn ChunkSink) -> BackendResult<()> {
        trace!(path = %self.path.display(), pages = self.page_count(), "Traversing memory document");

        for page in &self.document.pages {
            if !self.document.page_delay.is_zero() && !self.wait_page_delay(sink) {
                break;
            }
            let bytes = self.encoding.encode(page);
            push_pages([bytes.as_slice()], self.document.chunk_bytes, sink);
            if sink.should_abort() {
                break;
            }
        }
        Ok(())
    }

    fn query(&self, query: DocumentQuery) -> Option<FieldValue> {
        let doc = &self.document;
        match query {
            DocumentQuery::Info(key) | DocumentQuery::Date(key) => doc.info.get(key).cloned(),
            DocumentQuery::PageCount => i32::try_from(doc.pages.len()).ok().map(FieldValue::Int),
            DocumentQuery::Version => Some(FieldValue::Float(doc.version)),
            DocumentQuery::PageWidthPoints => Some(FieldValue::Float(doc.page_size.0)),
            DocumentQuery::PageHeightPoints => Some(FieldValue::Float(doc.page_size.1)),
            DocumentQuery::CanCopy
            | DocumentQuery::CanPrint
            | DocumentQuery::CanAddNotes
            | DocumentQuery::CanChange => Some(FieldValue::Bool(doc.permissions)),
            DocumentQuery::Encrypted => Some(FieldValue::Bool(doc.encrypted)),
            DocumentQuery::Tagged
            | DocumentQuery::Linearized
            | DocumentQuery::Incremental
            | DocumentQuery::HasSignature => Some(FieldValue::Bool(false)),
            DocumentQuery::Id => doc.id.clone().map(FieldValue::Text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Flow;

    struct Collect {
        bytes: Vec<u8>,
    }

    impl ChunkSink for Collect {
        fn on_chunk(&mut self, bytes: &[u8]) -> Flow {
            self.bytes.extend_from_slice(bytes);
            Flow::Continue
        }

        fn should_abort(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_open_close_accounting() {
        let backend = MemoryBackend::new(TextEncoding::Utf8);
        backend.insert("/a", MemoryDocument::text("alpha"));
        let stats = backend.stats();

        let doc = backend.open(Path::new("/a")).unwrap();
        assert_eq!(stats.open_now(), 1);
        drop(doc);
        assert_eq!(stats.opens(), 1);
        assert_eq!(stats.closes(), 1);
        assert_eq!(stats.open_now(), 0);

        assert!(backend.open(Path::new("/missing")).is_err());
        assert_eq!(stats.failed_opens(), 1);
    }

    #[test]
    fn test_failing_document() {
        let backend = MemoryBackend::default();
        backend.insert("/bad", MemoryDocument::text("x").failing());
        let err = backend.open(Path::new("/bad")).err().unwrap();
        assert!(matches!(err, BackendError::InvalidDocument { .. }));
        assert_eq!(backend.stats().opens(), 0);
    }

    #[test]
    fn test_traverse_and_queries() {
        let backend = MemoryBackend::new(TextEncoding::Utf8);
        backend.insert(
            "/doc",
            MemoryDocument::new(["one ", "two"])
                .with_info("Title", "Report")
                .with_chunk_bytes(3)
                .locked(),
        );

        let mut doc = backend.open(Path::new("/doc")).unwrap();
        let mut sink = Collect { bytes: Vec::new() };
        doc.traverse(&mut sink).unwrap();
        assert_eq!(sink.bytes, b"one two");

        assert_eq!(
            doc.query(DocumentQuery::Info("Title")),
            Some(FieldValue::Text("Report".into()))
        );
        assert_eq!(doc.query(DocumentQuery::Info("Author")), None);
        assert_eq!(doc.attributes(), "-------E-");
    }
}
