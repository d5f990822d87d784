//! Plain text file backend
//!
//! Opens a file on disk and keeps the handle for as long as the document is
//! open, so an idle-timeout close actually releases the file. Files are read
//! as UTF-8 bytes with pages separated by form feed. Traversal re-reads the
//! file and pushes each page in the configured encoding, with a line break
//! between pages. UTF-8 output passes the bytes through untouched, so
//! malformed sequences reach the decoder.

use super::{push_pages, Backend, ChunkSink, Document, DocumentQuery};
use crate::error::{BackendError, BackendResult};
use crate::relay::types::FieldValue;
use crate::text::TextEncoding;
use std::fs::{File, Metadata};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::trace;

/// Page separator in text files (form feed)
const PAGE_BREAK: u8 = 0x0C;

/// Emitted between pages during traversal
const PAGE_SEPARATOR: &str = "\n";

/// Default span size pushed per chunk, in bytes
const DEFAULT_CHUNK_BYTES: usize = 512;

/// Backend for plain text files
#[derive(Debug, Clone)]
pub struct TextFileBackend {
    encoding: TextEncoding,
    chunk_bytes: usize,
}

impl TextFileBackend {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }

    /// Set the span size pushed per chunk
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }
}

impl Default for TextFileBackend {
    fn default() -> Self {
        Self::new(TextEncoding::default())
    }
}

impl Backend for TextFileBackend {
    fn open(&self, source: &Path) -> BackendResult<Box<dyn Document>> {
        let file = File::open(source).map_err(|e| BackendError::OpenFailed {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;

        let metadata = file.metadata().map_err(|e| BackendError::OpenFailed {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !metadata.is_file() {
            return Err(BackendError::InvalidDocument {
                path: source.to_path_buf(),
                reason: "not a regular file".into(),
            });
        }

        let mut doc = TextDocument {
            path: source.to_path_buf(),
            file,
            metadata,
            encoding: self.encoding,
            chunk_bytes: self.chunk_bytes,
            pages: 0,
        };
        doc.pages = doc.read_pages()?.len();

        Ok(Box::new(doc))
    }

    fn name(&self) -> &'static str {
        "text-file"
    }
}

/// An open text file
struct TextDocument {
    path: PathBuf,
    file: File,
    metadata: Metadata,
    encoding: TextEncoding,
    chunk_bytes: usize,
    pages: usize,
}

impl TextDocument {
    fn read_pages(&mut self) -> BackendResult<Vec<Vec<u8>>> {
        let mut content = Vec::new();
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.read_to_end(&mut content))
            .map_err(|e| BackendError::TraversalFailed {
                path: self.path.clone(),
                page: 0,
                reason: e.to_string(),
            })?;

        if content.is_empty() {
            return Ok(Vec::new());
        }
        Ok(content
            .split(|&b| b == PAGE_BREAK)
            .map(<[u8]>::to_vec)
            .collect())
    }

    /// Page bytes in the wire encoding
    fn encode_page(&self, page: &[u8]) -> Vec<u8> {
        match self.encoding {
            TextEncoding::Utf8 => page.to_vec(),
            TextEncoding::Utf16Be => self.encoding.encode(&String::from_utf8_lossy(page)),
        }
    }
}

impl Document for TextDocument {
    fn is_valid(&self) -> bool {
        self.metadata.is_file()
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn traverse(&mut self, sink: &mut dyn ChunkSink) -> BackendResult<()> {
        let pages = self.read_pages()?;
        let last = pages.len().saturating_sub(1);
        let separator = self.encoding.encode(PAGE_SEPARATOR);
        let encoded: Vec<Vec<u8>> = pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let mut bytes = self.encode_page(page);
                if i < last {
                    bytes.extend_from_slice(&separator);
                }
                bytes
            })
            .collect();

        trace!(path = %self.path.display(), pages = encoded.len(), "Traversing text file");
        push_pages(encoded.iter().map(Vec::as_slice), self.chunk_bytes, sink);
        Ok(())
    }

    fn query(&self, query: DocumentQuery) -> Option<FieldValue> {
        match query {
            DocumentQuery::PageCount => i32::try_from(self.pages).ok().map(FieldValue::Int),
            DocumentQuery::CanCopy
            | DocumentQuery::CanPrint
            | DocumentQuery::CanAddNotes
            | DocumentQuery::CanChange => Some(FieldValue::Bool(!self.metadata.permissions().readonly())),
            DocumentQuery::Encrypted
            | DocumentQuery::Tagged
            | DocumentQuery::Linearized
            | DocumentQuery::Incremental
            | DocumentQuery::HasSignature => Some(FieldValue::Bool(false)),
            DocumentQuery::Date("ModDate") => self
                .metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .and_then(|d| i64::try_from(d.as_secs()).ok())
                .map(FieldValue::DateTime),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Flow;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct Collect(Vec<u8>);

    impl ChunkSink for Collect {
        fn on_chunk(&mut self, bytes: &[u8]) -> Flow {
            self.0.extend_from_slice(bytes);
            Flow::Continue
        }

        fn should_abort(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_pages_and_traversal() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "page one\n\u{000C}page two\n").unwrap();

        let backend = TextFileBackend::new(TextEncoding::Utf8).with_chunk_bytes(4);
        let mut doc = backend.open(file.path()).unwrap();
        assert!(doc.is_valid());
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.query(DocumentQuery::PageCount), Some(FieldValue::Int(2)));

        let mut sink = Collect(Vec::new());
        doc.traverse(&mut sink).unwrap();
        assert_eq!(String::from_utf8(sink.0).unwrap(), "page one\n\npage two\n");
    }

    #[test]
    fn test_pages_are_separated_by_line_break() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "end\u{000C}start").unwrap();

        let backend = TextFileBackend::new(TextEncoding::Utf16Be);
        let mut doc = backend.open(file.path()).unwrap();
        let mut sink = Collect(Vec::new());
        doc.traverse(&mut sink).unwrap();
        assert_eq!(sink.0, TextEncoding::Utf16Be.encode("end\nstart"));
    }

    #[test]
    fn test_invalid_utf8_is_passed_through() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[b'a', 0xFF, b'b']).unwrap();

        let backend = TextFileBackend::new(TextEncoding::Utf8);
        let mut doc = backend.open(file.path()).unwrap();
        assert_eq!(doc.page_count(), 1);

        let mut sink = Collect(Vec::new());
        doc.traverse(&mut sink).unwrap();
        assert_eq!(sink.0, vec![b'a', 0xFF, b'b']);
    }

    #[test]
    fn test_open_missing_file() {
        let backend = TextFileBackend::default();
        let err = backend.open(Path::new("/definitely/not/here.txt")).err().unwrap();
        assert!(matches!(err, BackendError::OpenFailed { .. }));
    }

    #[test]
    fn test_attributes_string() {
        let file = NamedTempFile::new().unwrap();
        let doc = TextFileBackend::default().open(file.path()).unwrap();
        assert_eq!(doc.attributes(), "PCMN-----");
        assert_eq!(doc.page_count(), 0);
    }
}
