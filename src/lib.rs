//! content-relay - Incremental, cancelable field extraction
//!
//! Drives a blocking, push-style document backend from a dedicated worker
//! thread so that a caller can pull document fields one bounded chunk at a
//! time, cancel at any point, and compare two documents while both are
//! still being read.
//!
//! # Features
//!
//! - **Bounded Streaming**: Full text is handed over in buffer-sized chunks;
//!   the backend traversal is suspended between chunks.
//!
//! - **Cancelable**: Every request can be stopped; a caller that stops
//!   asking for chunks is detected by timeout.
//!
//! - **Idle Reclamation**: An open document is closed after a period
//!   without requests and reopened transparently.
//!
//! - **Streaming Comparison**: Two documents are compared chunk by chunk,
//!   binary first, then as text with delimiters and case ignored.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Caller                                │
//! │        submit / stop / teardown           compare                │
//! └──────────────┬───────────────────────────────┬──────────────────┘
//!                │                               │
//!                ▼                               ▼
//!     ┌────────────────────┐       ┌───────────────────────────┐
//!     │ RequestCoordinator │◀──────│   DualStreamComparator    │
//!     └─────────┬──────────┘       │  (two coordinators)       │
//!               │                  └───────────────────────────┘
//!               │ RequestChannel (mutex + status + 2 signals)
//!               ▼
//!     ┌────────────────────┐
//!     │  Worker thread     │   one per coordinator, named relay-<n>
//!     │  ChunkedProducer   │
//!     └─────────┬──────────┘
//!               │ open / query / traverse
//!               ▼
//!     ┌────────────────────┐
//!     │  Backend           │   text files, in-memory documents
//!     └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # List fields
//! content-relay fields
//!
//! # Stream the text of a document, stopping at the first match
//! content-relay extract report.txt -f text --find invoice
//!
//! # Compare two documents as text
//! content-relay compare a.txt b.txt -f text -p
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod fields;
pub mod progress;
pub mod relay;
pub mod text;

pub use config::{CliArgs, RelayConfig};
pub use error::{RelayError, Result};
pub use relay::{
    CompareResult, DualStreamComparator, ProgressControl, RequestCoordinator, RequestFlags,
    RequestStatus, ResultCode,
};
