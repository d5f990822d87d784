//! Request relay between a blocking caller and extraction workers
//!
//! ```text
//!   caller                      RequestChannel                 worker thread
//! ┌──────────────────┐   ┌───────────────────────────┐   ┌──────────────────┐
//! │RequestCoordinator│──▶│ Mutex<Request>            │◀──│ WorkerLoop       │
//! │ submit/stop      │   │ AtomicStatus              │   │  open document   │
//! │ teardown         │   │ to_worker ──────────────▶ │   │  query / traverse│
//! └──────────────────┘   │ ◀────────────── to_caller │   │  ChunkedProducer │
//!                        └───────────────────────────┘   └──────────────────┘
//! ```
//!
//! Caller and worker strictly alternate: the caller fills the request and
//! raises `to_worker`; the worker runs one step (or produces one chunk of a
//! streaming field) and raises `to_caller`. [`DualStreamComparator`] runs
//! two such pipelines in lock step.

pub mod channel;
pub mod compare;
pub mod coordinator;
pub mod producer;
pub mod signal;
pub mod types;
pub mod worker;

pub use channel::{FieldBuffer, StatsSnapshot};
pub use compare::{CompareSummary, DualStreamComparator, ProgressControl};
pub use coordinator::RequestCoordinator;
pub use types::{CompareResult, FieldValue, RequestFlags, RequestStatus, ResultCode, ValueType};
