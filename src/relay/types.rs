//! Status, result and value types shared by the relay components
//!
//! Numeric codes follow the host plugin protocol so a thin FFI shim can
//! return them unchanged.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestStatus {
    /// No document open
    Closed = 0,
    /// Extraction in progress or document armed for the next step
    Active = 1,
    /// Last extraction step finished
    Complete = 2,
    /// Extraction canceled, document about to close
    Canceled = 3,
}

impl RequestStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RequestStatus::Active,
            2 => RequestStatus::Complete,
            3 => RequestStatus::Canceled,
            _ => RequestStatus::Closed,
        }
    }

    /// Whether `self -> to` is an edge of the request state machine
    pub fn can_transition_to(self, to: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, to),
            (Closed, Active)
                | (Active, Complete)
                | (Active, Canceled)
                | (Complete, Active)
                | (Complete, Closed)
                | (Canceled, Closed)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Closed => "closed",
            RequestStatus::Active => "active",
            RequestStatus::Complete => "complete",
            RequestStatus::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Atomic cell holding a [`RequestStatus`]
///
/// Read and written by both the caller and the worker thread. Every
/// conditional change goes through [`AtomicStatus::transition`].
#[derive(Debug)]
pub struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub fn new(status: RequestStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn load(&self) -> RequestStatus {
        RequestStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Compare-and-swap `from -> to`; returns true if this call made the change
    pub fn transition(&self, from: RequestStatus, to: RequestStatus) -> bool {
        debug_assert!(from.can_transition_to(to), "illegal edge {from} -> {to}");
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Unconditional store, used when a document is opened or closed
    pub fn store(&self, status: RequestStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }
}

/// Declared type of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Numeric32,
    Numeric64,
    NumericFloating,
    Date,
    Time,
    Boolean,
    MultipleChoice,
    String,
    FullText,
    DateTime,
    StringW,
    FullTextW,
}

impl ValueType {
    /// Host protocol type code
    pub fn code(self) -> i32 {
        match self {
            ValueType::Numeric32 => 1,
            ValueType::Numeric64 => 2,
            ValueType::NumericFloating => 3,
            ValueType::Date => 4,
            ValueType::Time => 5,
            ValueType::Boolean => 6,
            ValueType::MultipleChoice => 7,
            ValueType::String => 8,
            ValueType::FullText => 9,
            ValueType::DateTime => 10,
            ValueType::StringW => 11,
            ValueType::FullTextW => 12,
        }
    }
}

/// Outcome of one `submit` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// Data delivered, with its type
    Success(ValueType),
    /// Nothing to return (not an error)
    Empty,
    /// Document could not be opened or failed mid-operation
    IoError,
    /// Retry later from a context that may block
    Delayed,
    /// Unimplemented surface
    NotSupported,
    /// Field index outside the catalog
    NoSuchField,
}

impl ResultCode {
    /// Host protocol result code
    pub fn code(self) -> i32 {
        match self {
            ResultCode::Success(ty) => ty.code(),
            ResultCode::Delayed => 0,
            ResultCode::NoSuchField => -1,
            ResultCode::IoError => -2,
            ResultCode::Empty => -3,
            ResultCode::NotSupported => -5,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ResultCode::Success(_))
    }
}

/// Outcome of a two-source comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    /// Content is binary identical
    Eq,
    /// Content is equal once delimiters and case are ignored
    EqText,
    /// Content differs
    NotEq,
    /// A pipeline could not be started
    Error,
    /// Aborted by the caller or by a rendezvous timeout
    Abort,
    /// This field cannot be compared here; try the next handler
    Next,
}

impl CompareResult {
    /// Host protocol compare code
    pub fn code(self) -> i32 {
        match self {
            CompareResult::EqText => 2,
            CompareResult::Eq => 1,
            CompareResult::NotEq => 0,
            CompareResult::Error => -1,
            CompareResult::Abort => -2,
            CompareResult::Next => -3,
        }
    }
}

/// A single-shot field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i32),
    Float(f64),
    Bool(bool),
    /// Seconds since the Unix epoch, UTC
    DateTime(i64),
    Text(String),
}

impl FieldValue {
    /// Type reported to the caller for this value
    pub fn value_type(&self) -> ValueType {
        match self {
            FieldValue::Int(_) => ValueType::Numeric32,
            FieldValue::Float(_) => ValueType::NumericFloating,
            FieldValue::Bool(_) => ValueType::Boolean,
            FieldValue::DateTime(_) => ValueType::DateTime,
            FieldValue::Text(_) => ValueType::StringW,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{:.2}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::DateTime(v) => write!(f, "@{}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

/// Host flags passed with a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFlags {
    /// Caller is on a thread that must not block; answer `Delayed`
    pub delay_if_slow: bool,
}

impl RequestFlags {
    const DELAY_IF_SLOW: i32 = 1;

    /// Decode host flag bits
    pub fn from_bits(bits: i32) -> Self {
        Self {
            delay_if_slow: bits & Self::DELAY_IF_SLOW != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_edges() {
        use RequestStatus::*;
        assert!(Closed.can_transition_to(Active));
        assert!(Active.can_transition_to(Canceled));
        assert!(Canceled.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Complete));
        assert!(!Canceled.can_transition_to(Active));
        assert!(!Complete.can_transition_to(Canceled));
    }

    #[test]
    fn test_atomic_status_cas() {
        let status = AtomicStatus::new(RequestStatus::Active);
        assert!(status.transition(RequestStatus::Active, RequestStatus::Canceled));
        assert!(!status.transition(RequestStatus::Active, RequestStatus::Complete));
        assert_eq!(status.load(), RequestStatus::Canceled);
    }

    #[test]
    fn test_host_codes() {
        assert_eq!(ResultCode::Empty.code(), -3);
        assert_eq!(ResultCode::Success(ValueType::StringW).code(), 11);
        assert_eq!(CompareResult::EqText.code(), 2);
        assert_eq!(CompareResult::Next.code(), -3);
        assert!(RequestFlags::from_bits(1).delay_if_slow);
        assert!(!RequestFlags::from_bits(0).delay_if_slow);
    }
}
