//! Unified error types for the evaluation kernel.
//!
//! A single `Error` enum that every subsystem converts into keeps the
//! control surface's error handling uniform. Scan-internal faults are
//! deliberately *not* errors: they are recorded per card and through
//! the [`FaultSink`](crate::ports::FaultSink) port so a scan always
//! runs to completion.

use core::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level kernel error
// ---------------------------------------------------------------------------

/// Every fallible operation outside the scan path funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Staged configuration failed validation.
    Validation(Vec<ValidationError>),
    /// A persistence slot operation failed.
    Storage(StorageError),
    /// A control-surface request was malformed or not permitted.
    Surface(ErrorCode),
    /// Internal invariant violation (should be unreachable).
    Internal(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(errors) => write!(f, "validation failed ({} errors)", errors.len()),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Surface(code) => write!(f, "request rejected: {code}"),
            Self::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Kernel-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Stable control-surface error codes
// ---------------------------------------------------------------------------

/// Wire-stable error codes returned to the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    UnsupportedSchemaVersion,
    ValidationFailed,
    CommitFailed,
    RestoreFailed,
    Busy,
    NotFound,
    ForbiddenInMode,
    Unauthorized,
    Forbidden,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::UnsupportedSchemaVersion => "UNSUPPORTED_SCHEMA_VERSION",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::CommitFailed => "COMMIT_FAILED",
            Self::RestoreFailed => "RESTORE_FAILED",
            Self::Busy => "BUSY",
            Self::NotFound => "NOT_FOUND",
            Self::ForbiddenInMode => "FORBIDDEN_IN_MODE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Commit-time validation errors
// ---------------------------------------------------------------------------

/// Stable validation codes emitted by the commit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationCode {
    /// Unsupported schema version.
    #[serde(rename = "V-CFG-001")]
    VCfg001,
    /// Duplicate card id.
    #[serde(rename = "V-CFG-002")]
    VCfg002,
    /// Condition or binding reference does not resolve.
    #[serde(rename = "V-CFG-003")]
    VCfg003,
    /// Field out of range or enum membership violated.
    #[serde(rename = "V-CFG-004")]
    VCfg004,
    /// Scan interval outside 10..=1000 ms.
    #[serde(rename = "V-CFG-005")]
    VCfg005,
    /// Condition block shape: clauseB present without a combiner.
    #[serde(rename = "V-CFG-006")]
    VCfg006,
    /// Condition block shape: combiner present without clauseB.
    #[serde(rename = "V-CFG-007")]
    VCfg007,
    /// AI cards reject set/reset blocks.
    #[serde(rename = "V-CFG-008")]
    VCfg008,
    /// RTC cards reject set/reset blocks.
    #[serde(rename = "V-CFG-009")]
    VCfg009,
    /// MATH operator not a member of the arithmetic set.
    #[serde(rename = "V-CFG-010")]
    VCfg010,
    /// Range insane where a real min < max range is required.
    #[serde(rename = "V-CFG-011")]
    VCfg011,
    /// Binding type/range/unit incompatibility.
    #[serde(rename = "V-CFG-012")]
    VCfg012,
    /// Dependency cycle in the binding/condition graph.
    #[serde(rename = "V-CFG-013")]
    VCfg013,
    /// Binding writes a variable owned by another card.
    #[serde(rename = "V-CFG-014")]
    VCfg014,
    /// wifi.staOnly must be true.
    #[serde(rename = "V-CFG-015")]
    VCfg015,
    /// DI/DO channel outside the hardware profile.
    #[serde(rename = "V-CFG-017")]
    VCfg017,
    /// AI channel outside the hardware profile.
    #[serde(rename = "V-CFG-018")]
    VCfg018,
    /// Soft-family capacity (SIO/MATH/RTC) exceeded.
    #[serde(rename = "V-CFG-019")]
    VCfg019,
}

impl ValidationCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VCfg001 => "V-CFG-001",
            Self::VCfg002 => "V-CFG-002",
            Self::VCfg003 => "V-CFG-003",
            Self::VCfg004 => "V-CFG-004",
            Self::VCfg005 => "V-CFG-005",
            Self::VCfg006 => "V-CFG-006",
            Self::VCfg007 => "V-CFG-007",
            Self::VCfg008 => "V-CFG-008",
            Self::VCfg009 => "V-CFG-009",
            Self::VCfg010 => "V-CFG-010",
            Self::VCfg011 => "V-CFG-011",
            Self::VCfg012 => "V-CFG-012",
            Self::VCfg013 => "V-CFG-013",
            Self::VCfg014 => "V-CFG-014",
            Self::VCfg015 => "V-CFG-015",
            Self::VCfg017 => "V-CFG-017",
            Self::VCfg018 => "V-CFG-018",
            Self::VCfg019 => "V-CFG-019",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a structured validation failure list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// Dotted field path, e.g. `cards[3].config.emaAlpha`.
    pub path: String,
    pub code: ValidationCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.path, self.message)
    }
}

impl From<Vec<ValidationError>> for Error {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::Validation(errors)
    }
}

// ---------------------------------------------------------------------------
// Adapter errors
// ---------------------------------------------------------------------------

/// Errors surfaced by input/output adapters. All variants are `Copy`
/// so they can pass through the scan path without allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// Channel read returned an error or timed out.
    ReadFailed,
    /// Channel write was rejected by the driver.
    WriteFailed,
    /// Channel number not present on this hardware.
    NoSuchChannel,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::NoSuchChannel => write!(f, "no such channel"),
        }
    }
}

/// Errors from the slot-addressed [`Storage`](crate::ports::Storage) port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested slot holds no data.
    NotFound,
    /// Backing store is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored bytes failed integrity or decode checks.
    Corrupted,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "slot not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "slot corrupted"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Runtime fault kinds
// ---------------------------------------------------------------------------

/// Categories of scan-time faults recorded through the fault sink.
/// Never fatal to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    /// Scan exceeded its overrun budget.
    ScanOverrun,
    /// An input adapter failed to read.
    InputRead,
    /// An output adapter rejected a write.
    OutputWrite,
    /// MATH numeric domain error (divide by zero, POW overflow, ...).
    MathDomain,
    /// Wall clock unsynchronized while an RTC card is enabled.
    TimeUnsynced,
    /// Command queue overflowed; a command was rejected with BUSY.
    QueueOverflow,
}

impl FaultKind {
    /// Number of fault kinds; sizes the persisted ledger array.
    pub const COUNT: usize = 6;

    /// Stable index used by the persisted fault ledger.
    pub const fn index(self) -> usize {
        match self {
            Self::ScanOverrun => 0,
            Self::InputRead => 1,
            Self::OutputWrite => 2,
            Self::MathDomain => 3,
            Self::TimeUnsynced => 4,
            Self::QueueOverflow => 5,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanOverrun => write!(f, "scan overrun"),
            Self::InputRead => write!(f, "input read fault"),
            Self::OutputWrite => write!(f, "output write fault"),
            Self::MathDomain => write!(f, "math domain fault"),
            Self::TimeUnsynced => write!(f, "time source unsynced"),
            Self::QueueOverflow => write!(f, "command queue overflow"),
        }
    }
}
