//! Error kinds for the sheriff crate (spec §7).

use crate::config::ParseError;
use thiserror::Error;

/// All fallible outcomes the sheriff's public API can produce.
#[derive(Debug, Error)]
pub enum SheriffError {
    /// Configuration text failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A mutator was called while the sheriff is in observer mode.
    #[error("operation not permitted in observer mode")]
    ModeViolation,

    /// A lookup by sheriff_id, deputy name, or script name found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// An argument was structurally invalid (unknown ident_type, unknown
    /// wait_status, duplicate script name, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The sheriff_id allocator exhausted its probe budget (spec §4.4: 2^16
    /// probes) without finding a free id.
    #[error("no free sheriff id available")]
    ResourceExhausted,

    /// `execute_script` validation failed; returned as data, not raised.
    #[error("script validation failed: {}", .0.join("; "))]
    ScriptValidation(Vec<String>),

    /// An inbound bus payload could not be decoded. Logged and dropped at
    /// the boundary, never surfaced past the reconciliation engine.
    #[error("invalid inbound message: {0}")]
    InvalidMessage(String),

    /// A script removal was attempted while that script (or any script)
    /// is actively executing.
    #[error("script is in use and cannot be removed")]
    ScriptInUse,
}

pub type Result<T> = std::result::Result<T, SheriffError>;
