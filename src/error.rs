//! Bridge error handling
//!
//! Every failure in the per-frame pipeline is funneled into [`BridgeError`]
//! and latched on the owning per-context state; errors are reported through
//! the log side channel and never cross the traversal boundary.

use thiserror::Error;

/// Result type used throughout the bridge.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// The bridge error taxonomy.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Platform/device enumeration turned up no compute-capable device.
    #[error("no compute-capable device found")]
    NoComputeDevice,

    /// Context creation failed on every device, with and without interop.
    #[error("compute context creation failed: {0}")]
    ContextCreation(String),

    /// The compute client could not compile or prepare its kernels.
    #[error("client program build failed: {0}")]
    ClientBuild(String),

    /// Allocation, wrap, acquire or release of an interop buffer failed.
    #[error("buffer {op} failed: {detail}")]
    Buffer { op: &'static str, detail: String },

    /// Kernel submission or execution reported an error.
    #[error("kernel dispatch failed: {0}")]
    Dispatch(String),

    /// Raw error surfaced by either device API.
    #[error("backend error: {0}")]
    Backend(String),
}

impl BridgeError {
    /// Shorthand for a buffer-stage failure.
    pub fn buffer(op: &'static str, detail: impl std::fmt::Display) -> Self {
        BridgeError::Buffer {
            op,
            detail: detail.to_string(),
        }
    }
}

/// Helper trait for attaching the failing buffer operation to raw results.
pub trait BufferErrorContext<T> {
    fn buffer_context(self, op: &'static str) -> BridgeResult<T>;
}

impl<T, E> BufferErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn buffer_context(self, op: &'static str) -> BridgeResult<T> {
        self.map_err(|e| BridgeError::buffer(op, e))
    }
}

impl<T> BufferErrorContext<T> for Option<T> {
    fn buffer_context(self, op: &'static str) -> BridgeResult<T> {
        self.ok_or_else(|| BridgeError::buffer(op, "resource missing"))
    }
}
