//! Crate-wide error type for the few operations that are genuinely fallible.
//!
//! Most of the core is total by design (see the error taxonomy in the design
//! notes): unmapped accesses, invalid opcodes, bad peripheral offsets and
//! division by zero are all counted and swallowed rather than propagated.
//! `CoreError` exists only for the two boundary operations that can fail:
//! ROM loading and the engine's own fatal-interpreter-error channel.

use thiserror::Error;

/// Errors surfaced across the core's public boundary.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// ROM image failed validation during `load_rom`.
    #[error("invalid ROM: {reason}")]
    InvalidRom {
        /// Human-readable reason the image was rejected.
        reason: String,
    },
    /// A host-level fault inside the interpreter forced the engine to ERROR.
    #[error("interpreter fault at pc={pc:#010x}: {message}")]
    Interpreter {
        /// Program counter at the time of the fault.
        pc: u32,
        /// Human-readable description.
        message: String,
    },
}
