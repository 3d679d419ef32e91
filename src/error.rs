// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Error taxonomy for the `minvm` pipeline.
//!
//! One variant per error kind named by the runtime's design: loader
//! failures, deserializer failures, and VM dispatch failures all collapse
//! into this single enum so `main` has one error type to report and map to
//! an exit code.

use thiserror::Error;

/// Any failure that can terminate a `minvm` run.
#[derive(Debug, Error)]
pub enum VmError {
    /// The artifact file or standard input could not be read.
    #[error("failed to read artifact from {path}: {source}")]
    Io {
        /// The path (or `*stdin`) that was being read.
        path: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The artifact's header or checksum did not validate.
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    /// The artifact's framed structure was well-formed enough to pass
    /// header/checksum validation but could not be decoded.
    #[error("malformed artifact: {0}")]
    MalformedArtifact(String),

    /// A heap or stack allocation could not be satisfied.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// The operand stack is full.
    #[error("stack overflow")]
    StackOverflow,

    /// The operand stack is empty where a value was expected.
    #[error("stack underflow")]
    StackUnderflow,

    /// An arithmetic operand had an unexpected runtime type.
    #[error("type error: {0}")]
    TypeError(String),

    /// Integer or float division (or modulo) by zero.
    #[error("divide by zero")]
    DivByZero,

    /// The call-frame stack is full.
    #[error("call frame overflow")]
    FrameOverflow,

    /// A reserved or unrecognized opcode was dispatched.
    #[error("unimplemented opcode: {0:#04x}")]
    Unimplemented(u8),
}

/// Convenience alias used throughout the crate.
pub type VmResult<T> = Result<T, VmError>;
