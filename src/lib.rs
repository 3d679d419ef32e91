// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # minvm
//!
//! Runtime for the `MNML` bytecode artifact format.
//!
//! This crate provides:
//! - Artifact loading and header/checksum validation ([`loader`])
//! - A deserializer from bytes to an in-memory chunk tree ([`deserialize`])
//! - The value and heap-object model ([`value`], [`object`])
//! - String interning ([`intern`])
//! - The operand-stack virtual machine ([`vm`]), including closures with
//!   open/closed upvalues
//!
//! The front-end compiler that produces `MNML` artifacts, and any
//! interactive debugger, are out of scope for this crate.

pub mod bytereader;
pub mod checksum;
pub mod chunk;
pub mod deserialize;
pub mod error;
pub mod frame;
pub mod intern;
pub mod loader;
pub mod object;
pub mod opcode;
pub mod value;
pub mod vm;

pub use error::{VmError, VmResult};
pub use vm::{TypeCheck, Vm};

/// Run a complete `minvm` pipeline: load, validate, deserialize, execute.
///
/// This is the entry point the CLI binary drives; library consumers that
/// need finer control (inspecting the deserialized chunk before running
/// it, picking a [`TypeCheck`] mode) should call [`loader`],
/// [`deserialize`], and [`Vm`] directly instead.
///
/// On a runtime error, the formatted diagnostic (matching the reference
/// VM's error report) is printed to stderr before the error is returned.
///
/// # Errors
///
/// Returns any [`VmError`] raised while loading, deserializing, or
/// executing the artifact.
pub fn run_artifact(path: &str) -> VmResult<value::Value> {
    let bytes = loader::load(path)?;
    let mut heap = object::Heap::new();
    let mut interner = intern::StringInterner::new();
    let chunk = deserialize::deserialize(&bytes, &mut heap, &mut interner)?;
    let mut vm = Vm::new(chunk, heap, interner);
    vm.run().map_err(|err| {
        eprint!("{}", vm.format_runtime_error(&err));
        err
    })
}
