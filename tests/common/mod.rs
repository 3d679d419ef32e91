// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Shared helpers for building well-formed `MNML` artifacts by hand, so
//! integration tests can exercise `minvm`'s public pipeline
//! (`loader::validate` → `deserialize::deserialize` → `vm::Vm`) without a
//! front-end compiler.

#![allow(dead_code, reason = "not every helper is used by every test binary")]

use minvm::checksum::crc32;

/// Value tags from the `MNML` wire format.
pub mod tag {
    pub const INT: u8 = 0;
    pub const STRING: u8 = 2;
    pub const FUNCTION: u8 = 7;
}

/// Encode a chunk's bytes: `name_len name code_len code const_count
/// constants... meta_count metadata...`.
pub fn chunk_bytes(name: &str, code: &[u8], constants: &[Vec<u8>], meta: &[(u32, u32, u32)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&(code.len() as u32).to_le_bytes());
    out.extend_from_slice(code);
    out.extend_from_slice(&(constants.len() as u32).to_le_bytes());
    for c in constants {
        out.extend_from_slice(c);
    }
    out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
    for (line, col, length) in meta {
        out.extend_from_slice(&line.to_le_bytes());
        out.extend_from_slice(&col.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
    }
    out
}

/// Encode an `Int` constant.
pub fn int_const(n: i32) -> Vec<u8> {
    let mut v = vec![tag::INT];
    v.extend_from_slice(&n.to_le_bytes());
    v
}

/// Encode a `String` constant.
pub fn string_const(s: &str) -> Vec<u8> {
    let mut v = vec![tag::STRING];
    v.extend_from_slice(&(s.len() as u32).to_le_bytes());
    v.extend_from_slice(s.as_bytes());
    v
}

/// Encode a `Function` constant wrapping `inner` (already-encoded chunk bytes).
pub fn function_const(arity: u32, name: Option<&str>, inner_chunk: &[u8]) -> Vec<u8> {
    let mut v = vec![tag::FUNCTION];
    v.extend_from_slice(&arity.to_le_bytes());
    match name {
        Some(n) => {
            v.push(1);
            v.extend_from_slice(&(n.len() as u32).to_le_bytes());
            v.extend_from_slice(n.as_bytes());
        }
        None => v.push(0),
    }
    v.extend_from_slice(inner_chunk);
    v
}

/// Wrap a top-level chunk's bytes into a full, validly-checksummed artifact.
pub fn build_artifact(top_level_chunk: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(top_level_chunk);

    let mut bytes = b"MNML".to_vec();
    bytes.extend_from_slice(&payload);
    let checksum = crc32(&payload);
    bytes.extend_from_slice(&checksum.to_le_bytes());
    bytes
}
