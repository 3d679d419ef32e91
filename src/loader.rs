// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Artifact loading: read the whole artifact into memory and validate its
//! header and checksum before handing it to the deserializer.

#[cfg(test)]
mod loader_test;

use crate::checksum::crc32;
use crate::error::{VmError, VmResult};
use std::io::Read;

/// Magic bytes every `MNML` artifact must begin with.
pub const HEADER: &[u8; 4] = b"MNML";
/// Length of the header in bytes.
pub const HEADER_LEN: usize = 4;
/// Length of the trailing checksum in bytes.
pub const CHECKSUM_LEN: usize = 4;

/// The sentinel path that means "read the artifact from standard input".
const STDIN_SENTINEL: &str = "*stdin";

/// Read the artifact named by `path` into memory.
///
/// `path` equal to `*stdin` (case-insensitive) reads from standard input
/// until EOF instead of opening a file.
///
/// # Errors
///
/// Returns [`VmError::Io`] if the file cannot be opened or standard input
/// cannot be read.
pub fn read(path: &str) -> VmResult<Vec<u8>> {
    log::debug!("loading artifact from {path}");
    if path.eq_ignore_ascii_case(STDIN_SENTINEL) {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|source| VmError::Io {
                path: path.to_string(),
                source,
            })?;
        Ok(buf)
    } else {
        std::fs::read(path).map_err(|source| VmError::Io {
            path: path.to_string(),
            source,
        })
    }
}

/// Validate an artifact's length, header, and trailing checksum.
///
/// # Errors
///
/// Returns [`VmError::InvalidArtifact`] if the buffer is too short, the
/// header does not match `MNML`, or the trailing CRC-32 does not match the
/// checksum of the bytes between the header and the trailer.
pub fn validate(bytes: &[u8]) -> VmResult<()> {
    if bytes.len() <= HEADER_LEN + CHECKSUM_LEN {
        log::error!("artifact too short: {} bytes", bytes.len());
        return Err(VmError::InvalidArtifact(
            "artifact is not valid: too short to contain a header and checksum".to_string(),
        ));
    }

    if &bytes[..HEADER_LEN] != HEADER {
        log::error!("artifact header mismatch");
        return Err(VmError::InvalidArtifact(
            "artifact is not valid: bad header".to_string(),
        ));
    }

    let payload_end = bytes.len() - CHECKSUM_LEN;
    let expected = u32::from_le_bytes(
        bytes[payload_end..]
            .try_into()
            .expect("checksum slice is exactly 4 bytes"),
    );
    let actual = crc32(&bytes[HEADER_LEN..payload_end]);
    if actual != expected {
        log::error!("artifact checksum mismatch: expected {expected:#010x}, got {actual:#010x}");
        return Err(VmError::InvalidArtifact(
            "artifact is not valid: checksum mismatch".to_string(),
        ));
    }

    Ok(())
}

/// Read and validate an artifact in one step.
///
/// # Errors
///
/// See [`read`] and [`validate`].
pub fn load(path: &str) -> VmResult<Vec<u8>> {
    let bytes = read(path)?;
    validate(&bytes)?;
    Ok(bytes)
}
