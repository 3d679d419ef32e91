// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Deserializer: byte stream → [`Chunk`] tree + live object graph +
//! interned strings.
//!
//! Walks the `MNML` wire format recursively, materializing nested function
//! chunks as it goes. All allocation happens against
//! one shared [`Heap`] and [`StringInterner`] so nested chunks may freely
//! reference strings interned while deserializing an outer or sibling
//! chunk.

#[cfg(test)]
mod deserialize_test;

use crate::bytereader::Cursor;
use crate::chunk::{Chunk, Metadata};
use crate::error::{VmError, VmResult};
use crate::intern::StringInterner;
use crate::object::{FunctionObj, Heap, Object};
use crate::value::Value;
use std::rc::Rc;

mod tag {
    pub const INT: u8 = 0;
    pub const FLOAT: u8 = 1;
    pub const STRING: u8 = 2;
    pub const CHAR: u8 = 3;
    pub const BOOL: u8 = 4;
    pub const NIL: u8 = 5;
    pub const VOID: u8 = 6;
    pub const FUNCTION: u8 = 7;
    pub const CLOSURE: u8 = 8;
    pub const RANGE: u8 = 9;
    pub const RECORD: u8 = 10;
    pub const INSTANCE: u8 = 11;
    pub const BOUND_METHOD: u8 = 12;
}

fn malformed(what: impl Into<String>) -> VmError {
    VmError::MalformedArtifact(what.into())
}

/// Deserialize the top-level chunk starting right after the artifact
/// header.
///
/// # Errors
///
/// Returns [`VmError::MalformedArtifact`] on any truncated field, unknown
/// value tag, or other structural inconsistency.
pub fn deserialize(bytes: &[u8], heap: &mut Heap, interner: &mut StringInterner) -> VmResult<Rc<Chunk>> {
    let mut cursor = Cursor::new(bytes, crate::loader::HEADER_LEN);
    read_chunk(&mut cursor, heap, interner)
}

fn read_chunk(
    cursor: &mut Cursor<'_>,
    heap: &mut Heap,
    interner: &mut StringInterner,
) -> VmResult<Rc<Chunk>> {
    let name_bytes = cursor
        .read_bytes()
        .ok_or_else(|| malformed("truncated chunk name"))?;
    let name = String::from_utf8_lossy(&name_bytes).into_owned();

    let code = cursor
        .read_bytes()
        .ok_or_else(|| malformed("truncated code section"))?;

    let const_count = cursor
        .read_u32_le()
        .ok_or_else(|| malformed("truncated constant count"))?;
    let mut constants = Vec::with_capacity(const_count as usize);
    for _ in 0..const_count {
        constants.push(read_value(cursor, heap, interner)?);
    }

    let meta_count = cursor
        .read_u32_le()
        .ok_or_else(|| malformed("truncated metadata count"))?;
    let mut metadata = Vec::with_capacity(meta_count as usize);
    for _ in 0..meta_count {
        let line = cursor
            .read_u32_le()
            .ok_or_else(|| malformed("truncated metadata line"))?;
        let col = cursor
            .read_u32_le()
            .ok_or_else(|| malformed("truncated metadata column"))?;
        let length = cursor
            .read_u32_le()
            .ok_or_else(|| malformed("truncated metadata length"))?;
        metadata.push(Metadata { line, col, length });
    }

    Ok(Rc::new(Chunk {
        name,
        code,
        constants,
        metadata,
    }))
}

fn read_value(
    cursor: &mut Cursor<'_>,
    heap: &mut Heap,
    interner: &mut StringInterner,
) -> VmResult<Value> {
    let tag = cursor.read_u8().ok_or_else(|| malformed("truncated value tag"))?;
    match tag {
        tag::INT => {
            let n = cursor
                .read_i32_le()
                .ok_or_else(|| malformed("truncated int constant"))?;
            Ok(Value::int(n))
        }
        tag::FLOAT => {
            let n = cursor
                .read_f64_le()
                .ok_or_else(|| malformed("truncated float constant"))?;
            Ok(Value::float(n))
        }
        tag::STRING => {
            let bytes = cursor
                .read_bytes()
                .ok_or_else(|| malformed("truncated string constant"))?;
            let id = interner.intern(bytes);
            let object = heap.alloc(Object::StringObj(id));
            Ok(Value::object(object))
        }
        tag::CHAR => {
            let byte = cursor.read_u8().ok_or_else(|| malformed("truncated char constant"))?;
            Ok(Value::char(byte))
        }
        tag::BOOL => {
            let byte = cursor.read_u8().ok_or_else(|| malformed("truncated bool constant"))?;
            Ok(Value::bool(byte != 0))
        }
        tag::NIL => Ok(Value::Nil),
        tag::VOID => Ok(Value::Void),
        tag::FUNCTION => {
            let arity = cursor
                .read_u32_le()
                .ok_or_else(|| malformed("truncated function arity"))?;
            let has_name = cursor
                .read_u8()
                .ok_or_else(|| malformed("truncated function has_name flag"))?;
            let name = if has_name != 0 {
                let bytes = cursor
                    .read_bytes()
                    .ok_or_else(|| malformed("truncated function name"))?;
                Some(interner.intern(bytes))
            } else {
                None
            };
            let chunk = read_chunk(cursor, heap, interner)?;
            let object = heap.alloc(Object::FunctionObj(FunctionObj {
                arity,
                name,
                chunk,
            }));
            Ok(Value::object(object))
        }
        tag::CLOSURE | tag::RANGE | tag::RECORD | tag::INSTANCE | tag::BOUND_METHOD => {
            log::debug!("reserved value tag {tag} in constant pool, producing placeholder");
            let object = heap.alloc(Object::Reserved(tag));
            Ok(Value::object(object))
        }
        other => Err(malformed(format!("unknown value tag {other}"))),
    }
}
