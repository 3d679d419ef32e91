// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Heap object model and the arena that owns it.
//!
//! The reference runtime threads every heap object through one intrusive
//! linked list rooted at the VM. `minvm` instead models objects as handles
//! into an arena (`Heap`) — a `Vec<Object>`: a cyclic graph of closures,
//! functions, and the chunks they embed is awkward to express as owning
//! pointers in safe Rust, but trivial as indices into one arena. Freeing
//! the arena (a plain `Drop`) replaces the reference's hand-written,
//! kind-aware destructor.

#[cfg(test)]
mod object_test;

use crate::chunk::Chunk;
use crate::intern::StringId;
use crate::value::Value;
use std::rc::Rc;

/// A non-owning handle into a [`Heap`] arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Wrap a raw arena index.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw arena index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State of a captured local: open while it still lives on the operand
/// stack (read-through), closed once the owning frame has returned.
///
/// A tagged variant rather than a union-plus-boolean: closing an upvalue
/// is a state transition, not a flag flip next to a still-valid union
/// field.
#[derive(Debug, Clone, Copy)]
pub enum UpvalueState {
    /// Still live in an active frame's local slots.
    Open {
        /// Index of the owning frame in the VM's frame stack.
        frame_id: usize,
        /// Local-slot index within that frame.
        slot: usize,
    },
    /// The frame that owned this local has returned; the value is now
    /// owned by the upvalue itself.
    Closed(Value),
}

/// A compiled function: owned code chunk, arity, optional name.
#[derive(Debug)]
pub struct FunctionObj {
    /// Declared parameter count.
    pub arity: u32,
    /// Optional function name (for diagnostics); `None` for anonymous.
    pub name: Option<StringId>,
    /// The function's own code chunk, sharable so closures can be cloned
    /// cheaply without duplicating the underlying bytecode.
    pub chunk: Rc<Chunk>,
}

/// A runtime closure: a function plus its captured upvalues.
#[derive(Debug)]
pub struct ClosureObj {
    /// The function this closure wraps.
    pub function: ObjectId,
    /// Captured upvalue handles, one per upvalue descriptor in the
    /// `PUSH_CLOSURE` instruction that created this closure.
    pub upvalues: Vec<ObjectId>,
}

/// A native function callable from bytecode. No owned resources; the
/// function pointer is resolved by the embedding host.
#[derive(Clone, Copy)]
pub struct NativeFnObj {
    /// Arity expected by the native function.
    pub arity: u32,
    /// The function implementation.
    pub func: fn(&[Value]) -> Value,
}

impl std::fmt::Debug for NativeFnObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFnObj")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// A reserved range object (start/end/step, inclusive flag).
#[derive(Debug, Clone, Copy)]
pub struct RangeObj {
    /// Inclusive lower bound.
    pub start: i32,
    /// Upper bound (inclusive or exclusive depending on `inclusive`).
    pub end: i32,
    /// Step size.
    pub step: i32,
    /// Whether `end` is included in the range.
    pub inclusive: bool,
}

/// A reserved record (struct-like type) definition.
#[derive(Debug)]
pub struct RecordObj {
    /// Record type name.
    pub name: StringId,
    /// Declared field names, in declaration order.
    pub fields: Vec<StringId>,
    /// Method closures attached to the record type.
    pub methods: Vec<ObjectId>,
}

/// A reserved instance of a [`RecordObj`].
#[derive(Debug)]
pub struct InstanceObj {
    /// The record type this instance belongs to.
    pub record: ObjectId,
    /// Field values, parallel to the record's field name list.
    pub fields: Vec<Value>,
}

/// A reserved bound method: a receiver value paired with a closure.
#[derive(Debug)]
pub struct BoundMethodObj {
    /// The receiver the method is bound to.
    pub receiver: Value,
    /// The closure implementing the method.
    pub method: ObjectId,
}

/// One heap-allocated object.
///
/// `StringObj` does not own its bytes — the [`crate::intern::StringInterner`]
/// does — it only references an interned entry.
#[derive(Debug)]
pub enum Object {
    /// A reference to an interned string.
    StringObj(StringId),
    /// A compiled function.
    FunctionObj(FunctionObj),
    /// A closure over a function.
    ClosureObj(ClosureObj),
    /// A native function.
    NativeFnObj(NativeFnObj),
    /// A captured local (open or closed).
    UpvalueObj(UpvalueState),
    /// A reserved range value.
    RangeObj(RangeObj),
    /// A reserved record type.
    RecordObj(RecordObj),
    /// A reserved record instance.
    InstanceObj(InstanceObj),
    /// A reserved bound method.
    BoundMethodObj(BoundMethodObj),
    /// An empty placeholder for a reserved constant-pool tag
    /// (`Closure`/`Range`/`Record`/`Instance`/`BoundMethod`) that carries
    /// no payload in this core's wire format. Structurally valid, never
    /// produced by `PUSH_CLOSURE` (which builds a real `ClosureObj` at
    /// runtime instead) and never read by any instruction here.
    Reserved(u8),
}

impl Object {
    /// A short kind name, used in error messages and debug output.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::StringObj(_) => "string",
            Self::FunctionObj(_) => "function",
            Self::ClosureObj(_) => "closure",
            Self::NativeFnObj(_) => "native-function",
            Self::UpvalueObj(_) => "upvalue",
            Self::RangeObj(_) => "range",
            Self::RecordObj(_) => "record",
            Self::InstanceObj(_) => "instance",
            Self::BoundMethodObj(_) => "bound-method",
            Self::Reserved(_) => "reserved",
        }
    }
}

/// The VM's heap: an append-only arena of [`Object`]s addressed by
/// [`ObjectId`].
///
/// Every object allocated during a run lives here exactly once; dropping
/// the `Heap` frees every object and any owned sub-resource (chunks,
/// upvalue arrays, field arrays) through ordinary Rust destructors.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    /// Create an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Allocate an object, returning its handle.
    pub fn alloc(&mut self, object: Object) -> ObjectId {
        let id = ObjectId::new(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    /// Borrow an object by handle.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> &Object {
        &self.objects[id.index()]
    }

    /// Mutably borrow an object by handle.
    #[must_use]
    pub fn get_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.index()]
    }

    /// Number of objects currently allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the heap has no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
