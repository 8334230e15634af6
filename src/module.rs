//! The module contract consumed from the external parser/validator.
//!
//! The binary format never reaches this crate: compiled function bodies
//! arrive as disassembled operator sequences, global initializers as typed
//! constant expressions, and data segments as plain byte runs. Everything
//! here is assumed to have passed validation upstream.

use std::rc::Rc;

use crate::ops::Instr;
use crate::value::{Signature, ValType};
use crate::vm::Process;

/// A host callable registered in the function index space. It receives a
/// [`Process`] handle and is responsible for popping its own arguments and
/// pushing its result.
pub type HostFn = Rc<dyn Fn(&mut Process<'_>)>;

#[derive(Clone)]
pub enum FuncBody {
    /// A compiled body: declared (non-parameter) local count plus the
    /// operator sequence produced by the disassembler.
    Code { locals: u32, ops: Vec<Instr> },
    Host(HostFn),
}

#[derive(Clone)]
pub struct FuncDecl {
    pub type_index: u32,
    pub body: FuncBody,
}

/// A typed constant initializer for a global: either a literal or a
/// reference to an earlier (immutable, imported-or-prior) global.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitExpr {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Global(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalEntry {
    pub ty: ValType,
    pub mutable: bool,
    pub init: InitExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    /// Initial size in 64 KiB pages.
    pub initial: u32,
    pub data: Vec<DataSegment>,
}

#[derive(Default, Clone)]
pub struct Module {
    pub types: Vec<Signature>,
    /// The function index space, host and compiled entries mixed.
    pub functions: Vec<FuncDecl>,
    pub globals: Vec<GlobalEntry>,
    /// Linear memory entries. At most one is accepted at instantiation.
    pub memories: Vec<MemoryEntry>,
    /// The table index space: function indices used by `call_indirect`.
    pub table: Vec<u32>,
    pub start: Option<u32>,
}

impl Module {
    /// Signature of the function at `index` in the function index space.
    pub fn func_type(&self, index: usize) -> &Signature {
        &self.types[self.functions[index].type_index as usize]
    }
}
