#![deny(unsafe_code)]

//! An interpreter for a stack-based virtual machine executing typed bytecode
//! modeled on the WebAssembly 1.0 MVP core instruction set. Structured
//! control flow is lowered ahead of execution into a flat stream with
//! resolved jumps, explicit discards and branch tables; the dispatch loop
//! then runs with constant-time decode and no runtime block stack.

pub mod compile;
pub mod error;
pub mod memory;
pub mod module;
pub mod ops;
pub mod telemetry;
pub mod value;
pub mod vm;

mod control;
mod conv;
mod dispatch;
mod num;
mod parametric;
mod var;

pub use error::{Error, Trap};
pub use memory::Memory;
pub use module::{DataSegment, FuncBody, FuncDecl, GlobalEntry, HostFn, InitExpr, MemoryEntry, Module};
pub use telemetry::{JsonLinesSink, OpRecord, OpSink};
pub use value::{RuntimeValue, Signature, ValType, Value};
pub use vm::{Process, Vm, VmOptions};
