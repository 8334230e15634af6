//! VM lifecycle and the dispatch loop.
//!
//! A [`Vm`] is instantiated from a pre-validated [`Module`]: memory, globals
//! and the function table are allocated, every compiled body is lowered by
//! [`crate::compile`], and an optional start function runs. Entry calls via
//! [`Vm::exec_code`] evaluate the lowered stream in a tight decode-and-execute
//! loop; control opcodes run inline because they own the program counter,
//! everything else dispatches through a 256-entry handler table.

use std::mem;
use std::rc::Rc;

use crate::compile::{self, BranchTable};
use crate::dispatch;
use crate::error::{Error, Trap};
use crate::memory::Memory;
use crate::module::{FuncBody, HostFn, InitExpr, Module};
use crate::ops;
use crate::telemetry::{OpRecord, OpSink};
use crate::value::{RuntimeValue, Signature, ValType, Value};

pub(crate) type Handler = fn(&mut Vm) -> Result<(), Trap>;

/// The execution state of a single activation.
pub(crate) struct Context {
    pub stack: Vec<Value>,
    pub locals: Vec<Value>,
    pub code: Rc<[u8]>,
    pub pc: usize,
    pub cur_func: usize,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            stack: Vec::new(),
            locals: Vec::new(),
            code: Rc::from(Vec::new()),
            pc: 0,
            cur_func: 0,
        }
    }
}

pub(crate) struct CompiledFunction {
    pub code: Rc<[u8]>,
    pub branch_tables: Vec<BranchTable>,
    pub max_depth: usize,
    pub total_locals: usize,
    pub args: usize,
    pub returns: bool,
}

pub(crate) enum Function {
    Compiled(CompiledFunction),
    Host(HostFn),
}

/// Instantiation options. The default runs without telemetry.
#[derive(Default)]
pub struct VmOptions {
    /// Destination for per-operation records; `None` disables telemetry.
    pub sink: Option<Box<dyn OpSink>>,
    /// Identifies this execution run in emitted records.
    pub run_id: u32,
}

pub struct Vm {
    pub(crate) ctx: Context,
    module: Module,
    pub(crate) globals: Vec<Value>,
    pub(crate) memory: Memory,
    funcs: Vec<Function>,
    table: [Handler; 256],
    abort: bool,
    sink: Option<Box<dyn OpSink>>,
    run_id: u32,
    op_num: u64,
}

fn eval_init(init: &InitExpr, globals: &[Value]) -> Value {
    match *init {
        InitExpr::I32(v) => Value::from_i32(v),
        InitExpr::I64(v) => Value::from_i64(v),
        InitExpr::F32(v) => Value::from_f32(v),
        InitExpr::F64(v) => Value::from_f64(v),
        InitExpr::Global(i) => globals[i as usize],
    }
}

fn eval_globals(module: &Module) -> Vec<Value> {
    let mut globals = Vec::with_capacity(module.globals.len());
    for g in &module.globals {
        let v = eval_init(&g.init, &globals);
        globals.push(v);
    }
    globals
}

impl Vm {
    pub fn new(module: Module) -> Result<Self, Error> {
        Self::with_options(module, VmOptions::default())
    }

    pub fn with_options(module: Module, options: VmOptions) -> Result<Self, Error> {
        if module.memories.len() > 1 {
            return Err(Error::MultipleLinearMemories);
        }

        let mut memory = match module.memories.first() {
            Some(entry) => Memory::new(entry.initial),
            None => Memory::new(0),
        };
        if let Some(entry) = module.memories.first() {
            for seg in &entry.data {
                memory.write_bytes(seg.offset, &seg.bytes)?;
            }
        }

        let mut funcs = Vec::with_capacity(module.functions.len());
        for decl in &module.functions {
            let sig = &module.types[decl.type_index as usize];
            match &decl.body {
                FuncBody::Host(f) => funcs.push(Function::Host(Rc::clone(f))),
                FuncBody::Code { locals, ops } => {
                    let lowered = compile::lower(ops, &module, sig.result.is_some());
                    funcs.push(Function::Compiled(CompiledFunction {
                        code: Rc::from(lowered.code),
                        branch_tables: lowered.branch_tables,
                        max_depth: lowered.max_depth,
                        total_locals: sig.params.len() + *locals as usize,
                        args: sig.params.len(),
                        returns: sig.result.is_some(),
                    }));
                }
            }
        }

        let globals = eval_globals(&module);
        let start = module.start;
        let mut vm = Self {
            ctx: Context::default(),
            module,
            globals,
            memory,
            funcs,
            table: dispatch::build_table(),
            abort: false,
            sink: options.sink,
            run_id: options.run_id,
            op_num: 0,
        };

        if let Some(start) = start {
            vm.exec_code(start as usize, &[])?;
        }
        Ok(vm)
    }

    /// Calls the function at `fn_index` in the function index space with the
    /// given positional arguments, returning its typed result, if any.
    pub fn exec_code(&mut self, fn_index: usize, args: &[Value]) -> Result<Option<RuntimeValue>, Error> {
        if fn_index >= self.funcs.len() {
            return Err(Error::InvalidFunctionIndex(fn_index));
        }
        let sig: Signature = self.module.func_type(fn_index).clone();
        if sig.params.len() != args.len() {
            return Err(Error::InvalidArgumentCount);
        }
        let Function::Compiled(f) = &self.funcs[fn_index] else {
            return Err(Error::InvalidFunctionIndex(fn_index));
        };

        let depth = f.max_depth + 1;
        let code = Rc::clone(&f.code);
        let total_locals = f.total_locals;

        // Reuse the previous entry call's stack buffer when its capacity
        // suffices.
        let mut stack = mem::take(&mut self.ctx.stack);
        if stack.capacity() < depth {
            stack = Vec::with_capacity(depth);
        } else {
            stack.clear();
        }
        let mut locals = vec![Value::default(); total_locals];
        locals[..args.len()].copy_from_slice(args);
        self.ctx = Context { stack, locals, code, pc: 0, cur_func: fn_index };

        let run = self.exec_loop();
        if let Some(sink) = self.sink.as_mut() {
            sink.commit();
        }
        run?;

        let Some(result_ty) = sig.result else { return Ok(None) };
        if self.abort {
            // Terminated by a host function: exit cleanly, no value.
            return Ok(None);
        }
        let word = *self.ctx.stack.last().expect("no return value on operand stack");
        Ok(Some(match result_ty {
            ValType::I32 => RuntimeValue::I32(word.as_u32()),
            ValType::I64 => RuntimeValue::I64(word.as_u64()),
            ValType::F32 => RuntimeValue::F32(word.as_f32()),
            ValType::F64 => RuntimeValue::F64(word.as_f64()),
        }))
    }

    /// Readies the VM for another run: globals are re-initialized and the
    /// abort flag cleared.
    pub fn restart(&mut self) {
        self.globals = eval_globals(&self.module);
        self.ctx.locals = Vec::new();
        self.abort = false;
    }

    /// Raises the abort flag, preventing further use, and commits any
    /// pending telemetry.
    pub fn close(&mut self) {
        self.abort = true;
        if let Some(sink) = self.sink.as_mut() {
            sink.commit();
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    fn exec_loop(&mut self) -> Result<(), Trap> {
        while self.ctx.pc < self.ctx.code.len() && !self.abort {
            let op = self.ctx.code[self.ctx.pc];
            self.ctx.pc += 1;
            if self.sink.is_some() {
                self.emit_op(op);
            }
            match op {
                ops::RETURN => break,
                ops::JMP => {
                    self.ctx.pc = self.fetch_u64() as usize;
                }
                ops::JMP_Z => {
                    let target = self.fetch_u64() as usize;
                    if self.pop_u32() == 0 {
                        self.ctx.pc = target;
                    }
                }
                ops::JMP_NZ => {
                    let target = self.fetch_u64() as usize;
                    let preserve_top = self.fetch_bool();
                    let discard = self.fetch_u64() as usize;
                    if self.pop_u32() != 0 {
                        self.unwind(discard, preserve_top);
                        self.ctx.pc = target;
                    }
                }
                ops::BR_TABLE => {
                    let index = self.fetch_u64() as usize;
                    let label = self.pop_i32();
                    let target = {
                        let Function::Compiled(f) = &self.funcs[self.ctx.cur_func] else {
                            unreachable!("current function is not compiled")
                        };
                        let table = &f.branch_tables[index];
                        if label >= 0 && (label as usize) < table.targets.len() {
                            table.targets[label as usize]
                        } else {
                            table.default
                        }
                    };
                    self.unwind(target.discard as usize, target.preserve_top);
                    if target.return_flag {
                        break;
                    }
                    self.ctx.pc = target.addr as usize;
                }
                ops::DISCARD => {
                    let n = self.fetch_u64() as usize;
                    self.unwind(n, false);
                }
                ops::DISCARD_PRESERVE_TOP => {
                    let n = self.fetch_u64() as usize;
                    self.unwind(n, true);
                }
                ops::CALL => {
                    let index = self.fetch_u32() as usize;
                    self.invoke(index)?;
                }
                ops::CALL_INDIRECT => self.call_indirect()?,
                _ => {
                    let handler = self.table[op as usize];
                    handler(self)?;
                }
            }
        }
        Ok(())
    }

    /// Drops `discard` slots from the stack top, first saving and afterwards
    /// restoring the topmost value when `preserve_top` is set.
    #[inline]
    fn unwind(&mut self, discard: usize, preserve_top: bool) {
        let stack = &mut self.ctx.stack;
        if preserve_top {
            let top = *stack.last().expect("operand stack underflow");
            stack.truncate(stack.len() - discard);
            stack.push(top);
        } else {
            stack.truncate(stack.len() - discard);
        }
    }

    /// Calls the function at `index`: host callables run against a fresh
    /// [`Process`] handle; compiled callees get a fresh activation and
    /// re-enter the dispatch loop, transferring their return value (if any)
    /// back onto the caller's stack.
    fn invoke(&mut self, index: usize) -> Result<(), Trap> {
        let host = match &self.funcs[index] {
            Function::Host(f) => Some(Rc::clone(f)),
            Function::Compiled(_) => None,
        };
        if let Some(host) = host {
            let mut proc = Process { vm: self };
            host(&mut proc);
            return Ok(());
        }

        let Function::Compiled(f) = &self.funcs[index] else { unreachable!() };
        let code = Rc::clone(&f.code);
        let (max_depth, total_locals, args, returns) =
            (f.max_depth, f.total_locals, f.args, f.returns);

        let mut locals = vec![Value::default(); total_locals];
        for i in (0..args).rev() {
            locals[i] = self.pop();
        }
        let saved = mem::replace(
            &mut self.ctx,
            Context {
                stack: Vec::with_capacity(max_depth + 1),
                locals,
                code,
                pc: 0,
                cur_func: index,
            },
        );
        let run = self.exec_loop();
        let ret = match run {
            Ok(()) if returns => self.ctx.stack.last().copied(),
            _ => None,
        };
        self.ctx = saved;
        run?;
        if let Some(v) = ret {
            self.push(v);
        }
        Ok(())
    }

    fn call_indirect(&mut self) -> Result<(), Trap> {
        let type_index = self.fetch_u32() as usize;
        let _ = self.fetch_u8(); // reserved
        let table_index = self.pop_u32() as usize;
        let elem = *self
            .module
            .table
            .get(table_index)
            .ok_or(Trap::UndefinedElementIndex)? as usize;
        let expect = &self.module.types[type_index];
        let actual = self.module.func_type(elem);
        if expect.params != actual.params || expect.result != actual.result {
            return Err(Trap::SignatureMismatch);
        }
        self.invoke(elem)
    }

    fn emit_op(&mut self, op: u8) {
        let mut fields = vec![("stack_depth", self.ctx.stack.len() as u64)];
        if let Some(top) = self.ctx.stack.last() {
            fields.push(("stack_top", top.as_u64()));
        }
        let rec = OpRecord {
            op_num: self.op_num,
            run_id: self.run_id,
            pc: (self.ctx.pc - 1) as u64,
            op_code: op,
            op_name: ops::name(op),
            fields,
        };
        self.op_num += 1;
        if let Some(sink) = self.sink.as_mut() {
            sink.record(&rec);
        }
    }

    // ---------------- Decoder helpers ----------------
    //
    // Immediates in the lowered stream are fixed-width little-endian.

    #[inline]
    pub(crate) fn fetch_u8(&mut self) -> u8 {
        let b = self.ctx.code[self.ctx.pc];
        self.ctx.pc += 1;
        b
    }

    #[inline]
    pub(crate) fn fetch_bool(&mut self) -> bool {
        self.fetch_u8() != 0
    }

    #[inline]
    pub(crate) fn fetch_u32(&mut self) -> u32 {
        let pc = self.ctx.pc;
        let v = u32::from_le_bytes(self.ctx.code[pc..pc + 4].try_into().unwrap());
        self.ctx.pc = pc + 4;
        v
    }

    #[inline]
    pub(crate) fn fetch_u64(&mut self) -> u64 {
        let pc = self.ctx.pc;
        let v = u64::from_le_bytes(self.ctx.code[pc..pc + 8].try_into().unwrap());
        self.ctx.pc = pc + 8;
        v
    }

    #[inline]
    pub(crate) fn fetch_f32(&mut self) -> f32 {
        f32::from_bits(self.fetch_u32())
    }

    #[inline]
    pub(crate) fn fetch_f64(&mut self) -> f64 {
        f64::from_bits(self.fetch_u64())
    }

    /// Effective address of a memory access: the 4-byte static offset
    /// immediate plus the popped 32-bit base, wrapping.
    #[inline]
    pub(crate) fn mem_addr(&mut self) -> u32 {
        let offset = self.fetch_u32();
        offset.wrapping_add(self.pop_u32())
    }

    // ---------------- Stack helpers ----------------

    #[inline]
    pub(crate) fn push(&mut self, v: Value) {
        debug_assert!(
            self.ctx.stack.len() < self.ctx.stack.capacity(),
            "operand stack exceeding max depth"
        );
        self.ctx.stack.push(v);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Value {
        self.ctx.stack.pop().expect("operand stack underflow")
    }

    #[inline]
    pub(crate) fn push_u32(&mut self, v: u32) {
        self.push(Value::from_u32(v));
    }

    #[inline]
    pub(crate) fn push_i32(&mut self, v: i32) {
        self.push(Value::from_i32(v));
    }

    #[inline]
    pub(crate) fn push_u64(&mut self, v: u64) {
        self.push(Value::from_u64(v));
    }

    #[inline]
    pub(crate) fn push_i64(&mut self, v: i64) {
        self.push(Value::from_i64(v));
    }

    #[inline]
    pub(crate) fn push_f32(&mut self, v: f32) {
        self.push(Value::from_f32(v));
    }

    #[inline]
    pub(crate) fn push_f64(&mut self, v: f64) {
        self.push(Value::from_f64(v));
    }

    #[inline]
    pub(crate) fn push_bool(&mut self, v: bool) {
        self.push_u32(v as u32);
    }

    #[inline]
    pub(crate) fn pop_u32(&mut self) -> u32 {
        self.pop().as_u32()
    }

    #[inline]
    pub(crate) fn pop_i32(&mut self) -> i32 {
        self.pop().as_i32()
    }

    #[inline]
    pub(crate) fn pop_u64(&mut self) -> u64 {
        self.pop().as_u64()
    }

    #[inline]
    pub(crate) fn pop_i64(&mut self) -> i64 {
        self.pop().as_i64()
    }

    #[inline]
    pub(crate) fn pop_f32(&mut self) -> f32 {
        self.pop().as_f32()
    }

    #[inline]
    pub(crate) fn pop_f64(&mut self) -> f64 {
        self.pop().as_f64()
    }
}

/// The handle a host function receives: linear memory access with
/// short-read/short-write semantics, operand stack traffic for its own
/// arguments and result, and early termination.
pub struct Process<'a> {
    vm: &'a mut Vm,
}

impl Process<'_> {
    /// Copies memory at `off` into `dst`; returns the bytes copied, which is
    /// short when the range runs past the end of memory.
    pub fn read_at(&self, dst: &mut [u8], off: usize) -> usize {
        self.vm.memory.read_at(dst, off)
    }

    /// Copies `src` into memory at `off`; returns the bytes copied, which is
    /// short when the range runs past the end of memory.
    pub fn write_at(&mut self, src: &[u8], off: usize) -> usize {
        self.vm.memory.write_at(src, off)
    }

    /// Raises the abort flag. The dispatch loop observes it at the top of
    /// each iteration and exits cleanly after the current handler completes.
    pub fn terminate(&mut self) {
        self.vm.abort = true;
    }

    pub fn push(&mut self, v: Value) {
        self.vm.ctx.stack.push(v);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.vm.ctx.stack.pop()
    }
}
