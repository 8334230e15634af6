//! Control-flow lowering.
//!
//! Converts the structured operator stream of a function body into a flat
//! byte stream with resolved absolute branch offsets, explicit stack
//! discards, and a per-function branch-table vector, so the dispatch loop
//! never maintains a block stack at runtime. The pass simulates operand
//! stack heights as it scans, which also yields the maximum stack depth for
//! the activation.
//!
//! Bodies are trusted input (the module contract is pre-validated), so
//! structural violations are programming errors and panic.

use crate::module::Module;
use crate::ops::{self, Imm, Instr};

/// One branch-table destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub addr: u64,
    pub discard: u64,
    pub preserve_top: bool,
    pub return_flag: bool,
}

/// A `br_table` side table: one entry per label plus the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTable {
    pub targets: Vec<Target>,
    pub default: Target,
}

/// The lowering output for one function body.
pub struct Lowered {
    pub code: Vec<u8>,
    pub branch_tables: Vec<BranchTable>,
    pub max_depth: usize,
}

enum FrameKind {
    Block,
    Loop { start: usize },
    If { jmp_z_at: usize, seen_else: bool },
}

enum Patch {
    /// An 8-byte target slot in the code stream.
    Code(usize),
    /// A branch-table destination; `entry` is `None` for the default.
    Table { table: usize, entry: Option<usize> },
}

struct Frame {
    kind: FrameKind,
    has_result: bool,
    entry_height: usize,
    /// Forward references to this frame's end label.
    patches: Vec<Patch>,
}

impl Frame {
    fn new(kind: FrameKind, has_result: bool, entry_height: usize) -> Self {
        Self { kind, has_result, entry_height, patches: Vec::new() }
    }
}

enum BranchDest {
    Loop { start: usize, discard: u64 },
    /// A block/if/function label; `frame == 0` names the function itself.
    Label { frame: usize, discard: u64, preserve: bool },
}

struct Lowerer<'m> {
    module: &'m Module,
    code: Vec<u8>,
    tables: Vec<BranchTable>,
    frames: Vec<Frame>,
    height: usize,
    max: usize,
}

fn patch_u64(code: &mut [u8], at: usize, v: u64) {
    code[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

/// Lowers a function body. `returns` is the function's own result arity.
pub fn lower(body: &[Instr], module: &Module, returns: bool) -> Lowered {
    let mut lw = Lowerer {
        module,
        code: Vec::new(),
        tables: Vec::new(),
        frames: vec![Frame::new(FrameKind::Block, returns, 0)],
        height: 0,
        max: 0,
    };

    // Code after an unconditional transfer is statically unreachable until
    // the enclosing frame closes; it is dropped from the output entirely.
    let mut dead = false;
    let mut dead_depth = 0usize;

    for ins in body {
        if dead {
            match ins.op {
                ops::BLOCK | ops::LOOP | ops::IF => dead_depth += 1,
                ops::ELSE if dead_depth == 0 => {
                    lw.resume_at_else();
                    dead = false;
                }
                ops::END => {
                    if dead_depth == 0 {
                        lw.close_frame();
                        dead = false;
                    } else {
                        dead_depth -= 1;
                    }
                }
                _ => {}
            }
            continue;
        }
        match ins.op {
            ops::UNREACHABLE => {
                lw.code.push(ops::UNREACHABLE);
                dead = true;
            }
            ops::BLOCK => {
                let Imm::Block(bt) = ins.imm else { panic!("block without block type") };
                lw.frames.push(Frame::new(FrameKind::Block, bt.is_some(), lw.height));
            }
            ops::LOOP => {
                let Imm::Block(bt) = ins.imm else { panic!("loop without block type") };
                let start = lw.code.len();
                lw.frames.push(Frame::new(FrameKind::Loop { start }, bt.is_some(), lw.height));
            }
            ops::IF => {
                let Imm::Block(bt) = ins.imm else { panic!("if without block type") };
                lw.shrink(1);
                lw.code.push(ops::JMP_Z);
                let jmp_z_at = lw.code.len();
                lw.emit_u64(0);
                lw.frames.push(Frame::new(
                    FrameKind::If { jmp_z_at, seen_else: false },
                    bt.is_some(),
                    lw.height,
                ));
            }
            ops::ELSE => lw.else_arm(),
            ops::END => lw.close_frame(),
            ops::BR => {
                let Imm::Index(depth) = ins.imm else { panic!("br without label") };
                lw.emit_br(depth);
                dead = true;
            }
            ops::BR_IF => {
                let Imm::Index(depth) = ins.imm else { panic!("br_if without label") };
                lw.emit_br_if(depth);
            }
            ops::BR_TABLE => {
                let Imm::BrTable { ref targets, default } = ins.imm else {
                    panic!("br_table without table")
                };
                lw.emit_br_table(targets, default);
                dead = true;
            }
            ops::RETURN => {
                lw.emit_return();
                dead = true;
            }
            _ => lw.lower_simple(ins),
        }
    }

    assert!(lw.frames.is_empty(), "function body not terminated by end");
    Lowered { code: lw.code, branch_tables: lw.tables, max_depth: lw.max }
}

impl Lowerer<'_> {
    fn emit_u32(&mut self, v: u32) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_u64(&mut self, v: u64) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn grow(&mut self, pushes: usize) {
        self.height += pushes;
        if self.height > self.max {
            self.max = self.height;
        }
    }

    fn shrink(&mut self, pops: usize) {
        assert!(self.height >= pops, "operand stack underflow in body");
        self.height -= pops;
    }

    fn branch_dest(&self, depth: u32) -> BranchDest {
        let depth = depth as usize;
        assert!(depth < self.frames.len(), "branch depth out of range");
        let fi = self.frames.len() - 1 - depth;
        let f = &self.frames[fi];
        assert!(self.height >= f.entry_height, "operand stack below label height");
        let discard = (self.height - f.entry_height) as u64;
        match f.kind {
            FrameKind::Loop { start } => BranchDest::Loop { start, discard },
            _ => BranchDest::Label { frame: fi, discard, preserve: f.has_result },
        }
    }

    /// Emits the unwind preceding a taken unconditional branch. A preserving
    /// discard of 1 and a plain discard of 0 are both no-ops and are elided.
    fn emit_discard(&mut self, discard: u64, preserve: bool) {
        if preserve {
            if discard > 1 {
                self.code.push(ops::DISCARD_PRESERVE_TOP);
                self.emit_u64(discard);
            }
        } else if discard > 0 {
            self.code.push(ops::DISCARD);
            self.emit_u64(discard);
        }
    }

    fn emit_br(&mut self, depth: u32) {
        match self.branch_dest(depth) {
            BranchDest::Loop { start, discard } => {
                self.emit_discard(discard, false);
                self.code.push(ops::JMP);
                self.emit_u64(start as u64);
            }
            BranchDest::Label { frame: 0, discard, preserve } => {
                // The function label: branching to it is a return.
                self.emit_discard(discard, preserve);
                self.code.push(ops::RETURN);
            }
            BranchDest::Label { frame, discard, preserve } => {
                self.emit_discard(discard, preserve);
                self.code.push(ops::JMP);
                let at = self.code.len();
                self.emit_u64(0);
                self.frames[frame].patches.push(Patch::Code(at));
            }
        }
    }

    fn emit_br_if(&mut self, depth: u32) {
        // The condition is popped at runtime before the discard applies.
        self.shrink(1);
        self.code.push(ops::JMP_NZ);
        match self.branch_dest(depth) {
            BranchDest::Loop { start, discard } => {
                self.emit_u64(start as u64);
                self.code.push(0);
                self.emit_u64(discard);
            }
            BranchDest::Label { frame, discard, preserve } => {
                let at = self.code.len();
                self.emit_u64(0);
                self.frames[frame].patches.push(Patch::Code(at));
                self.code.push(preserve as u8);
                self.emit_u64(discard);
            }
        }
    }

    fn table_target(&mut self, depth: u32, table: usize, entry: Option<usize>) -> Target {
        match self.branch_dest(depth) {
            BranchDest::Loop { start, discard } => Target {
                addr: start as u64,
                discard,
                preserve_top: false,
                return_flag: false,
            },
            BranchDest::Label { frame: 0, discard, preserve } => Target {
                addr: 0,
                discard,
                preserve_top: preserve,
                return_flag: true,
            },
            BranchDest::Label { frame, discard, preserve } => {
                self.frames[frame].patches.push(Patch::Table { table, entry });
                Target { addr: 0, discard, preserve_top: preserve, return_flag: false }
            }
        }
    }

    fn emit_br_table(&mut self, targets: &[u32], default: u32) {
        // The table index operand is popped at runtime before the discard.
        self.shrink(1);
        let table = self.tables.len();
        let mut entries = Vec::with_capacity(targets.len());
        for (i, &depth) in targets.iter().enumerate() {
            let t = self.table_target(depth, table, Some(i));
            entries.push(t);
        }
        let default = self.table_target(default, table, None);
        self.tables.push(BranchTable { targets: entries, default });
        self.code.push(ops::BR_TABLE);
        self.emit_u64(table as u64);
    }

    /// Unwinds to the activation base so that on return the operand stack
    /// holds exactly the declared number of results.
    fn emit_return(&mut self) {
        let preserve = self.frames[0].has_result;
        self.emit_discard(self.height as u64, preserve);
        self.code.push(ops::RETURN);
    }

    fn else_arm(&mut self) {
        // The then-arm falls through: jump over the else-arm to the end label.
        self.code.push(ops::JMP);
        let at = self.code.len();
        self.emit_u64(0);
        let here = self.code.len() as u64;
        let f = self.frames.last_mut().expect("else outside of if");
        f.patches.push(Patch::Code(at));
        let FrameKind::If { jmp_z_at, seen_else } = &mut f.kind else {
            panic!("else outside of if")
        };
        assert!(!*seen_else, "duplicate else");
        let jmp_z_at = *jmp_z_at;
        *seen_else = true;
        let entry = f.entry_height;
        patch_u64(&mut self.code, jmp_z_at, here);
        self.height = entry;
    }

    /// Patches the then-arm's false edge for a dead `else` without emitting a
    /// fallthrough jump (the then-arm ended in an unconditional transfer).
    fn resume_at_else(&mut self) {
        let here = self.code.len() as u64;
        let f = self.frames.last_mut().expect("else outside of if");
        let FrameKind::If { jmp_z_at, seen_else } = &mut f.kind else {
            panic!("else outside of if")
        };
        assert!(!*seen_else, "duplicate else");
        let jmp_z_at = *jmp_z_at;
        *seen_else = true;
        let entry = f.entry_height;
        patch_u64(&mut self.code, jmp_z_at, here);
        self.height = entry;
    }

    fn close_frame(&mut self) {
        let f = self.frames.pop().expect("end without open frame");
        let here = self.code.len() as u64;
        // An if without an else falls through on the false edge.
        if let FrameKind::If { jmp_z_at, seen_else: false } = f.kind {
            patch_u64(&mut self.code, jmp_z_at, here);
        }
        for p in f.patches {
            match p {
                Patch::Code(at) => patch_u64(&mut self.code, at, here),
                Patch::Table { table, entry: Some(i) } => {
                    self.tables[table].targets[i].addr = here;
                }
                Patch::Table { table, entry: None } => {
                    self.tables[table].default.addr = here;
                }
            }
        }
        // Validation guarantees the height at a label matches its block type.
        self.height = f.entry_height;
        if f.has_result {
            self.grow(1);
        }
    }

    fn lower_simple(&mut self, ins: &Instr) {
        let (pops, pushes) = match ins.op {
            ops::CALL => {
                let Imm::Index(f) = ins.imm else { panic!("call without function index") };
                let sig = self.module.func_type(f as usize);
                (sig.params.len(), sig.result.is_some() as usize)
            }
            ops::CALL_INDIRECT => {
                let Imm::Index(t) = ins.imm else { panic!("call_indirect without type index") };
                let sig = &self.module.types[t as usize];
                (sig.params.len() + 1, sig.result.is_some() as usize)
            }
            op => stack_effect(op),
        };
        self.shrink(pops);
        self.grow(pushes);

        self.code.push(ins.op);
        match ins.imm {
            Imm::None => {
                if ins.op == ops::CURRENT_MEMORY || ins.op == ops::GROW_MEMORY {
                    self.code.push(0); // reserved
                }
            }
            Imm::Index(v) => {
                self.emit_u32(v);
                if ins.op == ops::CALL_INDIRECT {
                    self.code.push(0); // reserved
                }
            }
            Imm::I32(v) => self.emit_u32(v as u32),
            Imm::I64(v) => self.emit_u64(v as u64),
            Imm::F32(v) => self.emit_u32(v.to_bits()),
            Imm::F64(v) => self.emit_u64(v.to_bits()),
            Imm::Mem { offset } => self.emit_u32(offset),
            Imm::Block(_) | Imm::BrTable { .. } => {
                unreachable!("control operators are lowered separately")
            }
        }
    }
}

/// Operand stack effect (pops, pushes) of a non-control operator.
fn stack_effect(op: u8) -> (usize, usize) {
    use crate::ops::*;
    match op {
        NOP => (0, 0),
        DROP => (1, 0),
        SELECT => (3, 1),
        GET_LOCAL | GET_GLOBAL => (0, 1),
        SET_LOCAL | SET_GLOBAL => (1, 0),
        TEE_LOCAL => (1, 1),
        I32_CONST | I64_CONST | F32_CONST | F64_CONST => (0, 1),
        I32_LOAD..=I64_LOAD32_U => (1, 1),
        I32_STORE..=I64_STORE32 => (2, 0),
        CURRENT_MEMORY => (0, 1),
        GROW_MEMORY => (1, 1),
        I32_EQZ | I64_EQZ => (1, 1),
        I32_EQ..=I32_GE_U | I64_EQ..=I64_GE_U | F32_EQ..=F64_GE => (2, 1),
        I32_CLZ..=I32_POPCNT | I64_CLZ..=I64_POPCNT => (1, 1),
        I32_ADD..=I32_ROTR | I64_ADD..=I64_ROTR => (2, 1),
        F32_ABS..=F32_SQRT | F64_ABS..=F64_SQRT => (1, 1),
        F32_ADD..=F32_COPYSIGN | F64_ADD..=F64_COPYSIGN => (2, 1),
        I32_WRAP_I64..=F64_REINTERPRET_I64 => (1, 1),
        _ => panic!("opcode {:#04x} ({}) cannot appear in a function body", op, name(op)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{self, Instr};

    fn lower_body(body: Vec<Instr>, returns: bool) -> Lowered {
        lower(&body, &Module::default(), returns)
    }

    fn u64_at(code: &[u8], at: usize) -> u64 {
        u64::from_le_bytes(code[at..at + 8].try_into().unwrap())
    }

    #[test]
    fn constants_lower_to_fixed_width_immediates() {
        let out = lower_body(vec![Instr::i32(-2), Instr::op(ops::DROP), Instr::op(ops::END)], false);
        assert_eq!(out.code, vec![ops::I32_CONST, 0xFE, 0xFF, 0xFF, 0xFF, ops::DROP]);
        assert_eq!(out.max_depth, 1);
    }

    #[test]
    fn max_depth_tracks_the_highest_push() {
        let out = lower_body(
            vec![
                Instr::i32(1),
                Instr::i32(2),
                Instr::i32(3),
                Instr::op(ops::I32_ADD),
                Instr::op(ops::I32_ADD),
                Instr::op(ops::END),
            ],
            true,
        );
        assert_eq!(out.max_depth, 3);
    }

    #[test]
    fn if_else_resolves_both_edges() {
        let out = lower_body(
            vec![
                Instr::i32(1),
                Instr::block(ops::IF, None),
                Instr::op(ops::NOP),
                Instr::op(ops::ELSE),
                Instr::op(ops::NOP),
                Instr::op(ops::END),
                Instr::op(ops::END),
            ],
            false,
        );
        // const(5) jmp_z(9) nop(1) jmp(9) nop(1)
        assert_eq!(out.code.len(), 25);
        assert_eq!(out.code[5], ops::JMP_Z);
        assert_eq!(u64_at(&out.code, 6), 24); // false edge: start of else-arm
        assert_eq!(out.code[15], ops::JMP);
        assert_eq!(u64_at(&out.code, 16), 25); // then-arm jumps over the else-arm
    }

    #[test]
    fn branch_to_loop_jumps_backward_to_its_start() {
        let out = lower_body(
            vec![
                Instr::block(ops::LOOP, None),
                Instr::i32(0),
                Instr::idx(ops::BR_IF, 0),
                Instr::op(ops::END),
                Instr::op(ops::END),
            ],
            false,
        );
        // const(5) jmp_nz(1 + 8 + 1 + 8)
        assert_eq!(out.code[5], ops::JMP_NZ);
        assert_eq!(u64_at(&out.code, 6), 0); // loop starts at offset 0
        assert_eq!(out.code[14], 0); // no preserve
        assert_eq!(u64_at(&out.code, 15), 0); // nothing to discard
    }

    #[test]
    fn branch_out_of_a_block_discards_down_to_the_label() {
        let out = lower_body(
            vec![
                Instr::block(ops::BLOCK, None),
                Instr::i32(1),
                Instr::i32(2),
                Instr::idx(ops::BR, 0),
                Instr::op(ops::END),
                Instr::op(ops::END),
            ],
            false,
        );
        // const const discard(1+8) jmp(1+8)
        assert_eq!(out.code[10], ops::DISCARD);
        assert_eq!(u64_at(&out.code, 11), 2);
        assert_eq!(out.code[19], ops::JMP);
        assert_eq!(u64_at(&out.code, 20), out.code.len() as u64);
    }

    #[test]
    fn return_unwinds_to_the_activation_base() {
        let out = lower_body(
            vec![Instr::i32(1), Instr::i32(2), Instr::op(ops::RETURN), Instr::op(ops::END)],
            true,
        );
        assert_eq!(out.code[10], ops::DISCARD_PRESERVE_TOP);
        assert_eq!(u64_at(&out.code, 11), 2);
        assert_eq!(out.code[19], ops::RETURN);
    }

    #[test]
    fn code_after_an_unconditional_transfer_is_dropped() {
        let out = lower_body(
            vec![Instr::op(ops::RETURN), Instr::i32(5), Instr::op(ops::DROP), Instr::op(ops::END)],
            false,
        );
        assert_eq!(out.code, vec![ops::RETURN]);
    }

    #[test]
    fn br_table_targets_carry_unwind_metadata() {
        let out = lower_body(
            vec![
                Instr::block(ops::BLOCK, None),
                Instr::block(ops::LOOP, None),
                Instr::i32(0),
                Instr::br_table(vec![0, 1], 1),
                Instr::op(ops::END),
                Instr::op(ops::END),
                Instr::op(ops::END),
            ],
            false,
        );
        assert_eq!(out.branch_tables.len(), 1);
        let table = &out.branch_tables[0];
        assert_eq!(table.targets.len(), 2);
        // depth 0: the loop, jumping back to its start
        assert_eq!(table.targets[0].addr, 0);
        assert!(!table.targets[0].return_flag);
        // depth 1: the block, patched to the end label
        assert_eq!(table.targets[1].addr, out.code.len() as u64);
        assert_eq!(table.default.addr, out.code.len() as u64);
    }

    #[test]
    fn br_table_to_the_function_label_sets_the_return_flag() {
        let out = lower_body(
            vec![
                Instr::idx(ops::GET_LOCAL, 0),
                Instr::idx(ops::GET_LOCAL, 0),
                Instr::br_table(vec![], 0),
                Instr::op(ops::END),
            ],
            true,
        );
        let table = &out.branch_tables[0];
        assert!(table.default.return_flag);
        assert!(table.default.preserve_top);
        assert_eq!(table.default.discard, 1);
    }
}
