//! Construction of the 256-entry opcode handler table.
//!
//! Control opcodes are absent: they manipulate the program counter or
//! re-enter the dispatch loop and are executed inline there. An opcode with
//! no handler means the code stream is miscompiled or unvalidated, which is
//! a hard error rather than a trap.

use crate::error::Trap;
use crate::ops;
use crate::vm::{Handler, Vm};
use crate::{control, conv, memory, num, parametric, var};

fn illegal_op(vm: &mut Vm) -> Result<(), Trap> {
    let op = vm.ctx.code[vm.ctx.pc - 1];
    panic!("opcode {:#04x} ({}) has no handler; code stream is miscompiled", op, ops::name(op));
}

pub(crate) fn build_table() -> [Handler; 256] {
    let mut t: [Handler; 256] = [illegal_op; 256];

    t[ops::UNREACHABLE as usize] = control::unreachable;
    t[ops::NOP as usize] = control::nop;

    t[ops::DROP as usize] = parametric::drop_op;
    t[ops::SELECT as usize] = parametric::select_op;

    t[ops::GET_LOCAL as usize] = var::get_local;
    t[ops::SET_LOCAL as usize] = var::set_local;
    t[ops::TEE_LOCAL as usize] = var::tee_local;
    t[ops::GET_GLOBAL as usize] = var::get_global;
    t[ops::SET_GLOBAL as usize] = var::set_global;

    t[ops::I32_LOAD as usize] = memory::i32_load;
    t[ops::I64_LOAD as usize] = memory::i64_load;
    t[ops::F32_LOAD as usize] = memory::f32_load;
    t[ops::F64_LOAD as usize] = memory::f64_load;
    t[ops::I32_LOAD8_S as usize] = memory::i32_load8_s;
    t[ops::I32_LOAD8_U as usize] = memory::i32_load8_u;
    t[ops::I32_LOAD16_S as usize] = memory::i32_load16_s;
    t[ops::I32_LOAD16_U as usize] = memory::i32_load16_u;
    t[ops::I64_LOAD8_S as usize] = memory::i64_load8_s;
    t[ops::I64_LOAD8_U as usize] = memory::i64_load8_u;
    t[ops::I64_LOAD16_S as usize] = memory::i64_load16_s;
    t[ops::I64_LOAD16_U as usize] = memory::i64_load16_u;
    t[ops::I64_LOAD32_S as usize] = memory::i64_load32_s;
    t[ops::I64_LOAD32_U as usize] = memory::i64_load32_u;
    t[ops::I32_STORE as usize] = memory::i32_store;
    t[ops::I64_STORE as usize] = memory::i64_store;
    t[ops::F32_STORE as usize] = memory::f32_store;
    t[ops::F64_STORE as usize] = memory::f64_store;
    t[ops::I32_STORE8 as usize] = memory::i32_store8;
    t[ops::I32_STORE16 as usize] = memory::i32_store16;
    t[ops::I64_STORE8 as usize] = memory::i64_store8;
    t[ops::I64_STORE16 as usize] = memory::i64_store16;
    t[ops::I64_STORE32 as usize] = memory::i64_store32;
    t[ops::CURRENT_MEMORY as usize] = memory::current_memory;
    t[ops::GROW_MEMORY as usize] = memory::grow_memory;

    t[ops::I32_CONST as usize] = num::i32_const;
    t[ops::I64_CONST as usize] = num::i64_const;
    t[ops::F32_CONST as usize] = num::f32_const;
    t[ops::F64_CONST as usize] = num::f64_const;

    t[ops::I32_EQZ as usize] = num::i32_eqz;
    t[ops::I32_EQ as usize] = num::i32_eq;
    t[ops::I32_NE as usize] = num::i32_ne;
    t[ops::I32_LT_S as usize] = num::i32_lt_s;
    t[ops::I32_LT_U as usize] = num::i32_lt_u;
    t[ops::I32_GT_S as usize] = num::i32_gt_s;
    t[ops::I32_GT_U as usize] = num::i32_gt_u;
    t[ops::I32_LE_S as usize] = num::i32_le_s;
    t[ops::I32_LE_U as usize] = num::i32_le_u;
    t[ops::I32_GE_S as usize] = num::i32_ge_s;
    t[ops::I32_GE_U as usize] = num::i32_ge_u;

    t[ops::I64_EQZ as usize] = num::i64_eqz;
    t[ops::I64_EQ as usize] = num::i64_eq;
    t[ops::I64_NE as usize] = num::i64_ne;
    t[ops::I64_LT_S as usize] = num::i64_lt_s;
    t[ops::I64_LT_U as usize] = num::i64_lt_u;
    t[ops::I64_GT_S as usize] = num::i64_gt_s;
    t[ops::I64_GT_U as usize] = num::i64_gt_u;
    t[ops::I64_LE_S as usize] = num::i64_le_s;
    t[ops::I64_LE_U as usize] = num::i64_le_u;
    t[ops::I64_GE_S as usize] = num::i64_ge_s;
    t[ops::I64_GE_U as usize] = num::i64_ge_u;

    t[ops::F32_EQ as usize] = num::f32_eq;
    t[ops::F32_NE as usize] = num::f32_ne;
    t[ops::F32_LT as usize] = num::f32_lt;
    t[ops::F32_GT as usize] = num::f32_gt;
    t[ops::F32_LE as usize] = num::f32_le;
    t[ops::F32_GE as usize] = num::f32_ge;

    t[ops::F64_EQ as usize] = num::f64_eq;
    t[ops::F64_NE as usize] = num::f64_ne;
    t[ops::F64_LT as usize] = num::f64_lt;
    t[ops::F64_GT as usize] = num::f64_gt;
    t[ops::F64_LE as usize] = num::f64_le;
    t[ops::F64_GE as usize] = num::f64_ge;

    t[ops::I32_CLZ as usize] = num::i32_clz;
    t[ops::I32_CTZ as usize] = num::i32_ctz;
    t[ops::I32_POPCNT as usize] = num::i32_popcnt;
    t[ops::I32_ADD as usize] = num::i32_add;
    t[ops::I32_SUB as usize] = num::i32_sub;
    t[ops::I32_MUL as usize] = num::i32_mul;
    t[ops::I32_DIV_S as usize] = num::i32_div_s;
    t[ops::I32_DIV_U as usize] = num::i32_div_u;
    t[ops::I32_REM_S as usize] = num::i32_rem_s;
    t[ops::I32_REM_U as usize] = num::i32_rem_u;
    t[ops::I32_AND as usize] = num::i32_and;
    t[ops::I32_OR as usize] = num::i32_or;
    t[ops::I32_XOR as usize] = num::i32_xor;
    t[ops::I32_SHL as usize] = num::i32_shl;
    t[ops::I32_SHR_S as usize] = num::i32_shr_s;
    t[ops::I32_SHR_U as usize] = num::i32_shr_u;
    t[ops::I32_ROTL as usize] = num::i32_rotl;
    t[ops::I32_ROTR as usize] = num::i32_rotr;

    t[ops::I64_CLZ as usize] = num::i64_clz;
    t[ops::I64_CTZ as usize] = num::i64_ctz;
    t[ops::I64_POPCNT as usize] = num::i64_popcnt;
    t[ops::I64_ADD as usize] = num::i64_add;
    t[ops::I64_SUB as usize] = num::i64_sub;
    t[ops::I64_MUL as usize] = num::i64_mul;
    t[ops::I64_DIV_S as usize] = num::i64_div_s;
    t[ops::I64_DIV_U as usize] = num::i64_div_u;
    t[ops::I64_REM_S as usize] = num::i64_rem_s;
    t[ops::I64_REM_U as usize] = num::i64_rem_u;
    t[ops::I64_AND as usize] = num::i64_and;
    t[ops::I64_OR as usize] = num::i64_or;
    t[ops::I64_XOR as usize] = num::i64_xor;
    t[ops::I64_SHL as usize] = num::i64_shl;
    t[ops::I64_SHR_S as usize] = num::i64_shr_s;
    t[ops::I64_SHR_U as usize] = num::i64_shr_u;
    t[ops::I64_ROTL as usize] = num::i64_rotl;
    t[ops::I64_ROTR as usize] = num::i64_rotr;

    t[ops::F32_ABS as usize] = num::f32_abs;
    t[ops::F32_NEG as usize] = num::f32_neg;
    t[ops::F32_CEIL as usize] = num::f32_ceil;
    t[ops::F32_FLOOR as usize] = num::f32_floor;
    t[ops::F32_TRUNC as usize] = num::f32_trunc;
    t[ops::F32_NEAREST as usize] = num::f32_nearest;
    t[ops::F32_SQRT as usize] = num::f32_sqrt;
    t[ops::F32_ADD as usize] = num::f32_add;
    t[ops::F32_SUB as usize] = num::f32_sub;
    t[ops::F32_MUL as usize] = num::f32_mul;
    t[ops::F32_DIV as usize] = num::f32_div;
    t[ops::F32_MIN as usize] = num::f32_min;
    t[ops::F32_MAX as usize] = num::f32_max;
    t[ops::F32_COPYSIGN as usize] = num::f32_copysign;

    t[ops::F64_ABS as usize] = num::f64_abs;
    t[ops::F64_NEG as usize] = num::f64_neg;
    t[ops::F64_CEIL as usize] = num::f64_ceil;
    t[ops::F64_FLOOR as usize] = num::f64_floor;
    t[ops::F64_TRUNC as usize] = num::f64_trunc;
    t[ops::F64_NEAREST as usize] = num::f64_nearest;
    t[ops::F64_SQRT as usize] = num::f64_sqrt;
    t[ops::F64_ADD as usize] = num::f64_add;
    t[ops::F64_SUB as usize] = num::f64_sub;
    t[ops::F64_MUL as usize] = num::f64_mul;
    t[ops::F64_DIV as usize] = num::f64_div;
    t[ops::F64_MIN as usize] = num::f64_min;
    t[ops::F64_MAX as usize] = num::f64_max;
    t[ops::F64_COPYSIGN as usize] = num::f64_copysign;

    t[ops::I32_WRAP_I64 as usize] = conv::i32_wrap_i64;
    t[ops::I32_TRUNC_S_F32 as usize] = conv::i32_trunc_s_f32;
    t[ops::I32_TRUNC_U_F32 as usize] = conv::i32_trunc_u_f32;
    t[ops::I32_TRUNC_S_F64 as usize] = conv::i32_trunc_s_f64;
    t[ops::I32_TRUNC_U_F64 as usize] = conv::i32_trunc_u_f64;
    t[ops::I64_EXTEND_S_I32 as usize] = conv::i64_extend_s_i32;
    t[ops::I64_EXTEND_U_I32 as usize] = conv::i64_extend_u_i32;
    t[ops::I64_TRUNC_S_F32 as usize] = conv::i64_trunc_s_f32;
    t[ops::I64_TRUNC_U_F32 as usize] = conv::i64_trunc_u_f32;
    t[ops::I64_TRUNC_S_F64 as usize] = conv::i64_trunc_s_f64;
    t[ops::I64_TRUNC_U_F64 as usize] = conv::i64_trunc_u_f64;
    t[ops::F32_CONVERT_S_I32 as usize] = conv::f32_convert_s_i32;
    t[ops::F32_CONVERT_U_I32 as usize] = conv::f32_convert_u_i32;
    t[ops::F32_CONVERT_S_I64 as usize] = conv::f32_convert_s_i64;
    t[ops::F32_CONVERT_U_I64 as usize] = conv::f32_convert_u_i64;
    t[ops::F32_DEMOTE_F64 as usize] = conv::f32_demote_f64;
    t[ops::F64_CONVERT_S_I32 as usize] = conv::f64_convert_s_i32;
    t[ops::F64_CONVERT_U_I32 as usize] = conv::f64_convert_u_i32;
    t[ops::F64_CONVERT_S_I64 as usize] = conv::f64_convert_s_i64;
    t[ops::F64_CONVERT_U_I64 as usize] = conv::f64_convert_u_i64;
    t[ops::F64_PROMOTE_F32 as usize] = conv::f64_promote_f32;
    t[ops::I32_REINTERPRET_F32 as usize] = conv::reinterpret;
    t[ops::I64_REINTERPRET_F64 as usize] = conv::reinterpret;
    t[ops::F32_REINTERPRET_I32 as usize] = conv::reinterpret;
    t[ops::F64_REINTERPRET_I64 as usize] = conv::reinterpret;

    t
}
