//! Constant and numeric operator handlers.
//!
//! Binary operators pop the right-hand operand first. Handlers touch only
//! the value stack (and the immediate fetch for constants); the program
//! counter is owned by the dispatch loop.

use crate::error::Trap;
use crate::vm::Vm;

// ---------------- Constants ----------------

pub(crate) fn i32_const(vm: &mut Vm) -> Result<(), Trap> {
    let v = vm.fetch_u32();
    vm.push_u32(v);
    Ok(())
}

pub(crate) fn i64_const(vm: &mut Vm) -> Result<(), Trap> {
    let v = vm.fetch_u64();
    vm.push_u64(v);
    Ok(())
}

pub(crate) fn f32_const(vm: &mut Vm) -> Result<(), Trap> {
    let v = vm.fetch_f32();
    vm.push_f32(v);
    Ok(())
}

pub(crate) fn f64_const(vm: &mut Vm) -> Result<(), Trap> {
    let v = vm.fetch_f64();
    vm.push_f64(v);
    Ok(())
}

// ---------------- Operator families ----------------

macro_rules! binop {
    ($name:ident, $pop:ident, $push:ident, $method:ident) => {
        pub(crate) fn $name(vm: &mut Vm) -> Result<(), Trap> {
            let v2 = vm.$pop();
            let v1 = vm.$pop();
            vm.$push(v1.$method(v2));
            Ok(())
        }
    };
}

macro_rules! binop_expr {
    ($name:ident, $pop:ident, $push:ident, |$v1:ident, $v2:ident| $body:expr) => {
        pub(crate) fn $name(vm: &mut Vm) -> Result<(), Trap> {
            let $v2 = vm.$pop();
            let $v1 = vm.$pop();
            vm.$push($body);
            Ok(())
        }
    };
}

macro_rules! unop_expr {
    ($name:ident, $pop:ident, $push:ident, |$v:ident| $body:expr) => {
        pub(crate) fn $name(vm: &mut Vm) -> Result<(), Trap> {
            let $v = vm.$pop();
            vm.$push($body);
            Ok(())
        }
    };
}

macro_rules! cmp_op {
    ($name:ident, $pop:ident, $op:tt) => {
        pub(crate) fn $name(vm: &mut Vm) -> Result<(), Trap> {
            let v2 = vm.$pop();
            let v1 = vm.$pop();
            vm.push_bool(v1 $op v2);
            Ok(())
        }
    };
}

macro_rules! div_rem_op {
    ($name:ident, $pop:ident, $push:ident, unsigned $method:ident) => {
        pub(crate) fn $name(vm: &mut Vm) -> Result<(), Trap> {
            let v2 = vm.$pop();
            let v1 = vm.$pop();
            if v2 == 0 {
                return Err(Trap::DivideByZero);
            }
            vm.$push(v1.$method(v2));
            Ok(())
        }
    };
    // Signed remainder: INT_MIN % -1 is 0, not a trap.
    ($name:ident, $pop:ident, $push:ident, signed_rem) => {
        pub(crate) fn $name(vm: &mut Vm) -> Result<(), Trap> {
            let v2 = vm.$pop();
            let v1 = vm.$pop();
            if v2 == 0 {
                return Err(Trap::DivideByZero);
            }
            vm.$push(v1.wrapping_rem(v2));
            Ok(())
        }
    };
    // Signed division: INT_MIN / -1 overflows the result type.
    ($name:ident, $pop:ident, $push:ident, signed_div) => {
        pub(crate) fn $name(vm: &mut Vm) -> Result<(), Trap> {
            let v2 = vm.$pop();
            let v1 = vm.$pop();
            if v2 == 0 {
                return Err(Trap::DivideByZero);
            }
            let (val, overflow) = v1.overflowing_div(v2);
            if overflow {
                return Err(Trap::IntegerOverflow);
            }
            vm.$push(val);
            Ok(())
        }
    };
}

// ---------------- i32 ----------------

unop_expr!(i32_clz, pop_u32, push_u32, |v| v.leading_zeros());
unop_expr!(i32_ctz, pop_u32, push_u32, |v| v.trailing_zeros());
unop_expr!(i32_popcnt, pop_u32, push_u32, |v| v.count_ones());

binop!(i32_add, pop_u32, push_u32, wrapping_add);
binop!(i32_sub, pop_u32, push_u32, wrapping_sub);
binop!(i32_mul, pop_u32, push_u32, wrapping_mul);
div_rem_op!(i32_div_s, pop_i32, push_i32, signed_div);
div_rem_op!(i32_div_u, pop_u32, push_u32, unsigned wrapping_div);
div_rem_op!(i32_rem_s, pop_i32, push_i32, signed_rem);
div_rem_op!(i32_rem_u, pop_u32, push_u32, unsigned wrapping_rem);
binop_expr!(i32_and, pop_u32, push_u32, |v1, v2| v1 & v2);
binop_expr!(i32_or, pop_u32, push_u32, |v1, v2| v1 | v2);
binop_expr!(i32_xor, pop_u32, push_u32, |v1, v2| v1 ^ v2);
// Shift amounts are masked modulo the bit width; rotates are inherently modular.
binop!(i32_shl, pop_u32, push_u32, wrapping_shl);
binop_expr!(i32_shr_s, pop_u32, push_i32, |v1, v2| (v1 as i32).wrapping_shr(v2));
binop!(i32_shr_u, pop_u32, push_u32, wrapping_shr);
binop!(i32_rotl, pop_u32, push_u32, rotate_left);
binop!(i32_rotr, pop_u32, push_u32, rotate_right);

unop_expr!(i32_eqz, pop_u32, push_bool, |v| v == 0);
cmp_op!(i32_eq, pop_u32, ==);
cmp_op!(i32_ne, pop_u32, !=);
cmp_op!(i32_lt_s, pop_i32, <);
cmp_op!(i32_lt_u, pop_u32, <);
cmp_op!(i32_gt_s, pop_i32, >);
cmp_op!(i32_gt_u, pop_u32, >);
cmp_op!(i32_le_s, pop_i32, <=);
cmp_op!(i32_le_u, pop_u32, <=);
cmp_op!(i32_ge_s, pop_i32, >=);
cmp_op!(i32_ge_u, pop_u32, >=);

// ---------------- i64 ----------------

unop_expr!(i64_clz, pop_u64, push_u64, |v| v.leading_zeros() as u64);
unop_expr!(i64_ctz, pop_u64, push_u64, |v| v.trailing_zeros() as u64);
unop_expr!(i64_popcnt, pop_u64, push_u64, |v| v.count_ones() as u64);

binop!(i64_add, pop_u64, push_u64, wrapping_add);
binop!(i64_sub, pop_u64, push_u64, wrapping_sub);
binop!(i64_mul, pop_u64, push_u64, wrapping_mul);
div_rem_op!(i64_div_s, pop_i64, push_i64, signed_div);
div_rem_op!(i64_div_u, pop_u64, push_u64, unsigned wrapping_div);
div_rem_op!(i64_rem_s, pop_i64, push_i64, signed_rem);
div_rem_op!(i64_rem_u, pop_u64, push_u64, unsigned wrapping_rem);
binop_expr!(i64_and, pop_u64, push_u64, |v1, v2| v1 & v2);
binop_expr!(i64_or, pop_u64, push_u64, |v1, v2| v1 | v2);
binop_expr!(i64_xor, pop_u64, push_u64, |v1, v2| v1 ^ v2);
binop_expr!(i64_shl, pop_u64, push_u64, |v1, v2| v1.wrapping_shl(v2 as u32));
binop_expr!(i64_shr_s, pop_u64, push_i64, |v1, v2| (v1 as i64).wrapping_shr(v2 as u32));
binop_expr!(i64_shr_u, pop_u64, push_u64, |v1, v2| v1.wrapping_shr(v2 as u32));
binop_expr!(i64_rotl, pop_u64, push_u64, |v1, v2| v1.rotate_left(v2 as u32));
binop_expr!(i64_rotr, pop_u64, push_u64, |v1, v2| v1.rotate_right(v2 as u32));

unop_expr!(i64_eqz, pop_u64, push_bool, |v| v == 0);
cmp_op!(i64_eq, pop_u64, ==);
cmp_op!(i64_ne, pop_u64, !=);
cmp_op!(i64_lt_s, pop_i64, <);
cmp_op!(i64_lt_u, pop_u64, <);
cmp_op!(i64_gt_s, pop_i64, >);
cmp_op!(i64_gt_u, pop_u64, >);
cmp_op!(i64_le_s, pop_i64, <=);
cmp_op!(i64_le_u, pop_u64, <=);
cmp_op!(i64_ge_s, pop_i64, >=);
cmp_op!(i64_ge_u, pop_u64, >=);

// ---------------- f32 ----------------

unop_expr!(f32_abs, pop_f32, push_f32, |v| v.abs());
unop_expr!(f32_neg, pop_f32, push_f32, |v| -v);
unop_expr!(f32_ceil, pop_f32, push_f32, |v| v.ceil());
unop_expr!(f32_floor, pop_f32, push_f32, |v| v.floor());
unop_expr!(f32_trunc, pop_f32, push_f32, |v| v.trunc());
unop_expr!(f32_nearest, pop_f32, push_f32, |v| v.round_ties_even());
unop_expr!(f32_sqrt, pop_f32, push_f32, |v| v.sqrt());

binop_expr!(f32_add, pop_f32, push_f32, |v1, v2| v1 + v2);
binop_expr!(f32_sub, pop_f32, push_f32, |v1, v2| v1 - v2);
binop_expr!(f32_mul, pop_f32, push_f32, |v1, v2| v1 * v2);
binop_expr!(f32_div, pop_f32, push_f32, |v1, v2| v1 / v2);
binop_expr!(f32_min, pop_f32, push_f32, |v1, v2| fmin32(v1, v2));
binop_expr!(f32_max, pop_f32, push_f32, |v1, v2| fmax32(v1, v2));
binop_expr!(f32_copysign, pop_f32, push_f32, |v1, v2| v1.copysign(v2));

cmp_op!(f32_eq, pop_f32, ==);
cmp_op!(f32_ne, pop_f32, !=);
cmp_op!(f32_lt, pop_f32, <);
cmp_op!(f32_gt, pop_f32, >);
cmp_op!(f32_le, pop_f32, <=);
cmp_op!(f32_ge, pop_f32, >=);

// ---------------- f64 ----------------

unop_expr!(f64_abs, pop_f64, push_f64, |v| v.abs());
unop_expr!(f64_neg, pop_f64, push_f64, |v| -v);
unop_expr!(f64_ceil, pop_f64, push_f64, |v| v.ceil());
unop_expr!(f64_floor, pop_f64, push_f64, |v| v.floor());
unop_expr!(f64_trunc, pop_f64, push_f64, |v| v.trunc());
unop_expr!(f64_nearest, pop_f64, push_f64, |v| v.round_ties_even());
unop_expr!(f64_sqrt, pop_f64, push_f64, |v| v.sqrt());

binop_expr!(f64_add, pop_f64, push_f64, |v1, v2| v1 + v2);
binop_expr!(f64_sub, pop_f64, push_f64, |v1, v2| v1 - v2);
binop_expr!(f64_mul, pop_f64, push_f64, |v1, v2| v1 * v2);
binop_expr!(f64_div, pop_f64, push_f64, |v1, v2| v1 / v2);
binop_expr!(f64_min, pop_f64, push_f64, |v1, v2| fmin64(v1, v2));
binop_expr!(f64_max, pop_f64, push_f64, |v1, v2| fmax64(v1, v2));
binop_expr!(f64_copysign, pop_f64, push_f64, |v1, v2| v1.copysign(v2));

cmp_op!(f64_eq, pop_f64, ==);
cmp_op!(f64_ne, pop_f64, !=);
cmp_op!(f64_lt, pop_f64, <);
cmp_op!(f64_gt, pop_f64, >);
cmp_op!(f64_le, pop_f64, <=);
cmp_op!(f64_ge, pop_f64, >=);

// IEEE min/max: NaN propagates, and on equal operands the sign bits decide
// so that min(+0, -0) = -0 and max(+0, -0) = +0. Rust's f32::min/max return
// the non-NaN operand instead, so these are spelled out.

fn fmin32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        f32::from_bits(a.to_bits() | b.to_bits())
    } else if a < b {
        a
    } else {
        b
    }
}

fn fmax32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        f32::from_bits(a.to_bits() & b.to_bits())
    } else if a > b {
        a
    } else {
        b
    }
}

fn fmin64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        f64::from_bits(a.to_bits() | b.to_bits())
    } else if a < b {
        a
    } else {
        b
    }
}

fn fmax64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        f64::from_bits(a.to_bits() & b.to_bits())
    } else if a > b {
        a
    } else {
        b
    }
}
