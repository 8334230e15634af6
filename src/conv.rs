//! Conversion operator handlers.
//!
//! Truncations from float to integer trap on NaN and on values whose
//! truncated result falls outside the target range; the reinterpret
//! operators leave the slot's bit pattern untouched.

use crate::error::Trap;
use crate::vm::Vm;

macro_rules! convert_op {
    ($name:ident, $pop:ident, $push:ident, $ty:ty) => {
        pub(crate) fn $name(vm: &mut Vm) -> Result<(), Trap> {
            let v = vm.$pop();
            vm.$push(v as $ty);
            Ok(())
        }
    };
}

// Bounds are exclusive above and inclusive below for signed targets; for
// unsigned targets any truncated value below zero is out of range (-0.0 is
// not, since it compares equal to zero).
macro_rules! trunc_op {
    ($name:ident, $pop:ident, $push:ident, $ty:ty, $min:expr, $max:expr) => {
        pub(crate) fn $name(vm: &mut Vm) -> Result<(), Trap> {
            let v = vm.$pop();
            if v.is_nan() {
                return Err(Trap::InvalidConversionToInteger);
            }
            let t = v.trunc();
            if t < $min || t >= $max {
                return Err(Trap::IntegerOverflow);
            }
            vm.$push(t as $ty);
            Ok(())
        }
    };
}

convert_op!(i32_wrap_i64, pop_u64, push_u32, u32);
convert_op!(i64_extend_s_i32, pop_i32, push_i64, i64);
convert_op!(i64_extend_u_i32, pop_u32, push_u64, u64);

trunc_op!(i32_trunc_s_f32, pop_f32, push_i32, i32, -2_147_483_648.0, 2_147_483_648.0);
trunc_op!(i32_trunc_u_f32, pop_f32, push_u32, u32, 0.0, 4_294_967_296.0);
trunc_op!(i32_trunc_s_f64, pop_f64, push_i32, i32, -2_147_483_648.0, 2_147_483_648.0);
trunc_op!(i32_trunc_u_f64, pop_f64, push_u32, u32, 0.0, 4_294_967_296.0);
trunc_op!(i64_trunc_s_f32, pop_f32, push_i64, i64, -9_223_372_036_854_775_808.0, 9_223_372_036_854_775_808.0);
trunc_op!(i64_trunc_u_f32, pop_f32, push_u64, u64, 0.0, 18_446_744_073_709_551_616.0);
trunc_op!(i64_trunc_s_f64, pop_f64, push_i64, i64, -9_223_372_036_854_775_808.0, 9_223_372_036_854_775_808.0);
trunc_op!(i64_trunc_u_f64, pop_f64, push_u64, u64, 0.0, 18_446_744_073_709_551_616.0);

convert_op!(f32_convert_s_i32, pop_i32, push_f32, f32);
convert_op!(f32_convert_u_i32, pop_u32, push_f32, f32);
convert_op!(f32_convert_s_i64, pop_i64, push_f32, f32);
convert_op!(f32_convert_u_i64, pop_u64, push_f32, f32);
convert_op!(f32_demote_f64, pop_f64, push_f32, f32);
convert_op!(f64_convert_s_i32, pop_i32, push_f64, f64);
convert_op!(f64_convert_u_i32, pop_u32, push_f64, f64);
convert_op!(f64_convert_s_i64, pop_i64, push_f64, f64);
convert_op!(f64_convert_u_i64, pop_u64, push_f64, f64);
convert_op!(f64_promote_f32, pop_f32, push_f64, f64);

/// All four reinterpret operators: the slot already holds the target's bit
/// pattern, so the stack is untouched.
pub(crate) fn reinterpret(_vm: &mut Vm) -> Result<(), Trap> {
    Ok(())
}
