/// A single stack or local slot. Typing is carried by the program, not the
/// slot: 32-bit integers occupy the low 32 bits with the upper bits zero,
/// 32-bit floats are stored as their IEEE-754 bit pattern zero-extended, and
/// 64-bit integers and floats fill the slot.
#[derive(Copy, Clone, Default)]
pub struct Value(pub u64);

impl Value {
    #[inline] pub fn from_i32(v: i32) -> Self { Self(v as u32 as u64) }
    #[inline] pub fn as_i32(self) -> i32 { self.0 as u32 as i32 }
    #[inline] pub fn from_u32(v: u32) -> Self { Self(v as u64) }
    #[inline] pub fn as_u32(self) -> u32 { self.0 as u32 }
    #[inline] pub fn from_i64(v: i64) -> Self { Self(v as u64) }
    #[inline] pub fn as_i64(self) -> i64 { self.0 as i64 }
    #[inline] pub fn from_u64(v: u64) -> Self { Self(v) }
    #[inline] pub fn as_u64(self) -> u64 { self.0 }
    #[inline] pub fn from_f32_bits(bits: u32) -> Self { Self(bits as u64) }
    #[inline] pub fn as_f32_bits(self) -> u32 { self.0 as u32 }
    #[inline] pub fn from_f64_bits(bits: u64) -> Self { Self(bits) }
    #[inline] pub fn as_f64_bits(self) -> u64 { self.0 }
    #[inline] pub fn from_f32(v: f32) -> Self { Self::from_f32_bits(v.to_bits()) }
    #[inline] pub fn as_f32(self) -> f32 { f32::from_bits(self.as_f32_bits()) }
    #[inline] pub fn from_f64(v: f64) -> Self { Self::from_f64_bits(v.to_bits()) }
    #[inline] pub fn as_f64(self) -> f64 { f64::from_bits(self.as_f64_bits()) }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Value({:#018x})", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

/// A function type: parameter sequence plus at most one result.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<ValType>,
    pub result: Option<ValType>,
}

impl Signature {
    pub fn new(params: Vec<ValType>, result: Option<ValType>) -> Self {
        Self { params, result }
    }
}

/// The typed result of an entry call: the top-of-stack return word converted
/// per the entry function's declared result type.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RuntimeValue {
    I32(u32),
    I64(u64),
    F32(f32),
    F64(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_slots_zero_extend() {
        assert_eq!(Value::from_i32(-1).as_u64(), 0x0000_0000_ffff_ffff);
        assert_eq!(Value::from_i32(-1).as_i32(), -1);
    }

    #[test]
    fn f32_slots_hold_bit_patterns() {
        let v = Value::from_f32(-0.0);
        assert_eq!(v.as_u64(), 0x8000_0000);
        assert_eq!(v.as_f32().to_bits(), (-0.0f32).to_bits());
    }
}
