use crate::error::Trap;
use crate::vm::Vm;

pub(crate) fn unreachable(_vm: &mut Vm) -> Result<(), Trap> {
    Err(Trap::Unreachable)
}

pub(crate) fn nop(_vm: &mut Vm) -> Result<(), Trap> {
    Ok(())
}
