use crate::error::Trap;
use crate::vm::Vm;

pub(crate) fn get_local(vm: &mut Vm) -> Result<(), Trap> {
    let index = vm.fetch_u32() as usize;
    let val = vm.ctx.locals[index];
    vm.push(val);
    Ok(())
}

pub(crate) fn set_local(vm: &mut Vm) -> Result<(), Trap> {
    let index = vm.fetch_u32() as usize;
    let val = vm.pop();
    vm.ctx.locals[index] = val;
    Ok(())
}

/// Stores the stack top to a local without popping it.
pub(crate) fn tee_local(vm: &mut Vm) -> Result<(), Trap> {
    let index = vm.fetch_u32() as usize;
    let val = *vm.ctx.stack.last().expect("operand stack underflow");
    vm.ctx.locals[index] = val;
    Ok(())
}

pub(crate) fn get_global(vm: &mut Vm) -> Result<(), Trap> {
    let index = vm.fetch_u32() as usize;
    let val = vm.globals[index];
    vm.push(val);
    Ok(())
}

// Mutability is established at instantiation and validated upstream; it is
// not re-checked here.
pub(crate) fn set_global(vm: &mut Vm) -> Result<(), Trap> {
    let index = vm.fetch_u32() as usize;
    let val = vm.pop();
    vm.globals[index] = val;
    Ok(())
}
