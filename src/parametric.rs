use crate::error::Trap;
use crate::vm::Vm;

pub(crate) fn drop_op(vm: &mut Vm) -> Result<(), Trap> {
    vm.pop();
    Ok(())
}

pub(crate) fn select_op(vm: &mut Vm) -> Result<(), Trap> {
    let cond = vm.pop_u32();
    let val2 = vm.pop();
    let val1 = vm.pop();
    vm.push(if cond != 0 { val1 } else { val2 });
    Ok(())
}
