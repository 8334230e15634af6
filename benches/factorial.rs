use std::time::Instant;

use wisp::ops::{self, Instr};
use wisp::{FuncBody, FuncDecl, Module, RuntimeValue, Signature, ValType, Value, Vm};

fn factorial_module() -> Module {
    let body = vec![
        Instr::idx(ops::GET_LOCAL, 0),
        Instr::op(ops::I32_EQZ),
        Instr::block(ops::IF, Some(ValType::I32)),
        Instr::i32(1),
        Instr::op(ops::ELSE),
        Instr::idx(ops::GET_LOCAL, 0),
        Instr::idx(ops::GET_LOCAL, 0),
        Instr::i32(1),
        Instr::op(ops::I32_SUB),
        Instr::idx(ops::CALL, 0),
        Instr::op(ops::I32_MUL),
        Instr::op(ops::END),
        Instr::op(ops::END),
    ];
    Module {
        types: vec![Signature::new(vec![ValType::I32], Some(ValType::I32))],
        functions: vec![FuncDecl { type_index: 0, body: FuncBody::Code { locals: 0, ops: body } }],
        ..Default::default()
    }
}

fn main() {
    let mut vm = Vm::new(factorial_module()).expect("instantiation failed");
    let n = 12;
    let iters = 100_000u32;

    // Warm up allocator and stack-buffer reuse before timing.
    for _ in 0..1_000 {
        vm.exec_code(0, &[Value::from_i32(n)]).expect("execution failed");
    }

    let start = Instant::now();
    let mut last = None;
    for _ in 0..iters {
        last = vm.exec_code(0, &[Value::from_i32(n)]).expect("execution failed");
    }
    let elapsed = start.elapsed();

    assert_eq!(last, Some(RuntimeValue::I32(479_001_600)));
    println!(
        "factorial({n}) x {iters}: {elapsed:?} total, {:.0} ns/call",
        elapsed.as_nanos() as f64 / iters as f64
    );
}
