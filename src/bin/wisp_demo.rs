use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use wisp::ops::{self, Instr};
use wisp::{
    FuncBody, FuncDecl, JsonLinesSink, MemoryEntry, Module, Signature, ValType, Value, Vm,
    VmOptions,
};

#[derive(Parser, Debug)]
#[command(name = "wisp-demo")]
#[command(about = "Run the bundled wisp sample programs")]
#[command(long_about = "
Runs one of the sample programs bundled with the interpreter, optionally
recording per-operation telemetry as JSON lines.

Examples:
  # Recursive factorial through the call machinery
  wisp-demo factorial -n 10

  # Store/load round-trip through linear memory
  wisp-demo memory

  # Trace every executed operation to a file
  wisp-demo factorial -n 5 --trace trace.jsonl
")]
struct Args {
    /// Program to run: factorial | memory
    program: String,

    /// Argument for programs that take one
    #[arg(short, long, default_value_t = 10)]
    n: i32,

    /// Write per-operation telemetry as JSON lines to this file
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Run id recorded in telemetry
    #[arg(long, default_value_t = 0)]
    run_id: u32,
}

/// fac(n) = if n == 0 { 1 } else { n * fac(n - 1) }
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

/// Stores a marker word at address 4 and reads it back.
fn memory_module() -> Module {
    let body = vec![
        Instr::i32(4),
        Instr::i32(0xDEADBEEFu32 as i32),
        Instr::mem(ops::I32_STORE, 0),
        Instr::i32(4),
        Instr::mem(ops::I32_LOAD, 0),
        Instr::op(ops::END),
    ];
    Module {
        types: vec![Signature::new(vec![], Some(ValType::I32))],
        functions: vec![FuncDecl { type_index: 0, body: FuncBody::Code { locals: 0, ops: body } }],
        memories: vec![MemoryEntry { initial: 1, data: vec![] }],
        ..Default::default()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (module, call_args, label) = match args.program.as_str() {
        "factorial" => (
            factorial_module(),
            vec![Value::from_i32(args.n)],
            format!("factorial({})", args.n),
        ),
        "memory" => (memory_module(), vec![], "memory round-trip".to_string()),
        other => {
            return Err(format!("unknown program '{other}' (expected factorial or memory)").into())
        }
    };

    let options = match &args.trace {
        Some(path) => VmOptions {
            sink: Some(Box::new(JsonLinesSink::new(BufWriter::new(File::create(path)?)))),
            run_id: args.run_id,
        },
        None => VmOptions::default(),
    };

    let mut vm = Vm::with_options(module, options)?;
    match vm.exec_code(0, &call_args)? {
        Some(result) => println!("{label} = {result:?}"),
        None => println!("{label} returned no value"),
    }
    vm.close();
    Ok(())
}
