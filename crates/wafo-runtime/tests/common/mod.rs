//! Synthesized interpreter core and word modules for runtime tests.
//!
//! The test core speaks the same host interface as the real one but
//! understands a toy language: each input line is one command, selected by
//! its first character.
//!
//! | line | effect                                             |
//! |------|----------------------------------------------------|
//! | `S`  | `SCALL` (name on the stack)                        |
//! | `E`  | `EXECUTE` (pop a token, call its table slot)       |
//! | `L`  | pop length and address, `shell.load` the module   |
//! | `P`  | pop a character and emit it                        |
//! | `K`  | push `shell.key()`                                 |
//! | `Q`  | stop with `Quit`                                   |
//! | `A`  | stop with `Abort`                                  |
//! | `B`  | stop with `Bye`                                    |
//!
//! Anything else is ignored. After each line the core prints ` ok\n` unless
//! run silently. Running out of input stops with `EndOfInput`.
//!
//! The data stack lives in memory: cell 0 holds the depth in bytes and the
//! cells start at `STACK_BASE`, so word modules can push without imports.

#![allow(dead_code)]

use std::borrow::Cow;

use wasm_encoder::{
    BlockType, CodeSection, ConstExpr, ElementSection, Elements, EntityType, ExportKind,
    ExportSection, Function, FunctionSection, GlobalSection, GlobalType, ImportSection,
    Instruction, MemArg, MemorySection, MemoryType, Module, RefType, TableSection, TableType,
    TypeSection, ValType,
};

pub const STACK_BASE: u64 = 0x100;
pub const INPUT_BUFFER: i32 = 0x800;
pub const INPUT_CAPACITY: i32 = 0x80;
pub const HERE: i32 = 0x1000;
pub const INITIAL_TABLE_SIZE: u64 = 4;

// Type indices.
const TYPE_VOID: u32 = 0;
const TYPE_I32_VOID: u32 = 1;
const TYPE_VOID_I32: u32 = 2;
const TYPE_I32X2_I32: u32 = 3;
const TYPE_I32X2_VOID: u32 = 4;

// Function indices: imports first.
const SHELL_EMIT: u32 = 0;
const SHELL_READ: u32 = 1;
const SHELL_KEY: u32 = 2;
const SHELL_LOAD: u32 = 3;
const SHELL_CALL: u32 = 4;
const PUSH: u32 = 5;
const POP: u32 = 6;
const HERE_FN: u32 = 7;
const ERROR_FN: u32 = 8;
const RUN: u32 = 9;

const GLOBAL_ERROR: u32 = 0;
const GLOBAL_HERE: u32 = 1;

fn memarg(offset: u64, align: u32) -> MemArg {
    MemArg {
        offset,
        align,
        memory_index: 0,
    }
}

fn i32_global(init: i32) -> (GlobalType, ConstExpr) {
    (
        GlobalType {
            val_type: ValType::I32,
            mutable: true,
            shared: false,
        },
        ConstExpr::i32_const(init),
    )
}

/// Push the value on top of the wasm stack onto the data stack, through
/// memory. Needs one scratch local.
fn emit_push_from_local(f: &mut Function, local: u32) {
    // cells[depth] = value
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I32Load(memarg(0, 2)));
    f.instruction(&Instruction::LocalGet(local));
    f.instruction(&Instruction::I32Store(memarg(STACK_BASE, 2)));
    // depth += 4
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I32Load(memarg(0, 2)));
    f.instruction(&Instruction::I32Const(4));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
}

fn emit_push() -> Function {
    let mut f = Function::new(vec![]);
    emit_push_from_local(&mut f, 0);
    f.instruction(&Instruction::End);
    f
}

fn emit_pop() -> Function {
    let mut f = Function::new(vec![]);
    // depth -= 4
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I32Load(memarg(0, 2)));
    f.instruction(&Instruction::I32Const(4));
    f.instruction(&Instruction::I32Sub);
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
    // cells[depth]
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I32Load(memarg(0, 2)));
    f.instruction(&Instruction::I32Load(memarg(STACK_BASE, 2)));
    f.instruction(&Instruction::End);
    f
}

fn emit_global_getter(global: u32) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::GlobalGet(global));
    f.instruction(&Instruction::End);
    f
}

/// `if c == ch { body }`
fn emit_on_char(f: &mut Function, ch: u8, body: &[Instruction<'_>]) {
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Const(i32::from(ch)));
    f.instruction(&Instruction::I32Eq);
    f.instruction(&Instruction::If(BlockType::Empty));
    for ins in body {
        f.instruction(ins);
    }
    f.instruction(&Instruction::End);
}

fn stop_with(code: i32) -> [Instruction<'static>; 3] {
    [
        Instruction::I32Const(code),
        Instruction::GlobalSet(GLOBAL_ERROR),
        Instruction::Unreachable,
    ]
}

/// `run(silent)`; locals: 1 = line length, 2 = command, 3 = scratch.
fn emit_run() -> Function {
    let mut f = Function::new(vec![(3, ValType::I32)]);
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::GlobalSet(GLOBAL_ERROR));

    f.instruction(&Instruction::Loop(BlockType::Empty));

    f.instruction(&Instruction::I32Const(INPUT_BUFFER));
    f.instruction(&Instruction::I32Const(INPUT_CAPACITY));
    f.instruction(&Instruction::Call(SHELL_READ));
    f.instruction(&Instruction::LocalTee(1));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    for ins in stop_with(4) {
        f.instruction(&ins);
    }
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::I32Const(INPUT_BUFFER));
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::LocalSet(2));

    emit_on_char(&mut f, b'S', &[Instruction::Call(SHELL_CALL)]);
    emit_on_char(
        &mut f,
        b'E',
        &[
            Instruction::Call(POP),
            Instruction::CallIndirect {
                type_index: TYPE_VOID,
                table_index: 0,
            },
        ],
    );
    emit_on_char(
        &mut f,
        b'L',
        &[
            Instruction::Call(POP),
            Instruction::LocalSet(3),
            Instruction::Call(POP),
            Instruction::LocalGet(3),
            Instruction::Call(SHELL_LOAD),
        ],
    );
    emit_on_char(
        &mut f,
        b'P',
        &[Instruction::Call(POP), Instruction::Call(SHELL_EMIT)],
    );
    emit_on_char(
        &mut f,
        b'K',
        &[Instruction::Call(SHELL_KEY), Instruction::Call(PUSH)],
    );
    emit_on_char(&mut f, b'Q', &stop_with(2));
    emit_on_char(&mut f, b'A', &stop_with(3));
    emit_on_char(&mut f, b'B', &stop_with(5));

    // Prompt.
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    for c in b" ok\n" {
        f.instruction(&Instruction::I32Const(i32::from(*c)));
        f.instruction(&Instruction::Call(SHELL_EMIT));
    }
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End); // loop
    f.instruction(&Instruction::End);
    f
}

/// The test interpreter core.
pub fn core_module() -> Vec<u8> {
    let mut module = Module::new();

    let mut types = TypeSection::new();
    types.ty().function(vec![], vec![]);
    types.ty().function(vec![ValType::I32], vec![]);
    types.ty().function(vec![], vec![ValType::I32]);
    types
        .ty()
        .function(vec![ValType::I32, ValType::I32], vec![ValType::I32]);
    types.ty().function(vec![ValType::I32, ValType::I32], vec![]);
    module.section(&types);

    let mut imports = ImportSection::new();
    imports.import("shell", "emit", EntityType::Function(TYPE_I32_VOID));
    imports.import("shell", "read", EntityType::Function(TYPE_I32X2_I32));
    imports.import("shell", "key", EntityType::Function(TYPE_VOID_I32));
    imports.import("shell", "load", EntityType::Function(TYPE_I32X2_VOID));
    imports.import("shell", "call", EntityType::Function(TYPE_VOID));
    module.section(&imports);

    let mut functions = FunctionSection::new();
    functions.function(TYPE_I32_VOID); // push
    functions.function(TYPE_VOID_I32); // pop
    functions.function(TYPE_VOID_I32); // here
    functions.function(TYPE_VOID_I32); // error
    functions.function(TYPE_I32_VOID); // run
    module.section(&functions);

    let mut tables = TableSection::new();
    tables.table(TableType {
        element_type: RefType::FUNCREF,
        minimum: INITIAL_TABLE_SIZE,
        maximum: None,
        table64: false,
        shared: false,
    });
    module.section(&tables);

    let mut memory = MemorySection::new();
    memory.memory(MemoryType {
        minimum: 1,
        maximum: None,
        memory64: false,
        shared: false,
        page_size_log2: None,
    });
    module.section(&memory);

    let mut globals = GlobalSection::new();
    let (ty, init) = i32_global(1);
    globals.global(ty, &init);
    let (ty, init) = i32_global(HERE);
    globals.global(ty, &init);
    module.section(&globals);

    let mut exports = ExportSection::new();
    exports.export("memory", ExportKind::Memory, 0);
    exports.export("table", ExportKind::Table, 0);
    exports.export("push", ExportKind::Func, PUSH);
    exports.export("pop", ExportKind::Func, POP);
    exports.export("here", ExportKind::Func, HERE_FN);
    exports.export("error", ExportKind::Func, ERROR_FN);
    exports.export("run", ExportKind::Func, RUN);
    module.section(&exports);

    let mut code = CodeSection::new();
    code.function(&emit_push());
    code.function(&emit_pop());
    code.function(&emit_global_getter(GLOBAL_HERE));
    code.function(&emit_global_getter(GLOBAL_ERROR));
    code.function(&emit_run());
    module.section(&code);

    module.finish()
}

/// A compiled word: installs itself at `slot` and pushes `value` when
/// executed.
pub fn word_module(slot: u32, value: i32) -> Vec<u8> {
    let mut module = Module::new();

    let mut types = TypeSection::new();
    types.ty().function(vec![], vec![]);
    module.section(&types);

    let mut imports = ImportSection::new();
    imports.import(
        "env",
        "table",
        EntityType::Table(TableType {
            element_type: RefType::FUNCREF,
            minimum: 0,
            maximum: None,
            table64: false,
            shared: false,
        }),
    );
    imports.import(
        "env",
        "memory",
        EntityType::Memory(MemoryType {
            minimum: 1,
            maximum: None,
            memory64: false,
            shared: false,
            page_size_log2: None,
        }),
    );
    module.section(&imports);

    let mut functions = FunctionSection::new();
    functions.function(TYPE_VOID);
    module.section(&functions);

    let mut elements = ElementSection::new();
    let funcs = [0u32];
    elements.active(
        Some(0),
        &ConstExpr::i32_const(slot as i32),
        Elements::Functions(Cow::Borrowed(&funcs[..])),
    );
    module.section(&elements);

    let mut code = CodeSection::new();
    let mut f = Function::new(vec![(1, ValType::I32)]);
    f.instruction(&Instruction::I32Const(value));
    f.instruction(&Instruction::LocalSet(0));
    emit_push_from_local(&mut f, 0);
    f.instruction(&Instruction::End);
    code.function(&f);
    module.section(&code);

    module.finish()
}
