//! Decoded module tree.
//!
//! This is the closed node vocabulary the translator consumes. The
//! [`crate::parser`] builds it from a binary with `wasmparser`, but nothing in
//! the translator depends on how the tree was produced: any decoder that can
//! fill these types can drive it.
//!
//! ```text
//! Module
//!  ├── types: Vec<FuncType>
//!  └── fields: Vec<Field>
//!        ├── Import { module, name, desc }
//!        ├── Func { type_index, locals, body: Vec<Instr> }
//!        ├── Table / Memory / Global { init: Vec<Instr> }
//!        ├── Export { name, kind, index }
//!        ├── Start(func_index)
//!        ├── Elem { table, offset: Vec<Instr>, funcs }
//!        ├── Data { memory, offset: Vec<Instr>, bytes }
//!        └── Unsupported(description)
//! ```

mod instr;

pub use instr::*;

/// WebAssembly value types supported by the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WasmType {
    I32,
    I64,
    F32,
    F64,
}

impl WasmType {
    pub fn name(self) -> &'static str {
        match self {
            WasmType::I32 => "i32",
            WasmType::I64 => "i64",
            WasmType::F32 => "f32",
            WasmType::F64 => "f64",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, WasmType::F32 | WasmType::F64)
    }
}

/// A function signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncType {
    pub params: Vec<WasmType>,
    pub results: Vec<WasmType>,
}

/// Page limits of a memory or element limits of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub initial: u64,
    pub maximum: Option<u64>,
}

/// A decoded module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// Module name from the `name` custom section, if present.
    pub name: Option<String>,
    pub types: Vec<FuncType>,
    /// Fields in decode order.
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Import(Import),
    Func(Func),
    Table(Limits),
    Memory(Limits),
    Global(Global),
    Export(Export),
    Start(u32),
    Elem(Elem),
    Data(Data),
    /// A section or entity outside the vocabulary; reported, never translated.
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportDesc {
    Func { type_index: u32 },
    Table(Limits),
    Memory(Limits),
    Global { ty: WasmType, mutable: bool },
}

/// A function defined in the module.
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    /// Name from the `name` custom section, if present.
    pub name: Option<String>,
    pub type_index: u32,
    /// Declared locals, excluding parameters.
    pub locals: Vec<WasmType>,
    pub body: Vec<Instr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub ty: WasmType,
    pub mutable: bool,
    pub init: Vec<Instr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Func,
    Table,
    Memory,
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

/// An active element segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Elem {
    pub table: u32,
    pub offset: Vec<Instr>,
    /// Function indices, `None` for a null reference.
    pub funcs: Vec<Option<u32>>,
}

/// An active data segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub memory: u32,
    pub offset: Vec<Instr>,
    pub bytes: Vec<u8>,
}

impl Module {
    pub fn func_type(&self, index: u32) -> Option<&FuncType> {
        self.types.get(index as usize)
    }
}
