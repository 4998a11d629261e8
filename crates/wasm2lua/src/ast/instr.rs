//! Instruction nodes.

use super::WasmType;

/// One instruction with its byte offset in the source binary.
///
/// Structured instructions own their bodies, so a function body is a tree.
/// The offset identifies the instruction for label synthesis and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub op: Op,
    pub offset: usize,
}

impl Instr {
    pub fn new(op: Op, offset: usize) -> Self {
        Self { op, offset }
    }
}

/// Result type of a structured block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(WasmType),
}

impl BlockType {
    pub fn result(self) -> Option<WasmType> {
        match self {
            BlockType::Empty => None,
            BlockType::Value(ty) => Some(ty),
        }
    }
}

/// Memory immediate of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    pub offset: u64,
    pub memory: u32,
}

/// Width of a memory access in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    W8,
    W16,
    W32,
    W64,
}

impl AccessWidth {
    pub fn bits(self) -> u32 {
        match self {
            AccessWidth::W8 => 8,
            AccessWidth::W16 => 16,
            AccessWidth::W32 => 32,
            AccessWidth::W64 => 64,
        }
    }
}

/// A constant operand. Floats keep their raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
}

impl Value {
    pub fn ty(self) -> WasmType {
        match self {
            Value::I32(_) => WasmType::I32,
            Value::I64(_) => WasmType::I64,
            Value::F32(_) => WasmType::F32,
            Value::F64(_) => WasmType::F64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    LtS,
    LtU,
    GtS,
    GtU,
    LeS,
    LeU,
    GeS,
    GeU,
    /// Float comparisons carry no signedness.
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Clz,
    Ctz,
    Popcnt,
    Extend8S,
    Extend16S,
    Extend32S,
    Abs,
    Neg,
    Sqrt,
    Ceil,
    Floor,
    Trunc,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    ShrU,
    Rotl,
    Rotr,
    /// Float division.
    Div,
    Min,
    Max,
    Copysign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertOp {
    I32WrapI64,
    I64ExtendI32S,
    I64ExtendI32U,
    /// Float to integer, toward zero, saturating. `from` is f32 or f64.
    TruncS { to: WasmType, from: WasmType },
    TruncU { to: WasmType, from: WasmType },
    /// Integer to float.
    ConvertS { to: WasmType, from: WasmType },
    ConvertU { to: WasmType, from: WasmType },
    F32DemoteF64,
    F64PromoteF32,
    /// Bit reinterpretation; `to` names the result type.
    Reinterpret { to: WasmType },
}

/// The closed set of instruction kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Unreachable,
    Nop,
    Block {
        ty: BlockType,
        body: Vec<Instr>,
    },
    Loop {
        ty: BlockType,
        body: Vec<Instr>,
    },
    If {
        ty: BlockType,
        consequent: Vec<Instr>,
        /// `None` when the `if` has no `else` arm.
        alternate: Option<Vec<Instr>>,
    },
    Br(u32),
    BrIf(u32),
    BrTable {
        targets: Vec<u32>,
        default: u32,
    },
    Return,
    Call(u32),
    CallIndirect {
        type_index: u32,
        table: u32,
    },

    Drop,
    Select,

    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    Load {
        ty: WasmType,
        width: AccessWidth,
        signed: bool,
        memarg: MemArg,
    },
    Store {
        ty: WasmType,
        width: AccessWidth,
        memarg: MemArg,
    },
    MemorySize(u32),
    MemoryGrow(u32),

    Const(Value),
    Eqz(WasmType),
    Compare(WasmType, CmpOp),
    Unary(WasmType, UnaryOp),
    Binary(WasmType, BinaryOp),
    Convert(ConvertOp),

    /// An opcode outside the vocabulary, by mnemonic.
    Unsupported(String),
}

impl Op {
    /// Text-format mnemonic, for diagnostics.
    pub fn name(&self) -> String {
        match self {
            Op::Unreachable => "unreachable".into(),
            Op::Nop => "nop".into(),
            Op::Block { .. } => "block".into(),
            Op::Loop { .. } => "loop".into(),
            Op::If { .. } => "if".into(),
            Op::Br(_) => "br".into(),
            Op::BrIf(_) => "br_if".into(),
            Op::BrTable { .. } => "br_table".into(),
            Op::Return => "return".into(),
            Op::Call(_) => "call".into(),
            Op::CallIndirect { .. } => "call_indirect".into(),
            Op::Drop => "drop".into(),
            Op::Select => "select".into(),
            Op::LocalGet(_) => "local.get".into(),
            Op::LocalSet(_) => "local.set".into(),
            Op::LocalTee(_) => "local.tee".into(),
            Op::GlobalGet(_) => "global.get".into(),
            Op::GlobalSet(_) => "global.set".into(),
            Op::Load {
                ty, width, signed, ..
            } => {
                if width.bits() == type_bits(*ty) {
                    format!("{}.load", ty.name())
                } else {
                    let sign = if *signed { "s" } else { "u" };
                    format!("{}.load{}_{}", ty.name(), width.bits(), sign)
                }
            }
            Op::Store { ty, width, .. } => {
                if width.bits() == type_bits(*ty) {
                    format!("{}.store", ty.name())
                } else {
                    format!("{}.store{}", ty.name(), width.bits())
                }
            }
            Op::MemorySize(_) => "memory.size".into(),
            Op::MemoryGrow(_) => "memory.grow".into(),
            Op::Const(value) => format!("{}.const", value.ty().name()),
            Op::Eqz(ty) => format!("{}.eqz", ty.name()),
            Op::Compare(ty, op) => format!("{}.{}", ty.name(), cmp_name(*op)),
            Op::Unary(ty, op) => format!("{}.{}", ty.name(), unary_name(*op)),
            Op::Binary(ty, op) => format!("{}.{}", ty.name(), binary_name(*op)),
            Op::Convert(op) => convert_name(*op),
            Op::Unsupported(name) => name.clone(),
        }
    }
}

fn type_bits(ty: WasmType) -> u32 {
    match ty {
        WasmType::I32 | WasmType::F32 => 32,
        WasmType::I64 | WasmType::F64 => 64,
    }
}

fn cmp_name(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "eq",
        CmpOp::Ne => "ne",
        CmpOp::LtS => "lt_s",
        CmpOp::LtU => "lt_u",
        CmpOp::GtS => "gt_s",
        CmpOp::GtU => "gt_u",
        CmpOp::LeS => "le_s",
        CmpOp::LeU => "le_u",
        CmpOp::GeS => "ge_s",
        CmpOp::GeU => "ge_u",
        CmpOp::Lt => "lt",
        CmpOp::Gt => "gt",
        CmpOp::Le => "le",
        CmpOp::Ge => "ge",
    }
}

fn unary_name(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Clz => "clz",
        UnaryOp::Ctz => "ctz",
        UnaryOp::Popcnt => "popcnt",
        UnaryOp::Extend8S => "extend8_s",
        UnaryOp::Extend16S => "extend16_s",
        UnaryOp::Extend32S => "extend32_s",
        UnaryOp::Abs => "abs",
        UnaryOp::Neg => "neg",
        UnaryOp::Sqrt => "sqrt",
        UnaryOp::Ceil => "ceil",
        UnaryOp::Floor => "floor",
        UnaryOp::Trunc => "trunc",
        UnaryOp::Nearest => "nearest",
    }
}

fn binary_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::DivS => "div_s",
        BinaryOp::DivU => "div_u",
        BinaryOp::RemS => "rem_s",
        BinaryOp::RemU => "rem_u",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
        BinaryOp::Shl => "shl",
        BinaryOp::ShrS => "shr_s",
        BinaryOp::ShrU => "shr_u",
        BinaryOp::Rotl => "rotl",
        BinaryOp::Rotr => "rotr",
        BinaryOp::Div => "div",
        BinaryOp::Min => "min",
        BinaryOp::Max => "max",
        BinaryOp::Copysign => "copysign",
    }
}

fn convert_name(op: ConvertOp) -> String {
    match op {
        ConvertOp::I32WrapI64 => "i32.wrap_i64".into(),
        ConvertOp::I64ExtendI32S => "i64.extend_i32_s".into(),
        ConvertOp::I64ExtendI32U => "i64.extend_i32_u".into(),
        ConvertOp::TruncS { to, from } => format!("{}.trunc_{}_s", to.name(), from.name()),
        ConvertOp::TruncU { to, from } => format!("{}.trunc_{}_u", to.name(), from.name()),
        ConvertOp::ConvertS { to, from } => format!("{}.convert_{}_s", to.name(), from.name()),
        ConvertOp::ConvertU { to, from } => format!("{}.convert_{}_u", to.name(), from.name()),
        ConvertOp::F32DemoteF64 => "f32.demote_f64".into(),
        ConvertOp::F64PromoteF32 => "f64.promote_f32".into(),
        ConvertOp::Reinterpret { to } => {
            let from = match to {
                WasmType::I32 => WasmType::F32,
                WasmType::I64 => WasmType::F64,
                WasmType::F32 => WasmType::I32,
                WasmType::F64 => WasmType::I64,
            };
            format!("{}.reinterpret_{}", to.name(), from.name())
        }
    }
}
