//! `wasmparser::Operator` → [`Op`] mapping.
//!
//! Structured operators (`block`, `loop`, `if`, `else`, `end`) are handled by
//! the body reader; everything else lands here.

use super::wasm_type;
use crate::ast::{
    AccessWidth, BinaryOp, BlockType, CmpOp, ConvertOp, MemArg, Op, UnaryOp, Value, WasmType,
};
use anyhow::{bail, Context, Result};
use wasmparser::Operator;

pub(super) fn block_type(ty: wasmparser::BlockType) -> Result<BlockType> {
    match ty {
        wasmparser::BlockType::Empty => Ok(BlockType::Empty),
        wasmparser::BlockType::Type(ty) => Ok(BlockType::Value(wasm_type(ty)?)),
        wasmparser::BlockType::FuncType(_) => bail!("Multi-value blocks not supported"),
    }
}

fn memarg(arg: wasmparser::MemArg) -> MemArg {
    MemArg {
        offset: arg.offset,
        memory: arg.memory,
    }
}

fn load(ty: WasmType, width: AccessWidth, signed: bool, arg: wasmparser::MemArg) -> Op {
    Op::Load {
        ty,
        width,
        signed,
        memarg: memarg(arg),
    }
}

fn store(ty: WasmType, width: AccessWidth, arg: wasmparser::MemArg) -> Op {
    Op::Store {
        ty,
        width,
        memarg: memarg(arg),
    }
}

/// Mnemonic of an operator outside the vocabulary, from its debug form.
fn unsupported(op: &Operator) -> Op {
    let debug = format!("{:?}", op);
    let name = debug
        .split([' ', '{', '('])
        .next()
        .unwrap_or_default()
        .to_string();
    Op::Unsupported(name)
}

pub(super) fn convert(op: Operator) -> Result<Op> {
    use AccessWidth::*;
    use WasmType::*;

    let op = match op {
        // ── Control ─────────────────────────────────────────────────────
        Operator::Unreachable => Op::Unreachable,
        Operator::Nop => Op::Nop,
        Operator::Br { relative_depth } => Op::Br(relative_depth),
        Operator::BrIf { relative_depth } => Op::BrIf(relative_depth),
        Operator::BrTable { targets } => {
            let default = targets.default();
            let targets = targets
                .targets()
                .collect::<Result<Vec<_>, _>>()
                .context("reading br_table targets")?;
            Op::BrTable { targets, default }
        }
        Operator::Return => Op::Return,
        Operator::Call { function_index } => Op::Call(function_index),
        Operator::CallIndirect {
            type_index,
            table_index,
            ..
        } => Op::CallIndirect {
            type_index,
            table: table_index,
        },

        // ── Parametric ──────────────────────────────────────────────────
        Operator::Drop => Op::Drop,
        Operator::Select | Operator::TypedSelect { .. } => Op::Select,

        // ── Variables ───────────────────────────────────────────────────
        Operator::LocalGet { local_index } => Op::LocalGet(local_index),
        Operator::LocalSet { local_index } => Op::LocalSet(local_index),
        Operator::LocalTee { local_index } => Op::LocalTee(local_index),
        Operator::GlobalGet { global_index } => Op::GlobalGet(global_index),
        Operator::GlobalSet { global_index } => Op::GlobalSet(global_index),

        // ── Memory ──────────────────────────────────────────────────────
        Operator::I32Load { memarg } => load(I32, W32, false, memarg),
        Operator::I64Load { memarg } => load(I64, W64, false, memarg),
        Operator::F32Load { memarg } => load(F32, W32, false, memarg),
        Operator::F64Load { memarg } => load(F64, W64, false, memarg),
        Operator::I32Load8S { memarg } => load(I32, W8, true, memarg),
        Operator::I32Load8U { memarg } => load(I32, W8, false, memarg),
        Operator::I32Load16S { memarg } => load(I32, W16, true, memarg),
        Operator::I32Load16U { memarg } => load(I32, W16, false, memarg),
        Operator::I64Load8S { memarg } => load(I64, W8, true, memarg),
        Operator::I64Load8U { memarg } => load(I64, W8, false, memarg),
        Operator::I64Load16S { memarg } => load(I64, W16, true, memarg),
        Operator::I64Load16U { memarg } => load(I64, W16, false, memarg),
        Operator::I64Load32S { memarg } => load(I64, W32, true, memarg),
        Operator::I64Load32U { memarg } => load(I64, W32, false, memarg),
        Operator::I32Store { memarg } => store(I32, W32, memarg),
        Operator::I64Store { memarg } => store(I64, W64, memarg),
        Operator::F32Store { memarg } => store(F32, W32, memarg),
        Operator::F64Store { memarg } => store(F64, W64, memarg),
        Operator::I32Store8 { memarg } => store(I32, W8, memarg),
        Operator::I32Store16 { memarg } => store(I32, W16, memarg),
        Operator::I64Store8 { memarg } => store(I64, W8, memarg),
        Operator::I64Store16 { memarg } => store(I64, W16, memarg),
        Operator::I64Store32 { memarg } => store(I64, W32, memarg),
        Operator::MemorySize { mem } => Op::MemorySize(mem),
        Operator::MemoryGrow { mem } => Op::MemoryGrow(mem),

        // ── Constants ───────────────────────────────────────────────────
        Operator::I32Const { value } => Op::Const(Value::I32(value)),
        Operator::I64Const { value } => Op::Const(Value::I64(value)),
        Operator::F32Const { value } => Op::Const(Value::F32(value.bits())),
        Operator::F64Const { value } => Op::Const(Value::F64(value.bits())),

        // ── Tests and comparisons ───────────────────────────────────────
        Operator::I32Eqz => Op::Eqz(I32),
        Operator::I64Eqz => Op::Eqz(I64),

        Operator::I32Eq => Op::Compare(I32, CmpOp::Eq),
        Operator::I32Ne => Op::Compare(I32, CmpOp::Ne),
        Operator::I32LtS => Op::Compare(I32, CmpOp::LtS),
        Operator::I32LtU => Op::Compare(I32, CmpOp::LtU),
        Operator::I32GtS => Op::Compare(I32, CmpOp::GtS),
        Operator::I32GtU => Op::Compare(I32, CmpOp::GtU),
        Operator::I32LeS => Op::Compare(I32, CmpOp::LeS),
        Operator::I32LeU => Op::Compare(I32, CmpOp::LeU),
        Operator::I32GeS => Op::Compare(I32, CmpOp::GeS),
        Operator::I32GeU => Op::Compare(I32, CmpOp::GeU),

        Operator::I64Eq => Op::Compare(I64, CmpOp::Eq),
        Operator::I64Ne => Op::Compare(I64, CmpOp::Ne),
        Operator::I64LtS => Op::Compare(I64, CmpOp::LtS),
        Operator::I64LtU => Op::Compare(I64, CmpOp::LtU),
        Operator::I64GtS => Op::Compare(I64, CmpOp::GtS),
        Operator::I64GtU => Op::Compare(I64, CmpOp::GtU),
        Operator::I64LeS => Op::Compare(I64, CmpOp::LeS),
        Operator::I64LeU => Op::Compare(I64, CmpOp::LeU),
        Operator::I64GeS => Op::Compare(I64, CmpOp::GeS),
        Operator::I64GeU => Op::Compare(I64, CmpOp::GeU),

        Operator::F32Eq => Op::Compare(F32, CmpOp::Eq),
        Operator::F32Ne => Op::Compare(F32, CmpOp::Ne),
        Operator::F32Lt => Op::Compare(F32, CmpOp::Lt),
        Operator::F32Gt => Op::Compare(F32, CmpOp::Gt),
        Operator::F32Le => Op::Compare(F32, CmpOp::Le),
        Operator::F32Ge => Op::Compare(F32, CmpOp::Ge),

        Operator::F64Eq => Op::Compare(F64, CmpOp::Eq),
        Operator::F64Ne => Op::Compare(F64, CmpOp::Ne),
        Operator::F64Lt => Op::Compare(F64, CmpOp::Lt),
        Operator::F64Gt => Op::Compare(F64, CmpOp::Gt),
        Operator::F64Le => Op::Compare(F64, CmpOp::Le),
        Operator::F64Ge => Op::Compare(F64, CmpOp::Ge),

        // ── Unary ───────────────────────────────────────────────────────
        Operator::I32Clz => Op::Unary(I32, UnaryOp::Clz),
        Operator::I32Ctz => Op::Unary(I32, UnaryOp::Ctz),
        Operator::I32Popcnt => Op::Unary(I32, UnaryOp::Popcnt),
        Operator::I32Extend8S => Op::Unary(I32, UnaryOp::Extend8S),
        Operator::I32Extend16S => Op::Unary(I32, UnaryOp::Extend16S),
        Operator::I64Clz => Op::Unary(I64, UnaryOp::Clz),
        Operator::I64Ctz => Op::Unary(I64, UnaryOp::Ctz),
        Operator::I64Popcnt => Op::Unary(I64, UnaryOp::Popcnt),
        Operator::I64Extend8S => Op::Unary(I64, UnaryOp::Extend8S),
        Operator::I64Extend16S => Op::Unary(I64, UnaryOp::Extend16S),
        Operator::I64Extend32S => Op::Unary(I64, UnaryOp::Extend32S),

        Operator::F32Abs => Op::Unary(F32, UnaryOp::Abs),
        Operator::F32Neg => Op::Unary(F32, UnaryOp::Neg),
        Operator::F32Sqrt => Op::Unary(F32, UnaryOp::Sqrt),
        Operator::F32Ceil => Op::Unary(F32, UnaryOp::Ceil),
        Operator::F32Floor => Op::Unary(F32, UnaryOp::Floor),
        Operator::F32Trunc => Op::Unary(F32, UnaryOp::Trunc),
        Operator::F32Nearest => Op::Unary(F32, UnaryOp::Nearest),
        Operator::F64Abs => Op::Unary(F64, UnaryOp::Abs),
        Operator::F64Neg => Op::Unary(F64, UnaryOp::Neg),
        Operator::F64Sqrt => Op::Unary(F64, UnaryOp::Sqrt),
        Operator::F64Ceil => Op::Unary(F64, UnaryOp::Ceil),
        Operator::F64Floor => Op::Unary(F64, UnaryOp::Floor),
        Operator::F64Trunc => Op::Unary(F64, UnaryOp::Trunc),
        Operator::F64Nearest => Op::Unary(F64, UnaryOp::Nearest),

        // ── Binary ──────────────────────────────────────────────────────
        Operator::I32Add => Op::Binary(I32, BinaryOp::Add),
        Operator::I32Sub => Op::Binary(I32, BinaryOp::Sub),
        Operator::I32Mul => Op::Binary(I32, BinaryOp::Mul),
        Operator::I32DivS => Op::Binary(I32, BinaryOp::DivS),
        Operator::I32DivU => Op::Binary(I32, BinaryOp::DivU),
        Operator::I32RemS => Op::Binary(I32, BinaryOp::RemS),
        Operator::I32RemU => Op::Binary(I32, BinaryOp::RemU),
        Operator::I32And => Op::Binary(I32, BinaryOp::And),
        Operator::I32Or => Op::Binary(I32, BinaryOp::Or),
        Operator::I32Xor => Op::Binary(I32, BinaryOp::Xor),
        Operator::I32Shl => Op::Binary(I32, BinaryOp::Shl),
        Operator::I32ShrS => Op::Binary(I32, BinaryOp::ShrS),
        Operator::I32ShrU => Op::Binary(I32, BinaryOp::ShrU),
        Operator::I32Rotl => Op::Binary(I32, BinaryOp::Rotl),
        Operator::I32Rotr => Op::Binary(I32, BinaryOp::Rotr),

        Operator::I64Add => Op::Binary(I64, BinaryOp::Add),
        Operator::I64Sub => Op::Binary(I64, BinaryOp::Sub),
        Operator::I64Mul => Op::Binary(I64, BinaryOp::Mul),
        Operator::I64DivS => Op::Binary(I64, BinaryOp::DivS),
        Operator::I64DivU => Op::Binary(I64, BinaryOp::DivU),
        Operator::I64RemS => Op::Binary(I64, BinaryOp::RemS),
        Operator::I64RemU => Op::Binary(I64, BinaryOp::RemU),
        Operator::I64And => Op::Binary(I64, BinaryOp::And),
        Operator::I64Or => Op::Binary(I64, BinaryOp::Or),
        Operator::I64Xor => Op::Binary(I64, BinaryOp::Xor),
        Operator::I64Shl => Op::Binary(I64, BinaryOp::Shl),
        Operator::I64ShrS => Op::Binary(I64, BinaryOp::ShrS),
        Operator::I64ShrU => Op::Binary(I64, BinaryOp::ShrU),
        Operator::I64Rotl => Op::Binary(I64, BinaryOp::Rotl),
        Operator::I64Rotr => Op::Binary(I64, BinaryOp::Rotr),

        Operator::F32Add => Op::Binary(F32, BinaryOp::Add),
        Operator::F32Sub => Op::Binary(F32, BinaryOp::Sub),
        Operator::F32Mul => Op::Binary(F32, BinaryOp::Mul),
        Operator::F32Div => Op::Binary(F32, BinaryOp::Div),
        Operator::F32Min => Op::Binary(F32, BinaryOp::Min),
        Operator::F32Max => Op::Binary(F32, BinaryOp::Max),
        Operator::F32Copysign => Op::Binary(F32, BinaryOp::Copysign),
        Operator::F64Add => Op::Binary(F64, BinaryOp::Add),
        Operator::F64Sub => Op::Binary(F64, BinaryOp::Sub),
        Operator::F64Mul => Op::Binary(F64, BinaryOp::Mul),
        Operator::F64Div => Op::Binary(F64, BinaryOp::Div),
        Operator::F64Min => Op::Binary(F64, BinaryOp::Min),
        Operator::F64Max => Op::Binary(F64, BinaryOp::Max),
        Operator::F64Copysign => Op::Binary(F64, BinaryOp::Copysign),

        // ── Conversions ─────────────────────────────────────────────────
        Operator::I32WrapI64 => Op::Convert(ConvertOp::I32WrapI64),
        Operator::I64ExtendI32S => Op::Convert(ConvertOp::I64ExtendI32S),
        Operator::I64ExtendI32U => Op::Convert(ConvertOp::I64ExtendI32U),

        // Trapping and saturating truncations share one saturating helper
        Operator::I32TruncF32S | Operator::I32TruncSatF32S => {
            Op::Convert(ConvertOp::TruncS { to: I32, from: F32 })
        }
        Operator::I32TruncF64S | Operator::I32TruncSatF64S => {
            Op::Convert(ConvertOp::TruncS { to: I32, from: F64 })
        }
        Operator::I32TruncF32U | Operator::I32TruncSatF32U => {
            Op::Convert(ConvertOp::TruncU { to: I32, from: F32 })
        }
        Operator::I32TruncF64U | Operator::I32TruncSatF64U => {
            Op::Convert(ConvertOp::TruncU { to: I32, from: F64 })
        }
        Operator::I64TruncF32S | Operator::I64TruncSatF32S => {
            Op::Convert(ConvertOp::TruncS { to: I64, from: F32 })
        }
        Operator::I64TruncF64S | Operator::I64TruncSatF64S => {
            Op::Convert(ConvertOp::TruncS { to: I64, from: F64 })
        }
        Operator::I64TruncF32U | Operator::I64TruncSatF32U => {
            Op::Convert(ConvertOp::TruncU { to: I64, from: F32 })
        }
        Operator::I64TruncF64U | Operator::I64TruncSatF64U => {
            Op::Convert(ConvertOp::TruncU { to: I64, from: F64 })
        }

        Operator::F32ConvertI32S => Op::Convert(ConvertOp::ConvertS { to: F32, from: I32 }),
        Operator::F32ConvertI32U => Op::Convert(ConvertOp::ConvertU { to: F32, from: I32 }),
        Operator::F32ConvertI64S => Op::Convert(ConvertOp::ConvertS { to: F32, from: I64 }),
        Operator::F32ConvertI64U => Op::Convert(ConvertOp::ConvertU { to: F32, from: I64 }),
        Operator::F64ConvertI32S => Op::Convert(ConvertOp::ConvertS { to: F64, from: I32 }),
        Operator::F64ConvertI32U => Op::Convert(ConvertOp::ConvertU { to: F64, from: I32 }),
        Operator::F64ConvertI64S => Op::Convert(ConvertOp::ConvertS { to: F64, from: I64 }),
        Operator::F64ConvertI64U => Op::Convert(ConvertOp::ConvertU { to: F64, from: I64 }),
        Operator::F32DemoteF64 => Op::Convert(ConvertOp::F32DemoteF64),
        Operator::F64PromoteF32 => Op::Convert(ConvertOp::F64PromoteF32),

        Operator::I32ReinterpretF32 => Op::Convert(ConvertOp::Reinterpret { to: I32 }),
        Operator::I64ReinterpretF64 => Op::Convert(ConvertOp::Reinterpret { to: I64 }),
        Operator::F32ReinterpretI32 => Op::Convert(ConvertOp::Reinterpret { to: F32 }),
        Operator::F64ReinterpretI64 => Op::Convert(ConvertOp::Reinterpret { to: F64 }),

        other => unsupported(&other),
    };
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sat_truncations_share_saturating_conversion() {
        assert_eq!(
            convert(Operator::I32TruncSatF64S).unwrap(),
            convert(Operator::I32TruncF64S).unwrap()
        );
    }

    #[test]
    fn unsupported_keeps_mnemonic() {
        assert_eq!(
            convert(Operator::MemoryFill { mem: 0 }).unwrap(),
            Op::Unsupported("MemoryFill".into())
        );
        assert_eq!(
            convert(Operator::RefIsNull).unwrap(),
            Op::Unsupported("RefIsNull".into())
        );
    }

    #[test]
    fn block_types() {
        assert_eq!(
            block_type(wasmparser::BlockType::Empty).unwrap(),
            BlockType::Empty
        );
        assert!(block_type(wasmparser::BlockType::FuncType(0)).is_err());
    }
}
