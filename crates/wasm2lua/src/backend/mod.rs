//! Lua emission backends.
//!
//! The translator decides *where* values live (registers, stack slots,
//! labels); a backend decides *how* each operation is spelled in Lua. Every
//! method returns either an expression or a list of statements. A `None`
//! return means the backend has no lowering for that opcode/type pair, and
//! the caller emits a runtime `error()` in its place.

mod pure_lua;
pub use pure_lua::PureLuaBackend;

use crate::ast::{AccessWidth, BinaryOp, CmpOp, ConvertOp, UnaryOp, Value, WasmType};

/// Result of lowering a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    /// Source and target share a Lua representation; the operand is reused.
    Elided,
    Expr(String),
}

pub trait Backend {
    /// Runtime helper library emitted once at the top of every module.
    fn prelude(&self) -> &'static str;

    /// Literal text for a constant.
    fn constant(&self, value: Value) -> String;

    /// Literal zero of the given type, for forced local initialization.
    fn zero(&self, ty: WasmType) -> String;

    fn binary(&self, ty: WasmType, op: BinaryOp, lhs: &str, rhs: &str) -> Option<String>;

    /// Comparison producing an i32 0/1.
    fn compare(&self, ty: WasmType, op: CmpOp, lhs: &str, rhs: &str) -> Option<String>;

    fn eqz(&self, ty: WasmType, operand: &str) -> Option<String>;

    fn unary(&self, ty: WasmType, op: UnaryOp, operand: &str) -> Option<String>;

    fn convert(&self, op: ConvertOp, operand: &str) -> Conversion;

    /// Statements loading into `dest`.
    fn load(
        &self,
        dest: &str,
        ty: WasmType,
        width: AccessWidth,
        signed: bool,
        memory: &str,
        address: &str,
    ) -> Option<Vec<String>>;

    fn store(
        &self,
        ty: WasmType,
        width: AccessWidth,
        memory: &str,
        address: &str,
        value: &str,
    ) -> Option<String>;

    /// `memory.size` in pages.
    fn memory_size(&self, memory: &str) -> String;

    /// `memory.grow`, yielding the old page count or -1.
    fn memory_grow(&self, memory: &str, delta: &str) -> String;

    /// Storage location of a global slot.
    fn global(&self, slot: usize) -> String;
}
