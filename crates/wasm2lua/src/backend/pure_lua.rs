//! Backend targeting LuaJIT with the `bit` library.
//!
//! i32 values are Lua numbers normalized with `bit.tobit`; i64 values are
//! `{low, high}` tables built by `__LONG_INT__` and operated on through
//! methods; floats are plain Lua numbers.

use super::{Backend, Conversion};
use crate::ast::{AccessWidth, BinaryOp, CmpOp, ConvertOp, UnaryOp, Value, WasmType};
use crate::codegen::utils::{lua_float, lua_int};
use wasm2lua_runtime::names;
use wasm2lua_runtime::ops::LongInt;

/// The default backend.
#[derive(Debug, Clone, Default)]
pub struct PureLuaBackend {
    /// Route i32 multiplication through the exact helper instead of
    /// `bit.tobit(a * b)`, which loses bits once the product exceeds 2^53.
    pub correct_multiply: bool,
}

impl PureLuaBackend {
    pub fn new(correct_multiply: bool) -> Self {
        Self { correct_multiply }
    }
}

fn call(helper: &str, args: &[&str]) -> String {
    format!("{}({})", helper, args.join(", "))
}

fn method(receiver: &str, name: &str, args: &[&str]) -> String {
    format!("({}):{}({})", receiver, name, args.join(", "))
}

fn boolean(condition: String) -> String {
    format!("({condition}) and 1 or 0")
}

fn sign_extend(value: &str, bits: u32) -> String {
    let shift = 32 - bits;
    format!("bit.arshift(bit.lshift({value}, {shift}), {shift})")
}

impl Backend for PureLuaBackend {
    fn prelude(&self) -> &'static str {
        wasm2lua_runtime::PRELUDE
    }

    fn constant(&self, value: Value) -> String {
        match value {
            Value::I32(v) => lua_int(v as i64),
            Value::I64(v) => {
                let parts = LongInt::from(v);
                call(
                    names::LONG_INT,
                    &[&parts.low.to_string(), &parts.high.to_string()],
                )
            }
            Value::F32(bits) => lua_float(f32::from_bits(bits) as f64),
            Value::F64(bits) => lua_float(f64::from_bits(bits)),
        }
    }

    fn zero(&self, ty: WasmType) -> String {
        match ty {
            WasmType::I64 => call(names::LONG_INT, &["0", "0"]),
            _ => "0".to_string(),
        }
    }

    fn binary(&self, ty: WasmType, op: BinaryOp, lhs: &str, rhs: &str) -> Option<String> {
        use BinaryOp::*;
        let text = match ty {
            WasmType::I32 => match op {
                Add => format!("bit.tobit({lhs} + {rhs})"),
                Sub => format!("bit.tobit({lhs} - {rhs})"),
                Mul if self.correct_multiply => call(names::MULTIPLY_CORRECT, &[lhs, rhs]),
                Mul => format!("bit.tobit({lhs} * {rhs})"),
                DivS => call(names::DIVIDE_S, &[lhs, rhs]),
                DivU => call(names::DIVIDE_U, &[lhs, rhs]),
                RemS => call(names::MODULO_S, &[lhs, rhs]),
                RemU => call(names::MODULO_U, &[lhs, rhs]),
                And => call("bit.band", &[lhs, rhs]),
                Or => call("bit.bor", &[lhs, rhs]),
                Xor => call("bit.bxor", &[lhs, rhs]),
                Shl => call("bit.lshift", &[lhs, rhs]),
                ShrS => call("bit.arshift", &[lhs, rhs]),
                ShrU => call("bit.rshift", &[lhs, rhs]),
                Rotl => call("bit.rol", &[lhs, rhs]),
                Rotr => call("bit.ror", &[lhs, rhs]),
                Div | Min | Max | Copysign => return None,
            },
            WasmType::I64 => {
                let name = match op {
                    Add => "_add",
                    Sub => "_sub",
                    Mul => "_mul",
                    DivS => "_div_s",
                    DivU => "_div_u",
                    RemS => "_rem_s",
                    RemU => "_rem_u",
                    And => "_and",
                    Or => "_or",
                    Xor => "_xor",
                    Shl => "_shl",
                    ShrS => "_shr_s",
                    ShrU => "_shr_u",
                    Rotl => "_rotl",
                    Rotr => "_rotr",
                    Div | Min | Max | Copysign => return None,
                };
                method(lhs, name, &[rhs])
            }
            WasmType::F32 | WasmType::F64 => match op {
                Add => format!("({lhs} + {rhs})"),
                Sub => format!("({lhs} - {rhs})"),
                Mul => format!("({lhs} * {rhs})"),
                Div => format!("({lhs} / {rhs})"),
                Min => call(&format!("{}.min", names::FLOAT), &[lhs, rhs]),
                Max => call(&format!("{}.max", names::FLOAT), &[lhs, rhs]),
                Copysign => call(&format!("{}.copysign", names::FLOAT), &[lhs, rhs]),
                _ => return None,
            },
        };
        Some(text)
    }

    fn compare(&self, ty: WasmType, op: CmpOp, lhs: &str, rhs: &str) -> Option<String> {
        use CmpOp::*;
        let text = match ty {
            WasmType::I32 => {
                let (operator, unsigned) = match op {
                    Eq => ("==", false),
                    Ne => ("~=", false),
                    LtS => ("<", false),
                    GtS => (">", false),
                    LeS => ("<=", false),
                    GeS => (">=", false),
                    LtU => ("<", true),
                    GtU => (">", true),
                    LeU => ("<=", true),
                    GeU => (">=", true),
                    Lt | Gt | Le | Ge => return None,
                };
                if unsigned {
                    boolean(format!(
                        "{} {operator} {}",
                        call(names::UNSIGNED, &[lhs]),
                        call(names::UNSIGNED, &[rhs])
                    ))
                } else {
                    boolean(format!("{lhs} {operator} {rhs}"))
                }
            }
            WasmType::I64 => {
                let name = match op {
                    Eq => "_eq",
                    Ne => "_ne",
                    LtS => "_lt_s",
                    LtU => "_lt_u",
                    GtS => "_gt_s",
                    GtU => "_gt_u",
                    LeS => "_le_s",
                    LeU => "_le_u",
                    GeS => "_ge_s",
                    GeU => "_ge_u",
                    Lt | Gt | Le | Ge => return None,
                };
                method(lhs, name, &[rhs])
            }
            WasmType::F32 | WasmType::F64 => {
                let operator = match op {
                    Eq => "==",
                    Ne => "~=",
                    Lt => "<",
                    Gt => ">",
                    Le => "<=",
                    Ge => ">=",
                    _ => return None,
                };
                boolean(format!("{lhs} {operator} {rhs}"))
            }
        };
        Some(text)
    }

    fn eqz(&self, ty: WasmType, operand: &str) -> Option<String> {
        match ty {
            WasmType::I32 => Some(boolean(format!("{operand} == 0"))),
            WasmType::I64 => Some(method(operand, "_eqz", &[])),
            WasmType::F32 | WasmType::F64 => None,
        }
    }

    fn unary(&self, ty: WasmType, op: UnaryOp, operand: &str) -> Option<String> {
        use UnaryOp::*;
        let text = match ty {
            WasmType::I32 => match op {
                Clz => call(names::CLZ, &[operand]),
                Ctz => call(names::CTZ, &[operand]),
                Popcnt => call(names::POPCNT, &[operand]),
                Extend8S => sign_extend(operand, 8),
                Extend16S => sign_extend(operand, 16),
                _ => return None,
            },
            WasmType::I64 => {
                let name = match op {
                    Clz => "_clz",
                    Ctz => "_ctz",
                    Popcnt => "_popcnt",
                    Extend8S => "_extend8_s",
                    Extend16S => "_extend16_s",
                    Extend32S => "_extend32_s",
                    _ => return None,
                };
                method(operand, name, &[])
            }
            WasmType::F32 | WasmType::F64 => match op {
                Abs => call("math.abs", &[operand]),
                Neg => format!("(-{operand})"),
                Sqrt => call("math.sqrt", &[operand]),
                Ceil => call("math.ceil", &[operand]),
                Floor => call("math.floor", &[operand]),
                Trunc => call(&format!("{}.truncate", names::FLOAT), &[operand]),
                Nearest => call(&format!("{}.nearest", names::FLOAT), &[operand]),
                _ => return None,
            },
        };
        Some(text)
    }

    fn convert(&self, op: ConvertOp, operand: &str) -> Conversion {
        use ConvertOp::*;
        let text = match op {
            I32WrapI64 => format!("({operand})[1]"),
            I64ExtendI32S => call(
                names::LONG_INT,
                &[operand, &format!("bit.arshift({operand}, 31)")],
            ),
            I64ExtendI32U => call(names::LONG_INT, &[operand, "0"]),
            TruncS { to: WasmType::I64, .. } => call(names::LONG_INT_N, &[operand]),
            TruncU { to: WasmType::I64, .. } => call(names::LONG_INT_UN, &[operand]),
            TruncS { .. } => call(names::TRUNC_S32, &[operand]),
            TruncU { .. } => call(names::TRUNC_U32, &[operand]),
            ConvertS { from: WasmType::I64, .. } => method(operand, "_convert_s", &[]),
            ConvertU { from: WasmType::I64, .. } => method(operand, "_convert_u", &[]),
            ConvertS { .. } => return Conversion::Elided,
            ConvertU { .. } => call(names::UNSIGNED, &[operand]),
            F32DemoteF64 | F64PromoteF32 => return Conversion::Elided,
            Reinterpret { to: WasmType::I32 } => call(names::REINTERPRET_I32, &[operand]),
            Reinterpret { to: WasmType::I64 } => call(names::REINTERPRET_I64, &[operand]),
            Reinterpret { to: WasmType::F32 } => call(names::REINTERPRET_F32, &[operand]),
            Reinterpret { to: WasmType::F64 } => method(operand, "_reinterpret_f64", &[]),
        };
        Conversion::Expr(text)
    }

    fn load(
        &self,
        dest: &str,
        ty: WasmType,
        width: AccessWidth,
        signed: bool,
        memory: &str,
        address: &str,
    ) -> Option<Vec<String>> {
        let read = |helper: &str| format!("{dest} = {};", call(helper, &[memory, address]));
        let narrow = |width: AccessWidth| -> Option<Vec<String>> {
            let mut lines = match width {
                AccessWidth::W8 => vec![read(names::MEMORY_READ_8)],
                AccessWidth::W16 => vec![read(names::MEMORY_READ_16)],
                AccessWidth::W32 => vec![read(names::MEMORY_READ_32)],
                AccessWidth::W64 => return None,
            };
            if signed && width.bits() < 32 {
                lines.push(format!("{dest} = {};", sign_extend(dest, width.bits())));
            }
            Some(lines)
        };
        match (ty, width) {
            (WasmType::I32, AccessWidth::W64) => None,
            (WasmType::I32, _) => narrow(width),
            (WasmType::I64, AccessWidth::W64) => Some(vec![
                format!("{dest} = {};", self.zero(WasmType::I64)),
                format!("{dest}:load({memory}, {address});"),
            ]),
            (WasmType::I64, _) => {
                let mut lines = narrow(width)?;
                let high = if signed {
                    format!("bit.arshift({dest}, 31)")
                } else {
                    "0".to_string()
                };
                lines.push(format!(
                    "{dest} = {};",
                    call(names::LONG_INT, &[dest, &high])
                ));
                Some(lines)
            }
            (WasmType::F32, AccessWidth::W32) => Some(vec![read(names::MEMORY_READ_32F)]),
            (WasmType::F64, AccessWidth::W64) => Some(vec![read(names::MEMORY_READ_64F)]),
            _ => None,
        }
    }

    fn store(
        &self,
        ty: WasmType,
        width: AccessWidth,
        memory: &str,
        address: &str,
        value: &str,
    ) -> Option<String> {
        let write = |helper: &str| format!("{};", call(helper, &[memory, address, value]));
        let text = match (ty, width) {
            (WasmType::I32, AccessWidth::W8) => write(names::MEMORY_WRITE_8),
            (WasmType::I32, AccessWidth::W16) => write(names::MEMORY_WRITE_16),
            (WasmType::I32, AccessWidth::W32) => write(names::MEMORY_WRITE_32),
            (WasmType::I64, AccessWidth::W8) => format!("{};", method(value, "store8", &[memory, address])),
            (WasmType::I64, AccessWidth::W16) => format!("{};", method(value, "store16", &[memory, address])),
            (WasmType::I64, AccessWidth::W32) => format!("{};", method(value, "store32", &[memory, address])),
            (WasmType::I64, AccessWidth::W64) => format!("{};", method(value, "store", &[memory, address])),
            (WasmType::F32, AccessWidth::W32) => write(names::MEMORY_WRITE_32F),
            (WasmType::F64, AccessWidth::W64) => write(names::MEMORY_WRITE_64F),
            _ => return None,
        };
        Some(text)
    }

    fn memory_size(&self, memory: &str) -> String {
        format!("{memory}._page_count")
    }

    fn memory_grow(&self, memory: &str, delta: &str) -> String {
        call(names::MEMORY_GROW, &[memory, &call(names::UNSIGNED, &[delta])])
    }

    fn global(&self, slot: usize) -> String {
        format!("{}[{}]", names::GLOBALS, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> PureLuaBackend {
        PureLuaBackend::default()
    }

    #[test]
    fn i32_arithmetic_wraps() {
        let b = backend();
        assert_eq!(
            b.binary(WasmType::I32, BinaryOp::Add, "reg0", "reg1").unwrap(),
            "bit.tobit(reg0 + reg1)"
        );
        assert_eq!(
            b.binary(WasmType::I32, BinaryOp::Mul, "reg0", "3").unwrap(),
            "bit.tobit(reg0 * 3)"
        );
        let exact = PureLuaBackend::new(true);
        assert_eq!(
            exact.binary(WasmType::I32, BinaryOp::Mul, "reg0", "3").unwrap(),
            "__MULTIPLY_CORRECT__(reg0, 3)"
        );
    }

    #[test]
    fn i64_uses_methods() {
        let b = backend();
        assert_eq!(
            b.binary(WasmType::I64, BinaryOp::Add, "reg0", "reg1").unwrap(),
            "(reg0):_add(reg1)"
        );
        assert_eq!(
            b.compare(WasmType::I64, CmpOp::LtU, "reg0", "reg1").unwrap(),
            "(reg0):_lt_u(reg1)"
        );
        assert_eq!(b.eqz(WasmType::I64, "reg2").unwrap(), "(reg2):_eqz()");
    }

    #[test]
    fn unsigned_compare_goes_through_helper() {
        let b = backend();
        assert_eq!(
            b.compare(WasmType::I32, CmpOp::GeU, "reg0", "reg1").unwrap(),
            "(__UNSIGNED__(reg0) >= __UNSIGNED__(reg1)) and 1 or 0"
        );
        assert_eq!(
            b.compare(WasmType::I32, CmpOp::Eq, "reg0", "0").unwrap(),
            "(reg0 == 0) and 1 or 0"
        );
    }

    #[test]
    fn mismatched_type_has_no_lowering() {
        let b = backend();
        assert!(b.binary(WasmType::I32, BinaryOp::Min, "a", "b").is_none());
        assert!(b.unary(WasmType::F64, UnaryOp::Clz, "a").is_none());
        assert!(b.compare(WasmType::F32, CmpOp::LtS, "a", "b").is_none());
        assert!(b.eqz(WasmType::F32, "a").is_none());
    }

    #[test]
    fn constants() {
        let b = backend();
        assert_eq!(b.constant(Value::I32(-7)), "(-7)");
        assert_eq!(b.constant(Value::I32(42)), "42");
        assert_eq!(b.constant(Value::I64(-1)), "__LONG_INT__(-1, -1)");
        assert_eq!(b.constant(Value::I64(1 << 32)), "__LONG_INT__(0, 1)");
        assert_eq!(b.constant(Value::F64(1.5f64.to_bits())), "1.5");
        assert_eq!(b.constant(Value::F32(f32::INFINITY.to_bits())), "math.huge");
        assert_eq!(b.zero(WasmType::I64), "__LONG_INT__(0, 0)");
        assert_eq!(b.zero(WasmType::F32), "0");
    }

    #[test]
    fn conversions() {
        let b = backend();
        assert_eq!(
            b.convert(ConvertOp::I32WrapI64, "reg0"),
            Conversion::Expr("(reg0)[1]".into())
        );
        assert_eq!(
            b.convert(ConvertOp::I64ExtendI32S, "reg0"),
            Conversion::Expr("__LONG_INT__(reg0, bit.arshift(reg0, 31))".into())
        );
        assert_eq!(
            b.convert(
                ConvertOp::ConvertS {
                    to: WasmType::F64,
                    from: WasmType::I32
                },
                "reg0"
            ),
            Conversion::Elided
        );
        assert_eq!(b.convert(ConvertOp::F64PromoteF32, "reg0"), Conversion::Elided);
        assert_eq!(
            b.convert(
                ConvertOp::TruncU {
                    to: WasmType::I64,
                    from: WasmType::F64
                },
                "reg0"
            ),
            Conversion::Expr("__LONG_INT_UN__(reg0)".into())
        );
    }

    #[test]
    fn narrow_signed_load_extends() {
        let b = backend();
        let lines = b
            .load("reg1", WasmType::I32, AccessWidth::W8, true, "mem_0", "reg0")
            .unwrap();
        assert_eq!(
            lines,
            vec![
                "reg1 = __MEMORY_READ_8__(mem_0, reg0);".to_string(),
                "reg1 = bit.arshift(bit.lshift(reg1, 24), 24);".to_string(),
            ]
        );
        let wide = b
            .load("reg1", WasmType::I64, AccessWidth::W32, false, "mem_0", "reg0")
            .unwrap();
        assert_eq!(wide.last().unwrap(), "reg1 = __LONG_INT__(reg1, 0);");
        assert!(b
            .load("reg1", WasmType::F32, AccessWidth::W8, false, "mem_0", "reg0")
            .is_none());
    }

    #[test]
    fn stores() {
        let b = backend();
        assert_eq!(
            b.store(WasmType::I32, AccessWidth::W16, "mem_0", "reg0 + 4", "reg1").unwrap(),
            "__MEMORY_WRITE_16__(mem_0, reg0 + 4, reg1);"
        );
        assert_eq!(
            b.store(WasmType::I64, AccessWidth::W8, "mem_0", "reg0", "reg1").unwrap(),
            "(reg1):store8(mem_0, reg0);"
        );
    }

    #[test]
    fn memory_ops() {
        let b = backend();
        assert_eq!(b.memory_size("mem_0"), "mem_0._page_count");
        assert_eq!(
            b.memory_grow("mem_0", "reg3"),
            "__MEMORY_GROW__(mem_0, __UNSIGNED__(reg3))"
        );
        assert_eq!(b.global(4), "__GLOBALS__[4]");
    }
}
