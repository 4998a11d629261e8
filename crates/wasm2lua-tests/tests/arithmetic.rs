//! Execution tests for 32-bit integer and float arithmetic.
//!
//! Each result is checked against the reference model in
//! `wasm2lua_runtime::ops`.

use anyhow::Result;
use std::collections::BTreeSet;
use wasm2lua::{CompileFlag, TranspileOptions};
use wasm2lua_runtime::{ops, Trap};
use wasm2lua_tests::{Arg, LuaRunner};

fn binary(op: &str) -> String {
    format!(
        r#"(module
            (func (export "op") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                {op}))"#
    )
}

fn unary(op: &str) -> String {
    format!(
        r#"(module
            (func (export "op") (param i32) (result i32)
                local.get 0
                {op}))"#
    )
}

#[test]
fn test_add_wrapping() -> Result<()> {
    let lua = LuaRunner::new();
    let wat = binary("i32.add");
    for (a, b) in [(2, 3), (i32::MAX, 1), (i32::MIN, -1), (-7, 7)] {
        let got = lua.call(&wat, "op", &[Arg::I32(a), Arg::I32(b)])?.i32()?;
        assert_eq!(got, ops::tobit(a as f64 + b as f64), "{a} + {b}");
        assert_eq!(got, a.wrapping_add(b));
    }
    Ok(())
}

#[test]
fn test_correct_multiply() -> Result<()> {
    let lua = LuaRunner::new();
    let options = TranspileOptions {
        compile_flags: BTreeSet::from([CompileFlag::CorrectMultiply]),
        ..Default::default()
    };
    let wat = binary("i32.mul");
    for (a, b) in [(6, 7), (0x7fff_ffff, 0x7fff_ffff), (-123_456_789, 987_654_321)] {
        let got = lua
            .call_with(&wat, &options, "op", &[Arg::I32(a), Arg::I32(b)])?
            .i32()?;
        assert_eq!(got, ops::multiply_correct(a, b), "{a} * {b}");
    }
    Ok(())
}

#[test]
fn test_division_traps() -> Result<()> {
    let lua = LuaRunner::new();
    let wat = binary("i32.div_s");
    assert_eq!(
        lua.call(&wat, "op", &[Arg::I32(-7), Arg::I32(2)])?.i32()?,
        ops::divide_s(-7, 2).unwrap()
    );
    assert!(lua
        .call(&wat, "op", &[Arg::I32(1), Arg::I32(0)])?
        .is_trap(Trap::DivideByZero.message()));
    assert_eq!(ops::divide_s(i32::MIN, -1), Err(Trap::IntegerOverflow));
    assert!(lua
        .call(&wat, "op", &[Arg::I32(i32::MIN), Arg::I32(-1)])?
        .is_trap(Trap::IntegerOverflow.message()));

    let rem = binary("i32.rem_s");
    assert_eq!(
        lua.call(&rem, "op", &[Arg::I32(i32::MIN), Arg::I32(-1)])?.i32()?,
        ops::modulo_s(i32::MIN, -1).unwrap()
    );
    let rem_u = binary("i32.rem_u");
    assert_eq!(
        lua.call(&rem_u, "op", &[Arg::I32(-1), Arg::I32(10)])?.i32()?,
        ops::modulo_u(-1, 10).unwrap()
    );
    Ok(())
}

#[test]
fn test_unsigned_compare() -> Result<()> {
    let lua = LuaRunner::new();
    let wat = binary("i32.lt_u");
    assert_eq!(lua.call(&wat, "op", &[Arg::I32(-1), Arg::I32(1)])?.i32()?, 0);
    assert_eq!(lua.call(&wat, "op", &[Arg::I32(1), Arg::I32(-1)])?.i32()?, 1);
    Ok(())
}

#[test]
fn test_bit_counting() -> Result<()> {
    let lua = LuaRunner::new();
    for value in [0, 1, -1, 0x0f00, i32::MIN] {
        let args = [Arg::I32(value)];
        assert_eq!(lua.call(&unary("i32.clz"), "op", &args)?.i32()?, ops::clz(value));
        assert_eq!(lua.call(&unary("i32.ctz"), "op", &args)?.i32()?, ops::ctz(value));
        assert_eq!(
            lua.call(&unary("i32.popcnt"), "op", &args)?.i32()?,
            ops::popcnt(value)
        );
        assert_eq!(
            lua.call(&unary("i32.extend8_s"), "op", &args)?.i32()?,
            ops::extend_s(value, 8)
        );
    }
    Ok(())
}

#[test]
fn test_float_rounding() -> Result<()> {
    let lua = LuaRunner::new();
    let wat = r#"(module
        (func (export "nearest") (param f64) (result f64)
            local.get 0
            f64.nearest)
        (func (export "trunc") (param f64) (result i32)
            local.get 0
            i32.trunc_f64_s))"#;
    for value in [0.5, 1.5, 2.5, -2.5, 3.7] {
        let got = lua.call(wat, "nearest", &[Arg::F64(value)])?.f64()?;
        assert_eq!(got, ops::nearest(value), "nearest({value})");
    }
    for value in [3.9, -3.9, 1e12, -1e12] {
        let got = lua.call(wat, "trunc", &[Arg::F64(value)])?.i32()?;
        assert_eq!(got, ops::trunc_s32(value), "trunc({value})");
    }
    Ok(())
}
