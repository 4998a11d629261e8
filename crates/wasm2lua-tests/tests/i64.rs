//! Execution tests for 64-bit integers, carried as `{low, high}` pairs.

use anyhow::Result;
use wasm2lua_runtime::ops::{self, LongInt};
use wasm2lua_runtime::Trap;
use wasm2lua_tests::{Arg, LuaRunner};

fn binary(op: &str) -> String {
    format!(
        r#"(module
            (func (export "op") (param i64 i64) (result i64)
                local.get 0
                local.get 1
                {op}))"#
    )
}

fn long(value: i64) -> LongInt {
    LongInt::from(value)
}

#[test]
fn test_add_carries_between_halves() -> Result<()> {
    let lua = LuaRunner::new();
    let wat = binary("i64.add");
    for (a, b) in [(0xffff_ffff, 1), (i64::MAX, 1), (-1, -1), (1 << 40, 1 << 40)] {
        let got = lua.call(&wat, "op", &[Arg::I64(a), Arg::I64(b)])?.i64()?;
        assert_eq!(got, i64::from(ops::long_add(long(a), long(b))), "{a} + {b}");
        assert_eq!(got, a.wrapping_add(b));
    }
    Ok(())
}

#[test]
fn test_mul_and_shifts() -> Result<()> {
    let lua = LuaRunner::new();
    let pairs = [(123_456_789_012, 98_765), (-5, 1 << 33), (i64::MIN, -1)];
    for (a, b) in pairs {
        let args = [Arg::I64(a), Arg::I64(b)];
        assert_eq!(
            lua.call(&binary("i64.mul"), "op", &args)?.i64()?,
            i64::from(ops::long_mul(long(a), long(b)))
        );
    }
    for (a, b) in [(1, 63), (-1, 4), (0x1234_5678_9abc_def0, 36)] {
        let args = [Arg::I64(a), Arg::I64(b)];
        assert_eq!(
            lua.call(&binary("i64.shl"), "op", &args)?.i64()?,
            i64::from(ops::long_shl(long(a), long(b)))
        );
        assert_eq!(
            lua.call(&binary("i64.shr_u"), "op", &args)?.i64()?,
            i64::from(ops::long_shr_u(long(a), long(b)))
        );
        assert_eq!(
            lua.call(&binary("i64.rotl"), "op", &args)?.i64()?,
            i64::from(ops::long_rotl(long(a), long(b)))
        );
    }
    Ok(())
}

#[test]
fn test_division() -> Result<()> {
    let lua = LuaRunner::new();
    let wat = binary("i64.div_s");
    let got = lua
        .call(&wat, "op", &[Arg::I64(-1_000_000_000_000), Arg::I64(7)])?
        .i64()?;
    assert_eq!(
        got,
        i64::from(ops::long_div_s(long(-1_000_000_000_000), long(7)).unwrap())
    );
    assert!(lua
        .call(&wat, "op", &[Arg::I64(5), Arg::I64(0)])?
        .is_trap(Trap::DivideByZero.message()));
    Ok(())
}

#[test]
fn test_compare_and_wrap() -> Result<()> {
    let lua = LuaRunner::new();
    let wat = r#"(module
        (func (export "lt_u") (param i64 i64) (result i32)
            local.get 0
            local.get 1
            i64.lt_u)
        (func (export "wrap") (param i64) (result i32)
            local.get 0
            i32.wrap_i64)
        (func (export "extend") (param i32) (result i64)
            local.get 0
            i64.extend_i32_s))"#;
    let args = [Arg::I64(-1), Arg::I64(1)];
    assert_eq!(
        lua.call(wat, "lt_u", &args)?.i32()?,
        ops::long_lt_u(long(-1), long(1))
    );
    let value = 0x1_2345_6789_i64;
    assert_eq!(
        lua.call(wat, "wrap", &[Arg::I64(value)])?.i32()?,
        ops::wrap(long(value))
    );
    assert_eq!(
        lua.call(wat, "extend", &[Arg::I32(-2)])?.i64()?,
        i64::from(ops::extend_i32_s(-2))
    );
    Ok(())
}
