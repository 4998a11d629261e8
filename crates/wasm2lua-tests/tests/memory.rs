//! Execution tests for linear memory.

use anyhow::Result;
use wasm2lua_runtime::Trap;
use wasm2lua_tests::{Arg, LuaRunner};

const MEMORY: &str = r#"(module
    (memory 1 2)
    (data (i32.const 16) "\01\02\03\04\ff")
    (func (export "load32") (param i32) (result i32)
        (i32.load (local.get 0)))
    (func (export "load8_s") (param i32) (result i32)
        (i32.load8_s (local.get 0)))
    (func (export "load8_u") (param i32) (result i32)
        (i32.load8_u (local.get 0)))
    (func (export "roundtrip") (param i32 i32) (result i32)
        (i32.store offset=4 (local.get 0) (local.get 1))
        (i32.load offset=4 (local.get 0)))
    (func (export "roundtrip64") (param i32 i64) (result i64)
        (i64.store (local.get 0) (local.get 1))
        (i64.load (local.get 0)))
    (func (export "grow") (param i32) (result i32)
        (memory.grow (local.get 0)))
    (func (export "size") (result i32)
        memory.size))"#;

#[test]
fn test_data_segment_is_little_endian() -> Result<()> {
    let lua = LuaRunner::new();
    let got = lua.call(MEMORY, "load32", &[Arg::I32(16)])?.i32()?;
    assert_eq!(got, i32::from_le_bytes([1, 2, 3, 4]));
    assert_eq!(lua.call(MEMORY, "load8_s", &[Arg::I32(20)])?.i32()?, -1);
    assert_eq!(lua.call(MEMORY, "load8_u", &[Arg::I32(20)])?.i32()?, 255);
    Ok(())
}

#[test]
fn test_store_then_load() -> Result<()> {
    let lua = LuaRunner::new();
    for value in [0, -1, 0x1234_5678, i32::MIN] {
        let got = lua
            .call(MEMORY, "roundtrip", &[Arg::I32(100), Arg::I32(value)])?
            .i32()?;
        assert_eq!(got, value);
    }
    let value = -0x0123_4567_89ab_cdef_i64;
    let got = lua
        .call(MEMORY, "roundtrip64", &[Arg::I32(200), Arg::I64(value)])?
        .i64()?;
    assert_eq!(got, value);
    Ok(())
}

#[test]
fn test_out_of_bounds_traps() -> Result<()> {
    let lua = LuaRunner::new();
    let outcome = lua.call(MEMORY, "load32", &[Arg::I32(65534)])?;
    assert!(outcome.is_trap(Trap::OutOfBounds.message()));
    Ok(())
}

#[test]
fn test_grow_respects_maximum() -> Result<()> {
    let lua = LuaRunner::new();
    assert_eq!(lua.call(MEMORY, "size", &[])?.i32()?, 1);
    assert_eq!(lua.call(MEMORY, "grow", &[Arg::I32(1)])?.i32()?, 1);
    assert_eq!(lua.call(MEMORY, "grow", &[Arg::I32(5)])?.i32()?, -1);
    Ok(())
}

const F32_BITS: &str = r#"(module
    (memory 1)
    (func (export "bits") (param f64) (result i32)
        (i32.reinterpret_f32 (f32.demote_f64 (local.get 0))))
    (func (export "stored") (param f64) (result i32)
        (f32.store (i32.const 8) (f32.demote_f64 (local.get 0)))
        (i32.load (i32.const 8))))"#;

#[test]
fn test_f32_encoding_rounds_ties_to_even() -> Result<()> {
    let lua = LuaRunner::new();
    let tiny = 2f64.powi(-149);
    for value in [
        2.5 * tiny,
        3.5 * tiny,
        1.5 * tiny,
        1.0 + 2f64.powi(-24),
        1.0 + 3.0 * 2f64.powi(-24),
        -0.75,
        1.0e-40,
    ] {
        let expected = (value as f32).to_bits() as i32;
        assert_eq!(lua.call(F32_BITS, "bits", &[Arg::F64(value)])?.i32()?, expected, "{value:e}");
        assert_eq!(lua.call(F32_BITS, "stored", &[Arg::F64(value)])?.i32()?, expected, "{value:e}");
    }
    Ok(())
}
