//! Reference model of the prelude's numeric helpers.
//!
//! Lua numbers are IEEE doubles, so the prelude represents an `i32` as a
//! double holding a signed 32-bit value and an `i64` as a pair of such halves
//! ([`LongInt`]). Each function here documents the Lua helper it models and
//! computes the result the helper must produce. The execution tests compare
//! the two.
//!
//! ## Float-to-integer truncation
//!
//! Truncation is **saturating**: NaN becomes 0 and out-of-range inputs clamp
//! to the nearest representable value. This matches Rust's `as` cast, so the
//! model is just the cast on the right width.
//!
//! ## Integer division / remainder
//!
//! Division by zero and signed `MIN / -1` trap. `MIN % -1` is 0, not a trap.

use crate::{Trap, TrapResult};

/// A 64-bit integer as the prelude stores it: `{low, high}` halves.
///
/// Lua: `__LONG_INT__(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LongInt {
    pub low: i32,
    pub high: i32,
}

impl LongInt {
    pub const ZERO: LongInt = LongInt { low: 0, high: 0 };

    pub fn new(low: i32, high: i32) -> Self {
        Self { low, high }
    }
}

impl From<i64> for LongInt {
    fn from(value: i64) -> Self {
        Self {
            low: value as i32,
            high: (value >> 32) as i32,
        }
    }
}

impl From<LongInt> for i64 {
    fn from(value: LongInt) -> Self {
        ((value.high as i64) << 32) | (value.low as u32 as i64)
    }
}

// ── 32-bit integers ──────────────────────────────────────────────────────────

/// Lua: `bit.tobit(x)`: wrap an integral double to a signed 32-bit value.
pub fn tobit(value: f64) -> i32 {
    value.rem_euclid(4294967296.0) as u32 as i32
}

/// Lua: `__UNSIGNED__(x)`: reinterpret a signed 32-bit value as unsigned.
pub fn unsigned(value: i32) -> f64 {
    value as u32 as f64
}

/// Lua: `bit.tobit(a * b)`, the default multiply. Exact only while the
/// product stays below 2^53.
pub fn multiply_fast(a: i32, b: i32) -> i32 {
    tobit(a as f64 * b as f64)
}

/// Lua: `__MULTIPLY_CORRECT__(a, b)`: exact wrapping multiply.
pub fn multiply_correct(a: i32, b: i32) -> i32 {
    a.wrapping_mul(b)
}

/// Lua: `__DIVIDE_S__(a, b)`.
pub fn divide_s(a: i32, b: i32) -> TrapResult<i32> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    a.checked_div(b).ok_or(Trap::IntegerOverflow)
}

/// Lua: `__DIVIDE_U__(a, b)`.
pub fn divide_u(a: i32, b: i32) -> TrapResult<i32> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    Ok(((a as u32) / (b as u32)) as i32)
}

/// Lua: `__MODULO_S__(a, b)`.
pub fn modulo_s(a: i32, b: i32) -> TrapResult<i32> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    Ok(a.wrapping_rem(b))
}

/// Lua: `__MODULO_U__(a, b)`.
pub fn modulo_u(a: i32, b: i32) -> TrapResult<i32> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    Ok(((a as u32) % (b as u32)) as i32)
}

/// Lua: `__CLZ__(x)`.
pub fn clz(value: i32) -> i32 {
    value.leading_zeros() as i32
}

/// Lua: `__CTZ__(x)`.
pub fn ctz(value: i32) -> i32 {
    value.trailing_zeros() as i32
}

/// Lua: `__POPCNT__(x)`.
pub fn popcnt(value: i32) -> i32 {
    value.count_ones() as i32
}

/// Lua: `bit.arshift(bit.lshift(x, 32 - bits), 32 - bits)`.
pub fn extend_s(value: i32, bits: u32) -> i32 {
    let shift = 32 - bits;
    (value << shift) >> shift
}

// ── floats ───────────────────────────────────────────────────────────────────

/// Lua: `__FLOAT__.truncate(x)`.
pub fn truncate(value: f64) -> f64 {
    value.trunc()
}

/// Lua: `__FLOAT__.nearest(x)`: round half to even, keeping the sign of zero.
pub fn nearest(value: f64) -> f64 {
    if !value.is_finite() || value.abs() >= 4503599627370496.0 {
        return value;
    }
    let rounded = value.round();
    let result = if (rounded - value).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded - value.signum()
    } else {
        rounded
    };
    if result == 0.0 && value.is_sign_negative() {
        -0.0
    } else {
        result
    }
}

/// Lua: `__FLOAT__.min(a, b)`: NaN propagates, `-0 < +0`.
pub fn float_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == 0.0 && b == 0.0 {
        return if a.is_sign_negative() { a } else { b };
    }
    a.min(b)
}

/// Lua: `__FLOAT__.max(a, b)`: NaN propagates, `+0 > -0`.
pub fn float_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == 0.0 && b == 0.0 {
        return if a.is_sign_positive() { a } else { b };
    }
    a.max(b)
}

/// Lua: `__FLOAT__.copysign(a, b)`.
pub fn copysign(a: f64, b: f64) -> f64 {
    a.copysign(b)
}

/// Lua: `__TRUNC_S32__(x)`.
pub fn trunc_s32(value: f64) -> i32 {
    value as i32
}

/// Lua: `__TRUNC_U32__(x)`, result reinterpreted as signed.
pub fn trunc_u32(value: f64) -> i32 {
    value as u32 as i32
}

/// Lua: `__LONG_INT_N__(x)`.
pub fn long_int_n(value: f64) -> LongInt {
    LongInt::from(value as i64)
}

/// Lua: `__LONG_INT_UN__(x)`.
pub fn long_int_un(value: f64) -> LongInt {
    LongInt::from(value as u64 as i64)
}

// ── 64-bit integers ──────────────────────────────────────────────────────────

/// Lua: `__LONG_INT__(x, bit.arshift(x, 31))`, i64.extend_i32_s.
pub fn extend_i32_s(value: i32) -> LongInt {
    LongInt::new(value, value >> 31)
}

/// Lua: `__LONG_INT__(x, 0)`, i64.extend_i32_u.
pub fn extend_i32_u(value: i32) -> LongInt {
    LongInt::new(value, 0)
}

/// Lua: `(x)[1]`, i32.wrap_i64.
pub fn wrap(value: LongInt) -> i32 {
    value.low
}

/// Lua: `(a):_add(b)`.
pub fn long_add(a: LongInt, b: LongInt) -> LongInt {
    LongInt::from(i64::from(a).wrapping_add(i64::from(b)))
}

/// Lua: `(a):_mul(b)`.
pub fn long_mul(a: LongInt, b: LongInt) -> LongInt {
    LongInt::from(i64::from(a).wrapping_mul(i64::from(b)))
}

/// Lua: `(a):_div_s(b)`.
pub fn long_div_s(a: LongInt, b: LongInt) -> TrapResult<LongInt> {
    let (a, b) = (i64::from(a), i64::from(b));
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    a.checked_div(b)
        .map(LongInt::from)
        .ok_or(Trap::IntegerOverflow)
}

/// Lua: `(a):_div_u(b)`.
pub fn long_div_u(a: LongInt, b: LongInt) -> TrapResult<LongInt> {
    let (a, b) = (i64::from(a) as u64, i64::from(b) as u64);
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    Ok(LongInt::from((a / b) as i64))
}

/// Lua: `(a):_rem_s(b)`.
pub fn long_rem_s(a: LongInt, b: LongInt) -> TrapResult<LongInt> {
    let (a, b) = (i64::from(a), i64::from(b));
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    Ok(LongInt::from(a.wrapping_rem(b)))
}

/// Lua: `(a):_shl(b)`; the count is taken modulo 64.
pub fn long_shl(a: LongInt, b: LongInt) -> LongInt {
    LongInt::from(i64::from(a).wrapping_shl(b.low as u32))
}

/// Lua: `(a):_shr_s(b)`.
pub fn long_shr_s(a: LongInt, b: LongInt) -> LongInt {
    LongInt::from(i64::from(a).wrapping_shr(b.low as u32))
}

/// Lua: `(a):_shr_u(b)`.
pub fn long_shr_u(a: LongInt, b: LongInt) -> LongInt {
    LongInt::from((i64::from(a) as u64).wrapping_shr(b.low as u32) as i64)
}

/// Lua: `(a):_rotl(b)`.
pub fn long_rotl(a: LongInt, b: LongInt) -> LongInt {
    LongInt::from(i64::from(a).rotate_left(b.low as u32 & 63))
}

/// Lua: `(a):_lt_u(b)`, as 0/1.
pub fn long_lt_u(a: LongInt, b: LongInt) -> i32 {
    ((i64::from(a) as u64) < (i64::from(b) as u64)) as i32
}

/// Lua: `(a):_lt_s(b)`, as 0/1.
pub fn long_lt_s(a: LongInt, b: LongInt) -> i32 {
    (i64::from(a) < i64::from(b)) as i32
}

/// Lua: `(x):_convert_s()`, f64.convert_i64_s.
pub fn long_convert_s(value: LongInt) -> f64 {
    i64::from(value) as f64
}

/// Lua: `(x):_convert_u()`, f64.convert_i64_u.
pub fn long_convert_u(value: LongInt) -> f64 {
    i64::from(value) as u64 as f64
}
