//! `wasm2lua-runtime`: Lua runtime shipped with every translated module.
//!
//! This crate provides:
//! - [`PRELUDE`]: the Lua source of the runtime, emitted once at the top of
//!   every translated program
//! - [`names`]: the global helper names the prelude defines, shared with the
//!   code generator so the two never drift apart
//! - [`ops`]: a Rust reference model of every numeric helper, used to check
//!   the Lua implementation and to split 64-bit constants

pub mod ops;

/// Lua source of the runtime prelude.
pub const PRELUDE: &str = include_str!("prelude.lua");

/// Global names defined by [`PRELUDE`] and referenced by generated code.
pub mod names {
    pub const MODULES: &str = "__MODULES__";
    pub const EXPORTS: &str = "__EXPORTS__";
    pub const GLOBALS: &str = "__GLOBALS__";
    pub const SETJMP_STATES: &str = "__SETJMP_STATES__";

    pub const UNSIGNED: &str = "__UNSIGNED__";
    pub const MULTIPLY_CORRECT: &str = "__MULTIPLY_CORRECT__";
    pub const DIVIDE_S: &str = "__DIVIDE_S__";
    pub const DIVIDE_U: &str = "__DIVIDE_U__";
    pub const MODULO_S: &str = "__MODULO_S__";
    pub const MODULO_U: &str = "__MODULO_U__";
    pub const CLZ: &str = "__CLZ__";
    pub const CTZ: &str = "__CTZ__";
    pub const POPCNT: &str = "__POPCNT__";
    pub const FLOAT: &str = "__FLOAT__";
    pub const TRUNC_S32: &str = "__TRUNC_S32__";
    pub const TRUNC_U32: &str = "__TRUNC_U32__";

    pub const LONG_INT: &str = "__LONG_INT__";
    pub const LONG_INT_N: &str = "__LONG_INT_N__";
    pub const LONG_INT_UN: &str = "__LONG_INT_UN__";

    pub const REINTERPRET_F32: &str = "__REINTERPRET_F32__";
    pub const REINTERPRET_I32: &str = "__REINTERPRET_I32__";
    pub const REINTERPRET_I64: &str = "__REINTERPRET_I64__";

    pub const MEMORY_ALLOC: &str = "__MEMORY_ALLOC__";
    pub const MEMORY_GROW: &str = "__MEMORY_GROW__";
    pub const MEMORY_INIT: &str = "__MEMORY_INIT__";
    pub const MEMORY_READ_8: &str = "__MEMORY_READ_8__";
    pub const MEMORY_READ_16: &str = "__MEMORY_READ_16__";
    pub const MEMORY_READ_32: &str = "__MEMORY_READ_32__";
    pub const MEMORY_READ_32F: &str = "__MEMORY_READ_32F__";
    pub const MEMORY_READ_64F: &str = "__MEMORY_READ_64F__";
    pub const MEMORY_WRITE_8: &str = "__MEMORY_WRITE_8__";
    pub const MEMORY_WRITE_16: &str = "__MEMORY_WRITE_16__";
    pub const MEMORY_WRITE_32: &str = "__MEMORY_WRITE_32__";
    pub const MEMORY_WRITE_32F: &str = "__MEMORY_WRITE_32F__";
    pub const MEMORY_WRITE_64F: &str = "__MEMORY_WRITE_64F__";

    pub const TABLE_INIT: &str = "__TABLE_INIT__";

    /// Every global the prelude claims. Translated identifiers must avoid these.
    pub const ALL: &[&str] = &[
        MODULES,
        EXPORTS,
        GLOBALS,
        SETJMP_STATES,
        UNSIGNED,
        MULTIPLY_CORRECT,
        DIVIDE_S,
        DIVIDE_U,
        MODULO_S,
        MODULO_U,
        CLZ,
        CTZ,
        POPCNT,
        FLOAT,
        TRUNC_S32,
        TRUNC_U32,
        LONG_INT,
        LONG_INT_N,
        LONG_INT_UN,
        REINTERPRET_F32,
        REINTERPRET_I32,
        REINTERPRET_I64,
        MEMORY_ALLOC,
        MEMORY_GROW,
        MEMORY_INIT,
        MEMORY_READ_8,
        MEMORY_READ_16,
        MEMORY_READ_32,
        MEMORY_READ_32F,
        MEMORY_READ_64F,
        MEMORY_WRITE_8,
        MEMORY_WRITE_16,
        MEMORY_WRITE_32,
        MEMORY_WRITE_32F,
        MEMORY_WRITE_64F,
        TABLE_INIT,
    ];
}

/// Traps raised by the runtime. The Lua `error(...)` strings are the
/// [`Trap::message`] of each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// Integer division or remainder by zero.
    DivideByZero,
    /// Signed division overflow (`MIN / -1`).
    IntegerOverflow,
    /// `unreachable` executed.
    Unreachable,
    /// Load or store outside the current memory size.
    OutOfBounds,
}

impl Trap {
    /// The exact message the Lua prelude passes to `error`.
    pub fn message(self) -> &'static str {
        match self {
            Trap::DivideByZero => "integer divide by zero",
            Trap::IntegerOverflow => "integer overflow",
            Trap::Unreachable => "unreachable",
            Trap::OutOfBounds => "out of bounds memory access",
        }
    }
}

/// Result type for the reference model.
pub type TrapResult<T> = Result<T, Trap>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_defines_every_name() {
        // __EXPORTS__ is a per-module local, declared by each module region
        for name in names::ALL.iter().filter(|n| **n != names::EXPORTS) {
            let defined = PRELUDE.contains(&format!("function {name}("))
                || PRELUDE.contains(&format!("{name} = "));
            assert!(defined, "prelude does not define {name}");
        }
    }

    #[test]
    fn prelude_raises_trap_messages() {
        for trap in [
            Trap::DivideByZero,
            Trap::IntegerOverflow,
            Trap::OutOfBounds,
        ] {
            assert!(
                PRELUDE.contains(&format!("error(\"{}\")", trap.message())),
                "prelude never raises {:?}",
                trap
            );
        }
    }

    #[test]
    fn trap_is_copy() {
        let trap = Trap::Unreachable;
        let copy = trap;
        assert_eq!(trap, copy);
    }
}
