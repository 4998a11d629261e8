//! wasm2lua: WebAssembly to Lua translator.
//!
//! The pipeline decodes a binary into the [`ast`] tree, translates every
//! function body through the three passes in [`translate`], and assembles
//! the result into one Lua chunk with [`codegen`]. The output targets LuaJIT
//! (or Lua 5.2+ with a `bit` module) and expects nothing beyond the prelude
//! it carries.

pub mod ast;
pub mod backend;
pub mod codegen;
pub mod parser;
pub mod translate;

pub use anyhow::{Context, Result};
pub use translate::{Rejected, RegisterStrategy, NEGATIVE_POP};

use ast::Module;
use backend::PureLuaBackend;
use codegen::CodeGenerator;
use parser::parse_wasm;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Feature toggles accepted by `--compile-flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompileFlag {
    /// Exact 32-bit multiply instead of the double-precision shortcut.
    CorrectMultiply,
    /// Comment every register allocation and release.
    DebugRegisters,
    /// Comment every operand-stack push and pop.
    DebugStack,
    /// Comment the mnemonic of every translated instruction.
    DebugInstructions,
}

impl CompileFlag {
    pub fn name(self) -> &'static str {
        match self {
            CompileFlag::CorrectMultiply => "correct-multiply",
            CompileFlag::DebugRegisters => "debug-registers",
            CompileFlag::DebugStack => "debug-stack",
            CompileFlag::DebugInstructions => "debug-instructions",
        }
    }
}

impl FromStr for CompileFlag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "correct-multiply" => Ok(CompileFlag::CorrectMultiply),
            "debug-registers" => Ok(CompileFlag::DebugRegisters),
            "debug-stack" => Ok(CompileFlag::DebugStack),
            "debug-instructions" => Ok(CompileFlag::DebugInstructions),
            other => anyhow::bail!("unknown compile flag: {other}"),
        }
    }
}

impl fmt::Display for CompileFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration options for translation
#[derive(Debug, Clone)]
pub struct TranspileOptions {
    /// Function names to keep; every other body is replaced by a stub.
    pub whitelist: Option<BTreeSet<String>>,
    pub compile_flags: BTreeSet<CompileFlag>,
    /// Branch tables with more targets than this are lowered to a bisecting
    /// `if` tree instead of a linear chain.
    pub jmp_stream_threshold: Option<usize>,
    pub register_strategy: RegisterStrategy,
    /// Branch tables with more targets, counting the default, are rejected.
    pub br_table_limit: usize,
    /// Functions with more instructions are rejected.
    pub max_function_instructions: usize,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            whitelist: None,
            compile_flags: BTreeSet::new(),
            jmp_stream_threshold: None,
            register_strategy: RegisterStrategy::default(),
            br_table_limit: 1000,
            max_function_instructions: 1_000_000,
        }
    }
}

impl TranspileOptions {
    pub fn has_flag(&self, flag: CompileFlag) -> bool {
        self.compile_flags.contains(&flag)
    }

    pub(crate) fn debug_flags(&self) -> translate::state::DebugFlags {
        translate::state::DebugFlags {
            registers: self.has_flag(CompileFlag::DebugRegisters),
            stack: self.has_flag(CompileFlag::DebugStack),
            instructions: self.has_flag(CompileFlag::DebugInstructions),
        }
    }
}

/// Translate a WebAssembly binary to Lua source.
///
/// # Example
/// ```no_run
/// use wasm2lua::{transpile, TranspileOptions};
///
/// let wasm_bytes = std::fs::read("input.wasm").unwrap();
/// let options = TranspileOptions::default();
/// let lua = transpile(&wasm_bytes, &options).unwrap();
/// std::fs::write("output.lua", lua).unwrap();
/// ```
pub fn transpile(wasm_bytes: &[u8], options: &TranspileOptions) -> Result<String> {
    let module = parse_wasm(wasm_bytes).context("failed to parse WebAssembly module")?;
    transpile_module(&module, options)
}

/// Translate an already decoded module.
pub fn transpile_module(module: &Module, options: &TranspileOptions) -> Result<String> {
    let backend = PureLuaBackend::new(options.has_flag(CompileFlag::CorrectMultiply));
    CodeGenerator::new(&backend, options)
        .generate_module(module)
        .context("failed to generate Lua code")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_flags_parse_kebab_case() {
        for flag in [
            CompileFlag::CorrectMultiply,
            CompileFlag::DebugRegisters,
            CompileFlag::DebugStack,
            CompileFlag::DebugInstructions,
        ] {
            assert_eq!(flag.to_string().parse::<CompileFlag>().unwrap(), flag);
        }
        assert!("fast-math".parse::<CompileFlag>().is_err());
    }

    #[test]
    fn debug_flags_follow_compile_flags() {
        let options = TranspileOptions {
            compile_flags: BTreeSet::from([CompileFlag::DebugStack]),
            ..Default::default()
        };
        let debug = options.debug_flags();
        assert!(debug.stack);
        assert!(!debug.registers);
        assert!(!options.has_flag(CompileFlag::CorrectMultiply));
    }
}
