//! Module emission: assembles translated functions into one Lua chunk.
//!
//! # Overview
//!
//! The emitter walks the decoded [`Module`] several times, once per phase,
//! so the output order is fixed regardless of section order in the binary:
//!
//! ```text
//!   prelude                      runtime helpers (once per chunk)
//!   do                           module region
//!     local __EXPORTS__ = {}
//!     __MODULES__.<name> = __EXPORTS__
//!     imports                    functions, memories, tables, globals
//!     declarations               function ids, mem_N, __TABLE_FUNCS_N__
//!     function bodies            three-pass translation per function
//!     global initializers        __GLOBALS__[slot] = <expr>
//!     element segments           __TABLE_INIT__(...)
//!     data segments              __MEMORY_INIT__(...)
//!     exports                    __EXPORTS__["name"] = ...
//!     start call
//!   end
//! ```
//!
//! Declarations precede bodies so every call site can resolve its callee,
//! and table fills follow bodies so the function globals they store exist.
//!
//! # Sub-modules
//!
//! - **`module`**: phase orchestration and function emission
//! - **`export`**: export table and start call
//! - **`state`**: function registry and memory/table/global handles
//! - **`writer`**: indented output buffer with retroactive insertion
//! - **`utils`**: literals, string escapes, identifier sanitizing

pub mod export;
pub mod module;
pub mod state;
pub mod utils;
pub mod writer;

pub use state::{FunctionEntry, ModuleState, TableHandle};

use crate::ast::Module;
use crate::backend::Backend;
use crate::TranspileOptions;
use anyhow::Result;

/// Drives the emission of a whole module through a [`Backend`].
pub struct CodeGenerator<'a, B: Backend> {
    backend: &'a B,
    options: &'a TranspileOptions,
}

impl<'a, B: Backend> CodeGenerator<'a, B> {
    pub fn new(backend: &'a B, options: &'a TranspileOptions) -> Self {
        CodeGenerator { backend, options }
    }

    /// Emit the complete Lua chunk for `module`.
    pub fn generate_module(&self, module: &Module) -> Result<String> {
        module::generate_module(self.backend, module, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Field, Func, FuncType, Instr, Op, Value, WasmType};
    use crate::backend::PureLuaBackend;

    #[test]
    fn generate_constant_function() {
        let module = Module {
            name: Some("demo".into()),
            types: vec![FuncType {
                params: vec![],
                results: vec![WasmType::I32],
            }],
            fields: vec![Field::Func(Func {
                name: Some("answer".into()),
                type_index: 0,
                locals: vec![],
                body: vec![Instr::new(Op::Const(Value::I32(42)), 1)],
            })],
        };
        let backend = PureLuaBackend::default();
        let options = TranspileOptions::default();
        let lua = CodeGenerator::new(&backend, &options)
            .generate_module(&module)
            .unwrap();
        assert!(lua.contains("__MODULES__.demo = __EXPORTS__"));
        assert!(lua.contains("function answer()\n        do return 42 end\n    end"));
        assert!(lua.trim_end().ends_with("end"));
    }
}
