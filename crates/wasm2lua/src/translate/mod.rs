//! Function translation engine.
//!
//! Every function body (and every initializer expression, treated as a
//! pseudo-function) goes through three passes:
//!
//! 1. [`liveness`]: last-reference indices and forced zero-inits per local.
//! 2. Code generation: walks the tree, emulating the operand stack with
//!    [`registers`] and emitting one Lua statement per value-producing step.
//! 3. [`declare`]: every register slot the body used is declared `local` in
//!    front of the already written code.
//!
//! Errors are tiered. Local anomalies (stack underflow, unknown opcode,
//! unresolved branch) become diagnostics in the output and the function still
//! translates. [`Rejected`] replaces one function with an `error()` stub.
//! Anything else aborts the whole module.

mod calls;
mod codegen;
mod control;
mod declare;
pub mod liveness;
pub mod registers;
mod stack;
pub mod state;

pub use registers::RegisterStrategy;
pub use stack::NEGATIVE_POP;

use crate::ast::{Func, FuncType, Instr, WasmType};
use crate::backend::Backend;
use crate::codegen::writer::LuaWriter;
use crate::codegen::ModuleState;
use crate::TranspileOptions;
use anyhow::{Context, Result};
use liveness::Liveness;
use state::FunctionState;
use std::fmt;

/// A function the translator refuses to emit; the module emitter replaces
/// its body with a runtime error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub reason: String,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function rejected: {}", self.reason)
    }
}

impl std::error::Error for Rejected {}

/// Output of the three passes for one function.
#[derive(Debug, Clone)]
pub struct TranslatedFunction {
    /// Parameter names, in order.
    pub params: Vec<String>,
    /// Body text, declarations included, at indentation zero.
    pub body: String,
    pub result_count: usize,
    /// The body must run under the setjmp trampoline.
    pub uses_setjmp: bool,
    /// Final value of an initializer expression.
    pub value: Option<String>,
    /// Slot names declared `local` by Pass 3.
    pub declared: Vec<String>,
    pub warnings: usize,
}

/// Translates bodies against a fixed module view.
pub struct Translator<'a, B: Backend> {
    pub(crate) backend: &'a B,
    pub(crate) module: &'a ModuleState,
    pub(crate) options: &'a TranspileOptions,
}

impl<'a, B: Backend> Translator<'a, B> {
    pub fn new(backend: &'a B, module: &'a ModuleState, options: &'a TranspileOptions) -> Self {
        Self {
            backend,
            module,
            options,
        }
    }

    fn state(
        &self,
        id: &str,
        orig_name: &str,
        signature: Option<FuncType>,
        locals: &[WasmType],
    ) -> FunctionState {
        let mut st = FunctionState::new(
            id,
            orig_name,
            signature,
            locals,
            self.options.register_strategy,
        );
        st.debug = self.options.debug_flags();
        st
    }

    fn check_size(&self, st: &FunctionState) -> Result<()> {
        let count = st.liveness.instruction_count;
        if count > self.options.max_function_instructions {
            return Err(Rejected {
                reason: format!(
                    "{} instructions exceeds the limit of {}",
                    count, self.options.max_function_instructions
                ),
            }
            .into());
        }
        Ok(())
    }

    /// Translate a defined function.
    pub fn translate_function(&self, id: &str, orig_name: &str, func: &Func) -> Result<TranslatedFunction> {
        let signature = self
            .module
            .types
            .get(func.type_index as usize)
            .cloned()
            .with_context(|| format!("function {orig_name} uses unknown type {}", func.type_index))?;
        let mut st = self.state(id, orig_name, Some(signature), &func.locals);
        st.liveness = Liveness::analyze(&func.body, st.local_types.len(), st.param_count);
        self.check_size(&st)?;

        let mut out = LuaWriter::new();
        let header = out.mark();

        let mut params = Vec::with_capacity(st.param_count);
        for local in 0..st.param_count as u32 {
            let register = st.local_register(local);
            params.push(st.registers.name(register));
        }
        for local in 0..st.param_count as u32 {
            st.after_local_access(local)?;
        }

        self.emit_body(&mut st, &mut out, &func.body)?;
        self.emit_function_end(&mut st, &mut out)?;
        let declared = declare::finalize(&mut st, &mut out, header);

        log::debug!(
            "{}: {} instructions, {} registers",
            st.id,
            st.ins_count,
            st.registers.slot_count()
        );
        Ok(TranslatedFunction {
            params,
            body: out.finish(),
            result_count: st.result_types().len(),
            uses_setjmp: !st.setjmp_sites.is_empty(),
            value: None,
            declared,
            warnings: st.warnings,
        })
    }

    /// Translate an initializer expression (global init, segment offset).
    /// The expression's final value is returned in `value`.
    pub fn translate_expression(&self, id: &str, expr: &[Instr]) -> Result<TranslatedFunction> {
        let mut st = self.state(id, id, None, &[]);
        st.liveness = Liveness::analyze(expr, 0, 0);
        self.check_size(&st)?;

        let mut out = LuaWriter::new();
        let header = out.mark();
        self.emit_body(&mut st, &mut out, expr)?;
        let value = st.pop()?;
        let declared = declare::finalize(&mut st, &mut out, header);
        Ok(TranslatedFunction {
            params: Vec::new(),
            body: out.finish(),
            result_count: 1,
            uses_setjmp: false,
            value: Some(value),
            declared,
            warnings: st.warnings,
        })
    }
}
