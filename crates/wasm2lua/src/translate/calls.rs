//! Direct and indirect calls, and the setjmp/longjmp protocol.
//!
//! A function that calls `setjmp` is split in two. The body becomes
//! `<id>__setjmp_internal(__setjmp_data__, __setjmp_frame__, ...)`, and `<id>`
//! itself is a trampoline that runs the body under `pcall`:
//!
//! - `setjmp(buf)` stores a record `{data, target, frame, result}` in
//!   `__SETJMP_STATES__[memory][buf]`, where `data` snapshots every register
//!   and `frame` is the calling trampoline's private token.
//! - `longjmp(buf, val)` sets the record's `result` and raises it as a Lua
//!   error.
//! - The trampoline whose token matches catches the record and re-enters
//!   the body with it; the prologue restores the registers and jumps to the
//!   label after the `setjmp` call, which now yields `val`.

use super::state::{FunctionState, SetjmpSite};
use super::Translator;
use crate::ast::FuncType;
use crate::backend::Backend;
use crate::codegen::writer::LuaWriter;
use anyhow::Result;
use wasm2lua_runtime::names;

pub const SETJMP_DATA: &str = "__setjmp_data__";
pub const SETJMP_FRAME: &str = "__setjmp_frame__";

fn is_setjmp(name: &str) -> bool {
    matches!(name, "setjmp" | "_setjmp")
}

fn is_longjmp(name: &str) -> bool {
    matches!(name, "longjmp" | "_longjmp")
}

impl<B: Backend> Translator<'_, B> {
    pub(super) fn emit_call(
        &self,
        st: &mut FunctionState,
        out: &mut LuaWriter,
        index: u32,
        offset: usize,
    ) -> Result<()> {
        let Some(callee) = self.module.function(index) else {
            self.diagnostic(st, out, &format!("call to unknown function {index}"));
            out.line(format!("error(\"UNRESOLVED CALL: {index}\");"));
            return Ok(());
        };
        if is_setjmp(&callee.orig_name) {
            return self.emit_setjmp(st, out, offset);
        }
        if is_longjmp(&callee.orig_name) {
            let ty = callee.ty.clone().unwrap_or_default();
            return self.emit_longjmp(st, out, &ty);
        }
        let ty = callee.ty.clone().unwrap_or_default();
        let target = callee.id.clone();
        self.emit_invoke(st, out, &ty, |_| Ok(target))
    }

    pub(super) fn emit_call_indirect(
        &self,
        st: &mut FunctionState,
        out: &mut LuaWriter,
        type_index: u32,
        table: u32,
    ) -> Result<()> {
        let Some(ty) = self.module.types.get(type_index as usize).cloned() else {
            self.diagnostic(st, out, &format!("call_indirect with unknown type {type_index}"));
            st.pop()?;
            out.line(format!("error(\"UNRESOLVED CALL: type {type_index}\");"));
            return Ok(());
        };
        let handle = self.module.table(table).cloned();
        if handle.is_none() {
            self.diagnostic(st, out, &format!("call_indirect through missing table {table}"));
        }
        self.emit_invoke(st, out, &ty, |st| {
            let index = st.pop()?;
            Ok(match handle {
                Some(handle) => format!("{}[{} + {index}]", handle.funcs, handle.offset),
                None => format!("error(\"missing table {table}\")"),
            })
        })
    }

    /// Allocate result registers, resolve the callee text (which may pop),
    /// pop the arguments and emit the call statement.
    fn emit_invoke(
        &self,
        st: &mut FunctionState,
        out: &mut LuaWriter,
        ty: &FuncType,
        callee: impl FnOnce(&mut FunctionState) -> Result<String>,
    ) -> Result<()> {
        let results: Vec<_> = ty.results.iter().map(|_| st.temporary()).collect();
        let target = callee(st)?;
        let mut args = Vec::with_capacity(ty.params.len());
        for _ in &ty.params {
            args.push(st.pop()?);
        }
        args.reverse();
        let call = format!("{target}({})", args.join(", "));
        if results.is_empty() {
            out.line(format!("{call};"));
        } else {
            let names: Vec<_> = results.iter().map(|r| st.registers.name(*r)).collect();
            out.line(format!("{} = {call};", names.join(", ")));
        }
        for register in results {
            st.push_register(register);
        }
        Ok(())
    }

    fn setjmp_state(&self, st: &mut FunctionState, out: &mut LuaWriter, buffer: &str) -> Option<String> {
        match self.module.memory(0) {
            Some(memory) => Some(format!("{}[{memory}][{buffer}]", names::SETJMP_STATES)),
            None => {
                self.diagnostic(st, out, "setjmp/longjmp without a linear memory");
                out.line("error(\"setjmp requires a linear memory\");");
                None
            }
        }
    }

    fn emit_setjmp(&self, st: &mut FunctionState, out: &mut LuaWriter, offset: usize) -> Result<()> {
        let result = st.temporary();
        let buffer = st.pop()?;
        let name = st.registers.name(result);
        let Some(state) = self.setjmp_state(st, out, &buffer) else {
            st.push_register(result);
            return Ok(());
        };

        let label = format!("jmp_{offset}");
        let snapshot: Vec<String> = st
            .registers
            .slot_names()
            .into_iter()
            .map(|slot| format!("{slot} = {slot}"))
            .collect();
        out.line(format!(
            "{state} = {{data = {{{}}}, target = \"{label}\", frame = {SETJMP_FRAME}, result = 0}};",
            snapshot.join(", ")
        ));
        out.line(format!("::{label}::"));
        out.line(format!(
            "{name} = ({SETJMP_DATA} ~= nil and {SETJMP_DATA}.target == \"{label}\") and {SETJMP_DATA}.result or 0;"
        ));
        st.push_register(result);

        let in_loop = st.in_loop();
        if in_loop {
            self.diagnostic(st, out, &format!("setjmp at {label} is inside a loop and cannot be resumed"));
        }
        st.setjmp_sites.push(SetjmpSite { label, in_loop });
        Ok(())
    }

    fn emit_longjmp(&self, st: &mut FunctionState, out: &mut LuaWriter, ty: &FuncType) -> Result<()> {
        let mut args = Vec::new();
        for _ in 0..ty.params.len().max(2) {
            args.push(st.pop()?);
        }
        args.reverse();
        let (buffer, value) = (&args[0], &args[1]);
        if let Some(state) = self.setjmp_state(st, out, buffer) {
            out.line(format!("{state}.result = ({value} == 0) and 1 or {value};"));
            out.line(format!("error({state});"));
        }
        for _ in &ty.results {
            st.push_literal("nil");
        }
        Ok(())
    }
}
