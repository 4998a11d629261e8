//! Pass 2: per-instruction Lua emission.
//!
//! Result registers are always allocated before operands are popped, so a
//! result never lands in the slot of an operand read by the same statement.

use super::state::{BlockKind, FunctionState};
use super::Translator;
use crate::ast::{Instr, Op, WasmType};
use crate::backend::{Backend, Conversion};
use crate::codegen::utils::lua_string;
use crate::codegen::writer::LuaWriter;
use anyhow::Result;
use wasm2lua_runtime::Trap;

impl<B: Backend> Translator<'_, B> {
    pub(super) fn emit_body(
        &self,
        st: &mut FunctionState,
        out: &mut LuaWriter,
        body: &[Instr],
    ) -> Result<()> {
        for instr in body {
            self.emit_instr(st, out, instr)?;
        }
        Ok(())
    }

    /// Emit a diagnostic comment and count it against the function.
    pub(super) fn diagnostic(&self, st: &mut FunctionState, out: &mut LuaWriter, message: &str) {
        st.warnings += 1;
        log::warn!("{}: {}", st.id, message);
        out.line(format!("-- WARNING: {message}"));
    }

    /// Runtime error expression standing in for an operation without a
    /// lowering.
    fn unsupported(&self, st: &mut FunctionState, out: &mut LuaWriter, name: &str) -> String {
        self.diagnostic(st, out, &format!("unsupported instruction {name}"));
        format!("error({})", lua_string(&format!("NOT IMPLEMENTED: {name}")))
    }

    fn emit_forced_inits(&self, st: &mut FunctionState, out: &mut LuaWriter, index: usize) -> Result<()> {
        let locals = st.liveness.forced_at(index).to_vec();
        for local in locals {
            let ty = st
                .local_types
                .get(local as usize)
                .copied()
                .unwrap_or(WasmType::I32);
            let register = st.local_register(local);
            out.line(format!(
                "{} = {};",
                st.registers.name(register),
                self.backend.zero(ty)
            ));
            st.after_local_access(local)?;
        }
        Ok(())
    }

    fn flush_notes(&self, st: &mut FunctionState, out: &mut LuaWriter) {
        for note in st.notes.drain(..) {
            out.line(format!("-- {note}"));
        }
    }

    fn emit_instr(&self, st: &mut FunctionState, out: &mut LuaWriter, instr: &Instr) -> Result<()> {
        let index = st.tick();
        self.emit_forced_inits(st, out, index)?;
        if st.debug.instructions {
            out.line(format!("-- {} @{}", instr.op.name(), instr.offset));
        }

        match &instr.op {
            Op::Unreachable => {
                out.line(format!("error({});", lua_string(Trap::Unreachable.message())));
            }
            Op::Nop => {}
            Op::Block { ty, body } => {
                self.emit_block(st, out, BlockKind::Block, *ty, instr.offset, body)?;
            }
            Op::Loop { ty, body } => {
                self.emit_block(st, out, BlockKind::Loop, *ty, instr.offset, body)?;
            }
            Op::If {
                ty,
                consequent,
                alternate,
            } => {
                self.emit_if(st, out, *ty, instr.offset, consequent, alternate.as_deref())?;
            }
            Op::Br(depth) => self.emit_branch(st, out, *depth),
            Op::BrIf(depth) => {
                let condition = st.pop()?;
                out.line(format!("if {condition} ~= 0 then"));
                out.indent();
                self.emit_branch(st, out, *depth);
                out.outdent();
                out.line("end");
            }
            Op::BrTable { targets, default } => {
                self.emit_br_table(st, out, targets, *default)?;
            }
            Op::Return => self.emit_return(st, out),
            Op::Call(index) => self.emit_call(st, out, *index, instr.offset)?,
            Op::CallIndirect { type_index, table } => {
                self.emit_call_indirect(st, out, *type_index, *table)?;
            }

            Op::Drop => {
                st.pop()?;
            }
            Op::Select => {
                let result = st.temporary();
                let condition = st.pop()?;
                let if_false = st.pop()?;
                let if_true = st.pop()?;
                let name = st.registers.name(result);
                out.line(format!(
                    "if {condition} ~= 0 then {name} = {if_true}; else {name} = {if_false}; end"
                ));
                st.push_register(result);
            }

            Op::LocalGet(local) => {
                if *local as usize >= st.local_types.len() {
                    self.diagnostic(st, out, &format!("local.get of unknown local {local}"));
                    st.push_literal("nil");
                } else {
                    let register = st.local_register(*local);
                    st.push_register(register);
                    st.after_local_access(*local)?;
                }
            }
            Op::LocalSet(local) | Op::LocalTee(local) => {
                if *local as usize >= st.local_types.len() {
                    self.diagnostic(st, out, &format!("write to unknown local {local}"));
                    st.pop()?;
                    if matches!(instr.op, Op::LocalTee(_)) {
                        st.push_literal("nil");
                    }
                } else {
                    let register = st.local_register(*local);
                    if let Some(copy) = st.detach_aliases(register) {
                        out.line(copy);
                    }
                    let value = st.pop()?;
                    let name = st.registers.name(register);
                    if name != value {
                        out.line(format!("{name} = {value};"));
                    }
                    if matches!(instr.op, Op::LocalTee(_)) {
                        st.push_register(register);
                    }
                    st.after_local_access(*local)?;
                }
            }
            Op::GlobalGet(global) => match self.module.global_slot(*global) {
                Some(slot) => {
                    let result = st.temporary();
                    out.line(format!(
                        "{} = {};",
                        st.registers.name(result),
                        self.backend.global(slot)
                    ));
                    st.push_register(result);
                }
                None => {
                    self.diagnostic(st, out, &format!("global.get of unknown global {global}"));
                    st.push_literal("nil");
                }
            },
            Op::GlobalSet(global) => {
                let value = st.pop()?;
                match self.module.global_slot(*global) {
                    Some(slot) => out.line(format!("{} = {value};", self.backend.global(slot))),
                    None => {
                        self.diagnostic(st, out, &format!("global.set of unknown global {global}"));
                    }
                }
            }

            Op::Load {
                ty,
                width,
                signed,
                memarg,
            } => {
                let result = st.temporary();
                let base = st.pop()?;
                let dest = st.registers.name(result);
                let lines = self.memory(st, out, memarg.memory).and_then(|memory| {
                    self.backend.load(
                        &dest,
                        *ty,
                        *width,
                        *signed,
                        &memory,
                        &address(&base, memarg.offset),
                    )
                });
                match lines {
                    Some(lines) => {
                        for line in lines {
                            out.line(line);
                        }
                    }
                    None => {
                        let error = self.unsupported(st, out, &instr.op.name());
                        out.line(format!("{dest} = {error};"));
                    }
                }
                st.push_register(result);
            }
            Op::Store { ty, width, memarg } => {
                let value = st.pop()?;
                let base = st.pop()?;
                let statement = self.memory(st, out, memarg.memory).and_then(|memory| {
                    self.backend
                        .store(*ty, *width, &memory, &address(&base, memarg.offset), &value)
                });
                match statement {
                    Some(statement) => out.line(statement),
                    None => {
                        let error = self.unsupported(st, out, &instr.op.name());
                        out.line(format!("{error};"));
                    }
                }
            }
            Op::MemorySize(memory) => {
                let result = st.temporary();
                let expr = match self.memory(st, out, *memory) {
                    Some(memory) => self.backend.memory_size(&memory),
                    None => self.unsupported(st, out, "memory.size"),
                };
                out.line(format!("{} = {expr};", st.registers.name(result)));
                st.push_register(result);
            }
            Op::MemoryGrow(memory) => {
                let result = st.temporary();
                let delta = st.pop()?;
                let expr = match self.memory(st, out, *memory) {
                    Some(memory) => self.backend.memory_grow(&memory, &delta),
                    None => self.unsupported(st, out, "memory.grow"),
                };
                out.line(format!("{} = {expr};", st.registers.name(result)));
                st.push_register(result);
            }

            Op::Const(value) => st.push_literal(self.backend.constant(*value)),
            Op::Eqz(ty) => {
                let result = st.temporary();
                let operand = st.pop()?;
                let expr = match self.backend.eqz(*ty, &operand) {
                    Some(expr) => expr,
                    None => self.unsupported(st, out, &instr.op.name()),
                };
                out.line(format!("{} = {expr};", st.registers.name(result)));
                st.push_register(result);
            }
            Op::Compare(ty, op) => {
                let result = st.temporary();
                let rhs = st.pop()?;
                let lhs = st.pop()?;
                let expr = match self.backend.compare(*ty, *op, &lhs, &rhs) {
                    Some(expr) => expr,
                    None => self.unsupported(st, out, &instr.op.name()),
                };
                out.line(format!("{} = {expr};", st.registers.name(result)));
                st.push_register(result);
            }
            Op::Binary(ty, op) => {
                let result = st.temporary();
                let rhs = st.pop()?;
                let lhs = st.pop()?;
                let expr = match self.backend.binary(*ty, *op, &lhs, &rhs) {
                    Some(expr) => expr,
                    None => self.unsupported(st, out, &instr.op.name()),
                };
                out.line(format!("{} = {expr};", st.registers.name(result)));
                st.push_register(result);
            }
            Op::Unary(ty, op) => {
                let result = st.temporary();
                let operand = st.pop()?;
                let expr = match self.backend.unary(*ty, *op, &operand) {
                    Some(expr) => expr,
                    None => self.unsupported(st, out, &instr.op.name()),
                };
                out.line(format!("{} = {expr};", st.registers.name(result)));
                st.push_register(result);
            }
            Op::Convert(op) => {
                let operand = st.peek(0);
                if let Conversion::Expr(expr) = self.backend.convert(*op, &operand) {
                    let result = st.temporary();
                    st.pop()?;
                    out.line(format!("{} = {expr};", st.registers.name(result)));
                    st.push_register(result);
                }
            }

            Op::Unsupported(name) => {
                let error = self.unsupported(st, out, name);
                out.line(format!("{error};"));
            }
        }

        self.flush_notes(st, out);
        if st.debug.stack {
            out.line(format!("-- stack depth {}", st.depth()));
        }
        st.drain_pending()
    }

    /// Lua handle of memory `index`, or a diagnostic when the module has none.
    fn memory(&self, st: &mut FunctionState, out: &mut LuaWriter, index: u32) -> Option<String> {
        let handle = self.module.memory(index).map(str::to_string);
        if handle.is_none() {
            self.diagnostic(st, out, &format!("access to missing memory {index}"));
        }
        handle
    }

    /// Implicit return at the end of a function body.
    pub(super) fn emit_function_end(&self, st: &mut FunctionState, out: &mut LuaWriter) -> Result<()> {
        let count = st.result_types().len();
        if count == 0 || st.depth() == 1 {
            return Ok(());
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(st.pop()?);
        }
        values.reverse();
        out.line(format!("do return {} end", values.join(", ")));
        Ok(())
    }

    /// Explicit `return`: the result values stay on the stack for the
    /// (dead) code that follows.
    pub(super) fn emit_return(&self, st: &mut FunctionState, out: &mut LuaWriter) {
        let count = st.result_types().len();
        if count == 0 {
            out.line("do return end");
            return;
        }
        let values: Vec<String> = (0..count).rev().map(|n| st.peek(n)).collect();
        out.line(format!("do return {} end", values.join(", ")));
    }
}

/// Effective address text: the base operand plus the static offset.
fn address(base: &str, offset: u64) -> String {
    if offset == 0 {
        base.to_string()
    } else {
        format!("{base} + {offset}")
    }
}
