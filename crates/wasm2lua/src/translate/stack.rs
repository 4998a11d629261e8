//! Operand-stack emulation and register lifetime tracking.
//!
//! The stack holds literal text or register references. Popping a register
//! drops one alias; once no alias is left and the register's lifetime has
//! ended it goes back to the allocator. Named registers whose lifetime ends
//! later (a loop tail, a later local access) wait in `pending_free` and are
//! rechecked after every instruction.

use super::registers::{RegisterId, RegisterKind};
use super::state::{FunctionState, StackValue};
use anyhow::Result;

/// Text substituted for a pop below the current block's floor.
pub const NEGATIVE_POP: &str = "--[[WARNING: NEGATIVE POP]] nil";

impl FunctionState {
    /// Stack depth counter; 1 when the stack is empty.
    pub fn depth(&self) -> usize {
        self.stack.len() + 1
    }

    /// Lowest depth the innermost open block may pop to.
    fn floor(&self) -> usize {
        self.blocks.last().map_or(1, |block| block.enter_depth)
    }

    pub fn push_literal(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.debug.stack {
            self.note(format!("push {text}"));
        }
        self.stack.push(StackValue::Literal(text));
    }

    pub fn push_register(&mut self, id: RegisterId) {
        if self.debug.stack {
            let name = self.registers.name(id);
            self.note(format!("push {name}"));
        }
        self.registers.get_mut(id).stack_refs += 1;
        self.stack.push(StackValue::Register(id));
    }

    /// Pop the top value and return its Lua text.
    pub fn pop(&mut self) -> Result<String> {
        let text = self.pop_value()?;
        if self.debug.stack {
            self.note(format!("pop {text}"));
        }
        Ok(text)
    }

    fn pop_value(&mut self) -> Result<String> {
        if self.depth() <= self.floor() {
            self.warnings += 1;
            log::warn!("{}: pop below block floor", self.id);
            return Ok(NEGATIVE_POP.to_string());
        }
        match self.stack.pop() {
            Some(StackValue::Literal(text)) => Ok(text),
            Some(StackValue::Register(id)) => {
                let name = self.registers.name(id);
                self.release(id)?;
                Ok(name)
            }
            None => Ok(NEGATIVE_POP.to_string()),
        }
    }

    /// Text of the value `n` entries below the top, without popping.
    pub fn peek(&mut self, n: usize) -> String {
        if self.depth() <= self.floor() + n {
            self.warnings += 1;
            log::warn!("{}: peek below block floor", self.id);
            return NEGATIVE_POP.to_string();
        }
        match &self.stack[self.stack.len() - 1 - n] {
            StackValue::Literal(text) => text.clone(),
            StackValue::Register(id) => self.registers.name(*id),
        }
    }

    fn release(&mut self, id: RegisterId) -> Result<()> {
        let register = self.registers.get_mut(id);
        register.stack_refs = register.stack_refs.saturating_sub(1);
        if register.stack_refs == 0 {
            self.try_free(id)?;
        }
        Ok(())
    }

    /// Free `id` if nothing aliases it and its lifetime has ended. Named
    /// registers whose lifetime is still running are queued instead.
    pub fn try_free(&mut self, id: RegisterId) -> Result<bool> {
        let register = self.registers.get(id);
        if !register.live || register.stack_refs > 0 {
            return Ok(false);
        }
        let kind = register.kind;
        if let RegisterKind::Named { local } = kind {
            if register.last_ref.is_some_and(|last| self.ins_count < last) {
                if !self.pending_free.contains(&id) {
                    self.pending_free.push(id);
                }
                return Ok(false);
            }
            if self.locals.get(local as usize) == Some(&Some(id)) {
                self.locals[local as usize] = None;
            }
        }
        if self.debug.registers {
            let name = self.registers.name(id);
            let register = self.registers.get(id);
            let note = match (register.kind, register.first_ref) {
                (RegisterKind::Named { local }, Some(first)) => {
                    let last = register.last_ref.map_or("end".to_string(), |l| l.to_string());
                    format!("free {name} (local {local}, live {first}..{last})")
                }
                _ => format!("free {name}"),
            };
            self.note(note);
        }
        self.registers.free(id)?;
        Ok(true)
    }

    /// Recheck every queued register.
    pub fn drain_pending(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_free);
        for id in pending {
            self.try_free(id)?;
        }
        Ok(())
    }

    /// Register holding `local`, allocating one on first use.
    pub fn local_register(&mut self, local: u32) -> RegisterId {
        if let Some(Some(id)) = self.locals.get(local as usize) {
            return *id;
        }
        let last = self.liveness.last_ref(local);
        let id = self.registers.create_named(local, self.ins_count, last);
        if let Some(slot) = self.locals.get_mut(local as usize) {
            *slot = Some(id);
        }
        if self.debug.registers {
            let name = self.registers.name(id);
            self.note(format!("bind local {local} to {name}"));
        }
        id
    }

    /// End-of-access bookkeeping for a local touched by this instruction.
    pub fn after_local_access(&mut self, local: u32) -> Result<()> {
        if let Some(Some(id)) = self.locals.get(local as usize) {
            self.try_free(*id)?;
        }
        Ok(())
    }

    /// Move every stack alias of `id` onto a fresh temporary, so `id` can be
    /// overwritten without changing values already pushed. Returns the copy
    /// statement to emit, if any alias existed.
    pub fn detach_aliases(&mut self, id: RegisterId) -> Option<String> {
        let refs = self.registers.get(id).stack_refs;
        if refs == 0 {
            return None;
        }
        let copy = self.registers.create_temporary();
        for value in &mut self.stack {
            if *value == StackValue::Register(id) {
                *value = StackValue::Register(copy);
            }
        }
        self.registers.get_mut(id).stack_refs = 0;
        self.registers.get_mut(copy).stack_refs = refs;
        Some(format!(
            "{} = {};",
            self.registers.name(copy),
            self.registers.name(id)
        ))
    }

    /// Allocate a temporary, recording it for debug output.
    pub fn temporary(&mut self) -> RegisterId {
        let id = self.registers.create_temporary();
        if self.debug.registers {
            let name = self.registers.name(id);
            self.note(format!("alloc {name}"));
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FuncType, WasmType};
    use crate::translate::registers::RegisterStrategy;
    use crate::translate::state::{BlockKind, BlockRecord};

    fn state(strategy: RegisterStrategy) -> FunctionState {
        let sig = FuncType {
            params: vec![WasmType::I32],
            results: vec![WasmType::I32],
        };
        FunctionState::new("f", "f", Some(sig), &[WasmType::I32], strategy)
    }

    #[test]
    fn literals_round_trip() {
        let mut st = state(RegisterStrategy::Pooled);
        assert_eq!(st.depth(), 1);
        st.push_literal("5");
        st.push_literal("(-1)");
        assert_eq!(st.depth(), 3);
        assert_eq!(st.peek(1), "5");
        assert_eq!(st.pop().unwrap(), "(-1)");
        assert_eq!(st.pop().unwrap(), "5");
        assert_eq!(st.depth(), 1);
    }

    #[test]
    fn underflow_yields_marker() {
        let mut st = state(RegisterStrategy::Pooled);
        assert_eq!(st.pop().unwrap(), NEGATIVE_POP);
        assert_eq!(st.warnings, 1);
        assert_eq!(st.depth(), 1);
    }

    #[test]
    fn pop_respects_block_floor() {
        let mut st = state(RegisterStrategy::Pooled);
        st.push_literal("1");
        st.blocks.push(BlockRecord {
            kind: BlockKind::Block,
            label: "block_3".into(),
            enter_depth: st.depth(),
            result_type: None,
            result_register: None,
            in_else: false,
        });
        assert_eq!(st.pop().unwrap(), NEGATIVE_POP);
        st.blocks.pop();
        assert_eq!(st.pop().unwrap(), "1");
    }

    #[test]
    fn temporaries_free_on_last_pop() {
        let mut st = state(RegisterStrategy::Pooled);
        let t = st.temporary();
        st.push_register(t);
        st.push_register(t);
        st.pop().unwrap();
        assert!(st.registers.get(t).live);
        st.pop().unwrap();
        assert!(!st.registers.get(t).live);
        let again = st.temporary();
        assert_eq!(st.registers.name(again), "reg0");
    }

    #[test]
    fn named_register_waits_for_lifetime() {
        let mut st = state(RegisterStrategy::Pooled);
        st.liveness.last_ref = vec![Some(4), None];
        let r = st.local_register(0);
        st.push_register(r);
        st.ins_count = 2;
        st.pop().unwrap();
        assert!(st.registers.get(r).live);
        assert_eq!(st.pending_free, vec![r]);
        st.ins_count = 4;
        st.drain_pending().unwrap();
        assert!(!st.registers.get(r).live);
        assert_eq!(st.locals[0], None);
        assert!(st.pending_free.is_empty());
    }

    #[test]
    fn detaching_moves_aliases() {
        let mut st = state(RegisterStrategy::Pooled);
        st.liveness.last_ref = vec![Some(10), None];
        let r = st.local_register(0);
        st.push_register(r);
        let copy = st.detach_aliases(r).unwrap();
        assert_eq!(copy, "reg1 = reg0;");
        assert_eq!(st.registers.get(r).stack_refs, 0);
        assert_eq!(st.pop().unwrap(), "reg1");
        assert!(st.detach_aliases(r).is_none());
    }

    #[test]
    fn debug_registers_note_named_lifetimes() {
        let mut st = state(RegisterStrategy::Pooled);
        st.debug.registers = true;
        st.liveness.last_ref = vec![Some(3), None];
        st.ins_count = 2;
        let r = st.local_register(0);
        st.ins_count = 3;
        st.after_local_access(0).unwrap();
        assert_eq!(
            st.notes,
            vec!["bind local 0 to reg0", "free reg0 (local 0, live 2..3)"]
        );
        let t = st.temporary();
        st.push_register(t);
        st.pop().unwrap();
        assert_eq!(st.notes.last().map(String::as_str), Some("free reg0"));
        assert!(!st.registers.get(r).live);
    }

    #[test]
    fn debug_stack_notes_every_push_and_pop() {
        let mut st = state(RegisterStrategy::Pooled);
        st.debug.stack = true;
        st.push_literal("7");
        let t = st.temporary();
        st.push_register(t);
        st.pop().unwrap();
        st.pop().unwrap();
        assert_eq!(st.notes, vec!["push 7", "push reg0", "pop reg0", "pop 7"]);
    }
}
