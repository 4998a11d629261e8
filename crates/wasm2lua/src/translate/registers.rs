//! Virtual register allocation.
//!
//! Every value the generated Lua keeps in a local variable lives in a
//! register. A register is either *named* (bound to a WebAssembly local) or
//! *temporary* (an intermediate result). Registers are kept in an arena and
//! addressed by [`RegisterId`]; ids are never reused, so a stale id can always
//! be recognized as dead.
//!
//! Each register maps to a physical slot, printed as `reg<slot>`:
//!
//! ```text
//!   Virtual   every register gets a fresh slot      reg0 reg1 reg2 reg3 ...
//!   Pooled    freed slots are reused, lowest first  reg0 reg1 reg0 reg2 ...
//! ```
//!
//! The pooled strategy never hands out a slot that a live register holds.

use anyhow::{bail, Result};
use std::collections::BTreeSet;

/// Slot reuse policy, selected per module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegisterStrategy {
    /// Never reuse a slot.
    Virtual,
    /// Reuse freed slots.
    #[default]
    Pooled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    /// Bound to a declared local (parameters included).
    Named { local: u32 },
    Temporary,
}

#[derive(Debug, Clone)]
pub struct Register {
    pub kind: RegisterKind,
    pub slot: usize,
    /// Instruction index of the first reference, for named registers.
    pub first_ref: Option<usize>,
    /// Instruction index after which the value is dead, for named registers.
    pub last_ref: Option<usize>,
    /// Number of operand-stack entries aliasing this register.
    pub stack_refs: usize,
    pub live: bool,
}

/// Per-function register allocator.
#[derive(Debug)]
pub struct RegisterManager {
    strategy: RegisterStrategy,
    registers: Vec<Register>,
    free_slots: BTreeSet<usize>,
    /// Next never-used slot.
    high_water: usize,
    live_count: usize,
}

impl RegisterManager {
    pub fn new(strategy: RegisterStrategy) -> Self {
        Self {
            strategy,
            registers: Vec::new(),
            free_slots: BTreeSet::new(),
            high_water: 0,
            live_count: 0,
        }
    }

    fn next_slot(&mut self) -> usize {
        if self.strategy == RegisterStrategy::Pooled {
            if let Some(slot) = self.free_slots.pop_first() {
                return slot;
            }
        }
        let slot = self.high_water;
        self.high_water += 1;
        slot
    }

    fn create(&mut self, kind: RegisterKind, first_ref: Option<usize>, last_ref: Option<usize>) -> RegisterId {
        let slot = self.next_slot();
        let id = RegisterId(self.registers.len());
        self.registers.push(Register {
            kind,
            slot,
            first_ref,
            last_ref,
            stack_refs: 0,
            live: true,
        });
        self.live_count += 1;
        id
    }

    /// Allocate a register for local `local`, first referenced at `first_ref`.
    pub fn create_named(&mut self, local: u32, first_ref: usize, last_ref: Option<usize>) -> RegisterId {
        self.create(RegisterKind::Named { local }, Some(first_ref), last_ref)
    }

    pub fn create_temporary(&mut self) -> RegisterId {
        self.create(RegisterKind::Temporary, None, None)
    }

    /// Return a register's slot to the pool.
    ///
    /// Freeing a register twice is a translator bug and aborts the function.
    pub fn free(&mut self, id: RegisterId) -> Result<()> {
        let Some(register) = self.registers.get_mut(id.0) else {
            bail!("free of unknown register {:?}", id);
        };
        if !register.live {
            bail!("register reg{} freed twice", register.slot);
        }
        register.live = false;
        self.live_count -= 1;
        if self.strategy == RegisterStrategy::Pooled {
            self.free_slots.insert(register.slot);
        }
        Ok(())
    }

    pub fn get(&self, id: RegisterId) -> &Register {
        &self.registers[id.0]
    }

    pub fn get_mut(&mut self, id: RegisterId) -> &mut Register {
        &mut self.registers[id.0]
    }

    /// Physical name of the register's slot.
    pub fn name(&self, id: RegisterId) -> String {
        slot_name(self.get(id).slot)
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Number of distinct slots handed out so far.
    pub fn slot_count(&self) -> usize {
        self.high_water
    }

    /// Names of every slot handed out so far, in slot order.
    pub fn slot_names(&self) -> Vec<String> {
        (0..self.high_water).map(slot_name).collect()
    }
}

pub fn slot_name(slot: usize) -> String {
    format!("reg{slot}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_never_reuses() {
        let mut regs = RegisterManager::new(RegisterStrategy::Virtual);
        let a = regs.create_temporary();
        regs.free(a).unwrap();
        let b = regs.create_temporary();
        assert_eq!(regs.name(a), "reg0");
        assert_eq!(regs.name(b), "reg1");
        assert_eq!(regs.slot_count(), 2);
    }

    #[test]
    fn pooled_reuses_lowest_free_slot() {
        let mut regs = RegisterManager::new(RegisterStrategy::Pooled);
        let a = regs.create_temporary();
        let b = regs.create_temporary();
        let c = regs.create_temporary();
        regs.free(c).unwrap();
        regs.free(a).unwrap();
        let d = regs.create_temporary();
        assert_eq!(regs.name(d), "reg0");
        let e = regs.create_temporary();
        assert_eq!(regs.name(e), "reg2");
        assert_eq!(regs.name(b), "reg1");
        assert_eq!(regs.slot_count(), 3);
    }

    #[test]
    fn pooled_live_registers_never_share_slots() {
        let mut regs = RegisterManager::new(RegisterStrategy::Pooled);
        let mut live = Vec::new();
        for round in 0..20 {
            live.push(regs.create_temporary());
            if round % 3 == 0 {
                let id = live.remove(0);
                regs.free(id).unwrap();
            }
            let mut slots: Vec<_> = live.iter().map(|id| regs.get(*id).slot).collect();
            slots.sort_unstable();
            slots.dedup();
            assert_eq!(slots.len(), live.len());
        }
        assert_eq!(regs.live_count(), live.len());
    }

    #[test]
    fn double_free_is_an_error() {
        let mut regs = RegisterManager::new(RegisterStrategy::Pooled);
        let a = regs.create_named(0, 3, Some(7));
        regs.free(a).unwrap();
        let err = regs.free(a).unwrap_err();
        assert!(err.to_string().contains("freed twice"));
    }

    #[test]
    fn named_registers_keep_lifetime() {
        let mut regs = RegisterManager::new(RegisterStrategy::Virtual);
        let a = regs.create_named(2, 4, Some(9));
        let register = regs.get(a);
        assert_eq!(register.kind, RegisterKind::Named { local: 2 });
        assert_eq!(register.first_ref, Some(4));
        assert_eq!(register.last_ref, Some(9));
        assert!(register.live);
    }
}
