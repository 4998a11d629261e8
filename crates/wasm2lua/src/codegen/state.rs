//! Module-wide registries shared by every function translation.

use super::utils::sanitize_identifier;
use crate::ast::FuncType;
use std::collections::{BTreeMap, HashSet};

/// A function reachable by index: imported or defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    /// Lua expression naming the function: a global for defined functions,
    /// a `__MODULES__` lookup for imports.
    pub id: String,
    /// Name before sanitizing; used for setjmp detection and whitelisting.
    pub orig_name: String,
    /// `None` when the type index did not resolve.
    pub ty: Option<FuncType>,
    pub imported: bool,
}

/// Lua variables backing one function table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    pub funcs: String,
    pub offset: String,
}

impl TableHandle {
    pub fn new(index: u32) -> Self {
        Self {
            funcs: format!("__TABLE_FUNCS_{index}__"),
            offset: format!("__TABLE_OFFSET_{index}__"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ModuleState {
    pub types: Vec<FuncType>,
    /// Function index space, imports first.
    pub functions: Vec<FunctionEntry>,
    pub memories: BTreeMap<u32, String>,
    pub tables: BTreeMap<u32, TableHandle>,
    /// Global index → slot in `__GLOBALS__`.
    pub globals: Vec<usize>,
    next_global_slot: usize,
    used_ids: HashSet<String>,
}

impl ModuleState {
    pub fn new(types: Vec<FuncType>) -> Self {
        Self {
            types,
            ..Default::default()
        }
    }

    pub fn function(&self, index: u32) -> Option<&FunctionEntry> {
        self.functions.get(index as usize)
    }

    pub fn memory(&self, index: u32) -> Option<&str> {
        self.memories.get(&index).map(String::as_str)
    }

    pub fn table(&self, index: u32) -> Option<&TableHandle> {
        self.tables.get(&index)
    }

    pub fn global_slot(&self, index: u32) -> Option<usize> {
        self.globals.get(index as usize).copied()
    }

    /// Sanitize `name` into a global identifier no other function uses.
    pub fn unique_id(&mut self, name: &str, index: usize) -> String {
        let base = sanitize_identifier(name);
        let id = if self.used_ids.contains(&base) {
            let mut candidate = format!("{base}_{index}");
            while self.used_ids.contains(&candidate) {
                candidate.push('_');
            }
            candidate
        } else {
            base
        };
        self.used_ids.insert(id.clone());
        id
    }

    pub fn add_function(&mut self, entry: FunctionEntry) -> u32 {
        self.functions.push(entry);
        (self.functions.len() - 1) as u32
    }

    /// Register the next memory and return its handle name.
    pub fn add_memory(&mut self) -> String {
        let index = self.memories.len() as u32;
        let handle = format!("mem_{index}");
        self.memories.insert(index, handle.clone());
        handle
    }

    pub fn add_table(&mut self) -> TableHandle {
        let index = self.tables.len() as u32;
        let handle = TableHandle::new(index);
        self.tables.insert(index, handle.clone());
        handle
    }

    /// Register the next global and return its slot.
    pub fn add_global(&mut self) -> usize {
        let slot = self.next_global_slot;
        self.next_global_slot += 1;
        self.globals.push(slot);
        slot
    }

    pub fn imported_function_count(&self) -> usize {
        self.functions.iter().filter(|f| f.imported).count()
    }
}
