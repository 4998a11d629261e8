//! Per-function translation context.
//!
//! One [`FunctionState`] is created per function (or per initializer
//! expression) and threaded explicitly through all three passes. Nothing in
//! it outlives the function.

use super::liveness::Liveness;
use super::registers::{RegisterId, RegisterManager, RegisterStrategy};
use crate::ast::{FuncType, WasmType};

/// One operand-stack entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackValue {
    /// Constant text with no register references.
    Literal(String),
    Register(RegisterId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Block,
    Loop,
    If,
}

impl BlockKind {
    pub fn prefix(self) -> &'static str {
        match self {
            BlockKind::Block => "block",
            BlockKind::Loop => "loop",
            BlockKind::If => "if",
        }
    }
}

/// An open structured block.
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub kind: BlockKind,
    /// Label stem, e.g. `block_42`; `_start`, `_fin` and `_else` are appended.
    pub label: String,
    /// Stack depth when the block was entered.
    pub enter_depth: usize,
    pub result_type: Option<WasmType>,
    /// Register receiving the block's result on every exit path.
    pub result_register: Option<RegisterId>,
    /// Set once the `else` arm has been opened.
    pub in_else: bool,
}

impl BlockRecord {
    /// Label a branch to this block jumps to.
    pub fn branch_label(&self) -> String {
        match self.kind {
            BlockKind::Loop => format!("{}_start", self.label),
            _ => format!("{}_fin", self.label),
        }
    }

    /// Values a branch to this block carries. Loop labels take none.
    pub fn branch_register(&self) -> Option<RegisterId> {
        match self.kind {
            BlockKind::Loop => None,
            _ => self.result_register,
        }
    }
}

/// A resumable `setjmp` call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetjmpSite {
    pub label: String,
    /// Sites nested in a loop cannot be reached by `goto` from the
    /// function prologue.
    pub in_loop: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    pub registers: bool,
    pub stack: bool,
    pub instructions: bool,
}

#[derive(Debug)]
pub struct FunctionState {
    pub id: String,
    pub orig_name: String,
    /// `None` for initializer expressions.
    pub signature: Option<FuncType>,
    /// Parameters followed by declared locals.
    pub local_types: Vec<WasmType>,
    pub param_count: usize,
    /// Register currently bound to each local.
    pub locals: Vec<Option<RegisterId>>,
    pub registers: RegisterManager,
    /// Registers waiting for their lifetime to end before being freed.
    pub pending_free: Vec<RegisterId>,
    pub stack: Vec<StackValue>,
    pub blocks: Vec<BlockRecord>,
    pub liveness: Liveness,
    /// Instruction counter, advanced identically in Pass 1 and Pass 2.
    pub ins_count: usize,
    pub setjmp_sites: Vec<SetjmpSite>,
    pub debug: DebugFlags,
    /// Debug comments queued for the next flush.
    pub notes: Vec<String>,
    /// Diagnostics emitted into this function's output.
    pub warnings: usize,
}

impl FunctionState {
    pub fn new(
        id: impl Into<String>,
        orig_name: impl Into<String>,
        signature: Option<FuncType>,
        locals: &[WasmType],
        strategy: RegisterStrategy,
    ) -> Self {
        let params = signature
            .as_ref()
            .map(|sig| sig.params.clone())
            .unwrap_or_default();
        let param_count = params.len();
        let mut local_types = params;
        local_types.extend_from_slice(locals);
        let count = local_types.len();
        Self {
            id: id.into(),
            orig_name: orig_name.into(),
            signature,
            local_types,
            param_count,
            locals: vec![None; count],
            registers: RegisterManager::new(strategy),
            pending_free: Vec::new(),
            stack: Vec::new(),
            blocks: Vec::new(),
            liveness: Liveness::default(),
            ins_count: 0,
            setjmp_sites: Vec::new(),
            debug: DebugFlags::default(),
            notes: Vec::new(),
            warnings: 0,
        }
    }

    /// Advance the instruction counter and return the new index.
    pub fn tick(&mut self) -> usize {
        self.ins_count += 1;
        self.ins_count
    }

    pub fn result_types(&self) -> &[WasmType] {
        self.signature
            .as_ref()
            .map(|sig| sig.results.as_slice())
            .unwrap_or(&[])
    }

    pub fn in_loop(&self) -> bool {
        self.blocks.iter().any(|b| b.kind == BlockKind::Loop)
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.notes.push(text.into());
    }
}
