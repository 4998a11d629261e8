//! Structured control flow lowered to labels and `goto`.
//!
//! ```text
//!   block            loop                       if
//!   -----            ----                       --
//!   <body>           ::loop_N_start::           if c == 0 then goto if_N_else; end
//!   ::block_N_fin::  while true do              <then>
//!                        <body>                 goto if_N_fin;
//!                        break                  ::if_N_else::
//!                    end                        <else>
//!                    ::loop_N_fin::             ::if_N_fin::
//! ```
//!
//! A branch to a block or `if` assigns the block's result register and jumps
//! to its `_fin` label; a branch to a loop jumps back to `_start` and carries
//! no value.

use super::state::{BlockKind, BlockRecord, FunctionState};
use super::{Rejected, Translator};
use crate::ast::{BlockType, Instr};
use crate::backend::Backend;
use crate::codegen::writer::LuaWriter;
use anyhow::{bail, Result};

impl<B: Backend> Translator<'_, B> {
    fn open_block(&self, st: &mut FunctionState, kind: BlockKind, ty: BlockType, offset: usize) -> BlockRecord {
        let result_register = ty.result().map(|_| st.temporary());
        let block = BlockRecord {
            kind,
            label: format!("{}_{}", kind.prefix(), offset),
            enter_depth: st.depth(),
            result_type: ty.result(),
            result_register,
            in_else: false,
        };
        st.blocks.push(block.clone());
        block
    }

    /// Leave the current arm: store the result, discard anything left over.
    fn settle_arm(&self, st: &mut FunctionState, out: &mut LuaWriter, block: &BlockRecord) -> Result<()> {
        if let Some(register) = block.result_register {
            if st.depth() > block.enter_depth {
                let value = st.pop()?;
                let name = st.registers.name(register);
                if name != value {
                    out.line(format!("{name} = {value};"));
                }
            }
        }
        let residual = st.depth().saturating_sub(block.enter_depth);
        if residual > 0 {
            self.diagnostic(
                st,
                out,
                &format!("{} leaves {residual} extra value(s) on the stack", block.label),
            );
            for _ in 0..residual {
                st.pop()?;
            }
        }
        Ok(())
    }

    pub(super) fn emit_block(
        &self,
        st: &mut FunctionState,
        out: &mut LuaWriter,
        kind: BlockKind,
        ty: BlockType,
        offset: usize,
        body: &[Instr],
    ) -> Result<()> {
        let block = self.open_block(st, kind, ty, offset);
        if kind == BlockKind::Loop {
            out.line(format!("::{}_start::", block.label));
            out.line("while true do");
        }
        out.indent();
        self.emit_body(st, out, body)?;
        self.close_block(st, out)
    }

    pub(super) fn emit_if(
        &self,
        st: &mut FunctionState,
        out: &mut LuaWriter,
        ty: BlockType,
        offset: usize,
        consequent: &[Instr],
        alternate: Option<&[Instr]>,
    ) -> Result<()> {
        let condition = st.pop()?;
        let block = self.open_block(st, BlockKind::If, ty, offset);
        let skip = if alternate.is_some() { "else" } else { "fin" };
        out.line(format!(
            "if {condition} == 0 then goto {}_{skip}; end",
            block.label
        ));
        out.indent();
        self.emit_body(st, out, consequent)?;
        if let Some(alternate) = alternate {
            st.tick();
            self.settle_arm(st, out, &block)?;
            out.line(format!("goto {}_fin;", block.label));
            out.outdent();
            out.line(format!("::{}_else::", block.label));
            out.indent();
            if let Some(open) = st.blocks.last_mut() {
                open.in_else = true;
            }
            self.emit_body(st, out, alternate)?;
        }
        self.close_block(st, out)
    }

    fn close_block(&self, st: &mut FunctionState, out: &mut LuaWriter) -> Result<()> {
        st.tick();
        let Some(block) = st.blocks.last().cloned() else {
            bail!("{}: block close without an open block", st.id);
        };
        self.settle_arm(st, out, &block)?;
        if block.kind == BlockKind::If && !block.in_else && block.result_register.is_some() {
            self.diagnostic(st, out, &format!("{} yields a value but has no else arm", block.label));
        }
        if block.kind == BlockKind::Loop {
            out.line("break");
        }
        out.outdent();
        if block.kind == BlockKind::Loop {
            out.line("end");
        }
        out.line(format!("::{}_fin::", block.label));
        st.blocks.pop();

        let mut expected = block.enter_depth;
        if let Some(register) = block.result_register {
            st.push_register(register);
            expected += 1;
        }
        if st.depth() != expected {
            bail!(
                "{}: stack depth {} after {} (expected {})",
                st.id,
                st.depth(),
                block.label,
                expected
            );
        }
        Ok(())
    }

    /// Unconditional branch to the block `depth` levels out. One past the
    /// outermost block is the function itself.
    pub(super) fn emit_branch(&self, st: &mut FunctionState, out: &mut LuaWriter, depth: u32) {
        let depth = depth as usize;
        let open = st.blocks.len();
        if depth < open {
            let target = st.blocks[open - 1 - depth].clone();
            if let Some(register) = target.branch_register() {
                let value = st.peek(0);
                let name = st.registers.name(register);
                if name != value {
                    out.line(format!("{name} = {value};"));
                }
            }
            out.line(format!("goto {};", target.branch_label()));
        } else if depth == open {
            self.emit_return(st, out);
        } else {
            self.diagnostic(st, out, &format!("unresolved branch target at depth {depth}"));
            out.line("error(\"unresolved branch target\");");
        }
    }

    pub(super) fn emit_br_table(
        &self,
        st: &mut FunctionState,
        out: &mut LuaWriter,
        targets: &[u32],
        default: u32,
    ) -> Result<()> {
        // The default counts as a target.
        let count = targets.len() + 1;
        if count > self.options.br_table_limit {
            return Err(Rejected {
                reason: format!(
                    "br_table with {} targets exceeds the limit of {}",
                    count,
                    self.options.br_table_limit
                ),
            }
            .into());
        }
        let index = st.pop()?;
        if targets.is_empty() {
            self.emit_branch(st, out, default);
            return Ok(());
        }
        match self.options.jmp_stream_threshold {
            Some(threshold) if targets.len() > threshold => {
                out.line(format!(
                    "if {index} < 0 or {index} >= {} then",
                    targets.len()
                ));
                out.indent();
                self.emit_branch(st, out, default);
                out.outdent();
                out.line("else");
                out.indent();
                self.emit_bisect(st, out, &index, targets, 0);
                out.outdent();
                out.line("end");
            }
            _ => {
                for (case, target) in targets.iter().enumerate() {
                    let keyword = if case == 0 { "if" } else { "elseif" };
                    out.line(format!("{keyword} {index} == {case} then"));
                    out.indent();
                    self.emit_branch(st, out, *target);
                    out.outdent();
                }
                out.line("else");
                out.indent();
                self.emit_branch(st, out, default);
                out.outdent();
                out.line("end");
            }
        }
        Ok(())
    }

    /// Binary search over `targets`, whose first entry is case `base`.
    fn emit_bisect(&self, st: &mut FunctionState, out: &mut LuaWriter, index: &str, targets: &[u32], base: usize) {
        if let [target] = targets {
            self.emit_branch(st, out, *target);
            return;
        }
        let half = targets.len() / 2;
        out.line(format!("if {index} < {} then", base + half));
        out.indent();
        self.emit_bisect(st, out, index, &targets[..half], base);
        out.outdent();
        out.line("else");
        out.indent();
        self.emit_bisect(st, out, index, &targets[half..], base + half);
        out.outdent();
        out.line("end");
    }
}
