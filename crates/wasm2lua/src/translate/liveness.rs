//! Pass 1: local liveness.
//!
//! Walks a function body once, advancing the instruction counter exactly as
//! Pass 2 will, and records for every local:
//!
//! - the index of its last reference, so its register can be freed early;
//! - whether some read is not preceded by an assignment on every path, in
//!   which case the local is zeroed at the start of the top-level
//!   instruction that first mentions it.
//!
//! A value read inside a loop but assigned outside it is live until the end
//! of the loop: the next iteration reads it again. Such reads extend the
//! local's last reference to the close of the outermost loop nested inside
//! the scope that assigned it.
//!
//! "Definitely assigned" is tracked per scope and only flows inward. An
//! assignment inside a nested block does not count once the block closes,
//! which may force an unnecessary zero-init but never misses one.

use crate::ast::{Instr, Op};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Liveness {
    /// Per local: instruction index after which its value is dead.
    pub last_ref: Vec<Option<usize>>,
    /// Instruction index → locals to zero before that instruction.
    pub forced_init: BTreeMap<usize, Vec<u32>>,
    /// Total ticks, including block closes.
    pub instruction_count: usize,
}

impl Liveness {
    pub fn last_ref(&self, local: u32) -> Option<usize> {
        self.last_ref.get(local as usize).copied().flatten()
    }

    pub fn forced_at(&self, index: usize) -> &[u32] {
        self.forced_init
            .get(&index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Analyze `body` for a function with `local_count` locals, the first
    /// `param_count` of which are parameters.
    pub fn analyze(body: &[Instr], local_count: usize, param_count: usize) -> Self {
        let mut analyzer = Analyzer {
            live: Liveness {
                last_ref: vec![None; local_count],
                ..Default::default()
            },
            scopes: vec![Scope {
                is_loop: false,
                assigned: (0..param_count as u32).collect(),
            }],
            counter: 0,
            top_start: 0,
            first_top: vec![None; local_count],
            extend_to: vec![None; local_count],
            forced: vec![false; local_count],
        };
        analyzer.walk(body);
        analyzer.live.instruction_count = analyzer.counter;
        analyzer.live
    }
}

struct Scope {
    is_loop: bool,
    assigned: HashSet<u32>,
}

struct Analyzer {
    live: Liveness,
    scopes: Vec<Scope>,
    counter: usize,
    /// Index of the top-level instruction currently being walked.
    top_start: usize,
    first_top: Vec<Option<usize>>,
    /// Scope index of the loop whose close ends the local's lifetime.
    extend_to: Vec<Option<usize>>,
    forced: Vec<bool>,
}

impl Analyzer {
    fn walk(&mut self, body: &[Instr]) {
        for instr in body {
            self.counter += 1;
            if self.scopes.len() == 1 {
                self.top_start = self.counter;
            }
            match &instr.op {
                Op::LocalGet(local) => self.read(*local),
                Op::LocalSet(local) | Op::LocalTee(local) => self.write(*local),
                Op::Block { body, .. } => self.nested(false, body),
                Op::Loop { body, .. } => self.nested(true, body),
                Op::If {
                    consequent,
                    alternate,
                    ..
                } => {
                    self.scopes.push(Scope {
                        is_loop: false,
                        assigned: HashSet::new(),
                    });
                    self.walk(consequent);
                    if let Some(alternate) = alternate {
                        self.counter += 1;
                        if let Some(scope) = self.scopes.last_mut() {
                            scope.assigned.clear();
                        }
                        self.walk(alternate);
                    }
                    self.close_scope();
                }
                _ => {}
            }
        }
    }

    fn nested(&mut self, is_loop: bool, body: &[Instr]) {
        self.scopes.push(Scope {
            is_loop,
            assigned: HashSet::new(),
        });
        self.walk(body);
        self.close_scope();
    }

    fn close_scope(&mut self) {
        self.counter += 1;
        let index = self.scopes.len() - 1;
        if self.scopes[index].is_loop {
            for local in 0..self.extend_to.len() {
                if self.extend_to[local] == Some(index) {
                    self.extend_to[local] = None;
                    let last = &mut self.live.last_ref[local];
                    *last = Some(last.map_or(self.counter, |l| l.max(self.counter)));
                }
            }
        }
        self.scopes.pop();
    }

    fn touch(&mut self, local: usize) {
        let last = &mut self.live.last_ref[local];
        *last = Some(last.map_or(self.counter, |l| l.max(self.counter)));
        self.first_top[local].get_or_insert(self.top_start);
    }

    fn read(&mut self, local: u32) {
        let index = local as usize;
        if index >= self.live.last_ref.len() {
            return;
        }
        self.touch(index);
        let assigned_in = self
            .scopes
            .iter()
            .rposition(|scope| scope.assigned.contains(&local));
        let assigned_in = match assigned_in {
            Some(depth) => depth,
            None => {
                self.force_init(local);
                0
            }
        };
        let outermost_loop = (assigned_in + 1..self.scopes.len()).find(|&i| self.scopes[i].is_loop);
        if let Some(loop_index) = outermost_loop {
            let target = &mut self.extend_to[index];
            *target = Some(target.map_or(loop_index, |t| t.min(loop_index)));
        }
    }

    fn write(&mut self, local: u32) {
        let index = local as usize;
        if index >= self.live.last_ref.len() {
            return;
        }
        self.touch(index);
        if let Some(scope) = self.scopes.last_mut() {
            scope.assigned.insert(local);
        }
    }

    fn force_init(&mut self, local: u32) {
        let index = local as usize;
        if !self.forced[index] {
            self.forced[index] = true;
            let at = self.first_top[index].unwrap_or(self.top_start);
            self.live.forced_init.entry(at).or_default().push(local);
        }
        self.scopes[0].assigned.insert(local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BlockType, Value};

    fn i(op: Op) -> Instr {
        Instr::new(op, 0)
    }

    fn konst(v: i32) -> Instr {
        i(Op::Const(Value::I32(v)))
    }

    fn looped(body: Vec<Instr>) -> Instr {
        i(Op::Loop {
            ty: BlockType::Empty,
            body,
        })
    }

    #[test]
    fn params_are_assigned() {
        let body = vec![i(Op::LocalGet(0)), i(Op::Drop)];
        let live = Liveness::analyze(&body, 1, 1);
        assert!(live.forced_init.is_empty());
        assert_eq!(live.last_ref(0), Some(1));
        assert_eq!(live.instruction_count, 2);
    }

    #[test]
    fn unassigned_read_is_forced() {
        let body = vec![i(Op::LocalGet(1)), i(Op::Drop)];
        let live = Liveness::analyze(&body, 2, 1);
        assert_eq!(live.forced_at(1), &[1]);
        assert_eq!(live.last_ref(0), None);
    }

    #[test]
    fn read_in_loop_extends_to_loop_end() {
        let body = vec![
            konst(0),
            i(Op::LocalSet(1)),
            looped(vec![i(Op::LocalGet(1)), i(Op::Drop)]),
        ];
        let live = Liveness::analyze(&body, 2, 1);
        assert!(live.forced_init.is_empty());
        assert_eq!(live.last_ref(1), Some(6));
    }

    #[test]
    fn same_iteration_assignment_does_not_extend() {
        let body = vec![looped(vec![
            konst(1),
            i(Op::LocalSet(1)),
            i(Op::LocalGet(1)),
            i(Op::Drop),
        ])];
        let live = Liveness::analyze(&body, 2, 1);
        assert!(live.forced_init.is_empty());
        assert_eq!(live.last_ref(1), Some(4));
    }

    #[test]
    fn loop_carried_read_is_forced_before_loop() {
        let body = vec![looped(vec![
            i(Op::LocalGet(1)),
            i(Op::Drop),
            konst(5),
            i(Op::LocalSet(1)),
        ])];
        let live = Liveness::analyze(&body, 2, 1);
        assert_eq!(live.forced_at(1), &[1]);
        assert_eq!(live.last_ref(1), Some(6));
    }

    #[test]
    fn nested_assignment_is_not_trusted() {
        let body = vec![
            i(Op::Block {
                ty: BlockType::Empty,
                body: vec![konst(1), i(Op::LocalSet(1))],
            }),
            i(Op::LocalGet(1)),
            i(Op::Drop),
        ];
        let live = Liveness::analyze(&body, 2, 1);
        assert_eq!(live.forced_at(1), &[1]);
        assert_eq!(live.last_ref(1), Some(5));
    }

    #[test]
    fn else_arm_ticks() {
        let body = vec![
            konst(1),
            i(Op::If {
                ty: BlockType::Empty,
                consequent: vec![i(Op::Nop)],
                alternate: Some(vec![i(Op::Nop)]),
            }),
        ];
        let live = Liveness::analyze(&body, 0, 0);
        // const, if, nop, else, nop, end
        assert_eq!(live.instruction_count, 6);
    }
}
