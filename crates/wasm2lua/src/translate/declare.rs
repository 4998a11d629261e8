//! Pass 3: local declarations and the setjmp prologue.
//!
//! Register slots are only known once Pass 2 has finished, so their `local`
//! declaration is spliced in front of the body afterwards.

use super::calls::SETJMP_DATA;
use super::state::FunctionState;
use crate::codegen::writer::{LuaWriter, Mark};

/// Lua refuses more than 200 active locals per function.
const LOCAL_LIMIT: usize = 200;
const LOCAL_WARNING: usize = 150;

/// Insert the declarations (and, for setjmp users, the resume prologue) at
/// `mark`. Returns the declared names.
pub(super) fn finalize(st: &mut FunctionState, out: &mut LuaWriter, mark: Mark) -> Vec<String> {
    let declared: Vec<String> = st
        .registers
        .slot_names()
        .into_iter()
        .skip(st.param_count)
        .collect();

    let mut total = st.param_count + declared.len();
    if !st.setjmp_sites.is_empty() {
        total += 2;
    }
    if total >= LOCAL_LIMIT {
        log::error!(
            "{}: {} locals exceed Lua's limit of {}; the output will not load",
            st.id,
            total,
            LOCAL_LIMIT
        );
    } else if total > LOCAL_WARNING {
        log::warn!("{}: {} locals, close to Lua's limit of {}", st.id, total, LOCAL_LIMIT);
    }

    let mut lines = Vec::new();
    if !declared.is_empty() {
        lines.push(format!("local {};", declared.join(", ")));
    }
    if !st.setjmp_sites.is_empty() {
        lines.extend(resume_prologue(st));
    }
    if !lines.is_empty() {
        out.insert_lines(mark, &lines);
    }
    declared
}

fn resume_prologue(st: &FunctionState) -> Vec<String> {
    let mut lines = vec![format!("if {SETJMP_DATA} then")];
    for slot in st.registers.slot_names() {
        lines.push(format!("    {slot} = {SETJMP_DATA}.data.{slot};"));
    }
    for (n, site) in st.setjmp_sites.iter().enumerate() {
        let keyword = if n == 0 { "if" } else { "elseif" };
        let action = if site.in_loop {
            "error(\"cannot resume a setjmp inside a loop\");".to_string()
        } else {
            format!("goto {};", site.label)
        };
        lines.push(format!(
            "    {keyword} {SETJMP_DATA}.target == \"{}\" then {action}",
            site.label
        ));
    }
    lines.push("    end".to_string());
    lines.push("end".to_string());
    lines
}
