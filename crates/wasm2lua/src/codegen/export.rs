//! Export bindings and the start call.
//!
//! Every export becomes one `__EXPORTS__["name"] = ...` assignment inside the
//! module region. Functions bind their global identifier, memories and tables
//! their handle, and globals the value held when the module finished loading.

use super::state::ModuleState;
use super::utils::lua_string;
use super::writer::LuaWriter;
use crate::ast::{Export, ExportKind, Field, Module};
use crate::backend::Backend;
use crate::TranspileOptions;
use wasm2lua_runtime::names;

/// First export name of function `index`, if it has one.
pub fn export_name(module: &Module, index: u32) -> Option<&str> {
    module.fields.iter().find_map(|field| match field {
        Field::Export(export) if export.kind == ExportKind::Func && export.index == index => {
            Some(export.name.as_str())
        }
        _ => None,
    })
}

fn binding(name: &str) -> String {
    format!("{}[{}]", names::EXPORTS, lua_string(name))
}

fn diagnostic(out: &mut LuaWriter, message: &str) {
    log::warn!("{message}");
    out.line(format!("-- WARNING: {message}"));
}

/// Resolve a whitelisted name to a function id, by original name first and
/// export name second.
fn whitelisted_id<'s>(state: &'s ModuleState, module: &Module, name: &str) -> Option<&'s str> {
    if let Some(entry) = state.functions.iter().find(|f| f.orig_name == name) {
        return Some(&entry.id);
    }
    module
        .fields
        .iter()
        .find_map(|field| match field {
            Field::Export(export) if export.kind == ExportKind::Func && export.name == name => {
                state.function(export.index)
            }
            _ => None,
        })
        .map(|entry| entry.id.as_str())
}

fn export_target<B: Backend>(backend: &B, state: &ModuleState, export: &Export) -> Option<String> {
    match export.kind {
        ExportKind::Func => state.function(export.index).map(|f| f.id.clone()),
        ExportKind::Memory => state.memory(export.index).map(str::to_string),
        ExportKind::Table => state.table(export.index).map(|t| t.funcs.clone()),
        ExportKind::Global => state.global_slot(export.index).map(|slot| backend.global(slot)),
    }
}

/// Emit whitelist bindings followed by every export of the module.
pub fn emit_exports<B: Backend>(
    backend: &B,
    state: &ModuleState,
    module: &Module,
    options: &TranspileOptions,
    out: &mut LuaWriter,
) {
    if let Some(whitelist) = &options.whitelist {
        for name in whitelist {
            match whitelisted_id(state, module, name) {
                Some(id) => out.line(format!("{} = {id}", binding(name))),
                None => diagnostic(out, &format!("whitelisted function {name} not found")),
            }
        }
    }

    for field in &module.fields {
        let Field::Export(export) = field else {
            continue;
        };
        match export_target(backend, state, export) {
            Some(target) => out.line(format!("{} = {target}", binding(&export.name))),
            None => diagnostic(
                out,
                &format!(
                    "export {} refers to missing {:?} {}",
                    export.name, export.kind, export.index
                ),
            ),
        }
    }
}

/// Call the start function, if the module names one.
pub fn emit_start(state: &ModuleState, module: &Module, out: &mut LuaWriter) {
    let Some(index) = module.fields.iter().find_map(|field| match field {
        Field::Start(index) => Some(*index),
        _ => None,
    }) else {
        return;
    };
    let Some(entry) = state.function(index) else {
        diagnostic(out, &format!("start function {index} not found"));
        return;
    };
    if entry.ty.as_ref().is_some_and(|ty| !ty.params.is_empty()) {
        diagnostic(out, &format!("start function {} takes parameters", entry.id));
    }
    out.line(format!("{}()", entry.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PureLuaBackend;
    use crate::codegen::FunctionEntry;
    use std::collections::BTreeSet;

    fn setup() -> (ModuleState, Module) {
        let mut state = ModuleState::default();
        state.add_function(FunctionEntry {
            id: "run".into(),
            orig_name: "run".into(),
            ty: None,
            imported: false,
        });
        state.add_memory();
        state.add_global();
        let module = Module {
            name: None,
            types: vec![],
            fields: vec![
                Field::Export(Export {
                    name: "main".into(),
                    kind: ExportKind::Func,
                    index: 0,
                }),
                Field::Export(Export {
                    name: "memory".into(),
                    kind: ExportKind::Memory,
                    index: 0,
                }),
                Field::Export(Export {
                    name: "counter".into(),
                    kind: ExportKind::Global,
                    index: 0,
                }),
                Field::Export(Export {
                    name: "gone".into(),
                    kind: ExportKind::Table,
                    index: 4,
                }),
                Field::Start(0),
            ],
        };
        (state, module)
    }

    #[test]
    fn binds_every_export_kind() {
        let (state, module) = setup();
        let mut out = LuaWriter::new();
        emit_exports(
            &PureLuaBackend::default(),
            &state,
            &module,
            &TranspileOptions::default(),
            &mut out,
        );
        let text = out.finish();
        assert!(text.contains("__EXPORTS__[\"main\"] = run\n"));
        assert!(text.contains("__EXPORTS__[\"memory\"] = mem_0\n"));
        assert!(text.contains("__EXPORTS__[\"counter\"] = __GLOBALS__[0]\n"));
        assert!(text.contains("-- WARNING: export gone refers to missing Table 4"));
    }

    #[test]
    fn whitelist_binds_by_export_or_original_name() {
        let (state, module) = setup();
        let options = TranspileOptions {
            whitelist: Some(BTreeSet::from(["main".to_string(), "nope".to_string()])),
            ..Default::default()
        };
        let mut out = LuaWriter::new();
        emit_exports(&PureLuaBackend::default(), &state, &module, &options, &mut out);
        let text = out.finish();
        assert!(text.starts_with("__EXPORTS__[\"main\"] = run\n"));
        assert!(text.contains("whitelisted function nope not found"));
    }

    #[test]
    fn start_is_called() {
        let (state, module) = setup();
        let mut out = LuaWriter::new();
        emit_start(&state, &module, &mut out);
        assert_eq!(out.finish(), "run()\n");
        assert_eq!(export_name(&module, 0), Some("main"));
        assert_eq!(export_name(&module, 1), None);
    }
}
