//! Phase-ordered module emission.

use super::export::{emit_exports, emit_start, export_name};
use super::state::{FunctionEntry, ModuleState};
use super::utils::{index_expr, lua_bytes, lua_string};
use super::writer::LuaWriter;
use crate::ast::{Field, ImportDesc, Module};
use crate::backend::Backend;
use crate::translate::{Rejected, TranslatedFunction, Translator};
use crate::TranspileOptions;
use anyhow::{Context, Result};
use wasm2lua_runtime::names;

const SETJMP_INTERNAL_SUFFIX: &str = "__setjmp_internal";

/// Emit the complete chunk for `module`.
pub fn generate_module<B: Backend>(
    backend: &B,
    module: &Module,
    options: &TranspileOptions,
) -> Result<String> {
    let mut out = LuaWriter::new();
    out.raw(backend.prelude());
    if !backend.prelude().ends_with('\n') {
        out.newline();
    }
    out.newline();

    out.line("do");
    out.indent();
    let name = module.name.as_deref().unwrap_or("UNKNOWN");
    out.line(format!("local {} = {{}}", names::EXPORTS));
    out.line(format!(
        "{} = {}",
        index_expr(names::MODULES, name),
        names::EXPORTS
    ));

    let mut state = ModuleState::new(module.types.clone());
    emit_imports(backend, &mut state, module, &mut out);
    emit_declarations(&mut state, module, &mut out);

    let translator = Translator::new(backend, &state, options);
    emit_functions(&translator, &state, module, options, &mut out)?;
    emit_globals(&translator, &state, backend, module, &mut out)?;
    emit_elements(&translator, &state, module, &mut out)?;
    emit_data(&translator, &state, module, &mut out)?;
    emit_exports(backend, &state, module, options, &mut out);
    emit_start(&state, module, &mut out);

    out.outdent();
    out.line("end");
    Ok(out.finish())
}

fn warn(out: &mut LuaWriter, message: &str) {
    log::warn!("{message}");
    out.line(format!("-- WARNING: {message}"));
}

fn emit_imports<B: Backend>(
    backend: &B,
    state: &mut ModuleState,
    module: &Module,
    out: &mut LuaWriter,
) {
    for field in &module.fields {
        let Field::Import(import) = field else {
            continue;
        };
        let source = index_expr(&index_expr(names::MODULES, &import.module), &import.name);
        match &import.desc {
            ImportDesc::Func { type_index } => {
                let ty = module.func_type(*type_index).cloned();
                if ty.is_none() {
                    warn(
                        out,
                        &format!("import {source} has unknown type {type_index}"),
                    );
                }
                state.add_function(FunctionEntry {
                    id: source,
                    orig_name: import.name.clone(),
                    ty,
                    imported: true,
                });
            }
            ImportDesc::Memory(_) => {
                let handle = state.add_memory();
                out.line(format!("local {handle} = {source}"));
            }
            ImportDesc::Table(_) => {
                let handle = state.add_table();
                out.line(format!(
                    "local {}, {} = {source}, 1",
                    handle.funcs, handle.offset
                ));
            }
            ImportDesc::Global { .. } => {
                let slot = state.add_global();
                out.line(format!("{} = {source}", backend.global(slot)));
            }
        }
    }
}

/// Assign ids, handles and slots for everything the module defines, so
/// bodies can reference any of them regardless of order.
fn emit_declarations(state: &mut ModuleState, module: &Module, out: &mut LuaWriter) {
    for field in &module.fields {
        match field {
            Field::Func(func) => {
                let index = state.functions.len();
                let orig_name = func
                    .name
                    .clone()
                    .or_else(|| export_name(module, index as u32).map(str::to_string))
                    .unwrap_or_else(|| format!("func_{index}"));
                let id = state.unique_id(&orig_name, index);
                let ty = module.func_type(func.type_index).cloned();
                state.add_function(FunctionEntry {
                    id,
                    orig_name,
                    ty,
                    imported: false,
                });
            }
            Field::Memory(limits) => {
                let handle = state.add_memory();
                let maximum = limits
                    .maximum
                    .map_or_else(|| "nil".to_string(), |max| max.to_string());
                out.line(format!(
                    "local {handle} = {}({}, {maximum})",
                    names::MEMORY_ALLOC,
                    limits.initial
                ));
            }
            Field::Table(_) => {
                let handle = state.add_table();
                out.line(format!("local {}, {} = {{}}, 1", handle.funcs, handle.offset));
            }
            Field::Global(_) => {
                state.add_global();
            }
            Field::Unsupported(description) => {
                warn(out, &format!("unsupported {description}"));
            }
            _ => {}
        }
    }
}

fn is_pruned(module: &Module, options: &TranspileOptions, index: u32, entry: &FunctionEntry) -> bool {
    let Some(whitelist) = &options.whitelist else {
        return false;
    };
    if whitelist.contains(&entry.orig_name) {
        return false;
    }
    !module.fields.iter().any(|field| {
        matches!(field, Field::Export(export)
            if export.kind == crate::ast::ExportKind::Func
                && export.index == index
                && whitelist.contains(&export.name))
    })
}

fn param_names(entry: &FunctionEntry) -> Vec<String> {
    let count = entry.ty.as_ref().map_or(0, |ty| ty.params.len());
    (0..count).map(|i| format!("reg{i}")).collect()
}

fn emit_stub(out: &mut LuaWriter, entry: &FunctionEntry, statement: &str) {
    out.line(format!(
        "function {}({})",
        entry.id,
        param_names(entry).join(", ")
    ));
    out.indent();
    out.line(statement);
    out.outdent();
    out.line("end");
}

fn emit_functions<B: Backend>(
    translator: &Translator<'_, B>,
    state: &ModuleState,
    module: &Module,
    options: &TranspileOptions,
    out: &mut LuaWriter,
) -> Result<()> {
    let mut index = state.imported_function_count() as u32;
    let (mut translated, mut rejected, mut pruned) = (0usize, 0usize, 0usize);
    for field in &module.fields {
        let Field::Func(func) = field else {
            continue;
        };
        let entry = state
            .function(index)
            .with_context(|| format!("function {index} was not registered"))?;
        index += 1;

        if is_pruned(module, options, index - 1, entry) {
            pruned += 1;
            let message = format!("!!! PRUNED: {}", entry.id);
            emit_stub(out, entry, &format!("print({})", lua_string(&message)));
            continue;
        }

        match translator.translate_function(&entry.id, &entry.orig_name, func) {
            Ok(function) => {
                translated += 1;
                emit_function(out, entry, &function);
            }
            Err(err) => match err.downcast_ref::<Rejected>() {
                Some(rejection) => {
                    rejected += 1;
                    log::error!("{}: {}", entry.orig_name, rejection);
                    let message = format!("FUNCTION REJECTED: {}", rejection.reason);
                    emit_stub(out, entry, &format!("error({});", lua_string(&message)));
                }
                None => {
                    return Err(err).with_context(|| {
                        format!("failed to translate function {}", entry.orig_name)
                    })
                }
            },
        }
    }
    log::info!(
        "translated {} functions ({} rejected, {} pruned)",
        translated,
        rejected,
        pruned
    );
    Ok(())
}

fn emit_function(out: &mut LuaWriter, entry: &FunctionEntry, function: &TranslatedFunction) {
    let params = function.params.join(", ");
    if !function.uses_setjmp {
        out.line(format!("function {}({params})", entry.id));
        out.indent();
        out.block(&function.body);
        out.outdent();
        out.line("end");
        return;
    }

    let internal = format!("{}{SETJMP_INTERNAL_SUFFIX}", entry.id);
    let mut internal_params = vec!["__setjmp_data__".to_string(), "__setjmp_frame__".to_string()];
    internal_params.extend(function.params.iter().cloned());
    out.line(format!("function {internal}({})", internal_params.join(", ")));
    out.indent();
    out.block(&function.body);
    out.outdent();
    out.line("end");

    let returns: Vec<String> = (0..function.result_count.max(1))
        .map(|i| format!("ret{i}"))
        .collect();
    let mut call_args = vec!["setjmp_state".to_string(), "setjmp_frame".to_string()];
    call_args.extend(function.params.iter().cloned());

    out.line(format!("function {}({params})", entry.id));
    out.indent();
    out.line("local setjmp_frame, setjmp_state = {}, nil");
    out.line("::start::");
    out.line(format!(
        "local ok, {} = pcall({internal}, {})",
        returns.join(", "),
        call_args.join(", ")
    ));
    out.line("if not ok then");
    out.indent();
    out.line("if type(ret0) == \"table\" and ret0.frame == setjmp_frame then");
    out.indent();
    out.line("setjmp_state = ret0");
    out.line("goto start");
    out.outdent();
    out.line("end");
    out.line("error(ret0, 0)");
    out.outdent();
    out.line("end");
    if function.result_count == 0 {
        out.line("return");
    } else {
        out.line(format!("return {}", returns[..function.result_count].join(", ")));
    }
    out.outdent();
    out.line("end");
}

/// Emit an initializer expression as a `do ... end` region and let
/// `consume` produce the statement that stores its value.
fn emit_initializer<B: Backend>(
    translator: &Translator<'_, B>,
    id: &str,
    expr: &[crate::ast::Instr],
    out: &mut LuaWriter,
    consume: impl FnOnce(&str) -> String,
) -> Result<()> {
    let function = translator
        .translate_expression(id, expr)
        .with_context(|| format!("failed to translate {id} expression"))?;
    let value = function.value.as_deref().unwrap_or("nil");
    out.line("do");
    out.indent();
    out.block(&function.body);
    out.line(consume(value));
    out.outdent();
    out.line("end");
    Ok(())
}

fn emit_globals<B: Backend>(
    translator: &Translator<'_, B>,
    state: &ModuleState,
    backend: &B,
    module: &Module,
    out: &mut LuaWriter,
) -> Result<()> {
    let imported = module
        .fields
        .iter()
        .filter(|f| matches!(f, Field::Import(i) if matches!(i.desc, ImportDesc::Global { .. })))
        .count();
    let defined = module.fields.iter().filter_map(|f| match f {
        Field::Global(global) => Some(global),
        _ => None,
    });
    for (k, global) in defined.enumerate() {
        let Some(slot) = state.global_slot((imported + k) as u32) else {
            continue;
        };
        let target = backend.global(slot);
        emit_initializer(translator, "__GLOBAL_INIT__", &global.init, out, |value| {
            format!("{target} = {value}")
        })?;
    }
    Ok(())
}

fn emit_elements<B: Backend>(
    translator: &Translator<'_, B>,
    state: &ModuleState,
    module: &Module,
    out: &mut LuaWriter,
) -> Result<()> {
    for field in &module.fields {
        let Field::Elem(elem) = field else {
            continue;
        };
        let Some(table) = state.table(elem.table) else {
            warn(out, &format!("element segment for missing table {}", elem.table));
            continue;
        };
        let mut ids = Vec::with_capacity(elem.funcs.len());
        for func in &elem.funcs {
            match func.and_then(|index| state.function(index)) {
                Some(entry) => ids.push(entry.id.clone()),
                None => {
                    if let Some(index) = func {
                        warn(out, &format!("element refers to missing function {index}"));
                    }
                    ids.push("false".to_string());
                }
            }
        }
        emit_initializer(translator, "__TABLE_INIT__", &elem.offset, out, |value| {
            format!(
                "{}({}, {} + {value}, {{{}}})",
                names::TABLE_INIT,
                table.funcs,
                table.offset,
                ids.join(", ")
            )
        })?;
    }
    Ok(())
}

fn emit_data<B: Backend>(
    translator: &Translator<'_, B>,
    state: &ModuleState,
    module: &Module,
    out: &mut LuaWriter,
) -> Result<()> {
    for field in &module.fields {
        let Field::Data(data) = field else {
            continue;
        };
        let Some(memory) = state.memory(data.memory) else {
            warn(out, &format!("data segment for missing memory {}", data.memory));
            continue;
        };
        emit_initializer(translator, "__DATA_INIT__", &data.offset, out, |value| {
            format!(
                "{}({memory}, {value}, {})",
                names::MEMORY_INIT,
                lua_bytes(&data.bytes)
            )
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FuncType;

    fn entry(params: usize) -> FunctionEntry {
        FunctionEntry {
            id: "f".into(),
            orig_name: "f".into(),
            ty: Some(FuncType {
                params: vec![crate::ast::WasmType::I32; params],
                results: vec![],
            }),
            imported: false,
        }
    }

    #[test]
    fn stub_keeps_arity() {
        let mut out = LuaWriter::new();
        emit_stub(&mut out, &entry(2), "print(\"x\")");
        assert_eq!(out.finish(), "function f(reg0, reg1)\n    print(\"x\")\nend\n");
    }

    #[test]
    fn setjmp_function_gets_trampoline() {
        let function = TranslatedFunction {
            params: vec!["reg0".into()],
            body: "do return reg0 end\n".into(),
            result_count: 1,
            uses_setjmp: true,
            value: None,
            declared: vec![],
            warnings: 0,
        };
        let mut out = LuaWriter::new();
        emit_function(&mut out, &entry(1), &function);
        let text = out.finish();
        assert!(text.contains("function f__setjmp_internal(__setjmp_data__, __setjmp_frame__, reg0)"));
        assert!(text.contains("local ok, ret0 = pcall(f__setjmp_internal, setjmp_state, setjmp_frame, reg0)"));
        assert!(text.contains("ret0.frame == setjmp_frame"));
        assert!(text.contains("goto start"));
        assert!(text.trim_end().ends_with("return ret0\nend"));
    }
}
