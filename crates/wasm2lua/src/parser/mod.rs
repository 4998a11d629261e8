//! WebAssembly module parser.
//!
//! This module wraps the `wasmparser` crate and produces the decoded tree in
//! [`crate::ast`]. Structured instructions are nested as they are read, so
//! the translator never sees `else`/`end` markers.

mod operator;

use crate::ast::{
    Data, Elem, Export, ExportKind, Field, Func, FuncType, Global, Import, ImportDesc, Instr,
    Limits, Module, Op, WasmType,
};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use wasmparser::{
    Encoding, ExternalKind, KnownCustom, Name, OperatorsReader, Parser, Payload, TypeRef, ValType,
};

pub(crate) fn wasm_type(ty: ValType) -> Result<WasmType> {
    match ty {
        ValType::I32 => Ok(WasmType::I32),
        ValType::I64 => Ok(WasmType::I64),
        ValType::F32 => Ok(WasmType::F32),
        ValType::F64 => Ok(WasmType::F64),
        other => bail!("unsupported value type {:?}", other),
    }
}

/// A structured instruction whose body is still being read.
struct OpenBlock {
    op: Op,
    offset: usize,
    /// Instructions of the enclosing body, restored when this block closes.
    outer: Vec<Instr>,
    /// Set once an `if` reaches its `else`.
    has_else: bool,
}

/// Read an operator stream up to its final `end` into a nested body.
fn read_body(mut reader: OperatorsReader) -> Result<Vec<Instr>> {
    let mut open: Vec<OpenBlock> = Vec::new();
    let mut current: Vec<Instr> = Vec::new();

    while !reader.eof() {
        let (op, offset) = reader.read_with_offset().context("reading operator")?;
        match op {
            wasmparser::Operator::Block { blockty } => open.push(OpenBlock {
                op: Op::Block {
                    ty: operator::block_type(blockty)?,
                    body: Vec::new(),
                },
                offset,
                outer: std::mem::take(&mut current),
                has_else: false,
            }),
            wasmparser::Operator::Loop { blockty } => open.push(OpenBlock {
                op: Op::Loop {
                    ty: operator::block_type(blockty)?,
                    body: Vec::new(),
                },
                offset,
                outer: std::mem::take(&mut current),
                has_else: false,
            }),
            wasmparser::Operator::If { blockty } => open.push(OpenBlock {
                op: Op::If {
                    ty: operator::block_type(blockty)?,
                    consequent: Vec::new(),
                    alternate: None,
                },
                offset,
                outer: std::mem::take(&mut current),
                has_else: false,
            }),
            wasmparser::Operator::Else => {
                let Some(OpenBlock {
                    op: Op::If { consequent, .. },
                    has_else,
                    ..
                }) = open.last_mut()
                else {
                    bail!("`else` outside of `if` at offset {offset}");
                };
                *consequent = std::mem::take(&mut current);
                *has_else = true;
            }
            wasmparser::Operator::End => {
                let Some(block) = open.pop() else {
                    // End of the whole body
                    break;
                };
                let body = std::mem::replace(&mut current, block.outer);
                let op = match block.op {
                    Op::Block { ty, .. } => Op::Block { ty, body },
                    Op::Loop { ty, .. } => Op::Loop { ty, body },
                    Op::If { ty, consequent, .. } if block.has_else => Op::If {
                        ty,
                        consequent,
                        alternate: Some(body),
                    },
                    Op::If { ty, .. } => Op::If {
                        ty,
                        consequent: body,
                        alternate: None,
                    },
                    other => other,
                };
                current.push(Instr::new(op, block.offset));
            }
            other => current.push(Instr::new(operator::convert(other)?, offset)),
        }
    }

    if !open.is_empty() {
        bail!("{} unterminated block(s)", open.len());
    }
    Ok(current)
}

fn read_const_expr(expr: &wasmparser::ConstExpr) -> Result<Vec<Instr>> {
    read_body(expr.get_operators_reader()).context("reading constant expression")
}

fn parse_elem(element: wasmparser::Element) -> Result<Option<Elem>> {
    let wasmparser::ElementKind::Active {
        table_index,
        offset_expr,
    } = element.kind
    else {
        // Passive and declared segments never reach a table at start-up
        return Ok(None);
    };

    let mut funcs = Vec::new();
    match element.items {
        wasmparser::ElementItems::Functions(reader) => {
            for index in reader {
                funcs.push(Some(index.context("reading element func index")?));
            }
        }
        wasmparser::ElementItems::Expressions(_, reader) => {
            for expr in reader {
                let expr = expr.context("reading element expression")?;
                let mut ops = expr.get_operators_reader();
                match ops.read().context("reading element expression")? {
                    wasmparser::Operator::RefFunc { function_index } => {
                        funcs.push(Some(function_index))
                    }
                    wasmparser::Operator::RefNull { .. } => funcs.push(None),
                    other => bail!("unsupported element expression {:?}", other),
                }
            }
        }
    }

    Ok(Some(Elem {
        table: table_index.unwrap_or(0),
        offset: read_const_expr(&offset_expr)?,
        funcs,
    }))
}

fn parse_data(data: wasmparser::Data) -> Result<Option<Data>> {
    match data.kind {
        wasmparser::DataKind::Active {
            memory_index,
            offset_expr,
        } => Ok(Some(Data {
            memory: memory_index,
            offset: read_const_expr(&offset_expr)?,
            bytes: data.data.to_vec(),
        })),
        // Passive segments are only used by memory.init
        wasmparser::DataKind::Passive => Ok(None),
    }
}

fn parse_code_entry(body: wasmparser::FunctionBody, type_index: u32) -> Result<Func> {
    let mut locals = Vec::new();
    let locals_reader = body.get_locals_reader().context("getting locals reader")?;
    for local in locals_reader {
        let (count, val_type) = local.context("reading local")?;
        let ty = wasm_type(val_type)?;
        locals.extend(std::iter::repeat(ty).take(count as usize));
    }

    let operators = body
        .get_operators_reader()
        .context("getting operators reader")?;

    Ok(Func {
        name: None,
        type_index,
        locals,
        body: read_body(operators)?,
    })
}

/// Names from the `name` custom section. Malformed entries are skipped.
#[derive(Default)]
struct Names {
    module: Option<String>,
    functions: BTreeMap<u32, String>,
}

fn read_names(reader: wasmparser::NameSectionReader, names: &mut Names) {
    for subsection in reader {
        match subsection {
            Ok(Name::Module { name, .. }) => names.module = Some(name.to_string()),
            Ok(Name::Function(map)) => {
                for naming in map.into_iter().flatten() {
                    names.functions.insert(naming.index, naming.name.to_string());
                }
            }
            Ok(_) => {}
            Err(err) => {
                log::warn!("ignoring malformed name section: {err}");
                return;
            }
        }
    }
}

/// Parse a WebAssembly binary into a decoded module tree.
pub fn parse_wasm(wasm_bytes: &[u8]) -> Result<Module> {
    let parser = Parser::new(0);

    let mut types = Vec::new();
    let mut function_types: Vec<u32> = Vec::new();
    let mut fields = Vec::new();
    let mut names = Names::default();
    let mut num_imported_functions: u32 = 0;
    let mut num_defined_functions: usize = 0;

    for payload in parser.parse_all(wasm_bytes) {
        let payload = payload.context("parsing wasm payload")?;

        match payload {
            Payload::Version { encoding, .. } => {
                if encoding != Encoding::Module {
                    bail!("only core WebAssembly modules are supported");
                }
            }

            Payload::TypeSection(reader) => {
                for rec_group in reader {
                    let rec_group = rec_group.context("reading rec group")?;
                    for sub_type in rec_group.types() {
                        match &sub_type.composite_type.inner {
                            wasmparser::CompositeInnerType::Func(func_ty) => {
                                types.push(FuncType {
                                    params: func_ty
                                        .params()
                                        .iter()
                                        .map(|ty| wasm_type(*ty))
                                        .collect::<Result<_>>()?,
                                    results: func_ty
                                        .results()
                                        .iter()
                                        .map(|ty| wasm_type(*ty))
                                        .collect::<Result<_>>()?,
                                });
                            }
                            _ => {
                                // Keep type indices aligned; GC types are never called
                                types.push(FuncType::default());
                                fields.push(Field::Unsupported("non-function type".into()));
                            }
                        }
                    }
                }
            }

            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import.context("reading import")?;
                    let desc = match import.ty {
                        TypeRef::Func(type_index) => {
                            num_imported_functions += 1;
                            ImportDesc::Func { type_index }
                        }
                        TypeRef::Global(global_ty) => ImportDesc::Global {
                            ty: wasm_type(global_ty.content_type)?,
                            mutable: global_ty.mutable,
                        },
                        TypeRef::Memory(mem_ty) => ImportDesc::Memory(Limits {
                            initial: mem_ty.initial,
                            maximum: mem_ty.maximum,
                        }),
                        TypeRef::Table(table_ty) => ImportDesc::Table(Limits {
                            initial: table_ty.initial.into(),
                            maximum: table_ty.maximum.map(Into::into),
                        }),
                        other => {
                            fields.push(Field::Unsupported(format!(
                                "import {}.{} of kind {:?}",
                                import.module, import.name, other
                            )));
                            continue;
                        }
                    };
                    fields.push(Field::Import(Import {
                        module: import.module.to_string(),
                        name: import.name.to_string(),
                        desc,
                    }));
                }
            }

            Payload::FunctionSection(reader) => {
                for func_type_idx in reader {
                    let func_type_idx = func_type_idx.context("reading function type index")?;
                    function_types.push(func_type_idx);
                }
            }

            Payload::CodeSectionEntry(body) => {
                let Some(&type_index) = function_types.get(num_defined_functions) else {
                    bail!("code entry {num_defined_functions} has no function declaration");
                };
                let func = parse_code_entry(body, type_index).with_context(|| {
                    format!(
                        "parsing body of function {}",
                        num_imported_functions as usize + num_defined_functions
                    )
                })?;
                num_defined_functions += 1;
                fields.push(Field::Func(func));
            }

            Payload::MemorySection(reader) => {
                for mem in reader {
                    let memory_type = mem.context("reading memory type")?;
                    fields.push(Field::Memory(Limits {
                        initial: memory_type.initial,
                        maximum: memory_type.maximum,
                    }));
                }
            }

            Payload::TableSection(reader) => {
                for tbl in reader {
                    let tbl = tbl.context("reading table type")?;
                    fields.push(Field::Table(Limits {
                        initial: tbl.ty.initial.into(),
                        maximum: tbl.ty.maximum.map(Into::into),
                    }));
                }
            }

            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global.context("reading global")?;
                    fields.push(Field::Global(Global {
                        ty: wasm_type(global.ty.content_type)?,
                        mutable: global.ty.mutable,
                        init: read_const_expr(&global.init_expr)?,
                    }));
                }
            }

            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.context("reading export")?;
                    let kind = match export.kind {
                        ExternalKind::Func => ExportKind::Func,
                        ExternalKind::Table => ExportKind::Table,
                        ExternalKind::Memory => ExportKind::Memory,
                        ExternalKind::Global => ExportKind::Global,
                        other => {
                            fields.push(Field::Unsupported(format!(
                                "export {} of kind {:?}",
                                export.name, other
                            )));
                            continue;
                        }
                    };
                    fields.push(Field::Export(Export {
                        name: export.name.to_string(),
                        kind,
                        index: export.index,
                    }));
                }
            }

            Payload::StartSection { func, .. } => fields.push(Field::Start(func)),

            Payload::ElementSection(reader) => {
                for element in reader {
                    let element = element.context("reading element segment")?;
                    if let Some(segment) = parse_elem(element)? {
                        fields.push(Field::Elem(segment));
                    }
                }
            }

            Payload::DataSection(reader) => {
                for data in reader {
                    let data = data.context("reading data segment")?;
                    if let Some(segment) = parse_data(data)? {
                        fields.push(Field::Data(segment));
                    }
                }
            }

            Payload::CustomSection(reader) => {
                if let KnownCustom::Name(name_reader) = reader.as_known() {
                    read_names(name_reader, &mut names);
                }
            }

            Payload::TagSection(_) => fields.push(Field::Unsupported("tag section".into())),

            Payload::UnknownSection { id, .. } => {
                fields.push(Field::Unsupported(format!("unknown section {id}")))
            }

            _ => {}
        }
    }

    // The name section trails the code section, so names are attached last
    let mut func_index = num_imported_functions;
    for field in &mut fields {
        if let Field::Func(func) = field {
            func.name = names.functions.get(&func_index).cloned();
            func_index += 1;
        }
    }

    Ok(Module {
        name: names.module,
        types,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, BlockType, Value};

    fn parse_wat(wat: &str) -> Module {
        let wasm = wat::parse_str(wat).unwrap();
        parse_wasm(&wasm).unwrap()
    }

    fn funcs(module: &Module) -> Vec<&Func> {
        module
            .fields
            .iter()
            .filter_map(|f| match f {
                Field::Func(func) => Some(func),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parse_minimal_module() {
        let module = parse_wat("(module)");
        assert!(module.types.is_empty());
        assert!(module.fields.is_empty());
    }

    #[test]
    fn parse_add_function() {
        let module = parse_wat(
            r#"
            (module
                (func (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    i32.add
                )
            )
        "#,
        );
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.types[0].params, vec![WasmType::I32, WasmType::I32]);
        let funcs = funcs(&module);
        assert_eq!(funcs.len(), 1);
        let ops: Vec<_> = funcs[0].body.iter().map(|i| i.op.clone()).collect();
        assert_eq!(
            ops,
            vec![
                Op::LocalGet(0),
                Op::LocalGet(1),
                Op::Binary(WasmType::I32, BinaryOp::Add)
            ]
        );
    }

    #[test]
    fn parse_nests_blocks() {
        let module = parse_wat(
            r#"
            (module
                (func (param i32) (result i32)
                    (block (result i32)
                        (loop
                            local.get 0
                            br_if 0
                        )
                        i32.const 7
                    )
                )
            )
        "#,
        );
        let body = &funcs(&module)[0].body;
        assert_eq!(body.len(), 1);
        let Op::Block { ty, body: inner } = &body[0].op else {
            panic!("expected block, got {:?}", body[0].op);
        };
        assert_eq!(*ty, BlockType::Value(WasmType::I32));
        assert!(matches!(inner[0].op, Op::Loop { .. }));
        assert_eq!(inner[1].op, Op::Const(Value::I32(7)));
    }

    #[test]
    fn parse_if_else_arms() {
        let module = parse_wat(
            r#"
            (module
                (func (param i32) (result i32)
                    local.get 0
                    (if (result i32)
                        (then i32.const 1)
                        (else i32.const 2 drop i32.const 3)
                    )
                )
            )
        "#,
        );
        let body = &funcs(&module)[0].body;
        let Op::If {
            consequent,
            alternate,
            ..
        } = &body[1].op
        else {
            panic!("expected if");
        };
        assert_eq!(consequent.len(), 1);
        assert_eq!(alternate.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn parse_if_without_else() {
        let module = parse_wat(
            r#"
            (module
                (func (param i32)
                    (if (local.get 0) (then nop))
                )
            )
        "#,
        );
        let body = &funcs(&module)[0].body;
        let Op::If {
            consequent,
            alternate,
            ..
        } = &body[1].op
        else {
            panic!("expected if");
        };
        assert_eq!(consequent.len(), 1);
        assert!(alternate.is_none());
    }

    #[test]
    fn parse_offsets_are_distinct() {
        let module = parse_wat(
            r#"
            (module
                (func
                    (block (block nop))
                )
            )
        "#,
        );
        let body = &funcs(&module)[0].body;
        let Op::Block { body: inner, .. } = &body[0].op else {
            panic!("expected block");
        };
        assert_ne!(body[0].offset, inner[0].offset);
    }

    #[test]
    fn parse_memory_section() {
        let module = parse_wat("(module (memory 2 10))");
        assert_eq!(
            module.fields,
            vec![Field::Memory(Limits {
                initial: 2,
                maximum: Some(10)
            })]
        );
    }

    #[test]
    fn parse_mutable_global() {
        let module = parse_wat("(module (global (mut i32) (i32.const 42)))");
        let Field::Global(global) = &module.fields[0] else {
            panic!("expected global");
        };
        assert!(global.mutable);
        assert_eq!(global.ty, WasmType::I32);
        assert_eq!(global.init[0].op, Op::Const(Value::I32(42)));
    }

    #[test]
    fn parse_names() {
        let module = parse_wat(
            r#"
            (module $demo
                (import "env" "setjmp" (func $setjmp (param i32) (result i32)))
                (func $first)
                (func $second)
            )
        "#,
        );
        assert_eq!(module.name.as_deref(), Some("demo"));
        let names: Vec<_> = funcs(&module).iter().map(|f| f.name.clone()).collect();
        assert_eq!(
            names,
            vec![Some("first".to_string()), Some("second".to_string())]
        );
    }

    #[test]
    fn parse_segments() {
        let module = parse_wat(
            r#"
            (module
                (memory 1)
                (table 2 funcref)
                (func $f)
                (elem (i32.const 1) $f)
                (data (i32.const 8) "hi")
            )
        "#,
        );
        let elem = module.fields.iter().find_map(|f| match f {
            Field::Elem(e) => Some(e),
            _ => None,
        });
        let elem = elem.expect("element segment");
        assert_eq!(elem.funcs, vec![Some(0)]);
        assert_eq!(elem.offset[0].op, Op::Const(Value::I32(1)));

        let data = module.fields.iter().find_map(|f| match f {
            Field::Data(d) => Some(d),
            _ => None,
        });
        assert_eq!(data.expect("data segment").bytes, b"hi".to_vec());
    }

    #[test]
    fn parse_unsupported_opcode() {
        let module = parse_wat(
            r#"
            (module
                (memory 1)
                (func
                    i32.const 0
                    i32.const 0
                    i32.const 0
                    memory.copy
                )
            )
        "#,
        );
        let body = &funcs(&module)[0].body;
        assert_eq!(body[3].op, Op::Unsupported("MemoryCopy".into()));
    }

    #[test]
    fn parse_rejects_multi_value_blocks() {
        let wasm = wat::parse_str(
            r#"
            (module
                (func (result i32 i32)
                    (block (result i32 i32)
                        i32.const 1
                        i32.const 2
                    )
                )
            )
        "#,
        )
        .unwrap();
        assert!(parse_wasm(&wasm).is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_wasm(b"not wasm").is_err());
    }
}
