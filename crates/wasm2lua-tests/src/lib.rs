//! Execution harness for translated modules.
//!
//! A test translates a WAT module, appends a small driver that calls one
//! export through `pcall` and renders what came back, and runs the chunk on
//! an embedded LuaJIT. Setting `WASM2LUA_LUA` runs the chunk under that
//! interpreter instead.

use anyhow::{anyhow, bail, Context, Result};
use mlua::Lua;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use wasm2lua::codegen::utils::lua_string;
use wasm2lua::parser::parse_wasm;
use wasm2lua::{transpile_module, TranspileOptions};
use wasm2lua_runtime::ops::LongInt;

/// Environment variable naming an external Lua interpreter.
pub const LUA_ENV: &str = "WASM2LUA_LUA";

/// Module name every harness module is registered under.
const MODULE_NAME: &str = "harness";

const DRIVER: &str = r##"
local function show(v)
    if type(v) == "table" then
        return string.format("L%d:%d", v[1], v[2])
    elseif type(v) == "number" then
        return string.format("%.17g", v)
    end
    return tostring(v)
end

local function report(ok, ...)
    if not ok then
        return "TRAP:" .. tostring((...))
    end
    local shown = {}
    for i = 1, select("#", ...) do
        shown[i] = show((select(i, ...)))
    end
    return table.concat(shown, " ")
end
"##;

/// An argument passed to an export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    I32(i32),
    I64(i64),
    F64(f64),
}

impl Arg {
    fn lua(self) -> String {
        match self {
            Arg::I32(v) => format!("({v})"),
            Arg::I64(v) => {
                let long = LongInt::from(v);
                format!("__LONG_INT__({}, {})", long.low, long.high)
            }
            Arg::F64(v) if v.is_nan() => "(0/0)".to_string(),
            Arg::F64(v) if v.is_infinite() => {
                if v > 0.0 { "math.huge" } else { "(-math.huge)" }.to_string()
            }
            Arg::F64(v) => format!("({v:?})"),
        }
    }
}

/// What an export call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Values(Vec<String>),
    Trap(String),
}

impl Outcome {
    pub fn values(&self) -> Result<&[String]> {
        match self {
            Outcome::Values(values) => Ok(values),
            Outcome::Trap(message) => bail!("unexpected trap: {message}"),
        }
    }

    pub fn i32(&self) -> Result<i32> {
        let text = self.values()?.first().context("no result")?;
        let value: f64 = text.parse().with_context(|| format!("not a number: {text}"))?;
        Ok(value as i32)
    }

    pub fn i64(&self) -> Result<i64> {
        let text = self.values()?.first().context("no result")?;
        let halves = text
            .strip_prefix('L')
            .and_then(|rest| rest.split_once(':'))
            .with_context(|| format!("not a long int: {text}"))?;
        let low: f64 = halves.0.parse()?;
        let high: f64 = halves.1.parse()?;
        Ok(LongInt::new(low as i32, high as i32).into())
    }

    pub fn f64(&self) -> Result<f64> {
        let text = self.values()?.first().context("no result")?;
        match text.as_str() {
            "nan" | "-nan" => Ok(f64::NAN),
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            _ => text.parse().with_context(|| format!("not a number: {text}")),
        }
    }

    pub fn is_trap(&self, message: &str) -> bool {
        matches!(self, Outcome::Trap(text) if text.contains(message))
    }
}

/// Translate WAT with the harness module name.
pub fn translate(wat: &str, options: &TranspileOptions) -> Result<String> {
    let wasm = wat::parse_str(wat).context("failed to parse WAT")?;
    let mut module = parse_wasm(&wasm)?;
    module.name = Some(MODULE_NAME.to_string());
    transpile_module(&module, options)
}

/// Runs Lua programs on an embedded LuaJIT or an external interpreter.
#[derive(Debug, Clone, Default)]
pub struct LuaRunner {
    interpreter: Option<PathBuf>,
}

impl LuaRunner {
    /// Embedded LuaJIT, unless `WASM2LUA_LUA` names an interpreter.
    pub fn new() -> Self {
        Self {
            interpreter: std::env::var_os(LUA_ENV)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Run `program`, then evaluate `result` (a Lua string expression) and
    /// return its value.
    pub fn eval(&self, program: &str, result: &str) -> Result<String> {
        match &self.interpreter {
            None => {
                let lua = Lua::new();
                lua.load(format!("{program}\nreturn {result}\n"))
                    .set_name("harness")
                    .eval::<String>()
                    .map_err(|e| anyhow!("lua error: {e}"))
            }
            Some(interpreter) => {
                self.run_external(interpreter, &format!("{program}\nio.write({result})\n"))
            }
        }
    }

    fn run_external(&self, interpreter: &Path, program: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .suffix(".lua")
            .tempfile()
            .context("failed to create temporary Lua file")?;
        file.write_all(program.as_bytes())?;
        file.flush()?;

        let output = Command::new(interpreter)
            .arg(file.path())
            .output()
            .with_context(|| format!("failed to run {}", interpreter.display()))?;
        if !output.status.success() {
            bail!(
                "lua exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Translate `wat` and call `export` with `args`.
    pub fn call(&self, wat: &str, export: &str, args: &[Arg]) -> Result<Outcome> {
        self.call_with(wat, &TranspileOptions::default(), export, args)
    }

    pub fn call_with(
        &self,
        wat: &str,
        options: &TranspileOptions,
        export: &str,
        args: &[Arg],
    ) -> Result<Outcome> {
        let mut program = translate(wat, options)?;
        program.push_str(DRIVER);
        let args: Vec<String> = args.iter().map(|a| a.lua()).collect();
        let mut call_args = vec![format!(
            "__MODULES__.{MODULE_NAME}[{}]",
            lua_string(export)
        )];
        call_args.extend(args);
        let result = format!("report(pcall({}))", call_args.join(", "));

        let text = self.eval(&program, &result)?;
        Ok(match text.strip_prefix("TRAP:") {
            Some(message) => Outcome::Trap(message.to_string()),
            None if text.is_empty() => Outcome::Values(Vec::new()),
            None => Outcome::Values(text.split(' ').map(str::to_string).collect()),
        })
    }
}
