use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use wasm2lua::{transpile, CompileFlag, RegisterStrategy, TranspileOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// A fresh Lua local per value
    Virtual,
    /// Reuse released locals
    Pooled,
}

impl From<Strategy> for RegisterStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Virtual => RegisterStrategy::Virtual,
            Strategy::Pooled => RegisterStrategy::Pooled,
        }
    }
}

/// wasm2lua: WebAssembly to Lua translator.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input WebAssembly binary (.wasm)
    input: PathBuf,

    /// Output Lua source file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Keep only these functions (by name or export name)
    #[arg(long, value_delimiter = ',')]
    whitelist: Option<Vec<String>>,

    /// Feature toggles, e.g. correct-multiply,debug-stack
    #[arg(long, value_delimiter = ',')]
    compile_flags: Vec<CompileFlag>,

    /// Bisect branch tables with more targets than this
    #[arg(long)]
    jmp_stream_threshold: Option<usize>,

    #[arg(long, value_enum, default_value_t = Strategy::Pooled)]
    register_strategy: Strategy,

    /// Reject functions with larger branch tables
    #[arg(long, default_value_t = 1000)]
    br_table_limit: usize,

    /// Reject functions with more instructions
    #[arg(long, default_value_t = 1_000_000)]
    max_function_instructions: usize,

    /// Log everything down to trace level
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> TranspileOptions {
        TranspileOptions {
            whitelist: self
                .whitelist
                .as_ref()
                .map(|names| names.iter().cloned().collect()),
            compile_flags: self.compile_flags.iter().copied().collect::<BTreeSet<_>>(),
            jmp_stream_threshold: self.jmp_stream_threshold,
            register_strategy: self.register_strategy.into(),
            br_table_limit: self.br_table_limit,
            max_function_instructions: self.max_function_instructions,
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    eprintln!("wasm2lua: translating {}", cli.input.display());

    let wasm_bytes =
        fs::read(&cli.input).with_context(|| format!("failed to read {}", cli.input.display()))?;
    let lua = transpile(&wasm_bytes, &cli.options()).context("translation failed")?;

    if let Some(output_path) = &cli.output {
        fs::write(output_path, &lua)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        eprintln!("wasm2lua: wrote {}", output_path.display());
    } else {
        print!("{lua}");
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        colog::default_builder()
            .filter_level(log::LevelFilter::Trace)
            .init();
    } else {
        colog::default_builder()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    if let Err(e) = run(&cli) {
        eprintln!("wasm2lua: {e:#}");
        std::process::exit(1);
    }
}
