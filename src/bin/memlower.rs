// src/bin/memlower.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use memlower::compiler::{AddressingWidth, ByteOrder, CompilationUnit, CompileOptions, Compiler};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Lowers typed pointers, structs and atomics into linear-memory operations
#[derive(Parser)]
#[command(name = "memlower")]
#[command(version, about = "Lower C-style memory operations in a typed program", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite one compilation unit
    Compile {
        /// Compilation unit (JSON: path, program, types)
        #[arg(value_name = "UNIT")]
        unit: PathBuf,

        /// Output file; stdout when absent
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output form
        #[arg(long, value_enum, default_value_t = Emit::Js)]
        emit: Emit,

        #[command(flatten)]
        config: ConfigArgs,

        /// Fail when anything was reported
        #[arg(long)]
        deny_diagnostics: bool,
    },
    /// Print the layout of every aggregate a unit declares
    Layout {
        /// Compilation unit (JSON: path, program, types)
        #[arg(value_name = "UNIT")]
        unit: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Emit {
    /// Imports followed by the rewritten program text
    Js,
    /// The rewritten tree, imports and diagnostics as JSON
    Json,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// Options file (JSON); command-line switches override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Define a compile-time flag
    #[arg(short = 'D', value_name = "NAME=VALUE")]
    define: Vec<String>,

    /// 64-bit addressing
    #[arg(long)]
    wasm64: bool,

    /// Big-endian bit-field placement
    #[arg(long)]
    big_endian: bool,

    /// Assembler executable for `asm` templates
    #[arg(long, value_name = "PATH")]
    assembler: Option<PathBuf>,

    /// Scratch directory for the assembler
    #[arg(long, value_name = "DIR")]
    temp_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn options(&self) -> Result<CompileOptions> {
        let mut options = match &self.config {
            Some(path) => CompileOptions::load(path)
                .with_context(|| format!("reading options from {}", path.display()))?,
            None => CompileOptions::default(),
        };
        for definition in &self.define {
            options.define(definition)?;
        }
        if self.wasm64 {
            options.addressing_width = AddressingWidth::Bits64;
        }
        if self.big_endian {
            options.byte_order = ByteOrder::Big;
        }
        if let Some(assembler) = &self.assembler {
            options.assembler = assembler.clone();
        }
        if let Some(dir) = &self.temp_dir {
            options.temp_dir = Some(dir.clone());
        }
        Ok(options)
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Compile {
            unit,
            output,
            emit,
            config,
            deny_diagnostics,
        } => compile(&unit, output.as_deref(), emit, &config, deny_diagnostics),
        Commands::Layout { unit, config } => layout(&unit, &config),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_unit(path: &Path) -> Result<CompilationUnit> {
    CompilationUnit::load(path).with_context(|| format!("loading {}", path.display()))
}

fn compile(
    unit_path: &Path,
    output: Option<&Path>,
    emit: Emit,
    config: &ConfigArgs,
    deny_diagnostics: bool,
) -> Result<ExitCode> {
    let unit = load_unit(unit_path)?;
    let mut compiler = Compiler::new(config.options()?);
    let result = compiler.compile_unit(&unit)?;
    let text = match emit {
        Emit::Js => result.render(),
        Emit::Json => serde_json::to_string_pretty(&result)?,
    };
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?
        }
        None => print!("{}", text),
    }
    if deny_diagnostics && !result.is_clean() {
        eprintln!("{} diagnostic(s) reported", result.diagnostics.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn layout(unit_path: &Path, config: &ConfigArgs) -> Result<ExitCode> {
    let unit = load_unit(unit_path)?;
    let compiler = Compiler::new(config.options()?);
    let layouts = compiler.layouts(&unit);
    println!("{}", serde_json::to_string_pretty(&layouts)?);
    Ok(ExitCode::SUCCESS)
}
