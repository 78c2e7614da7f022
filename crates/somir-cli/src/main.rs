//! Somir command-line tool.
//!
//! Compile `.smr` sources to `.smc` bytecode modules, type-check them,
//! and disassemble compiled modules.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use somir_engine::bytecode::disasm;
use somir_engine::compiler::Compiler;
use somir_engine::gc::Heap;
use somir_engine::parser::parse_program;
use somir_engine::Chunk;

#[derive(Parser)]
#[command(name = "somir")]
#[command(about = "Somir language toolchain")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to a bytecode module (.smc)
    #[command(alias = "c")]
    Compile {
        /// Source file
        input: PathBuf,
        /// Output path (defaults to the input with an .smc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse and type-check without writing output
    Check {
        /// Source file
        input: PathBuf,
    },
    /// Disassemble a compiled module
    Dump {
        /// Module file (.smc)
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Compile { input, output } => {
            let chunk = compile_file(&input)?;
            let output = output.unwrap_or_else(|| input.with_extension("smc"));
            fs::write(&output, chunk.encode())
                .with_context(|| format!("cannot write {}", output.display()))?;
            println!("wrote {}", output.display());
            Ok(())
        }
        Commands::Check { input } => {
            compile_file(&input)?;
            println!("{}: ok", input.display());
            Ok(())
        }
        Commands::Dump { input } => {
            let bytes =
                fs::read(&input).with_context(|| format!("cannot read {}", input.display()))?;
            let heap = Heap::new();
            let chunk = Chunk::decode(&bytes, &heap)
                .with_context(|| format!("cannot decode {}", input.display()))?;
            print!("{}", disasm::disassemble(&chunk));
            Ok(())
        }
    }
}

fn compile_file(path: &Path) -> Result<Chunk> {
    let source =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let mut program =
        parse_program(&source).with_context(|| format!("cannot parse {}", path.display()))?;
    let heap = Heap::new();
    Compiler::new(heap)
        .compile_program(&mut program)
        .with_context(|| format!("cannot compile {}", path.display()))
}

fn report_error(err: &anyhow::Error) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let mut bold_red = ColorSpec::new();
    bold_red.set_fg(Some(Color::Red)).set_bold(true);
    let _ = stderr.set_color(&bold_red);
    let _ = write!(stderr, "error");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {err:#}");
}
