//! TML back-end CLI
//!
//! `tml-emit` turns a serialized typed AST (JSON, produced by the front-end
//! driver) into an LLVM IR file. The driver owns everything upstream
//! (parsing, type checking) and everything downstream (llc/opt, linking).

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;
use std::process;
use tml_backend::{CompileUnit, EmitterConfig, emit_to_file};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tml-emit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "TML back-end - emit LLVM IR from a type-checked AST", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit LLVM IR for a typed-AST JSON file
    Emit {
        /// Input typed-AST file (.ast.json)
        input: PathBuf,

        /// Output .ll path (defaults to the input with an .ll extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Library build: declare the full runtime ABI up front
        #[arg(long)]
        library: bool,

        /// Skip the i32 @main() wrapper even if the unit defines main
        #[arg(long)]
        no_main_wrapper: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Emit {
            input,
            output,
            library,
            no_main_wrapper,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("ll"));
            run_emit(&input, &output, library, no_main_wrapper);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }
}

fn run_emit(input: &PathBuf, output: &PathBuf, library: bool, no_main_wrapper: bool) {
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: failed to read {}: {}", input.display(), e);
            process::exit(1);
        }
    };
    let unit: CompileUnit = match serde_json::from_str(&source) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("error: {} is not a typed-AST file: {}", input.display(), e);
            process::exit(1);
        }
    };

    let config = EmitterConfig::new()
        .with_library_mode(library)
        .with_main_wrapper(!no_main_wrapper);

    if let Err(e) = emit_to_file(&unit, config, output) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
