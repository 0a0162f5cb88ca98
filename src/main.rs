//! Command-line interface.

use clap::{Parser as ClapParser, Subcommand};
use flowc::ast::UnimplementedFrontend;
use flowc::CompilerConfig;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "flowc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "compile a program to a native executable", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to an executable
    Build {
        /// Input source file
        input: PathBuf,

        /// Output executable path (defaults to the input filename without its extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep the intermediate LLVM IR file (.ll)
        #[arg(long)]
        keep_ir: bool,

        /// Path to the `cc`-compatible compiler driver to link with
        #[arg(long)]
        cc: Option<PathBuf>,

        /// Load base configuration from a TOML file before applying the
        /// flags above on top of it
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flowc=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build { input, output, keep_ir, cc, config } => {
            run_build(&input, output, keep_ir, cc, config)
        }
    }
}

fn run_build(
    input: &std::path::Path,
    output: Option<PathBuf>,
    keep_ir: bool,
    cc: Option<PathBuf>,
    config_path: Option<PathBuf>,
) {
    let output = output.unwrap_or_else(|| PathBuf::from(input.file_stem().unwrap_or_default()));

    let mut config = match config_path {
        Some(path) => match CompilerConfig::from_file(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        },
        None => CompilerConfig::default(),
    };
    if let Some(cc) = cc {
        config = config.with_cc(cc);
    }
    if keep_ir {
        config = config.with_keep_ir(true);
    }

    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: failed to read {}: {e}", input.display());
            process::exit(1);
        }
    };

    // No production parser ships in this crate; callers that want to
    // compile real source files link their own `Frontend` against the
    // library directly. The reference binary can only report that.
    let mut frontend = UnimplementedFrontend;

    match flowc::driver::compile(&mut frontend, &source, input, &output, &config) {
        Ok(()) => {
            println!("compiled {} -> {}", input.display(), output.display());
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
