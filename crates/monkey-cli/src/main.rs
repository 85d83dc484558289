//! Command-line entry point.
//!
//! A `run` subcommand launches the line-oriented REPL in one of two modes —
//! the tree-walking evaluator or the bytecode VM — reading from standard
//! input and writing to standard output. An `echo` subcommand is a thin I/O
//! wrapper, not core-language behavior.

mod echo;
mod repl;

use clap::{Parser as ClapParser, Subcommand, ValueEnum};

#[derive(Debug, ClapParser)]
#[command(name = "monkey")]
#[command(about = "Lexer, parser, evaluator, and bytecode VM for a small expression language")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (can be repeated); overridden by `RUST_LOG`.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a REPL against standard input.
    Run {
        /// Evaluation strategy: 1 = tree-walking evaluator, 2 = bytecode VM.
        #[arg(long = "ver", default_value_t = EvalVersion::Vm)]
        ver: EvalVersion,
    },
    /// Echo standard input lines back to standard output.
    Echo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EvalVersion {
    #[value(name = "1")]
    Tree,
    #[value(name = "2")]
    Vm,
}

impl std::fmt::Display for EvalVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree => write!(f, "1"),
            Self::Vm => write!(f, "2"),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let input = stdin.lock();
    let output = stdout.lock();

    match cli.command {
        Command::Run { ver: EvalVersion::Tree } => repl::run_tree_walking(input, output),
        Command::Run { ver: EvalVersion::Vm } => repl::run_vm(input, output),
        Command::Echo => echo::run(input, output),
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
