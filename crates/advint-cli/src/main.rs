//! `advint` : front end en ligne de commande
//!
//! Parsing des arguments, logger et couleurs ; le pipeline lui-même vit dans
//! `advint_cli`.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use advint_compiler::CompilerOptions;
use advint_vm::{VmOptions, DEFAULT_STACK_SIZE};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use advint_cli::{self as cli, ColorMode, Interpreter, ListingFormat};

/* ─────────────────────────── CLI (clap) ─────────────────────────── */

#[derive(Debug, Parser)]
#[command(name = "advint", version, about = "advint: compile, link and run toy programs on a register/stack VM", long_about = None)]
struct Opt {
    /// Plus de logs (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Erreurs uniquement
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    /// Couleur des tags de statut
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl From<ColorChoice> for ColorMode {
    fn from(c: ColorChoice) -> Self {
        match c {
            ColorChoice::Auto => Self::Auto,
            ColorChoice::Always => Self::Always,
            ColorChoice::Never => Self::Never,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compiler, lier et exécuter un programme
    Run {
        /// Fichier source
        input: PathBuf,
        /// Taille de la pile en octets
        #[arg(long, default_value_t = DEFAULT_STACK_SIZE)]
        stack_size: usize,
        /// Abandon après ce nombre d'instructions
        #[arg(long)]
        max_steps: Option<u64>,
        /// Tracer chaque instruction exécutée
        #[arg(long)]
        trace: bool,
        /// Échouer sur avertissement
        #[arg(long)]
        deny_warnings: bool,
    },

    /// Compiler et lier, puis afficher le listing bytecode
    Disasm {
        /// Fichier source
        input: PathBuf,
        /// Lignes JSON au lieu du texte
        #[arg(long)]
        json: bool,
    },

    /// Compiler et lier sans exécuter
    Check {
        /// Fichier source
        input: PathBuf,
        /// Échouer sur avertissement
        #[arg(long)]
        deny_warnings: bool,
    },
}

/* ─────────────────────────── Logger ─────────────────────────── */

fn log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/* ─────────────────────────── main ─────────────────────────── */

fn main() -> ExitCode {
    let opt = Opt::parse();

    cli::set_color(opt.color.into());
    let trace_vm = matches!(opt.cmd, Command::Run { trace: true, .. });
    cli::init_logger(log_level(opt.verbose, opt.quiet), trace_vm);

    if real_main(opt.cmd) { ExitCode::SUCCESS } else { ExitCode::from(1) }
}

fn real_main(cmd: Command) -> bool {
    match cmd {
        Command::Run { input, stack_size, max_steps, trace, deny_warnings } => {
            let copts = CompilerOptions { deny_warnings, ..CompilerOptions::default() };
            let vopts = VmOptions { stack_size, max_steps, trace };
            let mut session = Interpreter::new(copts, vopts);
            session.compile(&input) && session.link() && session.run()
        }
        Command::Disasm { input, json } => {
            let mut session = Interpreter::default();
            let format = if json { ListingFormat::Json } else { ListingFormat::Text };
            session.compile(&input) && session.link() && session.disassemble_as(format)
        }
        Command::Check { input, deny_warnings } => {
            let copts = CompilerOptions { deny_warnings, ..CompilerOptions::default() };
            let mut session = Interpreter::new(copts, VmOptions::default());
            session.compile(&input) && session.link()
        }
    }
}
