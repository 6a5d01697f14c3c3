//! advint-cli : bibliothèque derrière le binaire `advint`
//!
//! [`Interpreter`] est une session sur le pipeline :
//! - `compile` : fichier source (ou texte) → programme, avec avertissements
//! - `link` : programme → image
//! - `run` : exécute l'image sur la VM, ou `disassemble` la liste
//!
//! Chaque étape retourne un booléen de succès et écrit l'erreur sur stderr ;
//! parsing des arguments et codes de sortie restent dans `main.rs`.
//!
//! Features optionnelles : `trace` (backend env_logger pour les événements
//! `tracing` du pipeline), `color` (tags de statut), `json` (`disasm --json`).

#![deny(unused_must_use)]
#![forbid(unsafe_code)]

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use advint_compiler::{Compiler, CompilerOptions, Diagnostic, Severity};
use advint_core::{disasm, Image};
use advint_vm::{Vm, VmOptions};
use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

#[cfg(feature = "color")]
use owo_colors::{OwoColorize, Stream};

/* ─────────────────────────── Initialisation ─────────────────────────── */

/// Installe `env_logger` comme backend des enregistrements `tracing`/`log`.
///
/// `RUST_LOG` prime sur `default_level` ; `trace_vm` active toujours la
/// trace VM instruction par instruction.
pub fn init_logger(default_level: &str, trace_vm: bool) {
    #[cfg(feature = "trace")]
    {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
        builder.format_timestamp_secs();
        if trace_vm {
            builder.filter_module("advint_vm::trace", log::LevelFilter::Info);
        }
        let _ = builder.try_init();
    }
    #[cfg(not(feature = "trace"))]
    {
        let _ = (default_level, trace_vm);
    }
}

/// Coloration des tags de statut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Couleur si stderr est un terminal.
    #[default]
    Auto,
    Always,
    Never,
}

/// Applique un mode couleur à tout le processus.
pub fn set_color(mode: ColorMode) {
    #[cfg(feature = "color")]
    {
        match mode {
            ColorMode::Auto => owo_colors::unset_override(),
            ColorMode::Always => owo_colors::set_override(true),
            ColorMode::Never => owo_colors::set_override(false),
        }
    }
    #[cfg(not(feature = "color"))]
    {
        let _ = mode;
    }
}

/* ─────────────────────────── Session ─────────────────────────── */

/// Format de listing de [`Interpreter::disassemble_as`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingFormat {
    #[default]
    Text,
    /// Un objet JSON par record (feature `json` requise).
    Json,
}

/// Une session compile → link → run.
#[derive(Debug)]
pub struct Interpreter {
    compiler: Compiler,
    vm_opts: VmOptions,
    source: Option<PathBuf>,
    image: Option<Image>,
    accumulator: Option<i64>,
    last_error: Option<String>,
    quiet: bool,
}

impl Default for Interpreter {
    fn default() -> Self { Self::new(CompilerOptions::default(), VmOptions::default()) }
}

impl Interpreter {
    pub fn new(compiler_opts: CompilerOptions, vm_opts: VmOptions) -> Self {
        Self {
            compiler: Compiler::new(compiler_opts),
            vm_opts,
            source: None,
            image: None,
            accumulator: None,
            last_error: None,
            quiet: false,
        }
    }

    /// Coupe les lignes de statut sur stderr (les erreurs restent enregistrées).
    #[must_use]
    pub const fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Compile un fichier source. Programme et image précédents sont abandonnés.
    pub fn compile(&mut self, path: &Path) -> bool {
        self.source = Some(path.to_path_buf());
        let start = Instant::now();
        let res = self.compiler.compile_file(path).map(|_| ()).with_context(|| format!("compiling {}", path.display()));
        self.finish_compile(res, start)
    }

    /// Compile du texte source.
    pub fn compile_source(&mut self, src: &str) -> bool {
        self.source = None;
        let start = Instant::now();
        let res = self.compiler.compile_source(src).map(|_| ()).context("compiling <input>");
        self.finish_compile(res, start)
    }

    /// Lie le programme compilé.
    pub fn link(&mut self) -> bool {
        let res = self.compiler.link().context("linking");
        match res {
            Ok(image) => {
                debug!(records = image.records(), entry = image.entry, "image ready");
                self.image = Some(image);
                true
            }
            Err(e) => self.fail(&e),
        }
    }

    /// Exécute l'image liée, sortie du programme sur stdout.
    pub fn run(&mut self) -> bool {
        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        let ok = self.run_to(&mut out);
        let flushed = out.flush();
        ok && flushed.is_ok()
    }

    /// Exécute l'image liée, sortie du programme dans `out`.
    pub fn run_to<W: Write>(&mut self, out: &mut W) -> bool {
        self.accumulator = None;
        let res = self.execute(out);
        match res {
            Ok(a) => {
                self.accumulator = Some(a);
                true
            }
            Err(e) => self.fail(&e),
        }
    }

    /// Affiche le listing de l'image liée sur stdout.
    pub fn disassemble(&mut self) -> bool { self.disassemble_as(ListingFormat::Text) }

    /// Affiche le listing dans le format donné.
    pub fn disassemble_as(&mut self, format: ListingFormat) -> bool {
        let res = self.listing(format).and_then(|text| {
            let mut w = BufWriter::new(io::stdout().lock());
            w.write_all(text.as_bytes())?;
            w.flush()?;
            Ok(())
        });
        match res {
            Ok(()) => true,
            Err(e) => self.fail(&e),
        }
    }

    /// Listing de l'image liée, en texte.
    pub fn listing(&self, format: ListingFormat) -> Result<String> {
        let image = self.image.as_ref().ok_or_else(|| anyhow!("no linked image to list"))?;
        match format {
            ListingFormat::Text => Ok(disasm::disassemble(image)?),
            ListingFormat::Json => listing_json(image),
        }
    }

    /* ─────────── Accesseurs ─────────── */

    /// Avertissements de la dernière compilation.
    pub fn diagnostics(&self) -> &[Diagnostic] { self.compiler.diagnostics() }

    /// Image liée, une fois [`Interpreter::link`] réussi.
    pub const fn image(&self) -> Option<&Image> { self.image.as_ref() }

    /// Accumulateur après la dernière exécution réussie.
    pub const fn accumulator(&self) -> Option<i64> { self.accumulator }

    /// Message du dernier échec, avec sa chaîne de contexte.
    pub fn last_error(&self) -> Option<&str> { self.last_error.as_deref() }

    /// Fichier passé au dernier [`Interpreter::compile`].
    pub fn source(&self) -> Option<&Path> { self.source.as_deref() }

    /// Compilateur sous-jacent.
    pub const fn compiler(&self) -> &Compiler { &self.compiler }

    /* ─────────── Interne ─────────── */

    fn finish_compile(&mut self, res: Result<()>, start: Instant) -> bool {
        self.image = None;
        self.accumulator = None;
        self.last_error = None;
        for d in self.compiler.diagnostics() {
            if !self.quiet {
                report_diagnostic(d);
            }
        }
        match res {
            Ok(()) => {
                info!(elapsed_ms = start.elapsed().as_millis(), warnings = self.diagnostics().len(), "compiled");
                true
            }
            Err(e) => self.fail(&e),
        }
    }

    fn execute<W: Write>(&self, out: &mut W) -> Result<i64> {
        let image = self.image.as_ref().ok_or_else(|| anyhow!("no linked image to run"))?;
        let mut vm = Vm::with_output(image, self.vm_opts.clone(), out).context("starting the VM")?;
        let start = Instant::now();
        vm.run().context("runtime error")?;
        info!(steps = vm.steps(), elapsed_ms = start.elapsed().as_millis(), a = vm.accumulator(), "run finished");
        Ok(vm.accumulator())
    }

    fn fail(&mut self, e: &anyhow::Error) -> bool {
        let msg = format!("{e:#}");
        if !self.quiet {
            status_err("error", &msg);
        }
        self.last_error = Some(msg);
        false
    }
}

#[cfg(feature = "json")]
fn listing_json(image: &Image) -> Result<String> {
    let lines = disasm::listing(image)?;
    let mut text = serde_json::to_string_pretty(&lines)?;
    text.push('\n');
    Ok(text)
}

#[cfg(not(feature = "json"))]
fn listing_json(_image: &Image) -> Result<String> {
    Err(anyhow!("JSON listings are unavailable: rebuild advint-cli with the `json` feature"))
}

/* ─────────────────────────── Sortie de statut ─────────────────────────── */

fn report_diagnostic(d: &Diagnostic) {
    let msg = format!("line {}: {}", d.line, d.message);
    match d.severity {
        Severity::Error => status_err("error", &msg),
        Severity::Warning => status_warn("warning", &msg),
        Severity::Info => status_info("note", &msg),
    }
}

fn status_err(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    eprintln!("{}: {msg}", tag.if_supports_color(Stream::Stderr, |t| t.red().bold().to_string()));
    #[cfg(not(feature = "color"))]
    eprintln!("{tag}: {msg}");
}

fn status_warn(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    eprintln!("{}: {msg}", tag.if_supports_color(Stream::Stderr, |t| t.yellow().bold().to_string()));
    #[cfg(not(feature = "color"))]
    eprintln!("{tag}: {msg}");
}

fn status_info(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    eprintln!("{}: {msg}", tag.if_supports_color(Stream::Stderr, |t| t.blue().bold().to_string()));
    #[cfg(not(feature = "color"))]
    eprintln!("{tag}: {msg}");
}

/* ─────────────────────────── Tests ─────────────────────────── */
