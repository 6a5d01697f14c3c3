//! advint-vm : interpréteur des images advint liées
//!
//! Modèle machine :
//! - un banc de registres `i64` (`fp`, `sp`, `a`, `b`, `c`, `d`, `pc`)
//! - une pile linéaire adressée à l'octet, qui descend depuis `stack_size`
//! - le flux encodé d'une [`Image`], lu record de 17 octets par record
//!
//! L'exécution part de l'entrée de l'image, la longueur du flux empilée comme
//! adresse de retour : le retour de la fonction d'entrée tombe pile sur la fin
//! du code et arrête la machine.
//!
//! ```ignore
//! let mut vm = Vm::with_output(&image, VmOptions::default(), Vec::new())?;
//! vm.run()?;
//! assert_eq!(vm.accumulator(), 3);
//! ```

use std::io::{self, Stdout, Write};

use advint_core::{CoreError, Image, Instr, Opcode, RawRecord, Register, RECORD_SIZE, SPECIAL_LIMIT};
use thiserror::Error;
use tracing::{debug, error, info};

/// Taille de pile par défaut, en octets.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

const WORD: i64 = 8;
#[allow(clippy::cast_possible_wrap)]
const RECORD: i64 = RECORD_SIZE as i64;

/* ─────────────────────────── Options / erreurs ─────────────────────────── */

/// Options d'exécution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOptions {
    /// Taille de la pile en octets.
    pub stack_size: usize,
    /// Abandon après ce nombre d'instructions exécutées.
    pub max_steps: Option<u64>,
    /// Trace chaque instruction exécutée.
    pub trace: bool,
}

impl Default for VmOptions {
    fn default() -> Self { Self { stack_size: DEFAULT_STACK_SIZE, max_steps: None, trace: false } }
}

/// Erreurs d'exécution fatales. L'état machine reste celui de la faute.
#[derive(Debug, Error)]
pub enum VmError {
    /// `push` ou `sp` sous le bas de la pile.
    #[error("stack overflow (sp would be {sp})")]
    StackOverflow { sp: i64 },
    /// `pop` sur une pile vide.
    #[error("stack underflow")]
    StackUnderflow,
    /// Diviseur nul à l'exécution.
    #[error("division by zero at {at:04}")]
    DivisionByZero { at: usize },
    /// Accès de frame hors de la pile.
    #[error("invalid memory access at stack address {addr}")]
    InvalidMemoryAccess { addr: i64 },
    /// `pc` hors du flux ou hors d'une frontière de record.
    #[error("invalid jump target {target}")]
    InvalidJump { target: i64 },
    /// Octet d'opcode inconnu.
    #[error("invalid opcode 0x{byte:02X} at {at:04}")]
    InvalidOpcode { byte: u8, at: usize },
    /// Opérande registre hors bornes.
    #[error("invalid register index {index}")]
    InvalidRegister { index: i64 },
    /// `prints` avec un index hors du pool de chaînes.
    #[error("invalid string index {index}")]
    InvalidString { index: i64 },
    /// `max_steps` atteint.
    #[error("step limit exceeded ({limit} steps)")]
    StepLimit { limit: u64 },
    /// Record tronqué ou invalide.
    #[error(transparent)]
    Decode(#[from] CoreError),
    /// Écriture de la sortie du programme impossible.
    #[error("cannot write program output: {0}")]
    Output(#[from] io::Error),
}

/// Alias de résultat de la VM.
pub type VmResult<T> = Result<T, VmError>;

type Special<'i, W> = fn(&mut Vm<'i, W>, i64) -> VmResult<()>;

/* ─────────────────────────── Machine ─────────────────────────── */

/// Une machine liée à une image.
pub struct Vm<'i, W: Write = Stdout> {
    image: &'i Image,
    regs: [i64; Register::COUNT],
    stack: Vec<u8>,
    opts: VmOptions,
    out: W,
    steps: u64,
    halted: bool,
}

impl<'i> Vm<'i, Stdout> {
    /// Machine qui écrit la sortie du programme sur stdout.
    pub fn new(image: &'i Image, opts: VmOptions) -> VmResult<Self> { Self::with_output(image, opts, io::stdout()) }
}

impl<'i, W: Write> Vm<'i, W> {
    /// Machine qui écrit la sortie du programme dans `out`.
    pub fn with_output(image: &'i Image, opts: VmOptions, out: W) -> VmResult<Self> {
        let stack = vec![0; opts.stack_size];
        let mut vm = Self { image, regs: [0; Register::COUNT], stack, opts, out, steps: 0, halted: false };
        let top = vm.top();
        vm.set(Register::Fp, top);
        vm.set(Register::Sp, top);
        vm.push(to_i64(image.code.len()))?;
        vm.set(Register::Pc, to_i64(image.entry));
        Ok(vm)
    }

    /// Exécute jusqu'à la fin du code ou la première faute.
    pub fn run(&mut self) -> VmResult<()> {
        debug!(entry = self.image.entry, records = self.image.records(), stack = self.stack.len(), "vm start");
        while !self.halted {
            if let Err(e) = self.step() {
                error!(pc = self.reg(Register::Pc), steps = self.steps, "{e}");
                return Err(e);
            }
        }
        self.out.flush()?;
        debug!(steps = self.steps, a = self.reg(Register::A), "vm halted");
        Ok(())
    }

    /// Exécute une instruction. Retourne `false` une fois la machine arrêtée.
    pub fn step(&mut self) -> VmResult<bool> {
        if self.halted {
            return Ok(false);
        }
        let pc = self.reg(Register::Pc);
        let len = self.image.code.len();
        if pc == to_i64(len) {
            self.halted = true;
            return Ok(false);
        }
        let at = usize::try_from(pc)
            .ok()
            .filter(|&at| at < len && at % RECORD_SIZE == 0)
            .ok_or(VmError::InvalidJump { target: pc })?;
        if let Some(limit) = self.opts.max_steps {
            if self.steps >= limit {
                return Err(VmError::StepLimit { limit });
            }
        }

        let raw = self.image.code.record(at)?;
        self.set(Register::Pc, pc + RECORD);
        self.steps += 1;
        if self.opts.trace {
            match Instr::decode(raw, at) {
                Ok(instr) => info!(target: "advint_vm::trace", sp = self.reg(Register::Sp), "{at:04} {instr}"),
                Err(_) => info!(target: "advint_vm::trace", "{at:04} <0x{:02X}>", raw.op),
            }
        }

        if raw.op < SPECIAL_LIMIT {
            self.exec_special(raw, at)?;
        } else {
            self.exec(raw, at)?;
        }
        Ok(true)
    }

    /* ─────────── Accesseurs ─────────── */

    /// Valeur d'un registre.
    pub const fn register(&self, r: Register) -> i64 { self.regs[r.index()] }

    /// Accumulateur ; contient la valeur de retour de l'entrée après un run.
    pub const fn accumulator(&self) -> i64 { self.register(Register::A) }

    /// Instructions exécutées jusqu'ici.
    pub const fn steps(&self) -> u64 { self.steps }

    /// Vrai une fois `pc` arrivé en fin de code.
    pub const fn is_halted(&self) -> bool { self.halted }

    /// Octets actuellement empilés.
    pub fn stack_depth(&self) -> i64 { self.top() - self.reg(Register::Sp) }

    /// Sortie.
    pub const fn output(&self) -> &W { &self.out }

    /// Consomme la machine et rend sa sortie.
    pub fn into_output(self) -> W { self.out }

    /* ─────────── Exécution ─────────── */

    fn exec_special(&mut self, raw: RawRecord, at: usize) -> VmResult<()> {
        let table: [Special<'i, W>; 2] = [Self::print_reg, Self::print_str];
        let handler = table.get(usize::from(raw.op)).ok_or(VmError::InvalidOpcode { byte: raw.op, at })?;
        handler(self, raw.a)
    }

    fn print_reg(&mut self, r: i64) -> VmResult<()> {
        let v = self.read_reg(r)?;
        writeln!(self.out, "{v}")?;
        Ok(())
    }

    fn print_str(&mut self, index: i64) -> VmResult<()> {
        let image = self.image;
        let text = usize::try_from(index)
            .ok()
            .and_then(|i| image.strings.get(i))
            .ok_or(VmError::InvalidString { index })?;
        self.out.write_all(text.as_bytes())?;
        Ok(())
    }

    fn exec(&mut self, raw: RawRecord, at: usize) -> VmResult<()> {
        let op = Opcode::from_byte(raw.op).ok_or(VmError::InvalidOpcode { byte: raw.op, at })?;
        let (a, b) = (raw.a, raw.b);
        match op {
            Opcode::PrintReg | Opcode::PrintStr => return Err(VmError::InvalidOpcode { byte: raw.op, at }),

            Opcode::Push => {
                let v = self.read_reg(a)?;
                self.push(v)?;
            }
            Opcode::PushImm => self.push(a)?,
            Opcode::PushPc => self.push(self.reg(Register::Pc).wrapping_add(a))?,
            Opcode::Pop => {
                let v = self.pop()?;
                self.write_reg(a, v)?;
            }
            Opcode::Mov => {
                let v = self.read_reg(b)?;
                self.write_reg(a, v)?;
            }
            Opcode::MovImm => self.write_reg(a, b)?,
            Opcode::Load => {
                let v = self.load(self.frame_addr(b))?;
                self.write_reg(a, v)?;
            }
            Opcode::Store => {
                let v = self.read_reg(b)?;
                self.store(self.frame_addr(a), v)?;
            }

            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Eq
            | Opcode::Ne
            | Opcode::Lt
            | Opcode::Le
            | Opcode::Gt
            | Opcode::Ge
            | Opcode::And
            | Opcode::Or => {
                let (l, r) = (self.read_reg(a)?, self.read_reg(b)?);
                self.write_reg(a, alu(op, l, r, at)?)?;
            }
            Opcode::AddImm
            | Opcode::SubImm
            | Opcode::MulImm
            | Opcode::DivImm
            | Opcode::ModImm
            | Opcode::EqImm
            | Opcode::NeImm
            | Opcode::LtImm
            | Opcode::LeImm
            | Opcode::GtImm
            | Opcode::GeImm
            | Opcode::AndImm
            | Opcode::OrImm => {
                let l = self.read_reg(a)?;
                self.write_reg(a, alu(op, l, b, at)?)?;
            }

            Opcode::Neg => {
                let v = self.read_reg(a)?;
                self.write_reg(a, v.wrapping_neg())?;
            }
            Opcode::Not => {
                let v = self.read_reg(a)?;
                self.write_reg(a, i64::from(v == 0))?;
            }

            Opcode::Jmp => self.jump(a),
            Opcode::Jz => {
                if self.read_reg(a)? == 0 {
                    self.jump(b);
                }
            }
        }
        Ok(())
    }

    fn jump(&mut self, disp: i64) {
        let pc = self.reg(Register::Pc);
        self.set(Register::Pc, pc.wrapping_add(disp));
    }

    /* ─────────── Registres ─────────── */

    const fn reg(&self, r: Register) -> i64 { self.regs[r.index()] }

    fn set(&mut self, r: Register, v: i64) { self.regs[r.index()] = v; }

    fn read_reg(&self, raw: i64) -> VmResult<i64> {
        Register::from_index(raw).map(|r| self.reg(r)).ok_or(VmError::InvalidRegister { index: raw })
    }

    fn write_reg(&mut self, raw: i64, v: i64) -> VmResult<()> {
        let r = Register::from_index(raw).ok_or(VmError::InvalidRegister { index: raw })?;
        if r == Register::Sp && v < 0 {
            return Err(VmError::StackOverflow { sp: v });
        }
        self.set(r, v);
        Ok(())
    }

    /* ─────────── Pile ─────────── */

    fn top(&self) -> i64 { to_i64(self.stack.len()) }

    fn frame_addr(&self, off: i64) -> i64 { self.reg(Register::Fp).wrapping_add(off) }

    fn push(&mut self, v: i64) -> VmResult<()> {
        let sp = self.reg(Register::Sp).wrapping_sub(WORD);
        if sp < 0 {
            return Err(VmError::StackOverflow { sp });
        }
        self.store(sp, v)?;
        self.set(Register::Sp, sp);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<i64> {
        let sp = self.reg(Register::Sp);
        if sp >= self.top() {
            return Err(VmError::StackUnderflow);
        }
        let v = self.load(sp)?;
        self.set(Register::Sp, sp + WORD);
        Ok(v)
    }

    fn cell(&self, addr: i64) -> VmResult<usize> {
        usize::try_from(addr)
            .ok()
            .filter(|&at| at + 8 <= self.stack.len())
            .ok_or(VmError::InvalidMemoryAccess { addr })
    }

    fn load(&self, addr: i64) -> VmResult<i64> {
        let at = self.cell(addr)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.stack[at..at + 8]);
        Ok(i64::from_le_bytes(word))
    }

    fn store(&mut self, addr: i64, v: i64) -> VmResult<()> {
        let at = self.cell(addr)?;
        self.stack[at..at + 8].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }
}

/// Opcodes arithmétiques, relationnels et logiques, forme registre ou immédiate.
fn alu(op: Opcode, l: i64, r: i64, at: usize) -> VmResult<i64> {
    let bit = |c: bool| i64::from(c);
    Ok(match op {
        Opcode::Add | Opcode::AddImm => l.wrapping_add(r),
        Opcode::Sub | Opcode::SubImm => l.wrapping_sub(r),
        Opcode::Mul | Opcode::MulImm => l.wrapping_mul(r),
        Opcode::Div | Opcode::DivImm | Opcode::Mod | Opcode::ModImm if r == 0 => {
            return Err(VmError::DivisionByZero { at });
        }
        Opcode::Div | Opcode::DivImm => l.wrapping_div(r),
        Opcode::Mod | Opcode::ModImm => l.wrapping_rem(r),
        Opcode::Eq | Opcode::EqImm => bit(l == r),
        Opcode::Ne | Opcode::NeImm => bit(l != r),
        Opcode::Lt | Opcode::LtImm => bit(l < r),
        Opcode::Le | Opcode::LeImm => bit(l <= r),
        Opcode::Gt | Opcode::GtImm => bit(l > r),
        Opcode::Ge | Opcode::GeImm => bit(l >= r),
        Opcode::And | Opcode::AndImm => bit(l != 0 && r != 0),
        Opcode::Or | Opcode::OrImm => bit(l != 0 || r != 0),
        _ => return Err(VmError::InvalidOpcode { byte: op.byte(), at }),
    })
}

fn to_i64(v: usize) -> i64 { i64::try_from(v).unwrap_or(i64::MAX) }
