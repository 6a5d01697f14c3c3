//! Génération de code : les actions de grammaire de [`Compiler`].
//!
//! Chaque expression porte le code qui la calcule et une [`Location`] qui dit
//! à son consommateur où finit la valeur. Les opérateurs binaires choisissent
//! leur séquence d'instructions selon le couple d'emplacements des opérandes :
//!
//! ```text
//! left \ right | constant           | register                         | stack
//! -------------+--------------------+----------------------------------+------------------------------------
//! constant     | fold               | R; mov b,a; movi a,L; op a,b     | R; movi a,L; load b,[R]; op a,b
//! register     | L; opi a,R         | L; push a; R; mov b,a; pop a;    | L; (push a; R; pop a); load b,[R];
//!              |                    |   op a,b                         |   op a,b
//! stack        | L; load a,[L];     | L; R; mov b,a; load a,[L];       | L; R; load a,[L]; load b,[R];
//!              |   opi a,R          |   op a,b                         |   op a,b
//! ```
//!
//! Frames : `push fp; mov fp,sp` à l'entrée, `mov sp,fp; pop fp; pop pc` à
//! chaque sortie. Les arguments sont empilés de droite à gauche : le paramètre
//! `i` est à `[fp + 16 + 8i]` ; les locales sont taillées sous `fp`, un
//! déclarateur à la fois.

use advint_core::{CodeBuf, Opcode, Operand, Register, RECORD_SIZE};
use advint_parser::{Actions, BinaryOp, Loc, Param, SyntaxError, TypeName, UnaryOp};
use tracing::{debug, warn};

use crate::arena::{ExternNode, Handle};
use crate::diag::{CompileError, Diagnostic, SemanticError};
use crate::expr::{fold, opcodes, Expression, Location};
use crate::stmt::{Declaration, Statement, StmtKind};
use crate::symbols::{FunctionSig, Symbol, SymbolKind};
use crate::types::Type;
use crate::{Compiler, FunctionEntry, Program};

#[allow(clippy::cast_possible_wrap)]
const RECORD: i64 = RECORD_SIZE as i64;

const A: Operand = Operand::Reg(Register::A);
const B: Operand = Operand::Reg(Register::B);
const FP: Operand = Operand::Reg(Register::Fp);
const SP: Operand = Operand::Reg(Register::Sp);
const PC: Operand = Operand::Reg(Register::Pc);

type Result<T> = core::result::Result<T, CompileError>;

/* ─────────────────────────── Génération ─────────────────────────── */

fn prologue() -> CodeBuf {
    let mut code = CodeBuf::new();
    code.emit1(Opcode::Push, FP);
    code.emit(Opcode::Mov, FP, SP);
    code
}

fn emit_epilogue(code: &mut CodeBuf) {
    code.emit(Opcode::Mov, SP, FP);
    code.emit1(Opcode::Pop, FP);
    code.emit1(Opcode::Pop, PC);
}

/// Génère `l op r` via la table des emplacements.
pub fn lower_binary(op: BinaryOp, l: Expression, r: Expression) -> core::result::Result<Expression, SemanticError> {
    for side in [&l, &r] {
        if side.ty != Type::Int {
            return Err(SemanticError::InvalidOperands { op: op.symbol(), found: side.ty });
        }
    }
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && r.const_value() == Some(0) {
        return Err(SemanticError::DivisionByZero);
    }

    let ty = l.ty.wider(r.ty);
    let (rr, ri) = opcodes(op);
    // une constante vient toujours d'un i64 : son texte se parse
    let lv = l.const_value().unwrap_or_default();
    let rv = r.const_value().unwrap_or_default();
    let r_has_code = r.has_code();

    let mut code = l.code;
    match (l.loc, r.loc) {
        (Location::Constant(_), Location::Constant(_)) => {
            let v = fold(op, lv, rv).ok_or(SemanticError::DivisionByZero)?;
            return Ok(Expression { code: CodeBuf::new(), ty, loc: Location::Constant(v.to_string()) });
        }
        (Location::Constant(_), Location::Register) => {
            code.append(r.code);
            code.emit(Opcode::Mov, B, A);
            code.emit(Opcode::MovImm, A, Operand::Imm(lv));
            code.emit(rr, A, B);
        }
        (Location::Constant(_), Location::Stack(ro)) => {
            code.append(r.code);
            code.emit(Opcode::MovImm, A, Operand::Imm(lv));
            code.emit(Opcode::Load, B, Operand::Slot(ro));
            code.emit(rr, A, B);
        }
        (Location::Register, Location::Constant(_)) => {
            code.emit(ri, A, Operand::Imm(rv));
        }
        (Location::Register, Location::Register) => {
            code.emit1(Opcode::Push, A);
            code.append(r.code);
            code.emit(Opcode::Mov, B, A);
            code.emit1(Opcode::Pop, A);
            code.emit(rr, A, B);
        }
        (Location::Register, Location::Stack(ro)) => {
            if r_has_code {
                code.emit1(Opcode::Push, A);
                code.append(r.code);
                code.emit1(Opcode::Pop, A);
            }
            code.emit(Opcode::Load, B, Operand::Slot(ro));
            code.emit(rr, A, B);
        }
        (Location::Stack(lo), Location::Constant(_)) => {
            code.emit(Opcode::Load, A, Operand::Slot(lo));
            code.emit(ri, A, Operand::Imm(rv));
        }
        (Location::Stack(lo), Location::Register) => {
            code.append(r.code);
            code.emit(Opcode::Mov, B, A);
            code.emit(Opcode::Load, A, Operand::Slot(lo));
            code.emit(rr, A, B);
        }
        (Location::Stack(lo), Location::Stack(ro)) => {
            code.append(r.code);
            code.emit(Opcode::Load, A, Operand::Slot(lo));
            code.emit(Opcode::Load, B, Operand::Slot(ro));
            code.emit(rr, A, B);
        }
    }
    Ok(Expression::register(code, ty))
}

/// Génère un opérateur préfixe ou postfixe.
///
/// `++`/`--` valent la valeur mise à jour dans les deux positions.
pub fn lower_unary(op: UnaryOp, e: Expression) -> core::result::Result<Expression, SemanticError> {
    if e.ty != Type::Int {
        return Err(SemanticError::InvalidOperands { op: op.symbol(), found: e.ty });
    }
    if let Some(step) = op.step() {
        let Location::Stack(off) = e.loc else {
            return Err(SemanticError::RequiresLvalue(op.symbol()));
        };
        let mut code = e.code;
        code.emit(Opcode::Load, A, Operand::Slot(off));
        code.emit(Opcode::AddImm, A, Operand::Imm(step));
        code.emit(Opcode::Store, Operand::Slot(off), A);
        return Ok(Expression::register(code, Type::Int));
    }

    let (opcode, folded) = match op {
        UnaryOp::Not => (Opcode::Not, e.const_value().map(|v| i64::from(v == 0))),
        _ => (Opcode::Neg, e.const_value().map(i64::wrapping_neg)),
    };
    if let Some(v) = folded {
        return Ok(Expression::constant(v));
    }
    let mut code = e.into_accumulator();
    code.emit1(opcode, A);
    Ok(Expression::register(code, Type::Int))
}

/* ─────────────────────────── Aides ─────────────────────────── */

impl Compiler {
    fn trace(&self, action: &str, at: Loc) {
        if self.opts.trace_actions {
            debug!(%at, depth = self.scopes.depth(), "{action}");
        }
    }

    fn warn_at(&mut self, line: u32, message: impl Into<String>) {
        let diag = Diagnostic::warn(line, message);
        warn!(line, "{}", diag.message);
        self.diagnostics.push(diag);
    }

    fn expr(&mut self, h: Handle<Expression>) -> Result<Expression> { Ok(self.nodes.exprs.take(h)?) }

    fn stmt(&mut self, h: Handle<Statement>) -> Result<Statement> { Ok(self.nodes.stmts.take(h)?) }

    fn stmts(&mut self, hs: Vec<Handle<Statement>>) -> Result<Vec<Statement>> {
        hs.into_iter().map(|h| self.stmt(h)).collect()
    }

    fn finish_expr(&mut self, line: u32, lowered: core::result::Result<Expression, SemanticError>) -> Result<Handle<Expression>> {
        let e = lowered.map_err(|kind| CompileError::at(line, kind))?;
        Ok(self.nodes.exprs.insert(e))
    }

    fn finish_stmt(&mut self, code: CodeBuf, kind: StmtKind, line: u32) -> Handle<Statement> {
        let depth = self.scopes.depth();
        self.nodes.stmts.insert(Statement::new(code, kind, depth, line))
    }

    /// Éléments qui suivent une instruction sans continuation.
    fn check_reachability(&mut self, items: &[Statement]) {
        if let Some(pos) = items.iter().position(Statement::diverges) {
            if let Some(next) = items.get(pos + 1) {
                self.warn_at(next.line, "Unreachable statement");
            }
        }
    }

    fn current_function(&self, line: u32) -> Result<&Symbol> {
        let h = self.current.ok_or(CompileError::at(line, SemanticError::OutsideFunction))?;
        Ok(self.nodes.symbols.get(h)?)
    }

    fn intern(&mut self, text: &str) -> u32 {
        let ix = self.strings.iter().position(|s| s == text).unwrap_or_else(|| {
            self.strings.push(text.to_owned());
            self.strings.len() - 1
        });
        u32::try_from(ix).unwrap_or(u32::MAX)
    }
}

fn require_value(e: &Expression, line: u32) -> Result<()> {
    if e.ty.has_value() { Ok(()) } else { Err(CompileError::at(line, SemanticError::VoidValue)) }
}

fn concat(items: Vec<Statement>) -> CodeBuf {
    let mut code = CodeBuf::new();
    for item in items {
        code.append(item.code);
    }
    code
}

/* ─────────────────────────── Actions sémantiques ─────────────────────────── */

impl Actions for Compiler {
    type Expr = Handle<Expression>;
    type Stmt = Handle<Statement>;
    type Decl = Handle<Declaration>;
    type Error = CompileError;

    fn int_literal(&mut self, at: Loc, text: &str) -> Result<Self::Expr> {
        let value = text
            .parse::<i64>()
            .map_err(|_| SyntaxError { loc: at, message: format!("integer literal `{text}` out of range") })?;
        Ok(self.nodes.exprs.insert(Expression::constant(value)))
    }

    fn variable(&mut self, at: Loc, name: &str) -> Result<Self::Expr> {
        let line = at.line;
        let h = self
            .scopes
            .lookup(name)
            .ok_or_else(|| CompileError::at(line, SemanticError::UndeclaredIdentifier(name.to_owned())))?;
        let sym = self.nodes.symbols.get(h)?;
        let e = match sym.kind {
            SymbolKind::Variable { offset, .. } => Expression::stack(offset, sym.ty),
            SymbolKind::Function(_) => return Err(CompileError::at(line, SemanticError::NotAVariable(name.to_owned()))),
        };
        Ok(self.nodes.exprs.insert(e))
    }

    fn assignment(&mut self, at: Loc, name: &str, value: Self::Expr) -> Result<Self::Expr> {
        let line = at.line;
        let value = self.expr(value)?;
        let h = self
            .scopes
            .lookup(name)
            .ok_or_else(|| CompileError::at(line, SemanticError::UndeclaredIdentifier(name.to_owned())))?;
        let sym = self.nodes.symbols.get(h)?;
        let Some(offset) = sym.offset() else {
            return Err(CompileError::at(line, SemanticError::RequiresLvalue("=")));
        };
        let ty = sym.ty;
        require_value(&value, line)?;

        let mut code = value.into_accumulator();
        code.emit(Opcode::Store, Operand::Slot(offset), A);
        Ok(self.nodes.exprs.insert(Expression::register(code, ty)))
    }

    fn binary(&mut self, at: Loc, op: BinaryOp, lhs: Self::Expr, rhs: Self::Expr) -> Result<Self::Expr> {
        self.trace("binary", at);
        let (l, r) = (self.expr(lhs)?, self.expr(rhs)?);
        self.finish_expr(at.line, lower_binary(op, l, r))
    }

    fn unary(&mut self, at: Loc, op: UnaryOp, operand: Self::Expr) -> Result<Self::Expr> {
        self.trace("unary", at);
        let e = self.expr(operand)?;
        self.finish_expr(at.line, lower_unary(op, e))
    }

    fn call(&mut self, at: Loc, name: &str, args: Vec<Self::Expr>) -> Result<Self::Expr> {
        self.trace("call", at);
        let line = at.line;
        let function = self
            .scopes
            .lookup(name)
            .ok_or_else(|| CompileError::at(line, SemanticError::UndeclaredFunction(name.to_owned())))?;
        let sig = self
            .nodes
            .symbols
            .get(function)?
            .signature()
            .ok_or_else(|| CompileError::at(line, SemanticError::NotAFunction(name.to_owned())))?;
        if sig.params.len() != args.len() {
            let kind = SemanticError::ArgumentCount { name: name.to_owned(), expected: sig.params.len(), found: args.len() };
            return Err(CompileError::at(line, kind));
        }
        let ret = sig.ret;

        let argc = args.len();
        let mut code = CodeBuf::new();
        for h in args.into_iter().rev() {
            let arg = self.expr(h)?;
            require_value(&arg, line)?;
            if let (Some(v), false) = (arg.const_value(), arg.has_code()) {
                code.emit1(Opcode::PushImm, Operand::Imm(v));
            } else {
                code.append(arg.into_accumulator());
                code.emit1(Opcode::Push, A);
            }
        }
        code.emit1(Opcode::PushPc, Operand::Disp(RECORD));
        let target = self.nodes.externs.insert(ExternNode { function, line });
        code.emit1(Opcode::Jmp, Operand::Unresolved(target.to_extern()));
        for _ in 0..argc {
            code.emit1(Opcode::Pop, B);
        }
        Ok(self.nodes.exprs.insert(Expression::register(code, ret)))
    }

    fn expression_statement(&mut self, at: Loc, expr: Self::Expr) -> Result<Self::Stmt> {
        let e = self.expr(expr)?;
        Ok(self.finish_stmt(e.code, StmtKind::Plain, at.line))
    }

    fn empty_statement(&mut self, at: Loc) -> Result<Self::Stmt> { Ok(self.finish_stmt(CodeBuf::new(), StmtKind::Plain, at.line)) }

    fn print_text(&mut self, at: Loc, text: &str) -> Result<Self::Stmt> {
        let ix = self.intern(text);
        let mut code = CodeBuf::new();
        code.emit1(Opcode::PrintStr, Operand::Str(ix));
        Ok(self.finish_stmt(code, StmtKind::Plain, at.line))
    }

    fn print_value(&mut self, at: Loc, value: Self::Expr) -> Result<Self::Stmt> {
        let e = self.expr(value)?;
        require_value(&e, at.line)?;
        let mut code = e.into_accumulator();
        code.emit1(Opcode::PrintReg, A);
        Ok(self.finish_stmt(code, StmtKind::Plain, at.line))
    }

    fn declarator(&mut self, at: Loc, ty: TypeName, name: &str, init: Option<Self::Expr>) -> Result<Self::Decl> {
        self.trace("declarator", at);
        let line = at.line;
        let ty = Type::from(ty);
        if !ty.has_value() {
            return Err(CompileError::at(line, SemanticError::VoidVariable(name.to_owned())));
        }
        let init = init.map(|h| self.expr(h)).transpose()?;
        let symbol = self
            .scopes
            .declare_local(&mut self.nodes.symbols, name, ty, line)
            .map_err(|kind| CompileError::at(line, kind))?;
        let offset = self.nodes.symbols.get(symbol)?.offset().unwrap_or_default();

        let mut code = CodeBuf::new();
        code.emit(Opcode::AddImm, SP, Operand::Imm(-ty.size()));
        if let Some(init) = init {
            require_value(&init, line)?;
            code.append(init.into_accumulator());
            code.emit(Opcode::Store, Operand::Slot(offset), A);
        }
        Ok(self.nodes.decls.insert(Declaration { symbol, code, line }))
    }

    fn declaration(&mut self, at: Loc, decls: Vec<Self::Decl>) -> Result<Self::Stmt> {
        let mut code = CodeBuf::new();
        for h in decls {
            code.append(self.nodes.decls.take(h)?.code);
        }
        Ok(self.finish_stmt(code, StmtKind::Plain, at.line))
    }

    fn if_statement(
        &mut self,
        at: Loc,
        cond: Self::Expr,
        then_branch: Self::Stmt,
        else_branch: Option<Self::Stmt>,
    ) -> Result<Self::Stmt> {
        self.trace("if", at);
        let cond = self.expr(cond)?;
        require_value(&cond, at.line)?;
        let then = self.stmt(then_branch)?;
        let other = else_branch.map(|h| self.stmt(h)).transpose()?;

        let (code, diverges) = match cond.const_value() {
            Some(v) if v != 0 => {
                let diverges = then.diverges();
                (then.code, diverges)
            }
            Some(_) => other.map_or_else(
                || (CodeBuf::new(), false),
                |s| {
                    let diverges = s.diverges();
                    (s.code, diverges)
                },
            ),
            None => {
                let diverges = then.diverges() && other.as_ref().is_some_and(Statement::diverges);
                let mut code = cond.into_accumulator();
                let skip = then.code.span() + if other.is_some() { RECORD } else { 0 };
                code.emit(Opcode::Jz, A, Operand::Disp(skip));
                code.append(then.code);
                if let Some(other) = other {
                    code.emit1(Opcode::Jmp, Operand::Disp(other.code.span()));
                    code.append(other.code);
                }
                (code, diverges)
            }
        };
        let kind = if diverges { StmtKind::Return } else { StmtKind::Conditional };
        Ok(self.finish_stmt(code, kind, at.line))
    }

    fn while_statement(&mut self, at: Loc, cond: Self::Expr, body: Self::Stmt) -> Result<Self::Stmt> {
        self.trace("while", at);
        let cond = self.expr(cond)?;
        require_value(&cond, at.line)?;
        let body = self.stmt(body)?;
        let body_span = body.code.span();

        let code = match cond.const_value() {
            Some(0) => CodeBuf::new(),
            Some(_) => {
                let mut code = body.code;
                code.emit1(Opcode::Jmp, Operand::Disp(-(body_span + RECORD)));
                code
            }
            None => {
                let mut code = cond.into_accumulator();
                let cond_span = code.span();
                code.emit(Opcode::Jz, A, Operand::Disp(body_span + RECORD));
                code.append(body.code);
                code.emit1(Opcode::Jmp, Operand::Disp(-(cond_span + RECORD + body_span + RECORD)));
                code
            }
        };
        Ok(self.finish_stmt(code, StmtKind::Loop, at.line))
    }

    fn return_statement(&mut self, at: Loc, value: Option<Self::Expr>) -> Result<Self::Stmt> {
        let line = at.line;
        let value = value.map(|h| self.expr(h)).transpose()?;
        let f = self.current_function(line)?;
        let (name, ret) = (f.name.clone(), f.ty);

        let mut code = CodeBuf::new();
        match value {
            Some(_) if ret == Type::Void => return Err(CompileError::at(line, SemanticError::ReturnValueInVoid(name))),
            Some(v) if v.ty != ret => {
                return Err(CompileError::at(line, SemanticError::ReturnTypeMismatch { expected: ret, found: v.ty }));
            }
            Some(v) => code.append(v.into_accumulator()),
            None if ret.has_value() => self.warn_at(line, format!("Return without a value in function '{name}' returning {ret}")),
            None => {}
        }
        emit_epilogue(&mut code);
        Ok(self.finish_stmt(code, StmtKind::Return, line))
    }

    fn enter_block(&mut self, at: Loc) -> Result<()> {
        self.trace("enter_block", at);
        self.scopes.enter();
        Ok(())
    }

    fn exit_block(&mut self, at: Loc, items: Vec<Self::Stmt>) -> Result<Self::Stmt> {
        self.trace("exit_block", at);
        let depth = self.scopes.depth();
        let items = self.stmts(items)?;
        self.check_reachability(&items);
        let kind = if items.iter().any(Statement::diverges) { StmtKind::Return } else { StmtKind::Plain };

        let mut code = concat(items);
        let freed = self.scopes.exit(&mut self.nodes.symbols)?;
        if depth >= 2 && freed > 0 {
            code.emit(Opcode::AddImm, SP, Operand::Imm(freed));
        }
        Ok(self.finish_stmt(code, kind, at.line))
    }

    fn function_header(&mut self, at: Loc, ret: TypeName, name: &str, params: &[Param<'_>]) -> Result<()> {
        self.trace("function_header", at);
        let mut types = Vec::with_capacity(params.len());
        for p in params {
            let ty = Type::from(p.ty);
            if !ty.has_value() {
                return Err(CompileError::at(p.loc.line, SemanticError::VoidParameter(p.name.to_owned())));
            }
            types.push(ty);
        }
        let sig = FunctionSig::new(types.clone(), Type::from(ret));
        let handle = self
            .scopes
            .declare_function(&mut self.nodes.symbols, name, sig, at.line)
            .map_err(|kind| CompileError::at(at.line, kind))?;

        self.scopes.begin_function();
        for (index, (p, ty)) in params.iter().zip(types).enumerate() {
            self.scopes
                .declare_param(&mut self.nodes.symbols, p.name, ty, index, p.loc.line)
                .map_err(|kind| CompileError::at(p.loc.line, kind))?;
        }
        self.current = Some(handle);
        Ok(())
    }

    fn function_prototype(&mut self, at: Loc) -> Result<()> {
        self.trace("function_prototype", at);
        self.scopes.exit(&mut self.nodes.symbols)?;
        self.current = None;
        Ok(())
    }

    fn function_body(&mut self, at: Loc, items: Vec<Self::Stmt>) -> Result<()> {
        self.trace("function_body", at);
        let handle = self.current.take().ok_or(CompileError::at(at.line, SemanticError::OutsideFunction))?;
        let items = self.stmts(items)?;
        self.check_reachability(&items);

        let sym = self.nodes.symbols.get_mut(handle)?;
        let name = sym.name.clone();
        let sig = sym
            .signature_mut()
            .ok_or_else(|| CompileError::at(at.line, SemanticError::NotAFunction(name.clone())))?;
        if sig.defined {
            return Err(CompileError::at(at.line, SemanticError::Redefinition(name)));
        }
        sig.defined = true;
        if sig.ret.has_value() && !items.iter().any(Statement::diverges) {
            self.warn_at(at.line, format!("Control reaches end of non-void function '{name}'"));
        }

        let mut code = prologue();
        code.append(concat(items));
        emit_epilogue(&mut code);
        self.scopes.exit(&mut self.nodes.symbols)?;
        debug!(function = %name, records = code.len(), "function compiled");
        self.bodies.push((handle, code));
        Ok(())
    }

    fn translation_unit(&mut self, at: Loc) -> Result<()> {
        self.trace("translation_unit", at);
        let mut code = CodeBuf::new();
        let mut functions = Vec::with_capacity(self.bodies.len());
        for (symbol, body) in self.bodies.drain(..) {
            let address = code.byte_len();
            let sym = self.nodes.symbols.get_mut(symbol)?;
            if let Some(sig) = sym.signature_mut() {
                sig.address = Some(address);
            }
            functions.push(FunctionEntry { name: sym.name.clone(), address, symbol });
            code.append(body);
        }
        debug!(functions = functions.len(), records = code.len(), "translation unit laid out");
        self.program = Some(Program { code, functions, strings: std::mem::take(&mut self.strings) });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompilerOptions;
    use pretty_assertions::assert_eq;

    fn listing(code: &CodeBuf) -> Vec<String> { code.iter().map(ToString::to_string).collect() }

    fn compile(src: &str) -> Compiler {
        let mut c = Compiler::new(CompilerOptions::default());
        c.compile_source(src).unwrap();
        c
    }

    fn compile_err(src: &str) -> SemanticError {
        let mut c = Compiler::default();
        c.compile_source(src).unwrap_err().semantic().cloned().unwrap()
    }

    #[test]
    fn constant_expressions_fold() {
        let c = compile("int main() { print 1 + 2 * 3; return 0; }");
        let code = &c.program().unwrap().code;
        assert_eq!(
            listing(code),
            [
                "push     fp",
                "mov      fp, sp",
                "movi     a, #7",
                "printr   a",
                "movi     a, #0",
                "mov      sp, fp",
                "pop      fp",
                "pop      pc",
                "mov      sp, fp",
                "pop      fp",
                "pop      pc",
            ]
        );
    }

    #[test]
    fn stack_and_constant_operands() {
        let l = Expression::stack(-8, Type::Int);
        let e = lower_binary(BinaryOp::Sub, l, Expression::constant(4)).unwrap();
        assert_eq!(e.loc, Location::Register);
        assert_eq!(listing(&e.code), ["load     a, [fp-8]", "subi     a, #4"]);

        let e = lower_binary(BinaryOp::Lt, Expression::constant(3), Expression::stack(16, Type::Int)).unwrap();
        assert_eq!(listing(&e.code), ["movi     a, #3", "load     b, [fp+16]", "lt       a, b"]);

        let e = lower_binary(BinaryOp::Mul, Expression::stack(-8, Type::Int), Expression::stack(-16, Type::Int)).unwrap();
        assert_eq!(listing(&e.code), ["load     a, [fp-8]", "load     b, [fp-16]", "mul      a, b"]);
    }

    #[test]
    fn register_operands_spill_the_left_side() {
        let reg = |v| {
            let mut code = CodeBuf::new();
            code.emit(Opcode::MovImm, A, Operand::Imm(v));
            Expression::register(code, Type::Int)
        };
        let e = lower_binary(BinaryOp::Add, reg(1), reg(2)).unwrap();
        assert_eq!(
            listing(&e.code),
            ["movi     a, #1", "push     a", "movi     a, #2", "mov      b, a", "pop      a", "add      a, b"]
        );

        let e = lower_binary(BinaryOp::Div, Expression::constant(10), reg(2)).unwrap();
        assert_eq!(listing(&e.code), ["movi     a, #2", "mov      b, a", "movi     a, #10", "div      a, b"]);

        let e = lower_binary(BinaryOp::Eq, reg(1), Expression::stack(-8, Type::Int)).unwrap();
        assert_eq!(listing(&e.code), ["movi     a, #1", "load     b, [fp-8]", "eq       a, b"]);
    }

    #[test]
    fn zero_divisor_is_rejected_even_when_not_folded() {
        let e = lower_binary(BinaryOp::Mod, Expression::stack(-8, Type::Int), Expression::constant(0));
        assert_eq!(e, Err(SemanticError::DivisionByZero));
        assert_eq!(compile_err("int main() { print 4 / 0; return 0; }"), SemanticError::DivisionByZero);
    }

    #[test]
    fn unary_on_constants_rewrites_the_literal() {
        assert_eq!(lower_unary(UnaryOp::Neg, Expression::constant(5)).unwrap(), Expression::constant(-5));
        assert_eq!(lower_unary(UnaryOp::Neg, Expression::constant(-5)).unwrap(), Expression::constant(5));
        assert_eq!(lower_unary(UnaryOp::Not, Expression::constant(0)).unwrap(), Expression::constant(1));
        assert_eq!(lower_unary(UnaryOp::Not, Expression::constant(9)).unwrap(), Expression::constant(0));
        let e = lower_unary(UnaryOp::Not, Expression::stack(-8, Type::Int)).unwrap();
        assert_eq!(listing(&e.code), ["load     a, [fp-8]", "not      a"]);
    }

    #[test]
    fn increments_need_a_variable() {
        assert_eq!(lower_unary(UnaryOp::PostInc, Expression::constant(1)), Err(SemanticError::RequiresLvalue("++")));
        let e = lower_unary(UnaryOp::PreDec, Expression::stack(-8, Type::Int)).unwrap();
        assert_eq!(listing(&e.code), ["load     a, [fp-8]", "addi     a, #-1", "store    [fp-8], a"]);
        assert_eq!(e.loc, Location::Register);
    }

    #[test]
    fn calls_push_arguments_right_to_left() {
        let c = compile("int f(int a, int b) { return a - b; } int main() { int x = 2; print f(x, 7); return 0; }");
        let code = listing(&c.program().unwrap().code);
        let call: Vec<&str> = code.iter().map(String::as_str).skip_while(|l| !l.starts_with("pushi")).take(6).collect();
        assert_eq!(call[0], "pushi    #7");
        assert_eq!(call[1], "load     a, [fp-8]");
        assert_eq!(call[2], "push     a");
        assert_eq!(call[3], "pushpc   +17");
        assert!(call[4].starts_with("jmp      <extern"));
        assert_eq!(call[5], "pop      b");
    }

    #[test]
    fn branches_jump_over_their_bodies() {
        let c = compile("int main() { int x = 1; if (x) print 1; else print 2; return 0; }");
        let code = listing(&c.program().unwrap().code);
        let at = code.iter().position(|l| l.starts_with("jz")).unwrap();
        assert_eq!(code[at], "jz       a, +51");
        assert_eq!(code[at + 3], "jmp      +34");
    }

    #[test]
    fn loops_jump_back_to_the_condition() {
        let c = compile("int main() { int i = 3; while (i) i--; return 0; }");
        let code = listing(&c.program().unwrap().code);
        let at = code.iter().position(|l| l.starts_with("jz")).unwrap();
        assert_eq!(code[at - 1], "load     a, [fp-8]");
        assert_eq!(code[at], "jz       a, +68");
        assert_eq!(code[at + 4], "jmp      -102");
    }

    #[test]
    fn constant_conditions_drop_dead_code() {
        let c = compile("int missing(); int main() { if (0) missing(); while (0) missing(); print 2; return 0; }");
        assert_eq!(c.program().unwrap().code.unresolved(), 0);
        let c = compile("int main() { while (1) { print 1; } }");
        let code = listing(&c.program().unwrap().code);
        assert_eq!(&code[2..4], ["movi     a, #1", "printr   a"]);
        assert_eq!(code[4], "jmp      -51");
    }

    #[test]
    fn undefined_calls_in_live_code_fail() {
        assert_eq!(
            compile_err("int main() { foo(); return 0; }"),
            SemanticError::UndeclaredFunction("foo".into())
        );
    }

    #[test]
    fn semantic_errors() {
        assert_eq!(compile_err("int main() { return y; }"), SemanticError::UndeclaredIdentifier("y".into()));
        assert_eq!(compile_err("int main() { int x; int x; return 0; }"), SemanticError::ConflictingDeclaration("x".into()));
        assert_eq!(compile_err("int main() { int x; x(); return 0; }"), SemanticError::NotAFunction("x".into()));
        assert_eq!(compile_err("int main() { return main; }"), SemanticError::NotAVariable("main".into()));
        assert_eq!(
            compile_err("int f(int a) { return a; } int main() { return f(); }"),
            SemanticError::ArgumentCount { name: "f".into(), expected: 1, found: 0 }
        );
        assert_eq!(compile_err("void f() { return 1; } int main() { return 0; }"), SemanticError::ReturnValueInVoid("f".into()));
        assert_eq!(compile_err("void f() { } int main() { print f(); return 0; }"), SemanticError::VoidValue);
        assert_eq!(compile_err("int main() { 3++; return 0; }"), SemanticError::RequiresLvalue("++"));
        assert_eq!(compile_err("int main() { return 0; } int main() { return 1; }"), SemanticError::Redefinition("main".into()));
        assert_eq!(compile_err("int f(int a); int f() { return 0; }"), SemanticError::ConflictingDeclaration("f".into()));
    }

    #[test]
    fn inner_scopes_release_their_variables() {
        let c = compile("int main() { int a = 1; { int b = 2; { int c = 3; print c; } print b; } return a; }");
        let code = &c.program().unwrap().code;
        let sp_total: i64 = code
            .iter()
            .filter(|i| i.op == Opcode::AddImm && i.a == SP)
            .map(|i| if let Operand::Imm(v) = i.b { v } else { 0 })
            .sum();
        // `a` vit dans la portée de fonction, récupérée par l'épilogue
        assert_eq!(sp_total, -8);
        assert_eq!(compile_err("int main() { { int b = 2; } return b; }"), SemanticError::UndeclaredIdentifier("b".into()));
        assert_eq!(c.nodes().exprs.len() + c.nodes().stmts.len() + c.nodes().decls.len(), 0);
    }

    #[test]
    fn shadowed_variables_get_fresh_slots() {
        let c = compile("int main() { int x = 1; { int x = 2; print x; } print x; return 0; }");
        let code = listing(&c.program().unwrap().code);
        assert!(code.contains(&"store    [fp-16], a".to_owned()));
        assert!(code.contains(&"load     a, [fp-16]".to_owned()));
        assert!(code.contains(&"load     a, [fp-8]".to_owned()));
    }

    #[test]
    fn strings_are_pooled_once() {
        let c = compile(r#"int main() { print "hi"; print "hi"; print "yo"; return 0; }"#);
        let p = c.program().unwrap();
        assert_eq!(p.strings, ["hi", "yo"]);
        assert_eq!(listing(&p.code)[2..5], ["prints   $0", "prints   $0", "prints   $1"]);
    }

    #[test]
    fn reachability_warnings() {
        let c = compile("int main() { return 1; print 2; }");
        assert_eq!(c.diagnostics().len(), 1);
        assert_eq!(c.diagnostics()[0].message, "Unreachable statement");

        let c = compile("int f() { print 1; } int main() { return f(); }");
        assert_eq!(c.diagnostics()[0].to_string(), "warning: line 1: Control reaches end of non-void function 'f'");

        let c = compile("int f(int x) { if (x) return 1; else return 2; } int main() { return f(1); }");
        assert!(c.diagnostics().is_empty());
    }

    #[test]
    fn denied_warnings_fail_the_compile() {
        let mut c = Compiler::new(CompilerOptions { deny_warnings: true, ..CompilerOptions::default() });
        let err = c.compile_source("int main() { return; }").unwrap_err();
        assert!(matches!(err, CompileError::DeniedWarnings { count: 1 }));
        assert!(c.program().is_none());
    }

    #[test]
    fn functions_are_laid_out_in_order() {
        let c = compile("int f(); int main() { return f(); } int f() { return 4; }");
        let p = c.program().unwrap();
        let names: Vec<(&str, usize)> = p.functions.iter().map(|f| (f.name.as_str(), f.address)).collect();
        assert_eq!(names, [("main", 0), ("f", 10 * RECORD_SIZE)]);
    }
}
