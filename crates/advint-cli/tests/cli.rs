use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use advint_cli::{Interpreter, ListingFormat};
use advint_core::{Opcode, Operand, RECORD_SIZE};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn source(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

fn advint(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_advint")).args(args).env_remove("RUST_LOG").output().unwrap()
}

fn stdout(out: &Output) -> String { String::from_utf8_lossy(&out.stdout).into_owned() }
fn stderr(out: &Output) -> String { String::from_utf8_lossy(&out.stderr).into_owned() }

fn session_for(dir: &TempDir, text: &str) -> Interpreter {
    let path = source(dir, "prog.c", text);
    let mut s = Interpreter::default().quiet(true);
    assert!(s.compile(&path), "{:?}", s.last_error());
    s
}

/* ─────────── Session (bibliothèque) ─────────── */

#[test]
fn constant_sum() {
    let dir = TempDir::new().unwrap();
    let mut s = session_for(&dir, "int main() { return 1 + 2; }");
    assert!(s.link());
    assert!(s.run_to(&mut Vec::new()));
    assert_eq!(s.accumulator(), Some(3));
}

#[test]
fn post_increment() {
    let dir = TempDir::new().unwrap();
    let mut s = session_for(&dir, "int main() { int x = 5; x++; return x; }");
    assert!(s.link());
    assert!(s.run_to(&mut Vec::new()));
    assert_eq!(s.accumulator(), Some(6));
}

#[test]
fn undeclared_function() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir, "bad.c", "int main() {\n  return foo();\n}\n");
    let mut s = Interpreter::default().quiet(true);
    assert!(!s.compile(&path));
    let err = s.last_error().unwrap();
    assert!(err.contains("Undeclared function 'foo'"), "{err}");
    assert!(err.contains("line 2"), "{err}");
    assert!(s.image().is_none());
}

#[test]
fn constant_false_if_has_no_code() {
    let dir = TempDir::new().unwrap();
    let mut s = session_for(&dir, "int main() { if (0) { return 1; } return 2; }");
    assert!(s.link());
    let image = s.image().unwrap();
    // prologue, `return 2` et son épilogue, épilogue final
    assert_eq!(image.records(), 2 + (1 + 3) + 3);
    let listing = advint_core::disasm::listing(image).unwrap();
    assert!(listing.iter().all(|l| l.instr.op != Opcode::Jz));
    assert!(s.run_to(&mut Vec::new()));
    assert_eq!(s.accumulator(), Some(2));
}

#[test]
fn forward_self_recursion() {
    let dir = TempDir::new().unwrap();
    let mut s = session_for(
        &dir,
        "int sum(int n);\nint main() { return sum(4); }\nint sum(int n) { if (n == 0) return 0; return n + sum(n - 1); }\n",
    );
    assert!(s.link());
    let image = s.image().unwrap();
    let sum = image.address_of("sum").unwrap();
    let calls: Vec<usize> = advint_core::disasm::listing(image)
        .unwrap()
        .into_iter()
        .filter(|l| l.instr.op == Opcode::Jmp && !matches!(l.instr.a, Operand::Unresolved(_)))
        .filter_map(|l| l.target)
        .filter(|&t| t == sum)
        .collect();
    assert_eq!(calls.len(), 2);
    assert!(s.run_to(&mut Vec::new()));
    assert_eq!(s.accumulator(), Some(10));
}

#[test]
fn missing_main_fails_at_link() {
    let dir = TempDir::new().unwrap();
    let mut s = session_for(&dir, "int helper() { return 1; }");
    assert!(!s.link());
    assert!(s.last_error().unwrap().contains("No entry point"));
    assert!(!s.run_to(&mut Vec::new()));
}

#[test]
fn inner_variables_leave_scope() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir, "scope.c", "int main() { { int inner = 1; } return inner; }");
    let mut s = Interpreter::default().quiet(true);
    assert!(!s.compile(&path));
    assert!(s.last_error().unwrap().contains("Undeclared identifier 'inner'"));
}

#[test]
fn jump_targets_sit_on_record_boundaries() {
    let dir = TempDir::new().unwrap();
    let mut s = session_for(
        &dir,
        "int main() { int i = 0; while (i < 3) { if (i == 1) print \"one\\n\"; else print i; i++; } return i; }",
    );
    assert!(s.link());
    let image = s.image().unwrap();
    let lines = advint_core::disasm::listing(image).unwrap();
    let targets: Vec<usize> = lines.iter().filter_map(|l| l.target).collect();
    assert!(targets.len() >= 3);
    assert!(targets.iter().all(|t| t % RECORD_SIZE == 0 && *t <= image.code.len()));

    let mut out = Vec::new();
    assert!(s.run_to(&mut out));
    assert_eq!(String::from_utf8(out).unwrap(), "0\none\n2\n");
    assert!(s.listing(ListingFormat::Text).unwrap().contains("jz"));
}

/* ─────────── Binaire ─────────── */

#[test]
fn run_prints_program_output() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir, "hello.c", "int main() { print \"hello\\n\"; print 40 + 2; return 0; }");
    let out = advint(&["run", path.to_str().unwrap()]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "hello\n42\n");
}

#[test]
fn failures_exit_with_one() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir, "bad.c", "int main() { return foo(); }");
    let out = advint(&["--color", "never", "run", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("error: compiling"), "{}", stderr(&out));

    let missing = dir.path().join("nope.c");
    let out = advint(&["check", missing.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn runtime_limits_from_flags() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir, "loop.c", "int main() { while (1) { } return 0; }");
    let out = advint(&["-q", "run", "--max-steps", "500", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("step limit exceeded"), "{}", stderr(&out));

    let path = source(&dir, "deep.c", "int f(int n) { return f(n + 1); } int main() { return f(0); }");
    let out = advint(&["run", "--stack-size", "1024", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("stack overflow"), "{}", stderr(&out));
}

#[test]
fn check_honours_deny_warnings() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir, "warn.c", "int main() { }");
    assert!(advint(&["check", path.to_str().unwrap()]).status.success());
    let out = advint(&["check", "--deny-warnings", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("warning"), "{}", stderr(&out));
}

#[test]
fn disasm_lists_functions() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir, "two.c", "int id(int v) { return v; } int main() { return id(7); }");
    let out = advint(&["disasm", path.to_str().unwrap()]);
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.starts_with(";; entry"), "{text}");
    assert!(text.contains("id:") && text.contains("main:"), "{text}");
    assert!(text.contains("pushpc"), "{text}");
}

#[cfg(feature = "json")]
#[test]
fn disasm_json_rows() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir, "one.c", "int main() { return 0; }");
    let out = advint(&["disasm", "--json", path.to_str().unwrap()]);
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.trim_start().starts_with('['), "{text}");
    assert!(text.contains("\"offset\""), "{text}");
}
