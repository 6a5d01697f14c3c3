use advint_compiler::expr::fold;
use advint_compiler::{Compiler, CompilerOptions};
use advint_core::{Image, Opcode, Operand};
use advint_parser::BinaryOp;
use advint_vm::{Vm, VmError, VmOptions};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn build(src: &str) -> Image {
    let mut c = Compiler::new(CompilerOptions::default());
    c.compile_source(src).unwrap();
    c.link().unwrap()
}

fn run(src: &str) -> (i64, String) {
    let image = build(src);
    let mut vm = Vm::with_output(&image, VmOptions::default(), Vec::new()).unwrap();
    vm.run().unwrap();
    assert!(vm.is_halted());
    assert_eq!(vm.stack_depth(), 0, "entry return pops the sentinel");
    let a = vm.accumulator();
    (a, String::from_utf8(vm.into_output()).unwrap())
}

#[test]
fn returns_a_folded_sum() {
    assert_eq!(run("int main() { return 1 + 2; }").0, 3);
}

#[test]
fn post_increment_updates_the_slot() {
    let (a, out) = run("int main() { int x = 5; print x++; x++; print x; return x; }");
    assert_eq!(out, "6\n7\n");
    assert_eq!(a, 7);
}

#[test]
fn constant_false_branch_is_dropped() {
    let src = "int main() { if (0) { return 1; } return 2; }";
    let image = build(src);
    let movs: Vec<i64> = advint_core::disasm::listing(&image)
        .unwrap()
        .iter()
        .filter(|l| l.instr.op == Opcode::MovImm)
        .filter_map(|l| match l.instr.b {
            Operand::Imm(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(movs, [2]);
    assert_eq!(run(src).0, 2);
}

#[test]
fn recursion_through_frames() {
    let src = "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }
               int main() { print fact(5); return fact(10); }";
    let (a, out) = run(src);
    assert_eq!(out, "120\n");
    assert_eq!(a, 3_628_800);
}

#[test]
fn mutual_recursion_via_prototypes() {
    let src = "int odd(int n);
               int even(int n) { if (n == 0) return 1; return odd(n - 1); }
               int odd(int n) { if (n == 0) return 0; return even(n - 1); }
               int main() { print even(10); print odd(7); return even(3); }";
    let (a, out) = run(src);
    assert_eq!(out, "1\n1\n");
    assert_eq!(a, 0);
}

#[test]
fn arguments_keep_their_order() {
    let (a, _) = run("int sub(int x, int y) { return x - y; } int main() { int k = 10; return sub(k, 3); }");
    assert_eq!(a, 7);
}

#[test]
fn nested_blocks_release_their_slots() {
    let src = "int main() {
                   int i = 0; int s = 0;
                   while (i < 5) { int t = i * 2; s = s + t; i++; }
                   { int u = 100; print u; }
                   return s;
               }";
    let (a, out) = run(src);
    assert_eq!(out, "100\n");
    assert_eq!(a, 20);
}

#[test]
fn strings_and_values_interleave() {
    let (_, out) = run("int main() { print \"x = \"; print 4 * 4; print \"done\\n\"; return 0; }");
    assert_eq!(out, "x = 16\ndone\n");
}

#[test]
fn void_calls_as_statements() {
    let src = "void show(int v) { print v; return; } int main() { show(1); show(2 + 1); return 0; }";
    assert_eq!(run(src).1, "1\n3\n");
}

#[test]
fn runtime_division_by_zero() {
    let image = build("int main() { int z = 0; return 5 / z; }");
    let mut vm = Vm::with_output(&image, VmOptions::default(), Vec::new()).unwrap();
    assert!(matches!(vm.run(), Err(VmError::DivisionByZero { .. })));
}

#[test]
fn unbounded_recursion_overflows() {
    let image = build("int f(int n) { return f(n + 1); } int main() { return f(0); }");
    let opts = VmOptions { stack_size: 4096, ..VmOptions::default() };
    let mut vm = Vm::with_output(&image, opts, Vec::new()).unwrap();
    assert!(matches!(vm.run(), Err(VmError::StackOverflow { .. })));
}

#[test]
fn recursion_with_locals_overflows() {
    let image = build("int f(int n) { int x = n; return f(x + 1); } int main() { return f(0); }");
    for stack_size in [4096, 4104] {
        let opts = VmOptions { stack_size, ..VmOptions::default() };
        let mut vm = Vm::with_output(&image, opts, Vec::new()).unwrap();
        let res = vm.run();
        assert!(matches!(res, Err(VmError::StackOverflow { .. })), "stack {stack_size}: {res:?}");
    }
}

#[test]
fn step_limit_stops_infinite_loops() {
    let image = build("int main() { while (1) { } return 0; }");
    let opts = VmOptions { max_steps: Some(1000), ..VmOptions::default() };
    let mut vm = Vm::with_output(&image, opts, Vec::new()).unwrap();
    assert!(matches!(vm.run(), Err(VmError::StepLimit { limit: 1000 })));
}

const OPS: [(&str, BinaryOp); 13] = [
    ("+", BinaryOp::Add),
    ("-", BinaryOp::Sub),
    ("*", BinaryOp::Mul),
    ("/", BinaryOp::Div),
    ("%", BinaryOp::Mod),
    ("==", BinaryOp::Eq),
    ("!=", BinaryOp::Ne),
    ("<", BinaryOp::Lt),
    ("<=", BinaryOp::Le),
    (">", BinaryOp::Gt),
    (">=", BinaryOp::Ge),
    ("&&", BinaryOp::And),
    ("||", BinaryOp::Or),
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn runtime_agrees_with_folding(op in 0..OPS.len(), l in (i64::MIN + 1)..=i64::MAX, r in (i64::MIN + 1)..=i64::MAX) {
        let (sym, bin) = OPS[op];
        let Some(expected) = fold(bin, l, r) else { return Ok(()) };

        let runtime = format!("int main() {{ int x = {l}; int y = {r}; return x {sym} y; }}");
        prop_assert_eq!(run(&runtime).0, expected);

        let immediate = format!("int main() {{ int x = {l}; return x {sym} {r}; }}");
        prop_assert_eq!(run(&immediate).0, expected);

        let folded = format!("int main() {{ return {l} {sym} {r}; }}");
        prop_assert_eq!(run(&folded).0, expected);
    }
}
