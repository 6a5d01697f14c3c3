//! Corpus partagé des benchs advint.
//!
//! Lancer avec :
//!   cargo bench -p advint-benches
//!   cargo bench -p advint-benches --bench vm_hotpath -- --save-baseline hot

use std::io;

use advint_compiler::{Compiler, CompilerOptions};
use advint_core::Image;
use advint_vm::{Vm, VmOptions};
use anyhow::{Context, Result};

/// Programme de bench autonome.
#[derive(Clone, Copy, Debug)]
pub struct Micro {
    pub name: &'static str,
    pub src: &'static str,
}

pub const MICROS: &[Micro] = &[
    Micro {
        name: "arith/add_loop",
        src: "int main() {
                  int acc = 0; int i = 0;
                  while (i < 200000) { acc = acc + i; i++; }
                  return acc;
              }",
    },
    Micro {
        name: "branch/parity",
        src: "int main() {
                  int x = 0; int i = 0;
                  while (i < 150000) {
                      if (i % 2 == 0) x = x + 3; else x = x - 2;
                      i++;
                  }
                  return x;
              }",
    },
    Micro {
        name: "call/fib",
        src: "int fib(int n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
              int main() { return fib(20); }",
    },
    Micro {
        name: "scope/blocks",
        src: "int main() {
                  int total = 0; int i = 0;
                  while (i < 50000) {
                      int a = i * 3;
                      { int b = a - i; { int c = b + 1; total = total + c % 7; } }
                      i++;
                  }
                  return total;
              }",
    },
];

/// Source avec `functions` petites fonctions chaînées depuis `main`.
pub fn synthetic(functions: usize) -> String {
    let mut src = String::new();
    for i in 0..functions {
        src.push_str(&format!(
            "int f{i}(int x, int y) {{ int t = x * {k} + y; if (t > 1000) {{ t = t % 1000; }} while (t > 10) t = t / 2; return t - {i}; }}\n",
            k = i % 7 + 1
        ));
    }
    src.push_str("int main() {\n  int acc = 0;\n");
    for i in 0..functions {
        src.push_str(&format!("  acc = acc + f{i}(acc, {i});\n"));
    }
    src.push_str("  print acc;\n  return acc;\n}\n");
    src
}

/// Compile et lie `src`.
pub fn build(src: &str) -> Result<Image> {
    let mut compiler = Compiler::new(CompilerOptions::default());
    compiler.compile_source(src).context("compile")?;
    compiler.link().context("link")
}

/// Exécute `image` sans sortie, retourne l'accumulateur.
pub fn run(image: &Image) -> Result<i64> {
    let mut vm = Vm::with_output(image, VmOptions::default(), io::sink())?;
    vm.run().context("run")?;
    Ok(vm.accumulator())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_chains_every_function() {
        let src = synthetic(4);
        assert_eq!(src.lines().filter(|l| l.starts_with("int f")).count(), 4);
        assert_eq!(src.matches("acc = acc + f").count(), 4);
        let image = build(&src).unwrap();
        assert_eq!(image.functions.len(), 5);
        run(&image).unwrap();
    }
}
