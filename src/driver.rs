//! End-to-end orchestration: source text in, executable out.
//!
//! Parse, check, lower, link. Every stage threads a single
//! [`CompileError`]. The `cc`-version gate exists because this backend
//! emits opaque `ptr` values, which only a clang 15+ (or clang-compatible)
//! `cc` understands.

use crate::ast::{self, Frontend};
use crate::backend;
use crate::config::CompilerConfig;
use crate::convert;
use crate::error::CompileError;
use crate::interner::Interner;
use crate::typechecker::TypeChecker;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

/// Our generated IR uses opaque pointers (`ptr`), which requires LLVM 15+.
const MIN_CC_FOR_OPAQUE_PTR: u32 = 15;

static CC_VERSION_CHECKED: OnceLock<Result<u32, String>> = OnceLock::new();

/// Checks that `cc` is available and new enough to accept opaque-pointer
/// IR. Cached for the lifetime of the process.
fn check_cc_version(cc: &Path) -> Result<u32, String> {
    CC_VERSION_CHECKED
        .get_or_init(|| {
            let output = Command::new(cc).arg("--version").output().map_err(|e| {
                format!("failed to run {}: {e}. Please install clang {MIN_CC_FOR_OPAQUE_PTR} or later.", cc.display())
            })?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(format!("{} --version failed: {stderr}", cc.display()));
            }
            let text = String::from_utf8_lossy(&output.stdout);
            let version = parse_cc_version(&text).ok_or_else(|| {
                format!(
                    "could not parse a clang version from: {}",
                    text.lines().next().unwrap_or(&text)
                )
            })?;
            let is_apple = text.contains("Apple clang");
            let effective_min = if is_apple { MIN_CC_FOR_OPAQUE_PTR - 1 } else { MIN_CC_FOR_OPAQUE_PTR };
            if version < effective_min {
                return Err(format!(
                    "{} version {version} detected, but this compiler requires {} or later (opaque pointer support)",
                    cc.display(),
                    effective_min
                ));
            }
            Ok(version)
        })
        .clone()
}

/// Parses the major version number out of `cc --version` output, which
/// reads e.g. `clang version 17.0.6` or `Apple clang version 15.0.0`.
fn parse_cc_version(output: &str) -> Option<u32> {
    for line in output.lines() {
        if line.contains("clang version")
            && let Some(idx) = line.find("version ")
        {
            let after = &line[idx + "version ".len()..];
            let major: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !major.is_empty() {
                return major.parse().ok();
            }
        }
    }
    None
}

/// Compiles `source` (attributed to `source_path` for diagnostics) through
/// every pass and writes the resulting executable to `output_path`. The
/// `.ll` file lives at `output_path` with its extension replaced, and is
/// removed afterward unless `config.keep_ir` is set.
pub fn compile(
    frontend: &mut dyn Frontend,
    source: &str,
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), CompileError> {
    let mut interner = Interner::new();
    let program = frontend.parse(source, &mut interner)?;
    let typed = check(&program, &mut interner)?;
    let cps_program = convert::to_cps(&typed, &mut interner);
    let target = backend::lower_program(&cps_program)?;

    let ir_path = output_path.with_extension("ll");
    target
        .write_to(&ir_path)
        .map_err(|e| CompileError::lowering(format!("failed to write {}: {e}", ir_path.display())))?;

    let result = link(&config.cc, &ir_path, output_path, source_path);

    if !config.keep_ir {
        std::fs::remove_file(&ir_path).ok();
    }

    result
}

#[tracing::instrument(skip_all)]
fn check(program: &ast::Program, interner: &mut Interner) -> Result<crate::fast::Program, CompileError> {
    let mut checker = TypeChecker::new();
    checker.check_program(program, interner)
}

fn link(cc: &Path, ir_path: &Path, output_path: &Path, source_path: &Path) -> Result<(), CompileError> {
    check_cc_version(cc).map_err(CompileError::link)?;

    let output = Command::new(cc)
        .arg(ir_path)
        .arg("-o")
        .arg(output_path)
        .output()
        .map_err(|e| CompileError::link(format!("failed to run {}: {e}", cc.display())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CompileError::link(format!(
            "{} failed compiling {}:\n{stderr}",
            cc.display(),
            source_path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, FunDef, IdPat, PrimOp, Program, Stmt, TypeExpr};
    use crate::span::{Pos, Span};
    use std::path::PathBuf;

    #[test]
    fn parses_standard_clang_version_line() {
        let output = "clang version 17.0.6 (...)\nTarget: x86_64-pc-linux-gnu";
        assert_eq!(parse_cc_version(output), Some(17));
    }

    #[test]
    fn parses_apple_clang_version_line() {
        let output = "Apple clang version 15.0.0 (clang-1500.0.40.1)\nTarget: arm64-apple-darwin";
        assert_eq!(parse_cc_version(output), Some(15));
    }

    #[test]
    fn rejects_output_with_no_version() {
        assert_eq!(parse_cc_version("cc is not clang"), None);
    }

    fn span() -> Span {
        Span::point(PathBuf::from("e2e.fl"), Pos::new(0, 0))
    }

    /// Runs everything `compile` does except the final `cc` invocation,
    /// since these tests don't assume a linker is on `PATH`.
    fn lower(program: Program, interner: &mut Interner) -> Result<String, CompileError> {
        let typed = check(&program, interner)?;
        let cps_program = convert::to_cps(&typed, interner);
        let target = backend::lower_program(&cps_program)?;
        Ok(target.text().to_string())
    }

    /// `fun id(x : i64) : i64 { x }`
    #[test]
    fn identity_function_lowers_to_one_block_one_ret() {
        let mut interner = Interner::new();
        let x = interner.sourced("x");
        let program = Program {
            defs: vec![FunDef {
                name: interner.sourced("id"),
                params: vec![(x, TypeExpr::I64)],
                codomain: TypeExpr::I64,
                body: Expr::Id { name: x, span: span() },
                span: span(),
            }],
        };
        let ir = lower(program, &mut interner).unwrap();
        assert!(ir.contains("define"));
        assert_eq!(ir.matches("ret i64").count(), 1);
    }

    /// `fun abs(x : i64) : i64 { if __eqI64(x, 0) { 0 } else { x } }`
    #[test]
    fn conditional_lowers_to_diamond_with_one_phi() {
        let mut interner = Interner::new();
        let x = interner.sourced("x");
        let program = Program {
            defs: vec![FunDef {
                name: interner.sourced("abs"),
                params: vec![(x, TypeExpr::I64)],
                codomain: TypeExpr::I64,
                body: Expr::If {
                    cond: Box::new(Expr::PrimApp {
                        op: PrimOp::EqI64,
                        args: vec![
                            Expr::Id { name: x, span: span() },
                            Expr::I64 { digits: "0".into(), span: span() },
                        ],
                        span: span(),
                    }),
                    conseq: Box::new(Expr::I64 { digits: "0".into(), span: span() }),
                    alt: Box::new(Expr::Id { name: x, span: span() }),
                    span: span(),
                },
                span: span(),
            }],
        };
        let ir = lower(program, &mut interner).unwrap();
        assert_eq!(ir.matches(" phi ").count(), 1);
        assert!(ir.contains("icmp eq i64"));
    }

    /// `fun g(x : i64) : i64 { val y = __addWI64(x, 1); __mulWI64(y, y) }`
    #[test]
    fn let_binding_lowers_with_one_add_feeding_one_mul() {
        let mut interner = Interner::new();
        let x = interner.sourced("x");
        let y = interner.sourced("y");
        let program = Program {
            defs: vec![FunDef {
                name: interner.sourced("g"),
                params: vec![(x, TypeExpr::I64)],
                codomain: TypeExpr::I64,
                body: Expr::Block {
                    stmts: vec![Stmt::Val {
                        pat: IdPat { name: y },
                        expr: Expr::PrimApp {
                            op: PrimOp::AddWI64,
                            args: vec![
                                Expr::Id { name: x, span: span() },
                                Expr::I64 { digits: "1".into(), span: span() },
                            ],
                            span: span(),
                        },
                    }],
                    body: Box::new(Expr::PrimApp {
                        op: PrimOp::MulWI64,
                        args: vec![Expr::Id { name: y, span: span() }, Expr::Id { name: y, span: span() }],
                        span: span(),
                    }),
                    span: span(),
                },
                span: span(),
            }],
        };
        let ir = lower(program, &mut interner).unwrap();
        assert_eq!(ir.matches("add i64").count(), 1);
        assert_eq!(ir.matches("mul i64").count(), 1);
    }

    /// `fun bad() : i64 { True }`
    #[test]
    fn boolean_body_against_i64_codomain_is_rejected_with_a_span() {
        let mut interner = Interner::new();
        let bad_span = Span::point(PathBuf::from("e2e.fl"), Pos::new(1, 18));
        let program = Program {
            defs: vec![FunDef {
                name: interner.sourced("bad"),
                params: vec![],
                codomain: TypeExpr::I64,
                body: Expr::Bool { value: true, span: bad_span.clone() },
                span: span(),
            }],
        };
        let err = lower(program, &mut interner).unwrap_err();
        match err {
            CompileError::Type { span, .. } => assert_eq!(span, bad_span),
            other => panic!("expected a type error, got {other:?}"),
        }
    }
}
