//! LLVM-style textual SSA target.
//!
//! An accumulated `String` buffer, monotonic `fresh_temp`/`fresh_block`
//! counters, every instruction and terminator emitted with `writeln!`. No
//! virtual-register stack, no union/FFI/quotation machinery, because this IR
//! is already SSA-shaped coming out of scheduling — there's no stack to
//! spill. Function values use opaque `ptr`, which is what motivates the
//! `MIN_CC_FOR_OPAQUE_PTR` clang-version check in `driver`.
//!
//! Instruction-emitting methods take an explicit `out: &mut String` buffer
//! instead of always appending to the module's own text. `backend` fills one
//! buffer per block and only appends it to the module once every
//! predecessor has contributed its phi edges (see that module's doc
//! comment) — this module only owns the `fresh_temp`/`fresh_block` counters
//! and the final assembled text, not the order blocks are filled in.

use std::fmt::Write as _;

/// A logic error (malformed IR construction) or a formatting error from
/// `write!` into the output buffer, which is infallible for `String` but
/// kept so every emitting method can still propagate with `?`.
#[derive(Debug)]
pub enum CodeGenError {
    Logic(String),
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{s}"),
            CodeGenError::Format(e) => write!(f, "IR generation error: {e}"),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

impl From<CodeGenError> for crate::error::CompileError {
    fn from(e: CodeGenError) -> Self {
        crate::error::CompileError::lowering(e.to_string())
    }
}

/// The target's value types: just enough to express this language's two
/// base types plus first-class function values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrType {
    I64,
    /// Booleans are `i8` in registers and everywhere else a value is
    /// stored or passed (params, phis, call args) — byte-addressable
    /// rather than the bit-packed `i1` a comparison actually produces.
    /// `icmp_eq_i64` zero-extends its `i1` result up to this; `If`
    /// truncates back down before branching.
    I8,
    /// A function value. Always lowered to opaque `ptr`; the callee's real
    /// signature is written out at each call site instead of carried on the
    /// type.
    Ptr,
}

impl IrType {
    pub fn llvm(self) -> &'static str {
        match self {
            IrType::I64 => "i64",
            IrType::I8 => "i8",
            IrType::Ptr => "ptr",
        }
    }

    pub fn from_type(ty: &crate::types::Type) -> Self {
        match crate::types::find(ty) {
            crate::types::Type::Bool => IrType::I8,
            crate::types::Type::I64 => IrType::I64,
            crate::types::Type::Fn { .. } => IrType::Ptr,
            crate::types::Type::Uv(_) => {
                unreachable!("a fully checked program has no unresolved unification variables")
            }
        }
    }
}

pub struct TargetModule {
    output: String,
    temp_counter: usize,
    block_counter: usize,
}

impl Default for TargetModule {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetModule {
    pub fn new() -> Self {
        TargetModule {
            output: String::new(),
            temp_counter: 0,
            block_counter: 0,
        }
    }

    pub fn fresh_temp(&mut self) -> String {
        let name = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    pub fn fresh_block(&mut self, prefix: &str) -> String {
        let name = format!("{}{}", prefix, self.block_counter);
        self.block_counter += 1;
        name
    }

    pub fn text(&self) -> &str {
        &self.output
    }

    fn fn_signature(domain: &[IrType], codomain: IrType) -> String {
        let params = domain.iter().map(|t| t.llvm()).collect::<Vec<_>>().join(", ");
        format!("{}({})", codomain.llvm(), params)
    }

    pub fn begin_function(
        &mut self,
        name: &str,
        params: &[(String, IrType)],
        codomain: IrType,
    ) -> Result<(), CodeGenError> {
        let param_list = params
            .iter()
            .map(|(n, t)| format!("{} %{}", t.llvm(), n))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(self.output, "define {} @{}({}) {{", codomain.llvm(), name, param_list)?;
        Ok(())
    }

    pub fn end_function(&mut self) -> Result<(), CodeGenError> {
        writeln!(self.output, "}}")?;
        Ok(())
    }

    /// Appends one finished block: its label followed by `body` verbatim.
    /// `body` is assembled by the caller (phi first, then instructions,
    /// then the terminator) before this is called, so the module's own
    /// text only ever grows in the order the caller decides to assemble
    /// blocks in, rather than the order their labels were minted.
    pub fn emit_block(&mut self, label: &str, body: &str) -> Result<(), CodeGenError> {
        writeln!(self.output, "{label}:")?;
        self.output.push_str(body);
        Ok(())
    }

    /// Emits a phi instruction into `out`. Incoming is `(value, predecessor
    /// label)` pairs; empty `incoming` is a caller error (every join block
    /// this backend builds has at least one predecessor).
    pub fn phi(
        &self,
        out: &mut String,
        dest: &str,
        ty: IrType,
        incoming: &[(String, String)],
    ) -> Result<(), CodeGenError> {
        if incoming.is_empty() {
            return Err(CodeGenError::Logic(format!("phi %{dest} has no incoming edges")));
        }
        let edges = incoming
            .iter()
            .map(|(value, label)| format!("[ {value}, %{label} ]"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "  %{dest} = phi {} {edges}", ty.llvm())?;
        Ok(())
    }

    pub fn int_literal(value: i64) -> String {
        format!("{value}")
    }

    pub fn bool_literal(value: bool) -> String {
        if value { "1".to_string() } else { "0".to_string() }
    }

    fn binop(&mut self, out: &mut String, op: &str, ty: IrType, lhs: &str, rhs: &str) -> Result<String, CodeGenError> {
        let dest = self.fresh_temp();
        writeln!(out, "  %{dest} = {op} {} {lhs}, {rhs}", ty.llvm())?;
        Ok(dest)
    }

    pub fn add_i64(&mut self, out: &mut String, lhs: &str, rhs: &str) -> Result<String, CodeGenError> {
        self.binop(out, "add", IrType::I64, lhs, rhs)
    }

    pub fn sub_i64(&mut self, out: &mut String, lhs: &str, rhs: &str) -> Result<String, CodeGenError> {
        self.binop(out, "sub", IrType::I64, lhs, rhs)
    }

    pub fn mul_i64(&mut self, out: &mut String, lhs: &str, rhs: &str) -> Result<String, CodeGenError> {
        self.binop(out, "mul", IrType::I64, lhs, rhs)
    }

    /// `i64` equality compare, zero-extended from the `i1` `icmp` produces
    /// up to this language's `i8` boolean representation.
    pub fn icmp_eq_i64(&mut self, out: &mut String, lhs: &str, rhs: &str) -> Result<String, CodeGenError> {
        let bit = self.fresh_temp();
        writeln!(out, "  %{bit} = icmp eq i64 {lhs}, {rhs}")?;
        self.zext(out, &format!("%{bit}"))
    }

    /// Widens an `i1` value (e.g. a fresh `icmp` result) to this language's
    /// `i8` boolean representation.
    pub fn zext(&mut self, out: &mut String, value: &str) -> Result<String, CodeGenError> {
        let dest = self.fresh_temp();
        writeln!(out, "  %{dest} = zext i1 {value} to i8")?;
        Ok(dest)
    }

    /// Narrows an `i8` boolean back to the `i1` a conditional branch needs.
    pub fn trunc(&mut self, out: &mut String, value: &str) -> Result<String, CodeGenError> {
        let dest = self.fresh_temp();
        writeln!(out, "  %{dest} = trunc i8 {value} to i1")?;
        Ok(dest)
    }

    pub fn br(&self, out: &mut String, label: &str) -> Result<(), CodeGenError> {
        writeln!(out, "  br label %{label}")?;
        Ok(())
    }

    pub fn cond_br(&self, out: &mut String, cond: &str, then_label: &str, else_label: &str) -> Result<(), CodeGenError> {
        writeln!(out, "  br i1 {cond}, label %{then_label}, label %{else_label}")?;
        Ok(())
    }

    /// Emits a call. `callee` is a complete value reference (`%t3` for an
    /// indirect call through a value in a register, `@mangled_name` for a
    /// direct call to a known function). `tail` marks this as the
    /// function's own tail call: no separate `TailCall` transfer exists,
    /// just a `musttail`-eligible `Call`. A tail call is immediately
    /// followed by `ret` of its result.
    pub fn call(
        &mut self,
        out: &mut String,
        codomain: IrType,
        callee: &str,
        args: &[(IrType, String)],
        tail: bool,
    ) -> Result<String, CodeGenError> {
        let dest = self.fresh_temp();
        let arg_list = args
            .iter()
            .map(|(t, v)| format!("{} {v}", t.llvm()))
            .collect::<Vec<_>>()
            .join(", ");
        let keyword = if tail { "musttail call" } else { "call" };
        writeln!(
            out,
            "  %{dest} = {keyword} {} {callee}({arg_list})",
            Self::fn_signature(&args.iter().map(|(t, _)| *t).collect::<Vec<_>>(), codomain),
        )?;
        if tail {
            writeln!(out, "  ret {} %{dest}", codomain.llvm())?;
        }
        Ok(dest)
    }

    pub fn ret(&self, out: &mut String, ty: IrType, value: &str) -> Result<(), CodeGenError> {
        writeln!(out, "  ret {} {value}", ty.llvm())?;
        Ok(())
    }

    /// A minimal well-formedness check: every `define` has a matching
    /// closing brace. Real verification (every block terminated, every
    /// phi's predecessor set matching the CFG) is the backend's job, done
    /// while building rather than re-checked against text here.
    pub fn verify(&self) -> Result<(), CodeGenError> {
        let opens = self.output.matches("define ").count();
        let closes = self.output.matches("\n}\n").count();
        if opens == 0 {
            return Err(CodeGenError::Logic("module defines no functions".to_string()));
        }
        if opens != closes {
            return Err(CodeGenError::Logic(format!(
                "unbalanced function bodies: {opens} defines, {closes} closes"
            )));
        }
        Ok(())
    }

    pub fn write_to(&self, path: &std::path::Path) -> std::io::Result<()> {
        std::fs::write(path, &self.output)
    }
}
