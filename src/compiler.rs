//! AOT backend.
//!
//! Lowers the statically-resolvable subset of the language to textual LLVM
//! IR and links it against a small C runtime. The dynamic value model of the
//! interpreter is not used here: a light flow-insensitive type propagation
//! pins one concrete type per expression, and anything that cannot be
//! resolved monomorphically is a `CompileError`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ast::Program;
use crate::backend::{Backend, PreparedBackend};
use crate::token::Span;

mod abi;
pub(crate) mod cc;
mod codegen;
mod infer;
mod types;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("CompileError at {span}: {construct} is not supported in compiled programs")]
    Unsupported { construct: &'static str, span: Span },

    #[error("CompileError at {span}: nested function definitions are not supported in compiled programs")]
    NestedFunction { span: Span },

    #[error("CompileError at {span}: name '{name}' is not defined")]
    UndefinedName { name: String, span: Span },

    #[error("CompileError at {span}: function '{name}' is not defined")]
    UndefinedFunction { name: String, span: Span },

    #[error("CompileError at {span}: {name}() expected {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("CompileError at {span}: cannot resolve a single static type for '{name}': {first} vs {second}")]
    TypeConflict {
        name: String,
        first: String,
        second: String,
        span: Span,
    },

    #[error("CompileError at {span}: unsupported operand types for '{op}': {left} and {right}")]
    BadOperands {
        op: &'static str,
        left: String,
        right: String,
        span: Span,
    },

    #[error("CompileError at {span}: bad operand type for unary '{op}': {type_name}")]
    BadUnaryOperand {
        op: &'static str,
        type_name: String,
        span: Span,
    },

    #[error("CompileError at {span}: array elements must share one static type")]
    MixedArrayElements { span: Span },

    #[error("CompileError at {span}: {type_name} is not indexable")]
    NotIndexable { type_name: String, span: Span },

    #[error("CompileError at {span}: {name}() expected {expected}, got {got}")]
    BuiltinArgument {
        name: &'static str,
        expected: &'static str,
        got: String,
        span: Span,
    },

    #[error("CompileError at {span}: argument {index} of {name}() expects {expected}, got {got}")]
    ArgumentType {
        name: String,
        index: usize,
        expected: String,
        got: String,
        span: Span,
    },

    #[error("CompileError at {span}: return outside of function")]
    ReturnOutsideFunction { span: Span },
}

/// Lower a program to a complete textual LLVM IR module.
pub fn emit_ir(program: &Program) -> std::result::Result<String, CompileError> {
    let signatures = infer::infer_signatures(program)?;
    codegen::generate(program, &signatures)
}

/// Compile `program` to a native executable at `output`, linking the bundled
/// C runtime (or `runtime_lib` when given). With `keep_ir` the intermediate
/// module stays next to the executable as `<output>.ll`.
pub fn compile_to_executable(
    program: &Program,
    output: &Path,
    optimize: bool,
    runtime_lib: Option<&Path>,
    keep_ir: bool,
) -> Result<()> {
    let ir = emit_ir(program)?;
    if keep_ir {
        let ir_path = output.with_extension("ll");
        fs::write(&ir_path, &ir).with_context(|| format!("Writing {}", ir_path.display()))?;
        cc::link_with_runtime(&ir_path, output, optimize, runtime_lib)
    } else {
        let ir_path = cc::write_temp_ir(&ir)?;
        let result = cc::link_with_runtime(&ir_path, output, optimize, runtime_lib);
        let _ = fs::remove_file(&ir_path);
        result
    }
}

pub struct Compiler;

impl Compiler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PreparedCompiler {
    ir_path: PathBuf,
    binary_path: PathBuf,
}

impl Backend for Compiler {
    fn name(&self) -> &'static str {
        "compiler"
    }

    fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedBackend>> {
        let ir = emit_ir(program)?;
        let (ir_path, binary_path) =
            cc::compile_ir(&ir, true, None).context("Linking generated IR")?;
        Ok(Box::new(PreparedCompiler {
            ir_path,
            binary_path,
        }))
    }
}

impl PreparedBackend for PreparedCompiler {
    fn run(&self) -> Result<String> {
        cc::run_compiled_binary(&self.binary_path, "Compiled program failed")
    }
}

impl Drop for PreparedCompiler {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.ir_path);
        let _ = fs::remove_file(&self.binary_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};
    use indoc::indoc;

    fn ir_of(source: &str) -> String {
        let tokens = lexer::tokenize(source).expect("tokenize failed");
        let program = parser::parse_tokens(tokens).expect("parse failed");
        emit_ir(&program).expect("emit failed")
    }

    fn compile_error(source: &str) -> CompileError {
        let tokens = lexer::tokenize(source).expect("tokenize failed");
        let program = parser::parse_tokens(tokens).expect("parse failed");
        emit_ir(&program).expect_err("expected compile failure")
    }

    #[test]
    fn emits_module_skeleton_with_declarations() {
        let ir = ir_of("print(1)\n");
        assert!(ir.contains("%array = type { i64, ptr }"));
        assert!(ir.contains("define i32 @main() {"));
        assert!(ir.contains("declare void @culebra_print_int(i64)"));
        assert!(ir.contains("call void @culebra_print_int(i64 1)"));
        assert!(ir.contains("ret i32 0"));
    }

    #[test]
    fn integer_arithmetic_uses_integer_instructions() {
        let ir = ir_of("print(1 + 2 * 3)\n");
        assert!(ir.contains("mul i64"));
        assert!(ir.contains("add i64"));
    }

    #[test]
    fn division_promotes_integers_to_float() {
        let ir = ir_of("print(1 / 2)\n");
        assert!(ir.contains("sitofp i64 1 to double"));
        assert!(ir.contains("fdiv double"));
        assert!(ir.contains("call void @culebra_print_float(double"));
    }

    #[test]
    fn mixed_arithmetic_promotes_the_integer_side() {
        let ir = ir_of("x = 1\ny = x + 2.5\nprint(y)\n");
        assert!(ir.contains("sitofp i64"));
        assert!(ir.contains("fadd double"));
    }

    #[test]
    fn float_literals_are_exact_bit_patterns() {
        let ir = ir_of("print(0.5)\n");
        assert!(ir.contains(&format!("0x{:016X}", 0.5f64.to_bits())));
    }

    #[test]
    fn short_circuit_lowers_to_phi_diamond() {
        let ir = ir_of("a = true\nb = a and false\nprint(b)\n");
        assert!(ir.contains("phi i1 [ false, %entry ]"));
        assert!(ir.contains("br i1"));

        let ir = ir_of("a = false\nb = a or true\nprint(b)\n");
        assert!(ir.contains("phi i1 [ true, %entry ]"));
    }

    #[test]
    fn booleans_widen_to_i8_for_storage() {
        let ir = ir_of("flag = true\nprint(flag)\n");
        assert!(ir.contains("alloca i8"));
        assert!(ir.contains("zext i1 true to i8"));
        assert!(ir.contains("trunc i8"));
    }

    #[test]
    fn function_signature_comes_from_call_site() {
        let source = indoc! {"
            def double_it(x):
                return x + x
            print(double_it(1.5))
        "};
        let ir = ir_of(source);
        assert!(ir.contains("define double @double_it(double %x)"));
        assert!(ir.contains("call double @double_it(double"));
    }

    #[test]
    fn parameters_default_to_integer() {
        let source = indoc! {"
            def fib(n):
                if n < 2:
                    return n
                return fib(n - 1) + fib(n - 2)
            print(fib(10))
        "};
        let ir = ir_of(source);
        assert!(ir.contains("define i64 @fib(i64 %n)"));
        assert!(ir.contains("icmp slt i64"));
    }

    #[test]
    fn functions_without_returns_are_void() {
        let source = indoc! {"
            def greet():
                print(\"hi\")
            greet()
        "};
        let ir = ir_of(source);
        assert!(ir.contains("define void @greet()"));
        assert!(ir.contains("call void @greet()"));
        assert!(ir.contains("ret void"));
    }

    #[test]
    fn string_literals_become_private_constants() {
        let ir = ir_of("print(\"hi\")\n");
        assert!(ir.contains("@.str.1 = private unnamed_addr constant [3 x i8] c\"hi\\00\""));
        assert!(ir.contains("call void @culebra_print_string(ptr"));
    }

    #[test]
    fn string_concat_calls_the_runtime() {
        let ir = ir_of("print(\"a\" + \"b\")\n");
        assert!(ir.contains("call ptr @culebra_str_concat(ptr"));
    }

    #[test]
    fn arrays_lower_to_runtime_calls() {
        let source = indoc! {"
            a = [1, 2, 3]
            a[0] = 9
            print(a[0])
            print(len(a))
        "};
        let ir = ir_of(source);
        assert!(ir.contains("call ptr @culebra_create_array(i64 3, i64 8)"));
        assert!(ir.contains("call void @culebra_array_set(ptr"));
        assert!(ir.contains("call ptr @culebra_array_get(ptr"));
        assert!(ir.contains("call i64 @culebra_len_array(ptr"));
    }

    #[test]
    fn while_loops_create_labelled_blocks() {
        let source = indoc! {"
            n = 0
            while n < 3:
                n = n + 1
            print(n)
        "};
        let ir = ir_of(source);
        assert!(ir.contains("while_cond1:"));
        assert!(ir.contains("while_body2:"));
        assert!(ir.contains("while_end3:"));
    }

    #[test]
    fn for_loops_create_cond_body_step_end_blocks() {
        let source = indoc! {"
            s = 0
            for i = 0; i < 5; i = i + 1:
                s = s + i
            print(s)
        "};
        let ir = ir_of(source);
        assert!(ir.contains("for_cond1:"));
        assert!(ir.contains("for_body2:"));
        assert!(ir.contains("for_step3:"));
        assert!(ir.contains("for_end4:"));
    }

    #[test]
    fn multi_argument_print_goes_through_print_multi() {
        let ir = ir_of("print(1, 2.5, \"x\")\n");
        assert!(ir.contains("call ptr @culebra_int_to_str(i64 1)"));
        assert!(ir.contains("call ptr @culebra_float_to_str(double"));
        assert!(ir.contains("call void (i32, ...) @culebra_print_multi(i32 3, ptr"));
    }

    #[test]
    fn nested_function_definitions_are_rejected() {
        let source = indoc! {"
            def outer():
                def inner():
                    return 1
                return inner()
        "};
        assert!(matches!(
            compile_error(source),
            CompileError::NestedFunction { .. }
        ));
    }

    #[test]
    fn method_calls_are_rejected() {
        let err = compile_error("a = [1]\na.push(2)\n");
        assert!(matches!(
            err,
            CompileError::Unsupported {
                construct: "method calls",
                ..
            }
        ));
    }

    #[test]
    fn map_literals_are_rejected() {
        let err = compile_error("m = {\"a\": 1}\n");
        assert!(matches!(
            err,
            CompileError::Unsupported {
                construct: "map literals",
                ..
            }
        ));
    }

    #[test]
    fn return_at_top_level_is_rejected() {
        assert!(matches!(
            compile_error("return 1\n"),
            CompileError::ReturnOutsideFunction { .. }
        ));
    }

    #[test]
    fn variables_cannot_change_static_type() {
        let err = compile_error("x = 1\nx = \"now a string\"\n");
        assert!(matches!(err, CompileError::TypeConflict { .. }));
    }

    #[test]
    fn irreconcilable_parameter_uses_are_rejected() {
        let source = indoc! {"
            def f(x):
                return x
            f(1)
            f(\"s\")
        "};
        assert!(matches!(compile_error(source), CompileError::TypeConflict { .. }));
    }

    #[test]
    fn every_block_is_terminated() {
        let source = indoc! {"
            def classify(n):
                if n < 0:
                    return 0 - 1
                elif n == 0:
                    return 0
                else:
                    return 1
            print(classify(5))
        "};
        let ir = ir_of(source);
        // No label may be immediately followed by another label or the
        // function's closing brace; that would be an unterminated block.
        let lines: Vec<&str> = ir.lines().collect();
        for window in lines.windows(2) {
            let first = window[0].trim_end();
            let second = window[1].trim_start();
            if first.ends_with(':') && !first.starts_with(';') {
                assert!(
                    !second.ends_with(':') && second != "}",
                    "unterminated block at '{first}'"
                );
            }
        }
    }
}
