use anyhow::{Context, Result, ensure};
use std::fs;
use std::path::Path;
use std::process::Command;

use culebra::backend::{Backend, backends};
use culebra::compiler::Compiler;
use culebra::fixtures::{CaseClass, is_backend_unsupported, load_cases, normalize_output};
use culebra::interpreter::Interpreter;
use culebra::{lexer, parser};

fn native_toolchain_required() -> bool {
    std::env::var("NATIVE_PARITY_REQUIRED")
        .map(|value| value == "1")
        .unwrap_or(false)
}

fn detect_clang() -> Result<bool> {
    let available = Command::new("clang")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false);
    if available {
        return Ok(true);
    }
    if native_toolchain_required() {
        anyhow::bail!("Native parity required but clang was not found on PATH.");
    }
    eprintln!("Skipping compiled-backend tests: clang not found on PATH.");
    Ok(false)
}

fn run_programs_for_backend(backend: &dyn Backend) -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        if is_backend_unsupported(&case, backend.name()) {
            continue;
        }
        if case.spec.bench.enabled {
            ensure!(
                !case.spec.bench.tags.is_empty(),
                "Case {} has bench enabled but no tags",
                case.name
            );
        }
        let source = fs::read_to_string(&case.program_path)
            .with_context(|| format!("Reading {}", case.name))?;
        let tokenized = lexer::tokenize(&source);
        match case.spec.class {
            CaseClass::RuntimeSuccess => {
                ensure!(
                    case.spec.expected.exit_code == 0,
                    "Case {} expected exit code must be 0 for runtime_success",
                    case.name
                );
                let stdout_file = case
                    .spec
                    .expected
                    .stdout_file
                    .as_deref()
                    .with_context(|| format!("Missing stdout_file in {}", case.name))?;
                let expected = case.read_text(stdout_file)?;
                let tokens = tokenized.with_context(|| format!("Tokenizing {}", case.name))?;
                let program = parser::parse_tokens(tokens)
                    .with_context(|| format!("Parsing {}", case.name))?;
                let output = backend.run(&program).with_context(|| {
                    format!("Backend {} failed for {}", backend.name(), case.name)
                })?;
                assert_eq!(
                    normalize_output(&output),
                    normalize_output(&expected),
                    "Backend {} mismatch for {}",
                    backend.name(),
                    case.name
                );
            }
            CaseClass::FrontendError => {
                ensure!(
                    case.spec.expected.exit_code == 1,
                    "Case {} expected exit code must be 1 for frontend_error",
                    case.name
                );
                let expected_file = case
                    .spec
                    .expected
                    .stderr_contains_file
                    .as_deref()
                    .with_context(|| format!("Missing stderr expectation file in {}", case.name))?;
                let expected_error = case.read_text(expected_file)?;
                let expected_error = expected_error.trim();
                match tokenized {
                    Err(error) => {
                        let actual = error.to_string();
                        ensure!(
                            actual.contains(expected_error),
                            "Expected frontend error containing '{expected_error}' in {}, got '{actual}'",
                            case.name
                        );
                    }
                    Ok(tokens) => {
                        let parse_result = parser::parse_tokens(tokens);
                        ensure!(
                            parse_result.is_err(),
                            "Expected frontend error in {}, but parsing succeeded",
                            case.name
                        );
                        let actual = parse_result
                            .expect_err("parse_result checked as err")
                            .to_string();
                        ensure!(
                            actual.contains(expected_error),
                            "Expected frontend error containing '{expected_error}' in {}, got '{actual}'",
                            case.name
                        );
                    }
                }
            }
            CaseClass::BackendRuntimeError => {
                ensure!(
                    case.spec.expected.exit_code == 1,
                    "Case {} expected exit code must be 1 for backend_runtime_error",
                    case.name
                );
                let expected_file = case
                    .spec
                    .expected
                    .stderr_contains_file
                    .as_deref()
                    .with_context(|| format!("Missing stderr expectation file in {}", case.name))?;
                let expected_error = case.read_text(expected_file)?;
                let expected_error = expected_error.trim();
                let tokens = tokenized.with_context(|| format!("Tokenizing {}", case.name))?;
                let program = parser::parse_tokens(tokens)
                    .with_context(|| format!("Parsing {}", case.name))?;
                let result = backend.run(&program);
                ensure!(
                    result.is_err(),
                    "Expected backend runtime error for backend {} in {}",
                    backend.name(),
                    case.name
                );
                let actual = result.expect_err("result checked as err").to_string();
                ensure!(
                    actual.contains(expected_error),
                    "Expected backend runtime error containing '{expected_error}' in {}, got '{actual}'",
                    case.name
                );
            }
        }
    }

    Ok(())
}

#[test]
fn runs_programs_interpreter_backend() -> Result<()> {
    run_programs_for_backend(&Interpreter::new())
}

#[test]
fn runs_programs_compiler_backend() -> Result<()> {
    if !detect_clang()? {
        return Ok(());
    }
    run_programs_for_backend(&Compiler::new())
}

/// Both backends must produce byte-identical stdout for every program whose
/// types resolve statically.
#[test]
fn backends_agree_on_shared_programs() -> Result<()> {
    if !detect_clang()? {
        return Ok(());
    }

    let cases = load_cases(Path::new("tests/programs"))?;
    for case in cases {
        if !matches!(case.spec.class, CaseClass::RuntimeSuccess) {
            continue;
        }
        let supported_everywhere = backends()
            .iter()
            .all(|backend| !is_backend_unsupported(&case, backend.name()));
        if !supported_everywhere {
            continue;
        }

        let source = fs::read_to_string(&case.program_path)
            .with_context(|| format!("Reading {}", case.name))?;
        let tokens = lexer::tokenize(&source).with_context(|| format!("Tokenizing {}", case.name))?;
        let program =
            parser::parse_tokens(tokens).with_context(|| format!("Parsing {}", case.name))?;

        let interpreted = Interpreter::new()
            .run(&program)
            .with_context(|| format!("Interpreter failed for {}", case.name))?;
        let compiled = Compiler::new()
            .run(&program)
            .with_context(|| format!("Compiler failed for {}", case.name))?;
        assert_eq!(
            normalize_output(&interpreted),
            normalize_output(&compiled),
            "Backend outputs diverge for {}",
            case.name
        );
    }

    Ok(())
}
