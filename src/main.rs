use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use culebra::backend::{Backend, backends};
use culebra::{compiler, lexer, parser};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut backend_name = "interpreter".to_string();
    let mut compile = false;
    let mut emit_llvm = false;
    let mut keep_ir = false;
    let mut optimize = true;
    let mut output_path: Option<PathBuf> = None;
    let mut runtime_lib: Option<PathBuf> = None;
    let mut input_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--backend" | "-b" => {
                backend_name = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing backend name after {arg}"))?;
            }
            "--compile" => compile = true,
            "--emit-llvm" => emit_llvm = true,
            "--keep-ir" => keep_ir = true,
            "--no-optimize" => optimize = false,
            "-o" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing output path after -o"))?;
                output_path = Some(PathBuf::from(path));
            }
            "--runtime-lib" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing path after --runtime-lib"))?;
                runtime_lib = Some(PathBuf::from(path));
            }
            _ => {
                input_path = Some(PathBuf::from(arg));
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let source = if let Some(path) = &input_path {
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let tokens = lexer::tokenize(&source)?;
    let program = parser::parse_tokens(tokens)?;

    if emit_llvm {
        let ir = compiler::emit_ir(&program)?;
        match &output_path {
            Some(path) => {
                fs::write(path, ir).with_context(|| format!("Writing {}", path.display()))?;
            }
            None => print!("{ir}"),
        }
        return Ok(());
    }

    if compile {
        let output = output_path.unwrap_or_else(|| {
            input_path
                .as_deref()
                .map(|path| path.with_extension(""))
                .unwrap_or_else(|| PathBuf::from("a.out"))
        });
        compiler::compile_to_executable(
            &program,
            &output,
            optimize,
            runtime_lib.as_deref(),
            keep_ir,
        )?;
        return Ok(());
    }

    for backend in backends() {
        if backend.name() == backend_name {
            let output = backend.run(&program)?;
            if !output.is_empty() {
                print!("{output}");
                if !output.ends_with('\n') {
                    println!();
                }
            }
            return Ok(());
        }
    }

    bail!("Unknown backend '{backend_name}'")
}
