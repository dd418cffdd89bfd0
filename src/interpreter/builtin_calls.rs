//! Builtin function evaluation. Each builtin validates its own arguments;
//! `print` appends to the runtime's output buffer rather than writing to
//! stdout directly so backends stay comparable in tests.

use std::io::Write;

use crate::builtins::Builtin;
use crate::runtime::{RuntimeError, Value};
use crate::token::Span;

use super::InterpreterRuntime;

impl InterpreterRuntime {
    pub(super) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        match builtin {
            Builtin::Print => {
                let line = args
                    .iter()
                    .map(Value::to_display)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.output.push(line);
                Ok(Value::None)
            }
            Builtin::Input => {
                if args.len() > 1 {
                    return Err(RuntimeError::BuiltinArity {
                        name: "input",
                        expected: "0 or 1 arguments",
                        found: args.len(),
                        span,
                    });
                }
                if let Some(prompt) = args.first() {
                    let Value::String(prompt) = prompt else {
                        return Err(invalid_argument("input", "a string prompt", prompt, span));
                    };
                    print!("{prompt}");
                    let _ = std::io::stdout().flush();
                }
                let mut line = String::new();
                let _ = std::io::stdin().read_line(&mut line);
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(Value::String(line))
            }
            Builtin::Len => {
                expect_one("len", &args, span)?;
                let length = match &args[0] {
                    Value::String(value) => value.chars().count(),
                    Value::Array(values) => values.borrow().len(),
                    Value::Map(entries) => entries.borrow().len(),
                    Value::Set(elements) => elements.borrow().len(),
                    Value::Tuple(values) => values.len(),
                    other => {
                        return Err(invalid_argument("len", "a string or collection", other, span));
                    }
                };
                Ok(Value::Integer(length as i64))
            }
            Builtin::Chr => {
                expect_one("chr", &args, span)?;
                let Value::Integer(code) = args[0] else {
                    return Err(invalid_argument("chr", "an integer", &args[0], span));
                };
                let ch = u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or(RuntimeError::ChrOutOfRange { code, span })?;
                Ok(Value::String(ch.to_string()))
            }
            Builtin::Ord => {
                expect_one("ord", &args, span)?;
                let Value::String(value) = &args[0] else {
                    return Err(invalid_argument("ord", "a string", &args[0], span));
                };
                let ch = value
                    .chars()
                    .next()
                    .ok_or(RuntimeError::OrdEmptyString { span })?;
                Ok(Value::Integer(ch as i64))
            }
            Builtin::Int => {
                expect_one("int", &args, span)?;
                match &args[0] {
                    Value::Integer(value) => Ok(Value::Integer(*value)),
                    Value::Float(value) => Ok(Value::Integer(*value as i64)),
                    Value::String(value) => value.trim().parse::<i64>().map(Value::Integer).map_err(
                        |_| RuntimeError::InvalidIntLiteral {
                            literal: value.clone(),
                            span,
                        },
                    ),
                    other => Err(invalid_argument("int", "a number or string", other, span)),
                }
            }
            Builtin::Float => {
                expect_one("float", &args, span)?;
                match &args[0] {
                    Value::Integer(value) => Ok(Value::Float(*value as f64)),
                    Value::Float(value) => Ok(Value::Float(*value)),
                    Value::String(value) => value.trim().parse::<f64>().map(Value::Float).map_err(
                        |_| RuntimeError::InvalidFloatLiteral {
                            literal: value.clone(),
                            span,
                        },
                    ),
                    other => Err(invalid_argument("float", "a number or string", other, span)),
                }
            }
            Builtin::Str => {
                expect_one("str", &args, span)?;
                Ok(Value::String(args[0].to_display()))
            }
            Builtin::Abs => {
                expect_one("abs", &args, span)?;
                match &args[0] {
                    Value::Integer(value) => Ok(Value::Integer(value.wrapping_abs())),
                    Value::Float(value) => Ok(Value::Float(value.abs())),
                    other => Err(invalid_argument("abs", "a number", other, span)),
                }
            }
            Builtin::ReadFile => {
                expect_one("read_file", &args, span)?;
                let path = expect_path("read_file", &args[0], span)?;
                std::fs::read_to_string(path)
                    .map(Value::String)
                    .map_err(|_| RuntimeError::FileNotFound {
                        path: path.to_string(),
                        span,
                    })
            }
            Builtin::ReadLines => {
                expect_one("read_lines", &args, span)?;
                let path = expect_path("read_lines", &args[0], span)?;
                let contents =
                    std::fs::read_to_string(path).map_err(|_| RuntimeError::FileNotFound {
                        path: path.to_string(),
                        span,
                    })?;
                let lines = contents
                    .lines()
                    .map(|line| Value::String(line.to_string()))
                    .collect();
                Ok(Value::array(lines))
            }
            Builtin::NewMap => {
                expect_none("Map", &args, span)?;
                Ok(Value::empty_map())
            }
            Builtin::NewSet => {
                expect_none("Set", &args, span)?;
                Ok(Value::empty_set())
            }
        }
    }
}

fn expect_one(name: &'static str, args: &[Value], span: Span) -> Result<(), RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::BuiltinArity {
            name,
            expected: "exactly 1 argument",
            found: args.len(),
            span,
        });
    }
    Ok(())
}

fn expect_none(name: &'static str, args: &[Value], span: Span) -> Result<(), RuntimeError> {
    if !args.is_empty() {
        return Err(RuntimeError::BuiltinArity {
            name,
            expected: "no arguments",
            found: args.len(),
            span,
        });
    }
    Ok(())
}

fn expect_path<'v>(
    name: &'static str,
    arg: &'v Value,
    span: Span,
) -> Result<&'v str, RuntimeError> {
    match arg {
        Value::String(path) => Ok(path),
        other => Err(invalid_argument(name, "a path string", other, span)),
    }
}

fn invalid_argument(
    name: &'static str,
    expected: &'static str,
    got: &Value,
    span: Span,
) -> RuntimeError {
    RuntimeError::InvalidArgument {
        name,
        expected,
        got: got.type_name(),
        span,
    }
}
