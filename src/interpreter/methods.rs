//! Method dispatch for `receiver.method(args...)` calls.
//!
//! Each value kind has a closed method table; anything else is an
//! `AttributeError`. Mutating methods go through the receiver's interior
//! mutability, so aliased collections observe the change.

use std::cmp::Ordering;

use crate::runtime::value::MapEntry;
use crate::runtime::{RuntimeError, Value};
use crate::token::Span;

pub(super) fn call_method(
    receiver: &Value,
    method: &str,
    args: Vec<Value>,
    span: Span,
) -> Result<Value, RuntimeError> {
    match receiver {
        Value::Array(_) => array_method(receiver, method, args, span),
        Value::Map(_) => map_method(receiver, method, args, span),
        Value::Set(_) => set_method(receiver, method, args, span),
        Value::String(_) => string_method(receiver, method, args, span),
        _ => Err(unknown_method(receiver, method, span)),
    }
}

fn array_method(
    receiver: &Value,
    method: &str,
    mut args: Vec<Value>,
    span: Span,
) -> Result<Value, RuntimeError> {
    let Value::Array(values) = receiver else {
        unreachable!("array_method dispatched on non-array");
    };
    match method {
        "push" => {
            expect_arity("push", &args, 1, span)?;
            values.borrow_mut().push(args.remove(0));
            Ok(Value::None)
        }
        "pop" => {
            expect_arity("pop", &args, 0, span)?;
            values
                .borrow_mut()
                .pop()
                .ok_or(RuntimeError::PopFromEmptyArray { span })
        }
        "sort" => {
            expect_arity("sort", &args, 0, span)?;
            {
                let values = values.borrow();
                let all_numbers = values.iter().all(|value| value.as_number().is_some());
                let all_strings = values.iter().all(|value| matches!(value, Value::String(_)));
                if !(all_numbers || all_strings) {
                    return Err(RuntimeError::SortMixedElements { span });
                }
            }
            values
                .borrow_mut()
                .sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
            Ok(Value::None)
        }
        _ => Err(unknown_method(receiver, method, span)),
    }
}

fn map_method(
    receiver: &Value,
    method: &str,
    mut args: Vec<Value>,
    span: Span,
) -> Result<Value, RuntimeError> {
    let Value::Map(entries) = receiver else {
        unreachable!("map_method dispatched on non-map");
    };
    match method {
        "get" => {
            expect_arity("get", &args, 1, span)?;
            let hash = args[0].hash_key(span)?;
            Ok(entries
                .borrow()
                .get(&hash)
                .map(|entry| entry.value.clone())
                .unwrap_or(Value::None))
        }
        "set" => {
            expect_arity("set", &args, 2, span)?;
            let value = args.remove(1);
            let key = args.remove(0);
            let hash = key.hash_key(span)?;
            entries.borrow_mut().insert(hash, MapEntry { key, value });
            Ok(Value::None)
        }
        "has" => {
            expect_arity("has", &args, 1, span)?;
            let hash = args[0].hash_key(span)?;
            Ok(Value::Boolean(entries.borrow().contains_key(&hash)))
        }
        "remove" => {
            expect_arity("remove", &args, 1, span)?;
            let hash = args[0].hash_key(span)?;
            match entries.borrow_mut().remove(&hash) {
                Some(_) => Ok(Value::None),
                None => Err(RuntimeError::KeyNotFound {
                    key: args[0].to_repr(),
                    span,
                }),
            }
        }
        _ => Err(unknown_method(receiver, method, span)),
    }
}

fn set_method(
    receiver: &Value,
    method: &str,
    mut args: Vec<Value>,
    span: Span,
) -> Result<Value, RuntimeError> {
    let Value::Set(elements) = receiver else {
        unreachable!("set_method dispatched on non-set");
    };
    match method {
        "add" => {
            expect_arity("add", &args, 1, span)?;
            let element = args.remove(0);
            let hash = element.hash_key(span)?;
            elements.borrow_mut().insert(hash, element);
            Ok(Value::None)
        }
        "remove" => {
            expect_arity("remove", &args, 1, span)?;
            let hash = args[0].hash_key(span)?;
            match elements.borrow_mut().remove(&hash) {
                Some(_) => Ok(Value::None),
                None => Err(RuntimeError::KeyNotFound {
                    key: args[0].to_repr(),
                    span,
                }),
            }
        }
        "has" => {
            expect_arity("has", &args, 1, span)?;
            let hash = args[0].hash_key(span)?;
            Ok(Value::Boolean(elements.borrow().contains_key(&hash)))
        }
        _ => Err(unknown_method(receiver, method, span)),
    }
}

fn string_method(
    receiver: &Value,
    method: &str,
    args: Vec<Value>,
    span: Span,
) -> Result<Value, RuntimeError> {
    let Value::String(value) = receiver else {
        unreachable!("string_method dispatched on non-string");
    };
    match method {
        "split" => {
            expect_arity("split", &args, 1, span)?;
            let Value::String(delimiter) = &args[0] else {
                return Err(RuntimeError::InvalidArgument {
                    name: "split",
                    expected: "a string delimiter",
                    got: args[0].type_name(),
                    span,
                });
            };
            if delimiter.is_empty() {
                return Err(RuntimeError::InvalidArgument {
                    name: "split",
                    expected: "a non-empty delimiter",
                    got: "empty string",
                    span,
                });
            }
            let parts = value
                .split(delimiter.as_str())
                .map(|part| Value::String(part.to_string()))
                .collect();
            Ok(Value::array(parts))
        }
        _ => Err(unknown_method(receiver, method, span)),
    }
}

fn unknown_method(receiver: &Value, method: &str, span: Span) -> RuntimeError {
    RuntimeError::UnknownMethod {
        method: method.to_string(),
        type_name: receiver.type_name(),
        span,
    }
}

fn expect_arity(
    method: &'static str,
    args: &[Value],
    expected: usize,
    span: Span,
) -> Result<(), RuntimeError> {
    if args.len() != expected {
        return Err(RuntimeError::MethodArity {
            method,
            expected,
            found: args.len(),
            span,
        });
    }
    Ok(())
}
