use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Statement;
use crate::builtins::Builtin;
use crate::runtime::env::Environment;
use crate::runtime::error::RuntimeError;
use crate::token::Span;

/// A user-defined function: parameter names, body, and the environment
/// captured at definition time (lexical scoping).
#[derive(Debug)]
pub struct FunctionValue {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Vec<Statement>>,
    pub env: Environment,
}

/// Entry stored per map slot: the original key value (for rendering and
/// equality reporting) plus the mapped value.
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
}

/// Runtime value model used by the tree-walking interpreter.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    None,
    Array(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<HashMap<HashKey, MapEntry>>>),
    Set(Rc<RefCell<HashMap<HashKey, Value>>>),
    Tuple(Rc<Vec<Value>>),
    Function(Rc<FunctionValue>),
    Builtin(Builtin),
}

/// Canonical hash over a value's tag plus payload.
///
/// Floats with an integral value normalize to the integer key so that
/// `m[1]` and `m[1.0]` land in the same slot, matching `1 == 1.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Float(u64),
    Boolean(bool),
    String(String),
    Tuple(Vec<HashKey>),
}

impl Value {
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn empty_map() -> Self {
        Value::Map(Rc::new(RefCell::new(HashMap::new())))
    }

    pub fn empty_set() -> Self {
        Value::Set(Rc::new(RefCell::new(HashMap::new())))
    }

    pub fn tuple(values: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(values))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::Boolean(_) => "bool",
            Value::String(_) => "string",
            Value::None => "none",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Tuple(_) => "tuple",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(value) => *value != 0,
            Value::Float(value) => *value != 0.0,
            Value::Boolean(value) => *value,
            Value::String(value) => !value.is_empty(),
            Value::None => false,
            Value::Array(values) => !values.borrow().is_empty(),
            Value::Map(entries) => !entries.borrow().is_empty(),
            Value::Set(elements) => !elements.borrow().is_empty(),
            Value::Tuple(values) => !values.is_empty(),
            Value::Function(_) | Value::Builtin(_) => true,
        }
    }

    /// Rendering used by `print` and `str`: strings appear bare.
    pub fn to_display(&self) -> String {
        match self {
            Value::String(value) => value.clone(),
            _ => self.to_repr(),
        }
    }

    /// Rendering used inside collections: strings are quoted. Map and set
    /// contents are sorted by key rendering so output is deterministic.
    pub fn to_repr(&self) -> String {
        match self {
            Value::Integer(value) => value.to_string(),
            Value::Float(value) => format_float(*value),
            Value::Boolean(true) => "true".to_string(),
            Value::Boolean(false) => "false".to_string(),
            Value::String(value) => quote_string(value),
            Value::None => "None".to_string(),
            Value::Array(values) => {
                let rendered = values
                    .borrow()
                    .iter()
                    .map(Value::to_repr)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{rendered}]")
            }
            Value::Map(entries) => {
                let mut rendered = entries
                    .borrow()
                    .values()
                    .map(|entry| format!("{}: {}", entry.key.to_repr(), entry.value.to_repr()))
                    .collect::<Vec<_>>();
                rendered.sort();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Set(elements) => {
                let mut rendered = elements
                    .borrow()
                    .values()
                    .map(Value::to_repr)
                    .collect::<Vec<_>>();
                rendered.sort();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Tuple(values) => {
                let rendered = values
                    .iter()
                    .map(Value::to_repr)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({rendered})")
            }
            Value::Function(function) => format!("<function {}>", function.name),
            Value::Builtin(builtin) => format!("<built-in function {}>", builtin.name()),
        }
    }

    /// Hashable kinds: int, float, bool, string, and tuples of hashables.
    pub fn hash_key(&self, span: Span) -> Result<HashKey, RuntimeError> {
        match self {
            Value::Integer(value) => Ok(HashKey::Integer(*value)),
            Value::Float(value) => {
                if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                    Ok(HashKey::Integer(*value as i64))
                } else {
                    Ok(HashKey::Float(value.to_bits()))
                }
            }
            Value::Boolean(value) => Ok(HashKey::Boolean(*value)),
            Value::String(value) => Ok(HashKey::String(value.clone())),
            Value::Tuple(values) => {
                let keys = values
                    .iter()
                    .map(|value| value.hash_key(span))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(HashKey::Tuple(keys))
            }
            _ => Err(RuntimeError::Unhashable {
                type_name: self.type_name(),
                span,
            }),
        }
    }

    /// Numeric view used for promotion: both int and float read as f64.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Ordering for `<`/`<=`/`>`/`>=` and for `sort()`: numeric pairs after
    /// promotion, strings byte-lexicographic. Anything else has no order.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            _ => {
                let a = self.as_number()?;
                let b = other.as_number()?;
                a.partial_cmp(&b)
            }
        }
    }
}

/// Structural equality with numeric promotion; different kinds (beyond
/// int/float) are simply unequal. Map and set equality ignores insertion
/// order.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::None, Value::None) => true,
            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Value::Map(a), Value::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter().all(|(key, entry)| {
                        b.get(key)
                            .is_some_and(|other| other.value == entry.value)
                    })
            }
            (Value::Set(a), Value::Set(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.keys().all(|key| b.contains_key(key))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

fn quote_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

/// Format a float the way C's `%g` does: six significant digits, trailing
/// zeros stripped, scientific notation when the exponent is < -4 or >= 6.
///
/// Both backends share this convention (the C runtime prints with `%g`), so
/// interpreted and compiled output agree byte-for-byte.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Round to six significant digits first, then pick the style from the
    // rounded exponent so borderline values match printf's choice.
    let exponential = format!("{value:.5e}");
    let (mantissa, exponent) = exponential
        .split_once('e')
        .expect("exponential format always contains 'e'");
    let exponent: i32 = exponent.parse().expect("exponent is an integer");

    if !(-4..6).contains(&exponent) {
        let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }

    let decimals = (5 - exponent).max(0) as usize;
    let fixed = format!("{value:.decimals$}");
    if fixed.contains('.') {
        fixed
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        fixed
    }
}
