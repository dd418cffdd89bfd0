use thiserror::Error;

use crate::token::Span;

/// Runtime failures surfaced to the user.
///
/// Every variant renders as `<Kind> at line <L>, col <C>: <message>` with the
/// position of the AST node that raised it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("NameError at {span}: name '{name}' is not defined")]
    UndefinedName { name: String, span: Span },

    #[error("TypeError at {span}: unsupported operand types for '{op}': {left} and {right}")]
    UnsupportedBinary {
        op: &'static str,
        left: &'static str,
        right: &'static str,
        span: Span,
    },

    #[error("TypeError at {span}: bad operand type for unary '{op}': {type_name}")]
    UnsupportedUnary {
        op: &'static str,
        type_name: &'static str,
        span: Span,
    },

    #[error("TypeError at {span}: {type_name} object is not callable")]
    NotCallable {
        type_name: &'static str,
        span: Span,
    },

    #[error("TypeError at {span}: method reference '{name}' must be called")]
    UnboundMethodReference { name: String, span: Span },

    #[error("TypeError at {span}: {name}() expected {expected} arguments, got {found}")]
    FunctionArity {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("TypeError at {span}: {name}() takes {expected}, got {found}")]
    BuiltinArity {
        name: &'static str,
        expected: &'static str,
        found: usize,
        span: Span,
    },

    #[error("TypeError at {span}: {method}() expected {expected} arguments, got {found}")]
    MethodArity {
        method: &'static str,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("AttributeError at {span}: {type_name} has no method '{method}'")]
    UnknownMethod {
        method: String,
        type_name: &'static str,
        span: Span,
    },

    #[error("TypeError at {span}: unhashable type: {type_name}")]
    Unhashable {
        type_name: &'static str,
        span: Span,
    },

    #[error("TypeError at {span}: {type_name} is not indexable")]
    NotIndexable {
        type_name: &'static str,
        span: Span,
    },

    #[error("TypeError at {span}: {type_name} indices must be integers, got {got}")]
    IndexNotInteger {
        type_name: &'static str,
        got: &'static str,
        span: Span,
    },

    #[error("IndexError at {span}: index {index} out of range for length {len}")]
    IndexOutOfBounds { index: i64, len: usize, span: Span },

    #[error("IndexError at {span}: pop from empty array")]
    PopFromEmptyArray { span: Span },

    #[error("KeyError at {span}: key not found: {key}")]
    KeyNotFound { key: String, span: Span },

    #[error("TypeError at {span}: {type_name} does not support index assignment")]
    IndexAssignUnsupported {
        type_name: &'static str,
        span: Span,
    },

    #[error("TypeError at {span}: {name}() expected {expected}, got {got}")]
    InvalidArgument {
        name: &'static str,
        expected: &'static str,
        got: &'static str,
        span: Span,
    },

    #[error("ValueError at {span}: invalid literal for int(): '{literal}'")]
    InvalidIntLiteral { literal: String, span: Span },

    #[error("ValueError at {span}: invalid literal for float(): '{literal}'")]
    InvalidFloatLiteral { literal: String, span: Span },

    #[error("ValueError at {span}: ord() expected a non-empty string")]
    OrdEmptyString { span: Span },

    #[error("ValueError at {span}: chr() code point out of range: {code}")]
    ChrOutOfRange { code: i64, span: Span },

    #[error("TypeError at {span}: sort() requires all elements to be numbers or all strings")]
    SortMixedElements { span: Span },

    #[error("FileNotFoundError at {span}: cannot read file '{path}'")]
    FileNotFound { path: String, span: Span },

    #[error("SyntaxError at {span}: return outside of function")]
    ReturnOutsideFunction { span: Span },
}
