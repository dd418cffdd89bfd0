//! Shared dynamic value model: tagged values, hashable keys, the scoping
//! environment, and the runtime error taxonomy.

pub mod env;
pub mod error;
pub mod value;

pub use env::Environment;
pub use error::RuntimeError;
pub use value::{format_float, FunctionValue, HashKey, Value};
