use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::runtime::value::Value;

/// One level of the name-binding chain. The outermost frame holds the
/// builtins and global bindings; each user function call pushes a frame whose
/// parent is the function's captured definition environment.
///
/// `if`/`while`/`for` blocks do not introduce frames: assignments inside them
/// land in the enclosing function or global frame.
#[derive(Clone)]
pub struct Environment {
    frame: Rc<RefCell<Frame>>,
}

struct Frame {
    values: HashMap<String, Value>,
    parent: Option<Environment>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            frame: Rc::new(RefCell::new(Frame {
                values: HashMap::new(),
                parent: None,
            })),
        }
    }

    /// A child frame for a function call, parented to `self`.
    pub fn child(&self) -> Self {
        Self {
            frame: Rc::new(RefCell::new(Frame {
                values: HashMap::new(),
                parent: Some(self.clone()),
            })),
        }
    }

    /// Read walks the chain from innermost outward.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.frame.borrow().values.get(name) {
            return Some(value.clone());
        }
        let parent = self.frame.borrow().parent.clone();
        parent.and_then(|parent| parent.get(name))
    }

    pub fn has(&self, name: &str) -> bool {
        if self.frame.borrow().values.contains_key(name) {
            return true;
        }
        let parent = self.frame.borrow().parent.clone();
        parent.is_some_and(|parent| parent.has(name))
    }

    /// Write updates an existing binding anywhere in the chain; otherwise it
    /// creates the name in the innermost frame.
    pub fn assign(&self, name: &str, value: Value) {
        if self.frame.borrow().values.contains_key(name) {
            self.frame.borrow_mut().values.insert(name.to_string(), value);
            return;
        }
        let parent = self.frame.borrow().parent.clone();
        if let Some(parent) = parent {
            if parent.has(name) {
                parent.assign(name, value);
                return;
            }
        }
        self.frame.borrow_mut().values.insert(name.to_string(), value);
    }

    /// Bind in this frame only, ignoring outer bindings. Used for parameters
    /// and for seeding builtins.
    pub fn define(&self, name: &str, value: Value) {
        self.frame.borrow_mut().values.insert(name.to_string(), value);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

// Closures captured in values make the chain cyclic; keep Debug shallow.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_walks_chain_outward() {
        let globals = Environment::new();
        globals.define("x", Value::Integer(1));
        let frame = globals.child();
        assert_eq!(frame.get("x"), Some(Value::Integer(1)));
        assert_eq!(frame.get("missing"), None);
    }

    #[test]
    fn assign_updates_existing_outer_binding() {
        let globals = Environment::new();
        globals.define("x", Value::Integer(1));
        let frame = globals.child();
        frame.assign("x", Value::Integer(2));
        assert_eq!(globals.get("x"), Some(Value::Integer(2)));
    }

    #[test]
    fn assign_creates_in_innermost_frame_when_absent() {
        let globals = Environment::new();
        let frame = globals.child();
        frame.assign("local", Value::Integer(7));
        assert_eq!(frame.get("local"), Some(Value::Integer(7)));
        assert_eq!(globals.get("local"), None);
    }

    #[test]
    fn define_shadows_outer_binding() {
        let globals = Environment::new();
        globals.define("x", Value::Integer(1));
        let frame = globals.child();
        frame.define("x", Value::Integer(2));
        assert_eq!(frame.get("x"), Some(Value::Integer(2)));
        assert_eq!(globals.get("x"), Some(Value::Integer(1)));
    }
}
