//! Tree-walking backend.
//!
//! This path executes AST statements directly: top-level execution seeds the
//! builtins into the global frame, then delegates statement and expression
//! evaluation to `InterpreterRuntime`. `return` is modelled as a control-flow
//! result that only the enclosing function call absorbs.

use anyhow::Result;
use std::rc::Rc;

use crate::ast::{
    AssignTarget, BinaryOperator, ExprKind, Expression, Program, Statement, StmtKind,
    UnaryOperator,
};
use crate::backend::{Backend, PreparedBackend};
use crate::builtins::Builtin;
use crate::runtime::value::MapEntry;
use crate::runtime::{Environment, FunctionValue, RuntimeError, Value};
use crate::token::Span;

mod builtin_calls;
mod methods;

pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PreparedInterpreter {
    statements: Vec<Statement>,
}

impl PreparedInterpreter {
    fn run_once(&self) -> std::result::Result<String, RuntimeError> {
        // Execution pipeline:
        // run_once -> exec_block (top-level statements) -> exec_statement
        // -> eval_expression -> eval_call -> exec_block (function body).
        let globals = Environment::new();
        seed_builtins(&globals);
        let mut runtime = InterpreterRuntime::new();
        match runtime.exec_block(&self.statements, &globals)? {
            ExecResult::Continue => {}
            ExecResult::Return(_, span) => {
                return Err(RuntimeError::ReturnOutsideFunction { span });
            }
        }
        Ok(runtime.output.join("\n"))
    }
}

impl PreparedBackend for PreparedInterpreter {
    fn run(&self) -> Result<String> {
        Ok(self.run_once()?)
    }
}

impl Backend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedBackend>> {
        Ok(Box::new(PreparedInterpreter {
            statements: program.statements.clone(),
        }))
    }
}

fn seed_builtins(globals: &Environment) {
    for builtin in Builtin::all() {
        globals.define(builtin.name(), Value::Builtin(*builtin));
    }
}

/// Control-flow marker for statement execution; the span is where the
/// `return` appeared, for the top-level diagnostic.
pub(crate) enum ExecResult {
    Continue,
    Return(Value, Span),
}

/// Runtime executor for interpreted statements and expressions.
pub(crate) struct InterpreterRuntime {
    pub(crate) output: Vec<String>,
}

impl InterpreterRuntime {
    pub(crate) fn new() -> Self {
        Self { output: Vec::new() }
    }

    pub(crate) fn exec_block(
        &mut self,
        body: &[Statement],
        env: &Environment,
    ) -> std::result::Result<ExecResult, RuntimeError> {
        // Execute statements in order until one returns, then bubble that up.
        for statement in body {
            match self.exec_statement(statement, env)? {
                ExecResult::Continue => {}
                returned @ ExecResult::Return(..) => return Ok(returned),
            }
        }
        Ok(ExecResult::Continue)
    }

    fn exec_statement(
        &mut self,
        statement: &Statement,
        env: &Environment,
    ) -> std::result::Result<ExecResult, RuntimeError> {
        match &statement.kind {
            StmtKind::Expr(expr) => {
                self.eval_expression(expr, env)?;
                Ok(ExecResult::Continue)
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval_expression(value, env)?;
                match target {
                    AssignTarget::Name(name) => env.assign(name, value),
                    AssignTarget::Index { object, index } => {
                        let object_value = self.eval_expression(object, env)?;
                        let index_value = self.eval_expression(index, env)?;
                        self.assign_index(&object_value, index_value, value, statement.span)?;
                    }
                }
                Ok(ExecResult::Continue)
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition = self.eval_expression(condition, env)?;
                let body = if condition.is_truthy() {
                    then_body
                } else {
                    else_body
                };
                self.exec_block(body, env)
            }
            StmtKind::While { condition, body } => {
                loop {
                    let condition = self.eval_expression(condition, env)?;
                    if !condition.is_truthy() {
                        break;
                    }
                    if let returned @ ExecResult::Return(..) = self.exec_block(body, env)? {
                        return Ok(returned);
                    }
                }
                Ok(ExecResult::Continue)
            }
            StmtKind::For {
                init,
                condition,
                step,
                body,
            } => {
                // INIT once; then COND, body, STEP until COND is falsy. The
                // loop shares the enclosing scope.
                if let returned @ ExecResult::Return(..) = self.exec_statement(init, env)? {
                    return Ok(returned);
                }
                loop {
                    let condition = self.eval_expression(condition, env)?;
                    if !condition.is_truthy() {
                        break;
                    }
                    if let returned @ ExecResult::Return(..) = self.exec_block(body, env)? {
                        return Ok(returned);
                    }
                    if let returned @ ExecResult::Return(..) = self.exec_statement(step, env)? {
                        return Ok(returned);
                    }
                }
                Ok(ExecResult::Continue)
            }
            StmtKind::FunctionDef { name, params, body } => {
                let function = FunctionValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: Rc::new(body.clone()),
                    env: env.clone(),
                };
                env.define(name, Value::Function(Rc::new(function)));
                Ok(ExecResult::Continue)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expression(expr, env)?,
                    None => Value::None,
                };
                Ok(ExecResult::Return(value, statement.span))
            }
        }
    }

    fn eval_expression(
        &mut self,
        expr: &Expression,
        env: &Environment,
    ) -> std::result::Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Integer(value) => Ok(Value::Integer(*value)),
            ExprKind::Float(value) => Ok(Value::Float(*value)),
            ExprKind::Boolean(value) => Ok(Value::Boolean(*value)),
            ExprKind::String(value) => Ok(Value::String(value.clone())),
            ExprKind::Identifier(name) => {
                env.get(name).ok_or_else(|| RuntimeError::UndefinedName {
                    name: name.clone(),
                    span: expr.span,
                })
            }
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expression(element, env)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::Map(pairs) => {
                let map = Value::empty_map();
                if let Value::Map(entries) = &map {
                    for (key_expr, value_expr) in pairs {
                        let key = self.eval_expression(key_expr, env)?;
                        let value = self.eval_expression(value_expr, env)?;
                        let hash = key.hash_key(key_expr.span)?;
                        entries.borrow_mut().insert(hash, MapEntry { key, value });
                    }
                }
                Ok(map)
            }
            ExprKind::Set(element_exprs) => {
                let set = Value::empty_set();
                if let Value::Set(elements) = &set {
                    for element_expr in element_exprs {
                        let element = self.eval_expression(element_expr, env)?;
                        let hash = element.hash_key(element_expr.span)?;
                        elements.borrow_mut().insert(hash, element);
                    }
                }
                Ok(set)
            }
            ExprKind::Tuple(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expression(element, env)?);
                }
                Ok(Value::tuple(values))
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval_expression(operand, env)?;
                self.apply_unary(*op, operand, expr.span)
            }
            ExprKind::Binary { left, op, right } => {
                self.eval_binary(left, *op, right, expr.span, env)
            }
            ExprKind::Index { object, index } => {
                let object = self.eval_expression(object, env)?;
                let index = self.eval_expression(index, env)?;
                self.eval_index(&object, &index, expr.span)
            }
            ExprKind::Attribute { name, .. } => Err(RuntimeError::UnboundMethodReference {
                name: name.clone(),
                span: expr.span,
            }),
            ExprKind::Call { callee, args } => self.eval_call(callee, args, expr.span, env),
        }
    }

    fn eval_binary(
        &mut self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
        span: Span,
        env: &Environment,
    ) -> std::result::Result<Value, RuntimeError> {
        // `and`/`or` short-circuit and yield the value that decided the
        // expression, so the right operand must stay unevaluated here.
        match op {
            BinaryOperator::And => {
                let left = self.eval_expression(left, env)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                return self.eval_expression(right, env);
            }
            BinaryOperator::Or => {
                let left = self.eval_expression(left, env)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                return self.eval_expression(right, env);
            }
            _ => {}
        }

        let left = self.eval_expression(left, env)?;
        let right = self.eval_expression(right, env)?;
        self.apply_binary(op, left, right, span)
    }

    fn apply_binary(
        &mut self,
        op: BinaryOperator,
        left: Value,
        right: Value,
        span: Span,
    ) -> std::result::Result<Value, RuntimeError> {
        let type_error = |op: BinaryOperator, left: &Value, right: &Value| {
            RuntimeError::UnsupportedBinary {
                op: op.symbol(),
                left: left.type_name(),
                right: right.type_name(),
                span,
            }
        };

        match op {
            BinaryOperator::Add => match (&left, &right) {
                (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_add(*b))),
                (Value::String(a), Value::String(b)) => {
                    let mut joined = String::with_capacity(a.len() + b.len());
                    joined.push_str(a);
                    joined.push_str(b);
                    Ok(Value::String(joined))
                }
                _ => match (left.as_number(), right.as_number()) {
                    (Some(a), Some(b)) => Ok(Value::Float(a + b)),
                    _ => Err(type_error(op, &left, &right)),
                },
            },
            BinaryOperator::Sub => match (&left, &right) {
                (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_sub(*b))),
                _ => match (left.as_number(), right.as_number()) {
                    (Some(a), Some(b)) => Ok(Value::Float(a - b)),
                    _ => Err(type_error(op, &left, &right)),
                },
            },
            BinaryOperator::Mul => match (&left, &right) {
                (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_mul(*b))),
                _ => match (left.as_number(), right.as_number()) {
                    (Some(a), Some(b)) => Ok(Value::Float(a * b)),
                    _ => Err(type_error(op, &left, &right)),
                },
            },
            // Division always yields a float, even for two integers.
            BinaryOperator::Div => match (left.as_number(), right.as_number()) {
                (Some(a), Some(b)) => Ok(Value::Float(a / b)),
                _ => Err(type_error(op, &left, &right)),
            },
            BinaryOperator::Eq => Ok(Value::Boolean(left == right)),
            BinaryOperator::NotEq => Ok(Value::Boolean(left != right)),
            BinaryOperator::Less
            | BinaryOperator::LessEq
            | BinaryOperator::Greater
            | BinaryOperator::GreaterEq => {
                let ordering = left
                    .compare(&right)
                    .ok_or_else(|| type_error(op, &left, &right))?;
                let result = match op {
                    BinaryOperator::Less => ordering.is_lt(),
                    BinaryOperator::LessEq => ordering.is_le(),
                    BinaryOperator::Greater => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Boolean(result))
            }
            BinaryOperator::And | BinaryOperator::Or => {
                unreachable!("short-circuit operators are handled in eval_binary")
            }
        }
    }

    fn apply_unary(
        &mut self,
        op: UnaryOperator,
        operand: Value,
        span: Span,
    ) -> std::result::Result<Value, RuntimeError> {
        match op {
            UnaryOperator::Not => Ok(Value::Boolean(!operand.is_truthy())),
            UnaryOperator::Neg => match operand {
                Value::Integer(value) => Ok(Value::Integer(value.wrapping_neg())),
                Value::Float(value) => Ok(Value::Float(-value)),
                _ => Err(RuntimeError::UnsupportedUnary {
                    op: "-",
                    type_name: operand.type_name(),
                    span,
                }),
            },
        }
    }

    fn eval_index(
        &mut self,
        object: &Value,
        index: &Value,
        span: Span,
    ) -> std::result::Result<Value, RuntimeError> {
        match object {
            Value::Array(values) => {
                let values = values.borrow();
                let position = check_bounds(index, values.len(), "array", span)?;
                Ok(values[position].clone())
            }
            Value::Tuple(values) => {
                let position = check_bounds(index, values.len(), "tuple", span)?;
                Ok(values[position].clone())
            }
            Value::String(value) => {
                let len = value.chars().count();
                let position = check_bounds(index, len, "string", span)?;
                let ch = value.chars().nth(position).expect("index checked");
                Ok(Value::String(ch.to_string()))
            }
            Value::Map(entries) => {
                let hash = index.hash_key(span)?;
                entries
                    .borrow()
                    .get(&hash)
                    .map(|entry| entry.value.clone())
                    .ok_or_else(|| RuntimeError::KeyNotFound {
                        key: index.to_repr(),
                        span,
                    })
            }
            _ => Err(RuntimeError::NotIndexable {
                type_name: object.type_name(),
                span,
            }),
        }
    }

    fn assign_index(
        &mut self,
        object: &Value,
        index: Value,
        value: Value,
        span: Span,
    ) -> std::result::Result<(), RuntimeError> {
        match object {
            Value::Array(values) => {
                let len = values.borrow().len();
                let position = check_bounds(&index, len, "array", span)?;
                values.borrow_mut()[position] = value;
                Ok(())
            }
            // Map assignment creates the key if absent.
            Value::Map(entries) => {
                let hash = index.hash_key(span)?;
                entries.borrow_mut().insert(hash, MapEntry { key: index, value });
                Ok(())
            }
            _ => Err(RuntimeError::IndexAssignUnsupported {
                type_name: object.type_name(),
                span,
            }),
        }
    }

    fn eval_call(
        &mut self,
        callee: &Expression,
        args: &[Expression],
        span: Span,
        env: &Environment,
    ) -> std::result::Result<Value, RuntimeError> {
        // `e.m(args...)` dispatches on the receiver's kind with `e` as the
        // implicit receiver; everything else resolves the callee to a value.
        if let ExprKind::Attribute { object, name } = &callee.kind {
            let receiver = self.eval_expression(object, env)?;
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(self.eval_expression(arg, env)?);
            }
            return methods::call_method(&receiver, name, evaluated, span);
        }

        let callee = self.eval_expression(callee, env)?;
        let mut evaluated = Vec::with_capacity(args.len());
        for arg in args {
            evaluated.push(self.eval_expression(arg, env)?);
        }
        self.call_value(callee, evaluated, span)
    }

    fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        span: Span,
    ) -> std::result::Result<Value, RuntimeError> {
        match callee {
            Value::Builtin(builtin) => self.call_builtin(builtin, args, span),
            Value::Function(function) => {
                if args.len() != function.params.len() {
                    return Err(RuntimeError::FunctionArity {
                        name: function.name.clone(),
                        expected: function.params.len(),
                        found: args.len(),
                        span,
                    });
                }
                // New frame parented to the captured definition environment,
                // not to the caller's frame.
                let frame = function.env.child();
                for (param, value) in function.params.iter().zip(args) {
                    frame.define(param, value);
                }
                match self.exec_block(&function.body, &frame)? {
                    ExecResult::Continue => Ok(Value::None),
                    ExecResult::Return(value, _) => Ok(value),
                }
            }
            other => Err(RuntimeError::NotCallable {
                type_name: other.type_name(),
                span,
            }),
        }
    }
}

fn check_bounds(
    index: &Value,
    len: usize,
    type_name: &'static str,
    span: Span,
) -> Result<usize, RuntimeError> {
    let Value::Integer(position) = index else {
        return Err(RuntimeError::IndexNotInteger {
            type_name,
            got: index.type_name(),
            span,
        });
    };
    if *position < 0 || *position as usize >= len {
        return Err(RuntimeError::IndexOutOfBounds {
            index: *position,
            len,
            span,
        });
    }
    Ok(*position as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};
    use indoc::indoc;

    fn run_source(source: &str) -> Result<String> {
        let tokens = lexer::tokenize(source)?;
        let program = parser::parse_tokens(tokens)?;
        Interpreter::new().run(&program)
    }

    fn output_of(source: &str) -> String {
        run_source(source).expect("run failed")
    }

    fn error_of(source: &str) -> RuntimeError {
        run_source(source)
            .expect_err("expected runtime failure")
            .downcast::<RuntimeError>()
            .expect("expected RuntimeError")
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        assert_eq!(output_of("print(1 + 2 * 3)\n"), "7");
    }

    #[test]
    fn division_always_yields_float() {
        assert_eq!(output_of("print(1 / 2)\n"), "0.5");
        assert_eq!(output_of("print(4 / 2)\n"), "2");
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        assert_eq!(output_of("print(1 + 2.5)\n"), "3.5");
        assert_eq!(output_of("print(2 * 1.5)\n"), "3");
        assert_eq!(output_of("print(10 - 0.5)\n"), "9.5");
    }

    #[test]
    fn string_concatenation_and_comparison() {
        assert_eq!(output_of("print(\"foo\" + \"bar\")\n"), "foobar");
        assert_eq!(output_of("print(\"abc\" < \"abd\")\n"), "true");
    }

    #[test]
    fn adding_string_and_integer_is_a_type_error() {
        let err = error_of("print(\"a\" + 1)\n");
        assert!(matches!(err, RuntimeError::UnsupportedBinary { op: "+", .. }));
    }

    #[test]
    fn recursion_computes_fibonacci() {
        let source = indoc! {"
            def fib(n):
                if n < 2:
                    return n
                return fib(n - 1) + fib(n - 2)
            print(fib(10))
        "};
        assert_eq!(output_of(source), "55");
    }

    #[test]
    fn c_style_for_sums_an_array() {
        let source = indoc! {"
            a = [1, 2, 3, 4, 5]
            s = 0
            for i = 0; i < len(a); i = i + 1:
                s = s + a[i]
            print(s)
        "};
        assert_eq!(output_of(source), "15");
    }

    #[test]
    fn and_short_circuits_without_evaluating_rhs() {
        let source = indoc! {"
            def side():
                print(\"x\")
                return true
            r = false and side()
            print(r)
        "};
        assert_eq!(output_of(source), "false");
    }

    #[test]
    fn logical_operators_return_the_deciding_value() {
        assert_eq!(output_of("print(0 or \"fallback\")\n"), "fallback");
        assert_eq!(output_of("print(1 and 2)\n"), "2");
        assert_eq!(output_of("print(\"\" and 2)\n"), "");
        assert_eq!(output_of("print(not 0)\n"), "true");
    }

    #[test]
    fn split_sort_and_abs_work_together() {
        let source = indoc! {"
            parts = \"3 1 2\".split(\" \")
            nums = []
            for i = 0; i < len(parts); i = i + 1:
                nums.push(int(parts[i]))
            nums.sort()
            print(nums[0])
            print(abs(0 - nums[2]))
        "};
        assert_eq!(output_of(source), "1\n3");
    }

    #[test]
    fn map_set_overwrites_and_sets_deduplicate() {
        let source = indoc! {"
            m = Map()
            m.set(\"a\", 1)
            m.set(\"a\", 2)
            print(m.get(\"a\"))
            s = {1, 2, 2, 3}
            print(len(s))
        "};
        assert_eq!(output_of(source), "2\n3");
    }

    #[test]
    fn map_get_returns_none_for_missing_key() {
        let source = indoc! {"
            m = Map()
            print(m.get(\"missing\"))
        "};
        assert_eq!(output_of(source), "None");
    }

    #[test]
    fn map_bracket_lookup_misses_with_key_error() {
        let err = error_of("m = Map()\nprint(m[\"missing\"])\n");
        assert!(matches!(err, RuntimeError::KeyNotFound { .. }));
    }

    #[test]
    fn tuples_index_and_serve_as_map_keys() {
        let source = indoc! {"
            t = (1, \"two\", 3.0)
            print(t[1])
            m = Map()
            m.set((1, 2), \"point\")
            print(m.get((1, 2)))
        "};
        assert_eq!(output_of(source), "two\npoint");
    }

    #[test]
    fn unhashable_map_key_is_a_type_error() {
        let err = error_of("m = Map()\nm.set([1], 1)\n");
        assert!(matches!(err, RuntimeError::Unhashable { type_name: "array", .. }));
    }

    #[test]
    fn nested_function_reads_enclosing_scope() {
        let source = indoc! {"
            def outer():
                n = 10
                def inner():
                    return n + 1
                return inner()
            print(outer())
        "};
        assert_eq!(output_of(source), "11");
    }

    #[test]
    fn assignment_updates_existing_outer_binding() {
        let source = indoc! {"
            count = 0
            def bump():
                count = count + 1
            bump()
            bump()
            print(count)
        "};
        assert_eq!(output_of(source), "2");
    }

    #[test]
    fn function_locals_do_not_leak_into_globals() {
        let source = indoc! {"
            def f():
                local = 42
            f()
            print(local)
        "};
        let err = error_of(source);
        assert!(matches!(err, RuntimeError::UndefinedName { .. }));
    }

    #[test]
    fn index_assignment_mutates_arrays_and_maps() {
        let source = indoc! {"
            xs = [1, 2]
            xs[1] = 7
            print(xs[1])
            m = {\"a\": 1}
            m[\"b\"] = 2
            print(m[\"b\"])
        "};
        assert_eq!(output_of(source), "7\n2");
    }

    #[test]
    fn index_assignment_rejects_strings_and_tuples() {
        let err = error_of("s = \"ab\"\ns[0] = \"c\"\n");
        assert!(matches!(
            err,
            RuntimeError::IndexAssignUnsupported { type_name: "string", .. }
        ));

        let err = error_of("t = (1, 2)\nt[0] = 3\n");
        assert!(matches!(
            err,
            RuntimeError::IndexAssignUnsupported { type_name: "tuple", .. }
        ));
    }

    #[test]
    fn out_of_bounds_index_is_an_index_error() {
        let err = error_of("xs = [1]\nprint(xs[1])\n");
        assert!(matches!(
            err,
            RuntimeError::IndexOutOfBounds { index: 1, len: 1, .. }
        ));

        let err = error_of("xs = [1]\nprint(xs[0 - 1])\n");
        assert!(matches!(err, RuntimeError::IndexOutOfBounds { index: -1, .. }));
    }

    #[test]
    fn string_indexing_yields_one_character_strings() {
        assert_eq!(output_of("print(\"abc\"[1])\n"), "b");
        let err = error_of("print(\"abc\"[3])\n");
        assert!(matches!(err, RuntimeError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn pop_from_empty_array_is_an_index_error() {
        let err = error_of("xs = []\nxs.pop()\n");
        assert!(matches!(err, RuntimeError::PopFromEmptyArray { .. }));
    }

    #[test]
    fn unknown_method_is_an_attribute_error() {
        let err = error_of("xs = [1]\nxs.shuffle()\n");
        assert!(matches!(
            err,
            RuntimeError::UnknownMethod { type_name: "array", .. }
        ));
    }

    #[test]
    fn method_arity_is_checked() {
        let err = error_of("xs = [1]\nxs.push(1, 2)\n");
        assert!(matches!(
            err,
            RuntimeError::MethodArity { method: "push", expected: 1, found: 2, .. }
        ));
    }

    #[test]
    fn bare_method_reference_is_an_error() {
        let err = error_of("xs = [1]\nxs.push\n");
        assert!(matches!(err, RuntimeError::UnboundMethodReference { .. }));
    }

    #[test]
    fn calling_a_non_callable_is_a_type_error() {
        let err = error_of("x = 1\nx()\n");
        assert!(matches!(err, RuntimeError::NotCallable { type_name: "int", .. }));
    }

    #[test]
    fn function_arity_is_exact() {
        let source = indoc! {"
            def f(a, b):
                return a
            f(1)
        "};
        let err = error_of(source);
        assert!(matches!(
            err,
            RuntimeError::FunctionArity { expected: 2, found: 1, .. }
        ));
    }

    #[test]
    fn reading_an_undefined_name_is_a_name_error() {
        let err = error_of("print(missing)\n");
        assert!(matches!(err, RuntimeError::UndefinedName { .. }));
    }

    #[test]
    fn return_at_top_level_is_rejected() {
        let err = error_of("return 1\n");
        assert!(matches!(err, RuntimeError::ReturnOutsideFunction { .. }));
    }

    #[test]
    fn function_without_return_yields_none() {
        let source = indoc! {"
            def f():
                x = 1
            print(f())
        "};
        assert_eq!(output_of(source), "None");
    }

    #[test]
    fn elif_chain_picks_first_truthy_branch() {
        let source = indoc! {"
            def classify(n):
                if n < 0:
                    return \"negative\"
                elif n == 0:
                    return \"zero\"
                else:
                    return \"positive\"
            print(classify(0 - 5))
            print(classify(0))
            print(classify(5))
        "};
        assert_eq!(output_of(source), "negative\nzero\npositive");
    }

    #[test]
    fn while_loop_runs_until_condition_is_falsy() {
        let source = indoc! {"
            n = 0
            while n < 3:
                n = n + 1
            print(n)
        "};
        assert_eq!(output_of(source), "3");
    }

    #[test]
    fn set_equality_ignores_insertion_order() {
        assert_eq!(output_of("print({1, 2} == {2, 1})\n"), "true");
        assert_eq!(output_of("print({1: \"a\"} == {1: \"b\"})\n"), "false");
    }

    #[test]
    fn conversion_builtins_parse_and_widen() {
        assert_eq!(output_of("print(int(\"42\"))\n"), "42");
        assert_eq!(output_of("print(int(3.9))\n"), "3");
        assert_eq!(output_of("print(float(2))\n"), "2");
        assert_eq!(output_of("print(float(\"2.5\"))\n"), "2.5");
        assert_eq!(output_of("print(str(12) + \"!\")\n"), "12!");
    }

    #[test]
    fn invalid_int_parse_is_a_value_error() {
        let err = error_of("int(\"abc\")\n");
        assert!(matches!(err, RuntimeError::InvalidIntLiteral { .. }));
    }

    #[test]
    fn chr_and_ord_round_trip_code_points() {
        assert_eq!(output_of("print(chr(65))\n"), "A");
        assert_eq!(output_of("print(ord(\"A\"))\n"), "65");
        let err = error_of("print(ord(\"\"))\n");
        assert!(matches!(err, RuntimeError::OrdEmptyString { .. }));
    }

    #[test]
    fn print_joins_arguments_with_spaces() {
        assert_eq!(output_of("print(1, \"two\", 3.5, true)\n"), "1 two 3.5 true");
        assert_eq!(output_of("print()\n"), "");
    }

    #[test]
    fn collections_render_with_quoted_strings() {
        assert_eq!(output_of("print([1, \"a\"])\n"), "[1, \"a\"]");
        assert_eq!(output_of("print((1, 2))\n"), "(1, 2)");
    }

    #[test]
    fn triple_quoted_strings_keep_newlines() {
        assert_eq!(output_of("print(\"\"\"a\nb\"\"\")\n"), "a\nb");
    }

    #[test]
    fn runtime_errors_carry_positions() {
        let err = error_of("x = 1\nprint(missing)\n");
        assert!(err.to_string().contains("line 2, col 7"));
    }
}
