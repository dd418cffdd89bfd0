//! Flow-insensitive type propagation for the AOT backend.
//!
//! Parameter and return types come from call-site unification plus literal
//! propagation through assignments: the first concrete use pins a type,
//! int unifies with float by promoting, and irreconcilable uses are a
//! compile error. Anything still unknown after the fixed point defaults to
//! integer (or void for functions that never return a value).

use std::collections::HashMap;

use crate::ast::{
    AssignTarget, BinaryOperator, ExprKind, Expression, Program, Statement, StmtKind,
    UnaryOperator,
};
use crate::builtins::Builtin;
use crate::token::Span;

use super::types::{binary_result_type, Type};
use super::CompileError;

#[derive(Debug, Clone)]
pub struct FnSig {
    pub params: Vec<Type>,
    pub ret: Type,
}

struct PartialSig {
    params: Vec<Option<Type>>,
    ret: Option<Type>,
    has_value_return: bool,
}

struct InferState {
    sigs: HashMap<String, PartialSig>,
    changed: bool,
}

pub(super) fn infer_signatures(
    program: &Program,
) -> Result<HashMap<String, FnSig>, CompileError> {
    let mut functions: Vec<(&String, &Vec<String>, &Vec<Statement>)> = Vec::new();
    let mut main_statements: Vec<&Statement> = Vec::new();
    for statement in &program.statements {
        match &statement.kind {
            StmtKind::FunctionDef { name, params, body } => {
                reject_nested_defs(body)?;
                functions.push((name, params, body));
            }
            _ => main_statements.push(statement),
        }
    }

    let mut state = InferState {
        sigs: functions
            .iter()
            .map(|(name, params, body)| {
                (
                    (*name).clone(),
                    PartialSig {
                        params: vec![None; params.len()],
                        ret: None,
                        has_value_return: block_returns_value(body),
                    },
                )
            })
            .collect(),
        changed: true,
    };

    // Signatures feed expression types and vice versa, so iterate to a fixed
    // point; the type lattice is tiny, so this settles in a few passes.
    let mut passes = 0;
    while state.changed && passes < 10 {
        state.changed = false;
        passes += 1;

        let mut globals: HashMap<String, Type> = HashMap::new();
        for statement in main_statements.iter().copied() {
            walk_statement(statement, &mut globals, &mut state, None)?;
        }

        for (name, params, body) in &functions {
            let mut vars: HashMap<String, Type> = HashMap::new();
            if let Some(sig) = state.sigs.get(name.as_str()) {
                for (param, ty) in params.iter().zip(sig.params.clone()) {
                    if let Some(ty) = ty {
                        vars.insert(param.clone(), ty);
                    }
                }
            }
            for statement in body.iter() {
                walk_statement(statement, &mut vars, &mut state, Some(name))?;
            }
        }
    }

    Ok(state
        .sigs
        .into_iter()
        .map(|(name, partial)| {
            let params = partial
                .params
                .into_iter()
                .map(|ty| ty.unwrap_or(Type::Int))
                .collect();
            let ret = partial.ret.unwrap_or(if partial.has_value_return {
                Type::Int
            } else {
                Type::Void
            });
            (name, FnSig { params, ret })
        })
        .collect())
}

fn reject_nested_defs(body: &[Statement]) -> Result<(), CompileError> {
    for statement in body {
        match &statement.kind {
            StmtKind::FunctionDef { .. } => {
                return Err(CompileError::NestedFunction {
                    span: statement.span,
                });
            }
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                reject_nested_defs(then_body)?;
                reject_nested_defs(else_body)?;
            }
            StmtKind::While { body, .. } => reject_nested_defs(body)?,
            StmtKind::For { body, .. } => reject_nested_defs(body)?,
            _ => {}
        }
    }
    Ok(())
}

fn block_returns_value(body: &[Statement]) -> bool {
    body.iter().any(|statement| match &statement.kind {
        StmtKind::Return(value) => value.is_some(),
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => block_returns_value(then_body) || block_returns_value(else_body),
        StmtKind::While { body, .. } => block_returns_value(body),
        StmtKind::For { body, .. } => block_returns_value(body),
        _ => false,
    })
}

fn walk_statement(
    statement: &Statement,
    vars: &mut HashMap<String, Type>,
    state: &mut InferState,
    current_function: Option<&str>,
) -> Result<(), CompileError> {
    match &statement.kind {
        StmtKind::Expr(expr) => {
            expression_type(expr, vars, state)?;
        }
        StmtKind::Assign { target, value } => {
            let value_type = expression_type(value, vars, state)?;
            match target {
                AssignTarget::Name(name) => {
                    if let Some(value_type) = value_type {
                        bind_var(vars, name, value_type, statement.span)?;
                    }
                }
                AssignTarget::Index { object, index } => {
                    expression_type(object, vars, state)?;
                    expression_type(index, vars, state)?;
                }
            }
        }
        StmtKind::If {
            condition,
            then_body,
            else_body,
        } => {
            expression_type(condition, vars, state)?;
            for statement in then_body {
                walk_statement(statement, vars, state, current_function)?;
            }
            for statement in else_body {
                walk_statement(statement, vars, state, current_function)?;
            }
        }
        StmtKind::While { condition, body } => {
            expression_type(condition, vars, state)?;
            for statement in body {
                walk_statement(statement, vars, state, current_function)?;
            }
        }
        StmtKind::For {
            init,
            condition,
            step,
            body,
        } => {
            walk_statement(init, vars, state, current_function)?;
            expression_type(condition, vars, state)?;
            for statement in body {
                walk_statement(statement, vars, state, current_function)?;
            }
            walk_statement(step, vars, state, current_function)?;
        }
        StmtKind::FunctionDef { .. } => {
            // Top-level defs were collected by the caller; anything else is
            // nested and already rejected.
        }
        StmtKind::Return(value) => {
            let Some(function) = current_function else {
                return Err(CompileError::ReturnOutsideFunction {
                    span: statement.span,
                });
            };
            if let Some(value) = value {
                if let Some(value_type) = expression_type(value, vars, state)? {
                    unify_return(state, function, value_type, statement.span)?;
                }
            }
        }
    }
    Ok(())
}

fn bind_var(
    vars: &mut HashMap<String, Type>,
    name: &str,
    new: Type,
    span: Span,
) -> Result<(), CompileError> {
    match vars.get(name) {
        None => {
            vars.insert(name.to_string(), new);
        }
        Some(existing) => {
            let unified = unify(existing.clone(), new, name, span)?;
            vars.insert(name.to_string(), unified);
        }
    }
    Ok(())
}

fn unify(existing: Type, new: Type, name: &str, span: Span) -> Result<Type, CompileError> {
    if existing == new {
        return Ok(existing);
    }
    match (&existing, &new) {
        (Type::Int, Type::Float) | (Type::Float, Type::Int) => Ok(Type::Float),
        _ => Err(CompileError::TypeConflict {
            name: name.to_string(),
            first: existing.describe(),
            second: new.describe(),
            span,
        }),
    }
}

fn unify_param(
    state: &mut InferState,
    function: &str,
    index: usize,
    new: Type,
    span: Span,
) -> Result<(), CompileError> {
    let Some(sig) = state.sigs.get_mut(function) else {
        return Ok(());
    };
    let Some(slot) = sig.params.get_mut(index) else {
        return Ok(());
    };
    let updated = match slot.clone() {
        None => new,
        Some(existing) => unify(existing, new, function, span)?,
    };
    if slot.as_ref() != Some(&updated) {
        *slot = Some(updated);
        state.changed = true;
    }
    Ok(())
}

fn unify_return(
    state: &mut InferState,
    function: &str,
    new: Type,
    span: Span,
) -> Result<(), CompileError> {
    let Some(sig) = state.sigs.get_mut(function) else {
        return Ok(());
    };
    match sig.ret.take() {
        None => {
            sig.ret = Some(new);
            state.changed = true;
        }
        Some(existing) => {
            let unified = unify(existing.clone(), new, function, span)?;
            if unified != existing {
                state.changed = true;
            }
            sig.ret = Some(unified);
        }
    }
    Ok(())
}

/// Lenient expression typing: `None` means "not resolvable yet"; hard
/// unsupported constructs are reported by the emitter with better context.
fn expression_type(
    expr: &Expression,
    vars: &mut HashMap<String, Type>,
    state: &mut InferState,
) -> Result<Option<Type>, CompileError> {
    match &expr.kind {
        ExprKind::Integer(_) => Ok(Some(Type::Int)),
        ExprKind::Float(_) => Ok(Some(Type::Float)),
        ExprKind::Boolean(_) => Ok(Some(Type::Bool)),
        ExprKind::String(_) => Ok(Some(Type::Str)),
        ExprKind::Identifier(name) => Ok(vars.get(name).cloned()),
        ExprKind::Unary { op, operand } => {
            let operand = expression_type(operand, vars, state)?;
            Ok(match op {
                UnaryOperator::Not => Some(Type::Bool),
                UnaryOperator::Neg => operand.filter(Type::is_numeric),
            })
        }
        ExprKind::Binary { left, op, right } => {
            let left = expression_type(left, vars, state)?;
            let right = expression_type(right, vars, state)?;
            if matches!(op, BinaryOperator::And | BinaryOperator::Or) || op.is_comparison() {
                return Ok(Some(Type::Bool));
            }
            match (left, right) {
                (Some(left), Some(right)) => Ok(binary_result_type(*op, &left, &right)),
                _ => Ok(None),
            }
        }
        ExprKind::Array(elements) => {
            let mut element_type: Option<Type> = None;
            for element in elements {
                if let Some(ty) = expression_type(element, vars, state)? {
                    element_type = Some(match element_type {
                        None => ty,
                        Some(existing) => match unify(existing.clone(), ty, "array element", expr.span) {
                            Ok(unified) => unified,
                            Err(_) => return Ok(None),
                        },
                    });
                }
            }
            Ok(element_type.map(|ty| Type::Array(Box::new(ty))))
        }
        ExprKind::Index { object, index } => {
            expression_type(index, vars, state)?;
            match expression_type(object, vars, state)? {
                Some(Type::Array(element)) => Ok(Some(*element)),
                _ => Ok(None),
            }
        }
        ExprKind::Call { callee, args } => {
            let mut arg_types = Vec::with_capacity(args.len());
            for arg in args {
                arg_types.push(expression_type(arg, vars, state)?);
            }
            let ExprKind::Identifier(name) = &callee.kind else {
                return Ok(None);
            };
            if state.sigs.contains_key(name.as_str()) {
                for (index, arg_type) in arg_types.into_iter().enumerate() {
                    if let Some(arg_type) = arg_type {
                        unify_param(state, name, index, arg_type, expr.span)?;
                    }
                }
                return Ok(state.sigs.get(name.as_str()).and_then(|sig| sig.ret.clone()));
            }
            Ok(match Builtin::from_name(name) {
                Some(Builtin::Print) => Some(Type::Void),
                Some(Builtin::Input | Builtin::Chr | Builtin::Str) => Some(Type::Str),
                Some(Builtin::Len | Builtin::Ord | Builtin::Int) => Some(Type::Int),
                Some(Builtin::Float) => Some(Type::Float),
                Some(Builtin::Abs) => arg_types
                    .first()
                    .cloned()
                    .flatten()
                    .filter(Type::is_numeric),
                _ => None,
            })
        }
        // Dynamic-only constructs; the emitter reports them.
        ExprKind::Map(_) | ExprKind::Set(_) | ExprKind::Tuple(_) | ExprKind::Attribute { .. } => {
            Ok(None)
        }
    }
}
