//! AST to textual LLVM IR lowering.
//!
//! Two-phase: `infer` fixes every function signature first, then this
//! emitter walks the program once, tracking the static type of every value
//! it produces. Locals get an `alloca` in the entry block with loads and
//! stores at each use, leaving SSA construction to mem2reg. The IR uses
//! opaque pointers (`ptr`), so it assembles with any recent LLVM.

use std::collections::HashMap;

use crate::ast::{
    AssignTarget, BinaryOperator, ExprKind, Expression, Program, Statement, StmtKind,
    UnaryOperator,
};
use crate::builtins::Builtin;
use crate::token::Span;

use super::abi;
use super::infer::FnSig;
use super::types::{binary_result_type, Type};
use super::CompileError;

pub(super) fn generate(
    program: &Program,
    signatures: &HashMap<String, FnSig>,
) -> Result<String, CompileError> {
    Emitter::new(signatures).generate(program)
}

#[derive(Clone)]
struct VarSlot {
    ptr: String,
    ty: Type,
}

struct Emitter<'s> {
    signatures: &'s HashMap<String, FnSig>,
    lines: Vec<String>,
    temp_counter: usize,
    label_counter: usize,
    strings: Vec<String>,
    vars: HashMap<String, VarSlot>,
    current_block: String,
    current_function: String,
    current_return: Option<Type>,
    terminated: bool,
}

impl<'s> Emitter<'s> {
    fn new(signatures: &'s HashMap<String, FnSig>) -> Self {
        Self {
            signatures,
            lines: Vec::new(),
            temp_counter: 0,
            label_counter: 0,
            strings: Vec::new(),
            vars: HashMap::new(),
            current_block: String::new(),
            current_function: "main".to_string(),
            current_return: None,
            terminated: false,
        }
    }

    fn generate(mut self, program: &Program) -> Result<String, CompileError> {
        self.push_raw("; ModuleID = 'culebra'");
        self.push_raw("source_filename = \"culebra\"");
        self.push_raw("");
        self.push_raw("%array = type { i64, ptr }");
        self.push_raw("");
        let declarations = abi::declarations();
        for line in declarations.lines() {
            self.push_raw(line);
        }
        self.push_raw("");

        let mut functions: Vec<(&String, &Vec<String>, &Vec<Statement>)> = Vec::new();
        let mut main_statements = Vec::new();
        for statement in &program.statements {
            match &statement.kind {
                StmtKind::FunctionDef { name, params, body } => {
                    if name == "main" {
                        return Err(CompileError::Unsupported {
                            construct: "a user function named 'main'",
                            span: statement.span,
                        });
                    }
                    if functions.iter().any(|entry| entry.0.as_str() == name.as_str()) {
                        return Err(CompileError::Unsupported {
                            construct: "redefining a function",
                            span: statement.span,
                        });
                    }
                    functions.push((name, params, body));
                }
                _ => main_statements.push(statement),
            }
        }

        // One `main` wrapping all top-level statements.
        self.push_raw("define i32 @main() {");
        self.temp_counter = 0;
        self.label_counter = 0;
        self.vars.clear();
        self.current_function = "main".to_string();
        self.current_return = None;
        self.start_block_header("entry");
        for statement in main_statements.iter().copied() {
            self.declare_statement_locals(statement)?;
        }
        for statement in main_statements.iter().copied() {
            if self.terminated {
                break;
            }
            self.emit_statement(statement)?;
        }
        if !self.terminated {
            self.push("ret i32 0");
        }
        self.push_raw("}");
        self.push_raw("");

        for (name, params, body) in functions {
            self.emit_function(name, params, body)?;
        }

        if !self.strings.is_empty() {
            let constants: Vec<String> = self
                .strings
                .iter()
                .enumerate()
                .map(|(index, content)| {
                    format!(
                        "@.str.{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
                        index + 1,
                        content.len() + 1,
                        escape_ir_string(content)
                    )
                })
                .collect();
            self.push_raw("; String constants");
            for constant in constants {
                self.lines.push(constant);
            }
        }

        let mut output = self.lines.join("\n");
        output.push('\n');
        Ok(output)
    }

    fn emit_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &[Statement],
    ) -> Result<(), CompileError> {
        let sig = self
            .signatures
            .get(name)
            .cloned()
            .expect("signature inferred for every function");

        let rendered_params = params
            .iter()
            .zip(&sig.params)
            .map(|(param, ty)| format!("{} %{}", ty.llvm(), param))
            .collect::<Vec<_>>()
            .join(", ");
        self.push_raw(format!(
            "define {} @{}({}) {{",
            sig.ret.llvm(),
            name,
            rendered_params
        ));
        self.temp_counter = 0;
        self.label_counter = 0;
        self.vars.clear();
        self.current_function = name.to_string();
        self.current_return = Some(sig.ret.clone());
        self.start_block_header("entry");

        for (param, ty) in params.iter().zip(&sig.params) {
            let ptr = self.new_temp();
            self.push(format!("{ptr} = alloca {}", ty.llvm_storage()));
            if *ty == Type::Bool {
                let widened = self.new_temp();
                self.push(format!("{widened} = zext i1 %{param} to i8"));
                self.push(format!("store i8 {widened}, ptr {ptr}"));
            } else {
                self.push(format!("store {} %{param}, ptr {ptr}", ty.llvm()));
            }
            self.vars.insert(
                param.clone(),
                VarSlot {
                    ptr,
                    ty: ty.clone(),
                },
            );
        }

        for statement in body {
            self.declare_statement_locals(statement)?;
        }
        for statement in body {
            if self.terminated {
                break;
            }
            self.emit_statement(statement)?;
        }
        if !self.terminated {
            let fallback = match &sig.ret {
                Type::Void => "ret void".to_string(),
                Type::Int => "ret i64 0".to_string(),
                Type::Float => format!("ret double {}", double_literal(0.0)),
                Type::Bool => "ret i1 false".to_string(),
                Type::Str | Type::Array(_) => "ret ptr null".to_string(),
            };
            self.push(fallback);
        }
        self.push_raw("}");
        self.push_raw("");
        self.current_return = None;
        self.current_function = "main".to_string();
        Ok(())
    }

    /// Reserve an entry-block `alloca` for every name assigned anywhere in
    /// the function, pinning each to the type of its first assignment.
    fn declare_statement_locals(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match &statement.kind {
            StmtKind::Assign {
                target: AssignTarget::Name(name),
                value,
            } => {
                let ty = self.static_type(value)?;
                if ty == Type::Void {
                    return Err(CompileError::Unsupported {
                        construct: "assigning a void value",
                        span: statement.span,
                    });
                }
                match self.vars.get(name) {
                    None => {
                        let ptr = self.new_temp();
                        self.push(format!("{ptr} = alloca {}", ty.llvm_storage()));
                        self.vars.insert(name.clone(), VarSlot { ptr, ty });
                    }
                    Some(slot) => {
                        let compatible =
                            slot.ty == ty || (slot.ty == Type::Float && ty == Type::Int);
                        if !compatible {
                            return Err(CompileError::TypeConflict {
                                name: name.clone(),
                                first: slot.ty.describe(),
                                second: ty.describe(),
                                span: statement.span,
                            });
                        }
                    }
                }
            }
            StmtKind::Assign { .. } | StmtKind::Expr(_) | StmtKind::Return(_) => {}
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                for statement in then_body.iter().chain(else_body) {
                    self.declare_statement_locals(statement)?;
                }
            }
            StmtKind::While { body, .. } => {
                for statement in body {
                    self.declare_statement_locals(statement)?;
                }
            }
            StmtKind::For {
                init, step, body, ..
            } => {
                self.declare_statement_locals(init)?;
                for statement in body {
                    self.declare_statement_locals(statement)?;
                }
                self.declare_statement_locals(step)?;
            }
            StmtKind::FunctionDef { .. } => {
                return Err(CompileError::NestedFunction {
                    span: statement.span,
                });
            }
        }
        Ok(())
    }

    fn emit_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match &statement.kind {
            StmtKind::Expr(expr) => {
                self.emit_expression(expr)?;
                Ok(())
            }
            StmtKind::Assign { target, value } => match target {
                AssignTarget::Name(name) => {
                    let (reg, ty) = self.emit_expression(value)?;
                    let slot = self
                        .vars
                        .get(name)
                        .cloned()
                        .expect("locals declared before emission");
                    self.store_into_slot(&slot, reg, &ty, name, statement.span)
                }
                AssignTarget::Index { object, index } => {
                    let (object_reg, object_ty) = self.emit_expression(object)?;
                    let element_ty = match object_ty {
                        Type::Array(element) => element,
                        other => {
                            return Err(CompileError::NotIndexable {
                                type_name: other.describe(),
                                span: object.span,
                            });
                        }
                    };
                    let index_reg = self.emit_index_value(index)?;
                    let (value_reg, value_ty) = self.emit_expression(value)?;
                    let value_reg = self
                        .coerce_numeric(value_reg, &value_ty, &element_ty)
                        .ok_or_else(|| CompileError::TypeConflict {
                            name: "array element".to_string(),
                            first: element_ty.describe(),
                            second: value_ty.describe(),
                            span: statement.span,
                        })?;
                    let slot_value = self.element_to_slot(value_reg, &element_ty);
                    self.push(format!(
                        "call void @culebra_array_set(ptr {object_reg}, i64 {index_reg}, i64 {slot_value})"
                    ));
                    Ok(())
                }
            },
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                let (cond_reg, cond_ty) = self.emit_expression(condition)?;
                let cond_bool = self.to_bool(&cond_reg, &cond_ty, condition.span)?;
                let then_label = self.new_label("then");
                let merge_label = self.new_label("merge");
                let else_label = if else_body.is_empty() {
                    None
                } else {
                    Some(self.new_label("else"))
                };

                let false_target = else_label.as_deref().unwrap_or(&merge_label).to_string();
                self.cond_branch(&cond_bool, &then_label, &false_target);

                self.start_block(&then_label);
                self.emit_block(then_body)?;
                self.branch(&merge_label);

                if let Some(else_label) = else_label {
                    self.start_block(&else_label);
                    self.emit_block(else_body)?;
                    self.branch(&merge_label);
                }

                self.start_block(&merge_label);
                Ok(())
            }
            StmtKind::While { condition, body } => {
                let cond_label = self.new_label("while_cond");
                let body_label = self.new_label("while_body");
                let end_label = self.new_label("while_end");

                self.branch(&cond_label);
                self.start_block(&cond_label);
                let (cond_reg, cond_ty) = self.emit_expression(condition)?;
                let cond_bool = self.to_bool(&cond_reg, &cond_ty, condition.span)?;
                self.cond_branch(&cond_bool, &body_label, &end_label);

                self.start_block(&body_label);
                self.emit_block(body)?;
                self.branch(&cond_label);

                self.start_block(&end_label);
                Ok(())
            }
            StmtKind::For {
                init,
                condition,
                step,
                body,
            } => {
                self.emit_statement(init)?;

                let cond_label = self.new_label("for_cond");
                let body_label = self.new_label("for_body");
                let step_label = self.new_label("for_step");
                let end_label = self.new_label("for_end");

                self.branch(&cond_label);
                self.start_block(&cond_label);
                let (cond_reg, cond_ty) = self.emit_expression(condition)?;
                let cond_bool = self.to_bool(&cond_reg, &cond_ty, condition.span)?;
                self.cond_branch(&cond_bool, &body_label, &end_label);

                self.start_block(&body_label);
                self.emit_block(body)?;
                self.branch(&step_label);

                self.start_block(&step_label);
                self.emit_statement(step)?;
                self.branch(&cond_label);

                self.start_block(&end_label);
                Ok(())
            }
            StmtKind::FunctionDef { .. } => Err(CompileError::NestedFunction {
                span: statement.span,
            }),
            StmtKind::Return(value) => {
                let Some(return_ty) = self.current_return.clone() else {
                    return Err(CompileError::ReturnOutsideFunction {
                        span: statement.span,
                    });
                };
                match value {
                    None => {
                        let line = match &return_ty {
                            Type::Void => "ret void".to_string(),
                            Type::Int => "ret i64 0".to_string(),
                            Type::Float => format!("ret double {}", double_literal(0.0)),
                            Type::Bool => "ret i1 false".to_string(),
                            Type::Str | Type::Array(_) => "ret ptr null".to_string(),
                        };
                        self.push(line);
                    }
                    Some(expr) => {
                        let (reg, ty) = self.emit_expression(expr)?;
                        if return_ty == Type::Void {
                            self.push("ret void");
                        } else {
                            let reg = self.coerce_numeric(reg, &ty, &return_ty).ok_or_else(
                                || CompileError::TypeConflict {
                                    name: self.current_function.clone(),
                                    first: return_ty.describe(),
                                    second: ty.describe(),
                                    span: statement.span,
                                },
                            )?;
                            self.push(format!("ret {} {reg}", return_ty.llvm()));
                        }
                    }
                }
                self.terminated = true;
                Ok(())
            }
        }
    }

    fn emit_block(&mut self, body: &[Statement]) -> Result<(), CompileError> {
        for statement in body {
            if self.terminated {
                break;
            }
            self.emit_statement(statement)?;
        }
        Ok(())
    }

    fn emit_expression(&mut self, expr: &Expression) -> Result<(String, Type), CompileError> {
        match &expr.kind {
            ExprKind::Integer(value) => Ok((value.to_string(), Type::Int)),
            ExprKind::Float(value) => Ok((double_literal(*value), Type::Float)),
            ExprKind::Boolean(value) => {
                Ok(((if *value { "true" } else { "false" }).to_string(), Type::Bool))
            }
            ExprKind::String(value) => {
                let reg = self.string_pointer(value);
                Ok((reg, Type::Str))
            }
            ExprKind::Identifier(name) => {
                let slot = self
                    .vars
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CompileError::UndefinedName {
                        name: name.clone(),
                        span: expr.span,
                    })?;
                if slot.ty == Type::Bool {
                    let raw = self.new_temp();
                    self.push(format!("{raw} = load i8, ptr {}", slot.ptr));
                    let narrowed = self.new_temp();
                    self.push(format!("{narrowed} = trunc i8 {raw} to i1"));
                    Ok((narrowed, Type::Bool))
                } else {
                    let loaded = self.new_temp();
                    self.push(format!("{loaded} = load {}, ptr {}", slot.ty.llvm(), slot.ptr));
                    Ok((loaded, slot.ty))
                }
            }
            ExprKind::Unary { op, operand } => {
                let (reg, ty) = self.emit_expression(operand)?;
                match op {
                    UnaryOperator::Not => {
                        let as_bool = self.to_bool(&reg, &ty, expr.span)?;
                        let result = self.new_temp();
                        self.push(format!("{result} = xor i1 {as_bool}, true"));
                        Ok((result, Type::Bool))
                    }
                    UnaryOperator::Neg => {
                        let result = self.new_temp();
                        match ty {
                            Type::Int => {
                                self.push(format!("{result} = sub i64 0, {reg}"));
                                Ok((result, Type::Int))
                            }
                            Type::Float => {
                                self.push(format!("{result} = fneg double {reg}"));
                                Ok((result, Type::Float))
                            }
                            other => Err(CompileError::BadUnaryOperand {
                                op: "-",
                                type_name: other.describe(),
                                span: expr.span,
                            }),
                        }
                    }
                }
            }
            ExprKind::Binary { left, op, right } => {
                self.emit_binary(left, *op, right, expr.span)
            }
            ExprKind::Array(elements) => {
                let array_ty = self.static_type(expr)?;
                let Type::Array(element_ty) = &array_ty else {
                    unreachable!("array literal types as array");
                };
                let array_reg = self.new_temp();
                self.push(format!(
                    "{array_reg} = call ptr @culebra_create_array(i64 {}, i64 8)",
                    elements.len()
                ));
                for (index, element) in elements.iter().enumerate() {
                    let (reg, ty) = self.emit_expression(element)?;
                    let reg = self
                        .coerce_numeric(reg, &ty, element_ty)
                        .ok_or(CompileError::MixedArrayElements { span: expr.span })?;
                    let slot_value = self.element_to_slot(reg, element_ty);
                    self.push(format!(
                        "call void @culebra_array_set(ptr {array_reg}, i64 {index}, i64 {slot_value})"
                    ));
                }
                Ok((array_reg, array_ty))
            }
            ExprKind::Index { object, index } => {
                let (object_reg, object_ty) = self.emit_expression(object)?;
                let element_ty = match object_ty {
                    Type::Array(element) => element,
                    Type::Str => {
                        return Err(CompileError::Unsupported {
                            construct: "string indexing",
                            span: expr.span,
                        });
                    }
                    other => {
                        return Err(CompileError::NotIndexable {
                            type_name: other.describe(),
                            span: expr.span,
                        });
                    }
                };
                let index_reg = self.emit_index_value(index)?;
                let element_ptr = self.new_temp();
                self.push(format!(
                    "{element_ptr} = call ptr @culebra_array_get(ptr {object_reg}, i64 {index_reg})"
                ));
                self.load_element(element_ptr, *element_ty)
            }
            ExprKind::Call { callee, args } => self.emit_call(callee, args, expr.span),
            ExprKind::Tuple(_) => Err(CompileError::Unsupported {
                construct: "tuple literals",
                span: expr.span,
            }),
            ExprKind::Map(_) => Err(CompileError::Unsupported {
                construct: "map literals",
                span: expr.span,
            }),
            ExprKind::Set(_) => Err(CompileError::Unsupported {
                construct: "set literals",
                span: expr.span,
            }),
            ExprKind::Attribute { .. } => Err(CompileError::Unsupported {
                construct: "method calls",
                span: expr.span,
            }),
        }
    }

    fn emit_binary(
        &mut self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
        span: Span,
    ) -> Result<(String, Type), CompileError> {
        // Short-circuit operators lower to a diamond with a phi observing
        // whether the right operand was evaluated.
        if matches!(op, BinaryOperator::And | BinaryOperator::Or) {
            let (left_reg, left_ty) = self.emit_expression(left)?;
            let left_bool = self.to_bool(&left_reg, &left_ty, left.span)?;
            let entry_block = self.current_block.clone();
            let is_and = op == BinaryOperator::And;
            let rhs_label = self.new_label(if is_and { "and_rhs" } else { "or_rhs" });
            let end_label = self.new_label(if is_and { "and_end" } else { "or_end" });

            if is_and {
                self.cond_branch(&left_bool, &rhs_label, &end_label);
            } else {
                self.cond_branch(&left_bool, &end_label, &rhs_label);
            }

            self.start_block(&rhs_label);
            let (right_reg, right_ty) = self.emit_expression(right)?;
            let right_bool = self.to_bool(&right_reg, &right_ty, right.span)?;
            let rhs_block = self.current_block.clone();
            self.branch(&end_label);

            self.start_block(&end_label);
            let result = self.new_temp();
            let short_value = if is_and { "false" } else { "true" };
            self.push(format!(
                "{result} = phi i1 [ {short_value}, %{entry_block} ], [ {right_bool}, %{rhs_block} ]"
            ));
            return Ok((result, Type::Bool));
        }

        let (left_reg, left_ty) = self.emit_expression(left)?;
        let (right_reg, right_ty) = self.emit_expression(right)?;
        let result_ty = binary_result_type(op, &left_ty, &right_ty).ok_or_else(|| {
            CompileError::BadOperands {
                op: op.symbol(),
                left: left_ty.describe(),
                right: right_ty.describe(),
                span,
            }
        })?;

        if op.is_comparison() {
            let result = self.new_temp();
            if left_ty == Type::Bool && right_ty == Type::Bool {
                let cond = match op {
                    BinaryOperator::Eq => "eq",
                    _ => "ne",
                };
                self.push(format!("{result} = icmp {cond} i1 {left_reg}, {right_reg}"));
                return Ok((result, Type::Bool));
            }
            if left_ty == Type::Float || right_ty == Type::Float {
                let left_reg = self.promote_to_float(left_reg, &left_ty);
                let right_reg = self.promote_to_float(right_reg, &right_ty);
                let cond = match op {
                    BinaryOperator::Eq => "oeq",
                    BinaryOperator::NotEq => "one",
                    BinaryOperator::Less => "olt",
                    BinaryOperator::LessEq => "ole",
                    BinaryOperator::Greater => "ogt",
                    _ => "oge",
                };
                self.push(format!(
                    "{result} = fcmp {cond} double {left_reg}, {right_reg}"
                ));
            } else {
                let cond = match op {
                    BinaryOperator::Eq => "eq",
                    BinaryOperator::NotEq => "ne",
                    BinaryOperator::Less => "slt",
                    BinaryOperator::LessEq => "sle",
                    BinaryOperator::Greater => "sgt",
                    _ => "sge",
                };
                self.push(format!(
                    "{result} = icmp {cond} i64 {left_reg}, {right_reg}"
                ));
            }
            return Ok((result, Type::Bool));
        }

        if result_ty == Type::Str {
            let result = self.new_temp();
            self.push(format!(
                "{result} = call ptr @culebra_str_concat(ptr {left_reg}, ptr {right_reg})"
            ));
            return Ok((result, Type::Str));
        }

        // Pure integer `/` also promotes both sides, matching interpreter
        // semantics.
        if result_ty == Type::Float {
            let left_reg = self.promote_to_float(left_reg, &left_ty);
            let right_reg = self.promote_to_float(right_reg, &right_ty);
            let instruction = match op {
                BinaryOperator::Add => "fadd",
                BinaryOperator::Sub => "fsub",
                BinaryOperator::Mul => "fmul",
                _ => "fdiv",
            };
            let result = self.new_temp();
            self.push(format!(
                "{result} = {instruction} double {left_reg}, {right_reg}"
            ));
            return Ok((result, Type::Float));
        }

        let instruction = match op {
            BinaryOperator::Add => "add",
            BinaryOperator::Sub => "sub",
            _ => "mul",
        };
        let result = self.new_temp();
        self.push(format!(
            "{result} = {instruction} i64 {left_reg}, {right_reg}"
        ));
        Ok((result, Type::Int))
    }

    fn emit_call(
        &mut self,
        callee: &Expression,
        args: &[Expression],
        span: Span,
    ) -> Result<(String, Type), CompileError> {
        if matches!(callee.kind, ExprKind::Attribute { .. }) {
            return Err(CompileError::Unsupported {
                construct: "method calls",
                span,
            });
        }
        let ExprKind::Identifier(name) = &callee.kind else {
            return Err(CompileError::Unsupported {
                construct: "calling computed values",
                span,
            });
        };

        if let Some(sig) = self.signatures.get(name.as_str()).cloned() {
            if args.len() != sig.params.len() {
                return Err(CompileError::Arity {
                    name: name.clone(),
                    expected: sig.params.len(),
                    found: args.len(),
                    span,
                });
            }
            let mut rendered = Vec::with_capacity(args.len());
            for (index, (arg, param_ty)) in args.iter().zip(&sig.params).enumerate() {
                let (reg, ty) = self.emit_expression(arg)?;
                let reg = self.coerce_numeric(reg, &ty, param_ty).ok_or_else(|| {
                    CompileError::ArgumentType {
                        name: name.clone(),
                        index: index + 1,
                        expected: param_ty.describe(),
                        got: ty.describe(),
                        span: arg.span,
                    }
                })?;
                rendered.push(format!("{} {reg}", param_ty.llvm()));
            }
            let rendered = rendered.join(", ");
            if sig.ret == Type::Void {
                self.push(format!("call void @{name}({rendered})"));
                return Ok(("0".to_string(), Type::Void));
            }
            let result = self.new_temp();
            self.push(format!(
                "{result} = call {} @{name}({rendered})",
                sig.ret.llvm()
            ));
            return Ok((result, sig.ret));
        }

        match Builtin::from_name(name) {
            Some(builtin) => self.emit_builtin_call(builtin, args, span),
            None => Err(CompileError::UndefinedFunction {
                name: name.clone(),
                span,
            }),
        }
    }

    fn emit_builtin_call(
        &mut self,
        builtin: Builtin,
        args: &[Expression],
        span: Span,
    ) -> Result<(String, Type), CompileError> {
        match builtin {
            Builtin::Print => self.emit_print_call(args),
            Builtin::Input => {
                if args.len() > 1 {
                    return Err(CompileError::Arity {
                        name: "input".to_string(),
                        expected: 1,
                        found: args.len(),
                        span,
                    });
                }
                let prompt = match args.first() {
                    None => self.string_pointer(""),
                    Some(arg) => {
                        let (reg, ty) = self.emit_expression(arg)?;
                        if ty != Type::Str {
                            return Err(CompileError::BuiltinArgument {
                                name: "input",
                                expected: "a string prompt",
                                got: ty.describe(),
                                span: arg.span,
                            });
                        }
                        reg
                    }
                };
                let result = self.new_temp();
                self.push(format!("{result} = call ptr @culebra_input(ptr {prompt})"));
                Ok((result, Type::Str))
            }
            Builtin::Len => {
                let arg = self.single_argument("len", args, span)?;
                let (reg, ty) = self.emit_expression(arg)?;
                let result = self.new_temp();
                match ty {
                    Type::Str => {
                        self.push(format!("{result} = call i64 @culebra_len(ptr {reg})"));
                    }
                    Type::Array(_) => {
                        self.push(format!(
                            "{result} = call i64 @culebra_len_array(ptr {reg})"
                        ));
                    }
                    other => {
                        return Err(CompileError::BuiltinArgument {
                            name: "len",
                            expected: "a string or array",
                            got: other.describe(),
                            span: arg.span,
                        });
                    }
                }
                Ok((result, Type::Int))
            }
            Builtin::Chr => {
                let arg = self.single_argument("chr", args, span)?;
                let (reg, ty) = self.emit_expression(arg)?;
                if ty != Type::Int {
                    return Err(CompileError::BuiltinArgument {
                        name: "chr",
                        expected: "an integer",
                        got: ty.describe(),
                        span: arg.span,
                    });
                }
                let result = self.new_temp();
                self.push(format!("{result} = call ptr @culebra_chr(i64 {reg})"));
                Ok((result, Type::Str))
            }
            Builtin::Ord => {
                let arg = self.single_argument("ord", args, span)?;
                let (reg, ty) = self.emit_expression(arg)?;
                if ty != Type::Str {
                    return Err(CompileError::BuiltinArgument {
                        name: "ord",
                        expected: "a string",
                        got: ty.describe(),
                        span: arg.span,
                    });
                }
                let result = self.new_temp();
                self.push(format!("{result} = call i64 @culebra_ord(ptr {reg})"));
                Ok((result, Type::Int))
            }
            Builtin::Int => {
                let arg = self.single_argument("int", args, span)?;
                let (reg, ty) = self.emit_expression(arg)?;
                match ty {
                    Type::Int => Ok((reg, Type::Int)),
                    Type::Float => {
                        let result = self.new_temp();
                        self.push(format!("{result} = fptosi double {reg} to i64"));
                        Ok((result, Type::Int))
                    }
                    Type::Bool => {
                        let result = self.new_temp();
                        self.push(format!("{result} = zext i1 {reg} to i64"));
                        Ok((result, Type::Int))
                    }
                    Type::Str => Err(CompileError::Unsupported {
                        construct: "parsing integers from strings",
                        span,
                    }),
                    other => Err(CompileError::BuiltinArgument {
                        name: "int",
                        expected: "a number",
                        got: other.describe(),
                        span: arg.span,
                    }),
                }
            }
            Builtin::Float => {
                let arg = self.single_argument("float", args, span)?;
                let (reg, ty) = self.emit_expression(arg)?;
                match ty {
                    Type::Float => Ok((reg, Type::Float)),
                    Type::Int => {
                        let result = self.new_temp();
                        self.push(format!("{result} = sitofp i64 {reg} to double"));
                        Ok((result, Type::Float))
                    }
                    Type::Str => Err(CompileError::Unsupported {
                        construct: "parsing floats from strings",
                        span,
                    }),
                    other => Err(CompileError::BuiltinArgument {
                        name: "float",
                        expected: "a number",
                        got: other.describe(),
                        span: arg.span,
                    }),
                }
            }
            Builtin::Str => {
                let arg = self.single_argument("str", args, span)?;
                let (reg, ty) = self.emit_expression(arg)?;
                let reg = self.to_c_string(reg, &ty, arg.span)?;
                Ok((reg, Type::Str))
            }
            Builtin::Abs => {
                let arg = self.single_argument("abs", args, span)?;
                let (reg, ty) = self.emit_expression(arg)?;
                match ty {
                    Type::Int => {
                        let negated = self.new_temp();
                        self.push(format!("{negated} = sub i64 0, {reg}"));
                        let is_negative = self.new_temp();
                        self.push(format!("{is_negative} = icmp slt i64 {reg}, 0"));
                        let result = self.new_temp();
                        self.push(format!(
                            "{result} = select i1 {is_negative}, i64 {negated}, i64 {reg}"
                        ));
                        Ok((result, Type::Int))
                    }
                    Type::Float => {
                        let negated = self.new_temp();
                        self.push(format!("{negated} = fneg double {reg}"));
                        let is_negative = self.new_temp();
                        self.push(format!(
                            "{is_negative} = fcmp olt double {reg}, {}",
                            double_literal(0.0)
                        ));
                        let result = self.new_temp();
                        self.push(format!(
                            "{result} = select i1 {is_negative}, double {negated}, double {reg}"
                        ));
                        Ok((result, Type::Float))
                    }
                    other => Err(CompileError::BuiltinArgument {
                        name: "abs",
                        expected: "a number",
                        got: other.describe(),
                        span: arg.span,
                    }),
                }
            }
            Builtin::ReadFile | Builtin::ReadLines => Err(CompileError::Unsupported {
                construct: "file reading builtins",
                span,
            }),
            Builtin::NewMap => Err(CompileError::Unsupported {
                construct: "Map() constructors",
                span,
            }),
            Builtin::NewSet => Err(CompileError::Unsupported {
                construct: "Set() constructors",
                span,
            }),
        }
    }

    /// `print` is overloaded at emit time on the static type of each
    /// argument; multi-argument calls go through `culebra_print_multi` with
    /// every argument rendered to a C string.
    fn emit_print_call(&mut self, args: &[Expression]) -> Result<(String, Type), CompileError> {
        match args {
            [] => {
                let empty = self.string_pointer("");
                self.push(format!("call void @culebra_print_string(ptr {empty})"));
            }
            [arg] => {
                let (reg, ty) = self.emit_expression(arg)?;
                match ty {
                    Type::Int => self.push(format!("call void @culebra_print_int(i64 {reg})")),
                    Type::Float => {
                        self.push(format!("call void @culebra_print_float(double {reg})"))
                    }
                    Type::Bool => self.push(format!("call void @culebra_print_bool(i1 {reg})")),
                    Type::Str => self.push(format!("call void @culebra_print_string(ptr {reg})")),
                    other => {
                        return Err(CompileError::BuiltinArgument {
                            name: "print",
                            expected: "a printable value",
                            got: other.describe(),
                            span: arg.span,
                        });
                    }
                }
            }
            _ => {
                let mut rendered = Vec::with_capacity(args.len());
                for arg in args {
                    let (reg, ty) = self.emit_expression(arg)?;
                    let c_string = self.to_c_string(reg, &ty, arg.span)?;
                    rendered.push(format!("ptr {c_string}"));
                }
                self.push(format!(
                    "call void (i32, ...) @culebra_print_multi(i32 {}, {})",
                    args.len(),
                    rendered.join(", ")
                ));
            }
        }
        Ok(("0".to_string(), Type::Void))
    }

    fn single_argument<'a>(
        &self,
        name: &'static str,
        args: &'a [Expression],
        span: Span,
    ) -> Result<&'a Expression, CompileError> {
        if args.len() != 1 {
            return Err(CompileError::Arity {
                name: name.to_string(),
                expected: 1,
                found: args.len(),
                span,
            });
        }
        Ok(&args[0])
    }

    /// Render a value as a `ptr` to a C string for `print_multi` and `str`.
    fn to_c_string(
        &mut self,
        reg: String,
        ty: &Type,
        span: Span,
    ) -> Result<String, CompileError> {
        let callee = match ty {
            Type::Str => return Ok(reg),
            Type::Int => "culebra_int_to_str",
            Type::Float => "culebra_float_to_str",
            Type::Bool => "culebra_bool_to_str",
            other => {
                return Err(CompileError::BuiltinArgument {
                    name: "print",
                    expected: "a printable value",
                    got: other.describe(),
                    span,
                });
            }
        };
        let result = self.new_temp();
        self.push(format!("{result} = call ptr @{callee}({} {reg})", ty.llvm()));
        Ok(result)
    }

    fn emit_index_value(&mut self, index: &Expression) -> Result<String, CompileError> {
        let (reg, ty) = self.emit_expression(index)?;
        if ty != Type::Int {
            return Err(CompileError::BadOperands {
                op: "[]",
                left: "array".to_string(),
                right: ty.describe(),
                span: index.span,
            });
        }
        Ok(reg)
    }

    /// Array slots are 8 bytes; load them back as the element's static type.
    fn load_element(
        &mut self,
        element_ptr: String,
        element_ty: Type,
    ) -> Result<(String, Type), CompileError> {
        match element_ty {
            Type::Bool => {
                let raw = self.new_temp();
                self.push(format!("{raw} = load i64, ptr {element_ptr}"));
                let result = self.new_temp();
                self.push(format!("{result} = icmp ne i64 {raw}, 0"));
                Ok((result, Type::Bool))
            }
            ty => {
                let result = self.new_temp();
                self.push(format!("{result} = load {}, ptr {element_ptr}", ty.llvm()));
                Ok((result, ty))
            }
        }
    }

    /// Convert an element value to the i64 slot representation used by
    /// `culebra_array_set`.
    fn element_to_slot(&mut self, reg: String, ty: &Type) -> String {
        match ty {
            Type::Int => reg,
            Type::Float => {
                let result = self.new_temp();
                self.push(format!("{result} = bitcast double {reg} to i64"));
                result
            }
            Type::Bool => {
                let result = self.new_temp();
                self.push(format!("{result} = zext i1 {reg} to i64"));
                result
            }
            _ => {
                let result = self.new_temp();
                self.push(format!("{result} = ptrtoint ptr {reg} to i64"));
                result
            }
        }
    }

    fn store_into_slot(
        &mut self,
        slot: &VarSlot,
        reg: String,
        ty: &Type,
        name: &str,
        span: Span,
    ) -> Result<(), CompileError> {
        if slot.ty == Type::Bool && *ty == Type::Bool {
            let widened = self.new_temp();
            self.push(format!("{widened} = zext i1 {reg} to i8"));
            self.push(format!("store i8 {widened}, ptr {}", slot.ptr));
            return Ok(());
        }
        let reg = self
            .coerce_numeric(reg, ty, &slot.ty)
            .ok_or_else(|| CompileError::TypeConflict {
                name: name.to_string(),
                first: slot.ty.describe(),
                second: ty.describe(),
                span,
            })?;
        self.push(format!("store {} {reg}, ptr {}", slot.ty.llvm(), slot.ptr));
        Ok(())
    }

    /// Identity, or int-to-float promotion; anything else is `None`.
    fn coerce_numeric(&mut self, reg: String, from: &Type, to: &Type) -> Option<String> {
        if from == to {
            return Some(reg);
        }
        if *from == Type::Int && *to == Type::Float {
            let result = self.new_temp();
            self.push(format!("{result} = sitofp i64 {reg} to double"));
            return Some(result);
        }
        None
    }

    fn promote_to_float(&mut self, reg: String, ty: &Type) -> String {
        if *ty == Type::Float {
            return reg;
        }
        let result = self.new_temp();
        self.push(format!("{result} = sitofp i64 {reg} to double"));
        result
    }

    fn to_bool(&mut self, reg: &str, ty: &Type, span: Span) -> Result<String, CompileError> {
        match ty {
            Type::Bool => Ok(reg.to_string()),
            Type::Int => {
                let result = self.new_temp();
                self.push(format!("{result} = icmp ne i64 {reg}, 0"));
                Ok(result)
            }
            Type::Float => {
                let result = self.new_temp();
                self.push(format!(
                    "{result} = fcmp one double {reg}, {}",
                    double_literal(0.0)
                ));
                Ok(result)
            }
            Type::Str => {
                let length = self.new_temp();
                self.push(format!("{length} = call i64 @culebra_len(ptr {reg})"));
                let result = self.new_temp();
                self.push(format!("{result} = icmp ne i64 {length}, 0"));
                Ok(result)
            }
            Type::Array(_) => {
                let length = self.new_temp();
                self.push(format!("{length} = call i64 @culebra_len_array(ptr {reg})"));
                let result = self.new_temp();
                self.push(format!("{result} = icmp ne i64 {length}, 0"));
                Ok(result)
            }
            Type::Void => Err(CompileError::Unsupported {
                construct: "using a void value in a condition",
                span,
            }),
        }
    }

    /// Strict static typing used by the locals pre-pass; mirrors what
    /// `emit_expression` will produce.
    fn static_type(&self, expr: &Expression) -> Result<Type, CompileError> {
        match &expr.kind {
            ExprKind::Integer(_) => Ok(Type::Int),
            ExprKind::Float(_) => Ok(Type::Float),
            ExprKind::Boolean(_) => Ok(Type::Bool),
            ExprKind::String(_) => Ok(Type::Str),
            ExprKind::Identifier(name) => self
                .vars
                .get(name)
                .map(|slot| slot.ty.clone())
                .ok_or_else(|| CompileError::UndefinedName {
                    name: name.clone(),
                    span: expr.span,
                }),
            ExprKind::Unary { op, operand } => match op {
                UnaryOperator::Not => Ok(Type::Bool),
                UnaryOperator::Neg => {
                    let ty = self.static_type(operand)?;
                    if ty.is_numeric() {
                        Ok(ty)
                    } else {
                        Err(CompileError::BadUnaryOperand {
                            op: "-",
                            type_name: ty.describe(),
                            span: expr.span,
                        })
                    }
                }
            },
            ExprKind::Binary { left, op, right } => {
                if matches!(op, BinaryOperator::And | BinaryOperator::Or) {
                    return Ok(Type::Bool);
                }
                let left_ty = self.static_type(left)?;
                let right_ty = self.static_type(right)?;
                binary_result_type(*op, &left_ty, &right_ty).ok_or_else(|| {
                    CompileError::BadOperands {
                        op: op.symbol(),
                        left: left_ty.describe(),
                        right: right_ty.describe(),
                        span: expr.span,
                    }
                })
            }
            ExprKind::Array(elements) => {
                if elements.is_empty() {
                    return Err(CompileError::Unsupported {
                        construct: "empty array literals",
                        span: expr.span,
                    });
                }
                let mut element_ty: Option<Type> = None;
                for element in elements {
                    let ty = self.static_type(element)?;
                    element_ty = Some(match element_ty {
                        None => ty,
                        Some(existing) if existing == ty => existing,
                        Some(Type::Int) if ty == Type::Float => Type::Float,
                        Some(Type::Float) if ty == Type::Int => Type::Float,
                        Some(_) => {
                            return Err(CompileError::MixedArrayElements { span: expr.span });
                        }
                    });
                }
                Ok(Type::Array(Box::new(
                    element_ty.expect("non-empty array literal"),
                )))
            }
            ExprKind::Index { object, .. } => match self.static_type(object)? {
                Type::Array(element) => Ok(*element),
                Type::Str => Err(CompileError::Unsupported {
                    construct: "string indexing",
                    span: expr.span,
                }),
                other => Err(CompileError::NotIndexable {
                    type_name: other.describe(),
                    span: expr.span,
                }),
            },
            ExprKind::Call { callee, args } => {
                let ExprKind::Identifier(name) = &callee.kind else {
                    return Err(CompileError::Unsupported {
                        construct: "calling computed values",
                        span: expr.span,
                    });
                };
                if let Some(sig) = self.signatures.get(name.as_str()) {
                    if args.len() != sig.params.len() {
                        return Err(CompileError::Arity {
                            name: name.clone(),
                            expected: sig.params.len(),
                            found: args.len(),
                            span: expr.span,
                        });
                    }
                    return Ok(sig.ret.clone());
                }
                match Builtin::from_name(name) {
                    Some(Builtin::Print) => Ok(Type::Void),
                    Some(Builtin::Input | Builtin::Chr | Builtin::Str) => Ok(Type::Str),
                    Some(Builtin::Len | Builtin::Ord | Builtin::Int) => Ok(Type::Int),
                    Some(Builtin::Float) => Ok(Type::Float),
                    Some(Builtin::Abs) => {
                        let arg = self.single_argument("abs", args, expr.span)?;
                        let ty = self.static_type(arg)?;
                        if ty.is_numeric() {
                            Ok(ty)
                        } else {
                            Err(CompileError::BuiltinArgument {
                                name: "abs",
                                expected: "a number",
                                got: ty.describe(),
                                span: arg.span,
                            })
                        }
                    }
                    Some(Builtin::ReadFile | Builtin::ReadLines) => {
                        Err(CompileError::Unsupported {
                            construct: "file reading builtins",
                            span: expr.span,
                        })
                    }
                    Some(Builtin::NewMap) => Err(CompileError::Unsupported {
                        construct: "Map() constructors",
                        span: expr.span,
                    }),
                    Some(Builtin::NewSet) => Err(CompileError::Unsupported {
                        construct: "Set() constructors",
                        span: expr.span,
                    }),
                    None => Err(CompileError::UndefinedFunction {
                        name: name.clone(),
                        span: expr.span,
                    }),
                }
            }
            ExprKind::Tuple(_) => Err(CompileError::Unsupported {
                construct: "tuple literals",
                span: expr.span,
            }),
            ExprKind::Map(_) => Err(CompileError::Unsupported {
                construct: "map literals",
                span: expr.span,
            }),
            ExprKind::Set(_) => Err(CompileError::Unsupported {
                construct: "set literals",
                span: expr.span,
            }),
            ExprKind::Attribute { .. } => Err(CompileError::Unsupported {
                construct: "method calls",
                span: expr.span,
            }),
        }
    }

    /// Global constant for a string literal plus a pointer to its first
    /// byte. Identical literals share one constant.
    fn string_pointer(&mut self, content: &str) -> String {
        let index = match self.strings.iter().position(|existing| existing == content) {
            Some(index) => index,
            None => {
                self.strings.push(content.to_string());
                self.strings.len() - 1
            }
        };
        let length = content.len() + 1;
        let pointer = self.new_temp();
        self.push(format!(
            "{pointer} = getelementptr inbounds [{length} x i8], ptr @.str.{}, i64 0, i64 0",
            index + 1
        ));
        pointer
    }

    fn new_temp(&mut self) -> String {
        self.temp_counter += 1;
        format!("%t{}", self.temp_counter)
    }

    fn new_label(&mut self, prefix: &str) -> String {
        self.label_counter += 1;
        format!("{prefix}{}", self.label_counter)
    }

    fn start_block_header(&mut self, label: &str) {
        self.push_raw(format!("{label}:"));
        self.current_block = label.to_string();
        self.terminated = false;
    }

    fn start_block(&mut self, label: &str) {
        self.start_block_header(label);
    }

    fn branch(&mut self, target: &str) {
        if !self.terminated {
            self.push(format!("br label %{target}"));
            self.terminated = true;
        }
    }

    fn cond_branch(&mut self, condition: &str, if_true: &str, if_false: &str) {
        self.push(format!(
            "br i1 {condition}, label %{if_true}, label %{if_false}"
        ));
        self.terminated = true;
    }

    fn push(&mut self, line: impl AsRef<str>) {
        self.lines.push(format!("  {}", line.as_ref()));
    }

    fn push_raw(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

/// LLVM double literals use the hexadecimal bit pattern so every value is
/// exactly representable in the textual IR.
fn double_literal(value: f64) -> String {
    format!("0x{:016X}", value.to_bits())
}

fn escape_ir_string(content: &str) -> String {
    let mut escaped = String::with_capacity(content.len());
    for byte in content.bytes() {
        match byte {
            b'"' | b'\\' => escaped.push_str(&format!("\\{byte:02X}")),
            0x20..=0x7E => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\{byte:02X}")),
        }
    }
    escaped
}
