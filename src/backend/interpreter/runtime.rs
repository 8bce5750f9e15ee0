use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{AssignTarget, Expression, Function, Statement};
use crate::symbols::SymbolTable;
use crate::value::Value;

use super::InterpreterError;

type ExecOutcome<T> = std::result::Result<T, InterpreterError>;

/// Control-flow marker for statement execution.
pub(super) enum ExecResult {
    Continue,
    Return(Value),
}

/// Runtime executor for interpreted statements and expressions.
pub(super) struct InterpreterRuntime<'a> {
    functions: &'a SymbolTable<&'a Function>,
    variables: SymbolTable<Value>,
    output: Vec<String>,
    call_depth: usize,
    max_call_depth: usize,
}

impl<'a> InterpreterRuntime<'a> {
    pub(super) fn new(functions: &'a SymbolTable<&'a Function>, max_call_depth: usize) -> Self {
        Self {
            functions,
            variables: SymbolTable::new(),
            output: Vec::new(),
            call_depth: 0,
            max_call_depth,
        }
    }

    /// Output lines and the global frame's bindings in declaration order.
    pub(super) fn finish(self) -> (Vec<String>, IndexMap<String, Value>) {
        let variables = self
            .variables
            .globals()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        (self.output, variables)
    }

    /// Runs `body` in a fresh frame.
    fn exec_block(&mut self, body: &[Statement]) -> ExecOutcome<ExecResult> {
        self.variables.enter_scope();
        let result = self.exec_statements(body);
        self.variables.exit_scope();
        result
    }

    fn exec_statements(&mut self, body: &[Statement]) -> ExecOutcome<ExecResult> {
        for statement in body {
            if let ExecResult::Return(value) = self.exec_statement(statement)? {
                return Ok(ExecResult::Return(value));
            }
        }
        Ok(ExecResult::Continue)
    }

    pub(super) fn exec_statement(&mut self, statement: &Statement) -> ExecOutcome<ExecResult> {
        match statement {
            // Registered before execution starts.
            Statement::Function(_) => Ok(ExecResult::Continue),
            Statement::VarDeclaration { ty, name, value } => {
                let value = match value {
                    Some(expr) => self.eval_expression(expr)?,
                    None => Value::default_for(*ty),
                };
                if !value.matches_type(*ty) {
                    return Err(InterpreterError::TypeMismatch {
                        name: name.clone(),
                        expected: *ty,
                    });
                }
                self.variables.declare(name.clone(), value)?;
                Ok(ExecResult::Continue)
            }
            Statement::ArrayDeclaration { ty, name, size } => {
                let value = Value::array_of(*ty, *size)?;
                self.variables.declare(name.clone(), value)?;
                Ok(ExecResult::Continue)
            }
            Statement::Assignment { target, value } => {
                let value = self.eval_expression(value)?;
                self.assign(target, value)?;
                Ok(ExecResult::Continue)
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                if self.eval_expression(condition)?.is_truthy() {
                    self.exec_block(then_body)
                } else if let Some(else_body) = else_body {
                    self.exec_block(else_body)
                } else {
                    Ok(ExecResult::Continue)
                }
            }
            Statement::While { condition, body } => {
                while self.eval_expression(condition)?.is_truthy() {
                    if let ExecResult::Return(value) = self.exec_block(body)? {
                        return Ok(ExecResult::Return(value));
                    }
                }
                Ok(ExecResult::Continue)
            }
            Statement::For {
                init,
                condition,
                update,
                body,
            } => {
                // The header gets its own frame so a declared counter dies with the loop.
                self.variables.enter_scope();
                let result = self.exec_for(init, condition, update, body);
                self.variables.exit_scope();
                result
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expression(expr)?,
                    None => Value::None,
                };
                Ok(ExecResult::Return(value))
            }
            Statement::Output(expr) => {
                let value = self.eval_expression(expr)?;
                self.output.push(value.to_output());
                Ok(ExecResult::Continue)
            }
            Statement::Expr(expr) => {
                self.eval_expression(expr)?;
                Ok(ExecResult::Continue)
            }
        }
    }

    fn exec_for(
        &mut self,
        init: &Statement,
        condition: &Expression,
        update: &Statement,
        body: &[Statement],
    ) -> ExecOutcome<ExecResult> {
        self.exec_statement(init)?;
        while self.eval_expression(condition)?.is_truthy() {
            if let ExecResult::Return(value) = self.exec_block(body)? {
                return Ok(ExecResult::Return(value));
            }
            self.exec_statement(update)?;
        }
        Ok(ExecResult::Continue)
    }

    /// Assignment never declares and is not type checked.
    fn assign(&mut self, target: &AssignTarget, value: Value) -> ExecOutcome<()> {
        match target {
            AssignTarget::Name(name) => {
                *self.slot_to_assign(name)? = value;
            }
            AssignTarget::Index { name, index } => {
                let index = self.eval_index(index)?;
                let Value::Array(items) = self.slot_to_assign(name)? else {
                    return Err(InterpreterError::NotAnArray { name: name.clone() });
                };
                let slot = checked_slot(name, index, items.len())?;
                items[slot] = value;
            }
        }
        Ok(())
    }

    fn slot_to_assign(&mut self, name: &str) -> ExecOutcome<&mut Value> {
        self.variables
            .lookup_mut(name)
            .ok_or_else(|| InterpreterError::NotDeclared {
                name: name.to_string(),
            })
    }

    fn eval_expression(&mut self, expr: &Expression) -> ExecOutcome<Value> {
        match expr {
            Expression::Number(number) => Ok(Value::from(*number)),
            Expression::String(value) => Ok(Value::Str(value.clone())),
            Expression::Boolean(value) => Ok(Value::Bool(*value)),
            Expression::Identifier(name) => self
                .variables
                .lookup(name)
                .cloned()
                .ok_or_else(|| InterpreterError::NotDefined { name: name.clone() }),
            Expression::ArrayAccess { name, index } => {
                let index = self.eval_index(index)?;
                let value = self
                    .variables
                    .lookup(name)
                    .ok_or_else(|| InterpreterError::NotDefined { name: name.clone() })?;
                let Value::Array(items) = value else {
                    return Err(InterpreterError::NotAnArray { name: name.clone() });
                };
                let slot = checked_slot(name, index, items.len())?;
                Ok(items[slot].clone())
            }
            Expression::BinaryOp { left, op, right } => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                Ok(left.binary_op(*op, &right)?)
            }
            Expression::Call { name, args } => self.eval_call(name, args),
        }
    }

    fn eval_index(&mut self, index: &Expression) -> ExecOutcome<i64> {
        let index = self.eval_expression(index)?;
        index.as_index().ok_or(InterpreterError::InvalidIndex {
            found: index.type_name(),
        })
    }

    fn eval_call(&mut self, name: &str, args: &[Expression]) -> ExecOutcome<Value> {
        let function: &'a Function = *self.functions.lookup(name).ok_or_else(|| {
            InterpreterError::UndefinedFunction {
                name: name.to_string(),
            }
        })?;

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expression(arg)?);
        }
        if values.len() != function.params.len() {
            return Err(InterpreterError::ArityMismatch {
                name: name.to_string(),
                expected: function.params.len(),
                found: values.len(),
            });
        }
        for (param, value) in function.params.iter().zip(&values) {
            if !value.matches_type(param.ty) {
                return Err(InterpreterError::TypeMismatch {
                    name: param.name.clone(),
                    expected: param.ty,
                });
            }
        }
        if self.call_depth >= self.max_call_depth {
            return Err(InterpreterError::CallDepthExceeded {
                limit: self.max_call_depth,
            });
        }

        debug!(function = name, depth = self.call_depth + 1, "call");
        // The callee sees globals plus its own frame, never the caller's locals.
        let saved = self.variables.detach_locals();
        self.variables.enter_scope();
        self.call_depth += 1;
        let result = self.exec_call_body(function, values);
        self.call_depth -= 1;
        self.variables.restore_locals(saved);

        match result? {
            ExecResult::Continue | ExecResult::Return(Value::None) => Ok(Value::None),
            ExecResult::Return(value) if value.matches_type(function.return_type) => Ok(value),
            ExecResult::Return(value) => Err(InterpreterError::ReturnTypeMismatch {
                function: name.to_string(),
                expected: function.return_type,
                found: value.type_name(),
            }),
        }
    }

    fn exec_call_body(
        &mut self,
        function: &Function,
        args: Vec<Value>,
    ) -> ExecOutcome<ExecResult> {
        for (param, value) in function.params.iter().zip(args) {
            self.variables.declare(param.name.clone(), value)?;
        }
        self.exec_statements(&function.body)
    }
}

fn checked_slot(name: &str, index: i64, len: usize) -> ExecOutcome<usize> {
    usize::try_from(index)
        .ok()
        .filter(|slot| *slot < len)
        .ok_or_else(|| InterpreterError::IndexOutOfBounds {
            name: name.to_string(),
            index,
            len,
        })
}
