use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{AssignTarget, Expression, Function, Program, Statement};

use super::instruction::{Constant, Instruction, Label, Opcode, Operand, Temp};

/// Where a lowered function lives in the instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub params: Vec<String>,
    /// Index of the function's `LABEL`.
    pub entry: usize,
    /// One past its trailing `RETURN`.
    pub end: usize,
}

/// Generated code plus the function table needed to execute it.
#[derive(Debug, Clone, PartialEq)]
pub struct IrProgram {
    pub instructions: Vec<Instruction>,
    pub functions: IndexMap<String, FunctionInfo>,
}

/// Lowers one AST into quadruples. Temporaries and labels are numbered from 1
/// per generator, so each run needs a fresh value.
pub struct CodeGenerator {
    instructions: Vec<Instruction>,
    functions: IndexMap<String, FunctionInfo>,
    next_temp: u32,
    next_label: u32,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            functions: IndexMap::new(),
            next_temp: 1,
            next_label: 1,
        }
    }

    pub fn generate(self, program: &Program) -> Vec<Instruction> {
        self.generate_unit(program).instructions
    }

    pub fn generate_unit(mut self, program: &Program) -> IrProgram {
        for statement in &program.declarations {
            self.lower_statement(statement);
        }
        debug!(
            instructions = self.instructions.len(),
            functions = self.functions.len(),
            "generated ir"
        );
        IrProgram {
            instructions: self.instructions,
            functions: self.functions,
        }
    }

    fn new_temp(&mut self) -> Temp {
        let temp = Temp(self.next_temp);
        self.next_temp += 1;
        temp
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn emit(&mut self, opcode: Opcode, arg1: Operand, arg2: Operand, result: Operand) {
        self.instructions
            .push(Instruction::new(opcode, arg1, arg2, result));
    }

    fn lower_block(&mut self, body: &[Statement]) {
        for statement in body {
            self.lower_statement(statement);
        }
    }

    fn lower_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Function(function) => self.lower_function(function),
            Statement::VarDeclaration { ty, name, value } => match value {
                Some(value) => {
                    let value = self.lower_expression(value);
                    self.emit(
                        Opcode::Assign,
                        value.into(),
                        Operand::None,
                        Operand::Name(name.clone()),
                    );
                }
                None => self.emit(
                    Opcode::Declare,
                    Operand::Name(name.clone()),
                    Operand::Type(*ty),
                    Operand::None,
                ),
            },
            Statement::ArrayDeclaration { ty, name, size } => self.emit(
                Opcode::Declare,
                Operand::Name(name.clone()),
                Operand::Type(*ty),
                Operand::Const(Constant::Int(*size as i64)),
            ),
            Statement::Assignment { target, value } => match target {
                AssignTarget::Name(name) => {
                    let value = self.lower_expression(value);
                    self.emit(
                        Opcode::Assign,
                        value.into(),
                        Operand::None,
                        Operand::Name(name.clone()),
                    );
                }
                AssignTarget::Index { name, index } => {
                    let index = self.lower_expression(index);
                    let value = self.lower_expression(value);
                    self.emit(
                        Opcode::Assign,
                        value.into(),
                        index.into(),
                        Operand::Name(name.clone()),
                    );
                }
            },
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition = self.lower_expression(condition);
                let else_label = self.new_label();
                let end_label = self.new_label();
                self.emit(
                    Opcode::JumpIf,
                    condition.into(),
                    else_label.into(),
                    Operand::None,
                );
                self.lower_block(then_body);
                self.emit(Opcode::Jump, end_label.into(), Operand::None, Operand::None);
                self.emit(Opcode::Label, else_label.into(), Operand::None, Operand::None);
                if let Some(else_body) = else_body {
                    self.lower_block(else_body);
                }
                self.emit(Opcode::Label, end_label.into(), Operand::None, Operand::None);
            }
            Statement::While { condition, body } => self.lower_loop(condition, body, None),
            Statement::For {
                init,
                condition,
                update,
                body,
            } => {
                self.lower_statement(init);
                self.lower_loop(condition, body, Some(update.as_ref()));
            }
            Statement::Return(Some(value)) | Statement::Output(value) => {
                let value = self.lower_expression(value);
                self.emit(Opcode::Return, value.into(), Operand::None, Operand::None);
            }
            Statement::Return(None) => {
                self.emit(Opcode::Return, Operand::None, Operand::None, Operand::None);
            }
            Statement::Expr(expr) => {
                self.lower_expression(expr);
            }
        }
    }

    /// `LABEL start; cond; JUMPIF cond, end; body [update]; JUMP start; LABEL end`
    fn lower_loop(
        &mut self,
        condition: &Expression,
        body: &[Statement],
        update: Option<&Statement>,
    ) {
        let start_label = self.new_label();
        let end_label = self.new_label();
        self.emit(Opcode::Label, start_label.into(), Operand::None, Operand::None);
        let condition = self.lower_expression(condition);
        self.emit(
            Opcode::JumpIf,
            condition.into(),
            end_label.into(),
            Operand::None,
        );
        self.lower_block(body);
        if let Some(update) = update {
            self.lower_statement(update);
        }
        self.emit(Opcode::Jump, start_label.into(), Operand::None, Operand::None);
        self.emit(Opcode::Label, end_label.into(), Operand::None, Operand::None);
    }

    fn lower_function(&mut self, function: &Function) {
        let entry = self.instructions.len();
        self.emit(
            Opcode::Label,
            Operand::Name(function.name.clone()),
            Operand::None,
            Operand::None,
        );
        self.lower_block(&function.body);
        self.emit(Opcode::Return, Operand::None, Operand::None, Operand::None);
        let end = self.instructions.len();

        // A later duplicate still emits code but the first one stays callable.
        self.functions
            .entry(function.name.clone())
            .or_insert_with(|| FunctionInfo {
                params: function.params.iter().map(|param| param.name.clone()).collect(),
                entry,
                end,
            });
    }

    fn lower_expression(&mut self, expr: &Expression) -> Temp {
        match expr {
            Expression::Number(number) => self.load_const(Constant::from(*number)),
            Expression::String(value) => self.load_const(Constant::Str(value.clone())),
            Expression::Boolean(value) => self.load_const(Constant::Bool(*value)),
            Expression::Identifier(name) => {
                let temp = self.new_temp();
                self.emit(
                    Opcode::Load,
                    Operand::Name(name.clone()),
                    Operand::None,
                    temp.into(),
                );
                temp
            }
            Expression::ArrayAccess { name, index } => {
                let index = self.lower_expression(index);
                let temp = self.new_temp();
                self.emit(
                    Opcode::ArrayAccess,
                    Operand::Name(name.clone()),
                    index.into(),
                    temp.into(),
                );
                temp
            }
            Expression::BinaryOp { left, op, right } => {
                let left = self.lower_expression(left);
                let right = self.lower_expression(right);
                let temp = self.new_temp();
                self.emit(
                    Opcode::for_operator(*op),
                    left.into(),
                    right.into(),
                    temp.into(),
                );
                temp
            }
            Expression::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.lower_expression(arg))
                    .collect::<Vec<_>>();
                let temp = self.new_temp();
                self.emit(
                    Opcode::Call,
                    Operand::Name(name.clone()),
                    Operand::Args(args),
                    temp.into(),
                );
                temp
            }
        }
    }

    fn load_const(&mut self, constant: Constant) -> Temp {
        let temp = self.new_temp();
        self.emit(
            Opcode::LoadConst,
            Operand::Const(constant),
            Operand::None,
            temp.into(),
        );
        temp
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeTag;
    use crate::backend::ir::listing;
    use crate::parser::parse;
    use indoc::indoc;

    fn lower(source: &str) -> String {
        let program = parse(source).expect("parse failed");
        listing(&CodeGenerator::new().generate(&program))
    }

    #[test]
    fn lowers_declaration_with_arithmetic() {
        let program = parse("IN x = 1 + 2;").expect("parse failed");
        let instructions = CodeGenerator::new().generate(&program);
        assert_eq!(
            instructions,
            vec![
                Instruction::new(
                    Opcode::LoadConst,
                    Operand::Const(Constant::Int(1)),
                    Operand::None,
                    Temp(1).into()
                ),
                Instruction::new(
                    Opcode::LoadConst,
                    Operand::Const(Constant::Int(2)),
                    Operand::None,
                    Temp(2).into()
                ),
                Instruction::new(Opcode::Plus, Temp(1).into(), Temp(2).into(), Temp(3).into()),
                Instruction::new(
                    Opcode::Assign,
                    Temp(3).into(),
                    Operand::None,
                    Operand::Name("x".to_string())
                ),
            ]
        );
    }

    #[test]
    fn lowers_if_else_with_fresh_labels() {
        let listing = lower("if a then output 1; else output 2; end");
        let expected = indoc! {"
            LOAD a, _, t1
            JUMPIF t1, L1, _
            LOAD_CONST 1, _, t2
            RETURN t2, _, _
            JUMP L2, _, _
            LABEL L1, _, _
            LOAD_CONST 2, _, t3
            RETURN t3, _, _
            LABEL L2, _, _"};
        assert_eq!(listing, expected);
    }

    #[test]
    fn lowers_while_loop() {
        let listing = lower("while n < 3 { n = n + 1; }");
        let expected = indoc! {"
            LABEL L1, _, _
            LOAD n, _, t1
            LOAD_CONST 3, _, t2
            LT t1, t2, t3
            JUMPIF t3, L2, _
            LOAD n, _, t4
            LOAD_CONST 1, _, t5
            PLUS t4, t5, t6
            ASSIGN t6, _, n
            JUMP L1, _, _
            LABEL L2, _, _"};
        assert_eq!(listing, expected);
    }

    #[test]
    fn for_loop_appends_update_to_body() {
        let listing = lower("for (i = 0; i < 2; i = i + 1;) { output i; }");
        let expected = indoc! {"
            LOAD_CONST 0, _, t1
            ASSIGN t1, _, i
            LABEL L1, _, _
            LOAD i, _, t2
            LOAD_CONST 2, _, t3
            LT t2, t3, t4
            JUMPIF t4, L2, _
            LOAD i, _, t5
            RETURN t5, _, _
            LOAD i, _, t6
            LOAD_CONST 1, _, t7
            PLUS t6, t7, t8
            ASSIGN t8, _, i
            JUMP L1, _, _
            LABEL L2, _, _"};
        assert_eq!(listing, expected);
    }

    #[test]
    fn lowers_functions_and_records_their_extent() {
        let program = parse(indoc! {"
            function add(IN a, IN b) IN {
                return a + b;
            }
            IN s = add(1, 2);
        "})
        .expect("parse failed");
        let unit = CodeGenerator::new().generate_unit(&program);

        let expected = indoc! {"
            LABEL add, _, _
            LOAD a, _, t1
            LOAD b, _, t2
            PLUS t1, t2, t3
            RETURN t3, _, _
            RETURN _, _, _
            LOAD_CONST 1, _, t4
            LOAD_CONST 2, _, t5
            CALL add, [t4, t5], t6
            ASSIGN t6, _, s"};
        assert_eq!(listing(&unit.instructions), expected);
        assert_eq!(
            unit.functions.get("add"),
            Some(&FunctionInfo {
                params: vec!["a".to_string(), "b".to_string()],
                entry: 0,
                end: 6,
            })
        );
    }

    #[test]
    fn lowers_arrays() {
        let listing = lower("IN v[2]; v[1] = 5; output v[1];");
        let expected = indoc! {"
            DECLARE v, IN, 2
            LOAD_CONST 1, _, t1
            LOAD_CONST 5, _, t2
            ASSIGN t2, t1, v
            LOAD_CONST 1, _, t3
            ARRAY_ACCESS v, t3, t4
            RETURN t4, _, _"};
        assert_eq!(listing, expected);
    }

    #[test]
    fn bare_declaration_emits_declare() {
        let program = Program {
            declarations: vec![Statement::VarDeclaration {
                ty: TypeTag::Str,
                name: "s".to_string(),
                value: None,
            }],
        };
        assert_eq!(
            listing(&CodeGenerator::new().generate(&program)),
            "DECLARE s, STR, _"
        );
    }

    #[test]
    fn counters_restart_per_generator() {
        let program = parse("IN a = 1; while a { a = 0; }").expect("parse failed");
        let first = CodeGenerator::new().generate(&program);
        let second = CodeGenerator::new().generate(&program);
        assert_eq!(first, second);
    }
}
