use anyhow::Result;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::ast::{Function, Program, Statement};
use crate::backend::{Backend, PreparedBackend};
use crate::symbols::SymbolTable;
use crate::value::Value;

mod error;
mod runtime;

pub use error::InterpreterError;
use runtime::{ExecResult, InterpreterRuntime};

/// Nested calls allowed by default. Both executors recurse on the native stack,
/// and this depth fits a 2 MiB thread in unoptimized builds.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Nested calls allowed before the run aborts.
    pub max_call_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// What a successful run leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpretation {
    pub output: Vec<String>,
    /// Program-level variables in declaration order.
    pub variables: IndexMap<String, Value>,
}

/// AST-walking backend that executes programs directly without compilation.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    config: InterpreterConfig,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        Self { config }
    }

    pub fn interpret(
        &self,
        program: &Program,
    ) -> std::result::Result<Interpretation, InterpreterError> {
        // Functions are hoisted so calls may precede their declaration.
        let mut functions: SymbolTable<&Function> = SymbolTable::new();
        for statement in &program.declarations {
            if let Statement::Function(function) = statement {
                functions.declare(function.name.clone(), function)?;
            }
        }

        let mut runtime = InterpreterRuntime::new(&functions, self.config.max_call_depth);
        for statement in &program.declarations {
            match runtime.exec_statement(statement)? {
                ExecResult::Continue => {}
                ExecResult::Return(_) => return Err(InterpreterError::ReturnOutsideFunction),
            }
        }

        let (output, variables) = runtime.finish();
        debug!(
            lines = output.len(),
            variables = variables.len(),
            "interpretation finished"
        );
        Ok(Interpretation { output, variables })
    }
}

/// Prepared executable program for the tree-walking interpreter.
pub struct PreparedInterpreter {
    interpreter: Interpreter,
    program: Program,
}

impl PreparedBackend for PreparedInterpreter {
    fn run(&self) -> Result<String> {
        let interpretation = self.interpreter.interpret(&self.program)?;
        Ok(interpretation.output.join("\n"))
    }
}

impl Backend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedBackend>> {
        Ok(Box::new(PreparedInterpreter {
            interpreter: self.clone(),
            program: program.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeTag;
    use crate::parser::parse;
    use crate::symbols::SymbolError;
    use crate::value::ValueError;
    use indoc::indoc;

    fn run(source: &str) -> std::result::Result<Interpretation, InterpreterError> {
        let program = parse(source).expect("parse failed");
        Interpreter::new().interpret(&program)
    }

    fn output(source: &str) -> Vec<String> {
        run(source).expect("run failed").output
    }

    fn variable(result: &Interpretation, name: &str) -> Value {
        result
            .variables
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("missing variable {name}"))
    }

    #[test]
    fn sums_declared_integers() {
        let result = run(indoc! {"
            IN a = 5;
            IN b = 10;
            IN sum = a + b;
            output sum;
        "})
        .expect("run failed");

        assert_eq!(result.output, vec!["15"]);
        assert_eq!(
            result.variables.keys().collect::<Vec<_>>(),
            vec!["a", "b", "sum"]
        );
        assert_eq!(variable(&result, "sum"), Value::Int(15));
    }

    #[test]
    fn takes_the_then_branch() {
        let result = run(indoc! {r#"
            IN age = 20;
            STR nom = "Alice";
            if age >= 18 then
                output "Majeur";
                output nom;
            else
                output "Mineur";
            end
        "#})
        .expect("run failed");

        assert_eq!(result.output, vec!["Majeur", "Alice"]);
    }

    #[test]
    fn takes_the_else_branch() {
        let lines = output(indoc! {r#"
            IN age = 12;
            if age >= 18 then output "Majeur"; else output "Mineur"; end
        "#});
        assert_eq!(lines, vec!["Mineur"]);
    }

    #[test]
    fn rejects_initializer_of_wrong_type() {
        let err = run(r#"IN x = "hello";"#).expect_err("expected type error");
        assert_eq!(
            err,
            InterpreterError::TypeMismatch {
                name: "x".to_string(),
                expected: TypeTag::In,
            }
        );
        assert_eq!(err.to_string(), "Variable x must be of type IN");
    }

    #[test]
    fn reals_accept_integers() {
        let result = run("IR ratio = 3; IR half = 1 / 2;").expect("run failed");
        assert_eq!(variable(&result, "ratio"), Value::Int(3));
        assert_eq!(variable(&result, "half"), Value::Float(0.5));
    }

    #[test]
    fn binary_literals_in_every_spelling() {
        let result = run(indoc! {"
            BINARY a = YES;
            BINARY b = true;
            BINARY c = 1;
            BINARY d = NO;
            BINARY e = false;
            BINARY f = 0;
            output a;
        "})
        .expect("run failed");

        assert_eq!(result.output, vec!["True"]);
        for (name, expected) in [
            ("a", true),
            ("b", true),
            ("c", true),
            ("d", false),
            ("e", false),
            ("f", false),
        ] {
            assert_eq!(variable(&result, name), Value::Bool(expected), "{name}");
        }
    }

    #[test]
    fn reading_an_unknown_name_fails() {
        let err = run("output z;").expect_err("expected resolution error");
        assert_eq!(
            err,
            InterpreterError::NotDefined {
                name: "z".to_string()
            }
        );
    }

    #[test]
    fn assignment_never_declares() {
        let err = run("y = 3;").expect_err("expected resolution error");
        assert_eq!(
            err,
            InterpreterError::NotDeclared {
                name: "y".to_string()
            }
        );
    }

    #[test]
    fn duplicate_declaration_in_one_scope_fails() {
        let err = run("IN a = 1; IN a = 2;").expect_err("expected declaration error");
        assert_eq!(
            err,
            InterpreterError::Declaration(SymbolError::DuplicateDeclaration {
                name: "a".to_string()
            })
        );
    }

    #[test]
    fn block_locals_do_not_leak() {
        let result = run(indoc! {"
            IN x = 1;
            if x then
                IN x = 2;
                IN inner = x;
                output inner;
            end
            output x;
        "})
        .expect("run failed");

        assert_eq!(result.output, vec!["2", "1"]);
        assert!(!result.variables.contains_key("inner"));
    }

    #[test]
    fn while_loop_updates_outer_variable() {
        let result = run(indoc! {"
            IN n = 0;
            IN total = 0;
            while n < 4 {
                total = total + n;
                n = n + 1;
            }
            output total;
        "})
        .expect("run failed");

        assert_eq!(result.output, vec!["6"]);
        assert_eq!(variable(&result, "n"), Value::Int(4));
    }

    #[test]
    fn for_loop_counter_is_scoped_to_the_loop() {
        let result = run(indoc! {"
            IN total = 0;
            for (IN i = 0; i < 3; i = i + 1;) {
                total = total + i;
            }
            output total;
        "})
        .expect("run failed");

        assert_eq!(result.output, vec!["3"]);
        assert!(!result.variables.contains_key("i"));
    }

    #[test]
    fn arrays_start_with_defaults() {
        let result = run(indoc! {"
            IN values[3];
            values[1] = 7;
            output values;
            output values[1] + values[0];
        "})
        .expect("run failed");

        assert_eq!(result.output, vec!["[0, 7, 0]", "7"]);
    }

    #[test]
    fn array_bounds_are_checked() {
        let err = run("IN values[2]; values[2] = 1;").expect_err("expected bounds error");
        assert_eq!(
            err,
            InterpreterError::IndexOutOfBounds {
                name: "values".to_string(),
                index: 2,
                len: 2,
            }
        );
        assert!(matches!(
            run("IN n = 1; output n[0];"),
            Err(InterpreterError::NotAnArray { .. })
        ));
        assert!(matches!(
            run(r#"IN values[2]; output values["0"];"#),
            Err(InterpreterError::InvalidIndex { found: "str" })
        ));
    }

    #[test]
    fn calls_hoisted_functions() {
        let result = run(indoc! {"
            IN r = square(4);
            function square(IN n) IN {
                return n * n;
            }
            output r;
        "})
        .expect("run failed");

        assert_eq!(result.output, vec!["16"]);
    }

    #[test]
    fn recursion_works() {
        let lines = output(indoc! {"
            function fact(IN n) IN {
                if n <= 1 then
                    return 1;
                end
                return n * fact(n - 1);
            }
            output fact(10);
        "});
        assert_eq!(lines, vec!["3628800"]);
    }

    #[test]
    fn functions_see_globals_but_not_caller_locals() {
        let source = indoc! {"
            IN base = 100;
            function peek() IN {
                return base + hidden;
            }
            if YES then
                IN hidden = 1;
                output peek();
            end
        "};
        let err = run(source).expect_err("expected resolution error");
        assert_eq!(
            err,
            InterpreterError::NotDefined {
                name: "hidden".to_string()
            }
        );
    }

    #[test]
    fn checks_arity_and_parameter_types() {
        let source = "function f(IN n) IN { return n; }";
        assert!(matches!(
            run(&format!("{source} output f(1, 2);")),
            Err(InterpreterError::ArityMismatch {
                expected: 1,
                found: 2,
                ..
            })
        ));
        assert!(matches!(
            run(&format!(r#"{source} output f("x");"#)),
            Err(InterpreterError::TypeMismatch { ref name, expected: TypeTag::In }) if name == "n"
        ));
    }

    #[test]
    fn checks_return_type() {
        let err = run(r#"function f() IN { return "no"; } output f();"#)
            .expect_err("expected type error");
        assert_eq!(
            err,
            InterpreterError::ReturnTypeMismatch {
                function: "f".to_string(),
                expected: TypeTag::In,
                found: "str",
            }
        );
    }

    #[test]
    fn falling_off_a_function_yields_none() {
        let lines = output(indoc! {r#"
            function greet(STR who) STR {
                output "hi " + who;
            }
            output greet("bob");
        "#});
        assert_eq!(lines, vec!["hi bob", "None"]);
    }

    #[test]
    fn unknown_function_fails() {
        assert_eq!(
            run("missing();").expect_err("expected error"),
            InterpreterError::UndefinedFunction {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn duplicate_function_fails() {
        let err = run("function f() IN { return 1; } function f() IN { return 2; }")
            .expect_err("expected declaration error");
        assert!(matches!(
            err,
            InterpreterError::Declaration(SymbolError::DuplicateDeclaration { .. })
        ));
    }

    #[test]
    fn return_at_program_level_fails() {
        assert_eq!(
            run("return 1;").expect_err("expected error"),
            InterpreterError::ReturnOutsideFunction
        );
    }

    #[test]
    fn runaway_recursion_hits_the_depth_limit() {
        let program = parse("function f(IN n) IN { return f(n + 1); } output f(0);")
            .expect("parse failed");
        let interpreter = Interpreter::with_config(InterpreterConfig { max_call_depth: 16 });
        assert_eq!(
            interpreter.interpret(&program),
            Err(InterpreterError::CallDepthExceeded { limit: 16 })
        );
    }

    #[test]
    fn operand_errors_surface() {
        assert_eq!(
            run("IN a = 1 / 0;").expect_err("expected error"),
            InterpreterError::Value(ValueError::DivisionByZero)
        );
        assert!(matches!(
            run(r#"output "a" > 1;"#),
            Err(InterpreterError::Value(ValueError::IncompatibleOperands { .. }))
        ));
    }

    #[test]
    fn runs_through_backend_trait() {
        let program = parse("output 1; output 2.5; output NO;").expect("parse failed");
        let output = Interpreter::new().run(&program).expect("run failed");
        assert_eq!(output, "1\n2.5\nFalse");
    }

    fn on_small_stack<T: Send + 'static>(job: impl FnOnce() -> T + Send + 'static) -> T {
        std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(job)
            .expect("spawn failed")
            .join()
            .expect("interpreter thread panicked")
    }

    fn countdown(depth: usize) -> String {
        format!(
            "function f(IN n) IN {{ if n <= 0 then return 0; end return 1 + f(n - 1); }} output f({depth});"
        )
    }

    #[test]
    fn default_call_depth_fits_a_small_stack() {
        let below = on_small_stack(|| run(&countdown(DEFAULT_MAX_CALL_DEPTH - 1)));
        assert_eq!(
            below.expect("run failed").output,
            vec![(DEFAULT_MAX_CALL_DEPTH - 1).to_string()]
        );

        let above = on_small_stack(|| run(&countdown(DEFAULT_MAX_CALL_DEPTH + 1)));
        assert_eq!(
            above,
            Err(InterpreterError::CallDepthExceeded {
                limit: DEFAULT_MAX_CALL_DEPTH
            })
        );
    }

    #[test]
    fn oversized_arrays_are_rejected_before_allocation() {
        let program = Program {
            declarations: vec![Statement::ArrayDeclaration {
                ty: TypeTag::In,
                name: "huge".to_string(),
                size: usize::MAX,
            }],
        };
        assert_eq!(
            Interpreter::new().interpret(&program),
            Err(InterpreterError::Value(ValueError::ArrayTooLarge {
                len: usize::MAX
            }))
        );
    }
}
