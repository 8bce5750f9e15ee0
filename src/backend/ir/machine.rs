//! Reference executor for generated quadruples.
//!
//! Variables live in one flat global map plus a local map per call; the IR
//! carries no block scopes. Declared types are not checked at this level.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::backend::interpreter::DEFAULT_MAX_CALL_DEPTH;
use crate::value::{Value, ValueError};

use super::generator::IrProgram;
use super::instruction::{Instruction, Label, Opcode, Operand, Temp};

type MachineResult<T> = std::result::Result<T, MachineError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("Variable '{name}' is not defined")]
    NotDefined { name: String },
    #[error("Temporary {temp} read before it was written")]
    UnsetTemp { temp: Temp },
    #[error("Function '{name}' is not defined")]
    UndefinedFunction { name: String },
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Unknown label {label}")]
    UnknownLabel { label: Label },
    #[error("'{name}' is not an array")]
    NotAnArray { name: String },
    #[error("Array index must be an integer, got {found}")]
    InvalidIndex { found: &'static str },
    #[error("Index {index} out of bounds for array '{name}' of length {len}")]
    IndexOutOfBounds { name: String, index: i64, len: usize },
    #[error("Malformed {opcode} instruction at {index}")]
    Malformed { opcode: Opcode, index: usize },
    #[error("Maximum call depth of {limit} exceeded")]
    CallDepthExceeded { limit: usize },
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Output and final globals of a machine run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub output: Vec<String>,
    pub variables: IndexMap<String, Value>,
}

/// Per-activation state. `locals` is `None` for straight-line program code.
struct Frame {
    temps: HashMap<Temp, Value>,
    locals: Option<HashMap<String, Value>>,
}

impl Frame {
    fn top_level() -> Self {
        Self {
            temps: HashMap::new(),
            locals: None,
        }
    }

    fn call(locals: HashMap<String, Value>) -> Self {
        Self {
            temps: HashMap::new(),
            locals: Some(locals),
        }
    }

    fn read(&self, temp: Temp) -> MachineResult<Value> {
        self.temps
            .get(&temp)
            .cloned()
            .ok_or(MachineError::UnsetTemp { temp })
    }
}

pub struct Machine<'p> {
    program: &'p IrProgram,
    labels: HashMap<Label, usize>,
    /// Function entry index to the index just past its body.
    bodies: HashMap<usize, usize>,
    globals: IndexMap<String, Value>,
    output: Vec<String>,
    depth: usize,
    max_call_depth: usize,
}

impl<'p> Machine<'p> {
    pub fn new(program: &'p IrProgram) -> Self {
        let labels = program
            .instructions
            .iter()
            .enumerate()
            .filter(|(_, instruction)| instruction.opcode == Opcode::Label)
            .filter_map(|(index, instruction)| Some((instruction.arg1.as_label()?, index)))
            .collect();
        let bodies = program
            .functions
            .values()
            .map(|function| (function.entry, function.end))
            .collect();
        Self {
            program,
            labels,
            bodies,
            globals: IndexMap::new(),
            output: Vec::new(),
            depth: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn run(mut self) -> MachineResult<Execution> {
        let mut frame = Frame::top_level();
        self.execute(0, &mut frame)?;
        debug!(lines = self.output.len(), "ir machine finished");
        Ok(Execution {
            output: self.output,
            variables: self.globals,
        })
    }

    /// Runs from `start` until a `RETURN` inside a call, or the end of the
    /// stream. Function bodies met along the way are stepped over.
    fn execute(&mut self, start: usize, frame: &mut Frame) -> MachineResult<Value> {
        let program = self.program;
        let instructions = &program.instructions;
        let mut pc = start;
        while let Some(instruction) = instructions.get(pc) {
            // A call starts on its own entry label; everything else skips bodies.
            if (pc != start || frame.locals.is_none())
                && let Some(&end) = self.bodies.get(&pc)
            {
                pc = end;
                continue;
            }
            trace!(pc, %instruction, "step");
            pc += 1;
            match self.step(pc - 1, instruction, frame)? {
                Flow::Next => {}
                Flow::Jump(target) => pc = target,
                Flow::Return(value) => {
                    if frame.locals.is_some() {
                        return Ok(value.unwrap_or(Value::None));
                    }
                    if let Some(value) = value {
                        self.output.push(value.to_output());
                    }
                }
            }
        }
        Ok(Value::None)
    }

    fn step(
        &mut self,
        pc: usize,
        instruction: &'p Instruction,
        frame: &mut Frame,
    ) -> MachineResult<Flow> {
        let opcode = instruction.opcode;
        let malformed = || MachineError::Malformed { opcode, index: pc };
        let temp = |operand: &Operand| operand.as_temp().ok_or_else(malformed);
        let name = |operand: &'p Operand| operand.as_name().ok_or_else(malformed);

        match opcode {
            Opcode::Label => {}
            Opcode::Jump => {
                let label = instruction.arg1.as_label().ok_or_else(malformed)?;
                return Ok(Flow::Jump(self.resolve(label)?));
            }
            Opcode::JumpIf => {
                // Taken when the condition is false: the generator places the
                // fall-through branch first.
                let condition = frame.read(temp(&instruction.arg1)?)?;
                let label = instruction.arg2.as_label().ok_or_else(malformed)?;
                if !condition.is_truthy() {
                    return Ok(Flow::Jump(self.resolve(label)?));
                }
            }
            Opcode::LoadConst => {
                let Operand::Const(constant) = &instruction.arg1 else {
                    return Err(malformed());
                };
                frame
                    .temps
                    .insert(temp(&instruction.result)?, Value::from(constant));
            }
            Opcode::Load => {
                let value = self.load(frame, name(&instruction.arg1)?)?;
                frame.temps.insert(temp(&instruction.result)?, value);
            }
            Opcode::ArrayAccess => {
                let array = name(&instruction.arg1)?;
                let index = as_index(&frame.read(temp(&instruction.arg2)?)?)?;
                let Value::Array(items) = self.load(frame, array)? else {
                    return Err(MachineError::NotAnArray {
                        name: array.to_string(),
                    });
                };
                let slot = checked_slot(array, index, items.len())?;
                frame
                    .temps
                    .insert(temp(&instruction.result)?, items[slot].clone());
            }
            Opcode::Assign => {
                let value = frame.read(temp(&instruction.arg1)?)?;
                let target = name(&instruction.result)?;
                if instruction.arg2.is_none() {
                    self.store(frame, target, value);
                } else {
                    let index = as_index(&frame.read(temp(&instruction.arg2)?)?)?;
                    let Value::Array(items) = self.slot_mut(frame, target)? else {
                        return Err(MachineError::NotAnArray {
                            name: target.to_string(),
                        });
                    };
                    let slot = checked_slot(target, index, items.len())?;
                    items[slot] = value;
                }
            }
            Opcode::Declare => {
                let target = name(&instruction.arg1)?;
                let Operand::Type(tag) = instruction.arg2 else {
                    return Err(malformed());
                };
                let value = match &instruction.result {
                    Operand::None => Value::default_for(tag),
                    Operand::Const(size) => match Value::from(size) {
                        Value::Int(size) => {
                            let len = usize::try_from(size).map_err(|_| malformed())?;
                            Value::array_of(tag, len)?
                        }
                        _ => return Err(malformed()),
                    },
                    _ => return Err(malformed()),
                };
                self.store(frame, target, value);
            }
            Opcode::Call => {
                let function = name(&instruction.arg1)?;
                let Operand::Args(args) = &instruction.arg2 else {
                    return Err(malformed());
                };
                let args = args
                    .iter()
                    .map(|arg| frame.read(*arg))
                    .collect::<MachineResult<Vec<_>>>()?;
                let value = self.call(function, args)?;
                frame.temps.insert(temp(&instruction.result)?, value);
            }
            Opcode::Return => {
                let value = match &instruction.arg1 {
                    Operand::None => None,
                    operand => Some(frame.read(temp(operand)?)?),
                };
                return Ok(Flow::Return(value));
            }
            Opcode::Plus
            | Opcode::Minus
            | Opcode::Multiply
            | Opcode::Divide
            | Opcode::Gt
            | Opcode::Lt
            | Opcode::Gte
            | Opcode::Lte
            | Opcode::Equals
            | Opcode::NotEquals => {
                let op = opcode.operator().ok_or_else(malformed)?;
                let left = frame.read(temp(&instruction.arg1)?)?;
                let right = frame.read(temp(&instruction.arg2)?)?;
                frame
                    .temps
                    .insert(temp(&instruction.result)?, left.binary_op(op, &right)?);
            }
        }
        Ok(Flow::Next)
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> MachineResult<Value> {
        let program = self.program;
        let function =
            program
                .functions
                .get(name)
                .ok_or_else(|| MachineError::UndefinedFunction {
                    name: name.to_string(),
                })?;
        if args.len() != function.params.len() {
            return Err(MachineError::ArityMismatch {
                name: name.to_string(),
                expected: function.params.len(),
                found: args.len(),
            });
        }
        if self.depth >= self.max_call_depth {
            return Err(MachineError::CallDepthExceeded {
                limit: self.max_call_depth,
            });
        }

        let locals = function.params.iter().cloned().zip(args).collect();
        let mut frame = Frame::call(locals);
        self.depth += 1;
        let result = self.execute(function.entry, &mut frame);
        self.depth -= 1;
        result
    }

    fn resolve(&self, label: Label) -> MachineResult<usize> {
        self.labels
            .get(&label)
            .copied()
            .ok_or(MachineError::UnknownLabel { label })
    }

    fn load(&self, frame: &Frame, name: &str) -> MachineResult<Value> {
        frame
            .locals
            .as_ref()
            .and_then(|locals| locals.get(name))
            .or_else(|| self.globals.get(name))
            .cloned()
            .ok_or_else(|| MachineError::NotDefined {
                name: name.to_string(),
            })
    }

    /// Writes to an existing local, then an existing global, else creates the
    /// name in the innermost map.
    fn store(&mut self, frame: &mut Frame, name: &str, value: Value) {
        match frame.locals.as_mut() {
            Some(locals) if locals.contains_key(name) || !self.globals.contains_key(name) => {
                locals.insert(name.to_string(), value);
            }
            _ => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn slot_mut<'f>(
        &'f mut self,
        frame: &'f mut Frame,
        name: &str,
    ) -> MachineResult<&'f mut Value> {
        let local = frame.locals.as_mut().and_then(|locals| locals.get_mut(name));
        local
            .or_else(|| self.globals.get_mut(name))
            .ok_or_else(|| MachineError::NotDefined {
                name: name.to_string(),
            })
    }
}

enum Flow {
    Next,
    Jump(usize),
    Return(Option<Value>),
}

fn as_index(value: &Value) -> MachineResult<i64> {
    value.as_index().ok_or(MachineError::InvalidIndex {
        found: value.type_name(),
    })
}

fn checked_slot(name: &str, index: i64, len: usize) -> MachineResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|slot| *slot < len)
        .ok_or_else(|| MachineError::IndexOutOfBounds {
            name: name.to_string(),
            index,
            len,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeTag;
    use crate::backend::ir::CodeGenerator;
    use crate::backend::ir::Constant;
    use crate::parser::parse;
    use indoc::indoc;

    fn execute(source: &str) -> MachineResult<Execution> {
        let program = parse(source).expect("parse failed");
        let unit = CodeGenerator::new().generate_unit(&program);
        Machine::new(&unit).run()
    }

    #[test]
    fn runs_straight_line_code() {
        let execution = execute("IN a = 5; IN b = 10; IN sum = a + b; output sum;")
            .expect("run failed");
        assert_eq!(execution.output, vec!["15"]);
        assert_eq!(execution.variables.get("sum"), Some(&Value::Int(15)));
    }

    #[test]
    fn jumpif_skips_the_then_branch_on_false() {
        let source = indoc! {r#"
            IN age = 12;
            if age >= 18 then
                output "Majeur";
            else
                output "Mineur";
            end
        "#};
        assert_eq!(execute(source).expect("run failed").output, vec!["Mineur"]);
    }

    #[test]
    fn steps_over_function_bodies() {
        let source = indoc! {"
            function twice(IN n) IN {
                return n * 2;
            }
            output twice(21);
        "};
        assert_eq!(execute(source).expect("run failed").output, vec!["42"]);
    }

    #[test]
    fn recursive_calls_keep_separate_temporaries() {
        let source = indoc! {"
            function fib(IN n) IN {
                if n < 2 then
                    return n;
                end
                return fib(n - 1) + fib(n - 2);
            }
            output fib(10);
        "};
        assert_eq!(execute(source).expect("run failed").output, vec!["55"]);
    }

    #[test]
    fn assignment_inside_a_call_updates_globals() {
        let source = indoc! {"
            IN counter = 0;
            function bump() IN {
                counter = counter + 1;
                IN scratch = 5;
                return counter;
            }
            bump();
            bump();
        "};
        let execution = execute(source).expect("run failed");
        assert_eq!(execution.variables.get("counter"), Some(&Value::Int(2)));
        assert!(!execution.variables.contains_key("scratch"));
    }

    #[test]
    fn arrays_round_trip_through_memory() {
        let source = indoc! {"
            IN v[3];
            for (IN i = 0; i < 3; i = i + 1;) {
                v[i] = i * i;
            }
            output v;
        "};
        assert_eq!(execute(source).expect("run failed").output, vec!["[0, 1, 4]"]);
    }

    #[test]
    fn reports_runtime_errors() {
        assert_eq!(
            execute("output z;"),
            Err(MachineError::NotDefined {
                name: "z".to_string()
            })
        );
        assert_eq!(
            execute("IN v[1]; v[3] = 1;"),
            Err(MachineError::IndexOutOfBounds {
                name: "v".to_string(),
                index: 3,
                len: 1,
            })
        );
        assert_eq!(
            execute("missing();"),
            Err(MachineError::UndefinedFunction {
                name: "missing".to_string()
            })
        );
        assert_eq!(
            execute("IN x = 1 / 0;"),
            Err(MachineError::Value(ValueError::DivisionByZero))
        );
    }

    #[test]
    fn bounds_call_depth() {
        let program = parse("function f() IN { return f(); } f();").expect("parse failed");
        let unit = CodeGenerator::new().generate_unit(&program);
        assert_eq!(
            Machine::new(&unit).with_max_call_depth(8).run(),
            Err(MachineError::CallDepthExceeded { limit: 8 })
        );
    }

    #[test]
    fn rejects_malformed_instructions() {
        let unit = IrProgram {
            instructions: vec![Instruction::new(
                Opcode::Jump,
                Operand::None,
                Operand::None,
                Operand::None,
            )],
            functions: IndexMap::new(),
        };
        assert_eq!(
            Machine::new(&unit).run(),
            Err(MachineError::Malformed {
                opcode: Opcode::Jump,
                index: 0
            })
        );
    }

    #[test]
    fn bare_return_yields_none_to_the_caller() {
        let source = indoc! {"
            function noop() IN {
                return;
            }
            TAB result = noop();
            output result;
        "};
        let execution = execute(source).expect("run failed");
        assert_eq!(execution.output, vec!["None"]);
        assert_eq!(execution.variables.get("result"), Some(&Value::None));
    }

    fn countdown_on_small_stack(depth: usize) -> MachineResult<Execution> {
        std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || {
                execute(&format!(
                    "function f(IN n) IN {{ if n <= 0 then return 0; end return 1 + f(n - 1); }} output f({depth});"
                ))
            })
            .expect("spawn failed")
            .join()
            .expect("machine thread panicked")
    }

    #[test]
    fn default_call_depth_fits_a_small_stack() {
        let below = countdown_on_small_stack(DEFAULT_MAX_CALL_DEPTH - 1).expect("run failed");
        assert_eq!(below.output, vec![(DEFAULT_MAX_CALL_DEPTH - 1).to_string()]);
        assert_eq!(
            countdown_on_small_stack(DEFAULT_MAX_CALL_DEPTH + 1),
            Err(MachineError::CallDepthExceeded {
                limit: DEFAULT_MAX_CALL_DEPTH
            })
        );
    }

    #[test]
    fn oversized_array_declarations_fail_cleanly() {
        let unit = IrProgram {
            instructions: vec![Instruction::new(
                Opcode::Declare,
                Operand::Name("huge".to_string()),
                Operand::Type(TypeTag::In),
                Operand::Const(Constant::Int(i64::MAX)),
            )],
            functions: IndexMap::new(),
        };
        assert!(matches!(
            Machine::new(&unit).run(),
            Err(MachineError::Value(ValueError::ArrayTooLarge { .. }))
        ));
    }
}
