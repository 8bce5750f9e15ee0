use anyhow::Result;

use crate::ast::Program;
use crate::backend::{Backend, PreparedBackend};

mod generator;
mod instruction;
pub mod machine;

pub use generator::{CodeGenerator, FunctionInfo, IrProgram};
pub use instruction::{Constant, Instruction, Label, Opcode, Operand, Temp, listing};
pub use machine::{Execution, Machine, MachineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Print the generated quadruples.
    Listing,
    /// Execute them on the reference machine.
    Machine,
}

/// Backend over the three-address IR.
#[derive(Debug, Clone, Copy)]
pub struct IrBackend {
    mode: Mode,
}

impl IrBackend {
    pub fn listing() -> Self {
        Self {
            mode: Mode::Listing,
        }
    }

    pub fn machine() -> Self {
        Self {
            mode: Mode::Machine,
        }
    }
}

/// Generated unit, ready to list or execute.
pub struct PreparedIr {
    unit: IrProgram,
    mode: Mode,
}

impl PreparedBackend for PreparedIr {
    fn run(&self) -> Result<String> {
        match self.mode {
            Mode::Listing => Ok(listing(&self.unit.instructions)),
            Mode::Machine => {
                let execution = Machine::new(&self.unit).run()?;
                Ok(execution.output.join("\n"))
            }
        }
    }
}

impl Backend for IrBackend {
    fn name(&self) -> &'static str {
        match self.mode {
            Mode::Listing => "ir",
            Mode::Machine => "ir-vm",
        }
    }

    fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedBackend>> {
        Ok(Box::new(PreparedIr {
            unit: CodeGenerator::new().generate_unit(program),
            mode: self.mode,
        }))
    }
}
