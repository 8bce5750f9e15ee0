use anyhow::Result;

use crate::ast::Program;

pub mod interpreter;
pub mod ir;

/// Executable artifact produced by a backend `prepare` step.
///
/// This keeps translation and execution separated so benchmarks and tests can
/// measure/validate prepare-vs-run phases independently.
pub trait PreparedBackend {
    fn run(&self) -> Result<String>;
}

/// Common interface implemented by each execution backend.
///
/// `run` returns the program's output lines joined with `\n`.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedBackend>>;

    fn run(&self, program: &Program) -> Result<String> {
        self.prepare(program)?.run()
    }
}

pub fn backends() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(interpreter::Interpreter::new()),
        Box::new(ir::IrBackend::listing()),
        Box::new(ir::IrBackend::machine()),
    ]
}

/// Looks a backend up by its CLI name.
pub fn backend_by_name(name: &str) -> Option<Box<dyn Backend>> {
    backends().into_iter().find(|backend| backend.name() == name)
}
