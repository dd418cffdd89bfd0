use anyhow::Result;

use crate::ast::Program;

/// Executable artifact produced by a backend `prepare` step.
///
/// Keeping compilation and execution separated lets tests and benches
/// measure/validate prepare-vs-run phases independently.
pub trait PreparedBackend {
    fn run(&self) -> Result<String>;
}

/// Common interface implemented by each execution backend.
///
/// `prepare` translates the AST into backend-owned executable state, while
/// `run` offers the convenience path for one-shot execution. Both backends
/// report program output as a string of newline-separated lines.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedBackend>>;

    fn run(&self, program: &Program) -> Result<String> {
        self.prepare(program)?.run()
    }
}

pub fn backends() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(crate::interpreter::Interpreter::new()),
        Box::new(crate::compiler::Compiler::new()),
    ]
}
