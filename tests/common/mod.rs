#![allow(dead_code)]

pub mod machine;

use machine::{Execution, Machine};
use secdc::{Pipeline, error::CompileError, frontend::SourceFile};

pub fn source(text: &str) -> SourceFile {
    SourceFile::from_memory(text)
}

/// Compiles and runs a program, panicking on compile or machine errors
pub fn execute(text: &str) -> Execution {
    let program = match Pipeline::build(&source(text)) {
        Ok(program) => program,
        Err(error) => panic!("failed to compile:\n{text}\n{error}"),
    };

    Machine::new(&program)
        .run()
        .unwrap_or_else(|error| panic!("machine error: {error}"))
}

pub fn compile_error(text: &str) -> CompileError {
    match Pipeline::build(&source(text)) {
        Ok(_) => panic!("expected a compile error for:\n{text}"),
        Err(error) => error,
    }
}
