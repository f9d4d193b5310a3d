//! The backend turns an index-resolved tree into blocks of SECD machine
//! instructions and renders them as an assembly listing or as C source
//! calling into the host runtime.

pub mod codegen;
pub mod emit;
pub mod instruction;
