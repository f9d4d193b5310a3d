//! Names are resolved, types are inferred and checked, and the typed tree is
//! lowered step by step until only lambdas, applications, lets and indexed
//! variables remain for the code generator.

pub mod debruijn;
pub mod fresh;
pub mod namer;
pub mod patmat;
pub mod scope;
pub mod ty;
pub mod typer;
pub mod unify;
