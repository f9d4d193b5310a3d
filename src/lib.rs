//! `secdc` compiles a small ML-family language to closure-based SECD machine
//! code.
//!
//! The passes run in a fixed order, each consuming the tree the previous one
//! produced:
//!
//! 1. [`Namer`] renames every binder so names are globally unique and
//!    numbers data constructors.
//! 2. [`Typer`] assigns a type to every node and collects equality
//!    constraints.
//! 3. [`Unifier`] solves the constraints and writes the final types back.
//! 4. [`PatternCompiler`] lowers data declarations, `match`, tuples and
//!    projections to plain lambda calculus.
//! 5. [`IndexResolver`] replaces names by environment indices.
//! 6. [`CodeGenerator`] emits instruction blocks, which an
//!    [`Emitter`](backend::emit::Emitter) renders as text.

use clap::ValueEnum;
use itertools::Itertools;
use strum::{Display, EnumIter, EnumString};

use crate::{
    backend::{
        codegen::{CodeGenerator, Program},
        emit::EmitFormat,
    },
    error::CompileResult,
    frontend::{SourceFile, parser::Parser},
    middle::{
        debruijn::IndexResolver,
        namer::Namer,
        patmat::PatternCompiler,
        typer::{Typer, Typing},
        unify::Unifier,
    },
    tree::{Node, print::IndentedPrinter},
};

pub mod backend;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;
pub mod tree;

/// A pass after which compilation can stop and print what it produced
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter, ValueEnum,
)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Namer,
    Typer,
    Unify,
    Patmat,
    Debruijn,
    /// The last pass; stopping here is the same as a full compile
    Codegen,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub stop_after: Option<Stage>,
    pub format: EmitFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// The tree printed after an intermediate stage
    Dump { stage: Stage, text: String },
    /// The emitted program
    Program(String),
}

impl Output {
    pub fn text(&self) -> &str {
        match self {
            Output::Dump { text, .. } | Output::Program(text) => text,
        }
    }
}

/// The individual compilation steps, in the order [`compile`] runs them
pub struct Pipeline;

impl Pipeline {
    pub fn parse(source: &SourceFile) -> CompileResult<Node> {
        Parser::parse_program(source)
    }

    pub fn name(tree: Node) -> CompileResult<Node> {
        Namer::resolve_names(tree)
    }

    pub fn infer(tree: Node) -> CompileResult<Typing> {
        Typer::infer_program(tree)
    }

    pub fn unify(typing: Typing) -> CompileResult<Node> {
        Unifier::unify(typing)
    }

    pub fn lower_patterns(tree: Node) -> CompileResult<Node> {
        PatternCompiler::lower_patterns(tree)
    }

    pub fn resolve_indices(tree: Node) -> CompileResult<Node> {
        IndexResolver::resolve_indices(tree)
    }

    pub fn generate(tree: &Node) -> CompileResult<Program> {
        CodeGenerator::generate(tree)
    }

    /// Runs every pass and returns the generated program
    pub fn build(source: &SourceFile) -> CompileResult<Program> {
        let tree = Self::name(Self::parse(source)?)?;
        let tree = Self::unify(Self::infer(tree)?)?;
        let tree = Self::resolve_indices(Self::lower_patterns(tree)?)?;
        Self::generate(&tree)
    }
}

/// Compiles a source file, stopping early if the options ask for a stage dump
#[tracing::instrument(skip_all, fields(origin = %source.origin))]
pub fn compile(source: &SourceFile, options: &CompileOptions) -> CompileResult<Output> {
    let dump = |stage: Stage, text: String| Output::Dump { stage, text };
    let stops_after = |stage: Stage| options.stop_after == Some(stage);

    let tree = Pipeline::name(Pipeline::parse(source)?)?;
    if stops_after(Stage::Namer) {
        return Ok(dump(Stage::Namer, IndentedPrinter::print(&tree)));
    }

    let typing = Pipeline::infer(tree)?;
    if stops_after(Stage::Typer) {
        return Ok(dump(Stage::Typer, print_typing(&typing)));
    }

    let tree = Pipeline::unify(typing)?;
    if stops_after(Stage::Unify) {
        return Ok(dump(Stage::Unify, IndentedPrinter::print(&tree)));
    }

    let tree = Pipeline::lower_patterns(tree)?;
    if stops_after(Stage::Patmat) {
        return Ok(dump(Stage::Patmat, IndentedPrinter::print(&tree)));
    }

    let tree = Pipeline::resolve_indices(tree)?;
    if stops_after(Stage::Debruijn) {
        return Ok(dump(Stage::Debruijn, IndentedPrinter::print(&tree)));
    }

    let program = Pipeline::generate(&tree)?;
    Ok(Output::Program(emit_program(&program, options.format)))
}

pub fn emit_program(program: &Program, format: EmitFormat) -> String {
    format.get_emitter().emit_program(program)
}

fn print_typing(typing: &Typing) -> String {
    let constraints = typing
        .constraints
        .iter()
        .map(|constraint| format!("{} = {}", constraint.left, constraint.right))
        .join("\n");

    format!(
        "{}\nconstraints:\n{constraints}\n",
        IndentedPrinter::print(&typing.tree)
    )
}
