use strum::Display;

use crate::tree::{BinaryOperator, BuiltinKind, UnaryOperator};

/// The name of a code block or of a branch target inside one
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl core::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum BranchKind {
    /// Unconditional
    Br,
    /// Pops the top of the stack and branches if it is zero
    Brfl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Stops the machine; the result is the top of the stack
    Halt,
    /// Discards the given number of stack entries
    Pop(usize),
    /// Pops an argument and a closure and enters the closure's block
    Apply,
    Const(i64),
    /// Pushes the environment entry at the given 1-based depth
    Access(usize),
    /// Pops a closure group and pushes its member at the given 1-based index
    Focus(usize),
    /// Leaves the current block, restoring the caller's environment
    Return,
    Closure(Label),
    /// Pushes a group of mutually recursive closures sharing one environment
    Closures(Vec<Label>),
    Builtin(BuiltinKind),
    Binary(BinaryOperator),
    Unary(UnaryOperator),
    Branch(BranchKind, Label),
    Label(Label),
}

impl Instruction {
    /// The machine's name for the operation, shared by both output formats
    pub fn opcode(&self) -> &'static str {
        match self {
            Instruction::Halt => "halt",
            Instruction::Pop(_) => "pop",
            Instruction::Apply => "apply",
            Instruction::Const(_) => "const",
            Instruction::Access(_) => "access",
            Instruction::Focus(_) => "focus",
            Instruction::Return => "return",
            Instruction::Closure(_) => "closure",
            Instruction::Closures(_) => "closures",
            Instruction::Builtin(_) => "builtin",
            Instruction::Binary(_) => "binary",
            Instruction::Unary(_) => "unary",
            Instruction::Branch(..) => "branch",
            Instruction::Label(_) => "label",
        }
    }

    /// Labels of the blocks this instruction builds closures over
    pub fn referenced_blocks(&self) -> Vec<&Label> {
        match self {
            Instruction::Closure(label) => vec![label],
            Instruction::Closures(labels) => labels.iter().collect(),
            _ => vec![],
        }
    }
}

/// A straight-line sequence of instructions entered only from its start.
/// Every block ends in `return` or `halt`; control never falls through into
/// the next block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub label: Label,
    pub instructions: Vec<Instruction>,
}

impl Block {
    pub fn new(label: Label, instructions: Vec<Instruction>) -> Self {
        Self {
            label,
            instructions,
        }
    }
}
