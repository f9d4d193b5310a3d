//! Generation of SECD instruction blocks from an index-resolved tree.

use itertools::Itertools;
use tracing::debug;

use super::instruction::{Block, BranchKind, Instruction, Label};
use crate::{
    error::{CompileResult, located_error},
    index::{IndexVec, simple_index},
    middle::fresh::NameSupply,
    tree::{
        Node, NodeKind,
        visit::{Visitor, walk},
    },
};

simple_index! {
    /// A code block of a generated program
    pub struct BlockId;
}

impl BlockId {
    pub const MAIN: BlockId = BlockId(0);
}

/// Every block of a compiled program, `main` first
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub blocks: IndexVec<BlockId, Block>,
}

impl Program {
    pub fn main(&self) -> &Block {
        &self.blocks[BlockId::MAIN]
    }

    pub fn block(&self, label: &Label) -> Option<&Block> {
        self.blocks.iter().find(|block| &block.label == label)
    }
}

#[derive(Debug)]
pub struct CodeGenerator {
    labels: NameSupply,
    blocks: IndexVec<BlockId, Block>,
}

impl CodeGenerator {
    /// Generates the program for a tree with every variable resolved to an
    /// index
    #[tracing::instrument(skip_all)]
    pub fn generate(tree: &Node) -> CompileResult<Program> {
        let mut generator = Self {
            labels: NameSupply::new(),
            blocks: IndexVec::new(),
        };

        // Reserve the first slot so main comes first no matter how many
        // blocks its body creates
        let main = generator.blocks.push(Block::new(Label::new("main"), vec![]));
        debug_assert_eq!(main, BlockId::MAIN);

        generator.blocks[main].instructions = walk(&mut generator, tree)?;

        debug!(blocks = generator.blocks.len(), "generated code");

        Ok(Program {
            blocks: generator.blocks,
        })
    }

    fn new_label(&mut self, prefix: &str) -> Label {
        Label::new(self.labels.label(prefix))
    }

    /// Adds a block that runs `instructions` and returns to its caller
    fn new_block(&mut self, prefix: &str, mut instructions: Vec<Instruction>) -> Label {
        let label = self.new_label(prefix);
        instructions.push(Instruction::Return);
        self.blocks.push(Block::new(label.clone(), instructions));
        label
    }
}

impl Visitor for CodeGenerator {
    type Output = CompileResult<Vec<Instruction>>;

    fn combine(
        &mut self,
        node: &Node,
        children: Vec<CompileResult<Vec<Instruction>>>,
    ) -> CompileResult<Vec<Instruction>> {
        let mut children = children
            .into_iter()
            .collect::<CompileResult<Vec<_>>>()?
            .into_iter();
        let mut next = || children.next().unwrap_or_default();

        let instructions = match &node.kind {
            NodeKind::Top { .. } => {
                let mut instructions = next();
                instructions.push(Instruction::Halt);
                instructions
            }
            NodeKind::Literal(literal) => vec![Instruction::Const(literal.machine_value())],
            NodeKind::IndexedVariable { depth, sibling } => {
                let mut instructions = vec![Instruction::Access(*depth)];
                if let Some(sibling) = sibling {
                    instructions.push(Instruction::Focus(*sibling));
                }
                instructions
            }
            NodeKind::Builtin(builtin) => vec![Instruction::Builtin(*builtin)],
            NodeKind::Application { .. } => {
                let mut instructions = next();
                instructions.extend(next());
                instructions.push(Instruction::Apply);
                instructions
            }
            NodeKind::Lambda { .. } => {
                let body = next();
                vec![Instruction::Closure(self.new_block("lam", body))]
            }
            NodeKind::Let { .. } => {
                let value = next();
                let body = next();

                let mut instructions = vec![Instruction::Closure(self.new_block("let", body))];
                instructions.extend(value);
                instructions.push(Instruction::Apply);
                instructions
            }
            // The body of the arm, turned into a block by the enclosing group
            NodeKind::LetRecArm { .. } => next(),
            NodeKind::LetRec { arms, .. } => {
                let arm_bodies: Vec<_> = (0..arms.len()).map(|_| next()).collect();
                let body = next();

                let arm_labels = arm_bodies
                    .into_iter()
                    .map(|arm_body| self.new_block("clos", arm_body))
                    .collect();
                let body_label = self.new_block("letrec", body);

                vec![
                    Instruction::Closure(body_label),
                    Instruction::Closures(arm_labels),
                    Instruction::Apply,
                ]
            }
            NodeKind::Sequence { statements } => {
                let statements: Vec<_> = statements.iter().map(|_| next()).collect();
                Itertools::intersperse(statements.into_iter(), vec![Instruction::Pop(1)])
                    .flatten()
                    .collect()
            }
            NodeKind::Conditional { .. } => {
                let condition = next();
                let then_branch = next();
                let else_branch = next();

                let then_label = self.new_label("tr");
                let else_label = self.new_label("fl");
                let end_label = self.new_label("end");

                let mut instructions = condition;
                instructions.push(Instruction::Branch(BranchKind::Brfl, else_label.clone()));
                instructions.push(Instruction::Label(then_label));
                instructions.extend(then_branch);
                instructions.push(Instruction::Branch(BranchKind::Br, end_label.clone()));
                instructions.push(Instruction::Label(else_label));
                instructions.extend(else_branch);
                instructions.push(Instruction::Label(end_label));
                instructions
            }
            NodeKind::BinaryOp { operator, .. } => {
                let mut instructions = next();
                instructions.extend(next());
                instructions.push(Instruction::Binary(*operator));
                instructions
            }
            NodeKind::UnaryOp { operator, .. } => {
                let mut instructions = next();
                instructions.push(Instruction::Unary(*operator));
                instructions
            }
            NodeKind::VariableReference { name } => {
                return Err(located_error!(
                    UnboundNameError,
                    node.position,
                    "`{name}` was never resolved to an environment index"
                ));
            }
            NodeKind::Tuple { .. }
            | NodeKind::Projection { .. }
            | NodeKind::Match { .. }
            | NodeKind::MatchArm { .. }
            | NodeKind::DataType { .. }
            | NodeKind::DataConstructor { .. }
            | NodeKind::PatternBinder { .. }
            | NodeKind::PatternTuple { .. }
            | NodeKind::PatternLiteral(_)
            | NodeKind::PatternConstructor { .. } => {
                return Err(located_error!(
                    SyntaxError,
                    node.position,
                    "{} should have been lowered before code generation",
                    node.tag()
                ));
            }
        };

        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        frontend::Position,
        index::Index,
        tree::{BinaryOperator, BuiltinKind, Literal},
    };

    fn at() -> Position {
        Position::new(1, 1)
    }

    fn index(depth: usize, sibling: Option<usize>) -> Node {
        Node::new(NodeKind::IndexedVariable { depth, sibling }, at())
    }

    fn labels(program: &Program) -> Vec<String> {
        program
            .blocks
            .iter()
            .map(|block| block.label.to_string())
            .collect()
    }

    #[test]
    fn test_let_compiles_to_closure_and_apply() {
        // let x = 3 in x + 4
        let tree = Node::top(Node::let_in(
            "x",
            Node::integer(3, at()),
            Node::binary(BinaryOperator::Add, index(1, None), Node::integer(4, at()), at()),
            at(),
        ));

        let program = CodeGenerator::generate(&tree).unwrap();

        assert_eq!(labels(&program), vec!["main", "let0"]);
        assert_eq!(
            program.main().instructions,
            vec![
                Instruction::Closure(Label::new("let0")),
                Instruction::Const(3),
                Instruction::Apply,
                Instruction::Halt,
            ]
        );
        assert_eq!(
            program.blocks[BlockId::new(1)].instructions,
            vec![
                Instruction::Access(1),
                Instruction::Const(4),
                Instruction::Binary(BinaryOperator::Add),
                Instruction::Return,
            ]
        );
    }

    #[test]
    fn test_main_is_first_even_with_nested_lambdas() {
        let tree = Node::top(Node::lambda(
            "x",
            Node::lambda("y", index(2, None), at()),
            at(),
        ));

        let program = CodeGenerator::generate(&tree).unwrap();

        assert_eq!(labels(&program), vec!["main", "lam0", "lam1"]);
        assert_eq!(
            program.block(&Label::new("lam1")).unwrap().instructions,
            vec![Instruction::Closure(Label::new("lam0")), Instruction::Return]
        );
    }

    #[test]
    fn test_conditional_and_sequence() {
        let tree = Node::top(Node::new(
            NodeKind::Sequence {
                statements: vec![
                    Node::application(
                        Node::builtin(BuiltinKind::Println, at()),
                        Node::integer(1, at()),
                        at(),
                    ),
                    Node::conditional(
                        Node::literal(Literal::Boolean(true), at()),
                        Node::integer(2, at()),
                        Node::integer(3, at()),
                        at(),
                    ),
                ],
            },
            at(),
        ));

        let program = CodeGenerator::generate(&tree).unwrap();

        assert_eq!(
            program.main().instructions,
            vec![
                Instruction::Builtin(BuiltinKind::Println),
                Instruction::Const(1),
                Instruction::Apply,
                Instruction::Pop(1),
                Instruction::Const(1),
                Instruction::Branch(BranchKind::Brfl, Label::new("fl0")),
                Instruction::Label(Label::new("tr0")),
                Instruction::Const(2),
                Instruction::Branch(BranchKind::Br, Label::new("end0")),
                Instruction::Label(Label::new("fl0")),
                Instruction::Const(3),
                Instruction::Label(Label::new("end0")),
                Instruction::Halt,
            ]
        );
    }

    #[test]
    fn test_letrec_group() {
        // letrec f n = f n in f 0
        let arm = Node::new(
            NodeKind::LetRecArm {
                name: "f".to_string(),
                parameter: "n".to_string(),
                parameter_annotation: None,
                result_annotation: None,
                body: Box::new(Node::application(index(2, Some(1)), index(1, None), at())),
            },
            at(),
        );
        let tree = Node::top(Node::new(
            NodeKind::LetRec {
                arms: vec![arm],
                body: Box::new(Node::application(index(1, Some(1)), Node::integer(0, at()), at())),
            },
            at(),
        ));

        let program = CodeGenerator::generate(&tree).unwrap();

        assert_eq!(labels(&program), vec!["main", "clos0", "letrec0"]);
        assert_eq!(
            program.main().instructions,
            vec![
                Instruction::Closure(Label::new("letrec0")),
                Instruction::Closures(vec![Label::new("clos0")]),
                Instruction::Apply,
                Instruction::Halt,
            ]
        );
        assert_eq!(
            program.block(&Label::new("clos0")).unwrap().instructions,
            vec![
                Instruction::Access(2),
                Instruction::Focus(1),
                Instruction::Access(1),
                Instruction::Apply,
                Instruction::Return,
            ]
        );
    }

    #[test]
    fn test_every_referenced_block_exists() {
        let tree = Node::top(Node::let_in(
            "f",
            Node::lambda("x", index(1, None), at()),
            Node::application(index(1, None), Node::integer(5, at()), at()),
            at(),
        ));

        let program = CodeGenerator::generate(&tree).unwrap();

        for block in program.blocks.iter() {
            for instruction in &block.instructions {
                for label in instruction.referenced_blocks() {
                    assert!(program.block(label).is_some(), "{label}");
                }
            }
        }
    }

    #[test]
    fn test_unresolved_reference_is_rejected() {
        let tree = Node::top(Node::variable("x", at()));
        let error = CodeGenerator::generate(&tree).unwrap_err();

        assert_eq!(error.kind, crate::error::ErrorKind::UnboundNameError);
    }

    #[test]
    fn test_surface_constructs_are_rejected() {
        let tree = Node::top(Node::tuple(vec![Node::integer(1, at())], at()));
        let error = CodeGenerator::generate(&tree).unwrap_err();

        assert_eq!(error.kind, crate::error::ErrorKind::SyntaxError);
        assert_eq!(error.message, "Tuple should have been lowered before code generation");
    }
}
