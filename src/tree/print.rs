use colored::Colorize;
use itertools::Itertools;

use super::{
    FieldRef, Node,
    visit::{Visitor, walk},
};

/// Renders a tree one node per line, children indented under their parent.
/// Leaf fields are printed inline and the inferred type, when present, after
/// a colon.
#[derive(Debug, Default)]
pub struct IndentedPrinter;

impl IndentedPrinter {
    pub fn print(node: &Node) -> String {
        let mut lines = walk(&mut IndentedPrinter, node);
        lines.push(String::new());
        lines.join("\n")
    }
}

impl Visitor for IndentedPrinter {
    type Output = Vec<String>;

    fn combine(&mut self, node: &Node, children: Vec<Vec<String>>) -> Vec<String> {
        let leaves = node
            .fields()
            .into_iter()
            .filter_map(|(name, field)| match field {
                FieldRef::Leaf(value) => Some(format!("{}={}", name.dimmed(), value)),
                _ => None,
            })
            .join(" ");

        let mut header = node.tag().to_string().cyan().to_string();
        if !leaves.is_empty() {
            header.push(' ');
            header.push_str(&leaves);
        }
        if let Some(ty) = &node.ty {
            header.push_str(&format!(" : {}", ty.to_string().yellow()));
        }

        std::iter::once(header)
            .chain(
                children
                    .into_iter()
                    .flatten()
                    .map(|line| format!("{}{line}", "|   ".dimmed())),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        frontend::Position,
        middle::ty::Type,
        tree::{BinaryOperator, NodeKind},
    };

    #[test]
    fn test_print_nested_tree() {
        colored::control::set_override(false);

        let p = Position::new(1, 1);
        let mut sum = Node::binary(BinaryOperator::Add, Node::variable("x", p), Node::integer(4, p), p);
        sum.ty = Some(Type::int());

        let tree = Node::top(Node::new(
            NodeKind::Let {
                name: "x".to_string(),
                annotation: None,
                value: Box::new(Node::integer(3, p)),
                body: Box::new(sum),
            },
            p,
        ));

        assert_eq!(
            IndentedPrinter::print(&tree),
            indoc! {"
                Top
                |   Let name=x annotation=_
                |   |   Literal value=3
                |   |   BinaryOp operator=+ : int
                |   |   |   VariableReference name=x
                |   |   |   Literal value=4
            "}
        );
    }
}
