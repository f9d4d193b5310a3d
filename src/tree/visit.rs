//! Generic traversals over [`Node`] trees.
//!
//! Passes override [`Visitor::visit`] or [`Transformer::transform`], match on
//! the kinds they care about, and fall back to [`walk`] / [`walk_mut`] for
//! everything else.

use super::Node;

/// Read-only traversal computing one result per node from the results of its
/// children
pub trait Visitor: Sized {
    type Output;

    fn visit(&mut self, node: &Node) -> Self::Output {
        walk(self, node)
    }

    /// Combines the results of a node's children, in schema order
    fn combine(&mut self, node: &Node, children: Vec<Self::Output>) -> Self::Output;
}

pub fn walk<V: Visitor>(visitor: &mut V, node: &Node) -> V::Output {
    let children = node
        .children()
        .into_iter()
        .map(|child| visitor.visit(child))
        .collect();

    visitor.combine(node, children)
}

/// In-place traversal that replaces every child with the result of
/// transforming it. The context is handed unchanged to every child by
/// [`walk_mut`]; overrides extend it for the subtrees they bind names in.
pub trait Transformer: Sized {
    type Context;
    type Error;

    fn transform(&mut self, node: Node, context: &Self::Context) -> Result<Node, Self::Error> {
        walk_mut(self, node, context)
    }
}

pub fn walk_mut<T: Transformer>(
    transformer: &mut T,
    mut node: Node,
    context: &T::Context,
) -> Result<Node, T::Error> {
    for child in node.children_mut() {
        let owned = std::mem::take(child);
        *child = transformer.transform(owned, context)?;
    }

    Ok(node)
}
