//! Resolution of variable names to environment indices.

use tracing::debug;

use super::scope::Scope;
use crate::{
    error::{CompileError, CompileResult, located_error},
    tree::{
        Node, NodeKind,
        visit::{Transformer, walk_mut},
    },
};

/// One entry of the runtime environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// A lambda parameter or let-bound value
    Single(String),
    /// The closures of a let-rec group, in arm order
    Group(Vec<String>),
}

#[derive(Debug, Default)]
pub struct IndexResolver {
    resolved_references: usize,
}

impl IndexResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every variable reference by its 1-based environment depth and,
    /// for let-rec bound names, its 1-based position in the group
    #[tracing::instrument(skip_all)]
    pub fn resolve_indices(tree: Node) -> CompileResult<Node> {
        let mut resolver = Self::new();
        let tree = resolver.transform(tree, &Scope::empty())?;

        debug!(
            resolved_references = resolver.resolved_references,
            "resolved indices"
        );

        Ok(tree)
    }

    fn lookup(scope: &Scope<Slot>, name: &str) -> Option<(usize, Option<usize>)> {
        scope
            .iter()
            .enumerate()
            .find_map(|(depth, slot)| match slot {
                Slot::Single(bound) if bound == name => Some((depth + 1, None)),
                Slot::Group(names) => names
                    .iter()
                    .position(|bound| bound == name)
                    .map(|sibling| (depth + 1, Some(sibling + 1))),
                Slot::Single(_) => None,
            })
    }
}

impl Transformer for IndexResolver {
    type Context = Scope<Slot>;
    type Error = CompileError;

    fn transform(&mut self, mut node: Node, scope: &Scope<Slot>) -> CompileResult<Node> {
        match &mut node.kind {
            NodeKind::VariableReference { name } => {
                let Some((depth, sibling)) = Self::lookup(scope, name) else {
                    return Err(located_error!(
                        UnboundNameError,
                        node.position,
                        "`{name}` is not bound in the environment"
                    ));
                };

                self.resolved_references += 1;
                node.kind = NodeKind::IndexedVariable { depth, sibling };
                Ok(node)
            }
            NodeKind::Lambda {
                parameter, body, ..
            } => {
                let inner = scope.extend(Slot::Single(parameter.clone()));
                **body = self.transform(std::mem::take(&mut **body), &inner)?;
                Ok(node)
            }
            NodeKind::Let {
                name, value, body, ..
            } => {
                **value = self.transform(std::mem::take(&mut **value), scope)?;
                let inner = scope.extend(Slot::Single(name.clone()));
                **body = self.transform(std::mem::take(&mut **body), &inner)?;
                Ok(node)
            }
            NodeKind::LetRec { arms, body } => {
                let names = arms
                    .iter()
                    .map(|arm| match &arm.kind {
                        NodeKind::LetRecArm { name, .. } => Ok(name.clone()),
                        _ => Err(located_error!(
                            SyntaxError,
                            arm.position,
                            "letrec groups may only contain function definitions"
                        )),
                    })
                    .collect::<CompileResult<_>>()?;
                let group = scope.extend(Slot::Group(names));

                for arm in arms.iter_mut() {
                    let NodeKind::LetRecArm {
                        parameter, body, ..
                    } = &mut arm.kind
                    else {
                        return Err(located_error!(
                            SyntaxError,
                            arm.position,
                            "letrec groups may only contain function definitions"
                        ));
                    };

                    let inner = group.extend(Slot::Single(parameter.clone()));
                    **body = self.transform(std::mem::take(&mut **body), &inner)?;
                }

                **body = self.transform(std::mem::take(&mut **body), &group)?;
                Ok(node)
            }
            _ => walk_mut(self, node, scope),
        }
    }
}
