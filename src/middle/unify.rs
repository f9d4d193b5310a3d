//! Constraint solving by first-order unification, and the pass that writes
//! the solution back into every type-bearing node.

use std::convert::Infallible;

use hashbrown::HashMap;
use tracing::{debug, trace};

use super::{
    ty::{Constraint, Type, TypeKind, TypeVariableId},
    typer::Typing,
};
use crate::{
    error::{CompileResult, located_error},
    tree::{
        Node,
        visit::{Transformer, walk_mut},
    },
};

/// An idempotent mapping from type variables to the types they were solved to.
/// No variable bound in the map occurs in any of its values.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Substitution {
    map: HashMap<TypeVariableId, Type>,
}

impl Substitution {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn apply(&self, ty: &Type) -> Type {
        ty.substitute(&|variable| self.map.get(&variable).cloned())
    }

    pub fn apply_constraint(&self, constraint: &Constraint) -> Constraint {
        constraint.substitute(&|variable| self.map.get(&variable).cloned())
    }

    fn bind(&mut self, variable: TypeVariableId, ty: Type) {
        let replace = |v: TypeVariableId| (v == variable).then(|| ty.clone());

        for value in self.map.values_mut() {
            *value = value.substitute(&replace);
        }

        self.map.insert(variable, ty);
    }
}

#[derive(Debug)]
pub struct Unifier {
    pending: Vec<Constraint>,
    substitution: Substitution,
}

impl Unifier {
    /// Solves the constraints, failing on the first pair of types that cannot
    /// be made equal
    pub fn solve(constraints: Vec<Constraint>) -> CompileResult<Substitution> {
        Self::extend(Substitution::default(), constraints)
    }

    /// Refines an existing solution with further constraints
    pub fn extend(
        substitution: Substitution,
        constraints: Vec<Constraint>,
    ) -> CompileResult<Substitution> {
        // Solve in the order the constraints were produced
        let pending = constraints
            .iter()
            .rev()
            .map(|constraint| substitution.apply_constraint(constraint))
            .collect();

        let mut unifier = Self {
            pending,
            substitution,
        };

        while let Some(constraint) = unifier.pending.pop() {
            unifier.step(constraint)?;
        }

        Ok(unifier.substitution)
    }

    /// Solves the constraints of a typed tree and stamps every node with its
    /// final type
    #[tracing::instrument(skip_all)]
    pub fn unify(typing: Typing) -> CompileResult<Node> {
        let constraints = typing.constraints.len();
        let substitution = Self::solve(typing.constraints)?;

        debug!(
            constraints,
            solved_variables = substitution.len(),
            "unified constraints"
        );

        let Ok(tree) = TypeTagger {
            substitution: &substitution,
        }
        .transform(typing.tree, &());

        Ok(tree)
    }

    fn step(&mut self, constraint: Constraint) -> CompileResult<()> {
        if constraint.is_trivial() {
            return Ok(());
        }

        trace!(
            left = %constraint.left,
            right = %constraint.right,
            "unifying"
        );

        let position = constraint.position;

        match (&*constraint.left, &*constraint.right) {
            (
                TypeKind::Function {
                    parameter: left_parameter,
                    result: left_result,
                },
                TypeKind::Function {
                    parameter: right_parameter,
                    result: right_result,
                },
            ) => {
                self.pending.push(Constraint::new(
                    left_result.clone(),
                    right_result.clone(),
                    position,
                ));
                self.pending.push(Constraint::new(
                    left_parameter.clone(),
                    right_parameter.clone(),
                    position,
                ));
                Ok(())
            }
            (TypeKind::Tuple(left), TypeKind::Tuple(right)) => {
                if left.len() != right.len() {
                    return Err(located_error!(
                        UnifyError,
                        position,
                        "cannot unify `{}` with `{}`: tuples have {} and {} components",
                        constraint.left,
                        constraint.right,
                        left.len(),
                        right.len()
                    ));
                }

                for (left, right) in left.iter().zip(right.iter()).rev() {
                    self.pending
                        .push(Constraint::new(left.clone(), right.clone(), position));
                }
                Ok(())
            }
            (TypeKind::Variable(variable), _) => {
                self.bind(*variable, constraint.right.clone(), &constraint)
            }
            (_, TypeKind::Variable(variable)) => {
                self.bind(*variable, constraint.left.clone(), &constraint)
            }
            _ => Err(located_error!(
                UnifyError,
                position,
                "cannot unify `{}` with `{}`",
                constraint.left,
                constraint.right
            )),
        }
    }

    fn bind(
        &mut self,
        variable: TypeVariableId,
        ty: Type,
        constraint: &Constraint,
    ) -> CompileResult<()> {
        if ty.occurs(variable) {
            return Err(located_error!(
                UnifyError,
                constraint.position,
                "infinite type: `{}` occurs in `{ty}`",
                Type::variable(variable)
            ));
        }

        let replace = |v: TypeVariableId| (v == variable).then(|| ty.clone());
        for pending in self.pending.iter_mut() {
            *pending = pending.substitute(&replace);
        }

        self.substitution.bind(variable, ty);
        Ok(())
    }
}

/// Applies a solved substitution to the type of every node
struct TypeTagger<'a> {
    substitution: &'a Substitution,
}

impl Transformer for TypeTagger<'_> {
    type Context = ();
    type Error = Infallible;

    fn transform(&mut self, mut node: Node, context: &()) -> Result<Node, Infallible> {
        node.ty = node.ty.map(|ty| self.substitution.apply(&ty));
        walk_mut(self, node, context)
    }
}
