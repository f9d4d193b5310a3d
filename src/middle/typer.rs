//! Constraint-based type inference with let-polymorphism.
//!
//! Every node is assigned a type, most of them type variables, and the
//! equalities between them are collected as [`Constraint`]s to be solved by
//! the [`Unifier`](super::unify::Unifier). Let-bound values are generalized to
//! [`Schema`]s that carry the constraints their quantified variables are
//! subject to; every use of such a name instantiates a fresh copy of both the
//! type and the constraints.

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use super::{
    scope::Scope,
    ty::{Binding, Constraint, Schema, Type, TypeKind, TypeVariableId},
    unify::{Substitution, Unifier},
};
use crate::{
    error::{CompileResult, located_error},
    frontend::Position,
    index::Index,
    tree::{BuiltinKind, Literal, Node, NodeKind, OperatorClass, TypeExpression},
};

type TypeEnvironment = Scope<(String, Binding)>;

/// A typed tree and the constraints its types must satisfy
#[derive(Debug)]
pub struct Typing {
    pub tree: Node,
    pub ty: Type,
    pub constraints: Vec<Constraint>,
}

/// The declared parameter types and the data type of a constructor
#[derive(Debug, Clone)]
struct ConstructorSignature {
    parameters: Vec<Type>,
    data_type: Type,
}

#[derive(Debug, Default)]
pub struct Typer {
    next_variable: usize,
    constraints: Vec<Constraint>,
    constructors: HashMap<String, ConstructorSignature>,
    /// Solution of `constraints[..solved_until]`, refined by each projection
    solved: Substitution,
    solved_until: usize,
}

impl Typer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infers a type for every node in a name-resolved tree
    #[tracing::instrument(skip_all)]
    pub fn infer_program(mut tree: Node) -> CompileResult<Typing> {
        let mut typer = Self::new();
        let ty = typer.infer(&mut tree, &TypeEnvironment::empty())?;

        debug!(
            type_variables = typer.next_variable,
            constraints = typer.constraints.len(),
            "inferred types"
        );

        Ok(Typing {
            tree,
            ty,
            constraints: typer.constraints,
        })
    }

    fn fresh(&mut self) -> Type {
        let variable = TypeVariableId::new(self.next_variable);
        self.next_variable += 1;
        Type::variable(variable)
    }

    fn constrain(&mut self, left: Type, right: Type, position: Position) {
        let constraint = Constraint::new(left, right, position);
        if !constraint.is_trivial() {
            self.constraints.push(constraint);
        }
    }

    fn lower_annotation(annotation: &TypeExpression) -> Type {
        match annotation {
            TypeExpression::Base(base) => Type::base(*base),
            TypeExpression::Named(name) => Type::data(name),
            TypeExpression::Function(parameter, result) => Type::function(
                Self::lower_annotation(parameter),
                Self::lower_annotation(result),
            ),
            TypeExpression::Tuple(elements) => {
                Type::tuple(elements.iter().map(Self::lower_annotation))
            }
        }
    }

    fn annotated_or_fresh(&mut self, annotation: &Option<TypeExpression>) -> Type {
        match annotation {
            Some(annotation) => Self::lower_annotation(annotation),
            None => self.fresh(),
        }
    }

    fn literal_type(literal: Literal) -> Type {
        match literal {
            Literal::Integer(_) => Type::int(),
            Literal::Boolean(_) => Type::bool(),
            Literal::Unit => Type::unit(),
        }
    }

    fn lookup(environment: &TypeEnvironment, name: &str) -> Option<Binding> {
        environment
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, binding)| binding.clone())
    }

    /// Quantifies the variables of `ty` and `constraints` that are not free in
    /// the environment. Constraints that mention none of the quantified
    /// variables are left out of the schema since instantiating them would
    /// only repeat them.
    fn generalize(
        environment: &TypeEnvironment,
        ty: Type,
        constraints: &[Constraint],
    ) -> Binding {
        let environment_variables: HashSet<TypeVariableId> = environment
            .iter()
            .flat_map(|(_, binding)| binding.free_type_variables())
            .collect();

        let mut free = ty.free_type_variables();
        for constraint in constraints {
            free.extend(constraint.free_type_variables());
        }

        let mut quantified: Vec<TypeVariableId> = free
            .difference(&environment_variables)
            .copied()
            .collect();
        quantified.sort();

        if quantified.is_empty() {
            return Binding::Mono(ty);
        }

        let constraints = constraints
            .iter()
            .filter(|constraint| {
                let variables = constraint.free_type_variables();
                quantified.iter().any(|variable| variables.contains(variable))
            })
            .cloned()
            .collect();

        Binding::Poly(Schema {
            quantified,
            ty,
            constraints,
        })
    }

    fn instantiate(&mut self, schema: &Schema) -> Type {
        let fresh: HashMap<TypeVariableId, Type> = schema
            .quantified
            .iter()
            .map(|variable| (*variable, self.fresh()))
            .collect();
        let lookup = |variable: TypeVariableId| fresh.get(&variable).cloned();

        for constraint in &schema.constraints {
            self.constraints.push(constraint.substitute(&lookup));
        }

        schema.ty.substitute(&lookup)
    }

    /// The target type of a projection as far as the constraints collected
    /// so far determine it
    fn resolve_now(&mut self, ty: &Type) -> CompileResult<Type> {
        let unsolved = self.constraints[self.solved_until..].to_vec();
        self.solved = Unifier::extend(std::mem::take(&mut self.solved), unsolved)?;
        self.solved_until = self.constraints.len();

        Ok(self.solved.apply(ty))
    }

    /// Infers the type of `node`, records it on the node and returns it
    fn infer(&mut self, node: &mut Node, environment: &TypeEnvironment) -> CompileResult<Type> {
        let ty = self.infer_kind(node, environment)?;
        node.ty = Some(ty.clone());
        Ok(ty)
    }

    fn infer_kind(&mut self, node: &mut Node, environment: &TypeEnvironment) -> CompileResult<Type> {
        let position = node.position;

        match &mut node.kind {
            NodeKind::Top { expression } => self.infer(expression, environment),
            NodeKind::Literal(literal) => Ok(Self::literal_type(*literal)),
            NodeKind::VariableReference { name } => match Self::lookup(environment, name) {
                Some(Binding::Mono(ty)) => Ok(ty),
                Some(Binding::Poly(schema)) => Ok(self.instantiate(&schema)),
                None => Err(located_error!(
                    TypeError,
                    position,
                    "`{name}` has no type in this scope"
                )),
            },
            NodeKind::Builtin(builtin) => {
                let parameter = self.fresh();
                let result = match builtin {
                    BuiltinKind::Println | BuiltinKind::Print => Type::unit(),
                    BuiltinKind::Panic => self.fresh(),
                };
                Ok(Type::function(parameter, result))
            }
            NodeKind::Lambda {
                parameter,
                annotation,
                body,
            } => {
                let parameter_type = self.annotated_or_fresh(annotation);
                let inner = environment.extend((parameter.clone(), Binding::Mono(parameter_type.clone())));
                let body_type = self.infer(body, &inner)?;
                Ok(Type::function(parameter_type, body_type))
            }
            NodeKind::Application { function, argument } => {
                let function_type = self.infer(function, environment)?;
                let argument_type = self.infer(argument, environment)?;
                let result = self.fresh();
                self.constrain(
                    function_type,
                    Type::function(argument_type, result.clone()),
                    position,
                );
                Ok(result)
            }
            NodeKind::Let {
                name,
                annotation,
                value,
                body,
            } => {
                let start = self.constraints.len();
                let value_type = self.infer(value, environment)?;
                if let Some(annotation) = annotation {
                    self.constrain(value_type.clone(), Self::lower_annotation(annotation), position);
                }

                // The value's constraints stay in the global set as well
                let binding = Self::generalize(environment, value_type, &self.constraints[start..]);
                let inner = environment.extend((name.clone(), binding));
                self.infer(body, &inner)
            }
            NodeKind::LetRec { arms, body } => {
                let mut declared = Vec::with_capacity(arms.len());
                for arm in arms.iter() {
                    let NodeKind::LetRecArm {
                        name,
                        parameter_annotation,
                        result_annotation,
                        ..
                    } = &arm.kind
                    else {
                        return Err(located_error!(
                            SyntaxError,
                            arm.position,
                            "letrec groups may only contain function definitions"
                        ));
                    };

                    let parameter_type = self.annotated_or_fresh(parameter_annotation);
                    let result_type = self.annotated_or_fresh(result_annotation);
                    declared.push((name.clone(), parameter_type, result_type));
                }

                let start = self.constraints.len();
                let group = environment.extend_all(declared.iter().map(|(name, parameter, result)| {
                    (
                        name.clone(),
                        Binding::Mono(Type::function(parameter.clone(), result.clone())),
                    )
                }));

                for (arm, (_, parameter_type, result_type)) in arms.iter_mut().zip(&declared) {
                    let arm_position = arm.position;
                    let NodeKind::LetRecArm {
                        parameter, body, ..
                    } = &mut arm.kind
                    else {
                        return Err(located_error!(
                            SyntaxError,
                            arm_position,
                            "letrec groups may only contain function definitions"
                        ));
                    };

                    let inner = group.extend((parameter.clone(), Binding::Mono(parameter_type.clone())));
                    let body_type = self.infer(body, &inner)?;
                    self.constrain(body_type, result_type.clone(), arm_position);
                    arm.ty = Some(Type::function(parameter_type.clone(), result_type.clone()));
                }

                let residual = self.constraints[start..].to_vec();
                let generalized = declared.into_iter().map(|(name, parameter, result)| {
                    let ty = Type::function(parameter, result);
                    (name, Self::generalize(environment, ty, &residual))
                });
                let inner = environment.extend_all(generalized.collect::<Vec<_>>());

                self.infer(body, &inner)
            }
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition_type = self.infer(condition, environment)?;
                self.constrain(condition_type, Type::bool(), condition.position);
                let then_type = self.infer(then_branch, environment)?;
                let else_type = self.infer(else_branch, environment)?;
                self.constrain(then_type.clone(), else_type, position);
                Ok(then_type)
            }
            NodeKind::BinaryOp { operator, lhs, rhs } => {
                let lhs_type = self.infer(lhs, environment)?;
                let rhs_type = self.infer(rhs, environment)?;

                match operator.class() {
                    OperatorClass::Arithmetic => {
                        self.constrain(lhs_type, Type::int(), lhs.position);
                        self.constrain(rhs_type, Type::int(), rhs.position);
                        Ok(Type::int())
                    }
                    OperatorClass::Relational => {
                        self.constrain(lhs_type, Type::int(), lhs.position);
                        self.constrain(rhs_type, Type::int(), rhs.position);
                        Ok(Type::bool())
                    }
                    OperatorClass::Equality => {
                        self.constrain(lhs_type, rhs_type, position);
                        Ok(Type::bool())
                    }
                }
            }
            NodeKind::UnaryOp { operand, .. } => {
                let operand_type = self.infer(operand, environment)?;
                self.constrain(operand_type, Type::int(), operand.position);
                Ok(Type::int())
            }
            NodeKind::Sequence { statements } => {
                let mut last = Type::unit();
                for statement in statements.iter_mut() {
                    last = self.infer(statement, environment)?;
                }
                Ok(last)
            }
            NodeKind::Tuple { elements } => {
                let element_types = elements
                    .iter_mut()
                    .map(|element| self.infer(element, environment))
                    .collect::<CompileResult<Vec<_>>>()?;
                Ok(Type::tuple(element_types))
            }
            NodeKind::Projection {
                index,
                arity,
                target,
            } => {
                let target_type = self.infer(target, environment)?;
                let resolved = self.resolve_now(&target_type)?;

                let TypeKind::Tuple(elements) = &*resolved else {
                    return Err(located_error!(
                        TypeError,
                        position,
                        "cannot project `.{index}` out of `{resolved}`, which is not known to be a tuple here"
                    ));
                };

                let Some(element) = elements.get(*index) else {
                    return Err(located_error!(
                        TypeError,
                        position,
                        "tuple index {index} is out of range for `{resolved}`"
                    ));
                };

                *arity = Some(elements.len());
                Ok(element.clone())
            }
            NodeKind::DataType {
                name,
                constructors,
                body,
            } => {
                let data_type = Type::data(name);
                let mut inner = environment.clone();

                for constructor in constructors.iter_mut() {
                    let NodeKind::DataConstructor {
                        name, parameters, ..
                    } = &constructor.kind
                    else {
                        return Err(located_error!(
                            SyntaxError,
                            constructor.position,
                            "data type `{name}` may only contain constructors"
                        ));
                    };

                    let parameters: Vec<Type> = parameters.iter().map(Self::lower_annotation).collect();
                    let constructor_type = parameters
                        .iter()
                        .rev()
                        .fold(data_type.clone(), |result, parameter| {
                            Type::function(parameter.clone(), result)
                        });

                    self.constructors.insert(
                        name.clone(),
                        ConstructorSignature {
                            parameters,
                            data_type: data_type.clone(),
                        },
                    );
                    inner = inner.extend((name.clone(), Binding::Mono(constructor_type.clone())));
                    constructor.ty = Some(constructor_type);
                }

                self.infer(body, &inner)
            }
            NodeKind::Match { scrutinee, arms } => {
                let scrutinee_type = self.infer(scrutinee, environment)?;
                let result = self.fresh();

                for arm in arms.iter_mut() {
                    let arm_position = arm.position;
                    let NodeKind::MatchArm { pattern, body } = &mut arm.kind else {
                        return Err(located_error!(
                            SyntaxError,
                            arm_position,
                            "match expressions may only contain arms"
                        ));
                    };

                    let mut bindings = Vec::new();
                    let pattern_type = self.infer_pattern(pattern, &mut bindings)?;
                    self.constrain(scrutinee_type.clone(), pattern_type, pattern.position);

                    let inner = environment.extend_all(bindings);
                    let body_type = self.infer(body, &inner)?;
                    self.constrain(body_type, result.clone(), arm_position);
                    arm.ty = Some(result.clone());
                }

                Ok(result)
            }
            NodeKind::LetRecArm { .. }
            | NodeKind::MatchArm { .. }
            | NodeKind::DataConstructor { .. }
            | NodeKind::PatternBinder { .. }
            | NodeKind::PatternTuple { .. }
            | NodeKind::PatternLiteral(_)
            | NodeKind::PatternConstructor { .. } => Err(located_error!(
                SyntaxError,
                position,
                "{} cannot appear outside its enclosing construct",
                node.tag()
            )),
            NodeKind::IndexedVariable { .. } => Err(located_error!(
                SyntaxError,
                position,
                "environment indices cannot be typed"
            )),
        }
    }

    /// Infers the type a pattern matches, collecting the names it binds
    fn infer_pattern(
        &mut self,
        pattern: &mut Node,
        bindings: &mut Vec<(String, Binding)>,
    ) -> CompileResult<Type> {
        let position = pattern.position;

        let ty = match &mut pattern.kind {
            NodeKind::PatternBinder { name } => {
                let ty = self.fresh();
                bindings.push((name.clone(), Binding::Mono(ty.clone())));
                ty
            }
            NodeKind::PatternLiteral(literal) => Self::literal_type(*literal),
            NodeKind::PatternTuple { elements } => {
                let element_types = elements
                    .iter_mut()
                    .map(|element| self.infer_pattern(element, bindings))
                    .collect::<CompileResult<Vec<_>>>()?;
                Type::tuple(element_types)
            }
            NodeKind::PatternConstructor {
                name, arguments, ..
            } => {
                let Some(signature) = self.constructors.get(name.as_str()).cloned() else {
                    return Err(located_error!(
                        TypeError,
                        position,
                        "constructor `{name}` has no type in this scope"
                    ));
                };

                if arguments.len() != signature.parameters.len() {
                    return Err(located_error!(
                        TypeError,
                        position,
                        "constructor `{name}` takes {} arguments but the pattern gives {}",
                        signature.parameters.len(),
                        arguments.len()
                    ));
                }

                for (argument, parameter) in arguments.iter_mut().zip(signature.parameters) {
                    let argument_type = self.infer_pattern(argument, bindings)?;
                    self.constrain(argument_type, parameter, argument.position);
                }

                signature.data_type
            }
            _ => {
                return Err(located_error!(
                    SyntaxError,
                    position,
                    "{} is not a pattern",
                    pattern.tag()
                ));
            }
        };

        pattern.ty = Some(ty.clone());
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::ErrorKind,
        frontend::{SourceFile, parser::Parser},
        middle::namer::Namer,
    };

    /// The canonical type of a whole program after unification
    fn type_of(source: &str) -> CompileResult<String> {
        let tree = Parser::parse_program(&SourceFile::from_memory(source))?;
        let tree = Namer::resolve_names(tree)?;
        let typing = Typer::infer_program(tree)?;
        let ty = typing.ty.clone();
        let substitution = Unifier::solve(typing.constraints)?;
        Ok(substitution.apply(&ty).canonical())
    }

    #[test]
    fn test_base_programs() {
        assert_eq!(type_of("let x : int = 3 in x + 4").unwrap(), "int");
        assert_eq!(type_of("1 < 2").unwrap(), "bool");
        assert_eq!(type_of("true == false").unwrap(), "bool");
        assert_eq!(type_of("()").unwrap(), "unit");
        assert_eq!(type_of("println 1; -3").unwrap(), "int");
        assert_eq!(type_of("(1, true).1").unwrap(), "bool");
    }

    #[test]
    fn test_identity_is_polymorphic() {
        assert_eq!(type_of(r"let id = \x -> x in id").unwrap(), "'a -> 'a");
        assert_eq!(
            type_of(r"let id = \x -> x in (id 1, id true)").unwrap(),
            "(int, bool)"
        );
    }

    #[test]
    fn test_generalized_constraints_are_instantiated_per_use() {
        assert_eq!(
            type_of(r"let twice = \f -> \x -> f (f x) in (twice (\n -> n + 1) 2, twice (\b -> b == true) false)")
                .unwrap(),
            "(int, bool)"
        );
    }

    #[test]
    fn test_lambda_parameters_stay_monomorphic() {
        let error = type_of(r"(\f -> (f 1, f true)) (\x -> x)").unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnifyError);
    }

    #[test]
    fn test_letrec_and_data_types() {
        assert_eq!(
            type_of(
                "letrec fact n = if n == 0 then 1 else n * fact (n - 1) in fact"
            )
            .unwrap(),
            "int -> int"
        );
        assert_eq!(
            type_of(
                "data L = Nil | Cons(int, L) in \
                 letrec length l = match l { Nil -> 0; Cons(_, rest) -> 1 + length rest } \
                 in length (Cons 1 (Cons 2 Nil))"
            )
            .unwrap(),
            "int"
        );
    }

    #[test]
    fn test_annotations_constrain() {
        let error = type_of("let x : bool = 3 in x").unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnifyError);

        assert_eq!(type_of(r"\x : int -> x").unwrap(), "int -> int");
    }

    #[test]
    fn test_projection_needs_a_known_tuple() {
        let error = type_of(r"\p -> p.0").unwrap_err();
        assert_eq!(error.kind, ErrorKind::TypeError);

        let error = type_of("(1, 2).2").unwrap_err();
        assert_eq!(error.kind, ErrorKind::TypeError);
        assert_eq!(error.message, "tuple index 2 is out of range for `(int, int)`");

        assert_eq!(type_of(r"\p : (int, bool) -> p.1").unwrap(), "(int, bool) -> bool");
    }

    #[test]
    fn test_projections_see_constraints_added_since_the_last_one() {
        assert_eq!(
            type_of(r"let pick = \t : ((int, bool), int) -> t.0 in (pick ((1, true), 2)).1").unwrap(),
            "bool"
        );

        let tree = Parser::parse_program(&SourceFile::from_memory(
            r"let p = (1, (true, 2)) in let q = p.1 in (q.1, p.0).0",
        ))
        .unwrap();
        let mut typer = Typer::new();
        let ty = typer
            .infer(&mut Namer::resolve_names(tree).unwrap(), &TypeEnvironment::empty())
            .unwrap();

        assert_eq!(typer.solved_until, typer.constraints.len());
        assert_eq!(typer.solved.apply(&ty), Type::int());
    }

    #[test]
    fn test_pattern_errors() {
        let error = type_of("data T = A(int) in match A 1 { A(x, y) -> x }").unwrap_err();
        assert_eq!(error.kind, ErrorKind::TypeError);

        let error = type_of("match (1, 2) { (a, b, c) -> a }").unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnifyError);
    }

    #[test]
    fn test_malformed_trees_are_rejected() {
        let at = crate::frontend::Position::new(1, 1);
        let expression_in_letrec = Node::top(Node::new(
            NodeKind::LetRec {
                arms: vec![Node::integer(1, at)],
                body: Box::new(Node::integer(2, at)),
            },
            at,
        ));
        let indexed_variable = Node::top(Node::new(
            NodeKind::IndexedVariable {
                depth: 1,
                sibling: None,
            },
            at,
        ));

        for tree in [expression_in_letrec, indexed_variable] {
            let error = Typer::infer_program(tree).unwrap_err();
            assert_eq!(error.kind, ErrorKind::SyntaxError, "{}", error.message);
        }
    }

    #[test]
    fn test_every_expression_node_is_typed() {
        let tree = Parser::parse_program(&SourceFile::from_memory(
            r"let f = \x -> (x, 1) in match f true { (b, n) -> if b then n else 0 }",
        ))
        .unwrap();
        let typing = Typer::infer_program(Namer::resolve_names(tree).unwrap()).unwrap();

        fn assert_typed(node: &Node) {
            assert!(node.ty.is_some(), "{} has no type", node.tag());
            for child in node.children() {
                assert_typed(child);
            }
        }

        assert_typed(&typing.tree);
    }
}
