//! Lowering of data types, pattern matches and tuples.
//!
//! Each pattern becomes a function from the scrutinee to a pair: the success
//! tag and the arm result, or the failure tag and a dummy. A `match` tries
//! its arms in order and falls through to a `panic 101` when none applies.
//! Constructors become functions building `(tag, (arguments...))`. Finally
//! tuples themselves are erased into closures that hand their components to a
//! selector, and projections into applications of such a selector.

use tracing::debug;

use super::fresh::NameSupply;
use crate::{
    error::{CompileError, CompileResult, located_error},
    frontend::Position,
    tree::{
        BinaryOperator, BuiltinKind, Literal, Node, NodeKind, NodeTag,
        visit::{Transformer, walk_mut},
    },
};

/// First component of the pair a pattern function returns when it matched
pub const SUCCESS_TAG: i64 = 11;
/// First component of the pair a pattern function returns when it did not
pub const FAILURE_TAG: i64 = 22;
const DUMMY_PAYLOAD: i64 = 0;
/// Exit code of a match that no arm applied to
pub const INEXHAUSTIVE_MATCH_EXIT_CODE: i64 = 101;

fn pair(first: Node, second: Node, position: Position) -> Node {
    Node::tuple(vec![first, second], position)
}

fn success(result: Node, position: Position) -> Node {
    pair(Node::integer(SUCCESS_TAG, position), result, position)
}

fn failure(position: Position) -> Node {
    pair(
        Node::integer(FAILURE_TAG, position),
        Node::integer(DUMMY_PAYLOAD, position),
        position,
    )
}

fn equals(lhs: Node, rhs: Node, position: Position) -> Node {
    Node::binary(BinaryOperator::Equals, lhs, rhs, position)
}

fn component(pair_name: &str, index: usize, position: Position) -> Node {
    Node::projection(Node::variable(pair_name, position), index, Some(2), position)
}

#[derive(Debug, Default)]
pub struct PatternCompiler {
    names: NameSupply,
    lowered_matches: usize,
}

impl PatternCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowers data types and matches, then erases tuples
    #[tracing::instrument(skip_all)]
    pub fn lower_patterns(tree: Node) -> CompileResult<Node> {
        let mut compiler = Self::new();
        let tree = compiler.compile_matches(tree)?;
        let tree = TupleEraser::new(&mut compiler.names).erase(tree)?;

        debug!(lowered_matches = compiler.lowered_matches, "lowered patterns");

        Ok(tree)
    }

    /// Rewrites every data type and match, leaving tuples in place
    pub fn compile_matches(&mut self, tree: Node) -> CompileResult<Node> {
        self.transform(tree, &())
    }

    fn lower_data_type(
        &mut self,
        constructors: Vec<Node>,
        body: Node,
        position: Position,
    ) -> CompileResult<Node> {
        let mut definitions = Vec::with_capacity(constructors.len());

        for constructor in constructors {
            let NodeKind::DataConstructor {
                name,
                parameters,
                tag,
            } = constructor.kind
            else {
                return Err(located_error!(
                    SyntaxError,
                    constructor.position,
                    "data types may only contain constructors"
                ));
            };
            let Some(tag) = tag else {
                return Err(located_error!(
                    NameError,
                    constructor.position,
                    "constructor `{name}` was never tagged"
                ));
            };

            let value = if parameters.is_empty() {
                pair(
                    Node::integer(tag.into(), position),
                    Node::literal(Literal::Unit, position),
                    position,
                )
            } else {
                let arguments: Vec<String> = parameters
                    .iter()
                    .map(|_| self.names.generated("a"))
                    .collect();

                let payload = Node::tuple(
                    arguments
                        .iter()
                        .map(|argument| Node::variable(argument.as_str(), position))
                        .collect(),
                    position,
                );

                arguments.into_iter().rev().fold(
                    pair(Node::integer(tag.into(), position), payload, position),
                    |body, argument| Node::lambda(argument, body, position),
                )
            };

            definitions.push((name, value));
        }

        Ok(definitions
            .into_iter()
            .rev()
            .fold(body, |body, (name, value)| Node::let_in(name, value, body, position)))
    }

    fn lower_match(
        &mut self,
        scrutinee: Node,
        arms: Vec<Node>,
        position: Position,
    ) -> CompileResult<Node> {
        self.lowered_matches += 1;
        let scrutinee_name = self.names.generated("e");

        let mut attempts = Vec::with_capacity(arms.len());
        for arm in arms {
            let NodeKind::MatchArm { pattern, body } = arm.kind else {
                return Err(located_error!(
                    SyntaxError,
                    arm.position,
                    "match expressions may only contain arms"
                ));
            };

            let result_name = self.names.generated("v");
            let matcher_name = self.names.generated("pl");
            let matcher = self.pattern_function(*pattern, *body, position)?;

            let attempt = Node::let_in(
                matcher_name.as_str(),
                matcher,
                Node::application(
                    Node::variable(matcher_name.as_str(), position),
                    Node::variable(scrutinee_name.as_str(), position),
                    position,
                ),
                position,
            );

            attempts.push((result_name, attempt));
        }

        let fallback = Node::application(
            Node::builtin(BuiltinKind::Panic, position),
            Node::integer(INEXHAUSTIVE_MATCH_EXIT_CODE, position),
            position,
        );

        let chain = attempts
            .into_iter()
            .rev()
            .fold(fallback, |otherwise, (result_name, attempt)| {
                Node::let_in(
                    result_name.as_str(),
                    attempt,
                    Node::conditional(
                        equals(
                            component(&result_name, 0, position),
                            Node::integer(SUCCESS_TAG, position),
                            position,
                        ),
                        component(&result_name, 1, position),
                        otherwise,
                        position,
                    ),
                    position,
                )
            });

        Ok(Node::let_in(scrutinee_name, scrutinee, chain, position))
    }

    /// A function that matches its argument against `pattern`, returning the
    /// success tag and `result` with the pattern's names bound in it, or the
    /// failure tag
    fn pattern_function(
        &mut self,
        pattern: Node,
        result: Node,
        position: Position,
    ) -> CompileResult<Node> {
        let function = match pattern.kind {
            NodeKind::PatternBinder { name } => {
                Node::lambda(name, success(result, position), position)
            }
            NodeKind::PatternLiteral(literal) => {
                let argument = self.names.generated("x");
                let test = equals(
                    Node::variable(argument.as_str(), position),
                    Node::literal(literal, position),
                    position,
                );

                Node::lambda(
                    argument,
                    Node::conditional(test, success(result, position), failure(position), position),
                    position,
                )
            }
            NodeKind::PatternTuple { elements } => self.tuple_function(elements, result, position)?,
            NodeKind::PatternConstructor {
                name,
                arguments,
                tag,
            } => {
                let Some(tag) = tag else {
                    return Err(located_error!(
                        NameError,
                        pattern.position,
                        "constructor pattern `{name}` was never tagged"
                    ));
                };
                let argument = self.names.generated("x");
                let payload_matcher = self.tuple_function(arguments, result, position)?;

                let test = equals(
                    component(&argument, 0, position),
                    Node::integer(tag.into(), position),
                    position,
                );
                let on_match = Node::application(
                    payload_matcher,
                    component(&argument, 1, position),
                    position,
                );

                Node::lambda(
                    argument,
                    Node::conditional(test, on_match, failure(position), position),
                    position,
                )
            }
            kind => {
                return Err(located_error!(
                    SyntaxError,
                    pattern.position,
                    "{} is not a pattern",
                    NodeTag::from(&kind)
                ));
            }
        };

        Ok(function)
    }

    /// Matches the components of a tuple one after the other. The pattern
    /// for each component is built with the function for the remaining
    /// components as its result, so binders of earlier components are in
    /// scope in the later ones and in `result`.
    fn tuple_function(
        &mut self,
        elements: Vec<Node>,
        result: Node,
        position: Position,
    ) -> CompileResult<Node> {
        let argument = self.names.generated("x");
        let arity = elements.len();

        if arity == 0 {
            return Ok(Node::lambda(argument, success(result, position), position));
        }

        let chained = elements
            .into_iter()
            .rev()
            .try_fold(result, |inner, element| {
                self.pattern_function(element, inner, position)
            })?;

        let chain_name = self.names.generated("ptnlam");
        let steps: Vec<String> = (0..arity).map(|_| self.names.generated("r")).collect();

        let call = |step: usize| -> Node {
            let function = match step {
                0 => Node::variable(chain_name.as_str(), position),
                _ => component(&steps[step - 1], 1, position),
            };
            let element = Node::projection(
                Node::variable(argument.as_str(), position),
                step,
                Some(arity),
                position,
            );
            Node::application(function, element, position)
        };

        let mut body = call(arity - 1);
        for step in (0..arity - 1).rev() {
            let failed = equals(
                component(&steps[step], 0, position),
                Node::integer(FAILURE_TAG, position),
                position,
            );

            body = Node::let_in(
                steps[step].as_str(),
                call(step),
                Node::conditional(failed, failure(position), body, position),
                position,
            );
        }

        Ok(Node::lambda(
            argument.as_str(),
            Node::let_in(chain_name.as_str(), chained, body, position),
            position,
        ))
    }
}

impl Transformer for PatternCompiler {
    type Context = ();
    type Error = CompileError;

    fn transform(&mut self, node: Node, context: &()) -> CompileResult<Node> {
        let node = walk_mut(self, node, context)?;
        let position = node.position;

        match node.kind {
            NodeKind::DataType {
                constructors, body, ..
            } => self.lower_data_type(constructors, *body, position),
            NodeKind::Match { scrutinee, arms } => self.lower_match(*scrutinee, arms, position),
            kind => Ok(Node {
                kind,
                position,
                ty: node.ty,
            }),
        }
    }
}

/// Replaces tuples by closures over their components and projections by
/// applications to a component selector
pub struct TupleEraser<'a> {
    names: &'a mut NameSupply,
}

impl<'a> TupleEraser<'a> {
    pub fn new(names: &'a mut NameSupply) -> Self {
        Self { names }
    }

    pub fn erase(&mut self, tree: Node) -> CompileResult<Node> {
        self.transform(tree, &())
    }

    fn erase_tuple(&mut self, elements: Vec<Node>, position: Position) -> Node {
        if elements.is_empty() {
            return Node::literal(Literal::Unit, position);
        }

        let components: Vec<String> = elements.iter().map(|_| self.names.generated("t")).collect();
        let selector = self.names.generated("s");

        let handed_over = components.iter().fold(
            Node::variable(selector.as_str(), position),
            |function, component| {
                Node::application(function, Node::variable(component.as_str(), position), position)
            },
        );
        let closure = Node::lambda(selector, handed_over, position);

        components
            .into_iter()
            .zip(elements)
            .rev()
            .fold(closure, |body, (name, element)| {
                Node::let_in(name, element, body, position)
            })
    }

    fn erase_projection(
        &mut self,
        target: Node,
        index: usize,
        arity: Option<usize>,
        position: Position,
    ) -> CompileResult<Node> {
        let Some(arity) = arity else {
            return Err(located_error!(
                TypeError,
                position,
                "projection `.{index}` has no known tuple arity"
            ));
        };

        let parameters: Vec<String> = (0..arity).map(|_| self.names.generated("x")).collect();
        let selected = Node::variable(parameters[index].as_str(), position);
        let selector = parameters
            .into_iter()
            .rev()
            .fold(selected, |body, parameter| Node::lambda(parameter, body, position));

        Ok(Node::application(target, selector, position))
    }
}

impl Transformer for TupleEraser<'_> {
    type Context = ();
    type Error = CompileError;

    fn transform(&mut self, node: Node, context: &()) -> CompileResult<Node> {
        let node = walk_mut(self, node, context)?;
        let position = node.position;

        match node.kind {
            NodeKind::Tuple { elements } => Ok(self.erase_tuple(elements, position)),
            NodeKind::Projection {
                index,
                arity,
                target,
            } => self.erase_projection(*target, index, arity, position),
            kind => Ok(Node {
                kind,
                position,
                ty: node.ty,
            }),
        }
    }
}
