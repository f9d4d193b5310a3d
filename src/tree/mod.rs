//! The syntax tree shared by every pass.
//!
//! Each node is a closed [`NodeKind`] plus a source [`Position`] and, once
//! the type inferencer has run, the node's inferred [`Type`]. Every kind has a
//! declared schema of named fields ([`NodeTag::schema`]) which drives the
//! generic traversals in [`visit`] and the construction guard
//! [`Node::from_fields`]. Subtrees are owned by exactly one parent; passes that
//! want to duplicate one must `clone` it.

use strum::{Display, EnumDiscriminants, EnumIter, EnumString};
use thiserror::Error;

use crate::{frontend::Position, middle::ty::Type};

pub mod print;
pub mod visit;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub position: Position,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(NodeTag), derive(Display, EnumIter, Hash))]
pub enum NodeKind {
    Top {
        expression: Box<Node>,
    },
    Literal(Literal),
    VariableReference {
        name: String,
    },
    Builtin(BuiltinKind),
    Lambda {
        parameter: String,
        annotation: Option<TypeExpression>,
        body: Box<Node>,
    },
    Application {
        function: Box<Node>,
        argument: Box<Node>,
    },
    Let {
        name: String,
        annotation: Option<TypeExpression>,
        value: Box<Node>,
        body: Box<Node>,
    },
    LetRec {
        arms: Vec<Node>,
        body: Box<Node>,
    },
    LetRecArm {
        name: String,
        parameter: String,
        parameter_annotation: Option<TypeExpression>,
        result_annotation: Option<TypeExpression>,
        body: Box<Node>,
    },
    Conditional {
        condition: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Box<Node>,
    },
    BinaryOp {
        operator: BinaryOperator,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    UnaryOp {
        operator: UnaryOperator,
        operand: Box<Node>,
    },
    Sequence {
        statements: Vec<Node>,
    },
    Tuple {
        elements: Vec<Node>,
    },
    /// `target.index`. The arity of the projected tuple is filled in by the
    /// type inferencer.
    Projection {
        index: usize,
        arity: Option<usize>,
        target: Box<Node>,
    },
    Match {
        scrutinee: Box<Node>,
        arms: Vec<Node>,
    },
    MatchArm {
        pattern: Box<Node>,
        body: Box<Node>,
    },
    DataType {
        name: String,
        constructors: Vec<Node>,
        body: Box<Node>,
    },
    /// The tag is assigned by the namer
    DataConstructor {
        name: String,
        parameters: Vec<TypeExpression>,
        tag: Option<u32>,
    },
    PatternBinder {
        name: String,
    },
    PatternTuple {
        elements: Vec<Node>,
    },
    PatternLiteral(Literal),
    /// The tag is assigned by the namer
    PatternConstructor {
        name: String,
        arguments: Vec<Node>,
        tag: Option<u32>,
    },
    /// A variable reference after index resolution. Both indices are 1-based;
    /// `sibling` selects a closure out of a let-rec group.
    IndexedVariable {
        depth: usize,
        sibling: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Literal {
    Integer(i64),
    Boolean(bool),
    Unit,
}

impl Literal {
    /// The machine word a literal is represented by
    pub fn machine_value(self) -> i64 {
        match self {
            Literal::Integer(value) => value,
            Literal::Boolean(value) => value as i64,
            Literal::Unit => 0,
        }
    }
}

impl core::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Integer(value) => write!(f, "{value}"),
            Literal::Boolean(value) => write!(f, "{value}"),
            Literal::Unit => f.write_str("()"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinKind {
    Println,
    Print,
    Panic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum BinaryOperator {
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulus,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
}

/// How the type inferencer treats an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorClass {
    /// int, int -> int
    Arithmetic,
    /// int, int -> bool
    Relational,
    /// 'a, 'a -> bool
    Equality,
}

impl BinaryOperator {
    pub fn class(self) -> OperatorClass {
        match self {
            Self::Multiply | Self::Divide | Self::Modulus | Self::Add | Self::Subtract => {
                OperatorClass::Arithmetic
            }
            Self::GreaterThan
            | Self::LessThan
            | Self::GreaterThanOrEqualTo
            | Self::LessThanOrEqualTo => OperatorClass::Relational,
            Self::Equals | Self::NotEquals => OperatorClass::Equality,
        }
    }

    /// Opcode name in the assembly listing
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Multiply => "mul",
            Self::Divide => "div",
            Self::Modulus => "mod",
            Self::Add => "add",
            Self::Subtract => "sub",
            Self::GreaterThan => "gt",
            Self::LessThan => "lt",
            Self::GreaterThanOrEqualTo => "ge",
            Self::LessThanOrEqualTo => "le",
            Self::Equals => "eq",
            Self::NotEquals => "ne",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum UnaryOperator {
    #[strum(serialize = "-")]
    Negate,
}

impl UnaryOperator {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Negate => "neg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum BaseType {
    Int,
    Bool,
    Unit,
}

/// A type as written in a source annotation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeExpression {
    Base(BaseType),
    /// A declared data type
    Named(String),
    Function(Box<TypeExpression>, Box<TypeExpression>),
    Tuple(Vec<TypeExpression>),
}

impl core::fmt::Display for TypeExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeExpression::Base(base) => write!(f, "{base}"),
            TypeExpression::Named(name) => f.write_str(name),
            TypeExpression::Function(parameter, result) => match **parameter {
                TypeExpression::Function(..) => write!(f, "({parameter}) -> {result}"),
                _ => write!(f, "{parameter} -> {result}"),
            },
            TypeExpression::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// How a field of a node kind holds its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// Exactly one child node
    Single,
    /// An ordered list of child nodes
    Bunched,
    /// A terminal value
    Leaf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub shape: FieldShape,
}

const fn single(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        shape: FieldShape::Single,
    }
}

const fn bunched(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        shape: FieldShape::Bunched,
    }
}

const fn leaf(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        shape: FieldShape::Leaf,
    }
}

impl NodeTag {
    /// The ordered field schema of every node of this kind
    pub fn schema(self) -> &'static [FieldSpec] {
        match self {
            NodeTag::Top => const { &[single("expression")] },
            NodeTag::Literal => const { &[leaf("value")] },
            NodeTag::VariableReference => const { &[leaf("name")] },
            NodeTag::Builtin => const { &[leaf("builtin")] },
            NodeTag::Lambda => const { &[leaf("parameter"), leaf("annotation"), single("body")] },
            NodeTag::Application => const { &[single("function"), single("argument")] },
            NodeTag::Let => const {
                &[leaf("name"), leaf("annotation"), single("value"), single("body")]
            },
            NodeTag::LetRec => const { &[bunched("arms"), single("body")] },
            NodeTag::LetRecArm => const {
                &[
                    leaf("name"),
                    leaf("parameter"),
                    leaf("parameter_annotation"),
                    leaf("result_annotation"),
                    single("body"),
                ]
            },
            NodeTag::Conditional => const {
                &[single("condition"), single("then_branch"), single("else_branch")]
            },
            NodeTag::BinaryOp => const { &[leaf("operator"), single("lhs"), single("rhs")] },
            NodeTag::UnaryOp => const { &[leaf("operator"), single("operand")] },
            NodeTag::Sequence => const { &[bunched("statements")] },
            NodeTag::Tuple => const { &[bunched("elements")] },
            NodeTag::Projection => const { &[leaf("index"), leaf("arity"), single("target")] },
            NodeTag::Match => const { &[single("scrutinee"), bunched("arms")] },
            NodeTag::MatchArm => const { &[single("pattern"), single("body")] },
            NodeTag::DataType => const { &[leaf("name"), bunched("constructors"), single("body")] },
            NodeTag::DataConstructor => const { &[leaf("name"), leaf("parameters"), leaf("tag")] },
            NodeTag::PatternBinder => const { &[leaf("name")] },
            NodeTag::PatternTuple => const { &[bunched("elements")] },
            NodeTag::PatternLiteral => const { &[leaf("value")] },
            NodeTag::PatternConstructor => const {
                &[leaf("name"), bunched("arguments"), leaf("tag")]
            },
            NodeTag::IndexedVariable => const { &[leaf("depth"), leaf("sibling")] },
        }
    }
}

/// A terminal field value
#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    Name(String),
    Literal(Literal),
    Builtin(BuiltinKind),
    BinaryOperator(BinaryOperator),
    UnaryOperator(UnaryOperator),
    Annotation(Option<TypeExpression>),
    Annotations(Vec<TypeExpression>),
    Count(usize),
    OptionalCount(Option<usize>),
    Tag(Option<u32>),
}

impl core::fmt::Display for LeafValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeafValue::Name(name) => f.write_str(name),
            LeafValue::Literal(literal) => write!(f, "{literal}"),
            LeafValue::Builtin(builtin) => write!(f, "{builtin}"),
            LeafValue::BinaryOperator(operator) => write!(f, "{operator}"),
            LeafValue::UnaryOperator(operator) => write!(f, "{operator}"),
            LeafValue::Annotation(Some(ty)) => write!(f, "{ty}"),
            LeafValue::Annotations(types) => {
                write!(f, "[")?;
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, "]")
            }
            LeafValue::Count(count) => write!(f, "{count}"),
            LeafValue::OptionalCount(Some(count)) => write!(f, "{count}"),
            LeafValue::Tag(Some(tag)) => write!(f, "{tag}"),
            LeafValue::Annotation(None) | LeafValue::OptionalCount(None) | LeafValue::Tag(None) => {
                f.write_str("_")
            }
        }
    }
}

/// An owned field value, used to build a node generically
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Single(Node),
    Bunched(Vec<Node>),
    Leaf(LeafValue),
}

impl Field {
    fn shape(&self) -> FieldShape {
        match self {
            Field::Single(_) => FieldShape::Single,
            Field::Bunched(_) => FieldShape::Bunched,
            Field::Leaf(_) => FieldShape::Leaf,
        }
    }
}

/// A field value yielded in schema order by [`Node::fields`]. Subtrees are
/// borrowed, leaves are copied out.
#[derive(Debug, Clone)]
pub enum FieldRef<'a> {
    Single(&'a Node),
    Bunched(&'a [Node]),
    Leaf(LeafValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("`{tag}` expects {expected} fields but {found} were given")]
    FieldCount {
        tag: NodeTag,
        expected: usize,
        found: usize,
    },
    #[error("`{tag}` has no field `{found}` at position {index} (expected `{expected}`)")]
    UnexpectedField {
        tag: NodeTag,
        index: usize,
        expected: &'static str,
        found: String,
    },
    #[error("field `{field}` of `{tag}` has the wrong shape (expected {expected:?})")]
    WrongShape {
        tag: NodeTag,
        field: &'static str,
        expected: FieldShape,
    },
    #[error("field `{field}` of `{tag}` holds the wrong kind of leaf value")]
    WrongLeaf { tag: NodeTag, field: &'static str },
}

impl Default for Node {
    /// A synthetic unit literal, used as a placeholder while a child is moved
    /// out for transformation
    fn default() -> Self {
        Node::new(NodeKind::Literal(Literal::Unit), Position::SYNTHETIC)
    }
}

impl Node {
    pub fn new(kind: NodeKind, position: Position) -> Self {
        Self {
            kind,
            position,
            ty: None,
        }
    }

    pub fn tag(&self) -> NodeTag {
        NodeTag::from(&self.kind)
    }

    pub fn top(expression: Node) -> Self {
        let position = expression.position;
        Self::new(
            NodeKind::Top {
                expression: Box::new(expression),
            },
            position,
        )
    }

    pub fn literal(literal: Literal, position: Position) -> Self {
        Self::new(NodeKind::Literal(literal), position)
    }

    pub fn integer(value: i64, position: Position) -> Self {
        Self::literal(Literal::Integer(value), position)
    }

    pub fn variable(name: impl Into<String>, position: Position) -> Self {
        Self::new(NodeKind::VariableReference { name: name.into() }, position)
    }

    pub fn builtin(builtin: BuiltinKind, position: Position) -> Self {
        Self::new(NodeKind::Builtin(builtin), position)
    }

    pub fn lambda(parameter: impl Into<String>, body: Node, position: Position) -> Self {
        Self::new(
            NodeKind::Lambda {
                parameter: parameter.into(),
                annotation: None,
                body: Box::new(body),
            },
            position,
        )
    }

    pub fn application(function: Node, argument: Node, position: Position) -> Self {
        Self::new(
            NodeKind::Application {
                function: Box::new(function),
                argument: Box::new(argument),
            },
            position,
        )
    }

    pub fn let_in(name: impl Into<String>, value: Node, body: Node, position: Position) -> Self {
        Self::new(
            NodeKind::Let {
                name: name.into(),
                annotation: None,
                value: Box::new(value),
                body: Box::new(body),
            },
            position,
        )
    }

    pub fn conditional(condition: Node, then_branch: Node, else_branch: Node, position: Position) -> Self {
        Self::new(
            NodeKind::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            position,
        )
    }

    pub fn binary(operator: BinaryOperator, lhs: Node, rhs: Node, position: Position) -> Self {
        Self::new(
            NodeKind::BinaryOp {
                operator,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            position,
        )
    }

    pub fn tuple(elements: Vec<Node>, position: Position) -> Self {
        Self::new(NodeKind::Tuple { elements }, position)
    }

    pub fn projection(target: Node, index: usize, arity: Option<usize>, position: Position) -> Self {
        Self::new(
            NodeKind::Projection {
                index,
                arity,
                target: Box::new(target),
            },
            position,
        )
    }

    /// The field values of this node in schema order
    pub fn fields(&self) -> Vec<(&'static str, FieldRef<'_>)> {
        use FieldRef::{Bunched, Leaf, Single};

        let values = match &self.kind {
            NodeKind::Top { expression } => vec![Single(expression)],
            NodeKind::Literal(literal) | NodeKind::PatternLiteral(literal) => {
                vec![Leaf(LeafValue::Literal(*literal))]
            }
            NodeKind::VariableReference { name } | NodeKind::PatternBinder { name } => {
                vec![Leaf(LeafValue::Name(name.clone()))]
            }
            NodeKind::Builtin(builtin) => vec![Leaf(LeafValue::Builtin(*builtin))],
            NodeKind::Lambda {
                parameter,
                annotation,
                body,
            } => vec![
                Leaf(LeafValue::Name(parameter.clone())),
                Leaf(LeafValue::Annotation(annotation.clone())),
                Single(body),
            ],
            NodeKind::Application { function, argument } => {
                vec![Single(function), Single(argument)]
            }
            NodeKind::Let {
                name,
                annotation,
                value,
                body,
            } => vec![
                Leaf(LeafValue::Name(name.clone())),
                Leaf(LeafValue::Annotation(annotation.clone())),
                Single(value),
                Single(body),
            ],
            NodeKind::LetRec { arms, body } => vec![Bunched(arms), Single(body)],
            NodeKind::LetRecArm {
                name,
                parameter,
                parameter_annotation,
                result_annotation,
                body,
            } => vec![
                Leaf(LeafValue::Name(name.clone())),
                Leaf(LeafValue::Name(parameter.clone())),
                Leaf(LeafValue::Annotation(parameter_annotation.clone())),
                Leaf(LeafValue::Annotation(result_annotation.clone())),
                Single(body),
            ],
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => vec![Single(condition), Single(then_branch), Single(else_branch)],
            NodeKind::BinaryOp { operator, lhs, rhs } => vec![
                Leaf(LeafValue::BinaryOperator(*operator)),
                Single(lhs),
                Single(rhs),
            ],
            NodeKind::UnaryOp { operator, operand } => {
                vec![Leaf(LeafValue::UnaryOperator(*operator)), Single(operand)]
            }
            NodeKind::Sequence { statements } => vec![Bunched(statements)],
            NodeKind::Tuple { elements } | NodeKind::PatternTuple { elements } => {
                vec![Bunched(elements)]
            }
            NodeKind::Projection {
                index,
                arity,
                target,
            } => vec![
                Leaf(LeafValue::Count(*index)),
                Leaf(LeafValue::OptionalCount(*arity)),
                Single(target),
            ],
            NodeKind::Match { scrutinee, arms } => vec![Single(scrutinee), Bunched(arms)],
            NodeKind::MatchArm { pattern, body } => vec![Single(pattern), Single(body)],
            NodeKind::DataType {
                name,
                constructors,
                body,
            } => vec![
                Leaf(LeafValue::Name(name.clone())),
                Bunched(constructors),
                Single(body),
            ],
            NodeKind::DataConstructor {
                name,
                parameters,
                tag,
            } => vec![
                Leaf(LeafValue::Name(name.clone())),
                Leaf(LeafValue::Annotations(parameters.clone())),
                Leaf(LeafValue::Tag(*tag)),
            ],
            NodeKind::PatternConstructor {
                name,
                arguments,
                tag,
            } => vec![
                Leaf(LeafValue::Name(name.clone())),
                Bunched(arguments),
                Leaf(LeafValue::Tag(*tag)),
            ],
            NodeKind::IndexedVariable { depth, sibling } => vec![
                Leaf(LeafValue::Count(*depth)),
                Leaf(LeafValue::OptionalCount(*sibling)),
            ],
        };

        self.tag()
            .schema()
            .iter()
            .map(|spec| spec.name)
            .zip(values)
            .collect()
    }

    /// Child subtrees in schema order, bunched fields expanded element-wise
    pub fn children(&self) -> Vec<&Node> {
        self.fields()
            .into_iter()
            .flat_map(|(_, field)| match field {
                FieldRef::Single(node) => vec![node],
                FieldRef::Bunched(nodes) => nodes.iter().collect(),
                FieldRef::Leaf(_) => vec![],
            })
            .collect()
    }

    /// Mutable child subtrees in the same order as [`Node::children`]
    pub fn children_mut(&mut self) -> Vec<&mut Node> {
        match &mut self.kind {
            NodeKind::Top { expression } => vec![expression],
            NodeKind::Literal(_)
            | NodeKind::PatternLiteral(_)
            | NodeKind::VariableReference { .. }
            | NodeKind::PatternBinder { .. }
            | NodeKind::Builtin(_)
            | NodeKind::DataConstructor { .. }
            | NodeKind::IndexedVariable { .. } => vec![],
            NodeKind::Lambda { body, .. } | NodeKind::LetRecArm { body, .. } => vec![body],
            NodeKind::Application { function, argument } => vec![function, argument],
            NodeKind::Let { value, body, .. } => vec![value, body],
            NodeKind::LetRec { arms, body } => {
                let mut children: Vec<&mut Node> = arms.iter_mut().collect();
                children.push(body);
                children
            }
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => vec![condition, then_branch, else_branch],
            NodeKind::BinaryOp { lhs, rhs, .. } => vec![lhs, rhs],
            NodeKind::UnaryOp { operand, .. } => vec![operand],
            NodeKind::Sequence { statements } => statements.iter_mut().collect(),
            NodeKind::Tuple { elements } | NodeKind::PatternTuple { elements } => {
                elements.iter_mut().collect()
            }
            NodeKind::Projection { target, .. } => vec![target],
            NodeKind::Match { scrutinee, arms } => {
                let mut children: Vec<&mut Node> = vec![scrutinee];
                children.extend(arms.iter_mut());
                children
            }
            NodeKind::MatchArm { pattern, body } => vec![pattern, body],
            NodeKind::DataType {
                constructors, body, ..
            } => {
                let mut children: Vec<&mut Node> = constructors.iter_mut().collect();
                children.push(body);
                children
            }
            NodeKind::PatternConstructor { arguments, .. } => arguments.iter_mut().collect(),
        }
    }

    /// Builds a node from a complete set of named fields, failing unless the
    /// fields match the schema of `tag` exactly (same names, same order, same
    /// shapes, and leaf values of the right kind)
    pub fn from_fields(
        tag: NodeTag,
        position: Position,
        fields: Vec<(&str, Field)>,
    ) -> Result<Node, SchemaError> {
        let schema = tag.schema();

        if fields.len() != schema.len() {
            return Err(SchemaError::FieldCount {
                tag,
                expected: schema.len(),
                found: fields.len(),
            });
        }

        for (index, (spec, (name, field))) in schema.iter().zip(fields.iter()).enumerate() {
            if spec.name != *name {
                return Err(SchemaError::UnexpectedField {
                    tag,
                    index,
                    expected: spec.name,
                    found: name.to_string(),
                });
            }

            if spec.shape != field.shape() {
                return Err(SchemaError::WrongShape {
                    tag,
                    field: spec.name,
                    expected: spec.shape,
                });
            }
        }

        let mut values = FieldReader {
            tag,
            schema,
            index: 0,
            fields: fields.into_iter().map(|(_, field)| field).collect::<Vec<_>>().into_iter(),
        };

        let kind = match tag {
            NodeTag::Top => NodeKind::Top {
                expression: values.single()?,
            },
            NodeTag::Literal => NodeKind::Literal(values.literal()?),
            NodeTag::VariableReference => NodeKind::VariableReference {
                name: values.name()?,
            },
            NodeTag::Builtin => match values.leaf()? {
                LeafValue::Builtin(builtin) => NodeKind::Builtin(builtin),
                _ => return Err(values.wrong_leaf()),
            },
            NodeTag::Lambda => NodeKind::Lambda {
                parameter: values.name()?,
                annotation: values.annotation()?,
                body: values.single()?,
            },
            NodeTag::Application => NodeKind::Application {
                function: values.single()?,
                argument: values.single()?,
            },
            NodeTag::Let => NodeKind::Let {
                name: values.name()?,
                annotation: values.annotation()?,
                value: values.single()?,
                body: values.single()?,
            },
            NodeTag::LetRec => NodeKind::LetRec {
                arms: values.bunched()?,
                body: values.single()?,
            },
            NodeTag::LetRecArm => NodeKind::LetRecArm {
                name: values.name()?,
                parameter: values.name()?,
                parameter_annotation: values.annotation()?,
                result_annotation: values.annotation()?,
                body: values.single()?,
            },
            NodeTag::Conditional => NodeKind::Conditional {
                condition: values.single()?,
                then_branch: values.single()?,
                else_branch: values.single()?,
            },
            NodeTag::BinaryOp => NodeKind::BinaryOp {
                operator: match values.leaf()? {
                    LeafValue::BinaryOperator(operator) => operator,
                    _ => return Err(values.wrong_leaf()),
                },
                lhs: values.single()?,
                rhs: values.single()?,
            },
            NodeTag::UnaryOp => NodeKind::UnaryOp {
                operator: match values.leaf()? {
                    LeafValue::UnaryOperator(operator) => operator,
                    _ => return Err(values.wrong_leaf()),
                },
                operand: values.single()?,
            },
            NodeTag::Sequence => NodeKind::Sequence {
                statements: values.bunched()?,
            },
            NodeTag::Tuple => NodeKind::Tuple {
                elements: values.bunched()?,
            },
            NodeTag::Projection => NodeKind::Projection {
                index: values.count()?,
                arity: values.optional_count()?,
                target: values.single()?,
            },
            NodeTag::Match => NodeKind::Match {
                scrutinee: values.single()?,
                arms: values.bunched()?,
            },
            NodeTag::MatchArm => NodeKind::MatchArm {
                pattern: values.single()?,
                body: values.single()?,
            },
            NodeTag::DataType => NodeKind::DataType {
                name: values.name()?,
                constructors: values.bunched()?,
                body: values.single()?,
            },
            NodeTag::DataConstructor => NodeKind::DataConstructor {
                name: values.name()?,
                parameters: match values.leaf()? {
                    LeafValue::Annotations(parameters) => parameters,
                    _ => return Err(values.wrong_leaf()),
                },
                tag: values.tag()?,
            },
            NodeTag::PatternBinder => NodeKind::PatternBinder {
                name: values.name()?,
            },
            NodeTag::PatternTuple => NodeKind::PatternTuple {
                elements: values.bunched()?,
            },
            NodeTag::PatternLiteral => NodeKind::PatternLiteral(values.literal()?),
            NodeTag::PatternConstructor => NodeKind::PatternConstructor {
                name: values.name()?,
                arguments: values.bunched()?,
                tag: values.tag()?,
            },
            NodeTag::IndexedVariable => NodeKind::IndexedVariable {
                depth: values.count()?,
                sibling: values.optional_count()?,
            },
        };

        Ok(Node::new(kind, position))
    }
}

/// Consumes already shape-checked fields in schema order
struct FieldReader {
    tag: NodeTag,
    schema: &'static [FieldSpec],
    index: usize,
    fields: std::vec::IntoIter<Field>,
}

impl FieldReader {
    fn next(&mut self) -> Field {
        self.index += 1;
        // The field count was checked against the schema before reading
        self.fields.next().unwrap_or(Field::Bunched(Vec::new()))
    }

    fn wrong_leaf(&self) -> SchemaError {
        SchemaError::WrongLeaf {
            tag: self.tag,
            field: self.schema[self.index.saturating_sub(1)].name,
        }
    }

    fn wrong_shape(&self, expected: FieldShape) -> SchemaError {
        SchemaError::WrongShape {
            tag: self.tag,
            field: self.schema[self.index.saturating_sub(1)].name,
            expected,
        }
    }

    fn single(&mut self) -> Result<Box<Node>, SchemaError> {
        match self.next() {
            Field::Single(node) => Ok(Box::new(node)),
            _ => Err(self.wrong_shape(FieldShape::Single)),
        }
    }

    fn bunched(&mut self) -> Result<Vec<Node>, SchemaError> {
        match self.next() {
            Field::Bunched(nodes) => Ok(nodes),
            _ => Err(self.wrong_shape(FieldShape::Bunched)),
        }
    }

    fn leaf(&mut self) -> Result<LeafValue, SchemaError> {
        match self.next() {
            Field::Leaf(value) => Ok(value),
            _ => Err(self.wrong_shape(FieldShape::Leaf)),
        }
    }

    fn name(&mut self) -> Result<String, SchemaError> {
        match self.leaf()? {
            LeafValue::Name(name) => Ok(name),
            _ => Err(self.wrong_leaf()),
        }
    }

    fn literal(&mut self) -> Result<Literal, SchemaError> {
        match self.leaf()? {
            LeafValue::Literal(literal) => Ok(literal),
            _ => Err(self.wrong_leaf()),
        }
    }

    fn annotation(&mut self) -> Result<Option<TypeExpression>, SchemaError> {
        match self.leaf()? {
            LeafValue::Annotation(annotation) => Ok(annotation),
            _ => Err(self.wrong_leaf()),
        }
    }

    fn count(&mut self) -> Result<usize, SchemaError> {
        match self.leaf()? {
            LeafValue::Count(count) => Ok(count),
            _ => Err(self.wrong_leaf()),
        }
    }

    fn optional_count(&mut self) -> Result<Option<usize>, SchemaError> {
        match self.leaf()? {
            LeafValue::OptionalCount(count) => Ok(count),
            _ => Err(self.wrong_leaf()),
        }
    }

    fn tag(&mut self) -> Result<Option<u32>, SchemaError> {
        match self.leaf()? {
            LeafValue::Tag(tag) => Ok(tag),
            _ => Err(self.wrong_leaf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    fn at(line: usize) -> Position {
        Position::new(line, 1)
    }

    #[test]
    fn test_from_fields_builds_matching_node() {
        let node = Node::from_fields(
            NodeTag::Application,
            at(1),
            vec![
                ("function", Field::Single(Node::variable("f", at(1)))),
                ("argument", Field::Single(Node::integer(1, at(1)))),
            ],
        )
        .unwrap();

        assert_eq!(
            node,
            Node::application(Node::variable("f", at(1)), Node::integer(1, at(1)), at(1))
        );
    }

    #[test]
    fn test_from_fields_rejects_missing_field() {
        let error = Node::from_fields(
            NodeTag::Application,
            at(1),
            vec![("function", Field::Single(Node::variable("f", at(1))))],
        )
        .unwrap_err();

        assert_eq!(
            error,
            SchemaError::FieldCount {
                tag: NodeTag::Application,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_from_fields_rejects_wrong_name_and_shape() {
        let renamed = Node::from_fields(
            NodeTag::Tuple,
            at(1),
            vec![("items", Field::Bunched(vec![]))],
        );
        assert!(matches!(renamed, Err(SchemaError::UnexpectedField { .. })));

        let unbunched = Node::from_fields(
            NodeTag::Tuple,
            at(1),
            vec![("elements", Field::Single(Node::integer(1, at(1))))],
        );
        assert!(matches!(
            unbunched,
            Err(SchemaError::WrongShape {
                expected: FieldShape::Bunched,
                ..
            })
        ));

        let wrong_leaf = Node::from_fields(
            NodeTag::VariableReference,
            at(1),
            vec![("name", Field::Leaf(LeafValue::Count(3)))],
        );
        assert!(matches!(wrong_leaf, Err(SchemaError::WrongLeaf { .. })));
    }

    #[test]
    fn test_fields_follow_schema_for_every_kind() {
        let sample = |tag: NodeTag| -> Node {
            let fields = tag
                .schema()
                .iter()
                .map(|spec| {
                    let field = match (tag, spec.name, spec.shape) {
                        (_, _, FieldShape::Single) => Field::Single(Node::integer(0, at(2))),
                        (_, _, FieldShape::Bunched) => Field::Bunched(vec![Node::integer(1, at(2))]),
                        (NodeTag::Literal | NodeTag::PatternLiteral, _, _) => {
                            Field::Leaf(LeafValue::Literal(Literal::Integer(7)))
                        }
                        (NodeTag::Builtin, _, _) => Field::Leaf(LeafValue::Builtin(BuiltinKind::Println)),
                        (NodeTag::BinaryOp, _, _) => {
                            Field::Leaf(LeafValue::BinaryOperator(BinaryOperator::Add))
                        }
                        (NodeTag::UnaryOp, _, _) => {
                            Field::Leaf(LeafValue::UnaryOperator(UnaryOperator::Negate))
                        }
                        (_, "annotation" | "parameter_annotation" | "result_annotation", _) => {
                            Field::Leaf(LeafValue::Annotation(None))
                        }
                        (_, "parameters", _) => Field::Leaf(LeafValue::Annotations(vec![])),
                        (_, "tag", _) => Field::Leaf(LeafValue::Tag(Some(0))),
                        (_, "index" | "depth", _) => Field::Leaf(LeafValue::Count(1)),
                        (_, "arity" | "sibling", _) => Field::Leaf(LeafValue::OptionalCount(None)),
                        _ => Field::Leaf(LeafValue::Name("x".to_string())),
                    };
                    (spec.name, field)
                })
                .collect();

            Node::from_fields(tag, at(2), fields).unwrap()
        };

        for tag in NodeTag::iter() {
            let node = sample(tag);
            let names: Vec<_> = node.fields().into_iter().map(|(name, _)| name).collect();
            let expected: Vec<_> = tag.schema().iter().map(|spec| spec.name).collect();

            assert_eq!(node.tag(), tag);
            assert_eq!(names, expected, "{tag}");
            assert_eq!(
                node.children().len(),
                node.clone().children_mut().len(),
                "{tag}"
            );
        }
    }

    #[test]
    fn test_schemas_outlive_their_tags() {
        let schemas: Vec<(NodeTag, &'static [FieldSpec])> =
            NodeTag::iter().map(|tag| (tag, tag.schema())).collect();

        let (_, lambda) = schemas
            .iter()
            .find(|(tag, _)| *tag == NodeTag::Lambda)
            .unwrap();
        assert_eq!(
            lambda.iter().map(|spec| spec.name).collect::<Vec<_>>(),
            vec!["parameter", "annotation", "body"]
        );
        assert!(schemas.iter().all(|(_, schema)| !schema.is_empty()));
    }
}
