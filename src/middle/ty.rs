use std::rc::Rc;

use hashbrown::{HashMap, HashSet};

use crate::{
    frontend::Position,
    index::{Index, simple_index},
    tree::BaseType,
};

simple_index! {
    /// A type variable to be inferred
    pub struct TypeVariableId;
}

/// Thin pointer to a type kind. Types are immutable and shared freely.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Type(Rc<TypeKind>);

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// int, bool, unit
    Base(BaseType),
    /// 'a -> 'b
    Function { parameter: Type, result: Type },
    /// (int, bool)
    ///
    /// The arity is fixed when the type is built
    Tuple(Rc<[Type]>),
    /// An unresolved type variable whose type must be inferred
    Variable(TypeVariableId),
    /// A declared algebraic data type
    Data(Rc<str>),
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn int() -> Self {
        Self::new(TypeKind::Base(BaseType::Int))
    }

    pub fn bool() -> Self {
        Self::new(TypeKind::Base(BaseType::Bool))
    }

    pub fn unit() -> Self {
        Self::new(TypeKind::Base(BaseType::Unit))
    }

    pub fn base(base: BaseType) -> Self {
        Self::new(TypeKind::Base(base))
    }

    pub fn function(parameter: Type, result: Type) -> Self {
        Self::new(TypeKind::Function { parameter, result })
    }

    pub fn tuple(elements: impl IntoIterator<Item = Type>) -> Self {
        Self::new(TypeKind::Tuple(elements.into_iter().collect()))
    }

    pub fn variable(id: TypeVariableId) -> Self {
        Self::new(TypeKind::Variable(id))
    }

    pub fn data(name: &str) -> Self {
        Self::new(TypeKind::Data(name.into()))
    }

    pub fn free_type_variables(&self) -> HashSet<TypeVariableId> {
        let mut variables = HashSet::new();
        self.collect_free_type_variables(&mut variables);
        variables
    }

    fn collect_free_type_variables(&self, variables: &mut HashSet<TypeVariableId>) {
        match &*self.0 {
            TypeKind::Base(_) | TypeKind::Data(_) => {}
            TypeKind::Function { parameter, result } => {
                parameter.collect_free_type_variables(variables);
                result.collect_free_type_variables(variables);
            }
            TypeKind::Tuple(elements) => {
                for element in elements.iter() {
                    element.collect_free_type_variables(variables);
                }
            }
            TypeKind::Variable(id) => {
                variables.insert(*id);
            }
        }
    }

    pub fn occurs(&self, variable: TypeVariableId) -> bool {
        match &*self.0 {
            TypeKind::Base(_) | TypeKind::Data(_) => false,
            TypeKind::Function { parameter, result } => {
                parameter.occurs(variable) || result.occurs(variable)
            }
            TypeKind::Tuple(elements) => elements.iter().any(|t| t.occurs(variable)),
            TypeKind::Variable(id) => *id == variable,
        }
    }

    /// Rebuilds the type with every variable that `lookup` knows about
    /// replaced. Replacements are not substituted into again.
    pub fn substitute(&self, lookup: &impl Fn(TypeVariableId) -> Option<Type>) -> Type {
        match &*self.0 {
            TypeKind::Base(_) | TypeKind::Data(_) => self.clone(),
            TypeKind::Function { parameter, result } => Type::function(
                parameter.substitute(lookup),
                result.substitute(lookup),
            ),
            TypeKind::Tuple(elements) => {
                Type::tuple(elements.iter().map(|element| element.substitute(lookup)))
            }
            TypeKind::Variable(id) => lookup(*id).unwrap_or_else(|| self.clone()),
        }
    }

    /// Renders the type with its variables renamed `'a`, `'b`, ... in order of
    /// first appearance, so that equal types up to renaming print the same
    pub fn canonical(&self) -> String {
        let mut names = HashMap::new();
        let mut order = Vec::new();
        self.collect_in_order(&mut order);

        for id in order {
            let next = names.len();
            names.entry(id).or_insert(next);
        }

        self.render(&|id| {
            let index = names.get(&id).copied().unwrap_or(0);
            variable_name(index)
        })
    }

    fn collect_in_order(&self, order: &mut Vec<TypeVariableId>) {
        match &*self.0 {
            TypeKind::Base(_) | TypeKind::Data(_) => {}
            TypeKind::Function { parameter, result } => {
                parameter.collect_in_order(order);
                result.collect_in_order(order);
            }
            TypeKind::Tuple(elements) => {
                for element in elements.iter() {
                    element.collect_in_order(order);
                }
            }
            TypeKind::Variable(id) => order.push(*id),
        }
    }

    fn render(&self, name_of: &impl Fn(TypeVariableId) -> String) -> String {
        match &*self.0 {
            TypeKind::Base(base) => base.to_string(),
            TypeKind::Function { parameter, result } => {
                let parameter_text = parameter.render(name_of);
                match &**parameter {
                    TypeKind::Function { .. } => {
                        format!("({parameter_text}) -> {}", result.render(name_of))
                    }
                    _ => format!("{parameter_text} -> {}", result.render(name_of)),
                }
            }
            TypeKind::Tuple(elements) => format!(
                "({})",
                elements
                    .iter()
                    .map(|element| element.render(name_of))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeKind::Variable(id) => name_of(*id),
            TypeKind::Data(name) => name.to_string(),
        }
    }
}

fn variable_name(index: usize) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    match index / 26 {
        0 => format!("'{letter}"),
        n => format!("'{letter}{n}"),
    }
}

impl core::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Type").field(&self.0).finish()
    }
}

impl core::ops::Deref for Type {
    type Target = TypeKind;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render(&|id| format!("'t{}", id.index())))
    }
}

/// An equality between two types, remembering the node that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub left: Type,
    pub right: Type,
    pub position: Position,
}

impl Constraint {
    pub fn new(left: Type, right: Type, position: Position) -> Self {
        Self {
            left,
            right,
            position,
        }
    }

    pub fn is_trivial(&self) -> bool {
        self.left == self.right
    }

    pub fn substitute(&self, lookup: &impl Fn(TypeVariableId) -> Option<Type>) -> Constraint {
        Constraint {
            left: self.left.substitute(lookup),
            right: self.right.substitute(lookup),
            position: self.position,
        }
    }

    pub fn free_type_variables(&self) -> HashSet<TypeVariableId> {
        let mut variables = self.left.free_type_variables();
        variables.extend(self.right.free_type_variables());
        variables
    }
}

/// A generalized type together with the constraints its quantified variables
/// must satisfy. Only ever bound in a typing environment; every use
/// instantiates a fresh copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub quantified: Vec<TypeVariableId>,
    pub ty: Type,
    pub constraints: Vec<Constraint>,
}

/// What a name is bound to in a typing environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Mono(Type),
    Poly(Schema),
}

impl Binding {
    pub fn free_type_variables(&self) -> HashSet<TypeVariableId> {
        match self {
            Binding::Mono(ty) => ty.free_type_variables(),
            Binding::Poly(schema) => {
                let mut variables = schema.ty.free_type_variables();
                for constraint in &schema.constraints {
                    variables.extend(constraint.free_type_variables());
                }
                for id in &schema.quantified {
                    variables.remove(id);
                }
                variables
            }
        }
    }
}
