//! Scope resolution and alpha-renaming.
//!
//! Every binder gets a program-wide unique name of the form `name#n`, where
//! `n` counts the binders of that surface name seen so far. Data type and
//! constructor names are registered program-wide and must be unique; each
//! constructor is tagged with a dense integer in declaration order. Constructor
//! names are bound like ordinary variables but keep their surface name.

use hashbrown::HashSet;
use tracing::debug;

use super::{fresh::NameSupply, scope::Scope};
use crate::{
    error::{CompileResult, located_error},
    frontend::Position,
    tree::{
        Node, NodeKind, TypeExpression,
        visit::{Transformer, walk_mut},
    },
};

/// What a surface name refers to at some point in the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameBinding {
    Variable { name: String, renamed: String },
    Constructor { name: String, tag: u32 },
    DataType { name: String },
}

pub type NameScope = Scope<NameBinding>;

#[derive(Debug, Default)]
pub struct Namer {
    counters: NameSupply,
    declared_data_types: HashSet<String>,
    declared_constructors: HashSet<String>,
    next_tag: u32,
    renamed_binders: usize,
}

impl Namer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renames every binder in the tree and tags every constructor
    #[tracing::instrument(skip_all)]
    pub fn resolve_names(tree: Node) -> CompileResult<Node> {
        let mut namer = Self::new();
        let tree = namer.transform(tree, &NameScope::empty())?;

        debug!(
            renamed_binders = namer.renamed_binders,
            constructors = namer.next_tag,
            "resolved names"
        );

        Ok(tree)
    }

    fn rename(&mut self, name: &str) -> String {
        self.renamed_binders += 1;
        let index = self.counters.next_index(name);
        format!("{name}#{index}")
    }

    fn bind_variable(&mut self, scope: &NameScope, name: &mut String) -> NameScope {
        let renamed = self.rename(name);
        let binding = NameBinding::Variable {
            name: std::mem::replace(name, renamed.clone()),
            renamed,
        };
        scope.extend(binding)
    }

    fn resolve_variable(&self, scope: &NameScope, name: &str, position: Position) -> CompileResult<String> {
        let found = scope.iter().find_map(|binding| match binding {
            NameBinding::Variable { name: bound, renamed } if bound == name => Some(renamed.clone()),
            NameBinding::Constructor { name: bound, .. } if bound == name => Some(bound.clone()),
            _ => None,
        });

        found.ok_or_else(|| located_error!(NameError, position, "unbound variable `{name}`"))
    }

    fn resolve_constructor(&self, scope: &NameScope, name: &str, position: Position) -> CompileResult<u32> {
        let found = scope.iter().find_map(|binding| match binding {
            NameBinding::Constructor { name: bound, tag } if bound == name => Some(*tag),
            _ => None,
        });

        found.ok_or_else(|| located_error!(NameError, position, "undeclared constructor `{name}`"))
    }

    fn check_annotation(
        &self,
        scope: &NameScope,
        annotation: &TypeExpression,
        position: Position,
    ) -> CompileResult<()> {
        match annotation {
            TypeExpression::Base(_) => Ok(()),
            TypeExpression::Named(name) => {
                let declared = scope.iter().any(|binding| {
                    matches!(binding, NameBinding::DataType { name: bound } if bound == name)
                });

                if declared {
                    Ok(())
                } else {
                    Err(located_error!(NameError, position, "undeclared data type `{name}`"))
                }
            }
            TypeExpression::Function(parameter, result) => {
                self.check_annotation(scope, parameter, position)?;
                self.check_annotation(scope, result, position)
            }
            TypeExpression::Tuple(elements) => elements
                .iter()
                .try_for_each(|element| self.check_annotation(scope, element, position)),
        }
    }

    fn check_optional_annotation(
        &self,
        scope: &NameScope,
        annotation: &Option<TypeExpression>,
        position: Position,
    ) -> CompileResult<()> {
        match annotation {
            Some(annotation) => self.check_annotation(scope, annotation, position),
            None => Ok(()),
        }
    }

    /// Renames the binders of a pattern, returning the scope the arm body is
    /// resolved in
    fn resolve_pattern(
        &mut self,
        pattern: &mut Node,
        scope: &NameScope,
        arm_scope: NameScope,
        bound_here: &mut HashSet<String>,
    ) -> CompileResult<NameScope> {
        let position = pattern.position;

        match &mut pattern.kind {
            NodeKind::PatternBinder { name } => {
                if name != "_" && !bound_here.insert(name.clone()) {
                    return Err(located_error!(
                        NameError,
                        position,
                        "`{name}` is bound more than once in the same pattern"
                    ));
                }

                Ok(self.bind_variable(&arm_scope, name))
            }
            NodeKind::PatternLiteral(_) => Ok(arm_scope),
            NodeKind::PatternTuple { elements } => {
                elements.iter_mut().try_fold(arm_scope, |arm_scope, element| {
                    self.resolve_pattern(element, scope, arm_scope, bound_here)
                })
            }
            NodeKind::PatternConstructor {
                name,
                arguments,
                tag,
            } => {
                *tag = Some(self.resolve_constructor(scope, name, position)?);

                arguments.iter_mut().try_fold(arm_scope, |arm_scope, argument| {
                    self.resolve_pattern(argument, scope, arm_scope, bound_here)
                })
            }
            _ => Err(located_error!(
                SyntaxError,
                position,
                "{} is not a pattern",
                pattern.tag()
            )),
        }
    }
}

impl Transformer for Namer {
    type Context = NameScope;
    type Error = crate::error::CompileError;

    fn transform(&mut self, mut node: Node, scope: &NameScope) -> CompileResult<Node> {
        let position = node.position;

        match &mut node.kind {
            NodeKind::VariableReference { name } => {
                *name = self.resolve_variable(scope, name, position)?;
                Ok(node)
            }
            NodeKind::Lambda {
                parameter,
                annotation,
                body,
            } => {
                self.check_optional_annotation(scope, annotation, position)?;
                let inner = self.bind_variable(scope, parameter);
                **body = self.transform(std::mem::take(&mut **body), &inner)?;
                Ok(node)
            }
            NodeKind::Let {
                name,
                annotation,
                value,
                body,
            } => {
                self.check_optional_annotation(scope, annotation, position)?;
                **value = self.transform(std::mem::take(&mut **value), scope)?;
                let inner = self.bind_variable(scope, name);
                **body = self.transform(std::mem::take(&mut **body), &inner)?;
                Ok(node)
            }
            NodeKind::LetRec { arms, body } => {
                // 1) reject duplicate function names within the group
                let mut seen = HashSet::new();
                for arm in arms.iter() {
                    if let NodeKind::LetRecArm { name, .. } = &arm.kind {
                        if !seen.insert(name.clone()) {
                            return Err(located_error!(
                                NameError,
                                arm.position,
                                "`{name}` is defined more than once in the same letrec group"
                            ));
                        }
                    }
                }

                // 2) bind every function name before resolving any arm body
                let mut group = scope.clone();
                for arm in arms.iter_mut() {
                    if let NodeKind::LetRecArm { name, .. } = &mut arm.kind {
                        group = self.bind_variable(&group, name);
                    }
                }

                // 3) resolve each arm with its parameter bound on top
                for arm in arms.iter_mut() {
                    let arm_position = arm.position;
                    if let NodeKind::LetRecArm {
                        parameter,
                        parameter_annotation,
                        result_annotation,
                        body,
                        ..
                    } = &mut arm.kind
                    {
                        self.check_optional_annotation(scope, parameter_annotation, arm_position)?;
                        self.check_optional_annotation(scope, result_annotation, arm_position)?;
                        let inner = self.bind_variable(&group, parameter);
                        **body = self.transform(std::mem::take(&mut **body), &inner)?;
                    }
                }

                **body = self.transform(std::mem::take(&mut **body), &group)?;
                Ok(node)
            }
            NodeKind::DataType {
                name,
                constructors,
                body,
            } => {
                if !self.declared_data_types.insert(name.clone()) {
                    return Err(located_error!(
                        NameError,
                        position,
                        "data type `{name}` is declared more than once"
                    ));
                }

                let mut inner = scope.extend(NameBinding::DataType { name: name.clone() });

                for constructor in constructors.iter_mut() {
                    let constructor_position = constructor.position;
                    let NodeKind::DataConstructor {
                        name,
                        parameters,
                        tag,
                    } = &mut constructor.kind
                    else {
                        return Err(located_error!(
                            SyntaxError,
                            constructor_position,
                            "data type `{name}` may only contain constructors"
                        ));
                    };

                    if !self.declared_constructors.insert(name.clone()) {
                        return Err(located_error!(
                            NameError,
                            constructor_position,
                            "constructor `{name}` is declared more than once"
                        ));
                    }

                    // Parameters may refer to the type being declared
                    for parameter in parameters.iter() {
                        self.check_annotation(&inner, parameter, constructor_position)?;
                    }

                    *tag = Some(self.next_tag);
                    self.next_tag += 1;

                    inner = inner.extend(NameBinding::Constructor {
                        name: name.clone(),
                        tag: self.next_tag - 1,
                    });
                }

                **body = self.transform(std::mem::take(&mut **body), &inner)?;
                Ok(node)
            }
            NodeKind::MatchArm { pattern, body } => {
                let mut bound_here = HashSet::new();
                let inner = self.resolve_pattern(pattern, scope, scope.clone(), &mut bound_here)?;
                **body = self.transform(std::mem::take(&mut **body), &inner)?;
                Ok(node)
            }
            _ => walk_mut(self, node, scope),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::ErrorKind,
        frontend::{SourceFile, parser::Parser},
        tree::visit::{Visitor, walk},
    };

    fn resolve(source: &str) -> CompileResult<Node> {
        let tree = Parser::parse_program(&SourceFile::from_memory(source))?;
        Namer::resolve_names(tree)
    }

    /// Collects binder names, reference names, and constructor tags
    #[derive(Default)]
    struct Collect {
        binders: Vec<String>,
        references: Vec<String>,
        constructor_tags: Vec<(String, u32)>,
        pattern_tags: Vec<(String, u32)>,
    }

    impl Visitor for Collect {
        type Output = ();

        fn combine(&mut self, node: &Node, _children: Vec<()>) {
            match &node.kind {
                NodeKind::Lambda { parameter, .. } => self.binders.push(parameter.clone()),
                NodeKind::Let { name, .. } | NodeKind::PatternBinder { name } => {
                    self.binders.push(name.clone())
                }
                NodeKind::LetRecArm {
                    name, parameter, ..
                } => {
                    self.binders.push(name.clone());
                    self.binders.push(parameter.clone());
                }
                NodeKind::VariableReference { name } => self.references.push(name.clone()),
                NodeKind::DataConstructor {
                    name,
                    tag: Some(tag),
                    ..
                } => self.constructor_tags.push((name.clone(), *tag)),
                NodeKind::PatternConstructor {
                    name,
                    tag: Some(tag),
                    ..
                } => self.pattern_tags.push((name.clone(), *tag)),
                _ => {}
            }
        }
    }

    fn collect(tree: &Node) -> Collect {
        let mut collect = Collect::default();
        walk(&mut collect, tree);
        collect
    }

    #[test]
    fn test_binders_get_unique_names() {
        let tree = resolve(r"let x = 1 in let x = x + 1 in (\x -> x) x").unwrap();
        let collected = collect(&tree);

        let mut binders = collected.binders.clone();
        binders.sort();
        binders.dedup();

        assert_eq!(binders.len(), collected.binders.len());
        assert_eq!(collected.binders.len(), 3);
        for reference in &collected.references {
            assert!(collected.binders.contains(reference), "{reference}");
        }
    }

    #[test]
    fn test_references_resolve_to_innermost_binder() {
        let tree = resolve(r"let x = 1 in let x = x + 1 in x").unwrap();
        let collected = collect(&tree);

        // the value of the inner let sees the outer x, the body sees the inner
        assert_eq!(collected.references, vec!["x#0", "x#1"]);
    }

    #[test]
    fn test_letrec_arms_see_each_other() {
        let tree = resolve(
            "letrec even n = if n == 0 then true else odd (n - 1) \
             and odd n = if n == 0 then false else even (n - 1) in even 4",
        )
        .unwrap();
        let collected = collect(&tree);

        assert!(collected.references.contains(&"odd#0".to_string()));
        assert!(collected.references.contains(&"even#0".to_string()));
    }

    #[test]
    fn test_constructor_tags_follow_declaration_order() {
        let tree = resolve(
            "data Shape = Circle(int) | Square(int) | Dot in \
             data Answer = Yes | No in \
             match Circle 3 { Circle(r) -> r; Square(s) -> s; Dot -> 0 }",
        )
        .unwrap();
        let collected = collect(&tree);

        assert_eq!(
            collected.constructor_tags,
            vec![
                ("Circle".to_string(), 0),
                ("Square".to_string(), 1),
                ("Dot".to_string(), 2),
                ("Yes".to_string(), 3),
                ("No".to_string(), 4),
            ]
        );
        assert_eq!(
            collected.pattern_tags,
            vec![
                ("Circle".to_string(), 0),
                ("Square".to_string(), 1),
                ("Dot".to_string(), 2),
            ]
        );
        // constructors are referenced by their surface names
        assert!(collected.references.contains(&"Circle".to_string()));
    }

    #[test]
    fn test_name_errors() {
        let cases = [
            "x + 1",
            "letrec f x = x and f y = y in f 1",
            "data T = A in data T = B in 0",
            "data T = A | A in 0",
            "data T = A in data U = A in 0",
            "match 1 { Missing -> 0 }",
            "let x : Missing = 1 in x",
            "match (1, 2) { (a, a) -> a }",
        ];

        for source in cases {
            let error = resolve(source).unwrap_err();
            assert_eq!(error.kind, ErrorKind::NameError, "{source}");
        }
    }

    #[test]
    fn test_malformed_trees_are_rejected() {
        let at = Position::new(1, 1);
        let expression_as_pattern = Node::top(Node::new(
            NodeKind::Match {
                scrutinee: Box::new(Node::integer(1, at)),
                arms: vec![Node::new(
                    NodeKind::MatchArm {
                        pattern: Box::new(Node::integer(1, at)),
                        body: Box::new(Node::integer(2, at)),
                    },
                    at,
                )],
            },
            at,
        ));
        let expression_as_constructor = Node::top(Node::new(
            NodeKind::DataType {
                name: "T".to_string(),
                constructors: vec![Node::integer(1, at)],
                body: Box::new(Node::integer(2, at)),
            },
            at,
        ));

        for tree in [expression_as_pattern, expression_as_constructor] {
            let error = Namer::resolve_names(tree).unwrap_err();
            assert_eq!(error.kind, ErrorKind::SyntaxError, "{}", error.message);
        }
    }

    #[test]
    fn test_unbound_variable_position() {
        let error = resolve("let y = 1 in\n  y + z").unwrap_err();

        assert_eq!(error.position, Position::new(2, 7));
        assert_eq!(error.message, "unbound variable `z`");
    }
}
