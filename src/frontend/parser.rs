use tracing::debug;

use crate::{
    error::{CompileError, CompileResult, located_error},
    frontend::{
        Position, SourceFile,
        lexer::{Keyword, Lexer, Token, TokenKind},
    },
    tree::{BaseType, BuiltinKind, Literal, Node, NodeKind, TypeExpression, UnaryOperator},
};

#[derive(Debug)]
pub struct Parser<'source> {
    source: &'source SourceFile,
    tokens: Vec<Token>,
    cursor: usize,
}

impl<'source> Parser<'source> {
    /// Parses a whole program into a tree rooted at a `Top` node
    #[tracing::instrument(skip_all, fields(origin = %source.origin))]
    pub fn parse_program(source: &'source SourceFile) -> CompileResult<Node> {
        let tokens = Lexer::new(source).collect::<CompileResult<Vec<_>>>()?;
        debug!(tokens = tokens.len(), "lexed source");

        let mut parser = Self {
            source,
            tokens,
            cursor: 0,
        };

        let expression = parser.parse_expression()?;

        if let Some(token) = parser.peek() {
            return Err(parser.unexpected(token, "end of input"));
        }

        Ok(Node::top(expression))
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.cursor).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|token| token.kind)
    }

    fn next_is(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.cursor += 1;
        Some(token)
    }

    /// Consumes the next token if it is of the given kind
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.next_is(kind) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn position(&self, token: Token) -> Position {
        self.source.position_of(token.span.start)
    }

    fn text(&self, token: Token) -> &'source str {
        self.source.value_of_span(token.span)
    }

    fn unexpected(&self, token: Token, expecting: &str) -> CompileError {
        located_error!(
            SyntaxError,
            self.position(token),
            "expected {expecting} but found `{}`",
            self.text(token)
        )
    }

    fn end_of_input(&self, expecting: &str) -> CompileError {
        located_error!(
            SyntaxError,
            self.source.position_of(self.source.contents.len()),
            "expected {expecting} but reached end of file"
        )
    }

    fn expect_next(&mut self, expecting: &str) -> CompileResult<Token> {
        self.advance().ok_or_else(|| self.end_of_input(expecting))
    }

    fn expect_next_to_be(&mut self, kind: TokenKind, expecting: &str) -> CompileResult<Token> {
        let token = self.expect_next(expecting)?;

        if token.kind != kind {
            return Err(self.unexpected(token, expecting));
        }

        Ok(token)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> CompileResult<Token> {
        let expecting = format!("`{}`", format!("{keyword:?}").to_lowercase());
        self.expect_next_to_be(TokenKind::Keyword(keyword), &expecting)
    }

    fn parse_identifier(&mut self) -> CompileResult<(String, Position)> {
        let token = self.expect_next_to_be(TokenKind::Identifier, "an identifier")?;
        Ok((self.text(token).to_string(), self.position(token)))
    }

    fn parse_constructor_identifier(&mut self) -> CompileResult<(String, Position)> {
        let token = self.expect_next_to_be(
            TokenKind::ConstructorIdentifier,
            "a capitalized constructor or type name",
        )?;
        Ok((self.text(token).to_string(), self.position(token)))
    }

    fn parse_optional_annotation(&mut self) -> CompileResult<Option<TypeExpression>> {
        if self.eat(TokenKind::Colon) {
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    // a; b; c
    fn parse_expression(&mut self) -> CompileResult<Node> {
        let first = self.parse_statement()?;

        if !self.next_is(TokenKind::Semicolon) {
            return Ok(first);
        }

        let position = first.position;
        let mut statements = vec![first];

        while self.eat(TokenKind::Semicolon) {
            statements.push(self.parse_statement()?);
        }

        Ok(Node::new(NodeKind::Sequence { statements }, position))
    }

    fn parse_statement(&mut self) -> CompileResult<Node> {
        match self.peek_kind() {
            Some(TokenKind::Keyword(Keyword::Let)) => self.parse_let(),
            Some(TokenKind::Keyword(Keyword::Letrec)) => self.parse_letrec(),
            Some(TokenKind::Keyword(Keyword::Data)) => self.parse_data_type(),
            Some(TokenKind::Keyword(Keyword::If)) => self.parse_conditional(),
            Some(TokenKind::Keyword(Keyword::Match)) => self.parse_match(),
            Some(TokenKind::Backslash) => self.parse_lambda(),
            _ => self.parse_relational(),
        }
    }

    /// let x : int = 3 in x + 4
    fn parse_let(&mut self) -> CompileResult<Node> {
        let let_keyword = self.expect_keyword(Keyword::Let)?;
        let (name, _) = self.parse_identifier()?;
        let annotation = self.parse_optional_annotation()?;
        self.expect_next_to_be(TokenKind::Equals, "`=`")?;
        let value = self.parse_expression()?;
        self.expect_keyword(Keyword::In)?;
        let body = self.parse_expression()?;

        Ok(Node::new(
            NodeKind::Let {
                name,
                annotation,
                value: Box::new(value),
                body: Box::new(body),
            },
            self.position(let_keyword),
        ))
    }

    /// letrec f x = ... and g (y : int) : int = ... in body
    fn parse_letrec(&mut self) -> CompileResult<Node> {
        let letrec_keyword = self.expect_keyword(Keyword::Letrec)?;

        let mut arms = vec![self.parse_letrec_arm()?];
        while self.eat(TokenKind::Keyword(Keyword::And)) {
            arms.push(self.parse_letrec_arm()?);
        }

        self.expect_keyword(Keyword::In)?;
        let body = self.parse_expression()?;

        Ok(Node::new(
            NodeKind::LetRec {
                arms,
                body: Box::new(body),
            },
            self.position(letrec_keyword),
        ))
    }

    fn parse_letrec_arm(&mut self) -> CompileResult<Node> {
        let (name, position) = self.parse_identifier()?;

        let (parameter, parameter_annotation) = if self.eat(TokenKind::OpenParen) {
            let (parameter, _) = self.parse_identifier()?;
            self.expect_next_to_be(TokenKind::Colon, "`:`")?;
            let annotation = self.parse_type()?;
            self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;
            (parameter, Some(annotation))
        } else {
            let (parameter, _) = self.parse_identifier()?;
            (parameter, None)
        };

        let result_annotation = self.parse_optional_annotation()?;
        self.expect_next_to_be(TokenKind::Equals, "`=`")?;
        let body = self.parse_expression()?;

        Ok(Node::new(
            NodeKind::LetRecArm {
                name,
                parameter,
                parameter_annotation,
                result_annotation,
                body: Box::new(body),
            },
            position,
        ))
    }

    /// \x : int -> x + 1
    ///
    /// The annotation is a single type atom so the arrow is unambiguous;
    /// function types must be parenthesized.
    fn parse_lambda(&mut self) -> CompileResult<Node> {
        let backslash = self.expect_next_to_be(TokenKind::Backslash, "`\\`")?;
        let (parameter, _) = self.parse_identifier()?;

        let annotation = if self.eat(TokenKind::Colon) {
            Some(self.parse_type_atom()?)
        } else {
            None
        };

        self.expect_next_to_be(TokenKind::Arrow, "`->`")?;
        let body = self.parse_expression()?;

        Ok(Node::new(
            NodeKind::Lambda {
                parameter,
                annotation,
                body: Box::new(body),
            },
            self.position(backslash),
        ))
    }

    /// data List = Nil | Cons(int, List) in body
    fn parse_data_type(&mut self) -> CompileResult<Node> {
        let data_keyword = self.expect_keyword(Keyword::Data)?;
        let (name, _) = self.parse_constructor_identifier()?;
        self.expect_next_to_be(TokenKind::Equals, "`=`")?;

        let mut constructors = vec![self.parse_data_constructor()?];
        while self.eat(TokenKind::Pipe) {
            constructors.push(self.parse_data_constructor()?);
        }

        self.expect_keyword(Keyword::In)?;
        let body = self.parse_expression()?;

        Ok(Node::new(
            NodeKind::DataType {
                name,
                constructors,
                body: Box::new(body),
            },
            self.position(data_keyword),
        ))
    }

    fn parse_data_constructor(&mut self) -> CompileResult<Node> {
        let (name, position) = self.parse_constructor_identifier()?;

        let mut parameters = Vec::new();
        if self.eat(TokenKind::OpenParen) {
            parameters.push(self.parse_type()?);
            while self.eat(TokenKind::Comma) {
                parameters.push(self.parse_type()?);
            }
            self.expect_next_to_be(TokenKind::CloseParen, "`)` or `,`")?;
        }

        Ok(Node::new(
            NodeKind::DataConstructor {
                name,
                parameters,
                tag: None,
            },
            position,
        ))
    }

    /// if c then a else b
    fn parse_conditional(&mut self) -> CompileResult<Node> {
        let if_keyword = self.expect_keyword(Keyword::If)?;
        let condition = self.parse_expression()?;
        self.expect_keyword(Keyword::Then)?;
        let then_branch = self.parse_expression()?;
        self.expect_keyword(Keyword::Else)?;
        let else_branch = self.parse_statement()?;

        Ok(Node::conditional(
            condition,
            then_branch,
            else_branch,
            self.position(if_keyword),
        ))
    }

    /// match e { p -> a; q -> b }
    fn parse_match(&mut self) -> CompileResult<Node> {
        let match_keyword = self.expect_keyword(Keyword::Match)?;
        let scrutinee = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::OpenBrace, "`{`")?;

        let mut arms = Vec::new();
        loop {
            arms.push(self.parse_match_arm()?);

            if self.eat(TokenKind::Semicolon) {
                if self.eat(TokenKind::CloseBrace) {
                    break;
                }
            } else {
                self.expect_next_to_be(TokenKind::CloseBrace, "`;` or `}`")?;
                break;
            }
        }

        Ok(Node::new(
            NodeKind::Match {
                scrutinee: Box::new(scrutinee),
                arms,
            },
            self.position(match_keyword),
        ))
    }

    fn parse_match_arm(&mut self) -> CompileResult<Node> {
        let pattern = self.parse_pattern()?;
        let position = pattern.position;
        self.expect_next_to_be(TokenKind::Arrow, "`->`")?;
        let body = self.parse_statement()?;

        Ok(Node::new(
            NodeKind::MatchArm {
                pattern: Box::new(pattern),
                body: Box::new(body),
            },
            position,
        ))
    }

    fn parse_pattern(&mut self) -> CompileResult<Node> {
        let token = self.expect_next("a pattern")?;
        let position = self.position(token);

        let kind = match token.kind {
            TokenKind::Identifier => NodeKind::PatternBinder {
                name: self.text(token).to_string(),
            },
            TokenKind::IntegerLiteral => NodeKind::PatternLiteral(self.integer_literal(token, false)?),
            TokenKind::Minus => {
                let digits = self.expect_next_to_be(TokenKind::IntegerLiteral, "an integer")?;
                NodeKind::PatternLiteral(self.integer_literal(digits, true)?)
            }
            TokenKind::BooleanLiteral => {
                NodeKind::PatternLiteral(Literal::Boolean(self.text(token) == "true"))
            }
            TokenKind::ConstructorIdentifier => {
                let mut arguments = Vec::new();
                if self.eat(TokenKind::OpenParen) {
                    arguments.push(self.parse_pattern()?);
                    while self.eat(TokenKind::Comma) {
                        arguments.push(self.parse_pattern()?);
                    }
                    self.expect_next_to_be(TokenKind::CloseParen, "`)` or `,`")?;
                }

                NodeKind::PatternConstructor {
                    name: self.text(token).to_string(),
                    arguments,
                    tag: None,
                }
            }
            TokenKind::OpenParen => {
                if self.eat(TokenKind::CloseParen) {
                    NodeKind::PatternLiteral(Literal::Unit)
                } else {
                    let first = self.parse_pattern()?;

                    if !self.next_is(TokenKind::Comma) {
                        self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;
                        return Ok(first);
                    }

                    let mut elements = vec![first];
                    while self.eat(TokenKind::Comma) {
                        elements.push(self.parse_pattern()?);
                    }
                    self.expect_next_to_be(TokenKind::CloseParen, "`)` or `,`")?;

                    NodeKind::PatternTuple { elements }
                }
            }
            _ => return Err(self.unexpected(token, "a pattern")),
        };

        Ok(Node::new(kind, position))
    }

    // a == b
    fn parse_relational(&mut self) -> CompileResult<Node> {
        let lhs = self.parse_additive()?;

        match self.peek() {
            Some(token) if token.kind.is_comparison_operator() => {
                self.advance();
                let rhs = self.parse_additive()?;
                self.binary(token, lhs, rhs)
            }
            _ => Ok(lhs),
        }
    }

    // a + b - c
    fn parse_additive(&mut self) -> CompileResult<Node> {
        let mut lhs = self.parse_multiplicative()?;

        while let Some(token) = self.peek().filter(|t| t.kind.is_term_operator()) {
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = self.binary(token, lhs, rhs)?;
        }

        Ok(lhs)
    }

    // a * b / c
    fn parse_multiplicative(&mut self) -> CompileResult<Node> {
        let mut lhs = self.parse_unary()?;

        while let Some(token) = self.peek().filter(|t| t.kind.is_factor_operator()) {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = self.binary(token, lhs, rhs)?;
        }

        Ok(lhs)
    }

    fn binary(&self, operator: Token, lhs: Node, rhs: Node) -> CompileResult<Node> {
        let symbol = self.text(operator);
        let parsed = symbol.parse().map_err(|_| {
            located_error!(
                SyntaxError,
                self.position(operator),
                "`{symbol}` is not a binary operator"
            )
        })?;

        Ok(Node::binary(parsed, lhs, rhs, self.position(operator)))
    }

    // -a
    fn parse_unary(&mut self) -> CompileResult<Node> {
        let Some(minus) = self.peek().filter(|t| t.kind == TokenKind::Minus) else {
            return self.parse_application();
        };

        self.advance();
        let operand = self.parse_unary()?;

        Ok(Node::new(
            NodeKind::UnaryOp {
                operator: UnaryOperator::Negate,
                operand: Box::new(operand),
            },
            self.position(minus),
        ))
    }

    // f a b
    fn parse_application(&mut self) -> CompileResult<Node> {
        let mut function = self.parse_postfix()?;

        while self.peek_kind().is_some_and(|kind| kind.starts_atom()) {
            let argument = self.parse_postfix()?;
            let position = function.position;
            function = Node::application(function, argument, position);
        }

        Ok(function)
    }

    // t.0.1
    fn parse_postfix(&mut self) -> CompileResult<Node> {
        let mut target = self.parse_atom()?;

        while let Some(dot) = self.peek().filter(|t| t.kind == TokenKind::Dot) {
            self.advance();
            let index_token =
                self.expect_next_to_be(TokenKind::IntegerLiteral, "a tuple index")?;
            let index = self.text(index_token).parse().map_err(|_| {
                located_error!(
                    SyntaxError,
                    self.position(index_token),
                    "tuple index `{}` is out of range",
                    self.text(index_token)
                )
            })?;

            target = Node::projection(target, index, None, self.position(dot));
        }

        Ok(target)
    }

    fn parse_atom(&mut self) -> CompileResult<Node> {
        let token = self.expect_next("an expression")?;
        let position = self.position(token);

        match token.kind {
            TokenKind::IntegerLiteral => {
                Ok(Node::literal(self.integer_literal(token, false)?, position))
            }
            TokenKind::BooleanLiteral => Ok(Node::literal(
                Literal::Boolean(self.text(token) == "true"),
                position,
            )),
            TokenKind::Identifier => {
                let name = self.text(token);
                match name.parse::<BuiltinKind>() {
                    Ok(builtin) => Ok(Node::builtin(builtin, position)),
                    Err(_) => Ok(Node::variable(name, position)),
                }
            }
            TokenKind::ConstructorIdentifier => Ok(Node::variable(self.text(token), position)),
            TokenKind::OpenParen => {
                if self.eat(TokenKind::CloseParen) {
                    return Ok(Node::literal(Literal::Unit, position));
                }

                let first = self.parse_expression()?;

                if !self.next_is(TokenKind::Comma) {
                    self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;
                    return Ok(first);
                }

                let mut elements = vec![first];
                while self.eat(TokenKind::Comma) {
                    elements.push(self.parse_expression()?);
                }
                self.expect_next_to_be(TokenKind::CloseParen, "`)` or `,`")?;

                Ok(Node::tuple(elements, position))
            }
            _ => Err(self.unexpected(token, "an expression")),
        }
    }

    fn integer_literal(&self, token: Token, negative: bool) -> CompileResult<Literal> {
        let digits = self.text(token);
        let text = if negative {
            format!("-{digits}")
        } else {
            digits.to_string()
        };

        text.parse().map(Literal::Integer).map_err(|_| {
            located_error!(
                SyntaxError,
                self.position(token),
                "integer literal `{text}` does not fit in 64 bits"
            )
        })
    }

    // int -> (bool, List) -> unit
    fn parse_type(&mut self) -> CompileResult<TypeExpression> {
        let parameter = self.parse_type_atom()?;

        if self.eat(TokenKind::Arrow) {
            let result = self.parse_type()?;
            return Ok(TypeExpression::Function(
                Box::new(parameter),
                Box::new(result),
            ));
        }

        Ok(parameter)
    }

    fn parse_type_atom(&mut self) -> CompileResult<TypeExpression> {
        let token = self.expect_next("a type")?;

        match token.kind {
            TokenKind::Identifier => self
                .text(token)
                .parse::<BaseType>()
                .map(TypeExpression::Base)
                .map_err(|_| {
                    located_error!(
                        SyntaxError,
                        self.position(token),
                        "unknown type `{}`",
                        self.text(token)
                    )
                }),
            TokenKind::ConstructorIdentifier => {
                Ok(TypeExpression::Named(self.text(token).to_string()))
            }
            TokenKind::OpenParen => {
                if self.eat(TokenKind::CloseParen) {
                    return Ok(TypeExpression::Base(BaseType::Unit));
                }

                let first = self.parse_type()?;

                if !self.next_is(TokenKind::Comma) {
                    self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;
                    return Ok(first);
                }

                let mut elements = vec![first];
                while self.eat(TokenKind::Comma) {
                    elements.push(self.parse_type()?);
                }
                self.expect_next_to_be(TokenKind::CloseParen, "`)` or `,`")?;

                Ok(TypeExpression::Tuple(elements))
            }
            _ => Err(self.unexpected(token, "a type")),
        }
    }
}
