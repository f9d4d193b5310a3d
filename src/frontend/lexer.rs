use std::{collections::BTreeMap, str::Chars};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;

use crate::{
    error::{CompileError, CompileResult, located_error},
    frontend::SourceFile,
};

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    chars: PeekNth<Chars<'source>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword),      // letrec
    Identifier,            // x
    ConstructorIdentifier, // Cons

    /* Literals */
    BooleanLiteral, // true
    IntegerLiteral, // 1

    /* Delimiters */
    OpenParen,  // (
    CloseParen, // )
    OpenBrace,  // {
    CloseBrace, // }
    Semicolon,  // ;
    Comma,      // ,

    /* Other */
    Colon,     // :
    Arrow,     // ->
    Backslash, // \
    Dot,       // .
    Pipe,      // |
    Equals,    // =

    /* Unary + Binary Ops */
    Minus, // -

    /* Binary Ops */
    Plus,                 // +
    Asterisk,             // *
    Divide,               // /
    Modulus,              // %
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
}

impl TokenKind {
    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::NotEquals
                | Self::DoubleEquals
                | Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Divide | Self::Modulus)
    }

    /// Tokens that may begin an argument in a juxtaposition application
    pub fn starts_atom(&self) -> bool {
        matches!(
            self,
            Self::Identifier
                | Self::ConstructorIdentifier
                | Self::IntegerLiteral
                | Self::BooleanLiteral
                | Self::OpenParen
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Let,
    Letrec,
    And,
    In,
    If,
    Then,
    Else,
    Match,
    Data,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        (':', TokenKind::Colon),
        ('\\', TokenKind::Backslash),
        ('.', TokenKind::Dot),
        ('|', TokenKind::Pipe),
        ('=', TokenKind::Equals),
        ('-', TokenKind::Minus),
        ('+', TokenKind::Plus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Divide),
        ('%', TokenKind::Modulus),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
        }
    }

    pub fn source(&self) -> &SourceFile {
        self.source
    }

    fn error(&self, message: String) -> CompileError {
        located_error!(SyntaxError, self.source.position_of(self.position), "{message}")
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn ignore_whitespace(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_whitespace() {
                break;
            }

            self.advance();
        }
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.advance();
        }
    }

    // Keyword, identifier, or boolean literal
    fn read_word(&mut self) -> Token {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            self.advance();
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = if let Ok(keyword) = value.parse() {
            TokenKind::Keyword(keyword)
        } else {
            match value {
                "true" | "false" => TokenKind::BooleanLiteral,
                v if v.starts_with(|c: char| c.is_ascii_uppercase()) => {
                    TokenKind::ConstructorIdentifier
                }
                _ => TokenKind::Identifier,
            }
        };

        Token { kind, span }
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_digit() {
                break;
            }

            self.advance();
        }

        Token {
            kind: TokenKind::IntegerLiteral,
            span: self.new_span(start_position),
        }
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;
        self.advance();

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;
        self.advance();
        self.advance();

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    fn next_is(&mut self, n: usize, expected: char) -> bool {
        self.chars.peek_nth(n).is_some_and(|c| *c == expected)
    }
}

impl Iterator for Lexer<'_> {
    type Item = CompileResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii() {
                return Some(Err(
                    self.error(format!("unexpected non-ascii character in stream: `{c}`"))
                ));
            }

            let token = match c {
                // Ignore whitespace
                c if c.is_ascii_whitespace() => {
                    self.ignore_whitespace();
                    continue;
                }
                // Ignore comments
                '/' if self.next_is(1, '/') => {
                    self.ignore_line();
                    continue;
                }

                // Integer literals
                n if n.is_ascii_digit() => self.read_number(),

                // Identifiers, keywords, and boolean literals
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                // Arrow (->)
                '-' if self.next_is(1, '>') => self.read_double(TokenKind::Arrow),
                // Double Equals (==)
                '=' if self.next_is(1, '=') => self.read_double(TokenKind::DoubleEquals),
                // Not Equals (!=)
                '!' if self.next_is(1, '=') => self.read_double(TokenKind::NotEquals),
                // Less than or equal (<=)
                '<' if self.next_is(1, '=') => self.read_double(TokenKind::LessThanOrEqualTo),
                // Greater than or equal (>=)
                '>' if self.next_is(1, '=') => {
                    self.read_double(TokenKind::GreaterThanOrEqualTo)
                }

                s if SINGLE_TOKENS.contains_key(&s) => self.read_single(SINGLE_TOKENS[&s]),
                c => {
                    return Some(Err(
                        self.error(format!("unexpected character in stream: `{c}`"))
                    ));
                }
            };

            return Some(Ok(token));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ErrorKind;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = SourceFile::from_memory(source);
        Lexer::new(&source)
            .map(|token| token.map(|t| t.kind))
            .collect::<CompileResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_lex_let_with_annotation() {
        assert_eq!(
            kinds("let x : int = 3 in x + 4 // trailing comment"),
            vec![
                TokenKind::Keyword(Keyword::Let),
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::IntegerLiteral,
                TokenKind::Keyword(Keyword::In),
                TokenKind::Identifier,
                TokenKind::Plus,
                TokenKind::IntegerLiteral,
            ]
        );
    }

    #[test]
    fn test_lex_operators_prefer_longest_match() {
        assert_eq!(
            kinds(r"\x -> x.0 >= 1 == true != false <= -2"),
            vec![
                TokenKind::Backslash,
                TokenKind::Identifier,
                TokenKind::Arrow,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::IntegerLiteral,
                TokenKind::GreaterThanOrEqualTo,
                TokenKind::IntegerLiteral,
                TokenKind::DoubleEquals,
                TokenKind::BooleanLiteral,
                TokenKind::NotEquals,
                TokenKind::BooleanLiteral,
                TokenKind::LessThanOrEqualTo,
                TokenKind::Minus,
                TokenKind::IntegerLiteral,
            ]
        );
    }

    #[test]
    fn test_lex_constructor_identifiers() {
        assert_eq!(
            kinds("data List = Nil | Cons(int, List)"),
            vec![
                TokenKind::Keyword(Keyword::Data),
                TokenKind::ConstructorIdentifier,
                TokenKind::Equals,
                TokenKind::ConstructorIdentifier,
                TokenKind::Pipe,
                TokenKind::ConstructorIdentifier,
                TokenKind::OpenParen,
                TokenKind::Identifier,
                TokenKind::Comma,
                TokenKind::ConstructorIdentifier,
                TokenKind::CloseParen,
            ]
        );
    }

    #[test]
    fn test_lex_unexpected_character() {
        let source = SourceFile::from_memory("1 +\n  @");
        let error = Lexer::new(&source)
            .collect::<CompileResult<Vec<_>>>()
            .unwrap_err();

        assert_eq!(error.kind, ErrorKind::SyntaxError);
        assert_eq!(error.position.line, 2);
        assert_eq!(error.position.column, 3);
    }
}
