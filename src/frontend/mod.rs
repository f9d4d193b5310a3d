use std::path::PathBuf;

use self::lexer::Span;

pub mod lexer;
pub mod parser;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn from_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// 1-based row of the line containing the byte offset
    pub fn row_for_position(&self, position: usize) -> usize {
        self.contents[..position.min(self.contents.len())]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
            + 1
    }

    /// 1-based column of the byte offset within its line
    pub fn column_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());
        let line_start = self.contents[..position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);

        position - line_start + 1
    }

    pub fn position_of(&self, offset: usize) -> Position {
        Position::new(
            self.row_for_position(offset),
            self.column_for_position(offset),
        )
    }

    pub fn line(&self, row: usize) -> Option<&str> {
        row.checked_sub(1)
            .and_then(|index| self.contents.lines().nth(index))
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

/// A line and column in the source text. Nodes synthesized by the compiler
/// carry [`Position::SYNTHETIC`] unless they inherit one from the node they
/// replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const SYNTHETIC: Position = Position { line: 0, column: 0 };

    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn is_synthetic(&self) -> bool {
        *self == Self::SYNTHETIC
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_synthetic() {
            f.write_str("<synthetic>")
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_of_offsets() {
        let source = SourceFile::from_memory("let x = 1 in\nx + 2");

        assert_eq!(source.position_of(0), Position::new(1, 1));
        assert_eq!(source.position_of(4), Position::new(1, 5));
        assert_eq!(source.position_of(13), Position::new(2, 1));
        assert_eq!(source.position_of(17), Position::new(2, 5));
        assert_eq!(source.line(2), Some("x + 2"));
        assert_eq!(source.line(0), None);
    }
}
