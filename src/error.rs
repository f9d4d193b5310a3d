use colored::Colorize;
use strum::Display;
use thiserror::Error;

use crate::frontend::{Position, SourceFile};

/// The fatal error classes, one per compiler concern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    /// Malformed source text
    SyntaxError,
    /// Unbound variable, duplicate binder, or undeclared/duplicate data type
    /// or constructor
    NameError,
    /// Local typing checks that are not expressible as constraints
    TypeError,
    /// Two types forced equal have different shapes, or a type would have to
    /// contain itself
    UnifyError,
    /// A reference the index resolver could not place. Indicates a defect in
    /// an earlier pass rather than in the user's program.
    UnboundNameError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {position}: {message}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub position: Position,
    pub message: String,
    /// Compiler source location that raised the error
    pub raised_at: Option<String>,
}

pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub fn new(kind: ErrorKind, position: Position, message: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            message: message.into(),
            raised_at: None,
        }
    }

    pub fn with_raised_at(mut self, raised_at: String) -> Self {
        self.raised_at = Some(raised_at);
        self
    }

    /// Formats the error the way the command line reports it, with the
    /// offending source line and a caret under the reported column
    pub fn render(&self, source: &SourceFile) -> String {
        let mut out = format!(
            "{}{} {}\n",
            format!("error[{}]", self.kind).red().bold(),
            ":".bold(),
            self.message.bold()
        );

        if self.position.is_synthetic() {
            out.push_str(&format!("  {} {}\n", "-->".blue(), source.origin));
        } else {
            out.push_str(&format!(
                "  {} {}:{}\n",
                "-->".blue(),
                source.origin,
                self.position
            ));

            if let Some(line) = source.line(self.position.line) {
                let gutter = self.position.line.to_string();
                let padding = " ".repeat(gutter.len());

                out.push_str(&format!("{padding} {}\n", "|".blue()));
                out.push_str(&format!("{} {} {line}\n", gutter.blue(), "|".blue()));
                out.push_str(&format!(
                    "{padding} {} {}{}\n",
                    "|".blue(),
                    " ".repeat(self.position.column.saturating_sub(1)),
                    "^".red().bold()
                ));
            }
        }

        if let Some(raised_at) = &self.raised_at {
            out.push_str(&format!("  {} {}\n", "backtrace:".blue(), raised_at.white()));
        }

        out
    }
}

macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("<unknown>")
    }};
}

/// Builds a [`CompileError`] of the given kind, recording where in the
/// compiler it was raised when the `error-backtrace` feature is enabled
macro_rules! located_error {
    ($kind:ident, $position:expr, $($message:tt)+) => {{
        #[allow(unused_mut)]
        let mut error = $crate::error::CompileError::new(
            $crate::error::ErrorKind::$kind,
            $position,
            format!($($message)+),
        );

        #[cfg(feature = "error-backtrace")]
        {
            error = error.with_raised_at(format!(
                "{}::{} (at {}:{}:{})",
                module_path!(),
                $crate::error::function!(),
                file!(),
                line!(),
                column!()
            ));
        }

        error
    }};
}

pub(crate) use function;
pub(crate) use located_error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_points_at_column() {
        colored::control::set_override(false);

        let source = SourceFile::from_memory("let y = x in y");
        let error = CompileError::new(ErrorKind::NameError, Position::new(1, 9), "unbound variable `x`");

        let rendered = error.render(&source);

        assert!(rendered.starts_with("error[NameError]: unbound variable `x`"));
        assert!(rendered.contains("--> <memory>:1:9"));
        assert!(rendered.contains("1 | let y = x in y"));
        assert!(rendered.contains(&format!("  | {}^", " ".repeat(8))));
    }

    #[test]
    fn test_located_error_records_kind() {
        let error = located_error!(TypeError, Position::SYNTHETIC, "bad {}", 1);

        assert_eq!(error.kind, ErrorKind::TypeError);
        assert_eq!(error.message, "bad 1");
        assert_eq!(
            error.raised_at.is_some(),
            cfg!(feature = "error-backtrace")
        );
    }
}
