//! Textual renderings of a generated [`Program`].

use clap::ValueEnum;
use strum::{Display, EnumString};

use super::codegen::Program;

mod assembly;
mod host;

pub use assembly::AssemblyEmitter;
pub use host::HostEmitter;

pub trait Emitter {
    fn emit_program(&self, program: &Program) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, ValueEnum)]
pub enum EmitFormat {
    /// Assembly listing for the SECD interpreter
    #[default]
    #[strum(serialize = "asm")]
    #[value(name = "asm")]
    Assembly,
    /// C source calling into the host runtime, one function per block
    #[strum(serialize = "c")]
    #[value(name = "c")]
    Host,
}

impl EmitFormat {
    pub fn get_emitter(self) -> Box<dyn Emitter> {
        match self {
            EmitFormat::Assembly => Box::new(AssemblyEmitter),
            EmitFormat::Host => Box::new(HostEmitter),
        }
    }
}

/// Line-oriented output buffer shared by the emitters
#[derive(Debug, Default)]
struct Writer {
    output: String,
}

impl Writer {
    fn into_output(self) -> String {
        self.output
    }

    fn push_line(&mut self, string: impl AsRef<str>) {
        self.output.push_str(string.as_ref());
        self.output.push('\n');
    }

    fn emit(&mut self, string: impl AsRef<str>) {
        self.output.push_str("    ");
        self.push_line(string);
    }

    fn blank_line(&mut self) {
        self.output.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!("asm".parse::<EmitFormat>().unwrap(), EmitFormat::Assembly);
        assert_eq!("c".parse::<EmitFormat>().unwrap(), EmitFormat::Host);
        assert_eq!(EmitFormat::default().to_string(), "asm");
    }

    #[test]
    fn test_command_line_names_match_display() {
        for format in EmitFormat::value_variants() {
            let parsed = <EmitFormat as ValueEnum>::from_str(&format.to_string(), false).unwrap();
            assert_eq!(parsed, *format);
        }
    }
}
