use itertools::Itertools;

use super::{Emitter, Writer};
use crate::backend::{
    codegen::Program,
    instruction::{Block, Instruction},
};

/// The listing read by the SECD interpreter
pub struct AssemblyEmitter;

impl Emitter for AssemblyEmitter {
    fn emit_program(&self, program: &Program) -> String {
        let mut writer = Writer::default();

        for (i, block) in program.blocks.iter().enumerate() {
            if i > 0 {
                writer.blank_line();
            }
            emit_block(&mut writer, block);
        }

        writer.into_output()
    }
}

fn emit_block(writer: &mut Writer, block: &Block) {
    writer.push_line(format!("{}:", block.label));

    for instruction in &block.instructions {
        match instruction {
            Instruction::Label(label) => writer.push_line(format!("  {label}:")),
            Instruction::Binary(operator) => writer.emit(operator.mnemonic()),
            Instruction::Unary(operator) => writer.emit(operator.mnemonic()),
            Instruction::Branch(kind, label) => writer.emit(format!("{kind} {label}")),
            _ => writer.emit(format_instruction(instruction)),
        }
    }
}

fn format_instruction(instruction: &Instruction) -> String {
    let operands = match instruction {
        Instruction::Pop(n) | Instruction::Access(n) | Instruction::Focus(n) => n.to_string(),
        Instruction::Const(value) => value.to_string(),
        Instruction::Closure(label) => label.to_string(),
        Instruction::Closures(labels) => labels.iter().join(" "),
        Instruction::Builtin(builtin) => builtin.to_string(),
        _ => String::new(),
    };

    format!("{:<10}{operands}", instruction.opcode())
        .trim_end()
        .to_string()
}
