use indoc::indoc;
use itertools::Itertools;

use super::{Emitter, Writer};
use crate::backend::{
    codegen::Program,
    instruction::{Block, BranchKind, Instruction, Label},
};

/// C source driving the host runtime declared in `secd.h`.
///
/// `Iclosures` keeps the runtime's spelling but not its effect on the
/// environment. The runtime must push the group onto the stack, where the
/// `Iapply` that follows it binds the group into the `letrec` body.
pub struct HostEmitter;

impl Emitter for HostEmitter {
    fn emit_program(&self, program: &Program) -> String {
        let prototypes = program
            .blocks
            .iter()
            .map(|block| format!("void {}(void);", function_name(&block.label)))
            .join("\n");

        let functions = program.blocks.iter().map(emit_function).join("\n");

        format!(
            indoc! {r#"
            #include "secd.h"

            {0}

            {1}"#
            },
            prototypes,
            functions
        )
    }
}

fn function_name(label: &Label) -> String {
    format!("secd_{label}")
}

fn emit_function(block: &Block) -> String {
    let mut writer = Writer::default();

    writer.push_line(format!("void {}(void) {{", function_name(&block.label)));
    for instruction in &block.instructions {
        writer.emit(format_call(instruction));
    }
    writer.push_line("}");

    writer.into_output()
}

fn format_call(instruction: &Instruction) -> String {
    let arguments = match instruction {
        Instruction::Halt | Instruction::Apply | Instruction::Return => String::new(),
        Instruction::Pop(n) | Instruction::Access(n) | Instruction::Focus(n) => n.to_string(),
        Instruction::Const(value) => return format!("Iconstint({value});"),
        Instruction::Closure(label) => function_name(label),
        Instruction::Closures(labels) => labels.iter().map(function_name).join(", "),
        Instruction::Builtin(builtin) => builtin.to_string(),
        Instruction::Binary(operator) => operator.to_string(),
        Instruction::Unary(operator) => operator.to_string(),
        Instruction::Branch(BranchKind::Br, label) => return format!("Ibr({label});"),
        Instruction::Branch(BranchKind::Brfl, label) => return format!("Ibr1(0 ==, {label});"),
        Instruction::Label(label) => label.to_string(),
    };

    format!("I{}({arguments});", instruction.opcode())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        index::IndexVec,
        tree::{BinaryOperator, BuiltinKind},
    };

    #[test]
    fn test_host_calls() {
        let program = Program {
            blocks: IndexVec::from_raw(vec![
                Block::new(
                    Label::new("main"),
                    vec![
                        Instruction::Closure(Label::new("lam0")),
                        Instruction::Const(3),
                        Instruction::Apply,
                        Instruction::Halt,
                    ],
                ),
                Block::new(
                    Label::new("lam0"),
                    vec![
                        Instruction::Access(1),
                        Instruction::Const(1),
                        Instruction::Binary(BinaryOperator::GreaterThan),
                        Instruction::Branch(BranchKind::Brfl, Label::new("fl0")),
                        Instruction::Label(Label::new("tr0")),
                        Instruction::Builtin(BuiltinKind::Println),
                        Instruction::Access(1),
                        Instruction::Apply,
                        Instruction::Branch(BranchKind::Br, Label::new("end0")),
                        Instruction::Label(Label::new("fl0")),
                        Instruction::Const(0),
                        Instruction::Label(Label::new("end0")),
                        Instruction::Return,
                    ],
                ),
            ]),
        };

        assert_eq!(
            HostEmitter.emit_program(&program),
            indoc! {r#"
                #include "secd.h"

                void secd_main(void);
                void secd_lam0(void);

                void secd_main(void) {
                    Iclosure(secd_lam0);
                    Iconstint(3);
                    Iapply();
                    Ihalt();
                }

                void secd_lam0(void) {
                    Iaccess(1);
                    Iconstint(1);
                    Ibinary(>);
                    Ibr1(0 ==, fl0);
                    Ilabel(tr0);
                    Ibuiltin(println);
                    Iaccess(1);
                    Iapply();
                    Ibr(end0);
                    Ilabel(fl0);
                    Iconstint(0);
                    Ilabel(end0);
                    Ireturn();
                }
            "#}
        );
    }

    #[test]
    fn test_closure_groups_name_functions() {
        let instruction = Instruction::Closures(vec![Label::new("clos0"), Label::new("clos1")]);

        assert_eq!(
            format_call(&instruction),
            "Iclosures(secd_clos0, secd_clos1);"
        );
    }

    #[test]
    fn test_closure_group_is_applied_to_the_letrec_body() {
        let block = Block::new(
            Label::new("main"),
            vec![
                Instruction::Closure(Label::new("letrec0")),
                Instruction::Closures(vec![Label::new("clos0")]),
                Instruction::Apply,
                Instruction::Halt,
            ],
        );

        assert_eq!(
            emit_function(&block),
            indoc! {"
                void secd_main(void) {
                    Iclosure(secd_letrec0);
                    Iclosures(secd_clos0);
                    Iapply();
                    Ihalt();
                }
            "}
        );
    }
}
