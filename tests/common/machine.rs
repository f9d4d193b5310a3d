//! A small interpreter for generated programs, used to check what compiled
//! programs compute.

use std::rc::Rc;

use hashbrown::HashMap;
use secdc::{
    backend::{
        codegen::Program,
        instruction::{BranchKind, Instruction, Label},
    },
    tree::{BinaryOperator, BuiltinKind, UnaryOperator},
};

const STEP_LIMIT: usize = 1_000_000;

type Environment = Rc<Vec<Value>>;

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Builtin(BuiltinKind),
    Closure { block: Label, environment: Environment },
    Group { blocks: Rc<[Label]>, environment: Environment },
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    /// `halt` with an integer on top of the stack
    Value(i64),
    /// `halt` with a closure on top of the stack
    Closure,
    /// A `panic` builtin was applied to the exit code
    Panic(i64),
}

#[derive(Debug)]
pub struct Execution {
    pub halt: Halt,
    pub output: String,
}

struct Frame {
    block: Label,
    pc: usize,
    environment: Environment,
}

pub struct Machine<'a> {
    blocks: HashMap<&'a Label, &'a [Instruction]>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    environment: Environment,
    block: Label,
    pc: usize,
    output: String,
}

impl<'a> Machine<'a> {
    pub fn new(program: &'a Program) -> Self {
        let blocks = program
            .blocks
            .iter()
            .map(|block| (&block.label, block.instructions.as_slice()))
            .collect();

        Self {
            blocks,
            stack: Vec::new(),
            frames: Vec::new(),
            environment: Rc::new(Vec::new()),
            block: program.main().label.clone(),
            pc: 0,
            output: String::new(),
        }
    }

    pub fn run(mut self) -> Result<Execution, String> {
        for _ in 0..STEP_LIMIT {
            let instruction = self.fetch()?.clone();
            self.pc += 1;

            if let Some(halt) = self.step(&instruction)? {
                return Ok(Execution {
                    halt,
                    output: self.output,
                });
            }
        }

        Err(format!("no halt after {STEP_LIMIT} steps"))
    }

    fn fetch(&self) -> Result<&'a Instruction, String> {
        let block: &'a [Instruction] = *self
            .blocks
            .get(&self.block)
            .ok_or_else(|| format!("no block `{}`", self.block))?;

        block
            .get(self.pc)
            .ok_or_else(|| format!("fell off the end of `{}`", self.block))
    }

    fn pop(&mut self) -> Result<Value, String> {
        self.stack.pop().ok_or_else(|| "stack underflow".to_string())
    }

    fn pop_int(&mut self) -> Result<i64, String> {
        match self.pop()? {
            Value::Int(value) => Ok(value),
            other => Err(format!("expected an integer, found {other:?}")),
        }
    }

    fn extended(environment: &Environment, value: Value) -> Environment {
        let mut extended = environment.as_ref().clone();
        extended.push(value);
        Rc::new(extended)
    }

    fn jump(&mut self, label: &Label) -> Result<(), String> {
        let block = self.blocks[&self.block];
        self.pc = block
            .iter()
            .position(|instruction| instruction == &Instruction::Label(label.clone()))
            .ok_or_else(|| format!("no label `{label}` in `{}`", self.block))?;
        Ok(())
    }

    fn step(&mut self, instruction: &Instruction) -> Result<Option<Halt>, String> {
        match instruction {
            Instruction::Halt => {
                let halt = match self.pop()? {
                    Value::Int(value) => Halt::Value(value),
                    _ => Halt::Closure,
                };
                return Ok(Some(halt));
            }
            Instruction::Pop(n) => {
                for _ in 0..*n {
                    self.pop()?;
                }
            }
            Instruction::Const(value) => self.stack.push(Value::Int(*value)),
            Instruction::Access(depth) => {
                let value = self
                    .environment
                    .len()
                    .checked_sub(*depth)
                    .and_then(|index| self.environment.get(index))
                    .ok_or_else(|| format!("access {depth} outside the environment"))?
                    .clone();
                self.stack.push(value);
            }
            Instruction::Focus(sibling) => {
                let Value::Group {
                    blocks,
                    environment,
                } = self.pop()?
                else {
                    return Err("focus on something other than a group".to_string());
                };

                let block = sibling
                    .checked_sub(1)
                    .and_then(|position| blocks.get(position))
                    .ok_or_else(|| format!("focus {sibling} outside the group"))?
                    .clone();
                let group = Value::Group {
                    blocks,
                    environment: environment.clone(),
                };

                self.stack.push(Value::Closure {
                    block,
                    environment: Self::extended(&environment, group),
                });
            }
            Instruction::Closure(block) => self.stack.push(Value::Closure {
                block: block.clone(),
                environment: self.environment.clone(),
            }),
            Instruction::Closures(blocks) => self.stack.push(Value::Group {
                blocks: blocks.clone().into(),
                environment: self.environment.clone(),
            }),
            Instruction::Builtin(builtin) => self.stack.push(Value::Builtin(*builtin)),
            Instruction::Apply => {
                let argument = self.pop()?;
                match self.pop()? {
                    Value::Closure { block, environment } => {
                        self.frames.push(Frame {
                            block: std::mem::replace(&mut self.block, block),
                            pc: self.pc,
                            environment: std::mem::replace(
                                &mut self.environment,
                                Self::extended(&environment, argument),
                            ),
                        });
                        self.pc = 0;
                    }
                    Value::Builtin(builtin) => return self.call_builtin(builtin, argument),
                    other => return Err(format!("cannot apply {other:?}")),
                }
            }
            Instruction::Return => {
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| "return without a caller".to_string())?;
                self.block = frame.block;
                self.pc = frame.pc;
                self.environment = frame.environment;
            }
            Instruction::Binary(operator) => {
                let rhs = self.pop_int()?;
                let lhs = self.pop_int()?;
                self.stack.push(Value::Int(binary(*operator, lhs, rhs)?));
            }
            Instruction::Unary(UnaryOperator::Negate) => {
                let operand = self.pop_int()?;
                self.stack.push(Value::Int(-operand));
            }
            Instruction::Branch(BranchKind::Br, label) => self.jump(label)?,
            Instruction::Branch(BranchKind::Brfl, label) => {
                if self.pop_int()? == 0 {
                    self.jump(label)?;
                }
            }
            Instruction::Label(_) => {}
        }

        Ok(None)
    }

    fn call_builtin(&mut self, builtin: BuiltinKind, argument: Value) -> Result<Option<Halt>, String> {
        let text = match &argument {
            Value::Int(value) => value.to_string(),
            _ => "<closure>".to_string(),
        };

        match builtin {
            BuiltinKind::Println => {
                self.output.push_str(&text);
                self.output.push('\n');
            }
            BuiltinKind::Print => self.output.push_str(&text),
            BuiltinKind::Panic => {
                let code = argument.as_int().ok_or("panic with a non-integer code")?;
                return Ok(Some(Halt::Panic(code)));
            }
        }

        self.stack.push(Value::Int(0));
        Ok(None)
    }
}

fn binary(operator: BinaryOperator, lhs: i64, rhs: i64) -> Result<i64, String> {
    let value = match operator {
        BinaryOperator::Multiply => lhs.wrapping_mul(rhs),
        BinaryOperator::Divide => lhs.checked_div(rhs).ok_or("division by zero")?,
        BinaryOperator::Modulus => lhs.checked_rem(rhs).ok_or("division by zero")?,
        BinaryOperator::Add => lhs.wrapping_add(rhs),
        BinaryOperator::Subtract => lhs.wrapping_sub(rhs),
        BinaryOperator::GreaterThan => (lhs > rhs) as i64,
        BinaryOperator::LessThan => (lhs < rhs) as i64,
        BinaryOperator::GreaterThanOrEqualTo => (lhs >= rhs) as i64,
        BinaryOperator::LessThanOrEqualTo => (lhs <= rhs) as i64,
        BinaryOperator::Equals => (lhs == rhs) as i64,
        BinaryOperator::NotEquals => (lhs != rhs) as i64,
    };

    Ok(value)
}
