use colored::Colorize;

use crate::middle::ir::{GeneratedIr, Instruction};

/// Prints the lowered instruction stream in three-address text form.
pub fn pretty_print_ir(ir: &GeneratedIr) {
    for instruction in ir.instructions() {
        println!("{instruction}");
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Assign {
                var,
                left,
                operator,
                right,
            } => {
                write!(f, "{} {} {left}", var.yellow(), "=".white())?;

                if let (Some(operator), Some(right)) = (operator, right) {
                    write!(f, " {} {right}", operator.white())?;
                }

                Ok(())
            }
            Instruction::Jump { target } => {
                write!(f, "{} {}", "jump".cyan(), target.blue())
            }
            Instruction::Label { name } => write!(f, "{}:", name.blue()),
            Instruction::Compare {
                left,
                operator,
                right,
                target,
            } => write!(
                f,
                "{} {left} {} {right} {} {}",
                "if".cyan(),
                operator.white(),
                "goto".cyan(),
                target.blue()
            ),
            Instruction::Print { kind, value } => {
                write!(f, "{}({kind}, {value})", "print".cyan())
            }
        }
    }
}
