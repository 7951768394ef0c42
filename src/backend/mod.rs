//! The backend consumes the flat IR stream and prints target assembly text.
//! Symbolic operands become immediates or memory cells, compares become
//! conditional jumps, and the two print helpers are appended only when the
//! program uses them.

use std::{path::Path, process::Command};

use thiserror::Error;

use crate::middle::ir::GeneratedIr;

pub mod assembler;
mod x86_64_linux_gnu;

pub trait CodeGenerator {
    fn translate_to_asm(
        &self,
        ir: &GeneratedIr,
        options: &CodegenOptions,
    ) -> Result<String, CodegenError>;
    fn create_assembler_command(&self, input_file: &Path, output_file: &Path) -> Command;
    fn create_linker_command(&self, input_file: &Path, output_file: &Path) -> Command;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CodegenOptions {
    /// Interleave the IR rendering as comments in the emitted assembly
    pub emit_debug_info: bool,
}

/// An IR operator with no entry in the instruction-selection tables. The
/// tables are total over everything lowering can produce, so reaching one
/// of these means the IR was built by hand or the tables rotted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodegenError {
    #[error("comparison operator `{0}` has no jump mnemonic")]
    UnmappedComparison(String),
    #[error("arithmetic operator `{0}` has no instruction mapping")]
    UnmappedOperator(String),
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    x86_64LinuxGnu,
}

impl Target {
    pub fn get_code_generator(self) -> impl CodeGenerator {
        match self {
            Target::x86_64LinuxGnu => x86_64_linux_gnu::CodeGeneratorX86_64LinuxGnu,
        }
    }
}
