use std::{collections::BTreeMap, path::Path, process::Command};

use itertools::Itertools;
use once_cell::sync::Lazy;

use crate::{
    backend::{
        CodeGenerator, CodegenError, CodegenOptions,
        assembler::{Assembler, X86Register},
    },
    middle::ir::{GeneratedIr, Instruction, PrintKind},
};

static ARITHMETIC_MNEMONICS: Lazy<BTreeMap<&'static str, &'static str>> =
    Lazy::new(|| BTreeMap::from([("+", "add"), ("-", "sub"), ("*", "imul")]));

/// Total over the six comparison tokens; anything else is a [`CodegenError`]
static COMPARISON_JUMPS: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("==", "je"),
        ("!=", "jne"),
        ("<", "jl"),
        ("<=", "jle"),
        (">", "jg"),
        (">=", "jge"),
    ])
});

/// Converts the signed integer in `rdi` to decimal and writes it to stdout
/// one byte per syscall, newline last. The sign is written before the digit
/// conversion starts, so the backwards buffer walk only ever covers digits.
/// Negating the most negative value wraps, but the unsigned divide then
/// reads the untouched bit pattern as 2^63, which is exactly the magnitude
/// to print.
const PRINT_INT: &str = indoc::indoc! {"
    print_int:
        mov rax, rdi
        mov rbx, 10
        cmp rax, 0
        jge .setup
        neg rax
        mov byte [digit_space_pos], '-'
        push rax
        mov rax, 1
        mov rdi, 1
        mov rsi, digit_space_pos
        mov rdx, 1
        syscall
        pop rax
    .setup:
        mov rcx, digit_space
    .convert:
        xor rdx, rdx
        div rbx
        add dl, '0'
        mov [rcx], dl
        inc rcx
        test rax, rax
        jnz .convert
        mov rsi, rcx
        dec rsi
        mov rdx, 1
    .emit:
        mov rax, 1
        mov rdi, 1
        syscall
        dec rsi
        cmp rsi, digit_space
        jl .newline
        jmp .emit
    .newline:
        mov byte [digit_space_pos], 10
        mov rax, 1
        mov rdi, 1
        mov rsi, digit_space_pos
        mov rdx, 1
        syscall
        ret
"};

/// Scans for the NUL terminator, then writes the whole string with a single
/// syscall. No newline is appended; the stored constant bytes already carry
/// one.
const PRINT_STR: &str = indoc::indoc! {"
    print_str:
        mov rsi, rdi
        xor rdx, rdx
    .scan:
        cmp byte [rsi + rdx], 0
        je .write
        inc rdx
        jmp .scan
    .write:
        mov rax, 1
        mov rdi, 1
        syscall
        ret
"};

pub struct CodeGeneratorX86_64LinuxGnu;

impl CodeGenerator for CodeGeneratorX86_64LinuxGnu {
    fn translate_to_asm(
        &self,
        ir: &GeneratedIr,
        options: &CodegenOptions,
    ) -> Result<String, CodegenError> {
        Emitter::new(ir, options).translate()
    }

    fn create_assembler_command(
        &self,
        input_file: &Path,
        output_file: &Path,
    ) -> std::process::Command {
        let mut cmd = Command::new("nasm");

        cmd.args([
            "-f",
            "elf64",
            "-o",
            output_file
                .to_str()
                .expect("Could not convert output_file to string"),
            input_file
                .to_str()
                .expect("Could not convert input_file to string"),
        ]);

        cmd
    }

    fn create_linker_command(
        &self,
        input_file: &Path,
        output_file: &Path,
    ) -> std::process::Command {
        let mut cmd = Command::new("ld");

        cmd.args([
            "-o",
            output_file
                .to_str()
                .expect("Could not convert output_file to string"),
            input_file
                .to_str()
                .expect("Could not convert input_file to string"),
        ]);

        cmd
    }
}

/// One emitter per `translate_to_asm` call, so the helper flags start out
/// clear on every run no matter how often a generator value is reused.
struct Emitter<'ir> {
    ir: &'ir GeneratedIr,
    options: &'ir CodegenOptions,
    asm: Assembler,
    needs_int_print: bool,
    needs_str_print: bool,
}

impl<'ir> Emitter<'ir> {
    fn new(ir: &'ir GeneratedIr, options: &'ir CodegenOptions) -> Self {
        Self {
            ir,
            options,
            asm: Assembler::new(),
            needs_int_print: false,
            needs_str_print: false,
        }
    }

    fn translate(mut self) -> Result<String, CodegenError> {
        self.prescan();

        self.emit_storage();
        self.emit_constants();
        self.emit_entry();
        self.emit_code()?;
        self.emit_exit();

        if self.needs_int_print {
            self.asm.blank();
            self.asm.raw(PRINT_INT);
        }
        if self.needs_str_print {
            self.asm.blank();
            self.asm.raw(PRINT_STR);
        }

        Ok(self.asm.into_output())
    }

    fn prescan(&mut self) {
        for instruction in self.ir.instructions() {
            if let Instruction::Print { kind, .. } = &*instruction {
                match kind {
                    PrintKind::Int => self.needs_int_print = true,
                    PrintKind::Str => self.needs_str_print = true,
                }
            }
        }
    }

    /// One 8-byte cell per identifier, plus scratch space for the digit
    /// conversion when the program prints integers
    fn emit_storage(&mut self) {
        self.asm.raw("section .bss");

        if self.needs_int_print {
            self.asm.emit("digit_space resb 100");
            self.asm.emit("digit_space_pos resb 8");
        }

        for name in self.ir.identifiers.keys() {
            self.asm.emit(format!("{name} resb 8"));
        }

        self.asm.blank();
    }

    /// String constants as explicit byte lists (never quoted literals, so
    /// arbitrary content transits unmodified) with a trailing newline and
    /// NUL terminator
    fn emit_constants(&mut self) {
        self.asm.raw("section .data");

        for (symbol, bytes) in &self.ir.constants {
            let data = bytes
                .iter()
                .map(|byte| byte.to_string())
                .chain(["10".to_owned(), "0".to_owned()])
                .join(", ");

            self.asm.emit(format!("{symbol} db {data}"));
        }

        self.asm.blank();
    }

    fn emit_entry(&mut self) {
        self.asm.raw("section .text");
        self.asm.emit("global _start");
        self.asm.blank();
        self.asm.label("_start");
    }

    fn emit_exit(&mut self) {
        self.asm.blank();
        self.asm.emit("mov rax, 60");
        self.asm.emit("mov rdi, 0");
        self.asm.emit("syscall");
    }

    fn emit_code(&mut self) -> Result<(), CodegenError> {
        for &handle in &self.ir.code {
            let instruction = self.ir.pool.get(handle);

            if self.options.emit_debug_info {
                self.asm
                    .comment(strip_ansi_escapes::strip_str(instruction.to_string()));
            }

            match &*instruction {
                Instruction::Assign {
                    var,
                    left,
                    operator: None,
                    right: _,
                } => {
                    if self.ir.constants.contains_key(left) {
                        // Copying a string constant copies its address
                        self.asm
                            .emit(format!("lea {}, [rel {left}]", X86Register::Rax));
                    } else {
                        self.load(X86Register::Rax, left);
                    }

                    self.store(var, X86Register::Rax);
                }
                Instruction::Assign {
                    var,
                    left,
                    operator: Some(operator),
                    right: Some(right),
                } => {
                    self.load(X86Register::Rax, left);

                    if operator == "/" {
                        self.asm.emit("cqo");
                        self.load(X86Register::Rbx, right);
                        self.asm.emit("idiv rbx");
                    } else {
                        let mnemonic = ARITHMETIC_MNEMONICS
                            .get(operator.as_str())
                            .ok_or_else(|| CodegenError::UnmappedOperator(operator.clone()))?;

                        self.load(X86Register::Rbx, right);
                        self.asm.emit(format!("{mnemonic} rax, rbx"));
                    }

                    self.store(var, X86Register::Rax);
                }
                Instruction::Assign { .. } => {
                    unreachable!("assign carries an operator without a right operand")
                }
                Instruction::Jump { target } => {
                    self.asm.emit(format!("jmp {target}"));
                }
                Instruction::Label { name } => {
                    self.asm.label(name);
                }
                Instruction::Compare {
                    left,
                    operator,
                    right,
                    target,
                } => {
                    self.load(X86Register::Rax, left);
                    self.asm.emit(format!("cmp rax, {}", resolve_operand(right)));

                    let jump = COMPARISON_JUMPS
                        .get(operator.as_str())
                        .ok_or_else(|| CodegenError::UnmappedComparison(operator.clone()))?;

                    self.asm.emit(format!("{jump} {target}"));
                }
                Instruction::Print {
                    kind: PrintKind::Int,
                    value,
                } => {
                    self.load(X86Register::Rdi, value);
                    self.asm.emit("call print_int");
                }
                Instruction::Print {
                    kind: PrintKind::Str,
                    value,
                } => {
                    if self.ir.constants.contains_key(value) {
                        // A constant symbol is already an address
                        self.asm.emit(format!("mov {}, {value}", X86Register::Rdi));
                    } else {
                        // A variable holds a pointer; load it
                        self.asm.emit(format!("mov {}, [{value}]", X86Register::Rdi));
                    }

                    self.asm.emit("call print_str");
                }
            }
        }

        Ok(())
    }

    fn load(&mut self, register: X86Register, name: &str) {
        self.asm
            .emit(format!("mov {register}, {}", resolve_operand(name)));
    }

    fn store(&mut self, name: &str, register: X86Register) {
        self.asm
            .emit(format!("mov {}, {register}", resolve_operand(name)));
    }
}

/// The only addressing-mode decision in the generator: a name that
/// lexically is a signed integer literal becomes an immediate; every other
/// name addresses that name's memory cell.
fn resolve_operand(name: &str) -> String {
    if is_integer_literal(name) {
        name.to_owned()
    } else {
        format!("[{name}]")
    }
}

fn is_integer_literal(name: &str) -> bool {
    let digits = name.strip_prefix('-').unwrap_or(name);

    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
