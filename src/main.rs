use std::path::PathBuf;

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};

use crate::{
    backend::{CodeGenerator, CodegenOptions, Target},
    frontend::{SourceFile, SourceFileOrigin, parser::Parser, pretty_print::pretty_print_ast},
    middle::ir::{ast_lowering::LoweringContext, pretty_print::pretty_print_ir},
};

mod backend;
mod frontend;
mod index;
mod middle;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Trickle source file to compile
    source_file: PathBuf,

    /// Where to write the generated assembly (defaults to the source path
    /// with an `asm` extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Dump the parsed program tree
    #[arg(long)]
    emit_ast: bool,

    /// Dump the lowered IR
    #[arg(long)]
    emit_ir: bool,

    /// Interleave the IR as comments in the generated assembly
    #[arg(short = 'g', long)]
    debug_comments: bool,

    /// Assemble and link the output into an executable (requires nasm and
    /// ld on the PATH)
    #[arg(long)]
    link: bool,
}

fn main() {
    let args = Args::parse();

    if !args.source_file.exists() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Source file '{}' does not exist!", args.source_file.display()),
            )
            .exit()
    }

    if !args.source_file.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Input path '{}' is not a file!", args.source_file.display()),
            )
            .exit()
    }

    let contents = std::fs::read_to_string(&args.source_file)
        .expect("Failed to read input file (or invalid UTF-8)");

    let source_file = SourceFile {
        contents,
        origin: SourceFileOrigin::File(args.source_file.clone()),
    };

    let root = Parser::parse_program(&source_file);

    if args.emit_ast {
        println!("===== AST =====");
        pretty_print_ast(&root);
    }

    let ir = match LoweringContext::lower(&root) {
        Ok(ir) => ir,
        Err(error) => {
            let span = error.span();
            eprintln!(
                "error: {error} ({}:{}:{})",
                source_file.origin,
                source_file.row_for_position(span.start),
                source_file.column_for_position(span.start)
            );
            std::process::exit(1);
        }
    };

    if args.emit_ir {
        println!("===== IR =====");
        pretty_print_ir(&ir);
    }

    let generator = Target::x86_64LinuxGnu.get_code_generator();
    let options = CodegenOptions {
        emit_debug_info: args.debug_comments,
    };

    let asm = match generator.translate_to_asm(&ir, &options) {
        Ok(asm) => asm,
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(1);
        }
    };

    let output_path = args
        .output
        .unwrap_or_else(|| args.source_file.with_extension("asm"));

    if let Err(error) = std::fs::write(&output_path, &asm) {
        eprintln!("Failed to write '{}': {error}", output_path.display());
        std::process::exit(1);
    }

    if args.link {
        let object_file = mktemp::Temp::new_file().expect("Failed to create temporary object file");
        let executable_path = args.source_file.with_extension("");

        let status = generator
            .create_assembler_command(&output_path, object_file.as_ref())
            .status()
            .expect("Failed to invoke nasm");

        if !status.success() {
            std::process::exit(1);
        }

        let status = generator
            .create_linker_command(object_file.as_ref(), &executable_path)
            .status()
            .expect("Failed to invoke ld");

        if !status.success() {
            std::process::exit(1);
        }
    }
}
