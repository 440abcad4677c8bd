//! Command-line front end: assemble a source file into a flat binary.

use std::path::PathBuf;
use std::process::ExitCode;

use assembler::assemble_file;

fn main() -> ExitCode {
    let mut arguments = std::env::args_os().skip(1);
    let (Some(input), Some(output)) = (arguments.next(), arguments.next()) else {
        eprintln!("usage: sysdarft-asm <input.s> <output.bin>");
        return ExitCode::FAILURE;
    };
    if arguments.next().is_some() {
        eprintln!("usage: sysdarft-asm <input.s> <output.bin>");
        return ExitCode::FAILURE;
    }

    let input = PathBuf::from(input);
    let output = PathBuf::from(output);

    match assemble_file(&input) {
        Ok(image) => {
            if let Err(error) = std::fs::write(&output, &image) {
                eprintln!("error: cannot write {}: {error}", output.display());
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(errors) => {
            eprintln!("{}", errors.format_for_stderr());
            ExitCode::FAILURE
        }
    }
}
