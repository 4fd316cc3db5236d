//! Run lambda calculus programs and print the normal form of every
//! expression, or start an interactive prompt when no file is given.
//!
//! Example usage:
//!
//!     cargo run -- --src-filepath test_programs/church_numerals.l

use std::process::ExitCode;

use clap::Parser;
use rust_lamb::end_to_end::{init_logging, run_interpreter, run_repl, InterpreterConfig};

fn main() -> ExitCode {
    let interpreter_config = InterpreterConfig::parse();
    init_logging(interpreter_config.log_level);

    let interpreter_result = if interpreter_config.src_filepath.is_empty() {
        run_repl(&interpreter_config)
    } else {
        run_interpreter(&interpreter_config, &mut std::io::stdout())
    };

    match interpreter_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(run_error) => {
            run_error.to_diagnostic().emit();
            ExitCode::FAILURE
        }
    }
}
