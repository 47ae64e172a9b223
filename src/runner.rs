use tracing::{debug, info};

use crate::ast::Program;
use crate::console::Console;
use crate::error::{Halt, LarkError};
use crate::evaluator::{Evaluator, EvaluatorConfig};
use crate::lexer::Lexer;
use crate::parser::Parser;

/// Run a whole script and return the process exit status.
pub fn run(source: &str, filename: Option<&str>, config: &EvaluatorConfig) -> i32 {
    let mut evaluator = Evaluator::with_config(config.clone(), Console::Stdio);
    run_in(&mut evaluator, source, filename)
}

/// Lex, parse and evaluate `source` in `evaluator`, then end its global
/// scope. Diagnostics are reported to stderr.
pub fn run_in(evaluator: &mut Evaluator, source: &str, filename: Option<&str>) -> i32 {
    evaluator.set_source(filename, source);
    let program = match parse_source(source) {
        Ok(program) => program,
        Err(error) => {
            error.report(source, filename);
            return 1;
        }
    };

    info!(
        file = filename.unwrap_or("<repl>"),
        statements = program.statements.len(),
        "evaluating program"
    );
    let result = evaluator
        .evaluate_program(&program)
        .and_then(|()| evaluator.finish());
    let _ = evaluator.console_mut().flush();

    match result {
        Ok(()) => 0,
        Err(halt) => report_halt(&halt, source, filename),
    }
}

pub fn parse_source(source: &str) -> Result<Program, LarkError> {
    parse_source_at(source, 0)
}

/// Parse `source[offset..]` with spans relative to the whole of `source`.
pub fn parse_source_at(source: &str, offset: usize) -> Result<Program, LarkError> {
    let mut lexer = Lexer::starting_at(source.to_string(), offset);
    let tokens = lexer.scan_tokens()?;
    debug!(tokens = tokens.len(), "lexed source");

    let mut parser = Parser::new(tokens);
    parser.parse()
}

/// Print the diagnostic for `halt` and return the matching exit status.
/// `panic` reports itself while it runs, so only errors are printed here.
pub fn report_halt(halt: &Halt, source: &str, filename: Option<&str>) -> i32 {
    match halt {
        Halt::Error(error) => {
            error.report(source, filename);
            1
        }
        Halt::Panic { .. } => 1,
        Halt::Exit(code) => *code,
    }
}
