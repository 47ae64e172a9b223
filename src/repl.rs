use std::io::{self, Write};

use crate::ast::{Expr, Stmt};
use crate::console::Console;
use crate::error::Halt;
use crate::evaluator::{Evaluator, EvaluatorConfig};
use crate::runner::{parse_source_at, report_halt};
use crate::value::Value;

/// Interactive loop keeping one evaluator, and so one global scope, alive
/// between lines. Returns the process exit status.
pub fn start(config: &EvaluatorConfig) -> i32 {
    println!("Lark Interpreter v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'quit' or press Ctrl+D to leave");
    println!();

    let mut evaluator = Evaluator::with_config(config.clone(), Console::Stdio);
    // Every line entered so far. Functions and defers from earlier lines keep
    // spans into this buffer, so diagnostics always have the right source.
    let mut history = String::new();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                // EOF reached (Ctrl+D or piped input ended)
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "quit" {
                    break;
                }

                let offset = history.len();
                history.push_str(line);
                history.push('\n');

                if let Some(status) = run_repl_command(&history, offset, &mut evaluator) {
                    return status;
                }
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }

    // Leaving the REPL ends the global scope
    evaluator.set_source(None, &history);
    let result = evaluator.finish();
    let _ = evaluator.console_mut().flush();
    match result {
        Ok(()) => 0,
        Err(halt) => report_halt(&halt, &history, None),
    }
}

/// Evaluate the line at `history[offset..]`. Returns a status when the
/// process should terminate.
fn run_repl_command(history: &str, offset: usize, evaluator: &mut Evaluator) -> Option<i32> {
    let program = match parse_source_at(history, offset) {
        Ok(program) => program,
        Err(error) => {
            error.report(history, None);
            return None;
        }
    };
    evaluator.set_source(None, history);

    // A lone expression that isn't an assignment echoes its non-nil value
    let result = match program.statements.as_slice() {
        [Stmt::Expression { expr, .. }] if !matches!(expr, Expr::Assign { .. }) => {
            evaluator.evaluate_expression(expr).map(|value| {
                if !matches!(value, Value::Nil) {
                    println!("{}", value);
                }
            })
        }
        _ => evaluator.evaluate_program(&program),
    };
    let _ = evaluator.console_mut().flush();

    match result {
        Ok(()) => None,
        Err(halt @ Halt::Error(_)) => {
            report_halt(&halt, history, None);
            evaluator.recover();
            None
        }
        Err(halt) => Some(report_halt(&halt, history, None)),
    }
}
