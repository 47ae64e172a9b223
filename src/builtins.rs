//! Native functions callable by name.
//!
//! Builtins receive their argument expressions unevaluated and evaluate them
//! themselves, so each one controls the order of its side effects.

use crate::ast::Expr;
use crate::error::{Halt, LarkError, Span};
use crate::evaluator::Evaluator;
use crate::value::Value;

pub type BuiltinFn = fn(&mut Evaluator, &[Expr], &Span) -> Result<Value, Halt>;

pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

pub static BUILTINS: &[Builtin] = &[
    Builtin { name: "println", func: builtin_println },
    Builtin { name: "print", func: builtin_print },
    Builtin { name: "len", func: builtin_len },
    Builtin { name: "readnum", func: builtin_readnum },
    Builtin { name: "readstr", func: builtin_readstr },
    Builtin { name: "panic", func: builtin_panic },
    Builtin { name: "exit", func: builtin_exit },
];

/// Exact-name linear search.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

/// Evaluate and write each argument in order, separated by single spaces.
fn print_args(ev: &mut Evaluator, args: &[Expr], span: &Span) -> Result<(), Halt> {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            ev.write(" ", span)?;
        }
        let value = ev.evaluate_expression(arg)?;
        ev.write(&value.to_string(), span)?;
    }
    Ok(())
}

fn builtin_print(ev: &mut Evaluator, args: &[Expr], span: &Span) -> Result<Value, Halt> {
    print_args(ev, args, span)?;
    Ok(Value::Nil)
}

fn builtin_println(ev: &mut Evaluator, args: &[Expr], span: &Span) -> Result<Value, Halt> {
    print_args(ev, args, span)?;
    ev.write("\n", span)?;
    Ok(Value::Nil)
}

fn builtin_len(ev: &mut Evaluator, args: &[Expr], span: &Span) -> Result<Value, Halt> {
    if args.len() != 1 {
        return Err(LarkError::wrong_arg_count(span, "len", args.len(), 1)
            .with_help("Usage: len(text) returns the byte length of a string.")
            .into());
    }

    match ev.evaluate_expression(&args[0])? {
        Value::String(s) => Ok(Value::Number(s.len() as f64)),
        other => Err(LarkError::wrong_type(span, &other, "'len' function").into()),
    }
}

/// Prompt with the arguments and a trailing space, then read one line.
fn prompt(ev: &mut Evaluator, args: &[Expr], span: &Span) -> Result<String, Halt> {
    print_args(ev, args, span)?;
    ev.write(" ", span)?;
    ev.read_line(span)
}

fn builtin_readnum(ev: &mut Evaluator, args: &[Expr], span: &Span) -> Result<Value, Halt> {
    let line = prompt(ev, args, span)?;
    Ok(Value::Number(parse_leading_number(&line)))
}

fn builtin_readstr(ev: &mut Evaluator, args: &[Expr], span: &Span) -> Result<Value, Halt> {
    let mut line = prompt(ev, args, span)?;
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(Value::string(line))
}

/// Writes the location header first, then each argument as it is evaluated.
fn builtin_panic(ev: &mut Evaluator, args: &[Expr], span: &Span) -> Result<Value, Halt> {
    let header = ev.panic_header(span);
    ev.eprint(&header, span)?;

    let mut message = String::new();
    for arg in args {
        let value = ev.evaluate_expression(arg)?;
        let piece = format!(" {}", value);
        ev.eprint(&piece, span)?;
        message.push_str(&piece);
    }
    ev.eprint("\n", span)?;

    Err(Halt::Panic {
        span: span.clone(),
        message,
    })
}

fn builtin_exit(ev: &mut Evaluator, args: &[Expr], span: &Span) -> Result<Value, Halt> {
    if args.len() != 1 {
        return Err(LarkError::wrong_arg_count(span, "exit", args.len(), 1).into());
    }

    match ev.evaluate_expression(&args[0])? {
        // Saturating truncation toward zero
        Value::Number(code) => Err(Halt::Exit(code as i32)),
        other => Err(LarkError::wrong_type(span, &other, "'exit' function").into()),
    }
}

/// Longest leading decimal number after optional whitespace; 0 if none.
pub fn parse_leading_number(text: &str) -> f64 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > digits_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let fraction_start = end + 1;
        let mut fraction_end = fraction_start;
        while fraction_end < bytes.len() && bytes[fraction_end].is_ascii_digit() {
            fraction_end += 1;
        }
        if has_digits || fraction_end > fraction_start {
            has_digits = true;
            end = fraction_end;
        }
    }

    if !has_digits {
        return 0.0;
    }

    // Exponent only counts when at least one digit follows it
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exponent_end = end + 1;
        if exponent_end < bytes.len() && (bytes[exponent_end] == b'+' || bytes[exponent_end] == b'-') {
            exponent_end += 1;
        }
        let exponent_digits = exponent_end;
        while exponent_end < bytes.len() && bytes[exponent_end].is_ascii_digit() {
            exponent_end += 1;
        }
        if exponent_end > exponent_digits {
            end = exponent_end;
        }
    }

    text[..end].parse().unwrap_or(0.0)
}
