use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }

    /// 1-based `(row, column)` of the span start within `source`.
    pub fn row_col(&self, source: &str) -> (usize, usize) {
        let start = self.start.min(source.len());
        let mut row = 1;
        let mut line_start = 0;
        for (i, c) in source[..start].char_indices() {
            if c == '\n' {
                row += 1;
                line_start = i + 1;
            }
        }
        let col = source[line_start..start].chars().count() + 1;
        (row, col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LexError,
    ParseError,
    TypeError,
    UndefinedError,
    RedeclarationError,
    ArityError,
    ArithmeticError,
    ControlFlowError,
    ResourceError,
    InternalError,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::LexError => "Lexical Error",
            ErrorKind::ParseError => "Parse Error",
            ErrorKind::TypeError => "Type Error",
            ErrorKind::UndefinedError => "Undefined Error",
            ErrorKind::RedeclarationError => "Redeclaration Error",
            ErrorKind::ArityError => "Arity Error",
            ErrorKind::ArithmeticError => "Arithmetic Error",
            ErrorKind::ControlFlowError => "Control Flow Error",
            ErrorKind::ResourceError => "Resource Error",
            ErrorKind::InternalError => "Internal Error",
        }
    }

    fn color(self) -> Color {
        match self {
            ErrorKind::LexError => Color::Red,
            ErrorKind::ParseError => Color::Yellow,
            ErrorKind::InternalError => Color::Red,
            _ => Color::Magenta,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LarkError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
}

impl LarkError {
    pub fn new(kind: ErrorKind, span: Span, message: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: None,
        }
    }

    pub fn new_with_help(kind: ErrorKind, span: Span, message: String, help: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: Some(help),
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn lex_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::LexError, span, message)
    }

    pub fn parse_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::ParseError, span, message)
    }

    pub fn parse_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::ParseError, span, message, help)
    }

    /// Fatal error with a plain message at a location.
    pub fn error(kind: ErrorKind, span: &Span, message: impl Into<String>) -> Self {
        Self::new(kind, span.clone(), message.into())
    }

    /// A value of the wrong variant reached `context`.
    pub fn wrong_type(span: &Span, found: &Value, context: &str) -> Self {
        Self::new(
            ErrorKind::TypeError,
            span.clone(),
            format!("Unexpected {} value in {}", found.type_name(), context),
        )
    }

    pub fn undefined(span: &Span, name: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedError,
            span.clone(),
            format!("Undefined identifier '{}'", name),
        )
    }

    pub fn wrong_arg_count(span: &Span, name: &str, got: usize, expected: usize) -> Self {
        Self::new(
            ErrorKind::ArityError,
            span.clone(),
            format!(
                "{}() takes exactly {} argument{}, got {}",
                name,
                expected,
                if expected == 1 { "" } else { "s" },
                got
            ),
        )
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");
        let color = self.kind.color();

        let mut report_builder = Report::build(ReportKind::Error, filename, self.span.start)
            .with_message(format!("{}: {}", self.kind.label().fg(color), self.message))
            .with_label(
                Label::new((filename, self.span.start..self.span.end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        // stderr may already be closed; nothing sensible is left to do then
        let _ = report_builder
            .finish()
            .eprint((filename, Source::from(source)));
    }
}

/// `path:row:col: panic():`, the header `panic` writes before its arguments.
pub fn panic_header(span: &Span, source: &str, filename: Option<&str>) -> String {
    let (row, col) = span.row_col(source);
    format!(
        "{}:{}:{}: {}",
        filename.unwrap_or("<repl>"),
        row,
        col,
        "panic():".fg(Color::Red)
    )
}

impl fmt::Display for LarkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LarkError {}

/// Why evaluation stopped before finishing.
///
/// None of these run pending deferred statements on the way out.
#[derive(Debug, thiserror::Error)]
pub enum Halt {
    #[error(transparent)]
    Error(#[from] LarkError),
    /// `panic(...)`: the location and rendered arguments. The report has
    /// already been written by the time this propagates.
    #[error("panic(): {message}")]
    Panic { span: Span, message: String },
    /// `exit(n)`
    #[error("exit({0})")]
    Exit(i32),
}
