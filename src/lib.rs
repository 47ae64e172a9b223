// Lark Language Interpreter Library
//
// A tree-walking evaluator for a small dynamically-typed scripting language
// with scoped defers, open function values and fatal, located diagnostics.

// Public modules
pub mod ast;
pub mod builtins;
pub mod console;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod repl;
pub mod runner;
pub mod scope;
pub mod stack;
pub mod value;

// Re-export commonly used items
pub use ast::{Expr, Program, Stmt};
pub use console::Console;
pub use error::{ErrorKind, Halt, LarkError, Span};
pub use evaluator::{Evaluator, EvaluatorConfig, Flow};
pub use lexer::{Lexer, Token, TokenType};
pub use parser::Parser;
pub use value::Value;

// Re-export main functions
pub use repl::start as start_repl;
pub use runner::run;
