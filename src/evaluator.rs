use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{AssignOp, BinaryOp, Expr, FunctionDef, Program, Stmt, UnaryOp};
use crate::builtins;
use crate::console::Console;
use crate::error::{panic_header, ErrorKind, Halt, LarkError, Span};
use crate::scope::ScopeStack;
use crate::stack::ensure_sufficient_stack;
use crate::value::Value;

/// Default bound on nested scopes (blocks, loops, calls, `do` bodies).
pub const DEFAULT_MAX_DEPTH: usize = 512;

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub max_depth: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    /// A `return` is unwinding toward the nearest function body or `do` block.
    Return(Value),
}

pub struct Evaluator {
    scopes: ScopeStack,
    /// Function bodies and `do` blocks currently able to absorb a `return`.
    boundaries: usize,
    console: Console,
    /// Script name and text that spans point into, for `panic` reports.
    filename: Option<String>,
    source: Rc<str>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_config(EvaluatorConfig::default(), Console::Stdio)
    }

    pub fn with_console(console: Console) -> Self {
        Self::with_config(EvaluatorConfig::default(), console)
    }

    /// The global scope is begun here and ended by [`Evaluator::finish`].
    pub fn with_config(config: EvaluatorConfig, console: Console) -> Self {
        let mut scopes = ScopeStack::new(config.max_depth.max(1));
        // Cannot fail: the bound is at least one frame.
        let _ = scopes.push();

        Self {
            scopes,
            boundaries: 0,
            console,
            filename: None,
            source: Rc::from(""),
        }
    }

    /// Name the text that upcoming programs were parsed from.
    pub fn set_source(&mut self, filename: Option<&str>, source: &str) {
        self.filename = filename.map(str::to_string);
        self.source = Rc::from(source);
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    pub fn depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Current value of a variable visible from the innermost scope.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.scopes.lookup(name).cloned()
    }

    /// Run `program` in the global scope. Top-level defers stay pending
    /// until [`Evaluator::finish`].
    pub fn evaluate_program(&mut self, program: &Program) -> Result<(), Halt> {
        if self.scopes.depth() == 0 {
            self.begin_scope(&Span::single(0))?;
        }

        match self.execute_block(&program.statements)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(LarkError::error(
                ErrorKind::InternalError,
                &Span::single(0),
                "return escaped the top-level program",
            )
            .into()),
        }
    }

    /// End the global scope, running its deferred statements.
    pub fn finish(&mut self) -> Result<(), Halt> {
        if self.scopes.depth() > 0 {
            self.end_scope()?;
        }
        Ok(())
    }

    /// Drop every scope above the global one without running their defers.
    /// Used by the REPL after a fatal diagnostic.
    pub fn recover(&mut self) {
        self.scopes.truncate(1);
        if self.scopes.depth() == 0 {
            let _ = self.scopes.push();
        }
        self.boundaries = 0;
    }

    // ---------------------------------------------------------------------
    // Scopes
    // ---------------------------------------------------------------------

    fn begin_scope(&mut self, span: &Span) -> Result<(), Halt> {
        self.scopes.push().map_err(|exceeded| {
            LarkError::error(
                ErrorKind::ResourceError,
                span,
                format!(
                    "Scope nesting exceeds the maximum depth of {}",
                    exceeded.max_depth
                ),
            )
            .with_help("Deep recursion usually means a missing base case; the limit is set with --max-depth.")
        })?;
        trace!(depth = self.scopes.depth(), "begin scope");
        Ok(())
    }

    /// Run the top frame's defers newest-first, then pop it.
    fn end_scope(&mut self) -> Result<(), Halt> {
        let result = self.run_defers();
        trace!(depth = self.scopes.depth(), "end scope");
        self.scopes.pop();
        result
    }

    fn run_defers(&mut self) -> Result<(), Halt> {
        while let Some(stmt) = self.scopes.pop_defer() {
            debug!(depth = self.scopes.depth(), "running deferred statement");
            if let Flow::Return(_) = self.execute_statement(&stmt)? {
                return Err(LarkError::error(
                    ErrorKind::ControlFlowError,
                    stmt.span(),
                    "Unexpected return in deferred statement",
                )
                .into());
            }
        }
        Ok(())
    }

    /// Run `f` inside a fresh scope. The scope's defers run only if `f`
    /// succeeds; a halt pops the frame and propagates untouched.
    fn with_scope<T>(
        &mut self,
        span: &Span,
        f: impl FnOnce(&mut Self) -> Result<T, Halt>,
    ) -> Result<T, Halt> {
        self.begin_scope(span)?;
        match f(self) {
            Ok(value) => {
                self.end_scope()?;
                Ok(value)
            }
            Err(halt) => {
                self.scopes.pop();
                Err(halt)
            }
        }
    }

    /// Run `f` as a return-capturing boundary and yield the returned value.
    fn capture_return(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<Flow, Halt>,
    ) -> Result<Value, Halt> {
        self.boundaries += 1;
        let result = f(self);
        self.boundaries -= 1;

        Ok(match result? {
            Flow::Return(value) => value,
            Flow::Normal => Value::Nil,
        })
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    /// Execute statements in the current scope, stopping at the first return.
    fn execute_block(&mut self, statements: &[Stmt]) -> Result<Flow, Halt> {
        for statement in statements {
            if let flow @ Flow::Return(_) = self.execute_statement(statement)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<Flow, Halt> {
        match stmt {
            Stmt::Expression { expr, .. } => {
                self.evaluate_expression(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Let { bindings, .. } => {
                for binding in bindings {
                    if self.scopes.declared_in_top(&binding.name) {
                        return Err(LarkError::error(
                            ErrorKind::RedeclarationError,
                            &binding.span,
                            format!("Variable '{}' redeclared", binding.name),
                        )
                        .into());
                    }

                    let value = match &binding.initializer {
                        Some(initializer) => self.evaluate_expression(initializer)?,
                        None => Value::Nil,
                    };
                    self.scopes.declare(&binding.name, value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Block { statements, span } => {
                self.with_scope(span, |ev| ev.execute_block(statements))
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                span,
            } => self.with_scope(span, |ev| {
                if ev.evaluate_condition(condition, "if statement condition")? {
                    ev.execute_block(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    ev.execute_statement(else_stmt)
                } else {
                    Ok(Flow::Normal)
                }
            }),
            Stmt::While {
                condition,
                body,
                span,
            } => self.with_scope(span, |ev| {
                // One scope for the whole loop; the body runs directly in it
                while ev.evaluate_condition(condition, "while statement condition")? {
                    if let flow @ Flow::Return(_) = ev.execute_block(body)? {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }),
            Stmt::For {
                initializer,
                condition,
                increment,
                body,
                span,
            } => self.execute_for(
                initializer.as_deref(),
                condition.as_ref(),
                increment.as_deref(),
                body,
                span,
            ),
            Stmt::Return { value, span } => {
                if self.boundaries == 0 {
                    return Err(LarkError::error(
                        ErrorKind::ControlFlowError,
                        span,
                        "Unexpected return",
                    )
                    .with_help("'return' is only allowed inside function bodies and do blocks.")
                    .into());
                }

                let value = match value {
                    Some(expr) => self.evaluate_expression(expr)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Defer { statement, .. } => {
                self.scopes.register_defer(Rc::clone(statement));
                Ok(Flow::Normal)
            }
        }
    }

    fn execute_for(
        &mut self,
        initializer: Option<&Stmt>,
        condition: Option<&Expr>,
        increment: Option<&Stmt>,
        body: &[Stmt],
        span: &Span,
    ) -> Result<Flow, Halt> {
        let unexpected_return = |span: &Span| -> Halt {
            LarkError::error(
                ErrorKind::ControlFlowError,
                span,
                "Unexpected return in for loop",
            )
            .with_help("The initializer and step of a for loop cannot return.")
            .into()
        };

        self.with_scope(span, |ev| {
            if let Some(init) = initializer {
                if let Flow::Return(_) = ev.execute_statement(init)? {
                    return Err(unexpected_return(init.span()));
                }
            }

            loop {
                let keep_going = match condition {
                    Some(cond) => ev.evaluate_condition(cond, "for statement condition")?,
                    None => true,
                };
                if !keep_going {
                    return Ok(Flow::Normal);
                }

                // Each iteration gets its own scope; the step runs inside it
                let flow = ev.with_scope(span, |ev| {
                    if let flow @ Flow::Return(_) = ev.execute_block(body)? {
                        return Ok(flow);
                    }
                    if let Some(step) = increment {
                        if let Flow::Return(_) = ev.execute_statement(step)? {
                            return Err(unexpected_return(step.span()));
                        }
                    }
                    Ok(Flow::Normal)
                })?;

                if let Flow::Return(_) = flow {
                    return Ok(flow);
                }
            }
        })
    }

    fn evaluate_condition(&mut self, condition: &Expr, context: &str) -> Result<bool, Halt> {
        match self.evaluate_expression(condition)? {
            Value::Bool(b) => Ok(b),
            other => Err(LarkError::wrong_type(condition.span(), &other, context).into()),
        }
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    pub fn evaluate_expression(&mut self, expr: &Expr) -> Result<Value, Halt> {
        ensure_sufficient_stack(|| self.evaluate_expression_inner(expr))
    }

    fn evaluate_expression_inner(&mut self, expr: &Expr) -> Result<Value, Halt> {
        match expr {
            Expr::Literal { value, .. } => Ok(value.clone()),
            Expr::Variable { name, span } => self
                .scopes
                .lookup(name)
                .cloned()
                .ok_or_else(|| LarkError::undefined(span, name).into()),
            Expr::Assign {
                name,
                operator,
                value,
                span,
            } => {
                let value = self.evaluate_expression(value)?;
                self.assign(name, *operator, value, span)
            }
            Expr::Binary {
                left,
                operator,
                right,
                span,
            } => {
                // Both sides are always evaluated, `and`/`or` included
                let left_val = self.evaluate_expression(left)?;
                let right_val = self.evaluate_expression(right)?;
                self.evaluate_binary_op(*operator, left_val, right_val, span)
            }
            Expr::Unary {
                operator,
                operand,
                span,
            } => {
                let operand_val = self.evaluate_expression(operand)?;
                self.evaluate_unary_op(*operator, operand_val, span)
            }
            Expr::Call { name, args, span } => self.call(name, args, span),
            Expr::Function { def, .. } => Ok(Value::Function(Rc::clone(def))),
            Expr::Do { body, span } => {
                self.with_scope(span, |ev| ev.capture_return(|ev| ev.execute_block(body)))
            }
            Expr::Grouping { expr, .. } => self.evaluate_expression(expr),
        }
    }

    fn assign(
        &mut self,
        name: &str,
        operator: AssignOp,
        value: Value,
        span: &Span,
    ) -> Result<Value, Halt> {
        let slot = self
            .scopes
            .lookup_mut(name)
            .ok_or_else(|| LarkError::undefined(span, name))?;

        let symbol = operator.symbol();
        if !value.same_type(slot) {
            let context = if operator == AssignOp::Set {
                format!("assignment to '{}' (holds {})", name, slot.type_name())
            } else {
                format!("'{}' assignment to '{}' (holds {})", symbol, name, slot.type_name())
            };
            return Err(LarkError::wrong_type(span, &value, &context).into());
        }

        if operator == AssignOp::Set {
            *slot = value.clone();
            return Ok(value);
        }

        let (Value::Number(current), Value::Number(operand)) = (&*slot, &value) else {
            return Err(LarkError::wrong_type(
                span,
                &value,
                &format!("left side of '{}' assignment", symbol),
            )
            .into());
        };

        let updated = match operator {
            AssignOp::Add => current + operand,
            AssignOp::Subtract => current - operand,
            AssignOp::Multiply => current * operand,
            AssignOp::Divide => {
                if *operand == 0.0 {
                    return Err(division_by_zero(span));
                }
                current / operand
            }
            AssignOp::Set => unreachable!(),
        };

        *slot = Value::Number(updated);
        Ok(Value::Number(updated))
    }

    fn evaluate_binary_op(
        &self,
        operator: BinaryOp,
        left: Value,
        right: Value,
        span: &Span,
    ) -> Result<Value, Halt> {
        let symbol = operator.symbol();

        match operator {
            BinaryOp::Equal => Ok(Value::Bool(left == right)),
            BinaryOp::NotEqual => Ok(Value::Bool(left != right)),
            BinaryOp::Greater | BinaryOp::GreaterEqual | BinaryOp::Less | BinaryOp::LessEqual => {
                let (l, r) = numbers(symbol, &left, &right, span)?;
                Ok(Value::Bool(match operator {
                    BinaryOp::Greater => l > r,
                    BinaryOp::GreaterEqual => l >= r,
                    BinaryOp::Less => l < r,
                    _ => l <= r,
                }))
            }
            BinaryOp::Add => {
                if !left.same_type(&right) {
                    return Err(wrong_right(symbol, &right, span));
                }
                match (left, right) {
                    (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
                    (Value::String(l), Value::String(r)) => {
                        let mut joined = String::with_capacity(l.len() + r.len());
                        joined.push_str(&l);
                        joined.push_str(&r);
                        Ok(Value::string(joined))
                    }
                    (l, _) => Err(wrong_left(symbol, &l, span)),
                }
            }
            BinaryOp::Subtract => {
                let (l, r) = numbers(symbol, &left, &right, span)?;
                Ok(Value::Number(l - r))
            }
            BinaryOp::Multiply => {
                let (l, r) = numbers(symbol, &left, &right, span)?;
                Ok(Value::Number(l * r))
            }
            BinaryOp::Divide => {
                let (l, r) = numbers(symbol, &left, &right, span)?;
                if r == 0.0 {
                    return Err(division_by_zero(span));
                }
                Ok(Value::Number(l / r))
            }
            BinaryOp::Power => {
                let (l, r) = numbers(symbol, &left, &right, span)?;
                Ok(Value::Number(l.powf(r)))
            }
            BinaryOp::And | BinaryOp::Or => match (&left, &right) {
                (Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(if operator == BinaryOp::And {
                    *l && *r
                } else {
                    *l || *r
                })),
                (Value::Bool(_), _) => Err(wrong_right(symbol, &right, span)),
                _ => Err(wrong_left(symbol, &left, span)),
            },
        }
    }

    fn evaluate_unary_op(
        &self,
        operator: UnaryOp,
        operand: Value,
        span: &Span,
    ) -> Result<Value, Halt> {
        match (operator, &operand) {
            (UnaryOp::Plus, Value::Number(_)) => Ok(operand),
            (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            _ => Err(LarkError::wrong_type(
                span,
                &operand,
                &format!("'{}' unary operation", operator.symbol()),
            )
            .into()),
        }
    }

    // ---------------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------------

    fn call(&mut self, name: &str, args: &[Expr], span: &Span) -> Result<Value, Halt> {
        if let Some(builtin) = builtins::lookup(name) {
            trace!(name, args = args.len(), "calling builtin");
            return (builtin.func)(self, args, span);
        }

        match self.scopes.lookup(name).cloned() {
            Some(Value::Function(def)) => self.call_function(name, &def, args, span),
            Some(other) => Err(LarkError::wrong_type(
                span,
                &other,
                &format!("call to '{}'", name),
            )
            .into()),
            None => Err(LarkError::error(
                ErrorKind::UndefinedError,
                span,
                format!("Unknown function '{}'", name),
            )
            .into()),
        }
    }

    /// Free names in the body resolve against the caller's live scopes.
    fn call_function(
        &mut self,
        name: &str,
        def: &Rc<FunctionDef>,
        args: &[Expr],
        span: &Span,
    ) -> Result<Value, Halt> {
        if args.len() != def.params.len() {
            return Err(LarkError::wrong_arg_count(span, name, args.len(), def.params.len()).into());
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate_expression(arg)?);
        }

        debug!(name, depth = self.scopes.depth(), "calling function");
        self.with_scope(span, |ev| {
            for (param, value) in def.params.iter().zip(values) {
                ev.scopes.declare(param, value);
            }
            ev.capture_return(|ev| ev.execute_block(&def.body))
        })
    }

    // ---------------------------------------------------------------------
    // Console access for builtins
    // ---------------------------------------------------------------------

    pub(crate) fn write(&mut self, text: &str, span: &Span) -> Result<(), Halt> {
        self.console.print(text).map_err(|e| io_error(span, "write output", e))
    }

    pub(crate) fn eprint(&mut self, text: &str, span: &Span) -> Result<(), Halt> {
        self.console.eprint(text).map_err(|e| io_error(span, "write diagnostics", e))
    }

    pub(crate) fn panic_header(&self, span: &Span) -> String {
        panic_header(span, &self.source, self.filename.as_deref())
    }

    pub(crate) fn read_line(&mut self, span: &Span) -> Result<String, Halt> {
        self.console.read_line().map_err(|e| io_error(span, "read input", e))
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Both operands must be numbers.
fn numbers(symbol: &str, left: &Value, right: &Value, span: &Span) -> Result<(f64, f64), Halt> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => Ok((*l, *r)),
        (Value::Number(_), _) => Err(wrong_right(symbol, right, span)),
        _ => Err(wrong_left(symbol, left, span)),
    }
}

fn wrong_left(symbol: &str, value: &Value, span: &Span) -> Halt {
    LarkError::wrong_type(span, value, &format!("left side of '{}' operation", symbol)).into()
}

fn wrong_right(symbol: &str, value: &Value, span: &Span) -> Halt {
    LarkError::wrong_type(
        span,
        value,
        &format!("right side of '{}' operation, expected same as left side", symbol),
    )
    .into()
}

fn division_by_zero(span: &Span) -> Halt {
    LarkError::error(ErrorKind::ArithmeticError, span, "Division by zero").into()
}

fn io_error(span: &Span, action: &str, error: std::io::Error) -> Halt {
    LarkError::error(
        ErrorKind::ResourceError,
        span,
        format!("Failed to {}: {}", action, error),
    )
    .into()
}
