use std::rc::Rc;

use crate::ast::{AssignOp, BinaryOp, Expr, FunctionDef, LetBinding, Program, Stmt, UnaryOp};
use crate::error::{LarkError, Span};
use crate::lexer::{Token, TokenType};
use crate::value::Value;

type ParseFn = fn(&mut Parser) -> Result<Expr, LarkError>;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> Result<Program, LarkError> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        Ok(Program { statements })
    }

    /// A statement in a statement list, with its optional trailing ';'.
    fn declaration(&mut self) -> Result<Stmt, LarkError> {
        let stmt = self.statement()?;
        self.match_types(&[TokenType::Semicolon]);
        Ok(stmt)
    }

    fn statement(&mut self) -> Result<Stmt, LarkError> {
        if self.match_types(&[TokenType::LeftBrace]) {
            let start = self.previous().span.start;
            let statements = self.block()?;
            Ok(Stmt::Block {
                statements,
                span: Span::new(start, self.previous().span.end),
            })
        } else if self.match_types(&[TokenType::Let]) {
            self.let_statement()
        } else if self.match_types(&[TokenType::If]) {
            self.if_statement()
        } else if self.match_types(&[TokenType::While]) {
            self.while_statement()
        } else if self.match_types(&[TokenType::For]) {
            self.for_statement()
        } else if self.match_types(&[TokenType::Return]) {
            self.return_statement()
        } else if self.match_types(&[TokenType::Defer]) {
            self.defer_statement()
        } else {
            self.expression_statement()
        }
    }

    /// Statements up to and including the closing '}'. The '{' is already consumed.
    fn block(&mut self) -> Result<Vec<Stmt>, LarkError> {
        let mut statements = Vec::new();

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        self.consume_with_help(
            TokenType::RightBrace,
            "Expected '}' after block",
            "Block statements must be closed with '}' after the opening '{'.".to_string(),
        )?;
        Ok(statements)
    }

    fn braced_body(&mut self, after: &str) -> Result<Vec<Stmt>, LarkError> {
        self.consume_with_help(
            TokenType::LeftBrace,
            &format!("Expected '{{' after {}", after),
            "Bodies are always wrapped in braces: while x < 3 { ... }".to_string(),
        )?;
        self.block()
    }

    fn let_statement(&mut self) -> Result<Stmt, LarkError> {
        let start = self.previous().span.start;
        let mut bindings = Vec::new();

        loop {
            let name_token = self
                .consume_with_help(
                    TokenType::Identifier,
                    "Expected variable name after 'let'",
                    "Declarations look like: let x = 1, y".to_string(),
                )?
                .clone();

            let initializer = if self.match_types(&[TokenType::Equal]) {
                Some(self.expression()?)
            } else {
                None
            };

            bindings.push(LetBinding {
                name: name_token.lexeme,
                initializer,
                span: Span::new(name_token.span.start, self.previous().span.end),
            });

            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }

        Ok(Stmt::Let {
            bindings,
            span: Span::new(start, self.previous().span.end),
        })
    }

    fn if_statement(&mut self) -> Result<Stmt, LarkError> {
        let start = self.previous().span.start;

        let condition = self.expression()?;
        let then_branch = self.braced_body("if condition")?;

        let else_branch = if self.match_types(&[TokenType::Else]) {
            if self.match_types(&[TokenType::If]) {
                Some(Box::new(self.if_statement()?))
            } else {
                let else_start = self.peek().span.start;
                let statements = self.braced_body("'else'")?;
                Some(Box::new(Stmt::Block {
                    statements,
                    span: Span::new(else_start, self.previous().span.end),
                }))
            }
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: Span::new(start, self.previous().span.end),
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, LarkError> {
        let start = self.previous().span.start;

        let condition = self.expression()?;
        let body = self.braced_body("while condition")?;

        Ok(Stmt::While {
            condition,
            body,
            span: Span::new(start, self.previous().span.end),
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, LarkError> {
        let start = self.previous().span.start;

        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '(' after 'for'",
            "For loops look like: for (let i = 0; i < 3; i ++ 1) { ... }".to_string(),
        )?;

        let initializer = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(Box::new(self.statement()?))
        };
        self.consume(TokenType::Semicolon, "Expected ';' after loop initializer")?;

        let condition = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::Semicolon, "Expected ';' after loop condition")?;

        let increment = if self.check(&TokenType::RightParen) {
            None
        } else {
            Some(Box::new(self.statement()?))
        };
        self.consume(TokenType::RightParen, "Expected ')' after for clauses")?;

        let body = self.braced_body("for clauses")?;

        Ok(Stmt::For {
            initializer,
            condition,
            increment,
            body,
            span: Span::new(start, self.previous().span.end),
        })
    }

    fn return_statement(&mut self) -> Result<Stmt, LarkError> {
        let start = self.previous().span.start;

        let value = if self.is_at_end()
            || self.check(&TokenType::RightBrace)
            || self.check(&TokenType::Semicolon)
        {
            None
        } else {
            Some(self.expression()?)
        };

        Ok(Stmt::Return {
            value,
            span: Span::new(start, self.previous().span.end),
        })
    }

    fn defer_statement(&mut self) -> Result<Stmt, LarkError> {
        let start = self.previous().span.start;

        if self.is_at_end() || self.check(&TokenType::RightBrace) {
            return Err(LarkError::parse_error_with_help(
                self.previous().span.clone(),
                "Expected statement after 'defer'".to_string(),
                "Defer takes the statement to run when the scope ends: defer println(\"bye\")"
                    .to_string(),
            ));
        }

        let statement = self.statement()?;
        Ok(Stmt::Defer {
            statement: Rc::new(statement),
            span: Span::new(start, self.previous().span.end),
        })
    }

    fn expression_statement(&mut self) -> Result<Stmt, LarkError> {
        let start_span = self.peek().span.start;
        let expr = self.expression()?;
        let end_span = self.previous().span.end;

        Ok(Stmt::Expression {
            expr,
            span: Span::new(start_span, end_span),
        })
    }

    fn expression(&mut self) -> Result<Expr, LarkError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, LarkError> {
        let expr = self.or()?;

        if self.match_types(&[
            TokenType::Equal,
            TokenType::PlusPlus,
            TokenType::MinusMinus,
            TokenType::StarStar,
            TokenType::SlashSlash,
        ]) {
            let operator_token = self.previous().clone();
            let operator = match operator_token.token_type {
                TokenType::Equal => AssignOp::Set,
                TokenType::PlusPlus => AssignOp::Add,
                TokenType::MinusMinus => AssignOp::Subtract,
                TokenType::StarStar => AssignOp::Multiply,
                TokenType::SlashSlash => AssignOp::Divide,
                _ => unreachable!(),
            };

            self.expect_operand(&operator_token)?;
            let value = self.assignment()?;

            if let Expr::Variable { name, span } = expr {
                return Ok(Expr::Assign {
                    name,
                    operator,
                    value: Box::new(value),
                    span: Span::new(span.start, self.previous().span.end),
                });
            }

            return Err(LarkError::parse_error_with_help(
                operator_token.span,
                format!("Invalid target for '{}'", operator_token.lexeme),
                format!(
                    "Only variables can be assigned to. Example: 'x {} 10'",
                    operator_token.lexeme
                ),
            ));
        }

        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, LarkError> {
        self.binary_chain(&[(TokenType::Or, BinaryOp::Or)], Parser::and)
    }

    fn and(&mut self) -> Result<Expr, LarkError> {
        self.binary_chain(&[(TokenType::And, BinaryOp::And)], Parser::equality)
    }

    fn equality(&mut self) -> Result<Expr, LarkError> {
        self.binary_chain(
            &[
                (TokenType::EqualEqual, BinaryOp::Equal),
                (TokenType::SlashEqual, BinaryOp::NotEqual),
            ],
            Parser::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr, LarkError> {
        self.binary_chain(
            &[
                (TokenType::Greater, BinaryOp::Greater),
                (TokenType::GreaterEqual, BinaryOp::GreaterEqual),
                (TokenType::Less, BinaryOp::Less),
                (TokenType::LessEqual, BinaryOp::LessEqual),
            ],
            Parser::term,
        )
    }

    fn term(&mut self) -> Result<Expr, LarkError> {
        self.binary_chain(
            &[
                (TokenType::Plus, BinaryOp::Add),
                (TokenType::Minus, BinaryOp::Subtract),
            ],
            Parser::factor,
        )
    }

    fn factor(&mut self) -> Result<Expr, LarkError> {
        self.binary_chain(
            &[
                (TokenType::Star, BinaryOp::Multiply),
                (TokenType::Slash, BinaryOp::Divide),
            ],
            Parser::unary,
        )
    }

    /// Left-associative chain of `operand (op operand)*`.
    fn binary_chain(
        &mut self,
        operators: &[(TokenType, BinaryOp)],
        operand: ParseFn,
    ) -> Result<Expr, LarkError> {
        let mut expr = operand(self)?;

        loop {
            let Some(operator) = operators
                .iter()
                .find(|(token_type, _)| self.check(token_type))
                .map(|(_, operator)| *operator)
            else {
                break;
            };
            let operator_token = self.advance().clone();

            self.expect_operand(&operator_token)?;
            let start = expr.span().start;
            let right = operand(self)?;
            let end = right.span().end;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
                span: Span::new(start, end),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, LarkError> {
        if self.match_types(&[TokenType::Plus, TokenType::Minus, TokenType::Not]) {
            let operator_token = self.previous().clone();
            let operator = match operator_token.token_type {
                TokenType::Plus => UnaryOp::Plus,
                TokenType::Minus => UnaryOp::Negate,
                TokenType::Not => UnaryOp::Not,
                _ => unreachable!(),
            };

            self.expect_operand(&operator_token)?;
            let start = operator_token.span.start;
            let right = self.unary()?;
            let end = right.span().end;

            return Ok(Expr::Unary {
                operator,
                operand: Box::new(right),
                span: Span::new(start, end),
            });
        }

        self.power()
    }

    fn power(&mut self) -> Result<Expr, LarkError> {
        let base = self.primary()?;

        if self.match_types(&[TokenType::Caret]) {
            let operator_token = self.previous().clone();
            self.expect_operand(&operator_token)?;

            // Right associative: 2 ^ 3 ^ 2 == 2 ^ (3 ^ 2)
            let exponent = self.unary()?;
            let span = Span::new(base.span().start, exponent.span().end);
            return Ok(Expr::Binary {
                left: Box::new(base),
                operator: BinaryOp::Power,
                right: Box::new(exponent),
                span,
            });
        }

        Ok(base)
    }

    fn finish_call(&mut self, name_token: Token) -> Result<Expr, LarkError> {
        let mut args = Vec::new();

        if !self.check(&TokenType::RightParen) {
            loop {
                if self.is_at_end() {
                    return Err(LarkError::parse_error_with_help(
                        self.peek().span.clone(),
                        "Unexpected end of input in function call".to_string(),
                        "Function calls must be closed with ')' after the arguments. Example: println(a, b)".to_string(),
                    ));
                }

                if self.check(&TokenType::RightBrace) {
                    return Err(LarkError::parse_error_with_help(
                        self.peek().span.clone(),
                        "Expected ')' to close function call".to_string(),
                        "Function calls must be closed with ')' after the arguments. Example: println(a, b)".to_string(),
                    ));
                }

                args.push(self.expression()?);

                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }

                if self.check(&TokenType::RightParen) || self.is_at_end() {
                    return Err(LarkError::parse_error_with_help(
                        self.previous().span.clone(),
                        "Expected argument after ',' in function call".to_string(),
                        "Trailing commas are not allowed in argument lists.".to_string(),
                    ));
                }
            }
        }

        let paren = self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after arguments",
            "Function calls must be closed with ')' after the arguments. Example: println(a, b)"
                .to_string(),
        )?;

        Ok(Expr::Call {
            name: name_token.lexeme,
            args,
            span: Span::new(name_token.span.start, paren.span.end),
        })
    }

    fn function_literal(&mut self, start: usize) -> Result<Expr, LarkError> {
        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '(' after 'fun'",
            "Function literals look like: fun (a, b) { return a + b }".to_string(),
        )?;

        let mut params: Vec<String> = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                let param = self
                    .consume(TokenType::Identifier, "Expected parameter name")?
                    .clone();
                if params.contains(&param.lexeme) {
                    return Err(LarkError::parse_error(
                        param.span,
                        format!("Duplicate parameter '{}'", param.lexeme),
                    ));
                }
                params.push(param.lexeme);

                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expected ')' after parameters")?;

        let body = self.braced_body("function parameters")?;
        let span = Span::new(start, self.previous().span.end);

        Ok(Expr::Function {
            def: Rc::new(FunctionDef {
                params,
                body,
                span: span.clone(),
            }),
            span,
        })
    }

    fn primary(&mut self) -> Result<Expr, LarkError> {
        if self.is_at_end() {
            return Err(LarkError::parse_error_with_help(
                self.peek().span.clone(),
                "Unexpected end of input".to_string(),
                "Expected an expression here. Check for unmatched parentheses, braces, or incomplete statements.".to_string(),
            ));
        }

        let token = self.advance().clone();

        match token.token_type {
            TokenType::False => Ok(Expr::Literal {
                value: Value::Bool(false),
                span: token.span,
            }),
            TokenType::True => Ok(Expr::Literal {
                value: Value::Bool(true),
                span: token.span,
            }),
            TokenType::Nil => Ok(Expr::Literal {
                value: Value::Nil,
                span: token.span,
            }),
            TokenType::Number => {
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    LarkError::parse_error(token.span.clone(), "Invalid number".to_string())
                })?;
                Ok(Expr::Literal {
                    value: Value::Number(value),
                    span: token.span,
                })
            }
            TokenType::String => Ok(Expr::Literal {
                value: Value::string(token.lexeme),
                span: token.span,
            }),
            TokenType::Identifier => {
                if self.match_types(&[TokenType::LeftParen]) {
                    self.finish_call(token)
                } else {
                    Ok(Expr::Variable {
                        name: token.lexeme,
                        span: token.span,
                    })
                }
            }
            TokenType::Do => {
                let start = token.span.start;
                let body = self.braced_body("'do'")?;
                Ok(Expr::Do {
                    body,
                    span: Span::new(start, self.previous().span.end),
                })
            }
            TokenType::Fun => self.function_literal(token.span.start),
            TokenType::LeftParen => {
                let start_span = token.span.clone();

                if self.check(&TokenType::RightParen) {
                    return Err(LarkError::parse_error_with_help(
                        Span::new(start_span.start, self.peek().span.end),
                        "Empty parentheses are not allowed".to_string(),
                        "Parentheses must contain an expression. Use 'nil' for a null value: (nil)".to_string(),
                    ));
                }

                let expr = self.expression()?;
                let end_token = self.consume_with_help(
                    TokenType::RightParen,
                    "Expected ')' after expression",
                    "Every opening parenthesis '(' must have a matching closing parenthesis ')'."
                        .to_string(),
                )?;
                Ok(Expr::Grouping {
                    expr: Box::new(expr),
                    span: Span::new(start_span.start, end_token.span.end),
                })
            }
            _ => {
                let help_msg = match token.token_type {
                    TokenType::RightParen => "Found ')' without matching '('. Check for unbalanced parentheses.",
                    TokenType::RightBrace => "Found '}' without matching '{'. Check for unbalanced braces.",
                    _ => "Expected a literal value, variable, call, or parenthesized expression here.",
                };

                Err(LarkError::parse_error_with_help(
                    token.span,
                    format!("Expected expression, found '{}'", token.lexeme),
                    help_msg.to_string(),
                ))
            }
        }
    }

    /// Fails early with an operator-specific message when nothing that can
    /// start an expression follows `operator_token`.
    fn expect_operand(&self, operator_token: &Token) -> Result<(), LarkError> {
        let starts_expression = matches!(
            self.peek().token_type,
            TokenType::Number
                | TokenType::String
                | TokenType::True
                | TokenType::False
                | TokenType::Nil
                | TokenType::Identifier
                | TokenType::LeftParen
                | TokenType::Do
                | TokenType::Fun
                | TokenType::Plus
                | TokenType::Minus
                | TokenType::Not
        );

        if starts_expression {
            Ok(())
        } else {
            Err(LarkError::parse_error_with_help(
                operator_token.span.clone(),
                format!("Expected expression after '{}'", operator_token.lexeme),
                format!(
                    "The '{}' operator requires an expression on its right side.",
                    operator_token.lexeme
                ),
            ))
        }
    }

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            false
        } else {
            &self.peek().token_type == token_type
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn error_span(&self) -> Span {
        if self.is_at_end() && self.current > 0 {
            // Point just past the last real token instead of at EOF
            Span::single(self.tokens[self.current - 1].span.end)
        } else {
            self.peek().span.clone()
        }
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<&Token, LarkError> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(LarkError::parse_error(self.error_span(), message.to_string()))
        }
    }

    fn consume_with_help(
        &mut self,
        token_type: TokenType,
        message: &str,
        help: String,
    ) -> Result<&Token, LarkError> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(LarkError::parse_error_with_help(
                self.error_span(),
                message.to_string(),
                help,
            ))
        }
    }
}
