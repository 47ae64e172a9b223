use crate::error::{LarkError, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
    Caret,

    // One or two character tokens
    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    SlashEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    And,
    Defer,
    Do,
    Else,
    False,
    For,
    Fun,
    If,
    Let,
    Nil,
    Not,
    Or,
    Return,
    True,
    While,

    // Special
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    /// Source text, or the unescaped contents for string literals.
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: String, span: Span) -> Self {
        Self {
            token_type,
            lexeme,
            span,
        }
    }
}

pub struct Lexer {
    source: String,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
}

fn keyword(text: &str) -> Option<TokenType> {
    let token_type = match text {
        "and" => TokenType::And,
        "defer" => TokenType::Defer,
        "do" => TokenType::Do,
        "else" => TokenType::Else,
        "false" => TokenType::False,
        "for" => TokenType::For,
        "fun" => TokenType::Fun,
        "if" => TokenType::If,
        "let" => TokenType::Let,
        "nil" => TokenType::Nil,
        "not" => TokenType::Not,
        "or" => TokenType::Or,
        "return" => TokenType::Return,
        "true" => TokenType::True,
        "while" => TokenType::While,
        _ => return None,
    };
    Some(token_type)
}

impl Lexer {
    pub fn new(source: String) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            start: 0,
            current: 0,
        }
    }

    /// Lex only `source[offset..]`, keeping spans relative to all of `source`.
    pub fn starting_at(source: String, offset: usize) -> Self {
        let mut lexer = Self::new(source);
        lexer.start = offset;
        lexer.current = offset;
        lexer
    }

    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, LarkError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenType::Eof,
            "".to_string(),
            Span::single(self.current),
        ));

        Ok(std::mem::take(&mut self.tokens))
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn scan_token(&mut self) -> Result<(), LarkError> {
        let c = self.advance();

        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            ';' => self.add_token(TokenType::Semicolon),
            '^' => self.add_token(TokenType::Caret),
            '+' => self.add_doubled('+', TokenType::PlusPlus, TokenType::Plus),
            '-' => self.add_doubled('-', TokenType::MinusMinus, TokenType::Minus),
            '*' => self.add_doubled('*', TokenType::StarStar, TokenType::Star),
            '/' => {
                let token_type = if self.match_char('/') {
                    TokenType::SlashSlash
                } else if self.match_char('=') {
                    TokenType::SlashEqual
                } else {
                    TokenType::Slash
                };
                self.add_token(token_type);
            }
            '=' => self.add_doubled('=', TokenType::EqualEqual, TokenType::Equal),
            '<' => self.add_doubled('=', TokenType::LessEqual, TokenType::Less),
            '>' => self.add_doubled('=', TokenType::GreaterEqual, TokenType::Greater),
            '#' => {
                // Comment goes until end of line
                while self.peek() != '\n' && !self.is_at_end() {
                    self.advance();
                }
            }
            ' ' | '\r' | '\t' | '\n' => {}
            '"' => self.string()?,
            c if c.is_ascii_digit() => self.number()?,
            c if c.is_alphabetic() || c == '_' => self.identifier(),
            _ => {
                return Err(LarkError::lex_error(
                    Span::new(self.start, self.current),
                    format!("Unexpected character: '{}'", c),
                ));
            }
        }

        Ok(())
    }

    fn advance(&mut self) -> char {
        match self.source[self.current..].chars().next() {
            Some(c) => {
                self.current += c.len_utf8();
                c
            }
            None => '\0',
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.advance();
            true
        }
    }

    fn peek(&self) -> char {
        self.source[self.current..].chars().next().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        let mut chars = self.source[self.current..].chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    fn string(&mut self) -> Result<(), LarkError> {
        let mut content = String::new();

        while self.peek() != '"' && !self.is_at_end() {
            let c = self.advance();
            if c != '\\' {
                content.push(c);
                continue;
            }

            let escape_start = self.current - 1;
            let escaped = match self.advance() {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                '"' => '"',
                '\\' => '\\',
                other => {
                    return Err(LarkError::lex_error(
                        Span::new(escape_start, self.current),
                        format!("Unknown escape sequence: '\\{}'", other),
                    ));
                }
            };
            content.push(escaped);
        }

        if self.is_at_end() {
            return Err(LarkError::lex_error(
                Span::new(self.start, self.current),
                "Unterminated string".to_string(),
            ));
        }

        // Consume the closing "
        self.advance();

        self.add_token_with_content(TokenType::String, content);
        Ok(())
    }

    fn number(&mut self) -> Result<(), LarkError> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // Look for fractional part
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let number_slice = &self.source[self.start..self.current];
        if number_slice.parse::<f64>().is_err() {
            return Err(LarkError::lex_error(
                Span::new(self.start, self.current),
                format!("Invalid number: {}", number_slice),
            ));
        }

        self.add_token_with_content(TokenType::Number, number_slice.to_string());
        Ok(())
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let token_type =
            keyword(&self.source[self.start..self.current]).unwrap_or(TokenType::Identifier);

        self.add_token(token_type);
    }

    fn add_doubled(&mut self, second: char, doubled: TokenType, single: TokenType) {
        let token_type = if self.match_char(second) { doubled } else { single };
        self.add_token(token_type);
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text = &self.source[self.start..self.current];
        self.add_token_with_content(token_type, text.to_string());
    }

    fn add_token_with_content(&mut self, token_type: TokenType, lexeme: String) {
        self.tokens.push(Token::new(
            token_type,
            lexeme,
            Span::new(self.start, self.current),
        ));
    }
}
