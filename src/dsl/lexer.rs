use super::ast::Span;
use super::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    True,
    False,
    Null,
    Undefined,

    // Identifiers & keywords
    Ident(String),
    Let,
    Const,
    Var,
    If,
    Else,
    While,
    For,
    Return,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Question, // ?

    // Operators
    Plus,
    Minus,
    Star,
    StarStar, // **
    Slash,
    Percent,
    Lt,
    Gt,
    Le,       // <=
    Ge,       // >=
    EqEq,     // ==
    Ne,       // !=
    EqEqEq,   // ===
    NeEq,     // !==
    And,      // &&
    Or,       // ||
    Bang,     // !
    Eq,       // =
    PlusEq,   // +=
    MinusEq,  // -=
    StarEq,   // *=
    SlashEq,  // /=
    PercentEq, // %=
    PlusPlus, // ++
    MinusMinus, // --

    // Special
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<SpannedToken>, Vec<CompileError>> {
    let mut lexer = Lexer::new(source);
    lexer.tokenize()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<SpannedToken>,
    errors: Vec<CompileError>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<SpannedToken>, Vec<CompileError>> {
        while self.pos < self.bytes.len() {
            self.skip_whitespace_and_comments();
            if self.pos >= self.bytes.len() {
                break;
            }

            let start = self.pos;
            let ch = self.bytes[self.pos];

            match ch {
                b'\n' | b'\r' => {
                    // Collapse multiple newlines
                    while self.pos < self.bytes.len()
                        && (self.bytes[self.pos] == b'\n' || self.bytes[self.pos] == b'\r')
                    {
                        self.pos += 1;
                    }
                    // Suppress newline after tokens that indicate a continuation:
                    // operators, comma, opening delimiters, and prior newlines.
                    if let Some(last) = self.tokens.last() {
                        if !Self::continues_expression(&last.token) {
                            self.push(Token::Newline, start, self.pos);
                        }
                    }
                }
                b'(' => { self.pos += 1; self.push(Token::LParen, start, self.pos); }
                b')' => { self.pos += 1; self.push(Token::RParen, start, self.pos); }
                b'{' => { self.pos += 1; self.push(Token::LBrace, start, self.pos); }
                b'}' => { self.pos += 1; self.push(Token::RBrace, start, self.pos); }
                b',' => { self.pos += 1; self.push(Token::Comma, start, self.pos); }
                b':' => { self.pos += 1; self.push(Token::Colon, start, self.pos); }
                b';' => { self.pos += 1; self.push(Token::Semicolon, start, self.pos); }
                b'?' => { self.pos += 1; self.push(Token::Question, start, self.pos); }
                b'.' => {
                    if self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit) {
                        self.lex_number(start);
                    } else {
                        self.pos += 1;
                        self.push(Token::Dot, start, self.pos);
                    }
                }
                b'+' => {
                    self.pos += 1;
                    let token = match self.peek() {
                        Some(b'+') => { self.pos += 1; Token::PlusPlus }
                        Some(b'=') => { self.pos += 1; Token::PlusEq }
                        _ => Token::Plus,
                    };
                    self.push(token, start, self.pos);
                }
                b'-' => {
                    self.pos += 1;
                    let token = match self.peek() {
                        Some(b'-') => { self.pos += 1; Token::MinusMinus }
                        Some(b'=') => { self.pos += 1; Token::MinusEq }
                        _ => Token::Minus,
                    };
                    self.push(token, start, self.pos);
                }
                b'*' => {
                    self.pos += 1;
                    let token = match self.peek() {
                        Some(b'*') => { self.pos += 1; Token::StarStar }
                        Some(b'=') => { self.pos += 1; Token::StarEq }
                        _ => Token::Star,
                    };
                    self.push(token, start, self.pos);
                }
                b'/' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::SlashEq, start, self.pos);
                    } else {
                        self.push(Token::Slash, start, self.pos);
                    }
                }
                b'%' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::PercentEq, start, self.pos);
                    } else {
                        self.push(Token::Percent, start, self.pos);
                    }
                }
                b'|' => {
                    self.pos += 1;
                    if self.peek() == Some(b'|') {
                        self.pos += 1;
                        self.push(Token::Or, start, self.pos);
                    } else {
                        self.errors.push(CompileError::lexer(
                            "Expected '||' for logical OR",
                            Span::new(start, self.pos),
                        ));
                    }
                }
                b'&' => {
                    self.pos += 1;
                    if self.peek() == Some(b'&') {
                        self.pos += 1;
                        self.push(Token::And, start, self.pos);
                    } else {
                        self.errors.push(CompileError::lexer(
                            "Expected '&&' for logical AND",
                            Span::new(start, self.pos),
                        ));
                    }
                }
                b'<' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::Le, start, self.pos);
                    } else {
                        self.push(Token::Lt, start, self.pos);
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::Ge, start, self.pos);
                    } else {
                        self.push(Token::Gt, start, self.pos);
                    }
                }
                b'=' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        if self.peek() == Some(b'=') {
                            self.pos += 1;
                            self.push(Token::EqEqEq, start, self.pos);
                        } else {
                            self.push(Token::EqEq, start, self.pos);
                        }
                    } else {
                        self.push(Token::Eq, start, self.pos);
                    }
                }
                b'!' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        if self.peek() == Some(b'=') {
                            self.pos += 1;
                            self.push(Token::NeEq, start, self.pos);
                        } else {
                            self.push(Token::Ne, start, self.pos);
                        }
                    } else {
                        self.push(Token::Bang, start, self.pos);
                    }
                }
                b'"' | b'\'' => {
                    self.pos += 1;
                    self.lex_string(start, ch);
                }
                b'0'..=b'9' => {
                    self.lex_number(start);
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => {
                    self.lex_ident(start);
                }
                _ => {
                    let bad = self.source[start..].chars().next().unwrap_or('?');
                    self.errors.push(CompileError::lexer(
                        format!("Unexpected character: '{bad}'"),
                        Span::new(start, start + bad.len_utf8()),
                    ));
                    self.pos += bad.len_utf8();
                }
            }
        }

        // Remove trailing newline
        if let Some(last) = self.tokens.last() {
            if matches!(last.token, Token::Newline) {
                self.tokens.pop();
            }
        }

        self.tokens.push(SpannedToken {
            token: Token::Eof,
            span: Span::new(self.pos, self.pos),
        });

        if self.errors.is_empty() {
            Ok(std::mem::take(&mut self.tokens))
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn push(&mut self, token: Token, start: usize, end: usize) {
        // If the new token is an infix operator and the previous token was a
        // Newline, remove the Newline: the expression continues from the
        // previous line.  This allows:
        //   v.floor = v.n < 0.33
        //       ? a
        //       : b
        if Self::continues_from_previous(&token) {
            if let Some(last) = self.tokens.last() {
                if matches!(last.token, Token::Newline) {
                    self.tokens.pop();
                }
            }
        }
        self.tokens.push(SpannedToken {
            token,
            span: Span::new(start, end),
        });
    }

    /// Returns true if a newline after this token should be suppressed,
    /// because the token indicates an expression continues on the next line.
    fn continues_expression(token: &Token) -> bool {
        matches!(
            token,
            Token::Plus
                | Token::Minus
                | Token::Star
                | Token::StarStar
                | Token::Slash
                | Token::Percent
                | Token::Lt
                | Token::Gt
                | Token::Le
                | Token::Ge
                | Token::EqEq
                | Token::Ne
                | Token::EqEqEq
                | Token::NeEq
                | Token::And
                | Token::Or
                | Token::Bang
                | Token::Eq
                | Token::PlusEq
                | Token::MinusEq
                | Token::StarEq
                | Token::SlashEq
                | Token::PercentEq
                | Token::Question
                | Token::Colon
                | Token::Dot
                | Token::Comma
                | Token::Semicolon
                | Token::LParen
                | Token::LBrace
                | Token::Newline
        )
    }

    /// Returns true if this token at the START of a new line means the
    /// previous expression continues (leading operator continuation).
    /// More conservative than `continues_expression`; excludes `-`, `+`, `!`
    /// and `++`/`--` which can also start a new statement.
    fn continues_from_previous(token: &Token) -> bool {
        matches!(
            token,
            Token::Star
                | Token::StarStar
                | Token::Slash
                | Token::Percent
                | Token::Lt
                | Token::Gt
                | Token::Le
                | Token::Ge
                | Token::EqEq
                | Token::Ne
                | Token::EqEqEq
                | Token::NeEq
                | Token::And
                | Token::Or
                | Token::Dot
                | Token::Question
                | Token::Colon
                | Token::RParen
        )
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b' ' | b'\t' => self.pos += 1,
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    // Line comment: skip to end of line
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    let mut closed = false;
                    let mut saw_newline = false;
                    while self.pos < self.bytes.len() {
                        if self.bytes[self.pos] == b'*' && self.bytes.get(self.pos + 1) == Some(&b'/') {
                            self.pos += 2;
                            closed = true;
                            break;
                        }
                        saw_newline |= self.bytes[self.pos] == b'\n';
                        self.pos += 1;
                    }
                    if !closed {
                        self.errors.push(CompileError::lexer(
                            "Unterminated block comment",
                            Span::new(start, self.pos),
                        ));
                    } else if saw_newline {
                        // A multi-line comment separates statements like a newline does.
                        if let Some(last) = self.tokens.last() {
                            if !Self::continues_expression(&last.token) {
                                self.push(Token::Newline, start, self.pos);
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_string(&mut self, start: usize, quote: u8) {
        let str_start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != quote && self.bytes[self.pos] != b'\n' {
            self.pos += 1;
        }
        let s = self.source[str_start..self.pos].to_string();
        if self.pos < self.bytes.len() && self.bytes[self.pos] == quote {
            self.pos += 1;
        } else {
            self.errors.push(CompileError::lexer(
                "Unterminated string literal",
                Span::new(start, self.pos),
            ));
        }
        self.push(Token::String(s), start, self.pos);
    }

    fn lex_number(&mut self, start: usize) {
        self.eat_digits();
        // Fractional part: `1.5`, `.5` or a bare trailing dot `2.`
        let has_integer_part = self.pos > start;
        if self.peek() == Some(b'.')
            && (has_integer_part || self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit))
        {
            self.pos += 1; // skip '.'
            self.eat_digits();
        }
        // Exponent: `1e3`, `2.5E-4`
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.eat_digits();
            } else {
                self.pos = mark;
            }
        }
        let text = &self.source[start..self.pos];
        match text.parse::<f64>() {
            Ok(v) => self.push(Token::Number(v), start, self.pos),
            Err(_) => self.errors.push(CompileError::lexer(
                format!("Invalid number: {text}"),
                Span::new(start, self.pos),
            )),
        }
        if self.peek().is_some_and(|b| b.is_ascii_alphabetic() || b == b'_') {
            let bad_start = self.pos;
            while self.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
                self.pos += 1;
            }
            self.errors.push(CompileError::lexer(
                format!("Identifier starts immediately after number: {}", &self.source[start..self.pos]),
                Span::new(bad_start, self.pos),
            ));
        }
    }

    fn eat_digits(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
    }

    fn lex_ident(&mut self, start: usize) {
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric()
                || self.bytes[self.pos] == b'_'
                || self.bytes[self.pos] == b'$')
        {
            self.pos += 1;
        }
        let word = &self.source[start..self.pos];
        let token = match word {
            "let" => Token::Let,
            "const" => Token::Const,
            "var" => Token::Var,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "for" => Token::For,
            "return" => Token::Return,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "undefined" => Token::Undefined,
            _ => Token::Ident(word.to_string()),
        };
        self.push(token, start, self.pos);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tok(s: &str) -> Vec<Token> {
        lex(s).unwrap().into_iter().map(|t| t.token).collect()
    }

    fn ident(s: &str) -> Token {
        Token::Ident(s.into())
    }

    #[test]
    fn simple_tokens() {
        let tokens = tok("1 + 2.5");
        assert_eq!(tokens, vec![Token::Number(1.0), Token::Plus, Token::Number(2.5), Token::Eof]);
    }

    #[test]
    fn number_forms() {
        let tokens = tok(".5 1e3 2.5E-1");
        assert_eq!(tokens, vec![
            Token::Number(0.5), Token::Number(1000.0), Token::Number(0.25), Token::Eof,
        ]);
    }

    #[test]
    fn trailing_dot_numbers() {
        let tokens = tok("2. 1.e3 3.*x");
        assert_eq!(tokens, vec![
            Token::Number(2.0), Token::Number(1000.0), Token::Number(3.0),
            Token::Star, ident("x"), Token::Eof,
        ]);
    }

    #[test]
    fn keywords() {
        let tokens = tok("let const var if else while for return");
        assert_eq!(tokens, vec![
            Token::Let, Token::Const, Token::Var, Token::If, Token::Else,
            Token::While, Token::For, Token::Return, Token::Eof,
        ]);
    }

    #[test]
    fn literal_keywords() {
        let tokens = tok("true false null undefined");
        assert_eq!(tokens, vec![Token::True, Token::False, Token::Null, Token::Undefined, Token::Eof]);
    }

    #[test]
    fn operators() {
        let tokens = tok("+ - * / % ** < > <= >= == != === !== && || !");
        assert_eq!(tokens, vec![
            Token::Plus, Token::Minus, Token::Star, Token::Slash, Token::Percent, Token::StarStar,
            Token::Lt, Token::Gt, Token::Le, Token::Ge, Token::EqEq, Token::Ne,
            Token::EqEqEq, Token::NeEq, Token::And, Token::Or, Token::Bang, Token::Eof,
        ]);
    }

    #[test]
    fn assignment_operators() {
        let tokens = tok("a = b += c -= d *= e /= f %= g");
        assert_eq!(tokens, vec![
            ident("a"), Token::Eq, ident("b"), Token::PlusEq, ident("c"), Token::MinusEq,
            ident("d"), Token::StarEq, ident("e"), Token::SlashEq, ident("f"),
            Token::PercentEq, ident("g"), Token::Eof,
        ]);
    }

    #[test]
    fn increment_tokens() {
        let tokens = tok("i++; --j");
        assert_eq!(tokens, vec![
            ident("i"), Token::PlusPlus, Token::Semicolon, Token::MinusMinus, ident("j"), Token::Eof,
        ]);
    }

    #[test]
    fn string_keys() {
        let tokens = tok("{ \"r\": 1, 'g': 0 }");
        assert_eq!(tokens, vec![
            Token::LBrace, Token::String("r".into()), Token::Colon, Token::Number(1.0),
            Token::Comma, Token::String("g".into()), Token::Colon, Token::Number(0.0),
            Token::RBrace, Token::Eof,
        ]);
    }

    #[test]
    fn newlines_as_terminators() {
        let tokens = tok("let a = 1\nlet b = 2");
        assert_eq!(tokens, vec![
            Token::Let, ident("a"), Token::Eq, Token::Number(1.0),
            Token::Newline,
            Token::Let, ident("b"), Token::Eq, Token::Number(2.0),
            Token::Eof,
        ]);
    }

    #[test]
    fn no_newline_after_semicolon() {
        let tokens = tok("a;\nb");
        assert_eq!(tokens, vec![ident("a"), Token::Semicolon, ident("b"), Token::Eof]);
    }

    #[test]
    fn comments_stripped() {
        let tokens = tok("x + y // this is a comment\nz");
        assert_eq!(tokens, vec![
            ident("x"), Token::Plus, ident("y"),
            Token::Newline,
            ident("z"), Token::Eof,
        ]);
    }

    #[test]
    fn block_comments_stripped() {
        let tokens = tok("x /* inline */ + y");
        assert_eq!(tokens, vec![ident("x"), Token::Plus, ident("y"), Token::Eof]);
    }

    #[test]
    fn multiline_block_comment_separates_statements() {
        let tokens = tok("x /* a\nb */ y");
        assert_eq!(tokens, vec![ident("x"), Token::Newline, ident("y"), Token::Eof]);
    }

    #[test]
    fn unterminated_block_comment_is_error() {
        assert!(lex("x /* never closed").is_err());
    }

    #[test]
    fn no_newline_after_lbrace() {
        let tokens = tok("{\nx\n}");
        assert_eq!(tokens, vec![
            Token::LBrace,
            ident("x"),
            Token::Newline,
            Token::RBrace,
            Token::Eof,
        ]);
    }

    #[test]
    fn no_newline_after_operator() {
        let tokens = tok("1 &&\n2");
        assert_eq!(tokens, vec![Token::Number(1.0), Token::And, Token::Number(2.0), Token::Eof]);
    }

    #[test]
    fn leading_ternary_continuation() {
        let tokens = tok("a\n? b\n: c");
        assert_eq!(tokens, vec![
            ident("a"), Token::Question, ident("b"), Token::Colon, ident("c"), Token::Eof,
        ]);
    }

    #[test]
    fn leading_dot_and_paren_continuation() {
        let tokens = tok("v\n.n\n)");
        assert_eq!(tokens, vec![ident("v"), Token::Dot, ident("n"), Token::RParen, Token::Eof]);
    }

    #[test]
    fn minus_at_line_start_starts_statement() {
        let tokens = tok("a\n-b");
        assert_eq!(tokens, vec![ident("a"), Token::Newline, Token::Minus, ident("b"), Token::Eof]);
    }

    #[test]
    fn star_star_vs_star() {
        let tokens = tok("a * b ** c");
        assert_eq!(tokens, vec![
            ident("a"), Token::Star, ident("b"), Token::StarStar, ident("c"), Token::Eof,
        ]);
    }

    #[test]
    fn unexpected_character_reported() {
        let errs = lex("a # b").unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains('#'));
    }

    #[test]
    fn single_pipe_is_error() {
        assert!(lex("a | b").is_err());
    }

    #[test]
    fn number_followed_by_letters_is_error() {
        assert!(lex("3px").is_err());
    }
}
