//! Lexer for Verse
//!
//! Converts source code into a stream of tokens.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, FileId, Result, Span};

/// The lexer state
pub struct Lexer {
    /// Source code as characters
    source: Vec<char>,
    /// Current position in source
    pos: usize,
    /// Start position of current token
    start: usize,
    /// Current line (1-based)
    line: u32,
    /// Line of the current token's first character
    start_line: u32,
    /// File ID for span tracking
    file_id: FileId,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str, file_id: FileId) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            start: 0,
            line: 1,
            start_line: 1,
            file_id,
        }
    }

    /// Get the current character without advancing
    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    /// Get the character `n` places ahead without advancing
    fn peek_at(&self, n: usize) -> Option<char> {
        self.source.get(self.pos + n).copied()
    }

    /// Advance to the next character
    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c == Some('\n') {
            self.line += 1;
        }
        self.pos += 1;
        c
    }

    /// Check if we've reached the end of input
    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    /// Create a span from start to current position
    fn make_span(&self) -> Span {
        Span::new(self.start, self.pos, self.start_line, self.file_id)
    }

    /// Create a token with the current span
    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.make_span())
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                // Line comment
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                // Block comment (nesting)
                '/' if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    let mut depth = 1;
                    while depth > 0 && !self.is_at_end() {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                depth -= 1;
                            }
                            (Some('/'), Some('*')) => {
                                self.advance();
                                self.advance();
                                depth += 1;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn read_word(&mut self) -> String {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        self.source[self.start..self.pos].iter().collect()
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let text = self.read_word();
        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Ident(text));
        self.make_token(kind)
    }

    /// Read a `#name` directive
    fn read_directive(&mut self) -> Result<Token> {
        self.advance(); // #
        let word_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if word_start == self.pos {
            return Err(Error::UnexpectedChar { ch: '#', span: self.make_span() });
        }
        let name: String = self.source[word_start..self.pos].iter().collect();
        Ok(self.make_token(TokenKind::Directive(name)))
    }

    /// Read a number literal (integer or float)
    fn read_number(&mut self) -> Result<Token> {
        // Hex literal
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() || c == '_' {
                    self.advance();
                } else {
                    break;
                }
            }
            let text: String = self.source[self.start..self.pos]
                .iter()
                .filter(|&&c| c != '_')
                .collect();
            let value = u64::from_str_radix(&text[2..], 16)
                .map_err(|_| Error::InvalidNumber { text: text.clone(), span: self.make_span() })?;
            return Ok(self.make_token(TokenKind::IntLit(value)));
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        // A '.' followed by a digit continues the literal; `1...` and `a.b` do not
        if self.peek() == Some('.') && self.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '_' {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let text: String = self.source[self.start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();

        if is_float {
            let value = text
                .parse()
                .map_err(|_| Error::InvalidNumber { text: text.clone(), span: self.make_span() })?;
            Ok(self.make_token(TokenKind::FloatLit(value)))
        } else {
            let value = text
                .parse()
                .map_err(|_| Error::InvalidNumber { text: text.clone(), span: self.make_span() })?;
            Ok(self.make_token(TokenKind::IntLit(value)))
        }
    }

    fn read_escape(&mut self) -> Option<char> {
        let c = self.advance()?;
        Some(match c {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            other => other,
        })
    }

    /// Read a string literal
    fn read_string(&mut self) -> Result<Token> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.read_escape() {
                        Some(c) => value.push(c),
                        None => return Err(Error::UnterminatedString { span: self.make_span() }),
                    }
                }
                Some('\n') | None => {
                    return Err(Error::UnterminatedString { span: self.make_span() });
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        Ok(self.make_token(TokenKind::StringLit(value)))
    }

    /// Read either a char literal (`'a'`, `'\n'`) or the owned marker `'`
    fn read_quote(&mut self) -> Token {
        let is_char = match (self.peek_at(1), self.peek_at(2), self.peek_at(3)) {
            (Some('\\'), Some(_), Some('\'')) => true,
            (Some(c), Some('\''), _) => c != '\\' && c != '\'',
            _ => false,
        };
        self.advance(); // '
        if !is_char {
            return self.make_token(TokenKind::Quote);
        }
        let c = if self.peek() == Some('\\') {
            self.advance();
            self.read_escape().unwrap_or('\0')
        } else {
            self.advance().unwrap_or('\0')
        };
        self.advance(); // closing quote
        self.make_token(TokenKind::CharLit(c as u32 as u8))
    }

    fn two(&mut self, next: char, yes: TokenKind, no: TokenKind) -> TokenKind {
        if self.peek() == Some(next) {
            self.advance();
            yes
        } else {
            no
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        self.start = self.pos;
        self.start_line = self.line;

        let Some(c) = self.peek() else {
            return Ok(Token::eof(self.make_span()));
        };

        if c.is_alphabetic() || c == '_' {
            return Ok(self.read_identifier());
        }
        if c.is_ascii_digit() {
            return self.read_number();
        }
        match c {
            '"' => return self.read_string(),
            '\'' => return Ok(self.read_quote()),
            '#' => return self.read_directive(),
            _ => {}
        }

        self.advance();
        let kind = match c {
            '+' => self.two('=', TokenKind::PlusEq, TokenKind::Plus),
            '-' => {
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Arrow
                } else {
                    self.two('=', TokenKind::MinusEq, TokenKind::Minus)
                }
            }
            '*' => self.two('=', TokenKind::StarEq, TokenKind::Star),
            '/' => self.two('=', TokenKind::SlashEq, TokenKind::Slash),
            '%' => self.two('=', TokenKind::PercentEq, TokenKind::Percent),
            '=' => self.two('=', TokenKind::EqEq, TokenKind::Eq),
            '!' => self.two('=', TokenKind::Ne, TokenKind::Not),
            '<' => {
                if self.peek() == Some('<') {
                    self.advance();
                    TokenKind::Shl
                } else {
                    self.two('=', TokenKind::Le, TokenKind::Lt)
                }
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Shr
                } else {
                    self.two('=', TokenKind::Ge, TokenKind::Gt)
                }
            }
            '&' => self.two('&', TokenKind::AndAnd, TokenKind::And),
            '|' => self.two('|', TokenKind::OrOr, TokenKind::Or),
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '$' => TokenKind::Dollar,
            '.' => {
                if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::DotDotDot
                } else {
                    TokenKind::Dot
                }
            }
            ':' => {
                if self.peek() == Some(':') {
                    self.advance();
                    TokenKind::ColonColon
                } else {
                    self.two('=', TokenKind::ColonEq, TokenKind::Colon)
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            other => return Err(Error::UnexpectedChar { ch: other, span: self.make_span() }),
        };

        Ok(self.make_token(kind))
    }

    /// Tokenize the entire source and return all tokens
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, 0)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = kinds("fn main() { }");
        assert!(matches!(tokens[0], TokenKind::Fn));
        assert!(matches!(tokens[1], TokenKind::Ident(ref s) if s == "main"));
        assert!(matches!(tokens[2], TokenKind::LParen));
        assert!(matches!(tokens[3], TokenKind::RParen));
        assert!(matches!(tokens[4], TokenKind::LBrace));
        assert!(matches!(tokens[5], TokenKind::RBrace));
        assert!(matches!(tokens[6], TokenKind::Eof));
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds("42 3.14 0xFF_FF 1e3");
        assert!(matches!(tokens[0], TokenKind::IntLit(42)));
        assert!(matches!(tokens[1], TokenKind::FloatLit(f) if (f - 3.14).abs() < 0.001));
        assert!(matches!(tokens[2], TokenKind::IntLit(0xFFFF)));
        assert!(matches!(tokens[3], TokenKind::FloatLit(f) if f == 1000.0));
    }

    #[test]
    fn test_strings() {
        let tokens = kinds(r#""hello\nworld""#);
        assert!(matches!(tokens[0], TokenKind::StringLit(ref s) if s == "hello\nworld"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("\"abc", 0).tokenize().unwrap_err();
        assert!(matches!(err, Error::UnterminatedString { .. }));
    }

    #[test]
    fn test_owned_marker_and_chars() {
        let tokens = kinds("&'int 'a' '\\n' []'T");
        assert_eq!(tokens[0], TokenKind::And);
        assert_eq!(tokens[1], TokenKind::Quote);
        assert!(matches!(tokens[2], TokenKind::Ident(ref s) if s == "int"));
        assert_eq!(tokens[3], TokenKind::CharLit(b'a'));
        assert_eq!(tokens[4], TokenKind::CharLit(b'\n'));
        assert_eq!(tokens[5], TokenKind::LBracket);
        assert_eq!(tokens[6], TokenKind::RBracket);
        assert_eq!(tokens[7], TokenKind::Quote);
    }

    #[test]
    fn test_declaration_operators() {
        let tokens = kinds("x := 1; Y :: 2; a += 3; ...rest $T");
        assert_eq!(tokens[1], TokenKind::ColonEq);
        assert_eq!(tokens[5], TokenKind::ColonColon);
        assert_eq!(tokens[9], TokenKind::PlusEq);
        assert_eq!(tokens[12], TokenKind::DotDotDot);
        assert_eq!(tokens[14], TokenKind::Dollar);
    }

    #[test]
    fn test_directives_and_lines() {
        let tokens = Lexer::new("#import \"math\"\n\nx", 3).tokenize().unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Directive(ref d) if d == "import"));
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[2].span.line, 3);
        assert_eq!(tokens[2].span.file_id, 3);
    }
}
