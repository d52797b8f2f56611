use crate::error::ScriptError;
use crate::item::Tag;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Tag(Tag),
    Str(String),
    Number(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    PathSep,
    Equals,
    Tilde,
    RegexMatch,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Tag(tag) => format!("tag {tag}"),
            TokenKind::Str(s) => format!("string \"{s}\""),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::PathSep => "'::'".to_string(),
            TokenKind::Equals => "'='".to_string(),
            TokenKind::Tilde => "'~'".to_string(),
            TokenKind::RegexMatch => "'=~'".to_string(),
            TokenKind::Eof => "end of script".to_string(),
        }
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, TokenKind::Ident(name) if name.eq_ignore_ascii_case(keyword))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

pub fn error_at(line: usize, column: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Parse {
        line,
        column,
        message: message.into(),
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

/// Splits script text into tokens. `//` comments run to the end of the line.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
    };
    let mut tokens: Vec<Token> = Vec::new();

    loop {
        lexer.skip_trivia();
        let (line, column) = (lexer.line, lexer.column);
        let Some(c) = lexer.peek(0) else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                line,
                column,
            });
            return Ok(tokens);
        };

        // A bracket right after IN opens a range; anywhere else it is a tag
        let after_in = tokens.last().is_some_and(|t| t.kind.is_keyword("IN"));

        let kind = match c {
            '(' => {
                lexer.bump();
                TokenKind::LParen
            }
            ')' => {
                lexer.bump();
                TokenKind::RParen
            }
            '[' if !after_in => lexer.tag(line, column)?,
            '[' => {
                lexer.bump();
                TokenKind::LBracket
            }
            ']' => {
                lexer.bump();
                TokenKind::RBracket
            }
            ',' => {
                lexer.bump();
                TokenKind::Comma
            }
            ':' if lexer.peek(1) == Some(':') => {
                lexer.bump();
                lexer.bump();
                TokenKind::PathSep
            }
            '=' if lexer.peek(1) == Some('~') => {
                lexer.bump();
                lexer.bump();
                TokenKind::RegexMatch
            }
            '=' => {
                lexer.bump();
                TokenKind::Equals
            }
            '~' => {
                lexer.bump();
                TokenKind::Tilde
            }
            '"' => lexer.string(line, column)?,
            c if c.is_ascii_digit() || c == '-' || c == '.' => lexer.number(line, column)?,
            c if c.is_ascii_alphabetic() || c == '_' => lexer.ident(),
            other => {
                return Err(error_at(
                    line,
                    column,
                    format!("unexpected character '{other}'"),
                ))
            }
        };
        tokens.push(Token { kind, line, column });
    }
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek(0) {
            if c.is_whitespace() {
                self.bump();
            } else if c == '/' && self.peek(1) == Some('/') {
                while let Some(c) = self.peek(0) {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek(0) {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn ident(&mut self) -> TokenKind {
        TokenKind::Ident(self.take_while(|c| c.is_ascii_alphanumeric() || c == '_'))
    }

    fn number(&mut self, line: usize, column: usize) -> Result<TokenKind, ScriptError> {
        let mut text = String::new();
        if self.peek(0) == Some('-') {
            text.push('-');
            self.bump();
        }
        text.push_str(&self.take_while(|c| c.is_ascii_digit() || c == '.'));
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| error_at(line, column, format!("malformed number '{text}'")))
    }

    fn string(&mut self, line: usize, column: usize) -> Result<TokenKind, ScriptError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(error_at(line, column, "unterminated string literal")),
                Some('"') => return Ok(TokenKind::Str(out)),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    // Other escapes are kept verbatim so regex classes like \d survive
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(error_at(line, column, "unterminated string literal")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn tag(&mut self, line: usize, column: usize) -> Result<TokenKind, ScriptError> {
        let mut text = String::new();
        while let Some(c) = self.bump() {
            text.push(c);
            if c == ']' || text.len() > 16 {
                break;
            }
        }
        text.parse::<Tag>()
            .map(TokenKind::Tag)
            .map_err(|_| error_at(line, column, format!("malformed tag '{text}'")))
    }
}
