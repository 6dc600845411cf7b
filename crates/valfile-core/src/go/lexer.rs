use super::ast::Pos;
use super::SyntaxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Keyword,
    Int,
    Float,
    Imag,
    Char,
    String,
    Op,
    /// Explicit `;` or one inserted at a newline / end of file.
    Semi,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Pos,
    /// Byte range in the source; inserted semicolons are empty.
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    pub fn is_keyword(&self, kw: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == kw
    }
}

const KEYWORDS: &[&str] = &[
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

// Longest first so that prefix matching picks the longest operator.
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "&^=", "...", "&&", "||", "<-", "++", "--", "==", "!=", "<=", ">=", ":=",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "&^", "+", "-", "*", "/", "%",
    "&", "|", "^", "<", ">", "=", "!", "~", "(", ")", "[", "]", "{", "}", ",", ".", ":",
];

/// Tokenizes Go source, applying the automatic semicolon insertion rule.
pub fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(src).run()
}

struct Lexer<'a> {
    src: &'a str,
    offset: usize,
    line: u32,
    col: u32,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src,
            offset: 0,
            line: 1,
            col: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        loop {
            self.skip_blanks();
            let Some(c) = self.peek() else {
                self.insert_semi();
                let pos = self.pos();
                self.tokens.push(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    pos,
                    start: self.offset,
                    end: self.offset,
                });
                return Ok(self.tokens);
            };

            if c == '\n' {
                self.insert_semi();
                self.bump();
                continue;
            }
            if self.rest().starts_with("//") {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            if self.rest().starts_with("/*") {
                self.general_comment()?;
                continue;
            }

            let start = self.offset;
            let pos = self.pos();
            let kind = if is_letter(c) {
                self.eat_while(|c| is_letter(c) || c.is_ascii_digit() || c.is_numeric());
                if KEYWORDS.contains(&&self.src[start..self.offset]) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Ident
                }
            } else if c.is_ascii_digit() || (c == '.' && self.peek_nth(1).is_some_and(|d| d.is_ascii_digit())) {
                self.number()
            } else if c == '"' {
                self.interpreted_string(pos)?;
                TokenKind::String
            } else if c == '`' {
                self.raw_string(pos)?;
                TokenKind::String
            } else if c == '\'' {
                self.rune(pos)?;
                TokenKind::Char
            } else if c == ';' {
                self.bump();
                TokenKind::Semi
            } else if let Some(op) = OPERATORS.iter().find(|op| self.rest().starts_with(**op)) {
                for _ in 0..op.len() {
                    self.bump();
                }
                TokenKind::Op
            } else {
                return Err(SyntaxError::new(pos, format!("invalid character {c:?}")));
            };

            self.tokens.push(Token {
                kind,
                text: self.src[start..self.offset].to_string(),
                pos,
                start,
                end: self.offset,
            });
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
        }
    }

    fn skip_blanks(&mut self) {
        self.eat_while(|c| c == ' ' || c == '\t' || c == '\r' || c == '\u{feff}');
    }

    /// Go inserts a semicolon at a line break when the line's final token is
    /// an identifier, a literal, one of the keywords `break continue
    /// fallthrough return`, or one of `++ -- ) ] }`.
    fn insert_semi(&mut self) {
        let Some(last) = self.tokens.last() else {
            return;
        };
        let wants = match last.kind {
            TokenKind::Ident
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::Imag
            | TokenKind::Char
            | TokenKind::String => true,
            TokenKind::Keyword => matches!(
                last.text.as_str(),
                "break" | "continue" | "fallthrough" | "return"
            ),
            TokenKind::Op => matches!(last.text.as_str(), "++" | "--" | ")" | "]" | "}"),
            TokenKind::Semi | TokenKind::Eof => false,
        };
        if wants {
            let pos = self.pos();
            self.tokens.push(Token {
                kind: TokenKind::Semi,
                text: String::new(),
                pos,
                start: self.offset,
                end: self.offset,
            });
        }
    }

    fn general_comment(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        self.bump();
        self.bump();
        let mut saw_newline = false;
        loop {
            if self.rest().starts_with("*/") {
                self.bump();
                self.bump();
                break;
            }
            match self.bump() {
                Some('\n') => saw_newline = true,
                Some(_) => {}
                None => return Err(SyntaxError::new(pos, "comment not terminated")),
            }
        }
        // A comment spanning lines acts like a newline.
        if saw_newline {
            self.insert_semi();
        }
        Ok(())
    }

    fn number(&mut self) -> TokenKind {
        let mut kind = TokenKind::Int;
        let hex = self.rest().starts_with("0x") || self.rest().starts_with("0X");
        let mut prev = '\0';
        while let Some(c) = self.peek() {
            let exponent_sign =
                (c == '+' || c == '-') && (matches!(prev, 'e' | 'E') && !hex || matches!(prev, 'p' | 'P'));
            if !(c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign) {
                break;
            }
            if c == '.' || (!hex && matches!(c, 'e' | 'E')) || matches!(c, 'p' | 'P') {
                kind = TokenKind::Float;
            }
            prev = c;
            self.bump();
        }
        if prev == 'i' {
            kind = TokenKind::Imag;
        }
        kind
    }

    fn interpreted_string(&mut self, pos: Pos) -> Result<(), SyntaxError> {
        self.bump();
        loop {
            match self.bump() {
                Some('"') => return Ok(()),
                Some('\\') => {
                    if self.bump().is_none() {
                        break;
                    }
                }
                Some('\n') | None => break,
                Some(_) => {}
            }
        }
        Err(SyntaxError::new(pos, "string literal not terminated"))
    }

    fn raw_string(&mut self, pos: Pos) -> Result<(), SyntaxError> {
        self.bump();
        loop {
            match self.bump() {
                Some('`') => return Ok(()),
                Some(_) => {}
                None => return Err(SyntaxError::new(pos, "raw string literal not terminated")),
            }
        }
    }

    fn rune(&mut self, pos: Pos) -> Result<(), SyntaxError> {
        self.bump();
        loop {
            match self.bump() {
                Some('\'') => return Ok(()),
                Some('\\') => {
                    if self.bump().is_none() {
                        break;
                    }
                }
                Some('\n') | None => break,
                Some(_) => {}
            }
        }
        Err(SyntaxError::new(pos, "rune literal not terminated"))
    }
}

fn is_letter(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_texts(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src)
            .expect("tokenize")
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn inserts_semicolons_after_line_final_tokens() {
        let toks = kinds_and_texts("type A struct {\n\tFoo string `json:\"foo\"`\n}\n");
        let semis: Vec<usize> = toks
            .iter()
            .enumerate()
            .filter(|(_, (k, _))| *k == TokenKind::Semi)
            .map(|(i, _)| i)
            .collect();
        // After the tag literal and after the closing brace; none after `{`.
        assert_eq!(semis.len(), 2);
        assert_eq!(toks[semis[0] - 1].1, "`json:\"foo\"`");
        assert_eq!(toks[semis[1] - 1].1, "}");
    }

    #[test]
    fn comments_are_skipped_and_multiline_comment_acts_as_newline() {
        let toks = kinds_and_texts("a /* x\ny */ b // tail\nc");
        let texts: Vec<&str> = toks.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["a", "", "b", "", "c", "", ""]);
    }

    #[test]
    fn numbers_and_operators() {
        let toks = kinds_and_texts("x := 1e-3 + 0x1p-2 + 3i <- ...");
        assert_eq!(toks[2], (TokenKind::Float, "1e-3".to_string()));
        assert_eq!(toks[4], (TokenKind::Float, "0x1p-2".to_string()));
        assert_eq!(toks[6], (TokenKind::Imag, "3i".to_string()));
        assert_eq!(toks[7], (TokenKind::Op, "<-".to_string()));
        assert_eq!(toks[8], (TokenKind::Op, "...".to_string()));
    }

    #[test]
    fn unterminated_string_is_reported_with_position() {
        let err = tokenize("package p\nvar s = \"abc\n").unwrap_err();
        assert_eq!(err.pos, Pos { line: 2, col: 9 });
        assert_eq!(err.message, "string literal not terminated");
    }
}
