use std::collections::BTreeSet;
use std::path::Path;

use super::ast::{ChanDir, Field, ImportSpec, SourceFile, StructType, TypeDecl, TypeExpr};
use super::lexer::{tokenize, Token, TokenKind};
use super::literal::unquote;
use super::SyntaxError;

/// Parses one Go source file. `func`, `var` and `const` declarations are
/// skipped without being parsed; on a malformed declaration the parser records
/// the error and resumes at the next top-level declaration, so a single call
/// can report several errors.
pub fn parse_file(path: &Path, src: &str) -> Result<SourceFile, Vec<SyntaxError>> {
    let toks = tokenize(src).map_err(|e| vec![e])?;
    let mut p = Parser {
        src,
        toks,
        i: 0,
        errors: Vec::new(),
    };

    let package = match p.package_clause() {
        Ok(name) => name,
        Err(e) => return Err(vec![e]),
    };

    let mut imports = Vec::new();
    while p.peek().is_keyword("import") {
        let start = p.i;
        match p.import_decl(&mut imports) {
            Ok(()) => {}
            Err(e) => p.recover(start, e),
        }
    }

    let mut types = Vec::new();
    loop {
        let tok = p.peek().clone();
        match tok.kind {
            TokenKind::Eof => break,
            TokenKind::Semi => {
                p.bump();
            }
            TokenKind::Keyword if tok.text == "type" => {
                let start = p.i;
                if let Err(e) = p.type_decl(&mut types) {
                    p.recover(start, e);
                }
            }
            TokenKind::Keyword if matches!(tok.text.as_str(), "func" | "var" | "const") => {
                p.skip_decl();
            }
            TokenKind::Keyword if tok.text == "import" => {
                let start = p.i;
                p.recover(
                    start,
                    SyntaxError::new(tok.pos, "imports must appear before other declarations"),
                );
            }
            _ => {
                let start = p.i;
                p.recover(
                    start,
                    SyntaxError::new(tok.pos, "non-declaration statement outside function body"),
                );
            }
        }
    }

    if !p.errors.is_empty() {
        return Err(p.errors);
    }

    Ok(SourceFile {
        path: path.to_path_buf(),
        package,
        imports,
        types,
        sha256: crate::util::sha256_hex(src.as_bytes()),
    })
}

struct Parser<'a> {
    src: &'a str,
    toks: Vec<Token>,
    i: usize,
    errors: Vec<SyntaxError>,
}

type PResult<T> = Result<T, SyntaxError>;

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        let last = self.toks.len() - 1;
        &self.toks[(self.i + n).min(last)]
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.i += 1;
        }
        tok
    }

    fn prev_end(&self) -> usize {
        if self.i == 0 {
            0
        } else {
            self.toks[self.i - 1].end
        }
    }

    fn unexpected(&self, want: &str) -> SyntaxError {
        let tok = self.peek();
        let found = match tok.kind {
            TokenKind::Eof => "EOF".to_string(),
            TokenKind::Semi if tok.text.is_empty() => "newline".to_string(),
            _ => tok.text.clone(),
        };
        SyntaxError::new(tok.pos, format!("expected {want}, found {found}"))
    }

    fn expect_op(&mut self, op: &str) -> PResult<Token> {
        if self.peek().is_op(op) {
            return Ok(self.bump());
        }
        Err(self.unexpected(&format!("'{op}'")))
    }

    fn expect_ident(&mut self) -> PResult<Token> {
        if self.peek().kind == TokenKind::Ident {
            return Ok(self.bump());
        }
        Err(self.unexpected("identifier"))
    }

    /// A declaration or list element ends with `;`, which may be omitted
    /// before a closing `)` or `}`.
    fn expect_terminator(&mut self, closer: &str) -> PResult<()> {
        let tok = self.peek();
        if tok.kind == TokenKind::Semi {
            self.bump();
            return Ok(());
        }
        if tok.is_op(closer) || tok.kind == TokenKind::Eof {
            return Ok(());
        }
        if closer == ";" {
            return Err(self.unexpected("';'"));
        }
        Err(self.unexpected(&format!("';' or '{closer}'")))
    }

    fn skip_semis(&mut self) {
        while self.peek().kind == TokenKind::Semi {
            self.bump();
        }
    }

    fn recover(&mut self, start: usize, err: SyntaxError) {
        self.errors.push(err);
        // Resume from the declaration start with fresh bracket accounting;
        // always make progress.
        self.i = start;
        self.skip_decl();
        if self.i == start {
            self.bump();
        }
    }

    /// Skips to just past the next `;` at bracket depth 0.
    fn skip_decl(&mut self) {
        let mut depth: usize = 0;
        loop {
            let tok = self.bump();
            match tok.kind {
                TokenKind::Eof => return,
                TokenKind::Semi if depth == 0 => return,
                TokenKind::Op => match tok.text.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    _ => {}
                },
                _ => {}
            }
        }
    }

    /// Consumes a bracketed group starting at the current opener and returns
    /// its byte range, brackets included.
    fn skip_balanced(&mut self) -> PResult<(usize, usize)> {
        let open = self.bump();
        let closer = match open.text.as_str() {
            "(" => ")",
            "[" => "]",
            "{" => "}",
            _ => return Err(SyntaxError::new(open.pos, "expected opening bracket")),
        };
        let mut stack = vec![closer];
        loop {
            let tok = self.bump();
            match tok.kind {
                TokenKind::Eof => {
                    return Err(SyntaxError::new(open.pos, format!("unclosed '{}'", open.text)))
                }
                TokenKind::Op => match tok.text.as_str() {
                    "(" => stack.push(")"),
                    "[" => stack.push("]"),
                    "{" => stack.push("}"),
                    ")" | "]" | "}" => {
                        if stack.pop() != Some(tok.text.as_str()) {
                            return Err(SyntaxError::new(
                                tok.pos,
                                format!("unexpected '{}'", tok.text),
                            ));
                        }
                        if stack.is_empty() {
                            return Ok((open.start, tok.end));
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }
    }

    fn package_clause(&mut self) -> PResult<String> {
        self.skip_semis();
        if !self.peek().is_keyword("package") {
            return Err(self.unexpected("'package'"));
        }
        self.bump();
        let name = self.expect_ident()?;
        self.expect_terminator(";")?;
        Ok(name.text)
    }

    fn import_decl(&mut self, out: &mut Vec<ImportSpec>) -> PResult<()> {
        self.bump();
        if self.peek().is_op("(") {
            self.bump();
            loop {
                self.skip_semis();
                if self.peek().is_op(")") {
                    self.bump();
                    break;
                }
                out.push(self.import_spec()?);
                self.expect_terminator(")")?;
            }
        } else {
            out.push(self.import_spec()?);
        }
        self.expect_terminator(";")
    }

    fn import_spec(&mut self) -> PResult<ImportSpec> {
        let name = match self.peek().kind {
            TokenKind::Ident => Some(self.bump().text),
            TokenKind::Op if self.peek().text == "." => Some(self.bump().text),
            _ => None,
        };
        if self.peek().kind != TokenKind::String {
            return Err(self.unexpected("import path"));
        }
        let lit = self.bump();
        let path = unquote(&lit.text).map_err(|e| SyntaxError::new(lit.pos, e))?;
        Ok(ImportSpec { name, path })
    }

    fn type_decl(&mut self, out: &mut Vec<TypeDecl>) -> PResult<()> {
        self.bump();
        if self.peek().is_op("(") {
            self.bump();
            loop {
                self.skip_semis();
                if self.peek().is_op(")") {
                    self.bump();
                    break;
                }
                out.push(self.type_spec()?);
                self.expect_terminator(")")?;
            }
        } else {
            out.push(self.type_spec()?);
        }
        self.expect_terminator(";")
    }

    fn type_spec(&mut self) -> PResult<TypeDecl> {
        let name = self.expect_ident()?;
        let type_params = if self.at_type_params() {
            let (start, end) = self.skip_balanced()?;
            Some(self.src[start..end].to_string())
        } else {
            None
        };
        let alias = if self.peek().is_op("=") {
            self.bump();
            true
        } else {
            false
        };
        let ty = self.parse_type()?;
        Ok(TypeDecl {
            name: name.text,
            type_params,
            alias,
            ty,
            pos: name.pos,
            file: 0,
        })
    }

    /// Distinguishes `type A[T any] ...` from the array type `type A [N]T`.
    fn at_type_params(&self) -> bool {
        if !self.peek().is_op("[") || self.peek_at(1).kind != TokenKind::Ident {
            return false;
        }
        let after = self.peek_at(2);
        match after.kind {
            TokenKind::Ident => true,
            TokenKind::Keyword => matches!(
                after.text.as_str(),
                "interface" | "map" | "chan" | "func" | "struct"
            ),
            TokenKind::Op => matches!(after.text.as_str(), "~" | "," | "[" | "("),
            _ => false,
        }
    }

    fn parse_type(&mut self) -> PResult<TypeExpr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Ident => self.type_name(),
            TokenKind::Keyword => match tok.text.as_str() {
                "map" => {
                    self.bump();
                    self.expect_op("[")?;
                    let key = self.parse_type()?;
                    self.expect_op("]")?;
                    let value = self.parse_type()?;
                    Ok(TypeExpr::Map {
                        key: Box::new(key),
                        value: Box::new(value),
                    })
                }
                "chan" => {
                    self.bump();
                    let dir = if self.peek().is_op("<-") {
                        self.bump();
                        ChanDir::Send
                    } else {
                        ChanDir::Both
                    };
                    let elem = self.parse_type()?;
                    Ok(TypeExpr::Chan {
                        dir,
                        elem: Box::new(elem),
                    })
                }
                "func" => {
                    self.bump();
                    self.func_signature()
                }
                "struct" => self.struct_type().map(TypeExpr::Struct),
                "interface" => {
                    self.bump();
                    if !self.peek().is_op("{") {
                        return Err(self.unexpected("'{'"));
                    }
                    let (start, end) = self.skip_balanced()?;
                    Ok(TypeExpr::Interface(self.src[start..end].to_string()))
                }
                _ => Err(self.unexpected("type")),
            },
            TokenKind::Op => match tok.text.as_str() {
                "*" => {
                    self.bump();
                    Ok(TypeExpr::Pointer(Box::new(self.parse_type()?)))
                }
                "(" => {
                    self.bump();
                    let inner = self.parse_type()?;
                    self.expect_op(")")?;
                    Ok(TypeExpr::Paren(Box::new(inner)))
                }
                "<-" => {
                    self.bump();
                    if !self.peek().is_keyword("chan") {
                        return Err(self.unexpected("'chan'"));
                    }
                    self.bump();
                    let elem = self.parse_type()?;
                    Ok(TypeExpr::Chan {
                        dir: ChanDir::Recv,
                        elem: Box::new(elem),
                    })
                }
                "[" => self.array_or_slice(),
                _ => Err(self.unexpected("type")),
            },
            _ => Err(self.unexpected("type")),
        }
    }

    fn type_name(&mut self) -> PResult<TypeExpr> {
        let first = self.expect_ident()?;
        let base = if self.peek().is_op(".") && self.peek_at(1).kind == TokenKind::Ident {
            self.bump();
            let name = self.bump();
            TypeExpr::Qualified {
                package: first.text,
                name: name.text,
            }
        } else {
            TypeExpr::Ident(first.text)
        };
        if !self.peek().is_op("[") {
            return Ok(base);
        }
        self.bump();
        let mut args = Vec::new();
        loop {
            if self.peek().is_op("]") {
                break;
            }
            args.push(self.parse_type()?);
            if self.peek().is_op(",") {
                self.bump();
                continue;
            }
            break;
        }
        self.expect_op("]")?;
        if args.is_empty() {
            return Err(SyntaxError::new(first.pos, "expected type argument list"));
        }
        Ok(TypeExpr::Instance {
            base: Box::new(base),
            args,
        })
    }

    fn array_or_slice(&mut self) -> PResult<TypeExpr> {
        let open = self.peek().clone();
        if self.peek_at(1).is_op("]") {
            self.bump();
            self.bump();
            return Ok(TypeExpr::Slice(Box::new(self.parse_type()?)));
        }
        let (start, end) = self.skip_balanced()?;
        let len = self.src[start + 1..end - 1].trim().to_string();
        if len.is_empty() {
            return Err(SyntaxError::new(open.pos, "expected array length"));
        }
        let elem = self.parse_type()?;
        Ok(TypeExpr::Array {
            len,
            elem: Box::new(elem),
        })
    }

    /// Captures `(params) results` verbatim.
    fn func_signature(&mut self) -> PResult<TypeExpr> {
        if !self.peek().is_op("(") {
            return Err(self.unexpected("'('"));
        }
        let (start, mut end) = self.skip_balanced()?;
        let tok = self.peek().clone();
        let has_result = match tok.kind {
            TokenKind::Ident => true,
            TokenKind::Keyword => matches!(
                tok.text.as_str(),
                "map" | "chan" | "func" | "struct" | "interface"
            ),
            TokenKind::Op => matches!(tok.text.as_str(), "*" | "[" | "<-"),
            _ => false,
        };
        if tok.is_op("(") {
            end = self.skip_balanced()?.1;
        } else if has_result {
            self.parse_type()?;
            end = self.prev_end();
        }
        Ok(TypeExpr::Func(self.src[start..end].to_string()))
    }

    fn struct_type(&mut self) -> PResult<StructType> {
        self.bump();
        self.expect_op("{")?;
        let mut fields: Vec<Field> = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        loop {
            self.skip_semis();
            if self.peek().is_op("}") {
                self.bump();
                break;
            }
            let field = self.field_decl()?;
            for name in field.display_names() {
                if name != "_" && !seen.insert(name.clone()) {
                    return Err(SyntaxError::new(field.pos, format!("{name} redeclared")));
                }
            }
            fields.push(field);
            self.expect_terminator("}")?;
        }
        Ok(StructType { fields })
    }

    fn field_decl(&mut self) -> PResult<Field> {
        let pos = self.peek().pos;
        let tok = self.peek().clone();
        let embedded = match tok.kind {
            TokenKind::Op if tok.text == "*" => true,
            TokenKind::Ident => {
                let next = self.peek_at(1);
                next.is_op(".")
                    || next.is_op("}")
                    || next.kind == TokenKind::Semi
                    || next.kind == TokenKind::String
            }
            _ => return Err(self.unexpected("field name or embedded type")),
        };

        let (names, ty) = if embedded {
            let ty = self.parse_type()?;
            if super::ast::embedded_type_name(&ty).is_none() {
                return Err(SyntaxError::new(pos, "invalid embedded field type"));
            }
            (Vec::new(), ty)
        } else {
            let mut names = vec![self.expect_ident()?.text];
            while self.peek().is_op(",") {
                self.bump();
                names.push(self.expect_ident()?.text);
            }
            (names, self.parse_type()?)
        };

        let tag = if self.peek().kind == TokenKind::String {
            Some(self.bump().text)
        } else {
            None
        };
        Ok(Field {
            names,
            ty,
            tag,
            pos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> SourceFile {
        parse_file(Path::new("main.go"), src).expect("parse ok")
    }

    fn ident(s: &str) -> TypeExpr {
        TypeExpr::Ident(s.to_string())
    }

    #[test]
    fn parses_one_line_struct_with_quoted_tag() {
        let f = parse(r#"package main; type Config struct { Foo string "json:\"foo\"" }"#);
        assert_eq!(f.package, "main");
        assert_eq!(f.types.len(), 1);
        let s = f.types[0].as_struct().expect("struct");
        assert_eq!(s.fields[0].names, vec!["Foo"]);
        assert_eq!(s.fields[0].ty, ident("string"));
        assert_eq!(s.fields[0].tag.as_deref(), Some(r#""json:\"foo\"""#));
    }

    #[test]
    fn embedded_field_with_tag() {
        let f = parse(r#"package main; type Config struct { Foo "env:\"FOO\"" }"#);
        let field = &f.types[0].as_struct().unwrap().fields[0];
        assert!(field.is_embedded());
        assert_eq!(field.ty, ident("Foo"));
        assert_eq!(field.display_names(), vec!["Foo"]);
    }

    #[test]
    fn skips_functions_vars_and_consts() {
        let src = r#"
package cfg

import (
	"fmt"
	u "net/url"
)

const N = 3

var defaults = map[string]int{"a": 1}

func (c *Config) String() string {
	type local struct{ X int }
	return fmt.Sprint(c)
}

type (
	Config struct {
		Servers []Server          `yaml:"servers"`
		Limits  map[string][N]int `yaml:"limits"`
		Home    *u.URL            `yaml:"home"`
		Notify  chan<- string
		Hook    func(int) (bool, error)
	}

	Server struct{ Host, Port string }
	Alias = Server
)
"#;
        let f = parse(src);
        assert_eq!(f.imports.len(), 2);
        assert_eq!(f.imports[1].name.as_deref(), Some("u"));
        let names: Vec<&str> = f.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Config", "Server", "Alias"]);
        assert!(f.types[2].alias);

        let fields = &f.types[0].as_struct().unwrap().fields;
        assert_eq!(fields[0].ty, TypeExpr::Slice(Box::new(ident("Server"))));
        assert_eq!(
            fields[1].ty,
            TypeExpr::Map {
                key: Box::new(ident("string")),
                value: Box::new(TypeExpr::Array {
                    len: "N".into(),
                    elem: Box::new(ident("int")),
                }),
            }
        );
        assert_eq!(
            fields[2].ty,
            TypeExpr::Pointer(Box::new(TypeExpr::Qualified {
                package: "u".into(),
                name: "URL".into(),
            }))
        );
        assert_eq!(
            fields[3].ty,
            TypeExpr::Chan {
                dir: ChanDir::Send,
                elem: Box::new(ident("string")),
            }
        );
        assert_eq!(fields[4].ty, TypeExpr::Func("(int) (bool, error)".into()));
        assert_eq!(
            f.types[1].as_struct().unwrap().fields[0].names,
            vec!["Host", "Port"]
        );
    }

    #[test]
    fn generic_declarations_and_arrays_are_told_apart() {
        let f = parse("package p\ntype List[T any] struct{ Items []T }\ntype Buf [N]byte\n");
        assert_eq!(f.types[0].type_params.as_deref(), Some("[T any]"));
        assert_eq!(f.types[1].type_params, None);
        assert!(matches!(f.types[1].ty, TypeExpr::Array { .. }));
    }

    #[test]
    fn reports_every_malformed_declaration() {
        let src = "package p\ntype A struct { X }}\ntype B struct { Y int }\ntype C map[string\n";
        let errs = parse_file(Path::new("p.go"), src).unwrap_err();
        assert_eq!(errs.len(), 2, "{errs:?}");
        assert_eq!(errs[0].pos.line, 2);
        assert_eq!(errs[1].pos.line, 4);
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let errs = parse_file(Path::new("p.go"), "package p\ntype A struct { X int; X string }\n")
            .unwrap_err();
        assert_eq!(errs[0].message, "X redeclared");
    }

    #[test]
    fn missing_package_clause() {
        let errs = parse_file(Path::new("p.go"), "type A struct{}\n").unwrap_err();
        assert_eq!(errs[0].message, "expected 'package', found type");
    }
}
