//! Renders type declarations back to Go source, gofmt style: tab indentation,
//! one field group per line, tags kept verbatim.

use std::fmt;

use crate::go::ast::{ChanDir, Field, StructType, TypeDecl, TypeExpr};
use crate::go::is_identifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    pub type_name: String,
    pub message: String,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type {}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for RenderError {}

/// Renders `decl` as a complete `type` declaration.
pub fn render_decl(decl: &TypeDecl) -> Result<String, RenderError> {
    let mut r = Renderer {
        type_name: &decl.name,
        out: String::new(),
    };
    r.ident(&decl.name)?;
    r.out.push_str("type ");
    r.out.push_str(&decl.name);
    if let Some(params) = &decl.type_params {
        r.out.push_str(params);
    }
    r.out.push_str(if decl.alias { " = " } else { " " });
    r.ty(&decl.ty, 0)?;
    Ok(r.out)
}

struct Renderer<'a> {
    type_name: &'a str,
    out: String,
}

impl Renderer<'_> {
    fn fail(&self, message: String) -> RenderError {
        RenderError {
            type_name: self.type_name.to_string(),
            message,
        }
    }

    fn ident(&self, name: &str) -> Result<(), RenderError> {
        if is_identifier(name) {
            Ok(())
        } else {
            Err(self.fail(format!("invalid identifier {name:?}")))
        }
    }

    fn ty(&mut self, ty: &TypeExpr, depth: usize) -> Result<(), RenderError> {
        match ty {
            TypeExpr::Ident(name) => {
                self.ident(name)?;
                self.out.push_str(name);
            }
            TypeExpr::Qualified { package, name } => {
                self.ident(package)?;
                self.ident(name)?;
                self.out.push_str(package);
                self.out.push('.');
                self.out.push_str(name);
            }
            TypeExpr::Pointer(inner) => {
                self.out.push('*');
                self.ty(inner, depth)?;
            }
            TypeExpr::Slice(elem) => {
                self.out.push_str("[]");
                self.ty(elem, depth)?;
            }
            TypeExpr::Array { len, elem } => {
                if len.is_empty() {
                    return Err(self.fail("array length is empty".to_string()));
                }
                self.out.push('[');
                self.out.push_str(len);
                self.out.push(']');
                self.ty(elem, depth)?;
            }
            TypeExpr::Map { key, value } => {
                self.out.push_str("map[");
                self.ty(key, depth)?;
                self.out.push(']');
                self.ty(value, depth)?;
            }
            TypeExpr::Chan { dir, elem } => {
                self.out.push_str(match dir {
                    ChanDir::Both => "chan ",
                    ChanDir::Send => "chan<- ",
                    ChanDir::Recv => "<-chan ",
                });
                // `chan (<-chan T)` needs parentheses to keep its meaning.
                let needs_paren = *dir == ChanDir::Both
                    && matches!(elem.as_ref(), TypeExpr::Chan { dir: ChanDir::Recv, .. });
                if needs_paren {
                    self.out.push('(');
                }
                self.ty(elem, depth)?;
                if needs_paren {
                    self.out.push(')');
                }
            }
            TypeExpr::Func(sig) => {
                self.out.push_str("func");
                self.out.push_str(sig);
            }
            TypeExpr::Interface(body) => {
                self.out.push_str("interface");
                self.out.push_str(body);
            }
            TypeExpr::Struct(s) => self.struct_type(s, depth)?,
            TypeExpr::Instance { base, args } => {
                self.ty(base, depth)?;
                self.out.push('[');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.ty(arg, depth)?;
                }
                self.out.push(']');
            }
            TypeExpr::Paren(inner) => {
                self.out.push('(');
                self.ty(inner, depth)?;
                self.out.push(')');
            }
        }
        Ok(())
    }

    fn struct_type(&mut self, s: &StructType, depth: usize) -> Result<(), RenderError> {
        if s.fields.is_empty() {
            self.out.push_str("struct{}");
            return Ok(());
        }
        self.out.push_str("struct {\n");
        for field in &s.fields {
            self.field(field, depth + 1)?;
        }
        push_indent(&mut self.out, depth);
        self.out.push('}');
        Ok(())
    }

    fn field(&mut self, field: &Field, depth: usize) -> Result<(), RenderError> {
        push_indent(&mut self.out, depth);
        if field.is_embedded() {
            if crate::go::ast::embedded_type_name(&field.ty).is_none() {
                return Err(self.fail("invalid embedded field type".to_string()));
            }
        } else {
            for (i, name) in field.names.iter().enumerate() {
                self.ident(name)?;
                if i > 0 {
                    self.out.push_str(", ");
                }
                self.out.push_str(name);
            }
            self.out.push(' ');
        }
        self.ty(&field.ty, depth)?;
        if let Some(tag) = &field.tag {
            if !is_string_literal(tag) {
                return Err(self.fail(format!("field tag {tag} is not a string literal")));
            }
            self.out.push(' ');
            self.out.push_str(tag);
        }
        self.out.push('\n');
        Ok(())
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

fn is_string_literal(lit: &str) -> bool {
    if lit.len() < 2 {
        return false;
    }
    let body = &lit[1..lit.len() - 1];
    if lit.starts_with('`') && lit.ends_with('`') {
        return !body.contains('`');
    }
    lit.starts_with('"') && lit.ends_with('"') && !body.contains('\n')
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::go::parser::parse_file;

    fn first_decl(src: &str) -> TypeDecl {
        let mut f = parse_file(Path::new("t.go"), src).expect("parse");
        f.types.remove(0)
    }

    #[test]
    fn renders_struct_with_groups_tags_and_nesting() {
        let decl = first_decl(
            "package p\ntype Config struct {\n  Host, Addr string `json:\"host\"`\n  Limits struct { Max [4]int; Opt *Sub \"yaml:\\\"opt\\\"\" }\n  Sub\n  Empty struct{}\n}\n",
        );
        assert_eq!(
            render_decl(&decl).unwrap(),
            "type Config struct {\n\tHost, Addr string `json:\"host\"`\n\tLimits struct {\n\t\tMax [4]int\n\t\tOpt *Sub \"yaml:\\\"opt\\\"\"\n\t}\n\tSub\n\tEmpty struct{}\n}"
        );
    }

    #[test]
    fn renders_opaque_and_composite_types_verbatim() {
        let decl = first_decl(
            "package p\ntype T struct { C <-chan map[string][]*time.Time; F func(a, b int) error; I interface{ Close() error } }\n",
        );
        assert_eq!(
            render_decl(&decl).unwrap(),
            "type T struct {\n\tC <-chan map[string][]*time.Time\n\tF func(a, b int) error\n\tI interface{ Close() error }\n}"
        );
    }

    #[test]
    fn renders_aliases_and_named_scalars() {
        assert_eq!(
            render_decl(&first_decl("package p\ntype A = map[string]int\n")).unwrap(),
            "type A = map[string]int"
        );
        assert_eq!(
            render_decl(&first_decl("package p\ntype Port uint16\n")).unwrap(),
            "type Port uint16"
        );
    }

    #[test]
    fn rejects_shapes_go_would_not_accept() {
        let decl = TypeDecl {
            name: "Bad".into(),
            type_params: None,
            alias: false,
            ty: TypeExpr::Struct(StructType {
                fields: vec![Field {
                    names: vec!["ok".into()],
                    ty: TypeExpr::Ident("int".into()),
                    tag: Some("json:\"ok\"".into()),
                    pos: Default::default(),
                }],
            }),
            pos: Default::default(),
            file: 0,
        };
        let err = render_decl(&decl).unwrap_err();
        assert_eq!(err.to_string(), "type Bad: field tag json:\"ok\" is not a string literal");

        let odd = TypeDecl {
            name: "Odd".into(),
            type_params: None,
            alias: false,
            ty: TypeExpr::Slice(Box::new(TypeExpr::Ident("not-an-ident".into()))),
            pos: Default::default(),
            file: 0,
        };
        let err = render_decl(&odd).unwrap_err();
        assert!(err.message.contains("invalid identifier"), "{err}");
    }
}
