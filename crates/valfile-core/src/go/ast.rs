//! Syntax tree for the subset of Go that matters to schema extraction: the
//! package clause, imports and top-level type declarations.

use std::path::PathBuf;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub package: String,
    pub imports: Vec<ImportSpec>,
    pub types: Vec<TypeDecl>,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImportSpec {
    /// Explicit import name (`name "path"`), including `_` and `.`.
    pub name: Option<String>,
    /// Unquoted import path.
    pub path: String,
}

impl ImportSpec {
    /// The identifier a file uses to refer to the imported package.
    ///
    /// Without an explicit name this is a best effort guess from the path:
    /// major version suffixes (`/v2`) and gopkg.in style `.vN` suffixes are
    /// dropped, as is a leading `go-`.
    pub fn local_name(&self) -> Option<&str> {
        match self.name.as_deref() {
            Some("_") | Some(".") => return None,
            Some(name) => return Some(name),
            None => {}
        }
        let mut segments = self.path.rsplit('/');
        let mut last = segments.next()?;
        if is_major_version(last) {
            last = segments.next()?;
        }
        if let Some((base, suffix)) = last.rsplit_once(".v") {
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
                last = base;
            }
        }
        Some(last.strip_prefix("go-").unwrap_or(last))
    }
}

fn is_major_version(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    /// Raw type parameter list including brackets, e.g. `[T any]`.
    pub type_params: Option<String>,
    /// `type A = B` rather than `type A B`.
    pub alias: bool,
    pub ty: TypeExpr,
    pub pos: Pos,
    /// Index of the declaring file within its unit.
    pub file: usize,
}

impl TypeDecl {
    pub fn is_generic(&self) -> bool {
        self.type_params.is_some()
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match &self.ty {
            TypeExpr::Struct(s) => Some(s),
            TypeExpr::Paren(inner) => match inner.as_ref() {
                TypeExpr::Struct(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Ident(String),
    Qualified { package: String, name: String },
    Pointer(Box<TypeExpr>),
    Slice(Box<TypeExpr>),
    /// `len` is the raw length expression (`5`, `N`, `...`).
    Array { len: String, elem: Box<TypeExpr> },
    Map { key: Box<TypeExpr>, value: Box<TypeExpr> },
    Chan { dir: ChanDir, elem: Box<TypeExpr> },
    /// Raw signature text following the `func` keyword.
    Func(String),
    Struct(StructType),
    /// Raw body text including braces.
    Interface(String),
    /// Generic instantiation `Base[A, B]`.
    Instance { base: Box<TypeExpr>, args: Vec<TypeExpr> },
    Paren(Box<TypeExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructType {
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Empty for embedded fields.
    pub names: Vec<String>,
    pub ty: TypeExpr,
    /// Raw tag literal including its quotes.
    pub tag: Option<String>,
    pub pos: Pos,
}

impl Field {
    pub fn is_embedded(&self) -> bool {
        self.names.is_empty()
    }

    /// Names the field is reachable under: the declared names, or the type
    /// name for an embedded field.
    pub fn display_names(&self) -> Vec<String> {
        if !self.names.is_empty() {
            return self.names.clone();
        }
        embedded_type_name(&self.ty)
            .map(|n| vec![n.to_string()])
            .unwrap_or_default()
    }
}

/// The field name Go derives for an embedded type: `T`, `*T`, `pkg.T`,
/// `*pkg.T` and instantiations thereof.
pub fn embedded_type_name(ty: &TypeExpr) -> Option<&str> {
    match ty {
        TypeExpr::Ident(name) => Some(name),
        TypeExpr::Qualified { name, .. } => Some(name),
        TypeExpr::Pointer(inner) => match inner.as_ref() {
            TypeExpr::Pointer(_) => None,
            other => embedded_type_name(other),
        },
        TypeExpr::Instance { base, .. } => embedded_type_name(base),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(name: Option<&str>, path: &str) -> ImportSpec {
        ImportSpec {
            name: name.map(str::to_string),
            path: path.to_string(),
        }
    }

    #[test]
    fn local_names_follow_go_conventions() {
        assert_eq!(import(None, "time").local_name(), Some("time"));
        assert_eq!(import(None, "net/url").local_name(), Some("url"));
        assert_eq!(import(None, "gopkg.in/yaml.v3").local_name(), Some("yaml"));
        assert_eq!(
            import(None, "github.com/pelletier/go-toml/v2").local_name(),
            Some("toml")
        );
        assert_eq!(import(Some("u"), "net/url").local_name(), Some("u"));
        assert_eq!(import(Some("_"), "embed").local_name(), None);
    }

    #[test]
    fn embedded_names_strip_pointer_and_package() {
        let ty = TypeExpr::Pointer(Box::new(TypeExpr::Qualified {
            package: "time".into(),
            name: "Time".into(),
        }));
        assert_eq!(embedded_type_name(&ty), Some("Time"));
        assert_eq!(
            embedded_type_name(&TypeExpr::Slice(Box::new(TypeExpr::Ident("A".into())))),
            None
        );
    }
}
