//! Struct tag conformance: every field of every struct in a closure must name
//! itself under the active format's tag key.

use std::fmt;

use crate::closure::TypeClosure;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::go::ast::{Field, StructType, TypeExpr};
use crate::go::literal::{quote, unquote};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    MissingTag,
    EmptyTag,
    Unquote(String),
    Syntax(TagSyntaxError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConformanceViolation {
    /// `Type` or `Type.Field` for fields of nested anonymous structs.
    pub owner: String,
    pub field: String,
    pub key: String,
    pub kind: ViolationKind,
}

impl ConformanceViolation {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self.kind {
            ViolationKind::MissingTag => DiagnosticCode::VF0200MissingTag,
            ViolationKind::EmptyTag => DiagnosticCode::VF0201EmptyTag,
            ViolationKind::Unquote(_) | ViolationKind::Syntax(_) => {
                DiagnosticCode::VF0202MalformedTag
            }
        };
        Diagnostic::error(code, self.to_string())
    }
}

impl fmt::Display for ConformanceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: ", self.owner, self.field)?;
        match &self.kind {
            ViolationKind::MissingTag => write!(f, "missing tag {}", quote(&self.key)),
            ViolationKind::EmptyTag => write!(f, "tag {} is empty", quote(&self.key)),
            ViolationKind::Unquote(e) => write!(f, "unquoting tag: {e}"),
            ViolationKind::Syntax(e) => write!(f, "parsing struct tags: {e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSyntaxError {
    Pair,
    Key,
    Value,
}

impl fmt::Display for TagSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TagSyntaxError::Pair => "bad syntax for struct tag pair",
            TagSyntaxError::Key => "bad syntax for struct tag key",
            TagSyntaxError::Value => "bad syntax for struct tag value",
        })
    }
}

impl std::error::Error for TagSyntaxError {}

/// One `key:"name,opt,..."` pair of a struct tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructTag {
    pub key: String,
    pub name: String,
    pub options: Vec<String>,
}

/// Parses the unquoted content of a struct tag using the conventional
/// `key:"value"` pair syntax separated by spaces.
pub fn parse_struct_tag(mut tag: &str) -> Result<Vec<StructTag>, TagSyntaxError> {
    let mut out = Vec::new();
    loop {
        tag = tag.trim_start_matches(' ');
        if tag.is_empty() {
            return Ok(out);
        }
        let bytes = tag.as_bytes();

        let mut i = 0;
        while i < bytes.len()
            && bytes[i] > b' '
            && bytes[i] != b':'
            && bytes[i] != b'"'
            && bytes[i] != 0x7f
        {
            i += 1;
        }
        if i == 0 {
            return Err(TagSyntaxError::Key);
        }
        if i + 1 >= bytes.len() || bytes[i] != b':' {
            return Err(TagSyntaxError::Pair);
        }
        if bytes[i + 1] != b'"' {
            return Err(TagSyntaxError::Value);
        }
        let key = &tag[..i];
        tag = &tag[i + 1..];

        let bytes = tag.as_bytes();
        let mut j = 1;
        while j < bytes.len() && bytes[j] != b'"' {
            if bytes[j] == b'\\' {
                j += 1;
            }
            j += 1;
        }
        if j >= bytes.len() {
            return Err(TagSyntaxError::Value);
        }
        let value = unquote(&tag[..=j]).map_err(|_| TagSyntaxError::Value)?;
        tag = &tag[j + 1..];

        let mut parts = value.split(',');
        let name = parts.next().unwrap_or_default().to_string();
        out.push(StructTag {
            key: key.to_string(),
            name,
            options: parts.map(str::to_string).collect(),
        });
    }
}

/// Checks every struct in `closure`, in closure order, against `key`.
/// All violations are collected; nothing short-circuits.
pub fn check(closure: &TypeClosure<'_>, key: &str) -> Vec<ConformanceViolation> {
    let mut out = Vec::new();
    for entry in &closure.entries {
        if let Some(s) = entry.decl.as_struct() {
            check_struct(&entry.decl.name, s, key, &mut out);
        }
    }
    if !out.is_empty() {
        tracing::debug!(key, violations = out.len(), "struct tag check failed");
    }
    out
}

fn check_struct(owner: &str, s: &StructType, key: &str, out: &mut Vec<ConformanceViolation>) {
    for field in &s.fields {
        let names = field.display_names();
        for name in &names {
            if let Some(kind) = check_field(field, key) {
                out.push(ConformanceViolation {
                    owner: owner.to_string(),
                    field: name.clone(),
                    key: key.to_string(),
                    kind,
                });
            }
        }
        if let Some(nested) = anonymous_struct(&field.ty) {
            let label = names.first().map(String::as_str).unwrap_or("_");
            check_struct(&format!("{owner}.{label}"), nested, key, out);
        }
    }
}

fn check_field(field: &Field, key: &str) -> Option<ViolationKind> {
    let raw = match field.tag.as_deref() {
        None | Some("") => return Some(ViolationKind::MissingTag),
        Some(raw) => raw,
    };
    let content = match unquote(raw) {
        Ok(c) => c,
        Err(e) => return Some(ViolationKind::Unquote(e)),
    };
    let tags = match parse_struct_tag(&content) {
        Ok(t) => t,
        Err(e) => return Some(ViolationKind::Syntax(e)),
    };
    match tags.iter().find(|t| t.key == key) {
        None => Some(ViolationKind::MissingTag),
        Some(t) if t.name.is_empty() => Some(ViolationKind::EmptyTag),
        Some(_) => None,
    }
}

/// The anonymous struct a field type holds directly or through pointers,
/// slices, arrays or map values.
fn anonymous_struct(ty: &TypeExpr) -> Option<&StructType> {
    match ty {
        TypeExpr::Struct(s) => Some(s),
        TypeExpr::Pointer(inner)
        | TypeExpr::Slice(inner)
        | TypeExpr::Paren(inner)
        | TypeExpr::Array { elem: inner, .. }
        | TypeExpr::Map { value: inner, .. } => anonymous_struct(inner),
        _ => None,
    }
}
