//! Transitive closure of the type declarations reachable from a root type.

use std::collections::HashSet;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::go::ast::{ImportSpec, TypeDecl, TypeExpr};
use crate::go::lexer::{tokenize, TokenKind};
use crate::go::{is_predeclared_opaque, is_primitive};
use crate::render::render_decl;
use crate::unit::Unit;

#[derive(Debug, Clone)]
pub struct ClosureEntry<'u> {
    pub decl: &'u TypeDecl,
    pub rendered: String,
}

/// The root type plus every declaration it reaches, each exactly once, in
/// depth-first first-discovery order (fields in declaration order).
#[derive(Debug, Clone)]
pub struct TypeClosure<'u> {
    pub root: String,
    pub entries: Vec<ClosureEntry<'u>>,
    /// Imports needed by qualified type references, named explicitly.
    pub imports: Vec<ImportSpec>,
}

impl<'u> TypeClosure<'u> {
    pub fn declarations(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.rendered.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.decl.name.as_str()).collect()
    }
}

/// Resolves the closure of `root` within `unit`.
///
/// A missing root, a non-struct root and a rendering failure end the walk
/// with a single diagnostic. Undefined types, missing imports and generic
/// types are collected across the whole walk and returned together; a closure
/// is only returned when none were found.
pub fn walk<'u>(unit: &'u Unit, root: &str) -> Result<TypeClosure<'u>, Vec<Diagnostic>> {
    let Some(root_decl) = unit.find_type(root) else {
        return Err(vec![Diagnostic::error(
            DiagnosticCode::VF0010RootTypeNotFound,
            format!("type {root} not found in package {}", unit.name),
        )]);
    };
    if !has_struct_shape(unit, root_decl) {
        return Err(vec![Diagnostic::error(
            DiagnosticCode::VF0011UnsupportedRootType,
            format!("type {root} is not a struct type"),
        )]);
    }

    let mut w = Walker {
        unit,
        visited: HashSet::new(),
        entries: Vec::new(),
        imports: Vec::new(),
        errors: Vec::new(),
    };
    w.add(root_decl).map_err(|fatal| vec![fatal])?;

    if !w.errors.is_empty() {
        return Err(w.errors);
    }
    let closure = TypeClosure {
        root: root.to_string(),
        entries: w.entries,
        imports: w.imports,
    };
    tracing::debug!(
        root,
        types = ?closure.names(),
        imports = closure.imports.len(),
        "resolved type closure"
    );
    Ok(closure)
}

/// Whether `decl` is a struct type: a struct literal, or a defined type or
/// alias whose chain of named types ends in one.
fn has_struct_shape<'u>(unit: &'u Unit, decl: &'u TypeDecl) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut cur = decl;
    loop {
        if cur.as_struct().is_some() {
            return true;
        }
        if !seen.insert(cur.name.as_str()) {
            return false;
        }
        let mut ty = &cur.ty;
        while let TypeExpr::Paren(inner) = ty {
            ty = inner.as_ref();
        }
        let TypeExpr::Ident(next) = ty else {
            return false;
        };
        match unit.find_type(next) {
            Some(d) => cur = d,
            None => return false,
        }
    }
}

struct Walker<'u> {
    unit: &'u Unit,
    visited: HashSet<String>,
    entries: Vec<ClosureEntry<'u>>,
    imports: Vec<ImportSpec>,
    errors: Vec<Diagnostic>,
}

impl<'u> Walker<'u> {
    fn add(&mut self, decl: &'u TypeDecl) -> Result<(), Diagnostic> {
        self.visited.insert(decl.name.clone());
        if decl.is_generic() {
            self.report(
                DiagnosticCode::VF0101UnsupportedGenericType,
                format!("generic type {} is not supported", decl.name),
            );
            return Ok(());
        }
        let rendered = render_decl(decl).map_err(|e| {
            Diagnostic::error(
                DiagnosticCode::VF0300RenderFailed,
                format!("rendering go type: {e}"),
            )
        })?;
        self.entries.push(ClosureEntry { decl, rendered });
        self.visit(&decl.ty, decl)
    }

    fn visit(&mut self, expr: &TypeExpr, owner: &'u TypeDecl) -> Result<(), Diagnostic> {
        match expr {
            TypeExpr::Struct(s) => {
                for field in &s.fields {
                    self.visit(&field.ty, owner)?;
                }
                Ok(())
            }
            TypeExpr::Slice(elem) | TypeExpr::Pointer(elem) | TypeExpr::Paren(elem) => {
                self.visit(elem, owner)
            }
            TypeExpr::Array { len, elem } => {
                self.scan_qualified(len, owner);
                self.visit(elem, owner)
            }
            TypeExpr::Map { key, value } => {
                self.visit(key, owner)?;
                self.visit(value, owner)
            }
            TypeExpr::Chan { .. } | TypeExpr::Func(_) | TypeExpr::Interface(_) => {
                // Copied into the program as written: local names are never
                // resolved, but the packages they mention must be imported.
                tracing::debug!(owner = %owner.name, "left channel/func/interface type opaque");
                self.opaque_imports(expr, owner);
                Ok(())
            }
            TypeExpr::Ident(name) => {
                if is_primitive(name) || is_predeclared_opaque(name) || self.visited.contains(name)
                {
                    return Ok(());
                }
                match self.unit.find_type(name) {
                    Some(decl) => self.add(decl),
                    None => {
                        self.report(
                            DiagnosticCode::VF0100UndefinedType,
                            format!("undefined type: {name}"),
                        );
                        Ok(())
                    }
                }
            }
            TypeExpr::Qualified { package, .. } => {
                self.require_import(package, owner);
                Ok(())
            }
            TypeExpr::Instance { base, .. } => {
                let name = match base.as_ref() {
                    TypeExpr::Ident(n) => n.clone(),
                    TypeExpr::Qualified { package, name } => format!("{package}.{name}"),
                    _ => "instantiation".to_string(),
                };
                self.report(
                    DiagnosticCode::VF0101UnsupportedGenericType,
                    format!("generic type {name} is not supported"),
                );
                Ok(())
            }
        }
    }

    /// Records the imports an opaque type needs without resolving any local
    /// identifier in it.
    fn opaque_imports(&mut self, expr: &TypeExpr, owner: &TypeDecl) {
        match expr {
            TypeExpr::Ident(_) => {}
            TypeExpr::Qualified { package, .. } => self.require_import(package, owner),
            TypeExpr::Pointer(elem)
            | TypeExpr::Slice(elem)
            | TypeExpr::Paren(elem)
            | TypeExpr::Chan { elem, .. } => self.opaque_imports(elem, owner),
            TypeExpr::Array { len, elem } => {
                self.scan_qualified(len, owner);
                self.opaque_imports(elem, owner);
            }
            TypeExpr::Map { key, value } => {
                self.opaque_imports(key, owner);
                self.opaque_imports(value, owner);
            }
            TypeExpr::Struct(s) => {
                for field in &s.fields {
                    self.opaque_imports(&field.ty, owner);
                }
            }
            TypeExpr::Instance { base, args } => {
                self.opaque_imports(base, owner);
                for arg in args {
                    self.opaque_imports(arg, owner);
                }
            }
            TypeExpr::Func(raw) | TypeExpr::Interface(raw) => self.scan_qualified(raw, owner),
        }
    }

    /// Finds `pkg.Name` references in raw source text (signatures, interface
    /// bodies, array lengths).
    fn scan_qualified(&mut self, raw: &str, owner: &TypeDecl) {
        let toks = match tokenize(raw) {
            Ok(toks) => toks,
            Err(err) => {
                tracing::debug!(owner = %owner.name, %err, "could not scan raw type text");
                return;
            }
        };
        for (i, tok) in toks.iter().enumerate() {
            if tok.kind != TokenKind::Ident {
                continue;
            }
            let after_dot = i > 0 && toks[i - 1].is_op(".");
            let selects = toks.get(i + 1).is_some_and(|t| t.is_op("."))
                && toks.get(i + 2).is_some_and(|t| t.kind == TokenKind::Ident);
            if selects && !after_dot {
                self.require_import(&tok.text, owner);
            }
        }
    }

    fn require_import(&mut self, package: &str, owner: &TypeDecl) {
        let file = self.unit.file_of(owner);
        let Some(spec) = file
            .imports
            .iter()
            .find(|i| i.local_name() == Some(package))
        else {
            self.report(
                DiagnosticCode::VF0102UndefinedPackage,
                format!("undefined package: {package}"),
            );
            return;
        };

        if let Some(existing) = self
            .imports
            .iter()
            .find(|i| i.name.as_deref() == Some(package))
        {
            if existing.path != spec.path {
                let msg = format!(
                    "conflicting imports for package {package}: {:?} and {:?}",
                    existing.path, spec.path
                );
                self.report(DiagnosticCode::VF0103ConflictingImport, msg);
            }
            return;
        }
        self.imports.push(ImportSpec {
            name: Some(package.to_string()),
            path: spec.path.clone(),
        });
    }

    /// Identical messages are reported once.
    fn report(&mut self, code: DiagnosticCode, message: String) {
        if self.errors.iter().any(|d| d.message == message) {
            return;
        }
        self.errors.push(Diagnostic::error(code, message));
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;

    fn unit(files: &[(&str, &str)]) -> Unit {
        Unit::from_sources(
            Path::new("pkg"),
            files
                .iter()
                .map(|(n, s)| (PathBuf::from(n), s.to_string()))
                .collect(),
        )
        .expect("unit")
    }

    fn messages(errs: &[Diagnostic]) -> Vec<&str> {
        errs.iter().map(|d| d.message.as_str()).collect()
    }

    #[test]
    fn first_discovery_order_is_depth_first_in_field_order() {
        let u = unit(&[(
            "a.go",
            "package p
type Root struct { A A; Z Z; B []B }
type B struct { C map[string]C }
type A struct { D *D; Name string }
type C struct{}
type D struct{ B B }
type Z int
",
        )]);
        let c = walk(&u, "Root").expect("closure");
        assert_eq!(c.names(), vec!["Root", "A", "D", "B", "C", "Z"]);
        // Stable across runs.
        for _ in 0..5 {
            assert_eq!(walk(&u, "Root").unwrap().names(), c.names());
        }
    }

    #[test]
    fn cycles_terminate_and_each_type_appears_once() {
        let u = unit(&[(
            "a.go",
            "package p\ntype A struct { B *B; Self []A }\ntype B struct { A A }\n",
        )]);
        let c = walk(&u, "A").expect("closure");
        assert_eq!(c.names(), vec!["A", "B"]);
    }

    #[test]
    fn undefined_type_fails_whole_closure() {
        let u = unit(&[(
            "a.go",
            "package p\ntype Root struct { Ok Known; Bad Unknown; Again []Unknown }\ntype Known struct{}\n",
        )]);
        let errs = walk(&u, "Root").unwrap_err();
        assert_eq!(messages(&errs), vec!["undefined type: Unknown"]);
        assert_eq!(errs[0].code, DiagnosticCode::VF0100UndefinedType);
    }

    #[test]
    fn undefined_types_accumulate_across_branches() {
        let u = unit(&[(
            "a.go",
            "package p\ntype Root struct { A Missing1; B Sub }\ntype Sub struct { C map[Missing2]int }\n",
        )]);
        let errs = walk(&u, "Root").unwrap_err();
        assert_eq!(
            messages(&errs),
            vec!["undefined type: Missing1", "undefined type: Missing2"]
        );
    }

    #[test]
    fn channel_and_func_fields_are_opaque() {
        let u = unit(&[(
            "a.go",
            "package p\ntype Root struct { C chan Hidden; F func(Hidden) error; I interface{ M() Hidden }; E error }\n",
        )]);
        let c = walk(&u, "Root").expect("opaque fields are not resolved");
        assert_eq!(c.names(), vec!["Root"]);
    }

    #[test]
    fn root_lookup_failures() {
        let u = unit(&[("a.go", "package p\ntype Port int\n")]);
        let errs = walk(&u, "Config").unwrap_err();
        assert_eq!(messages(&errs), vec!["type Config not found in package p"]);

        let errs = walk(&u, "Port").unwrap_err();
        assert_eq!(messages(&errs), vec!["type Port is not a struct type"]);
        assert_eq!(errs[0].code, DiagnosticCode::VF0011UnsupportedRootType);
    }

    #[test]
    fn defined_types_and_aliases_of_structs_are_valid_roots() {
        let u = unit(&[(
            "a.go",
            "package p\ntype Base struct{ Foo string `json:\"foo\"` }\ntype Config Base\ntype Alias = Base\ntype Twice = (Config)\ntype Port int\ntype Named Port\ntype Loop1 Loop2\ntype Loop2 Loop1\n",
        )]);
        assert_eq!(walk(&u, "Config").expect("defined type").names(), vec!["Config", "Base"]);
        assert_eq!(walk(&u, "Alias").expect("alias").names(), vec!["Alias", "Base"]);
        assert_eq!(
            walk(&u, "Twice").expect("alias chain").names(),
            vec!["Twice", "Config", "Base"]
        );
        for name in ["Named", "Loop1"] {
            let errs = walk(&u, name).unwrap_err();
            assert_eq!(messages(&errs), vec![format!("type {name} is not a struct type")]);
        }
    }

    #[test]
    fn packages_named_inside_opaque_fields_are_imported() {
        let u = unit(&[(
            "a.go",
            "package p\nimport (\n\t\"context\"\n\t\"fmt\"\n\t\"time\"\n)\ntype Root struct {\n\tTicks chan time.Time\n\tHook func(ctx context.Context, d time.Duration) error\n\tS interface{ fmt.Stringer }\n\tLocal chan Hidden\n}\n",
        )]);
        let c = walk(&u, "Root").expect("closure");
        let paths: Vec<&str> = c.imports.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["time", "context", "fmt"]);
        assert_eq!(c.names(), vec!["Root"]);
    }

    #[test]
    fn opaque_field_naming_an_unimported_package_is_an_error() {
        let u = unit(&[("a.go", "package p\ntype Root struct { F func(http.Header) }\n")]);
        let errs = walk(&u, "Root").unwrap_err();
        assert_eq!(messages(&errs), vec!["undefined package: http"]);
    }

    #[test]
    fn qualified_references_record_their_imports() {
        let u = unit(&[
            (
                "a.go",
                "package p\nimport (\n\t\"time\"\n\tu \"net/url\"\n)\ntype Root struct { T time.Duration; U *u.URL; S Sub }\n",
            ),
            ("b.go", "package p\nimport \"time\"\ntype Sub struct { At []time.Time }\n"),
        ]);
        let c = walk(&u, "Root").expect("closure");
        let imports: Vec<(Option<&str>, &str)> = c
            .imports
            .iter()
            .map(|i| (i.name.as_deref(), i.path.as_str()))
            .collect();
        assert_eq!(imports, vec![(Some("time"), "time"), (Some("u"), "net/url")]);
    }

    #[test]
    fn qualified_reference_without_import_is_an_error() {
        let u = unit(&[("a.go", "package p\ntype Root struct { T time.Duration }\n")]);
        let errs = walk(&u, "Root").unwrap_err();
        assert_eq!(messages(&errs), vec!["undefined package: time"]);
    }

    #[test]
    fn generic_types_are_reported() {
        let u = unit(&[(
            "a.go",
            "package p\ntype Root struct { L List[int]; G Gen }\ntype List[T any] struct{}\ntype Gen struct{ P Pair }\ntype Pair[K comparable, V any] struct{}\n",
        )]);
        let errs = walk(&u, "Root").unwrap_err();
        assert_eq!(
            messages(&errs),
            vec!["generic type List is not supported", "generic type Pair is not supported"]
        );
    }
}
