//! The declaration index of one Go package directory.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::go::ast::{SourceFile, TypeDecl};
use crate::go::parser::parse_file;

#[derive(Debug, Clone)]
pub struct Unit {
    /// Package clause name shared by every file.
    pub name: String,
    pub dir: PathBuf,
    pub files: Vec<SourceFile>,
    index: BTreeMap<String, (usize, usize)>,
}

impl Unit {
    /// Looks up a top-level type declaration by name.
    pub fn find_type(&self, name: &str) -> Option<&TypeDecl> {
        let &(file, decl) = self.index.get(name)?;
        self.files.get(file)?.types.get(decl)
    }

    pub fn file_of(&self, decl: &TypeDecl) -> &SourceFile {
        &self.files[decl.file]
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Builds a unit from already loaded sources. Files are taken in the given
    /// order; every syntax error of every file is collected into one
    /// diagnostic.
    pub fn from_sources(dir: &Path, sources: Vec<(PathBuf, String)>) -> Result<Unit, Diagnostic> {
        if sources.is_empty() {
            return Err(Diagnostic::error(
                DiagnosticCode::VF0001UnitNotFound,
                format!("no Go source files in {}", dir.display()),
            ));
        }

        let mut errors: Vec<String> = Vec::new();
        let mut files: Vec<SourceFile> = Vec::new();
        for (path, src) in sources {
            match parse_file(&path, &src) {
                Ok(file) => files.push(file),
                Err(errs) => {
                    for e in errs {
                        errors.push(format!("{}:{e}", path.display()));
                    }
                }
            }
        }
        if !errors.is_empty() {
            return Err(syntax_error(errors));
        }

        let packages: BTreeSet<&str> = files.iter().map(|f| f.package.as_str()).collect();
        if packages.len() > 1 {
            let names: Vec<&str> = packages.into_iter().collect();
            return Err(Diagnostic::error(
                DiagnosticCode::VF0002AmbiguousUnit,
                format!("multiple packages in {}: {}", dir.display(), names.join(", ")),
            ));
        }
        let name = files[0].package.clone();

        let mut index: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for (fi, file) in files.iter_mut().enumerate() {
            tracing::trace!(path = %file.path.display(), sha256 = %file.sha256, "parsed Go source");
            for (di, decl) in file.types.iter_mut().enumerate() {
                decl.file = fi;
                if index.contains_key(&decl.name) {
                    errors.push(format!(
                        "{}:{}:{}: {} redeclared in this block",
                        file.path.display(),
                        decl.pos.line,
                        decl.pos.col,
                        decl.name
                    ));
                    continue;
                }
                index.insert(decl.name.clone(), (fi, di));
            }
        }
        if !errors.is_empty() {
            return Err(syntax_error(errors));
        }

        tracing::debug!(
            package = %name,
            files = files.len(),
            types = index.len(),
            "indexed package declarations"
        );
        Ok(Unit {
            name,
            dir: dir.to_path_buf(),
            files,
            index,
        })
    }
}

fn syntax_error(errors: Vec<String>) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::VF0003SyntaxError,
        format!("parsing package: {}", errors.join("\n")),
    )
}

/// Parses every non-test `.go` file directly inside `dir` as one package.
pub fn parse_unit(dir: &Path) -> Result<Unit, Diagnostic> {
    let sources = read_sources(dir)
        .map_err(|e| Diagnostic::from_anyhow(DiagnosticCode::VF0001UnitNotFound, &e))?;
    Unit::from_sources(dir, sources)
}

fn read_sources(dir: &Path) -> anyhow::Result<Vec<(PathBuf, String)>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("parsing package: open {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read dir entry: {}", dir.display()))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".go") || name.ends_with("_test.go") || name.starts_with('.') {
            continue;
        }
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let src = std::fs::read_to_string(&path)
            .with_context(|| format!("read Go source: {}", path.display()))?;
        out.push((path, src));
    }
    Ok(out)
}
