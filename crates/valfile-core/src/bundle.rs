//! Go module manifests and vendored dependencies for the generated program.

use std::fmt;
use std::fs::File;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

use crate::format::Template;
use crate::synth::GoRequirement;
use crate::workspace::Workspace;

/// Module path of the generated program.
pub const GO_MODULE: &str = "valfile.check";
pub const GO_VERSION: &str = "1.22";

/// How `go build` resolves dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModMode {
    /// Only the unpacked `vendor/` tree.
    Vendor,
    /// The module cache, downloading what is missing.
    Mod,
}

impl ModMode {
    pub fn flag(self) -> &'static str {
        match self {
            ModMode::Vendor => "-mod=vendor",
            ModMode::Mod => "-mod=mod",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub go_mod: Vec<u8>,
    pub go_sum: Option<Vec<u8>>,
    pub vendor_zip: Option<Vec<u8>>,
}

impl Bundle {
    pub fn mod_mode(&self) -> ModMode {
        if self.vendor_zip.is_some() {
            ModMode::Vendor
        } else {
            ModMode::Mod
        }
    }

    /// Writes the manifests into `ws` and unpacks the vendor archive.
    pub fn install(&self, ws: &Workspace) -> Result<()> {
        ws.write_file("go.mod", &self.go_mod)?;
        if let Some(sum) = &self.go_sum {
            ws.write_file("go.sum", sum)?;
        }
        if let Some(zip) = &self.vendor_zip {
            let n = unpack_zip(zip, ws.path()).context("unzipping vendor directory")?;
            tracing::debug!(entries = n, "unpacked vendor archive");
        }
        Ok(())
    }
}

pub trait BundleProvider {
    fn bundle(&self, template: Template, requirements: &[GoRequirement]) -> Result<Bundle>;
}

/// Generates `go.mod` from the requirement list and leaves resolution to the
/// go tool (`-mod=mod`). Needs the module proxy or a warm module cache; runs
/// without network access go through [`DirBundles`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleBundles;

impl BundleProvider for ModuleBundles {
    fn bundle(&self, _template: Template, requirements: &[GoRequirement]) -> Result<Bundle> {
        Ok(Bundle {
            go_mod: render_go_mod(requirements).into_bytes(),
            go_sum: None,
            vendor_zip: None,
        })
    }
}

/// Pinned bundles laid out as `<root>/<template>/{go.mod,go.sum,vendor.zip}`.
/// A bundle with `vendor.zip` builds with `-mod=vendor` and never touches the
/// network. One can be produced per template by running `go mod vendor` in a
/// directory holding the rendered `go.mod` and zipping the `vendor/` tree.
#[derive(Debug, Clone)]
pub struct DirBundles {
    root: PathBuf,
}

impl DirBundles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirBundles { root: root.into() }
    }
}

impl BundleProvider for DirBundles {
    fn bundle(&self, template: Template, _requirements: &[GoRequirement]) -> Result<Bundle> {
        let dir = self.root.join(template.name());
        let go_mod_path = dir.join("go.mod");
        let go_mod = std::fs::read(&go_mod_path)
            .with_context(|| format!("reading {}", go_mod_path.display()))?;
        Ok(Bundle {
            go_mod,
            go_sum: read_optional(&dir.join("go.sum"))?,
            vendor_zip: read_optional(&dir.join("vendor.zip"))?,
        })
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

pub fn render_go_mod(requirements: &[GoRequirement]) -> String {
    let mut out = format!("module {GO_MODULE}\n\ngo {GO_VERSION}\n");
    if !requirements.is_empty() {
        out.push_str("\nrequire (\n");
        for r in requirements {
            out.push_str(&format!("\t{} {}\n", r.path, r.version));
        }
        out.push_str(")\n");
    }
    out
}

/// An archive entry that would land outside the destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafeArchivePath {
    pub entry: String,
    pub reason: &'static str,
}

impl fmt::Display for UnsafeArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid archive path ({}): {}", self.reason, self.entry)
    }
}

impl std::error::Error for UnsafeArchivePath {}

fn sanitize_rel_path(name: &str) -> Result<PathBuf, UnsafeArchivePath> {
    let unsafe_path = |reason| UnsafeArchivePath {
        entry: name.to_string(),
        reason,
    };
    let mut out = PathBuf::new();
    for c in Path::new(name).components() {
        match c {
            Component::Prefix(_) | Component::RootDir => return Err(unsafe_path("absolute")),
            Component::ParentDir => return Err(unsafe_path("..")),
            Component::CurDir => {}
            Component::Normal(p) => out.push(p),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(unsafe_path("empty"));
    }
    Ok(out)
}

/// Unpacks a zip archive held in memory below `dest`, returning the number
/// of entries written. Every entry is checked twice: by its name, and by the
/// resolved location of its parent directory.
pub fn unpack_zip(bytes: &[u8], dest: &Path) -> Result<usize> {
    let dest = std::fs::canonicalize(dest)
        .with_context(|| format!("canonicalize {}", dest.display()))?;
    let mut z = zip::ZipArchive::new(Cursor::new(bytes)).context("open zip")?;
    let mut written = 0usize;
    for i in 0..z.len() {
        let mut file = z.by_index(i).context("zip entry")?;
        let name = file.name().to_string();
        let rel = sanitize_rel_path(&name)?;
        let out_path = dest.join(&rel);
        if file.is_dir() {
            std::fs::create_dir_all(&out_path)
                .with_context(|| format!("creating directory: {}", out_path.display()))?;
            continue;
        }
        let parent = out_path.parent().unwrap_or(&dest);
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory: {}", parent.display()))?;
        let resolved = std::fs::canonicalize(parent)
            .with_context(|| format!("canonicalize {}", parent.display()))?;
        if !resolved.starts_with(&dest) {
            return Err(UnsafeArchivePath {
                entry: name,
                reason: "outside destination",
            }
            .into());
        }
        let mut out =
            File::create(&out_path).with_context(|| format!("creating file: {}", out_path.display()))?;
        std::io::copy(&mut file, &mut out)
            .with_context(|| format!("copying file contents: {}", out_path.display()))?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            w.start_file(*name, opts).expect("start_file");
            w.write_all(data).expect("write");
        }
        w.finish().expect("finish").into_inner()
    }

    #[test]
    fn go_mod_lists_requirements() {
        let reqs = crate::synth::templates::requirements(Template::Toml);
        assert_eq!(
            render_go_mod(&reqs),
            "module valfile.check\n\ngo 1.22\n\nrequire (\n\tgithub.com/go-playground/validator/v10 v10.22.1\n\tgithub.com/pelletier/go-toml/v2 v2.2.3\n)\n"
        );
        let b = ModuleBundles.bundle(Template::Toml, &reqs).expect("bundle");
        assert_eq!(b.mod_mode(), ModMode::Mod);
    }

    #[test]
    fn dir_bundles_read_optional_parts() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("yaml");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("go.mod"), "module valfile.check\n").unwrap();
        std::fs::write(dir.join("vendor.zip"), zip_of(&[("vendor/modules.txt", b"# x\n")])).unwrap();

        let b = DirBundles::new(root.path()).bundle(Template::Yaml, &[]).expect("bundle");
        assert!(b.go_sum.is_none());
        assert_eq!(b.mod_mode(), ModMode::Vendor);

        let ws_base = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::create(ws_base.path(), false).expect("workspace");
        b.install(&ws).expect("install");
        assert!(ws.path().join("vendor/modules.txt").is_file());
        assert!(ws.path().join("go.mod").is_file());

        assert!(DirBundles::new(root.path()).bundle(Template::Hcl, &[]).is_err());
    }

    #[test]
    fn traversal_entries_are_rejected() {
        for name in ["../evil.go", "vendor/../../evil.go", "/abs/evil.go"] {
            let dest = tempfile::tempdir().expect("tempdir");
            let err = unpack_zip(&zip_of(&[(name, b"x")]), dest.path()).unwrap_err();
            let unsafe_path = err
                .downcast_ref::<UnsafeArchivePath>()
                .unwrap_or_else(|| panic!("{name}: {err:#}"));
            assert_eq!(unsafe_path.entry, name);
            assert!(!dest.path().parent().unwrap().join("evil.go").exists());
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_cannot_redirect_entries() {
        let outside = tempfile::tempdir().expect("tempdir");
        let dest = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), dest.path().join("vendor")).unwrap();
        let err = unpack_zip(&zip_of(&[("vendor/evil.go", b"x")]), dest.path()).unwrap_err();
        assert!(err.downcast_ref::<UnsafeArchivePath>().is_some(), "{err:#}");
        assert!(!outside.path().join("evil.go").exists());
    }
}
