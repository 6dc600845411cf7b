use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::format::Format;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// What to validate.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub package_dir: PathBuf,
    pub type_name: String,
    pub input_file: Option<PathBuf>,
    pub input_env: bool,
    pub no_tag_check: bool,
    /// Overrides extension based detection for `input_file`.
    pub input_format: Option<Format>,
}

/// Where the input comes from, once parameters are validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    File { path: PathBuf, format: Format },
    Env,
}

impl Input {
    pub fn format(&self) -> Format {
        match self {
            Input::File { format, .. } => *format,
            Input::Env => Format::Env,
        }
    }

    /// Base name of the input file, empty for environment input.
    pub fn file_name(&self) -> String {
        match self {
            Input::File { path, .. } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Input::Env => String::new(),
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<Input, Diagnostic> {
        let invalid = |msg: &str| Diagnostic::error(DiagnosticCode::VF0400InvalidParameters, msg);
        let file = self
            .input_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty());

        if self.package_dir.as_os_str().is_empty() {
            return Err(invalid("missing package directory"));
        }
        if self.type_name.is_empty() {
            return Err(invalid("missing type name"));
        }
        match (self.input_env, file) {
            (false, None) => Err(invalid("missing input file")),
            (true, Some(_)) => Err(invalid(
                "conflicting parameters, -env and -f are mutually exclusive. \
                 Please use either the -env option or the -f option, but not both.",
            )),
            (true, None) => Ok(Input::Env),
            (false, Some(path)) => Ok(Input::File {
                path: path.to_path_buf(),
                format: file_format(path, self.input_format)?,
            }),
        }
    }
}

fn file_format(path: &Path, forced: Option<Format>) -> Result<Format, Diagnostic> {
    match forced {
        // A file can only ever hold dotenv syntax, never the live environment.
        Some(Format::Env) => Ok(Format::Dotenv),
        Some(f) => Ok(f),
        None => Format::from_path(path),
    }
}

/// How to run the synthesized program.
#[derive(Debug, Clone)]
pub struct ExecSettings {
    pub go: PathBuf,
    pub timeout: Duration,
    /// Base directory for workspaces; the system temp dir when unset.
    pub tmp_base: Option<PathBuf>,
    /// Pinned `go.mod`/`go.sum`/vendor bundles per template.
    pub bundle_dir: Option<PathBuf>,
    pub keep_workspace: bool,
}

impl Default for ExecSettings {
    fn default() -> Self {
        ExecSettings {
            go: PathBuf::from("go"),
            timeout: DEFAULT_TIMEOUT,
            tmp_base: None,
            bundle_dir: None,
            keep_workspace: false,
        }
    }
}

impl ExecSettings {
    pub fn tmp_base(&self) -> PathBuf {
        self.tmp_base.clone().unwrap_or_else(std::env::temp_dir)
    }
}
