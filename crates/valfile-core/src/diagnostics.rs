use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

/// The pipeline step that produced a diagnostic. Each phase is a gate: when a
/// phase reports errors, later phases never run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Params,
    Parse,
    Closure,
    TagCheck,
    Render,
    Synthesize,
    Workspace,
    Execute,
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticCode {
    VF0001UnitNotFound,
    VF0002AmbiguousUnit,
    VF0003SyntaxError,
    VF0010RootTypeNotFound,
    VF0011UnsupportedRootType,
    VF0100UndefinedType,
    VF0101UnsupportedGenericType,
    VF0102UndefinedPackage,
    VF0103ConflictingImport,
    VF0200MissingTag,
    VF0201EmptyTag,
    VF0202MalformedTag,
    VF0300RenderFailed,
    VF0350SynthesisFailed,
    VF0400InvalidParameters,
    VF0401UnsupportedInputFormat,
    VF0402InputUnreadable,
    VF0500WorkspaceFailed,
    VF0501UnsafeBundlePath,
    VF0600ExecutionFailed,
    VF0601ExecutionTimedOut,
    VF0700ValidationFailed,
}

impl DiagnosticCode {
    pub fn code_str(self) -> &'static str {
        match self {
            DiagnosticCode::VF0001UnitNotFound => "VF0001",
            DiagnosticCode::VF0002AmbiguousUnit => "VF0002",
            DiagnosticCode::VF0003SyntaxError => "VF0003",
            DiagnosticCode::VF0010RootTypeNotFound => "VF0010",
            DiagnosticCode::VF0011UnsupportedRootType => "VF0011",
            DiagnosticCode::VF0100UndefinedType => "VF0100",
            DiagnosticCode::VF0101UnsupportedGenericType => "VF0101",
            DiagnosticCode::VF0102UndefinedPackage => "VF0102",
            DiagnosticCode::VF0103ConflictingImport => "VF0103",
            DiagnosticCode::VF0200MissingTag => "VF0200",
            DiagnosticCode::VF0201EmptyTag => "VF0201",
            DiagnosticCode::VF0202MalformedTag => "VF0202",
            DiagnosticCode::VF0300RenderFailed => "VF0300",
            DiagnosticCode::VF0350SynthesisFailed => "VF0350",
            DiagnosticCode::VF0400InvalidParameters => "VF0400",
            DiagnosticCode::VF0401UnsupportedInputFormat => "VF0401",
            DiagnosticCode::VF0402InputUnreadable => "VF0402",
            DiagnosticCode::VF0500WorkspaceFailed => "VF0500",
            DiagnosticCode::VF0501UnsafeBundlePath => "VF0501",
            DiagnosticCode::VF0600ExecutionFailed => "VF0600",
            DiagnosticCode::VF0601ExecutionTimedOut => "VF0601",
            DiagnosticCode::VF0700ValidationFailed => "VF0700",
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            DiagnosticCode::VF0001UnitNotFound => "package directory holds no Go sources",
            DiagnosticCode::VF0002AmbiguousUnit => "package directory holds more than one package",
            DiagnosticCode::VF0003SyntaxError => "failed to parse package sources",
            DiagnosticCode::VF0010RootTypeNotFound => "root type not found",
            DiagnosticCode::VF0011UnsupportedRootType => "root type is not a struct type",
            DiagnosticCode::VF0100UndefinedType => "undefined type",
            DiagnosticCode::VF0101UnsupportedGenericType => "generic types are not supported",
            DiagnosticCode::VF0102UndefinedPackage => "qualified type names an unimported package",
            DiagnosticCode::VF0103ConflictingImport => "package name bound to different import paths",
            DiagnosticCode::VF0200MissingTag => "struct field is missing the format tag",
            DiagnosticCode::VF0201EmptyTag => "struct field tag has an empty name",
            DiagnosticCode::VF0202MalformedTag => "struct field tag is malformed",
            DiagnosticCode::VF0300RenderFailed => "failed to render type declaration",
            DiagnosticCode::VF0350SynthesisFailed => "failed to synthesize the validation program",
            DiagnosticCode::VF0400InvalidParameters => "invalid parameters",
            DiagnosticCode::VF0401UnsupportedInputFormat => "unsupported input file type",
            DiagnosticCode::VF0402InputUnreadable => "input could not be read",
            DiagnosticCode::VF0500WorkspaceFailed => "failed to prepare the workspace",
            DiagnosticCode::VF0501UnsafeBundlePath => "bundle entry escapes the workspace",
            DiagnosticCode::VF0600ExecutionFailed => "synthesized program failed to build or run",
            DiagnosticCode::VF0601ExecutionTimedOut => "synthesized program timed out",
            DiagnosticCode::VF0700ValidationFailed => "input failed validation",
        }
    }

    pub fn default_help(self) -> Option<&'static str> {
        match self {
            DiagnosticCode::VF0002AmbiguousUnit => {
                Some("Point -p at a directory that contains a single Go package.")
            }
            DiagnosticCode::VF0101UnsupportedGenericType => {
                Some("Declare a concrete struct type for the configuration schema.")
            }
            DiagnosticCode::VF0200MissingTag | DiagnosticCode::VF0201EmptyTag => {
                Some("Tag every field with the input format's key, or pass --no-tag-check.")
            }
            DiagnosticCode::VF0600ExecutionFailed => {
                Some("Re-run with --keep-workspace to inspect the generated program.")
            }
            _ => None,
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            DiagnosticCode::VF0001UnitNotFound
            | DiagnosticCode::VF0002AmbiguousUnit
            | DiagnosticCode::VF0003SyntaxError => Phase::Parse,
            DiagnosticCode::VF0010RootTypeNotFound
            | DiagnosticCode::VF0011UnsupportedRootType
            | DiagnosticCode::VF0100UndefinedType
            | DiagnosticCode::VF0101UnsupportedGenericType
            | DiagnosticCode::VF0102UndefinedPackage
            | DiagnosticCode::VF0103ConflictingImport => Phase::Closure,
            DiagnosticCode::VF0200MissingTag
            | DiagnosticCode::VF0201EmptyTag
            | DiagnosticCode::VF0202MalformedTag => Phase::TagCheck,
            DiagnosticCode::VF0300RenderFailed => Phase::Render,
            DiagnosticCode::VF0350SynthesisFailed => Phase::Synthesize,
            DiagnosticCode::VF0400InvalidParameters
            | DiagnosticCode::VF0401UnsupportedInputFormat
            | DiagnosticCode::VF0402InputUnreadable => Phase::Params,
            DiagnosticCode::VF0500WorkspaceFailed | DiagnosticCode::VF0501UnsafeBundlePath => {
                Phase::Workspace
            }
            DiagnosticCode::VF0600ExecutionFailed | DiagnosticCode::VF0601ExecutionTimedOut => {
                Phase::Execute
            }
            DiagnosticCode::VF0700ValidationFailed => Phase::Validate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub phase: Phase,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            phase: code.phase(),
            severity: Severity::Error,
            message: message.into(),
            help: code.default_help().map(|s| s.to_string()),
        }
    }

    /// Wraps an `anyhow` chain, keeping every context layer in the message.
    pub fn from_anyhow(code: DiagnosticCode, err: &anyhow::Error) -> Self {
        Diagnostic::error(code, format!("{err:#}"))
    }

    pub fn is_execution_failure(&self) -> bool {
        self.phase == Phase::Execute
    }
}

/// Plain display is the bare message, which is what users see on stdout. The
/// alternate form (`{:#}`) prefixes the code and phase and appends help.
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !f.alternate() {
            return f.write_str(&self.message);
        }
        write!(
            f,
            "{} {:?} {:?}: {}",
            self.code.code_str(),
            self.phase,
            self.severity,
            self.message
        )?;
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

pub fn render_diagnostics_md() -> String {
    let mut rows: Vec<(String, Phase, String, String)> = Vec::new();
    for code in all_codes() {
        rows.push((
            code.code_str().to_string(),
            code.phase(),
            code.default_message().to_string(),
            code.default_help().unwrap_or("").to_string(),
        ));
    }
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    out.push_str("# valfile diagnostics catalog\n\n");
    out.push_str("This document is generated from `crates/valfile-core/src/diagnostics.rs`.\n\n");
    out.push_str("| Code | Phase | Message | Help |\n");
    out.push_str("| ---- | ----- | ------- | ---- |\n");
    for (code, phase, msg, help) in rows {
        out.push_str(&format!("| {code} | {phase:?} | {msg} | {help} |\n"));
    }
    out
}

fn all_codes() -> &'static [DiagnosticCode] {
    &[
        DiagnosticCode::VF0001UnitNotFound,
        DiagnosticCode::VF0002AmbiguousUnit,
        DiagnosticCode::VF0003SyntaxError,
        DiagnosticCode::VF0010RootTypeNotFound,
        DiagnosticCode::VF0011UnsupportedRootType,
        DiagnosticCode::VF0100UndefinedType,
        DiagnosticCode::VF0101UnsupportedGenericType,
        DiagnosticCode::VF0102UndefinedPackage,
        DiagnosticCode::VF0103ConflictingImport,
        DiagnosticCode::VF0200MissingTag,
        DiagnosticCode::VF0201EmptyTag,
        DiagnosticCode::VF0202MalformedTag,
        DiagnosticCode::VF0300RenderFailed,
        DiagnosticCode::VF0350SynthesisFailed,
        DiagnosticCode::VF0400InvalidParameters,
        DiagnosticCode::VF0401UnsupportedInputFormat,
        DiagnosticCode::VF0402InputUnreadable,
        DiagnosticCode::VF0500WorkspaceFailed,
        DiagnosticCode::VF0501UnsafeBundlePath,
        DiagnosticCode::VF0600ExecutionFailed,
        DiagnosticCode::VF0601ExecutionTimedOut,
        DiagnosticCode::VF0700ValidationFailed,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_bare_message_and_alternate_adds_code() {
        let d = Diagnostic::error(DiagnosticCode::VF0100UndefinedType, "undefined type: Unknown");
        assert_eq!(d.to_string(), "undefined type: Unknown");
        assert_eq!(format!("{d:#}"), "VF0100 Closure Error: undefined type: Unknown");
    }

    #[test]
    fn catalog_lists_every_code_once() {
        let md = render_diagnostics_md();
        for code in all_codes() {
            assert_eq!(md.matches(code.code_str()).count(), 1, "{}", code.code_str());
        }
    }
}
