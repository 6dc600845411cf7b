use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::go::literal::quote;

/// Input serialization format. Selects the expected tag key and the program
/// template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Yaml,
    Toml,
    Hcl,
    /// Evaluated by the program, then decoded as strict JSON.
    Jsonnet,
    /// The process environment.
    Env,
    /// A dotenv file, decoded like the process environment.
    Dotenv,
}

/// Program template family. Dotenv and env share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    Json,
    Yaml,
    Toml,
    Hcl,
    Jsonnet,
    Env,
}

impl Template {
    pub fn name(self) -> &'static str {
        match self {
            Template::Json => "json",
            Template::Yaml => "yaml",
            Template::Toml => "toml",
            Template::Hcl => "hcl",
            Template::Jsonnet => "jsonnet",
            Template::Env => "env",
        }
    }
}

impl Format {
    pub fn tag_key(self) -> &'static str {
        match self {
            Format::Json | Format::Jsonnet => "json",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
            Format::Hcl => "hcl",
            Format::Env | Format::Dotenv => "env",
        }
    }

    pub fn template(self) -> Template {
        match self {
            Format::Json => Template::Json,
            Format::Yaml => Template::Yaml,
            Format::Toml => Template::Toml,
            Format::Hcl => Template::Hcl,
            Format::Jsonnet => Template::Jsonnet,
            Format::Env | Format::Dotenv => Template::Env,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
            Format::Hcl => "hcl",
            Format::Jsonnet => "jsonnet",
            Format::Env => "env",
            Format::Dotenv => "dotenv",
        }
    }

    /// Detects the format of an input file from its extension, falling back
    /// to dotenv naming (`.env`, `.env.local`, ...).
    pub fn from_path(path: &Path) -> Result<Format, Diagnostic> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("toml") => return Ok(Format::Toml),
            Some("json") => return Ok(Format::Json),
            Some("yaml") | Some("yml") => return Ok(Format::Yaml),
            Some("hcl") => return Ok(Format::Hcl),
            Some("jsonnet") => return Ok(Format::Jsonnet),
            _ => {}
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_dotenv_name(&name) {
            return Ok(Format::Dotenv);
        }
        Err(Diagnostic::error(
            DiagnosticCode::VF0401UnsupportedInputFormat,
            format!("unsupported file type: {}", quote(&name)),
        ))
    }
}

fn is_dotenv_name(name: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\.env(\..+)?$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            "hcl" => Ok(Format::Hcl),
            "jsonnet" => Ok(Format::Jsonnet),
            "env" => Ok(Format::Env),
            "dotenv" => Ok(Format::Dotenv),
            other => Err(format!(
                "unknown input format {other:?} (expected json, yaml, toml, hcl, jsonnet, dotenv or env)"
            )),
        }
    }
}
