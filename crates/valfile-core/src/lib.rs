//! Validates configuration files against Go struct types.
//!
//! The Go package is parsed at the declaration level, the type closure of the
//! root struct is resolved and checked for format tags, and a small Go program
//! embedding the declarations and the input is synthesized, built and run.
//! Whatever that program reports through its marker channel becomes a
//! [`diagnostics::Diagnostic`].

pub mod bundle;
pub mod closure;
pub mod config;
pub mod diagnostics;
pub mod exec;
pub mod format;
pub mod go;
pub mod interpret;
pub mod pipeline;
pub mod render;
pub mod synth;
pub mod tags;
pub mod unit;
mod util;
pub mod workspace;

/// Prefix of every failure line the generated program prints.
pub const MARKER: &str = "VALFILE: ";

pub use config::{ExecSettings, Input, Params};
pub use diagnostics::{Diagnostic, DiagnosticCode, Phase};
pub use format::Format;
pub use pipeline::Runner;
