//! One validation run: parameters, package, closure, tag check, synthesis,
//! execution and interpretation. Each phase is a gate; the first phase that
//! reports anything ends the run with everything it reported.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;

use crate::bundle::{BundleProvider, UnsafeArchivePath};
use crate::closure::walk;
use crate::config::{ExecSettings, Input, Params};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::exec::{ExecRequest, Executor};
use crate::format::Format;
use crate::interpret::interpret;
use crate::synth::{synthesize, Payload, SynthesisRequest};
use crate::tags;
use crate::unit::parse_unit;
use crate::workspace::Workspace;
use crate::MARKER;

type PhaseResult<T> = Result<T, Vec<Diagnostic>>;

pub struct Runner<'a> {
    pub executor: &'a dyn Executor,
    pub bundles: &'a dyn BundleProvider,
    pub settings: &'a ExecSettings,
    /// Snapshot of the environment used for `--env` input.
    pub env_vars: &'a dyn Fn() -> Vec<(String, String)>,
}

impl Runner<'_> {
    /// Runs every phase and returns what the run reported, empty when the
    /// input is valid.
    pub fn run(&self, params: &Params) -> Vec<Diagnostic> {
        match self.try_run(params) {
            Ok(()) => Vec::new(),
            Err(diags) => {
                if diags.iter().any(Diagnostic::is_execution_failure) {
                    tracing::warn!("validation program did not run to completion");
                }
                tracing::debug!(
                    count = diags.len(),
                    phase = ?diags.first().map(|d| d.phase),
                    "run reported diagnostics"
                );
                diags
            }
        }
    }

    fn try_run(&self, params: &Params) -> PhaseResult<()> {
        let input = params.validate().map_err(one)?;
        let format = input.format();

        let unit = parse_unit(&params.package_dir).map_err(one)?;
        let closure = walk(&unit, &params.type_name)?;

        if params.no_tag_check {
            tracing::debug!("struct tag check disabled");
        } else {
            let violations = tags::check(&closure, format.tag_key());
            if !violations.is_empty() {
                return Err(violations.iter().map(|v| v.to_diagnostic()).collect());
            }
        }

        let payload = self.payload(&input).map_err(one)?;
        let declarations = closure.declarations();
        let program = synthesize(&SynthesisRequest {
            format,
            root_type: &params.type_name,
            declarations: &declarations,
            imports: &closure.imports,
            payload: &payload,
            input_file_name: &input.file_name(),
            marker: MARKER,
        })
        .map_err(one)?;

        let ws = Workspace::create(&self.settings.tmp_base(), self.settings.keep_workspace)
            .map_err(|e| one(Diagnostic::from_anyhow(DiagnosticCode::VF0500WorkspaceFailed, &e)))?;
        ws.write_file("main.go", program.source.as_bytes())
            .map_err(|e| one(Diagnostic::from_anyhow(DiagnosticCode::VF0500WorkspaceFailed, &e)))?;
        let bundle = self
            .bundles
            .bundle(program.template, &program.requirements)
            .and_then(|b| b.install(&ws).map(|()| b))
            .map_err(|e| one(workspace_diagnostic(&e)))?;

        let outcome = self
            .executor
            .execute(&ExecRequest {
                workspace: ws.path(),
                mod_mode: bundle.mod_mode(),
                timeout: self.settings.timeout,
            })
            .map_err(|e| one(Diagnostic::from_anyhow(DiagnosticCode::VF0600ExecutionFailed, &e)))?;

        let diags = interpret(&outcome, MARKER).into_diagnostics();
        if diags.is_empty() {
            Ok(())
        } else {
            Err(diags)
        }
    }

    fn payload(&self, input: &Input) -> Result<Payload, Diagnostic> {
        match input {
            Input::Env => Ok(Payload::Env((self.env_vars)().into_iter().collect())),
            Input::File { path, format } => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("reading input file: {}", path.display()))
                    .map_err(|e| Diagnostic::from_anyhow(DiagnosticCode::VF0402InputUnreadable, &e))?;
                if *format == Format::Dotenv {
                    return parse_dotenv(path, &bytes).map(Payload::Env);
                }
                Ok(Payload::Text(bytes))
            }
        }
    }
}

fn parse_dotenv(path: &Path, bytes: &[u8]) -> Result<BTreeMap<String, String>, Diagnostic> {
    let mut vars = BTreeMap::new();
    for item in dotenvy::from_read_iter(bytes) {
        let (k, v) = item
            .with_context(|| format!("parsing dotenv file: {}", path.display()))
            .map_err(|e| Diagnostic::from_anyhow(DiagnosticCode::VF0402InputUnreadable, &e))?;
        vars.insert(k, v);
    }
    Ok(vars)
}

fn workspace_diagnostic(err: &anyhow::Error) -> Diagnostic {
    let code = if err.downcast_ref::<UnsafeArchivePath>().is_some() {
        DiagnosticCode::VF0501UnsafeBundlePath
    } else {
        DiagnosticCode::VF0500WorkspaceFailed
    };
    Diagnostic::from_anyhow(code, err)
}

fn one(d: Diagnostic) -> Vec<Diagnostic> {
    vec![d]
}
