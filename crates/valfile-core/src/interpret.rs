use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::exec::{ExecutionOutcome, RunStatus};
use crate::util::trim_trailing_newlines;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    /// No output and a zero exit: the input is valid.
    Clean,
    /// Failures the program reported through the marker channel.
    Reported(Vec<Diagnostic>),
    /// The program could not be built or did not behave as generated.
    ExecutionFailure(Diagnostic),
}

impl Interpretation {
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        match self {
            Interpretation::Clean => Vec::new(),
            Interpretation::Reported(diags) => diags,
            Interpretation::ExecutionFailure(d) => vec![d],
        }
    }
}

pub fn interpret(outcome: &ExecutionOutcome, marker: &str) -> Interpretation {
    if outcome.truncated {
        tracing::warn!("validation program output was truncated");
    }
    let text = String::from_utf8_lossy(trim_trailing_newlines(&outcome.output));

    let code = match outcome.status {
        RunStatus::TimedOut => {
            return Interpretation::ExecutionFailure(Diagnostic::error(
                DiagnosticCode::VF0601ExecutionTimedOut,
                "validation program timed out",
            ))
        }
        RunStatus::BuildFailed(code) => {
            return Interpretation::ExecutionFailure(Diagnostic::error(
                DiagnosticCode::VF0600ExecutionFailed,
                with_output(format!("building validation program: exit status {code}"), &text),
            ))
        }
        RunStatus::Exited(code) => code,
    };

    if text.trim().is_empty() {
        if code == 0 {
            return Interpretation::Clean;
        }
        return Interpretation::ExecutionFailure(Diagnostic::error(
            DiagnosticCode::VF0600ExecutionFailed,
            format!("validation program exited with status {code}"),
        ));
    }
    if !outcome.is_marked(marker) {
        return Interpretation::ExecutionFailure(Diagnostic::error(
            DiagnosticCode::VF0600ExecutionFailed,
            with_output(
                format!("unexpected output from validation program (exit status {code})"),
                &text,
            ),
        ));
    }

    let mut messages: Vec<String> = Vec::new();
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        match (line.strip_prefix(marker), messages.last_mut()) {
            (Some(msg), _) => messages.push(msg.to_string()),
            (None, Some(last)) => {
                last.push('\n');
                last.push_str(line);
            }
            (None, None) => unreachable!("output starts with the marker"),
        }
    }
    let mut diags: Vec<Diagnostic> = messages
        .into_iter()
        .map(|m| Diagnostic::error(DiagnosticCode::VF0700ValidationFailed, m))
        .collect();
    // The generated program always exits 0; anything else is a crash after
    // the reports were printed.
    if code != 0 {
        diags.push(Diagnostic::error(
            DiagnosticCode::VF0600ExecutionFailed,
            format!("validation program exited with status {code} after reporting failures"),
        ));
    }
    Interpretation::Reported(diags)
}

fn with_output(head: String, output: &str) -> String {
    if output.trim().is_empty() {
        head
    } else {
        format!("{head}:\n{output}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "VALFILE: ";

    fn outcome(status: RunStatus, output: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            status,
            output: output.as_bytes().to_vec(),
            truncated: false,
        }
    }

    fn messages(i: Interpretation) -> Vec<String> {
        match i {
            Interpretation::Reported(d) => d.into_iter().map(|d| d.message).collect(),
            other => panic!("expected reported failures, got {other:?}"),
        }
    }

    #[test]
    fn empty_output_is_clean() {
        assert_eq!(interpret(&outcome(RunStatus::Exited(0), "\n\n"), MARKER), Interpretation::Clean);
    }

    #[test]
    fn marked_lines_become_one_diagnostic_each() {
        let out = "VALFILE: json: unknown field \"bar\"\n";
        assert_eq!(
            messages(interpret(&outcome(RunStatus::Exited(0), out), MARKER)),
            vec!["json: unknown field \"bar\""]
        );

        let out = "VALFILE: Key: 'C.A' Error:Field validation for 'A' failed on the 'required' tag\nVALFILE: Key: 'C.B' Error:Field validation for 'B' failed on the 'min' tag\n";
        let got = messages(interpret(&outcome(RunStatus::Exited(0), out), MARKER));
        assert_eq!(got.len(), 2);
        assert!(got[1].contains("'min'"));
    }

    #[test]
    fn continuation_lines_join_the_previous_message() {
        let out = "VALFILE: yaml: unmarshal errors:\n  line 1: field bar not found in type main.C\r\n  line 2: field baz not found in type main.C\n";
        assert_eq!(
            messages(interpret(&outcome(RunStatus::Exited(0), out), MARKER)),
            vec!["yaml: unmarshal errors:\n  line 1: field bar not found in type main.C\n  line 2: field baz not found in type main.C"]
        );
    }

    #[test]
    fn everything_else_is_an_execution_failure() {
        let cases = [
            (outcome(RunStatus::Exited(2), ""), DiagnosticCode::VF0600ExecutionFailed),
            (outcome(RunStatus::Exited(0), "panic: boom\n"), DiagnosticCode::VF0600ExecutionFailed),
            (
                outcome(RunStatus::BuildFailed(1), "./main.go:3:2: undefined: x\n"),
                DiagnosticCode::VF0600ExecutionFailed,
            ),
            (outcome(RunStatus::TimedOut, "VALFILE: late\n"), DiagnosticCode::VF0601ExecutionTimedOut),
        ];
        for (o, code) in cases {
            match interpret(&o, MARKER) {
                Interpretation::ExecutionFailure(d) => {
                    assert_eq!(d.code, code);
                    assert!(d.is_execution_failure());
                }
                other => panic!("{o:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn crash_after_marked_output_is_also_an_execution_failure() {
        let out = "VALFILE: Key: 'C.A' Error:Field validation for 'A' failed on the 'required' tag\nfatal error: concurrent map writes\n";
        let diags = interpret(&outcome(RunStatus::Exited(2), out), MARKER).into_diagnostics();
        let codes: Vec<DiagnosticCode> = diags.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![DiagnosticCode::VF0700ValidationFailed, DiagnosticCode::VF0600ExecutionFailed]
        );
        assert_eq!(
            diags[1].message,
            "validation program exited with status 2 after reporting failures"
        );
        assert!(diags[1].is_execution_failure());
    }

    #[test]
    fn build_failure_keeps_compiler_output() {
        let d = interpret(&outcome(RunStatus::BuildFailed(1), "go: missing go.sum entry\n"), MARKER)
            .into_diagnostics();
        assert_eq!(
            d[0].message,
            "building validation program: exit status 1:\ngo: missing go.sum entry"
        );
    }
}
