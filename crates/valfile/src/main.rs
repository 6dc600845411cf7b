use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use valfile_core::bundle::{BundleProvider, DirBundles, ModuleBundles};
use valfile_core::diagnostics::render_diagnostics_md;
use valfile_core::exec::GoExecutor;
use valfile_core::{Diagnostic, ExecSettings, Format, Params, Runner};

#[derive(Parser, Debug)]
#[command(name = "valfile", version)]
#[command(
    about = "Validates a configuration file or the environment against a Go struct type.",
    long_about = None
)]
struct Cli {
    /// Go package directory holding the type declarations.
    #[arg(short = 'p', long = "package", default_value = ".")]
    package: PathBuf,
    /// Name of the root struct type.
    #[arg(short = 't', long = "type", default_value = "")]
    type_name: String,
    /// Input file (.json, .jsonnet, .yaml, .yml, .toml, .hcl or a .env file).
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,
    /// Validate the process environment instead of a file.
    #[arg(long)]
    env: bool,
    /// Skip the struct tag check.
    #[arg(long)]
    no_tag_check: bool,
    /// Input format, overriding detection from the file name.
    #[arg(long, value_name = "FORMAT")]
    input_format: Option<Format>,

    /// Bound on building and running the validation program.
    #[arg(long, env = "VALFILE_TIMEOUT", default_value_t = 120, value_name = "SECS")]
    timeout: u64,
    /// Go toolchain binary.
    #[arg(long, env = "VALFILE_GO", default_value = "go")]
    go: PathBuf,
    /// Directory of pinned bundles (<dir>/<template>/go.mod, go.sum, vendor.zip).
    /// Bundles with vendor.zip build offline; without this flag the go tool
    /// downloads modules.
    #[arg(long, env = "VALFILE_BUNDLE_DIR")]
    bundle_dir: Option<PathBuf>,
    /// Base directory for temporary workspaces.
    #[arg(long, env = "VALFILE_TMPDIR")]
    tmp_dir: Option<PathBuf>,
    /// Leave the generated workspace in place for inspection.
    #[arg(long)]
    keep_workspace: bool,

    #[arg(long, value_enum, default_value_t = MessageFormat::Text)]
    message_format: MessageFormat,
    /// More log output on stderr (-v, -vv, -vvv). VALFILE_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Print the diagnostics catalog as markdown and exit.
    #[arg(long)]
    diagnostics_catalog: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MessageFormat {
    Text,
    Json,
}

impl Cli {
    fn params(&self) -> Params {
        Params {
            package_dir: self.package.clone(),
            type_name: self.type_name.clone(),
            input_file: self.file.clone(),
            input_env: self.env,
            no_tag_check: self.no_tag_check,
            input_format: self.input_format,
        }
    }

    fn settings(&self) -> ExecSettings {
        ExecSettings {
            go: self.go.clone(),
            timeout: Duration::from_secs(self.timeout),
            tmp_base: self.tmp_dir.clone(),
            bundle_dir: self.bundle_dir.clone(),
            keep_workspace: self.keep_workspace,
        }
    }
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.diagnostics_catalog {
        print!("{}", render_diagnostics_md());
        return Ok(ExitCode::SUCCESS);
    }

    let params = cli.params();
    let settings = cli.settings();
    let executor = GoExecutor::new(&settings.go);
    let dir_bundles = settings.bundle_dir.as_ref().map(DirBundles::new);
    let bundles: &dyn BundleProvider = match &dir_bundles {
        Some(b) => b,
        None => &ModuleBundles,
    };
    let runner = Runner {
        executor: &executor,
        bundles,
        settings: &settings,
        env_vars: &process_env,
    };

    let diags = runner.run(&params);
    if diags.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    write_diagnostics(&diags, cli.message_format)?;
    Ok(ExitCode::from(1))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("VALFILE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,valfile={level},valfile_core={level}")));
    // Stdout carries diagnostics only.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn process_env() -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (k, v) in std::env::vars_os() {
        match (k.into_string(), v.into_string()) {
            (Ok(k), Ok(v)) => out.push((k, v)),
            (Ok(k), Err(_)) => tracing::warn!(key = %k, "skipping environment variable with non-UTF-8 value"),
            (Err(k), _) => tracing::warn!(key = ?k, "skipping environment variable with non-UTF-8 name"),
        }
    }
    out
}

fn write_diagnostics(diags: &[Diagnostic], format: MessageFormat) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for d in diags {
        let written = match format {
            MessageFormat::Text => writeln!(out, "{d}"),
            MessageFormat::Json => {
                let line = serde_json::to_string(d).context("encode diagnostic")?;
                writeln!(out, "{line}")
            }
        };
        written.context("write diagnostics")?;
    }
    out.flush().context("flush stdout")
}
