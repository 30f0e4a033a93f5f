use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use zscore::{BuilderConfig, Catalogue, Harness, HarnessConfig, SchemaRegistry};

#[derive(Debug, Parser)]
#[command(
    name = "zscore",
    version,
    about = "Run sandboxed score scripts and emit MusicXML"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a script and write the finished document
    Run {
        #[command(flatten)]
        paths: InputOutput,
        #[command(flatten)]
        data: DataFiles,
        /// Fail when the finished document has validation warnings
        #[arg(long)]
        strict: bool,
    },
    /// Print the sandbox verdict for a script
    Check {
        /// Script file (defaults to stdin)
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,
        /// Print every statement's syntax tree, with node fields and values
        #[arg(long)]
        dump: bool,
    },
    /// Translate a MusicXML document into a script
    Translate {
        #[command(flatten)]
        paths: InputOutput,
    },
}

#[derive(Debug, Args)]
struct InputOutput {
    /// Input file (defaults to stdin)
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,
    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DataFiles {
    /// Element catalogue to use instead of the embedded one
    #[arg(long, value_name = "PATH")]
    catalogue: Option<PathBuf>,
    /// Master schema to use instead of the embedded one
    #[arg(long, value_name = "PATH")]
    schema: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .init();

    match execute(cli.command) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Command) -> Result<ExitCode> {
    match command {
        Command::Run { paths, data, strict } => {
            let script = read_input(paths.input.as_ref())?;
            let config = HarnessConfig {
                builder: BuilderConfig {
                    escalate_warnings: strict,
                },
                ..HarnessConfig::default()
            };
            let harness = build_harness(&data)?.with_config(config);
            let output = harness.run(&script)?;
            for diagnostic in &output.diagnostics {
                warn!("{diagnostic}");
            }
            info!(
                root = output.document.root().tag(),
                warnings = output.diagnostics.len(),
                "document built"
            );
            write_output(paths.output.as_ref(), output.to_xml().as_bytes())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { input, dump } => {
            let script = read_input(input.as_ref())?;
            let module = zscore::script::parse(&script)?;
            if dump {
                for stmt in &module.body {
                    println!("{stmt:#?}");
                }
            }
            let verdict = zscore::sandbox::check_module(&module);
            if verdict.accepted {
                println!("accepted");
                return Ok(ExitCode::SUCCESS);
            }
            println!("rejected");
            for kind in &verdict.disallowed_node_kinds {
                println!("  disallowed syntax: {kind}");
            }
            for call in &verdict.disallowed_calls {
                println!("  disallowed call: {call}");
            }
            Ok(ExitCode::FAILURE)
        }
        Command::Translate { paths } => {
            let document = read_input(paths.input.as_ref())?;
            let script = zscore::xml::to_script(&document)?;
            write_output(paths.output.as_ref(), script.as_bytes())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_harness(data: &DataFiles) -> Result<Harness> {
    let catalogue = match &data.catalogue {
        Some(path) => Catalogue::from_json(&read_path(path)?)
            .with_context(|| format!("invalid catalogue {}", path.display()))?,
        None => Catalogue::load_default()?,
    };
    let registry = match &data.schema {
        Some(path) => SchemaRegistry::load(&read_path(path)?),
        None => SchemaRegistry::load_default()?,
    };
    if !registry.is_available() {
        warn!("master schema unavailable; documents will not be validated");
    }
    Ok(Harness::new(
        Arc::new(catalogue),
        Arc::new(registry),
        HarnessConfig::default(),
    ))
}

fn read_path(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => read_path(path),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            if buffer.trim().is_empty() {
                bail!("no input provided on stdin");
            }
            Ok(buffer)
        }
    }
}

fn write_output(path: Option<&PathBuf>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, data)
            .with_context(|| format!("failed to write output file {}", path.display())),
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(data).context("failed to write stdout")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_accepts_dump_flag() {
        match Cli::try_parse_from(["zscore", "check", "--dump", "song.score"]) {
            Ok(Cli {
                command: Command::Check { input, dump },
                ..
            }) => {
                assert!(dump);
                assert_eq!(input, Some(PathBuf::from("song.score")));
            }
            other => panic!("expected check command, got {other:?}"),
        }
    }

    #[test]
    fn test_run_flags() {
        match Cli::try_parse_from(["zscore", "-q", "run", "--strict", "-o", "out.xml"]) {
            Ok(Cli {
                command: Command::Run { paths, strict, .. },
                quiet,
            }) => {
                assert!(quiet);
                assert!(strict);
                assert_eq!(paths.input, None);
                assert_eq!(paths.output, Some(PathBuf::from("out.xml")));
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }
}
