//! Code to configure and run the interpreter, either over source files or as
//! an interactive prompt.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use crate::box_tree_impl::box_tree_execution::{EtaPolicy, EvalConfig};
use crate::diagnostics::Diagnostic;
use crate::session::{FormOutcome, Session, SessionError};

/// Prompt shown in interactive mode.
pub const PROMPT: &str = "\\>: ";

/// Levels accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Config for the interpreter. Instantiate via `InterpreterConfig::parse()`.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct InterpreterConfig {
    /// `.l` files to run in order, sharing one set of definitions. Without any,
    /// an interactive prompt is started.
    #[arg(short, long)]
    pub src_filepath: Vec<PathBuf>,

    /// Maximum beta and delta steps per evaluated line (0 for no limit).
    #[arg(long, default_value_t = 1_000_000)]
    pub max_reductions: u64,

    /// Maximum nesting of evaluation calls (0 for no limit).
    #[arg(long, default_value_t = 512)]
    pub max_depth: usize,

    /// When `(\x.(f x))` is collapsed to `f`.
    #[arg(long, value_enum, default_value_t = EtaPolicy::Always)]
    pub eta: EtaPolicy,

    /// Fail on applications whose head is not a function.
    #[arg(long)]
    pub strict: bool,

    /// Return looked-up definitions as written instead of reducing them.
    #[arg(long)]
    pub lazy_definitions: bool,

    /// Print the debug tree of every form parsed from the source files.
    #[arg(long)]
    pub dump_trees: bool,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
}

impl InterpreterConfig {
    /// The reduction engine settings selected on the command line.
    pub fn eval_config(&self) -> EvalConfig {
        return EvalConfig {
            eta_policy: self.eta,
            strict_application: self.strict,
            reduce_definitions: !self.lazy_definitions,
            max_reductions: (self.max_reductions > 0).then_some(self.max_reductions),
            max_depth: (self.max_depth > 0).then_some(self.max_depth),
        };
    }
}

/// Errors that may be thrown when running the interpreter.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{origin}: {source}")]
    Session {
        origin: String,
        #[source]
        source: SessionError,
    },
    #[error("cannot write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("line editor error: {0}")]
    Readline(#[from] ReadlineError),
}

impl RunError {
    /// Builds the user-facing diagnostic for this error.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            RunError::Session { origin, source } => return source.to_diagnostic(origin),
            other => return Diagnostic::error(other.to_string()),
        }
    }
}

/// Installs the tracing subscriber used by the binary: compact lines on
/// standard error, no timestamps.
pub fn init_logging(level: LogLevel) {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level.into());

    let layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(filter);

    // A second initialisation (e.g. from tests) keeps the first subscriber.
    let _ = Registry::default().with(layer).try_init();
}

// Reports the advisory diagnostics an outcome produces and writes its value.
fn report_outcome(outcome: &FormOutcome, origin: &str, out: &mut dyn Write) -> std::io::Result<()> {
    match outcome {
        FormOutcome::Value(value) => writeln!(out, "{}", value),
        FormOutcome::Defined {
            def_name,
            line_num,
            shadows_existing: true,
        } => {
            Diagnostic::note(format!("`{}` shadows an earlier definition", def_name))
                .with_origin(origin)
                .at_line(*line_num)
                .emit();
            Ok(())
        }
        FormOutcome::Imported {
            filename,
            definitions_added: 0,
        } => {
            Diagnostic::warning(format!("{} defines nothing", filename))
                .with_origin(origin)
                .emit();
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Runs one file of a batch: parse every line first, then interpret the
/// whole batch in order.
pub fn run_file(
    session: &mut Session,
    path: &Path,
    dump_trees: bool,
    out: &mut dyn Write,
) -> Result<(), RunError> {
    let origin = path.display().to_string();
    let session_error = |source| RunError::Session {
        origin: origin.clone(),
        source,
    };

    info!("running {}", origin);
    let batch = session.load_file(path).map_err(session_error)?;

    if dump_trees {
        writeln!(out, "{}", batch.tree_dump())?;
    }

    let mut write_result = Ok(());
    session
        .interpret(&batch, |outcome| {
            if write_result.is_ok() {
                write_result = report_outcome(outcome, &origin, out);
            }
        })
        .map_err(session_error)?;

    return Ok(write_result?);
}

/// Run the interpreter in batch mode over every configured file, writing the
/// normal forms to `out`. Stops at the first error.
pub fn run_interpreter(config: &InterpreterConfig, out: &mut dyn Write) -> Result<(), RunError> {
    let mut session = Session::new(config.eval_config());

    for path in &config.src_filepath {
        run_file(&mut session, path, config.dump_trees, out)?;
    }

    return Ok(());
}

/// Run the interactive prompt. Each line is evaluated right away against the
/// session's definitions; errors are reported and the prompt continues.
pub fn run_repl(config: &InterpreterConfig) -> Result<(), RunError> {
    let mut session = Session::new(config.eval_config());
    let mut editor = DefaultEditor::new()?;
    let mut stdout = std::io::stdout();
    let base_dir = PathBuf::from(".");
    let origin = "<stdin>";
    let mut line_num = 0;

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(readline_error) => return Err(readline_error.into()),
        };
        line_num += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(trimmed);

        match trimmed {
            ":quit" | ":q" => break,
            ":env" => {
                for (name, value) in session.env().iter() {
                    writeln!(stdout, "{} := {}", name, value)?;
                }
                continue;
            }
            _ => {}
        }

        match session.run_line(trimmed, line_num, &base_dir) {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    report_outcome(outcome, origin, &mut stdout)?;
                }
            }
            Err(session_error) => session_error.to_diagnostic(origin).emit(),
        }
    }

    return Ok(());
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn config_for(paths: Vec<PathBuf>) -> InterpreterConfig {
        InterpreterConfig::parse_from(
            std::iter::once(String::from("lamb")).chain(
                paths
                    .iter()
                    .flat_map(|path| [String::from("-s"), path.display().to_string()]),
            ),
        )
    }

    fn run_to_string(config: &InterpreterConfig) -> (String, Result<(), RunError>) {
        let mut out = Vec::new();
        let result = run_interpreter(config, &mut out);
        (String::from_utf8(out).expect("output is utf-8"), result)
    }

    #[test]
    fn test_default_config() {
        let config = config_for(vec![]);

        assert!(config.src_filepath.is_empty());
        assert_eq!(config.eval_config(), EvalConfig::default());
    }

    #[test]
    fn test_config_flags() {
        let config = InterpreterConfig::parse_from([
            "lamb",
            "--max-reductions",
            "0",
            "--eta",
            "functions-only",
            "--strict",
            "--lazy-definitions",
        ]);
        let eval_config = config.eval_config();

        assert_eq!(eval_config.max_reductions, None);
        assert_eq!(eval_config.eta_policy, EtaPolicy::FunctionsOnly);
        assert!(eval_config.strict_application);
        assert!(!eval_config.reduce_definitions);
    }

    #[test]
    fn test_run_sample_programs() {
        let programs_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test_programs");
        let config = config_for(vec![
            programs_dir.join("church_numerals.l"),
            programs_dir.join("booleans.l"),
        ]);

        let (output, result) = run_to_string(&config);
        result.expect("sample programs run");

        assert_eq!(
            output.lines().collect::<Vec<_>>(),
            vec![
                "(λf.(λx.(f (f (f x)))))",
                "(λf.(λx.(f (f (f (f (f (f x))))))))",
                "(s (s (s z)))",
                "yes",
                "no",
                "(λy_.y)",
            ]
        );
    }

    // Files share definitions, and output produced before an error is kept.
    #[test]
    fn test_batch_stops_at_first_error() {
        let dir = tempfile::tempdir().expect("Unable to create temp dir.");
        let first = dir.path().join("first.l");
        let second = dir.path().join("second.l");
        fs::write(&first, "id := (\\x. x)\n(id a)\n").expect("write first");
        fs::write(&second, "(id b)\n#import \"missing.l\"\n(id c)\n").expect("write second");

        let (output, result) = run_to_string(&config_for(vec![first, second]));

        assert_eq!(output, "a\nb\n");
        let diagnostic = result.expect_err("missing import fails").to_diagnostic();
        assert!(diagnostic.is_fatal());
        assert_eq!(diagnostic.line_num, Some(2));
    }

    #[test]
    fn test_rejects_non_source_files() {
        let (output, result) = run_to_string(&config_for(vec![PathBuf::from("notes.txt")]));

        assert!(output.is_empty());
        assert!(matches!(
            result,
            Err(RunError::Session {
                source: SessionError::BadExtension { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_dump_trees() {
        let dir = tempfile::tempdir().expect("Unable to create temp dir.");
        let path = dir.path().join("tree.l");
        fs::write(&path, "(f a)\n").expect("write program");

        let mut config = config_for(vec![path]);
        config.dump_trees = true;
        let (output, result) = run_to_string(&config);
        result.expect("program runs");

        assert_eq!(output, "|APP: \n|--VAR: f\n|--VAR: a\n\n(f a)\n");
    }
}
