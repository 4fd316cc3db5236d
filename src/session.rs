//! An interpreter session: one global environment plus the two-phase driver
//! that routes definitions and imports around the reduction engine.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::box_tree_impl::box_tree_ast::{expr_node_to_tree_string, ExprNode};
use crate::box_tree_impl::box_tree_execution::{EvalConfig, EvalError, Evaluator};
use crate::box_tree_impl::box_tree_recursive_descent_parsing::{parse_statements, ParseError};
use crate::diagnostics::Diagnostic;
use crate::environment::Environment;
use crate::lexical_analysis::{run_lexical_analysis, LexError};
use crate::module_loader::{has_source_extension, ImportError, ModuleLoader};

/// Errors that stop the current file (batch mode) or line (interactive mode).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{} is not a .l file", .path.display())]
    BadExtension { path: PathBuf },
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("line {line_num}: {source}")]
    Eval {
        line_num: usize,
        #[source]
        source: EvalError,
    },
    #[error("line {line_num}: {source}")]
    Import {
        line_num: usize,
        #[source]
        source: ImportError,
    },
}

impl SessionError {
    /// Builds the user-facing diagnostic for this error.
    pub fn to_diagnostic(&self, origin: &str) -> Diagnostic {
        let diagnostic = match self {
            SessionError::Lex(lex_error) => {
                let (line_num, column) = lex_error.position();
                Diagnostic::error(lex_error.to_string()).at(line_num, column)
            }
            SessionError::Parse(parse_error) => match parse_error.position() {
                Some((line_num, column)) => {
                    Diagnostic::error(parse_error.to_string()).at(line_num, column)
                }
                None => Diagnostic::error(parse_error.to_string()),
            },
            SessionError::Eval { line_num, source } => {
                Diagnostic::error(source.to_string()).at_line(*line_num)
            }
            SessionError::Import { line_num, source } => {
                Diagnostic::error(source.to_string()).at_line(*line_num)
            }
            SessionError::BadExtension { .. } | SessionError::Unreadable { .. } => {
                Diagnostic::error(self.to_string())
            }
        };

        diagnostic.with_origin(origin)
    }
}

/// A parsed top-level form and the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedForm {
    pub expr: ExprNode,
    pub line_num: usize,
}

/// Every form of one source file, parsed before any of them is run.
#[derive(Debug, Clone)]
pub struct ExpressionBatch {
    pub forms: Vec<ParsedForm>,
    /// Directory imports in this batch resolve against.
    pub base_dir: PathBuf,
}

impl ExpressionBatch {
    /// Renders the debug tree of every form in the batch.
    pub fn tree_dump(&self) -> String {
        self.forms
            .iter()
            .map(|form| expr_node_to_tree_string(&form.expr))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What running one top-level form produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    Defined {
        def_name: String,
        line_num: usize,
        shadows_existing: bool,
    },
    Imported {
        filename: String,
        definitions_added: usize,
    },
    Value(ExprNode),
}

/// Parses source text line by line. Blank lines and comments produce nothing.
pub fn parse_source(source_str: &str) -> Result<Vec<ParsedForm>, SessionError> {
    let mut forms = Vec::new();

    for (line_idx, line) in source_str.lines().enumerate() {
        let line_num = line_idx + 1;
        let tokens = run_lexical_analysis(line, line_num)?;

        for expr in parse_statements(&tokens)? {
            debug!("parsed line {}:\n{}", line_num, expr_node_to_tree_string(&expr));
            forms.push(ParsedForm { expr, line_num });
        }
    }

    return Ok(forms);
}

/// Owns the global environment for as long as the session lives. Sessions are
/// independent of one another.
#[derive(Debug, Default)]
pub struct Session {
    env: Environment,
    eval_config: EvalConfig,
    loader: ModuleLoader,
}

impl Session {
    pub fn new(eval_config: EvalConfig) -> Self {
        Session {
            env: Environment::new(),
            eval_config,
            loader: ModuleLoader::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn eval_config(&self) -> &EvalConfig {
        &self.eval_config
    }

    /// Reads and parses a whole `.l` file. Files with another extension are
    /// rejected before anything is tokenized.
    pub fn load_file(&self, path: &Path) -> Result<ExpressionBatch, SessionError> {
        if !has_source_extension(path) {
            return Err(SessionError::BadExtension {
                path: path.to_path_buf(),
            });
        }

        let source_str = fs::read_to_string(path).map_err(|source| SessionError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(ExpressionBatch {
            forms: parse_source(&source_str)?,
            base_dir,
        })
    }

    /// Runs a single form. Definitions are stored unevaluated, imports go to
    /// the module loader, everything else is reduced to normal form.
    pub fn interpret_form(
        &mut self,
        form: &ParsedForm,
        base_dir: &Path,
    ) -> Result<FormOutcome, SessionError> {
        match &form.expr {
            ExprNode::Def { def_name, def_body } => {
                let shadows_existing = self.env.contains(def_name);
                self.env.add(def_name, def_body);

                Ok(FormOutcome::Defined {
                    def_name: def_name.clone(),
                    line_num: form.line_num,
                    shadows_existing,
                })
            }
            ExprNode::Import { filename } => {
                let definitions_added = self
                    .loader
                    .import(filename, base_dir, &mut self.env)
                    .map_err(|source| SessionError::Import {
                        line_num: form.line_num,
                        source,
                    })?;

                Ok(FormOutcome::Imported {
                    filename: filename.clone(),
                    definitions_added,
                })
            }
            term => {
                let mut evaluator = Evaluator::new(&self.env, self.eval_config.clone());
                let normal_form = evaluator.eval(term).map_err(|source| SessionError::Eval {
                    line_num: form.line_num,
                    source,
                })?;
                debug!(
                    "line {} reached normal form after {} reductions",
                    form.line_num,
                    evaluator.reductions()
                );

                Ok(FormOutcome::Value(normal_form))
            }
        }
    }

    /// Runs every form of the batch in order, handing each outcome to `emit`.
    /// Stops at the first error.
    pub fn interpret<F>(&mut self, batch: &ExpressionBatch, mut emit: F) -> Result<(), SessionError>
    where
        F: FnMut(&FormOutcome),
    {
        for form in &batch.forms {
            let outcome = self.interpret_form(form, &batch.base_dir)?;
            emit(&outcome);
        }

        return Ok(());
    }

    /// Tokenizes, parses and runs one line of interactive input right away.
    pub fn run_line(
        &mut self,
        line: &str,
        line_num: usize,
        base_dir: &Path,
    ) -> Result<Vec<FormOutcome>, SessionError> {
        let tokens = run_lexical_analysis(line, line_num)?;
        let mut outcomes = Vec::new();

        for expr in parse_statements(&tokens)? {
            let form = ParsedForm { expr, line_num };
            outcomes.push(self.interpret_form(&form, base_dir)?);
        }

        return Ok(outcomes);
    }

    /// Drops every definition, ending the session's state.
    pub fn reset(&mut self) {
        self.env.clear();
    }
}
