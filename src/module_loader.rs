//! Resolves `#import "path"` directives by reading the referenced module and
//! merging its definitions into the session's environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::box_tree_impl::box_tree_ast::ExprNode;
use crate::box_tree_impl::box_tree_recursive_descent_parsing::{parse_statements, ParseError};
use crate::environment::Environment;
use crate::lexical_analysis::{run_lexical_analysis, LexError};

/// Source files and modules must carry this extension.
pub const SOURCE_EXTENSION: &str = "l";

/// Errors raised while importing a module.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot read module {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module {} is not a .l file", .path.display())]
    BadExtension { path: PathBuf },
    #[error(
        "{}:{line_num}: only definitions and imports may appear in a module, found a {form}",
        .path.display()
    )]
    Restriction {
        path: PathBuf,
        line_num: usize,
        form: &'static str,
    },
    #[error("module {} is already being imported", .path.display())]
    Cycle { path: PathBuf },
    #[error("{}: {source}", .path.display())]
    Lex {
        path: PathBuf,
        #[source]
        source: LexError,
    },
    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

/// True if `path` ends in `.l`.
pub fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension == SOURCE_EXTENSION)
}

/// Tracks the modules currently being imported so that a module which
/// (transitively) imports itself is rejected instead of recursing forever.
#[derive(Debug, Default)]
pub struct ModuleLoader {
    import_stack: Vec<PathBuf>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports `filename`, resolved against `base_dir` (the directory of the
    /// importing file). Every definition is added to `env` in file order;
    /// nested imports resolve against the imported module's own directory.
    /// Returns how many definitions were added. On failure `env` is left as it
    /// was, nothing from a partly read module is kept.
    pub fn import(
        &mut self,
        filename: &str,
        base_dir: &Path,
        env: &mut Environment,
    ) -> Result<usize, ImportError> {
        let path = base_dir.join(filename);

        if !has_source_extension(&path) {
            return Err(ImportError::BadExtension { path });
        }

        let canonical_path = fs::canonicalize(&path).map_err(|source| ImportError::Unreadable {
            path: path.clone(),
            source,
        })?;

        if self.import_stack.contains(&canonical_path) {
            return Err(ImportError::Cycle {
                path: canonical_path,
            });
        }

        let module_str =
            fs::read_to_string(&canonical_path).map_err(|source| ImportError::Unreadable {
                path: canonical_path.clone(),
                source,
            })?;

        info!("importing module {}", canonical_path.display());

        let mut staged_env = env.clone();
        self.import_stack.push(canonical_path.clone());
        let result = self.load_module(&canonical_path, &module_str, &mut staged_env);
        self.import_stack.pop();

        let definitions_added = result?;
        *env = staged_env;
        return Ok(definitions_added);
    }

    fn load_module(
        &mut self,
        path: &Path,
        module_str: &str,
        env: &mut Environment,
    ) -> Result<usize, ImportError> {
        let module_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut definitions_added = 0;

        for (line_idx, line) in module_str.lines().enumerate() {
            let line_num = line_idx + 1;

            let tokens = run_lexical_analysis(line, line_num).map_err(|source| ImportError::Lex {
                path: path.to_path_buf(),
                source,
            })?;
            let statements = parse_statements(&tokens).map_err(|source| ImportError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

            for statement in statements {
                match statement {
                    ExprNode::Def { def_name, def_body } => {
                        debug!("module {} defines {}", path.display(), def_name);
                        env.add(&def_name, &def_body);
                        definitions_added += 1;
                    }
                    ExprNode::Import { filename } => {
                        definitions_added += self.import(&filename, module_dir, env)?;
                    }
                    other => {
                        return Err(ImportError::Restriction {
                            path: path.to_path_buf(),
                            line_num,
                            form: other.kind_name(),
                        });
                    }
                }
            }
        }

        return Ok(definitions_added);
    }
}
