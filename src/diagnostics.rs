//! Severity-tagged, position-annotated messages for the user.

use std::fmt;

use owo_colors::OwoColorize;

/// How serious a diagnostic is. Only `Error` stops a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    fn tag(self) -> &'static str {
        match self {
            Severity::Error => "[ERROR]",
            Severity::Warning => "[WARNING]",
            Severity::Note => "[NOTE]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// File name, or `<stdin>` for interactive input.
    pub origin: Option<String>,
    /// 1-based line and, when known, column.
    pub line_num: Option<usize>,
    pub column: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            origin: None,
            line_num: None,
            column: None,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, message)
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn at_line(mut self, line_num: usize) -> Self {
        self.line_num = Some(line_num);
        self
    }

    pub fn at(mut self, line_num: usize, column: usize) -> Self {
        self.line_num = Some(line_num);
        self.column = Some(column);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }

    fn location(&self) -> Option<String> {
        let mut location = self.origin.clone().unwrap_or_default();

        if let Some(line_num) = self.line_num {
            if !location.is_empty() {
                location.push(':');
            }
            location.push_str(&line_num.to_string());
            if let Some(column) = self.column {
                location.push(':');
                location.push_str(&column.to_string());
            }
        }

        if location.is_empty() {
            None
        } else {
            Some(location)
        }
    }

    /// Renders the diagnostic, optionally with terminal colours.
    pub fn render(&self, colored: bool) -> String {
        let tag = match (colored, self.severity) {
            (true, Severity::Error) => self.severity.tag().red().to_string(),
            (true, Severity::Warning) => self.severity.tag().yellow().to_string(),
            _ => String::from(self.severity.tag()),
        };

        match self.location() {
            Some(location) => format!("{} {}: {}", tag, location, self.message),
            None => format!("{} {}", tag, self.message),
        }
    }

    /// Prints the diagnostic to standard error.
    pub fn emit(&self) {
        eprintln!("{}", self.render(true));
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(false))
    }
}
