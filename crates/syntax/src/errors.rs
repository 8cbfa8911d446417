//! Error reporting with source locations.
//!
//! Uses ariadne for rich error output with source code snippets.

use ariadne::{Color, ColorGenerator, Label, Report, ReportKind, Source};
use std::fmt;
use std::io::Write;

use crate::ast::Span;

/// The kind of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Syntax/parsing error
    Parse,
    /// Compilation error (semantic)
    Compile,
    /// Runtime error
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Parse => write!(f, "parse error"),
            ErrorKind::Compile => write!(f, "compile error"),
            ErrorKind::Runtime => write!(f, "runtime error"),
        }
    }
}

/// A source-located error with optional hints and notes.
#[derive(Debug, Clone)]
pub struct SourceError {
    /// The main error message
    pub message: String,
    /// The source location of the error
    pub span: Span,
    /// The kind of error
    pub kind: ErrorKind,
    /// An optional hint for fixing the error
    pub hint: Option<String>,
    /// Additional notes providing context
    pub notes: Vec<String>,
    /// Secondary labels pointing to related code
    pub labels: Vec<(Span, String)>,
}

impl SourceError {
    /// Create a new error at the given span.
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
            hint: None,
            notes: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Parse, message, span)
    }

    /// Create a compile error.
    pub fn compile(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Compile, message, span)
    }

    /// Create a runtime error.
    pub fn runtime(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Runtime, message, span)
    }

    /// Add a hint for how to fix the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Add a note providing additional context.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Add a secondary label pointing to related code.
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push((span, message.into()));
        self
    }

    /// Format the error using ariadne.
    pub fn format(&self, filename: &str, source: &str) -> String {
        let mut output = Vec::new();
        self.write_formatted(&mut output, filename, source)
            .expect("writing to Vec should not fail");
        String::from_utf8(output).expect("ariadne output should be valid UTF-8")
    }

    /// Write the formatted error to a writer.
    pub fn write_formatted<W: Write>(
        &self,
        writer: &mut W,
        filename: &str,
        source: &str,
    ) -> std::io::Result<()> {
        let primary_color = match self.kind {
            ErrorKind::Parse => Color::Red,
            ErrorKind::Compile => Color::Magenta,
            ErrorKind::Runtime => Color::Yellow,
        };

        let mut colors = ColorGenerator::new();

        let mut builder = Report::build(ReportKind::Error, filename, self.span.start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, self.span.start..self.span.end))
                    .with_message(&self.message)
                    .with_color(primary_color),
            );

        for (span, msg) in &self.labels {
            let color = colors.next();
            builder = builder.with_label(
                Label::new((filename, span.start..span.end))
                    .with_message(msg)
                    .with_color(color),
            );
        }

        if let Some(hint) = &self.hint {
            builder = builder.with_help(hint);
        }

        for note in &self.notes {
            builder = builder.with_note(note);
        }

        let report = builder.finish();
        report.write((filename, Source::from(source)), writer)
    }

    /// Print the error to stderr.
    pub fn eprint(&self, filename: &str, source: &str) {
        self.write_formatted(&mut std::io::stderr(), filename, source)
            .expect("writing to stderr should not fail");
    }
}

// Common error constructors

impl SourceError {
    /// Undefined variable error.
    pub fn undefined_variable(name: &str, span: Span) -> Self {
        Self::compile(format!("undefined variable {}", name), span)
            .with_hint(format!("bind `{}` with `{} := ...` before using it", name, name))
    }

    /// Invalid bind or assignment target.
    pub fn invalid_assignment_target(target: &str, span: Span) -> Self {
        Self::compile(format!("invalid assignment target: {}", target), span)
            .with_hint("only identifiers and index expressions can be assigned to")
    }

    /// Unknown operator error.
    pub fn unknown_operator(op: &str, span: Span) -> Self {
        Self::compile(format!("unknown operator {}", op), span)
    }
}

/// Helper to convert byte offset to line and column.
pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Print multiple errors to stderr.
pub fn eprint_errors(errors: &[SourceError], filename: &str, source: &str) {
    for error in errors {
        error.eprint(filename, source);
    }
}

/// Convert a chumsky parse error to a SourceError.
pub fn parse_error_to_source_error<T: std::fmt::Display + std::hash::Hash + Eq>(
    error: &chumsky::error::Simple<T>,
) -> SourceError {
    let span = Span::new(error.span().start, error.span().end);

    let message = if let Some(label) = error.label() {
        format!("expected {}", label)
    } else {
        let expected: Vec<String> = error
            .expected()
            .filter_map(|e| e.as_ref().map(|t| format!("`{}`", t)))
            .collect();

        let found = error
            .found()
            .map(|t| format!("`{}`", t))
            .unwrap_or_else(|| "end of input".to_string());

        if expected.is_empty() {
            format!("unexpected {}", found)
        } else if expected.len() == 1 {
            format!("expected {}, found {}", expected[0], found)
        } else if expected.len() <= 4 {
            format!("expected one of {}, found {}", expected.join(", "), found)
        } else {
            format!("unexpected {} (expected expression or statement)", found)
        }
    };

    let mut err = SourceError::parse(message, span);

    match error.reason() {
        chumsky::error::SimpleReason::Unclosed { span: unclosed_span, delimiter } => {
            err = err.with_label(
                Span::new(unclosed_span.start, unclosed_span.end),
                format!("unclosed `{}`", delimiter),
            );
            err = err.with_hint("make sure all brackets and delimiters are properly closed");
        }
        chumsky::error::SimpleReason::Custom(msg) => {
            err = err.with_note(msg.clone());
        }
        _ => {}
    }

    err
}
