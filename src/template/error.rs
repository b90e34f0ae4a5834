use std::fmt;

use parking_lot::Mutex;

use super::ast::Span;

/// A compilation error with source location.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub span: Span,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexer,
    Parser,
    Compiler,
    /// Definition-level problems: redefinitions, bad regions, bad headers.
    Group,
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind: ErrorKind::Lexer,
        }
    }

    pub fn parser(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind: ErrorKind::Parser,
        }
    }

    pub fn compiler(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind: ErrorKind::Compiler,
        }
    }

    pub fn group(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind: ErrorKind::Group,
        }
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        format!(
            "[{}] line {}:{}: {}",
            match self.kind {
                ErrorKind::Lexer => "lexer",
                ErrorKind::Parser => "parser",
                ErrorKind::Compiler => "compiler",
                ErrorKind::Group => "group",
            },
            line,
            col,
            self.message,
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Recoverable problems raised while rendering. Rendering continues with
/// `null` in place of the failed sub-expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("attribute {0} isn't defined")]
    NoSuchAttribute(String),
    #[error("attribute {name} isn't defined for template {template}")]
    NoSuchNamedArgument { name: String, template: String },
    #[error("could not pass through undefined attribute {0}")]
    NoSuchAttributePassThrough(String),
    #[error("no such template: {0}")]
    NoSuchTemplate(String),
    #[error("no such template: super.{0}")]
    NoImportedTemplate(String),
    #[error("no such property or can't access: {0}")]
    NoSuchProperty(String),
    #[error("passed {passed} arg(s) to template {template} with {declared} declared arg(s)")]
    ArgumentCountMismatch {
        passed: usize,
        template: String,
        declared: usize,
    },
    #[error("iterating through {values} values in zip map but template has {declared} declared arguments")]
    MapArgumentCountMismatch { values: usize, declared: usize },
    #[error("missing argument definitions")]
    MissingFormalArguments,
    #[error("function {function} expects a string not {found}")]
    ExpectingString { function: String, found: String },
}

// ── Listener messages ──────────────────────────────────────────────

/// A compile error located in a named source (group file or template).
#[derive(Debug, Clone, PartialEq)]
pub struct CompileReport {
    pub source_name: String,
    pub line: usize,
    pub col: usize,
    pub error: CompileError,
}

impl fmt::Display for CompileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}: {}", self.source_name, self.line, self.col, self.error.message)
    }
}

/// A runtime error together with where it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeMessage {
    pub error: RuntimeError,
    /// Template names from the outermost render down to the failing one.
    pub call_stack: Vec<String>,
    /// Instruction address in the failing template.
    pub ip: usize,
    /// Line and column inside the failing template's source.
    pub location: Option<(usize, usize)>,
}

impl fmt::Display for RuntimeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context [{}]", self.call_stack.join(" "))?;
        if let Some((line, col)) = self.location {
            write!(f, " {line}:{col}")?;
        }
        write!(f, " {}", self.error)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IoMessage {
    pub path: String,
    pub message: String,
}

impl fmt::Display for IoMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error reading {}: {}", self.path, self.message)
    }
}

/// Every kind of report an [`ErrorListener`] receives.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateMessage {
    Compile(CompileReport),
    Runtime(RuntimeMessage),
    Io(IoMessage),
    Internal(String),
}

impl fmt::Display for TemplateMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateMessage::Compile(m) => write!(f, "{m}"),
            TemplateMessage::Runtime(m) => write!(f, "{m}"),
            TemplateMessage::Io(m) => write!(f, "{m}"),
            TemplateMessage::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

/// Receives compile-time, run-time, I/O and internal error reports.
pub trait ErrorListener: Send + Sync {
    fn compile_time_error(&self, msg: &CompileReport);
    fn run_time_error(&self, msg: &RuntimeMessage);
    fn io_error(&self, msg: &IoMessage);
    fn internal_error(&self, msg: &str);
}

/// Default listener: forwards every report to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl ErrorListener for LogListener {
    fn compile_time_error(&self, msg: &CompileReport) {
        log::error!("{msg}");
    }

    fn run_time_error(&self, msg: &RuntimeMessage) {
        log::warn!("{msg}");
    }

    fn io_error(&self, msg: &IoMessage) {
        log::error!("{msg}");
    }

    fn internal_error(&self, msg: &str) {
        log::error!("internal error: {msg}");
    }
}

/// Collects reports in memory, in arrival order.
#[derive(Debug, Default)]
pub struct ErrorBuffer {
    messages: Mutex<Vec<TemplateMessage>>,
}

impl ErrorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<TemplateMessage> {
        self.messages.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    /// Runtime errors only, without their context prefix.
    pub fn runtime_errors(&self) -> Vec<RuntimeError> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                TemplateMessage::Runtime(r) => Some(r.error.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, msg: TemplateMessage) {
        self.messages.lock().push(msg);
    }
}

impl fmt::Display for ErrorBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for msg in self.messages.lock().iter() {
            writeln!(f, "{msg}")?;
        }
        Ok(())
    }
}

impl ErrorListener for ErrorBuffer {
    fn compile_time_error(&self, msg: &CompileReport) {
        self.push(TemplateMessage::Compile(msg.clone()));
    }

    fn run_time_error(&self, msg: &RuntimeMessage) {
        self.push(TemplateMessage::Runtime(msg.clone()));
    }

    fn io_error(&self, msg: &IoMessage) {
        self.push(TemplateMessage::Io(msg.clone()));
    }

    fn internal_error(&self, msg: &str) {
        self.push(TemplateMessage::Internal(msg.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_with_source_reports_line_and_column() {
        let src = "a\nbc<x>";
        let err = CompileError::parser("unexpected token", Span::new(4, 5));
        assert_eq!(err.format_with_source(src), "[parser] line 2:3: unexpected token");
    }

    #[test]
    fn runtime_message_display() {
        let msg = RuntimeMessage {
            error: RuntimeError::NoSuchAttribute("x".into()),
            call_stack: vec!["/t".into(), "/u".into()],
            ip: 0,
            location: Some((1, 1)),
        };
        assert_eq!(msg.to_string(), "context [/t /u] 1:1 attribute x isn't defined");
    }

    #[test]
    fn argument_count_message() {
        let err = RuntimeError::ArgumentCountMismatch {
            passed: 1,
            template: "/t".into(),
            declared: 2,
        };
        assert_eq!(err.to_string(), "passed 1 arg(s) to template /t with 2 declared arg(s)");
    }

    #[test]
    fn buffer_collects_in_order() {
        let buf = ErrorBuffer::new();
        buf.internal_error("boom");
        buf.io_error(&IoMessage {
            path: "a.stg".into(),
            message: "not found".into(),
        });
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.to_string(), "internal error: boom\nerror reading a.stg: not found\n");
        buf.clear();
        assert!(buf.is_empty());
    }
}
