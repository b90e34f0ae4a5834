use std::fmt;

/// Errors surfaced through `Result` by the public API. Recoverable render
/// problems never appear here; they go to the group's
/// [`ErrorListener`](crate::template::error::ErrorListener) and rendering
/// continues.
#[derive(Debug, thiserror::Error)]
pub enum TempletError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A template or group failed to compile. The message lists every
    /// reported problem.
    #[error("compile error: {0}")]
    Compile(String),
    #[error("no such template: {0}")]
    NoSuchTemplate(String),
    #[error("invalid attribute name: {0}")]
    InvalidAttributeName(String),
    /// `add` on a template with declared arguments, for a name it doesn't
    /// declare.
    #[error("no such attribute: {0}")]
    NoSuchAttribute(String),
    /// Malformed bytecode or runaway recursion. Aborts the render.
    #[error("internal error: {0}")]
    Internal(String),
    #[error("write error")]
    Write(#[from] fmt::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            TempletError::NoSuchTemplate("/t".into()).to_string(),
            "no such template: /t"
        );
        assert_eq!(
            TempletError::InvalidAttributeName("a.b".into()).to_string(),
            "invalid attribute name: a.b"
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(TempletError::from(io).to_string(), "I/O error: missing");
    }
}
