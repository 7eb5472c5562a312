//! Error types for the bastion-model crate.

/// Errors that can occur while turning template text into a [`TemplateModel`](crate::TemplateModel).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The document is not well-formed JSON or YAML. Carries the parser's own message.
    #[error("{0}")]
    Syntax(String),

    /// The document parsed but does not have the shape of a template
    /// (not a mapping, no `Resources`, a resource without `Type`, ...).
    #[error("{0}")]
    Structure(String),

    /// The parameter overrides text could not be parsed.
    #[error("JSON Parameter values parse error: {0}")]
    Parameters(String),
}

/// Convenience alias for `Result<T, ParseError>`.
pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_displays_parser_text_verbatim() {
        let err = ParseError::Syntax("expected value at line 1 column 1".to_string());
        assert_eq!(err.to_string(), "expected value at line 1 column 1");
    }

    #[test]
    fn parameters_error_is_prefixed() {
        let err = ParseError::Parameters("trailing comma".to_string());
        assert_eq!(
            err.to_string(),
            "JSON Parameter values parse error: trailing comma"
        );
    }
}
