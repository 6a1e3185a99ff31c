use thiserror::Error;

/// Errors raised while reading results data.
///
/// The two kinds are disjoint. The format dispatcher treats
/// `WrongFileFormat` as "try the next reader" and passes `InvalidData`
/// straight back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The input is not in a format this reader understands
    #[error("wrong file format: {0}")]
    WrongFileFormat(String),

    /// The input is in the expected format but its contents are inconsistent
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl ParseError {
    pub fn wrong_format(message: impl Into<String>) -> Self {
        ParseError::WrongFileFormat(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ParseError::InvalidData(message.into())
    }

    pub fn is_wrong_format(&self) -> bool {
        matches!(self, ParseError::WrongFileFormat(_))
    }

    /// The human-readable message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            ParseError::WrongFileFormat(m) | ParseError::InvalidData(m) => m,
        }
    }
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let wrong = ParseError::wrong_format("not CSV");
        assert!(wrong.is_wrong_format());
        assert_eq!(wrong.message(), "not CSV");
        assert_eq!(wrong.to_string(), "wrong file format: not CSV");

        let invalid = ParseError::invalid("bad row");
        assert!(!invalid.is_wrong_format());
        assert_eq!(invalid.to_string(), "invalid data: bad row");
    }
}
