use crate::session::SessionError;

/// Shortest post or comment the backend accepts, in characters.
pub const MIN_TEXT_CHARS: usize = 10;

/// Errors returned synchronously, before anything is sent to the backend.
/// Remote failures arrive later as events and go through the reporter.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TimelineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{0}")]
    Validation(String),
    #[error("a submission is already in progress")]
    Busy,
    #[error("the view has been closed")]
    Closed,
}

pub fn validate_texts(texts: &str) -> Result<(), TimelineError> {
    if texts.trim().is_empty() {
        return Err(TimelineError::Validation(format!(
            "Please write at least {MIN_TEXT_CHARS} characters."
        )));
    }
    if texts.chars().count() < MIN_TEXT_CHARS {
        return Err(TimelineError::Validation(format!(
            "Enter {MIN_TEXT_CHARS} characters or more."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_rejected() {
        assert!(matches!(
            validate_texts("   "),
            Err(TimelineError::Validation(_))
        ));
    }

    #[test]
    fn short_text_is_rejected() {
        assert!(matches!(
            validate_texts("too short"),
            Err(TimelineError::Validation(_))
        ));
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert!(validate_texts("こんにちは、みなさん！").is_ok());
        assert!(validate_texts("こんにちは").is_err());
    }
}
