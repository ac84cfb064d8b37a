//! Delivery failure classification
//!
//! The platform reports errors as opaque strings. Two phrases mean the
//! recipient can never be reached again; everything else is transient and
//! is left to the caller's retry policy.

use crate::gateway::SendError;

/// Phrase reported when the recipient has blocked the bot
pub const BLOCKED_PHRASE: &str = "bot was blocked by the user";

/// Phrase reported when the recipient's account was deactivated
pub const DEACTIVATED_PHRASE: &str = "user is deactivated";

/// Default permanent-failure phrases
pub fn default_permanent_phrases() -> Vec<String> {
    vec![BLOCKED_PHRASE.to_string(), DEACTIVATED_PHRASE.to_string()]
}

/// Classification of a failed send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Recipient unreachable forever; triggers session teardown
    Permanent,
    /// Anything else; logged and surfaced through the completion callback
    Transient,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Permanent => "permanent",
            FailureClass::Transient => "transient",
        }
    }
}

/// Classify a send error against the configured permanent phrases
pub fn classify(err: &SendError, permanent_phrases: &[String]) -> FailureClass {
    if permanent_phrases
        .iter()
        .any(|phrase| err.message.contains(phrase.as_str()))
    {
        FailureClass::Permanent
    } else {
        FailureClass::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_is_permanent() {
        let err = SendError::new("Forbidden: bot was blocked by the user");
        assert_eq!(
            classify(&err, &default_permanent_phrases()),
            FailureClass::Permanent
        );
    }

    #[test]
    fn test_deactivated_is_permanent() {
        let err = SendError::new("Forbidden: user is deactivated");
        assert_eq!(
            classify(&err, &default_permanent_phrases()),
            FailureClass::Permanent
        );
    }

    #[test]
    fn test_anything_else_is_transient() {
        let err = SendError::new("Too Many Requests: retry after 30");
        assert_eq!(
            classify(&err, &default_permanent_phrases()),
            FailureClass::Transient
        );
    }
}
