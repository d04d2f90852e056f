//! Protocol error types with actionable suggestions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for protocol responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SessionNotFound,
    CommandFailed,
    InvalidInput,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::SessionNotFound => write!(f, "SESSION_NOT_FOUND"),
            ErrorCode::CommandFailed => write!(f, "COMMAND_FAILED"),
            ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// An error response with a hint on what to do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (hint: {})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn session_not_found(session_id: &str) -> Self {
        Self {
            code: ErrorCode::SessionNotFound,
            message: format!("Session '{}' not found", session_id),
            suggestion: Some("Run 'padpilot list-sessions' to see available sessions".into()),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::CommandFailed,
            message: message.into(),
            suggestion: Some("Run 'padpilot snapshot --format text' to inspect the session".into()),
        }
    }

    /// Create a command failed error with a custom suggestion.
    pub fn command_failed_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            code: ErrorCode::CommandFailed,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            suggestion: Some("Check the command syntax and try again".into()),
        }
    }

    /// Create an invalid input error with a custom suggestion.
    pub fn invalid_input_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn duplicate_session_name(name: &str) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: format!("Session name '{}' already exists", name),
            suggestion: Some(format!(
                "Choose a different name with --name, or kill the existing '{}' session first",
                name
            )),
        }
    }

    pub fn no_sessions() -> Self {
        Self {
            code: ErrorCode::SessionNotFound,
            message: "No active sessions".to_string(),
            suggestion: Some("Run 'padpilot load <scene.json>' to create a session".into()),
        }
    }

    /// Create an error when the session limit is reached.
    pub fn session_limit_reached(max: usize) -> Self {
        Self {
            code: ErrorCode::CommandFailed,
            message: format!("Maximum session limit ({}) reached", max),
            suggestion: Some(
                "Kill an existing session with 'padpilot kill' before creating a new one".into(),
            ),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InternalError,
            message: message.into(),
            suggestion: Some("This is an internal error. Please report it if it persists.".into()),
        }
    }

    /// The scene file could not be parsed or built.
    pub fn scene_load_failed(error: &str) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: format!("Failed to load scene: {}", error),
            suggestion: Some(
                "A scene needs a 'main' element tree; run 'padpilot examples' for a complete one"
                    .into(),
            ),
        }
    }

    /// The rule list was rejected.
    pub fn rules_load_failed(error: &str) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: format!("Failed to load rules: {}", error),
            suggestion: Some(
                "Fix the rule pattern, or load without --strict to skip malformed rules".into(),
            ),
        }
    }

    /// No scene element matches a target.
    pub fn unknown_target(target: &str) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: format!("No element matches '{}'", target),
            suggestion: Some(
                "Targets are 'e<id>', an automation id or a name; run 'padpilot snapshot --format text' to see what exists"
                    .into(),
            ),
        }
    }

    /// The scene declares no surface under that key.
    pub fn unknown_surface(surface: &str) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: format!("No surface named '{}'", surface),
            suggestion: Some(
                "Surfaces are keyed by their root's automation id or name in the scene file"
                    .into(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// All error constructors must provide a suggestion.
    fn assert_has_suggestion(err: &ApiError, context: &str) {
        assert!(
            err.suggestion.is_some(),
            "{} should have a suggestion, but got None",
            context
        );
    }

    #[test]
    fn test_session_not_found_has_suggestion() {
        let err = ApiError::session_not_found("test-123");
        assert_has_suggestion(&err, "session_not_found");
        assert!(err.suggestion.as_ref().unwrap().contains("list-sessions"));
        assert!(err.message.contains("test-123"));
    }

    #[test]
    fn test_command_failed_has_suggestion() {
        let err = ApiError::command_failed("something broke");
        assert_has_suggestion(&err, "command_failed");
        assert!(err.suggestion.as_ref().unwrap().contains("snapshot"));
        assert!(err.message.contains("something broke"));
    }

    #[test]
    fn test_invalid_input_has_suggestion() {
        let err = ApiError::invalid_input("bad argument");
        assert_has_suggestion(&err, "invalid_input");
    }

    #[test]
    fn test_invalid_input_with_custom_suggestion() {
        let err =
            ApiError::invalid_input_with_suggestion("unknown key", "Try up, down, activate or exit");
        assert_has_suggestion(&err, "invalid_input_with_suggestion");
        assert!(err.suggestion.as_ref().unwrap().contains("activate"));
    }

    #[test]
    fn test_duplicate_session_name_has_suggestion() {
        let err = ApiError::duplicate_session_name("my-session");
        assert_has_suggestion(&err, "duplicate_session_name");
        assert!(err.message.contains("my-session"));
    }

    #[test]
    fn test_no_sessions_has_suggestion() {
        let err = ApiError::no_sessions();
        assert_has_suggestion(&err, "no_sessions");
        assert!(err.suggestion.as_ref().unwrap().contains("padpilot load"));
    }

    #[test]
    fn test_internal_has_suggestion() {
        let err = ApiError::internal("unexpected state");
        assert_has_suggestion(&err, "internal");
    }

    #[test]
    fn test_scene_load_failed_has_suggestion() {
        let err = ApiError::scene_load_failed("missing field `main`");
        assert_has_suggestion(&err, "scene_load_failed");
        assert!(err.message.contains("missing field"));
        assert!(err.suggestion.as_ref().unwrap().contains("examples"));
    }

    #[test]
    fn test_rules_load_failed_has_suggestion() {
        let err = ApiError::rules_load_failed("rule 2: empty pattern");
        assert_has_suggestion(&err, "rules_load_failed");
        assert!(matches!(err.code, ErrorCode::InvalidInput));
        assert!(err.suggestion.as_ref().unwrap().contains("--strict"));
    }

    #[test]
    fn test_unknown_target_has_suggestion() {
        let err = ApiError::unknown_target("Volume");
        assert_has_suggestion(&err, "unknown_target");
        assert!(err.message.contains("Volume"));
    }

    #[test]
    fn test_unknown_surface_has_suggestion() {
        let err = ApiError::unknown_surface("prefs");
        assert_has_suggestion(&err, "unknown_surface");
        assert!(err.message.contains("prefs"));
    }

    #[test]
    fn test_session_limit_reached_has_suggestion() {
        let err = ApiError::session_limit_reached(8);
        assert_has_suggestion(&err, "session_limit_reached");
        assert!(err.message.contains('8'));
        assert!(err.suggestion.as_ref().unwrap().contains("padpilot kill"));
    }

    #[test]
    fn test_display_format_with_suggestion() {
        let err = ApiError::session_not_found("abc");
        let display = format!("{}", err);
        assert!(display.contains("[SESSION_NOT_FOUND]"));
        assert!(display.contains("abc"));
        assert!(display.contains("(hint:"));
    }

    #[test]
    fn test_json_serialization() {
        let err = ApiError::session_not_found("test-session");
        let json = serde_json::to_string(&err).unwrap();

        // Verify all fields are present
        assert!(json.contains("\"code\""));
        assert!(json.contains("\"message\""));
        assert!(json.contains("\"suggestion\""));
        assert!(json.contains("SESSION_NOT_FOUND"));
    }

    #[test]
    fn test_json_deserialization() {
        let json =
            r#"{"code":"SESSION_NOT_FOUND","message":"Session 'x' not found","suggestion":"hint"}"#;
        let err: ApiError = serde_json::from_str(json).unwrap();
        assert!(matches!(err.code, ErrorCode::SessionNotFound));
        assert_eq!(err.message, "Session 'x' not found");
        assert_eq!(err.suggestion, Some("hint".to_string()));
    }
}
