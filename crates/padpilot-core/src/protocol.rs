//! Protocol types for CLI-daemon communication.
//!
//! One JSON object per line in each direction. Scene, rule and config files
//! are read by the CLI and sent as their contents, so the daemon never touches
//! the caller's working directory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::CommandOutcome;
use crate::error::ApiError;
use crate::feedback::{KeyDef, PageLayout};
use crate::snapshot::NavSnapshot;

/// A request from CLI to daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub command: Command,
}

/// Commands the daemon can execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Host a scene in a new navigation session.
    Load {
        /// Scene JSON.
        scene: String,
        /// Rule list JSON.
        rules: Option<String>,
        /// Engine config JSON.
        config: Option<String>,
        /// Reject the first malformed rule instead of skipping it.
        #[serde(default)]
        strict: bool,
        session_name: Option<String>,
    },
    /// Shut a session's engine down and drop it.
    Kill { session: Option<String> },
    /// Get a snapshot of the navigation state.
    Snapshot {
        session: Option<String>,
        format: Option<SnapshotFormat>,
    },
    /// Press a control-surface key: a standard key or a shortcut.
    Press {
        key: String,
        session: Option<String>,
    },
    /// Hide a scene element.
    Hide {
        target: String,
        session: Option<String>,
    },
    /// Show a hidden scene element.
    Show {
        target: String,
        session: Option<String>,
    },
    /// Remove a scene element and its subtree.
    Remove {
        target: String,
        session: Option<String>,
    },
    /// Open a scene surface by its key.
    Open {
        surface: String,
        session: Option<String>,
    },
    /// Close a scene surface by its key.
    Close {
        surface: String,
        session: Option<String>,
    },
    /// Current control-surface state.
    Page { session: Option<String> },
    /// List all active sessions.
    ListSessions,
    /// Shutdown the daemon gracefully.
    Shutdown,
}

/// Snapshot output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    /// Full JSON with every node.
    #[default]
    Full,
    /// JSON without the node list.
    Compact,
    /// Plain text only.
    Text,
}

/// A response from daemon to CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl Response {
    pub fn success(id: impl Into<String>, data: ResponseData) -> Self {
        Self {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, error: ApiError) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Response payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    /// Full or compact navigation snapshot.
    NavState(NavSnapshot),
    /// Text-format snapshot.
    Snapshot {
        format: SnapshotFormat,
        content: String,
    },
    /// Session created response.
    SessionCreated { session_id: String, message: String },
    /// List of active sessions.
    Sessions { sessions: Vec<SessionInfo> },
    /// What a key press did, and where focus ended up.
    Pressed {
        key: String,
        outcome: CommandOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        focused: Option<String>,
    },
    /// Control-surface state: current page, its grid and every defined key.
    Panel {
        page: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        layout: Option<PageLayout>,
        keys: BTreeMap<String, KeyDef>,
    },
    /// Generic success message.
    Ok { message: String },
}

/// Information about an active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub name: Option<String>,
    pub created_at: String,
    /// Registered surfaces.
    pub surfaces: usize,
    /// Tracked nodes.
    pub nodes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_uses_action_tag() {
        let req = Request {
            id: "1".into(),
            command: Command::Press {
                key: "up".into(),
                session: None,
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""action":"press""#));
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn load_strict_defaults_to_false() {
        let json = r#"{"action":"load","scene":"{}","rules":null,"config":null,"session_name":null}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, Command::Load { strict: false, .. }));
    }

    #[test]
    fn pressed_response_carries_outcome() {
        let resp = Response::success(
            "7",
            ResponseData::Pressed {
                key: "right".into(),
                outcome: CommandOutcome::NoCandidate,
                focused: None,
            },
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"pressed""#));
        assert!(json.contains(r#""outcome":"no_candidate""#));
        assert!(!json.contains("focused"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn error_response_has_no_data() {
        let resp = Response::error("x", ApiError::no_sessions());
        assert!(!resp.success);
        assert!(resp.data.is_none());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("SESSION_NOT_FOUND"));
    }
}
