//! Navigation commands and the standard control-surface keys.
//!
//! The control surface only knows key names. This module maps those names to
//! [`NavCommand`]s and declares the built-in key titles and pages the engine
//! defines at startup.

use serde::{Deserialize, Serialize};

use crate::feedback::{page_layout, PageLayout};
use crate::geometry::{AdjustDirection, Direction};

/// Page shown while navigating normally.
pub const PAGE_NAV: &str = "nav";

/// Page shown in interactive adjustment mode.
pub const PAGE_ADJUST: &str = "adjust";

/// Page shown while a shortcut waits for confirmation.
pub const PAGE_CONFIRM: &str = "confirm";

/// A discrete command driven by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "direction", rename_all = "snake_case")]
pub enum NavCommand {
    Move(Direction),
    Activate,
    Exit,
    Confirm,
    Cancel,
    AdjustValue(AdjustDirection),
}

/// Keys every control surface gets, independent of rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardKey {
    Up,
    Down,
    Left,
    Right,
    Activate,
    Exit,
    Confirm,
    Cancel,
    AdjustUp,
    AdjustDown,
}

impl StandardKey {
    pub const ALL: [StandardKey; 10] = [
        StandardKey::Up,
        StandardKey::Down,
        StandardKey::Left,
        StandardKey::Right,
        StandardKey::Activate,
        StandardKey::Exit,
        StandardKey::Confirm,
        StandardKey::Cancel,
        StandardKey::AdjustUp,
        StandardKey::AdjustDown,
    ];

    /// Canonical key name used on the wire.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            StandardKey::Up => "up",
            StandardKey::Down => "down",
            StandardKey::Left => "left",
            StandardKey::Right => "right",
            StandardKey::Activate => "activate",
            StandardKey::Exit => "exit",
            StandardKey::Confirm => "confirm",
            StandardKey::Cancel => "cancel",
            StandardKey::AdjustUp => "adjust_up",
            StandardKey::AdjustDown => "adjust_down",
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            StandardKey::Up => "Up",
            StandardKey::Down => "Down",
            StandardKey::Left => "Left",
            StandardKey::Right => "Right",
            StandardKey::Activate => "Select",
            StandardKey::Exit => "Back",
            StandardKey::Confirm => "OK",
            StandardKey::Cancel => "Cancel",
            StandardKey::AdjustUp => "More",
            StandardKey::AdjustDown => "Less",
        }
    }

    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            StandardKey::Up => "arrow-up",
            StandardKey::Down => "arrow-down",
            StandardKey::Left => "arrow-left",
            StandardKey::Right => "arrow-right",
            StandardKey::Activate => "select",
            StandardKey::Exit => "back",
            StandardKey::Confirm => "check",
            StandardKey::Cancel => "cross",
            StandardKey::AdjustUp => "plus",
            StandardKey::AdjustDown => "minus",
        }
    }

    /// Look up a key by name or common alias (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        let key = match lower.as_str() {
            "up" | "arrowup" => StandardKey::Up,
            "down" | "arrowdown" => StandardKey::Down,
            "left" | "arrowleft" => StandardKey::Left,
            "right" | "arrowright" => StandardKey::Right,
            "activate" | "enter" | "select" | "ok" => StandardKey::Activate,
            "exit" | "escape" | "esc" | "back" => StandardKey::Exit,
            "confirm" | "yes" => StandardKey::Confirm,
            "cancel" | "no" => StandardKey::Cancel,
            "adjust_up" | "adjust-up" | "plus" | "+" => StandardKey::AdjustUp,
            "adjust_down" | "adjust-down" | "minus" | "-" => StandardKey::AdjustDown,
            _ => return None,
        };
        Some(key)
    }

    #[must_use]
    pub fn command(self) -> NavCommand {
        match self {
            StandardKey::Up => NavCommand::Move(Direction::Up),
            StandardKey::Down => NavCommand::Move(Direction::Down),
            StandardKey::Left => NavCommand::Move(Direction::Left),
            StandardKey::Right => NavCommand::Move(Direction::Right),
            StandardKey::Activate => NavCommand::Activate,
            StandardKey::Exit => NavCommand::Exit,
            StandardKey::Confirm => NavCommand::Confirm,
            StandardKey::Cancel => NavCommand::Cancel,
            StandardKey::AdjustUp => NavCommand::AdjustValue(AdjustDirection::Up),
            StandardKey::AdjustDown => NavCommand::AdjustValue(AdjustDirection::Down),
        }
    }
}

/// Whether a key name is taken by a standard key (including aliases).
#[must_use]
pub fn is_reserved_key(name: &str) -> bool {
    StandardKey::from_name(name).is_some()
}

/// The built-in pages, defined once when the engine starts.
#[must_use]
pub fn builtin_pages() -> Vec<(&'static str, PageLayout)> {
    vec![
        (
            PAGE_NAV,
            page_layout(&[
                &["", "up", "", "", "exit"],
                &["left", "activate", "right", "", ""],
                &["", "down", "", "", ""],
            ]),
        ),
        (
            PAGE_ADJUST,
            page_layout(&[
                &["", "adjust_up", "", "", "cancel"],
                &["", "", "", "", ""],
                &["", "adjust_down", "", "", "confirm"],
            ]),
        ),
        (
            PAGE_CONFIRM,
            page_layout(&[
                &["", "", "", "", ""],
                &["confirm", "", "", "", "cancel"],
                &["", "", "", "", ""],
            ]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for key in StandardKey::ALL {
            assert_eq!(StandardKey::from_name(key.name()), Some(key));
        }
    }

    #[test]
    fn aliases_are_case_insensitive() {
        assert_eq!(StandardKey::from_name("Enter"), Some(StandardKey::Activate));
        assert_eq!(StandardKey::from_name("ESC"), Some(StandardKey::Exit));
        assert_eq!(StandardKey::from_name("ArrowUp"), Some(StandardKey::Up));
        assert_eq!(StandardKey::from_name("save"), None);
    }

    #[test]
    fn arrows_map_to_moves() {
        assert_eq!(
            StandardKey::Left.command(),
            NavCommand::Move(Direction::Left)
        );
        assert_eq!(
            StandardKey::AdjustDown.command(),
            NavCommand::AdjustValue(AdjustDirection::Down)
        );
    }

    #[test]
    fn builtin_pages_only_reference_standard_keys() {
        for (_, layout) in builtin_pages() {
            for name in layout.iter().flatten().flatten() {
                assert!(is_reserved_key(name), "unknown key {name} on built-in page");
            }
        }
    }

    #[test]
    fn command_serializes_with_tag() {
        let json = serde_json::to_string(&NavCommand::Move(Direction::Up)).unwrap();
        assert_eq!(json, r#"{"command":"move","direction":"up"}"#);
        let json = serde_json::to_string(&NavCommand::Activate).unwrap();
        assert_eq!(json, r#"{"command":"activate"}"#);
    }
}
