//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

const SESSION_HELP: &str = "Target session by name or ID [default: default]";

/// Button-panel navigation for desktop UIs.
///
/// Load a UI scene into a managed navigation session and drive it with the
/// handful of keys a control panel offers: arrows, activate, exit, and the
/// shortcut keys your rules declare. Output is structured JSON.
#[derive(Debug, Parser)]
#[command(name = "padpilot", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a scene into a new navigation session
    #[command(after_help = "\
Examples:
  padpilot load scene.json                        # Default rules and config
  padpilot load scene.json --rules rules.json     # Classification rules
  padpilot load scene.json --rules r.json --strict  # Fail on the first bad rule
  padpilot load scene.json --name panel           # Named session")]
    Load(LoadArgs),

    /// Press a control-surface key
    #[command(after_long_help = "\
Standard keys (aliases in parentheses):
  up, down, left, right
  activate   (enter, select, ok)
  exit       (back, escape)
  confirm, cancel
  adjust_up, adjust_down

Anything else is looked up as a shortcut key declared by a rule, in the
current scope only. Shortcuts marked for confirmation wait for 'confirm'.

Examples:
  padpilot press right                  # Move focus right
  padpilot press activate               # Activate the focused element
  padpilot press exit                   # Leave the current scope
  padpilot press F2 -s panel            # Shortcut key in a named session")]
    Press(PressArgs),

    /// Get a snapshot of the navigation state
    #[command(after_help = "\
Examples:
  padpilot snapshot                     # Full JSON with every node
  padpilot snapshot --format compact    # JSON without the node list
  padpilot snapshot --format text       # Plain text, focused node marked with *")]
    Snapshot(SnapshotArgs),

    /// Show the control-surface page and its keys
    Page(SessionArgs),

    /// Hide a scene element
    #[command(after_help = "\
Targets are element names, automation ids, or element ids like 'e7'.

Examples:
  padpilot hide Volume
  padpilot hide e7 -s panel")]
    Hide(TargetArgs),

    /// Show a hidden scene element
    Show(TargetArgs),

    /// Remove a scene element and its subtree
    Remove(TargetArgs),

    /// Open a scene surface (popup, dialog)
    Open(SurfaceArgs),

    /// Close an open scene surface
    Close(SurfaceArgs),

    /// List all active sessions
    ListSessions,

    /// Kill a session
    Kill(SessionArgs),

    /// Show an end-to-end usage example
    Examples,

    /// Start the daemon process (usually auto-started)
    Daemon,

    /// Stop the daemon process
    Stop,
}

#[derive(Debug, clap::Args)]
pub struct LoadArgs {
    /// Scene file (JSON)
    pub scene: PathBuf,

    /// Classification rules file (JSON list)
    #[arg(short, long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Engine config file (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Reject the rule file on its first malformed rule
    #[arg(long)]
    pub strict: bool,

    /// Give this session a human-readable name
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct SessionArgs {
    #[arg(short, long, help = SESSION_HELP)]
    pub session: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct PressArgs {
    /// Standard key name or shortcut key
    pub key: String,

    #[arg(short, long, help = SESSION_HELP)]
    pub session: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct SnapshotArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = SnapshotFormat::Full)]
    pub format: SnapshotFormat,

    #[arg(short, long, help = SESSION_HELP)]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SnapshotFormat {
    /// Full JSON with every node
    Full,
    /// JSON without the node list
    Compact,
    /// Plain text only
    Text,
}

#[derive(Debug, clap::Args)]
pub struct TargetArgs {
    /// Element name, automation id, or element id
    pub target: String,

    #[arg(short, long, help = SESSION_HELP)]
    pub session: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct SurfaceArgs {
    /// Surface key from the scene file
    pub surface: String,

    #[arg(short, long, help = SESSION_HELP)]
    pub session: Option<String>,
}

/// End-to-end example text for the `examples` command.
pub const EXAMPLES_TEXT: &str = r#"End-to-end example: drive a window with a popup menu

# 1. Write a scene
cat > /tmp/scene.json <<'EOF'
{
  "main": {
    "kind": "window", "name": "Main", "bounds": [0, 0, 800, 600],
    "children": [
      { "kind": "button", "name": "Edit", "bounds": [10, 10, 60, 24], "opens": "edit" },
      { "kind": "button", "name": "Save", "bounds": [80, 10, 60, 24] },
      { "kind": "slider", "name": "Volume", "bounds": [10, 60, 200, 24],
        "range": { "value": 50, "min": 0, "max": 100 } }
    ]
  },
  "surfaces": [
    { "root": { "kind": "popup", "id": "edit", "bounds": [10, 36, 120, 60],
                "children": [
                  { "kind": "menu_item", "name": "Cut", "bounds": [12, 38, 116, 24] },
                  { "kind": "menu_item", "name": "Copy", "bounds": [12, 64, 116, 24] }
                ] },
      "anchor": "Edit" }
  ]
}
EOF

# 2. Give Save a shortcut key that asks for confirmation
cat > /tmp/rules.json <<'EOF'
[
  { "pattern": "**/Save:Button", "role": "leaf",
    "shortcut": { "key": "F2", "title": "Save", "confirm": true } }
]
EOF

# 3. Load it
padpilot load /tmp/scene.json --rules /tmp/rules.json --name demo

# 4. Focus starts on Edit. Open the popup and move inside it
padpilot press activate -s demo
padpilot press down -s demo
padpilot snapshot --format text -s demo

# 5. Leave the popup, back on Edit
padpilot press exit -s demo

# 6. Adjust the slider: enter interaction, nudge, keep the value
padpilot press down -s demo
padpilot press activate -s demo
padpilot press adjust_up -s demo
padpilot press confirm -s demo

# 7. Fire the shortcut and confirm it
padpilot press F2 -s demo
padpilot page -s demo
padpilot press confirm -s demo

# 8. Done
padpilot kill -s demo
"#;

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_load_parses_files_and_flags() {
        let cli = Cli::parse_from([
            "padpilot",
            "load",
            "scene.json",
            "--rules",
            "rules.json",
            "--strict",
            "--name",
            "panel",
        ]);

        match cli.command {
            Commands::Load(args) => {
                assert_eq!(args.scene.to_str(), Some("scene.json"));
                assert_eq!(args.rules.as_deref().and_then(|p| p.to_str()), Some("rules.json"));
                assert!(args.config.is_none());
                assert!(args.strict);
                assert_eq!(args.name.as_deref(), Some("panel"));
            }
            _ => panic!("Expected load command"),
        }
    }

    #[test]
    fn test_press_takes_session() {
        let cli = Cli::parse_from(["padpilot", "press", "F2", "-s", "panel"]);
        match cli.command {
            Commands::Press(args) => {
                assert_eq!(args.key, "F2");
                assert_eq!(args.session.as_deref(), Some("panel"));
            }
            _ => panic!("Expected press command"),
        }
    }
}
