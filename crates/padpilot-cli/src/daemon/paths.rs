//! Socket and PID file path resolution.
//!
//! Priority for socket directory:
//! 1. `PADPILOT_SOCKET_DIR` (explicit override)
//! 2. `XDG_RUNTIME_DIR/padpilot` (Linux standard)
//! 3. `~/.padpilot` (home directory fallback)
//! 4. `/tmp/padpilot` (last resort)
//!
//! `PADPILOT_SESSION` (default: "default") selects which daemon instance the
//! CLI talks to. Each instance gets `{socket_dir}/{session}.sock` and a PID
//! file next to it; one daemon can then host many navigation sessions.

use std::env;
use std::path::PathBuf;

/// Get current session name from env or default.
pub fn get_session() -> String {
    env::var("PADPILOT_SESSION").unwrap_or_else(|_| "default".to_string())
}

/// Get socket directory with priority fallback.
///
/// Priority:
/// 1. `PADPILOT_SOCKET_DIR` (explicit override, ignores empty string)
/// 2. `XDG_RUNTIME_DIR/padpilot` (Linux standard, ignores empty string)
/// 3. `~/.padpilot` (home directory fallback)
/// 4. System temp dir (last resort)
pub fn get_socket_dir() -> PathBuf {
    // 1. Explicit override (ignore empty)
    if let Ok(dir) = env::var("PADPILOT_SOCKET_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    // 2. XDG_RUNTIME_DIR (Linux standard, ignore empty)
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        if !runtime_dir.is_empty() {
            return PathBuf::from(runtime_dir).join("padpilot");
        }
    }

    // 3. Home directory fallback
    if let Some(home) = dirs::home_dir() {
        return home.join(".padpilot");
    }

    // 4. Last resort: temp dir
    env::temp_dir().join("padpilot")
}

/// Validate a session name to prevent path traversal attacks.
///
/// Session names must:
/// - Be non-empty
/// - Contain only alphanumeric characters, hyphens, and underscores
/// - Not start with a hyphen (could be interpreted as option)
///
/// Returns the sanitized name or a safe default if invalid.
pub(crate) fn sanitize_session_name(name: &str) -> String {
    // Check if valid: non-empty, safe chars, doesn't start with hyphen
    let is_valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if is_valid {
        name.to_string()
    } else {
        // Log warning and use safe fallback
        tracing::warn!(
            "Invalid session name '{}', using 'default'. Names must contain only alphanumeric, hyphen, underscore.",
            name
        );
        "default".to_string()
    }
}

/// Get socket path for a session.
///
/// If no session is provided, uses the current session from `get_session()`.
/// Session names are sanitized to prevent path traversal.
pub fn get_socket_path(session: Option<&str>) -> PathBuf {
    let sess = session.map(String::from).unwrap_or_else(get_session);
    let safe_sess = sanitize_session_name(&sess);
    get_socket_dir().join(format!("{}.sock", safe_sess))
}

/// Get PID file path for a session.
///
/// If no session is provided, uses the current session from `get_session()`.
/// Session names are sanitized to prevent path traversal.
pub fn get_pid_path(session: Option<&str>) -> PathBuf {
    let sess = session.map(String::from).unwrap_or_else(get_session);
    let safe_sess = sanitize_session_name(&sess);
    get_socket_dir().join(format!("{}.pid", safe_sess))
}

/// Ensure socket directory exists with secure permissions (0700 on Unix).
pub fn ensure_socket_dir() -> std::io::Result<()> {
    let dir = get_socket_dir();
    std::fs::create_dir_all(&dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}
