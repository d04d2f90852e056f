//! Unix socket server for the daemon process.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use padpilot_core::error::ApiError;
use padpilot_core::protocol::{Command, Request, Response, ResponseData, SnapshotFormat};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::daemon::paths;
use crate::daemon::session::{scene_error, Host, SessionId, SessionManager};

/// Maximum number of concurrent client connections to prevent resource exhaustion.
const MAX_CONNECTIONS: usize = 100;

/// How long the daemon waits with no sessions before auto-shutdown (5 minutes).
const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How often to check for idle shutdown condition.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for in-flight connections to complete during shutdown.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The daemon server that listens for client connections.
pub struct DaemonServer {
    listener: UnixListener,
    socket_path: PathBuf,
    pid_path: PathBuf,
    sessions: Arc<SessionManager>,
    /// Semaphore to limit concurrent connections and prevent resource exhaustion.
    connection_semaphore: Arc<Semaphore>,
    /// Shutdown signal for graceful termination (allows Drop to run and clean up files).
    shutdown: Arc<Notify>,
}

impl DaemonServer {
    /// Create a new daemon server bound to the default socket path.
    pub async fn bind() -> Result<Self> {
        let socket_path = paths::get_socket_path(None);
        let pid_path = paths::get_pid_path(None);
        Self::bind_to(socket_path, pid_path).await
    }

    /// Create a new daemon server bound to a specific socket path.
    ///
    /// Uses a bind-first approach to avoid TOCTOU race conditions:
    /// 1. Try to bind directly
    /// 2. If socket in use, check PID file to see if daemon is alive
    /// 3. If daemon dead, remove stale socket and retry
    /// 4. If daemon alive, return error
    pub async fn bind_to(socket_path: PathBuf, pid_path: PathBuf) -> Result<Self> {
        // Ensure socket directory exists with secure permissions (0700)
        paths::ensure_socket_dir().context("Failed to create socket directory")?;

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create socket directory for {:?}", socket_path)
            })?;
        }

        // Helper to write PID file immediately after successful bind.
        // This closes the race window where another process could see our socket
        // but not find a valid PID file, incorrectly assuming we're dead.
        let write_pid = |pid_path: &PathBuf| -> Result<()> {
            std::fs::write(pid_path, std::process::id().to_string())
                .with_context(|| format!("Failed to write PID file: {:?}", pid_path))
        };

        // Try to bind directly (avoid TOCTOU race)
        let listener = match UnixListener::bind(&socket_path) {
            Ok(l) => {
                // Write PID immediately after bind to prevent race condition
                write_pid(&pid_path)?;
                l
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                // Socket exists, check if daemon is still alive
                if is_daemon_alive(&pid_path) {
                    anyhow::bail!(
                        "Daemon already running (socket {:?} in use, PID file valid)",
                        socket_path
                    );
                }

                // Daemon is dead, but verify the socket file is safe to remove
                // Don't follow symlinks (could delete unintended files)
                let metadata = std::fs::symlink_metadata(&socket_path)
                    .with_context(|| format!("Failed to stat socket path: {:?}", socket_path))?;

                if metadata.file_type().is_symlink() {
                    anyhow::bail!(
                        "Socket path {:?} is a symlink, refusing to delete for safety",
                        socket_path
                    );
                }

                // On Unix, verify it's actually a socket file
                #[cfg(unix)]
                {
                    use std::os::unix::fs::FileTypeExt;
                    if !metadata.file_type().is_socket() {
                        anyhow::bail!(
                            "Path {:?} exists but is not a socket file (type: {:?})",
                            socket_path,
                            metadata.file_type()
                        );
                    }
                }

                // Safe to remove stale socket
                info!("Removing stale socket from dead daemon");
                std::fs::remove_file(&socket_path)
                    .with_context(|| format!("Failed to remove stale socket: {:?}", socket_path))?;

                let l = UnixListener::bind(&socket_path)
                    .with_context(|| format!("Failed to bind to socket: {:?}", socket_path))?;
                // Write PID immediately after bind to prevent race condition
                write_pid(&pid_path)?;
                l
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to bind to socket: {:?}", socket_path));
            }
        };

        info!("Daemon listening on {:?}", socket_path);

        Ok(Self {
            listener,
            socket_path,
            pid_path,
            sessions: Arc::new(SessionManager::new()),
            connection_semaphore: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Run the server, accepting connections and handling requests.
    ///
    /// Limits concurrent connections via semaphore to prevent resource exhaustion.
    /// Spawns background tasks for:
    /// - Pump: drives every session's timers and deferred focus work
    /// - Idle shutdown: signals shutdown after 5 minutes with no sessions
    ///
    /// On shutdown, waits for in-flight connections to complete (with timeout).
    /// Returns when shutdown is signaled, allowing Drop to clean up socket/PID files.
    pub async fn run(&self) -> Result<()> {
        self.sessions.spawn_pump();

        // Spawn idle shutdown monitor
        self.spawn_idle_shutdown_task();

        // Track spawned connection handlers for graceful shutdown
        let mut connection_tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            // Acquire a permit before spawning the connection handler.
                            // This limits concurrent connections to MAX_CONNECTIONS.
                            let permit = match self.connection_semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!(
                                        "Connection limit ({}) reached, rejecting new connection",
                                        MAX_CONNECTIONS
                                    );
                                    // Drop the stream to close the connection
                                    drop(stream);
                                    continue;
                                }
                            };

                            debug!("Accepted new connection");
                            let sessions = self.sessions.clone();
                            let shutdown = self.shutdown.clone();
                            connection_tasks.spawn(async move {
                                // Permit is held for the lifetime of the connection handler
                                let _permit = permit;
                                if let Err(e) = handle_connection(stream, sessions, shutdown).await {
                                    error!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                // Reap completed connection tasks to prevent unbounded growth
                Some(_) = connection_tasks.join_next(), if !connection_tasks.is_empty() => {
                    // Task completed, nothing to do (errors logged in handler)
                }
                _ = self.shutdown.notified() => {
                    info!("Shutdown signal received, waiting for in-flight connections");
                    break;
                }
            }
        }

        // Graceful shutdown: wait for in-flight connections with timeout
        if !connection_tasks.is_empty() {
            let pending = connection_tasks.len();
            info!(
                "Waiting for {} in-flight connection(s) to complete",
                pending
            );

            let shutdown_deadline = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, async {
                while connection_tasks.join_next().await.is_some() {
                    // Keep draining until all tasks complete
                }
            })
            .await;

            if shutdown_deadline.is_err() {
                let remaining = connection_tasks.len();
                warn!(
                    "Graceful shutdown timed out after {:?}, aborting {} connection(s)",
                    GRACEFUL_SHUTDOWN_TIMEOUT, remaining
                );
                // JoinSet::abort_all() will cancel remaining tasks
                connection_tasks.abort_all();
            }
        }

        Ok(())
    }

    /// Spawn a background task that monitors for idle shutdown.
    ///
    /// The daemon will exit after IDLE_TIMEOUT (5 minutes) with no active sessions
    /// AND no active client connections. This prevents shutting down while a client
    /// is connected but hasn't loaded a scene yet.
    ///
    /// Signals shutdown via Notify instead of calling exit(), allowing Drop to run.
    fn spawn_idle_shutdown_task(&self) {
        let sessions = self.sessions.clone();
        let shutdown = self.shutdown.clone();
        let semaphore = self.connection_semaphore.clone();

        tokio::spawn(async move {
            let mut idle_since: Option<Instant> = None;

            loop {
                tokio::time::sleep(IDLE_CHECK_INTERVAL).await;

                // Check both sessions AND active connections.
                // A client might be connected but not have loaded a scene yet.
                let has_sessions = !sessions.is_empty().await;
                let has_connections = semaphore.available_permits() < MAX_CONNECTIONS;

                if has_sessions || has_connections {
                    // Activity detected, reset idle timer
                    if idle_since.is_some() {
                        if has_sessions {
                            debug!("Session activity detected, resetting idle timer");
                        } else {
                            debug!("Active connection detected, resetting idle timer");
                        }
                    }
                    idle_since = None;
                    continue;
                }

                // Truly idle: no sessions and no connections
                let idle_start = *idle_since.get_or_insert_with(Instant::now);

                if idle_start.elapsed() >= IDLE_TIMEOUT {
                    // Double-check to narrow race window
                    let still_has_sessions = !sessions.is_empty().await;
                    let still_has_connections = semaphore.available_permits() < MAX_CONNECTIONS;

                    if still_has_sessions || still_has_connections {
                        debug!("Activity detected during shutdown check, aborting shutdown");
                        idle_since = None;
                        continue;
                    }

                    info!(
                        "No activity for {} seconds, shutting down",
                        IDLE_TIMEOUT.as_secs()
                    );

                    kill_all_sessions(&sessions).await;

                    // Signal main loop to exit (allows Drop to clean up files)
                    shutdown.notify_waiters();
                    break;
                }

                debug!(
                    "Idle for {} seconds (shutdown in {} seconds)",
                    idle_start.elapsed().as_secs(),
                    IDLE_TIMEOUT.saturating_sub(idle_start.elapsed()).as_secs()
                );
            }
        });
    }
}

/// Kill all active sessions during shutdown.
///
/// Used by both the shutdown command handler and the idle shutdown task.
async fn kill_all_sessions(sessions: &SessionManager) {
    let session_ids: Vec<_> = sessions
        .list_sessions()
        .await
        .iter()
        .map(|s| s.id.clone())
        .collect();

    for id in session_ids {
        let session_id = SessionId(id);
        if let Err(e) = sessions.kill_session(&session_id).await {
            warn!(
                "Failed to kill session {} during shutdown: {}",
                session_id, e
            );
        }
    }
}

impl Drop for DaemonServer {
    fn drop(&mut self) {
        // Clean up socket file on shutdown
        if self.socket_path.exists() && std::fs::remove_file(&self.socket_path).is_err() {
            warn!("Failed to remove socket on shutdown");
        }
        // Clean up PID file on shutdown
        if self.pid_path.exists() && std::fs::remove_file(&self.pid_path).is_err() {
            warn!("Failed to remove PID file on shutdown");
        }
    }
}

/// Check if a daemon process is still alive by reading its PID file.
///
/// Returns true if:
/// - PID file exists and contains a valid PID
/// - AND that process is still running (verified via kill(pid, 0))
fn is_daemon_alive(pid_path: &Path) -> bool {
    let pid_str = match std::fs::read_to_string(pid_path) {
        Ok(s) => s,
        Err(_) => return false,
    };

    let pid: i32 = match pid_str.trim().parse() {
        Ok(p) => p,
        Err(_) => return false,
    };

    // kill(pid, 0) checks if process exists without sending a signal.
    // SAFETY: libc::kill with signal 0 is a POSIX-defined no-op that only checks
    // whether the process exists and the caller has permission to signal it.
    // The pid is validated as a valid i32 above. No actual signal is delivered.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Maximum request size in bytes (1 MB should be plenty for any reasonable request).
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Read a line with a maximum size limit to prevent memory DoS.
///
/// Returns the number of bytes read (0 means EOF).
/// Returns an error if the line exceeds max_size before finding a newline.
async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut String,
    max_size: usize,
) -> Result<usize> {
    use tokio::io::AsyncBufReadExt;

    let mut total = 0;
    let mut bytes = Vec::new();

    loop {
        let available = reader
            .fill_buf()
            .await
            .context("Failed to read from client")?;

        if available.is_empty() {
            // EOF
            if !bytes.is_empty() {
                let line = std::str::from_utf8(&bytes).context("Invalid UTF-8 in request")?;
                buf.push_str(line);
            }
            return Ok(total);
        }

        // Find newline in available data
        let newline_pos = available.iter().position(|&b| b == b'\n');
        let bytes_to_consume = newline_pos.map(|p| p + 1).unwrap_or(available.len());

        // Check size limit before consuming
        if total + bytes_to_consume > max_size {
            anyhow::bail!("Request too large: exceeded {} byte limit", max_size);
        }

        // Append raw bytes and validate UTF-8 once at the end
        bytes.extend_from_slice(&available[..bytes_to_consume]);
        total += bytes_to_consume;

        reader.consume(bytes_to_consume);

        if newline_pos.is_some() {
            // Found newline, done
            break;
        }
    }

    let line = std::str::from_utf8(&bytes).context("Invalid UTF-8 in request")?;
    buf.push_str(line);
    Ok(total)
}

/// Handle a single client connection.
async fn handle_connection(
    stream: UnixStream,
    sessions: Arc<SessionManager>,
    shutdown: Arc<Notify>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();

        // Read line with size limit to prevent memory DoS
        let bytes_read = read_line_bounded(&mut reader, &mut line, MAX_REQUEST_SIZE).await?;

        if bytes_read == 0 {
            debug!("Client disconnected");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!("Received: {} bytes", trimmed.len());

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => handle_request(request, sessions.clone(), shutdown.clone()).await,
            Err(e) => Response::error(
                "unknown",
                ApiError::invalid_input_with_suggestion(
                    format!("Invalid JSON request: {}", e),
                    "Ensure the request is valid JSON with 'id' and 'command' fields. Example: {\"id\":\"1\",\"command\":{\"action\":\"list_sessions\"}}",
                ),
            ),
        };

        let response_json =
            serde_json::to_string(&response).context("Failed to serialize response")?;
        debug!("Sending: {}", response_json);

        writer
            .write_all(response_json.as_bytes())
            .await
            .context("Failed to write response")?;
        writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline")?;
        writer.flush().await.context("Failed to flush")?;
    }

    Ok(())
}

/// Handle a single request and return a response.
async fn handle_request(
    request: Request,
    sessions: Arc<SessionManager>,
    shutdown: Arc<Notify>,
) -> Response {
    debug!("Handling command: {:?}", CommandName(&request.command));
    let id = request.id.as_str();

    match request.command {
        Command::Load {
            scene,
            rules,
            config,
            strict,
            session_name,
        } => {
            handle_load(
                id,
                &sessions,
                &scene,
                rules.as_deref(),
                config.as_deref(),
                strict,
                session_name,
            )
            .await
        }

        Command::Snapshot { session, format } => {
            handle_snapshot(id, &sessions, session, format.unwrap_or_default()).await
        }

        Command::Press { key, session } => handle_press(id, &sessions, key, session).await,

        Command::Hide { target, session } => {
            handle_scene_edit(id, &sessions, SceneEdit::Hide, target, session).await
        }
        Command::Show { target, session } => {
            handle_scene_edit(id, &sessions, SceneEdit::Show, target, session).await
        }
        Command::Remove { target, session } => {
            handle_scene_edit(id, &sessions, SceneEdit::Remove, target, session).await
        }
        Command::Open { surface, session } => {
            handle_scene_edit(id, &sessions, SceneEdit::Open, surface, session).await
        }
        Command::Close { surface, session } => {
            handle_scene_edit(id, &sessions, SceneEdit::Close, surface, session).await
        }

        Command::Page { session } => handle_page(id, &sessions, session).await,

        Command::ListSessions => handle_list_sessions(id, &sessions).await,

        Command::Kill { session } => handle_kill(id, &sessions, session).await,

        Command::Shutdown => handle_shutdown(id, sessions.clone(), shutdown).await,
    }
}

/// Logs a command without the scene/rule documents it may carry.
struct CommandName<'a>(&'a Command);

impl std::fmt::Debug for CommandName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Command::Load {
                scene,
                session_name,
                ..
            } => write!(
                f,
                "Load {{ scene: {} bytes, session_name: {:?} }}",
                scene.len(),
                session_name
            ),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Handle load command.
async fn handle_load(
    request_id: &str,
    sessions: &SessionManager,
    scene: &str,
    rules: Option<&str>,
    config: Option<&str>,
    strict: bool,
    session_name: Option<String>,
) -> Response {
    if scene.trim().is_empty() {
        return Response::error(
            request_id,
            ApiError::invalid_input_with_suggestion(
                "Scene document is empty",
                "Pass a scene file, e.g. 'padpilot load scene.json'",
            ),
        );
    }

    let host = match Host::load(scene, rules, config, strict) {
        Ok(host) => host,
        Err(e) => return Response::error(request_id, e),
    };

    match sessions.create_session(host, session_name).await {
        Ok(id) => Response::success(
            request_id,
            ResponseData::SessionCreated {
                session_id: id.to_string(),
                message: "Scene loaded".to_string(),
            },
        ),
        Err(e) => Response::error(request_id, e),
    }
}

/// Handle snapshot command.
async fn handle_snapshot(
    request_id: &str,
    sessions: &SessionManager,
    session: Option<String>,
    format: SnapshotFormat,
) -> Response {
    let session_id = match sessions.resolve_session(session.as_deref()).await {
        Ok(id) => id,
        Err(e) => return Response::error(request_id, e),
    };

    let snapshot = match sessions.with_host(&session_id, |h| h.snapshot()).await {
        Ok(s) => s,
        Err(e) => return Response::error(request_id, e),
    };

    let data = match format {
        SnapshotFormat::Full => ResponseData::NavState(snapshot),
        SnapshotFormat::Compact => ResponseData::NavState(snapshot.compact()),
        SnapshotFormat::Text => ResponseData::Snapshot {
            format,
            content: snapshot.to_text(),
        },
    };
    Response::success(request_id, data)
}

/// Handle press command: one control-surface key.
async fn handle_press(
    request_id: &str,
    sessions: &SessionManager,
    key: String,
    session: Option<String>,
) -> Response {
    if key.trim().is_empty() {
        return Response::error(
            request_id,
            ApiError::invalid_input_with_suggestion(
                "No key specified",
                "Press a standard key (up, down, left, right, activate, exit, confirm, cancel, adjust_up, adjust_down) or a shortcut key from 'padpilot page'",
            ),
        );
    }

    let session_id = match sessions.resolve_session(session.as_deref()).await {
        Ok(id) => id,
        Err(e) => return Response::error(request_id, e),
    };

    let result = sessions
        .with_host(&session_id, |h| {
            let outcome = h.press(&key);
            (outcome, h.engine.focused_path().map(str::to_string))
        })
        .await;

    match result {
        Ok((outcome, focused)) => {
            debug!("Pressed '{}' in session {}: {:?}", key, session_id, outcome);
            Response::success(
                request_id,
                ResponseData::Pressed {
                    key,
                    outcome,
                    focused,
                },
            )
        }
        Err(e) => Response::error(request_id, e),
    }
}

/// Scene mutations available over the protocol.
#[derive(Debug, Clone, Copy)]
enum SceneEdit {
    Hide,
    Show,
    Remove,
    Open,
    Close,
}

impl SceneEdit {
    fn apply(self, host: &mut Host, target: &str) -> Result<String, ApiError> {
        let tree = &mut host.tree;
        match self {
            SceneEdit::Hide | SceneEdit::Show | SceneEdit::Remove => {
                let id = tree.resolve(target).map_err(scene_error)?;
                match self {
                    SceneEdit::Hide => tree.set_visible(id, false),
                    SceneEdit::Show => tree.set_visible(id, true),
                    _ => tree.remove(id),
                }
                .map_err(scene_error)?;
                Ok(format!("{:?} {}", self, id).to_lowercase())
            }
            SceneEdit::Open => {
                let root = tree.open_surface(target).map_err(scene_error)?;
                Ok(format!("opened '{}' as {}", target, root))
            }
            SceneEdit::Close => {
                tree.close_surface(target).map_err(scene_error)?;
                Ok(format!("closed '{}'", target))
            }
        }
    }
}

/// Handle hide/show/remove/open/close.
async fn handle_scene_edit(
    request_id: &str,
    sessions: &SessionManager,
    edit: SceneEdit,
    target: String,
    session: Option<String>,
) -> Response {
    let session_id = match sessions.resolve_session(session.as_deref()).await {
        Ok(id) => id,
        Err(e) => return Response::error(request_id, e),
    };

    match sessions
        .with_host(&session_id, |h| edit.apply(h, &target))
        .await
    {
        Ok(Ok(message)) => {
            info!("Session {}: {}", session_id, message);
            Response::success(request_id, ResponseData::Ok { message })
        }
        Ok(Err(e)) | Err(e) => Response::error(request_id, e),
    }
}

/// Handle page command: report the control-surface state.
async fn handle_page(
    request_id: &str,
    sessions: &SessionManager,
    session: Option<String>,
) -> Response {
    let session_id = match sessions.resolve_session(session.as_deref()).await {
        Ok(id) => id,
        Err(e) => return Response::error(request_id, e),
    };

    match sessions.with_host(&session_id, |h| h.panel()).await {
        Ok((page, layout, keys)) => Response::success(
            request_id,
            ResponseData::Panel { page, layout, keys },
        ),
        Err(e) => Response::error(request_id, e),
    }
}

/// Handle list-sessions command.
async fn handle_list_sessions(request_id: &str, sessions: &SessionManager) -> Response {
    let session_list = sessions.list_sessions().await;
    Response::success(
        request_id,
        ResponseData::Sessions {
            sessions: session_list,
        },
    )
}

/// Handle kill command.
async fn handle_kill(
    request_id: &str,
    sessions: &SessionManager,
    session: Option<String>,
) -> Response {
    let session_id = match sessions.resolve_session(session.as_deref()).await {
        Ok(id) => id,
        Err(e) => return Response::error(request_id, e),
    };

    match sessions.kill_session(&session_id).await {
        Ok(()) => {
            info!("Killed session: {}", session_id);
            Response::success(
                request_id,
                ResponseData::Ok {
                    message: format!("Session {} killed", session_id),
                },
            )
        }
        Err(e) => Response::error(request_id, e),
    }
}

/// Handle shutdown command.
///
/// Kills all sessions and signals the main run loop to exit.
/// The DaemonServer's Drop impl cleans up the socket and PID files.
async fn handle_shutdown(
    request_id: &str,
    sessions: Arc<SessionManager>,
    shutdown: Arc<Notify>,
) -> Response {
    info!("Received shutdown command, stopping daemon");

    tokio::spawn(async move {
        kill_all_sessions(&sessions).await;

        // Brief delay to allow response to flush before signaling shutdown
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.notify_waiters();
    });

    Response::success(
        request_id,
        ResponseData::Ok {
            message: "Daemon shutting down".to_string(),
        },
    )
}
