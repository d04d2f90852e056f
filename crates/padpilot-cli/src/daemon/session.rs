//! Session manager for hosted navigation sessions.
//!
//! A session is one scene hosted in a [`MemoryTree`] plus the [`Engine`] that
//! navigates it. Both live behind one mutex: every engine call and every
//! scene mutation happens with that lock held, which plays the part of the
//! UI thread a real embedder would marshal onto.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use padpilot_core::config::EngineConfig;
use padpilot_core::engine::{CommandOutcome, Engine};
use padpilot_core::error::ApiError;
use padpilot_core::feedback::{KeyDef, PageLayout, RecordingRenderer, RecordingSurface};
use padpilot_core::memory::{MemoryTree, SceneError};
use padpilot_core::protocol::SessionInfo;
use padpilot_core::rules::{RuleLoadMode, RuleSet};
use padpilot_core::snapshot::NavSnapshot;

/// Engine type hosted by the daemon. The recording feedback sinks keep the
/// declared panel state so `page` can report it.
pub type PadEngine = Engine<RecordingRenderer, RecordingSurface>;

/// How often the pump task drives every session's scheduler.
pub const PUMP_INTERVAL: Duration = Duration::from_millis(50);

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The scene and the engine navigating it.
pub struct Host {
    pub engine: PadEngine,
    pub tree: MemoryTree,
}

impl Host {
    /// Build a host from file contents and attach the main window.
    pub fn load(
        scene: &str,
        rules: Option<&str>,
        config: Option<&str>,
        strict: bool,
    ) -> Result<Self, ApiError> {
        let config = match config {
            Some(json) => EngineConfig::from_json(json).map_err(|e| {
                ApiError::invalid_input_with_suggestion(
                    format!("Invalid engine config: {}", e),
                    "Every config field is optional; check names and types against the defaults",
                )
            })?,
            None => EngineConfig::default(),
        };
        let mode = if strict {
            RuleLoadMode::Strict
        } else {
            config.rule_mode
        };
        let rules = match rules {
            Some(json) => RuleSet::from_json(json, mode)
                .map_err(|e| ApiError::rules_load_failed(&e.to_string()))?,
            None => RuleSet::empty(),
        };
        let tree =
            MemoryTree::from_json(scene).map_err(|e| ApiError::scene_load_failed(&e.to_string()))?;

        let mut engine = Engine::new(
            config,
            rules,
            RecordingRenderer::default(),
            RecordingSurface::default(),
        );
        let now = Instant::now();
        engine.attach_primary(&tree, tree.main_root(), now);
        let mut host = Self { engine, tree };
        host.deliver(now);
        Ok(host)
    }

    /// Feed queued host notifications to the engine, then run due work.
    pub fn deliver(&mut self, now: Instant) {
        loop {
            let notes = self.tree.take_notifications();
            if notes.is_empty() {
                break;
            }
            for note in notes {
                self.engine.handle_notification(&self.tree, note, now);
            }
        }
        self.engine.pump(&self.tree, now);
    }

    /// Press a control-surface key and let the scene react.
    pub fn press(&mut self, key: &str) -> CommandOutcome {
        let outcome = self.engine.press_key(&mut self.tree, key);
        self.deliver(Instant::now());
        outcome
    }

    /// Current control-surface page, its layout and every defined key.
    pub fn panel(&self) -> (String, Option<PageLayout>, BTreeMap<String, KeyDef>) {
        let surface = self.engine.control_surface();
        let page = self.engine.page().to_string();
        let layout = surface.pages.get(&page).cloned();
        (page, layout, surface.keys.clone())
    }

    pub fn snapshot(&self) -> NavSnapshot {
        self.engine.snapshot(&self.tree)
    }
}

/// Map a scene error to a protocol error.
pub fn scene_error(error: SceneError) -> ApiError {
    match error {
        SceneError::UnknownTarget(target) => ApiError::unknown_target(&target),
        SceneError::UnknownSurface(surface) => ApiError::unknown_surface(&surface),
        SceneError::MainWindow => ApiError::invalid_input_with_suggestion(
            error.to_string(),
            "Kill the session instead of removing its main window",
        ),
        SceneError::Json(e) => ApiError::scene_load_failed(&e.to_string()),
    }
}

/// A hosted navigation session.
pub struct Session {
    /// Unique session ID.
    pub id: SessionId,
    /// Optional human-readable name.
    pub name: Option<String>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    pub host: Mutex<Host>,
}

impl Session {
    /// Get session info for protocol responses.
    pub async fn info(&self) -> SessionInfo {
        let host = self.host.lock().await;
        SessionInfo {
            id: self.id.0.clone(),
            name: self.name.clone(),
            created_at: self.created_at.to_rfc3339(),
            surfaces: host.engine.discovery().surface_count(),
            nodes: host.engine.discovery().nodes().len(),
        }
    }
}

/// Maximum number of concurrent sessions to prevent resource exhaustion.
const MAX_SESSIONS: usize = 100;

/// Manages hosted sessions.
///
/// Thread-safe via interior mutability with RwLock.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Load a scene into a new session.
    ///
    /// Returns an error if the session limit is reached, the name is taken,
    /// or any of the documents fails to load.
    pub async fn create_session(
        &self,
        host: Host,
        name: Option<String>,
    ) -> Result<SessionId, ApiError> {
        let name = name.or_else(|| Some("default".to_string()));

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= MAX_SESSIONS {
            return Err(ApiError::session_limit_reached(MAX_SESSIONS));
        }
        if let Some(ref n) = name {
            if sessions.values().any(|s| s.name.as_deref() == Some(n)) {
                return Err(ApiError::duplicate_session_name(n));
            }
        }

        let id = SessionId::new();
        info!("Created session {} ({:?})", id, name.as_deref().unwrap_or("unnamed"));
        sessions.insert(
            id.clone(),
            Arc::new(Session {
                id: id.clone(),
                name,
                created_at: Utc::now(),
                host: Mutex::new(host),
            }),
        );
        Ok(id)
    }

    /// Shut a session's engine down and drop it.
    pub async fn kill_session(&self, id: &SessionId) -> Result<(), ApiError> {
        let session = self.sessions.write().await.remove(id);
        match session {
            Some(session) => {
                session.host.lock().await.engine.shutdown();
                Ok(())
            }
            None => Err(ApiError::session_not_found(&id.0)),
        }
    }

    /// List all active sessions.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.info().await);
        }
        infos
    }

    /// Get the number of active sessions.
    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Check if there are no active sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Get a session ID by name.
    pub async fn find_by_name(&self, name: &str) -> Option<SessionId> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .find(|s| s.name.as_deref() == Some(name))
            .map(|s| s.id.clone())
    }

    /// Resolve a session identifier to a SessionId.
    ///
    /// The identifier can be:
    /// - None: the session named "default"
    /// - A session ID (UUID format)
    /// - A session name
    pub async fn resolve_session(&self, identifier: Option<&str>) -> Result<SessionId, ApiError> {
        match identifier {
            None => self
                .find_by_name("default")
                .await
                .ok_or_else(|| ApiError::session_not_found("default")),
            Some(id_or_name) => {
                let sessions = self.sessions.read().await;
                let id = SessionId::from(id_or_name);
                if sessions.contains_key(&id) {
                    return Ok(id);
                }
                sessions
                    .values()
                    .find(|s| s.name.as_deref() == Some(id_or_name))
                    .map(|s| s.id.clone())
                    .ok_or_else(|| ApiError::session_not_found(id_or_name))
            }
        }
    }

    /// Run `f` on a session's host with its lock held, then deliver whatever
    /// notifications `f` caused.
    pub async fn with_host<F, R>(&self, id: &SessionId, f: F) -> Result<R, ApiError>
    where
        F: FnOnce(&mut Host) -> R,
    {
        let session = self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::session_not_found(&id.0))?;
        let mut host = session.host.lock().await;
        let result = f(&mut host);
        host.deliver(Instant::now());
        Ok(result)
    }

    /// Drive every session once: notifications first, then due timers and
    /// deferred focus work.
    pub async fn pump_all(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let now = Instant::now();
        for session in sessions {
            session.host.lock().await.deliver(now);
        }
    }

    /// Spawn the background pump task.
    ///
    /// The task runs until the SessionManager is dropped (via the Arc weak reference).
    pub fn spawn_pump(self: &Arc<Self>) {
        let weak_self = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(PUMP_INTERVAL);
            loop {
                tick.tick().await;
                let Some(manager) = weak_self.upgrade() else {
                    debug!("SessionManager dropped, pump exiting");
                    break;
                };
                manager.pump_all().await;
            }
        });
    }
}
