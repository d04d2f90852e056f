//! The engine service.
//!
//! [`Engine`] is the one explicit instance that wires discovery, navigation,
//! scheduling and feedback together. The embedder constructs it once
//! ([`Engine::new`]), attaches the primary surface, then drives it from a
//! single loop:
//!
//! - host notifications go to [`Engine::handle_notification`]
//! - control-surface key presses go to [`Engine::press_key`]
//! - [`Engine::pump`] runs deferred work whenever [`Engine::next_deadline`]
//!   passes or after anything above
//!
//! [`Engine::shutdown`] tears everything down again. Nothing here blocks and
//! nothing runs on another thread.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::classifier::Classifier;
use crate::config::EngineConfig;
use crate::discovery::{Discovery, DiscoveryUpdate};
use crate::element::{ElementId, ElementTree, HostNotification};
use crate::feedback::{fit_title, ControlSurface, FocusRenderer};
use crate::geometry::{AdjustDirection, Direction, Rect};
use crate::keymap::{builtin_pages, NavCommand, StandardKey, PAGE_ADJUST, PAGE_CONFIRM, PAGE_NAV};
use crate::navigation::adjust::AdjustableKind;
use crate::navigation::context::ContextType;
use crate::navigation::direction::Scoring;
use crate::navigation::{AdjustOutcome, MoveOutcome, Navigator};
use crate::node::{NodeId, Role};
use crate::rules::{PageMeta, RuleSet, TargetKind};
use crate::scanner::SurfaceId;
use crate::scheduler::{Priority, Scheduler, Task};
use crate::snapshot::{ContextInfo, NavSnapshot, NodeInfo, SurfaceInfo};

/// What a key press or command did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Moved { from: String, to: String },
    /// Nothing valid was focused, so reading-order focus was picked.
    FocusInitialized { path: String },
    Focused { path: String },
    /// Nothing lies in the requested direction.
    NoCandidate,
    Activated { path: String },
    EnteredInteraction { path: String, value: f64 },
    ExitedInteraction { path: String, reverted: bool },
    Adjusted { path: String, value: f64 },
    Dismissed { path: String },
    AwaitingConfirmation { key: String, path: String },
    Cancelled { key: String },
    Ignored { reason: String },
}

impl CommandOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        CommandOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

/// A confirm-gated shortcut waiting for `confirm` or `cancel`.
#[derive(Debug, Clone)]
struct PendingShortcut {
    key: String,
    node: NodeId,
    target: TargetKind,
}

/// Discovery and navigation for one hosted application.
pub struct Engine<R: FocusRenderer, C: ControlSurface> {
    config: EngineConfig,
    discovery: Discovery,
    navigator: Navigator,
    scheduler: Scheduler,
    renderer: R,
    surface: C,
    pending: Option<PendingShortcut>,
    page: String,
    focus_rect: Option<Rect>,
    last_focused: Option<NodeId>,
    /// Lowercased shortcut keys already defined on the control surface.
    shortcut_keys: BTreeSet<String>,
}

impl<R: FocusRenderer, C: ControlSurface> Engine<R, C> {
    /// Build the engine and declare the standard keys and pages.
    pub fn new(config: EngineConfig, rules: RuleSet, renderer: R, surface: C) -> Self {
        let pages = rules.pages().to_vec();
        let discovery = Discovery::new(Classifier::new(Arc::new(rules)), config.scan_interval());
        let navigator = Navigator::new(Scoring::from(&config));
        let mut engine = Self {
            config,
            discovery,
            navigator,
            scheduler: Scheduler::new(),
            renderer,
            surface,
            pending: None,
            page: PAGE_NAV.to_string(),
            focus_rect: None,
            last_focused: None,
            shortcut_keys: BTreeSet::new(),
        };
        engine.define_controls(&pages);
        info!("Engine ready ({} rule page(s))", pages.len());
        engine
    }

    fn define_controls(&mut self, pages: &[PageMeta]) {
        let width = self.config.key_title_width;
        for key in StandardKey::ALL {
            self.surface
                .define_key(key.name(), &fit_title(key.title(), width), Some(key.icon()));
        }
        for (name, layout) in builtin_pages() {
            self.surface.define_page(name, &layout);
        }
        for page in pages {
            self.surface.define_page(&page.name, &page.layout);
        }
        self.surface.switch_page(PAGE_NAV);
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    #[must_use]
    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    #[must_use]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    #[must_use]
    pub fn control_surface(&self) -> &C {
        &self.surface
    }

    /// Page currently selected on the control surface.
    #[must_use]
    pub fn page(&self) -> &str {
        &self.page
    }

    /// Path of the focused node.
    #[must_use]
    pub fn focused_path(&self) -> Option<&str> {
        let node = self.discovery.node(self.navigator.focused()?)?;
        Some(&node.path)
    }

    /// Register the application's primary surface. The first surface
    /// attached is the primary one.
    pub fn attach_primary<T: ElementTree + ?Sized>(
        &mut self,
        tree: &T,
        root: ElementId,
        now: Instant,
    ) -> SurfaceId {
        if let Some(primary) = self.discovery.primary() {
            debug!("Primary surface already attached as {}", primary);
        }
        let (id, update) = self.discovery.register_surface(tree, root, None, now);
        self.apply(tree, update);
        id
    }

    /// Feed one host lifecycle notification.
    pub fn handle_notification<T: ElementTree + ?Sized>(
        &mut self,
        tree: &T,
        notification: HostNotification,
        now: Instant,
    ) {
        trace!("Host notification {:?}", notification);
        let update = match notification {
            HostNotification::Loaded { element } | HostNotification::LayoutChanged { element } => {
                self.discovery.request_scan_for(tree, element, now)
            }
            HostNotification::Unloaded { element } => {
                self.discovery.handle_unloaded(tree, element, now)
            }
            HostNotification::SurfaceOpened { root, anchor } => {
                self.discovery.register_surface(tree, root, anchor, now).1
            }
            HostNotification::SurfaceMoved { root } | HostNotification::SurfaceResized { root } => {
                match self.discovery.surface_by_root(root) {
                    Some(surface) => self.discovery.request_scan(tree, surface, now),
                    None => DiscoveryUpdate::default(),
                }
            }
            HostNotification::SurfaceClosed { root } => self.discovery.unregister_root(root),
        };
        self.apply(tree, update);
    }

    /// Run everything due at `now`: reap dead elements, fire trailing scans,
    /// run deferred focus work. Returns the number of tasks run.
    pub fn pump<T: ElementTree + ?Sized>(&mut self, tree: &T, now: Instant) -> usize {
        let reaped = self.discovery.reap_dead(tree, now);
        if !reaped.is_empty() {
            self.apply(tree, reaped);
        }

        let mut ran = 0;
        while let Some(task) = self.scheduler.pop_ready(now) {
            ran += 1;
            match task {
                Task::TrailingScan { surface } => {
                    let update = self.discovery.fire_trailing(tree, surface, now);
                    self.apply(tree, update);
                }
                other => {
                    if self.navigator.run_task(other, &self.discovery, tree) {
                        trace!("{:?} changed focus", other);
                    }
                }
            }
        }
        self.sync_feedback(tree);
        ran
    }

    /// When the next timer is due, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Whether [`Engine::pump`] has work without waiting for a timer.
    #[must_use]
    pub fn has_ready_work(&self) -> bool {
        self.scheduler.has_ready()
    }

    /// Handle a control-surface key press: a standard key or a shortcut.
    pub fn press_key<T: ElementTree + ?Sized>(&mut self, tree: &mut T, key: &str) -> CommandOutcome {
        if let Some(standard) = StandardKey::from_name(key) {
            return self.execute(tree, standard.command());
        }

        let Some(node) = self.shortcut_target(key) else {
            debug!("Ignoring key '{}'", key);
            return CommandOutcome::ignored(format!("key '{}' is not bound here", key));
        };
        let Some(meta) = self.discovery.node(node).and_then(|n| n.shortcut.clone()) else {
            return CommandOutcome::ignored(format!("key '{}' is not bound here", key));
        };
        if let Some(previous) = self.pending.take() {
            debug!("Dropping pending shortcut '{}'", previous.key);
        }

        let shortcut = PendingShortcut {
            key: meta.key.clone(),
            node,
            target: meta.target,
        };
        let outcome = if meta.confirm {
            let path = self.path_of(node);
            self.pending = Some(shortcut);
            CommandOutcome::AwaitingConfirmation {
                key: meta.key,
                path,
            }
        } else {
            self.run_shortcut(tree, &shortcut)
        };
        self.sync_feedback(&*tree);
        outcome
    }

    /// Run a navigation command.
    pub fn execute<T: ElementTree + ?Sized>(
        &mut self,
        tree: &mut T,
        command: NavCommand,
    ) -> CommandOutcome {
        let outcome = match (self.pending.take(), command) {
            (Some(pending), NavCommand::Confirm) => self.run_shortcut(tree, &pending),
            (Some(pending), NavCommand::Cancel) => {
                debug!("Shortcut '{}' cancelled", pending.key);
                CommandOutcome::Cancelled { key: pending.key }
            }
            (pending, command) => {
                if let Some(pending) = pending {
                    debug!("Dropping pending shortcut '{}'", pending.key);
                }
                self.run_command(tree, command)
            }
        };
        self.sync_feedback(&*tree);
        outcome
    }

    fn run_command<T: ElementTree + ?Sized>(
        &mut self,
        tree: &mut T,
        command: NavCommand,
    ) -> CommandOutcome {
        let interactive = self.navigator.is_interactive();
        match command {
            NavCommand::Move(direction) if interactive => {
                let adjust = match direction {
                    Direction::Up | Direction::Right => AdjustDirection::Up,
                    Direction::Down | Direction::Left => AdjustDirection::Down,
                };
                self.adjust(tree, adjust)
            }
            NavCommand::Move(direction) => {
                match self.navigator.move_focus(direction, &self.discovery, &*tree) {
                    MoveOutcome::Moved { from, to } => CommandOutcome::Moved {
                        from: self.path_of(from),
                        to: self.path_of(to),
                    },
                    MoveOutcome::Initialized { to } => CommandOutcome::FocusInitialized {
                        path: self.path_of(to),
                    },
                    MoveOutcome::NoCandidate => CommandOutcome::NoCandidate,
                    MoveOutcome::NoContext => CommandOutcome::ignored("no surface attached yet"),
                }
            }
            NavCommand::Activate if interactive => self.exit_interaction(tree, false),
            NavCommand::Activate => match self.navigator.focused() {
                Some(node) => self.activate_node(tree, node),
                None => CommandOutcome::ignored("nothing is focused"),
            },
            NavCommand::Exit if interactive => self.exit_interaction(tree, false),
            NavCommand::Exit => self.dismiss_scope(tree),
            NavCommand::Confirm if interactive => self.exit_interaction(tree, false),
            NavCommand::Cancel if interactive => self.exit_interaction(tree, true),
            NavCommand::Confirm | NavCommand::Cancel => {
                CommandOutcome::ignored("nothing to confirm or cancel")
            }
            NavCommand::AdjustValue(direction) => self.adjust(tree, direction),
        }
    }

    fn activate_node<T: ElementTree + ?Sized>(&mut self, tree: &mut T, id: NodeId) -> CommandOutcome {
        let Some(node) = self.discovery.node(id) else {
            return CommandOutcome::ignored("focused node is gone");
        };
        if AdjustableKind::supports(&node.kind) {
            return self.enter_interaction(&*tree, id);
        }
        let path = node.path.clone();
        if tree.activate(node.element) {
            debug!("Activated {}", path);
            CommandOutcome::Activated { path }
        } else {
            CommandOutcome::ignored(format!("{} refused activation", path))
        }
    }

    fn enter_interaction<T: ElementTree + ?Sized>(&mut self, tree: &T, id: NodeId) -> CommandOutcome {
        if !self.navigator.enter_interaction(id, &self.discovery, tree) {
            return CommandOutcome::ignored("control cannot be adjusted");
        }
        let value = self
            .navigator
            .active()
            .and_then(|c| c.original_value)
            .unwrap_or_default();
        CommandOutcome::EnteredInteraction {
            path: self.path_of(id),
            value,
        }
    }

    fn exit_interaction<T: ElementTree + ?Sized>(&mut self, tree: &mut T, revert: bool) -> CommandOutcome {
        let path = self
            .navigator
            .active()
            .map(|c| c.scope_path.clone())
            .unwrap_or_default();
        if self.navigator.exit_interaction(revert, &self.discovery, tree) {
            CommandOutcome::ExitedInteraction {
                path,
                reverted: revert,
            }
        } else {
            CommandOutcome::ignored("not in interactive mode")
        }
    }

    fn adjust<T: ElementTree + ?Sized>(&mut self, tree: &mut T, direction: AdjustDirection) -> CommandOutcome {
        match self.navigator.adjust(direction, &self.discovery, tree) {
            AdjustOutcome::Adjusted { node, value } => CommandOutcome::Adjusted {
                path: self.path_of(node),
                value,
            },
            AdjustOutcome::Unchanged => CommandOutcome::ignored("value is already at its limit"),
            AdjustOutcome::NotInteractive => CommandOutcome::ignored("not in interactive mode"),
        }
    }

    fn dismiss_scope<T: ElementTree + ?Sized>(&mut self, tree: &mut T) -> CommandOutcome {
        let Some(ctx) = self.navigator.active() else {
            return CommandOutcome::ignored("no surface attached yet");
        };
        if ctx.kind != ContextType::ModalScope {
            return CommandOutcome::ignored("already at the root surface");
        }
        let path = ctx.scope_path.clone();
        let element = self.discovery.node(ctx.scope).map(|n| n.element);
        if element.is_some_and(|e| tree.dismiss(e)) {
            debug!("Dismissed {}", path);
            CommandOutcome::Dismissed { path }
        } else {
            CommandOutcome::ignored(format!("{} cannot be dismissed", path))
        }
    }

    /// Earliest-discovered in-scope node carrying the shortcut `key`.
    fn shortcut_target(&self, key: &str) -> Option<NodeId> {
        self.discovery
            .nodes()
            .iter()
            .filter(|(_, n)| {
                n.shortcut
                    .as_ref()
                    .is_some_and(|s| s.key.eq_ignore_ascii_case(key.trim()))
            })
            .filter(|(id, _)| self.navigator.in_active_scope(*id, &self.discovery))
            .min_by_key(|(_, n)| n.seq)
            .map(|(id, _)| id)
    }

    fn run_shortcut<T: ElementTree + ?Sized>(
        &mut self,
        tree: &mut T,
        shortcut: &PendingShortcut,
    ) -> CommandOutcome {
        let node = shortcut.node;
        if !self.navigator.in_active_scope(node, &self.discovery) {
            return CommandOutcome::ignored(format!(
                "target of '{}' is no longer available",
                shortcut.key
            ));
        }
        let focused = self.navigator.focus_node(node, &self.discovery, &*tree);
        match shortcut.target {
            TargetKind::Focus if focused => CommandOutcome::Focused {
                path: self.path_of(node),
            },
            TargetKind::Focus => CommandOutcome::ignored(format!(
                "target of '{}' cannot take focus",
                shortcut.key
            )),
            TargetKind::Activate => self.activate_node(tree, node),
            TargetKind::Interact => self.enter_interaction(&*tree, node),
        }
    }

    /// Commit a discovery update: timers, events, shortcut keys, feedback.
    fn apply<T: ElementTree + ?Sized>(&mut self, tree: &T, update: DiscoveryUpdate) {
        for (surface, due) in &update.trailing {
            self.scheduler
                .post_at(*due, Priority::Input, Task::TrailingScan { surface: *surface });
        }
        self.define_shortcut_keys(&update.added);
        self.navigator
            .handle_events(&update.events, &self.discovery, &mut self.scheduler);
        self.navigator
            .reconcile(&self.discovery, tree, &mut self.scheduler);

        let pending_gone = self
            .pending
            .as_ref()
            .is_some_and(|p| !self.discovery.nodes().contains(p.node));
        if pending_gone {
            debug!("Pending shortcut target went away");
            self.pending = None;
        }
        if update.scanned && self.config.debug_overlay {
            self.refresh_overlay(tree);
        }
        self.sync_feedback(tree);
    }

    fn define_shortcut_keys(&mut self, added: &[NodeId]) {
        let width = self.config.key_title_width;
        for id in added {
            let Some(meta) = self.discovery.node(*id).and_then(|n| n.shortcut.as_ref()) else {
                continue;
            };
            if self.shortcut_keys.insert(meta.key.to_lowercase()) {
                self.surface.define_key(
                    &meta.key,
                    &fit_title(&meta.title, width),
                    meta.icon.as_deref(),
                );
            }
        }
    }

    /// Push focus, focus rectangle and page to the outside world if they changed.
    fn sync_feedback<T: ElementTree + ?Sized>(&mut self, tree: &T) {
        let focused = self.navigator.focused();
        if focused != self.last_focused {
            self.discovery.set_focused(focused);
            self.last_focused = focused;
        }

        let rect = self.navigator.focused_bounds(&self.discovery, tree);
        if rect != self.focus_rect {
            match rect {
                Some(r) => self.renderer.show_focus_rect(r),
                None => self.renderer.hide_focus_rect(),
            }
            self.focus_rect = rect;
        }

        let page = self.desired_page();
        if page != self.page {
            debug!("Switching control surface to page '{}'", page);
            self.surface.switch_page(&page);
            self.page = page;
        }
    }

    fn desired_page(&self) -> String {
        if self.pending.is_some() {
            return PAGE_CONFIRM.to_string();
        }
        if self.navigator.is_interactive() {
            return PAGE_ADJUST.to_string();
        }
        self.navigator
            .active()
            .and_then(|ctx| self.discovery.node(ctx.scope))
            .and_then(|n| n.page.clone())
            .unwrap_or_else(|| PAGE_NAV.to_string())
    }

    /// Turn the debug overlay on or off.
    pub fn set_debug_overlay<T: ElementTree + ?Sized>(&mut self, enabled: bool, tree: &T) {
        self.config.debug_overlay = enabled;
        if enabled {
            self.refresh_overlay(tree);
        } else {
            self.renderer.clear_debug_overlay();
        }
    }

    fn refresh_overlay<T: ElementTree + ?Sized>(&mut self, tree: &T) {
        let Some(ctx) = self.navigator.active() else {
            self.renderer.clear_debug_overlay();
            return;
        };
        let mut leaves = Vec::new();
        let mut groups = Vec::new();
        for (id, node) in self.discovery.nodes().iter() {
            if !ctx.contains(id, node) {
                continue;
            }
            let Some(rect) = tree.bounds(node.element).filter(Rect::is_usable) else {
                continue;
            };
            match node.role {
                Role::Leaf => leaves.push(rect),
                Role::Group => groups.push(rect),
                Role::Undefined => {}
            }
        }
        self.renderer.show_debug_overlay(&leaves, &groups);
    }

    /// Serializable view of the current state.
    #[must_use]
    pub fn snapshot<T: ElementTree + ?Sized>(&self, tree: &T) -> NavSnapshot {
        let focused = self.navigator.focused();
        let mut nodes: Vec<NodeInfo> = self
            .discovery
            .nodes()
            .iter()
            .map(|(id, n)| {
                NodeInfo::new(
                    id,
                    n,
                    tree.bounds(n.element).filter(Rect::is_usable),
                    Some(id) == focused,
                )
            })
            .collect();
        nodes.sort_by_key(|n| n.seq);

        let contexts = self
            .navigator
            .contexts()
            .iter()
            .map(|c| ContextInfo {
                id: c.id,
                kind: c.kind,
                scope: c.scope_path.clone(),
                focused: c
                    .focused
                    .and_then(|f| self.discovery.node(f))
                    .map(|n| n.path.clone()),
                original_value: c.original_value,
            })
            .collect();

        let primary = self.discovery.primary();
        let surfaces = self
            .discovery
            .surfaces()
            .map(|(id, root)| SurfaceInfo {
                id,
                root,
                primary: Some(id) == primary,
                scans: self.discovery.scan_count(id),
            })
            .collect();

        NavSnapshot::new(
            contexts,
            nodes,
            surfaces,
            self.page.clone(),
            self.pending.as_ref().map(|p| p.key.clone()),
            self.navigator.mismatches(),
        )
    }

    /// Tear down: drop every surface and context and clear all feedback.
    pub fn shutdown(&mut self) {
        let update = self.discovery.clear();
        debug!("Dropped {} close event(s) at shutdown", update.events.len());
        self.navigator.clear();
        self.scheduler.clear();
        self.pending = None;
        self.renderer.hide_focus_rect();
        self.renderer.clear_debug_overlay();
        self.focus_rect = None;
        self.last_focused = None;
        info!("Engine shut down");
    }

    fn path_of(&self, id: NodeId) -> String {
        self.discovery
            .node(id)
            .map(|n| n.path.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::element::ElementKind;
    use crate::feedback::{page_layout, RecordingRenderer, RecordingSurface};
    use crate::memory::{ElementSpec, MemoryTree, Scene, SurfaceSpec};
    use crate::rules::{RawRule, RuleLoadMode, ShortcutMeta};

    type TestEngine = Engine<RecordingRenderer, RecordingSurface>;

    struct Host {
        engine: TestEngine,
        tree: MemoryTree,
        now: Instant,
    }

    impl Host {
        fn start(scene: Scene, rules: Vec<RawRule>, config: EngineConfig) -> Self {
            let rules = RuleSet::compile(rules, RuleLoadMode::Strict).unwrap();
            let mut engine = Engine::new(
                config,
                rules,
                RecordingRenderer::default(),
                RecordingSurface::default(),
            );
            let tree = MemoryTree::from_scene(scene).unwrap();
            let now = Instant::now();
            engine.attach_primary(&tree, tree.main_root(), now);
            let mut host = Host { engine, tree, now };
            host.deliver();
            host
        }

        fn deliver(&mut self) {
            for note in self.tree.take_notifications() {
                self.engine.handle_notification(&self.tree, note, self.now);
            }
            self.engine.pump(&self.tree, self.now);
        }

        fn press(&mut self, key: &str) -> CommandOutcome {
            let outcome = self.engine.press_key(&mut self.tree, key);
            self.deliver();
            outcome
        }

        fn advance(&mut self, ms: u64) {
            self.now += Duration::from_millis(ms);
            self.deliver();
        }

        fn focused(&self) -> Option<&str> {
            self.engine.focused_path()
        }
    }

    fn button(name: &str, x: f64, y: f64) -> ElementSpec {
        ElementSpec::new(ElementKind::Button)
            .named(name)
            .at(x, y, 40.0, 20.0)
    }

    fn scene() -> Scene {
        Scene {
            main: ElementSpec::new(ElementKind::Window)
                .named("Main")
                .at(0.0, 0.0, 800.0, 600.0)
                .child(button("Open", 10.0, 10.0).opens("menu"))
                .child(button("Delete", 110.0, 10.0))
                .child(
                    ElementSpec::new(ElementKind::Slider)
                        .named("Volume")
                        .at(10.0, 100.0, 200.0, 20.0)
                        .range(50.0, 0.0, 100.0),
                ),
            surfaces: vec![SurfaceSpec {
                root: ElementSpec::new(ElementKind::Popup)
                    .id("menu")
                    .at(10.0, 40.0, 100.0, 60.0)
                    .child(button("Cut", 15.0, 45.0))
                    .child(button("Copy", 15.0, 70.0)),
                anchor: Some("Open".into()),
                open: false,
            }],
        }
    }

    fn delete_shortcut(confirm: bool) -> RawRule {
        RawRule::role("**/Delete:Button", Role::Leaf).with_shortcut(ShortcutMeta {
            key: "del".into(),
            title: "Delete everything".into(),
            icon: Some("trash".into()),
            confirm,
            target: TargetKind::Activate,
        })
    }

    #[test]
    fn startup_declares_standard_keys_and_pages() {
        let host = Host::start(scene(), vec![], EngineConfig::default());
        let surface = host.engine.control_surface();
        for key in StandardKey::ALL {
            assert!(surface.keys.contains_key(key.name()), "missing {}", key.name());
        }
        for page in [PAGE_NAV, PAGE_ADJUST, PAGE_CONFIRM] {
            assert!(surface.pages.contains_key(page));
        }
        assert_eq!(surface.current_page.as_deref(), Some(PAGE_NAV));
    }

    #[test]
    fn attach_focuses_in_reading_order_and_draws_it() {
        let host = Host::start(scene(), vec![], EngineConfig::default());
        assert_eq!(host.focused(), Some("Main:Window#1/Open:Button"));
        assert_eq!(
            host.engine.renderer().focus,
            Some(Rect::new(10.0, 10.0, 40.0, 20.0))
        );
    }

    #[test]
    fn arrow_keys_move_focus() {
        let mut host = Host::start(scene(), vec![], EngineConfig::default());
        let outcome = host.press("right");
        assert_eq!(
            outcome,
            CommandOutcome::Moved {
                from: "Main:Window#1/Open:Button".into(),
                to: "Main:Window#1/Delete:Button".into(),
            }
        );
        assert_eq!(host.press("right"), CommandOutcome::NoCandidate);
        assert_eq!(host.focused(), Some("Main:Window#1/Delete:Button"));
        assert_eq!(
            host.engine.renderer().focus,
            Some(Rect::new(110.0, 10.0, 40.0, 20.0))
        );
    }

    #[test]
    fn popup_opens_from_activation_and_exit_dismisses_it() {
        let mut host = Host::start(scene(), vec![], EngineConfig::default());
        let outcome = host.press("activate");
        assert!(matches!(outcome, CommandOutcome::Activated { .. }));
        assert_eq!(host.engine.navigator().depth(), 2);
        assert_eq!(host.focused(), Some("_:Popup#2/Cut:Button"));

        assert_eq!(
            host.press("exit"),
            CommandOutcome::Dismissed {
                path: "_:Popup#2".into()
            }
        );
        assert_eq!(host.engine.navigator().depth(), 1);
        assert_eq!(host.focused(), Some("Main:Window#1/Open:Button"));
        assert_eq!(host.press("exit"), CommandOutcome::ignored("already at the root surface"));
    }

    #[test]
    fn slider_interaction_switches_pages_and_reverts() {
        let mut host = Host::start(scene(), vec![], EngineConfig::default());
        host.press("down");
        assert_eq!(host.focused(), Some("Main:Window#1/Volume:Slider"));

        let outcome = host.press("activate");
        assert_eq!(
            outcome,
            CommandOutcome::EnteredInteraction {
                path: "Main:Window#1/Volume:Slider".into(),
                value: 50.0
            }
        );
        assert_eq!(host.engine.page(), PAGE_ADJUST);

        assert!(matches!(host.press("up"), CommandOutcome::Adjusted { value, .. } if value == 55.0));
        assert!(matches!(host.press("adjust_up"), CommandOutcome::Adjusted { value, .. } if value == 60.0));

        let outcome = host.press("cancel");
        assert_eq!(
            outcome,
            CommandOutcome::ExitedInteraction {
                path: "Main:Window#1/Volume:Slider".into(),
                reverted: true
            }
        );
        let volume = host.tree.find("Volume").unwrap();
        assert_eq!(host.tree.range_value(volume).unwrap().value, 50.0);
        assert_eq!(host.engine.page(), PAGE_NAV);
        assert_eq!(host.focused(), Some("Main:Window#1/Volume:Slider"));
    }

    #[test]
    fn confirm_keeps_adjusted_value() {
        let mut host = Host::start(scene(), vec![], EngineConfig::default());
        host.press("down");
        host.press("activate");
        host.press("left");
        host.press("confirm");
        let volume = host.tree.find("Volume").unwrap();
        assert_eq!(host.tree.range_value(volume).unwrap().value, 45.0);
        assert!(!host.engine.navigator().is_interactive());
    }

    #[test]
    fn shortcut_key_is_defined_with_fitted_title() {
        let host = Host::start(scene(), vec![delete_shortcut(false)], EngineConfig::default());
        let key = &host.engine.control_surface().keys["del"];
        assert_eq!(key.title, "Delete ev…");
        assert_eq!(key.icon.as_deref(), Some("trash"));
    }

    #[test]
    fn shortcut_without_confirmation_runs_immediately() {
        let mut host = Host::start(scene(), vec![delete_shortcut(false)], EngineConfig::default());
        let outcome = host.press("DEL");
        assert_eq!(
            outcome,
            CommandOutcome::Activated {
                path: "Main:Window#1/Delete:Button".into()
            }
        );
        let delete = host.tree.find("Delete").unwrap();
        assert_eq!(host.tree.activations(), &[delete]);
        assert_eq!(host.focused(), Some("Main:Window#1/Delete:Button"));
    }

    #[test]
    fn confirmed_shortcut_waits_for_confirm() {
        let mut host = Host::start(scene(), vec![delete_shortcut(true)], EngineConfig::default());
        let outcome = host.press("del");
        assert!(matches!(outcome, CommandOutcome::AwaitingConfirmation { .. }));
        assert_eq!(host.engine.page(), PAGE_CONFIRM);
        assert!(host.tree.activations().is_empty());

        let outcome = host.press("confirm");
        assert!(matches!(outcome, CommandOutcome::Activated { .. }));
        assert_eq!(host.tree.activations().len(), 1);
        assert_eq!(host.engine.page(), PAGE_NAV);
    }

    #[test]
    fn confirmed_shortcut_can_be_cancelled() {
        let mut host = Host::start(scene(), vec![delete_shortcut(true)], EngineConfig::default());
        host.press("del");
        assert_eq!(
            host.press("cancel"),
            CommandOutcome::Cancelled { key: "del".into() }
        );
        assert!(host.tree.activations().is_empty());
        assert_eq!(host.engine.page(), PAGE_NAV);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut host = Host::start(scene(), vec![], EngineConfig::default());
        assert!(matches!(host.press("f13"), CommandOutcome::Ignored { .. }));
        assert_eq!(host.focused(), Some("Main:Window#1/Open:Button"));
    }

    #[test]
    fn scope_page_is_selected_while_its_context_is_on_top() {
        let page = PageMeta {
            name: "menu".into(),
            layout: page_layout(&[
                &["", "up", "", "", "exit"],
                &["", "activate", "", "", ""],
                &["", "down", "", "", ""],
            ]),
        };
        let rules = vec![RawRule::role("_:Popup", Role::Group).with_page(page)];
        let mut host = Host::start(scene(), rules, EngineConfig::default());
        assert!(host.engine.control_surface().pages.contains_key("menu"));

        host.press("activate");
        assert_eq!(host.engine.page(), "menu");
        host.press("exit");
        assert_eq!(host.engine.page(), PAGE_NAV);
    }

    #[test]
    fn burst_of_layout_changes_gets_one_trailing_scan() {
        let mut host = Host::start(scene(), vec![], EngineConfig::default());
        let main = host.tree.main_root();
        host.tree
            .insert(main, &button("Late", 300.0, 10.0))
            .unwrap();
        host.deliver();
        assert!(host.engine.focused_path().is_some());
        assert!(
            host.tree.find("Late").and_then(|e| host.engine.discovery().nodes().node_for_element(e)).is_none(),
            "inside the rate-limit window the scan is deferred"
        );
        assert!(host.engine.next_deadline().is_some());

        host.advance(500);
        let late = host.tree.find("Late").unwrap();
        assert!(host.engine.discovery().nodes().node_for_element(late).is_some());
        assert_eq!(host.engine.discovery().scan_count(SurfaceId(1)), 2);
    }

    #[test]
    fn focus_lost_without_notice_is_reinitialized() {
        let mut host = Host::start(scene(), vec![], EngineConfig::default());
        let open = host.tree.find("Open").unwrap();
        host.tree.remove(open).unwrap();
        // Drop the notification; the engine has to notice on its own.
        host.tree.take_notifications();
        host.engine.pump(&host.tree, host.now);
        host.engine.pump(&host.tree, host.now);
        assert_eq!(host.focused(), Some("Main:Window#1/Delete:Button"));
    }

    #[test]
    fn debug_overlay_follows_scans_and_shutdown_clears_it() {
        let config = EngineConfig {
            debug_overlay: true,
            ..EngineConfig::default()
        };
        let mut host = Host::start(scene(), vec![], config);
        assert_eq!(host.engine.renderer().overlay_leaves.len(), 3);
        assert_eq!(host.engine.renderer().overlay_groups.len(), 1);

        host.engine.shutdown();
        assert!(host.engine.renderer().overlay_leaves.is_empty());
        assert!(host.engine.renderer().focus.is_none());
        assert_eq!(host.engine.navigator().depth(), 0);
        assert_eq!(host.engine.discovery().surface_count(), 0);
    }

    #[test]
    fn snapshot_reports_focus_and_changes_hash_on_move() {
        let mut host = Host::start(scene(), vec![], EngineConfig::default());
        let before = host.engine.snapshot(&host.tree);
        assert_eq!(before.focused.as_deref(), Some("Main:Window#1/Open:Button"));
        assert_eq!(before.contexts.len(), 1);
        assert_eq!(before.page, PAGE_NAV);

        host.press("right");
        let after = host.engine.snapshot(&host.tree);
        assert_ne!(before.content_hash, after.content_hash);
        let focused: Vec<_> = after
            .nodes
            .as_ref()
            .unwrap()
            .iter()
            .filter(|n| n.focused)
            .collect();
        assert_eq!(focused.len(), 1);
        assert_eq!(focused[0].path, "Main:Window#1/Delete:Button");
    }
}
