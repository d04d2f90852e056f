//! Navigation core.
//!
//! [`Navigator`] owns the context stack and the focus inside each context.
//! It never writes to the node table: it reads [`Discovery`], reacts to its
//! [`DiscoveryEvent`]s, and holds plain [`NodeId`]s that it re-validates
//! before every use. Work that has to wait for layout or teardown is posted
//! to the [`Scheduler`] and checked for staleness when it runs.
//!
//! Per context, focus goes through
//! `created → initialized → moved* → (cleared on unload → initialized)* → popped`.

pub mod adjust;
pub mod context;
pub mod direction;

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::discovery::{Discovery, DiscoveryEvent};
use crate::element::ElementTree;
use crate::geometry::{AdjustDirection, Direction, Rect};
use crate::node::{Node, NodeId, Role};
use crate::path::is_within_scope;
use crate::scheduler::{Priority, Scheduler, Task};

use adjust::{Adjustable, AdjustableKind};
use context::{ContextId, ContextType, NavigationContext};
use direction::{find_in_direction, initial_focus, Placed, Scoring};

/// Result of a directional move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { from: NodeId, to: NodeId },
    /// There was no valid focus, so reading-order focus was picked instead.
    Initialized { to: NodeId },
    /// Nothing lies in that direction; focus is unchanged.
    NoCandidate,
    NoContext,
}

/// Result of a value adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdjustOutcome {
    Adjusted { node: NodeId, value: f64 },
    /// Already at the end of the range, or the host refused the value.
    Unchanged,
    NotInteractive,
}

/// The context stack and everything focus-related.
#[derive(Debug)]
pub struct Navigator {
    stack: Vec<NavigationContext>,
    /// Modal groups that opened with nothing to navigate to.
    ignored: HashSet<NodeId>,
    next_context: u64,
    scoring: Scoring,
    mismatches: u64,
}

impl Navigator {
    #[must_use]
    pub fn new(scoring: Scoring) -> Self {
        Self {
            stack: Vec::new(),
            ignored: HashSet::new(),
            next_context: 1,
            scoring,
            mismatches: 0,
        }
    }

    /// The stack, bottom first.
    #[must_use]
    pub fn contexts(&self) -> &[NavigationContext] {
        &self.stack
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn active(&self) -> Option<&NavigationContext> {
        self.stack.last()
    }

    #[must_use]
    pub fn focused(&self) -> Option<NodeId> {
        self.active()?.focused
    }

    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.active().is_some_and(NavigationContext::is_interactive)
    }

    #[must_use]
    pub fn is_ignored(&self, node: NodeId) -> bool {
        self.ignored.contains(&node)
    }

    /// Modal closes that matched no context and no ignored scope.
    #[must_use]
    pub fn mismatches(&self) -> u64 {
        self.mismatches
    }

    #[must_use]
    pub fn scoring(&self) -> &Scoring {
        &self.scoring
    }

    /// Whether `node` is inside the active context's scope.
    #[must_use]
    pub fn in_active_scope(&self, node: NodeId, discovery: &Discovery) -> bool {
        match (self.active(), discovery.node(node)) {
            (Some(ctx), Some(n)) => ctx.contains(node, n),
            _ => false,
        }
    }

    /// React to a batch of discovery events, in order.
    pub fn handle_events(
        &mut self,
        events: &[DiscoveryEvent],
        discovery: &Discovery,
        scheduler: &mut Scheduler,
    ) {
        for event in events {
            match event {
                DiscoveryEvent::ModalOpened { node } => {
                    self.on_modal_opened(*node, discovery, scheduler);
                }
                DiscoveryEvent::ModalClosed { node, path } => {
                    self.on_modal_closed(*node, path, scheduler);
                }
                DiscoveryEvent::Unloaded { node, .. } => self.on_unloaded(*node, scheduler),
            }
        }
    }

    fn on_modal_opened(&mut self, node: NodeId, discovery: &Discovery, scheduler: &mut Scheduler) {
        if self.ignored.contains(&node) || self.stack.iter().any(|c| c.scope == node) {
            return;
        }
        let Some(scope) = discovery.node(node) else {
            return;
        };
        let primary = discovery.is_primary_root(node);
        let leaves = discovery
            .nodes()
            .iter()
            .filter(|(_, n)| n.is_focus_candidate() && is_within_scope(&n.path, &scope.path))
            .count();

        // The primary surface always gets its root context so the stack has
        // a bottom even before any content is indexed.
        if leaves == 0 && !primary {
            debug!("Modal {} has nothing to navigate; ignoring", scope.path);
            self.ignored.insert(node);
            return;
        }

        let kind = if primary {
            ContextType::RootSurface
        } else {
            ContextType::ModalScope
        };
        let id = self.push(kind, node, scope.path.clone());
        debug!(
            "Pushed {:?} context {} for {} ({} leaves, depth {})",
            kind,
            id,
            scope.path,
            leaves,
            self.stack.len()
        );
        let priority = if primary {
            Priority::Layout
        } else {
            Priority::Settled
        };
        scheduler.post(priority, Task::InitFocus { context: id });
    }

    fn on_modal_closed(&mut self, node: NodeId, path: &str, scheduler: &mut Scheduler) {
        if self.ignored.remove(&node) {
            trace!("Ignored modal {} closed", path);
            return;
        }
        let Some(index) = self
            .stack
            .iter()
            .rposition(|c| c.scope == node && !c.is_interactive())
        else {
            warn!("Close of modal {} matches no navigation context", path);
            self.mismatches += 1;
            return;
        };

        let top_before = self.active().map(|c| c.id);
        let scope_path = self.stack[index].scope_path.clone();
        let mut doomed: Vec<usize> = (index..self.stack.len())
            .filter(|&i| i == index || is_within_scope(&self.stack[i].scope_path, &scope_path))
            .collect();
        if doomed.len() == self.stack.len() {
            // Never pop the last context; it just loses its focus.
            doomed.remove(0);
            if let Some(bottom) = self.stack.first_mut() {
                bottom.focused = None;
                debug!("Scope of last context {} closed; focus cleared", bottom.id);
            }
        }
        for i in doomed.into_iter().rev() {
            let ctx = self.stack.remove(i);
            debug!("Popped context {} ({})", ctx.id, ctx.scope_path);
        }

        if let Some(top) = self.active() {
            if Some(top.id) != top_before {
                scheduler.post(Priority::Idle, Task::RestoreFocus { context: top.id });
            }
        }
    }

    fn on_unloaded(&mut self, node: NodeId, scheduler: &mut Scheduler) {
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        if top.focused == Some(node) {
            debug!("Focused node {} unloaded; reinitializing later", node);
            top.focused = None;
            scheduler.post(Priority::Idle, Task::ReinitFocus { context: top.id });
        }
    }

    /// Detect focus that died without an explicit unload (scan removals are
    /// silent). Interactive contexts whose control is gone are popped.
    ///
    /// Returns whether anything changed.
    pub fn reconcile<T: ElementTree + ?Sized>(
        &mut self,
        discovery: &Discovery,
        tree: &T,
        scheduler: &mut Scheduler,
    ) -> bool {
        let mut changed = false;
        while let Some(top) = self.stack.last() {
            if !top.is_interactive() || node_is_live(top.scope, discovery, tree) {
                break;
            }
            let scope = top.scope;
            self.stack.pop();
            debug!("Adjusted control {} is gone; leaving interactive mode", scope);
            if let Some(parent) = self.stack.last_mut() {
                if parent.focused == Some(scope) {
                    parent.focused = None;
                }
                scheduler.post(Priority::Idle, Task::ReinitFocus { context: parent.id });
            }
            changed = true;
        }

        let stale = self.active().and_then(|ctx| {
            ctx.focused
                .filter(|id| !focus_is_valid(ctx, *id, discovery, tree))
                .map(|id| (ctx.id, id))
        });
        if let Some((context, node)) = stale {
            debug!("Focused node {} no longer valid; reinitializing later", node);
            if let Some(top) = self.stack.last_mut() {
                top.focused = None;
            }
            scheduler.post(Priority::Idle, Task::ReinitFocus { context });
            changed = true;
        }
        changed
    }

    /// Run a deferred focus task. Tasks for a context that is no longer on
    /// top are dropped. Returns whether focus changed.
    pub fn run_task<T: ElementTree + ?Sized>(
        &mut self,
        task: Task,
        discovery: &Discovery,
        tree: &T,
    ) -> bool {
        let context = match task {
            Task::InitFocus { context }
            | Task::RestoreFocus { context }
            | Task::ReinitFocus { context } => context,
            Task::TrailingScan { .. } => return false,
        };
        let Some(top) = self.active().filter(|c| c.id == context) else {
            trace!("Dropping stale {:?}", task);
            return false;
        };
        if let Some(id) = top.focused {
            if focus_is_valid(top, id, discovery, tree) {
                return false;
            }
            debug!("Recorded focus {} in context {} is stale", id, context);
        }
        self.initialize_focus(discovery, tree).is_some()
    }

    /// Pick reading-order focus in the active context.
    pub fn initialize_focus<T: ElementTree + ?Sized>(
        &mut self,
        discovery: &Discovery,
        tree: &T,
    ) -> Option<NodeId> {
        let ctx = self.stack.last()?;
        let candidates = focus_candidates(ctx, discovery, tree);
        let target = initial_focus(&candidates, &self.scoring);
        let ctx = self.stack.last_mut()?;
        ctx.focused = target;
        match target {
            Some(id) => debug!("Initial focus in {} -> {}", ctx.id, id),
            None => trace!("No focus candidate in {}", ctx.id),
        }
        target
    }

    /// Move focus toward `direction`: the current node's group first, then
    /// the whole scope.
    pub fn move_focus<T: ElementTree + ?Sized>(
        &mut self,
        direction: Direction,
        discovery: &Discovery,
        tree: &T,
    ) -> MoveOutcome {
        let Some(ctx) = self.stack.last() else {
            return MoveOutcome::NoContext;
        };
        let current = ctx
            .focused
            .filter(|id| focus_is_valid(ctx, *id, discovery, tree));
        let Some(current) = current else {
            return match self.initialize_focus(discovery, tree) {
                Some(to) => MoveOutcome::Initialized { to },
                None => MoveOutcome::NoCandidate,
            };
        };

        let nodes = discovery.nodes();
        let Some(from) = nodes.get(current).and_then(|n| place(current, n, tree)) else {
            trace!("Focused node {} has no usable bounds", current);
            return MoveOutcome::NoCandidate;
        };
        let candidates = focus_candidates(ctx, discovery, tree);

        let group = nodes
            .nearest_group(current)
            .filter(|g| nodes.get(*g).is_some_and(|n| !n.modal));
        let local = group.and_then(|g| {
            let members: Vec<Placed> = candidates
                .iter()
                .filter(|c| nodes.is_descendant_of(c.id, g))
                .copied()
                .collect();
            find_in_direction(&from, &members, direction, &self.scoring)
        });
        let target =
            local.or_else(|| find_in_direction(&from, &candidates, direction, &self.scoring));

        match target {
            Some(to) => {
                if let Some(ctx) = self.stack.last_mut() {
                    ctx.focused = Some(to);
                }
                trace!("Moved {:?}: {} -> {}", direction, current, to);
                MoveOutcome::Moved { from: current, to }
            }
            None => MoveOutcome::NoCandidate,
        }
    }

    /// Focus a specific node in the active scope.
    pub fn focus_node<T: ElementTree + ?Sized>(
        &mut self,
        node: NodeId,
        discovery: &Discovery,
        tree: &T,
    ) -> bool {
        let Some(ctx) = self.stack.last_mut() else {
            return false;
        };
        if ctx.is_interactive() || !focus_is_valid(ctx, node, discovery, tree) {
            return false;
        }
        ctx.focused = Some(node);
        true
    }

    /// Start adjusting `node`'s value. The control must be in scope and of an
    /// adjustable kind, and not already being adjusted.
    pub fn enter_interaction<T: ElementTree + ?Sized>(
        &mut self,
        node: NodeId,
        discovery: &Discovery,
        tree: &T,
    ) -> bool {
        let Some(top) = self.stack.last_mut() else {
            return false;
        };
        let Some(n) = discovery.node(node) else {
            return false;
        };
        if top.is_interactive()
            || !top.contains(node, n)
            || !n.navigable
            || !AdjustableKind::supports(&n.kind)
        {
            return false;
        }
        let Some(range) = tree.range_value(n.element) else {
            trace!("{} reports no value", n.path);
            return false;
        };

        top.focused = Some(node);
        self.push(ContextType::InteractiveElement, node, n.path.clone());
        if let Some(ctx) = self.stack.last_mut() {
            ctx.focused = Some(node);
            ctx.original_value = Some(range.value);
        }
        debug!("Interactive mode on {} (value {})", n.path, range.value);
        true
    }

    /// Leave interactive mode, optionally putting the original value back.
    /// Focus in the parent context returns to the control.
    pub fn exit_interaction<T: ElementTree + ?Sized>(
        &mut self,
        revert: bool,
        discovery: &Discovery,
        tree: &mut T,
    ) -> bool {
        if !self.is_interactive() {
            return false;
        }
        let Some(ctx) = self.stack.pop() else {
            return false;
        };
        let node = discovery.node(ctx.scope);
        if revert {
            if let (Some(original), Some(n)) = (ctx.original_value, node) {
                if !tree.set_value(n.element, original) {
                    debug!("Could not restore {} to {}", n.path, original);
                }
            }
        }
        if let Some(parent) = self.stack.last_mut() {
            let keep = node.is_some_and(|n| tree.is_alive(n.element) && parent.contains(ctx.scope, n));
            parent.focused = keep.then_some(ctx.scope);
        }
        debug!("Left interactive mode on {} (revert: {})", ctx.scope_path, revert);
        true
    }

    /// Step the adjusted control's value.
    pub fn adjust<T: ElementTree + ?Sized>(
        &mut self,
        direction: AdjustDirection,
        discovery: &Discovery,
        tree: &mut T,
    ) -> AdjustOutcome {
        let Some(ctx) = self.active().filter(|c| c.is_interactive()) else {
            return AdjustOutcome::NotInteractive;
        };
        let Some(node) = discovery.node(ctx.scope) else {
            return AdjustOutcome::Unchanged;
        };
        let Some(control) = tree
            .range_value(node.element)
            .and_then(|range| AdjustableKind::for_element(&node.kind, range))
        else {
            return AdjustOutcome::Unchanged;
        };

        let value = control.adjusted(direction);
        if (value - control.value()).abs() < f64::EPSILON || !tree.set_value(node.element, value) {
            return AdjustOutcome::Unchanged;
        }
        trace!("Adjusted {} to {}", node.path, value);
        AdjustOutcome::Adjusted {
            node: ctx.scope,
            value,
        }
    }

    /// Screen rectangle of the focused node.
    #[must_use]
    pub fn focused_bounds<T: ElementTree + ?Sized>(
        &self,
        discovery: &Discovery,
        tree: &T,
    ) -> Option<Rect> {
        let node = discovery.node(self.focused()?)?;
        tree.bounds(node.element).filter(Rect::is_usable)
    }

    /// Drop every context.
    pub fn clear(&mut self) {
        self.stack.clear();
        self.ignored.clear();
    }

    fn push(&mut self, kind: ContextType, scope: NodeId, scope_path: String) -> ContextId {
        let id = ContextId(self.next_context);
        self.next_context += 1;
        self.stack
            .push(NavigationContext::new(id, kind, scope, scope_path));
        id
    }
}

fn node_is_live<T: ElementTree + ?Sized>(id: NodeId, discovery: &Discovery, tree: &T) -> bool {
    discovery
        .node(id)
        .is_some_and(|n| tree.is_alive(n.element))
}

/// A recorded focus is usable if its node is still indexed, its element is
/// alive, and it is still inside the context's scope.
fn focus_is_valid<T: ElementTree + ?Sized>(
    ctx: &NavigationContext,
    id: NodeId,
    discovery: &Discovery,
    tree: &T,
) -> bool {
    discovery.node(id).is_some_and(|n| {
        tree.is_alive(n.element) && ctx.contains(id, n) && n.role == Role::Leaf
    })
}

fn focus_candidates<T: ElementTree + ?Sized>(
    ctx: &NavigationContext,
    discovery: &Discovery,
    tree: &T,
) -> Vec<Placed> {
    discovery
        .nodes()
        .iter()
        .filter(|(id, n)| n.is_focus_candidate() && ctx.contains(*id, n))
        .filter_map(|(id, n)| place(id, n, tree))
        .collect()
}

fn place<T: ElementTree + ?Sized>(id: NodeId, node: &Node, tree: &T) -> Option<Placed> {
    let Some(bounds) = tree.bounds(node.element).filter(Rect::is_usable) else {
        trace!("No usable bounds for {}", node.path);
        return None;
    };
    Some(Placed {
        id,
        parent: node.parent(),
        center: bounds.center(),
        seq: node.seq,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::classifier::Classifier;
    use crate::discovery::DiscoveryUpdate;
    use crate::element::{ElementKind, HostNotification};
    use crate::memory::{ElementSpec, MemoryTree, Scene, SurfaceSpec};
    use crate::rules::{RawRule, RuleLoadMode, RuleSet};

    struct Rig {
        tree: MemoryTree,
        discovery: Discovery,
        scheduler: Scheduler,
        nav: Navigator,
        now: Instant,
    }

    impl Rig {
        fn new(scene: Scene, rules: Vec<RawRule>) -> Self {
            let rules = RuleSet::compile(rules, RuleLoadMode::Strict).unwrap();
            let mut rig = Rig {
                tree: MemoryTree::from_scene(scene).unwrap(),
                discovery: Discovery::new(
                    Classifier::new(Arc::new(rules)),
                    Duration::from_millis(500),
                ),
                scheduler: Scheduler::new(),
                nav: Navigator::new(Scoring::default()),
                now: Instant::now(),
            };
            let root = rig.tree.main_root();
            let (_, update) = rig.discovery.register_surface(&rig.tree, root, None, rig.now);
            rig.deliver(update);
            rig.settle();
            rig
        }

        fn deliver(&mut self, update: DiscoveryUpdate) {
            self.nav
                .handle_events(&update.events, &self.discovery, &mut self.scheduler);
            for (surface, due) in update.trailing {
                self.scheduler
                    .post_at(due, Priority::Input, Task::TrailingScan { surface });
            }
            self.nav
                .reconcile(&self.discovery, &self.tree, &mut self.scheduler);
        }

        /// Route queued host notifications, then run everything that is due.
        fn settle(&mut self) {
            for note in self.tree.take_notifications() {
                let update = match note {
                    HostNotification::SurfaceOpened { root, anchor } => {
                        self.discovery
                            .register_surface(&self.tree, root, anchor, self.now)
                            .1
                    }
                    HostNotification::SurfaceClosed { root } => {
                        self.discovery.unregister_root(root)
                    }
                    HostNotification::Unloaded { element } => {
                        self.discovery
                            .handle_unloaded(&self.tree, element, self.now)
                    }
                    _ => DiscoveryUpdate::default(),
                };
                self.deliver(update);
            }
            while let Some(task) = self.scheduler.pop_ready(self.now) {
                if let Task::TrailingScan { surface } = task {
                    let update = self.discovery.fire_trailing(&self.tree, surface, self.now);
                    self.deliver(update);
                } else {
                    self.nav.run_task(task, &self.discovery, &self.tree);
                }
            }
        }

        fn node(&self, name: &str) -> NodeId {
            self.discovery
                .nodes()
                .node_for_element(self.tree.find(name).unwrap())
                .unwrap()
        }

        fn focused_name(&self) -> Option<String> {
            let node = self.discovery.node(self.nav.focused()?)?;
            self.tree.info(node.element)?.name
        }

        fn go(&mut self, direction: Direction) -> MoveOutcome {
            self.nav.move_focus(direction, &self.discovery, &self.tree)
        }
    }

    fn button(name: &str, x: f64, y: f64) -> ElementSpec {
        ElementSpec::new(ElementKind::Button)
            .named(name)
            .at(x, y, 40.0, 20.0)
    }

    fn window() -> ElementSpec {
        ElementSpec::new(ElementKind::Window)
            .named("Root")
            .at(0.0, 0.0, 800.0, 600.0)
    }

    fn panel_scene() -> Scene {
        Scene {
            main: window().child(
                ElementSpec::new(ElementKind::Panel)
                    .named("PanelA")
                    .at(0.0, 0.0, 400.0, 100.0)
                    .child(button("Btn1", 10.0, 10.0))
                    .child(button("Btn2", 110.0, 10.0)),
            ),
            surfaces: vec![],
        }
    }

    #[test]
    fn panel_scenario_focuses_then_moves_right() {
        let mut rig = Rig::new(
            panel_scene(),
            vec![RawRule::role("**/PanelA:Panel", Role::Group)],
        );
        assert_eq!(rig.nav.depth(), 1);
        assert_eq!(rig.nav.active().unwrap().kind, ContextType::RootSurface);
        assert_eq!(rig.focused_name().as_deref(), Some("Btn1"));

        let outcome = rig.go(Direction::Right);
        assert!(matches!(outcome, MoveOutcome::Moved { .. }));
        assert_eq!(rig.focused_name().as_deref(), Some("Btn2"));

        assert_eq!(rig.go(Direction::Right), MoveOutcome::NoCandidate);
        assert_eq!(rig.focused_name().as_deref(), Some("Btn2"));
    }

    #[test]
    fn empty_modal_is_ignored_and_its_close_discounted() {
        let mut scene = panel_scene();
        scene.main = scene.main.child(
            ElementSpec::new(ElementKind::Panel)
                .named("Tip")
                .at(500.0, 0.0, 50.0, 20.0)
                .child(ElementSpec::new(ElementKind::Text).named("Hint")),
        );
        let mut rig = Rig::new(
            scene,
            vec![RawRule::role("**/Tip:Panel", Role::Group).with_modal(true)],
        );
        let tip = rig.node("Tip");
        assert!(rig.nav.is_ignored(tip));
        assert_eq!(rig.nav.depth(), 1);

        let element = rig.tree.find("Tip").unwrap();
        rig.tree.remove(element).unwrap();
        rig.settle();
        assert_eq!(rig.nav.depth(), 1);
        assert_eq!(rig.nav.mismatches(), 0);
        assert!(!rig.nav.is_ignored(tip));
    }

    fn popup_scene() -> Scene {
        Scene {
            main: window()
                .child(button("Open", 10.0, 10.0).opens("menu"))
                .child(button("Other", 110.0, 10.0).opens("side")),
            surfaces: vec![
                SurfaceSpec {
                    root: ElementSpec::new(ElementKind::Popup)
                        .id("menu")
                        .at(10.0, 40.0, 100.0, 80.0)
                        .child(button("Cut", 15.0, 45.0))
                        .child(button("Copy", 15.0, 75.0)),
                    anchor: Some("Open".into()),
                    open: false,
                },
                SurfaceSpec {
                    root: ElementSpec::new(ElementKind::Popup)
                        .id("side")
                        .at(300.0, 40.0, 100.0, 80.0)
                        .child(button("Far", 305.0, 45.0)),
                    anchor: Some("Other".into()),
                    open: false,
                },
            ],
        }
    }

    #[test]
    fn popup_pushes_scope_and_close_restores_focus() {
        let mut rig = Rig::new(popup_scene(), vec![]);
        rig.go(Direction::Right);
        assert_eq!(rig.focused_name().as_deref(), Some("Other"));

        rig.tree.open_surface("menu").unwrap();
        rig.settle();
        assert_eq!(rig.nav.depth(), 2);
        assert_eq!(rig.nav.active().unwrap().kind, ContextType::ModalScope);
        assert_eq!(rig.focused_name().as_deref(), Some("Cut"));

        // Modal scopes are hard boundaries.
        assert_eq!(rig.go(Direction::Up), MoveOutcome::NoCandidate);
        rig.go(Direction::Down);
        assert_eq!(rig.focused_name().as_deref(), Some("Copy"));

        rig.tree.close_surface("menu").unwrap();
        rig.settle();
        assert_eq!(rig.nav.depth(), 1);
        assert_eq!(rig.focused_name().as_deref(), Some("Other"));
    }

    #[test]
    fn out_of_order_close_removes_the_matching_context() {
        let mut rig = Rig::new(popup_scene(), vec![]);
        rig.tree.open_surface("menu").unwrap();
        rig.settle();
        rig.tree.open_surface("side").unwrap();
        rig.settle();
        assert_eq!(rig.nav.depth(), 3);
        assert_eq!(rig.focused_name().as_deref(), Some("Far"));

        rig.tree.close_surface("menu").unwrap();
        rig.settle();
        assert_eq!(rig.nav.depth(), 2);
        assert_eq!(rig.focused_name().as_deref(), Some("Far"));
        assert_eq!(rig.nav.mismatches(), 0);
    }

    #[test]
    fn last_context_is_never_popped() {
        let mut rig = Rig::new(panel_scene(), vec![]);
        let root = rig.nav.active().unwrap().scope;
        let path = rig.nav.active().unwrap().scope_path.clone();
        rig.nav.handle_events(
            &[
                DiscoveryEvent::ModalClosed {
                    node: root,
                    path: path.clone(),
                },
                DiscoveryEvent::ModalClosed { node: root, path },
            ],
            &rig.discovery,
            &mut rig.scheduler,
        );
        assert_eq!(rig.nav.depth(), 1);
        assert_eq!(rig.nav.focused(), None);
    }

    #[test]
    fn unknown_close_is_counted_not_applied() {
        let mut rig = Rig::new(popup_scene(), vec![]);
        let stray = rig.node("Open");
        rig.nav.handle_events(
            &[DiscoveryEvent::ModalClosed {
                node: stray,
                path: "Nowhere:Popup#9".into(),
            }],
            &rig.discovery,
            &mut rig.scheduler,
        );
        assert_eq!(rig.nav.depth(), 1);
        assert_eq!(rig.nav.mismatches(), 1);
    }

    #[test]
    fn group_members_are_tried_first() {
        let scene = Scene {
            main: window()
                .child(
                    ElementSpec::new(ElementKind::GroupBox)
                        .named("Column")
                        .at(0.0, 0.0, 60.0, 200.0)
                        .child(button("Top", 0.0, 0.0))
                        .child(button("Bottom", 0.0, 100.0)),
                )
                .child(button("Aside", 10.0, 50.0)),
            surfaces: vec![],
        };
        let mut rig = Rig::new(scene, vec![]);
        assert_eq!(rig.focused_name().as_deref(), Some("Top"));

        rig.go(Direction::Down);
        assert_eq!(rig.focused_name().as_deref(), Some("Bottom"));

        rig.go(Direction::Up);
        rig.go(Direction::Right);
        assert_eq!(rig.focused_name().as_deref(), Some("Aside"));
    }

    fn slider_scene() -> Scene {
        Scene {
            main: window()
                .child(button("Play", 10.0, 10.0))
                .child(
                    ElementSpec::new(ElementKind::Slider)
                        .named("Volume")
                        .at(110.0, 10.0, 100.0, 20.0)
                        .range(50.0, 0.0, 100.0),
                ),
            surfaces: vec![],
        }
    }

    fn volume(rig: &Rig) -> f64 {
        rig.tree
            .range_value(rig.tree.find("Volume").unwrap())
            .unwrap()
            .value
    }

    #[test]
    fn interaction_revert_restores_exact_value() {
        let mut rig = Rig::new(slider_scene(), vec![]);
        let slider = rig.node("Volume");
        assert!(rig.nav.enter_interaction(slider, &rig.discovery, &rig.tree));
        assert!(rig.nav.is_interactive());
        assert_eq!(rig.nav.depth(), 2);

        let outcome = rig
            .nav
            .adjust(AdjustDirection::Up, &rig.discovery, &mut rig.tree);
        assert_eq!(
            outcome,
            AdjustOutcome::Adjusted {
                node: slider,
                value: 55.0
            }
        );
        rig.nav
            .adjust(AdjustDirection::Up, &rig.discovery, &mut rig.tree);
        assert_eq!(volume(&rig), 60.0);

        assert!(rig.nav.exit_interaction(true, &rig.discovery, &mut rig.tree));
        assert_eq!(volume(&rig), 50.0);
        assert_eq!(rig.nav.depth(), 1);
        assert_eq!(rig.nav.focused(), Some(slider));
    }

    #[test]
    fn interaction_keep_preserves_adjusted_value() {
        let mut rig = Rig::new(slider_scene(), vec![]);
        let slider = rig.node("Volume");
        rig.nav.enter_interaction(slider, &rig.discovery, &rig.tree);
        rig.nav
            .adjust(AdjustDirection::Down, &rig.discovery, &mut rig.tree);
        rig.nav.exit_interaction(false, &rig.discovery, &mut rig.tree);
        assert_eq!(volume(&rig), 45.0);
        assert_eq!(rig.focused_name().as_deref(), Some("Volume"));
    }

    #[test]
    fn buttons_do_not_enter_interaction() {
        let mut rig = Rig::new(slider_scene(), vec![]);
        let play = rig.node("Play");
        assert!(!rig.nav.enter_interaction(play, &rig.discovery, &rig.tree));
        assert_eq!(
            rig.nav
                .adjust(AdjustDirection::Up, &rig.discovery, &mut rig.tree),
            AdjustOutcome::NotInteractive
        );
    }

    #[test]
    fn unloading_the_focused_node_reinitializes_later() {
        let mut rig = Rig::new(slider_scene(), vec![]);
        assert_eq!(rig.focused_name().as_deref(), Some("Play"));

        let element = rig.tree.find("Play").unwrap();
        rig.tree.remove(element).unwrap();
        for note in rig.tree.take_notifications() {
            if let HostNotification::Unloaded { element } = note {
                let update = rig.discovery.handle_unloaded(&rig.tree, element, rig.now);
                rig.nav
                    .handle_events(&update.events, &rig.discovery, &mut rig.scheduler);
            }
        }
        assert_eq!(rig.nav.focused(), None, "cleared immediately");
        assert!(rig.scheduler.has_ready());

        rig.settle();
        assert_eq!(rig.focused_name().as_deref(), Some("Volume"));
    }

    #[test]
    fn stale_init_task_is_dropped() {
        let mut rig = Rig::new(popup_scene(), vec![]);
        let stale = Task::InitFocus {
            context: ContextId(999),
        };
        assert!(!rig.nav.run_task(stale, &rig.discovery, &rig.tree));
    }
}
