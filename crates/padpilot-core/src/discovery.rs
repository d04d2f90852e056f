//! Discovery aggregator.
//!
//! [`Discovery`] owns the global [`NodeTable`] and one [`SurfaceScanner`] per
//! surface. It is the only writer of nodes and links; everything else reads.
//!
//! # Events
//!
//! Node adds and removes are silent. The only events are coarse lifecycle
//! ones, and they are emitted only after the scan batch that caused them has
//! been fully committed and linked:
//!
//! - [`DiscoveryEvent::ModalClosed`] for every removed modal group, innermost
//!   first
//! - then [`DiscoveryEvent::ModalOpened`] for every added modal group,
//!   outermost first
//!
//! A consumer reacting to `ModalOpened` therefore always sees the complete
//! subtree of the opened node.
//!
//! # Cross-surface parents
//!
//! An overlay's root has no visual parent. Its nodes are linked to the
//! nearest tracked ancestor of the element the surface is anchored to,
//! following anchors across as many surfaces as needed (up to
//! [`MAX_BRIDGE_HOPS`]).

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::classifier::Classifier;
use crate::element::{ElementId, ElementTree};
use crate::node::{Node, NodeId, NodeTable};
use crate::scanner::{RemovedNode, ScanBatch, ScanRequest, SurfaceId, SurfaceScanner};

/// Maximum number of anchor hops followed when bridging a parent link.
pub const MAX_BRIDGE_HOPS: usize = 16;

/// Upper bound on ancestor walks inside one surface.
const MAX_DEPTH: usize = 4096;

/// Lifecycle notification for the navigation core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A modal group appeared. Its subtree is already indexed and linked.
    ModalOpened { node: NodeId },
    /// A modal group went away. `node` no longer resolves.
    ModalClosed { node: NodeId, path: String },
    /// A node was dropped because its element was unloaded.
    Unloaded { node: NodeId, element: ElementId },
}

/// Everything a discovery operation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryUpdate {
    pub events: Vec<DiscoveryEvent>,
    /// Nodes added, in discovery order.
    pub added: Vec<NodeId>,
    /// Trailing scans armed by this operation; the caller owns the timers.
    pub trailing: Vec<(SurfaceId, Instant)>,
    /// At least one scan ran.
    pub scanned: bool,
}

impl DiscoveryUpdate {
    pub fn absorb(&mut self, other: DiscoveryUpdate) {
        self.events.extend(other.events);
        self.added.extend(other.added);
        self.trailing.extend(other.trailing);
        self.scanned |= other.scanned;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.added.is_empty() && self.trailing.is_empty() && !self.scanned
    }
}

#[derive(Debug)]
struct SurfaceEntry {
    scanner: SurfaceScanner,
    anchor: Option<ElementId>,
    /// Surface the anchor lives on, resolved at registration.
    parent: Option<SurfaceId>,
}

/// Owner of the node table and all surface sessions.
#[derive(Debug)]
pub struct Discovery {
    nodes: NodeTable,
    surfaces: BTreeMap<SurfaceId, SurfaceEntry>,
    by_root: HashMap<ElementId, SurfaceId>,
    next_surface: u32,
    primary: Option<SurfaceId>,
    classifier: Classifier,
    interval: Duration,
}

impl Discovery {
    #[must_use]
    pub fn new(classifier: Classifier, interval: Duration) -> Self {
        Self {
            nodes: NodeTable::new(),
            surfaces: BTreeMap::new(),
            by_root: HashMap::new(),
            next_surface: 1,
            primary: None,
            classifier,
            interval,
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mirror the navigator's focus onto the node flags.
    pub fn set_focused(&mut self, focused: Option<NodeId>) {
        self.nodes.set_focused(focused);
    }

    /// The first surface ever registered.
    #[must_use]
    pub fn primary(&self) -> Option<SurfaceId> {
        self.primary
    }

    /// Whether `id` is the root node of the primary surface.
    #[must_use]
    pub fn is_primary_root(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        self.primary == Some(node.surface) && self.surface_root(node.surface) == Some(node.element)
    }

    #[must_use]
    pub fn surface_root(&self, surface: SurfaceId) -> Option<ElementId> {
        self.surfaces.get(&surface).map(|e| e.scanner.root())
    }

    #[must_use]
    pub fn surface_by_root(&self, root: ElementId) -> Option<SurfaceId> {
        self.by_root.get(&root).copied()
    }

    /// Registered surfaces with their root elements.
    pub fn surfaces(&self) -> impl Iterator<Item = (SurfaceId, ElementId)> + '_ {
        self.surfaces.iter().map(|(id, e)| (*id, e.scanner.root()))
    }

    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Scans run so far on a surface.
    #[must_use]
    pub fn scan_count(&self, surface: SurfaceId) -> u64 {
        self.surfaces
            .get(&surface)
            .map_or(0, |e| e.scanner.scan_count())
    }

    /// Start tracking a surface. Registering a known root is just a scan
    /// request for it.
    pub fn register_surface<T: ElementTree + ?Sized>(
        &mut self,
        tree: &T,
        root: ElementId,
        anchor: Option<ElementId>,
        now: Instant,
    ) -> (SurfaceId, DiscoveryUpdate) {
        if let Some(&existing) = self.by_root.get(&root) {
            trace!("Surface {} already registered, requesting scan", existing);
            return (existing, self.request_scan(tree, existing, now));
        }

        let id = SurfaceId(self.next_surface);
        self.next_surface += 1;
        let anchor = anchor.or_else(|| tree.surface_anchor(root));
        let parent = anchor.and_then(|a| self.surface_for_element(tree, a));

        self.surfaces.insert(
            id,
            SurfaceEntry {
                scanner: SurfaceScanner::new(id, root, self.interval),
                anchor,
                parent,
            },
        );
        self.by_root.insert(root, id);
        if self.primary.is_none() {
            self.primary = Some(id);
        }
        info!("Registered surface {} (root {}, anchor {:?})", id, root, anchor);

        (id, self.request_scan(tree, id, now))
    }

    /// Rate-limited scan request.
    pub fn request_scan<T: ElementTree + ?Sized>(
        &mut self,
        tree: &T,
        surface: SurfaceId,
        now: Instant,
    ) -> DiscoveryUpdate {
        let Some(entry) = self.surfaces.get_mut(&surface) else {
            return DiscoveryUpdate::default();
        };
        match entry.scanner.request(now) {
            ScanRequest::Immediate => self.run_scan(tree, surface, now),
            ScanRequest::Trailing(deadline) => DiscoveryUpdate {
                trailing: vec![(surface, deadline)],
                ..DiscoveryUpdate::default()
            },
            ScanRequest::Coalesced => DiscoveryUpdate::default(),
        }
    }

    /// Scan request for whatever surface contains `element`.
    pub fn request_scan_for<T: ElementTree + ?Sized>(
        &mut self,
        tree: &T,
        element: ElementId,
        now: Instant,
    ) -> DiscoveryUpdate {
        match self.surface_for_element(tree, element) {
            Some(surface) => self.request_scan(tree, surface, now),
            None => {
                trace!("No known surface contains {}", element);
                DiscoveryUpdate::default()
            }
        }
    }

    /// Run a due trailing scan. A trailing timer that is stale or early does nothing.
    pub fn fire_trailing<T: ElementTree + ?Sized>(
        &mut self,
        tree: &T,
        surface: SurfaceId,
        now: Instant,
    ) -> DiscoveryUpdate {
        let due = self
            .surfaces
            .get_mut(&surface)
            .is_some_and(|e| e.scanner.take_trailing(now));
        if due {
            self.run_scan(tree, surface, now)
        } else {
            DiscoveryUpdate::default()
        }
    }

    /// Scan a surface now, commit the batch, then emit its events.
    pub fn run_scan<T: ElementTree + ?Sized>(
        &mut self,
        tree: &T,
        surface: SurfaceId,
        now: Instant,
    ) -> DiscoveryUpdate {
        let bridge = self.bridge_parent(tree, surface);
        let Some(entry) = self.surfaces.get_mut(&surface) else {
            return DiscoveryUpdate::default();
        };
        let batch = entry
            .scanner
            .scan(tree, &mut self.nodes, &self.classifier, bridge, now);
        let ScanBatch {
            added,
            removed,
            nested_surfaces,
            ..
        } = batch;

        let mut update = DiscoveryUpdate {
            scanned: true,
            ..DiscoveryUpdate::default()
        };
        update.events.extend(modal_closes(&removed));
        update.events.extend(
            added
                .iter()
                .filter(|id| self.nodes.get(**id).is_some_and(Node::is_modal_group))
                .map(|id| DiscoveryEvent::ModalOpened { node: *id }),
        );
        update.added = added;

        for nested in nested_surfaces {
            let (_, nested_update) = self.register_surface(tree, nested.root, nested.anchor, now);
            update.absorb(nested_update);
        }
        update
    }

    /// Stop tracking a surface and every surface anchored to it.
    pub fn unregister_surface(&mut self, surface: SurfaceId) -> DiscoveryUpdate {
        let mut update = DiscoveryUpdate::default();
        let dependents: Vec<SurfaceId> = self
            .surfaces
            .iter()
            .filter(|(id, e)| e.parent == Some(surface) && **id != surface)
            .map(|(id, _)| *id)
            .collect();
        for dependent in dependents {
            update.absorb(self.unregister_surface(dependent));
        }

        let Some(mut entry) = self.surfaces.remove(&surface) else {
            return update;
        };
        self.by_root.remove(&entry.scanner.root());
        let removed = entry.scanner.teardown(&mut self.nodes);
        info!(
            "Unregistered surface {} ({} node(s) dropped)",
            surface,
            removed.len()
        );
        update.events.extend(modal_closes(&removed));
        update
    }

    /// Unregister the surface rooted at `root`, if any.
    pub fn unregister_root(&mut self, root: ElementId) -> DiscoveryUpdate {
        match self.by_root.get(&root).copied() {
            Some(surface) => self.unregister_surface(surface),
            None => DiscoveryUpdate::default(),
        }
    }

    /// React to an element being unloaded.
    ///
    /// The element's node and its same-surface node subtree are dropped at
    /// once, along with any other node whose element is already gone. The
    /// affected surfaces are then asked for a rescan so replacement content
    /// gets indexed.
    pub fn handle_unloaded<T: ElementTree + ?Sized>(
        &mut self,
        tree: &T,
        element: ElementId,
        now: Instant,
    ) -> DiscoveryUpdate {
        if let Some(&surface) = self.by_root.get(&element) {
            return self.unregister_surface(surface);
        }

        let mut doomed: Vec<NodeId> = Vec::new();
        if let Some(id) = self.nodes.node_for_element(element) {
            doomed.extend(self.same_surface_subtree(id));
        }
        for (id, node) in self.nodes.iter() {
            if !tree.is_alive(node.element) && !doomed.contains(&id) {
                doomed.push(id);
            }
        }
        self.drop_nodes(tree, doomed, now)
    }

    /// Treat nodes whose element died without notice as unloaded, and drop
    /// surfaces whose root died.
    pub fn reap_dead<T: ElementTree + ?Sized>(&mut self, tree: &T, now: Instant) -> DiscoveryUpdate {
        let mut update = DiscoveryUpdate::default();
        let dead_surfaces: Vec<SurfaceId> = self
            .surfaces
            .iter()
            .filter(|(_, e)| !tree.is_alive(e.scanner.root()))
            .map(|(id, _)| *id)
            .collect();
        for surface in dead_surfaces {
            debug!("Surface {} root died without notice", surface);
            update.absorb(self.unregister_surface(surface));
        }

        let dead: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| !tree.is_alive(n.element))
            .map(|(id, _)| id)
            .collect();
        if !dead.is_empty() {
            debug!("Reaping {} node(s) with dead elements", dead.len());
            update.absorb(self.drop_nodes(tree, dead, now));
        }
        update
    }

    /// Drop every surface and node.
    pub fn clear(&mut self) -> DiscoveryUpdate {
        let mut update = DiscoveryUpdate::default();
        let all: Vec<SurfaceId> = self.surfaces.keys().rev().copied().collect();
        for surface in all {
            update.absorb(self.unregister_surface(surface));
        }
        update
    }

    /// Surface that contains `element`: from its node if tracked, otherwise
    /// by walking the host tree up to a registered root.
    pub fn surface_for_element<T: ElementTree + ?Sized>(
        &self,
        tree: &T,
        element: ElementId,
    ) -> Option<SurfaceId> {
        if let Some(node) = self.nodes.node_for_element(element).and_then(|id| self.nodes.get(id)) {
            return Some(node.surface);
        }
        let mut current = element;
        for _ in 0..MAX_DEPTH {
            if let Some(&surface) = self.by_root.get(&current) {
                return Some(surface);
            }
            current = tree.parent(current)?;
        }
        None
    }

    /// Nearest tracked node reachable through the surface's anchor chain.
    pub fn bridge_parent<T: ElementTree + ?Sized>(
        &self,
        tree: &T,
        surface: SurfaceId,
    ) -> Option<NodeId> {
        let entry = self.surfaces.get(&surface)?;
        let mut anchor = entry.anchor;
        for _ in 0..MAX_BRIDGE_HOPS {
            let mut current = anchor?;
            let mut found_root = None;
            for _ in 0..MAX_DEPTH {
                if let Some(id) = self.nodes.node_for_element(current) {
                    return Some(id);
                }
                match tree.parent(current) {
                    Some(parent) => current = parent,
                    None => {
                        found_root = Some(current);
                        break;
                    }
                }
            }
            let root = found_root?;
            if root == entry.scanner.root() {
                return None;
            }
            anchor = self
                .by_root
                .get(&root)
                .and_then(|s| self.surfaces.get(s))
                .and_then(|e| e.anchor)
                .or_else(|| tree.surface_anchor(root));
        }
        debug!("Gave up bridging surface {} after {} hops", surface, MAX_BRIDGE_HOPS);
        None
    }

    /// `id` plus all node descendants on the same surface, parents first.
    fn same_surface_subtree(&self, id: NodeId) -> Vec<NodeId> {
        let Some(surface) = self.nodes.get(id).map(|n| n.surface) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            if node.surface != surface || out.contains(&current) {
                continue;
            }
            out.push(current);
            stack.extend(node.children().iter().rev().copied());
        }
        out
    }

    fn drop_nodes<T: ElementTree + ?Sized>(
        &mut self,
        tree: &T,
        ids: Vec<NodeId>,
        now: Instant,
    ) -> DiscoveryUpdate {
        let mut removed: Vec<(RemovedNode, SurfaceId)> = ids
            .into_iter()
            .filter_map(|id| {
                self.nodes.get(id).map(|n| {
                    (
                        RemovedNode {
                            id,
                            element: n.element,
                            path: n.path.clone(),
                            modal_group: n.is_modal_group(),
                            seq: n.seq,
                        },
                        n.surface,
                    )
                })
            })
            .collect();
        removed.sort_by_key(|(r, _)| r.seq);

        let mut touched: Vec<SurfaceId> = Vec::new();
        for (r, surface) in &removed {
            self.nodes.remove(r.id);
            if let Some(entry) = self.surfaces.get_mut(surface) {
                entry.scanner.forget(r.id);
            }
            if !touched.contains(surface) {
                touched.push(*surface);
            }
        }

        let removed: Vec<RemovedNode> = removed.into_iter().map(|(r, _)| r).collect();
        let mut update = DiscoveryUpdate::default();
        update.events.extend(modal_closes(&removed));
        update.events.extend(removed.iter().map(|r| DiscoveryEvent::Unloaded {
            node: r.id,
            element: r.element,
        }));

        for surface in touched {
            update.absorb(self.request_scan(tree, surface, now));
        }
        update
    }
}

/// `ModalClosed` for removed modal groups, innermost (latest discovered) first.
fn modal_closes(removed: &[RemovedNode]) -> impl Iterator<Item = DiscoveryEvent> + '_ {
    removed
        .iter()
        .rev()
        .filter(|r| r.modal_group)
        .map(|r| DiscoveryEvent::ModalClosed {
            node: r.id,
            path: r.path.clone(),
        })
}
