//! Per-surface scanning.
//!
//! A [`SurfaceScanner`] owns the scan session of one independently rendered
//! surface: the set of nodes it discovered last time and its rate-limit
//! state. Each scan walks the host tree, classifies what it has not seen
//! before, links nodes to their nearest tracked ancestor, and diffs against
//! the previous scan. The result is a single [`ScanBatch`].
//!
//! # Rate limiting
//!
//! Requests are debounced with a guaranteed trailing scan. With a window `R`:
//!
//! - at least `R` since the last scan: scan now
//! - otherwise, no trailing scan pending: arm one for `now + R`
//! - otherwise: nothing, the pending trailing scan will pick this up
//!
//! A pending trailing scan is never pushed back or cancelled, so a burst of
//! layout notifications costs at most one scan per window plus one at the end.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::classifier::{child_path, AncestorInfo, Candidate, Classifier};
use crate::element::{ElementId, ElementInfo, ElementTree};
use crate::node::{NodeId, NodeTable};

/// Identifies one rendering surface. Also used as the path suffix of the
/// surface's top-level segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// What a scan request turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRequest {
    /// Scan right away.
    Immediate,
    /// A trailing scan was armed for this deadline.
    Trailing(Instant),
    /// Already covered by a pending trailing scan.
    Coalesced,
}

/// A node dropped by a scan. The node itself is already gone from the
/// table; this keeps what event consumers need to know about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedNode {
    pub id: NodeId,
    pub element: ElementId,
    pub path: String,
    pub modal_group: bool,
    pub seq: u64,
}

/// A different surface's root found while walking this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedSurface {
    pub root: ElementId,
    pub anchor: Option<ElementId>,
}

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanBatch {
    pub surface: SurfaceId,
    /// New nodes, in discovery order. Already linked.
    pub added: Vec<NodeId>,
    /// Dropped nodes, in discovery order. Already unlinked and removed.
    pub removed: Vec<RemovedNode>,
    pub nested_surfaces: Vec<NestedSurface>,
}

impl ScanBatch {
    fn new(surface: SurfaceId) -> Self {
        Self {
            surface,
            added: Vec::new(),
            removed: Vec::new(),
            nested_surfaces: Vec::new(),
        }
    }

    /// No nodes added or removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

struct Frame {
    element: ElementId,
    container: Option<ElementId>,
    ancestor_visible: bool,
    parent_path: Option<Rc<str>>,
    nearest: Option<NodeId>,
}

/// Scan session for one surface.
#[derive(Debug)]
pub struct SurfaceScanner {
    id: SurfaceId,
    root: ElementId,
    interval: Duration,
    last_scan: Option<Instant>,
    trailing: Option<Instant>,
    discovered: HashSet<NodeId>,
    scans: u64,
}

impl SurfaceScanner {
    #[must_use]
    pub fn new(id: SurfaceId, root: ElementId, interval: Duration) -> Self {
        Self {
            id,
            root,
            interval,
            last_scan: None,
            trailing: None,
            discovered: HashSet::new(),
            scans: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    #[must_use]
    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Number of scans run so far.
    #[must_use]
    pub fn scan_count(&self) -> u64 {
        self.scans
    }

    /// Apply the rate limit to a scan request.
    pub fn request(&mut self, now: Instant) -> ScanRequest {
        let due = self
            .last_scan
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            return ScanRequest::Immediate;
        }
        if self.trailing.is_some() {
            return ScanRequest::Coalesced;
        }
        let deadline = now + self.interval;
        self.trailing = Some(deadline);
        trace!("Surface {} trailing scan armed", self.id);
        ScanRequest::Trailing(deadline)
    }

    #[must_use]
    pub fn trailing_deadline(&self) -> Option<Instant> {
        self.trailing
    }

    /// Disarm the trailing scan if it is due. Returns whether the caller
    /// should scan now.
    pub fn take_trailing(&mut self, now: Instant) -> bool {
        match self.trailing {
            Some(deadline) if deadline <= now => {
                self.trailing = None;
                true
            }
            _ => false,
        }
    }

    /// Nodes found by the last scan.
    pub fn discovered(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.discovered.iter().copied()
    }

    #[must_use]
    pub fn owns(&self, id: NodeId) -> bool {
        self.discovered.contains(&id)
    }

    /// Drop a node from the session without waiting for the next scan.
    pub fn forget(&mut self, id: NodeId) {
        self.discovered.remove(&id);
    }

    /// Walk the surface and return the diff against the previous scan.
    ///
    /// `bridge` is the node that top-level nodes of this surface link to
    /// when nothing inside the surface is tracked above them.
    pub fn scan<T: ElementTree + ?Sized>(
        &mut self,
        tree: &T,
        nodes: &mut NodeTable,
        classifier: &Classifier,
        bridge: Option<NodeId>,
        now: Instant,
    ) -> ScanBatch {
        self.last_scan = Some(now);
        self.scans += 1;

        let mut batch = ScanBatch::new(self.id);
        let mut current: HashSet<NodeId> = HashSet::with_capacity(self.discovered.len());
        let mut visited: HashSet<ElementId> = HashSet::new();
        let mut stack = vec![Frame {
            element: self.root,
            container: None,
            ancestor_visible: true,
            parent_path: None,
            nearest: bridge,
        }];

        while let Some(frame) = stack.pop() {
            if !visited.insert(frame.element) {
                continue;
            }
            let Some(info) = tree.info(frame.element) else {
                continue;
            };
            if info.feedback_overlay {
                continue;
            }
            if frame.element != self.root && tree.is_surface_root(frame.element) {
                batch.nested_surfaces.push(NestedSurface {
                    root: frame.element,
                    anchor: tree.surface_anchor(frame.element).or(frame.container),
                });
                continue;
            }

            let visible = frame.ancestor_visible && tree.is_visible(frame.element);
            let path: Rc<str> = Rc::from(child_path(frame.parent_path.as_deref(), &info, self.id));

            let mut nearest = frame.nearest;
            if visible {
                if let Some(id) =
                    self.track(frame.element, &info, &path, frame.nearest, nodes, classifier, &mut batch)
                {
                    current.insert(id);
                    nearest = Some(id);
                }
            }

            for child in tree.children(frame.element).into_iter().rev() {
                stack.push(Frame {
                    element: child,
                    container: Some(frame.element),
                    ancestor_visible: visible,
                    parent_path: Some(Rc::clone(&path)),
                    nearest,
                });
            }
        }

        let mut removed: Vec<RemovedNode> = self
            .discovered
            .difference(&current)
            .filter_map(|id| {
                nodes.get(*id).map(|n| RemovedNode {
                    id: *id,
                    element: n.element,
                    path: n.path.clone(),
                    modal_group: n.is_modal_group(),
                    seq: n.seq,
                })
            })
            .collect();
        removed.sort_by_key(|r| r.seq);
        for r in &removed {
            nodes.remove(r.id);
        }
        batch.removed = removed;
        self.discovered = current;

        debug!(
            "Scanned surface {}: {} tracked, +{} -{}",
            self.id,
            self.discovered.len(),
            batch.added.len(),
            batch.removed.len()
        );
        batch
    }

    #[allow(clippy::too_many_arguments)]
    fn track(
        &self,
        element: ElementId,
        info: &ElementInfo,
        path: &str,
        parent: Option<NodeId>,
        nodes: &mut NodeTable,
        classifier: &Classifier,
        batch: &mut ScanBatch,
    ) -> Option<NodeId> {
        if let Some(id) = nodes.node_for_element(element) {
            if let Some(node) = nodes.get_mut(id) {
                node.navigable = info.enabled;
            }
            match parent {
                Some(p) => {
                    nodes.link(id, p);
                }
                None => nodes.detach_from_parent(id),
            }
            return Some(id);
        }

        let ancestor = parent.and_then(|p| nodes.get(p)).map(|n| AncestorInfo {
            role: n.role,
            modal: n.modal,
        });
        let node = classifier
            .classify(&Candidate {
                element,
                info,
                path,
                surface: self.id,
                ancestor,
            })
            .into_node()?;

        let id = nodes.insert(node);
        if let Some(p) = parent {
            if !nodes.link(id, p) {
                debug!("Could not link {} under {}", path, p);
            }
        }
        batch.added.push(id);
        Some(id)
    }

    /// Remove every node this session owns. Used when the surface goes away.
    pub fn teardown(&mut self, nodes: &mut NodeTable) -> Vec<RemovedNode> {
        let mut removed: Vec<RemovedNode> = self
            .discovered
            .drain()
            .filter_map(|id| {
                nodes.get(id).map(|n| RemovedNode {
                    id,
                    element: n.element,
                    path: n.path.clone(),
                    modal_group: n.is_modal_group(),
                    seq: n.seq,
                })
            })
            .collect();
        removed.sort_by_key(|r| r.seq);
        for r in &removed {
            nodes.remove(r.id);
        }
        self.trailing = None;
        removed
    }
}
