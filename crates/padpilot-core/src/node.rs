//! Tracked nodes and the global node table.
//!
//! A [`Node`] is a classified UI element the navigation core may care about.
//! Nodes live in a generation-stamped [`Arena`]; parent and child links are
//! [`NodeId`]s, so a removed node is detectable by anyone still holding its id.
//!
//! [`NodeTable`] is the only place links are written. It keeps them
//! bidirectionally consistent: a child lists its parent if and only if that
//! parent lists the child.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::arena::{Arena, Slot};
use crate::element::{ElementId, ElementKind};
use crate::rules::ShortcutMeta;
use crate::scanner::SurfaceId;

/// Role a node plays in navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A directly activatable target.
    Leaf,
    /// A container of other nodes.
    Group,
    /// Tracked for its path or metadata only; never a navigation stop.
    Undefined,
}

/// Handle to a node in the [`NodeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Slot);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}v{}", self.0.index, self.0.generation)
    }
}

/// A tracked, classified UI element.
#[derive(Debug, Clone)]
pub struct Node {
    /// Ancestor-chain identity. Computed once at creation.
    pub path: String,
    pub role: Role,
    pub modal: bool,
    pub navigable: bool,
    pub element: ElementId,
    pub surface: SurfaceId,
    pub kind: ElementKind,
    /// Automation id, name, or a kind+content fallback.
    pub stable_id: String,
    pub focused: bool,
    pub shortcut: Option<ShortcutMeta>,
    /// Control-surface page selected while this node is the active scope.
    pub page: Option<String>,
    /// Non-modal group directly inside another non-modal group.
    pub nested_group: bool,
    /// Discovery order, used for deterministic tie-breaks.
    pub seq: u64,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    /// Create an unlinked node.
    #[must_use]
    pub fn new(
        path: String,
        role: Role,
        element: ElementId,
        surface: SurfaceId,
        kind: ElementKind,
    ) -> Self {
        Self {
            path,
            role,
            modal: false,
            navigable: true,
            element,
            surface,
            kind,
            stable_id: String::new(),
            focused: false,
            shortcut: None,
            page: None,
            nested_group: false,
            seq: 0,
            parent: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Modal groups are the nodes that open and close navigation scopes.
    #[must_use]
    pub fn is_modal_group(&self) -> bool {
        self.modal && self.role == Role::Group
    }

    /// Leaves that can currently receive focus.
    #[must_use]
    pub fn is_focus_candidate(&self) -> bool {
        self.role == Role::Leaf && self.navigable
    }
}

/// The global element-to-node index.
#[derive(Debug, Default)]
pub struct NodeTable {
    arena: Arena<Node>,
    by_element: HashMap<ElementId, NodeId>,
    next_seq: u64,
}

impl NodeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node. Any previous node for the same element is replaced in
    /// the element index (the caller is expected to have removed it).
    pub fn insert(&mut self, mut node: Node) -> NodeId {
        self.next_seq += 1;
        node.seq = self.next_seq;
        node.parent = None;
        node.children.clear();
        let element = node.element;
        let id = NodeId(self.arena.insert(node));
        self.by_element.insert(element, id);
        id
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id.0)
    }

    /// Mutable access for attribute updates. Links stay private to the table.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.arena.get_mut(id.0)
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id.0)
    }

    #[must_use]
    pub fn node_for_element(&self, element: ElementId) -> Option<NodeId> {
        self.by_element
            .get(&element)
            .copied()
            .filter(|id| self.contains(*id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Live nodes in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.arena.iter().map(|(slot, node)| (NodeId(slot), node))
    }

    /// Make `parent` the parent of `child`, detaching it from any old parent.
    ///
    /// Returns `false` if either node is gone or the link would form a cycle.
    pub fn link(&mut self, child: NodeId, parent: NodeId) -> bool {
        if child == parent || !self.contains(child) || !self.contains(parent) {
            return false;
        }
        if self.is_descendant_of(parent, child) {
            return false;
        }
        if self.get(child).and_then(Node::parent) == Some(parent) {
            return true;
        }
        self.detach_from_parent(child);
        if let Some(p) = self.arena.get_mut(parent.0) {
            p.children.push(child);
        }
        if let Some(c) = self.arena.get_mut(child.0) {
            c.parent = Some(parent);
        }
        true
    }

    /// Remove `id` from its parent's children and clear its parent link.
    pub fn detach_from_parent(&mut self, id: NodeId) {
        let Some(old) = self.arena.get_mut(id.0).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.arena.get_mut(old.0) {
            p.children.retain(|c| *c != id);
        }
    }

    /// Sever every link touching `id`, in both directions.
    pub fn unlink(&mut self, id: NodeId) {
        self.detach_from_parent(id);
        let children = self
            .arena
            .get_mut(id.0)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in children {
            if let Some(c) = self.arena.get_mut(child.0) {
                if c.parent == Some(id) {
                    c.parent = None;
                }
            }
        }
    }

    /// Unlink and destroy a node.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        if !self.contains(id) {
            return None;
        }
        self.unlink(id);
        let node = self.arena.remove(id.0)?;
        if self.by_element.get(&node.element) == Some(&id) {
            self.by_element.remove(&node.element);
        }
        Some(node)
    }

    /// Walk parent links from `node` looking for `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.get(node).and_then(Node::parent);
        let mut guard = 0usize;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            guard += 1;
            if guard > self.len() {
                return false;
            }
            current = self.get(id).and_then(Node::parent);
        }
        false
    }

    /// Nearest ancestor with the group role.
    #[must_use]
    pub fn nearest_group(&self, node: NodeId) -> Option<NodeId> {
        let mut current = self.get(node).and_then(Node::parent);
        let mut guard = 0usize;
        while let Some(id) = current {
            let n = self.get(id)?;
            if n.role == Role::Group {
                return Some(id);
            }
            guard += 1;
            if guard > self.len() {
                return None;
            }
            current = n.parent;
        }
        None
    }

    /// Set the focus flag on exactly the given node (or none).
    pub fn set_focused(&mut self, focused: Option<NodeId>) {
        for (_, node) in self.arena.iter_mut() {
            node.focused = false;
        }
        if let Some(id) = focused {
            if let Some(n) = self.get_mut(id) {
                n.focused = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(table: &mut NodeTable, element: u64, role: Role) -> NodeId {
        table.insert(Node::new(
            format!("n{element}:Button"),
            role,
            ElementId(element),
            SurfaceId(1),
            ElementKind::Button,
        ))
    }

    fn assert_consistent(table: &NodeTable) {
        for (id, n) in table.iter() {
            if let Some(p) = n.parent() {
                let parent = table.get(p).expect("parent link resolves to a live node");
                assert!(parent.children().contains(&id), "one-sided parent link");
            }
            for c in n.children() {
                let child = table.get(*c).expect("child link resolves to a live node");
                assert_eq!(child.parent(), Some(id), "one-sided child link");
            }
        }
    }

    #[test]
    fn link_is_bidirectional() {
        let mut t = NodeTable::new();
        let p = node(&mut t, 1, Role::Group);
        let c = node(&mut t, 2, Role::Leaf);
        assert!(t.link(c, p));
        assert_eq!(t.get(c).unwrap().parent(), Some(p));
        assert_eq!(t.get(p).unwrap().children(), &[c]);
        assert_consistent(&t);
    }

    #[test]
    fn relink_moves_child_between_parents() {
        let mut t = NodeTable::new();
        let a = node(&mut t, 1, Role::Group);
        let b = node(&mut t, 2, Role::Group);
        let c = node(&mut t, 3, Role::Leaf);
        t.link(c, a);
        t.link(c, b);
        assert!(t.get(a).unwrap().children().is_empty());
        assert_eq!(t.get(b).unwrap().children(), &[c]);
        assert_consistent(&t);
    }

    #[test]
    fn link_refuses_cycles() {
        let mut t = NodeTable::new();
        let a = node(&mut t, 1, Role::Group);
        let b = node(&mut t, 2, Role::Group);
        assert!(t.link(b, a));
        assert!(!t.link(a, b));
        assert!(!t.link(a, a));
        assert_consistent(&t);
    }

    #[test]
    fn remove_unlinks_everything() {
        let mut t = NodeTable::new();
        let root = node(&mut t, 1, Role::Group);
        let mid = node(&mut t, 2, Role::Group);
        let leaf = node(&mut t, 3, Role::Leaf);
        t.link(mid, root);
        t.link(leaf, mid);

        let removed = t.remove(mid).unwrap();
        assert!(removed.parent().is_none());
        assert!(removed.children().is_empty());
        assert!(t.get(root).unwrap().children().is_empty());
        assert!(t.get(leaf).unwrap().parent().is_none());
        assert!(t.get(mid).is_none());
        assert!(t.node_for_element(ElementId(2)).is_none());
        assert_consistent(&t);
    }

    #[test]
    fn nearest_group_skips_leaves_and_undefined() {
        let mut t = NodeTable::new();
        let g = node(&mut t, 1, Role::Group);
        let u = node(&mut t, 2, Role::Undefined);
        let l = node(&mut t, 3, Role::Leaf);
        t.link(u, g);
        t.link(l, u);
        assert_eq!(t.nearest_group(l), Some(g));
        assert_eq!(t.nearest_group(g), None);
        assert!(t.is_descendant_of(l, g));
        assert!(!t.is_descendant_of(g, l));
    }

    #[test]
    fn seq_follows_insertion_order() {
        let mut t = NodeTable::new();
        let a = node(&mut t, 1, Role::Leaf);
        let b = node(&mut t, 2, Role::Leaf);
        assert!(t.get(a).unwrap().seq < t.get(b).unwrap().seq);
    }

    #[test]
    fn focus_flag_is_exclusive() {
        let mut t = NodeTable::new();
        let a = node(&mut t, 1, Role::Leaf);
        let b = node(&mut t, 2, Role::Leaf);
        t.set_focused(Some(a));
        t.set_focused(Some(b));
        assert!(!t.get(a).unwrap().focused);
        assert!(t.get(b).unwrap().focused);
        t.set_focused(None);
        assert!(t.iter().all(|(_, n)| !n.focused));
    }
}
