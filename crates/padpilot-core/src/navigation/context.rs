//! Navigation contexts: the entries of the context stack.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeId};
use crate::path::is_within_scope;

/// Stamp identifying one pushed context. Never reused, so deferred work can
/// tell whether the context it was scheduled for is still around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    /// The application's primary surface.
    RootSurface,
    /// An opened modal group or overlay.
    ModalScope,
    /// A single control whose value is being adjusted.
    InteractiveElement,
}

/// One entry of the navigation stack.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationContext {
    pub id: ContextId,
    pub kind: ContextType,
    pub scope: NodeId,
    /// Path of the scope node, kept so the scope stays resolvable after the
    /// node itself is gone.
    pub scope_path: String,
    pub focused: Option<NodeId>,
    /// Value captured on entering interactive mode.
    pub original_value: Option<f64>,
}

impl NavigationContext {
    #[must_use]
    pub fn new(id: ContextId, kind: ContextType, scope: NodeId, scope_path: String) -> Self {
        Self {
            id,
            kind,
            scope,
            scope_path,
            focused: None,
            original_value: None,
        }
    }

    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.kind == ContextType::InteractiveElement
    }

    /// Whether `node` is inside this context's scope.
    ///
    /// Root and modal scopes cover the scope node's whole path subtree. An
    /// interactive scope covers exactly its control and none of the
    /// control's descendants.
    #[must_use]
    pub fn contains(&self, id: NodeId, node: &Node) -> bool {
        match self.kind {
            ContextType::InteractiveElement => id == self.scope,
            ContextType::RootSurface | ContextType::ModalScope => {
                is_within_scope(&node.path, &self.scope_path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementId, ElementKind};
    use crate::node::{NodeTable, Role};
    use crate::scanner::SurfaceId;

    fn add(table: &mut NodeTable, element: u64, path: &str, role: Role) -> NodeId {
        table.insert(Node::new(
            path.to_string(),
            role,
            ElementId(element),
            SurfaceId(1),
            ElementKind::Button,
        ))
    }

    #[test]
    fn modal_scope_covers_path_subtree() {
        let mut t = NodeTable::new();
        let dialog = add(&mut t, 1, "Prefs:Dialog#2", Role::Group);
        let inside = add(&mut t, 2, "Prefs:Dialog#2/Ok:Button", Role::Leaf);
        let outside = add(&mut t, 3, "Main:Window#1/Ok:Button", Role::Leaf);
        let lookalike = add(&mut t, 4, "Prefs:Dialog#20/Ok:Button", Role::Leaf);

        let ctx = NavigationContext::new(
            ContextId(1),
            ContextType::ModalScope,
            dialog,
            "Prefs:Dialog#2".into(),
        );
        assert!(ctx.contains(dialog, t.get(dialog).unwrap()));
        assert!(ctx.contains(inside, t.get(inside).unwrap()));
        assert!(!ctx.contains(outside, t.get(outside).unwrap()));
        assert!(!ctx.contains(lookalike, t.get(lookalike).unwrap()));
    }

    #[test]
    fn interactive_scope_is_exactly_the_control() {
        let mut t = NodeTable::new();
        let slider = add(&mut t, 1, "Main:Window#1/Vol:Slider", Role::Leaf);
        let thumb = add(&mut t, 2, "Main:Window#1/Vol:Slider/_:Button", Role::Leaf);

        let ctx = NavigationContext::new(
            ContextId(2),
            ContextType::InteractiveElement,
            slider,
            "Main:Window#1/Vol:Slider".into(),
        );
        assert!(ctx.contains(slider, t.get(slider).unwrap()));
        assert!(!ctx.contains(thumb, t.get(thumb).unwrap()));
        assert!(ctx.is_interactive());
    }
}
