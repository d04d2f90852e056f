//! Navigation state capture and change detection.
//!
//! A [`NavSnapshot`] is a serializable picture of the engine: the context
//! stack, the tracked nodes, the registered surfaces and what the control
//! surface is showing.
//!
//! # Snapshot Formats
//!
//! | Format | Content | Use Case |
//! |--------|---------|----------|
//! | **Full** | contexts + nodes + surfaces + hash | Complete state |
//! | **Compact** | everything but the node list | Quick status checks |
//! | **Text** | [`NavSnapshot::to_text`] rendering | Humans and diffs |
//!
//! # Change Detection
//!
//! `content_hash` is computed over the text rendering, so two snapshots with
//! the same hash show the same focus, scopes, nodes and page:
//!
//! ```ignore
//! if new_snapshot.content_hash != old_snapshot.content_hash {
//!     // Something moved, re-read the node list
//! }
//! ```

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::geometry::Rect;
use crate::navigation::context::{ContextId, ContextType};
use crate::node::{Node, NodeId, Role};
use crate::scanner::SurfaceId;

/// One tracked node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub path: String,
    pub role: Role,
    /// Element kind name, e.g. `Button`.
    pub kind: String,
    pub modal: bool,
    pub navigable: bool,
    pub focused: bool,
    pub surface: SurfaceId,
    /// Screen bounds, absent when the host reports none usable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
    /// Control-surface shortcut key bound to this node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    pub seq: u64,
}

impl NodeInfo {
    #[must_use]
    pub fn new(id: NodeId, node: &Node, bounds: Option<Rect>, focused: bool) -> Self {
        Self {
            id,
            path: node.path.clone(),
            role: node.role,
            kind: node.kind.type_name().to_string(),
            modal: node.modal,
            navigable: node.navigable,
            focused,
            surface: node.surface,
            bounds,
            shortcut: node.shortcut.as_ref().map(|s| s.key.clone()),
            seq: node.seq,
        }
    }
}

/// One entry of the context stack, bottom first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub id: ContextId,
    pub kind: ContextType,
    /// Path of the scope node.
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused: Option<String>,
    /// Value to restore on cancel, interactive contexts only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_value: Option<f64>,
}

/// A registered surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceInfo {
    pub id: SurfaceId,
    pub root: ElementId,
    pub primary: bool,
    /// Scans run on this surface so far.
    pub scans: u64,
}

/// Complete navigation state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavSnapshot {
    pub contexts: Vec<ContextInfo>,
    /// Path of the focused node in the active context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused: Option<String>,
    /// Tracked nodes in discovery order. Dropped by [`NavSnapshot::compact`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeInfo>>,
    pub surfaces: Vec<SurfaceInfo>,
    /// Page shown on the control surface.
    pub page: String,
    /// Key of a shortcut waiting for confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_confirmation: Option<String>,
    /// Modal closes that matched no context.
    pub mismatches: u64,
    /// Hash of the text rendering, for change detection.
    pub content_hash: u64,
}

impl NavSnapshot {
    #[must_use]
    pub fn new(
        contexts: Vec<ContextInfo>,
        nodes: Vec<NodeInfo>,
        surfaces: Vec<SurfaceInfo>,
        page: String,
        pending_confirmation: Option<String>,
        mismatches: u64,
    ) -> Self {
        let focused = contexts.last().and_then(|c| c.focused.clone());
        let mut snapshot = Self {
            contexts,
            focused,
            nodes: Some(nodes),
            surfaces,
            page,
            pending_confirmation,
            mismatches,
            content_hash: 0,
        };
        snapshot.content_hash = compute_content_hash(&snapshot.to_text());
        snapshot
    }

    /// Same snapshot without the node list. The hash is kept.
    #[must_use]
    pub fn compact(mut self) -> Self {
        self.nodes = None;
        self
    }

    /// Plain-text rendering, one line per context and node.
    ///
    /// Focused nodes are marked with `*`. Scan counters are left out so the
    /// text only changes when the navigable picture does.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "page: {}", self.page);
        if let Some(key) = &self.pending_confirmation {
            let _ = writeln!(out, "confirm: {}", key);
        }

        let _ = writeln!(out, "contexts:");
        for ctx in &self.contexts {
            let _ = write!(out, "  {} {} {}", ctx.id, context_label(ctx.kind), ctx.scope);
            if let Some(focused) = &ctx.focused {
                let _ = write!(out, " -> {}", focused);
            }
            if let Some(value) = ctx.original_value {
                let _ = write!(out, " (was {})", value);
            }
            out.push('\n');
        }

        let _ = writeln!(out, "surfaces:");
        for surface in &self.surfaces {
            let marker = if surface.primary { " primary" } else { "" };
            let _ = writeln!(out, "  {} root {}{}", surface.id, surface.root, marker);
        }

        if let Some(nodes) = &self.nodes {
            let _ = writeln!(out, "nodes:");
            for node in nodes {
                let mark = if node.focused { '*' } else { ' ' };
                let _ = write!(out, "{} {} [{}", mark, node.path, role_label(node.role));
                if node.modal {
                    out.push_str(" modal");
                }
                if !node.navigable {
                    out.push_str(" disabled");
                }
                out.push(']');
                if let Some(b) = node.bounds {
                    let _ = write!(out, " ({},{} {}x{})", b.x, b.y, b.width, b.height);
                }
                if let Some(key) = &node.shortcut {
                    let _ = write!(out, " key={}", key);
                }
                out.push('\n');
            }
        }
        out
    }
}

fn context_label(kind: ContextType) -> &'static str {
    match kind {
        ContextType::RootSurface => "root",
        ContextType::ModalScope => "modal",
        ContextType::InteractiveElement => "interactive",
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Leaf => "leaf",
        Role::Group => "group",
        Role::Undefined => "undefined",
    }
}

/// Compute a content hash from snapshot text.
///
/// Uses FNV-1a, a fast non-cryptographic hash suitable for change detection.
#[must_use]
pub fn compute_content_hash(text: &str) -> u64 {
    // FNV-1a parameters for 64-bit
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001B3;

    let mut hash = FNV_OFFSET;
    for byte in text.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
