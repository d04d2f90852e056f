//! Element classification: deciding which host elements become nodes.
//!
//! Classification runs once per element, when a scan first observes it. The
//! pipeline is strictly ordered and stops at the first rejection:
//!
//! 1. Compute the hierarchical path (done by the caller, see [`child_path`]).
//! 2. Look up the first matching [`ClassificationRule`](crate::rules::ClassificationRule).
//! 3. A rule match forces a node with the rule's role and metadata.
//! 4. Otherwise the element's kind must be on the leaf or group whitelist.
//! 5. A whitelisted leaf directly under another tracked leaf is rejected.
//! 6. Derive a stable id.
//! 7. Exclusion rules reject, regardless of how the element got this far.
//! 8. Modal flag: surface kinds default to modal, rules may override.
//! 9. A non-modal group directly inside another non-modal group is kept but
//!    flagged as `nested_group`.
//!
//! Generic layout containers (`Panel`, `Border`, `ScrollViewer`) are on
//! neither whitelist; a real UI has thousands of them and none is a
//! navigation stop. Rules can still promote them.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::element::{ElementId, ElementInfo, ElementKind, ElementTree};
use crate::node::{Node, Role};
use crate::path;
use crate::rules::RuleSet;
use crate::scanner::SurfaceId;

// ============================================================================
// Whitelists
// ============================================================================

/// Kinds tracked as leaves without a rule.
#[must_use]
pub fn is_leaf_kind(kind: &ElementKind) -> bool {
    matches!(
        kind,
        ElementKind::Button
            | ElementKind::ToggleButton
            | ElementKind::CheckBox
            | ElementKind::RadioButton
            | ElementKind::MenuItem
            | ElementKind::ListItem
            | ElementKind::TabItem
            | ElementKind::TreeItem
            | ElementKind::Hyperlink
            | ElementKind::TextBox
            | ElementKind::ComboBox
            | ElementKind::Slider
            | ElementKind::ScrollBar
            | ElementKind::Spinner
    )
}

/// Kinds tracked as groups without a rule.
#[must_use]
pub fn is_group_kind(kind: &ElementKind) -> bool {
    kind.is_surface_kind()
        || matches!(
            kind,
            ElementKind::GroupBox
                | ElementKind::ListBox
                | ElementKind::Menu
                | ElementKind::ToolBar
                | ElementKind::TabControl
                | ElementKind::TreeView
                | ElementKind::Expander
        )
}

// ============================================================================
// Paths
// ============================================================================

/// Path of an element given its parent's path.
///
/// `parent_path` is `None` for the surface root, which gets the surface
/// suffix.
#[must_use]
pub fn child_path(parent_path: Option<&str>, info: &ElementInfo, surface: SurfaceId) -> String {
    match parent_path {
        None => path::segment(info.name.as_deref(), info.kind.type_name(), Some(surface.0)),
        Some(parent) => {
            let seg = path::segment(info.name.as_deref(), info.kind.type_name(), None);
            path::join(&[parent, seg.as_str()])
        }
    }
}

/// Path of an element computed by walking its ancestor chain up to the
/// surface root. Returns `None` if any element on the way is gone.
pub fn hierarchical_path<T: ElementTree + ?Sized>(
    tree: &T,
    element: ElementId,
    surface: SurfaceId,
) -> Option<String> {
    let mut chain = vec![element];
    let mut current = element;
    while let Some(parent) = tree.parent(current) {
        if chain.len() > 4096 {
            return None;
        }
        chain.push(parent);
        current = parent;
    }

    let mut out: Option<String> = None;
    for id in chain.iter().rev() {
        let info = tree.info(*id)?;
        out = Some(child_path(out.as_deref(), &info, surface));
    }
    out
}

// ============================================================================
// Classification
// ============================================================================

/// The nearest already-tracked ancestor of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AncestorInfo {
    pub role: Role,
    pub modal: bool,
}

/// One element offered to the classifier.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub element: ElementId,
    pub info: &'a ElementInfo,
    pub path: &'a str,
    pub surface: SurfaceId,
    pub ancestor: Option<AncestorInfo>,
}

/// Why an element was not turned into a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No rule matched and the kind is on neither whitelist.
    NotWhitelisted,
    /// A leaf directly inside another tracked leaf.
    NestedLeaf,
    /// An exclusion rule matched.
    Excluded,
}

/// Result of classifying one element.
#[derive(Debug, Clone)]
pub enum Classification {
    Accepted(Box<Node>),
    Rejected(Rejection),
}

impl Classification {
    #[must_use]
    pub fn into_node(self) -> Option<Node> {
        match self {
            Classification::Accepted(node) => Some(*node),
            Classification::Rejected(_) => None,
        }
    }
}

/// Applies the classification pipeline against a shared rule set.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Arc<RuleSet>,
}

impl Classifier {
    #[must_use]
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn classify(&self, candidate: &Candidate<'_>) -> Classification {
        let info = candidate.info;
        let rule = self.rules.find(candidate.path);

        let role = match rule {
            Some(rule) => rule.role,
            None => {
                let role = if is_leaf_kind(&info.kind) {
                    Role::Leaf
                } else if is_group_kind(&info.kind) {
                    Role::Group
                } else {
                    return Classification::Rejected(Rejection::NotWhitelisted);
                };
                if role == Role::Leaf
                    && candidate.ancestor.is_some_and(|a| a.role == Role::Leaf)
                {
                    trace!("Rejecting nested leaf {}", candidate.path);
                    return Classification::Rejected(Rejection::NestedLeaf);
                }
                role
            }
        };

        let stable_id = stable_id(info);

        if self.rules.is_excluded(candidate.path) {
            trace!("Excluded by rule: {}", candidate.path);
            return Classification::Rejected(Rejection::Excluded);
        }

        let modal = rule
            .and_then(|r| r.modal)
            .unwrap_or_else(|| info.kind.is_surface_kind());

        let nested_group = role == Role::Group
            && !modal
            && candidate
                .ancestor
                .is_some_and(|a| a.role == Role::Group && !a.modal);
        if nested_group {
            warn!(
                "Non-modal group {} sits directly inside another non-modal group",
                candidate.path
            );
        }

        let mut node = Node::new(
            candidate.path.to_string(),
            role,
            candidate.element,
            candidate.surface,
            info.kind.clone(),
        );
        node.modal = modal;
        node.navigable = info.enabled;
        node.stable_id = stable_id;
        node.nested_group = nested_group;
        if let Some(rule) = rule {
            node.shortcut = rule.shortcut.clone();
            node.page = rule.page.clone();
        }
        Classification::Accepted(Box::new(node))
    }
}

/// Automation id, then name, then a kind+content fallback.
#[must_use]
pub fn stable_id(info: &ElementInfo) -> String {
    let non_empty = |s: &Option<String>| {
        s.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    if let Some(id) = non_empty(&info.automation_id) {
        return id;
    }
    if let Some(name) = non_empty(&info.name) {
        return name;
    }
    match non_empty(&info.text) {
        Some(text) => format!("{}[{}]", info.kind.type_name(), text),
        None => info.kind.type_name().to_string(),
    }
}
