//! The host element-tree contract.
//!
//! The engine never talks to a UI toolkit directly. Whatever hosts it (an
//! accessibility bridge, a toolkit plugin, or [`crate::memory::MemoryTree`])
//! implements [`ElementTree`]: a handful of traversal queries plus the two
//! opaque capabilities the engine needs (activate, set value).

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Opaque host handle for a live UI element.
///
/// Handles are never reused by a well-behaved host, so a handle whose element
/// is gone simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Concrete kind of a host element.
///
/// The set is closed on purpose; anything a host cannot map lands in
/// [`ElementKind::Other`] and is only tracked when a rule asks for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    // Top-level surfaces
    Window,
    Dialog,
    Popup,
    ContextMenu,
    Flyout,
    // Containers
    Panel,
    Border,
    GroupBox,
    ListBox,
    Menu,
    ToolBar,
    TabControl,
    TreeView,
    Expander,
    ScrollViewer,
    // Activatable controls
    Button,
    ToggleButton,
    CheckBox,
    RadioButton,
    MenuItem,
    ListItem,
    TabItem,
    TreeItem,
    Hyperlink,
    TextBox,
    ComboBox,
    // Value controls
    Slider,
    ScrollBar,
    Spinner,
    // Passive content
    Text,
    Image,
    /// Host kind the engine has no name for.
    Other(String),
}

impl ElementKind {
    /// Name used for the `Type` half of a path segment.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            ElementKind::Window => "Window",
            ElementKind::Dialog => "Dialog",
            ElementKind::Popup => "Popup",
            ElementKind::ContextMenu => "ContextMenu",
            ElementKind::Flyout => "Flyout",
            ElementKind::Panel => "Panel",
            ElementKind::Border => "Border",
            ElementKind::GroupBox => "GroupBox",
            ElementKind::ListBox => "ListBox",
            ElementKind::Menu => "Menu",
            ElementKind::ToolBar => "ToolBar",
            ElementKind::TabControl => "TabControl",
            ElementKind::TreeView => "TreeView",
            ElementKind::Expander => "Expander",
            ElementKind::ScrollViewer => "ScrollViewer",
            ElementKind::Button => "Button",
            ElementKind::ToggleButton => "ToggleButton",
            ElementKind::CheckBox => "CheckBox",
            ElementKind::RadioButton => "RadioButton",
            ElementKind::MenuItem => "MenuItem",
            ElementKind::ListItem => "ListItem",
            ElementKind::TabItem => "TabItem",
            ElementKind::TreeItem => "TreeItem",
            ElementKind::Hyperlink => "Hyperlink",
            ElementKind::TextBox => "TextBox",
            ElementKind::ComboBox => "ComboBox",
            ElementKind::Slider => "Slider",
            ElementKind::ScrollBar => "ScrollBar",
            ElementKind::Spinner => "Spinner",
            ElementKind::Text => "Text",
            ElementKind::Image => "Image",
            ElementKind::Other(name) => name,
        }
    }

    /// Kinds that are themselves independently rendered top-level surfaces.
    #[must_use]
    pub fn is_surface_kind(&self) -> bool {
        matches!(
            self,
            ElementKind::Window
                | ElementKind::Dialog
                | ElementKind::Popup
                | ElementKind::ContextMenu
                | ElementKind::Flyout
        )
    }
}

/// Static description of an element, as read from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub kind: ElementKind,
    /// Human-readable name (label, title, accessible name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Explicit automation identifier set by the application author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    /// Text content, used for fallback identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Elements drawn by the focus renderer itself. Never scanned.
    #[serde(default)]
    pub feedback_overlay: bool,
}

fn default_true() -> bool {
    true
}

impl ElementInfo {
    #[must_use]
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            name: None,
            automation_id: None,
            text: None,
            enabled: true,
            feedback_overlay: false,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_automation_id(mut self, id: impl Into<String>) -> Self {
        self.automation_id = Some(id.into());
        self
    }
}

/// Scalar value of an adjustable control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeValue {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    /// Host-declared increment, if the control has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_change: Option<f64>,
}

impl RangeValue {
    #[must_use]
    pub fn new(value: f64, min: f64, max: f64) -> Self {
        Self {
            value,
            min,
            max,
            small_change: None,
        }
    }

    /// Total span of the range, never negative.
    #[must_use]
    pub fn span(&self) -> f64 {
        (self.max - self.min).max(0.0)
    }

    #[must_use]
    pub fn clamp(&self, v: f64) -> f64 {
        if self.max < self.min {
            return self.min;
        }
        v.clamp(self.min, self.max)
    }
}

/// Lifecycle notification delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostNotification {
    /// An element (and its subtree) finished loading.
    Loaded { element: ElementId },
    /// An element was unloaded.
    Unloaded { element: ElementId },
    /// Layout inside a surface changed (visibility, size, children).
    LayoutChanged { element: ElementId },
    /// A new surface appeared. `anchor` is the element on another surface it
    /// belongs to logically, if any.
    SurfaceOpened {
        root: ElementId,
        anchor: Option<ElementId>,
    },
    SurfaceMoved { root: ElementId },
    SurfaceResized { root: ElementId },
    SurfaceClosed { root: ElementId },
}

/// Traversal and capability surface the engine needs from its host.
///
/// Every query tolerates dead handles by returning `None`, `false` or an
/// empty list; the engine treats those as "element is gone".
pub trait ElementTree {
    /// Static description, or `None` if the element no longer exists.
    fn info(&self, element: ElementId) -> Option<ElementInfo>;

    /// Children in host enumeration order.
    fn children(&self, element: ElementId) -> Vec<ElementId>;

    /// Visual parent within the same surface. `None` at a surface root.
    fn parent(&self, element: ElementId) -> Option<ElementId>;

    /// On-screen bounds. `None` while the element has no resolvable geometry.
    fn bounds(&self, element: ElementId) -> Option<Rect>;

    /// Whether the element itself is visible (ancestors are checked by the caller).
    fn is_visible(&self, element: ElementId) -> bool;

    /// Whether the handle still refers to a live element.
    fn is_alive(&self, element: ElementId) -> bool {
        self.info(element).is_some()
    }

    /// Whether the element is the root of its own rendering surface.
    fn is_surface_root(&self, element: ElementId) -> bool;

    /// For a surface root: the element on another surface it is anchored to.
    fn surface_anchor(&self, root: ElementId) -> Option<ElementId>;

    /// Current scalar value of an adjustable control.
    fn range_value(&self, element: ElementId) -> Option<RangeValue>;

    /// Set the scalar value. Returns `false` if the host refused.
    fn set_value(&mut self, element: ElementId, value: f64) -> bool;

    /// Invoke the element's default action. Returns `false` if nothing happened.
    fn activate(&mut self, element: ElementId) -> bool;

    /// Ask the host to close the surface or scope rooted at `element`.
    fn dismiss(&mut self, element: ElementId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_kinds() {
        assert!(ElementKind::Window.is_surface_kind());
        assert!(ElementKind::ContextMenu.is_surface_kind());
        assert!(!ElementKind::Menu.is_surface_kind());
        assert!(!ElementKind::Other("Window".into()).is_surface_kind());
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ElementKind::ContextMenu).unwrap(),
            "\"context_menu\""
        );
        let other: ElementKind = serde_json::from_str(r#"{"other":"Ribbon"}"#).unwrap();
        assert_eq!(other.type_name(), "Ribbon");
    }

    #[test]
    fn info_defaults_enabled() {
        let info: ElementInfo = serde_json::from_str(r#"{"kind":"button"}"#).unwrap();
        assert!(info.enabled);
        assert!(!info.feedback_overlay);
        assert!(info.name.is_none());
    }

    #[test]
    fn range_clamps_and_spans() {
        let r = RangeValue::new(5.0, 0.0, 10.0);
        assert_eq!(r.span(), 10.0);
        assert_eq!(r.clamp(12.0), 10.0);
        assert_eq!(r.clamp(-1.0), 0.0);
        let inverted = RangeValue::new(0.0, 5.0, 1.0);
        assert_eq!(inverted.span(), 0.0);
        assert_eq!(inverted.clamp(3.0), 5.0);
    }

    #[test]
    fn notification_json_shape() {
        let n = HostNotification::SurfaceClosed {
            root: ElementId(7),
        };
        let json = serde_json::to_string(&n).unwrap();
        assert_eq!(json, r#"{"event":"surface_closed","root":7}"#);
    }
}
