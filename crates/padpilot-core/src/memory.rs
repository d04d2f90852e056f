//! In-memory host element tree.
//!
//! [`MemoryTree`] implements [`ElementTree`] over a plain map of elements
//! built from a [`Scene`]. The CLI daemon hosts scenes with it, and every
//! scenario test in this crate uses it as its host.
//!
//! # Scene format
//!
//! ```json
//! {
//!   "main": {
//!     "kind": "window", "name": "Main", "bounds": [0, 0, 800, 600],
//!     "children": [
//!       { "kind": "button", "name": "Prefs", "bounds": [10, 10, 80, 30], "opens": "prefs" }
//!     ]
//!   },
//!   "surfaces": [
//!     { "root": { "kind": "dialog", "automation_id": "prefs", "bounds": [100, 100, 300, 200] },
//!       "anchor": "Prefs" }
//!   ]
//! }
//! ```
//!
//! Surfaces are templates: opening one instantiates fresh elements and closing
//! it drops them, like a real toolkit tearing down a popup. Mutations queue
//! [`HostNotification`]s that the embedder drains with
//! [`MemoryTree::take_notifications`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::element::{ElementId, ElementInfo, ElementKind, ElementTree, HostNotification, RangeValue};
use crate::geometry::Rect;

/// Errors from loading or mutating a scene.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no element matches '{0}'")]
    UnknownTarget(String),
    #[error("no surface named '{0}'")]
    UnknownSurface(String),
    #[error("the main window cannot be removed or closed")]
    MainWindow,
}

fn default_true() -> bool {
    true
}

/// One element of a scene, with its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub kind: ElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// `[x, y, width, height]` in screen coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[f64; 4]>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeValue>,
    /// Surface opened when this element is activated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opens: Option<String>,
    /// Activation closes the surface this element lives on.
    #[serde(default)]
    pub closes: bool,
    /// Rendered as its own surface even though it sits in this tree.
    #[serde(default)]
    pub surface: bool,
    #[serde(default)]
    pub feedback_overlay: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    #[must_use]
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            name: None,
            automation_id: None,
            text: None,
            bounds: None,
            visible: true,
            enabled: true,
            range: None,
            opens: None,
            closes: false,
            surface: false,
            feedback_overlay: false,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn id(mut self, automation_id: impl Into<String>) -> Self {
        self.automation_id = Some(automation_id.into());
        self
    }

    #[must_use]
    pub fn at(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bounds = Some([x, y, width, height]);
        self
    }

    #[must_use]
    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn range(mut self, value: f64, min: f64, max: f64) -> Self {
        self.range = Some(RangeValue::new(value, min, max));
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    #[must_use]
    pub fn opens(mut self, surface: impl Into<String>) -> Self {
        self.opens = Some(surface.into());
        self
    }

    #[must_use]
    pub fn closes(mut self) -> Self {
        self.closes = true;
        self
    }

    #[must_use]
    pub fn as_surface(mut self) -> Self {
        self.surface = true;
        self
    }

    /// Key used to open a surface built from this spec.
    fn surface_key(&self) -> Option<String> {
        self.automation_id
            .as_ref()
            .or(self.name.as_ref())
            .map(|k| k.to_lowercase())
    }
}

/// A surface template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSpec {
    pub root: ElementSpec,
    /// Automation id or name of the element this surface is anchored to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    /// Open as soon as the scene loads.
    #[serde(default)]
    pub open: bool,
}

/// A complete scene: the main window plus surface templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub main: ElementSpec,
    #[serde(default)]
    pub surfaces: Vec<SurfaceSpec>,
}

impl Scene {
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone)]
struct MemElement {
    info: ElementInfo,
    bounds: Option<Rect>,
    visible: bool,
    range: Option<RangeValue>,
    opens: Option<String>,
    closes: bool,
    surface_root: bool,
    anchor: Option<ElementId>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

/// Map-backed [`ElementTree`].
#[derive(Debug)]
pub struct MemoryTree {
    elements: BTreeMap<ElementId, MemElement>,
    next_id: u64,
    main: ElementId,
    templates: Vec<SurfaceSpec>,
    /// Open template surfaces by lowercase key.
    open: BTreeMap<String, ElementId>,
    notifications: Vec<HostNotification>,
    activations: Vec<ElementId>,
}

impl MemoryTree {
    /// Build the main window and open every surface marked `open`.
    pub fn from_scene(scene: Scene) -> Result<Self, SceneError> {
        let mut tree = Self {
            elements: BTreeMap::new(),
            next_id: 1,
            main: ElementId(0),
            templates: scene.surfaces,
            open: BTreeMap::new(),
            notifications: Vec::new(),
            activations: Vec::new(),
        };
        tree.main = tree.build(&scene.main, None, None, true);

        let initially_open: Vec<String> = tree
            .templates
            .iter()
            .filter(|t| t.open)
            .filter_map(|t| t.root.surface_key())
            .collect();
        for key in initially_open {
            tree.open_surface(&key)?;
        }
        Ok(tree)
    }

    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        Self::from_scene(Scene::from_json(json)?)
    }

    /// Root of the main window.
    #[must_use]
    pub fn main_root(&self) -> ElementId {
        self.main
    }

    fn build(
        &mut self,
        spec: &ElementSpec,
        parent: Option<ElementId>,
        anchor: Option<ElementId>,
        surface_root: bool,
    ) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;

        let mut info = ElementInfo::new(spec.kind.clone());
        info.name = spec.name.clone();
        info.automation_id = spec.automation_id.clone();
        info.text = spec.text.clone();
        info.enabled = spec.enabled;
        info.feedback_overlay = spec.feedback_overlay;

        // An inline surface is listed by its container but has no visual parent.
        let inline_surface = spec.surface && parent.is_some();
        self.elements.insert(
            id,
            MemElement {
                info,
                bounds: spec.bounds.map(Rect::from),
                visible: spec.visible,
                range: spec.range,
                opens: spec.opens.clone(),
                closes: spec.closes,
                surface_root: surface_root || spec.surface,
                anchor: if inline_surface { parent } else { anchor },
                parent: if inline_surface { None } else { parent },
                children: Vec::new(),
            },
        );

        let children: Vec<ElementId> = spec
            .children
            .iter()
            .map(|child| self.build(child, Some(id), None, false))
            .collect();
        if let Some(el) = self.elements.get_mut(&id) {
            el.children = children;
        }
        id
    }

    /// Add a subtree under `parent`. Queues `Loaded`.
    pub fn insert(&mut self, parent: ElementId, spec: &ElementSpec) -> Result<ElementId, SceneError> {
        if !self.elements.contains_key(&parent) {
            return Err(SceneError::UnknownTarget(parent.to_string()));
        }
        let id = self.build(spec, Some(parent), None, false);
        if let Some(p) = self.elements.get_mut(&parent) {
            p.children.push(id);
        }
        self.notifications.push(HostNotification::Loaded { element: id });
        Ok(id)
    }

    /// Remove an element and its subtree. Queues `Unloaded`, or
    /// `SurfaceClosed` if the element is an open surface's root.
    pub fn remove(&mut self, id: ElementId) -> Result<(), SceneError> {
        if id == self.main {
            return Err(SceneError::MainWindow);
        }
        if !self.elements.contains_key(&id) {
            return Err(SceneError::UnknownTarget(id.to_string()));
        }
        if self.open.values().any(|root| *root == id) {
            return self.close_root(id);
        }
        self.drop_subtree(id);
        self.notifications
            .push(HostNotification::Unloaded { element: id });
        Ok(())
    }

    fn drop_subtree(&mut self, id: ElementId) {
        let container = self
            .elements
            .get(&id)
            .and_then(|el| el.parent.or(if el.surface_root { el.anchor } else { None }));
        if let Some(p) = container.and_then(|p| self.elements.get_mut(&p)) {
            p.children.retain(|c| *c != id);
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(el) = self.elements.remove(&current) {
                stack.extend(el.children);
            }
        }
    }

    pub fn set_visible(&mut self, id: ElementId, visible: bool) -> Result<(), SceneError> {
        let el = self.element_mut(id)?;
        el.visible = visible;
        self.notifications
            .push(HostNotification::LayoutChanged { element: id });
        Ok(())
    }

    pub fn set_enabled(&mut self, id: ElementId, enabled: bool) -> Result<(), SceneError> {
        let el = self.element_mut(id)?;
        el.info.enabled = enabled;
        self.notifications
            .push(HostNotification::LayoutChanged { element: id });
        Ok(())
    }

    pub fn set_bounds(&mut self, id: ElementId, bounds: Rect) -> Result<(), SceneError> {
        let el = self.element_mut(id)?;
        el.bounds = Some(bounds);
        self.notifications
            .push(HostNotification::LayoutChanged { element: id });
        Ok(())
    }

    /// Open a surface template by key. Opening an open surface returns its root.
    pub fn open_surface(&mut self, key: &str) -> Result<ElementId, SceneError> {
        let key = key.to_lowercase();
        if let Some(root) = self.open.get(&key) {
            return Ok(*root);
        }
        let template = self
            .templates
            .iter()
            .find(|t| t.root.surface_key().as_deref() == Some(key.as_str()))
            .cloned()
            .ok_or_else(|| SceneError::UnknownSurface(key.clone()))?;

        let anchor = template.anchor.as_deref().and_then(|a| self.find(a));
        let root = self.build(&template.root, None, anchor, true);
        self.open.insert(key.clone(), root);
        debug!("Opened surface '{}' as {}", key, root);
        self.notifications
            .push(HostNotification::SurfaceOpened { root, anchor });
        Ok(root)
    }

    /// Close an open surface by key.
    pub fn close_surface(&mut self, key: &str) -> Result<(), SceneError> {
        let key = key.to_lowercase();
        let root = self
            .open
            .get(&key)
            .copied()
            .ok_or(SceneError::UnknownSurface(key))?;
        self.close_root(root)
    }

    fn close_root(&mut self, root: ElementId) -> Result<(), SceneError> {
        if root == self.main {
            return Err(SceneError::MainWindow);
        }
        // Surfaces anchored inside this one go first.
        let dependents: Vec<ElementId> = self
            .open
            .values()
            .copied()
            .filter(|other| *other != root)
            .filter(|other| {
                self.elements
                    .get(other)
                    .and_then(|el| el.anchor)
                    .is_some_and(|a| self.surface_root_of(a) == Some(root))
            })
            .collect();
        for dependent in dependents {
            self.close_root(dependent)?;
        }

        self.drop_subtree(root);
        self.open.retain(|_, r| *r != root);
        self.notifications
            .push(HostNotification::SurfaceClosed { root });
        Ok(())
    }

    /// Queued notifications, oldest first.
    pub fn take_notifications(&mut self) -> Vec<HostNotification> {
        std::mem::take(&mut self.notifications)
    }

    /// Elements activated so far, oldest first.
    #[must_use]
    pub fn activations(&self) -> &[ElementId] {
        &self.activations
    }

    /// Look up a live element by automation id, then by name (case-insensitive).
    #[must_use]
    pub fn find(&self, query: &str) -> Option<ElementId> {
        let eq = |s: &Option<String>| s.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(query));
        self.elements
            .iter()
            .find(|(_, el)| eq(&el.info.automation_id))
            .or_else(|| self.elements.iter().find(|(_, el)| eq(&el.info.name)))
            .map(|(id, _)| *id)
    }

    /// Resolve a target given as `e<id>`, a bare id, an automation id or a name.
    pub fn resolve(&self, target: &str) -> Result<ElementId, SceneError> {
        let trimmed = target.trim();
        let numeric = trimmed.strip_prefix('e').unwrap_or(trimmed);
        if let Ok(n) = numeric.parse::<u64>() {
            let id = ElementId(n);
            if self.elements.contains_key(&id) {
                return Ok(id);
            }
        }
        self.find(trimmed)
            .ok_or_else(|| SceneError::UnknownTarget(trimmed.to_string()))
    }

    /// Keys of the surfaces currently open.
    #[must_use]
    pub fn open_surfaces(&self) -> Vec<String> {
        self.open.keys().cloned().collect()
    }

    /// Root of the surface containing `id`.
    #[must_use]
    pub fn surface_root_of(&self, id: ElementId) -> Option<ElementId> {
        let mut current = id;
        for _ in 0..=self.elements.len() {
            let el = self.elements.get(&current)?;
            if el.surface_root {
                return Some(current);
            }
            current = el.parent?;
        }
        None
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn element_mut(&mut self, id: ElementId) -> Result<&mut MemElement, SceneError> {
        self.elements
            .get_mut(&id)
            .ok_or_else(|| SceneError::UnknownTarget(id.to_string()))
    }
}

impl ElementTree for MemoryTree {
    fn info(&self, element: ElementId) -> Option<ElementInfo> {
        self.elements.get(&element).map(|el| el.info.clone())
    }

    fn children(&self, element: ElementId) -> Vec<ElementId> {
        self.elements
            .get(&element)
            .map(|el| el.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.elements.get(&element)?.parent
    }

    fn bounds(&self, element: ElementId) -> Option<Rect> {
        self.elements.get(&element)?.bounds
    }

    fn is_visible(&self, element: ElementId) -> bool {
        self.elements.get(&element).is_some_and(|el| el.visible)
    }

    fn is_alive(&self, element: ElementId) -> bool {
        self.elements.contains_key(&element)
    }

    fn is_surface_root(&self, element: ElementId) -> bool {
        self.elements.get(&element).is_some_and(|el| el.surface_root)
    }

    fn surface_anchor(&self, root: ElementId) -> Option<ElementId> {
        self.elements.get(&root)?.anchor
    }

    fn range_value(&self, element: ElementId) -> Option<RangeValue> {
        self.elements.get(&element)?.range
    }

    fn set_value(&mut self, element: ElementId, value: f64) -> bool {
        let Some(el) = self.elements.get_mut(&element) else {
            return false;
        };
        if !el.info.enabled {
            return false;
        }
        match el.range.as_mut() {
            Some(range) => {
                range.value = range.clamp(value);
                true
            }
            None => false,
        }
    }

    fn activate(&mut self, element: ElementId) -> bool {
        let Some(el) = self.elements.get(&element) else {
            return false;
        };
        if !el.info.enabled {
            return false;
        }
        let opens = el.opens.clone();
        let closes = el.closes;
        self.activations.push(element);

        if let Some(key) = opens {
            if let Err(e) = self.open_surface(&key) {
                debug!("Activation of {} could not open '{}': {}", element, key, e);
            }
        }
        if closes {
            if let Some(root) = self.surface_root_of(element).filter(|r| *r != self.main) {
                // close_root only fails for the main window, filtered above.
                let _ = self.close_root(root);
            }
        }
        true
    }

    fn dismiss(&mut self, element: ElementId) -> bool {
        match self.surface_root_of(element) {
            Some(root) if root != self.main => self.close_root(root).is_ok(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Scene {
        Scene {
            main: ElementSpec::new(ElementKind::Window)
                .named("Main")
                .at(0.0, 0.0, 800.0, 600.0)
                .child(
                    ElementSpec::new(ElementKind::Button)
                        .named("Prefs")
                        .at(10.0, 10.0, 80.0, 30.0)
                        .opens("prefs"),
                )
                .child(
                    ElementSpec::new(ElementKind::Slider)
                        .id("volume")
                        .range(50.0, 0.0, 100.0),
                ),
            surfaces: vec![SurfaceSpec {
                root: ElementSpec::new(ElementKind::Dialog)
                    .id("prefs")
                    .child(ElementSpec::new(ElementKind::Button).named("Close").closes()),
                anchor: Some("Prefs".into()),
                open: false,
            }],
        }
    }

    #[test]
    fn scene_builds_main_tree() {
        let tree = MemoryTree::from_scene(scene()).unwrap();
        let main = tree.main_root();
        assert!(tree.is_surface_root(main));
        assert_eq!(tree.children(main).len(), 2);
        let prefs = tree.find("prefs").unwrap();
        assert_eq!(tree.parent(prefs), Some(main));
        assert_eq!(tree.bounds(prefs), Some(Rect::new(10.0, 10.0, 80.0, 30.0)));
    }

    #[test]
    fn activation_opens_and_closes_surfaces() {
        let mut tree = MemoryTree::from_scene(scene()).unwrap();
        let prefs_button = tree.find("Prefs").unwrap();
        assert!(tree.activate(prefs_button));

        let notes = tree.take_notifications();
        let HostNotification::SurfaceOpened { root, anchor } = notes[0] else {
            panic!("expected SurfaceOpened, got {notes:?}");
        };
        assert_eq!(anchor, Some(prefs_button));
        assert!(tree.parent(root).is_none());

        let close = tree.find("Close").unwrap();
        assert!(tree.activate(close));
        assert_eq!(
            tree.take_notifications(),
            vec![HostNotification::SurfaceClosed { root }]
        );
        assert!(!tree.is_alive(close));
        assert!(tree.open_surfaces().is_empty());
    }

    #[test]
    fn remove_queues_unloaded_and_drops_subtree() {
        let mut tree = MemoryTree::from_scene(scene()).unwrap();
        let slider = tree.find("volume").unwrap();
        tree.remove(slider).unwrap();
        assert!(!tree.is_alive(slider));
        assert_eq!(tree.children(tree.main_root()).len(), 1);
        assert_eq!(
            tree.take_notifications(),
            vec![HostNotification::Unloaded { element: slider }]
        );
        assert!(matches!(
            tree.remove(tree.main_root()),
            Err(SceneError::MainWindow)
        ));
    }

    #[test]
    fn set_value_clamps() {
        let mut tree = MemoryTree::from_scene(scene()).unwrap();
        let slider = tree.find("volume").unwrap();
        assert!(tree.set_value(slider, 150.0));
        assert_eq!(tree.range_value(slider).unwrap().value, 100.0);
        let button = tree.find("Prefs").unwrap();
        assert!(!tree.set_value(button, 1.0));
    }

    #[test]
    fn resolve_accepts_ids_and_names() {
        let tree = MemoryTree::from_scene(scene()).unwrap();
        let prefs = tree.find("Prefs").unwrap();
        assert_eq!(tree.resolve(&prefs.to_string()).unwrap(), prefs);
        assert_eq!(tree.resolve(&prefs.0.to_string()).unwrap(), prefs);
        assert_eq!(tree.resolve("prefs").unwrap(), prefs);
        assert!(tree.resolve("nope").is_err());
    }

    #[test]
    fn scene_parses_from_json() {
        let json = r#"{
            "main": {"kind": "window", "name": "Main", "children": [
                {"kind": "button", "id": "ok", "bounds": [0, 0, 10, 10]},
                {"kind": "popup", "name": "Inline", "surface": true}
            ]},
            "surfaces": [{"root": {"kind": "context_menu", "name": "ctx"}, "open": true}]
        }"#;
        let mut tree = MemoryTree::from_json(json).unwrap();
        assert!(tree.find("ok").is_some());
        let inline = tree.find("Inline").unwrap();
        assert!(tree.is_surface_root(inline));
        assert!(tree.parent(inline).is_none());
        assert_eq!(tree.surface_anchor(inline), Some(tree.main_root()));
        assert_eq!(tree.open_surfaces(), vec!["ctx".to_string()]);
        assert_eq!(tree.take_notifications().len(), 1);
    }

    #[test]
    fn dismiss_only_closes_secondary_surfaces() {
        let mut tree = MemoryTree::from_scene(scene()).unwrap();
        let main = tree.main_root();
        assert!(!tree.dismiss(main));
        let root = tree.open_surface("prefs").unwrap();
        assert!(tree.dismiss(root));
        assert!(!tree.is_alive(root));
    }
}
