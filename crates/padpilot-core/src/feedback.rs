//! Outbound interfaces: the focus renderer and the control-surface transport.
//!
//! Both live outside the engine. The engine owns exactly one instance of each
//! for its whole lifetime and only ever issues declarative calls, so a
//! transport can replay its last-known state after a reconnect without asking
//! the engine for anything.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::geometry::Rect;

/// Columns on a control-surface page.
pub const PAGE_COLS: usize = 5;

/// Rows on a control-surface page.
pub const PAGE_ROWS: usize = 3;

/// A 5x3 grid of key names. `None` leaves a button blank.
pub type PageLayout = [[Option<String>; PAGE_COLS]; PAGE_ROWS];

/// Draws the focus rectangle and the debug overlay.
pub trait FocusRenderer: Send {
    fn show_focus_rect(&mut self, rect: Rect);
    fn hide_focus_rect(&mut self);
    fn show_debug_overlay(&mut self, leaves: &[Rect], groups: &[Rect]);
    fn clear_debug_overlay(&mut self);
}

/// Declarative, idempotent calls to the physical button panel.
pub trait ControlSurface: Send {
    fn define_key(&mut self, name: &str, title: &str, icon: Option<&str>);
    fn define_page(&mut self, name: &str, layout: &PageLayout);
    fn switch_page(&mut self, name: &str);
}

/// Build a page from row slices. Extra cells are ignored, missing ones stay blank.
#[must_use]
pub fn page_layout(rows: &[&[&str]]) -> PageLayout {
    let mut layout: PageLayout = Default::default();
    for (r, row) in rows.iter().take(PAGE_ROWS).enumerate() {
        for (c, name) in row.iter().take(PAGE_COLS).enumerate() {
            if !name.is_empty() {
                layout[r][c] = Some((*name).to_string());
            }
        }
    }
    layout
}

/// Truncate a key title to `max_width` display columns, ending with `…`.
///
/// Width is measured in terminal-style columns, so CJK titles get half as
/// many characters as Latin ones.
#[must_use]
pub fn fit_title(title: &str, max_width: usize) -> String {
    let title = title.trim();
    if title.width() <= max_width {
        return title.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let budget = max_width - 1;
    let mut out = String::new();
    let mut used = 0;
    for ch in title.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

/// Renderer that remembers what it was last asked to draw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingRenderer {
    pub focus: Option<Rect>,
    pub overlay_leaves: Vec<Rect>,
    pub overlay_groups: Vec<Rect>,
    /// Number of `show_focus_rect` calls, handy for spotting redundant redraws.
    pub focus_draws: usize,
}

impl FocusRenderer for RecordingRenderer {
    fn show_focus_rect(&mut self, rect: Rect) {
        self.focus = Some(rect);
        self.focus_draws += 1;
    }

    fn hide_focus_rect(&mut self) {
        self.focus = None;
    }

    fn show_debug_overlay(&mut self, leaves: &[Rect], groups: &[Rect]) {
        self.overlay_leaves = leaves.to_vec();
        self.overlay_groups = groups.to_vec();
    }

    fn clear_debug_overlay(&mut self) {
        self.overlay_leaves.clear();
        self.overlay_groups.clear();
    }
}

/// A key as defined on the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDef {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Control surface that keeps the declared state in memory.
///
/// This is exactly the state a real transport would replay on reconnect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingSurface {
    pub keys: BTreeMap<String, KeyDef>,
    pub pages: BTreeMap<String, PageLayout>,
    pub current_page: Option<String>,
}

impl ControlSurface for RecordingSurface {
    fn define_key(&mut self, name: &str, title: &str, icon: Option<&str>) {
        self.keys.insert(
            name.to_string(),
            KeyDef {
                title: title.to_string(),
                icon: icon.map(str::to_string),
            },
        );
    }

    fn define_page(&mut self, name: &str, layout: &PageLayout) {
        self.pages.insert(name.to_string(), layout.clone());
    }

    fn switch_page(&mut self, name: &str) {
        self.current_page = Some(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_title_keeps_short_titles() {
        assert_eq!(fit_title("Save", 10), "Save");
        assert_eq!(fit_title("  Save  ", 4), "Save");
    }

    #[test]
    fn fit_title_truncates_with_ellipsis() {
        assert_eq!(fit_title("Preferences", 6), "Prefe…");
        assert_eq!(fit_title("Preferences", 0), "");
    }

    #[test]
    fn fit_title_counts_wide_characters() {
        // Each CJK character is two columns wide.
        let fitted = fit_title("日本語テスト", 5);
        assert_eq!(fitted, "日本…");
        assert!(fitted.width() <= 5);
    }

    #[test]
    fn page_layout_fills_grid() {
        let layout = page_layout(&[&["", "up", ""], &["left", "activate", "right"]]);
        assert_eq!(layout[0][1].as_deref(), Some("up"));
        assert_eq!(layout[1][0].as_deref(), Some("left"));
        assert!(layout[0][0].is_none());
        assert!(layout[2].iter().all(Option::is_none));
    }

    #[test]
    fn recording_surface_is_idempotent() {
        let mut s = RecordingSurface::default();
        s.define_key("up", "Up", Some("arrow-up"));
        s.define_key("up", "Up", Some("arrow-up"));
        assert_eq!(s.keys.len(), 1);
        s.switch_page("nav");
        assert_eq!(s.current_page.as_deref(), Some("nav"));
    }

    #[test]
    fn recording_renderer_tracks_focus() {
        let mut r = RecordingRenderer::default();
        r.show_focus_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(r.focus.is_some());
        r.hide_focus_rect();
        assert!(r.focus.is_none());
        assert_eq!(r.focus_draws, 1);
    }
}
