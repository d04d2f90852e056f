//! Classification rules.
//!
//! Rules arrive as already-parsed data ([`RawRule`], usually deserialized from
//! JSON) and are compiled once into a [`RuleSet`]. A rule maps a path pattern
//! to a role, a modal flag, and optional control-surface metadata. Rules with
//! `exclude: true` reject every element they match instead.
//!
//! Lookup is first-match-wins; rules are never merged.
//!
//! # Malformed rules
//!
//! [`RuleLoadMode::Strict`] stops at the first bad rule so authoring mistakes
//! show up immediately. [`RuleLoadMode::Lenient`] logs and skips the offending
//! rule and keeps loading the rest.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::feedback::PageLayout;
use crate::keymap::{is_reserved_key, PAGE_ADJUST, PAGE_CONFIRM, PAGE_NAV};
use crate::node::Role;
use crate::path::{PathPattern, PatternError};

/// What pressing a shortcut key does to its node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Focus the node and invoke its default action.
    #[default]
    Activate,
    /// Only move focus to the node.
    Focus,
    /// Focus the node and enter interactive adjustment mode.
    Interact,
}

/// Control-surface shortcut attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutMeta {
    /// Key name on the control surface.
    pub key: String,
    /// Display title.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Hold the action until the user confirms.
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub target: TargetKind,
}

/// A control-surface page selected while a scope is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub name: String,
    pub layout: PageLayout,
}

/// One rule as supplied by the rule source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRule {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modal: Option<bool>,
    #[serde(default)]
    pub exclude: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<ShortcutMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageMeta>,
}

impl RawRule {
    /// A classification rule with just a role.
    #[must_use]
    pub fn role(pattern: impl Into<String>, role: Role) -> Self {
        Self {
            pattern: pattern.into(),
            role: Some(role),
            modal: None,
            exclude: false,
            shortcut: None,
            page: None,
        }
    }

    /// An exclusion rule.
    #[must_use]
    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            role: None,
            modal: None,
            exclude: true,
            shortcut: None,
            page: None,
        }
    }

    #[must_use]
    pub fn with_modal(mut self, modal: bool) -> Self {
        self.modal = Some(modal);
        self
    }

    #[must_use]
    pub fn with_shortcut(mut self, shortcut: ShortcutMeta) -> Self {
        self.shortcut = Some(shortcut);
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: PageMeta) -> Self {
        self.page = Some(page);
        self
    }
}

/// How to react to malformed rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLoadMode {
    /// Fail on the first malformed rule.
    Strict,
    /// Skip malformed rules with a warning.
    Lenient,
}

impl Default for RuleLoadMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            RuleLoadMode::Strict
        } else {
            RuleLoadMode::Lenient
        }
    }
}

/// A malformed rule.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {index}: {source}")]
    Pattern {
        index: usize,
        #[source]
        source: PatternError,
    },
    #[error("rule {index} ('{pattern}') has neither a role nor exclude")]
    MissingRole { index: usize, pattern: String },
    #[error("rule {index} ('{pattern}') is an exclusion but also sets a role or metadata")]
    ExclusionWithMetadata { index: usize, pattern: String },
    #[error("rule {index} ('{pattern}') has an empty shortcut key")]
    EmptyShortcutKey { index: usize, pattern: String },
    #[error("rule {index} ('{pattern}') uses reserved key '{key}' as a shortcut")]
    ReservedKey {
        index: usize,
        pattern: String,
        key: String,
    },
    #[error("rule {index} ('{pattern}') declares a page with an invalid name '{name}'")]
    BadPageName {
        index: usize,
        pattern: String,
        name: String,
    },
    #[error("rules are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A compiled classification rule.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub pattern: PathPattern,
    pub role: Role,
    pub modal: Option<bool>,
    pub shortcut: Option<ShortcutMeta>,
    /// Name of the page this rule's scope selects.
    pub page: Option<String>,
}

/// Compiled, immutable rule data.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ClassificationRule>,
    exclusions: Vec<PathPattern>,
    pages: Vec<PageMeta>,
}

impl RuleSet {
    /// An empty rule set: classification falls back to the kind whitelists.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile raw rules in order.
    pub fn compile(raw: Vec<RawRule>, mode: RuleLoadMode) -> Result<Self, RuleError> {
        let mut set = RuleSet::default();
        let mut page_names: HashSet<String> = HashSet::new();

        for (index, rule) in raw.into_iter().enumerate() {
            match compile_one(index, rule) {
                Ok(Compiled::Exclusion(pattern)) => set.exclusions.push(pattern),
                Ok(Compiled::Rule(rule, page)) => {
                    if let Some(page) = page {
                        if page_names.insert(page.name.to_lowercase()) {
                            set.pages.push(page);
                        }
                    }
                    set.rules.push(*rule);
                }
                Err(e) => match mode {
                    RuleLoadMode::Strict => return Err(e),
                    RuleLoadMode::Lenient => warn!("Skipping malformed rule: {}", e),
                },
            }
        }

        debug!(
            "Compiled {} classification rule(s), {} exclusion(s), {} page(s)",
            set.rules.len(),
            set.exclusions.len(),
            set.pages.len()
        );
        Ok(set)
    }

    /// Deserialize a JSON array of [`RawRule`]s and compile it.
    pub fn from_json(json: &str, mode: RuleLoadMode) -> Result<Self, RuleError> {
        let raw: Vec<RawRule> = serde_json::from_str(json)?;
        Self::compile(raw, mode)
    }

    /// First rule whose pattern matches `path`.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&ClassificationRule> {
        self.rules.iter().find(|r| r.pattern.matches(path))
    }

    /// Whether any exclusion rule matches `path`.
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclusions.iter().any(|p| p.matches(path))
    }

    /// Pages declared by rules, in rule order.
    #[must_use]
    pub fn pages(&self) -> &[PageMeta] {
        &self.pages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len() + self.exclusions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Compiled {
    Exclusion(PathPattern),
    Rule(Box<ClassificationRule>, Option<PageMeta>),
}

fn compile_one(index: usize, rule: RawRule) -> Result<Compiled, RuleError> {
    let pattern =
        PathPattern::compile(&rule.pattern).map_err(|source| RuleError::Pattern { index, source })?;

    if rule.exclude {
        if rule.role.is_some() || rule.shortcut.is_some() || rule.page.is_some() {
            return Err(RuleError::ExclusionWithMetadata {
                index,
                pattern: rule.pattern,
            });
        }
        return Ok(Compiled::Exclusion(pattern));
    }

    let Some(role) = rule.role else {
        return Err(RuleError::MissingRole {
            index,
            pattern: rule.pattern,
        });
    };

    if let Some(shortcut) = &rule.shortcut {
        let key = shortcut.key.trim();
        if key.is_empty() {
            return Err(RuleError::EmptyShortcutKey {
                index,
                pattern: rule.pattern,
            });
        }
        if is_reserved_key(key) {
            return Err(RuleError::ReservedKey {
                index,
                key: key.to_string(),
                pattern: rule.pattern,
            });
        }
    }

    if let Some(page) = &rule.page {
        let name = page.name.trim().to_lowercase();
        if name.is_empty() || [PAGE_NAV, PAGE_ADJUST, PAGE_CONFIRM].contains(&name.as_str()) {
            return Err(RuleError::BadPageName {
                index,
                name: page.name.clone(),
                pattern: rule.pattern,
            });
        }
    }

    let page_name = rule.page.as_ref().map(|p| p.name.trim().to_string());
    Ok(Compiled::Rule(
        Box::new(ClassificationRule {
            pattern,
            role,
            modal: rule.modal,
            shortcut: rule.shortcut,
            page: page_name,
        }),
        rule.page,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::page_layout;

    fn shortcut(key: &str) -> ShortcutMeta {
        ShortcutMeta {
            key: key.to_string(),
            title: "Save".to_string(),
            icon: None,
            confirm: false,
            target: TargetKind::Activate,
        }
    }

    #[test]
    fn first_match_wins() {
        let set = RuleSet::compile(
            vec![
                RawRule::role("**/Save:Button", Role::Group),
                RawRule::role("**/*", Role::Leaf),
            ],
            RuleLoadMode::Strict,
        )
        .unwrap();
        assert_eq!(set.find("Main:Window/Save:Button").unwrap().role, Role::Group);
        assert_eq!(set.find("Main:Window/Open:Button").unwrap().role, Role::Leaf);
    }

    #[test]
    fn exclusions_are_kept_apart() {
        let set = RuleSet::compile(
            vec![RawRule::exclude("**/_:Image")],
            RuleLoadMode::Strict,
        )
        .unwrap();
        assert!(set.find("A:Window/_:Image").is_none());
        assert!(set.is_excluded("A:Window/_:Image"));
        assert!(!set.is_excluded("A:Window/B:Button"));
    }

    #[test]
    fn strict_mode_fails_fast() {
        let err = RuleSet::compile(
            vec![
                RawRule::role("ok:Button", Role::Leaf),
                RawRule::role("bad//pattern", Role::Leaf),
            ],
            RuleLoadMode::Strict,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::Pattern { index: 1, .. }));
    }

    #[test]
    fn lenient_mode_skips_only_the_bad_rule() {
        let set = RuleSet::compile(
            vec![
                RawRule::role("bad**", Role::Leaf),
                RawRule::role("ok:Button", Role::Leaf),
                RawRule {
                    role: None,
                    ..RawRule::role("norole:Button", Role::Leaf)
                },
            ],
            RuleLoadMode::Lenient,
        )
        .unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.find("ok:Button").is_some());
    }

    #[test]
    fn reserved_shortcut_keys_are_rejected() {
        let err = RuleSet::compile(
            vec![RawRule::role("a:Button", Role::Leaf).with_shortcut(shortcut("Enter"))],
            RuleLoadMode::Strict,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::ReservedKey { .. }));

        let err = RuleSet::compile(
            vec![RawRule::role("a:Button", Role::Leaf).with_shortcut(shortcut("  "))],
            RuleLoadMode::Strict,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::EmptyShortcutKey { .. }));
    }

    #[test]
    fn exclusion_with_role_is_malformed() {
        let mut rule = RawRule::exclude("a:Button");
        rule.role = Some(Role::Leaf);
        let err = RuleSet::compile(vec![rule], RuleLoadMode::Strict).unwrap_err();
        assert!(matches!(err, RuleError::ExclusionWithMetadata { .. }));
    }

    #[test]
    fn pages_are_collected_once() {
        let page = PageMeta {
            name: "editor".to_string(),
            layout: page_layout(&[&["save"]]),
        };
        let set = RuleSet::compile(
            vec![
                RawRule::role("Edit:Dialog", Role::Group).with_page(page.clone()),
                RawRule::role("Edit2:Dialog", Role::Group).with_page(page),
            ],
            RuleLoadMode::Strict,
        )
        .unwrap();
        assert_eq!(set.pages().len(), 1);
        assert_eq!(set.find("Edit:Dialog#2").unwrap().page.as_deref(), Some("editor"));
    }

    #[test]
    fn builtin_page_names_are_reserved() {
        let page = PageMeta {
            name: "NAV".to_string(),
            layout: page_layout(&[]),
        };
        let err = RuleSet::compile(
            vec![RawRule::role("x:Dialog", Role::Group).with_page(page)],
            RuleLoadMode::Strict,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::BadPageName { .. }));
    }

    #[test]
    fn rules_load_from_json() {
        let json = r#"[
            {"pattern": "**/Volume:Slider", "role": "leaf",
             "shortcut": {"key": "vol", "title": "Volume", "target": "interact"}},
            {"pattern": "**/_:Image", "exclude": true},
            {"pattern": "**/Prefs:Panel", "role": "group", "modal": true}
        ]"#;
        let set = RuleSet::from_json(json, RuleLoadMode::Strict).unwrap();
        assert_eq!(set.len(), 3);
        let rule = set.find("Main:Window/Volume:Slider").unwrap();
        assert_eq!(rule.shortcut.as_ref().unwrap().target, TargetKind::Interact);
        assert_eq!(set.find("Main:Window/Prefs:Panel").unwrap().modal, Some(true));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            RuleSet::from_json("{not json", RuleLoadMode::Lenient),
            Err(RuleError::Json(_))
        ));
    }
}
