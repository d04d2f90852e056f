//! Core types and logic for padpilot.
//!
//! padpilot drives a desktop UI from a small button panel: a few arrow keys,
//! `activate`, `exit`, and whatever shortcut keys the rules declare. This
//! crate discovers the navigable elements of a hosted UI, tracks which scope
//! the user is in, and moves focus geometrically.
//!
//! # Modules
//!
//! - [`element`]: the host element-tree contract, [`memory`] implements it in memory
//! - [`path`], [`rules`], [`classifier`]: which elements become nodes
//! - [`scanner`], [`discovery`]: per-surface scans and the global node table
//! - [`navigation`]: context stack, directional movement, value adjustment
//! - [`scheduler`]: deferred work at named priority tiers
//! - [`feedback`], [`keymap`]: focus rendering and the control surface
//! - [`engine`]: the service that wires all of the above together
//! - [`protocol`], [`error`], [`snapshot`]: the CLI/daemon wire format
//!
//! # Flow
//!
//! | Input | Goes to | Result |
//! |-------|---------|--------|
//! | Host notification | [`engine::Engine::handle_notification`] | rate-limited scans, scope pushes/pops |
//! | Key press | [`engine::Engine::press_key`] | focus moves, activation, value changes |
//! | Timer / idle | [`engine::Engine::pump`] | trailing scans, deferred focus |
//!
//! Everything is single-threaded and synchronous. Embedders serialize access
//! to an [`engine::Engine`] the way they serialize access to their UI.

pub mod arena;
pub mod classifier;
pub mod config;
pub mod discovery;
pub mod element;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod geometry;
pub mod keymap;
pub mod memory;
pub mod navigation;
pub mod node;
pub mod path;
pub mod protocol;
pub mod rules;
pub mod scanner;
pub mod scheduler;
pub mod snapshot;
