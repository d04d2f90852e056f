//! Adjustable controls for interactive mode.
//!
//! Each control kind that can be adjusted gets its own small type
//! implementing [`Adjustable`]; [`AdjustableKind`] picks the right one from
//! the element kind. Step size and which way "up" goes are per kind.

use crate::element::{ElementKind, RangeValue};
use crate::geometry::AdjustDirection;

/// A control with a scalar value.
pub trait Adjustable {
    fn range(&self) -> &RangeValue;

    /// Amount one adjustment moves the value.
    fn step(&self) -> f64;

    /// `1.0` if adjusting up increases the value, `-1.0` if it decreases it.
    fn up_sign(&self) -> f64 {
        1.0
    }

    fn value(&self) -> f64 {
        self.range().value
    }

    /// Value after one adjustment, clamped to the range.
    fn adjusted(&self, direction: AdjustDirection) -> f64 {
        let delta = direction.sign() * self.up_sign() * self.step();
        self.range().clamp(self.value() + delta)
    }
}

/// Continuous slider: 5% of the range per step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderControl(pub RangeValue);

impl Adjustable for SliderControl {
    fn range(&self) -> &RangeValue {
        &self.0
    }

    fn step(&self) -> f64 {
        self.0.span() * 0.05
    }
}

/// Scroll bar: 10% of the range per step. Up scrolls toward the start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollBarControl(pub RangeValue);

impl Adjustable for ScrollBarControl {
    fn range(&self) -> &RangeValue {
        &self.0
    }

    fn step(&self) -> f64 {
        self.0.span() * 0.10
    }

    fn up_sign(&self) -> f64 {
        -1.0
    }
}

/// Numeric spinner: the host's small change, or 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinnerControl(pub RangeValue);

impl Adjustable for SpinnerControl {
    fn range(&self) -> &RangeValue {
        &self.0
    }

    fn step(&self) -> f64 {
        self.0
            .small_change
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(1.0)
    }
}

/// Item selector (combo box): the value is an item index. Up selects the
/// previous item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectorControl(pub RangeValue);

impl Adjustable for SelectorControl {
    fn range(&self) -> &RangeValue {
        &self.0
    }

    fn step(&self) -> f64 {
        1.0
    }

    fn up_sign(&self) -> f64 {
        -1.0
    }

    fn adjusted(&self, direction: AdjustDirection) -> f64 {
        let delta = direction.sign() * self.up_sign();
        self.0.clamp((self.value() + delta).round())
    }
}

/// The adjustable control variants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdjustableKind {
    Slider(SliderControl),
    ScrollBar(ScrollBarControl),
    Spinner(SpinnerControl),
    Selector(SelectorControl),
}

impl AdjustableKind {
    /// Kinds that support interactive mode.
    #[must_use]
    pub fn supports(kind: &ElementKind) -> bool {
        matches!(
            kind,
            ElementKind::Slider | ElementKind::ScrollBar | ElementKind::Spinner | ElementKind::ComboBox
        )
    }

    /// Wrap a control's current range in the variant for its kind.
    #[must_use]
    pub fn for_element(kind: &ElementKind, range: RangeValue) -> Option<Self> {
        let adjustable = match kind {
            ElementKind::Slider => AdjustableKind::Slider(SliderControl(range)),
            ElementKind::ScrollBar => AdjustableKind::ScrollBar(ScrollBarControl(range)),
            ElementKind::Spinner => AdjustableKind::Spinner(SpinnerControl(range)),
            ElementKind::ComboBox => AdjustableKind::Selector(SelectorControl(range)),
            _ => return None,
        };
        Some(adjustable)
    }

    fn inner(&self) -> &dyn Adjustable {
        match self {
            AdjustableKind::Slider(c) => c,
            AdjustableKind::ScrollBar(c) => c,
            AdjustableKind::Spinner(c) => c,
            AdjustableKind::Selector(c) => c,
        }
    }
}

impl Adjustable for AdjustableKind {
    fn range(&self) -> &RangeValue {
        self.inner().range()
    }

    fn step(&self) -> f64 {
        self.inner().step()
    }

    fn up_sign(&self) -> f64 {
        self.inner().up_sign()
    }

    fn adjusted(&self, direction: AdjustDirection) -> f64 {
        self.inner().adjusted(direction)
    }
}
