//! Spatial focus search.
//!
//! Both searches work on [`Placed`] candidates: nodes whose geometry has
//! already been resolved. Equal scores go to the earliest-discovered node
//! (lowest `seq`), so the outcome does not depend on the order the
//! candidates are handed in.

use crate::config::EngineConfig;
use crate::geometry::{Direction, Point};
use crate::node::NodeId;

const EPSILON: f64 = 1e-6;

/// Weights of the directional cost function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scoring {
    /// Perpendicular offset (px) under which two nodes count as aligned.
    pub alignment_tolerance: f64,
    pub same_parent_bonus: f64,
    pub alignment_bonus: f64,
    /// Row weight of the reading-order score used for initial focus.
    pub reading_order_weight: f64,
}

impl From<&EngineConfig> for Scoring {
    fn from(config: &EngineConfig) -> Self {
        Self {
            alignment_tolerance: config.alignment_tolerance,
            same_parent_bonus: config.same_parent_bonus,
            alignment_bonus: config.alignment_bonus,
            reading_order_weight: config.reading_order_weight,
        }
    }
}

impl Default for Scoring {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// A focus candidate with resolved geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placed {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub center: Point,
    pub seq: u64,
}

/// Reading-order pick: topmost row first, leftmost within a row.
#[must_use]
pub fn initial_focus(candidates: &[Placed], scoring: &Scoring) -> Option<NodeId> {
    let score = |p: &Placed| p.center.x + p.center.y * scoring.reading_order_weight;
    candidates
        .iter()
        .min_by(|a, b| score(a).total_cmp(&score(b)).then(a.seq.cmp(&b.seq)))
        .map(|p| p.id)
}

/// Cheapest candidate in `direction` from `current`, if any lies that way.
#[must_use]
pub fn find_in_direction(
    current: &Placed,
    candidates: &[Placed],
    direction: Direction,
    scoring: &Scoring,
) -> Option<NodeId> {
    candidates
        .iter()
        .filter(|c| c.id != current.id)
        .filter_map(|c| directional_cost(current, c, direction, scoring).map(|cost| (c, cost)))
        .min_by(|(a, ca), (b, cb)| ca.total_cmp(cb).then(a.seq.cmp(&b.seq)))
        .map(|(c, _)| c.id)
}

/// `distance / dot`, scaled down for siblings and aligned nodes. `None` for
/// candidates on the wrong side or at the same spot.
fn directional_cost(
    from: &Placed,
    to: &Placed,
    direction: Direction,
    scoring: &Scoring,
) -> Option<f64> {
    let (dx, dy) = from.center.to(to.center);
    let distance = dx.hypot(dy);
    if distance < EPSILON {
        return None;
    }
    let (ux, uy) = direction.unit();
    let dot = (dx * ux + dy * uy) / distance;
    if dot <= 0.0 {
        return None;
    }

    let mut cost = distance / dot.max(EPSILON);
    if from.parent.is_some() && from.parent == to.parent {
        cost *= scoring.same_parent_bonus;
    }
    let offset = if direction.is_horizontal() { dy } else { dx };
    if offset.abs() <= scoring.alignment_tolerance {
        cost *= scoring.alignment_bonus;
    }
    Some(cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Slot;

    fn id(n: u32) -> NodeId {
        NodeId(Slot {
            index: n,
            generation: 0,
        })
    }

    fn placed(n: u32, x: f64, y: f64) -> Placed {
        Placed {
            id: id(n),
            parent: None,
            center: Point::new(x, y),
            seq: u64::from(n),
        }
    }

    fn with_parent(mut p: Placed, parent: u32) -> Placed {
        p.parent = Some(id(parent));
        p
    }

    #[test]
    fn three_in_a_row() {
        let a = placed(1, 0.0, 0.0);
        let b = placed(2, 100.0, 0.0);
        let c = placed(3, 200.0, 0.0);
        let all = [a, b, c];
        let s = Scoring::default();
        assert_eq!(find_in_direction(&b, &all, Direction::Right, &s), Some(c.id));
        assert_eq!(find_in_direction(&b, &all, Direction::Left, &s), Some(a.id));
        assert_eq!(find_in_direction(&b, &all, Direction::Up, &s), None);
    }

    #[test]
    fn nothing_beyond_the_edge() {
        let a = placed(1, 0.0, 0.0);
        let b = placed(2, 100.0, 0.0);
        let s = Scoring::default();
        assert_eq!(find_in_direction(&b, &[a, b], Direction::Right, &s), None);
    }

    #[test]
    fn same_spot_is_never_a_target() {
        let a = placed(1, 0.0, 0.0);
        let twin = placed(2, 0.0, 0.0);
        let s = Scoring::default();
        assert_eq!(find_in_direction(&a, &[a, twin], Direction::Right, &s), None);
    }

    #[test]
    fn alignment_bonus_beats_a_closer_diagonal() {
        let from = placed(1, 0.0, 0.0);
        let aligned = placed(2, 100.0, 0.0);
        let diagonal = placed(3, 80.0, 30.0);
        let all = [from, aligned, diagonal];

        let s = Scoring::default();
        assert_eq!(find_in_direction(&from, &all, Direction::Right, &s), Some(aligned.id));

        let no_bonus = Scoring {
            alignment_bonus: 1.0,
            ..Scoring::default()
        };
        assert_eq!(
            find_in_direction(&from, &all, Direction::Right, &no_bonus),
            Some(diagonal.id)
        );
    }

    #[test]
    fn siblings_are_preferred() {
        let from = with_parent(placed(1, 0.0, 0.0), 10);
        let stranger = with_parent(placed(2, 100.0, 0.0), 11);
        let sibling = with_parent(placed(3, 130.0, 0.0), 10);
        let s = Scoring::default();
        assert_eq!(
            find_in_direction(&from, &[from, stranger, sibling], Direction::Right, &s),
            Some(sibling.id)
        );
    }

    #[test]
    fn equal_cost_goes_to_earliest_discovered() {
        let from = placed(1, 0.0, 0.0);
        let late = placed(9, 0.0, 100.0);
        let early = placed(4, 0.0, 100.0);
        let s = Scoring::default();
        assert_eq!(
            find_in_direction(&from, &[from, late, early], Direction::Down, &s),
            Some(early.id)
        );
    }

    #[test]
    fn initial_focus_reads_top_left_first() {
        let s = Scoring::default();
        let candidates = [
            placed(1, 300.0, 50.0),
            placed(2, 10.0, 80.0),
            placed(3, 200.0, 50.0),
        ];
        assert_eq!(initial_focus(&candidates, &s), Some(id(3)));
        assert_eq!(initial_focus(&[], &s), None);
    }
}
