/// Collision resolver: axis-aligned box overlap between a mover's
/// prospective position and a bystander. Pure predicate, no mutation.

use super::action::Move;
use super::thing::Thing;

/// Would `a` overlap `b` after the candidate move?
///
/// The probe offsets by the move's raw velocity — not velocity scaled
/// by speed, and not the final resolved displacement. Downstream
/// collision outcomes depend on the raw offset; do not scale it.
/// Boxes are centered on each thing's position with half-girth extents.
pub fn has_collision(a: &Thing, b: &Thing, mv: &Move) -> bool {
    let (ax, ay) = a.position();
    let (aw, ah) = a.girth();
    let (bx, by) = b.position();
    let (bw, bh) = b.girth();

    let ax = ax + mv.vx;
    let ay = ay + mv.vy;

    (ax - aw / 2.0 < bx + bw / 2.0 && ax + aw / 2.0 > bx - bw / 2.0)
        && (ay - ah / 2.0 < by + bh / 2.0 && ay + ah / 2.0 > by - bh / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::thing::{Behavior, ThingProto};

    fn thing_at(x: f64, y: f64, girth: u32, speed: f64) -> Thing {
        let proto = ThingProto {
            name: "crate".to_string(),
            symbol: 'c',
            enemy: false,
            block: false,
            block_glitch: false,
            speed,
            energy: 0,
            exit: false,
            behavior: Behavior::None,
        };
        Thing::spawn(&proto, (girth, girth), x, y)
    }

    #[test]
    fn overlap_detected() {
        let a = thing_at(0.0, 0.0, 16, 1.0);
        let b = thing_at(10.0, 0.0, 16, 1.0);
        assert!(has_collision(&a, &b, &Move::with_velocity(0.0, 0.0)));
    }

    #[test]
    fn separated_boxes_do_not_collide() {
        let a = thing_at(0.0, 0.0, 16, 1.0);
        let b = thing_at(40.0, 0.0, 16, 1.0);
        assert!(!has_collision(&a, &b, &Move::with_velocity(0.0, 0.0)));
    }

    #[test]
    fn touching_edges_do_not_collide() {
        // Half-girths sum to exactly the distance: strict inequality.
        let a = thing_at(0.0, 0.0, 16, 1.0);
        let b = thing_at(16.0, 0.0, 16, 1.0);
        assert!(!has_collision(&a, &b, &Move::with_velocity(0.0, 0.0)));
    }

    #[test]
    fn probe_moves_toward_target() {
        let a = thing_at(0.0, 0.0, 16, 1.0);
        let b = thing_at(16.5, 0.0, 16, 1.0);
        assert!(!has_collision(&a, &b, &Move::with_velocity(0.0, 0.0)));
        assert!(has_collision(&a, &b, &Move::with_velocity(1.0, 0.0)));
    }

    /// The probe uses raw velocity, not velocity scaled by the mover's
    /// speed. A fast mover probes the same 1-pixel offset a slow mover
    /// does, even though it will travel further once the move applies.
    #[test]
    fn probe_ignores_mover_speed() {
        let fast = thing_at(0.0, 0.0, 16, 8.0);
        let b = thing_at(20.0, 0.0, 16, 1.0);
        // Scaled displacement (8px) would overlap; the raw 1px probe
        // does not.
        assert!(!has_collision(&fast, &b, &Move::with_velocity(1.0, 0.0)));
    }

    #[test]
    fn vertical_axis_checked_too() {
        let a = thing_at(0.0, 0.0, 16, 1.0);
        let b = thing_at(0.0, 30.0, 16, 1.0);
        assert!(!has_collision(&a, &b, &Move::with_velocity(0.0, 1.0)));
        let near = thing_at(0.0, 15.0, 16, 1.0);
        assert!(has_collision(&a, &near, &Move::with_velocity(0.0, 1.0)));
    }
}
