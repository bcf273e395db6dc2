//! Geometric entities.
//!
//! Each entity registers one variable per scalar degree of freedom with the
//! system and keeps the ids. Entities are plain id bundles: cheap to copy,
//! and the system remains the single owner of all state.

use crate::id::VarId;
use crate::node::Variable;
use crate::system::System;

/// A 2D point: two variables.
#[derive(Clone, Copy, Debug)]
pub struct Point {
    /// Variable holding the x coordinate.
    pub x: VarId,
    /// Variable holding the y coordinate.
    pub y: VarId,
}

impl Point {
    /// Register a point with initial coordinates (which double as the
    /// solver's initial guess).
    pub fn new(sys: &mut System, name: &str, x: f64, y: f64) -> Self {
        Self {
            x: sys.add_variable(Variable::new(format!("{name}.x"), x)),
            y: sys.add_variable(Variable::new(format!("{name}.y"), y)),
        }
    }

    /// Current coordinates.
    pub fn pos(&self, sys: &System) -> (f64, f64) {
        (sys.value(self.x), sys.value(self.y))
    }
}

/// A finite line segment: two points.
#[derive(Clone, Copy, Debug)]
pub struct LineSegment {
    /// One endpoint.
    pub p1: Point,
    /// The other endpoint.
    pub p2: Point,
}

impl LineSegment {
    /// Register a line segment with initial endpoint coordinates.
    pub fn new(sys: &mut System, name: &str, p1: (f64, f64), p2: (f64, f64)) -> Self {
        Self {
            p1: Point::new(sys, &format!("{name}.p1"), p1.0, p1.1),
            p2: Point::new(sys, &format!("{name}.p2"), p2.0, p2.1),
        }
    }

    /// Current length.
    pub fn length(&self, sys: &System) -> f64 {
        let (x1, y1) = self.p1.pos(sys);
        let (x2, y2) = self.p2.pos(sys);
        libm::hypot(x2 - x1, y2 - y1)
    }
}

/// A circle: a center point and a radius variable.
#[derive(Clone, Copy, Debug)]
pub struct Circle {
    /// The center.
    pub center: Point,
    /// Variable holding the radius.
    pub radius: VarId,
}

impl Circle {
    /// Register a circle with an initial center and radius.
    pub fn new(sys: &mut System, name: &str, cx: f64, cy: f64, r: f64) -> Self {
        Self {
            center: Point::new(sys, &format!("{name}.p"), cx, cy),
            radius: sys.add_variable(Variable::new(format!("{name}.r"), r)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_register_one_variable_per_dof() {
        let mut sys = System::new();
        let p = Point::new(&mut sys, "p", 1.0, 2.0);
        let l = LineSegment::new(&mut sys, "l", (0.0, 0.0), (3.0, 4.0));
        let c = Circle::new(&mut sys, "c", 0.0, 0.0, 2.5);

        assert_eq!(sys.nodes().vars().count(), 2 + 4 + 3);
        let (px, py) = p.pos(&sys);
        assert!((px - 1.0).abs() < 1e-12 && (py - 2.0).abs() < 1e-12);
        assert!((l.length(&sys) - 5.0).abs() < 1e-12);
        assert!((sys.value(c.radius) - 2.5).abs() < 1e-12);
        assert_eq!(sys.nodes().var(c.radius).name(), "c.r");
    }
}
