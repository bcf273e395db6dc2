//! Geometric constraints.
//!
//! Each constraint contributes one or more equations to a [`System`] and
//! hands back the equation ids, so callers can later delete or re-add it.
//! Distances and angles are themselves variables: to dimension a constraint,
//! pair it with a [`SetVar`] on that variable. That way a dimension can also
//! be left free, or tied to other geometry.
//!
//! Distance and angle residuals are unsigned: they compare absolute offsets
//! and absolute differences of headings, so mirror solutions are equally
//! valid and initial guesses pick between them. The line-offset residual is
//! directional: it measures the perpendicular offset on one side of the
//! line, so swapping a segment's endpoints selects the other tangent
//! solution.

use libm::{atan2, hypot};

use crate::error::Error;
use crate::geometry::{Circle, LineSegment, Point};
use crate::id::{EqnId, VarId};
use crate::node::Equation;
use crate::system::System;

/// Perpendicular offset residual between line (x1,y1)-(x2,y2) and point
/// (x3,y3), scaled by the squared line length. Zero when the point sits at
/// distance `d` from the line.
fn offset_line_point(x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64, d: f64) -> f64 {
    let dl = hypot(x2 - x1, y2 - y1);

    // Offset is measured perpendicular to the line; either side counts.
    let one = (dl * (y3 - y1) + d * (x2 - x1)) * (x2 - x1)
        - (dl * (x3 - x1) - d * (y2 - y1)) * (y2 - y1);
    let other = (dl * (y3 - y1) - d * (x2 - x1)) * (x2 - x1)
        - (dl * (x3 - x1) + d * (y2 - y1)) * (y2 - y1);
    one.min(other)
}

/// Fixes a variable to a parameter value. The parameter can be changed later
/// through [`SetVar::modify`], which is the cheap path for dragging a
/// dimension: only blocks downstream of the variable re-solve.
#[derive(Clone, Copy, Debug)]
pub struct SetVar {
    /// The variable being set.
    pub var: VarId,
    /// The equation `var - value = 0`.
    pub eqn: EqnId,
}

impl SetVar {
    /// Constrain `var` to equal `val`.
    pub fn new(sys: &mut System, name: &str, var: VarId, val: f64) -> Result<Self, Error> {
        let eqn = sys.add_equation(Equation::with_params(
            name,
            vec![var],
            vec![val],
            |v, p| v[0] - p[0],
        ))?;
        Ok(Self { var, eqn })
    }

    /// Change the set value. Writes the variable too, so the owning block is
    /// already satisfied and only dependent blocks re-solve on update.
    pub fn modify(&self, sys: &mut System, val: f64) {
        sys.set_equation_params(self.eqn, vec![val]);
        sys.modify_variable(self.var, val);
    }
}

/// Horizontal distance between two points equals the variable `d`.
#[derive(Clone, Copy, Debug)]
pub struct HorzDist {
    /// The single equation of this constraint.
    pub eqn: EqnId,
}

impl HorzDist {
    /// Constrain `|p2.x - p1.x|` to equal the variable `d`.
    pub fn new(sys: &mut System, name: &str, p1: Point, p2: Point, d: VarId) -> Result<Self, Error> {
        let eqn = sys.add_equation(Equation::new(name, vec![p1.x, p2.x, d], |v, _| {
            (v[1] - v[0]).abs() - v[2]
        }))?;
        Ok(Self { eqn })
    }
}

/// Vertical distance between two points equals the variable `d`.
#[derive(Clone, Copy, Debug)]
pub struct VertDist {
    /// The single equation of this constraint.
    pub eqn: EqnId,
}

impl VertDist {
    /// Constrain `|p2.y - p1.y|` to equal the variable `d`.
    pub fn new(sys: &mut System, name: &str, p1: Point, p2: Point, d: VarId) -> Result<Self, Error> {
        let eqn = sys.add_equation(Equation::new(name, vec![p1.y, p2.y, d], |v, _| {
            (v[1] - v[0]).abs() - v[2]
        }))?;
        Ok(Self { eqn })
    }
}

/// Length of a line segment equals the variable `d`.
#[derive(Clone, Copy, Debug)]
pub struct LineLength {
    /// The single equation of this constraint.
    pub eqn: EqnId,
}

impl LineLength {
    /// Constrain the segment's length to equal the variable `d`.
    pub fn new(sys: &mut System, name: &str, l: LineSegment, d: VarId) -> Result<Self, Error> {
        let eqn = sys.add_equation(Equation::new(
            name,
            vec![l.p1.x, l.p1.y, l.p2.x, l.p2.y, d],
            |v, _| hypot(v[2] - v[0], v[3] - v[1]) - v[4],
        ))?;
        Ok(Self { eqn })
    }
}

/// Angle formed at `p2` by the rays towards `p1` and `p3` equals the
/// variable `a` (radians, unsigned).
#[derive(Clone, Copy, Debug)]
pub struct AnglePoint3 {
    /// The single equation of this constraint.
    pub eqn: EqnId,
}

impl AnglePoint3 {
    /// Constrain the angle at `p2` (the middle point is the vertex).
    pub fn new(
        sys: &mut System,
        name: &str,
        p1: Point,
        p2: Point,
        p3: Point,
        a: VarId,
    ) -> Result<Self, Error> {
        let eqn = sys.add_equation(Equation::new(
            name,
            vec![p1.x, p1.y, p2.x, p2.y, p3.x, p3.y, a],
            |v, _| (atan2(v[4] - v[2], v[5] - v[3]) - atan2(v[0] - v[2], v[1] - v[3])).abs() - v[6],
        ))?;
        Ok(Self { eqn })
    }
}

/// A line segment tangent to a circle.
#[derive(Clone, Copy, Debug)]
pub struct TangentLineCircle {
    /// The single equation of this constraint.
    pub eqn: EqnId,
}

impl TangentLineCircle {
    /// Constrain `l` to touch `c` in exactly one place.
    pub fn new(sys: &mut System, name: &str, l: LineSegment, c: Circle) -> Result<Self, Error> {
        let eqn = sys.add_equation(Equation::new(
            name,
            vec![
                l.p1.x, l.p1.y, l.p2.x, l.p2.y, c.center.x, c.center.y, c.radius,
            ],
            |v, _| offset_line_point(v[0], v[1], v[2], v[3], v[4], v[5], v[6]),
        ))?;
        Ok(Self { eqn })
    }
}

/// A point on the perimeter of a circle.
#[derive(Clone, Copy, Debug)]
pub struct PointOnCircle {
    /// The single equation of this constraint.
    pub eqn: EqnId,
}

impl PointOnCircle {
    /// Constrain `p` to sit on the perimeter of `c`.
    pub fn new(sys: &mut System, name: &str, p: Point, c: Circle) -> Result<Self, Error> {
        let eqn = sys.add_equation(Equation::new(
            name,
            vec![p.x, p.y, c.center.x, c.center.y, c.radius],
            |v, _| hypot(v[2] - v[0], v[3] - v[1]) - v[4],
        ))?;
        Ok(Self { eqn })
    }
}

/// Two points coincide: one equation per axis.
#[derive(Clone, Copy, Debug)]
pub struct CoincidentPoint2 {
    /// The `p1.x - p2.x = 0` equation.
    pub x_eqn: EqnId,
    /// The `p1.y - p2.y = 0` equation.
    pub y_eqn: EqnId,
}

impl CoincidentPoint2 {
    /// Constrain `p1` and `p2` to be the same point.
    pub fn new(sys: &mut System, name: &str, p1: Point, p2: Point) -> Result<Self, Error> {
        let x_eqn = sys.add_equation(Equation::new(
            format!("{name}.x"),
            vec![p1.x, p2.x],
            |v, _| v[0] - v[1],
        ))?;
        let y_eqn = sys.add_equation(Equation::new(
            format!("{name}.y"),
            vec![p1.y, p2.y],
            |v, _| v[0] - v[1],
        ))?;
        Ok(Self { x_eqn, y_eqn })
    }
}
