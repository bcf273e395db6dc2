//! The numeric adapter: a pluggable per-block root finder.
//!
//! The scheduler hands a committed block to a [`BlockSolver`]; the solver
//! reads the current values of the block's variables as the initial guess,
//! drives the residual vector toward zero, writes the result back, and
//! reports whether every residual ended up below tolerance.
//!
//! The default backend is a damped Gauss-Newton (Levenberg-Marquardt) loop
//! over dense faer matrices with a forward-difference Jacobian. Committed
//! blocks are small, so dense factorization is the right tool here.

use faer::{Col, Mat, prelude::Solve};

use crate::block::Block;
use crate::error::Error;
use crate::id::VarId;
use crate::node::Nodes;

/// Knobs for solving and for deciding when an equation counts as satisfied.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Residual threshold for numeric convergence.
    pub solve_tolerance: f64,
    /// Residual threshold for satisfaction checks (`is_satisfied`, and the
    /// scheduler's is-this-block-still-fine test).
    pub satisfy_tolerance: f64,
    /// Iteration cap for the damped Gauss-Newton loop.
    pub max_iterations: usize,
    /// Starting value of the damping factor λ.
    pub initial_damping: f64,
    /// Stop when the step is this small relative to the current values.
    pub step_tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solve_tolerance: 1e-8,
            satisfy_tolerance: 1e-6,
            max_iterations: 200,
            initial_damping: 1e-3,
            step_tolerance: 1e-12,
        }
    }
}

/// A numeric backend that can solve one block.
pub trait BlockSolver {
    /// Solve `block` in place: read the current values of its variables as
    /// the initial guess, write the result back through `nodes`, and return
    /// whether every residual is below `config.solve_tolerance`.
    ///
    /// Blocks with no unsolved variables require no solve; for them this is
    /// just the residual check.
    fn solve_block(&self, block: &Block, nodes: &mut Nodes, config: Config)
    -> Result<bool, Error>;
}

/// One argument slot of an equation: either one of the block's unknowns, or
/// a value fixed by an upstream block.
enum Arg {
    Free(usize),
    Fixed(f64),
}

/// The default backend: damped Gauss-Newton with adaptive damping.
#[derive(Default, Debug, Clone, Copy)]
pub struct LevenbergMarquardt;

impl BlockSolver for LevenbergMarquardt {
    fn solve_block(
        &self,
        block: &Block,
        nodes: &mut Nodes,
        config: Config,
    ) -> Result<bool, Error> {
        let m = block.num_eqns();

        // Unknowns, in block order. For an under-constrained block the
        // excess variables keep their current values and only the first
        // `m` unknowns move; the square system that remains is this
        // backend's version of padding the residual vector.
        let mut unknowns: Vec<VarId> = block.solves().collect();
        if block.dof() > 0 {
            unknowns.truncate(m);
        }
        let n = unknowns.len();

        if n == 0 {
            // Check-only block: all inputs were solved elsewhere.
            return Ok(block
                .eqns()
                .all(|e| nodes.eval(e).abs() < config.solve_tolerance));
        }

        // Precompute, per equation, how to assemble its argument slice from
        // the unknown vector and the frozen variable values.
        let eqn_ids: Vec<_> = block.eqns().collect();
        let templates: Vec<Vec<Arg>> = eqn_ids
            .iter()
            .map(|e| {
                nodes
                    .eqn(*e)
                    .var_list()
                    .iter()
                    .map(|v| match unknowns.iter().position(|u| u == v) {
                        Some(k) => Arg::Free(k),
                        None => Arg::Fixed(nodes.value(*v)),
                    })
                    .collect()
            })
            .collect();

        let residuals = |x: &[f64]| -> Vec<f64> {
            let mut out = Vec::with_capacity(m);
            let mut args = Vec::new();
            for (e, template) in eqn_ids.iter().zip(&templates) {
                args.clear();
                args.extend(template.iter().map(|arg| match arg {
                    Arg::Free(k) => x[*k],
                    Arg::Fixed(v) => *v,
                }));
                out.push(nodes.eqn(*e).call(&args));
            }
            out
        };

        let mut x: Vec<f64> = unknowns.iter().map(|v| nodes.value(*v)).collect();
        let mut r = residuals(&x);
        let mut norm = inf_norm(&r);
        let mut lambda = config.initial_damping;

        for _ in 0..config.max_iterations {
            if norm <= config.solve_tolerance {
                break;
            }

            // Forward-difference Jacobian, one column per unknown.
            let mut cols: Vec<Vec<f64>> = Vec::with_capacity(n);
            for j in 0..n {
                let h = 1e-7 * x[j].abs().max(1.0);
                let mut xh = x.clone();
                xh[j] += h;
                let rh = residuals(&xh);
                cols.push(r.iter().zip(&rh).map(|(r0, r1)| (r1 - r0) / h).collect());
            }

            // Damped normal equations: (JᵀJ + λI) d = -Jᵀr.
            let a = Mat::from_fn(n, n, |i, j| {
                let jtj = dot(&cols[i], &cols[j]);
                if i == j { jtj + lambda } else { jtj }
            });
            let b = Col::from_fn(n, |i| -dot(&cols[i], &r));
            let d = a.full_piv_lu().solve(&b);

            let step_norm = d.iter().map(|v| v.abs()).fold(0.0, f64::max);
            let x_norm = x.iter().map(|v| v.abs()).fold(0.0, f64::max);

            let trial: Vec<f64> = x.iter().zip(d.iter()).map(|(xi, di)| xi + di).collect();
            let r_trial = residuals(&trial);
            let trial_norm = inf_norm(&r_trial);

            if trial_norm.is_finite() && trial_norm < norm {
                x = trial;
                r = r_trial;
                norm = trial_norm;
                lambda = (lambda * 0.1).max(1e-12);
            } else {
                // Step made things worse: damp harder and retry from the
                // same point.
                lambda *= 10.0;
                if lambda > 1e10 {
                    break;
                }
                continue;
            }

            if step_norm <= config.step_tolerance * (x_norm + config.step_tolerance) {
                break;
            }
        }

        for (v, value) in unknowns.iter().zip(&x) {
            nodes.set_value(*v, *value);
        }
        Ok(norm <= config.solve_tolerance)
    }
}

fn inf_norm(r: &[f64]) -> f64 {
    r.iter().map(|v| v.abs()).fold(0.0, f64::max)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{BlockId, EqnId};
    use crate::node::{Equation, Variable};

    /// Build a committed block over all equations currently in `nodes`.
    fn commit_all(nodes: &mut Nodes) -> Block {
        let mut block = Block::new();
        for e in nodes.eqn_ids() {
            block.add(e, nodes);
        }
        block.commit(BlockId(0), nodes);
        block
    }

    #[test]
    fn solves_a_singleton() {
        let mut nodes = Nodes::default();
        let x = VarId(0);
        nodes.insert_var(x, Variable::new("x", 10.0));
        nodes.insert_eqn(
            EqnId(0),
            Equation::with_params("x_set", vec![x], vec![4.0], |v, p| v[0] - p[0]),
        );
        let block = commit_all(&mut nodes);

        let ok = LevenbergMarquardt
            .solve_block(&block, &mut nodes, Config::default())
            .unwrap();
        assert!(ok);
        assert!((nodes.value(x) - 4.0).abs() < 1e-7);
    }

    #[test]
    fn solves_a_nonlinear_pair() {
        // x^2 + y^2 = 25, x - y = 1; starting near (4, 3).
        let mut nodes = Nodes::default();
        let x = VarId(0);
        let y = VarId(1);
        nodes.insert_var(x, Variable::new("x", 4.5));
        nodes.insert_var(y, Variable::new("y", 2.5));
        nodes.insert_eqn(
            EqnId(0),
            Equation::new("on_circle", vec![x, y], |v, _| {
                v[0] * v[0] + v[1] * v[1] - 25.0
            }),
        );
        nodes.insert_eqn(
            EqnId(1),
            Equation::new("offset", vec![x, y], |v, _| v[0] - v[1] - 1.0),
        );
        let block = commit_all(&mut nodes);

        let ok = LevenbergMarquardt
            .solve_block(&block, &mut nodes, Config::default())
            .unwrap();
        assert!(ok);
        assert!((nodes.value(x) - 4.0).abs() < 1e-6);
        assert!((nodes.value(y) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn underconstrained_block_freezes_the_excess() {
        // One equation, two unknowns: x - y = 0. The second active variable
        // keeps its value; the first moves to match.
        let mut nodes = Nodes::default();
        let x = VarId(0);
        let y = VarId(1);
        nodes.insert_var(x, Variable::new("x", 3.0));
        nodes.insert_var(y, Variable::new("y", 1.0));
        nodes.insert_eqn(
            EqnId(0),
            Equation::new("x_eq_y", vec![x, y], |v, _| v[0] - v[1]),
        );
        let block = commit_all(&mut nodes);
        assert_eq!(block.dof(), 1);

        let ok = LevenbergMarquardt
            .solve_block(&block, &mut nodes, Config::default())
            .unwrap();
        assert!(ok);
        assert!((nodes.value(x) - 1.0).abs() < 1e-7);
        assert!((nodes.value(y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn check_only_block_verifies_residuals() {
        // An equation whose only variable is already solved by another
        // block: nothing to assign, just check.
        let mut nodes = Nodes::default();
        let x = VarId(0);
        nodes.insert_var(x, Variable::new("x", 2.0));
        nodes.insert_eqn(
            EqnId(0),
            Equation::with_params("x_set", vec![x], vec![2.0], |v, p| v[0] - p[0]),
        );
        nodes.insert_eqn(
            EqnId(1),
            Equation::with_params("x_dup", vec![x], vec![2.0], |v, p| v[0] - p[0]),
        );

        // Commit the first equation as its own block; the duplicate becomes
        // a zero-variable block.
        let mut first = Block::new();
        first.add(EqnId(0), &nodes);
        first.commit(BlockId(0), &mut nodes);
        let mut dup = Block::new();
        dup.add(EqnId(1), &nodes);
        dup.commit(BlockId(1), &mut nodes);
        assert_eq!(dup.solves().count(), 0);

        let consistent = LevenbergMarquardt
            .solve_block(&dup, &mut nodes, Config::default())
            .unwrap();
        assert!(consistent);

        // Now make the duplicate inconsistent.
        nodes.eqn_mut(EqnId(1)).params = vec![5.0];
        let consistent = LevenbergMarquardt
            .solve_block(&dup, &mut nodes, Config::default())
            .unwrap();
        assert!(!consistent);
    }
}
