//! Blocks: sets of equations plus the variables they touch, the unit of
//! decomposition and solving.
//!
//! During decomposition a block is a mutable search candidate. Once committed
//! it freezes its `solves` and `requires` sets and becomes a node in the
//! scheduling DAG: an edge runs from every block that solves a variable to
//! every block that requires it.

use indexmap::IndexSet;

use crate::id::{BlockId, EqnId, VarId};
use crate::node::Nodes;

/// Canonical content fingerprint of a search candidate, used to avoid
/// revisiting a block the search has already enqueued.
pub(crate) type Signature = (Vec<u32>, Vec<u32>);

/// A set of equations together with the variables they reference.
#[derive(Clone, Default, Debug)]
pub struct Block {
    /// Equations in this block.
    pub(crate) eqns: IndexSet<EqnId>,
    /// Active (unsolved) variables.
    pub(crate) vars: IndexSet<VarId>,
    /// Every variable referenced by this block's equations, solved or not.
    pub(crate) all_vars: IndexSet<VarId>,
    /// Variables this block will assign. Frozen at commit.
    pub(crate) solves: IndexSet<VarId>,
    /// Variables solved by other blocks that must be ready first. Frozen at
    /// commit.
    pub(crate) requires: IndexSet<VarId>,
}

impl Block {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Union in an equation along with its active and all-variable sets.
    pub(crate) fn add(&mut self, id: EqnId, nodes: &Nodes) {
        let eqn = nodes.eqn(id);
        self.eqns.insert(id);
        self.vars.extend(eqn.vars.iter().copied());
        self.all_vars.extend(eqn.all_vars.iter().copied());
    }

    /// Equations reachable by growing this block one step: every equation
    /// incident to one of the block's active variables that is not already a
    /// member.
    pub(crate) fn frontier_eqns(&self, nodes: &Nodes) -> IndexSet<EqnId> {
        let mut out = IndexSet::new();
        for v in &self.vars {
            for e in &nodes.var(*v).eqns {
                if !self.eqns.contains(e) {
                    out.insert(*e);
                }
            }
        }
        out
    }

    /// Degrees of freedom: active variables minus equations.
    pub fn dof(&self) -> i64 {
        self.vars.len() as i64 - self.eqns.len() as i64
    }

    /// Equal numbers of active variables and equations?
    pub fn is_well_constrained(&self) -> bool {
        self.dof() == 0
    }

    /// Does this block contain no equations?
    pub fn is_empty(&self) -> bool {
        self.eqns.is_empty()
    }

    /// Are all member equations satisfied at the current variable values?
    pub fn is_satisfied(&self, nodes: &Nodes, tol: f64) -> bool {
        self.eqns.iter().all(|e| nodes.eqn_is_satisfied(*e, tol))
    }

    /// Search priority: candidates closer to well-constrained first, and
    /// among those, the one with more equations. Compared lexicographically;
    /// equivalent to the float key `-dof + |eqns|/(n+1)` because the
    /// tiebreaker term stays below one.
    pub(crate) fn key(&self) -> (i64, usize) {
        (-self.dof(), self.eqns.len())
    }

    /// Content fingerprint over equations and active variables.
    pub(crate) fn signature(&self) -> Signature {
        let mut eqns: Vec<u32> = self.eqns.iter().map(|e| e.0).collect();
        let mut vars: Vec<u32> = self.vars.iter().map(|v| v.0).collect();
        eqns.sort_unstable();
        vars.sort_unstable();
        (eqns, vars)
    }

    /// Freeze this block: `solves` becomes the active variables, `requires`
    /// the rest, and the members' backlinks (`solved_by`, `required_by`,
    /// owning block) are wired up.
    pub(crate) fn commit(&mut self, id: BlockId, nodes: &mut Nodes) {
        self.solves = self.vars.clone();
        self.requires = self
            .all_vars
            .iter()
            .copied()
            .filter(|v| !self.vars.contains(v))
            .collect();

        for v in &self.requires {
            nodes.var_mut(*v).required_by.insert(id);
        }
        for v in &self.solves {
            nodes.set_solved(*v, &self.eqns, id);
        }
        for e in &self.eqns {
            nodes.eqn_mut(*e).block = Some(id);
        }
    }

    /// Drop another (committed) block's variables and equations from this
    /// block's active sets. Used to prune surviving search candidates after a
    /// commit.
    pub(crate) fn discard(&mut self, other: &Block) {
        self.vars.retain(|v| !other.vars.contains(v));
        self.eqns.retain(|e| !other.eqns.contains(e));
    }

    /// Equations in this block.
    pub fn eqns(&self) -> impl Iterator<Item = EqnId> + '_ {
        self.eqns.iter().copied()
    }

    /// Number of equations in this block.
    pub fn num_eqns(&self) -> usize {
        self.eqns.len()
    }

    /// Active (unsolved) variables.
    pub fn active_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.vars.iter().copied()
    }

    /// Every variable referenced by this block's equations.
    pub fn all_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.all_vars.iter().copied()
    }

    /// Variables this block assigns (frozen at commit).
    pub fn solves(&self) -> impl Iterator<Item = VarId> + '_ {
        self.solves.iter().copied()
    }

    /// Variables this block reads but does not assign (frozen at commit).
    pub fn requires(&self) -> impl Iterator<Item = VarId> + '_ {
        self.requires.iter().copied()
    }
}
