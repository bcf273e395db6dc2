//! The system manager: owns every variable, equation, and block, tracks what
//! changed since the last solve, and orchestrates reset, decomposition, and
//! scheduling.

use indexmap::{IndexMap, IndexSet};

use crate::block::Block;
use crate::error::Error;
use crate::id::{BlockId, BlockIds, Counter, EqnId, VarId};
use crate::node::{Equation, Nodes, Variable};
use crate::schedule::solve_blocks;
use crate::solver::{BlockSolver, Config, LevenbergMarquardt};
use crate::split::{SplitFn, split_block};

/// An incrementally solvable system of equations.
///
/// Variables and equations are handed to the system and live until deleted;
/// blocks are produced by decomposition and replaced wholesale whenever the
/// structure changes. Edits (add/modify/delete) only record dirty state;
/// [`System::update`] does the actual decomposition and solving.
pub struct System {
    nodes: Nodes,
    blocks: IndexMap<BlockId, Block>,
    var_ids: Counter,
    eqn_ids: Counter,
    block_ids: BlockIds,
    /// Variables whose values changed since the last solve.
    modified_vars: IndexSet<VarId>,
    /// Set by deletions: forces a full reset on the next update.
    modified: bool,
    /// Blocks that need re-decomposition on the next update.
    modified_blocks: IndexSet<BlockId>,
    split: SplitFn,
    solver: Box<dyn BlockSolver>,
    config: Config,
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

impl System {
    /// An empty system with the default configuration and backends.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// An empty system with custom tolerances and solver knobs.
    pub fn with_config(config: Config) -> Self {
        Self {
            nodes: Nodes::default(),
            blocks: IndexMap::new(),
            var_ids: Counter::default(),
            eqn_ids: Counter::default(),
            block_ids: BlockIds::default(),
            modified_vars: IndexSet::new(),
            modified: false,
            modified_blocks: IndexSet::new(),
            split: split_block,
            solver: Box::new(LevenbergMarquardt),
            config,
        }
    }

    /// Replace the numeric backend.
    pub fn set_solver(&mut self, solver: Box<dyn BlockSolver>) {
        self.solver = solver;
    }

    /// Replace the decomposition function.
    pub fn set_split(&mut self, split: SplitFn) {
        self.split = split;
    }

    /// The system's configuration.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Take ownership of a variable. Its initial value counts as a
    /// modification, so dependent blocks re-solve on the next update.
    pub fn add_variable(&mut self, var: Variable) -> VarId {
        let id = VarId(self.var_ids.next_u32());
        self.nodes.insert_var(id, var);
        self.modified_vars.insert(id);
        id
    }

    /// Overwrite a variable's value. Unknown ids are ignored.
    pub fn modify_variable(&mut self, id: VarId, value: f64) {
        if !self.nodes.contains_var(id) {
            return;
        }
        self.nodes.set_value(id, value);
        self.modified_vars.insert(id);
    }

    /// Delete a variable, cascade-deleting every equation that references
    /// it. Forces a full reset on the next update. Unknown ids are a no-op.
    pub fn delete_variable(&mut self, id: VarId) {
        if !self.nodes.contains_var(id) {
            return;
        }
        let eqns: Vec<EqnId> = self.nodes.var(id).all_eqns().collect();
        for e in eqns {
            self.nodes.detach_eqn(e);
        }
        self.nodes.remove_var(id);
        self.modified_vars.shift_remove(&id);
        self.modified = true;
    }

    /// Take ownership of an equation.
    ///
    /// Every live block whose `solves` the equation's variables would
    /// perturb is merged with it into one dirty block (falling back to the
    /// residual block, or a fresh one, when the variables are untouched);
    /// the next update re-decomposes that block.
    pub fn add_equation(&mut self, eqn: Equation) -> Result<EqnId, Error> {
        for v in eqn.var_list() {
            if !self.nodes.contains_var(*v) {
                return Err(Error::UnknownVariable {
                    eqn: eqn.name().to_owned(),
                    var: *v,
                });
            }
        }
        let id = EqnId(self.eqn_ids.next_u32());

        let mut affected: IndexSet<BlockId> = eqn
            .var_list()
            .iter()
            .filter_map(|v| self.nodes.var(*v).solved_by())
            .collect();
        self.nodes.insert_eqn(id, eqn);

        if affected.is_empty() {
            // Nothing solves these variables yet: extend the residual (the
            // first block that isn't well-constrained), if there is one.
            let residual = self
                .blocks
                .iter()
                .find(|(_, b)| !b.is_well_constrained())
                .map(|(bid, _)| *bid);
            affected.extend(residual);
        }

        self.merge_into_dirty_block(affected, id);
        Ok(id)
    }

    /// Delete an equation, detaching it from its variables. Forces a full
    /// reset on the next update. Equations the system does not own are a
    /// no-op.
    pub fn delete_equation(&mut self, id: EqnId) {
        if self.nodes.detach_eqn(id).is_some() {
            self.modified = true;
        }
    }

    /// Overwrite an equation's parameter vector (e.g. a dimension value)
    /// without touching the system's structure. The equation's variables are
    /// marked modified so the affected blocks re-solve on the next update.
    pub fn set_equation_params(&mut self, id: EqnId, params: Vec<f64>) {
        if !self.nodes.contains_eqn(id) {
            return;
        }
        let vars: Vec<VarId> = self.nodes.eqn(id).var_list().to_vec();
        self.nodes.eqn_mut(id).params = params;
        self.modified_vars.extend(vars);
    }

    /// Re-decompose what changed and re-solve what that touched.
    ///
    /// If anything was deleted, the whole system is first folded back into a
    /// single block. Every dirty block is then split into well-constrained
    /// sub-blocks plus a residual, and the scheduler walks the dependency
    /// DAG solving exactly the blocks whose inputs changed.
    ///
    /// On numeric failure the failing block is reported, already-solved
    /// blocks keep their values, and the modified set is preserved so a
    /// retry after a fix can resume.
    pub fn update(&mut self) -> Result<(), Error> {
        if self.modified {
            self.reset();
        }

        let dirty: Vec<BlockId> = self.modified_blocks.drain(..).collect();
        for bid in dirty {
            let Some(block) = self.blocks.shift_remove(&bid) else {
                continue;
            };
            // This block is about to die; nothing may keep waiting on it.
            for v in block.all_vars() {
                self.nodes.var_mut(v).required_by.shift_remove(&bid);
            }

            let pre_vars: Vec<VarId> = block.active_vars().collect();
            let produced = (self.split)(block, &mut self.nodes, &mut self.block_ids);
            let produced_ids: IndexSet<BlockId> = produced.iter().map(|(id, _)| *id).collect();
            for (id, b) in produced {
                self.blocks.insert(id, b);
            }

            // Vars newly captured by the fresh blocks must be treated as
            // modified: their blocks have never solved with current inputs.
            for v in pre_vars {
                if self
                    .nodes
                    .var(v)
                    .solved_by()
                    .is_some_and(|sb| produced_ids.contains(&sb))
                {
                    self.modified_vars.insert(v);
                }
            }
        }

        solve_blocks(
            &self.blocks,
            &mut self.nodes,
            &mut self.modified_vars,
            &*self.solver,
            self.config,
        )?;
        self.modified_vars.clear();
        Ok(())
    }

    /// Fold every equation back into one block and mark everything dirty.
    /// The next update decomposes the system from scratch.
    pub fn reset(&mut self) {
        log::debug!("resetting system ({} equations)", self.nodes.eqn_ids().len());
        self.blocks.clear();
        self.nodes.reset_all();

        let mut block = Block::new();
        for e in self.nodes.eqn_ids() {
            block.add(e, &self.nodes);
        }
        let id = self.block_ids.next_id();
        self.blocks.insert(id, block);

        self.modified = false;
        self.modified_blocks = [id].into_iter().collect();
        self.modified_vars = self.nodes.var_ids().into_iter().collect();
    }

    /// Are all equations satisfied at the current values?
    pub fn is_satisfied(&self) -> bool {
        self.nodes
            .eqns()
            .all(|(id, _)| self.nodes.eqn_is_satisfied(id, self.config.satisfy_tolerance))
    }

    /// Current value of a variable.
    pub fn value(&self, id: VarId) -> f64 {
        self.nodes.value(id)
    }

    /// The node store, for introspection.
    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    /// All live blocks, in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter().map(|(id, b)| (*id, b))
    }

    /// Look up a live block.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    /// Merge the given blocks and the new equation into one dirty block.
    ///
    /// Performs a scoped reset of the merged region: variables the merged
    /// blocks solved go back to unsolved, active sets on both sides are
    /// rebuilt to span exactly the merged equations, and stale `required_by`
    /// links to the merged blocks are purged. Survivor blocks and the
    /// variables they solve are untouched.
    fn merge_into_dirty_block(&mut self, affected: IndexSet<BlockId>, new_eqn: EqnId) -> BlockId {
        let mut removed: Vec<Block> = Vec::new();
        for bid in &affected {
            if let Some(b) = self.blocks.shift_remove(bid) {
                removed.push(b);
            }
            self.modified_blocks.shift_remove(bid);
        }

        let mut merged_eqns: IndexSet<EqnId> = IndexSet::new();
        for b in &removed {
            merged_eqns.extend(b.eqns());
        }
        merged_eqns.insert(new_eqn);

        // Variables that become unsolved again: everything the merged blocks
        // solved, plus any equation variable nobody solves yet.
        let mut scope_vars: IndexSet<VarId> = IndexSet::new();
        for b in &removed {
            for v in b.all_vars() {
                let var = self.nodes.var_mut(v);
                var.required_by.retain(|rb| !affected.contains(rb));
                match var.solved_by {
                    Some(sb) if affected.contains(&sb) => {
                        var.solved_by = None;
                        scope_vars.insert(v);
                    }
                    None => {
                        scope_vars.insert(v);
                    }
                    Some(_) => {}
                }
            }
        }
        for v in self.nodes.eqn(new_eqn).var_list().to_vec() {
            let var = self.nodes.var_mut(v);
            var.required_by.retain(|rb| !affected.contains(rb));
            if var.solved_by.is_none() {
                scope_vars.insert(v);
            }
        }

        // Rebuild active sets across the merged region so the next split
        // starts from clean state.
        for e in &merged_eqns {
            let active: IndexSet<VarId> = self
                .nodes
                .eqn(*e)
                .var_list()
                .iter()
                .copied()
                .filter(|v| scope_vars.contains(v))
                .collect();
            let eqn = self.nodes.eqn_mut(*e);
            eqn.vars = active;
            eqn.block = None;
        }
        for v in &scope_vars {
            let keep: IndexSet<EqnId> = self
                .nodes
                .var(*v)
                .all_eqns()
                .filter(|e| merged_eqns.contains(e))
                .collect();
            self.nodes.var_mut(*v).eqns = keep;
        }

        let mut block = Block::new();
        for e in &merged_eqns {
            block.add(*e, &self.nodes);
        }
        let id = self.block_ids.next_id();
        log::debug!(
            "merged {} blocks + 1 new equation into dirty block {id}",
            removed.len(),
        );
        self.blocks.insert(id, block);
        self.modified_blocks.insert(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_eqn(name: &str, v: VarId, val: f64) -> Equation {
        Equation::with_params(name, vec![v], vec![val], |x, p| x[0] - p[0])
    }

    #[test]
    fn empty_update_is_a_noop() {
        let mut sys = System::new();
        sys.update().unwrap();
        assert!(sys.is_satisfied());
        assert_eq!(sys.blocks().count(), 0);
    }

    #[test]
    fn unknown_variable_is_rejected() {
        let mut sys = System::new();
        let ghost = VarId(99);
        let err = sys
            .add_equation(Equation::new("ghostly", vec![ghost], |v, _| v[0]))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownVariable { var, .. } if var == ghost));
    }

    #[test]
    fn single_equation_single_variable() {
        let mut sys = System::new();
        let x = sys.add_variable(Variable::new("x", 0.0));
        sys.add_equation(set_eqn("x_set", x, 7.0)).unwrap();
        sys.update().unwrap();

        assert!((sys.value(x) - 7.0).abs() < 1e-7);
        assert_eq!(sys.blocks().count(), 1);
        let (_, block) = sys.blocks().next().unwrap();
        assert!(block.is_well_constrained());
        assert_eq!(block.num_eqns(), 1);
    }

    #[test]
    fn add_equation_merges_the_solving_block() {
        let mut sys = System::new();
        let x = sys.add_variable(Variable::new("x", 0.0));
        let y = sys.add_variable(Variable::new("y", 0.0));
        sys.add_equation(set_eqn("x_set", x, 2.0)).unwrap();
        sys.update().unwrap();
        let first_block = sys.nodes().var(x).solved_by().unwrap();

        // y - x = 0 touches x, whose solving block must be merged and
        // re-split.
        sys.add_equation(Equation::new("y_follows", vec![x, y], |v, _| v[1] - v[0]))
            .unwrap();
        assert!(sys.block(first_block).is_none(), "merged block must be gone");
        sys.update().unwrap();

        assert!((sys.value(y) - 2.0).abs() < 1e-6);
        assert_eq!(sys.blocks().count(), 2);
        assert!(sys.blocks().all(|(_, b)| b.is_well_constrained()));
    }

    #[test]
    fn delete_forces_reset_and_leaves_consistent_state() {
        let mut sys = System::new();
        let x = sys.add_variable(Variable::new("x", 0.0));
        let y = sys.add_variable(Variable::new("y", 0.0));
        let anchor = sys.add_equation(set_eqn("x_set", x, 2.0)).unwrap();
        sys.add_equation(Equation::new("y_follows", vec![x, y], |v, _| v[1] - v[0]))
            .unwrap();
        sys.update().unwrap();

        // Without the anchor, the remaining link can no longer pin x and y.
        sys.delete_equation(anchor);
        sys.update().unwrap();
        assert!(sys.is_satisfied());
        let residual: Vec<&Block> = sys
            .blocks()
            .map(|(_, b)| b)
            .filter(|b| !b.is_well_constrained())
            .collect();
        assert_eq!(residual.len(), 1);
        assert_eq!(residual[0].dof(), 1);
        let free: Vec<VarId> = residual[0].solves().collect();
        assert!(free.contains(&x) && free.contains(&y));
        // Values survived the reset.
        assert!((sys.value(x) - 2.0).abs() < 1e-6);
        assert!((sys.value(y) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn deleting_a_variable_cascades() {
        let mut sys = System::new();
        let x = sys.add_variable(Variable::new("x", 0.0));
        let y = sys.add_variable(Variable::new("y", 0.0));
        sys.add_equation(set_eqn("x_set", x, 2.0)).unwrap();
        sys.add_equation(Equation::new("y_follows", vec![x, y], |v, _| v[1] - v[0]))
            .unwrap();
        sys.update().unwrap();

        sys.delete_variable(x);
        sys.update().unwrap();

        // Both equations referenced x, so both are gone and y floats free.
        assert_eq!(sys.nodes().eqns().count(), 0);
        assert!(sys.is_satisfied());
    }

    #[test]
    fn delete_of_foreign_equation_is_a_noop() {
        let mut sys = System::new();
        let x = sys.add_variable(Variable::new("x", 0.0));
        sys.add_equation(set_eqn("x_set", x, 2.0)).unwrap();
        sys.update().unwrap();

        sys.delete_equation(EqnId(1234));
        // No reset was scheduled.
        assert!(!sys.modified);
        sys.update().unwrap();
        assert!((sys.value(x) - 2.0).abs() < 1e-7);
    }

    #[test]
    fn set_equation_params_resolves_downstream() {
        let mut sys = System::new();
        let x = sys.add_variable(Variable::new("x", 0.0));
        let y = sys.add_variable(Variable::new("y", 0.0));
        let anchor = sys.add_equation(set_eqn("x_set", x, 2.0)).unwrap();
        sys.add_equation(Equation::with_params(
            "offset",
            vec![x, y],
            vec![1.0],
            |v, p| v[1] - v[0] - p[0],
        ))
        .unwrap();
        sys.update().unwrap();
        assert!((sys.value(y) - 3.0).abs() < 1e-6);

        sys.set_equation_params(anchor, vec![10.0]);
        sys.update().unwrap();
        assert!((sys.value(x) - 10.0).abs() < 1e-6);
        assert!((sys.value(y) - 11.0).abs() < 1e-6);
    }
}
