//! Nodes of the solve graph: variables, equations, and the store that owns
//! them.
//!
//! Variables and equations form a bipartite incidence graph. Both sides keep
//! two views of that incidence: the *all* sets (fixed while the node lives)
//! and the *active* sets, which shrink as the decomposer assigns variables to
//! blocks. All cross-node bookkeeping lives on [`Nodes`], the owner, so the
//! node structs themselves stay cycle-free.

use indexmap::{IndexMap, IndexSet};

use crate::id::{BlockId, EqnId, VarId};

/// A residual function: given the values of the equation's variables (in
/// declaration order) and its parameter vector, return how far the equation
/// is from being satisfied. Zero means satisfied.
pub type Residual = Box<dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync>;

/// A named real-valued unknown.
///
/// Tracks which equations reference it (and which of those are still
/// *active*, i.e. not yet captured by a committed block), which block will
/// solve for it, and which blocks need it solved before they can run.
pub struct Variable {
    name: String,
    value: f64,
    /// Equations still reachable by the decomposer's search.
    pub(crate) eqns: IndexSet<EqnId>,
    /// Every equation referencing this variable.
    pub(crate) all_eqns: IndexSet<EqnId>,
    /// The block that assigns this variable, once decomposition ran.
    pub(crate) solved_by: Option<BlockId>,
    /// Blocks that read this variable and must wait for it.
    pub(crate) required_by: IndexSet<BlockId>,
}

impl Variable {
    /// A new variable with an initial value (which doubles as the numeric
    /// solver's initial guess).
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            eqns: IndexSet::new(),
            all_eqns: IndexSet::new(),
            solved_by: None,
            required_by: IndexSet::new(),
        }
    }

    /// The variable's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The block that solves for this variable, if decomposition has run.
    pub fn solved_by(&self) -> Option<BlockId> {
        self.solved_by
    }

    /// Blocks that require this variable to be solved first.
    pub fn required_by(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.required_by.iter().copied()
    }

    /// Every equation referencing this variable.
    pub fn all_eqns(&self) -> impl Iterator<Item = EqnId> + '_ {
        self.all_eqns.iter().copied()
    }

    /// Restore all equations to the active set and forget solve state.
    pub(crate) fn reset(&mut self) {
        self.eqns = self.all_eqns.clone();
        self.solved_by = None;
        self.required_by.clear();
    }
}

#[mutants::skip]
impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Var({}={})", self.name, self.value)
    }
}

/// A real-valued residual function over an ordered tuple of variables.
pub struct Equation {
    name: String,
    f: Residual,
    /// Mutable constraint parameters, passed to the residual on every call.
    pub(crate) params: Vec<f64>,
    /// The variables, in the order the residual expects them.
    var_list: Vec<VarId>,
    /// Variables not yet assigned to a committed block.
    pub(crate) vars: IndexSet<VarId>,
    /// Every variable this equation references.
    pub(crate) all_vars: IndexSet<VarId>,
    /// The committed block containing this equation.
    pub(crate) block: Option<BlockId>,
}

impl Equation {
    /// A new equation without parameters.
    pub fn new(
        name: impl Into<String>,
        vars: Vec<VarId>,
        f: impl Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self::with_params(name, vars, Vec::new(), f)
    }

    /// A new equation with a parameter vector. Parameters can be overwritten
    /// later through [`crate::System::set_equation_params`] without touching
    /// the system's structure.
    pub fn with_params(
        name: impl Into<String>,
        vars: Vec<VarId>,
        params: Vec<f64>,
        f: impl Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        let var_set: IndexSet<VarId> = vars.iter().copied().collect();
        Self {
            name: name.into(),
            f: Box::new(f),
            params,
            vars: var_set.clone(),
            all_vars: var_set,
            var_list: vars,
            block: None,
        }
    }

    /// The equation's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The variables, in the order the residual expects them.
    pub fn var_list(&self) -> &[VarId] {
        &self.var_list
    }

    /// The committed block containing this equation, if any.
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    /// Evaluate the residual against explicit argument values.
    pub(crate) fn call(&self, args: &[f64]) -> f64 {
        (self.f)(args, &self.params)
    }

    /// Restore all variables to the active set and forget the block link.
    pub(crate) fn reset(&mut self) {
        self.vars = self.all_vars.clone();
        self.block = None;
    }
}

#[mutants::skip]
impl std::fmt::Debug for Equation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Eqn({} over {:?})", self.name, self.var_list)
    }
}

/// Owner of every variable and equation, keyed by id.
///
/// Insertion order is preserved, so decompositions and solve schedules are
/// deterministic for a given sequence of API calls.
#[derive(Default)]
pub struct Nodes {
    vars: IndexMap<VarId, Variable>,
    eqns: IndexMap<EqnId, Equation>,
}

impl Nodes {
    /// Look up a variable.
    ///
    /// Panics if the id was never added or was deleted.
    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[&id]
    }

    /// Look up an equation.
    ///
    /// Panics if the id was never added or was deleted.
    pub fn eqn(&self, id: EqnId) -> &Equation {
        &self.eqns[&id]
    }

    /// Current value of a variable.
    pub fn value(&self, id: VarId) -> f64 {
        self.vars[&id].value
    }

    /// Does the system own this variable?
    pub fn contains_var(&self, id: VarId) -> bool {
        self.vars.contains_key(&id)
    }

    /// Does the system own this equation?
    pub fn contains_eqn(&self, id: EqnId) -> bool {
        self.eqns.contains_key(&id)
    }

    /// All variables, in insertion order.
    pub fn vars(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.vars.iter().map(|(id, v)| (*id, v))
    }

    /// All equations, in insertion order.
    pub fn eqns(&self) -> impl Iterator<Item = (EqnId, &Equation)> {
        self.eqns.iter().map(|(id, e)| (*id, e))
    }

    /// Evaluate an equation with the current variable values.
    pub fn eval(&self, id: EqnId) -> f64 {
        let eqn = &self.eqns[&id];
        let args: Vec<f64> = eqn
            .var_list
            .iter()
            .map(|v| self.vars[v].value)
            .collect();
        eqn.call(&args)
    }

    /// Is this equation satisfied within tolerance?
    pub fn eqn_is_satisfied(&self, id: EqnId, tol: f64) -> bool {
        self.eval(id).abs() < tol
    }

    /// Overwrite a variable's value.
    pub(crate) fn set_value(&mut self, id: VarId, value: f64) {
        if let Some(var) = self.vars.get_mut(&id) {
            var.value = value;
        }
    }

    pub(crate) fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[&id]
    }

    pub(crate) fn eqn_mut(&mut self, id: EqnId) -> &mut Equation {
        &mut self.eqns[&id]
    }

    /// Take ownership of a variable.
    pub(crate) fn insert_var(&mut self, id: VarId, var: Variable) {
        self.vars.insert(id, var);
    }

    /// Take ownership of an equation, wiring the symmetric incidence:
    /// the equation appears in each of its variables' all/active sets.
    pub(crate) fn insert_eqn(&mut self, id: EqnId, eqn: Equation) {
        for v in &eqn.var_list {
            let var = &mut self.vars[v];
            var.all_eqns.insert(id);
            var.eqns.insert(id);
        }
        self.eqns.insert(id, eqn);
    }

    /// Remove an equation, detaching it from every variable it references.
    /// Returns `None` (a no-op) for ids the store does not own.
    pub(crate) fn detach_eqn(&mut self, id: EqnId) -> Option<Equation> {
        let eqn = self.eqns.shift_remove(&id)?;
        for v in &eqn.all_vars {
            if let Some(var) = self.vars.get_mut(v) {
                var.eqns.shift_remove(&id);
                var.all_eqns.shift_remove(&id);
            }
        }
        Some(eqn)
    }

    /// Remove a variable. The caller is responsible for cascade-deleting the
    /// equations that referenced it first.
    pub(crate) fn remove_var(&mut self, id: VarId) -> Option<Variable> {
        self.vars.shift_remove(&id)
    }

    /// Mark `v` as about-to-be-solved by the block owning `block_eqns`.
    ///
    /// Strips `v` from the active variable set of every equation still in
    /// search frontiers, and drops the block's own equations from `v`'s
    /// active equations.
    pub(crate) fn set_solved(
        &mut self,
        v: VarId,
        block_eqns: &IndexSet<EqnId>,
        solved_by: BlockId,
    ) {
        let active: Vec<EqnId> = self.vars[&v].eqns.iter().copied().collect();
        for e in active {
            if let Some(eqn) = self.eqns.get_mut(&e) {
                eqn.vars.shift_remove(&v);
            }
        }
        let var = &mut self.vars[&v];
        var.solved_by = Some(solved_by);
        var.eqns.retain(|e| !block_eqns.contains(e));
    }

    /// Restore every variable and equation to its inactive-free state.
    pub(crate) fn reset_all(&mut self) {
        for var in self.vars.values_mut() {
            var.reset();
        }
        for eqn in self.eqns.values_mut() {
            eqn.reset();
        }
    }

    /// Ids of all equations, in insertion order.
    pub(crate) fn eqn_ids(&self) -> Vec<EqnId> {
        self.eqns.keys().copied().collect()
    }

    /// Ids of all variables, in insertion order.
    pub(crate) fn var_ids(&self) -> Vec<VarId> {
        self.vars.keys().copied().collect()
    }
}
