//! Errors surfaced by the solver core.

use crate::id::{BlockId, VarId};

/// All errors that could occur while editing or updating a system.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The numeric backend could not drive a block's residuals below
    /// tolerance. The update stops here; blocks solved earlier in the
    /// schedule keep their values, and the set of modified variables is
    /// preserved so a retry can resume after the user intervenes.
    #[error("block {block} did not converge (equations {eqns:?} over variables {vars:?})")]
    DidNotConverge {
        /// The failing block.
        block: BlockId,
        /// Names of the failing block's equations.
        eqns: Vec<String>,
        /// Names of the failing block's variables.
        vars: Vec<String>,
    },
    /// An equation was added referencing a variable the system does not own.
    #[error("equation {eqn:?} references variable {var}, which was never added to the system")]
    UnknownVariable {
        /// Name of the offending equation.
        eqn: String,
        /// The unknown variable id.
        var: VarId,
    },
}
