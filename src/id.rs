//! Ids for variables, equations, and blocks.
//!
//! The system manager owns every node and refers to them by id; incidence is
//! stored as sets of ids rather than references, which keeps the
//! variable/equation/block graph free of reference cycles.

/// Identifies one variable in a [`crate::System`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct VarId(pub(crate) u32);

/// Identifies one equation in a [`crate::System`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct EqnId(pub(crate) u32);

/// Identifies one block (equation set) in a [`crate::System`].
///
/// Unlike variables and equations, blocks are short-lived: every
/// decomposition produces fresh blocks with fresh ids, so a `BlockId` is only
/// meaningful while that block is live.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct BlockId(pub(crate) u32);

#[mutants::skip]
impl std::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[mutants::skip]
impl std::fmt::Display for EqnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[mutants::skip]
impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Generates an incrementing sequence of block ids starting from 0.
///
/// Public so that custom split functions can mint ids for the blocks they
/// commit; the generator for variable and equation ids stays inside the
/// system manager.
#[derive(Default, Debug)]
pub struct BlockIds {
    next: u32,
}

impl BlockIds {
    /// Hand out the next unused block id.
    pub fn next_id(&mut self) -> BlockId {
        let out = BlockId(self.next);
        self.next += 1;
        out
    }
}

/// Incrementing id counter for variables and equations.
#[derive(Default, Debug)]
pub(crate) struct Counter {
    next: u32,
}

impl Counter {
    pub(crate) fn next_u32(&mut self) -> u32 {
        let out = self.next;
        self.next += 1;
        out
    }
}
