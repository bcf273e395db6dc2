//! Scheduling: walk the block dependency DAG and invoke the numeric backend
//! on exactly the blocks whose solve-inputs changed.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use crate::block::Block;
use crate::error::Error;
use crate::id::{BlockId, VarId};
use crate::node::Nodes;
use crate::solver::{BlockSolver, Config};

/// Solve a group of committed blocks, given the variables whose values have
/// changed since the last solve.
///
/// Blocks with no prerequisites run first, in insertion order; a block with
/// prerequisites runs only after every block producing them has finished.
/// A block is re-solved iff one of its required inputs was modified, or one
/// of its own outputs was modified while the block is unsatisfied. Solving a
/// block marks its outputs modified, which is what propagates a change
/// downstream. Each block runs at most once per call.
///
/// On success, `modified_vars` has grown to cover every variable that was
/// updated. On failure the failing block is reported and the remaining
/// schedule is abandoned.
pub(crate) fn solve_blocks(
    blocks: &IndexMap<BlockId, Block>,
    nodes: &mut Nodes,
    modified_vars: &mut IndexSet<VarId>,
    solver: &dyn BlockSolver,
    config: Config,
) -> Result<(), Error> {
    let mut solved_vars: IndexSet<VarId> = IndexSet::new();

    // Start with every block that requires nothing.
    let mut queue: VecDeque<BlockId> = blocks
        .iter()
        .filter(|(_, b)| b.requires.is_empty())
        .map(|(id, _)| *id)
        .collect();
    let mut enqueued: IndexSet<BlockId> = queue.iter().copied().collect();

    while let Some(id) = queue.pop_front() {
        let block = &blocks[&id];

        let inputs_changed = block.requires.iter().any(|v| modified_vars.contains(v));
        let outputs_changed = block.solves.iter().any(|v| modified_vars.contains(v));
        if inputs_changed
            || (outputs_changed && !block.is_satisfied(nodes, config.satisfy_tolerance))
        {
            log::trace!("solving block {id} ({} equations)", block.num_eqns());
            if !solver.solve_block(block, nodes, config)? {
                return Err(Error::DidNotConverge {
                    block: id,
                    eqns: block.eqns().map(|e| nodes.eqn(e).name().to_owned()).collect(),
                    vars: block
                        .solves()
                        .map(|v| nodes.var(v).name().to_owned())
                        .collect(),
                });
            }
            // Downstream blocks must reconsider everything this block wrote.
            modified_vars.extend(block.solves.iter().copied());
        }

        solved_vars.extend(block.solves.iter().copied());

        // Frontier: blocks waiting on a variable we just finished, once all
        // of their prerequisites are available.
        for v in &block.solves {
            for waiting in nodes.var(*v).required_by.iter().copied().collect::<Vec<_>>() {
                if enqueued.contains(&waiting) {
                    continue;
                }
                let Some(next) = blocks.get(&waiting) else {
                    continue;
                };
                if next.requires.iter().all(|w| solved_vars.contains(w)) {
                    queue.push_back(waiting);
                    enqueued.insert(waiting);
                }
            }
        }
    }

    Ok(())
}
