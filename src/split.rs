//! Best-first structural decomposition of an equation set.
//!
//! Given one block, find the smallest well-constrained sub-blocks (equal
//! numbers of active variables and equations), commit them one by one, and
//! collect whatever cannot be constrained into a single residual block. The
//! search grows candidates an equation at a time from singleton seeds,
//! always expanding the candidate closest to zero degrees of freedom.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use indexmap::IndexSet;

use crate::block::{Block, Signature};
use crate::id::{BlockId, BlockIds, EqnId};
use crate::node::Nodes;

/// A decomposition function, pluggable on [`crate::System`].
///
/// Takes the block to split, commits the sub-blocks it finds (wiring the
/// `solved_by` / `required_by` / owning-block links through `nodes`), and
/// returns them keyed by freshly minted ids.
pub type SplitFn = fn(Block, &mut Nodes, &mut BlockIds) -> Vec<(BlockId, Block)>;

/// A search candidate ordered by its priority key.
struct Candidate {
    key: (i64, usize),
    block: Block,
}

impl Candidate {
    fn new(block: Block) -> Self {
        Self {
            key: block.key(),
            block,
        }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Split `input` into committed well-constrained blocks plus, if any
/// equations are left over, one committed residual block.
///
/// This is the default [`SplitFn`].
pub fn split_block(input: Block, nodes: &mut Nodes, ids: &mut BlockIds) -> Vec<(BlockId, Block)> {
    let mut committed: Vec<(BlockId, Block)> = Vec::new();
    let mut unsolved: IndexSet<EqnId> = input.eqns.clone();
    let mut visited: HashSet<Signature> = HashSet::new();

    // Seed with one singleton candidate per equation.
    let mut queue: BinaryHeap<Candidate> = input
        .eqns
        .iter()
        .map(|e| {
            let mut b = Block::new();
            b.add(*e, nodes);
            Candidate::new(b)
        })
        .collect();

    while let Some(cand) = queue.pop() {
        let mut block = cand.block;

        if block.is_well_constrained() {
            let id = ids.next_id();
            block.commit(id, nodes);
            unsolved.retain(|e| !block.eqns.contains(e));

            // The committed content no longer needs dealing with: prune it
            // from every surviving candidate, purge the ones that became
            // empty, and rebuild the queue and visited set from the rest.
            let survivors: Vec<Block> = queue
                .drain()
                .map(|mut c| {
                    c.block.discard(&block);
                    c.block
                })
                .filter(|b| !b.is_empty())
                .collect();
            visited = survivors.iter().map(Block::signature).collect();
            queue = survivors.into_iter().map(Candidate::new).collect();

            committed.push((id, block));
        } else {
            for e in block.frontier_eqns(nodes) {
                let mut next = block.clone();
                next.add(e, nodes);
                if visited.insert(next.signature()) {
                    queue.push(Candidate::new(next));
                }
            }
        }
    }

    // Whatever the search could not constrain becomes the residual block.
    if !unsolved.is_empty() {
        let mut residual = Block::new();
        for e in &unsolved {
            residual.add(*e, nodes);
        }
        let id = ids.next_id();
        residual.commit(id, nodes);
        committed.push((id, residual));
    }

    log::debug!(
        "split {} equations into {} blocks",
        committed.iter().map(|(_, b)| b.num_eqns()).sum::<usize>(),
        committed.len(),
    );
    committed
}
