#![doc = include_str!("../README.md")]

pub use crate::block::Block;
pub use crate::error::Error;
pub use crate::id::{BlockId, BlockIds, EqnId, VarId};
pub use crate::node::{Equation, Nodes, Residual, Variable};
pub use crate::solver::{BlockSolver, Config, LevenbergMarquardt};
pub use crate::split::{SplitFn, split_block};
pub use crate::system::System;

mod block;
/// Constraint library: factories that contribute equations to a system.
pub mod constraints;
mod error;
/// Geometric entities that contribute variables to a system.
pub mod geometry;
/// Ids of variables, equations, and blocks.
mod id;
mod node;
/// Dependency-DAG scheduling of block solves.
mod schedule;
/// Numeric backend for solving one block.
mod solver;
/// Best-first decomposition into well-constrained blocks.
mod split;
mod system;
