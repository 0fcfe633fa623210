//! Provides input/output functionality for topology, trajectory and energy files.
//!
//! Topology formats implement the [`traits::TopologyFile`] trait. Trajectories
//! are read fully into memory; energies are streamed line by line.

pub mod energy;
pub mod pdb;
pub mod traits;
pub mod xyz;
