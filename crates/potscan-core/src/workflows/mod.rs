//! # Workflows Module
//!
//! High-level entry points that tie the engine and core together.
//!
//! - **Evaluation Workflow** ([`evaluate`]) - Potential energies of every
//!   trajectory frame, one output table per job

pub mod evaluate;
