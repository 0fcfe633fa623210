//! # Core Module
//!
//! Building blocks shared by the engine and the workflows.
//!
//! - **Molecular Representation** ([`models`]) - Elements, atoms, periodic cells and systems
//! - **File I/O** ([`io`]) - PDB topologies, XYZ trajectories and energy tables
//! - **Potentials** ([`potentials`]) - The `Potential` trait and its backends
//! - **Units** ([`units`]) - Conversion factors between backend and library units
//!
//! All quantities crossing module boundaries are in nm, kJ/mol and kJ/mol/nm.

pub mod io;
pub mod models;
pub mod potentials;
pub mod units;
