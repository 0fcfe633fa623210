//! # potscan Core Library
//!
//! Potential-energy scans of atomic trajectories: load a topology and a
//! trajectory, attach one or more interatomic potentials to the system, and
//! evaluate every frame.
//!
//! ## Architecture
//!
//! - **[`core`]: The Foundation.** Data models (`MolecularSystem`, `Cell`),
//!   topology and trajectory readers, the energy writer, and the potential
//!   backends (SIESTA, DFT-D3, NEP).
//!
//! - **[`engine`]: The Stateful Layer.** The `System` that owns a molecular
//!   system together with its potentials, the validated run configuration,
//!   progress events and engine errors.
//!
//! - **[`workflows`]: The Public API.** End-to-end procedures, currently the
//!   frame-by-frame energy evaluation driven by an `EvaluationConfig`.

pub mod core;
pub mod engine;
pub mod workflows;
