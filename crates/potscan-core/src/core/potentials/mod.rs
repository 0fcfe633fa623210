//! # Potentials Module
//!
//! Interatomic potential backends evaluated on a [`PotentialInput`].
//!
//! - [`siesta`] - Density-functional energies and forces from an external SIESTA run
//! - [`dftd3`] - Grimme D3 dispersion correction from the external `s-dftd3` program
//! - [`nep`] - Native evaluation of neuroevolution machine-learned potentials
//!
//! Every backend receives positions in nm and reports energies in kJ/mol and
//! forces in kJ/mol/nm, converting to its native units internally.

pub mod dftd3;
pub(crate) mod external;
pub mod neighbor;
pub mod nep;
pub mod siesta;

use crate::core::models::cell::Cell;
use nalgebra::{Matrix3, Point3, Vector3};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PotentialError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Nep(#[from] nep::NepError),

    #[error("{program} exited with {status}. Last output:\n{output_tail}")]
    SolverFailed {
        program: String,
        status: String,
        output_tail: String,
    },

    #[error("Failed to read {program} output: {message}")]
    Output { program: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// The configuration a potential is evaluated on, restricted to the atoms the
/// potential acts on.
#[derive(Debug, Clone, Copy)]
pub struct PotentialInput<'a> {
    /// Positions in nm.
    pub positions: &'a [Point3<f64>],
    /// Element symbols, parallel to `positions`.
    pub symbols: &'a [&'static str],
    /// Periodic cell, `None` for an isolated system.
    pub cell: Option<&'a Cell>,
}

impl PotentialInput<'_> {
    pub fn n_atoms(&self) -> usize {
        self.positions.len()
    }
}

/// The result of evaluating a potential on one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Potential energy in kJ/mol.
    pub energy: f64,
    /// Forces in kJ/mol/nm, parallel to the input positions.
    pub forces: Vec<Vector3<f64>>,
    /// Virial tensor in kJ/mol.
    pub virial: Matrix3<f64>,
}

impl Evaluation {
    pub fn zeros(n_atoms: usize) -> Self {
        Self {
            energy: 0.0,
            forces: vec![Vector3::zeros(); n_atoms],
            virial: Matrix3::zeros(),
        }
    }
}

/// An interatomic potential acting on a subset of the system's atoms.
pub trait Potential: Send {
    /// A short human-readable name used in logs.
    fn name(&self) -> &str;

    /// Indices (into the system) of the atoms this potential acts on.
    fn atoms(&self) -> &[usize];

    /// Evaluates energy, forces and virial for one configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or its output cannot be read.
    fn compute(&mut self, input: &PotentialInput) -> Result<Evaluation, PotentialError>;
}

/// Returns the last `max_lines` lines of `text`, for error reports.
pub(crate) fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
