//! Neuroevolution potential (NEP) evaluation.
//!
//! Reads `nep.txt` model files as written by GPUMD and evaluates energies,
//! forces and virials natively. Radial descriptors expand Chebyshev basis
//! functions with a cosine cutoff; angular descriptors use the three-body
//! Legendre form `(2l+1)/4π Σ_jk g_n(r_ij) g_n(r_ik) P_l(cos θ_ijk)`, which is
//! the spherical-harmonic contraction of GPUMD written through the addition
//! theorem. Models trained with four-body and five-body terms add GPUMD's
//! cubic contraction of the order-2 harmonic sums and the quartic norm of the
//! order-1 sums. Each atom's descriptor is fed through a one-hidden-layer `tanh`
//! network to produce its site energy.

mod descriptor;
pub mod model;

use self::descriptor::{AtomContribution, TypedNeighbor, evaluate_atom};
use self::model::NepModel;
use super::neighbor::{build_neighbor_lists, cutoff_fits};
use super::{Evaluation, Potential, PotentialError, PotentialInput};
use crate::core::models::cell::Cell;
use crate::core::models::element::Element;
use crate::core::units::{ANGSTROM_PER_NM, KJ_PER_MOL_NM_PER_EV_ANGSTROM, KJ_PER_MOL_PER_EV};
use nalgebra::{Matrix3, Point3, Vector3};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Error)]
pub enum NepError {
    #[error("I/O error while reading NEP model: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid NEP header on line {line}: {message}")]
    Header { line: usize, message: String },
    #[error("Invalid NEP parameter '{value}' on line {line}")]
    Parameter { line: usize, value: String },
    #[error("NEP model should contain {expected} parameters, found {found}")]
    ParameterCount { expected: usize, found: usize },
    #[error("Unsupported NEP feature: {0}")]
    Unsupported(String),
    #[error("Element '{0}' is not described by the NEP model")]
    UnknownElement(String),
    #[error("NEP cutoff of {cutoff} Å exceeds half the cell height")]
    CutoffTooLarge { cutoff: f64 },
}

/// A NEP model acting on a set of atoms.
pub struct NepPotential {
    name: String,
    atoms: Vec<usize>,
    model: NepModel,
    source: Option<PathBuf>,
}

impl NepPotential {
    pub fn new(name: impl Into<String>, atoms: Vec<usize>, model: NepModel) -> Self {
        Self {
            name: name.into(),
            atoms,
            model,
            source: None,
        }
    }

    /// Loads the model from a `nep.txt` file.
    pub fn from_file(
        name: impl Into<String>,
        atoms: Vec<usize>,
        path: impl AsRef<Path>,
    ) -> Result<Self, NepError> {
        let path = path.as_ref();
        let model = NepModel::load(path)?;
        debug!(
            "Loaded {:?} model from {:?} with {} element(s), descriptor dimension {}.",
            model.version,
            path,
            model.num_types(),
            model.dim()
        );
        Ok(Self {
            source: Some(path.to_path_buf()),
            ..Self::new(name, atoms, model)
        })
    }

    pub fn model(&self) -> &NepModel {
        &self.model
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn type_indices(&self, symbols: &[&'static str]) -> Result<Vec<usize>, NepError> {
        symbols
            .iter()
            .map(|&symbol| {
                Element::from_symbol(symbol)
                    .and_then(|e| self.model.type_of(e))
                    .ok_or_else(|| NepError::UnknownElement(symbol.to_string()))
            })
            .collect()
    }
}

impl Potential for NepPotential {
    fn name(&self) -> &str {
        &self.name
    }

    fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    #[instrument(skip_all, fields(potential = %self.name))]
    fn compute(&mut self, input: &PotentialInput) -> Result<Evaluation, PotentialError> {
        let model = &self.model;
        let types = self.type_indices(input.symbols)?;

        let positions: Vec<Point3<f64>> = input
            .positions
            .iter()
            .map(|p| *p * ANGSTROM_PER_NM)
            .collect();
        let cell = input.cell.and_then(|c| {
            Cell::from_vectors(
                c.vector(0) * ANGSTROM_PER_NM,
                c.vector(1) * ANGSTROM_PER_NM,
                c.vector(2) * ANGSTROM_PER_NM,
            )
        });
        if !cutoff_fits(cell.as_ref(), model.rc_radial) {
            return Err(NepError::CutoffTooLarge {
                cutoff: model.rc_radial,
            }
            .into());
        }

        let neighbor_lists = build_neighbor_lists(&positions, cell.as_ref(), model.rc_radial);
        let typed: Vec<Vec<TypedNeighbor>> = neighbor_lists
            .into_iter()
            .map(|list| {
                list.into_iter()
                    .map(|nb| TypedNeighbor {
                        index: nb.index,
                        type_index: types[nb.index],
                        displacement: nb.displacement,
                        distance: nb.distance,
                    })
                    .collect()
            })
            .collect();

        #[cfg(not(feature = "parallel"))]
        let iterator = typed.iter().enumerate();

        #[cfg(feature = "parallel")]
        let iterator = typed.par_iter().enumerate();

        let contributions: Vec<(usize, AtomContribution)> = iterator
            .map(|(i, neighbors)| (i, evaluate_atom(model, types[i], neighbors)))
            .collect();

        let mut energy = 0.0;
        let mut forces = vec![Vector3::zeros(); positions.len()];
        let mut virial = Matrix3::zeros();
        for (i, contribution) in contributions {
            energy += contribution.energy;
            for (j, r_ij, gradient) in contribution.pair_gradients {
                forces[i] += gradient;
                forces[j] -= gradient;
                virial -= r_ij * gradient.transpose();
            }
        }

        Ok(Evaluation {
            energy: energy * KJ_PER_MOL_PER_EV,
            forces: forces
                .into_iter()
                .map(|f| f * KJ_PER_MOL_NM_PER_EV_ANGSTROM)
                .collect(),
            virial: virial * KJ_PER_MOL_PER_EV,
        })
    }
}
