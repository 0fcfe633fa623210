use super::error::EngineError;
use crate::core::models::cell::Cell;
use crate::core::models::system::{MolecularSystem, SystemError, check_atom_indices};
use crate::core::potentials::{Evaluation, Potential, PotentialInput};
use nalgebra::{Matrix3, Point3, Vector3};
use tracing::{debug, instrument};

/// The potentials attached to a [`System`], in insertion order.
#[derive(Default)]
pub struct Potentials {
    items: Vec<Box<dyn Potential>>,
}

impl Potentials {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn Potential> {
        self.items.get(index).map(|p| p.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Potential> {
        self.items.iter().map(|p| p.as_ref())
    }
}

/// Mutable access to a system's potentials that keeps cached evaluations
/// consistent with the potential list.
pub struct PotentialsMut<'a> {
    n_atoms: usize,
    potentials: &'a mut Potentials,
    evaluations: &'a mut Vec<Evaluation>,
}

impl PotentialsMut<'_> {
    /// Attaches a potential after checking its atom indices.
    pub fn push(&mut self, potential: Box<dyn Potential>) -> Result<(), SystemError> {
        check_atom_indices(potential.atoms(), self.n_atoms)?;
        self.potentials.items.push(potential);
        self.evaluations.clear();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.potentials.items.clear();
        self.evaluations.clear();
    }

    pub fn len(&self) -> usize {
        self.potentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.potentials.is_empty()
    }
}

/// A molecular system together with the potentials evaluated on it.
///
/// Typical use is to set the positions of a frame, call
/// [`update_potentials`](Self::update_potentials), then read energies and
/// forces. Results are discarded whenever the configuration or the potential
/// list changes.
pub struct System {
    molecular: MolecularSystem,
    symbols: Vec<&'static str>,
    potentials: Potentials,
    evaluations: Vec<Evaluation>,
}

impl System {
    pub fn new(molecular: MolecularSystem) -> Self {
        let symbols = molecular.atomic_symbols();
        Self {
            molecular,
            symbols,
            potentials: Potentials::default(),
            evaluations: Vec::new(),
        }
    }

    pub fn molecular(&self) -> &MolecularSystem {
        &self.molecular
    }

    #[inline]
    pub fn n_atoms(&self) -> usize {
        self.molecular.n_atoms()
    }

    pub fn atomic_symbols(&self) -> &[&'static str] {
        &self.symbols
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        self.molecular.positions()
    }

    pub fn set_positions(&mut self, positions: &[Point3<f64>]) -> Result<(), SystemError> {
        self.molecular.set_positions(positions)?;
        self.evaluations.clear();
        Ok(())
    }

    pub fn cell(&self) -> Option<&Cell> {
        self.molecular.cell()
    }

    pub fn set_cell(&mut self, cell: Option<Cell>) {
        self.molecular.set_cell(cell);
        self.evaluations.clear();
    }

    pub fn potentials(&self) -> &Potentials {
        &self.potentials
    }

    pub fn potentials_mut(&mut self) -> PotentialsMut<'_> {
        PotentialsMut {
            n_atoms: self.molecular.n_atoms(),
            potentials: &mut self.potentials,
            evaluations: &mut self.evaluations,
        }
    }

    /// Evaluates every potential on the current configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Potential`] for the first backend that fails;
    /// earlier results of this call are discarded.
    #[instrument(skip_all, fields(n_potentials = self.potentials.len()))]
    pub fn update_potentials(&mut self) -> Result<(), EngineError> {
        self.evaluations.clear();
        let positions = self.molecular.positions();
        let cell = self.molecular.cell();
        let mut evaluations = Vec::with_capacity(self.potentials.len());

        for potential in self.potentials.items.iter_mut() {
            let atoms = potential.atoms();
            let is_identity = atoms.len() == positions.len()
                && atoms.iter().enumerate().all(|(k, &i)| k == i);

            let evaluation = if is_identity {
                potential.compute(&PotentialInput {
                    positions,
                    symbols: &self.symbols,
                    cell,
                })
            } else {
                let sub_positions: Vec<Point3<f64>> = atoms.iter().map(|&i| positions[i]).collect();
                let sub_symbols: Vec<&'static str> = atoms.iter().map(|&i| self.symbols[i]).collect();
                potential.compute(&PotentialInput {
                    positions: &sub_positions,
                    symbols: &sub_symbols,
                    cell,
                })
            }
            .map_err(|source| EngineError::Potential {
                name: potential.name().to_string(),
                source,
            })?;

            if evaluation.forces.len() != potential.atoms().len() {
                return Err(EngineError::Internal(format!(
                    "potential '{}' returned {} forces for {} atoms",
                    potential.name(),
                    evaluation.forces.len(),
                    potential.atoms().len()
                )));
            }
            debug!(
                "Potential '{}' energy: {} kJ/mol",
                potential.name(),
                evaluation.energy
            );
            evaluations.push(evaluation);
        }

        self.evaluations = evaluations;
        Ok(())
    }

    /// Whether the stored evaluations belong to the current configuration.
    pub fn is_evaluated(&self) -> bool {
        self.evaluations.len() == self.potentials.len()
    }

    /// Total potential energy in kJ/mol, `None` until
    /// [`update_potentials`](Self::update_potentials) has run.
    pub fn energy_potential(&self) -> Option<f64> {
        self.is_evaluated()
            .then(|| self.evaluations.iter().map(|e| e.energy).sum())
    }

    /// Energy of potential `index` in kJ/mol.
    pub fn potential_energy(&self, index: usize) -> Option<f64> {
        if !self.is_evaluated() {
            return None;
        }
        self.evaluations.get(index).map(|e| e.energy)
    }

    pub fn evaluation(&self, index: usize) -> Option<&Evaluation> {
        if !self.is_evaluated() {
            return None;
        }
        self.evaluations.get(index)
    }

    /// Total forces in kJ/mol/nm, one per atom of the system.
    pub fn forces(&self) -> Option<Vec<Vector3<f64>>> {
        if !self.is_evaluated() {
            return None;
        }
        let mut forces = vec![Vector3::zeros(); self.n_atoms()];
        for (potential, evaluation) in self.potentials.iter().zip(&self.evaluations) {
            for (&atom, force) in potential.atoms().iter().zip(&evaluation.forces) {
                forces[atom] += force;
            }
        }
        Some(forces)
    }

    /// Total virial in kJ/mol.
    pub fn virial(&self) -> Option<Matrix3<f64>> {
        self.is_evaluated()
            .then(|| self.evaluations.iter().map(|e| e.virial).sum())
    }
}
