use super::atom::Atom;
use super::cell::Cell;
use nalgebra::Point3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SystemError {
    #[error("Expected {expected} positions, got {found}")]
    PositionCountMismatch { expected: usize, found: usize },
    #[error("Atom index {index} is out of range for a system of {n_atoms} atoms")]
    AtomIndexOutOfRange { index: usize, n_atoms: usize },
    #[error("Atom index {index} is selected more than once")]
    DuplicateAtomIndex { index: usize },
}

/// The atoms of a simulated system together with their current configuration.
///
/// The topology (atoms) is fixed at construction; positions (nm) and the
/// optional periodic cell are updated frame by frame.
#[derive(Debug, Clone, Default)]
pub struct MolecularSystem {
    /// Topology information, one entry per atom.
    atoms: Vec<Atom>,
    /// Current Cartesian positions in nm, parallel to `atoms`.
    positions: Vec<Point3<f64>>,
    /// Periodic cell, `None` for an isolated system.
    cell: Option<Cell>,
}

impl MolecularSystem {
    /// Creates a system from atoms and their initial positions.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::PositionCountMismatch`] if the two slices differ
    /// in length.
    pub fn new(
        atoms: Vec<Atom>,
        positions: Vec<Point3<f64>>,
        cell: Option<Cell>,
    ) -> Result<Self, SystemError> {
        if atoms.len() != positions.len() {
            return Err(SystemError::PositionCountMismatch {
                expected: atoms.len(),
                found: positions.len(),
            });
        }
        Ok(Self {
            atoms,
            positions,
            cell,
        })
    }

    #[inline]
    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// Replaces all positions with those of a new frame.
    pub fn set_positions(&mut self, positions: &[Point3<f64>]) -> Result<(), SystemError> {
        if positions.len() != self.positions.len() {
            return Err(SystemError::PositionCountMismatch {
                expected: self.positions.len(),
                found: positions.len(),
            });
        }
        self.positions.copy_from_slice(positions);
        Ok(())
    }

    pub fn cell(&self) -> Option<&Cell> {
        self.cell.as_ref()
    }

    pub fn set_cell(&mut self, cell: Option<Cell>) {
        self.cell = cell;
    }

    pub fn atomic_symbols(&self) -> Vec<&'static str> {
        self.atoms.iter().map(Atom::symbol).collect()
    }

    pub fn atomic_numbers(&self) -> Vec<u8> {
        self.atoms.iter().map(|a| a.element.atomic_number()).collect()
    }

    pub fn masses(&self) -> Vec<f64> {
        self.atoms.iter().map(Atom::mass).collect()
    }

    /// Checks that every index refers to a distinct atom of this system.
    pub fn validate_indices(&self, indices: &[usize]) -> Result<(), SystemError> {
        check_atom_indices(indices, self.n_atoms())
    }
}

/// Checks that `indices` are distinct and below `n_atoms`.
pub fn check_atom_indices(indices: &[usize], n_atoms: usize) -> Result<(), SystemError> {
    if let Some(&index) = indices.iter().find(|&&i| i >= n_atoms) {
        return Err(SystemError::AtomIndexOutOfRange { index, n_atoms });
    }
    let mut selected = vec![false; n_atoms];
    for &index in indices {
        if std::mem::replace(&mut selected[index], true) {
            return Err(SystemError::DuplicateAtomIndex { index });
        }
    }
    Ok(())
}
