use super::element::Element;

/// An atom of the topology.
///
/// Positions are not stored here: they change every frame and live in the
/// owning [`MolecularSystem`](super::system::MolecularSystem).
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The name of the atom (e.g., "C1", "H11").
    pub name: String,
    /// The chemical element of the atom.
    pub element: Element,
    /// The name of the parent residue (e.g., "ETH").
    pub residue_name: String,
    /// The residue sequence number as written in the topology file.
    pub residue_number: isize,
    /// The single-character chain identifier.
    pub chain_id: char,
}

impl Atom {
    /// Creates an atom with an anonymous residue and chain `A`.
    pub fn new(name: &str, element: Element) -> Self {
        Self {
            name: name.to_string(),
            element,
            residue_name: String::new(),
            residue_number: 1,
            chain_id: 'A',
        }
    }

    /// The atomic mass in g/mol.
    #[inline]
    pub fn mass(&self) -> f64 {
        self.element.mass()
    }

    #[inline]
    pub fn symbol(&self) -> &'static str {
        self.element.symbol()
    }
}
