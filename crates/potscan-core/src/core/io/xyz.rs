use crate::core::models::cell::Cell;
use crate::core::models::element::Element;
use crate::core::models::system::MolecularSystem;
use crate::core::units::NM_PER_ANGSTROM;
use nalgebra::{Point3, Vector3};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Frame {frame} is truncated: expected {expected} atom lines, found {found}")]
    TruncatedFrame {
        frame: usize,
        expected: usize,
        found: usize,
    },
    #[error("Frame {frame} has {found} atoms, but the trajectory has {expected}")]
    AtomCountChanged {
        frame: usize,
        expected: usize,
        found: usize,
    },
    #[error("Atom {index} of frame {frame} is '{found}', but it is '{expected}' in frame 0")]
    LabelChanged {
        frame: usize,
        index: usize,
        expected: String,
        found: String,
    },
    #[error("Trajectory has {trajectory} atoms, but the topology has {topology}")]
    TopologyMismatch { trajectory: usize, topology: usize },
    #[error("Atom {index} is '{trajectory}' in the trajectory but '{topology}' in the topology")]
    ElementMismatch {
        index: usize,
        trajectory: String,
        topology: String,
    },
    #[error("Trajectory contains no frames")]
    Empty,
}

/// One snapshot of the trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct XyzFrame {
    /// The raw comment line of the frame.
    pub comment: String,
    /// Positions in nm.
    pub positions: Vec<Point3<f64>>,
    /// Cell parsed from an extended-XYZ `Lattice="..."` comment, if any.
    pub cell: Option<Cell>,
}

/// A multi-frame XYZ trajectory held in memory.
///
/// Coordinates are read in Ångström and stored in nm.
#[derive(Debug, Clone)]
pub struct XyzTrajectory {
    symbols: Vec<String>,
    frames: Vec<XyzFrame>,
}

impl XyzTrajectory {
    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, XyzError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    pub fn read_from(reader: &mut impl BufRead) -> Result<Self, XyzError> {
        let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));
        let mut symbols: Vec<String> = Vec::new();
        let mut frames = Vec::new();

        loop {
            let (count_line_num, count_line) = match lines.next() {
                Some((n, line)) => (n, line?),
                None => break,
            };
            let count_str = count_line.trim();
            if count_str.is_empty() {
                continue;
            }
            let n_atoms: usize = count_str.parse().map_err(|_| XyzError::Parse {
                line: count_line_num,
                message: format!("expected atom count, found '{}'", count_str),
            })?;

            let frame_index = frames.len();
            if frame_index > 0 && n_atoms != symbols.len() {
                return Err(XyzError::AtomCountChanged {
                    frame: frame_index,
                    expected: symbols.len(),
                    found: n_atoms,
                });
            }

            let (comment_line_num, comment) = match lines.next() {
                Some((n, line)) => (n, line?),
                None => {
                    return Err(XyzError::TruncatedFrame {
                        frame: frame_index,
                        expected: n_atoms,
                        found: 0,
                    });
                }
            };

            let mut positions = Vec::with_capacity(n_atoms);
            for found in 0..n_atoms {
                let (line_num, line) = match lines.next() {
                    Some((n, line)) => (n, line?),
                    None => {
                        return Err(XyzError::TruncatedFrame {
                            frame: frame_index,
                            expected: n_atoms,
                            found,
                        });
                    }
                };
                let (symbol, position) = parse_atom_line(&line, line_num)?;
                if frame_index == 0 {
                    symbols.push(symbol.to_string());
                } else if symbols[found] != symbol {
                    return Err(XyzError::LabelChanged {
                        frame: frame_index,
                        index: found,
                        expected: symbols[found].clone(),
                        found: symbol.to_string(),
                    });
                }
                positions.push(position);
            }

            let cell = parse_lattice(&comment, comment_line_num)?;
            frames.push(XyzFrame {
                comment,
                positions,
                cell,
            });
        }

        if frames.is_empty() {
            return Err(XyzError::Empty);
        }
        Ok(Self { symbols, frames })
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn n_atoms(&self) -> usize {
        self.symbols.len()
    }

    /// Atom labels as written in the first frame.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn frame(&self, index: usize) -> Option<&XyzFrame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[XyzFrame] {
        &self.frames
    }

    /// Verifies that the trajectory describes the atoms of `system`.
    ///
    /// Atom counts must match. Labels that parse as element symbols must agree
    /// with the topology's elements; other labels are not checked.
    pub fn check_against(&self, system: &MolecularSystem) -> Result<(), XyzError> {
        if self.n_atoms() != system.n_atoms() {
            return Err(XyzError::TopologyMismatch {
                trajectory: self.n_atoms(),
                topology: system.n_atoms(),
            });
        }
        for (index, (label, atom)) in self.symbols.iter().zip(system.atoms()).enumerate() {
            if let Some(element) = Element::from_symbol(label) {
                if element != atom.element {
                    return Err(XyzError::ElementMismatch {
                        index,
                        trajectory: label.clone(),
                        topology: atom.symbol().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn parse_atom_line(line: &str, line_num: usize) -> Result<(&str, Point3<f64>), XyzError> {
    let mut fields = line.split_whitespace();
    let symbol = fields.next().ok_or_else(|| XyzError::Parse {
        line: line_num,
        message: "empty atom line".into(),
    })?;
    let mut coords = [0.0; 3];
    for (axis, coord) in ["x", "y", "z"].iter().zip(coords.iter_mut()) {
        let field = fields.next().ok_or_else(|| XyzError::Parse {
            line: line_num,
            message: format!("missing {} coordinate", axis),
        })?;
        *coord = field.parse().map_err(|_| XyzError::Parse {
            line: line_num,
            message: format!("invalid {} coordinate '{}'", axis, field),
        })?;
    }
    Ok((symbol, Point3::from(coords) * NM_PER_ANGSTROM))
}

/// Extracts the cell from an extended-XYZ comment such as
/// `Lattice="10 0 0 0 10 0 0 0 10" Properties=...`.
///
/// Comments without a `Lattice=` key describe no cell. A key that is present
/// but does not hold nine numbers spanning a non-degenerate cell is an error.
fn parse_lattice(comment: &str, line: usize) -> Result<Option<Cell>, XyzError> {
    let Some(key) = comment.find("Lattice=") else {
        return Ok(None);
    };
    let malformed = |message: String| XyzError::Parse { line, message };

    let quoted = &comment[key + "Lattice=".len()..];
    let body = quoted
        .strip_prefix('"')
        .and_then(|rest| rest.find('"').map(|end| &rest[..end]))
        .ok_or_else(|| malformed("Lattice value must be a quoted list of 9 numbers".into()))?;
    let values: Vec<f64> = body
        .split_whitespace()
        .map(|token| {
            token
                .parse()
                .map_err(|_| malformed(format!("invalid Lattice value '{}'", token)))
        })
        .collect::<Result<_, _>>()?;
    if values.len() != 9 {
        return Err(malformed(format!(
            "Lattice needs 9 values, found {}",
            values.len()
        )));
    }
    let v = |i: usize| Vector3::new(values[i], values[i + 1], values[i + 2]) * NM_PER_ANGSTROM;
    Cell::from_vectors(v(0), v(3), v(6))
        .map(Some)
        .ok_or_else(|| malformed("Lattice vectors describe a degenerate cell".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use std::io::Cursor;

    const TOLERANCE: f64 = 1e-9;

    const TWO_FRAMES: &str = "\
2
frame 0
C 0.0 0.0 0.0
H 1.0 0.0 0.0
2
frame 1
C 0.0 0.0 0.5
H 1.1 0.0 0.0
";

    fn read(content: &str) -> Result<XyzTrajectory, XyzError> {
        XyzTrajectory::read_from(&mut Cursor::new(content))
    }

    fn ch_system() -> MolecularSystem {
        MolecularSystem::new(
            vec![
                Atom::new("C1", Element::from_symbol("C").unwrap()),
                Atom::new("H1", Element::from_symbol("H").unwrap()),
            ],
            vec![Point3::origin(); 2],
            None,
        )
        .unwrap()
    }

    #[test]
    fn reads_all_frames_and_converts_to_nm() {
        let traj = read(TWO_FRAMES).unwrap();
        assert_eq!(traj.n_frames(), 2);
        assert_eq!(traj.n_atoms(), 2);
        assert_eq!(traj.symbols(), ["C", "H"]);
        let frame = traj.frame(1).unwrap();
        assert_eq!(frame.comment, "frame 1");
        assert!((frame.positions[0].z - 0.05).abs() < TOLERANCE);
        assert!((frame.positions[1].x - 0.11).abs() < TOLERANCE);
        assert!(frame.cell.is_none());
    }

    #[test]
    fn trailing_blank_lines_are_ignored() {
        let traj = read(&format!("{TWO_FRAMES}\n\n")).unwrap();
        assert_eq!(traj.n_frames(), 2);
    }

    #[test]
    fn truncated_frame_is_reported() {
        let content = "3\ncomment\nC 0 0 0\nH 1 0 0\n";
        assert!(matches!(
            read(content),
            Err(XyzError::TruncatedFrame {
                frame: 0,
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn changing_atom_count_is_rejected() {
        let content = "1\na\nC 0 0 0\n2\nb\nC 0 0 0\nH 1 0 0\n";
        assert!(matches!(
            read(content),
            Err(XyzError::AtomCountChanged { frame: 1, .. })
        ));
    }

    #[test]
    fn invalid_coordinate_reports_line() {
        let content = "1\na\nC 0 zero 0\n";
        assert!(matches!(read(content), Err(XyzError::Parse { line: 3, .. })));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(read(""), Err(XyzError::Empty)));
    }

    #[test]
    fn extended_xyz_lattice_is_parsed() {
        let content =
            "1\nLattice=\"10.0 0.0 0.0 0.0 12.0 0.0 0.0 0.0 14.0\" Properties=species:S:1:pos:R:3\nO 0 0 0\n";
        let traj = read(content).unwrap();
        let cell = traj.frame(0).unwrap().cell.expect("lattice should parse");
        let lengths = cell.lengths();
        assert!((lengths[0] - 1.0).abs() < TOLERANCE);
        assert!((lengths[2] - 1.4).abs() < TOLERANCE);
    }

    #[test]
    fn malformed_lattice_is_an_error() {
        for lattice in [
            "Lattice=\"10 0 0 0 ten 0 0 0 10\"",
            "Lattice=\"10 0 0 0 10 0\"",
            "Lattice=\"10 0 0 20 0 0 0 0 10\"",
            "Lattice=\"10 0 0 0 10 0 0 0 10",
            "Lattice=10",
        ] {
            let content = format!("1\ncomment\nO 0 0 0\n1\n{lattice}\nO 0 0 0\n");
            assert!(
                matches!(read(&content), Err(XyzError::Parse { line: 5, .. })),
                "{lattice}"
            );
        }
    }

    #[test]
    fn comment_without_lattice_has_no_cell() {
        let traj = read("1\nenergy=-3.2 pbc=\"F F F\"\nO 0 0 0\n").unwrap();
        assert!(traj.frame(0).unwrap().cell.is_none());
    }

    #[test]
    fn reordered_atoms_in_later_frames_are_rejected() {
        let content = "2\na\nC 0 0 0\nH 1 0 0\n2\nb\nH 1 0 0\nC 0 0 0\n";
        match read(content) {
            Err(XyzError::LabelChanged {
                frame,
                index,
                expected,
                found,
            }) => {
                assert_eq!((frame, index), (1, 0));
                assert_eq!(expected, "C");
                assert_eq!(found, "H");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn check_against_accepts_matching_topology() {
        let traj = read(TWO_FRAMES).unwrap();
        assert!(traj.check_against(&ch_system()).is_ok());
    }

    #[test]
    fn check_against_rejects_wrong_atom_count() {
        let traj = read("1\na\nC 0 0 0\n").unwrap();
        assert!(matches!(
            traj.check_against(&ch_system()),
            Err(XyzError::TopologyMismatch {
                trajectory: 1,
                topology: 2
            })
        ));
    }

    #[test]
    fn check_against_rejects_element_swap() {
        let traj = read("2\na\nH 0 0 0\nC 1 0 0\n").unwrap();
        assert!(matches!(
            traj.check_against(&ch_system()),
            Err(XyzError::ElementMismatch { index: 0, .. })
        ));
    }
}
