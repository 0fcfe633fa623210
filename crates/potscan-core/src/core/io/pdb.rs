use crate::core::io::traits::TopologyFile;
use crate::core::models::atom::Atom;
use crate::core::models::cell::Cell;
use crate::core::models::element::Element;
use crate::core::models::system::MolecularSystem;
use crate::core::units::NM_PER_ANGSTROM;
use nalgebra::Point3;
use std::io::{self, BufRead};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: PdbParseErrorKind },
    #[error("Missing required record: {0}")]
    MissingRecord(String),
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Cannot determine element for atom '{name}'")]
    UnknownElement { name: String },
    #[error("CRYST1 record describes a degenerate cell")]
    DegenerateCell,
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

fn parse_float(line: &str, start: usize, end: usize, line_num: usize) -> Result<f64, PdbError> {
    let value = slice_and_trim(line, start, end);
    value.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns: format!("{}-{}", start + 1, end),
            value: value.into(),
        },
    })
}

/// Resolves the element of an ATOM/HETATM record.
///
/// Columns 77-78 win when present. Otherwise the atom name is used: names
/// starting in column 13 are two-letter elements, names starting in column 14
/// (or with a leading digit) are one-letter elements.
fn resolve_element(line: &str, name: &str) -> Option<Element> {
    let element_field = slice_and_trim(line, 76, 78);
    if !element_field.is_empty() {
        return Element::from_symbol(element_field);
    }

    let letters: String = name
        .chars()
        .skip_while(|c| c.is_ascii_digit())
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let two_letter_aligned = line
        .get(12..13)
        .is_some_and(|c| c.chars().all(|c| c.is_ascii_alphabetic()));

    if two_letter_aligned && letters.len() >= 2 {
        if let Some(element) = Element::from_symbol(&letters[..2]) {
            return Some(element);
        }
    }
    letters.get(..1).and_then(Element::from_symbol)
}

/// Reader for the Protein Data Bank format.
///
/// Only the first model is read. Coordinates and cell lengths are converted
/// from Ångström to nm. A `CRYST1` record of unit length (the conventional
/// placeholder for non-crystallographic structures) is treated as no cell.
pub struct PdbFile;

impl TopologyFile for PdbFile {
    type Error = PdbError;

    fn read_from(reader: &mut impl BufRead) -> Result<MolecularSystem, Self::Error> {
        let mut atoms = Vec::new();
        let mut positions = Vec::new();
        let mut cell = None;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;

            match slice_and_trim(&line, 0, 6) {
                "CRYST1" => {
                    let lengths = [
                        parse_float(&line, 6, 15, line_num)?,
                        parse_float(&line, 15, 24, line_num)?,
                        parse_float(&line, 24, 33, line_num)?,
                    ];
                    let angles = [
                        parse_float(&line, 33, 40, line_num)?,
                        parse_float(&line, 40, 47, line_num)?,
                        parse_float(&line, 47, 54, line_num)?,
                    ];
                    if lengths.iter().all(|&l| (l - 1.0).abs() < 1e-6) {
                        continue;
                    }
                    let lengths = lengths.map(|l| l * NM_PER_ANGSTROM);
                    cell = Some(Cell::from_lengths_angles(lengths, angles).ok_or(
                        PdbError::Parse {
                            line: line_num,
                            kind: PdbParseErrorKind::DegenerateCell,
                        },
                    )?);
                }
                "ATOM" | "HETATM" => {
                    let alt_loc = line.get(16..17).unwrap_or(" ");
                    if alt_loc != " " && alt_loc != "A" {
                        continue;
                    }

                    let name = slice_and_trim(&line, 12, 16);
                    let residue_name = slice_and_trim(&line, 17, 20);
                    let chain_id = slice_and_trim(&line, 21, 22).chars().next().unwrap_or('A');
                    let res_seq_str = slice_and_trim(&line, 22, 26);
                    let residue_number: isize = if res_seq_str.is_empty() {
                        1
                    } else {
                        res_seq_str.parse().map_err(|_| PdbError::Parse {
                            line: line_num,
                            kind: PdbParseErrorKind::InvalidInt {
                                columns: "23-26".into(),
                                value: res_seq_str.into(),
                            },
                        })?
                    };

                    let x = parse_float(&line, 30, 38, line_num)?;
                    let y = parse_float(&line, 38, 46, line_num)?;
                    let z = parse_float(&line, 46, 54, line_num)?;

                    let element = resolve_element(&line, name).ok_or_else(|| PdbError::Parse {
                        line: line_num,
                        kind: PdbParseErrorKind::UnknownElement { name: name.into() },
                    })?;

                    atoms.push(Atom {
                        name: name.to_string(),
                        element,
                        residue_name: residue_name.to_string(),
                        residue_number,
                        chain_id,
                    });
                    positions.push(Point3::new(x, y, z) * NM_PER_ANGSTROM);
                }
                "ENDMDL" | "END" => break,
                _ => {}
            }
        }

        if atoms.is_empty() {
            return Err(PdbError::MissingRecord("ATOM/HETATM records".into()));
        }

        MolecularSystem::new(atoms, positions, cell)
            .map_err(|e| PdbError::MissingRecord(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TOLERANCE: f64 = 1e-9;

    const ETHANE_PDB: &str = "\
REMARK   ethane
CRYST1   20.000   20.000   20.000  90.00  90.00  90.00 P 1           1
HETATM    1  C1  ETH A   1       0.000   0.000   0.000  1.00  0.00           C
HETATM    2  C2  ETH A   1       1.540   0.000   0.000  1.00  0.00           C
HETATM    3  H11 ETH A   1      -0.360   1.020   0.000  1.00  0.00           H
HETATM    4  H21 ETH A   1       1.900  -1.020   0.000  1.00  0.00
END
";

    fn read(content: &str) -> Result<MolecularSystem, PdbError> {
        PdbFile::read_from(&mut Cursor::new(content))
    }

    #[test]
    fn reads_atoms_positions_and_cell() {
        let system = read(ETHANE_PDB).unwrap();
        assert_eq!(system.n_atoms(), 4);
        assert_eq!(system.atomic_symbols(), vec!["C", "C", "H", "H"]);
        assert_eq!(system.atoms()[0].residue_name, "ETH");
        assert_eq!(system.atoms()[2].name, "H11");

        let p = system.positions()[1];
        assert!((p.x - 0.154).abs() < TOLERANCE);

        let cell = system.cell().expect("cell should be parsed");
        assert!(cell.is_orthorhombic());
        assert!((cell.lengths()[0] - 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn element_is_inferred_from_name_when_columns_are_blank() {
        let system = read(ETHANE_PDB).unwrap();
        assert_eq!(system.atoms()[3].symbol(), "H");
    }

    #[test]
    fn two_letter_elements_are_inferred_from_column_13() {
        let content =
            "HETATM    1 CL   CL  A   1       0.000   0.000   0.000  1.00  0.00\n";
        let system = read(content).unwrap();
        assert_eq!(system.atomic_symbols(), vec!["Cl"]);
    }

    #[test]
    fn unit_cryst1_record_means_no_cell() {
        let content = "\
CRYST1    1.000    1.000    1.000  90.00  90.00  90.00 P 1           1
ATOM      1  O   HOH A   1       0.000   0.000   0.000  1.00  0.00           O
";
        let system = read(content).unwrap();
        assert!(system.cell().is_none());
    }

    #[test]
    fn only_the_first_model_is_read() {
        let content = "\
MODEL        1
ATOM      1  O   HOH A   1       0.000   0.000   0.000  1.00  0.00           O
ENDMDL
MODEL        2
ATOM      1  O   HOH A   1       1.000   0.000   0.000  1.00  0.00           O
ENDMDL
";
        let system = read(content).unwrap();
        assert_eq!(system.n_atoms(), 1);
        assert!(system.positions()[0].x.abs() < TOLERANCE);
    }

    #[test]
    fn invalid_coordinate_reports_line_and_columns() {
        let content =
            "ATOM      1  O   HOH A   1       0.000   abc     0.000  1.00  0.00           O\n";
        match read(content) {
            Err(PdbError::Parse {
                line: 1,
                kind: PdbParseErrorKind::InvalidFloat { columns, .. },
            }) => assert_eq!(columns, "39-46"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unknown_element_is_an_error() {
        let content =
            "ATOM      1  QX  UNK A   1       0.000   0.000   0.000  1.00  0.00          QX\n";
        assert!(matches!(
            read(content),
            Err(PdbError::Parse {
                kind: PdbParseErrorKind::UnknownElement { .. },
                ..
            })
        ));
    }

    #[test]
    fn file_without_atoms_is_rejected() {
        assert!(matches!(
            read("REMARK nothing here\nEND\n"),
            Err(PdbError::MissingRecord(_))
        ));
    }
}
