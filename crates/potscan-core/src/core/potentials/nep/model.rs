use super::NepError;
use crate::core::models::element::Element;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NepVersion {
    /// One network shared by all elements.
    Nep3,
    /// One network per element of the center atom.
    Nep4,
}

impl FromStr for NepVersion {
    type Err = NepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nep3" => Ok(Self::Nep3),
            "nep4" => Ok(Self::Nep4),
            other if other.starts_with("nep") => Err(NepError::Unsupported(format!(
                "model kind '{}' (only plain nep3/nep4 potentials are supported)",
                other
            ))),
            other => Err(NepError::Header {
                line: 1,
                message: format!("unknown model kind '{}'", other),
            }),
        }
    }
}

/// Weights of the single-hidden-layer network for one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Ann {
    /// Hidden-layer weights, `num_neurons x dim`, row-major.
    pub w0: Vec<f64>,
    /// Hidden-layer biases (subtracted).
    pub b0: Vec<f64>,
    /// Output weights.
    pub w1: Vec<f64>,
}

/// A parsed `nep.txt` model.
///
/// All lengths are in Å and the network produces energies in eV, as written
/// by GPUMD.
#[derive(Debug, Clone, PartialEq)]
pub struct NepModel {
    pub version: NepVersion,
    pub elements: Vec<Element>,
    pub rc_radial: f64,
    pub rc_angular: f64,
    pub n_max_radial: usize,
    pub n_max_angular: usize,
    pub basis_size_radial: usize,
    pub basis_size_angular: usize,
    /// Highest Legendre order of the three-body descriptors.
    pub l_max: usize,
    /// `2` when the four-body descriptors are present, `0` otherwise.
    pub l_max_4body: usize,
    /// `1` when the five-body descriptors are present, `0` otherwise.
    pub l_max_5body: usize,
    pub num_neurons: usize,
    pub anns: Vec<Ann>,
    /// Output bias, shared by all elements (subtracted).
    pub b1: f64,
    /// Expansion coefficients of the radial and angular functions.
    pub coefficients: Vec<f64>,
    /// Per-descriptor scaling factors.
    pub q_scaler: Vec<f64>,
}

impl NepModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, NepError> {
        let content = fs::read_to_string(path)?;
        content.parse()
    }

    pub fn num_types(&self) -> usize {
        self.elements.len()
    }

    pub fn dim_radial(&self) -> usize {
        self.n_max_radial + 1
    }

    pub fn has_four_body(&self) -> bool {
        self.l_max_4body == 2
    }

    pub fn has_five_body(&self) -> bool {
        self.l_max_5body == 1
    }

    /// Number of angular descriptor blocks: one per three-body order, then the
    /// optional four-body and five-body blocks.
    pub fn num_angular_blocks(&self) -> usize {
        self.l_max + usize::from(self.has_four_body()) + usize::from(self.has_five_body())
    }

    pub fn dim_angular(&self) -> usize {
        (self.n_max_angular + 1) * self.num_angular_blocks()
    }

    /// Length of the descriptor vector.
    pub fn dim(&self) -> usize {
        self.dim_radial() + self.dim_angular()
    }

    /// Index of an element in the model's type list.
    pub fn type_of(&self, element: Element) -> Option<usize> {
        self.elements.iter().position(|&e| e == element)
    }

    /// The network evaluated for a center atom of type `t`.
    pub fn ann_for(&self, t: usize) -> &Ann {
        match self.version {
            NepVersion::Nep3 => &self.anns[0],
            NepVersion::Nep4 => &self.anns[t],
        }
    }

    /// Coefficient of basis function `k` in radial function `n` for the pair
    /// of types `(t1, t2)`.
    #[inline]
    pub fn c_radial(&self, n: usize, k: usize, t1: usize, t2: usize) -> f64 {
        let nt = self.num_types();
        self.coefficients[(n * (self.basis_size_radial + 1) + k) * nt * nt + t1 * nt + t2]
    }

    #[inline]
    pub fn c_angular(&self, n: usize, k: usize, t1: usize, t2: usize) -> f64 {
        let nt = self.num_types();
        let offset = (self.n_max_radial + 1) * (self.basis_size_radial + 1) * nt * nt;
        self.coefficients
            [offset + (n * (self.basis_size_angular + 1) + k) * nt * nt + t1 * nt + t2]
    }

    /// Index of the angular descriptor `(n, l)` in the descriptor vector.
    #[inline]
    pub fn angular_index(&self, n: usize, l: usize) -> usize {
        self.dim_radial() + (l - 1) * (self.n_max_angular + 1) + n
    }

    #[inline]
    pub fn four_body_index(&self, n: usize) -> usize {
        self.dim_radial() + self.l_max * (self.n_max_angular + 1) + n
    }

    /// Five-body descriptors always follow the four-body block.
    #[inline]
    pub fn five_body_index(&self, n: usize) -> usize {
        self.dim_radial() + (self.l_max + 1) * (self.n_max_angular + 1) + n
    }
}

fn parse_header_values<T: FromStr>(
    line: Option<(usize, &str)>,
    keyword: &str,
    min_values: usize,
) -> Result<(usize, Vec<T>), NepError> {
    let (line_num, line) = line.ok_or_else(|| NepError::Header {
        line: 0,
        message: format!("missing '{}' line", keyword),
    })?;
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some(keyword) {
        return Err(NepError::Header {
            line: line_num,
            message: format!("expected '{}' line, found '{}'", keyword, line.trim()),
        });
    }
    let values = tokens
        .map(|t| {
            t.parse::<T>().map_err(|_| NepError::Header {
                line: line_num,
                message: format!("invalid value '{}' in '{}' line", t, keyword),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() < min_values {
        return Err(NepError::Header {
            line: line_num,
            message: format!(
                "'{}' line needs at least {} values, found {}",
                keyword,
                min_values,
                values.len()
            ),
        });
    }
    Ok((line_num, values))
}

impl FromStr for NepModel {
    type Err = NepError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, first) = lines.next().ok_or(NepError::Header {
            line: 1,
            message: "empty model file".into(),
        })?;
        let mut tokens = first.split_whitespace();
        let version: NepVersion = tokens.next().unwrap_or_default().parse()?;
        let num_types: usize = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| NepError::Header {
                line: 1,
                message: "missing number of element types".into(),
            })?;
        let elements = tokens
            .map(|t| {
                Element::from_symbol(t).ok_or_else(|| NepError::Header {
                    line: 1,
                    message: format!("unknown element '{}'", t),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if num_types == 0 || elements.len() != num_types {
            return Err(NepError::Header {
                line: 1,
                message: format!(
                    "declared {} element types but listed {}",
                    num_types,
                    elements.len()
                ),
            });
        }

        let (_, cutoff) = parse_header_values::<f64>(lines.next(), "cutoff", 2)?;
        let (_, n_max) = parse_header_values::<usize>(lines.next(), "n_max", 2)?;
        let (_, basis) = parse_header_values::<usize>(lines.next(), "basis_size", 2)?;
        let (l_line, l_max) = parse_header_values::<usize>(lines.next(), "l_max", 1)?;
        let (_, ann) = parse_header_values::<usize>(lines.next(), "ANN", 1)?;

        if l_max[0] == 0 || l_max[0] > 8 {
            return Err(NepError::Header {
                line: l_line,
                message: format!("l_max must be between 1 and 8, found {}", l_max[0]),
            });
        }
        let l_max_4body = l_max.get(1).copied().unwrap_or(0);
        let l_max_5body = l_max.get(2).copied().unwrap_or(0);
        if !matches!(l_max_4body, 0 | 2) {
            return Err(NepError::Header {
                line: l_line,
                message: format!("four-body l_max must be 0 or 2, found {}", l_max_4body),
            });
        }
        if !matches!(l_max_5body, 0 | 1) {
            return Err(NepError::Header {
                line: l_line,
                message: format!("five-body l_max must be 0 or 1, found {}", l_max_5body),
            });
        }
        if l_max_5body == 1 && l_max_4body == 0 {
            return Err(NepError::Header {
                line: l_line,
                message: "five-body descriptors require the four-body ones".into(),
            });
        }
        let (rc_radial, rc_angular) = (cutoff[0], cutoff[1]);
        if rc_radial <= 0.0 || rc_angular <= 0.0 || rc_angular > rc_radial {
            return Err(NepError::Header {
                line: 2,
                message: format!(
                    "invalid cutoffs {} / {} (angular must not exceed radial)",
                    rc_radial, rc_angular
                ),
            });
        }

        let mut model = NepModel {
            version,
            elements,
            rc_radial,
            rc_angular,
            n_max_radial: n_max[0],
            n_max_angular: n_max[1],
            basis_size_radial: basis[0],
            basis_size_angular: basis[1],
            l_max: l_max[0],
            l_max_4body,
            l_max_5body,
            num_neurons: ann[0],
            anns: Vec::new(),
            b1: 0.0,
            coefficients: Vec::new(),
            q_scaler: Vec::new(),
        };

        let mut parameters = Vec::new();
        for (line_num, line) in lines {
            for token in line.split_whitespace() {
                parameters.push(token.parse::<f64>().map_err(|_| NepError::Parameter {
                    line: line_num,
                    value: token.to_string(),
                })?);
            }
        }

        let dim = model.dim();
        let neurons = model.num_neurons;
        let num_anns = match version {
            NepVersion::Nep3 => 1,
            NepVersion::Nep4 => num_types,
        };
        let num_ann_params = (dim + 2) * neurons * num_anns + 1;
        let num_coefficients = num_types
            * num_types
            * ((model.n_max_radial + 1) * (model.basis_size_radial + 1)
                + (model.n_max_angular + 1) * (model.basis_size_angular + 1));
        let expected = num_ann_params + num_coefficients + dim;
        if parameters.len() != expected {
            return Err(NepError::ParameterCount {
                expected,
                found: parameters.len(),
            });
        }

        let mut rest = parameters.as_slice();
        let mut take = |n: usize| {
            let (head, tail) = rest.split_at(n);
            rest = tail;
            head.to_vec()
        };
        for _ in 0..num_anns {
            let w0 = take(neurons * dim);
            let b0 = take(neurons);
            let w1 = take(neurons);
            model.anns.push(Ann { w0, b0, w1 });
        }
        model.b1 = take(1)[0];
        model.coefficients = take(num_coefficients);
        model.q_scaler = take(dim);

        Ok(model)
    }
}
