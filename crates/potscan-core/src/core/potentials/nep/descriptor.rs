use super::model::{Ann, NepModel};
use nalgebra::Vector3;
use std::f64::consts::PI;

/// Highest Legendre order supported by the angular descriptors.
const MAX_L: usize = 8;

/// Weights of the cubic invariant of the order-2 harmonic sums, in GPUMD's
/// normalization.
const C4B: [f64; 5] = [
    -0.007499480826664,
    -0.134990654879954,
    0.067495327439977,
    0.404971964639862,
    -0.809943929279723,
];

/// Weight of the five-body term `C5B |s_1|^4`.
const C5B: f64 = 0.026596810706114;

/// A neighbor of the center atom, in Å.
#[derive(Debug, Clone, Copy)]
pub(super) struct TypedNeighbor {
    pub index: usize,
    pub type_index: usize,
    pub displacement: Vector3<f64>,
    pub distance: f64,
}

/// Energy of one center atom and the gradient of that energy with respect to
/// each neighbor displacement `r_ij`.
#[derive(Debug, Clone, Default)]
pub(super) struct AtomContribution {
    /// Site energy in eV.
    pub energy: f64,
    /// `(j, r_ij, dE_i/dr_ij)` in Å and eV/Å.
    pub pair_gradients: Vec<(usize, Vector3<f64>, Vector3<f64>)>,
}

/// Chebyshev-based radial basis with a cosine cutoff, and its derivative.
///
/// `f_k(r) = (T_k(x) + 1) f_c(r) / 2` with `x = 2 (r/rc - 1)^2 - 1`.
fn radial_basis(distance: f64, rc: f64, fk: &mut [f64], fkp: &mut [f64]) {
    let rc_inv = 1.0 / rc;
    let (fc, fcp) = if distance < rc {
        let arg = PI * distance * rc_inv;
        (0.5 * arg.cos() + 0.5, -0.5 * PI * rc_inv * arg.sin())
    } else {
        (0.0, 0.0)
    };
    let y = distance * rc_inv - 1.0;
    let x = 2.0 * y * y - 1.0;
    let dx = 4.0 * y * rc_inv;

    let (mut t_prev, mut t_curr) = (1.0, x);
    let (mut dt_prev, mut dt_curr) = (0.0, 1.0);
    for k in 0..fk.len() {
        let (t, dt) = match k {
            0 => (1.0, 0.0),
            1 => (x, 1.0),
            _ => {
                let t_next = 2.0 * x * t_curr - t_prev;
                let dt_next = 2.0 * t_curr + 2.0 * x * dt_curr - dt_prev;
                t_prev = t_curr;
                t_curr = t_next;
                dt_prev = dt_curr;
                dt_curr = dt_next;
                (t_next, dt_next)
            }
        };
        fk[k] = 0.5 * (t + 1.0) * fc;
        fkp[k] = 0.5 * (dt * dx * fc + (t + 1.0) * fcp);
    }
}

/// Legendre polynomials `P_0..=P_l_max` and their derivatives at `x`.
fn legendre(l_max: usize, x: f64) -> ([f64; MAX_L + 1], [f64; MAX_L + 1]) {
    let mut p = [0.0; MAX_L + 1];
    let mut dp = [0.0; MAX_L + 1];
    p[0] = 1.0;
    if l_max >= 1 {
        p[1] = x;
        dp[1] = 1.0;
    }
    for l in 1..l_max {
        let lf = l as f64;
        p[l + 1] = ((2.0 * lf + 1.0) * x * p[l] - lf * p[l - 1]) / (lf + 1.0);
        dp[l + 1] = dp[l - 1] + (2.0 * lf + 1.0) * p[l];
    }
    (p, dp)
}

/// `(2l + 1) / 4π`, the addition-theorem weight of order `l`.
#[inline]
fn angular_weight(l: usize) -> f64 {
    (2 * l + 1) as f64 / (4.0 * PI)
}

/// Unnormalized real harmonics of order 2 at the unit vector `u`, ordered
/// `[3z²-1, xz, yz, x²-y², 2xy]`, with their gradients with respect to `u`.
fn harmonics_l2(u: &Vector3<f64>) -> ([f64; 5], [Vector3<f64>; 5]) {
    let (x, y, z) = (u.x, u.y, u.z);
    (
        [3.0 * z * z - 1.0, x * z, y * z, x * x - y * y, 2.0 * x * y],
        [
            Vector3::new(0.0, 0.0, 6.0 * z),
            Vector3::new(z, 0.0, x),
            Vector3::new(0.0, z, y),
            Vector3::new(2.0 * x, -2.0 * y, 0.0),
            Vector3::new(2.0 * y, 2.0 * x, 0.0),
        ],
    )
}

/// Rotation-invariant cubic contraction of the order-2 sums and its partial
/// derivatives.
fn four_body_invariant(s: &[f64; 5]) -> (f64, [f64; 5]) {
    let [s0, s1, s2, s3, s4] = *s;
    let value = C4B[0] * s0 * s0 * s0
        + C4B[1] * s0 * (s1 * s1 + s2 * s2)
        + C4B[2] * s0 * (s3 * s3 + s4 * s4)
        + C4B[3] * s3 * (s2 * s2 - s1 * s1)
        + C4B[4] * s1 * s2 * s4;
    let grad = [
        3.0 * C4B[0] * s0 * s0 + C4B[1] * (s1 * s1 + s2 * s2) + C4B[2] * (s3 * s3 + s4 * s4),
        2.0 * C4B[1] * s0 * s1 - 2.0 * C4B[3] * s3 * s1 + C4B[4] * s2 * s4,
        2.0 * C4B[1] * s0 * s2 + 2.0 * C4B[3] * s3 * s2 + C4B[4] * s1 * s4,
        2.0 * C4B[2] * s0 * s3 + C4B[3] * (s2 * s2 - s1 * s1),
        2.0 * C4B[2] * s0 * s4 + C4B[4] * s1 * s2,
    ];
    (value, grad)
}

/// Expanded radial functions `g_n` and derivatives for one neighbor.
struct Expansion {
    g: Vec<f64>,
    gp: Vec<f64>,
}

fn expand(
    distance: f64,
    rc: f64,
    n_max: usize,
    basis_size: usize,
    coefficient: impl Fn(usize, usize) -> f64,
) -> Expansion {
    let mut fk = vec![0.0; basis_size + 1];
    let mut fkp = vec![0.0; basis_size + 1];
    radial_basis(distance, rc, &mut fk, &mut fkp);

    let mut g = vec![0.0; n_max + 1];
    let mut gp = vec![0.0; n_max + 1];
    for n in 0..=n_max {
        for k in 0..=basis_size {
            let c = coefficient(n, k);
            g[n] += c * fk[k];
            gp[n] += c * fkp[k];
        }
    }
    Expansion { g, gp }
}

/// Evaluates the network, returning the energy (eV) and `dE/dq` with respect
/// to the scaled descriptor.
fn apply_ann(ann: &Ann, b1: f64, q: &[f64]) -> (f64, Vec<f64>) {
    let dim = q.len();
    let mut energy = 0.0;
    let mut fp = vec![0.0; dim];
    for (n, (&b0, &w1)) in ann.b0.iter().zip(&ann.w1).enumerate() {
        let row = &ann.w0[n * dim..(n + 1) * dim];
        let w0_q: f64 = row.iter().zip(q).map(|(w, q)| w * q).sum();
        let x1 = (w0_q - b0).tanh();
        energy += w1 * x1;
        let slope = w1 * (1.0 - x1 * x1);
        for (fp_d, &w) in fp.iter_mut().zip(row) {
            *fp_d += slope * w;
        }
    }
    (energy - b1, fp)
}

/// Computes the site energy of one atom and its gradient with respect to the
/// displacements of its neighbors.
///
/// `neighbors` must contain every atom within the radial cutoff.
pub(super) fn evaluate_atom(
    model: &NepModel,
    center_type: usize,
    neighbors: &[TypedNeighbor],
) -> AtomContribution {
    let dim = model.dim();
    let mut q = vec![0.0; dim];

    let radial: Vec<Expansion> = neighbors
        .iter()
        .map(|nb| {
            expand(
                nb.distance,
                model.rc_radial,
                model.n_max_radial,
                model.basis_size_radial,
                |n, k| model.c_radial(n, k, center_type, nb.type_index),
            )
        })
        .collect();
    for exp in &radial {
        for (q_n, g) in q.iter_mut().zip(&exp.g) {
            *q_n += g;
        }
    }

    // Positions in `neighbors` of the atoms inside the angular cutoff.
    let angular_ids: Vec<usize> = neighbors
        .iter()
        .enumerate()
        .filter(|(_, nb)| nb.distance < model.rc_angular)
        .map(|(slot, _)| slot)
        .collect();
    let angular: Vec<Expansion> = angular_ids
        .iter()
        .map(|&slot| {
            let nb = &neighbors[slot];
            expand(
                nb.distance,
                model.rc_angular,
                model.n_max_angular,
                model.basis_size_angular,
                |n, k| model.c_angular(n, k, center_type, nb.type_index),
            )
        })
        .collect();
    let units: Vec<Vector3<f64>> = angular_ids
        .iter()
        .map(|&slot| neighbors[slot].displacement / neighbors[slot].distance)
        .collect();

    let m = angular_ids.len();
    for a in 0..m {
        for b in 0..m {
            let (p, _) = legendre(model.l_max, units[a].dot(&units[b]));
            for l in 1..=model.l_max {
                let weight = angular_weight(l) * p[l];
                for n in 0..=model.n_max_angular {
                    q[model.angular_index(n, l)] += weight * angular[a].g[n] * angular[b].g[n];
                }
            }
        }
    }

    let four_body = model.has_four_body();
    let five_body = model.has_five_body();
    let harmonics: Vec<([f64; 5], [Vector3<f64>; 5])> = if four_body {
        units.iter().map(harmonics_l2).collect()
    } else {
        Vec::new()
    };
    // Per radial channel n: sums of the order-2 harmonics and of g_n u.
    let mut s2 = vec![[0.0; 5]; model.n_max_angular + 1];
    let mut s1 = vec![Vector3::zeros(); model.n_max_angular + 1];
    for a in 0..m {
        for n in 0..=model.n_max_angular {
            let g = angular[a].g[n];
            if four_body {
                for (sum, y) in s2[n].iter_mut().zip(&harmonics[a].0) {
                    *sum += y * g;
                }
            }
            if five_body {
                s1[n] += units[a] * g;
            }
        }
    }
    for n in 0..=model.n_max_angular {
        if four_body {
            q[model.four_body_index(n)] += four_body_invariant(&s2[n]).0;
        }
        if five_body {
            q[model.five_body_index(n)] += C5B * s1[n].norm_squared().powi(2);
        }
    }

    let scaled: Vec<f64> = q.iter().zip(&model.q_scaler).map(|(q, s)| q * s).collect();
    let (energy, fp_scaled) = apply_ann(model.ann_for(center_type), model.b1, &scaled);
    let fp: Vec<f64> = fp_scaled
        .iter()
        .zip(&model.q_scaler)
        .map(|(f, s)| f * s)
        .collect();

    let mut gradients: Vec<Vector3<f64>> = neighbors
        .iter()
        .zip(&radial)
        .map(|(nb, exp)| {
            let de_dr: f64 = (0..=model.n_max_radial).map(|n| fp[n] * exp.gp[n]).sum();
            nb.displacement * (de_dr / nb.distance)
        })
        .collect();

    for a in 0..m {
        let distance_a = neighbors[angular_ids[a]].distance;
        let mut grad = Vector3::zeros();
        for b in 0..m {
            let cos = units[a].dot(&units[b]);
            let (p, dp) = legendre(model.l_max, cos);
            let dcos = (units[b] - units[a] * cos) / distance_a;
            for l in 1..=model.l_max {
                for n in 0..=model.n_max_angular {
                    let w = 2.0 * fp[model.angular_index(n, l)] * angular_weight(l);
                    if w == 0.0 {
                        continue;
                    }
                    let (ga, gpa, gb) = (angular[a].g[n], angular[a].gp[n], angular[b].g[n]);
                    grad += units[a] * (w * gpa * gb * p[l]) + dcos * (w * ga * gb * dp[l]);
                }
            }
        }
        gradients[angular_ids[a]] += grad;
    }

    if four_body || five_body {
        let four_body_slopes: Vec<[f64; 5]> = if four_body {
            s2.iter().map(|s| four_body_invariant(s).1).collect()
        } else {
            Vec::new()
        };
        for a in 0..m {
            let u = units[a];
            let distance_a = neighbors[angular_ids[a]].distance;
            let mut grad = Vector3::zeros();
            for n in 0..=model.n_max_angular {
                let (g, gp) = (angular[a].g[n], angular[a].gp[n]);
                if four_body {
                    let w = fp[model.four_body_index(n)];
                    let (y, dy) = &harmonics[a];
                    for k in 0..5 {
                        let tangential = dy[k] - u * u.dot(&dy[k]);
                        grad += (u * (gp * y[k]) + tangential * (g / distance_a))
                            * (w * four_body_slopes[n][k]);
                    }
                }
                if five_body {
                    let w = fp[model.five_body_index(n)];
                    let v = s1[n] * (4.0 * C5B * s1[n].norm_squared());
                    let along = u.dot(&v);
                    grad += (u * (gp * along) + (v - u * along) * (g / distance_a)) * w;
                }
            }
            gradients[angular_ids[a]] += grad;
        }
    }

    AtomContribution {
        energy,
        pair_gradients: neighbors
            .iter()
            .zip(gradients)
            .map(|(nb, grad)| (nb.index, nb.displacement, grad))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-10;

    #[test]
    fn radial_basis_vanishes_at_cutoff_and_starts_at_one() {
        let mut fk = [0.0; 4];
        let mut fkp = [0.0; 4];
        radial_basis(0.0, 5.0, &mut fk, &mut fkp);
        // x = 1 at r = 0, so every T_k(1) = 1 and f_k = fc = 1.
        for value in fk {
            assert!((value - 1.0).abs() < TOLERANCE);
        }
        radial_basis(5.0, 5.0, &mut fk, &mut fkp);
        for (value, slope) in fk.iter().zip(fkp) {
            assert!(value.abs() < TOLERANCE);
            assert!(slope.abs() < TOLERANCE);
        }
    }

    #[test]
    fn radial_basis_derivative_matches_finite_difference() {
        let h = 1e-6;
        let mut plus = [0.0; 6];
        let mut minus = [0.0; 6];
        let mut value = [0.0; 6];
        let mut slope = [0.0; 6];
        let mut scratch = [0.0; 6];
        radial_basis(2.3 + h, 5.0, &mut plus, &mut scratch);
        radial_basis(2.3 - h, 5.0, &mut minus, &mut scratch);
        radial_basis(2.3, 5.0, &mut value, &mut slope);
        for k in 0..6 {
            let numeric = (plus[k] - minus[k]) / (2.0 * h);
            assert!((numeric - slope[k]).abs() < 1e-7, "k = {k}");
        }
    }

    #[test]
    fn legendre_matches_closed_forms() {
        let x: f64 = 0.3;
        let (p, dp) = legendre(3, x);
        assert!((p[2] - 0.5 * (3.0 * x * x - 1.0)).abs() < TOLERANCE);
        assert!((p[3] - 0.5 * (5.0 * x.powi(3) - 3.0 * x)).abs() < TOLERANCE);
        assert!((dp[2] - 3.0 * x).abs() < TOLERANCE);
        assert!((dp[3] - 0.5 * (15.0 * x * x - 3.0)).abs() < TOLERANCE);
    }

    #[test]
    fn four_body_invariant_is_independent_of_the_bond_direction() {
        let directions = [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 1.0).normalize(),
            Vector3::new(0.0, 1.0, 1.0).normalize(),
            Vector3::new(1.0, 1.0, 1.0).normalize(),
            Vector3::new(0.3, -0.8, 0.2).normalize(),
        ];
        let reference = four_body_invariant(&harmonics_l2(&directions[0]).0).0;
        assert!(reference.abs() > 1e-3);
        for u in &directions[1..] {
            let value = four_body_invariant(&harmonics_l2(u).0).0;
            assert!((value - reference).abs() < 1e-9, "{u:?}");
        }
    }

    #[test]
    fn four_body_slopes_match_finite_difference() {
        let s = [0.4, -0.3, 0.7, 0.2, -0.5];
        let (_, grad) = four_body_invariant(&s);
        let h = 1e-6;
        for k in 0..5 {
            let mut plus = s;
            let mut minus = s;
            plus[k] += h;
            minus[k] -= h;
            let numeric =
                (four_body_invariant(&plus).0 - four_body_invariant(&minus).0) / (2.0 * h);
            assert!((numeric - grad[k]).abs() < 1e-8, "k = {k}");
        }
    }

    #[test]
    fn ann_gradient_matches_finite_difference() {
        let ann = Ann {
            w0: vec![0.3, -0.2, 0.5, 0.1, 0.4, -0.6],
            b0: vec![0.05, -0.1],
            w1: vec![0.7, -0.3],
        };
        let q = [0.2, -0.4, 0.9];
        let (_, fp) = apply_ann(&ann, 0.1, &q);
        let h = 1e-6;
        for d in 0..3 {
            let mut qp = q;
            let mut qm = q;
            qp[d] += h;
            qm[d] -= h;
            let numeric = (apply_ann(&ann, 0.1, &qp).0 - apply_ann(&ann, 0.1, &qm).0) / (2.0 * h);
            assert!((numeric - fp[d]).abs() < 1e-8);
        }
    }
}
