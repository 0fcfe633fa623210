//! Unit conversion factors.
//!
//! The library works in nm, kJ/mol and kJ/mol/nm. Backends convert from their
//! native units with the factors below.

/// Nanometres per Ångström.
pub const NM_PER_ANGSTROM: f64 = 0.1;
/// Ångströms per nanometre.
pub const ANGSTROM_PER_NM: f64 = 10.0;
/// Nanometres per Bohr radius.
pub const NM_PER_BOHR: f64 = 0.052_917_721_090_3;

/// kJ/mol per electronvolt.
pub const KJ_PER_MOL_PER_EV: f64 = 96.485_332_123_310_02;
/// kJ/mol per Hartree.
pub const KJ_PER_MOL_PER_HARTREE: f64 = 2625.499_639_479_9;

/// kJ/mol/nm per eV/Å.
pub const KJ_PER_MOL_NM_PER_EV_ANGSTROM: f64 = KJ_PER_MOL_PER_EV * ANGSTROM_PER_NM;
/// kJ/mol/nm per Hartree/Bohr.
pub const KJ_PER_MOL_NM_PER_HARTREE_BOHR: f64 = KJ_PER_MOL_PER_HARTREE / NM_PER_BOHR;
