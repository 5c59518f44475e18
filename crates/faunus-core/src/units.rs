//! Unit conversions. Internally: lengths in Å, energies in kT, charges in
//! elementary charges, number densities and pressures in Å⁻³.

/// Avogadro constant over 10²⁷: converts mol/l to particles per Å³.
pub const MOLAR_TO_INV_CUBIC_ANGSTROM: f64 = 6.022_140_76e-4;

/// Pressure or concentration given in mM, as a number density in Å⁻³.
pub fn millimolar_to_inv_cubic_angstrom(mm: f64) -> f64 {
    1e-3 * mm * MOLAR_TO_INV_CUBIC_ANGSTROM
}

/// Chemical activity in mol/l as a number density in Å⁻³.
pub fn molar_to_inv_cubic_angstrom(molar: f64) -> f64 {
    molar * MOLAR_TO_INV_CUBIC_ANGSTROM
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_molar_is_avogadro_per_cubic_decimeter() {
        assert!((molar_to_inv_cubic_angstrom(1.0) - 6.022_140_76e-4).abs() < 1e-12);
        assert!((millimolar_to_inv_cubic_angstrom(1000.0) - molar_to_inv_cubic_angstrom(1.0)).abs() < 1e-15);
    }
}
