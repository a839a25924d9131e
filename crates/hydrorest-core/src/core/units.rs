/// Bohr radius in Angstroms (CODATA 2018).
pub const BOHR_TO_ANGSTROM: f64 = 0.529177210903;

/// One Rydberg expressed in electron-volts (CODATA 2018).
pub const RY_TO_EV: f64 = 13.605693122994;

/// Converts an energy in electron-volts into Rydberg.
#[inline]
pub fn ev_to_ry(energy_ev: f64) -> f64 {
    energy_ev / RY_TO_EV
}

#[inline]
pub fn bohr_to_angstrom(length_bohr: f64) -> f64 {
    length_bohr * BOHR_TO_ANGSTROM
}

#[inline]
pub fn angstrom_to_bohr(length_angstrom: f64) -> f64 {
    length_angstrom / BOHR_TO_ANGSTROM
}
