/// Per-element reference data used when converting integrated charges into
/// oxidation states and when detecting bonded atom pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementData {
    /// Chemical symbol as it appears in a structure file.
    pub symbol: &'static str,
    /// Atomic number.
    pub number: u8,
    /// Electrons in the valence shell of the neutral atom. The oxidation
    /// state of an atom is this count minus its integrated charge.
    pub valence: u8,
    /// Pauling electronegativity. Zero for species without a tabulated
    /// value (noble gases); the charge splitter falls back to an equal
    /// split when all neighbours are untabulated.
    pub electronegativity: f64,
    /// Covalent radius in angstrom.
    pub covalent_radius: f64,
}

impl ElementData {
    /// Electrons not counted as valence.
    pub fn core_electrons(&self) -> u8 {
        self.number - self.valence
    }
}

/// Looks up an element by symbol. Case sensitive, standard capitalisation.
pub fn lookup(symbol: &str) -> Option<&'static ElementData> {
    ELEMENTS.iter().find(|e| e.symbol == symbol)
}

macro_rules! element {
    ($sym:literal, $z:literal, $val:literal, $en:literal, $r:literal) => {
        ElementData {
            symbol: $sym,
            number: $z,
            valence: $val,
            electronegativity: $en,
            covalent_radius: $r,
        }
    };
}

/// Valence counts follow the group valence convention, electronegativities
/// are Pauling values and radii are the Cordero covalent radii.
pub const ELEMENTS: &[ElementData] = &[
    element!("H", 1, 1, 2.20, 0.31),
    element!("He", 2, 2, 0.0, 0.28),
    element!("Li", 3, 1, 0.98, 1.28),
    element!("Be", 4, 2, 1.57, 0.96),
    element!("B", 5, 3, 2.04, 0.84),
    element!("C", 6, 4, 2.55, 0.76),
    element!("N", 7, 5, 3.04, 0.71),
    element!("O", 8, 6, 3.44, 0.66),
    element!("F", 9, 7, 3.98, 0.57),
    element!("Ne", 10, 8, 0.0, 0.58),
    element!("Na", 11, 1, 0.93, 1.66),
    element!("Mg", 12, 2, 1.31, 1.41),
    element!("Al", 13, 3, 1.61, 1.21),
    element!("Si", 14, 4, 1.90, 1.11),
    element!("P", 15, 5, 2.19, 1.07),
    element!("S", 16, 6, 2.58, 1.05),
    element!("Cl", 17, 7, 3.16, 1.02),
    element!("Ar", 18, 8, 0.0, 1.06),
    element!("K", 19, 1, 0.82, 2.03),
    element!("Ca", 20, 2, 1.00, 1.76),
    element!("Sc", 21, 3, 1.36, 1.70),
    element!("Ti", 22, 4, 1.54, 1.60),
    element!("V", 23, 5, 1.63, 1.53),
    element!("Cr", 24, 6, 1.66, 1.39),
    element!("Mn", 25, 7, 1.55, 1.39),
    element!("Fe", 26, 8, 1.83, 1.32),
    element!("Co", 27, 9, 1.88, 1.26),
    element!("Ni", 28, 10, 1.91, 1.24),
    element!("Cu", 29, 11, 1.90, 1.32),
    element!("Zn", 30, 12, 1.65, 1.22),
    element!("Ga", 31, 3, 1.81, 1.22),
    element!("Ge", 32, 4, 2.01, 1.20),
    element!("As", 33, 5, 2.18, 1.19),
    element!("Se", 34, 6, 2.55, 1.20),
    element!("Br", 35, 7, 2.96, 1.20),
    element!("Kr", 36, 8, 3.00, 1.16),
    element!("Rb", 37, 1, 0.82, 2.20),
    element!("Sr", 38, 2, 0.95, 1.95),
    element!("Y", 39, 3, 1.22, 1.90),
    element!("Zr", 40, 4, 1.33, 1.75),
    element!("Nb", 41, 5, 1.60, 1.64),
    element!("Mo", 42, 6, 2.16, 1.54),
    element!("Tc", 43, 7, 1.90, 1.47),
    element!("Ru", 44, 8, 2.20, 1.46),
    element!("Rh", 45, 9, 2.28, 1.42),
    element!("Pd", 46, 10, 2.20, 1.39),
    element!("Ag", 47, 11, 1.93, 1.45),
    element!("Cd", 48, 12, 1.69, 1.44),
    element!("In", 49, 3, 1.78, 1.42),
    element!("Sn", 50, 4, 1.96, 1.39),
    element!("Sb", 51, 5, 2.05, 1.39),
    element!("Te", 52, 6, 2.10, 1.38),
    element!("I", 53, 7, 2.66, 1.39),
    element!("Xe", 54, 8, 2.60, 1.40),
    element!("Cs", 55, 1, 0.79, 2.44),
    element!("Ba", 56, 2, 0.89, 2.15),
    element!("La", 57, 3, 1.10, 2.07),
    element!("W", 74, 6, 2.36, 1.62),
    element!("Pt", 78, 10, 2.28, 1.36),
    element!("Au", 79, 11, 2.54, 1.36),
    element!("Hg", 80, 12, 2.00, 1.32),
    element!("Pb", 82, 4, 2.33, 1.46),
    element!("Bi", 83, 5, 2.02, 1.48),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_lookup() {
        let cl = lookup("Cl").unwrap();
        assert_eq!(cl.number, 17);
        assert_eq!(cl.valence, 7);
        assert_eq!(cl.core_electrons(), 10);
    }

    #[test]
    fn elements_lookup_unknown() {
        assert!(lookup("Xx").is_none());
    }

    #[test]
    fn elements_electronegativity_ordering() {
        // fluorine tops the scale, caesium sits near the bottom
        let f = lookup("F").unwrap().electronegativity;
        let cs = lookup("Cs").unwrap().electronegativity;
        assert!(f > 3.9);
        assert!(cs < 0.9);
    }
}
