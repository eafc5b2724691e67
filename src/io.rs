use crate::atoms::Atoms;

/// Writes the result tables, the labeled structure file and the optional
/// graph export.
pub mod output;
/// A line-oriented buffered reader shared by the file parsers.
pub mod reader;
/// Reading VASP-style volumetric files (CHGCAR, ELFCAR) and reading and
/// writing POSCAR structure files.
pub mod vasp;

/// How raw values in a volumetric file relate to the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaling {
    /// Values are field * cell volume, as in a CHGCAR; divided by the
    /// volume on read.
    PerVolume,
    /// Values are the field itself, as in an ELFCAR.
    Raw,
}

/// The contents of a volumetric file.
pub struct VolumetricData {
    pub atoms: Atoms,
    /// Voxel counts in the crate's axis order.
    pub shape: [usize; 3],
    /// One value block for a restricted calculation, two for a
    /// spin-polarized one. For a CHGCAR the two blocks are total and
    /// difference; for an ELFCAR they are the up and down channels.
    pub blocks: Vec<Vec<f64>>,
}
