//! A multi-threaded topological partitioning engine for ELF-based charge
//! analysis. The topological field is segmented into basins around its
//! local maxima with a grid-based steepest-ascent method in the manner of
//! [W. Tang et al. 2009 J. Phys.: Condens. Matter 21 084204], a bifurcation
//! hierarchy is swept out of the basin watershed saddles, the resulting
//! features are classified (atomic cores, lone pairs, covalent bonds,
//! metallic networks, electrides) and a second field, the charge density,
//! is integrated over the partitions to give per-atom and per-feature
//! oxidation states.
//!
//! ## Installing the binary
//! ### From Source
//! The following creates the ./target/release/elfa executable.
//! ```sh
//! $ cargo build --release
//! ```
//!
//! ## Usage
//! The program takes an ELF file and a charge density file in the VASP
//! format and analyses the topology of the ELF:
//! ```sh
//! $ elfa ELFCAR -c CHGCAR
//! ```
//! Spin-polarized files are analysed one channel at a time and the two
//! reports merged; pass --no-spin to analyse the total field instead.
//! Dense grids can be bounded with the --downscale knob:
//! ```sh
//! $ elfa ELFCAR -c CHGCAR -d 1000000
//! ```
//! For a detailed list of options run
//! ```sh
//! $ elfa --help
//! ```
//!
//! ## Output
//! The program writes the per-atom charge file (ACF.dat), the per-feature
//! charge file (FCF.dat) and a labeled structure (labeled_POSCAR) in which
//! every non-atomic feature appears as a dummy site. The bifurcation
//! hierarchy can additionally be exported as JSON with --graph for
//! external plotting.
//!
//! ## License
//! MIT
//!
//! [W. Tang et al. 2009 J. Phys.: Condens. Matter 21 084204]: <https://doi.org/10.1088/0953-8984/21/8/084204>

/// Orchestrates the pipeline: segmentation, hierarchy, classification,
/// integration and the spin-channel merge.
pub mod analysis;
/// For parsing command-line arguments.
pub mod arguments;
/// Contains [Atoms](atoms::Atoms) and [Lattice](atoms::Lattice) for the
/// structure the fields are defined over.
pub mod atoms;
/// Tags irreducible nodes of the hierarchy with a
/// [FeatureKind](classify::FeatureKind) through an ordered rule table.
pub mod classify;
/// The validated [AnalysisConfig](config::AnalysisConfig) holding every
/// cutoff with its default.
pub mod config;
/// Reference data per element: valence, electronegativity, covalent radius.
pub mod elements;
/// Fatal errors and accumulated warnings.
pub mod errors;
/// Contains [Grid](grid::Grid), the periodic scalar field the analysis
/// runs over.
pub mod grid;
/// Handles the file I/O for the density files and the result files.
pub mod io;
/// Integrates the charge field over the classified partition and converts
/// charges to oxidation states.
pub mod partition;
/// Provides a thread-safe progress [Bar](progress::Bar).
pub mod progress;
/// Assigns every voxel to the basin of a local maximum by steepest ascent.
pub mod segment;
/// Merges the partition results of two spin channels.
pub mod spin;
/// The [LabeledStructure](structure::LabeledStructure): atoms plus dummy
/// sites for the non-atomic features.
pub mod structure;
/// Builds the [BifurcationGraph](tree::BifurcationGraph) from the basin
/// watershed saddles.
pub mod tree;
/// Misc functions mainly for vector and matrix manipulation.
pub mod utils;
