use thiserror::Error;

/// Fatal errors. Any of these aborts the pipeline before partial results
/// are produced.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The topological and integration grids have different voxel counts.
    #[error("grid mismatch: expected {expected:?} voxels, found {found:?}")]
    GridMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },

    /// Every voxel holds the same value so no ascent direction exists and
    /// maxima cannot be told apart.
    #[error("degenerate field: all {total} voxels hold the value {value:e}")]
    DegenerateAttractors { value: f64, total: usize },

    /// A configuration value failed its bounds check.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Atoms without a detected core, escalated from a warning by
    /// the strict_cores flag.
    #[error("no atomic core detected for atoms {atoms:?}")]
    MissingCores { atoms: Vec<usize> },

    /// The lattice matrix could not be inverted.
    #[error("bad lattice: {0}")]
    Lattice(String),
}

/// Non-fatal findings. These are accumulated during a run and returned
/// alongside the results rather than raised.
#[derive(Debug, Clone, Error)]
pub enum Warning {
    /// An irreducible node matched none of the classifier rules and was
    /// tagged as a bare electron. The attributes that failed to match are
    /// kept for inspection.
    #[error("node {node} matched no classification rule ({facts}); tagged as bare electron")]
    UnclassifiableNode { node: usize, facts: String },

    /// The summed charges drifted from the grid integral beyond tolerance.
    #[error("charge conservation violated: grid integral {expected:.6} but {assigned:.6} assigned")]
    ChargeConservation { expected: f64, assigned: f64 },

    /// No atomic-core node encloses this atom; the density near it may be
    /// missing core states.
    #[error("no atomic core detected around atom {atom} ({element})")]
    LowPseudopotential { atom: usize, element: String },

    /// The spin channels disagree on the number of non-atomic features.
    #[error("spin channels disagree: {up} features in the up channel, {down} in the down")]
    SpinStructure { up: usize, down: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_mismatch() {
        let e = AnalysisError::GridMismatch {
            expected: [10, 10, 10],
            found: [10, 10, 12],
        };
        let text = format!("{}", e);
        assert!(text.contains("[10, 10, 10]"));
        assert!(text.contains("[10, 10, 12]"));
    }

    #[test]
    fn warnings_display_conservation() {
        let w = Warning::ChargeConservation {
            expected: 8.0,
            assigned: 7.5,
        };
        assert!(format!("{}", w).contains("8.000000"));
    }
}
