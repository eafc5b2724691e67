use crate::errors::AnalysisError;

/// How charge is divided between basins at their boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionMode {
    /// Basin labels are used as-is; every voxel belongs wholly to the basin
    /// its ascent path terminates in.
    #[default]
    ZeroFlux,
    /// Planes placed at the field minimum along each neighbouring site-site
    /// axis decide ownership by half-space membership.
    VoronoiPlane,
    /// Zero-flux everywhere except the boundary between bonded atomic
    /// domains, which is refined by the bond-saddle plane.
    Hybrid,
}

/// How the charge of a shared feature is divided between its bonded atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitPolicy {
    /// Every bonded neighbour receives the same share.
    #[default]
    EqualSplit,
    /// Shares proportional to Pauling electronegativity, so the more
    /// electronegative neighbour receives more of the charge.
    Electronegativity,
}

/// All tunable values of an analysis run.
///
/// Every field has a usable default; `check` validates bounds before the
/// pipeline starts so bad values fail fast instead of surfacing as strange
/// classifications halfway through.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Step of the iso-value sweep. Bifurcations closer together than this
    /// are treated as one simultaneous n-way split.
    pub resolution: f64,
    /// Maximum birth threshold for a node to count as an atomic core.
    pub shell_depth: f64,
    /// Depth below which a valence node is part of a metallic network.
    pub metal_depth_cutoff: f64,
    /// Minimum atom-attractor-atom angle, in degrees, for a feature to lie
    /// on a bond axis.
    pub min_covalent_angle: f64,
    /// Maximum (d_a + d_b) / d_ab for an on-axis feature.
    pub min_covalent_bond_ratio: f64,
    /// Electride gate: minimum value of the topological field at the maximum.
    pub electride_elf_min: f64,
    /// Electride gate: minimum depth.
    pub electride_depth_min: f64,
    /// Electride gate: minimum integrated charge.
    pub electride_charge_min: f64,
    /// Electride gate: minimum basin volume in cubic angstrom.
    pub electride_volume_min: f64,
    /// Electride gate: minimum distance to the nearest atom in angstrom.
    pub electride_radius_min: f64,
    /// Charge partitioning mode.
    pub mode: PartitionMode,
    /// Shared-feature apportioning policy.
    pub split_policy: SplitPolicy,
    /// Bond detection scale: atoms bond when closer than
    /// bond_scale * (r_i + r_j).
    pub bond_scale: f64,
    /// Downscale both grids to at most this many voxels before analysis.
    pub max_voxels: Option<usize>,
    /// Escalate a missing atomic core from a warning to a fatal error.
    pub strict_cores: bool,
    /// Worker threads; 0 picks the logical CPU count.
    pub threads: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            resolution: 0.01,
            shell_depth: 0.2,
            metal_depth_cutoff: 0.05,
            min_covalent_angle: 150.0,
            min_covalent_bond_ratio: 1.08,
            electride_elf_min: 0.5,
            electride_depth_min: 0.17,
            electride_charge_min: 0.45,
            electride_volume_min: 19.0,
            electride_radius_min: 1.19,
            mode: PartitionMode::ZeroFlux,
            split_policy: SplitPolicy::EqualSplit,
            bond_scale: 1.2,
            max_voxels: None,
            strict_cores: false,
            threads: 0,
        }
    }
}

impl AnalysisConfig {
    /// Validates the bounds of every field.
    pub fn check(&self) -> Result<(), AnalysisError> {
        if !(self.resolution > 0.0) {
            return Err(AnalysisError::Config(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !(self.bond_scale > 0.0) {
            return Err(AnalysisError::Config(format!(
                "bond_scale must be positive, got {}",
                self.bond_scale
            )));
        }
        if !(self.min_covalent_angle > 0.0 && self.min_covalent_angle <= 180.0) {
            return Err(AnalysisError::Config(format!(
                "min_covalent_angle must lie in (0, 180], got {}",
                self.min_covalent_angle
            )));
        }
        if !(self.min_covalent_bond_ratio >= 1.0) {
            return Err(AnalysisError::Config(format!(
                "min_covalent_bond_ratio cannot be below 1, got {}",
                self.min_covalent_bond_ratio
            )));
        }
        for (name, value) in [
            ("shell_depth", self.shell_depth),
            ("metal_depth_cutoff", self.metal_depth_cutoff),
            ("electride_elf_min", self.electride_elf_min),
            ("electride_depth_min", self.electride_depth_min),
            ("electride_charge_min", self.electride_charge_min),
            ("electride_volume_min", self.electride_volume_min),
            ("electride_radius_min", self.electride_radius_min),
        ] {
            if !(value >= 0.0) {
                return Err(AnalysisError::Config(format!(
                    "{} cannot be negative, got {}",
                    name, value
                )));
            }
        }
        if let Some(v) = self.max_voxels {
            if v < 8 {
                return Err(AnalysisError::Config(format!(
                    "max_voxels of {} leaves no grid to analyse",
                    v
                )));
            }
        }
        Ok(())
    }

    /// The worker thread count after resolving the automatic setting.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_valid() {
        assert!(AnalysisConfig::default().check().is_ok());
    }

    #[test]
    fn config_rejects_zero_resolution() {
        let config = AnalysisConfig {
            resolution: 0.0,
            ..Default::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn config_rejects_nan_cutoff() {
        let config = AnalysisConfig {
            shell_depth: f64::NAN,
            ..Default::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn config_rejects_wide_angle() {
        let config = AnalysisConfig {
            min_covalent_angle: 200.0,
            ..Default::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn config_rejects_tiny_downscale() {
        let config = AnalysisConfig {
            max_voxels: Some(4),
            ..Default::default()
        };
        assert!(config.check().is_err());
    }
}
