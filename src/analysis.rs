use crate::atoms::Atoms;
use crate::classify;
use crate::config::AnalysisConfig;
use crate::errors::AnalysisError;
use crate::grid::Grid;
use crate::partition::{self, PartitionResult};
use crate::progress::Bar;
use crate::segment;
use crate::spin;
use crate::structure::LabeledStructure;
use crate::tree::{self, BifurcationGraph};
use crossbeam_utils::thread;

/// The grids an analysis runs over.
pub enum SpinInput {
    /// One topological field and one integration field.
    Restricted { elf: Grid, charge: Grid },
    /// Separate fields per spin channel; the channels run as two
    /// independent pipelines and are merged afterwards.
    Polarized {
        elf_up: Grid,
        charge_up: Grid,
        elf_down: Grid,
        charge_down: Grid,
    },
}

/// Everything one analysis run produces.
#[derive(Debug)]
pub struct AnalysisOutcome {
    /// Per-site charges, volumes and oxidation states, with accumulated
    /// warnings.
    pub result: PartitionResult,
    /// The atoms plus dummy sites for the non-atomic features.
    pub structure: LabeledStructure,
    /// The bifurcation hierarchy of the restricted run, or of the up
    /// channel when spin-polarized.
    pub graph: BifurcationGraph,
    /// The down channel hierarchy for spin-polarized runs.
    pub down_graph: Option<BifurcationGraph>,
}

/// Runs the full pipeline: segmentation, hierarchy construction,
/// classification, charge integration and, for polarized input, the
/// channel merge.
pub fn run(
    input: SpinInput,
    atoms: &Atoms,
    config: &AnalysisConfig,
    show_progress: bool,
) -> Result<AnalysisOutcome, AnalysisError> {
    config.check()?;
    match input {
        SpinInput::Restricted { elf, charge } => {
            let (result, graph) = run_channel(&elf, &charge, atoms, config, "", show_progress)?;
            let structure = LabeledStructure::from_partition(atoms, &result);
            Ok(AnalysisOutcome {
                result,
                structure,
                graph,
                down_graph: None,
            })
        }
        SpinInput::Polarized {
            elf_up,
            charge_up,
            elf_down,
            charge_down,
        } => {
            let match_tolerance = 2.
                * elf_up
                    .voxel_lattice
                    .a
                    .max(elf_up.voxel_lattice.b)
                    .max(elf_up.voxel_lattice.c);
            // the channels share nothing mutable and run concurrently
            let (up, down) = thread::scope(|s| {
                let up_handle = s.spawn(|_| {
                    run_channel(&elf_up, &charge_up, atoms, config, "up ", show_progress)
                });
                let down =
                    run_channel(&elf_down, &charge_down, atoms, config, "down ", show_progress);
                let up = up_handle.join().expect("up channel thread panicked");
                (up, down)
            })
            .expect("failed to join spin channel threads");
            let (up_result, up_graph) = up?;
            let (down_result, down_graph) = down?;
            let result = spin::combine(up_result, down_result, atoms, match_tolerance);
            let structure = LabeledStructure::from_partition(atoms, &result);
            Ok(AnalysisOutcome {
                result,
                structure,
                graph: up_graph,
                down_graph: Some(down_graph),
            })
        }
    }
}

/// One pipeline pass over a single pair of grids.
fn run_channel(
    elf: &Grid,
    charge: &Grid,
    atoms: &Atoms,
    config: &AnalysisConfig,
    label: &str,
    show_progress: bool,
) -> Result<(PartitionResult, BifurcationGraph), AnalysisError> {
    elf.check_shape(charge)?;
    let downscaled;
    let (elf, charge) = match config.max_voxels {
        Some(target) => {
            downscaled = (elf.downscale(target)?, charge.downscale(target)?);
            (&downscaled.0, &downscaled.1)
        }
        None => (elf, charge),
    };
    let bar = |prefix: &str| {
        let prefix = format!("{}{}", label, prefix);
        if show_progress {
            Bar::visible(elf.size.total as u64, 100, prefix)
        } else {
            Bar::new(elf.size.total as u64, 100, prefix)
        }
    };
    let segmentation = segment::segment(elf, config.effective_threads(), &bar("segmentation: "))?;
    let mut graph = tree::build(elf, charge, &segmentation, atoms, config.resolution);
    let warnings = classify::classify(&mut graph, elf, atoms, config);
    let mut result = partition::partition(&graph, &segmentation, elf, charge, atoms, config)?;
    result.warnings.splice(0..0, warnings);
    Ok((result, graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;
    use crate::classify::FeatureKind;

    /// A cubic cell holding two ions with clean spherical field maxima.
    fn ionic_inputs() -> (Grid, Grid, Atoms) {
        let n = 14usize;
        let a = 5.6;
        let centres = [[0., 0., 0.], [a / 2., a / 2., a / 2.]];
        let mut elf = vec![0.01; n * n * n];
        let mut charge = vec![0.; n * n * n];
        let step = a / n as f64;
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    let r = [x as f64 * step, y as f64 * step, z as f64 * step];
                    let p = (x * n + y) * n + z;
                    for (c, centre) in centres.iter().enumerate() {
                        let mut d2 = 0.;
                        for k in 0..3 {
                            let d = (r[k] - centre[k]).rem_euclid(a);
                            d2 += d.min(a - d).powi(2);
                        }
                        elf[p] += 0.9 * (-d2 / 0.8).exp();
                        // sodium keeps nothing, chlorine holds eight electrons
                        let weight = if c == 0 { 0. } else { 8. };
                        charge[p] += weight * (-d2 / 0.5).exp();
                    }
                }
            }
        }
        let lattice = [[a, 0., 0.], [0., a, 0.], [0., 0., a]];
        let total: f64 = charge.iter().sum::<f64>() * (a / n as f64).powi(3);
        // normalize the cell to exactly eight electrons
        for v in &mut charge {
            *v *= 8. / total;
        }
        let elf = Grid::new(elf, [n, n, n], lattice, [0., 0., 0.]).unwrap();
        let charge = Grid::new(charge, [n, n, n], lattice, [0., 0., 0.]).unwrap();
        let atoms = Atoms::new(
            Lattice::new(lattice).unwrap(),
            vec![[0., 0., 0.], [a / 2., a / 2., a / 2.]],
            vec![String::from("Na"), String::from("Cl")],
        );
        (elf, charge, atoms)
    }

    #[test]
    fn analysis_restricted_ionic_run() {
        let (elf, charge, atoms) = ionic_inputs();
        let outcome = run(
            SpinInput::Restricted { elf, charge },
            &atoms,
            &AnalysisConfig::default(),
            false,
        )
        .unwrap();
        let cores = outcome
            .graph
            .irreducible()
            .filter(|n| n.kind == Some(FeatureKind::AtomicCore))
            .count();
        assert_eq!(cores, 2);
        assert_eq!(outcome.structure.site_count(), 2);
        assert!((outcome.result.assigned_total - outcome.result.total_integral).abs() < 1e-6);
    }

    #[test]
    fn analysis_rejects_mismatched_grids() {
        let (elf, _, atoms) = ionic_inputs();
        let charge = Grid::new(
            vec![1.; 8],
            [2, 2, 2],
            [[5.6, 0., 0.], [0., 5.6, 0.], [0., 0., 5.6]],
            [0., 0., 0.],
        )
        .unwrap();
        let err = run(
            SpinInput::Restricted { elf, charge },
            &atoms,
            &AnalysisConfig::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::GridMismatch { .. }));
    }

    #[test]
    fn analysis_polarized_doubles_the_atom_charge() {
        let (elf, charge, atoms) = ionic_inputs();
        let (elf2, charge2, _) = ionic_inputs();
        let restricted = run(
            SpinInput::Restricted {
                elf: Grid::new(
                    elf.values().to_vec(),
                    elf.shape(),
                    elf.lattice.to_cartesian,
                    [0., 0., 0.],
                )
                .unwrap(),
                charge: Grid::new(
                    charge.values().to_vec(),
                    charge.shape(),
                    charge.lattice.to_cartesian,
                    [0., 0., 0.],
                )
                .unwrap(),
            },
            &atoms,
            &AnalysisConfig::default(),
            false,
        )
        .unwrap();
        let polarized = run(
            SpinInput::Polarized {
                elf_up: elf,
                charge_up: charge,
                elf_down: elf2,
                charge_down: charge2,
            },
            &atoms,
            &AnalysisConfig::default(),
            false,
        )
        .unwrap();
        assert!(polarized.down_graph.is_some());
        for (merged, single) in polarized.result.sites.iter().zip(&restricted.result.sites) {
            assert!((merged.charge - 2. * single.charge).abs() < 1e-9);
        }
    }
}
