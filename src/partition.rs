use crate::atoms::{Atoms, Lattice};
use crate::classify::{self, FeatureKind};
use crate::config::{AnalysisConfig, PartitionMode, SplitPolicy};
use crate::elements;
use crate::errors::{AnalysisError, Warning};
use crate::grid::{Grid, Interpolation};
use crate::segment::Segmentation;
use crate::tree::{self, BifurcationGraph};
use crate::utils;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

/// Relative tolerance of the charge conservation check.
pub const CONSERVATION_TOLERANCE: f64 = 1e-3;

/// Points sampled along a site-site segment when locating the field
/// minimum for a dividing plane.
const PLANE_SAMPLES: usize = 32;

/// What a site in the partition represents.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteKind {
    Atom { element: String },
    Feature { kind: FeatureKind, node: usize },
}

impl SiteKind {
    pub fn is_atom(&self) -> bool {
        matches!(self, SiteKind::Atom { .. })
    }

    pub fn feature_kind(&self) -> Option<FeatureKind> {
        match self {
            SiteKind::Atom { .. } => None,
            SiteKind::Feature { kind, .. } => Some(*kind),
        }
    }
}

/// Integrated quantities for one atom or non-atomic feature.
#[derive(Debug, Clone)]
pub struct SiteRecord {
    pub id: usize,
    pub kind: SiteKind,
    pub position: [f64; 3],
    /// Integrated charge of the site's own region. For a shared feature
    /// this stays on the record after its value has been apportioned to
    /// the atoms listed in `shared_with`.
    pub charge: f64,
    pub volume: f64,
    /// nominal valence - charge for atoms, -charge for features.
    pub oxidation_state: f64,
    /// Atoms that received this feature's charge; empty for atoms and for
    /// unshared features.
    pub shared_with: Vec<usize>,
    /// Set by the spin combiner when a feature exists in one channel only.
    pub spin_unpaired: bool,
}

/// The outcome of charge partitioning for one spin channel, or the merged
/// outcome across channels.
#[derive(Debug)]
pub struct PartitionResult {
    pub sites: Vec<SiteRecord>,
    /// Integral of the charge grid over the whole cell.
    pub total_integral: f64,
    /// Charge accounted for once per voxel: atoms plus unshared features.
    pub assigned_total: f64,
    pub warnings: Vec<Warning>,
}

impl PartitionResult {
    pub fn atoms(&self) -> impl Iterator<Item = &SiteRecord> {
        self.sites.iter().filter(|s| s.kind.is_atom())
    }

    pub fn features(&self) -> impl Iterator<Item = &SiteRecord> {
        self.sites.iter().filter(|s| !s.kind.is_atom())
    }
}

/// A dividing half-space; the owning site's margin is offset - d.normal
/// for d the periodic vector from the site to the probe point.
#[derive(Debug, Clone, Copy)]
struct Plane {
    normal: [f64; 3],
    offset: f64,
}

/// A partitioning site with the planes that bound its cell.
struct Site {
    position: [f64; 3],
    planes: Vec<Plane>,
}

impl Site {
    /// How deep inside this site's cell a point lies. Sites without planes
    /// compete by plain distance so they can only win as a fallback.
    fn margin(&self, lattice: &Lattice, point: [f64; 3]) -> f64 {
        let d = lattice.min_image_vector(self.position, point);
        if self.planes.is_empty() {
            return -utils::norm(d);
        }
        self.planes
            .iter()
            .map(|p| p.offset - utils::vdot(d, p.normal))
            .fold(f64::INFINITY, f64::min)
    }
}

/// The fraction along the segment, in (0, 1), where the field is lowest.
fn plane_offset(elf: &Grid, origin: [f64; 3], segment: [f64; 3]) -> f64 {
    let mut best_k = PLANE_SAMPLES / 2;
    let mut best = f64::INFINITY;
    for k in 1..PLANE_SAMPLES {
        let t = k as f64 / PLANE_SAMPLES as f64;
        let point = [
            origin[0] + t * segment[0],
            origin[1] + t * segment[1],
            origin[2] + t * segment[2],
        ];
        let value = elf.sample(
            utils::dot(point, elf.lattice.to_fractional),
            Interpolation::Trilinear,
        );
        if value < best {
            best = value;
            best_k = k;
        }
    }
    best_k as f64 / PLANE_SAMPLES as f64
}

/// Normalized shares of a feature's charge for its neighbouring atoms.
pub fn split_weights(neighbours: &[usize], atoms: &Atoms, policy: SplitPolicy) -> Vec<f64> {
    if neighbours.is_empty() {
        return Vec::new();
    }
    let equal = vec![1. / neighbours.len() as f64; neighbours.len()];
    match policy {
        SplitPolicy::EqualSplit => equal,
        SplitPolicy::Electronegativity => {
            let chi: Vec<f64> = neighbours
                .iter()
                .map(|i| {
                    elements::lookup(&atoms.symbols[*i])
                        .map(|e| e.electronegativity)
                        .unwrap_or(0.)
                })
                .collect();
            let total: f64 = chi.iter().sum();
            if total <= 0. {
                equal
            } else {
                chi.into_iter().map(|c| c / total).collect()
            }
        }
    }
}

/// Reports a conservation warning when the assigned charge has drifted from
/// the grid integral beyond the relative tolerance.
pub fn conservation_check(expected: f64, assigned: f64) -> Option<Warning> {
    if (assigned - expected).abs() > CONSERVATION_TOLERANCE * expected.abs().max(1.) {
        Some(Warning::ChargeConservation { expected, assigned })
    } else {
        None
    }
}

/// Integrates the charge grid over the classified partition and converts
/// the per-site charges into oxidation states.
pub fn partition(
    graph: &BifurcationGraph,
    segmentation: &Segmentation,
    elf: &Grid,
    charge: &Grid,
    atoms: &Atoms,
    config: &AnalysisConfig,
) -> Result<PartitionResult, AnalysisError> {
    elf.check_shape(charge)?;
    let n_atoms = atoms.len();
    // leaves are the irreducible nodes and a leaf's id is its attractor id
    let features: Vec<usize> = graph
        .irreducible()
        .filter(|n| n.kind != Some(FeatureKind::AtomicCore))
        .map(|n| n.id)
        .collect();
    let feature_site: FxHashMap<usize, usize> = features
        .iter()
        .enumerate()
        .map(|(f, node)| (*node, n_atoms + f))
        .collect();
    let n_sites = n_atoms + features.len();

    // owner site of every attractor basin
    let owners: Vec<usize> = (0..segmentation.attractors.len())
        .map(|a| {
            let node = graph.node(a);
            match feature_site.get(&a) {
                Some(site) => *site,
                None => *node
                    .contained_atoms
                    .first()
                    .unwrap_or(&node.nearest_atom),
            }
        })
        .collect();

    let mut site_charge = vec![0f64; n_sites];
    let mut site_volume = vec![0f64; n_sites];
    match config.mode {
        PartitionMode::ZeroFlux => {
            for (a, owner) in owners.iter().enumerate() {
                site_charge[*owner] += graph.node(a).charge;
                site_volume[*owner] += graph.node(a).volume;
            }
        }
        PartitionMode::VoronoiPlane => {
            integrate_plane_cells(
                graph,
                segmentation,
                elf,
                charge,
                atoms,
                config,
                &features,
                &owners,
                &mut site_charge,
                &mut site_volume,
            );
        }
        PartitionMode::Hybrid => {
            for (a, owner) in owners.iter().enumerate() {
                site_charge[*owner] += graph.node(a).charge;
                site_volume[*owner] += graph.node(a).volume;
            }
            refine_bonded_boundaries(
                segmentation,
                elf,
                charge,
                atoms,
                config,
                &owners,
                n_atoms,
                &mut site_charge,
                &mut site_volume,
            );
        }
    }

    // apportion shared features onto their neighbouring atoms
    let bonds = atoms.bond_pairs(config.bond_scale);
    let adjacency = tree::basin_saddles(elf, &segmentation.labels);
    let mut shared_with: Vec<Vec<usize>> = vec![Vec::new(); n_sites];
    for (f, node_id) in features.iter().enumerate() {
        let site = n_atoms + f;
        let node = graph.node(*node_id);
        let kind = node.kind.expect("graph must be classified before partitioning");
        let neighbours = match kind {
            FeatureKind::LonePair => vec![node.nearest_atom],
            FeatureKind::CovalentBond { .. } => {
                let position = elf.to_cartesian(node.max_voxel);
                match classify::bond_alignment(position, &bonds, atoms) {
                    Some(alignment) if alignment.atoms.0 != alignment.atoms.1 => {
                        vec![alignment.atoms.0, alignment.atoms.1]
                    }
                    Some(alignment) => vec![alignment.atoms.0],
                    None => vec![node.nearest_atom],
                }
            }
            FeatureKind::MetallicNetwork => {
                let mut neighbours =
                    adjacent_atoms(*node_id, &adjacency, &owners, n_atoms);
                if neighbours.is_empty() {
                    neighbours.push(node.nearest_atom);
                }
                neighbours
            }
            // localized bare-electron density keeps its own charge
            FeatureKind::Electride | FeatureKind::OtherBareElectron => Vec::new(),
            FeatureKind::AtomicCore => unreachable!("cores are not feature sites"),
        };
        if neighbours.is_empty() {
            continue;
        }
        let weights = split_weights(&neighbours, atoms, config.split_policy);
        for (atom, weight) in neighbours.iter().zip(weights) {
            site_charge[*atom] += weight * site_charge[site];
        }
        shared_with[site] = neighbours;
    }

    // assemble the records
    let mut sites = Vec::with_capacity(n_sites);
    for i in 0..n_atoms {
        let valence = atoms.element(i).map(|e| e.valence as f64).unwrap_or(0.);
        sites.push(SiteRecord {
            id: i,
            kind: SiteKind::Atom {
                element: atoms.symbols[i].clone(),
            },
            position: atoms.positions[i],
            charge: site_charge[i],
            volume: site_volume[i],
            oxidation_state: valence - site_charge[i],
            shared_with: Vec::new(),
            spin_unpaired: false,
        });
    }
    for (f, node_id) in features.iter().enumerate() {
        let site = n_atoms + f;
        let node = graph.node(*node_id);
        sites.push(SiteRecord {
            id: site,
            kind: SiteKind::Feature {
                kind: node.kind.expect("classified"),
                node: *node_id,
            },
            position: elf.to_cartesian(node.max_voxel),
            charge: site_charge[site],
            volume: site_volume[site],
            oxidation_state: -site_charge[site],
            shared_with: shared_with[site].clone(),
            spin_unpaired: false,
        });
    }

    let mut warnings = Vec::new();
    let mut coreless: Vec<usize> = Vec::new();
    let mut atoms_with_core: FxHashSet<usize> = FxHashSet::default();
    for node in graph.irreducible() {
        if node.kind == Some(FeatureKind::AtomicCore) {
            atoms_with_core.extend(node.contained_atoms.iter().copied());
        }
    }
    for i in 0..n_atoms {
        if !atoms_with_core.contains(&i) {
            coreless.push(i);
            warnings.push(Warning::LowPseudopotential {
                atom: i,
                element: atoms.symbols[i].clone(),
            });
        }
    }
    if config.strict_cores && !coreless.is_empty() {
        return Err(AnalysisError::MissingCores { atoms: coreless });
    }

    let total_integral = charge.integral();
    let assigned_total: f64 = sites
        .iter()
        .filter(|s| s.kind.is_atom() || s.shared_with.is_empty())
        .map(|s| s.charge)
        .sum();
    if let Some(w) = conservation_check(total_integral, assigned_total) {
        warnings.push(w);
    }

    Ok(PartitionResult {
        sites,
        total_integral,
        assigned_total,
        warnings,
    })
}

/// Atoms whose basins touch the basin of the given leaf node.
fn adjacent_atoms(
    node_id: usize,
    adjacency: &FxHashMap<(usize, usize), f64>,
    owners: &[usize],
    n_atoms: usize,
) -> Vec<usize> {
    let mut neighbours: Vec<usize> = adjacency
        .keys()
        .filter_map(|(a, b)| {
            let other = if *a == node_id {
                *b
            } else if *b == node_id {
                *a
            } else {
                return None;
            };
            (owners[other] < n_atoms).then_some(owners[other])
        })
        .collect();
    neighbours.sort_unstable();
    neighbours.dedup();
    neighbours
}

/// Full plane-cell integration for the voronoi-plane mode.
///
/// Every voxel is assigned by half-space membership over the site planes;
/// a voxel whose two best margins lie within one voxel spacing is split
/// linearly between them so the boundary does not alias to the mesh.
#[allow(clippy::too_many_arguments)]
fn integrate_plane_cells(
    graph: &BifurcationGraph,
    segmentation: &Segmentation,
    elf: &Grid,
    charge: &Grid,
    atoms: &Atoms,
    config: &AnalysisConfig,
    features: &[usize],
    owners: &[usize],
    site_charge: &mut [f64],
    site_volume: &mut [f64],
) {
    let n_atoms = atoms.len();
    let n_sites = n_atoms + features.len();
    let mut sites: Vec<Site> = atoms
        .positions
        .iter()
        .map(|p| Site {
            position: *p,
            planes: Vec::new(),
        })
        .collect();
    for node_id in features {
        sites.push(Site {
            position: elf.to_cartesian(graph.node(*node_id).max_voxel),
            planes: Vec::new(),
        });
    }

    // dividing planes along bonded atom-atom axes and feature-atom axes
    let mut pairs: Vec<(usize, usize)> = atoms
        .bond_pairs(config.bond_scale)
        .into_iter()
        .filter(|(i, j)| i != j)
        .collect();
    let adjacency = tree::basin_saddles(elf, &segmentation.labels);
    for (f, node_id) in features.iter().enumerate() {
        let site = n_atoms + f;
        let mut neighbours = adjacent_atoms(*node_id, &adjacency, owners, n_atoms);
        let nearest = graph.node(*node_id).nearest_atom;
        if !neighbours.contains(&nearest) && n_atoms > 0 {
            neighbours.push(nearest);
        }
        for atom in neighbours {
            pairs.push((atom, site));
        }
    }
    for (s, t) in pairs {
        let v = elf
            .lattice
            .min_image_vector(sites[s].position, sites[t].position);
        let length = utils::norm(v);
        if length < 1e-8 {
            continue;
        }
        let normal = [v[0] / length, v[1] / length, v[2] / length];
        let lambda = plane_offset(elf, sites[s].position, v);
        sites[s].planes.push(Plane {
            normal,
            offset: lambda * length,
        });
        sites[t].planes.push(Plane {
            normal: [-normal[0], -normal[1], -normal[2]],
            offset: (1. - lambda) * length,
        });
    }

    let width = elf
        .voxel_lattice
        .a
        .min(elf.voxel_lattice.b)
        .min(elf.voxel_lattice.c);
    let voxel_volume = elf.voxel_lattice.volume;
    let lattice = &elf.lattice;
    let sites = &sites;
    let (charges, volumes) = (0..elf.size.total as isize)
        .into_par_iter()
        .fold(
            || (vec![0f64; n_sites], vec![0f64; n_sites]),
            |(mut c_acc, mut v_acc), p| {
                let point = elf.to_cartesian(p);
                let mut best = 0usize;
                let mut best_margin = f64::NEG_INFINITY;
                let mut second = 0usize;
                let mut second_margin = f64::NEG_INFINITY;
                for (s, site) in sites.iter().enumerate() {
                    let margin = site.margin(lattice, point);
                    if margin > best_margin {
                        second = best;
                        second_margin = best_margin;
                        best = s;
                        best_margin = margin;
                    } else if margin > second_margin {
                        second = s;
                        second_margin = margin;
                    }
                }
                let value = charge[p] * voxel_volume;
                let gap = best_margin - second_margin;
                if n_sites > 1 && gap < width {
                    let w = 0.5 + gap / (2. * width);
                    c_acc[best] += w * value;
                    v_acc[best] += w * voxel_volume;
                    c_acc[second] += (1. - w) * value;
                    v_acc[second] += (1. - w) * voxel_volume;
                } else {
                    c_acc[best] += value;
                    v_acc[best] += voxel_volume;
                }
                (c_acc, v_acc)
            },
        )
        .reduce(
            || (vec![0f64; n_sites], vec![0f64; n_sites]),
            |(mut ca, mut va), (cb, vb)| {
                for (a, b) in ca.iter_mut().zip(cb) {
                    *a += b;
                }
                for (a, b) in va.iter_mut().zip(vb) {
                    *a += b;
                }
                (ca, va)
            },
        );
    site_charge.copy_from_slice(&charges);
    site_volume.copy_from_slice(&volumes);
}

/// Hybrid-mode refinement: boundary voxels between the basins of bonded
/// atoms are re-split by the plane at the bond saddle; everything else
/// keeps its zero-flux assignment.
#[allow(clippy::too_many_arguments)]
fn refine_bonded_boundaries(
    segmentation: &Segmentation,
    elf: &Grid,
    charge: &Grid,
    atoms: &Atoms,
    config: &AnalysisConfig,
    owners: &[usize],
    n_atoms: usize,
    site_charge: &mut [f64],
    site_volume: &mut [f64],
) {
    let bonded: FxHashSet<(usize, usize)> = atoms
        .bond_pairs(config.bond_scale)
        .into_iter()
        .filter(|(i, j)| i != j)
        .collect();
    let labels = &segmentation.labels;
    // voxel -> (own atom, partner atom), first qualifying pair wins
    let mut boundary: FxHashMap<isize, (usize, usize)> = FxHashMap::default();
    for p in 0..elf.size.total as isize {
        let own = owners[labels[p as usize]];
        if own >= n_atoms {
            continue;
        }
        for q in elf.neighbours(p) {
            let other = owners[labels[q as usize]];
            if other >= n_atoms || other == own {
                continue;
            }
            if bonded.contains(&(own.min(other), own.max(other))) {
                boundary.entry(p).or_insert((own, other));
                break;
            }
        }
    }
    let mut boundary: Vec<(isize, (usize, usize))> = boundary.into_iter().collect();
    boundary.sort_unstable_by_key(|(p, _)| *p);
    let mut planes: FxHashMap<(usize, usize), Plane> = FxHashMap::default();
    let width = elf
        .voxel_lattice
        .a
        .min(elf.voxel_lattice.b)
        .min(elf.voxel_lattice.c);
    let voxel_volume = elf.voxel_lattice.volume;
    for (p, (own, other)) in boundary {
        // the plane is anchored on the lower-numbered atom of the pair
        let key = (own.min(other), own.max(other));
        let plane = planes.entry(key).or_insert_with(|| {
            let v = elf
                .lattice
                .min_image_vector(atoms.positions[key.0], atoms.positions[key.1]);
            let length = utils::norm(v);
            let normal = [v[0] / length, v[1] / length, v[2] / length];
            let lambda = plane_offset(elf, atoms.positions[key.0], v);
            Plane {
                normal,
                offset: lambda * length,
            }
        });
        let d = elf
            .lattice
            .min_image_vector(atoms.positions[key.0], elf.to_cartesian(p));
        // signed distance past the plane, positive on the far side
        let s = utils::vdot(d, plane.normal) - plane.offset;
        let anchor_weight = (0.5 - s / width).clamp(0., 1.);
        let own_weight = if own == key.0 {
            anchor_weight
        } else {
            1. - anchor_weight
        };
        let value = charge[p] * voxel_volume;
        site_charge[own] -= value * (1. - own_weight);
        site_volume[own] -= voxel_volume * (1. - own_weight);
        site_charge[other] += value * (1. - own_weight);
        site_volume[other] += voxel_volume * (1. - own_weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;

    fn nacl_pair() -> Atoms {
        Atoms::new(
            Lattice::new([[10., 0., 0.], [0., 10., 0.], [0., 0., 10.]]).unwrap(),
            vec![[2., 5., 5.], [6., 5., 5.]],
            vec![String::from("Na"), String::from("Cl")],
        )
    }

    #[test]
    fn split_equal() {
        let atoms = nacl_pair();
        let weights = split_weights(&[0, 1], &atoms, SplitPolicy::EqualSplit);
        assert_eq!(weights, vec![0.5, 0.5]);
    }

    #[test]
    fn split_electronegativity_favours_chlorine() {
        let atoms = nacl_pair();
        let weights = split_weights(&[0, 1], &atoms, SplitPolicy::Electronegativity);
        assert!((weights.iter().sum::<f64>() - 1.).abs() < 1e-12);
        assert!(weights[1] > weights[0]);
    }

    #[test]
    fn split_unknown_elements_fall_back_to_equal() {
        let atoms = Atoms::new(
            Lattice::new([[10., 0., 0.], [0., 10., 0.], [0., 0., 10.]]).unwrap(),
            vec![[1., 1., 1.], [3., 3., 3.]],
            vec![String::from("Qq"), String::from("Zz")],
        );
        let weights = split_weights(&[0, 1], &atoms, SplitPolicy::Electronegativity);
        assert_eq!(weights, vec![0.5, 0.5]);
    }

    #[test]
    fn conservation_within_tolerance() {
        assert!(conservation_check(8.0, 8.0000001).is_none());
    }

    #[test]
    fn conservation_violated() {
        let warning = conservation_check(8.0, 7.5).unwrap();
        assert!(matches!(warning, Warning::ChargeConservation { .. }));
    }

    #[test]
    fn plane_offset_finds_the_dip() {
        // field dips a quarter of the way along x
        let n = 32usize;
        let mut data = vec![0.; n * 2 * 2];
        for x in 0..n {
            let v = 1. + ((x as f64 / n as f64) * std::f64::consts::TAU).sin();
            for yz in 0..4 {
                data[x * 4 + yz] = v;
            }
        }
        let grid = Grid::new(
            data,
            [n, 2, 2],
            [[8., 0., 0.], [0., 1., 0.], [0., 0., 1.]],
            [0., 0., 0.],
        )
        .unwrap();
        // minimum of 1 + sin(2 pi t) sits at t = 0.75
        let lambda = plane_offset(&grid, [0., 0., 0.], [8., 0., 0.]);
        assert!((lambda - 0.75).abs() < 0.1);
    }

    #[test]
    fn site_margin_without_planes_is_distance() {
        let lattice = Lattice::new([[10., 0., 0.], [0., 10., 0.], [0., 0., 10.]]).unwrap();
        let site = Site {
            position: [1., 1., 1.],
            planes: Vec::new(),
        };
        assert!((site.margin(&lattice, [4., 1., 1.]) + 3.).abs() < 1e-12);
    }

    #[test]
    fn site_margin_takes_worst_plane() {
        let lattice = Lattice::new([[10., 0., 0.], [0., 10., 0.], [0., 0., 10.]]).unwrap();
        let site = Site {
            position: [0., 0., 0.],
            planes: vec![
                Plane {
                    normal: [1., 0., 0.],
                    offset: 3.,
                },
                Plane {
                    normal: [0., 1., 0.],
                    offset: 1.,
                },
            ],
        };
        // x margin is 2, y margin is 0.5
        assert!((site.margin(&lattice, [1., 0.5, 0.]) - 0.5).abs() < 1e-12);
    }
}
