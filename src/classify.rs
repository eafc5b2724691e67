use crate::atoms::Atoms;
use crate::config::AnalysisConfig;
use crate::errors::Warning;
use crate::grid::Grid;
use crate::tree::BifurcationGraph;
use crate::utils;
use serde::Serialize;

/// The closed set of feature classifications for irreducible nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeatureKind {
    /// Core and shell density surrounding exactly one atom.
    AtomicCore,
    /// Localized valence density attached to a single atom, off any bond
    /// axis.
    LonePair,
    /// Valence density on a bond axis, shared between two atoms.
    CovalentBond { homogeneous: bool },
    /// Shallow delocalized valence density.
    MetallicNetwork,
    /// Localized off-atom density passing every electride gate.
    Electride,
    /// Off-atom density that passed no rule; the conservative fallback.
    OtherBareElectron,
}

impl FeatureKind {
    /// Species label used for dummy sites in exported structures.
    pub fn label(&self) -> &'static str {
        match self {
            FeatureKind::AtomicCore => "XC",
            FeatureKind::LonePair => "XL",
            FeatureKind::CovalentBond { homogeneous: true } => "XB",
            FeatureKind::CovalentBond { homogeneous: false } => "XP",
            FeatureKind::MetallicNetwork => "XM",
            FeatureKind::Electride => "XE",
            FeatureKind::OtherBareElectron => "XO",
        }
    }

    /// Human readable name for result tables.
    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::AtomicCore => "atomic core",
            FeatureKind::LonePair => "lone pair",
            FeatureKind::CovalentBond { homogeneous: true } => "covalent bond",
            FeatureKind::CovalentBond { homogeneous: false } => "polar covalent bond",
            FeatureKind::MetallicNetwork => "metallic network",
            FeatureKind::Electride => "electride",
            FeatureKind::OtherBareElectron => "bare electron",
        }
    }

    /// Inverse of `label`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "XC" => Some(FeatureKind::AtomicCore),
            "XL" => Some(FeatureKind::LonePair),
            "XB" => Some(FeatureKind::CovalentBond { homogeneous: true }),
            "XP" => Some(FeatureKind::CovalentBond { homogeneous: false }),
            "XM" => Some(FeatureKind::MetallicNetwork),
            "XE" => Some(FeatureKind::Electride),
            "XO" => Some(FeatureKind::OtherBareElectron),
            _ => None,
        }
    }
}

/// Geometric relation between a node position and the best-aligned bond.
#[derive(Debug, Clone)]
pub struct BondAlignment {
    /// Angle in degrees subtended at the node by the two bonded atoms;
    /// 180 puts the node exactly on the bond axis.
    pub angle: f64,
    /// (d_a + d_b) / d_ab; 1 puts the node exactly between the atoms.
    pub ratio: f64,
    /// Whether the bonded atoms share an element.
    pub homogeneous: bool,
    pub atoms: (usize, usize),
}

/// Everything a classification rule may inspect. Pure data, so rules can be
/// exercised without building a graph.
#[derive(Debug, Clone)]
pub struct NodeFacts {
    pub node: usize,
    pub birth: f64,
    pub depth: f64,
    pub max_value: f64,
    pub volume: f64,
    pub charge: f64,
    pub atom_distance: f64,
    /// The node's own basins hold exactly one atom.
    pub encloses_single_atom: bool,
    /// Some strict ancestor holds exactly one atom.
    pub within_atomic_domain: bool,
    pub bond: Option<BondAlignment>,
}

impl NodeFacts {
    fn aligned(&self, config: &AnalysisConfig) -> bool {
        self.bond.as_ref().map_or(false, |b| {
            b.angle >= config.min_covalent_angle && b.ratio <= config.min_covalent_bond_ratio
        })
    }

    /// One-line summary kept in the unclassifiable-node warning.
    fn summary(&self) -> String {
        format!(
            "birth {:.3}, depth {:.3}, max {:.3}, charge {:.3}, volume {:.1}, atom distance {:.2}",
            self.birth, self.depth, self.max_value, self.charge, self.volume, self.atom_distance
        )
    }
}

/// A single classification rule. Rules are consulted in table order and the
/// first to return a kind wins.
pub struct Rule {
    pub name: &'static str,
    pub applies: fn(&NodeFacts, &AnalysisConfig) -> Option<FeatureKind>,
}

/// The ordered decision table.
pub const RULES: &[Rule] = &[
    Rule {
        name: "atomic core",
        applies: |f, c| {
            (f.encloses_single_atom && f.birth <= c.shell_depth).then_some(FeatureKind::AtomicCore)
        },
    },
    Rule {
        name: "lone pair",
        applies: |f, c| {
            (f.within_atomic_domain
                && !f.encloses_single_atom
                && !f.aligned(c)
                && f.depth >= c.metal_depth_cutoff
                && f.atom_distance < c.electride_radius_min)
                .then_some(FeatureKind::LonePair)
        },
    },
    Rule {
        name: "heterogeneous covalent bond",
        applies: |f, c| {
            ((f.within_atomic_domain || f.encloses_single_atom)
                && f.aligned(c)
                && f.depth >= c.metal_depth_cutoff)
                .then_some(FeatureKind::CovalentBond { homogeneous: false })
        },
    },
    Rule {
        name: "homogeneous covalent bond",
        applies: |f, c| {
            (!f.within_atomic_domain
                && !f.encloses_single_atom
                && f.aligned(c)
                && f.depth >= c.metal_depth_cutoff)
                .then_some(FeatureKind::CovalentBond { homogeneous: true })
        },
    },
    Rule {
        name: "metallic network",
        applies: |f, c| {
            (!f.within_atomic_domain
                && !f.encloses_single_atom
                && f.depth < c.metal_depth_cutoff)
                .then_some(FeatureKind::MetallicNetwork)
        },
    },
    Rule {
        name: "electride",
        applies: |f, c| {
            (f.max_value >= c.electride_elf_min
                && f.depth >= c.electride_depth_min
                && f.charge >= c.electride_charge_min
                && f.volume >= c.electride_volume_min
                && f.atom_distance >= c.electride_radius_min)
                .then_some(FeatureKind::Electride)
        },
    },
];

/// Applies the rule table to a single set of facts.
pub fn apply_rules(facts: &NodeFacts, config: &AnalysisConfig) -> (FeatureKind, bool) {
    for rule in RULES {
        if let Some(kind) = (rule.applies)(facts, config) {
            return (kind, true);
        }
    }
    (FeatureKind::OtherBareElectron, false)
}

/// The best-aligned bond for a position, over the supplied bonded pairs.
///
/// For a pair of distinct atoms the nearest periodic image of each is used;
/// a self pair compares the two nearest images of the same atom. The pair
/// subtending the widest angle at the position wins.
pub fn bond_alignment(
    position: [f64; 3],
    bonds: &[(usize, usize)],
    atoms: &Atoms,
) -> Option<BondAlignment> {
    let mut best: Option<BondAlignment> = None;
    for (i, j) in bonds {
        let (va, vb) = if i == j {
            let base = atoms
                .lattice
                .wrap(utils::vsub(atoms.positions[*i], position));
            let mut images: Vec<[f64; 3]> = atoms
                .lattice
                .cartesian_shift_matrix
                .iter()
                .map(|s| [base[0] + s[0], base[1] + s[1], base[2] + s[2]])
                .collect();
            images.sort_by(|a, b| {
                utils::norm(*a)
                    .partial_cmp(&utils::norm(*b))
                    .expect("image distances must not be NaN")
            });
            (images[0], images[1])
        } else {
            (
                atoms.lattice.min_image_vector(position, atoms.positions[*i]),
                atoms.lattice.min_image_vector(position, atoms.positions[*j]),
            )
        };
        let separation = utils::norm(utils::vsub(vb, va));
        if separation < 1e-8 {
            continue;
        }
        let angle = utils::angle_deg(va, vb);
        let candidate = BondAlignment {
            angle,
            ratio: (utils::norm(va) + utils::norm(vb)) / separation,
            homogeneous: atoms.symbols[*i] == atoms.symbols[*j],
            atoms: (*i, *j),
        };
        if best.as_ref().map_or(true, |b| candidate.angle > b.angle) {
            best = Some(candidate);
        }
    }
    best
}

/// Gathers the facts for one irreducible node.
pub fn gather_facts(
    graph: &BifurcationGraph,
    id: usize,
    grid: &Grid,
    atoms: &Atoms,
    bonds: &[(usize, usize)],
) -> NodeFacts {
    let node = graph.node(id);
    let position = grid.to_cartesian(node.max_voxel);
    NodeFacts {
        node: id,
        birth: node.birth,
        depth: node.depth,
        max_value: node.max_value,
        volume: node.volume,
        charge: node.charge,
        atom_distance: node.atom_distance,
        encloses_single_atom: node.contained_atoms.len() == 1,
        within_atomic_domain: graph.within_single_atom_domain(id),
        bond: bond_alignment(position, bonds, atoms),
    }
}

/// Tags every irreducible node of the graph with a feature kind.
///
/// A pure function of the graph, grid geometry and cutoffs; re-running with
/// different cutoffs needs no new segmentation. Nodes matching no rule are
/// tagged `OtherBareElectron` and reported in the returned warnings with
/// their raw attributes.
pub fn classify(
    graph: &mut BifurcationGraph,
    grid: &Grid,
    atoms: &Atoms,
    config: &AnalysisConfig,
) -> Vec<Warning> {
    let bonds = atoms.bond_pairs(config.bond_scale);
    let ids: Vec<usize> = graph
        .nodes
        .iter()
        .filter(|n| n.attractors.len() == 1)
        .map(|n| n.id)
        .collect();
    let mut warnings = Vec::new();
    for id in ids {
        let facts = gather_facts(graph, id, grid, atoms, &bonds);
        let (kind, matched) = apply_rules(&facts, config);
        if !matched {
            warnings.push(Warning::UnclassifiableNode {
                node: id,
                facts: facts.summary(),
            });
        }
        graph.nodes[id].kind = Some(kind);
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;

    fn facts() -> NodeFacts {
        NodeFacts {
            node: 0,
            birth: 0.1,
            depth: 0.5,
            max_value: 0.8,
            volume: 25.,
            charge: 1.,
            atom_distance: 2.,
            encloses_single_atom: false,
            within_atomic_domain: false,
            bond: None,
        }
    }

    #[test]
    fn rule_atomic_core() {
        let f = NodeFacts {
            encloses_single_atom: true,
            ..facts()
        };
        let (kind, matched) = apply_rules(&f, &AnalysisConfig::default());
        assert!(matched);
        assert_eq!(kind, FeatureKind::AtomicCore);
    }

    #[test]
    fn rule_atomic_core_needs_low_birth() {
        let f = NodeFacts {
            encloses_single_atom: true,
            birth: 0.9,
            ..facts()
        };
        let (kind, _) = apply_rules(&f, &AnalysisConfig::default());
        assert_ne!(kind, FeatureKind::AtomicCore);
    }

    #[test]
    fn rule_lone_pair() {
        let f = NodeFacts {
            within_atomic_domain: true,
            atom_distance: 0.8,
            ..facts()
        };
        let (kind, matched) = apply_rules(&f, &AnalysisConfig::default());
        assert!(matched);
        assert_eq!(kind, FeatureKind::LonePair);
    }

    #[test]
    fn rule_distant_density_is_not_a_lone_pair() {
        // deep off-atom density inside a one-atom subdomain stays eligible
        // for the electride gates instead of collapsing into a lone pair
        let f = NodeFacts {
            within_atomic_domain: true,
            atom_distance: 3.,
            ..facts()
        };
        let (kind, _) = apply_rules(&f, &AnalysisConfig::default());
        assert_eq!(kind, FeatureKind::Electride);
    }

    #[test]
    fn rule_heterogeneous_bond_beats_lone_pair_when_aligned() {
        let f = NodeFacts {
            within_atomic_domain: true,
            bond: Some(BondAlignment {
                angle: 175.,
                ratio: 1.01,
                homogeneous: false,
                atoms: (0, 1),
            }),
            ..facts()
        };
        let (kind, _) = apply_rules(&f, &AnalysisConfig::default());
        assert_eq!(kind, FeatureKind::CovalentBond { homogeneous: false });
    }

    #[test]
    fn rule_homogeneous_bond() {
        let f = NodeFacts {
            bond: Some(BondAlignment {
                angle: 170.,
                ratio: 1.02,
                homogeneous: true,
                atoms: (0, 1),
            }),
            ..facts()
        };
        let (kind, _) = apply_rules(&f, &AnalysisConfig::default());
        assert_eq!(kind, FeatureKind::CovalentBond { homogeneous: true });
    }

    #[test]
    fn rule_off_axis_bond_is_not_covalent() {
        let f = NodeFacts {
            bond: Some(BondAlignment {
                angle: 120.,
                ratio: 1.4,
                homogeneous: true,
                atoms: (0, 1),
            }),
            ..facts()
        };
        let (kind, _) = apply_rules(&f, &AnalysisConfig::default());
        assert_ne!(kind, FeatureKind::CovalentBond { homogeneous: true });
    }

    #[test]
    fn rule_metallic_network() {
        let f = NodeFacts {
            depth: 0.02,
            ..facts()
        };
        let (kind, matched) = apply_rules(&f, &AnalysisConfig::default());
        assert!(matched);
        assert_eq!(kind, FeatureKind::MetallicNetwork);
    }

    #[test]
    fn rule_electride_passes_all_gates() {
        let (kind, matched) = apply_rules(&facts(), &AnalysisConfig::default());
        assert!(matched);
        assert_eq!(kind, FeatureKind::Electride);
    }

    #[test]
    fn rule_electride_fails_near_atom() {
        let f = NodeFacts {
            atom_distance: 0.5,
            ..facts()
        };
        let (kind, matched) = apply_rules(&f, &AnalysisConfig::default());
        assert!(!matched);
        assert_eq!(kind, FeatureKind::OtherBareElectron);
    }

    #[test]
    fn labels_round_trip() {
        for kind in [
            FeatureKind::AtomicCore,
            FeatureKind::LonePair,
            FeatureKind::CovalentBond { homogeneous: true },
            FeatureKind::CovalentBond { homogeneous: false },
            FeatureKind::MetallicNetwork,
            FeatureKind::Electride,
            FeatureKind::OtherBareElectron,
        ] {
            assert_eq!(FeatureKind::from_label(kind.label()), Some(kind));
        }
    }

    #[test]
    fn alignment_on_axis() {
        let lattice = Lattice::new([[10., 0., 0.], [0., 10., 0.], [0., 0., 10.]]).unwrap();
        let atoms = Atoms::new(
            lattice,
            vec![[2., 5., 5.], [6., 5., 5.]],
            vec![String::from("C"), String::from("C")],
        );
        let alignment = bond_alignment([4., 5., 5.], &[(0, 1)], &atoms).unwrap();
        assert!((alignment.angle - 180.).abs() < 1e-9);
        assert!((alignment.ratio - 1.).abs() < 1e-9);
        assert!(alignment.homogeneous);
    }

    #[test]
    fn alignment_off_axis() {
        let lattice = Lattice::new([[10., 0., 0.], [0., 10., 0.], [0., 0., 10.]]).unwrap();
        let atoms = Atoms::new(
            lattice,
            vec![[2., 5., 5.], [6., 5., 5.]],
            vec![String::from("C"), String::from("O")],
        );
        let alignment = bond_alignment([4., 8., 5.], &[(0, 1)], &atoms).unwrap();
        assert!(alignment.angle < 90.);
        assert!(alignment.ratio > 1.5);
        assert!(!alignment.homogeneous);
    }
}
