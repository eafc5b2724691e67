use crate::atoms::Atoms;
use crate::classify::FeatureKind;
use crate::partition::PartitionResult;

/// A placeholder site standing in for a non-atomic feature.
#[derive(Debug, Clone)]
pub struct DummySite {
    pub kind: FeatureKind,
    /// Cartesian position of the feature maximum.
    pub position: [f64; 3],
    pub charge: f64,
    pub spin_unpaired: bool,
}

/// The analysed structure: the original atoms plus one dummy site per
/// non-atomic feature, ready for export to a structure file.
#[derive(Debug)]
pub struct LabeledStructure {
    pub atoms: Atoms,
    pub dummies: Vec<DummySite>,
}

impl LabeledStructure {
    /// Builds the labeled structure from a partition result. Every feature
    /// site becomes a dummy site; atomic cores are part of their atoms and
    /// add nothing.
    pub fn from_partition(atoms: &Atoms, result: &PartitionResult) -> Self {
        let dummies = result
            .features()
            .map(|site| DummySite {
                kind: site
                    .kind
                    .feature_kind()
                    .expect("features() yields only feature sites"),
                position: site.position,
                charge: site.charge,
                spin_unpaired: site.spin_unpaired,
            })
            .collect();
        Self {
            atoms: atoms.clone(),
            dummies,
        }
    }

    /// Total sites, atoms and dummies together.
    pub fn site_count(&self) -> usize {
        self.atoms.len() + self.dummies.len()
    }

    /// How many dummy sites carry the given kind.
    pub fn count_of(&self, kind: FeatureKind) -> usize {
        self.dummies.iter().filter(|d| d.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;
    use crate::partition::{SiteKind, SiteRecord};

    #[test]
    fn structure_from_partition_keeps_features_only() {
        let atoms = Atoms::new(
            Lattice::new([[5., 0., 0.], [0., 5., 0.], [0., 0., 5.]]).unwrap(),
            vec![[0., 0., 0.]],
            vec![String::from("Li")],
        );
        let result = PartitionResult {
            sites: vec![
                SiteRecord {
                    id: 0,
                    kind: SiteKind::Atom {
                        element: String::from("Li"),
                    },
                    position: [0., 0., 0.],
                    charge: 0.2,
                    volume: 10.,
                    oxidation_state: 0.8,
                    shared_with: Vec::new(),
                    spin_unpaired: false,
                },
                SiteRecord {
                    id: 1,
                    kind: SiteKind::Feature {
                        kind: FeatureKind::Electride,
                        node: 1,
                    },
                    position: [2.5, 2.5, 2.5],
                    charge: 0.8,
                    volume: 20.,
                    oxidation_state: -0.8,
                    shared_with: Vec::new(),
                    spin_unpaired: false,
                },
            ],
            total_integral: 1.0,
            assigned_total: 1.0,
            warnings: Vec::new(),
        };
        let structure = LabeledStructure::from_partition(&atoms, &result);
        assert_eq!(structure.site_count(), 2);
        assert_eq!(structure.count_of(FeatureKind::Electride), 1);
        assert_eq!(structure.dummies[0].position, [2.5, 2.5, 2.5]);
    }
}
