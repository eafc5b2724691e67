use crate::atoms::Atoms;
use crate::errors::Warning;
use crate::partition::{PartitionResult, SiteRecord};

/// Merges the partition results of the two spin channels into one report.
///
/// Per-atom charges and volumes are summed. Features are matched across
/// channels by kind and by periodic distance within `match_tolerance`; a
/// feature with no counterpart is kept as its own site and flagged
/// spin-unpaired instead of being forced into a match. Channels that
/// disagree on the feature count yield a non-fatal structure warning.
///
/// A pure function of its inputs; the channels themselves are produced by
/// two independent pipeline runs.
pub fn combine(
    up: PartitionResult,
    down: PartitionResult,
    atoms: &Atoms,
    match_tolerance: f64,
) -> PartitionResult {
    let mut warnings = Vec::new();
    warnings.extend(up.warnings.iter().cloned());
    warnings.extend(down.warnings.iter().cloned());

    let up_features: Vec<&SiteRecord> = up.features().collect();
    let down_features: Vec<&SiteRecord> = down.features().collect();
    if up_features.len() != down_features.len() {
        warnings.push(Warning::SpinStructure {
            up: up_features.len(),
            down: down_features.len(),
        });
    }

    let mut sites: Vec<SiteRecord> = Vec::new();
    for (i, up_atom) in up.atoms().enumerate() {
        let down_atom = down
            .atoms()
            .nth(i)
            .expect("both channels partition the same atoms");
        let charge = up_atom.charge + down_atom.charge;
        let valence = atoms.element(i).map(|e| e.valence as f64).unwrap_or(0.);
        sites.push(SiteRecord {
            id: i,
            charge,
            volume: up_atom.volume + down_atom.volume,
            oxidation_state: valence - charge,
            ..up_atom.clone()
        });
    }

    let mut down_taken = vec![false; down_features.len()];
    for up_feature in &up_features {
        let mut matched: Option<usize> = None;
        let mut best_distance = match_tolerance;
        for (j, down_feature) in down_features.iter().enumerate() {
            // node ids differ between the channel graphs, so features are
            // matched on kind alone
            if down_taken[j] || down_feature.kind.feature_kind() != up_feature.kind.feature_kind()
            {
                continue;
            }
            let distance = atoms
                .lattice
                .distance(up_feature.position, down_feature.position);
            if distance <= best_distance {
                best_distance = distance;
                matched = Some(j);
            }
        }
        let id = sites.len();
        match matched {
            Some(j) => {
                down_taken[j] = true;
                let charge = up_feature.charge + down_features[j].charge;
                sites.push(SiteRecord {
                    id,
                    charge,
                    volume: up_feature.volume + down_features[j].volume,
                    oxidation_state: -charge,
                    spin_unpaired: false,
                    ..(*up_feature).clone()
                });
            }
            None => {
                sites.push(SiteRecord {
                    id,
                    spin_unpaired: true,
                    ..(*up_feature).clone()
                });
            }
        }
    }
    for (j, down_feature) in down_features.iter().enumerate() {
        if down_taken[j] {
            continue;
        }
        let id = sites.len();
        sites.push(SiteRecord {
            id,
            spin_unpaired: true,
            ..(*down_feature).clone()
        });
    }

    PartitionResult {
        sites,
        total_integral: up.total_integral + down.total_integral,
        assigned_total: up.assigned_total + down.assigned_total,
        warnings,
    }
}
