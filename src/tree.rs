use crate::atoms::Atoms;
use crate::classify::FeatureKind;
use crate::grid::{Grid, NEIGHBOUR_OFFSETS};
use crate::segment::Segmentation;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// A domain of the topological field in the bifurcation hierarchy.
///
/// Irreducible nodes wrap exactly one attractor; reducible nodes hold the
/// union of their children's attractors. The arena holds leaves first, in
/// attractor-id order, so a leaf's node id equals its attractor id.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Sorted ids of the attractors contained in this domain.
    pub attractors: Vec<usize>,
    /// Iso-value at which this domain first appears as a distinct region.
    pub birth: f64,
    /// Highest field value inside the domain.
    pub max_value: f64,
    /// Voxel of the highest attractor, used as the node position.
    pub max_voxel: isize,
    /// Basin volume in cubic angstrom.
    pub volume: f64,
    /// Zero-flux integrated charge over the basin.
    pub charge: f64,
    /// max_value - birth.
    pub depth: f64,
    /// Periodic distance from the node position to the nearest atom.
    pub atom_distance: f64,
    pub nearest_atom: usize,
    /// Atoms whose own voxel lies inside this domain's basins.
    pub contained_atoms: Vec<usize>,
    /// Feature classification; reducible nodes are never classified.
    pub kind: Option<FeatureKind>,
}

/// The rooted bifurcation hierarchy over all attractors.
#[derive(Debug, Serialize)]
pub struct BifurcationGraph {
    pub nodes: Vec<Node>,
    pub root: usize,
}

impl BifurcationGraph {
    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn is_irreducible(&self, id: usize) -> bool {
        self.nodes[id].attractors.len() == 1
    }

    /// The irreducible (single attractor) nodes in id order.
    pub fn irreducible(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.attractors.len() == 1)
    }

    /// Whether any strict ancestor of the node is a domain surrounding
    /// exactly one atom. The root spans the whole cell and is not counted,
    /// otherwise every node of a one-atom cell would qualify.
    pub fn within_single_atom_domain(&self, id: usize) -> bool {
        let mut current = self.nodes[id].parent;
        while let Some(p) = current {
            if p != self.root && self.nodes[p].contained_atoms.len() == 1 {
                return true;
            }
            current = self.nodes[p].parent;
        }
        false
    }

    /// Serializes the node arena for external plotting.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// The watershed saddle value for every pair of adjacent basins: the
/// highest field value at which the two basins are still connected through
/// a shared voxel boundary. Keys are (lower id, higher id).
pub fn basin_saddles(grid: &Grid, labels: &[usize]) -> FxHashMap<(usize, usize), f64> {
    let mut saddles: FxHashMap<(usize, usize), f64> = FxHashMap::default();
    for p in 0..grid.size.total as isize {
        let la = labels[p as usize];
        let [x, y, z] = grid.to_3d(p);
        // second half of the stencil so each unordered voxel pair is seen once
        for offset in NEIGHBOUR_OFFSETS.iter().skip(13) {
            let q = grid.to_1d(x + offset[0], y + offset[1], z + offset[2]);
            let lb = labels[q as usize];
            if la == lb {
                continue;
            }
            let key = (la.min(lb), la.max(lb));
            let crossing = grid[p].min(grid[q]);
            let saddle = saddles.entry(key).or_insert(f64::NEG_INFINITY);
            if crossing > *saddle {
                *saddle = crossing;
            }
        }
    }
    saddles
}

/// Builds the bifurcation hierarchy from a segmentation.
///
/// The downward iso-value sweep is driven by the basin-adjacency pairs
/// rather than the voxels: one sweep over the half stencil records, for
/// every pair of adjacent basins, the watershed saddle (the highest value
/// at which the pair is still connected), and the hierarchy is then the
/// union-find merge of basins over saddles in descending order. Saddles
/// falling inside one `resolution` step are treated as a simultaneous
/// n-way split.
///
/// `charge` supplies the zero-flux integrated charge attribute and must
/// share the grid's shape; `atoms` supply the distance and containment
/// attributes.
pub fn build(
    grid: &Grid,
    charge: &Grid,
    segmentation: &Segmentation,
    atoms: &Atoms,
    resolution: f64,
) -> BifurcationGraph {
    debug_assert_eq!(grid.shape(), charge.shape());
    let labels = &segmentation.labels;
    let n_attractors = segmentation.attractors.len();

    let mut pairs: Vec<((usize, usize), f64)> =
        basin_saddles(grid, labels).into_iter().collect();
    pairs.sort_unstable_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .expect("saddle values must not be NaN")
            .then(a.0.cmp(&b.0))
    });

    // leaves first so a leaf's node id is its attractor id
    let mut nodes: Vec<Node> = segmentation
        .attractors
        .iter()
        .map(|a| Node {
            id: a.id,
            parent: None,
            children: Vec::new(),
            attractors: vec![a.id],
            birth: f64::NAN,
            max_value: a.value,
            max_voxel: a.voxel,
            volume: 0.,
            charge: 0.,
            depth: 0.,
            atom_distance: 0.,
            nearest_atom: 0,
            contained_atoms: Vec::new(),
            kind: None,
        })
        .collect();

    let mut union = UnionFind::new(n_attractors);
    // arena id of the top node of each cluster, indexed by union-find root
    let mut cluster_node: Vec<usize> = (0..n_attractors).collect();

    let bucket = |s: f64| (s / resolution).floor() as i64;
    let mut i = 0;
    while i < pairs.len() {
        let run_bucket = bucket(pairs[i].1);
        let mut run_end = i;
        while run_end < pairs.len() && bucket(pairs[run_end].1) == run_bucket {
            run_end += 1;
        }
        // groups of clusters merging simultaneously within this bucket
        let mut groups: Vec<(Vec<usize>, f64)> = Vec::new();
        let mut group_of: FxHashMap<usize, usize> = FxHashMap::default();
        for ((a, b), saddle) in &pairs[i..run_end] {
            let ra = union.find(*a);
            let rb = union.find(*b);
            if ra == rb {
                continue;
            }
            let ga = group_of.get(&ra).copied();
            let gb = group_of.get(&rb).copied();
            let merged = match (ga, gb) {
                (None, None) => {
                    groups.push((vec![cluster_node[ra], cluster_node[rb]], *saddle));
                    groups.len() - 1
                }
                (Some(g), None) => {
                    groups[g].0.push(cluster_node[rb]);
                    g
                }
                (None, Some(g)) => {
                    groups[g].0.push(cluster_node[ra]);
                    g
                }
                (Some(g1), Some(g2)) => {
                    let members = std::mem::take(&mut groups[g2].0);
                    groups[g1].0.extend(members);
                    groups[g1].1 = groups[g1].1.max(groups[g2].1);
                    g1
                }
            };
            let root = union.union(ra, rb);
            group_of.insert(root, merged);
        }
        for (members, threshold) in groups {
            if members.is_empty() {
                // emptied by a group-group merge
                continue;
            }
            let parent_id = nodes.len();
            let mut attractors = Vec::new();
            let mut max_value = f64::NEG_INFINITY;
            let mut max_voxel = 0;
            for child in &members {
                nodes[*child].parent = Some(parent_id);
                nodes[*child].birth = threshold;
                attractors.extend_from_slice(&nodes[*child].attractors);
                if nodes[*child].max_value > max_value {
                    max_value = nodes[*child].max_value;
                    max_voxel = nodes[*child].max_voxel;
                }
            }
            attractors.sort_unstable();
            let root = union.find(nodes[members[0]].attractors[0]);
            cluster_node[root] = parent_id;
            nodes.push(Node {
                id: parent_id,
                parent: None,
                children: members,
                attractors,
                birth: f64::NAN,
                max_value,
                max_voxel,
                volume: 0.,
                charge: 0.,
                depth: 0.,
                atom_distance: 0.,
                nearest_atom: 0,
                contained_atoms: Vec::new(),
                kind: None,
            });
        }
        i = run_end;
    }

    // close the hierarchy; a periodic grid leaves a single cluster but a
    // defensive join at the field minimum keeps the arena rooted regardless
    let mut tops: Vec<usize> = (0..n_attractors)
        .map(|a| cluster_node[union.find(a)])
        .collect();
    tops.sort_unstable();
    tops.dedup();
    let root_birth = grid.min_value().min(0.);
    let root = if tops.len() == 1 {
        tops[0]
    } else {
        let parent_id = nodes.len();
        let floor = grid.min_value();
        let mut attractors = Vec::new();
        let mut max_value = f64::NEG_INFINITY;
        let mut max_voxel = 0;
        for top in &tops {
            nodes[*top].parent = Some(parent_id);
            nodes[*top].birth = floor;
            attractors.extend_from_slice(&nodes[*top].attractors);
            if nodes[*top].max_value > max_value {
                max_value = nodes[*top].max_value;
                max_voxel = nodes[*top].max_voxel;
            }
        }
        attractors.sort_unstable();
        nodes.push(Node {
            id: parent_id,
            parent: None,
            children: tops,
            attractors,
            birth: f64::NAN,
            max_value,
            max_voxel,
            volume: 0.,
            charge: 0.,
            depth: 0.,
            atom_distance: 0.,
            nearest_atom: 0,
            contained_atoms: Vec::new(),
            kind: None,
        });
        parent_id
    };
    nodes[root].birth = root_birth;

    fill_attributes(&mut nodes, grid, charge, segmentation, atoms);
    BifurcationGraph { nodes, root }
}

/// Aggregates the per-attractor quantities up into every node.
fn fill_attributes(
    nodes: &mut [Node],
    grid: &Grid,
    charge: &Grid,
    segmentation: &Segmentation,
    atoms: &Atoms,
) {
    let n_attractors = segmentation.attractors.len();
    let voxel_volume = grid.voxel_lattice.volume;
    let mut basin_charge = vec![0f64; n_attractors];
    for (p, label) in segmentation.labels.iter().enumerate() {
        basin_charge[*label] += charge[p as isize];
    }
    for c in &mut basin_charge {
        *c *= voxel_volume;
    }
    let mut basin_atoms: Vec<Vec<usize>> = vec![Vec::new(); n_attractors];
    for (i, position) in atoms.positions.iter().enumerate() {
        let label = segmentation.labels[grid.voxel_at(*position) as usize];
        basin_atoms[label].push(i);
    }
    for node in nodes.iter_mut() {
        node.volume = node
            .attractors
            .iter()
            .map(|a| segmentation.attractors[*a].basin_voxels as f64 * voxel_volume)
            .sum();
        node.charge = node.attractors.iter().map(|a| basin_charge[*a]).sum();
        node.contained_atoms = node
            .attractors
            .iter()
            .flat_map(|a| basin_atoms[*a].iter().copied())
            .collect();
        node.contained_atoms.sort_unstable();
        node.depth = node.max_value - node.birth;
        if !atoms.is_empty() {
            let position = grid.to_cartesian(node.max_voxel);
            let (nearest, distance) = atoms.nearest_atom(position);
            node.nearest_atom = nearest;
            node.atom_distance = distance;
        }
    }
}

/// Path-halving union-find over attractor ids.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Joins two roots, returning the surviving root.
    fn union(&mut self, a: usize, b: usize) -> usize {
        let ra = self.find(a);
        let rb = self.find(b);
        self.parent[rb.max(ra)] = rb.min(ra);
        rb.min(ra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Bar;
    use crate::segment;

    /// A field constant over y and z with an x profile holding three maxima
    /// of 0.9, 0.8 and 0.7 separated by saddles at 0.5 and 0.3.
    fn three_basin_grid() -> Grid {
        let profile = [0.1, 0.9, 0.5, 0.8, 0.3, 0.7, 0.1, 0.05, 0.04, 0.04, 0.05, 0.06];
        let n = profile.len();
        let mut data = vec![0.; n * 4];
        for (x, v) in profile.iter().enumerate() {
            for yz in 0..4 {
                data[x * 4 + yz] = *v;
            }
        }
        Grid::new(
            data,
            [n, 2, 2],
            [[6., 0., 0.], [0., 1., 0.], [0., 0., 1.]],
            [0., 0., 0.],
        )
        .unwrap()
    }

    fn no_atoms() -> Atoms {
        Atoms::new(
            crate::atoms::Lattice::new([[6., 0., 0.], [0., 1., 0.], [0., 0., 1.]]).unwrap(),
            Vec::new(),
            Vec::new(),
        )
    }

    fn build_three_basins(resolution: f64) -> BifurcationGraph {
        let grid = three_basin_grid();
        let seg = segment::segment(&grid, 2, &Bar::new(0, 100, String::new())).unwrap();
        assert_eq!(seg.attractors.len(), 3);
        let charge = three_basin_grid();
        build(&grid, &charge, &seg, &no_atoms(), resolution)
    }

    #[test]
    fn tree_merge_order_and_births() {
        let graph = build_three_basins(0.01);
        // three leaves, two internal nodes
        assert_eq!(graph.nodes.len(), 5);
        let root = graph.node(graph.root);
        assert_eq!(root.attractors, vec![0, 1, 2]);
        assert_eq!(root.birth, 0.);
        // leaves 0 and 1 (maxima 0.9 and 0.8) merge first at the 0.5 saddle
        assert_eq!(graph.node(0).birth, 0.5);
        assert_eq!(graph.node(1).birth, 0.5);
        // their parent and the 0.7 leaf split apart at 0.3
        let pair = graph.node(graph.node(0).parent.unwrap());
        assert_eq!(pair.attractors, vec![0, 1]);
        assert_eq!(pair.birth, 0.3);
        assert_eq!(graph.node(2).birth, 0.3);
        assert_eq!(pair.parent, Some(graph.root));
    }

    #[test]
    fn tree_depths() {
        let graph = build_three_basins(0.01);
        assert!((graph.node(0).depth - 0.4).abs() < 1e-12);
        assert!((graph.node(1).depth - 0.3).abs() < 1e-12);
        assert!((graph.node(2).depth - 0.4).abs() < 1e-12);
        assert!((graph.node(graph.root).depth - 0.9).abs() < 1e-12);
    }

    #[test]
    fn tree_partition_invariant() {
        let graph = build_three_basins(0.01);
        for node in &graph.nodes {
            if node.children.is_empty() {
                continue;
            }
            let mut union: Vec<usize> = node
                .children
                .iter()
                .flat_map(|c| graph.node(*c).attractors.iter().copied())
                .collect();
            union.sort_unstable();
            let mut deduped = union.clone();
            deduped.dedup();
            // no duplicates across siblings, union matches parent exactly
            assert_eq!(union.len(), deduped.len());
            assert_eq!(union, node.attractors);
        }
    }

    #[test]
    fn tree_monotonic_birth() {
        let graph = build_three_basins(0.01);
        for node in &graph.nodes {
            for child in &node.children {
                assert!(node.birth <= graph.node(*child).birth);
            }
        }
    }

    #[test]
    fn tree_coarse_resolution_collapses_to_nway() {
        // 0.5 and 0.3 land in the same bucket at resolution 1.0 so all
        // three leaves split from the root simultaneously
        let graph = build_three_basins(1.0);
        assert_eq!(graph.nodes.len(), 4);
        let root = graph.node(graph.root);
        assert_eq!(root.children.len(), 3);
        assert_eq!(graph.node(0).birth, 0.5);
    }

    #[test]
    fn tree_volume_and_charge_sum_to_cell() {
        let grid = three_basin_grid();
        let seg = segment::segment(&grid, 2, &Bar::new(0, 100, String::new())).unwrap();
        let charge = three_basin_grid();
        let graph = build(&grid, &charge, &seg, &no_atoms(), 0.01);
        let root = graph.node(graph.root);
        assert!((root.volume - grid.lattice.volume).abs() < 1e-9);
        assert!((root.charge - charge.integral()).abs() < 1e-9);
    }

    #[test]
    fn tree_single_attractor_is_root() {
        let mut data = vec![0.; 64];
        data[21] = 1.;
        let grid = Grid::new(
            data.clone(),
            [4, 4, 4],
            [[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]],
            [0., 0., 0.],
        )
        .unwrap();
        let seg = segment::segment(&grid, 1, &Bar::new(0, 100, String::new())).unwrap();
        let charge = Grid::new(
            data,
            [4, 4, 4],
            [[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]],
            [0., 0., 0.],
        )
        .unwrap();
        let atoms = Atoms::new(
            crate::atoms::Lattice::new([[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]]).unwrap(),
            Vec::new(),
            Vec::new(),
        );
        let graph = build(&grid, &charge, &seg, &atoms, 0.01);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.root, 0);
        assert_eq!(graph.node(0).birth, 0.);
    }
}
