use crate::elements::{self, ElementData};
use crate::errors::AnalysisError;
use crate::utils;

/// Fallback covalent radius for species missing from the element table.
const FALLBACK_RADIUS: f64 = 1.5;

/// Structure for containing information on the cell.
#[derive(Debug, Clone)]
pub struct Lattice {
    /// Length of the a-vector.
    pub a: f64,
    /// Length of the b-vector.
    pub b: f64,
    /// Length of the c-vector.
    pub c: f64,
    /// Transformation matrix for converting to fractional coordinates.
    pub to_fractional: [[f64; 3]; 3],
    /// Transformation matrix for converting to cartesian coordinates.
    pub to_cartesian: [[f64; 3]; 3],
    /// The cartesian shifts to the 27 periodic images, zero shift included.
    pub cartesian_shift_matrix: [[f64; 3]; 27],
    /// Volume of the cell.
    pub volume: f64,
}

impl Lattice {
    /// Initialises the structure from the three lattice vectors as rows.
    pub fn new(vectors: [[f64; 3]; 3]) -> Result<Self, AnalysisError> {
        let to_fractional =
            utils::invert_lattice(&vectors).map_err(AnalysisError::Lattice)?;
        let a = utils::norm(vectors[0]);
        let b = utils::norm(vectors[1]);
        let c = utils::norm(vectors[2]);
        let volume = utils::vdot(vectors[0], utils::cross(vectors[1], vectors[2])).abs();
        let mut cartesian_shift_matrix = [[0f64; 3]; 27];
        let mut i = 0;
        for x in -1..=1 {
            for y in -1..=1 {
                for z in -1..=1 {
                    for (k, shift) in cartesian_shift_matrix[i].iter_mut().enumerate() {
                        *shift = x as f64 * vectors[0][k]
                            + y as f64 * vectors[1][k]
                            + z as f64 * vectors[2][k];
                    }
                    i += 1;
                }
            }
        }
        Ok(Self {
            a,
            b,
            c,
            to_fractional,
            to_cartesian: vectors,
            cartesian_shift_matrix,
            volume,
        })
    }

    /// Wraps a cartesian point back into the primary cell.
    pub fn wrap(&self, p: [f64; 3]) -> [f64; 3] {
        let mut frac = utils::dot(p, self.to_fractional);
        for f in &mut frac {
            *f = f.rem_euclid(1.);
        }
        utils::dot(frac, self.to_cartesian)
    }

    /// The shortest periodic vector from `from` to `to`, searched over the
    /// 27 neighbouring images of the wrapped difference.
    pub fn min_image_vector(&self, from: [f64; 3], to: [f64; 3]) -> [f64; 3] {
        let d = self.wrap(utils::vsub(to, from));
        let mut best = d;
        let mut best_sq = utils::vdot(d, d);
        for shift in self.cartesian_shift_matrix.iter() {
            let c = [d[0] + shift[0], d[1] + shift[1], d[2] + shift[2]];
            let c_sq = utils::vdot(c, c);
            if c_sq < best_sq {
                best_sq = c_sq;
                best = c;
            }
        }
        best
    }

    /// The minimum periodic distance between two cartesian points.
    pub fn distance(&self, from: [f64; 3], to: [f64; 3]) -> f64 {
        utils::norm(self.min_image_vector(from, to))
    }
}

/// Struct for containing the atoms of the structure under analysis.
#[derive(Debug, Clone)]
pub struct Atoms {
    pub lattice: Lattice,
    /// Positions of the atoms in cartesian coordinates, wrapped into the cell.
    pub positions: Vec<[f64; 3]>,
    /// Element symbol of each atom, parallel to `positions`.
    pub symbols: Vec<String>,
}

impl Atoms {
    /// Initialises the structure, wrapping every position into the cell.
    pub fn new(lattice: Lattice, positions: Vec<[f64; 3]>, symbols: Vec<String>) -> Self {
        let positions = positions.iter().map(|p| lattice.wrap(*p)).collect();
        Self {
            lattice,
            positions,
            symbols,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Element table entry for atom `i`, if the symbol is tabulated.
    pub fn element(&self, i: usize) -> Option<&'static ElementData> {
        elements::lookup(&self.symbols[i])
    }

    /// The atom nearest to a cartesian point and the periodic distance to it.
    pub fn nearest_atom(&self, point: [f64; 3]) -> (usize, f64) {
        let mut atom = 0;
        let mut min_distance = f64::INFINITY;
        for (i, position) in self.positions.iter().enumerate() {
            let distance = self.lattice.distance(point, *position);
            if distance < min_distance {
                min_distance = distance;
                atom = i;
            }
        }
        (atom, min_distance)
    }

    /// Bonded atom pairs under the covalent radius criterion,
    /// d(i, j) <= bond_scale * (r_i + r_j), over periodic images.
    pub fn bond_pairs(&self, bond_scale: f64) -> Vec<(usize, usize)> {
        let radii: Vec<f64> = (0..self.len())
            .map(|i| {
                self.element(i)
                    .map(|e| e.covalent_radius)
                    .unwrap_or(FALLBACK_RADIUS)
            })
            .collect();
        let mut pairs = Vec::new();
        for i in 0..self.len() {
            for j in i..self.len() {
                let cutoff = bond_scale * (radii[i] + radii[j]);
                let distance = if i == j {
                    // an atom can bond to its own periodic image
                    self.lattice
                        .cartesian_shift_matrix
                        .iter()
                        .map(|s| utils::norm(*s))
                        .filter(|d| *d > 0.)
                        .fold(f64::INFINITY, f64::min)
                } else {
                    self.lattice.distance(self.positions[i], self.positions[j])
                };
                if distance <= cutoff {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}
