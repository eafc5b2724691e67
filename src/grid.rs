use crate::atoms::Lattice;
use crate::errors::AnalysisError;
use crate::utils;
use std::ops::Index;

/// The 26 neighbour offsets in the fixed lexicographic order used for every
/// tie-break in the crate, (-1,-1,-1) through (1,1,1) with the zero offset
/// removed.
pub const NEIGHBOUR_OFFSETS: [[isize; 3]; 26] = [
    [-1, -1, -1],
    [-1, -1, 0],
    [-1, -1, 1],
    [-1, 0, -1],
    [-1, 0, 0],
    [-1, 0, 1],
    [-1, 1, -1],
    [-1, 1, 0],
    [-1, 1, 1],
    [0, -1, -1],
    [0, -1, 0],
    [0, -1, 1],
    [0, 0, -1],
    [0, 0, 1],
    [0, 1, -1],
    [0, 1, 0],
    [0, 1, 1],
    [1, -1, -1],
    [1, -1, 0],
    [1, -1, 1],
    [1, 0, -1],
    [1, 0, 0],
    [1, 0, 1],
    [1, 1, -1],
    [1, 1, 0],
    [1, 1, 1],
];

/// How `Grid::sample` reads values between voxel centres.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Trilinear,
}

/// The 3d size of the data.
pub struct Size {
    pub x: isize,
    pub y: isize,
    pub z: isize,
    /// Total size of the data, x * y * z.
    pub total: usize,
}

impl Size {
    fn new(x: usize, y: usize, z: usize) -> Self {
        Self {
            x: x as isize,
            y: y as isize,
            z: z as isize,
            total: x * y * z,
        }
    }
}

/// A periodic scalar field sampled on a regular grid over the cell.
///
/// Values are stored flat with the index p = (x * ny + y) * nz + z and all
/// voxel arithmetic wraps, so every voxel has a full 26-neighbourhood.
/// The structure is read-only after construction; `downscale` produces a
/// new grid rather than mutating in place.
pub struct Grid {
    data: Vec<f64>,
    pub size: Size,
    /// The cell the field is defined over.
    pub lattice: Lattice,
    /// The basis of a single voxel.
    pub voxel_lattice: Lattice,
    /// The origin of each voxel in voxel units.
    pub voxel_origin: [f64; 3],
    /// Cartesian distance to each of the 26 neighbours, in offset order.
    pub neighbour_distances: [f64; 26],
}

impl Grid {
    /// Initialises a grid. The voxel lattice is the cell lattice divided by
    /// the voxel counts.
    pub fn new(
        data: Vec<f64>,
        grid: [usize; 3],
        lattice: [[f64; 3]; 3],
        voxel_origin: [f64; 3],
    ) -> Result<Self, AnalysisError> {
        let size = Size::new(grid[0], grid[1], grid[2]);
        assert_eq!(data.len(), size.total, "data length must match voxel counts");
        let mut voxel_vectors = [[0f64; 3]; 3];
        for i in 0..3 {
            for k in 0..3 {
                voxel_vectors[i][k] = lattice[i][k] / grid[i] as f64;
            }
        }
        let lattice = Lattice::new(lattice)?;
        let voxel_lattice = Lattice::new(voxel_vectors)?;
        let mut neighbour_distances = [0f64; 26];
        for (d, offset) in neighbour_distances.iter_mut().zip(NEIGHBOUR_OFFSETS) {
            let shift = [offset[0] as f64, offset[1] as f64, offset[2] as f64];
            *d = utils::norm(utils::dot(shift, voxel_lattice.to_cartesian));
        }
        Ok(Self {
            data,
            size,
            lattice,
            voxel_lattice,
            voxel_origin,
            neighbour_distances,
        })
    }

    /// The voxel counts along each axis.
    pub fn shape(&self) -> [usize; 3] {
        [
            self.size.x as usize,
            self.size.y as usize,
            self.size.z as usize,
        ]
    }

    /// The raw values of the field.
    pub fn values(&self) -> &[f64] {
        &self.data
    }

    /// Fails when two grids entering the same pipeline disagree on voxel
    /// counts.
    pub fn check_shape(&self, other: &Grid) -> Result<(), AnalysisError> {
        if self.shape() != other.shape() {
            return Err(AnalysisError::GridMismatch {
                expected: self.shape(),
                found: other.shape(),
            });
        }
        Ok(())
    }

    /// Converts a 1d index of the array into a 3d index.
    pub fn to_3d(&self, p: isize) -> [isize; 3] {
        let x = p / (self.size.y * self.size.z);
        let y = (p / self.size.z).rem_euclid(self.size.y);
        let z = p.rem_euclid(self.size.z);
        [x, y, z]
    }

    /// Converts a 3d index, wrapping each axis, into a 1d index.
    pub fn to_1d(&self, x: isize, y: isize, z: isize) -> isize {
        let x = x.rem_euclid(self.size.x);
        let y = y.rem_euclid(self.size.y);
        let z = z.rem_euclid(self.size.z);
        (x * self.size.y + y) * self.size.z + z
    }

    /// The 26 periodic neighbours of p, in the fixed offset order.
    pub fn neighbours(&self, p: isize) -> [isize; 26] {
        let [x, y, z] = self.to_3d(p);
        let mut out = [0isize; 26];
        for (n, offset) in out.iter_mut().zip(NEIGHBOUR_OFFSETS) {
            *n = self.to_1d(x + offset[0], y + offset[1], z + offset[2]);
        }
        out
    }

    /// Converts a voxel index to a cartesian position.
    pub fn to_cartesian(&self, p: isize) -> [f64; 3] {
        let [x, y, z] = self.to_3d(p);
        let p = [
            x as f64 + self.voxel_origin[0],
            y as f64 + self.voxel_origin[1],
            z as f64 + self.voxel_origin[2],
        ];
        utils::dot(p, self.voxel_lattice.to_cartesian)
    }

    /// The voxel whose centre is nearest to a cartesian position.
    pub fn voxel_at(&self, point: [f64; 3]) -> isize {
        let frac = utils::dot(point, self.lattice.to_fractional);
        let x = (frac[0].rem_euclid(1.) * self.size.x as f64 - self.voxel_origin[0]).round();
        let y = (frac[1].rem_euclid(1.) * self.size.y as f64 - self.voxel_origin[1]).round();
        let z = (frac[2].rem_euclid(1.) * self.size.z as f64 - self.voxel_origin[2]).round();
        self.to_1d(x as isize, y as isize, z as isize)
    }

    /// Samples the field at a fractional coordinate with periodic
    /// wraparound.
    pub fn sample(&self, frac: [f64; 3], interpolation: Interpolation) -> f64 {
        let u = [
            frac[0].rem_euclid(1.) * self.size.x as f64 - self.voxel_origin[0],
            frac[1].rem_euclid(1.) * self.size.y as f64 - self.voxel_origin[1],
            frac[2].rem_euclid(1.) * self.size.z as f64 - self.voxel_origin[2],
        ];
        match interpolation {
            Interpolation::Nearest => {
                self[self.to_1d(
                    u[0].round() as isize,
                    u[1].round() as isize,
                    u[2].round() as isize,
                )]
            }
            Interpolation::Trilinear => {
                let base = [u[0].floor(), u[1].floor(), u[2].floor()];
                let t = [u[0] - base[0], u[1] - base[1], u[2] - base[2]];
                let mut value = 0.;
                for corner in 0..8 {
                    let d = [corner >> 2 & 1, corner >> 1 & 1, corner & 1];
                    let weight = (0..3)
                        .map(|i| if d[i] == 1 { t[i] } else { 1. - t[i] })
                        .product::<f64>();
                    let p = self.to_1d(
                        base[0] as isize + d[0] as isize,
                        base[1] as isize + d[1] as isize,
                        base[2] as isize + d[2] as isize,
                    );
                    value += weight * self[p];
                }
                value
            }
        }
    }

    /// The integral of the field over the cell.
    pub fn integral(&self) -> f64 {
        self.data.iter().sum::<f64>() * self.voxel_lattice.volume
    }

    /// The smallest value of the field.
    pub fn min_value(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Resamples to at most `max_voxels` total voxels, preserving the cell
    /// integral. Returns a plain copy when the grid is already small enough.
    pub fn downscale(&self, max_voxels: usize) -> Result<Grid, AnalysisError> {
        if self.size.total <= max_voxels {
            return Grid::new(
                self.data.clone(),
                self.shape(),
                self.lattice.to_cartesian,
                self.voxel_origin,
            );
        }
        let factor = (max_voxels as f64 / self.size.total as f64).cbrt();
        let shape = self.shape();
        let new_shape = [
            ((shape[0] as f64 * factor).floor() as usize).max(2),
            ((shape[1] as f64 * factor).floor() as usize).max(2),
            ((shape[2] as f64 * factor).floor() as usize).max(2),
        ];
        let mut data = Vec::with_capacity(new_shape[0] * new_shape[1] * new_shape[2]);
        for x in 0..new_shape[0] {
            for y in 0..new_shape[1] {
                for z in 0..new_shape[2] {
                    let frac = [
                        (x as f64 + self.voxel_origin[0]) / new_shape[0] as f64,
                        (y as f64 + self.voxel_origin[1]) / new_shape[1] as f64,
                        (z as f64 + self.voxel_origin[2]) / new_shape[2] as f64,
                    ];
                    data.push(self.sample(frac, Interpolation::Trilinear));
                }
            }
        }
        let mut grid = Grid::new(
            data,
            new_shape,
            self.lattice.to_cartesian,
            self.voxel_origin,
        )?;
        let resampled = grid.integral();
        if resampled.abs() > f64::EPSILON {
            let scale = self.integral() / resampled;
            for v in &mut grid.data {
                *v *= scale;
            }
        }
        Ok(grid)
    }
}

impl Index<isize> for Grid {
    type Output = f64;

    fn index(&self, p: isize) -> &Self::Output {
        &self.data[p as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_grid() -> Grid {
        // value equals the flat index
        let data = (0..64).map(|x| x as f64).collect();
        Grid::new(
            data,
            [4, 4, 4],
            [[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]],
            [0., 0., 0.],
        )
        .unwrap()
    }

    #[test]
    fn grid_index_roundtrip() {
        let grid = ramp_grid();
        for p in [0isize, 1, 17, 63] {
            let [x, y, z] = grid.to_3d(p);
            assert_eq!(grid.to_1d(x, y, z), p);
        }
    }

    #[test]
    fn grid_neighbours_wrap() {
        let grid = ramp_grid();
        let neighbours = grid.neighbours(0);
        // first offset is (-1,-1,-1) which wraps to (3,3,3)
        assert_eq!(neighbours[0], grid.to_1d(3, 3, 3));
        // every neighbour is in bounds and distinct from the centre
        for n in neighbours {
            assert!(n >= 0 && (n as usize) < grid.size.total);
            assert_ne!(n, 0);
        }
    }

    #[test]
    fn grid_sample_nearest_matches_index() {
        let grid = ramp_grid();
        let v = grid.sample([0.25, 0.5, 0.75], Interpolation::Nearest);
        assert_eq!(v, grid[grid.to_1d(1, 2, 3)]);
    }

    #[test]
    fn grid_sample_trilinear_at_centre_is_exact() {
        let grid = ramp_grid();
        let v = grid.sample([0.25, 0.25, 0.25], Interpolation::Trilinear);
        assert!((v - grid[grid.to_1d(1, 1, 1)]).abs() < 1e-12);
    }

    #[test]
    fn grid_integral() {
        let grid = ramp_grid();
        // voxel volume is 1, sum of 0..63 is 2016
        assert!((grid.integral() - 2016.).abs() < 1e-9);
    }

    #[test]
    fn grid_mismatch() {
        let grid = ramp_grid();
        let other = Grid::new(
            vec![0.; 32],
            [4, 4, 2],
            [[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]],
            [0., 0., 0.],
        )
        .unwrap();
        assert!(grid.check_shape(&other).is_err());
    }

    #[test]
    fn grid_downscale_preserves_integral() {
        let data = (0..4096).map(|x| (x % 97) as f64 * 0.1 + 1.).collect();
        let grid = Grid::new(
            data,
            [16, 16, 16],
            [[8., 0., 0.], [0., 8., 0.], [0., 0., 8.]],
            [0., 0., 0.],
        )
        .unwrap();
        let small = grid.downscale(512).unwrap();
        assert!(small.size.total <= 512);
        assert!((small.integral() - grid.integral()).abs() < 1e-9);
    }

    #[test]
    fn grid_downscale_noop_below_target() {
        let grid = ramp_grid();
        let same = grid.downscale(1000).unwrap();
        assert_eq!(same.shape(), grid.shape());
        assert_eq!(same.values(), grid.values());
    }
}
