/// Compute the cross product of two vectors.
pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Compute the dot product between a vector and a matrix, v.M
pub fn dot(v: [f64; 3], m: [[f64; 3]; 3]) -> [f64; 3] {
    [
        v[0] * m[0][0] + v[1] * m[1][0] + v[2] * m[2][0],
        v[0] * m[0][1] + v[1] * m[1][1] + v[2] * m[2][1],
        v[0] * m[0][2] + v[1] * m[1][2] + v[2] * m[2][2],
    ]
}

/// Compute the dot product between two vectors.
pub fn vdot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Compute the norm of a vector.
pub fn norm(a: [f64; 3]) -> f64 {
    vdot(a, a).sqrt()
}

/// The difference of two vectors, a - b.
pub fn vsub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// The angle, in degrees, subtended at the origin by two vectors.
pub fn angle_deg(a: [f64; 3], b: [f64; 3]) -> f64 {
    let na = norm(a);
    let nb = norm(b);
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let cos = (vdot(a, b) / (na * nb)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Calculates the inverse of a 3x3 lattice matrix.
pub fn invert_lattice(lattice: &[[f64; 3]; 3]) -> Result<[[f64; 3]; 3], String> {
    let minor00 = lattice[1][1] * lattice[2][2] - lattice[1][2] * lattice[2][1];
    let minor01 = lattice[1][0] * lattice[2][2] - lattice[1][2] * lattice[2][0];
    let minor02 = lattice[1][0] * lattice[2][1] - lattice[1][1] * lattice[2][0];
    let determinant =
        lattice[0][0] * minor00 - lattice[0][1] * minor01 + lattice[0][2] * minor02;
    if determinant.abs() < 1e-16 {
        return Err(String::from("Lattice doesn't span 3D space"));
    }
    Ok([
        [
            minor00 / determinant,
            (lattice[0][2] * lattice[2][1] - lattice[2][2] * lattice[0][1]) / determinant,
            (lattice[0][1] * lattice[1][2] - lattice[1][1] * lattice[0][2]) / determinant,
        ],
        [
            -minor01 / determinant,
            (lattice[0][0] * lattice[2][2] - lattice[2][0] * lattice[0][2]) / determinant,
            (lattice[0][2] * lattice[1][0] - lattice[1][2] * lattice[0][0]) / determinant,
        ],
        [
            minor02 / determinant,
            (lattice[0][1] * lattice[2][0] - lattice[2][1] * lattice[0][0]) / determinant,
            (lattice[0][0] * lattice[1][1] - lattice[1][0] * lattice[0][1]) / determinant,
        ],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utils_dot() {
        assert_eq!(
            dot([1., 2., 3.], [[1., 0., 0.], [0., 2., 0.], [0., 0., 3.]]),
            [1., 4., 9.]
        )
    }

    #[test]
    fn utils_vdot() {
        assert_eq!(vdot([1., 2., 3.], [1., 2., 3.]), 14.)
    }

    #[test]
    fn utils_norm() {
        assert_eq!(norm([3., 4., 12.]), 13.)
    }

    #[test]
    fn utils_cross() {
        assert_eq!(cross([1., 0., 0.], [0., 1., 0.]), [0., 0., 1.])
    }

    #[test]
    fn utils_angle_collinear() {
        let a = [1., 1., 0.];
        let b = [-2., -2., 0.];
        assert!((angle_deg(a, b) - 180.).abs() < 1e-10)
    }

    #[test]
    fn utils_angle_orthogonal() {
        assert!((angle_deg([1., 0., 0.], [0., 3., 0.]) - 90.).abs() < 1e-10)
    }

    #[test]
    fn utils_invert_lattice() {
        let inv = invert_lattice(&[[2., 0., 0.], [0., 4., 0.], [0., 0., 5.]]).unwrap();
        assert_eq!(inv, [[0.5, 0., 0.], [0., 0.25, 0.], [0., 0., 0.2]])
    }

    #[test]
    fn utils_invert_lattice_singular() {
        assert!(invert_lattice(&[[1., 0., 0.], [1., 0., 0.], [0., 0., 2.]]).is_err())
    }
}
