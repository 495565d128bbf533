//! Serendipity shape functions and their precomputed quadrature tables.
//!
//! The volume element is the 20-node hexahedron, the face element is the
//! 8-node quadrilateral. Both are integrated with the 3-point Gauss-Legendre
//! rule along each local axis: 27 points for volumes, 9 for faces.
//!
//! ```text
//!        7-------18------6
//!       /|              /|
//!     19 |            17 |
//!     /  15          /   14
//!    4-------16-----5    |
//!    |   |          |    |
//!    |   3------10--|----2        gamma
//!   12  /          13   /           |  beta
//!    | 11            |  9           | /
//!    |/              | /            |/
//!    0-------8-------1              +---- alpha
//! ```

use std::sync::OnceLock;

use crate::{datatypes::validate_side_index, error::BrickError};

/// Abscissae of the 3-point Gauss-Legendre rule: -sqrt(0.6), 0, sqrt(0.6)
pub const GAUSS_POINTS: [f64; 3] = [-0.774_596_669_241_483_4, 0.0, 0.774_596_669_241_483_4];
pub const GAUSS_WEIGHTS: [f64; 3] = [5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0];

pub const VOLUME_GAUSS_POINTS: usize = 27;
pub const FACE_GAUSS_POINTS: usize = 9;
pub const VOLUME_NODES: usize = 20;
pub const FACE_NODES: usize = 8;

/// Reference coordinates of the hexahedron nodes, corners then mid-edges
pub const LOCAL_NODES_3D: [[f64; 3]; VOLUME_NODES] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [0.0, -1.0, -1.0],
    [1.0, 0.0, -1.0],
    [0.0, 1.0, -1.0],
    [-1.0, 0.0, -1.0],
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [0.0, -1.0, 1.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [-1.0, 0.0, 1.0],
];

/// Reference coordinates of the quadrilateral face nodes, corners then mid-sides
pub const LOCAL_NODES_2D: [[f64; 2]; FACE_NODES] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
    [0.0, -1.0],
    [1.0, 0.0],
    [0.0, 1.0],
    [-1.0, 0.0],
];

/// Outward normal of an element side as `(axis, sign)`.
///
/// This is the only place the side numbering is defined; face node selection
/// and load scattering both derive from it.
pub fn side_axis(side: usize) -> (usize, f64) {
    let sign = if side % 2 == 0 { -1.0 } else { 1.0 };
    (side / 2, sign)
}

/// Tangent axes `(t1, t2)` of a side such that `t1 x t2` is the outward normal
pub fn side_tangents(side: usize) -> (usize, usize) {
    let (axis, sign) = side_axis(side);
    let (t1, t2) = ((axis + 1) % 3, (axis + 2) % 3);

    if sign > 0.0 {
        (t1, t2)
    } else {
        (t2, t1)
    }
}

/// Reference coordinates of the 27 volume gauss points and their weights.
/// Index is `9 * k_gamma + 3 * k_beta + k_alpha`.
pub fn volume_gauss_point(gp: usize) -> ([f64; 3], f64) {
    let (k_gamma, k_beta, k_alpha) = (gp / 9, (gp / 3) % 3, gp % 3);

    (
        [
            GAUSS_POINTS[k_alpha],
            GAUSS_POINTS[k_beta],
            GAUSS_POINTS[k_gamma],
        ],
        GAUSS_WEIGHTS[k_alpha] * GAUSS_WEIGHTS[k_beta] * GAUSS_WEIGHTS[k_gamma],
    )
}

/// Reference coordinates of the 9 face gauss points and their weights.
/// Index is `3 * k_eta + k_tau`.
pub fn face_gauss_point(gp: usize) -> ([f64; 2], f64) {
    let (k_eta, k_tau) = (gp / 3, gp % 3);

    (
        [GAUSS_POINTS[k_eta], GAUSS_POINTS[k_tau]],
        GAUSS_WEIGHTS[k_eta] * GAUSS_WEIGHTS[k_tau],
    )
}

/// Value of the volume shape function of `node` at reference point `p`
pub fn volume_shape(node: [f64; 3], p: [f64; 3]) -> f64 {
    match edge_axis(&node) {
        None => {
            let s = p[0] * node[0] + p[1] * node[1] + p[2] * node[2];
            0.125
                * (1.0 + p[0] * node[0])
                * (1.0 + p[1] * node[1])
                * (1.0 + p[2] * node[2])
                * (s - 2.0)
        }
        Some(a) => {
            let (b, c) = ((a + 1) % 3, (a + 2) % 3);
            0.25 * (1.0 - p[a] * p[a]) * (1.0 + p[b] * node[b]) * (1.0 + p[c] * node[c])
        }
    }
}

/// Gradient of the volume shape function of `node` at `p` with respect to
/// (alpha, beta, gamma)
pub fn volume_shape_derivative(node: [f64; 3], p: [f64; 3]) -> [f64; 3] {
    let linear = [
        1.0 + p[0] * node[0],
        1.0 + p[1] * node[1],
        1.0 + p[2] * node[2],
    ];

    match edge_axis(&node) {
        None => {
            // d/dx of (1+x xi)(x xi + s' - 2) is xi (2 x xi + s' - 1)
            let s = p[0] * node[0] + p[1] * node[1] + p[2] * node[2];
            let mut derivative = [0.0; 3];
            for a in 0..3 {
                let (b, c) = ((a + 1) % 3, (a + 2) % 3);
                derivative[a] =
                    0.125 * node[a] * linear[b] * linear[c] * (s + p[a] * node[a] - 1.0);
            }
            derivative
        }
        Some(a) => {
            let (b, c) = ((a + 1) % 3, (a + 2) % 3);
            let bubble = 1.0 - p[a] * p[a];

            let mut derivative = [0.0; 3];
            derivative[a] = -0.5 * p[a] * linear[b] * linear[c];
            derivative[b] = 0.25 * bubble * node[b] * linear[c];
            derivative[c] = 0.25 * bubble * linear[b] * node[c];
            derivative
        }
    }
}

/// Value of the face shape function of `node` at reference point `p = (eta, tau)`
pub fn face_shape(node: [f64; 2], p: [f64; 2]) -> f64 {
    if node[0] == 0.0 {
        0.5 * (1.0 - p[0] * p[0]) * (1.0 + p[1] * node[1])
    } else if node[1] == 0.0 {
        0.5 * (1.0 - p[1] * p[1]) * (1.0 + p[0] * node[0])
    } else {
        0.25 * (1.0 + p[0] * node[0])
            * (1.0 + p[1] * node[1])
            * (p[0] * node[0] + p[1] * node[1] - 1.0)
    }
}

/// Gradient of the face shape function of `node` at `p` with respect to (eta, tau)
pub fn face_shape_derivative(node: [f64; 2], p: [f64; 2]) -> [f64; 2] {
    let (eta, tau) = (p[0], p[1]);

    if node[0] == 0.0 {
        [
            -eta * (1.0 + tau * node[1]),
            0.5 * (1.0 - eta * eta) * node[1],
        ]
    } else if node[1] == 0.0 {
        [
            0.5 * (1.0 - tau * tau) * node[0],
            -tau * (1.0 + eta * node[0]),
        ]
    } else {
        let s = eta * node[0] + tau * node[1];
        [
            0.25 * node[0] * (1.0 + tau * node[1]) * (s + eta * node[0]),
            0.25 * node[1] * (1.0 + eta * node[0]) * (s + tau * node[1]),
        ]
    }
}

/// Axis along which a mid-edge node sits at the midpoint, `None` for corners
fn edge_axis(node: &[f64; 3]) -> Option<usize> {
    node.iter().position(|c| *c == 0.0)
}

/// Shape function tables evaluated at the gauss points
#[derive(Debug)]
pub struct ShapeTables {
    /// `volume_derivatives[gp][node]` = dN/d(alpha, beta, gamma)
    pub volume_derivatives: [[[f64; 3]; VOLUME_NODES]; VOLUME_GAUSS_POINTS],
    pub volume_weights: [f64; VOLUME_GAUSS_POINTS],
    /// `face_derivatives[gp][node]` = dN/d(eta, tau)
    pub face_derivatives: [[[f64; 2]; FACE_NODES]; FACE_GAUSS_POINTS],
    pub face_values: [[f64; FACE_NODES]; FACE_GAUSS_POINTS],
    pub face_weights: [f64; FACE_GAUSS_POINTS],
    /// `face_nodes[side][k]` = element-local index of face node `k`
    pub face_nodes: [[usize; FACE_NODES]; 6],
}

impl ShapeTables {
    fn build() -> ShapeTables {
        let mut volume_derivatives = [[[0.0; 3]; VOLUME_NODES]; VOLUME_GAUSS_POINTS];
        let mut volume_weights = [0.0; VOLUME_GAUSS_POINTS];

        for gp in 0..VOLUME_GAUSS_POINTS {
            let (point, weight) = volume_gauss_point(gp);
            volume_weights[gp] = weight;

            for (node, local) in LOCAL_NODES_3D.iter().enumerate() {
                volume_derivatives[gp][node] = volume_shape_derivative(*local, point);
            }
        }

        let mut face_derivatives = [[[0.0; 2]; FACE_NODES]; FACE_GAUSS_POINTS];
        let mut face_values = [[0.0; FACE_NODES]; FACE_GAUSS_POINTS];
        let mut face_weights = [0.0; FACE_GAUSS_POINTS];

        for gp in 0..FACE_GAUSS_POINTS {
            let (point, weight) = face_gauss_point(gp);
            face_weights[gp] = weight;

            for (node, local) in LOCAL_NODES_2D.iter().enumerate() {
                face_derivatives[gp][node] = face_shape_derivative(*local, point);
                face_values[gp][node] = face_shape(*local, point);
            }
        }

        let mut face_nodes = [[0; FACE_NODES]; 6];
        for (side, nodes) in face_nodes.iter_mut().enumerate() {
            *nodes = build_face_nodes(side);
        }

        ShapeTables {
            volume_derivatives,
            volume_weights,
            face_derivatives,
            face_values,
            face_weights,
            face_nodes,
        }
    }
}

/// Maps each face node of `side` onto the element node at the same reference
/// position. Face coordinates (eta, tau) run along the side tangents.
fn build_face_nodes(side: usize) -> [usize; FACE_NODES] {
    let (axis, sign) = side_axis(side);
    let (t1, t2) = side_tangents(side);

    let mut nodes = [0; FACE_NODES];
    for (k, face_local) in LOCAL_NODES_2D.iter().enumerate() {
        let mut target = [0.0; 3];
        target[axis] = sign;
        target[t1] = face_local[0];
        target[t2] = face_local[1];

        // every face position is a corner or mid-edge of the hexahedron
        nodes[k] = LOCAL_NODES_3D
            .iter()
            .position(|local| *local == target)
            .unwrap_or_else(|| unreachable!("face position {target:?} is not an element node"));
    }

    nodes
}

/// Process-wide shape function tables, built on first use
pub fn shape_tables() -> &'static ShapeTables {
    static TABLES: OnceLock<ShapeTables> = OnceLock::new();
    TABLES.get_or_init(ShapeTables::build)
}

/// Element-local node indices of `side`, in face winding order
///
/// # Returns
/// The 8 face nodes, or an error if `side` is not in `0..6`
pub fn face_local_nodes(side: usize) -> Result<[usize; FACE_NODES], BrickError> {
    validate_side_index(side)?;
    Ok(shape_tables().face_nodes[side])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const STEP: f64 = 1e-6;

    fn sample_points_3d() -> Vec<[f64; 3]> {
        let mut points: Vec<[f64; 3]> = (0..VOLUME_GAUSS_POINTS)
            .map(|gp| volume_gauss_point(gp).0)
            .collect();
        points.push([0.3, -0.7, 0.11]);
        points.push([-0.9, 0.25, -0.4]);
        points
    }

    #[test]
    fn gauss_weights_integrate_reference_volume() {
        let tables = shape_tables();
        let volume: f64 = tables.volume_weights.iter().sum();
        let area: f64 = tables.face_weights.iter().sum();

        assert_abs_diff_eq!(volume, 8.0, epsilon = 1e-12);
        assert_abs_diff_eq!(area, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(GAUSS_POINTS[2], 0.6_f64.sqrt(), epsilon = 1e-15);
    }

    #[test]
    fn volume_gauss_point_ordering() {
        let (point, _) = volume_gauss_point(1);
        assert_eq!(point, [0.0, GAUSS_POINTS[0], GAUSS_POINTS[0]]);

        let (point, weight) = volume_gauss_point(13);
        assert_eq!(point, [0.0, 0.0, 0.0]);
        assert_abs_diff_eq!(weight, (8.0_f64 / 9.0).powi(3), epsilon = 1e-15);
    }

    #[test]
    fn volume_shapes_are_kronecker_delta_at_nodes() {
        for (i, node) in LOCAL_NODES_3D.iter().enumerate() {
            for (j, at) in LOCAL_NODES_3D.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(volume_shape(*node, *at), expected, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn volume_shapes_partition_unity() {
        for p in sample_points_3d() {
            let sum: f64 = LOCAL_NODES_3D.iter().map(|n| volume_shape(*n, p)).sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-13);

            for axis in 0..3 {
                let derivative_sum: f64 = LOCAL_NODES_3D
                    .iter()
                    .map(|n| volume_shape_derivative(*n, p)[axis])
                    .sum();
                assert_abs_diff_eq!(derivative_sum, 0.0, epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn volume_derivatives_match_finite_differences() {
        // node 6 is a corner, node 8 runs along alpha, 9 along beta, 12 along gamma
        for node_index in [0, 6, 8, 9, 12, 18] {
            let node = LOCAL_NODES_3D[node_index];

            for p in sample_points_3d() {
                let analytic = volume_shape_derivative(node, p);

                for axis in 0..3 {
                    let mut forward = p;
                    let mut backward = p;
                    forward[axis] += STEP;
                    backward[axis] -= STEP;

                    let numeric =
                        (volume_shape(node, forward) - volume_shape(node, backward)) / (2.0 * STEP);
                    assert_abs_diff_eq!(analytic[axis], numeric, epsilon = 1e-8);
                }
            }
        }
    }

    #[test]
    fn tables_hold_analytic_derivatives() {
        let tables = shape_tables();

        for gp in 0..VOLUME_GAUSS_POINTS {
            let (point, _) = volume_gauss_point(gp);
            for (node, local) in LOCAL_NODES_3D.iter().enumerate() {
                assert_eq!(
                    tables.volume_derivatives[gp][node],
                    volume_shape_derivative(*local, point)
                );
            }
        }
    }

    #[test]
    fn face_shapes_partition_unity_and_interpolate() {
        for (i, node) in LOCAL_NODES_2D.iter().enumerate() {
            for (j, at) in LOCAL_NODES_2D.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(face_shape(*node, *at), expected, epsilon = 1e-14);
            }
        }

        let tables = shape_tables();
        for gp in 0..FACE_GAUSS_POINTS {
            let sum: f64 = tables.face_values[gp].iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn face_derivatives_match_finite_differences() {
        let points = [[0.2, -0.6], [-0.77, 0.0], [0.5, 0.9]];

        for node in LOCAL_NODES_2D {
            for p in points {
                let analytic = face_shape_derivative(node, p);

                for axis in 0..2 {
                    let mut forward = p;
                    let mut backward = p;
                    forward[axis] += STEP;
                    backward[axis] -= STEP;

                    let numeric =
                        (face_shape(node, forward) - face_shape(node, backward)) / (2.0 * STEP);
                    assert_abs_diff_eq!(analytic[axis], numeric, epsilon = 1e-8);
                }
            }
        }
    }

    #[test]
    fn face_nodes_lie_on_their_side() {
        for side in 0..6 {
            let (axis, sign) = side_axis(side);
            let nodes = face_local_nodes(side).unwrap();

            for node in nodes {
                assert_eq!(LOCAL_NODES_3D[node][axis], sign);
            }

            // corners first, then mid-edges
            assert!(nodes[..4].iter().all(|n| *n < 8));
            assert!(nodes[4..].iter().all(|n| *n >= 8));
        }
    }

    #[test]
    fn side_tangents_follow_outward_normal() {
        for side in 0..6 {
            let (axis, sign) = side_axis(side);
            let (t1, t2) = side_tangents(side);

            let mut e1 = [0.0; 3];
            let mut e2 = [0.0; 3];
            e1[t1] = 1.0;
            e2[t2] = 1.0;
            let normal = [
                e1[1] * e2[2] - e1[2] * e2[1],
                e1[2] * e2[0] - e1[0] * e2[2],
                e1[0] * e2[1] - e1[1] * e2[0],
            ];

            assert_eq!(normal[axis], sign);
        }
    }

    #[test]
    fn top_face_winding() {
        assert_eq!(face_local_nodes(5).unwrap(), [4, 5, 6, 7, 16, 17, 18, 19]);
        assert_eq!(face_local_nodes(4).unwrap(), [0, 3, 2, 1, 11, 10, 9, 8]);
    }

    #[test]
    fn unknown_side_has_no_face_nodes() {
        assert!(matches!(
            face_local_nodes(6),
            Err(BrickError::InvalidParameter(_))
        ));
    }
}
