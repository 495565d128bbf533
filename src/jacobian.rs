use nalgebra::{Matrix3, Vector3};

use crate::{
    datatypes::Element,
    error::BrickError,
    shape::{shape_tables, VOLUME_GAUSS_POINTS, VOLUME_NODES},
};

/// Entries closer than this to -1, 0 or 1 are snapped to it
const SNAP_EPSILON: f64 = 1e-10;

/// Determinants below this fraction of the product of the Jacobian row norms
/// are treated as singular. The product bounds `|det J|` from above, so the
/// ratio does not depend on element size or aspect ratio.
const SINGULAR_RATIO: f64 = 1e-12;

/// Jacobian of the reference to global map at each volume gauss point.
/// Row is the reference axis (alpha, beta, gamma), column the global axis.
#[derive(Debug, Clone)]
pub struct Jacobian {
    pub matrices: [Matrix3<f64>; VOLUME_GAUSS_POINTS],
    pub determinants: [f64; VOLUME_GAUSS_POINTS],
}

/// Shape function gradients in global coordinates, `[gauss point][node]`
pub type GlobalShapeDerivatives = [[Vector3<f64>; VOLUME_NODES]; VOLUME_GAUSS_POINTS];

fn snap(value: f64) -> f64 {
    for target in [0.0, 1.0, -1.0] {
        if (value - target).abs() < SNAP_EPSILON {
            return target;
        }
    }
    value
}

/// Calculates the Jacobian matrices and determinants of an element
///
/// # Arguments
/// * `element` - The element to target
///
/// # Returns
/// The Jacobian at all 27 gauss points
pub fn compute_jacobians(element: &Element) -> Jacobian {
    let tables = shape_tables();

    let mut matrices = [Matrix3::zeros(); VOLUME_GAUSS_POINTS];
    let mut determinants = [0.0; VOLUME_GAUSS_POINTS];

    for gp in 0..VOLUME_GAUSS_POINTS {
        let mut jacobian: Matrix3<f64> = Matrix3::zeros();

        for (vertex, derivative) in element
            .vertices
            .iter()
            .zip(tables.volume_derivatives[gp].iter())
        {
            for row in 0..3 {
                for col in 0..3 {
                    jacobian[(row, col)] += vertex.coord(col) * derivative[row];
                }
            }
        }

        jacobian.apply(|v| *v = snap(*v));

        matrices[gp] = jacobian;
        determinants[gp] = jacobian.determinant();
    }

    Jacobian {
        matrices,
        determinants,
    }
}

/// Solves `J^T g = dN/d(alpha, beta, gamma)` for every node at every gauss point
///
/// # Arguments
/// * `element_index` - Index of the element, used to report singular geometry
/// * `jacobian` - The element Jacobian
///
/// # Returns
/// The shape function gradients in global coordinates
pub fn compute_global_derivatives(
    element_index: usize,
    jacobian: &Jacobian,
) -> Result<Box<GlobalShapeDerivatives>, BrickError> {
    let tables = shape_tables();
    let mut derivatives = Box::new([[Vector3::zeros(); VOLUME_NODES]; VOLUME_GAUSS_POINTS]);

    for gp in 0..VOLUME_GAUSS_POINTS {
        let matrix = &jacobian.matrices[gp];
        let determinant = jacobian.determinants[gp];
        let scale: f64 = matrix.row_iter().map(|row| row.norm()).product();

        let singular = BrickError::SingularJacobian {
            element: element_index,
            gauss_point: gp,
            determinant,
        };

        if !determinant.is_finite() || determinant <= SINGULAR_RATIO * scale {
            return Err(singular);
        }

        let inverse_transpose = match matrix.transpose().try_inverse() {
            Some(inverse) => inverse,
            None => return Err(singular),
        };

        for (node, local) in tables.volume_derivatives[gp].iter().enumerate() {
            derivatives[gp][node] = inverse_transpose * Vector3::new(local[0], local[1], local[2]);
        }
    }

    Ok(derivatives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{datatypes::Point3, mesher::Mesh, shape::LOCAL_NODES_3D};
    use approx::assert_relative_eq;

    fn box_element(low: [f64; 3], size: [f64; 3]) -> Element {
        let vertices = LOCAL_NODES_3D.map(|reference| {
            Point3::new(
                low[0] + 0.5 * (reference[0] + 1.0) * size[0],
                low[1] + 0.5 * (reference[1] + 1.0) * size[1],
                low[2] + 0.5 * (reference[2] + 1.0) * size[2],
            )
        });
        Element { vertices }
    }

    #[test]
    fn box_jacobian_is_half_extent_diagonal() {
        let jacobian = compute_jacobians(&box_element([1.0, 2.0, 3.0], [2.0, 0.5, 4.0]));

        for gp in 0..VOLUME_GAUSS_POINTS {
            let expected = Matrix3::from_diagonal(&Vector3::new(1.0, 0.25, 2.0));
            assert_relative_eq!(jacobian.matrices[gp], expected, epsilon = 1e-12);
            assert_relative_eq!(jacobian.determinants[gp], 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn unit_extent_entries_are_snapped() {
        let jacobian = compute_jacobians(&box_element([0.0, 0.0, 0.0], [2.0, 2.0, 2.0]));

        for gp in 0..VOLUME_GAUSS_POINTS {
            assert_eq!(jacobian.matrices[gp], Matrix3::identity());
            assert_eq!(jacobian.determinants[gp], 1.0);
        }
    }

    #[test]
    fn determinants_positive_on_generated_meshes() {
        for split in [[1, 1, 1], [4, 8, 3], [3, 1, 2]] {
            let mesh = Mesh::build([4.0, 5.0, 3.0], split).unwrap();

            for element in mesh.elements() {
                let jacobian = compute_jacobians(element);
                assert!(jacobian.determinants.iter().all(|d| *d > 0.0));
            }
        }
    }

    #[test]
    fn global_derivatives_sum_to_zero() {
        let element = box_element([0.0, 0.0, 0.0], [1.0, 3.0, 0.5]);
        let derivatives = compute_global_derivatives(0, &compute_jacobians(&element)).unwrap();

        for gp in 0..VOLUME_GAUSS_POINTS {
            let sum: Vector3<f64> = derivatives[gp].iter().sum();
            assert_relative_eq!(sum, Vector3::zeros(), epsilon = 1e-12);
        }
    }

    #[test]
    fn global_derivatives_reproduce_linear_field() {
        // gradient of u = 2x - y + 3z recovered from nodal values
        let element = box_element([0.5, -1.0, 2.0], [1.5, 2.0, 0.75]);
        let derivatives = compute_global_derivatives(0, &compute_jacobians(&element)).unwrap();
        let field: Vec<f64> = element
            .vertices
            .iter()
            .map(|v| 2.0 * v.x - v.y + 3.0 * v.z)
            .collect();

        for gp in 0..VOLUME_GAUSS_POINTS {
            let gradient: Vector3<f64> = derivatives[gp]
                .iter()
                .zip(field.iter())
                .map(|(g, u)| g * *u)
                .sum();
            assert_relative_eq!(gradient, Vector3::new(2.0, -1.0, 3.0), epsilon = 1e-10);
        }
    }

    #[test]
    fn slender_elements_are_accepted() {
        let element = box_element([0.0, 0.0, 0.0], [1e4, 1e-3, 1e-3]);
        let jacobian = compute_jacobians(&element);
        let derivatives = compute_global_derivatives(0, &jacobian).unwrap();

        assert_relative_eq!(jacobian.determinants[0], 1.25e-3, max_relative = 1e-12);
        let sum: Vector3<f64> = derivatives[4].iter().sum();
        assert!(sum.norm() < 1e-6);
    }

    #[test]
    fn flattened_element_is_singular() {
        let mut element = box_element([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        for vertex in element.vertices.iter_mut() {
            vertex.z = 0.0;
        }

        let result = compute_global_derivatives(7, &compute_jacobians(&element));
        match result {
            Err(BrickError::SingularJacobian { element, .. }) => assert_eq!(element, 7),
            other => panic!("expected singular Jacobian, got {other:?}"),
        }
    }

    #[test]
    fn inverted_element_is_rejected() {
        let mut element = box_element([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        for vertex in element.vertices.iter_mut() {
            vertex.x = -vertex.x;
        }

        assert!(matches!(
            compute_global_derivatives(0, &compute_jacobians(&element)),
            Err(BrickError::SingularJacobian { gauss_point: 0, .. })
        ));
    }
}
